use common::{error::AppError, utils::llm::LanguageModel};

use super::{ask, prompts, REVISION_TEMPERATURE};

/// Inputs for a personalised revision plan.
#[derive(Debug, Clone, Copy)]
pub struct RevisionRequest<'a> {
    pub title: &'a str,
    pub summary: &'a str,
    pub concepts: &'a str,
    pub weak_topics: Option<&'a str>,
}

impl RevisionRequest<'_> {
    fn user_message(&self) -> String {
        let weak_topics = self
            .weak_topics
            .map(str::trim)
            .filter(|topics| !topics.is_empty())
            .unwrap_or(prompts::NO_WEAK_TOPICS);

        format!(
            "Lesson title: {}\n\nSummary:\n{}\n\nConcepts:\n{}\n\nWeak topics:\n{}\n\nCreate a structured revision plan.",
            self.title, self.summary, self.concepts, weak_topics
        )
    }
}

pub async fn generate_revision_plan(
    llm: &dyn LanguageModel,
    request: RevisionRequest<'_>,
) -> Result<String, AppError> {
    let reply = ask(
        llm,
        prompts::REVISION_SYSTEM_MESSAGE,
        request.user_message(),
        REVISION_TEMPERATURE,
    )
    .await?;

    Ok(reply.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::ScriptedModel;

    fn request(weak_topics: Option<&str>) -> RevisionRequest<'_> {
        RevisionRequest {
            title: "Cells",
            summary: "Cells are small.",
            concepts: "Membrane\nNucleus",
            weak_topics,
        }
    }

    #[test]
    fn missing_weak_topics_fall_back() {
        let message = request(None).user_message();
        assert!(message.contains(prompts::NO_WEAK_TOPICS));
        assert!(message.starts_with("Lesson title: Cells"));

        let blank = request(Some("   ")).user_message();
        assert!(blank.contains(prompts::NO_WEAK_TOPICS));
    }

    #[test]
    fn weak_topics_are_included() {
        let message = request(Some("osmosis")).user_message();
        assert!(message.contains("Weak topics:\nosmosis"));
        assert!(!message.contains(prompts::NO_WEAK_TOPICS));
    }

    #[tokio::test]
    async fn plan_uses_revision_temperature() {
        let llm = ScriptedModel::replying(" Plan ");
        let plan = generate_revision_plan(&llm, request(None))
            .await
            .expect("plan");

        assert_eq!(plan, "Plan");
        let (_, temperature) = llm.last_request();
        assert!((temperature - REVISION_TEMPERATURE).abs() < f32::EPSILON);
    }
}
