use common::{error::AppError, utils::llm::LanguageModel};

use super::{ask, prompts, ANALYSIS_TEMPERATURE};

const TAKEAWAYS_MARKER: &str = "Key Takeaways:";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LessonSummary {
    pub summary: String,
    pub key_takeaways: String,
}

pub async fn summarize_lesson(
    llm: &dyn LanguageModel,
    transcript: &str,
) -> Result<LessonSummary, AppError> {
    let reply = ask(
        llm,
        prompts::SUMMARY_SYSTEM_MESSAGE,
        prompts::transcript_user_message(transcript),
        ANALYSIS_TEMPERATURE,
    )
    .await?;

    Ok(split_summary(&reply))
}

/// Splits a reply on the first takeaways marker. Without a marker the whole reply is the
/// summary and the takeaways are empty.
pub fn split_summary(reply: &str) -> LessonSummary {
    match reply.split_once(TAKEAWAYS_MARKER) {
        Some((summary, takeaways)) => LessonSummary {
            summary: summary.trim().to_string(),
            key_takeaways: takeaways.trim().to_string(),
        },
        None => LessonSummary {
            summary: reply.trim().to_string(),
            key_takeaways: String::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::ScriptedModel;

    #[test]
    fn splits_on_marker() {
        let parsed = split_summary("Para1.\n\nKey Takeaways:\n- a\n- b");
        assert_eq!(parsed.summary, "Para1.");
        assert_eq!(parsed.key_takeaways, "- a\n- b");
    }

    #[test]
    fn missing_marker_leaves_takeaways_empty() {
        let parsed = split_summary("  Just a summary.  ");
        assert_eq!(parsed.summary, "Just a summary.");
        assert!(parsed.key_takeaways.is_empty());
    }

    #[test]
    fn only_first_marker_splits() {
        let parsed = split_summary("S\nKey Takeaways:\n- a\nKey Takeaways: again");
        assert_eq!(parsed.summary, "S");
        assert_eq!(parsed.key_takeaways, "- a\nKey Takeaways: again");
    }

    #[tokio::test]
    async fn summarize_uses_analysis_temperature() {
        let llm = ScriptedModel::replying("Summary.\nKey Takeaways:\n- one");
        let summary = summarize_lesson(&llm, "transcript").await.expect("summary");

        assert_eq!(summary.key_takeaways, "- one");
        let (messages, temperature) = llm.last_request();
        assert!((temperature - ANALYSIS_TEMPERATURE).abs() < f32::EPSILON);
        assert_eq!(messages[1].content, "Transcript:\n\ntranscript");
    }
}
