use common::{error::AppError, utils::llm::LanguageModel};

use super::{ask, prompts, ANALYSIS_TEMPERATURE};

pub async fn extract_concepts(
    llm: &dyn LanguageModel,
    transcript: &str,
) -> Result<Vec<String>, AppError> {
    let reply = ask(
        llm,
        prompts::CONCEPTS_SYSTEM_MESSAGE,
        prompts::transcript_user_message(transcript),
        ANALYSIS_TEMPERATURE,
    )
    .await?;

    Ok(parse_concepts(&reply))
}

/// One concept per non-blank line, with leading bullet markers removed.
pub fn parse_concepts(reply: &str) -> Vec<String> {
    reply
        .lines()
        .map(|line| {
            line.trim_start_matches(|c: char| matches!(c, '-' | '•' | '*') || c.is_whitespace())
                .trim_end()
        })
        .filter(|concept| !concept.is_empty())
        .map(str::to_string)
        .collect()
}
