use common::{error::AppError, utils::llm::LanguageModel};

use super::{ask, prompts, CLEAN_TEMPERATURE};

/// Turns noisy recognizer output into readable text. The trimmed reply is the result.
pub async fn clean_transcript(llm: &dyn LanguageModel, transcript: &str) -> Result<String, AppError> {
    let reply = ask(
        llm,
        prompts::CLEANER_SYSTEM_MESSAGE,
        prompts::cleaner_user_message(transcript),
        CLEAN_TEMPERATURE,
    )
    .await?;

    Ok(reply.trim().to_string())
}
