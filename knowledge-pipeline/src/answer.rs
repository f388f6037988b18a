use common::{
    error::AppError,
    storage::types::chunk_embedding::ScoredChunk,
    utils::llm::{ChatMessage, LanguageModel},
};
use tracing::info;

use crate::{
    agents::{prompts, ANSWER_TEMPERATURE},
    vector_index::LessonVectorIndex,
};

#[derive(Debug, Clone)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<ScoredChunk>,
}

/// Answers a learner question from the nearest indexed lesson chunks.
#[tracing::instrument(skip_all, fields(lesson_id = lesson_id.unwrap_or("*"), top_k))]
pub async fn answer_question(
    llm: &dyn LanguageModel,
    index: &LessonVectorIndex,
    lesson_id: Option<&str>,
    question: &str,
    top_k: usize,
) -> Result<Answer, AppError> {
    let sources = index.query(lesson_id, question, top_k).await?;

    let context = sources
        .iter()
        .map(|source| source.document.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let user_message = format!("Context:\n{context}\n\nQuestion: {question}");

    let answer = llm
        .chat(
            &[
                ChatMessage::system(prompts::ANSWER_SYSTEM_MESSAGE),
                ChatMessage::user(user_message),
            ],
            ANSWER_TEMPERATURE,
        )
        .await?;

    info!(source_count = sources.len(), "question answered");
    Ok(Answer {
        answer: answer.trim().to_string(),
        sources,
    })
}
