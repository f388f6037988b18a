//! Single-round-trip language-model agents and the deterministic parsing of their replies.

mod cleaner;
mod concept_extractor;
pub mod prompts;
mod revision;
mod summarizer;
mod topic_segmenter;

pub use cleaner::clean_transcript;
pub use concept_extractor::{extract_concepts, parse_concepts};
pub use revision::{generate_revision_plan, RevisionRequest};
pub use summarizer::{split_summary, summarize_lesson, LessonSummary};
pub use topic_segmenter::{parse_topic_segments, segment_topics, TopicSegment};

use common::{
    error::AppError,
    utils::llm::{ChatMessage, LanguageModel},
};

pub const CLEAN_TEMPERATURE: f32 = 0.1;
pub const ANALYSIS_TEMPERATURE: f32 = 0.3;
pub const REVISION_TEMPERATURE: f32 = 0.4;
pub const ANSWER_TEMPERATURE: f32 = 0.7;

async fn ask(
    llm: &dyn LanguageModel,
    system: &str,
    user: String,
    temperature: f32,
) -> Result<String, AppError> {
    llm.chat(
        &[ChatMessage::system(system), ChatMessage::user(user)],
        temperature,
    )
    .await
}
