use std::sync::Arc;

use async_trait::async_trait;
use common::{error::AppError, utils::llm::LanguageModel};

use crate::{
    agents::{self, LessonSummary, TopicSegment},
    extraction::TextExtractor,
    vector_index::LessonVectorIndex,
};

/// External work the pipeline depends on, kept behind one seam so runs can be driven by
/// test doubles.
#[async_trait]
pub trait PipelineServices: Send + Sync {
    /// Plain text of the stored artifact. Extraction failures come back as empty text.
    async fn extract_text(&self, artifact_path: &str) -> Result<String, AppError>;

    async fn clean_transcript(&self, transcript: &str) -> Result<String, AppError>;

    async fn summarize(&self, text: &str) -> Result<LessonSummary, AppError>;

    async fn extract_concepts(&self, text: &str) -> Result<Vec<String>, AppError>;

    async fn segment_topics(&self, text: &str) -> Result<Vec<TopicSegment>, AppError>;

    /// Removes every stored vector of the lesson.
    async fn purge_index(&self, lesson_id: &str) -> Result<(), AppError>;

    /// Embeds and stores the chunks, returning their ids in order.
    async fn index_chunks(&self, lesson_id: &str, chunks: &[String])
        -> Result<Vec<String>, AppError>;
}

pub struct DefaultPipelineServices {
    extractor: TextExtractor,
    llm: Arc<dyn LanguageModel>,
    index: LessonVectorIndex,
}

impl DefaultPipelineServices {
    pub fn new(extractor: TextExtractor, llm: Arc<dyn LanguageModel>, index: LessonVectorIndex) -> Self {
        Self {
            extractor,
            llm,
            index,
        }
    }
}

#[async_trait]
impl PipelineServices for DefaultPipelineServices {
    async fn extract_text(&self, artifact_path: &str) -> Result<String, AppError> {
        Ok(self.extractor.extract(artifact_path).await)
    }

    async fn clean_transcript(&self, transcript: &str) -> Result<String, AppError> {
        agents::clean_transcript(self.llm.as_ref(), transcript).await
    }

    async fn summarize(&self, text: &str) -> Result<LessonSummary, AppError> {
        agents::summarize_lesson(self.llm.as_ref(), text).await
    }

    async fn extract_concepts(&self, text: &str) -> Result<Vec<String>, AppError> {
        agents::extract_concepts(self.llm.as_ref(), text).await
    }

    async fn segment_topics(&self, text: &str) -> Result<Vec<TopicSegment>, AppError> {
        agents::segment_topics(self.llm.as_ref(), text).await
    }

    async fn purge_index(&self, lesson_id: &str) -> Result<(), AppError> {
        self.index.purge(lesson_id).await
    }

    async fn index_chunks(
        &self,
        lesson_id: &str,
        chunks: &[String],
    ) -> Result<Vec<String>, AppError> {
        self.index.index(lesson_id, chunks).await
    }
}
