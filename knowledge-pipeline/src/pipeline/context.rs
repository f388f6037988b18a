use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::lesson::{Lesson, LessonKnowledge},
    },
};
use tracing::error;

use super::{config::PipelineConfig, services::PipelineServices};

pub struct PipelineContext<'a> {
    pub lesson: &'a Lesson,
    pub lesson_id: String,
    pub artifact_path: &'a str,
    pub db: &'a SurrealDbClient,
    pub pipeline_config: &'a PipelineConfig,
    pub services: &'a dyn PipelineServices,
    pub transcript: Option<String>,
    pub knowledge: Option<LessonKnowledge>,
    pub chunks: Vec<String>,
    pub chunk_ids: Vec<String>,
}

impl<'a> PipelineContext<'a> {
    pub fn new(
        lesson: &'a Lesson,
        artifact_path: &'a str,
        db: &'a SurrealDbClient,
        pipeline_config: &'a PipelineConfig,
        services: &'a dyn PipelineServices,
    ) -> Self {
        Self {
            lesson,
            lesson_id: lesson.id.clone(),
            artifact_path,
            db,
            pipeline_config,
            services,
            transcript: None,
            knowledge: None,
            chunks: Vec::new(),
            chunk_ids: Vec::new(),
        }
    }

    pub fn transcript(&self) -> Result<&str, AppError> {
        self.transcript
            .as_deref()
            .ok_or_else(|| AppError::InternalError("transcript expected to be available".into()))
    }

    /// Text the later stages work from: the cleaned transcript, or the raw one when
    /// cleaning produced nothing.
    pub fn working_text(&self) -> Result<&str, AppError> {
        let cleaned = self
            .knowledge
            .as_ref()
            .map(|knowledge| knowledge.cleaned_transcript.as_str())
            .unwrap_or_default();
        if cleaned.trim().is_empty() {
            self.transcript()
        } else {
            Ok(cleaned)
        }
    }

    pub fn abort(&mut self, err: AppError) -> AppError {
        error!(
            lesson_id = %self.lesson_id,
            artifact_path = self.artifact_path,
            error = %err,
            "knowledge pipeline aborted"
        );
        err
    }
}
