mod config;
mod context;
mod locks;
mod services;
mod stages;
mod state;

pub use config::{PipelineConfig, PipelineTuning};
#[allow(clippy::module_name_repetitions)]
pub use services::{DefaultPipelineServices, PipelineServices};

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::lesson::{Lesson, LessonStatus},
    },
    utils::llm::LanguageModel,
};
use tracing::{info, warn};

use self::{
    context::PipelineContext,
    locks::LessonLocks,
    stages::{chunk, enrich, extract, index},
    state::ready,
};
use crate::{extraction::TextExtractor, vector_index::LessonVectorIndex};

/// How a lesson run ended. Failures are recorded on the lesson, not returned as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Completed { chunk_count: usize },
    Failed { reason: String },
    LessonMissing,
    /// Another live run, possibly in another process, owns the lesson.
    LessonBusy,
}

pub struct KnowledgePipeline {
    db: Arc<SurrealDbClient>,
    pipeline_config: PipelineConfig,
    services: Arc<dyn PipelineServices>,
    locks: LessonLocks,
}

impl KnowledgePipeline {
    pub fn new(
        db: Arc<SurrealDbClient>,
        extractor: TextExtractor,
        llm: Arc<dyn LanguageModel>,
        index: LessonVectorIndex,
        pipeline_config: PipelineConfig,
    ) -> Self {
        let services = DefaultPipelineServices::new(extractor, llm, index);
        Self::with_services(db, pipeline_config, Arc::new(services))
    }

    pub fn with_services(
        db: Arc<SurrealDbClient>,
        pipeline_config: PipelineConfig,
        services: Arc<dyn PipelineServices>,
    ) -> Self {
        Self {
            db,
            pipeline_config,
            services,
            locks: LessonLocks::default(),
        }
    }

    /// Runs the whole pipeline for one lesson artifact and moves the lesson to `completed`
    /// or `failed`. Runs for the same lesson are serialized in-process by a lock and across
    /// processes by the guarded status transitions.
    #[tracing::instrument(skip_all, fields(lesson_id = %lesson_id, artifact_path = %artifact_path))]
    pub async fn process_lesson(
        &self,
        lesson_id: &str,
        artifact_path: &str,
    ) -> Result<PipelineOutcome, AppError> {
        let _guard = self.locks.acquire(lesson_id).await;

        let Some(lesson) = Lesson::get(lesson_id, &self.db).await? else {
            warn!(lesson_id, "lesson not found; skipping knowledge processing");
            return Ok(PipelineOutcome::LessonMissing);
        };

        let lesson = if lesson.transcript_status == LessonStatus::Processing {
            let stale_after = self.pipeline_config.tuning.stale_run_after();
            if !lesson.idle_longer_than(stale_after) {
                info!(lesson_id, "lesson is owned by a live run; skipping");
                return Ok(PipelineOutcome::LessonBusy);
            }
            warn!(
                lesson_id,
                stale_after_secs = stale_after.as_secs(),
                "lesson left processing by a stalled run; failing it first"
            );
            match lesson.mark_failed(&self.db).await {
                Ok(lesson) => lesson,
                Err(err) => return self.busy_or(lesson_id, err).await,
            }
        } else {
            lesson
        };
        let lesson = match lesson.mark_processing(&self.db).await {
            Ok(lesson) => lesson,
            Err(err) => return self.busy_or(lesson_id, err).await,
        };

        match self.drive_pipeline(&lesson, artifact_path).await {
            Ok(chunk_count) => {
                lesson.mark_completed(&self.db).await?;
                info!(lesson_id, chunk_count, "lesson knowledge processing completed");
                Ok(PipelineOutcome::Completed { chunk_count })
            }
            Err(err) => {
                let reason = err.to_string();
                lesson.mark_failed(&self.db).await?;
                warn!(lesson_id, %reason, "lesson marked as failed");
                Ok(PipelineOutcome::Failed { reason })
            }
        }
    }

    /// A guarded status write that lost against another run leaves the lesson in
    /// `processing`; that is a busy lesson, not an error.
    async fn busy_or(&self, lesson_id: &str, err: AppError) -> Result<PipelineOutcome, AppError> {
        match Lesson::get(lesson_id, &self.db).await? {
            Some(current) if current.transcript_status == LessonStatus::Processing => {
                info!(lesson_id, error = %err, "lesson claimed by a concurrent run; skipping");
                Ok(PipelineOutcome::LessonBusy)
            }
            _ => Err(err),
        }
    }

    fn duration_millis(duration: Duration) -> u64 {
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
    }

    async fn drive_pipeline(&self, lesson: &Lesson, artifact_path: &str) -> Result<usize, AppError> {
        let mut ctx = PipelineContext::new(
            lesson,
            artifact_path,
            self.db.as_ref(),
            &self.pipeline_config,
            self.services.as_ref(),
        );

        let machine = ready();
        let pipeline_started = Instant::now();

        let stage_start = Instant::now();
        let machine = extract(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let extract_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let machine = enrich(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let enrich_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let machine = chunk(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let chunk_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let _machine = index(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let index_duration = stage_start.elapsed();

        info!(
            lesson_id = %ctx.lesson_id,
            total_ms = Self::duration_millis(pipeline_started.elapsed()),
            extract_ms = Self::duration_millis(extract_duration),
            enrich_ms = Self::duration_millis(enrich_duration),
            chunk_ms = Self::duration_millis(chunk_duration),
            index_ms = Self::duration_millis(index_duration),
            chunk_count = ctx.chunk_ids.len(),
            "knowledge pipeline finished"
        );

        Ok(ctx.chunk_ids.len())
    }
}
