//! Fire-and-forget execution of lesson pipeline runs on a bounded pool of tasks.

use std::{path::Path, sync::Arc};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::lesson::{ArtifactKind, Lesson},
    },
};
use tokio::{
    sync::{mpsc, Semaphore},
    task::{JoinHandle, JoinSet},
};
use tracing::{error, info, warn};

use crate::pipeline::{KnowledgePipeline, PipelineOutcome};

/// One lesson artifact waiting to be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonJob {
    pub lesson_id: String,
    pub artifact_path: String,
}

pub struct PipelineQueue {
    sender: mpsc::Sender<LessonJob>,
    dispatcher: JoinHandle<()>,
}

impl PipelineQueue {
    /// Spawns the dispatcher. At most `workers` lessons are processed at the same time and
    /// at most `capacity` jobs wait in the queue.
    pub fn start(pipeline: Arc<KnowledgePipeline>, workers: usize, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<LessonJob>(capacity.max(1));
        let permits = Arc::new(Semaphore::new(workers.max(1)));

        let dispatcher = tokio::spawn(async move {
            let mut running = JoinSet::new();

            while let Some(job) = receiver.recv().await {
                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    break;
                };
                let pipeline = Arc::clone(&pipeline);
                running.spawn(async move {
                    let _permit = permit;
                    run_job(&pipeline, job).await;
                });

                while let Some(finished) = running.try_join_next() {
                    log_join_error(finished);
                }
            }

            while let Some(finished) = running.join_next().await {
                log_join_error(finished);
            }
            info!("knowledge pipeline queue drained");
        });

        Self { sender, dispatcher }
    }

    /// Returns as soon as the job is queued; the run itself happens in the background.
    pub async fn enqueue(&self, job: LessonJob) -> Result<(), AppError> {
        self.sender
            .send(job)
            .await
            .map_err(|_| AppError::InternalError("knowledge pipeline queue is closed".into()))
    }

    /// Stops accepting jobs and waits for every queued and running job to finish.
    pub async fn shutdown(self) -> Result<(), AppError> {
        drop(self.sender);
        self.dispatcher.await?;
        Ok(())
    }
}

async fn run_job(pipeline: &KnowledgePipeline, job: LessonJob) {
    let LessonJob {
        lesson_id,
        artifact_path,
    } = job;

    match pipeline.process_lesson(&lesson_id, &artifact_path).await {
        Ok(PipelineOutcome::Completed { chunk_count }) => {
            info!(%lesson_id, chunk_count, "lesson job finished");
        }
        Ok(PipelineOutcome::Failed { reason }) => {
            warn!(%lesson_id, %reason, "lesson job failed");
        }
        Ok(PipelineOutcome::LessonBusy) => {
            info!(%lesson_id, "lesson job skipped; another run owns the lesson");
        }
        Ok(PipelineOutcome::LessonMissing) => {
            warn!(%lesson_id, "lesson job dropped; lesson no longer exists");
        }
        Err(err) => {
            error!(%lesson_id, error = %err, "lesson job could not update lesson status");
        }
    }
}

fn log_join_error(result: Result<(), tokio::task::JoinError>) {
    if let Err(err) = result {
        error!(error = %err, "lesson job task panicked");
    }
}

/// Records an uploaded artifact on its lesson and queues the lesson for processing.
pub async fn submit_lesson_upload(
    db: &SurrealDbClient,
    queue: &PipelineQueue,
    lesson_id: &str,
    artifact_path: &Path,
) -> Result<Lesson, AppError> {
    if Lesson::get(lesson_id, db).await?.is_none() {
        return Err(AppError::NotFound(format!("lesson {lesson_id}")));
    }

    let kind = ArtifactKind::from_upload(artifact_path)?;
    let path = artifact_path.to_str().ok_or_else(|| {
        AppError::Validation(format!(
            "artifact path is not valid UTF-8: {}",
            artifact_path.display()
        ))
    })?;

    let lesson = Lesson::attach_artifact(lesson_id, kind, path, db).await?;
    queue
        .enqueue(LessonJob {
            lesson_id: lesson_id.to_owned(),
            artifact_path: path.to_owned(),
        })
        .await?;

    info!(
        lesson_id,
        kind = kind.as_str(),
        artifact_path = path,
        "lesson upload queued for knowledge processing"
    );
    Ok(lesson)
}

#[cfg(test)]
mod tests {
    use common::storage::types::lesson::LessonStatus;

    use super::*;
    use crate::pipeline::tests::{setup_db, store_lesson, tuning, MockServices, LONG_CLEANED};

    fn pipeline(db: &Arc<SurrealDbClient>) -> Arc<KnowledgePipeline> {
        Arc::new(KnowledgePipeline::with_services(
            Arc::clone(db),
            tuning(200),
            Arc::new(MockServices::new(db, "raw words", LONG_CLEANED)),
        ))
    }

    #[tokio::test]
    async fn upload_is_recorded_and_processed_in_background() {
        let db = setup_db().await;
        store_lesson(&db, "upload").await;
        let queue = PipelineQueue::start(pipeline(&db), 2, 8);

        let lesson = submit_lesson_upload(&db, &queue, "upload", Path::new("uploads/pdfs/notes.pdf"))
            .await
            .expect("submit");
        assert_eq!(lesson.pdf_path.as_deref(), Some("uploads/pdfs/notes.pdf"));

        queue.shutdown().await.expect("shutdown");

        let lesson = Lesson::get("upload", &db)
            .await
            .expect("fetch")
            .expect("lesson present");
        assert_eq!(lesson.transcript_status, LessonStatus::Completed);
        assert!(lesson.processed);
    }

    #[tokio::test]
    async fn unsupported_upload_is_rejected_before_queueing() {
        let db = setup_db().await;
        store_lesson(&db, "docx").await;
        let queue = PipelineQueue::start(pipeline(&db), 1, 1);

        let result =
            submit_lesson_upload(&db, &queue, "docx", Path::new("uploads/notes.docx")).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        queue.shutdown().await.expect("shutdown");
        let lesson = Lesson::get("docx", &db)
            .await
            .expect("fetch")
            .expect("lesson present");
        assert_eq!(lesson.transcript_status, LessonStatus::Pending);
    }

    #[tokio::test]
    async fn upload_for_unknown_lesson_is_not_found() {
        let db = setup_db().await;
        let queue = PipelineQueue::start(pipeline(&db), 1, 1);

        let result =
            submit_lesson_upload(&db, &queue, "ghost", Path::new("uploads/audio/a.mp3")).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        queue.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn many_lessons_all_complete() {
        let db = setup_db().await;
        for i in 0..5 {
            store_lesson(&db, &format!("lesson-{i}")).await;
        }
        let queue = PipelineQueue::start(pipeline(&db), 2, 2);

        for i in 0..5 {
            queue
                .enqueue(LessonJob {
                    lesson_id: format!("lesson-{i}"),
                    artifact_path: "uploads/audio/a.mp3".into(),
                })
                .await
                .expect("enqueue");
        }
        queue.shutdown().await.expect("shutdown");

        for i in 0..5 {
            let lesson = Lesson::get(&format!("lesson-{i}"), &db)
                .await
                .expect("fetch")
                .expect("lesson present");
            assert_eq!(lesson.transcript_status, LessonStatus::Completed);
        }
    }
}
