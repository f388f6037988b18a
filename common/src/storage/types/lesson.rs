use std::path::Path;

use state_machines::state_machine;
use surrealdb::sql::Datetime as SurrealDatetime;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Processing status of a lesson's knowledge pipeline run.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LessonStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl LessonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LessonStatus::Pending => "pending",
            LessonStatus::Processing => "processing",
            LessonStatus::Completed => "completed",
            LessonStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for LessonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The kind of stored artifact a lesson was uploaded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Document,
    Audio,
    Video,
}

impl ArtifactKind {
    /// Classifies an artifact for extraction. PDFs are documents, video mime types are
    /// videos and everything else goes through transcription.
    pub fn detect(path: &Path) -> Self {
        match mime_guess::from_path(path).first() {
            Some(mime) if mime == mime::APPLICATION_PDF => ArtifactKind::Document,
            Some(mime) if mime.type_() == mime::VIDEO => ArtifactKind::Video,
            _ => ArtifactKind::Audio,
        }
    }

    /// Strict classification for freshly uploaded files.
    pub fn from_upload(path: &Path) -> Result<Self, AppError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "mp4" | "mov" | "avi" => Ok(ArtifactKind::Video),
            "mp3" | "wav" => Ok(ArtifactKind::Audio),
            "pdf" => Ok(ArtifactKind::Document),
            _ => Err(AppError::Validation(format!(
                "Unsupported file type: {}",
                path.display()
            ))),
        }
    }

    /// Lesson field that stores the path of an artifact of this kind.
    pub fn lesson_field(self) -> &'static str {
        match self {
            ArtifactKind::Document => "pdf_path",
            ArtifactKind::Audio => "audio_path",
            ArtifactKind::Video => "video_path",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Document => "document",
            ArtifactKind::Audio => "audio",
            ArtifactKind::Video => "video",
        }
    }
}

/// Derived knowledge written onto a lesson after the language-model stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LessonKnowledge {
    pub cleaned_transcript: String,
    pub summary: String,
    pub key_takeaways: String,
    pub concepts: Vec<String>,
}

impl LessonKnowledge {
    pub fn concepts_text(&self) -> String {
        self.concepts.join("\n")
    }
}

#[derive(Debug, Clone, Copy)]
enum StatusTransition {
    Start,
    Complete,
    Fail,
}

impl StatusTransition {
    fn as_str(self) -> &'static str {
        match self {
            StatusTransition::Start => "start",
            StatusTransition::Complete => "complete",
            StatusTransition::Fail => "fail",
        }
    }
}

mod lifecycle {
    use super::state_machine;

    state_machine! {
        name: LessonLifecycleMachine,
        initial: Pending,
        states: [Pending, Processing, Completed, Failed],
        events {
            start {
                transition: { from: Pending, to: Processing }
                transition: { from: Completed, to: Processing }
                transition: { from: Failed, to: Processing }
            }
            complete {
                transition: { from: Processing, to: Completed }
            }
            fail {
                transition: { from: Processing, to: Failed }
            }
        }
    }

    pub(super) fn pending() -> LessonLifecycleMachine<(), Pending> {
        LessonLifecycleMachine::new(())
    }
}

fn invalid_transition(status: LessonStatus, event: StatusTransition) -> AppError {
    AppError::Validation(format!(
        "Invalid lesson status transition: {} -> {}",
        status.as_str(),
        event.as_str()
    ))
}

fn compute_next_status(
    status: LessonStatus,
    event: StatusTransition,
) -> Result<LessonStatus, AppError> {
    use lifecycle::pending;

    fn rejected<E>(status: LessonStatus, event: StatusTransition) -> impl FnOnce(E) -> AppError {
        move |_| invalid_transition(status, event)
    }

    match (status, event) {
        (LessonStatus::Pending, StatusTransition::Start) => pending()
            .start()
            .map(|_| LessonStatus::Processing)
            .map_err(rejected(status, event)),
        (LessonStatus::Completed, StatusTransition::Start) => pending()
            .start()
            .map_err(rejected(status, event))?
            .complete()
            .map_err(rejected(status, event))?
            .start()
            .map(|_| LessonStatus::Processing)
            .map_err(rejected(status, event)),
        (LessonStatus::Failed, StatusTransition::Start) => pending()
            .start()
            .map_err(rejected(status, event))?
            .fail()
            .map_err(rejected(status, event))?
            .start()
            .map(|_| LessonStatus::Processing)
            .map_err(rejected(status, event)),
        (LessonStatus::Processing, StatusTransition::Complete) => pending()
            .start()
            .map_err(rejected(status, event))?
            .complete()
            .map(|_| LessonStatus::Completed)
            .map_err(rejected(status, event)),
        (LessonStatus::Processing, StatusTransition::Fail) => pending()
            .start()
            .map_err(rejected(status, event))?
            .fail()
            .map(|_| LessonStatus::Failed)
            .map_err(rejected(status, event)),
        _ => Err(invalid_transition(status, event)),
    }
}

stored_object!(Lesson, "lesson", {
    title: String,
    #[serde(default)]
    video_path: Option<String>,
    #[serde(default)]
    audio_path: Option<String>,
    #[serde(default)]
    pdf_path: Option<String>,
    #[serde(default)]
    transcript: Option<String>,
    #[serde(default)]
    cleaned_transcript: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    key_takeaways: Option<String>,
    #[serde(default)]
    concepts: Option<String>,
    #[serde(default)]
    processed: bool,
    #[serde(default)]
    transcript_status: LessonStatus
});

impl Lesson {
    pub fn new(title: String) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), title)
    }

    pub fn with_id(id: String, title: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            updated_at: now,
            title,
            video_path: None,
            audio_path: None,
            pdf_path: None,
            transcript: None,
            cleaned_transcript: None,
            summary: None,
            key_takeaways: None,
            concepts: None,
            processed: false,
            transcript_status: LessonStatus::Pending,
        }
    }

    pub async fn get(id: &str, db: &SurrealDbClient) -> Result<Option<Self>, AppError> {
        Ok(db.get_item::<Self>(id).await?)
    }

    /// True when nothing has written to the lesson for longer than `limit`. Every status
    /// change and checkpoint refreshes `updated_at`.
    pub fn idle_longer_than(&self, limit: std::time::Duration) -> bool {
        Utc::now()
            .signed_duration_since(self.updated_at)
            .to_std()
            .is_ok_and(|idle| idle > limit)
    }

    /// Records a stored artifact path on the lesson field matching its kind.
    pub async fn attach_artifact(
        id: &str,
        kind: ArtifactKind,
        path: &str,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let query = format!(
            "UPDATE type::thing($table, $id) SET {field} = $path, updated_at = $now RETURN AFTER",
            field = kind.lesson_field()
        );

        let updated: Option<Self> = db
            .client
            .query(query)
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_owned()))
            .bind(("path", path.to_owned()))
            .bind(("now", SurrealDatetime::from(Utc::now())))
            .await?
            .take(0)?;

        updated.ok_or_else(|| AppError::NotFound(format!("lesson {id}")))
    }

    /// Persists the raw extracted text before any language-model work starts.
    pub async fn record_transcript(
        id: &str,
        transcript: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        const QUERY: &str = r"
            UPDATE type::thing($table, $id)
            SET transcript = $transcript,
                updated_at = $now
            RETURN NONE;
        ";

        db.client
            .query(QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_owned()))
            .bind(("transcript", transcript.to_owned()))
            .bind(("now", SurrealDatetime::from(Utc::now())))
            .await?
            .check()?;

        Ok(())
    }

    pub async fn record_knowledge(
        id: &str,
        knowledge: &LessonKnowledge,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        const QUERY: &str = r"
            UPDATE type::thing($table, $id)
            SET cleaned_transcript = $cleaned,
                summary = $summary,
                key_takeaways = $takeaways,
                concepts = $concepts,
                updated_at = $now
            RETURN NONE;
        ";

        db.client
            .query(QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_owned()))
            .bind(("cleaned", knowledge.cleaned_transcript.clone()))
            .bind(("summary", knowledge.summary.clone()))
            .bind(("takeaways", knowledge.key_takeaways.clone()))
            .bind(("concepts", knowledge.concepts_text()))
            .bind(("now", SurrealDatetime::from(Utc::now())))
            .await?
            .check()?;

        Ok(())
    }

    /// Moves the lesson into `processing` and clears `processed` so that a failed re-run
    /// never leaves a stale completed flag behind.
    pub async fn mark_processing(&self, db: &SurrealDbClient) -> Result<Self, AppError> {
        self.transition(StatusTransition::Start, false, db).await
    }

    pub async fn mark_completed(&self, db: &SurrealDbClient) -> Result<Self, AppError> {
        self.transition(StatusTransition::Complete, true, db).await
    }

    pub async fn mark_failed(&self, db: &SurrealDbClient) -> Result<Self, AppError> {
        self.transition(StatusTransition::Fail, false, db).await
    }

    async fn transition(
        &self,
        event: StatusTransition,
        processed: bool,
        db: &SurrealDbClient,
    ) -> Result<Self, AppError> {
        let next = compute_next_status(self.transcript_status, event)?;

        const TRANSITION_QUERY: &str = r"
            UPDATE type::thing($table, $id)
            SET transcript_status = $next,
                processed = $processed,
                updated_at = $now
            WHERE transcript_status = $current
            RETURN AFTER;
        ";

        let updated: Option<Self> = db
            .client
            .query(TRANSITION_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("next", next.as_str()))
            .bind(("current", self.transcript_status.as_str()))
            .bind(("processed", processed))
            .bind(("now", SurrealDatetime::from(Utc::now())))
            .await?
            .take(0)?;

        updated.ok_or_else(|| invalid_transition(self.transcript_status, event))
    }
}
