//! Turns a stored lesson artifact into plain text.

mod document;
pub mod transcription;

pub use document::extract_document_text;
pub use transcription::{transcribe, RecognitionEvent, SpeechRecognizer, WhisperRecognizer};

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use common::{error::AppError, storage::types::lesson::ArtifactKind};
use tracing::{info, warn};

pub struct TextExtractor {
    recognizer: Arc<dyn SpeechRecognizer>,
    data_dir: PathBuf,
}

impl TextExtractor {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            recognizer,
            data_dir: data_dir.into(),
        }
    }

    /// Relative artifact paths are looked up under the data directory first and then
    /// relative to the working directory.
    pub fn resolve_path(&self, artifact_path: &str) -> PathBuf {
        let path = Path::new(artifact_path);
        if path.is_absolute() {
            return path.to_path_buf();
        }

        let under_data_dir = self.data_dir.join(path);
        if under_data_dir.exists() {
            under_data_dir
        } else {
            path.to_path_buf()
        }
    }

    /// Extracts text for the artifact, degrading every failure to an empty string so the
    /// caller can treat "nothing extracted" uniformly.
    pub async fn extract(&self, artifact_path: &str) -> String {
        match self.try_extract(artifact_path).await {
            Ok(text) => text,
            Err(err) => {
                warn!(artifact_path, error = %err, "text extraction failed");
                String::new()
            }
        }
    }

    pub async fn try_extract(&self, artifact_path: &str) -> Result<String, AppError> {
        let path = self.resolve_path(artifact_path);
        let kind = ArtifactKind::detect(&path);

        let text = match kind {
            ArtifactKind::Document => extract_document_text(&path).await?,
            ArtifactKind::Audio | ArtifactKind::Video => {
                transcribe(self.recognizer.as_ref(), &path).await?
            }
        };

        info!(
            artifact_path,
            kind = kind.as_str(),
            text_chars = text.chars().count(),
            "artifact text extracted"
        );
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{document::tests::blank_page_pdf, transcription::tests::ScriptedRecognizer, *};

    fn extractor(data_dir: &Path, events: Vec<RecognitionEvent>, fail: bool) -> TextExtractor {
        TextExtractor::new(Arc::new(ScriptedRecognizer { events, fail }), data_dir)
    }

    #[tokio::test]
    async fn audio_goes_through_the_recognizer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let extractor = extractor(
            dir.path(),
            vec![
                RecognitionEvent::Recognized("Cells divide".into()),
                RecognitionEvent::Recognized("by mitosis".into()),
                RecognitionEvent::SessionStopped,
            ],
            false,
        );

        let text = extractor.extract("uploads/audio/lecture.mp3").await;
        assert_eq!(text, "Cells divide by mitosis");
    }

    #[tokio::test]
    async fn failures_degrade_to_empty_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let extractor = extractor(dir.path(), Vec::new(), true);

        assert_eq!(extractor.extract("uploads/videos/lecture.mp4").await, "");
        assert_eq!(extractor.extract("uploads/pdfs/missing.pdf").await, "");
    }

    #[tokio::test]
    async fn pdf_without_text_layer_extracts_to_empty_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pdfs = dir.path().join("uploads/pdfs");
        tokio::fs::create_dir_all(&pdfs).await.expect("mkdir");
        tokio::fs::write(pdfs.join("scan.pdf"), blank_page_pdf())
            .await
            .expect("write pdf");
        let extractor = extractor(dir.path(), Vec::new(), true);

        assert_eq!(
            extractor
                .try_extract("uploads/pdfs/scan.pdf")
                .await
                .expect("no text is not an error"),
            ""
        );
        assert_eq!(extractor.extract("uploads/pdfs/scan.pdf").await, "");
    }

    #[tokio::test]
    async fn relative_paths_prefer_the_data_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("uploads");
        tokio::fs::create_dir_all(&nested).await.expect("mkdir");
        tokio::fs::write(nested.join("slides.pdf"), b"%PDF")
            .await
            .expect("write");
        let extractor = extractor(dir.path(), Vec::new(), false);

        assert_eq!(
            extractor.resolve_path("uploads/slides.pdf"),
            dir.path().join("uploads/slides.pdf")
        );
        assert_eq!(
            extractor.resolve_path("elsewhere/slides.pdf"),
            PathBuf::from("elsewhere/slides.pdf")
        );
        let absolute = dir.path().join("x.pdf");
        assert_eq!(
            extractor.resolve_path(absolute.to_str().expect("utf8 path")),
            absolute
        );
    }
}
