use std::{path::Path, sync::Arc};

use async_openai::{
    config::OpenAIConfig,
    types::{AudioResponseFormat, CreateTranscriptionRequestArgs},
    Client,
};
use async_trait::async_trait;
use common::error::AppError;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const EVENT_BUFFER: usize = 32;

/// Signals emitted by a recognition session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// A final recognized segment.
    Recognized(String),
    SessionStopped,
    Canceled(String),
}

/// Continuous speech recognition over a whole audio or video file.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Runs a session over `path`, publishing events until the session ends. A closed
    /// channel means nobody is listening any more and is not an error.
    async fn recognize(
        &self,
        path: &Path,
        events: mpsc::Sender<RecognitionEvent>,
    ) -> Result<(), AppError>;
}

/// Collects every recognized segment, joined with single spaces, until the session stops
/// or is canceled.
pub async fn transcribe(recognizer: &dyn SpeechRecognizer, path: &Path) -> Result<String, AppError> {
    let (sender, mut receiver) = mpsc::channel(EVENT_BUFFER);

    let collect = async move {
        let mut segments: Vec<String> = Vec::new();
        while let Some(event) = receiver.recv().await {
            match event {
                RecognitionEvent::Recognized(text) => {
                    let text = text.trim();
                    if !text.is_empty() {
                        segments.push(text.to_string());
                    }
                }
                RecognitionEvent::SessionStopped => break,
                RecognitionEvent::Canceled(reason) => {
                    warn!(%reason, "speech recognition canceled");
                    break;
                }
            }
        }
        segments
    };

    let (session, segments) = tokio::join!(recognizer.recognize(path, sender), collect);
    session?;

    debug!(segments = segments.len(), "speech recognition finished");
    Ok(segments.join(" "))
}

/// Recognizer backed by the OpenAI transcription endpoint. The file is sent whole and the
/// reply arrives as one recognized segment.
pub struct WhisperRecognizer {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
    language: Option<String>,
}

impl WhisperRecognizer {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: String, language: Option<String>) -> Self {
        Self {
            client,
            model,
            language,
        }
    }
}

#[async_trait]
impl SpeechRecognizer for WhisperRecognizer {
    async fn recognize(
        &self,
        path: &Path,
        events: mpsc::Sender<RecognitionEvent>,
    ) -> Result<(), AppError> {
        let mut args = CreateTranscriptionRequestArgs::default();
        args.file(path)
            .model(&self.model)
            .response_format(AudioResponseFormat::Json);
        if let Some(language) = &self.language {
            args.language(language);
        }
        let request = args.build()?;

        match self.client.audio().transcribe(request).await {
            Ok(response) => {
                // Send failures only mean the listener has already gone away.
                let _ = events
                    .send(RecognitionEvent::Recognized(response.text))
                    .await;
                let _ = events.send(RecognitionEvent::SessionStopped).await;
                Ok(())
            }
            Err(err) => {
                let _ = events
                    .send(RecognitionEvent::Canceled(err.to_string()))
                    .await;
                Err(AppError::Processing(format!("Audio transcription failed: {err}")))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Replays a fixed list of events, optionally failing afterwards.
    pub(crate) struct ScriptedRecognizer {
        pub events: Vec<RecognitionEvent>,
        pub fail: bool,
    }

    #[async_trait]
    impl SpeechRecognizer for ScriptedRecognizer {
        async fn recognize(
            &self,
            _path: &Path,
            events: mpsc::Sender<RecognitionEvent>,
        ) -> Result<(), AppError> {
            for event in &self.events {
                if events.send(event.clone()).await.is_err() {
                    break;
                }
            }
            if self.fail {
                return Err(AppError::Processing("recognizer unavailable".into()));
            }
            Ok(())
        }
    }

    fn recognized(text: &str) -> RecognitionEvent {
        RecognitionEvent::Recognized(text.to_string())
    }

    #[tokio::test]
    async fn segments_are_joined_until_session_stops() {
        let recognizer = ScriptedRecognizer {
            events: vec![
                recognized("Hello"),
                recognized(" "),
                recognized("world"),
                RecognitionEvent::SessionStopped,
                recognized("ignored"),
            ],
            fail: false,
        };

        let text = transcribe(&recognizer, Path::new("lecture.wav"))
            .await
            .expect("transcribe");
        assert_eq!(text, "Hello world");
    }

    #[tokio::test]
    async fn cancellation_keeps_earlier_segments() {
        let recognizer = ScriptedRecognizer {
            events: vec![
                recognized("Partial"),
                RecognitionEvent::Canceled("network".into()),
            ],
            fail: false,
        };

        let text = transcribe(&recognizer, Path::new("lecture.wav"))
            .await
            .expect("transcribe");
        assert_eq!(text, "Partial");
    }

    #[tokio::test]
    async fn long_sessions_do_not_block_on_the_buffer() {
        let mut events: Vec<RecognitionEvent> = (0..EVENT_BUFFER * 3)
            .map(|i| recognized(&format!("w{i}")))
            .collect();
        events.push(RecognitionEvent::SessionStopped);
        let recognizer = ScriptedRecognizer {
            events,
            fail: false,
        };

        let text = transcribe(&recognizer, Path::new("lecture.wav"))
            .await
            .expect("transcribe");
        assert_eq!(text.split(' ').count(), EVENT_BUFFER * 3);
    }

    #[tokio::test]
    async fn recognizer_failure_propagates() {
        let recognizer = ScriptedRecognizer {
            events: Vec::new(),
            fail: true,
        };
        let result = transcribe(&recognizer, Path::new("lecture.wav")).await;
        assert!(matches!(result, Err(AppError::Processing(_))));
    }
}
