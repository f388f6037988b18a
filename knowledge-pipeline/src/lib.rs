#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod agents;
pub mod answer;
pub mod chunking;
pub mod extraction;
pub mod pipeline;
pub mod queue;
pub mod vector_index;

pub use answer::{answer_question, Answer};
pub use pipeline::{KnowledgePipeline, PipelineConfig, PipelineOutcome, PipelineTuning};
pub use queue::{submit_lesson_upload, LessonJob, PipelineQueue};
pub use vector_index::LessonVectorIndex;
