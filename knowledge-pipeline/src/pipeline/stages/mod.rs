use std::{future::Future, time::Duration};

use common::{
    error::AppError,
    storage::types::{
        lesson::{Lesson, LessonKnowledge},
        lesson_chunk::LessonChunk,
    },
};
use state_machines::core::GuardError;
use tracing::{debug, info, instrument, warn};

use super::{
    context::PipelineContext,
    state::{Chunked, Enriched, Extracted, Indexed, KnowledgeMachine, Ready},
};
use crate::chunking::chunk_text;

#[instrument(
    level = "trace",
    skip_all,
    fields(lesson_id = %ctx.lesson_id, artifact_path = ctx.artifact_path)
)]
pub async fn extract(
    machine: KnowledgeMachine<(), Ready>,
    ctx: &mut PipelineContext<'_>,
) -> Result<KnowledgeMachine<(), Extracted>, AppError> {
    let limit = ctx.pipeline_config.tuning.stage_timeout();
    let extracted = with_timeout(
        "extract",
        limit,
        ctx.services.extract_text(ctx.artifact_path),
    )
    .await?;

    let transcript = extracted.trim();
    if transcript.is_empty() {
        return Err(AppError::EmptyContent(format!(
            "no text could be extracted from {}",
            ctx.artifact_path
        )));
    }

    Lesson::record_transcript(&ctx.lesson_id, transcript, ctx.db).await?;

    info!(
        lesson_id = %ctx.lesson_id,
        title = %ctx.lesson.title,
        transcript_chars = transcript.chars().count(),
        "lesson transcript ready"
    );
    ctx.transcript = Some(transcript.to_owned());

    machine
        .extract()
        .map_err(|(_, guard)| map_guard_error("extract", &guard))
}

#[instrument(level = "trace", skip_all, fields(lesson_id = %ctx.lesson_id))]
pub async fn enrich(
    machine: KnowledgeMachine<(), Extracted>,
    ctx: &mut PipelineContext<'_>,
) -> Result<KnowledgeMachine<(), Enriched>, AppError> {
    let limit = ctx.pipeline_config.tuning.stage_timeout();
    let transcript = ctx.transcript()?.to_owned();

    let cleaned = with_timeout("clean", limit, ctx.services.clean_transcript(&transcript)).await?;
    let source = if cleaned.trim().is_empty() {
        transcript.as_str()
    } else {
        cleaned.as_str()
    };

    let (summary, concepts) = with_timeout("summarize", limit, async {
        tokio::try_join!(
            ctx.services.summarize(source),
            ctx.services.extract_concepts(source)
        )
    })
    .await?;

    if ctx.pipeline_config.tuning.segment_topics {
        match with_timeout("segment", limit, ctx.services.segment_topics(source)).await {
            Ok(segments) => info!(
                lesson_id = %ctx.lesson_id,
                segment_count = segments.len(),
                "lesson topics segmented"
            ),
            Err(err) => warn!(
                lesson_id = %ctx.lesson_id,
                error = %err,
                "topic segmentation failed; continuing without segments"
            ),
        }
    }

    let knowledge = LessonKnowledge {
        cleaned_transcript: cleaned,
        summary: summary.summary,
        key_takeaways: summary.key_takeaways,
        concepts,
    };
    Lesson::record_knowledge(&ctx.lesson_id, &knowledge, ctx.db).await?;

    debug!(
        lesson_id = %ctx.lesson_id,
        cleaned_chars = knowledge.cleaned_transcript.chars().count(),
        summary_chars = knowledge.summary.chars().count(),
        concept_count = knowledge.concepts.len(),
        "lesson knowledge recorded"
    );
    ctx.knowledge = Some(knowledge);

    machine
        .enrich()
        .map_err(|(_, guard)| map_guard_error("enrich", &guard))
}

#[instrument(level = "trace", skip_all, fields(lesson_id = %ctx.lesson_id))]
pub async fn chunk(
    machine: KnowledgeMachine<(), Enriched>,
    ctx: &mut PipelineContext<'_>,
) -> Result<KnowledgeMachine<(), Chunked>, AppError> {
    let max_chars = ctx.pipeline_config.tuning.chunk_max_chars;
    let chunks = chunk_text(ctx.working_text()?, max_chars);

    debug!(
        lesson_id = %ctx.lesson_id,
        chunk_count = chunks.len(),
        max_chars,
        "lesson text chunked"
    );
    ctx.chunks = chunks;

    machine
        .chunk()
        .map_err(|(_, guard)| map_guard_error("chunk", &guard))
}

/// Replaces the lesson's stored chunks and vectors with the fresh set, so a re-run that
/// yields fewer chunks leaves no stale rows behind.
#[instrument(level = "trace", skip_all, fields(lesson_id = %ctx.lesson_id))]
pub async fn index(
    machine: KnowledgeMachine<(), Chunked>,
    ctx: &mut PipelineContext<'_>,
) -> Result<KnowledgeMachine<(), Indexed>, AppError> {
    let limit = ctx.pipeline_config.tuning.stage_timeout();

    with_timeout("index", limit, ctx.services.purge_index(&ctx.lesson_id)).await?;
    LessonChunk::delete_for_lesson(&ctx.lesson_id, ctx.db).await?;

    let chunk_ids = with_timeout(
        "index",
        limit,
        ctx.services.index_chunks(&ctx.lesson_id, &ctx.chunks),
    )
    .await?;
    if chunk_ids.len() != ctx.chunks.len() {
        return Err(AppError::InternalError(format!(
            "vector index returned {} ids for {} chunks",
            chunk_ids.len(),
            ctx.chunks.len()
        )));
    }

    let mut rows = Vec::with_capacity(chunk_ids.len());
    for (position, (chunk_id, content)) in chunk_ids.iter().zip(&ctx.chunks).enumerate() {
        let chunk_index = u32::try_from(position)
            .map_err(|_| AppError::Validation("too many chunks for one lesson".into()))?;
        let mut row = LessonChunk::new(ctx.lesson_id.clone(), chunk_index, content.clone());
        row.id.clone_from(chunk_id);
        rows.push(row);
    }
    LessonChunk::store_all(rows, ctx.db).await?;

    debug!(
        lesson_id = %ctx.lesson_id,
        chunk_count = chunk_ids.len(),
        "lesson chunks persisted"
    );
    ctx.chunk_ids = chunk_ids;

    machine
        .index()
        .map_err(|(_, guard)| map_guard_error("index", &guard))
}

async fn with_timeout<T, F>(stage: &'static str, limit: Duration, work: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::time::timeout(limit, work)
        .await
        .map_err(|_| AppError::Timeout {
            stage,
            secs: limit.as_secs(),
        })?
}

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!(
        "invalid knowledge pipeline transition during {event}: {guard:?}"
    ))
}
