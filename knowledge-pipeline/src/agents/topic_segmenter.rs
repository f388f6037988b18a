use common::{error::AppError, utils::llm::LanguageModel};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::{ask, prompts, ANALYSIS_TEMPERATURE};

const UNTITLED_TOPIC: &str = "Untitled Topic";

/// A topical span of a lesson. Offsets are approximate character positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicSegment {
    pub title: String,
    pub summary: String,
    pub start_index: i64,
    pub end_index: i64,
}

pub async fn segment_topics(
    llm: &dyn LanguageModel,
    transcript: &str,
) -> Result<Vec<TopicSegment>, AppError> {
    let reply = ask(
        llm,
        prompts::SEGMENTER_SYSTEM_MESSAGE,
        prompts::transcript_user_message(transcript),
        ANALYSIS_TEMPERATURE,
    )
    .await?;

    Ok(parse_topic_segments(&reply))
}

/// Lenient parse of the segmenter reply. Anything that is not a JSON array yields no
/// segments; elements whose offsets cannot be read as integers are skipped.
pub fn parse_topic_segments(reply: &str) -> Vec<TopicSegment> {
    let body = strip_code_fence(reply);
    let items = match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(items)) => items,
        Ok(_) | Err(_) => {
            debug!("topic segmentation reply is not a JSON array");
            return Vec::new();
        }
    };

    items
        .iter()
        .filter_map(|item| item.as_object().and_then(segment_from_object))
        .collect()
}

fn segment_from_object(object: &Map<String, Value>) -> Option<TopicSegment> {
    let start_index = coerce_offset(object.get("start_index"))?;
    let end_index = coerce_offset(object.get("end_index"))?;

    Some(TopicSegment {
        title: object
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or(UNTITLED_TOPIC)
            .to_string(),
        summary: object
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        start_index,
        end_index,
    })
}

/// Missing offsets count as zero; `None` means the value cannot be read as an integer.
#[allow(clippy::cast_possible_truncation)]
fn coerce_offset(value: Option<&Value>) -> Option<i64> {
    match value {
        None | Some(Value::Null) => Some(0),
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float.trunc() as i64)),
        Some(Value::String(text)) => text.trim().parse().ok(),
        Some(Value::Bool(flag)) => Some(i64::from(*flag)),
        Some(Value::Array(_) | Value::Object(_)) => None,
    }
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
