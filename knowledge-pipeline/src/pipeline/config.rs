use std::time::Duration;

use common::utils::config::AppConfig;

use crate::chunking::DEFAULT_MAX_CHARS;

/// Timed calls a run makes between two writes to its lesson: extract, then clean,
/// summarize and segment, then purge and index.
const TIMED_CALLS_BETWEEN_WRITES: u32 = 6;

#[derive(Debug, Clone)]
pub struct PipelineTuning {
    pub chunk_max_chars: usize,
    pub stage_timeout_secs: u64,
    pub segment_topics: bool,
}

impl Default for PipelineTuning {
    fn default() -> Self {
        Self {
            chunk_max_chars: DEFAULT_MAX_CHARS,
            stage_timeout_secs: 300,
            segment_topics: false,
        }
    }
}

impl PipelineTuning {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    /// A lesson left in `processing` without any write for this long belongs to a run
    /// that died. Anything younger is still owned by a live run, possibly in another
    /// process.
    pub fn stale_run_after(&self) -> Duration {
        self.stage_timeout()
            .saturating_mul(TIMED_CALLS_BETWEEN_WRITES)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub tuning: PipelineTuning,
}

impl PipelineConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            tuning: PipelineTuning {
                chunk_max_chars: config.chunk_max_chars,
                stage_timeout_secs: config.stage_timeout_secs,
                segment_topics: config.segment_topics,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_threshold_scales_with_stage_timeout() {
        let tuning = PipelineTuning {
            stage_timeout_secs: 10,
            ..PipelineTuning::default()
        };
        assert_eq!(tuning.stale_run_after(), Duration::from_secs(60));

        let saturated = PipelineTuning {
            stage_timeout_secs: u64::MAX,
            ..PipelineTuning::default()
        };
        assert_eq!(saturated.stale_run_after(), Duration::MAX);
    }
}
