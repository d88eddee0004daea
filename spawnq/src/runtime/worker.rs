use serde::{Deserialize, Serialize};

use crate::band::{PriorityBand, ScoreRange};

/// Configuration for individual dispatcher workers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Identifier prefix for the workers of one pool.
    pub worker_id: String,
    /// Sleep when the queue has nothing in range, in milliseconds.
    pub poll_interval_ms: u64,
    /// Sleep after an ordered store failure, in milliseconds.
    pub backoff_ms: u64,
    /// Lowest score this worker dequeues. `None` is unbounded.
    pub min_score: Option<f64>,
    /// Highest score this worker dequeues. `None` is unbounded.
    pub max_score: Option<f64>,
}

impl WorkerConfig {
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Self::default()
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_backoff(mut self, ms: u64) -> Self {
        self.backoff_ms = ms;
        self
    }

    /// Restrict the worker to `range`.
    pub fn with_range(mut self, range: ScoreRange) -> Self {
        self.min_score = range.min.is_finite().then_some(range.min);
        self.max_score = range.max.is_finite().then_some(range.max);
        self
    }

    /// Restrict the worker to bands up to and including `lowest`.
    pub fn through_band(self, lowest: PriorityBand) -> Self {
        self.with_range(ScoreRange::through(lowest))
    }

    pub fn score_range(&self) -> ScoreRange {
        ScoreRange::new(
            self.min_score.unwrap_or(f64::NEG_INFINITY),
            self.max_score.unwrap_or(f64::INFINITY),
        )
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: "spawnq-worker".to_string(),
            poll_interval_ms: 50,
            backoff_ms: 500,
            min_score: None,
            max_score: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_range_is_unbounded() {
        let range = WorkerConfig::default().score_range();
        assert_eq!(range.min, f64::NEG_INFINITY);
        assert_eq!(range.max, f64::INFINITY);
    }

    #[test]
    fn test_band_restriction_survives_serde() {
        let config = WorkerConfig::new("w").through_band(PriorityBand::Medium);
        let json = serde_json::to_string(&config).unwrap();
        let back: WorkerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.score_range(), ScoreRange::through(PriorityBand::Medium));
    }
}
