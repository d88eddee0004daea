use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Width of the score interval owned by a single band.
pub const BAND_WIDTH: f64 = 1.0;

/// Divisor that maps epoch milliseconds into `[0, 1)` until roughly 2286.
const TIEBREAK_SCALE_MS: f64 = 1e13;

/// Priority bands mapped onto the queue's score axis.
///
/// Lower score means higher priority: `High` entries always sort (and
/// dequeue) before `Medium`, which sort before `Low`.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PriorityBand {
    High,
    #[default]
    Medium,
    Low,
}

impl PriorityBand {
    pub const ALL: [PriorityBand; 3] = [Self::High, Self::Medium, Self::Low];

    /// Base score of the band.
    pub fn score(self) -> f64 {
        match self {
            PriorityBand::High => 1.0,
            PriorityBand::Medium => 2.0,
            PriorityBand::Low => 3.0,
        }
    }

    /// Score for an entry enqueued at `at`.
    ///
    /// The insertion time is folded into the fractional part so entries in the
    /// same band dequeue oldest first, while never crossing into the next band.
    pub fn score_at(self, at: DateTime<Utc>) -> f64 {
        let millis = at.timestamp_millis().max(0) as f64;
        let offset = (millis / TIEBREAK_SCALE_MS).min(BAND_WIDTH - f64::EPSILON);
        self.score() + offset
    }

    /// Inclusive score range covering every entry of this band.
    pub fn range(self) -> ScoreRange {
        ScoreRange::new(self.score(), self.score() + BAND_WIDTH - f64::EPSILON * 4.0)
    }

    /// Band owning `score`, if any.
    pub fn from_score(score: f64) -> Option<Self> {
        Self::ALL.into_iter().find(|band| band.range().contains(score))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PriorityBand::High => "high",
            PriorityBand::Medium => "medium",
            PriorityBand::Low => "low",
        }
    }
}

impl Display for PriorityBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriorityBand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(PriorityBand::High),
            "medium" => Ok(PriorityBand::Medium),
            "low" => Ok(PriorityBand::Low),
            other => Err(format!("unknown priority band: {other}")),
        }
    }
}

/// Inclusive `[min, max]` score interval used for range reads and pops.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreRange {
    pub min: f64,
    pub max: f64,
}

impl ScoreRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Unbounded range, `(-inf, +inf)`.
    pub fn all() -> Self {
        Self::new(f64::NEG_INFINITY, f64::INFINITY)
    }

    /// Every band from `High` down to and including `lowest`.
    pub fn through(lowest: PriorityBand) -> Self {
        Self::new(PriorityBand::High.score(), lowest.range().max)
    }

    pub fn contains(&self, score: f64) -> bool {
        score >= self.min && score <= self.max
    }

    pub fn is_empty(&self) -> bool {
        self.min.is_nan() || self.max.is_nan() || self.min > self.max
    }
}

impl Default for ScoreRange {
    fn default() -> Self {
        Self::all()
    }
}

impl From<PriorityBand> for ScoreRange {
    fn from(band: PriorityBand) -> Self {
        band.range()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bands_are_ordered_by_score() {
        assert!(PriorityBand::High.score() < PriorityBand::Medium.score());
        assert!(PriorityBand::Medium.score() < PriorityBand::Low.score());
    }

    #[test]
    fn test_score_at_stays_inside_band() {
        let now = Utc::now();
        for band in PriorityBand::ALL {
            let score = band.score_at(now);
            assert!(band.range().contains(score), "{band} score {score}");
            assert_eq!(PriorityBand::from_score(score), Some(band));
        }
    }

    #[test]
    fn test_score_at_orders_by_insertion_time() {
        let earlier = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap();
        assert!(
            PriorityBand::Low.score_at(earlier) < PriorityBand::Low.score_at(later)
        );
        assert!(
            PriorityBand::High.score_at(later) < PriorityBand::Medium.score_at(earlier)
        );
    }

    #[test]
    fn test_through_covers_higher_bands() {
        let range = ScoreRange::through(PriorityBand::Medium);
        assert!(range.contains(PriorityBand::High.score()));
        assert!(range.contains(PriorityBand::Medium.score_at(Utc::now())));
        assert!(!range.contains(PriorityBand::Low.score()));
    }

    #[test]
    fn test_parse_band() {
        assert_eq!("HIGH".parse::<PriorityBand>().unwrap(), PriorityBand::High);
        assert_eq!(" low ".parse::<PriorityBand>().unwrap(), PriorityBand::Low);
        assert!("urgent".parse::<PriorityBand>().is_err());
    }

    #[test]
    fn test_empty_range() {
        assert!(ScoreRange::new(5.0, 1.0).is_empty());
        assert!(!ScoreRange::all().is_empty());
    }
}
