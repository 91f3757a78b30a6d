//! Ad detection: marker types, LLM classifier, and heuristic roll detection.

pub mod classifier;
pub mod patterns;
pub mod roll;

use crate::validate::Validation;
use serde::{Deserialize, Serialize};

/// Which stage of the pipeline produced a marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStage {
    FirstPass,
    HeuristicPreroll,
    HeuristicPostroll,
    Verification,
}

/// Pass attribution after fusing two blind LLM reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionPass {
    First,
    Second,
    Merged,
}

/// A detected advertisement, in original-audio seconds.
///
/// Invariant after validation: `0 <= start < end <= episode_duration`, and
/// markers in a validated list are ordered and non-overlapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdMarker {
    pub start: f64,
    pub end: f64,
    pub confidence: f64,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sponsor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_text: Option<String>,
    pub detection_stage: DetectionStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass: Option<DetectionPass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
}

impl AdMarker {
    pub fn new(start: f64, end: f64, confidence: f64, reason: &str, stage: DetectionStage) -> Self {
        Self {
            start,
            end,
            confidence,
            reason: reason.to_string(),
            sponsor: None,
            end_text: None,
            detection_stage: stage,
            pass: None,
            validation: None,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Seconds of overlap with another marker (0 if disjoint).
    pub fn overlap_secs(&self, other: &AdMarker) -> f64 {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (end - start).max(0.0)
    }

    /// Overlap as a fraction of the shorter marker.
    pub fn overlap_of_shorter(&self, other: &AdMarker) -> f64 {
        let shorter = self.duration().min(other.duration());
        if shorter <= 0.0 {
            return 0.0;
        }
        self.overlap_secs(other) / shorter
    }
}

/// Fraction of `[start, end]` covered by existing markers.
pub fn region_coverage(start: f64, end: f64, ads: &[AdMarker]) -> f64 {
    let region = end - start;
    if region <= 0.0 {
        return 1.0;
    }
    let mut covered = 0.0;
    for ad in ads {
        let lo = start.max(ad.start);
        let hi = end.min(ad.end);
        if hi > lo {
            covered += hi - lo;
        }
    }
    covered / region
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(start: f64, end: f64) -> AdMarker {
        AdMarker::new(start, end, 0.9, "test", DetectionStage::FirstPass)
    }

    #[test]
    fn test_overlap_secs() {
        assert_eq!(marker(0.0, 10.0).overlap_secs(&marker(5.0, 15.0)), 5.0);
        assert_eq!(marker(0.0, 10.0).overlap_secs(&marker(20.0, 30.0)), 0.0);
    }

    #[test]
    fn test_overlap_of_shorter() {
        // 5s overlap, shorter marker is 5s long -> fully overlapped
        assert_eq!(marker(0.0, 10.0).overlap_of_shorter(&marker(5.0, 10.0)), 1.0);
        assert_eq!(marker(0.0, 10.0).overlap_of_shorter(&marker(5.0, 25.0)), 0.5);
    }

    #[test]
    fn test_region_coverage() {
        let ads = vec![marker(0.0, 30.0), marker(40.0, 50.0)];
        let coverage = region_coverage(0.0, 100.0, &ads);
        assert!((coverage - 0.4).abs() < 1e-9);
        // Degenerate region counts as fully covered
        assert_eq!(region_coverage(10.0, 10.0, &ads), 1.0);
    }

    #[test]
    fn test_marker_serialization_stage_names() {
        let mut m = marker(1.0, 20.0);
        m.detection_stage = DetectionStage::HeuristicPreroll;
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"heuristic_preroll\""));
        assert!(!json.contains("sponsor"));
    }
}
