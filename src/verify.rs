//! Verification pass over already-edited audio.
//!
//! After pass-1 cuts are spliced, the processed audio is re-transcribed and
//! classified again with a "what does not belong" prompt. Proposed markers
//! come back in processed-audio time; this module maps them to
//! original-audio time using the pass-1 cut list and returns both
//! coordinate sets.

use crate::detect::classifier::{AdClassifier, DetectionStatus};
use crate::detect::{AdMarker, DetectionStage};
use crate::error::Result;
use crate::transcribe::{TranscriptSegment, TranscriptionBackend};
use crate::util::time::Cut;
use std::path::Path;
use tracing::{info, warn};

/// Outcome status of one verification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    /// No leftover ads found
    Clean,
    /// Missed ads found; both coordinate sets populated
    FoundAds,
    /// Re-transcription produced nothing to verify
    NoSegments,
}

/// Result of the verification pass.
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    /// Markers in original-audio coordinates (persisted, shown in UI)
    pub ads_original: Vec<AdMarker>,
    /// Markers in processed-audio coordinates
    pub ads_processed: Vec<AdMarker>,
    /// Segments from the re-transcription
    pub segments: Vec<TranscriptSegment>,
    pub status: VerificationStatus,
    /// Raw prompt/response artifacts for persistence
    pub prompt: String,
    pub raw_response: String,
}

/// Map a processed-audio timestamp back to original-audio time.
///
/// Walks the sorted pass-1 cuts accumulating removed duration: a cut that
/// started at or before the current original-timeline position shifts the
/// processed time forward by its duration.
pub fn map_to_original(processed_time: f64, cuts: &[Cut]) -> f64 {
    let mut sorted: Vec<Cut> = cuts.iter().filter(|c| c.duration() > 0.0).copied().collect();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut offset = 0.0;
    for cut in &sorted {
        // In the processed timeline this cut collapses to cut.start - offset
        if processed_time >= cut.start - offset {
            offset += cut.duration();
        } else {
            break;
        }
    }
    processed_time + offset
}

/// Run the verification pass on processed audio.
///
/// `pass1_cuts` are the spans removed in pass 1, in original coordinates;
/// with no cuts the two coordinate sets are identical.
pub async fn run_verification(
    transcriber: &dyn TranscriptionBackend,
    classifier: &AdClassifier,
    processed_audio: &Path,
    podcast_name: &str,
    episode_title: &str,
    description: Option<&str>,
    pass1_cuts: &[Cut],
) -> Result<VerificationOutcome> {
    info!("Verification: re-transcribing processed audio");
    let segments = transcriber.transcribe(processed_audio).await?;

    if segments.is_empty() {
        warn!("Verification: no segments from re-transcription");
        return Ok(VerificationOutcome {
            ads_original: Vec::new(),
            ads_processed: Vec::new(),
            segments,
            status: VerificationStatus::NoSegments,
            prompt: String::new(),
            raw_response: String::new(),
        });
    }
    info!("Verification: {} segments from re-transcription", segments.len());

    let outcome = classifier
        .detect_verification(&segments, podcast_name, episode_title, description)
        .await;
    if outcome.status == DetectionStatus::Failed {
        return Err(crate::error::PodscrubError::DetectionError(
            outcome.error.unwrap_or_else(|| "verification detection failed".to_string()),
        ));
    }

    let mut ads_processed = outcome.ads;
    for ad in &mut ads_processed {
        ad.detection_stage = DetectionStage::Verification;
    }

    if ads_processed.is_empty() {
        return Ok(VerificationOutcome {
            ads_original: Vec::new(),
            ads_processed,
            segments,
            status: VerificationStatus::Clean,
            prompt: outcome.prompt,
            raw_response: outcome.raw_response,
        });
    }

    let ads_original: Vec<AdMarker> = ads_processed
        .iter()
        .map(|ad| {
            let mut mapped = ad.clone();
            mapped.start = map_to_original(ad.start, pass1_cuts);
            mapped.end = map_to_original(ad.end, pass1_cuts);
            mapped
        })
        .collect();

    info!(
        "Verification found {} missed ad(s), mapped through {} pass-1 cut(s)",
        ads_processed.len(),
        pass1_cuts.len()
    );

    Ok(VerificationOutcome {
        ads_original,
        ads_processed,
        segments,
        status: VerificationStatus::FoundAds,
        prompt: outcome.prompt,
        raw_response: outcome.raw_response,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::time::adjust_timestamp;

    #[test]
    fn test_map_identity_without_cuts() {
        assert_eq!(map_to_original(120.0, &[]), 120.0);
    }

    #[test]
    fn test_map_after_single_cut() {
        // S6: pass-1 cut [100, 160]; processed 200 -> original 260
        let cuts = [Cut::new(100.0, 160.0)];
        assert_eq!(map_to_original(200.0, &cuts), 260.0);
        assert_eq!(map_to_original(230.0, &cuts), 290.0);
    }

    #[test]
    fn test_map_before_cut_unchanged() {
        let cuts = [Cut::new(100.0, 160.0)];
        assert_eq!(map_to_original(50.0, &cuts), 50.0);
    }

    #[test]
    fn test_map_through_multiple_cuts() {
        let cuts = [Cut::new(10.0, 20.0), Cut::new(50.0, 80.0)];
        // 0..10 unchanged
        assert_eq!(map_to_original(5.0, &cuts), 5.0);
        // After first cut: +10
        assert_eq!(map_to_original(15.0, &cuts), 25.0);
        // After both cuts: processed 40 was original 80 (40 + 10 + 30)
        assert_eq!(map_to_original(45.0, &cuts), 85.0);
    }

    #[test]
    fn test_map_ignores_degenerate_cuts() {
        let cuts = [Cut::new(50.0, 50.0), Cut::new(100.0, 160.0)];
        assert_eq!(map_to_original(120.0, &cuts), 180.0);
    }

    #[test]
    fn test_round_trip_outside_cuts() {
        let cuts = [
            Cut::new(30.0, 90.0),
            Cut::new(200.0, 260.0),
            Cut::new(500.0, 530.0),
        ];
        for t in [0.0, 10.0, 29.9, 95.0, 150.0, 300.0, 499.0, 600.0, 1200.0] {
            let processed = adjust_timestamp(t, &cuts);
            let back = map_to_original(processed, &cuts);
            assert!(
                (back - t).abs() < 1e-9,
                "round trip failed for {t}: processed={processed}, back={back}"
            );
        }
    }

    #[test]
    fn test_map_monotone() {
        let cuts = [Cut::new(30.0, 90.0), Cut::new(200.0, 260.0)];
        let mut last = f64::NEG_INFINITY;
        for i in 0..500 {
            let t = i as f64;
            let mapped = map_to_original(t, &cuts);
            assert!(mapped >= last);
            last = mapped;
        }
    }
}
