//! Heuristic pre-roll and post-roll ad detection.
//!
//! Runs after LLM detection, before validation. Finds ad content before the
//! show intro (pre-roll) or after the sign-off (post-roll) using fixed regex
//! families, and only emits markers for regions not already covered by
//! existing ads. Compensates for LLM nondeterminism at window boundaries.

use crate::detect::patterns::{SHOW_START_PATTERNS, SIGNOFF_PATTERNS, count_ad_indicators};
use crate::detect::{AdMarker, DetectionStage, region_coverage};
use crate::transcribe::TranscriptSegment;
use crate::util::text::text_overlapping;
use tracing::info;

/// Distinct ad-indicator families required to flag a roll region.
pub const MIN_AD_PATTERN_MATCHES: usize = 2;
/// How far into the episode a pre-roll may extend, seconds.
pub const MAX_PREROLL_DURATION: f64 = 120.0;
/// How far back from the end a post-roll may start, seconds.
pub const MAX_POSTROLL_DURATION: f64 = 120.0;

/// Existing-coverage fraction above which a region is left alone.
const COVERAGE_THRESHOLD: f64 = 0.5;
/// Regions shorter than this are noise, not rolls.
const MIN_ROLL_REGION: f64 = 5.0;

fn roll_confidence(match_count: usize) -> f64 {
    (0.7 + match_count as f64 * 0.05).min(0.95)
}

/// Detect a pre-roll ad block before the show intro.
///
/// Scans forward for the first show-start phrase; if the region before it
/// matches at least [`MIN_AD_PATTERN_MATCHES`] distinct ad indicators and is
/// not already covered by existing ads, emits a marker spanning
/// `[episode_start, show_start)`.
pub fn detect_preroll(
    segments: &[TranscriptSegment],
    existing_ads: &[AdMarker],
) -> Option<AdMarker> {
    let first = segments.first()?;
    let episode_start = first.start;
    let max_search_end = episode_start + MAX_PREROLL_DURATION;

    let show_start_time = segments
        .iter()
        .take_while(|seg| seg.start <= max_search_end)
        .find(|seg| SHOW_START_PATTERNS.iter().any(|p| p.is_match(&seg.text)))
        .map(|seg| seg.start)?;

    if show_start_time <= episode_start + MIN_ROLL_REGION {
        return None;
    }

    if region_coverage(episode_start, show_start_time, existing_ads) > COVERAGE_THRESHOLD {
        return None;
    }

    let preroll_text = text_overlapping(segments, episode_start, show_start_time);
    let match_count = count_ad_indicators(&preroll_text);
    if match_count < MIN_AD_PATTERN_MATCHES {
        return None;
    }

    let confidence = roll_confidence(match_count);
    info!(
        "Heuristic pre-roll detected: {episode_start:.1}s-{show_start_time:.1}s \
         ({match_count} ad patterns, confidence={confidence:.2})"
    );

    Some(AdMarker::new(
        episode_start,
        show_start_time,
        confidence,
        &format!("Pre-roll ad ({match_count} ad indicators before show intro)"),
        DetectionStage::HeuristicPreroll,
    ))
}

/// Detect a post-roll ad block after the show sign-off.
///
/// Scans backward for the last sign-off phrase within the final
/// [`MAX_POSTROLL_DURATION`] seconds; symmetric to [`detect_preroll`].
pub fn detect_postroll(
    segments: &[TranscriptSegment],
    existing_ads: &[AdMarker],
    episode_duration: f64,
) -> Option<AdMarker> {
    let last = segments.last()?;
    let episode_end = if episode_duration > 0.0 {
        episode_duration
    } else {
        last.end
    };
    let min_search_start = episode_end - MAX_POSTROLL_DURATION;

    let signoff_time = segments
        .iter()
        .rev()
        .take_while(|seg| seg.end >= min_search_start)
        .find(|seg| SIGNOFF_PATTERNS.iter().any(|p| p.is_match(&seg.text)))
        .map(|seg| seg.end)?;

    if signoff_time >= episode_end - MIN_ROLL_REGION {
        return None;
    }

    if region_coverage(signoff_time, episode_end, existing_ads) > COVERAGE_THRESHOLD {
        return None;
    }

    let postroll_text = text_overlapping(segments, signoff_time, episode_end);
    let match_count = count_ad_indicators(&postroll_text);
    if match_count < MIN_AD_PATTERN_MATCHES {
        return None;
    }

    let confidence = roll_confidence(match_count);
    info!(
        "Heuristic post-roll detected: {signoff_time:.1}s-{episode_end:.1}s \
         ({match_count} ad patterns, confidence={confidence:.2})"
    );

    Some(AdMarker::new(
        signoff_time,
        episode_end,
        confidence,
        &format!("Post-roll ad ({match_count} ad indicators after sign-off)"),
        DetectionStage::HeuristicPostroll,
    ))
}
