//! Post-detection validation for ad markers.
//!
//! Runs after detection but before audio editing: clamps boundaries, drops
//! degenerate markers, merges near-adjacent ads, scores each marker against
//! duration/confidence/position/reason/transcript evidence, and decides
//! ACCEPT / REVIEW / REJECT. Rejected ads are kept for display but never cut.

use crate::detect::patterns::{
    AD_SIGNAL_PATTERNS, HREF_DOMAIN_PATTERN, NON_SPONSOR_DOMAINS, NOT_AD_PATTERNS,
    SPONSOR_PATTERNS, VAGUE_REASONS,
};
use crate::detect::AdMarker;
use crate::transcribe::TranscriptSegment;
use crate::util::text::text_overlapping;
use crate::util::time::Cut;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{info, warn};

// Duration thresholds (seconds)
const MIN_AD_DURATION: f64 = 7.0; // ERROR below (quick mentions run ~10s)
const SHORT_AD_WARN: f64 = 30.0; // WARN below
const LONG_AD_WARN: f64 = 180.0; // WARN above
const MAX_AD_DURATION: f64 = 300.0; // ERROR above
const MAX_AD_DURATION_CONFIRMED: f64 = 900.0; // limit when sponsor confirmed

// Confidence thresholds
const HIGH_CONFIDENCE: f64 = 0.85; // auto-accept
const LOW_CONFIDENCE: f64 = 0.5; // warn
const REJECT_CONFIDENCE: f64 = 0.3; // auto-reject
const HIGH_CONFIDENCE_OVERRIDE: f64 = 0.90; // overrides long-duration errors

// Position windows (fraction of episode duration)
const PRE_ROLL: (f64, f64) = (0.0, 0.05);
const MID_ROLL_1: (f64, f64) = (0.20, 0.35);
const MID_ROLL_2: (f64, f64) = (0.45, 0.55);
const MID_ROLL_3: (f64, f64) = (0.65, 0.80);
const POST_ROLL: (f64, f64) = (0.95, 1.0);

// Density limits
const MAX_AD_PERCENTAGE: f64 = 0.30;
const MAX_ADS_PER_5MIN: usize = 1;

/// Ads closer than this are merged into one.
pub const MERGE_GAP_THRESHOLD: f64 = 5.0;

/// Overlap fraction (of the shorter span) above which a user correction
/// applies to an ad.
const CORRECTION_OVERLAP: f64 = 0.5;

/// Validation decision for one ad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    #[serde(rename = "ACCEPT")]
    Accept,
    #[serde(rename = "REVIEW")]
    Review,
    #[serde(rename = "REJECT")]
    Reject,
}

/// Per-ad validation verdict attached to the marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub decision: Decision,
    pub adjusted_confidence: f64,
    pub original_confidence: f64,
    pub flags: Vec<String>,
    pub corrections: Vec<String>,
}

/// Results from validating one episode's ads.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub ads: Vec<AdMarker>,
    pub accepted: usize,
    pub reviewed: usize,
    pub rejected: usize,
    pub warnings: Vec<String>,
    pub corrections: Vec<String>,
}

/// Validates and corrects ad detection results.
pub struct AdValidator {
    episode_duration: f64,
    segments: Vec<TranscriptSegment>,
    description_sponsors: BTreeSet<String>,
    user_not_ad_spans: Vec<Cut>,
}

impl AdValidator {
    pub fn new(
        episode_duration: f64,
        segments: Vec<TranscriptSegment>,
        episode_description: Option<&str>,
    ) -> Self {
        let description_sponsors = episode_description
            .map(extract_sponsors_from_description)
            .unwrap_or_default();
        if !description_sponsors.is_empty() {
            info!("Extracted sponsors from description: {description_sponsors:?}");
        }
        Self {
            episode_duration,
            segments,
            description_sponsors,
            user_not_ad_spans: Vec::new(),
        }
    }

    /// Provide user-marked "not an ad" spans; overlapping ads are
    /// force-rejected.
    pub fn with_user_corrections(mut self, not_ad_spans: Vec<Cut>) -> Self {
        self.user_not_ad_spans = not_ad_spans;
        self
    }

    /// Validate all ads and return decisions, statistics, warnings, and the
    /// corrections applied.
    pub fn validate(&self, ads: Vec<AdMarker>) -> ValidationResult {
        if ads.is_empty() {
            return ValidationResult::default();
        }

        let mut result = ValidationResult::default();

        // Step 1: clamp boundaries into [0, episode_duration]
        let ads = self.clamp_boundaries(ads, &mut result);

        // Step 2: drop markers degenerate after clamping
        let ads: Vec<AdMarker> = ads.into_iter().filter(|ad| ad.end > ad.start).collect();

        // Step 3: merge tiny gaps
        let ads = self.merge_close_ads(ads, &mut result);

        // Step 4: per-ad scoring and decision
        for ad in ads {
            let validated = self.validate_ad(ad);
            match validated
                .validation
                .as_ref()
                .map(|v| v.decision)
                .unwrap_or(Decision::Review)
            {
                Decision::Accept => result.accepted += 1,
                Decision::Review => result.reviewed += 1,
                Decision::Reject => result.rejected += 1,
            }
            result.ads.push(validated);
        }

        // Step 5: overall density sanity
        self.check_ad_density(&mut result);

        // Step 6: user corrections override everything
        self.apply_user_corrections(&mut result);

        info!(
            "Validation complete: {} accepted, {} review, {} rejected",
            result.accepted, result.reviewed, result.rejected
        );
        for warning in &result.warnings {
            warn!("Validation warning: {warning}");
        }

        result
    }

    fn clamp_boundaries(
        &self,
        mut ads: Vec<AdMarker>,
        result: &mut ValidationResult,
    ) -> Vec<AdMarker> {
        for ad in &mut ads {
            if ad.start < 0.0 {
                result
                    .corrections
                    .push(format!("Clamped negative start {:.1}s to 0", ad.start));
                ad.start = 0.0;
            }
            if self.episode_duration > 0.0 && ad.end > self.episode_duration {
                result.corrections.push(format!(
                    "Clamped end {:.1}s to duration {:.1}s",
                    ad.end, self.episode_duration
                ));
                ad.end = self.episode_duration;
            }
        }
        ads
    }

    fn merge_close_ads(
        &self,
        ads: Vec<AdMarker>,
        result: &mut ValidationResult,
    ) -> Vec<AdMarker> {
        if ads.len() < 2 {
            return ads;
        }

        let mut sorted = ads;
        sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

        let mut merged: Vec<AdMarker> = Vec::new();
        for current in sorted {
            match merged.last_mut() {
                Some(last) if (0.0..MERGE_GAP_THRESHOLD).contains(&(current.start - last.end)) => {
                    let gap = current.start - last.end;
                    last.end = last.end.max(current.end);
                    if !current.reason.is_empty() && current.reason != last.reason {
                        last.reason = format!("{} + {}", last.reason, current.reason);
                    }
                    if current.confidence > last.confidence {
                        last.confidence = current.confidence;
                    }
                    result
                        .corrections
                        .push(format!("Merged ads with {gap:.1}s gap"));
                }
                _ => merged.push(current),
            }
        }
        merged
    }

    fn validate_ad(&self, mut ad: AdMarker) -> AdMarker {
        let mut flags: Vec<String> = Vec::new();
        let original_confidence = ad.confidence;
        let mut confidence = ad.confidence;

        let duration = ad.duration();
        let position = if self.episode_duration > 0.0 {
            ad.start / self.episode_duration
        } else {
            0.0
        };

        // Duration checks
        if duration < MIN_AD_DURATION {
            flags.push(format!("ERROR: Very short ({duration:.1}s)"));
        } else if duration < SHORT_AD_WARN {
            flags.push(format!("WARN: Short duration ({duration:.1}s)"));
        }

        let sponsor_confirmed = self.is_sponsor_confirmed(&ad);
        let max_duration = if sponsor_confirmed {
            MAX_AD_DURATION_CONFIRMED
        } else {
            MAX_AD_DURATION
        };

        if duration > max_duration {
            flags.push(format!("ERROR: Very long ({duration:.1}s)"));
        } else if duration > LONG_AD_WARN {
            if sponsor_confirmed {
                flags.push(format!(
                    "INFO: Long ({duration:.1}s) but sponsor confirmed in description"
                ));
            } else {
                flags.push(format!("WARN: Long duration ({duration:.1}s)"));
            }
        }

        // Confidence checks (on the original confidence)
        if confidence < REJECT_CONFIDENCE {
            flags.push(format!("ERROR: Very low confidence ({confidence:.2})"));
        } else if confidence < LOW_CONFIDENCE {
            flags.push(format!("WARN: Low confidence ({confidence:.2})"));
        }

        confidence = apply_position_boost(confidence, position);
        confidence = self.check_reason_quality(&ad, confidence, &mut flags);
        confidence = self.verify_in_transcript(&ad, confidence, &mut flags);

        let decision = make_decision(confidence, &flags, duration);

        ad.validation = Some(Validation {
            decision,
            adjusted_confidence: (confidence * 1000.0).round() / 1000.0,
            original_confidence,
            flags,
            corrections: Vec::new(),
        });
        ad
    }

    fn check_reason_quality(
        &self,
        ad: &AdMarker,
        confidence: f64,
        flags: &mut Vec<String>,
    ) -> f64 {
        let reason = ad.reason.to_lowercase();

        // Reason says this is NOT an ad: force rejection
        if NOT_AD_PATTERNS.is_match(&reason) {
            flags.push("ERROR: Reason indicates not an ad".to_string());
            info!(
                "Auto-rejecting segment: reason indicates not an ad: {}",
                reason.chars().take(100).collect::<String>()
            );
            return 0.0;
        }

        if VAGUE_REASONS.iter().any(|v| reason.contains(v)) {
            flags.push("WARN: Vague reason".to_string());
            return (confidence - 0.1).max(0.0);
        }

        if SPONSOR_PATTERNS.is_match(&reason) {
            return (confidence + 0.1).min(1.0);
        }

        confidence
    }

    fn verify_in_transcript(
        &self,
        ad: &AdMarker,
        mut confidence: f64,
        flags: &mut Vec<String>,
    ) -> f64 {
        if self.segments.is_empty() {
            return confidence;
        }

        let ad_text = text_overlapping(&self.segments, ad.start, ad.end);
        if ad_text.is_empty() {
            flags.push("WARN: No transcript text in ad range".to_string());
            return confidence;
        }

        if SPONSOR_PATTERNS.is_match(&ad_text) {
            confidence = (confidence + 0.1).min(1.0);
        } else if AD_SIGNAL_PATTERNS.is_match(&ad_text) {
            confidence = (confidence + 0.05).min(1.0);
        } else if confidence < HIGH_CONFIDENCE {
            flags.push("WARN: No ad signals in transcript".to_string());
        }

        if let Some(end_text) = &ad.end_text
            && end_text.len() > 5
            && !ad_text.to_lowercase().contains(&end_text.to_lowercase())
        {
            flags.push("WARN: end_text not found in transcript".to_string());
            confidence = (confidence - 0.05).max(0.0);
        }

        confidence
    }

    fn is_sponsor_confirmed(&self, ad: &AdMarker) -> bool {
        if self.description_sponsors.is_empty() {
            return false;
        }

        let reason = ad.reason.to_lowercase();
        for sponsor in &self.description_sponsors {
            if reason.contains(sponsor) {
                info!("Sponsor {sponsor:?} confirmed in description for ad at {:.1}s", ad.start);
                return true;
            }
        }

        let ad_text = text_overlapping(&self.segments, ad.start, ad.end).to_lowercase();
        for sponsor in &self.description_sponsors {
            if ad_text.contains(sponsor) {
                info!("Sponsor {sponsor:?} found in ad transcript, confirmed in description");
                return true;
            }
        }

        false
    }

    fn check_ad_density(&self, result: &mut ValidationResult) {
        if result.ads.is_empty() || self.episode_duration <= 0.0 {
            return;
        }

        let kept = |ad: &AdMarker| {
            ad.validation
                .as_ref()
                .is_none_or(|v| v.decision != Decision::Reject)
        };

        let total_ad_time: f64 = result
            .ads
            .iter()
            .filter(|ad| kept(ad))
            .map(|ad| ad.duration())
            .sum();

        let ad_percentage = total_ad_time / self.episode_duration;
        if ad_percentage > MAX_AD_PERCENTAGE {
            result.warnings.push(format!(
                "High ad density: {:.1}% of episode ({total_ad_time:.0}s of {:.0}s)",
                ad_percentage * 100.0,
                self.episode_duration
            ));
        }

        // Fixed 5-minute windows
        let mut window_start = 0.0_f64;
        while window_start < self.episode_duration {
            let window_end = (window_start + 300.0).min(self.episode_duration);
            let ads_in_window = result
                .ads
                .iter()
                .filter(|ad| kept(ad))
                .filter(|ad| ad.start >= window_start && ad.start < window_end)
                .count();
            if ads_in_window > MAX_ADS_PER_5MIN {
                result.warnings.push(format!(
                    "Multiple ads ({ads_in_window}) in window {:.0}-{:.0} min",
                    window_start / 60.0,
                    window_end / 60.0
                ));
            }
            window_start += 300.0;
        }
    }

    fn apply_user_corrections(&self, result: &mut ValidationResult) {
        if self.user_not_ad_spans.is_empty() {
            return;
        }

        for ad in &mut result.ads {
            let overlapping = self.user_not_ad_spans.iter().any(|span| {
                let overlap = (ad.end.min(span.end) - ad.start.max(span.start)).max(0.0);
                let shorter = ad.duration().min(span.duration());
                shorter > 0.0 && overlap / shorter >= CORRECTION_OVERLAP
            });
            if !overlapping {
                continue;
            }

            if let Some(validation) = ad.validation.as_mut() {
                if validation.decision != Decision::Reject {
                    match validation.decision {
                        Decision::Accept => result.accepted -= 1,
                        Decision::Review => result.reviewed -= 1,
                        Decision::Reject => {}
                    }
                    result.rejected += 1;
                }
                validation.decision = Decision::Reject;
                validation.flags.push("ERROR: User marked not an ad".to_string());
            }
        }
    }
}

/// Boost confidence for typical ad positions; clamp to 1.0.
fn apply_position_boost(confidence: f64, position: f64) -> f64 {
    let in_window = |w: (f64, f64)| w.0 <= position && position <= w.1;

    if in_window(PRE_ROLL) {
        (confidence + 0.10).min(1.0)
    } else if in_window(POST_ROLL) {
        (confidence + 0.05).min(1.0)
    } else if in_window(MID_ROLL_1) || in_window(MID_ROLL_2) || in_window(MID_ROLL_3) {
        (confidence + 0.05).min(1.0)
    } else {
        confidence
    }
}

/// Decide ACCEPT / REVIEW / REJECT from the adjusted confidence and flags.
fn make_decision(confidence: f64, flags: &[String], duration: f64) -> Decision {
    let has_errors = flags.iter().any(|f| f.contains("ERROR"));
    let has_long_error = flags.iter().any(|f| f.contains("Very long"));
    let has_warns = flags.iter().any(|f| f.contains("WARN"));

    // High confidence overrides a long-duration error up to the confirmed cap
    if has_long_error
        && confidence >= HIGH_CONFIDENCE_OVERRIDE
        && duration <= MAX_AD_DURATION_CONFIRMED
    {
        info!("Accepting long ad ({duration:.1}s) due to high confidence ({confidence:.2})");
        return Decision::Accept;
    }

    if has_errors || confidence < REJECT_CONFIDENCE {
        Decision::Reject
    } else if confidence >= HIGH_CONFIDENCE && !has_warns {
        Decision::Accept
    } else if confidence >= 0.6 {
        Decision::Accept
    } else {
        Decision::Review
    }
}

/// Harvest sponsor names from an episode description: `href` domains (minus
/// known non-sponsor domains) and known-brand matches (spaces removed).
fn extract_sponsors_from_description(description: &str) -> BTreeSet<String> {
    let mut sponsors = BTreeSet::new();
    if description.is_empty() {
        return sponsors;
    }

    for caps in HREF_DOMAIN_PATTERN.captures_iter(description) {
        let domain = caps[1].to_lowercase();
        if !NON_SPONSOR_DOMAINS.contains(&domain.as_str()) {
            sponsors.insert(domain);
        }
    }

    let lower = description.to_lowercase();
    for m in SPONSOR_PATTERNS.find_iter(&lower) {
        sponsors.insert(m.as_str().replace(' ', ""));
    }

    sponsors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::DetectionStage;

    fn seg(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start,
            end,
            text: text.to_string(),
        }
    }

    fn ad(start: f64, end: f64, confidence: f64, reason: &str) -> AdMarker {
        AdMarker::new(start, end, confidence, reason, DetectionStage::FirstPass)
    }

    fn decision_of(result: &ValidationResult, idx: usize) -> Decision {
        result.ads[idx].validation.as_ref().unwrap().decision
    }

    // S1: clean high-confidence ad with strong transcript signals
    #[test]
    fn test_clean_high_confidence_ad_accepted() {
        let segments = vec![
            seg(0.0, 30.0, "welcome to the show"),
            seg(30.0, 60.0, "this episode is brought to you by BetterHelp"),
            seg(60.0, 90.0, "go to betterhelp.com/podcast and use promo code POD"),
            seg(90.0, 300.0, "back to the episode"),
        ];
        let validator = AdValidator::new(300.0, segments, None);
        let result = validator.validate(vec![ad(30.0, 90.0, 0.95, "BetterHelp sponsor read")]);

        assert_eq!(result.ads.len(), 1);
        assert_eq!(decision_of(&result, 0), Decision::Accept);
        assert_eq!(result.accepted, 1);
    }

    // S2: too-short ad rejected with the exact flag string
    #[test]
    fn test_short_ad_rejected() {
        let validator = AdValidator::new(300.0, Vec::new(), None);
        let result = validator.validate(vec![ad(50.0, 55.0, 0.9, "Quick mention")]);

        assert_eq!(decision_of(&result, 0), Decision::Reject);
        let flags = &result.ads[0].validation.as_ref().unwrap().flags;
        assert!(flags.iter().any(|f| f == "ERROR: Very short (5.0s)"));
    }

    // S3: close-gap merge with reason concatenation and max confidence
    #[test]
    fn test_close_gap_merge() {
        let validator = AdValidator::new(300.0, Vec::new(), None);
        let result = validator.validate(vec![
            ad(30.0, 60.0, 0.9, "First sponsor"),
            ad(63.0, 90.0, 0.85, "Second sponsor"),
        ]);

        assert_eq!(result.ads.len(), 1);
        assert_eq!(result.ads[0].start, 30.0);
        assert_eq!(result.ads[0].end, 90.0);
        assert_eq!(result.ads[0].confidence, 0.9);
        assert_eq!(result.ads[0].reason, "First sponsor + Second sponsor");
        assert!(result
            .corrections
            .iter()
            .any(|c| c == "Merged ads with 3.0s gap"));
    }

    // S4: long ad accepted when the sponsor is confirmed in the description
    #[test]
    fn test_long_ad_with_confirmed_sponsor() {
        let description = r#"Sponsors: <a href="https://betterhelp.com/promo">BetterHelp</a>"#;
        let segments = vec![seg(100.0, 500.0, "betterhelp dot com slash promo")];
        let validator = AdValidator::new(3600.0, segments, Some(description));
        let result = validator.validate(vec![ad(100.0, 500.0, 0.90, "BetterHelp sponsor")]);

        let validation = result.ads[0].validation.as_ref().unwrap();
        assert!(
            validation
                .flags
                .iter()
                .any(|f| f.starts_with("INFO: Long") && f.contains("sponsor confirmed")),
            "expected INFO sponsor-confirmed flag, got {:?}",
            validation.flags
        );
        assert!(!validation.flags.iter().any(|f| f.contains("Very long")));
        assert_eq!(validation.decision, Decision::Accept);
    }

    // S5: negative start clamped with the exact correction string
    #[test]
    fn test_boundary_clamp() {
        let validator = AdValidator::new(300.0, Vec::new(), None);
        let result = validator.validate(vec![ad(-10.0, 60.0, 0.9, "Pre-roll block")]);

        assert_eq!(result.ads[0].start, 0.0);
        assert!(result
            .corrections
            .iter()
            .any(|c| c == "Clamped negative start -10.0s to 0"));
    }

    #[test]
    fn test_end_clamped_to_duration() {
        let validator = AdValidator::new(300.0, Vec::new(), None);
        let result = validator.validate(vec![ad(250.0, 400.0, 0.9, "Outro ads")]);
        assert_eq!(result.ads[0].end, 300.0);
        assert!(result
            .corrections
            .iter()
            .any(|c| c == "Clamped end 400.0s to duration 300.0s"));
    }

    #[test]
    fn test_degenerate_after_clamp_dropped() {
        let validator = AdValidator::new(300.0, Vec::new(), None);
        let result = validator.validate(vec![ad(320.0, 340.0, 0.9, "Past the end")]);
        assert!(result.ads.is_empty());
    }

    #[test]
    fn test_not_ad_reason_forces_reject() {
        let validator = AdValidator::new(300.0, Vec::new(), None);
        let result =
            validator.validate(vec![ad(30.0, 90.0, 0.95, "This is not an ad, regular content")]);

        let validation = result.ads[0].validation.as_ref().unwrap();
        assert_eq!(validation.decision, Decision::Reject);
        assert_eq!(validation.adjusted_confidence, 0.0);
    }

    #[test]
    fn test_vague_reason_penalized() {
        let validator = AdValidator::new(300.0, Vec::new(), None);
        let result = validator.validate(vec![ad(100.0, 160.0, 0.7, "advertisement")]);
        let validation = result.ads[0].validation.as_ref().unwrap();
        assert!(validation.flags.iter().any(|f| f == "WARN: Vague reason"));
        assert!(validation.adjusted_confidence < 0.7);
    }

    #[test]
    fn test_very_low_confidence_rejected() {
        let validator = AdValidator::new(300.0, Vec::new(), None);
        let result = validator.validate(vec![ad(100.0, 160.0, 0.2, "Maybe an ad")]);
        assert_eq!(decision_of(&result, 0), Decision::Reject);
    }

    #[test]
    fn test_position_boost_preroll() {
        // 10s into a 3600s episode: within the first 5%
        assert!((apply_position_boost(0.8, 10.0 / 3600.0) - 0.9).abs() < 1e-9);
        // Mid-roll window
        assert!((apply_position_boost(0.8, 0.5) - 0.85).abs() < 1e-9);
        // Outside every window
        assert!((apply_position_boost(0.8, 0.4) - 0.8).abs() < 1e-9);
        // Clamped
        assert!((apply_position_boost(0.98, 0.01) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_validated_markers_bounded_and_ordered() {
        let validator = AdValidator::new(600.0, Vec::new(), None);
        let result = validator.validate(vec![
            ad(-5.0, 40.0, 0.9, "a"),
            ad(100.0, 700.0, 0.9, "b"),
            ad(42.0, 80.0, 0.85, "c"),
        ]);

        for marker in &result.ads {
            assert!(marker.start >= 0.0);
            assert!(marker.start < marker.end);
            assert!(marker.end <= 600.0);
        }
        for pair in result.ads.windows(2) {
            assert!(pair[1].start >= pair[0].end - MERGE_GAP_THRESHOLD);
        }
    }

    #[test]
    fn test_density_warning_high_percentage() {
        let validator = AdValidator::new(300.0, Vec::new(), None);
        let result = validator.validate(vec![ad(0.0, 150.0, 0.95, "Huge BetterHelp block")]);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.starts_with("High ad density")));
    }

    #[test]
    fn test_density_warning_ads_per_window() {
        let validator = AdValidator::new(3600.0, Vec::new(), None);
        let result = validator.validate(vec![
            ad(600.0, 640.0, 0.95, "BetterHelp read one"),
            ad(700.0, 740.0, 0.95, "nordvpn read two"),
        ]);
        assert!(result.warnings.iter().any(|w| w.starts_with("Multiple ads")));
    }

    #[test]
    fn test_user_correction_forces_reject() {
        let validator = AdValidator::new(600.0, Vec::new(), None)
            .with_user_corrections(vec![Cut::new(95.0, 160.0)]);
        let result = validator.validate(vec![ad(100.0, 160.0, 0.95, "BetterHelp read")]);

        let validation = result.ads[0].validation.as_ref().unwrap();
        assert_eq!(validation.decision, Decision::Reject);
        assert_eq!(result.rejected, 1);
        assert_eq!(result.accepted, 0);
    }

    #[test]
    fn test_user_correction_low_overlap_ignored() {
        let validator = AdValidator::new(600.0, Vec::new(), None)
            .with_user_corrections(vec![Cut::new(0.0, 110.0)]);
        // Overlap with [100, 160] is 10s of a 60s ad: 17% < 50%
        let result = validator.validate(vec![ad(100.0, 160.0, 0.95, "BetterHelp read")]);
        assert_eq!(decision_of(&result, 0), Decision::Accept);
    }

    #[test]
    fn test_sponsor_extraction_from_description() {
        let sponsors = extract_sponsors_from_description(
            r#"Thanks to <a href="https://www.bitwarden.com/twit">Bitwarden</a> and
               <a href="https://twitter.com/show">us</a>, also try Athletic Greens"#,
        );
        assert!(sponsors.contains("bitwarden"));
        assert!(sponsors.contains("athleticgreens"));
        assert!(!sponsors.contains("twitter"));
    }

    #[test]
    fn test_empty_input() {
        let validator = AdValidator::new(300.0, Vec::new(), None);
        let result = validator.validate(Vec::new());
        assert!(result.ads.is_empty());
        assert_eq!(result.accepted + result.reviewed + result.rejected, 0);
    }
}
