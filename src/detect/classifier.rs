//! LLM ad classifier.
//!
//! Prompts the LLM over a rendered transcript, parses and sanitizes its ad
//! proposals, and provides the fusing helpers that reconcile multiple
//! detection reads (blind second pass, boundary refinement, same-sponsor
//! merging, timestamp re-anchoring).

use crate::detect::patterns::{
    END_FIELD_ALIASES, SPONSOR_PATTERNS, SPONSOR_PRIORITY_FIELDS, START_FIELD_ALIASES,
    TRANSITION_PATTERNS, is_invalid_sponsor,
};
use crate::detect::{AdMarker, DetectionPass, DetectionStage};
use crate::llm::{ChatMessage, LlmClient, LlmRequest, ResponseFormat};
use crate::transcribe::TranscriptSegment;
use crate::util::text::text_overlapping;
use crate::util::time::coerce_timestamp;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default maximum gap for same-sponsor merging, seconds.
pub const SAME_SPONSOR_MAX_GAP: f64 = 120.0;
/// Boundary refinement look-back window, seconds.
const REFINE_LOOKBACK: f64 = 30.0;
/// Timestamp re-anchoring slack around the proposed range, seconds.
const ANCHOR_SLACK: f64 = 5.0;

/// First-pass system prompt: aggressive detection, continuous blocks.
const FIRST_PASS_SYSTEM: &str = "You are an expert at identifying advertisements in podcast \
transcripts. Look for product endorsements, sponsored content, promo codes, special offers, \
calls to action, clear transitions into ads, host-read advertisements, pre/mid/post-roll ads, \
long intro sections filled with multiple ads, cross-promotion of other shows, and sponsor \
messages.\n\n\
When detecting multi-part ad blocks (e.g. several back-to-back ads with minimal gaps), return \
ONE continuous segment from the start of the first ad to the end of the last ad. Do NOT split \
continuous ad blocks into multiple segments. Pay special attention to the beginning of the \
episode.\n\n\
Return ONLY a JSON array of ad segments. Each element: {\"start\": seconds, \"end\": seconds, \
\"confidence\": 0.0-1.0, \"reason\": \"...\", \"sponsor\": \"name or null\", \
\"end_text\": \"last words of the ad\"}. Be aggressive - it is better to remove too much than \
too little. If no ads are found, return [].";

/// Blind second read: independent analysis with a different focus.
const BLIND_SECOND_SYSTEM: &str = "You are reviewing a podcast transcript for advertisements \
that a first reviewer may have missed. Work independently: do not assume anything has been \
found yet. Focus on subtle sponsor reads woven into conversation, short promo mentions, \
network cross-promotions, and ads that lack obvious transition phrases.\n\n\
Return ONLY a JSON array of ad segments with start/end seconds, confidence, reason, sponsor \
and end_text fields. If no ads are found, return [].";

/// Verification read over already-cleaned audio.
const VERIFICATION_SYSTEM: &str = "You are verifying a podcast episode that has already had \
detected advertisements removed. Read the transcript and identify anything that does not \
belong in the show: leftover sponsor reads, truncated ad fragments, promo codes, or abrupt \
marketing language. Typical signals include URLs, promo codes, 'sponsored by' phrasing, and \
calls to action.\n\n\
Only report spans you are confident are advertising remnants. Return ONLY a JSON array of ad \
segments with start/end seconds, confidence, reason, sponsor and end_text fields. If the \
episode is clean, return [].";

/// Default user prompt template. Placeholders: `{podcast_name}`,
/// `{episode_title}`, `{transcript}`.
pub const DEFAULT_USER_TEMPLATE: &str = "Podcast: {podcast_name}\nEpisode: {episode_title}\n\n\
Analyze this transcript and identify advertisement segments.\n\nTranscript:\n{transcript}";

/// Outcome status of one detection call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStatus {
    Success,
    Failed,
}

/// Result of one detection call, raw artifacts included for persistence.
#[derive(Debug, Clone)]
pub struct DetectionOutcome {
    pub ads: Vec<AdMarker>,
    pub raw_response: String,
    pub prompt: String,
    pub status: DetectionStatus,
    pub error: Option<String>,
}

impl DetectionOutcome {
    fn failed(prompt: String, error: String) -> Self {
        Self {
            ads: Vec::new(),
            raw_response: String::new(),
            prompt,
            status: DetectionStatus::Failed,
            error: Some(error),
        }
    }
}

/// Windowed LLM prompting over a transcript.
pub struct AdClassifier {
    llm: Arc<dyn LlmClient>,
    model: String,
    max_tokens: u32,
    timeout: Duration,
    user_template: String,
}

impl AdClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, model: String, timeout: Duration) -> Self {
        Self {
            llm,
            model,
            max_tokens: 1500,
            timeout,
            user_template: DEFAULT_USER_TEMPLATE.to_string(),
        }
    }

    /// Override the user prompt template (settings-driven).
    pub fn with_user_template(mut self, template: String) -> Self {
        self.user_template = template;
        self
    }

    /// First-pass detection over the full transcript.
    pub async fn detect(
        &self,
        segments: &[TranscriptSegment],
        podcast_name: &str,
        episode_title: &str,
        description: Option<&str>,
    ) -> DetectionOutcome {
        self.run(
            FIRST_PASS_SYSTEM,
            segments,
            podcast_name,
            episode_title,
            description,
            DetectionStage::FirstPass,
        )
        .await
    }

    /// Blind second read with a differently-focused system prompt.
    pub async fn detect_blind(
        &self,
        segments: &[TranscriptSegment],
        podcast_name: &str,
        episode_title: &str,
        description: Option<&str>,
    ) -> DetectionOutcome {
        self.run(
            BLIND_SECOND_SYSTEM,
            segments,
            podcast_name,
            episode_title,
            description,
            DetectionStage::FirstPass,
        )
        .await
    }

    /// Verification read over the re-transcribed, already-edited audio.
    pub async fn detect_verification(
        &self,
        segments: &[TranscriptSegment],
        podcast_name: &str,
        episode_title: &str,
        description: Option<&str>,
    ) -> DetectionOutcome {
        self.run(
            VERIFICATION_SYSTEM,
            segments,
            podcast_name,
            episode_title,
            description,
            DetectionStage::Verification,
        )
        .await
    }

    async fn run(
        &self,
        system: &str,
        segments: &[TranscriptSegment],
        podcast_name: &str,
        episode_title: &str,
        description: Option<&str>,
        stage: DetectionStage,
    ) -> DetectionOutcome {
        let transcript = render_transcript(segments);
        let mut prompt = self
            .user_template
            .replace("{podcast_name}", podcast_name)
            .replace("{episode_title}", episode_title)
            .replace("{transcript}", &transcript);
        if let Some(description) = description
            && !description.is_empty()
        {
            prompt.push_str("\n\nEpisode description:\n");
            prompt.push_str(description);
        }

        let request = LlmRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: system.to_string(),
            messages: vec![ChatMessage::user(prompt.clone())],
            temperature: 0.0,
            timeout: self.timeout,
            response_format: Some(ResponseFormat::JsonObject),
        };

        let response = match self.llm.messages_create(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Ad detection request failed: {e}");
                return DetectionOutcome::failed(prompt, e.to_string());
            }
        };

        let ads = parse_ads_from_response(&response.content, stage);
        info!(
            "Detected {} ad segment(s) ({:.1} min total)",
            ads.len(),
            ads.iter().map(AdMarker::duration).sum::<f64>() / 60.0
        );

        DetectionOutcome {
            ads,
            raw_response: response.content,
            prompt,
            status: DetectionStatus::Success,
            error: None,
        }
    }
}

/// Render segments one per line: `[12.5s - 45.1s] text`.
pub fn render_transcript(segments: &[TranscriptSegment]) -> String {
    let mut lines = Vec::with_capacity(segments.len());
    for seg in segments {
        lines.push(format!("[{:.1}s - {:.1}s] {}", seg.start, seg.end, seg.text));
    }
    lines.join("\n")
}

/// Parse ad proposals out of an LLM response.
///
/// Extracts the first balanced JSON array; objects lacking a usable start or
/// end are discarded; numeric fields are coerced. Malformed JSON yields an
/// empty list, never an error.
pub fn parse_ads_from_response(response: &str, stage: DetectionStage) -> Vec<AdMarker> {
    let Some(json_str) = extract_json_array(response) else {
        if !response.trim().is_empty() {
            warn!("No JSON array found in detection response");
        }
        return Vec::new();
    };

    let parsed: Vec<serde_json::Value> = match serde_json::from_str(json_str) {
        Ok(values) => values,
        Err(e) => {
            warn!("Failed to parse detection JSON: {e}");
            return Vec::new();
        }
    };

    let mut ads = Vec::new();
    for value in parsed {
        let Some(obj) = value.as_object() else {
            continue;
        };
        let Some(marker) = normalize_ad_object(obj, stage) else {
            debug!("Discarding ad object without start/end");
            continue;
        };
        ads.push(marker);
    }
    ads.sort_by(|a, b| a.start.total_cmp(&b.start));
    ads
}

/// Find the first balanced JSON array in free-form text.
fn extract_json_array(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Map one dynamic LLM ad object into a fixed marker.
///
/// Known structural aliases are folded into `{start, end}`; unknown fields
/// are ignored; the sponsor name is resolved through the priority-field list
/// and a regex fallback over `reason`.
fn normalize_ad_object(
    obj: &serde_json::Map<String, serde_json::Value>,
    stage: DetectionStage,
) -> Option<AdMarker> {
    let start = first_timestamp(obj, START_FIELD_ALIASES)?;
    let end = first_timestamp(obj, END_FIELD_ALIASES)?;

    let confidence = obj
        .get("confidence")
        .and_then(coerce_timestamp)
        .unwrap_or(1.0)
        .clamp(0.0, 1.0);

    let reason = obj
        .get("reason")
        .and_then(|v| v.as_str())
        .unwrap_or("Advertisement detected")
        .to_string();

    let end_text = obj
        .get("end_text")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string);

    let sponsor = extract_sponsor(obj, &reason);

    Some(AdMarker {
        start,
        end,
        confidence,
        reason,
        sponsor,
        end_text,
        detection_stage: stage,
        pass: None,
        validation: None,
    })
}

fn first_timestamp(
    obj: &serde_json::Map<String, serde_json::Value>,
    aliases: &[&str],
) -> Option<f64> {
    aliases
        .iter()
        .find_map(|key| obj.get(*key).and_then(coerce_timestamp))
}

static SPONSOR_CAPTURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)(?:sponsored\s+by|brought\s+to\s+you\s+by|ad\s+for|promo\s+for|sponsor[:\s]+)\s*",
        r"([A-Za-z0-9][\w'&.-]*)"
    ))
    .expect("sponsor capture regex")
});

/// Resolve the sponsor name for an ad object.
///
/// Priority-ordered structured fields first, then a regex capture over the
/// `reason` text, then a known-brand match. Junk values are rejected.
pub fn extract_sponsor(
    obj: &serde_json::Map<String, serde_json::Value>,
    reason: &str,
) -> Option<String> {
    for field in SPONSOR_PRIORITY_FIELDS {
        if let Some(value) = obj.get(*field).and_then(|v| v.as_str()) {
            let value = value.trim();
            if !is_invalid_sponsor(value) {
                return Some(value.to_string());
            }
        }
    }

    if let Some(caps) = SPONSOR_CAPTURE.captures(reason) {
        let captured = caps[1].trim().trim_end_matches(['.', ',']);
        if !is_invalid_sponsor(captured) {
            return Some(captured.to_string());
        }
    }

    SPONSOR_PATTERNS
        .find(reason)
        .map(|m| m.as_str().to_string())
        .filter(|s| !is_invalid_sponsor(s))
}

/// The sponsor keyword used for merging: the extracted sponsor, a known
/// brand in the reason, or a known brand in the ad's transcript range.
fn sponsor_keyword(ad: &AdMarker, segments: &[TranscriptSegment]) -> Option<String> {
    if let Some(sponsor) = &ad.sponsor {
        return Some(sponsor.to_lowercase());
    }
    if let Some(m) = SPONSOR_PATTERNS.find(&ad.reason) {
        return Some(m.as_str().to_lowercase());
    }
    let text = text_overlapping(segments, ad.start, ad.end);
    SPONSOR_PATTERNS
        .find(&text)
        .map(|m| m.as_str().to_lowercase())
}

/// Fuse two blind detection reads.
///
/// Proposals overlapping by at least 50% of the shorter segment collapse
/// into one marker spanning their union with the higher confidence; the
/// survivors keep `pass = first` / `pass = second` attribution.
pub fn merge_and_deduplicate(first: Vec<AdMarker>, second: Vec<AdMarker>) -> Vec<AdMarker> {
    let mut merged: Vec<AdMarker> = first
        .into_iter()
        .map(|mut ad| {
            ad.pass = Some(DetectionPass::First);
            ad
        })
        .collect();

    for mut candidate in second {
        candidate.pass = Some(DetectionPass::Second);

        let best = merged
            .iter()
            .enumerate()
            .filter(|(_, existing)| existing.overlap_of_shorter(&candidate) >= 0.5)
            .max_by(|(_, a), (_, b)| {
                a.overlap_secs(&candidate)
                    .total_cmp(&b.overlap_secs(&candidate))
            })
            .map(|(i, _)| i);

        match best {
            Some(i) => {
                let existing = &mut merged[i];
                existing.start = existing.start.min(candidate.start);
                existing.end = existing.end.max(candidate.end);
                if candidate.confidence > existing.confidence {
                    existing.confidence = candidate.confidence;
                    existing.reason = candidate.reason;
                    if candidate.sponsor.is_some() {
                        existing.sponsor = candidate.sponsor;
                    }
                }
                existing.pass = Some(DetectionPass::Merged);
            }
            None => merged.push(candidate),
        }
    }

    merged.sort_by(|a, b| a.start.total_cmp(&b.start));
    merged
}

/// Pull each ad's start back onto a sponsor transition phrase.
///
/// Scans segments starting up to 30s before the proposed start; the latest
/// segment containing a transition phrase becomes the new boundary.
pub fn refine_ad_boundaries(
    mut ads: Vec<AdMarker>,
    segments: &[TranscriptSegment],
) -> Vec<AdMarker> {
    for ad in &mut ads {
        let window_start = (ad.start - REFINE_LOOKBACK).max(0.0);
        let candidate = segments
            .iter()
            .filter(|seg| seg.start >= window_start && seg.start < ad.start)
            .filter(|seg| TRANSITION_PATTERNS.iter().any(|p| p.is_match(&seg.text)))
            .last();

        if let Some(seg) = candidate {
            debug!(
                "Refined ad start {:.1}s -> {:.1}s (transition phrase)",
                ad.start, seg.start
            );
            ad.start = seg.start;
        }
    }
    ads
}

/// Merge consecutive ads for the same sponsor separated by at most
/// `max_gap` seconds. Confidence of the merged ad is the maximum.
pub fn merge_same_sponsor_ads(
    ads: Vec<AdMarker>,
    segments: &[TranscriptSegment],
    max_gap: f64,
) -> Vec<AdMarker> {
    if ads.len() < 2 {
        return ads;
    }

    let mut sorted = ads;
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged: Vec<AdMarker> = Vec::new();
    for ad in sorted {
        let mergeable = merged.last().is_some_and(|last| {
            let gap = ad.start - last.end;
            if !(0.0..=max_gap).contains(&gap) {
                return false;
            }
            match (sponsor_keyword(last, segments), sponsor_keyword(&ad, segments)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        });

        if mergeable {
            let last = merged.last_mut().expect("non-empty");
            info!(
                "Merging same-sponsor ads: {:.1}-{:.1}s + {:.1}-{:.1}s",
                last.start, last.end, ad.start, ad.end
            );
            last.end = last.end.max(ad.end);
            last.confidence = last.confidence.max(ad.confidence);
            if ad.reason != last.reason {
                last.reason = format!("{} + {}", last.reason, ad.reason);
            }
            if last.sponsor.is_none() {
                last.sponsor = ad.sponsor;
            }
        } else {
            merged.push(ad);
        }
    }
    merged
}

/// Re-anchor ads whose brand keywords do not appear near their claimed range.
///
/// If the keyword is absent from `[start - 5s, end + 5s]` but present in
/// some segment inside the window, the ad moves to the nearest such segment,
/// preserving its duration. Ads with no extractable keywords pass through
/// unchanged.
pub fn validate_ad_timestamps(
    mut ads: Vec<AdMarker>,
    segments: &[TranscriptSegment],
    window_start: f64,
    window_end: f64,
) -> Vec<AdMarker> {
    for ad in &mut ads {
        let Some(keyword) = sponsor_keyword_for_anchor(ad) else {
            continue;
        };

        let nearby = text_overlapping(segments, ad.start - ANCHOR_SLACK, ad.end + ANCHOR_SLACK);
        if nearby.to_lowercase().contains(&keyword) {
            continue;
        }

        let anchor = segments
            .iter()
            .filter(|seg| seg.start >= window_start && seg.end <= window_end)
            .filter(|seg| seg.text.to_lowercase().contains(&keyword))
            .min_by(|a, b| {
                (a.start - ad.start)
                    .abs()
                    .total_cmp(&(b.start - ad.start).abs())
            });

        if let Some(seg) = anchor {
            let duration = ad.duration();
            info!(
                "Re-anchoring ad {:.1}-{:.1}s to {:.1}s (keyword {keyword:?})",
                ad.start, ad.end, seg.start
            );
            ad.start = seg.start;
            ad.end = (seg.start + duration).min(window_end);
        }
    }
    ads
}

/// Keyword from explicit fields only: re-anchoring against transcript-derived
/// keywords would be circular.
fn sponsor_keyword_for_anchor(ad: &AdMarker) -> Option<String> {
    if let Some(sponsor) = &ad.sponsor {
        return Some(sponsor.to_lowercase());
    }
    SPONSOR_PATTERNS
        .find(&ad.reason)
        .map(|m| m.as_str().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start,
            end,
            text: text.to_string(),
        }
    }

    fn marker(start: f64, end: f64, confidence: f64) -> AdMarker {
        AdMarker::new(start, end, confidence, "ad", DetectionStage::FirstPass)
    }

    #[test]
    fn test_render_transcript_format() {
        let rendered = render_transcript(&[seg(0.0, 4.52, "hello"), seg(4.52, 9.0, "world")]);
        assert_eq!(rendered, "[0.0s - 4.5s] hello\n[4.5s - 9.0s] world");
    }

    #[test]
    fn test_extract_json_array_balanced() {
        let text = "Here are the ads:\n[{\"start\": 1, \"vals\": [1, 2]}] trailing ]";
        assert_eq!(
            extract_json_array(text),
            Some("[{\"start\": 1, \"vals\": [1, 2]}]")
        );
    }

    #[test]
    fn test_extract_json_array_respects_strings() {
        let text = r#"[{"reason": "bracket ] inside"}]"#;
        assert_eq!(extract_json_array(text), Some(text));
    }

    #[test]
    fn test_parse_discards_objects_without_bounds() {
        let response = r#"[
            {"start": 30, "end": 90, "confidence": 0.9, "reason": "BetterHelp read"},
            {"confidence": 0.8, "reason": "no bounds"},
            {"start": 100, "reason": "no end"}
        ]"#;
        let ads = parse_ads_from_response(response, DetectionStage::FirstPass);
        assert_eq!(ads.len(), 1);
        assert_eq!(ads[0].start, 30.0);
        assert_eq!(ads[0].end, 90.0);
    }

    #[test]
    fn test_parse_coerces_alias_fields_and_strings() {
        let response = r#"[{"start_time": "1:30", "end_timestamp": "150.5s", "confidence": "0.7"}]"#;
        let ads = parse_ads_from_response(response, DetectionStage::FirstPass);
        assert_eq!(ads.len(), 1);
        assert_eq!(ads[0].start, 90.0);
        assert_eq!(ads[0].end, 150.5);
        assert_eq!(ads[0].confidence, 0.7);
    }

    #[test]
    fn test_parse_malformed_json_yields_empty() {
        assert!(parse_ads_from_response("[{not json", DetectionStage::FirstPass).is_empty());
        assert!(parse_ads_from_response("no array here", DetectionStage::FirstPass).is_empty());
    }

    #[test]
    fn test_sponsor_priority_fields() {
        let obj: serde_json::Map<String, serde_json::Value> = serde_json::from_str(
            r#"{"sponsor": "none", "advertiser": "BetterHelp", "name": "something"}"#,
        )
        .unwrap();
        assert_eq!(extract_sponsor(&obj, ""), Some("BetterHelp".to_string()));
    }

    #[test]
    fn test_sponsor_regex_fallback_over_reason() {
        let obj = serde_json::Map::new();
        assert_eq!(
            extract_sponsor(&obj, "Segment sponsored by NordVPN with promo code"),
            Some("NordVPN".to_string())
        );
    }

    #[test]
    fn test_sponsor_known_brand_fallback() {
        let obj = serde_json::Map::new();
        assert_eq!(
            extract_sponsor(&obj, "Host reads a betterhelp segment"),
            Some("betterhelp".to_string())
        );
    }

    #[test]
    fn test_sponsor_denylist_rejected() {
        let obj: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(r#"{"sponsor": "unknown"}"#).unwrap();
        assert_eq!(extract_sponsor(&obj, "generic advertisement"), None);
    }

    #[test]
    fn test_merge_and_deduplicate_overlap() {
        let first = vec![marker(30.0, 90.0, 0.8)];
        let second = vec![marker(40.0, 95.0, 0.9), marker(200.0, 230.0, 0.7)];
        let merged = merge_and_deduplicate(first, second);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].start, 30.0);
        assert_eq!(merged[0].end, 95.0);
        assert_eq!(merged[0].confidence, 0.9);
        assert_eq!(merged[0].pass, Some(DetectionPass::Merged));
        assert_eq!(merged[1].pass, Some(DetectionPass::Second));
    }

    #[test]
    fn test_merge_and_deduplicate_below_threshold_kept_separate() {
        // 10s overlap of a 60s shorter segment: 16% < 50%
        let first = vec![marker(30.0, 90.0, 0.8)];
        let second = vec![marker(80.0, 140.0, 0.9)];
        let merged = merge_and_deduplicate(first, second);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].pass, Some(DetectionPass::First));
        assert_eq!(merged[1].pass, Some(DetectionPass::Second));
    }

    #[test]
    fn test_refine_pulls_start_back_to_transition() {
        let segments = vec![
            seg(0.0, 50.0, "show content"),
            seg(50.0, 55.0, "this episode is sponsored by BetterHelp"),
            seg(55.0, 70.0, "betterhelp dot com slash podcast"),
        ];
        let ads = refine_ad_boundaries(vec![marker(60.0, 120.0, 0.9)], &segments);
        assert_eq!(ads[0].start, 50.0);
        assert_eq!(ads[0].end, 120.0);
    }

    #[test]
    fn test_refine_ignores_transitions_outside_lookback() {
        let segments = vec![seg(10.0, 15.0, "brought to you by Acme")];
        let ads = refine_ad_boundaries(vec![marker(60.0, 120.0, 0.9)], &segments);
        assert_eq!(ads[0].start, 60.0);
    }

    #[test]
    fn test_merge_same_sponsor_within_gap() {
        let mut a = marker(30.0, 60.0, 0.8);
        a.sponsor = Some("BetterHelp".to_string());
        let mut b = marker(120.0, 150.0, 0.95);
        b.sponsor = Some("betterhelp".to_string());

        let merged = merge_same_sponsor_ads(vec![a, b], &[], SAME_SPONSOR_MAX_GAP);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].start, 30.0);
        assert_eq!(merged[0].end, 150.0);
        assert_eq!(merged[0].confidence, 0.95);
    }

    #[test]
    fn test_merge_same_sponsor_gap_too_large() {
        let mut a = marker(30.0, 60.0, 0.8);
        a.sponsor = Some("BetterHelp".to_string());
        let mut b = marker(300.0, 330.0, 0.9);
        b.sponsor = Some("BetterHelp".to_string());

        let merged = merge_same_sponsor_ads(vec![a, b], &[], SAME_SPONSOR_MAX_GAP);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_merge_different_sponsors_kept() {
        let mut a = marker(30.0, 60.0, 0.8);
        a.sponsor = Some("BetterHelp".to_string());
        let mut b = marker(90.0, 120.0, 0.9);
        b.sponsor = Some("NordVPN".to_string());

        let merged = merge_same_sponsor_ads(vec![a, b], &[], SAME_SPONSOR_MAX_GAP);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_validate_timestamps_reanchors() {
        let segments = vec![
            seg(0.0, 30.0, "regular discussion"),
            seg(200.0, 210.0, "thanks to BetterHelp for supporting the show"),
            seg(210.0, 260.0, "betterhelp dot com"),
        ];
        let mut ad = marker(30.0, 90.0, 0.9);
        ad.sponsor = Some("BetterHelp".to_string());

        let anchored = validate_ad_timestamps(vec![ad], &segments, 0.0, 600.0);
        assert_eq!(anchored[0].start, 200.0);
        assert_eq!(anchored[0].end, 260.0);
    }

    #[test]
    fn test_validate_timestamps_keyword_nearby_unchanged() {
        let segments = vec![seg(28.0, 40.0, "this one is about BetterHelp")];
        let mut ad = marker(30.0, 90.0, 0.9);
        ad.sponsor = Some("BetterHelp".to_string());

        let anchored = validate_ad_timestamps(vec![ad], &segments, 0.0, 600.0);
        assert_eq!(anchored[0].start, 30.0);
    }

    #[test]
    fn test_validate_timestamps_no_keywords_pass_through() {
        let segments = vec![seg(0.0, 30.0, "something")];
        let ad = marker(30.0, 90.0, 0.9);
        let anchored = validate_ad_timestamps(vec![ad.clone()], &segments, 0.0, 600.0);
        assert_eq!(anchored[0], ad);
    }
}
