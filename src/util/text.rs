//! Transcript text extraction helpers.

use crate::transcribe::TranscriptSegment;

/// Extract the text of all segments overlapping `[start, end]`.
///
/// Partial overlaps are included; pass `include_partial = false` to keep only
/// segments fully contained in the window. Results are space-joined.
pub fn text_in_range(
    segments: &[TranscriptSegment],
    start: f64,
    end: f64,
    include_partial: bool,
) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for seg in segments {
        let keep = if include_partial {
            seg.end >= start && seg.start <= end
        } else {
            seg.start >= start && seg.end <= end
        };
        if keep && !seg.text.is_empty() {
            parts.push(&seg.text);
        }
    }
    parts.join(" ")
}

/// Shorthand for the common partial-overlap extraction.
pub fn text_overlapping(segments: &[TranscriptSegment], start: f64, end: f64) -> String {
    text_in_range(segments, start, end, true)
}
