//! Timestamp parsing, formatting, and cut-aware adjustment.
//!
//! Shared by the classifier (coercing LLM timestamp fields), the transcript
//! round-trip, and the verification pass coordinate mapping.

use crate::error::{PodscrubError, Result};

/// A removed span of original audio, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cut {
    pub start: f64,
    pub end: f64,
}

impl Cut {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Convert a timestamp string to seconds.
///
/// Accepted formats:
/// - plain float: `"1178.5"` → 1178.5
/// - float with `s` suffix: `"1178.5s"`
/// - comma decimal separator: `"1178,5"`
/// - `H:MM:SS[.mmm]`, `MM:SS[.mmm]`, `M:SS`
///
/// # Errors
/// Returns [`PodscrubError::TimestampError`] on anything else.
pub fn parse_timestamp(ts: &str) -> Result<f64> {
    let normalized = ts.trim().trim_end_matches('s').trim().replace(',', ".");
    if normalized.is_empty() {
        return Err(PodscrubError::TimestampError(ts.to_string()));
    }

    if let Ok(secs) = normalized.parse::<f64>() {
        return Ok(secs);
    }

    let parts: Vec<&str> = normalized.split(':').collect();
    let parsed = match parts.as_slice() {
        [h, m, s] => {
            let hours: u32 = h.parse().ok().ok_or_invalid(ts)?;
            let minutes: u32 = m.parse().ok().ok_or_invalid(ts)?;
            let seconds: f64 = s.parse().ok().ok_or_invalid(ts)?;
            f64::from(hours) * 3600.0 + f64::from(minutes) * 60.0 + seconds
        }
        [m, s] => {
            let minutes: u32 = m.parse().ok().ok_or_invalid(ts)?;
            let seconds: f64 = s.parse().ok().ok_or_invalid(ts)?;
            f64::from(minutes) * 60.0 + seconds
        }
        _ => return Err(PodscrubError::TimestampError(ts.to_string())),
    };
    Ok(parsed)
}

/// Coerce a JSON value (number or timestamp string) to seconds.
pub fn coerce_timestamp(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => parse_timestamp(s).ok(),
        _ => None,
    }
}

/// Format seconds as a human-readable timestamp (`M:SS.ss` or `H:MM:SS.ss`).
pub fn format_time(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let hours = (seconds / 3600.0) as u64;
    let minutes = ((seconds % 3600.0) / 60.0) as u64;
    let secs = seconds % 60.0;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:05.2}")
    } else {
        format!("{minutes}:{secs:05.2}")
    }
}

/// Format seconds as a VTT timestamp (`HH:MM:SS.mmm`), hours always present.
pub fn format_vtt_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let hours = (seconds / 3600.0) as u64;
    let minutes = ((seconds % 3600.0) / 60.0) as u64;
    let secs = seconds % 60.0;
    format!("{hours:02}:{minutes:02}:{secs:06.3}")
}

/// Adjust an original-audio timestamp to its position in the processed audio.
///
/// Subtracts the duration of every cut that ends before the timestamp; a
/// timestamp inside a cut snaps to the cut's start boundary. Monotone
/// non-decreasing in `original_time`, and the identity when `cuts` is empty.
pub fn adjust_timestamp(original_time: f64, cuts: &[Cut]) -> f64 {
    if cuts.is_empty() {
        return original_time;
    }

    let mut sorted: Vec<Cut> = cuts.to_vec();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut adjustment = 0.0;
    for cut in &sorted {
        if cut.end <= original_time {
            adjustment += cut.duration();
        } else if cut.start < original_time && original_time < cut.end {
            adjustment += original_time - cut.start;
            break;
        } else {
            break;
        }
    }

    (original_time - adjustment).max(0.0)
}

trait OkOrInvalid<T> {
    fn ok_or_invalid(self, ts: &str) -> Result<T>;
}

impl<T> OkOrInvalid<T> for Option<T> {
    fn ok_or_invalid(self, ts: &str) -> Result<T> {
        self.ok_or_else(|| PodscrubError::TimestampError(ts.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_float() {
        assert_eq!(parse_timestamp("1178.5").unwrap(), 1178.5);
        assert_eq!(parse_timestamp("0").unwrap(), 0.0);
    }

    #[test]
    fn test_parse_seconds_suffix() {
        assert_eq!(parse_timestamp("1178.5s").unwrap(), 1178.5);
        assert_eq!(parse_timestamp(" 42s ").unwrap(), 42.0);
    }

    #[test]
    fn test_parse_comma_decimal() {
        assert_eq!(parse_timestamp("1178,5").unwrap(), 1178.5);
    }

    #[test]
    fn test_parse_colon_formats() {
        assert_eq!(parse_timestamp("01:23:45.678").unwrap(), 5025.678);
        assert_eq!(parse_timestamp("01:23:45").unwrap(), 5025.0);
        assert_eq!(parse_timestamp("23:45.678").unwrap(), 1425.678);
        assert_eq!(parse_timestamp("3:45").unwrap(), 225.0);
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(parse_timestamp("").is_err());
        assert!(parse_timestamp("abc").is_err());
        assert!(parse_timestamp("1:2:3:4").is_err());
        assert!(parse_timestamp("::").is_err());
    }

    #[test]
    fn test_coerce_number_and_string() {
        assert_eq!(coerce_timestamp(&serde_json::json!(12.5)), Some(12.5));
        assert_eq!(coerce_timestamp(&serde_json::json!("1:00")), Some(60.0));
        assert_eq!(coerce_timestamp(&serde_json::json!(null)), None);
        assert_eq!(coerce_timestamp(&serde_json::json!([1])), None);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(225.5), "3:45.50");
        assert_eq!(format_time(5025.0), "1:23:45.00");
        assert_eq!(format_time(-3.0), "0:00.00");
    }

    #[test]
    fn test_format_vtt_timestamp() {
        assert_eq!(format_vtt_timestamp(5025.678), "01:23:45.678");
        assert_eq!(format_vtt_timestamp(0.0), "00:00:00.000");
    }

    #[test]
    fn test_adjust_identity_without_cuts() {
        assert_eq!(adjust_timestamp(120.0, &[]), 120.0);
    }

    #[test]
    fn test_adjust_after_cut() {
        let cuts = [Cut::new(30.0, 90.0)];
        assert_eq!(adjust_timestamp(100.0, &cuts), 40.0);
        assert_eq!(adjust_timestamp(30.0, &cuts), 30.0);
    }

    #[test]
    fn test_adjust_inside_cut_snaps_to_start() {
        let cuts = [Cut::new(30.0, 90.0)];
        assert_eq!(adjust_timestamp(60.0, &cuts), 30.0);
    }

    #[test]
    fn test_adjust_monotone() {
        let cuts = [Cut::new(10.0, 20.0), Cut::new(50.0, 80.0)];
        let mut last = f64::NEG_INFINITY;
        for i in 0..200 {
            let t = i as f64;
            let adjusted = adjust_timestamp(t, &cuts);
            assert!(
                adjusted >= last,
                "adjust_timestamp not monotone at t={t}: {adjusted} < {last}"
            );
            last = adjusted;
        }
    }
}
