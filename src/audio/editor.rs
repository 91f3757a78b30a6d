//! Ad-splice audio editor.
//!
//! Cuts ranges out of an episode and splices a marker tone into each cut
//! point, with fade crossfades so edits are not jarring. The ffmpeg filter
//! graph is built by a pure function so the splice plan is testable without
//! invoking ffmpeg.

use crate::audio::probe;
use crate::error::Result;
use crate::util::time::Cut;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{error, info};

/// Cuts shorter than this are dropped as likely false positives.
const MIN_CUT_DURATION: f64 = 10.0;
/// Adjacent cuts with gaps smaller than this are coalesced.
const COALESCE_GAP: f64 = 1.0;
/// A tail shorter than this after the final cut is discarded.
const POST_ROLL_TRIM_THRESHOLD: f64 = 30.0;

const CONTENT_FADE_OUT: f64 = 0.5;
const CONTENT_FADE_IN: f64 = 0.8;
const MARKER_FADE: f64 = 0.5;
const MARKER_VOLUME: f64 = 0.4;

/// Narrow contract over the audio-editing backend.
#[async_trait]
pub trait AudioEditor: Send + Sync {
    /// Remove `cuts` from `input`, splicing the marker tone into each cut
    /// point, and re-encode to `output`. Returns `false` (with `output`
    /// untouched) when editing fails.
    async fn cut_and_splice(&self, input: &Path, cuts: &[Cut], output: &Path) -> Result<bool>;

    /// Probe a media file's duration.
    async fn media_duration(&self, path: &Path) -> Option<f64>;
}

/// ffmpeg-backed editor.
pub struct FfmpegEditor {
    marker_path: PathBuf,
    bitrate: String,
    probe_timeout: Duration,
    edit_timeout: Duration,
    marker_duration: OnceCell<f64>,
}

impl FfmpegEditor {
    pub fn new(
        marker_path: PathBuf,
        bitrate: String,
        probe_timeout: Duration,
        edit_timeout: Duration,
    ) -> Self {
        Self {
            marker_path,
            bitrate,
            probe_timeout,
            edit_timeout,
            marker_duration: OnceCell::new(),
        }
    }

    async fn marker_duration(&self) -> f64 {
        *self
            .marker_duration
            .get_or_init(|| async {
                probe::get_audio_duration(&self.marker_path, self.probe_timeout)
                    .await
                    .unwrap_or(1.0)
            })
            .await
    }
}

#[async_trait]
impl AudioEditor for FfmpegEditor {
    async fn cut_and_splice(&self, input: &Path, cuts: &[Cut], output: &Path) -> Result<bool> {
        let kept = prepare_cuts(cuts);

        if kept.is_empty() {
            info!("No cuts to apply, copying original file");
            tokio::fs::copy(input, output).await?;
            return Ok(true);
        }

        if !self.marker_path.exists() {
            error!("Marker audio not found: {}", self.marker_path.display());
            return Ok(false);
        }

        let Some(total) = probe::get_audio_duration(input, self.probe_timeout).await else {
            error!("Could not get audio duration for {}", input.display());
            return Ok(false);
        };

        info!(
            "Processing audio: {total:.1}s total, {} cut(s)",
            kept.len()
        );

        let marker_duration = self.marker_duration().await;
        let graph = build_filter_graph(&kept, total, marker_duration);

        let staging = output.with_extension("part.mp3");
        let cmd = tokio::process::Command::new("ffmpeg")
            .arg("-y")
            .arg("-i")
            .arg(input)
            .arg("-i")
            .arg(&self.marker_path)
            .arg("-filter_complex")
            .arg(&graph)
            .args(["-map", "[out]", "-acodec", "libmp3lame", "-ab"])
            .arg(&self.bitrate)
            .arg(&staging)
            .output();

        let result = match tokio::time::timeout(self.edit_timeout, cmd).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                error!("ffmpeg failed to start: {e}");
                return Ok(false);
            }
            Err(_) => {
                error!("ffmpeg processing timed out");
                let _ = tokio::fs::remove_file(&staging).await;
                return Ok(false);
            }
        };

        if !result.status.success() {
            // stderr may contain non-UTF-8 progress output
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail_start = stderr.char_indices().rev().nth(500).map_or(0, |(i, _)| i);
            error!("ffmpeg failed: {}", &stderr[tail_start..]);
            let _ = tokio::fs::remove_file(&staging).await;
            return Ok(false);
        }

        let Some(new_duration) = probe::get_audio_duration(&staging, self.probe_timeout).await
        else {
            error!("Could not verify edited output");
            let _ = tokio::fs::remove_file(&staging).await;
            return Ok(false);
        };

        tokio::fs::rename(&staging, output).await?;
        probe::invalidate(output);
        info!(
            "Edit complete: {total:.1}s -> {new_duration:.1}s (removed {:.1}s)",
            total - new_duration
        );
        Ok(true)
    }

    async fn media_duration(&self, path: &Path) -> Option<f64> {
        probe::get_audio_duration(path, self.probe_timeout).await
    }
}

/// Sort, coalesce near-adjacent cuts, and drop cuts below the
/// false-positive floor. Ordering of kept cuts is preserved.
pub fn prepare_cuts(cuts: &[Cut]) -> Vec<Cut> {
    let mut sorted: Vec<Cut> = cuts.to_vec();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged: Vec<Cut> = Vec::new();
    for cut in sorted {
        match merged.last_mut() {
            Some(last) if cut.start - last.end < COALESCE_GAP => {
                // Overlapping or near-adjacent: extend
                last.end = last.end.max(cut.end);
            }
            _ => merged.push(cut),
        }
    }

    let mut kept = Vec::new();
    for cut in merged {
        if cut.duration() >= MIN_CUT_DURATION {
            kept.push(cut);
        } else {
            info!(
                "Skipping short cut ({:.1}s < {MIN_CUT_DURATION}s) at {:.1}s",
                cut.duration(),
                cut.start
            );
        }
    }
    kept
}

/// Build the ffmpeg `filter_complex` splice graph.
///
/// Input 0 is the episode, input 1 the marker tone. Content preceding a cut
/// fades out over 0.5s, the marker plays at 40% volume with 0.5s fades, and
/// the following content fades in over 0.8s. The first segment has no
/// leading fade-in and the final segment no trailing fade-out. A tail
/// shorter than 30s after the last cut is discarded so the marker ends the
/// file.
pub fn build_filter_graph(cuts: &[Cut], total_duration: f64, marker_duration: f64) -> String {
    let mut filter_parts: Vec<String> = Vec::new();
    let mut concat_parts: Vec<String> = Vec::new();
    let mut current_time = 0.0_f64;
    let mut segment_idx = 0_usize;
    let num_cuts = cuts.len();

    // ffmpeg streams are single-use: split the marker input into one copy
    // per cut when several are needed.
    if num_cuts > 1 {
        let outs: String = (0..num_cuts).map(|i| format!("[mk_in{i}]")).collect();
        filter_parts.push(format!("[1:a]asplit={num_cuts}{outs}"));
    }

    let marker_fade_out_start = (marker_duration - MARKER_FADE).max(0.0);
    let marker_input = |i: usize| {
        if num_cuts > 1 {
            format!("[mk_in{i}]")
        } else {
            "[1:a]".to_string()
        }
    };

    let mut trimmed_tail = false;
    for (i, cut) in cuts.iter().enumerate() {
        let is_first = i == 0;
        let is_last = i == num_cuts - 1;
        let remaining_after = total_duration - cut.end;

        // Content between the previous cut (or file start) and this cut
        if cut.start > current_time {
            let content_duration = cut.start - current_time;
            let mut chain = format!(
                "[0:a]atrim={current_time}:{},asetpts=PTS-STARTPTS",
                cut.start
            );
            if is_first {
                // First segment: no leading fade-in
                if content_duration > CONTENT_FADE_OUT {
                    chain.push_str(&format!(
                        ",afade=t=out:st={}:d={CONTENT_FADE_OUT}",
                        content_duration - CONTENT_FADE_OUT
                    ));
                }
            } else if content_duration > CONTENT_FADE_IN + CONTENT_FADE_OUT {
                chain.push_str(&format!(
                    ",afade=t=in:d={CONTENT_FADE_IN},afade=t=out:st={}:d={CONTENT_FADE_OUT}",
                    content_duration - CONTENT_FADE_OUT
                ));
            }
            filter_parts.push(format!("{chain}[s{segment_idx}]"));
            concat_parts.push(format!("[s{segment_idx}]"));
            segment_idx += 1;
        }

        // Marker tone replacing the cut
        filter_parts.push(format!(
            "{}afade=t=in:d={MARKER_FADE},afade=t=out:st={marker_fade_out_start}:d={MARKER_FADE},volume={MARKER_VOLUME}[mk{segment_idx}]",
            marker_input(i)
        ));
        concat_parts.push(format!("[mk{segment_idx}]"));
        segment_idx += 1;

        current_time = cut.end;

        // End-of-episode trim: marker ends the file
        if is_last && remaining_after < POST_ROLL_TRIM_THRESHOLD {
            info!(
                "End-of-episode cut at {:.1}s, trimming {remaining_after:.1}s tail",
                cut.start
            );
            trimmed_tail = true;
        }
    }

    // Trailing content after the last cut (no trailing fade-out)
    if !trimmed_tail && current_time < total_duration {
        let content_duration = total_duration - current_time;
        let mut chain =
            format!("[0:a]atrim={current_time}:{total_duration},asetpts=PTS-STARTPTS");
        if content_duration > CONTENT_FADE_IN {
            chain.push_str(&format!(",afade=t=in:d={CONTENT_FADE_IN}"));
        }
        filter_parts.push(format!("{chain}[s{segment_idx}]"));
        concat_parts.push(format!("[s{segment_idx}]"));
    }

    format!(
        "{};{}concat=n={}:v=0:a=1[out]",
        filter_parts.join(";"),
        concat_parts.join(""),
        concat_parts.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_cuts_drops_short() {
        let kept = prepare_cuts(&[Cut::new(50.0, 55.0), Cut::new(100.0, 160.0)]);
        assert_eq!(kept, vec![Cut::new(100.0, 160.0)]);
    }

    #[test]
    fn test_prepare_cuts_coalesces_small_gaps() {
        let kept = prepare_cuts(&[Cut::new(30.0, 60.0), Cut::new(60.5, 90.0)]);
        assert_eq!(kept, vec![Cut::new(30.0, 90.0)]);
    }

    #[test]
    fn test_prepare_cuts_keeps_separate_when_gap_large() {
        let kept = prepare_cuts(&[Cut::new(30.0, 60.0), Cut::new(62.0, 90.0)]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_prepare_cuts_sorted_and_ordered() {
        let kept = prepare_cuts(&[
            Cut::new(200.0, 260.0),
            Cut::new(30.0, 60.0),
            Cut::new(100.0, 160.0),
        ]);
        assert_eq!(kept.len(), 3);
        for pair in kept.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
        for cut in &kept {
            assert!(cut.duration() >= MIN_CUT_DURATION);
        }
    }

    #[test]
    fn test_prepare_cuts_merges_contained_ads() {
        let kept = prepare_cuts(&[Cut::new(30.0, 90.0), Cut::new(40.0, 50.0)]);
        assert_eq!(kept, vec![Cut::new(30.0, 90.0)]);
    }

    #[test]
    fn test_filter_graph_single_cut() {
        let graph = build_filter_graph(&[Cut::new(30.0, 90.0)], 300.0, 2.0);
        // Leading content, marker, trailing content, three-way concat
        assert!(graph.contains("[0:a]atrim=0:30"));
        assert!(graph.contains("volume=0.4"));
        assert!(graph.contains("afade=t=in:d=0.8"));
        assert!(graph.contains("concat=n=3:v=0:a=1[out]"));
        // Single cut uses the marker input directly, no asplit
        assert!(!graph.contains("asplit"));
    }

    #[test]
    fn test_filter_graph_splits_marker_for_multiple_cuts() {
        let graph = build_filter_graph(
            &[Cut::new(30.0, 90.0), Cut::new(150.0, 200.0)],
            300.0,
            2.0,
        );
        assert!(graph.contains("[1:a]asplit=2[mk_in0][mk_in1]"));
        assert!(graph.contains("concat=n=5:v=0:a=1[out]"));
    }

    #[test]
    fn test_filter_graph_first_segment_has_no_fade_in() {
        let graph = build_filter_graph(&[Cut::new(30.0, 90.0)], 300.0, 2.0);
        let first_segment = graph.split(';').next().unwrap();
        assert!(first_segment.contains("atrim=0:30"));
        assert!(!first_segment.contains("t=in"));
        assert!(first_segment.contains("afade=t=out:st=29.5:d=0.5"));
    }

    #[test]
    fn test_filter_graph_trims_short_tail() {
        // 290..? leaves a 10s tail -> marker ends the file
        let graph = build_filter_graph(&[Cut::new(200.0, 290.0)], 300.0, 2.0);
        assert!(!graph.contains("atrim=290:300"));
        assert!(graph.contains("concat=n=2:v=0:a=1[out]"));
    }

    #[test]
    fn test_filter_graph_keeps_long_tail() {
        let graph = build_filter_graph(&[Cut::new(100.0, 160.0)], 300.0, 2.0);
        assert!(graph.contains("atrim=160:300"));
    }
}
