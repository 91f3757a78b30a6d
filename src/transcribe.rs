//! Transcription adapter: timestamped segments from an audio file.
//!
//! The real speech-to-text engine sits behind [`TranscriptionBackend`]; the
//! default implementation shells out to a whisper.cpp-compatible CLI. The
//! adapter also owns capped streaming audio download and the transcript text
//! round-trip used when an episode is reprocessed.

use crate::error::{PodscrubError, Result};
use crate::url_guard;
use crate::util::time::{format_vtt_timestamp, parse_timestamp};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// A timestamped span of transcribed speech. Ordered by `start`; validated
/// segments never overlap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Narrow contract over the speech-to-text engine.
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// Transcribe an audio file into ordered, non-empty segments.
    async fn transcribe(&self, audio_path: &Path) -> Result<Vec<TranscriptSegment>>;
}

/// Backend shelling out to a whisper.cpp-compatible CLI.
///
/// The model stays resident inside the CLI process per invocation; the
/// adapter itself verifies the binary lazily on first use and caches the
/// result for the process lifetime.
pub struct WhisperCliBackend {
    bin: String,
    model: String,
    ready: OnceCell<()>,
}

impl WhisperCliBackend {
    pub fn new(bin: String, model: String) -> Self {
        Self {
            bin,
            model,
            ready: OnceCell::new(),
        }
    }

    async fn ensure_ready(&self) -> Result<()> {
        self.ready
            .get_or_try_init(|| async {
                let status = tokio::process::Command::new(&self.bin)
                    .arg("--help")
                    .stdout(std::process::Stdio::null())
                    .stderr(std::process::Stdio::null())
                    .status()
                    .await
                    .map_err(|e| {
                        PodscrubError::TranscriptionError(format!(
                            "transcriber binary {:?} not available: {e}",
                            self.bin
                        ))
                    })?;
                if !status.success() {
                    return Err(PodscrubError::TranscriptionError(format!(
                        "transcriber binary {:?} returned {status}",
                        self.bin
                    )));
                }
                info!("Transcriber ready: {} (model {})", self.bin, self.model);
                Ok(())
            })
            .await
            .map(|_| ())
    }
}

/// whisper.cpp JSON output shape (offsets are milliseconds)
#[derive(Deserialize)]
struct WhisperJson {
    transcription: Vec<WhisperCue>,
}

#[derive(Deserialize)]
struct WhisperCue {
    offsets: WhisperOffsets,
    text: String,
}

#[derive(Deserialize)]
struct WhisperOffsets {
    from: u64,
    to: u64,
}

#[async_trait]
impl TranscriptionBackend for WhisperCliBackend {
    async fn transcribe(&self, audio_path: &Path) -> Result<Vec<TranscriptSegment>> {
        self.ensure_ready().await?;

        let json_base = audio_path.with_extension("whisper");
        let output = tokio::process::Command::new(&self.bin)
            .arg("-m")
            .arg(&self.model)
            .arg("-f")
            .arg(audio_path)
            .arg("-l")
            .arg("en")
            .arg("--output-json")
            .arg("--output-file")
            .arg(&json_base)
            .arg("--no-prints")
            .output()
            .await
            .map_err(|e| PodscrubError::TranscriptionError(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PodscrubError::TranscriptionError(format!(
                "transcriber exited with {}: {}",
                output.status,
                stderr.chars().take(500).collect::<String>()
            )));
        }

        let json_path = json_base.with_extension("whisper.json");
        let raw = tokio::fs::read_to_string(&json_path).await.map_err(|e| {
            PodscrubError::TranscriptionError(format!("missing transcriber output: {e}"))
        })?;
        let _ = tokio::fs::remove_file(&json_path).await;

        let parsed: WhisperJson = serde_json::from_str(&raw)
            .map_err(|e| PodscrubError::TranscriptionError(format!("bad transcriber JSON: {e}")))?;

        let segments = sanitize_segments(parsed.transcription.into_iter().map(|cue| {
            TranscriptSegment {
                start: cue.offsets.from as f64 / 1000.0,
                end: cue.offsets.to as f64 / 1000.0,
                text: cue.text,
            }
        }));

        info!(
            "Transcription complete: {} segments, {:.1} min",
            segments.len(),
            segments.last().map(|s| s.end / 60.0).unwrap_or(0.0)
        );
        Ok(segments)
    }
}

/// Enforce the segment contract: trimmed non-empty text, `end > start`,
/// monotone non-decreasing starts. Silent/empty cues are dropped.
pub fn sanitize_segments<I>(raw: I) -> Vec<TranscriptSegment>
where
    I: IntoIterator<Item = TranscriptSegment>,
{
    let mut segments: Vec<TranscriptSegment> = Vec::new();
    for mut seg in raw {
        seg.text = seg.text.trim().to_string();
        if seg.text.is_empty() || seg.end <= seg.start {
            continue;
        }
        if let Some(prev) = segments.last()
            && seg.start < prev.start
        {
            continue;
        }
        segments.push(seg);
    }
    segments
}

/// Narrow contract over episode audio retrieval.
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    /// Fetch the enclosure at `url` into `dest`.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<PathBuf>;
}

/// HTTP fetcher with SSRF validation and a size cap.
pub struct HttpAudioFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpAudioFetcher {
    pub fn new(client: reqwest::Client, max_bytes: u64) -> Self {
        Self { client, max_bytes }
    }
}

#[async_trait]
impl AudioFetcher for HttpAudioFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<PathBuf> {
        download_audio(&self.client, url, dest, self.max_bytes).await
    }
}

/// Download an episode's audio to `dest` (staging file + rename).
///
/// The URL passes SSRF validation first. Downloads use a browser-like
/// User-Agent (some CDNs reject generic clients) and abort past `max_bytes`.
pub async fn download_audio(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    max_bytes: u64,
) -> Result<PathBuf> {
    let url = url_guard::validate_url(url).await?;

    debug!("Downloading audio from: {url}");
    let response = client
        .get(&url)
        .header(
            "User-Agent",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        )
        .header("Accept", "*/*")
        .send()
        .await?
        .error_for_status()?;

    if let Some(len) = response.content_length()
        && len > max_bytes
    {
        return Err(PodscrubError::DownloadError(format!(
            "audio file too large: {:.1} MB (max {} MB)",
            len as f64 / (1024.0 * 1024.0),
            max_bytes / (1024 * 1024)
        )));
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let staging = dest.with_extension("part");
    let mut file = tokio::fs::File::create(&staging).await?;
    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        written += chunk.len() as u64;
        if written > max_bytes {
            drop(file);
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(PodscrubError::DownloadError(format!(
                "download exceeded {} MB cap",
                max_bytes / (1024 * 1024)
            )));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&staging, dest).await?;
    info!(
        "Downloaded {:.1} MB to {}",
        written as f64 / (1024.0 * 1024.0),
        dest.display()
    );
    Ok(dest.to_path_buf())
}

/// Render segments as the stored transcript text format:
/// `[HH:MM:SS.mmm --> HH:MM:SS.mmm] text`, one line per segment.
pub fn segments_to_text(segments: &[TranscriptSegment]) -> String {
    let mut lines = Vec::with_capacity(segments.len());
    for seg in segments {
        lines.push(format!(
            "[{} --> {}] {}",
            format_vtt_timestamp(seg.start),
            format_vtt_timestamp(seg.end),
            seg.text
        ));
    }
    lines.join("\n")
}

/// Render segments as a WebVTT document.
pub fn segments_to_vtt(segments: &[TranscriptSegment]) -> String {
    let mut out = String::from("WEBVTT\n");
    for seg in segments {
        out.push_str(&format!(
            "\n{} --> {}\n{}\n",
            format_vtt_timestamp(seg.start),
            format_vtt_timestamp(seg.end),
            seg.text
        ));
    }
    out
}

/// Parse stored transcript text back into segments.
///
/// Lines that do not match the expected shape are skipped; returns an empty
/// vector rather than an error so callers can fall back to re-transcription.
pub fn parse_transcript_text(transcript: &str) -> Vec<TranscriptSegment> {
    let mut segments = Vec::new();
    for line in transcript.lines() {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('[') else {
            continue;
        };
        let Some((times, text)) = rest.split_once("] ") else {
            continue;
        };
        let Some((start_str, end_str)) = times.split_once(" --> ") else {
            continue;
        };
        let (Ok(start), Ok(end)) = (parse_timestamp(start_str), parse_timestamp(end_str)) else {
            warn!("Skipping unparseable transcript line: {line:?}");
            continue;
        };
        let text = text.trim();
        if text.is_empty() || end <= start {
            continue;
        }
        segments.push(TranscriptSegment {
            start,
            end,
            text: text.to_string(),
        });
    }
    segments
}
