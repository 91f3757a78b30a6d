//! Audio duration probe with an mtime-keyed cache.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, SystemTime};
use tracing::warn;

static DURATION_CACHE: LazyLock<DashMap<PathBuf, (f64, SystemTime)>> = LazyLock::new(DashMap::new);

/// Get audio duration in seconds using ffprobe, cached by `(path, mtime)`.
///
/// Returns `None` when the probe fails or times out; callers treat an
/// unknown duration as a stage failure where it matters.
pub async fn get_audio_duration(path: &Path, timeout: Duration) -> Option<f64> {
    let mtime = tokio::fs::metadata(path).await.ok()?.modified().ok();

    if let Some(mtime) = mtime
        && let Some(entry) = DURATION_CACHE.get(path)
        && entry.1 == mtime
    {
        return Some(entry.0);
    }

    let duration = probe(path, timeout).await?;
    if let Some(mtime) = mtime {
        DURATION_CACHE.insert(path.to_path_buf(), (duration, mtime));
    }
    Some(duration)
}

async fn probe(path: &Path, timeout: Duration) -> Option<f64> {
    let cmd = tokio::process::Command::new("ffprobe")
        .args(["-v", "error", "-show_entries", "format=duration"])
        .args(["-of", "default=noprint_wrappers=1:nokey=1"])
        .arg(path)
        .output();

    let output = match tokio::time::timeout(timeout, cmd).await {
        Ok(Ok(out)) => out,
        Ok(Err(e)) => {
            warn!("ffprobe failed for {}: {e}", path.display());
            return None;
        }
        Err(_) => {
            warn!("ffprobe timeout for {}", path.display());
            return None;
        }
    };

    if !output.status.success() {
        warn!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    match stdout.trim().parse::<f64>() {
        Ok(duration) => Some(duration),
        Err(e) => {
            warn!("Failed to parse duration for {}: {e}", path.display());
            None
        }
    }
}

/// Remove a specific path from the cache (after rewriting a file in place).
pub fn invalidate(path: &Path) {
    DURATION_CACHE.remove(path);
}

/// Clear the duration cache.
pub fn clear_cache() {
    DURATION_CACHE.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_returns_none() {
        let duration = get_audio_duration(
            Path::new("/nonexistent/episode.mp3"),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(duration, None);
    }
}
