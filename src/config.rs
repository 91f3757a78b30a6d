use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// LLM backend selection
#[derive(Clone, Debug, PartialEq)]
pub enum LlmProvider {
    /// Native messages API (default)
    Native,
    /// OpenAI-compatible chat-completions API (local wrappers, Ollama, etc.)
    OpenAiCompat,
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Root directory for the store snapshot and per-podcast files
    pub data_dir: PathBuf,
    /// Public base URL used when rewriting enclosures (external layer)
    pub base_url: String,
    /// LLM backend selection
    pub llm_provider: LlmProvider,
    /// Model id passed to the LLM backend
    pub llm_model: String,
    /// LLM endpoint base URL
    pub llm_base_url: String,
    /// API key for the LLM backend (empty = unauthenticated local endpoint)
    pub llm_api_key: String,
    /// Per-call LLM timeout
    pub llm_timeout: Duration,
    /// Path to the "ad replaced" marker tone mixed into cut points
    pub replace_marker_path: PathBuf,
    /// Target bitrate for re-encoded episodes
    pub bitrate: String,
    /// Transcriber binary (whisper.cpp CLI or compatible)
    pub transcriber_bin: String,
    /// Whisper model name or path handed to the transcriber binary
    pub whisper_model: String,
    /// Episode retention, in minutes from creation
    pub retention_period_minutes: i64,
    /// Max pipeline attempts before an episode is permanently failed
    pub max_retries: u32,
    /// Max queue-entry age eligible for retry reset, in hours
    pub max_age_hours: i64,
    /// Feed refresh interval
    pub refresh_interval: Duration,
    /// Scheduler poll interval
    pub poll_interval: Duration,
    /// Download size cap in bytes
    pub max_download_bytes: u64,
    /// ffprobe timeout
    pub probe_timeout: Duration,
    /// ffmpeg edit timeout
    pub edit_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    /// Every key is optional; defaults suit a single-host deployment.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let data_dir = PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()));

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());

        let llm_provider = match env::var("LLM_PROVIDER")
            .unwrap_or_else(|_| "native".to_string())
            .to_lowercase()
            .as_str()
        {
            "openai-compatible" | "openai" => LlmProvider::OpenAiCompat,
            _ => LlmProvider::Native,
        };

        let llm_model =
            env::var("LLM_MODEL").unwrap_or_else(|_| "claude-sonnet-4-5-20250929".to_string());

        let llm_base_url = env::var("LLM_BASE_URL").unwrap_or_else(|_| match llm_provider {
            LlmProvider::Native => "https://api.anthropic.com".to_string(),
            LlmProvider::OpenAiCompat => "http://localhost:8000/v1".to_string(),
        });

        let llm_api_key = env::var("LLM_API_KEY")
            .or_else(|_| env::var("ANTHROPIC_API_KEY"))
            .unwrap_or_default();

        let llm_timeout = Duration::from_secs(parse_or("LLM_TIMEOUT_SECS", 120));

        let replace_marker_path = PathBuf::from(
            env::var("REPLACE_MARKER_PATH").unwrap_or_else(|_| "assets/replace.mp3".to_string()),
        );

        let bitrate = env::var("BITRATE").unwrap_or_else(|_| "128k".to_string());

        let transcriber_bin =
            env::var("TRANSCRIBER_BIN").unwrap_or_else(|_| "whisper-cli".to_string());
        let whisper_model = env::var("WHISPER_MODEL").unwrap_or_else(|_| "small".to_string());

        Ok(Config {
            data_dir,
            base_url,
            llm_provider,
            llm_model,
            llm_base_url,
            llm_api_key,
            llm_timeout,
            replace_marker_path,
            bitrate,
            transcriber_bin,
            whisper_model,
            retention_period_minutes: parse_or("RETENTION_PERIOD_MINUTES", 1440),
            max_retries: parse_or("MAX_RETRIES", 3),
            max_age_hours: parse_or("MAX_AGE_HOURS", 48),
            refresh_interval: Duration::from_secs(parse_or("REFRESH_INTERVAL_SECS", 900)),
            poll_interval: Duration::from_secs(parse_or("POLL_INTERVAL_SECS", 10)),
            max_download_bytes: parse_or("MAX_DOWNLOAD_MB", 500) * 1024 * 1024,
            probe_timeout: Duration::from_secs(parse_or("FFPROBE_TIMEOUT_SECS", 10)),
            edit_timeout: Duration::from_secs(parse_or("FFMPEG_TIMEOUT_SECS", 300)),
        })
    }
}

fn parse_or<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        // Only assert keys that are unlikely to be set in CI
        let config = Config::from_env().unwrap();
        assert_eq!(config.bitrate, "128k");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retention_period_minutes, 1440);
        assert_eq!(config.refresh_interval, Duration::from_secs(900));
        assert_eq!(config.max_download_bytes, 500 * 1024 * 1024);
    }
}
