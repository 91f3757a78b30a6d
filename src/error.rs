use crate::url_guard::SsrfError;
use thiserror::Error;

/// Domain-specific error types for Podscrub
#[derive(Error, Debug)]
pub enum PodscrubError {
    #[error("Failed to fetch content: {0}")]
    FetchError(#[from] reqwest::Error),

    #[error(transparent)]
    SsrfBlocked(#[from] SsrfError),

    #[error("Audio download failed: {0}")]
    DownloadError(String),

    #[error("Transcription failed: {0}")]
    TranscriptionError(String),

    #[error("LLM request failed: {0}")]
    LlmError(String),

    #[error("Ad detection failed: {0}")]
    DetectionError(String),

    #[error("Audio processing failed: {0}")]
    AudioEditError(String),

    #[error("Cannot parse timestamp: {0:?}")]
    TimestampError(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Another episode is already processing")]
    SlotBusy,

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// Convenience type alias for Results
pub type Result<T> = std::result::Result<T, PodscrubError>;
