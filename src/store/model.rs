//! Persisted entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Episode lifecycle status. Transitions are single-writer and monotone
/// within one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeStatus {
    Pending,
    Processing,
    Processed,
    Failed,
    PermanentlyFailed,
}

/// A subscribed podcast. Owns its episodes (cascading delete).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Podcast {
    pub slug: String,
    pub source_url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub artwork_url: Option<String>,
    #[serde(default)]
    pub artwork_cached: bool,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Conditional-fetch validators from the last refresh
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One episode, unique per `(podcast_slug, episode_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub podcast_slug: String,
    pub episode_id: String,
    pub original_url: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: EpisodeStatus,
    #[serde(default)]
    pub processed_file: Option<String>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub original_duration: Option<f64>,
    #[serde(default)]
    pub new_duration: Option<f64>,
    #[serde(default)]
    pub ads_removed: u32,
    #[serde(default)]
    pub ads_removed_first_pass: u32,
    #[serde(default)]
    pub ads_removed_second_pass: u32,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Episode {
    pub fn new(podcast_slug: &str, episode_id: &str, original_url: &str, title: &str) -> Self {
        let now = Utc::now();
        Self {
            podcast_slug: podcast_slug.to_string(),
            episode_id: episode_id.to_string(),
            original_url: original_url.to_string(),
            title: title.to_string(),
            description: None,
            status: EpisodeStatus::Pending,
            processed_file: None,
            processed_at: None,
            original_duration: None,
            new_duration: None,
            ads_removed: 0,
            ads_removed_first_pass: 0,
            ads_removed_second_pass: 0,
            retry_count: 0,
            error_message: None,
            published_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Lazily-created per-episode artifacts; cleared on reprocess.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpisodeDetails {
    #[serde(default)]
    pub transcript_text: Option<String>,
    #[serde(default)]
    pub transcript_vtt: Option<String>,
    #[serde(default)]
    pub chapters_json: Option<String>,
    #[serde(default)]
    pub ad_markers_json: Option<String>,
    #[serde(default)]
    pub first_pass_prompt: Option<String>,
    #[serde(default)]
    pub first_pass_response: Option<String>,
    #[serde(default)]
    pub second_pass_prompt: Option<String>,
    #[serde(default)]
    pub second_pass_response: Option<String>,
}

/// One settings row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub value: String,
    pub is_default: bool,
    pub updated_at: DateTime<Utc>,
}

/// Queue entry state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Queued,
    Failed,
    Done,
}

/// One processing-queue entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub podcast_slug: String,
    pub episode_id: String,
    pub original_url: String,
    pub title: String,
    pub status: QueueStatus,
    pub attempts: u32,
    pub updated_at: DateTime<Utc>,
}

/// User feedback on a detected ad span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionAction {
    Confirmed,
    FalsePositive,
    Adjust,
}

/// A user-submitted ad correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdCorrection {
    pub action: CorrectionAction,
    pub start: f64,
    pub end: f64,
    pub created_at: DateTime<Utc>,
}
