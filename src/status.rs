//! In-memory processing status snapshot with subscriber broadcast.
//!
//! Producers update the snapshot on every stage change; subscribers receive
//! snapshots over a broadcast channel. Slow or dropped subscribers never
//! affect producers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Pipeline stage of the current job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Downloading,
    Transcribing,
    Classifying,
    Validating,
    Editing,
    Verifying,
    RevalidatingAds,
    Reediting,
    Finalizing,
}

/// The episode currently holding the processing slot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingJob {
    pub slug: String,
    pub episode_id: String,
    pub title: String,
    pub podcast_name: String,
    pub stage: Stage,
    pub progress: f32,
    pub started_at: DateTime<Utc>,
}

/// An episode waiting for the slot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedEpisode {
    pub slug: String,
    pub episode_id: String,
    pub title: String,
    pub queued_at: DateTime<Utc>,
}

/// A feed refresh in flight (or just finished with new episodes).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRefresh {
    pub slug: String,
    pub podcast_name: String,
    pub new_episodes: usize,
    pub started_at: DateTime<Utc>,
}

/// Process-wide status snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub current_job: Option<ProcessingJob>,
    pub queue_length: usize,
    pub queued: Vec<QueuedEpisode>,
    pub feed_refreshes: Vec<FeedRefresh>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    current_job: Option<ProcessingJob>,
    queued: Vec<QueuedEpisode>,
    feed_refreshes: HashMap<String, FeedRefresh>,
}

/// Status bus shared across the scheduler, pipeline, and HTTP layer.
pub struct StatusBus {
    inner: Mutex<Inner>,
    tx: broadcast::Sender<StatusSnapshot>,
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            inner: Mutex::new(Inner::default()),
            tx,
        }
    }

    /// Subscribe to snapshot updates. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusSnapshot> {
        self.tx.subscribe()
    }

    /// Current snapshot.
    pub fn get_status(&self) -> StatusSnapshot {
        let inner = self.inner.lock().expect("status lock");
        StatusSnapshot {
            current_job: inner.current_job.clone(),
            queue_length: inner.queued.len(),
            queued: inner.queued.clone(),
            feed_refreshes: inner.feed_refreshes.values().cloned().collect(),
            last_updated: Utc::now(),
        }
    }

    fn publish(&self) {
        // Fail-soft: send errors just mean nobody is listening
        let _ = self.tx.send(self.get_status());
    }

    pub fn start_job(&self, slug: &str, episode_id: &str, title: &str, podcast_name: &str) {
        {
            let mut inner = self.inner.lock().expect("status lock");
            inner.current_job = Some(ProcessingJob {
                slug: slug.to_string(),
                episode_id: episode_id.to_string(),
                title: title.to_string(),
                podcast_name: podcast_name.to_string(),
                stage: Stage::Downloading,
                progress: 0.0,
                started_at: Utc::now(),
            });
            inner
                .queued
                .retain(|e| !(e.slug == slug && e.episode_id == episode_id));
        }
        self.publish();
    }

    pub fn update_stage(&self, stage: Stage, progress: f32) {
        {
            let mut inner = self.inner.lock().expect("status lock");
            if let Some(job) = inner.current_job.as_mut() {
                job.stage = stage;
                job.progress = progress;
            }
        }
        self.publish();
    }

    pub fn complete_job(&self) {
        self.inner.lock().expect("status lock").current_job = None;
        self.publish();
    }

    pub fn fail_job(&self) {
        self.inner.lock().expect("status lock").current_job = None;
        self.publish();
    }

    pub fn queue_episode(&self, slug: &str, episode_id: &str, title: &str) {
        {
            let mut inner = self.inner.lock().expect("status lock");
            let exists = inner
                .queued
                .iter()
                .any(|e| e.slug == slug && e.episode_id == episode_id);
            if !exists {
                inner.queued.push(QueuedEpisode {
                    slug: slug.to_string(),
                    episode_id: episode_id.to_string(),
                    title: title.to_string(),
                    queued_at: Utc::now(),
                });
            }
        }
        self.publish();
    }

    pub fn start_feed_refresh(&self, slug: &str, podcast_name: &str) {
        {
            let mut inner = self.inner.lock().expect("status lock");
            inner.feed_refreshes.insert(
                slug.to_string(),
                FeedRefresh {
                    slug: slug.to_string(),
                    podcast_name: podcast_name.to_string(),
                    new_episodes: 0,
                    started_at: Utc::now(),
                },
            );
        }
        self.publish();
    }

    /// Finish a refresh. Refreshes that found episodes linger with the count
    /// until removed; empty ones disappear immediately.
    pub fn complete_feed_refresh(&self, slug: &str, new_episodes: usize) {
        {
            let mut inner = self.inner.lock().expect("status lock");
            if new_episodes > 0 {
                if let Some(refresh) = inner.feed_refreshes.get_mut(slug) {
                    refresh.new_episodes = new_episodes;
                }
            } else {
                inner.feed_refreshes.remove(slug);
            }
        }
        self.publish();
    }

    pub fn remove_feed_refresh(&self, slug: &str) {
        self.inner
            .lock()
            .expect("status lock")
            .feed_refreshes
            .remove(slug);
        self.publish();
    }
}
