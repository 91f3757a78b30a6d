//! Durable keyed state store.
//!
//! In-memory concurrent maps backed by a single JSON snapshot written with
//! temp-file + atomic rename. Writers are serialized through one lock;
//! readers go straight to the maps. Owns every persisted entity and the
//! podcast → episode → details cascade.

pub mod model;

use crate::detect::classifier::DEFAULT_USER_TEMPLATE;
use crate::error::{PodscrubError, Result};
use crate::util::time::Cut;
use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use model::{
    AdCorrection, CorrectionAction, Episode, EpisodeDetails, EpisodeStatus, Podcast, QueueEntry,
    QueueStatus, Setting,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

/// Key for episode-scoped maps: `(podcast_slug, episode_id)`.
pub type EpisodeKey = (String, String);

/// Cumulative-stats key for seconds of audio removed across all runs.
pub const STAT_TOTAL_TIME_SAVED: &str = "total_time_saved";

/// Overlap fraction (of the shorter span) at which two corrections conflict.
const CORRECTION_CONFLICT_OVERLAP: f64 = 0.5;

/// Retry backoff: minimum wait before a failed queue entry is reset.
pub fn retry_wait(attempts: u32) -> ChronoDuration {
    match attempts {
        0 => ChronoDuration::zero(),
        1 => ChronoDuration::minutes(5),
        2 => ChronoDuration::minutes(15),
        _ => ChronoDuration::minutes(45),
    }
}

#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
    podcasts: Vec<Podcast>,
    episodes: Vec<Episode>,
    details: Vec<(EpisodeKey, EpisodeDetails)>,
    settings: Vec<(String, Setting)>,
    stats: Vec<(String, f64)>,
    queue: Vec<QueueEntry>,
    corrections: Vec<(EpisodeKey, Vec<AdCorrection>)>,
}

/// The state store. Cheap to share behind an `Arc`.
pub struct StateStore {
    data_dir: PathBuf,
    snapshot_path: PathBuf,
    podcasts: DashMap<String, Podcast>,
    episodes: DashMap<EpisodeKey, Episode>,
    details: DashMap<EpisodeKey, EpisodeDetails>,
    settings: DashMap<String, Setting>,
    stats: DashMap<String, f64>,
    queue: DashMap<EpisodeKey, QueueEntry>,
    corrections: DashMap<EpisodeKey, Vec<AdCorrection>>,
    write_lock: Mutex<()>,
}

impl StateStore {
    /// Open (or create) the store rooted at `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let snapshot_path = data_dir.join("podscrub.json");

        let store = Self {
            data_dir: data_dir.to_path_buf(),
            snapshot_path,
            podcasts: DashMap::new(),
            episodes: DashMap::new(),
            details: DashMap::new(),
            settings: DashMap::new(),
            stats: DashMap::new(),
            queue: DashMap::new(),
            corrections: DashMap::new(),
            write_lock: Mutex::new(()),
        };

        if store.snapshot_path.exists() {
            let raw = std::fs::read_to_string(&store.snapshot_path)?;
            let snapshot: Snapshot = serde_json::from_str(&raw)?;
            for p in snapshot.podcasts {
                store.podcasts.insert(p.slug.clone(), p);
            }
            for e in snapshot.episodes {
                store
                    .episodes
                    .insert((e.podcast_slug.clone(), e.episode_id.clone()), e);
            }
            for (k, d) in snapshot.details {
                store.details.insert(k, d);
            }
            for (k, s) in snapshot.settings {
                store.settings.insert(k, s);
            }
            for (k, v) in snapshot.stats {
                store.stats.insert(k, v);
            }
            for q in snapshot.queue {
                store
                    .queue
                    .insert((q.podcast_slug.clone(), q.episode_id.clone()), q);
            }
            for (k, c) in snapshot.corrections {
                store.corrections.insert(k, c);
            }
            info!(
                "Store loaded: {} podcast(s), {} episode(s)",
                store.podcasts.len(),
                store.episodes.len()
            );
        }

        Ok(store)
    }

    /// Run a mutation under the writer lock, then persist the snapshot.
    fn with_write<R>(&self, mutate: impl FnOnce() -> R) -> Result<R> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| PodscrubError::StoreError("writer lock poisoned".to_string()))?;
        let out = mutate();
        self.persist()?;
        Ok(out)
    }

    fn persist(&self) -> Result<()> {
        let mut snapshot = Snapshot {
            podcasts: self.podcasts.iter().map(|e| e.value().clone()).collect(),
            episodes: self.episodes.iter().map(|e| e.value().clone()).collect(),
            details: self
                .details
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
            settings: self
                .settings
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
            stats: self.stats.iter().map(|e| (e.key().clone(), *e.value())).collect(),
            queue: self.queue.iter().map(|e| e.value().clone()).collect(),
            corrections: self
                .corrections
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        };
        // Deterministic snapshot ordering keeps diffs readable
        snapshot.podcasts.sort_by(|a, b| a.slug.cmp(&b.slug));
        snapshot.episodes.sort_by(|a, b| {
            (&a.podcast_slug, &a.episode_id).cmp(&(&b.podcast_slug, &b.episode_id))
        });
        snapshot.details.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot.settings.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot.stats.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot
            .queue
            .sort_by(|a, b| (&a.podcast_slug, &a.episode_id).cmp(&(&b.podcast_slug, &b.episode_id)));
        snapshot.corrections.sort_by(|a, b| a.0.cmp(&b.0));

        let staging = self.snapshot_path.with_extension("json.tmp");
        std::fs::write(&staging, serde_json::to_vec_pretty(&snapshot)?)?;
        std::fs::rename(&staging, &self.snapshot_path)?;
        Ok(())
    }

    // ── Paths ───────────────────────────────────────────────────────────

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Final path of an episode's processed audio.
    pub fn episode_audio_path(&self, slug: &str, episode_id: &str) -> PathBuf {
        self.data_dir
            .join(slug)
            .join("episodes")
            .join(format!("{episode_id}.mp3"))
    }

    /// Staging directory for in-flight downloads and edits.
    pub fn staging_dir(&self) -> PathBuf {
        self.data_dir.join("tmp")
    }

    // ── Podcasts ────────────────────────────────────────────────────────

    pub fn upsert_podcast(&self, podcast: Podcast) -> Result<()> {
        self.with_write(|| {
            self.podcasts.insert(podcast.slug.clone(), podcast);
        })
    }

    pub fn update_podcast(
        &self,
        slug: &str,
        mutate: impl FnOnce(&mut Podcast),
    ) -> Result<bool> {
        self.with_write(|| {
            if let Some(mut entry) = self.podcasts.get_mut(slug) {
                mutate(entry.value_mut());
                true
            } else {
                false
            }
        })
    }

    pub fn get_podcast(&self, slug: &str) -> Option<Podcast> {
        self.podcasts.get(slug).map(|e| e.value().clone())
    }

    pub fn list_podcasts(&self) -> Vec<Podcast> {
        let mut podcasts: Vec<Podcast> = self.podcasts.iter().map(|e| e.value().clone()).collect();
        podcasts.sort_by(|a, b| a.slug.cmp(&b.slug));
        podcasts
    }

    /// Delete a podcast and everything it owns (episodes, details, queue
    /// entries, corrections, on-disk files).
    pub fn delete_podcast(&self, slug: &str) -> Result<bool> {
        let removed = self.with_write(|| {
            let removed = self.podcasts.remove(slug).is_some();
            self.episodes.retain(|k, _| k.0 != slug);
            self.details.retain(|k, _| k.0 != slug);
            self.queue.retain(|k, _| k.0 != slug);
            self.corrections.retain(|k, _| k.0 != slug);
            removed
        })?;
        if removed {
            let dir = self.data_dir.join(slug);
            if dir.exists()
                && let Err(e) = std::fs::remove_dir_all(&dir)
            {
                warn!("Failed to remove {}: {e}", dir.display());
            }
        }
        Ok(removed)
    }

    // ── Episodes ────────────────────────────────────────────────────────

    /// Insert the episode if `(slug, episode_id)` is new. Returns whether it
    /// was inserted.
    pub fn create_episode_if_absent(&self, episode: Episode) -> Result<bool> {
        self.with_write(|| {
            let key = (episode.podcast_slug.clone(), episode.episode_id.clone());
            if self.episodes.contains_key(&key) {
                false
            } else {
                self.episodes.insert(key, episode);
                true
            }
        })
    }

    pub fn get_episode(&self, slug: &str, episode_id: &str) -> Option<Episode> {
        self.episodes
            .get(&(slug.to_string(), episode_id.to_string()))
            .map(|e| e.value().clone())
    }

    pub fn update_episode(
        &self,
        slug: &str,
        episode_id: &str,
        mutate: impl FnOnce(&mut Episode),
    ) -> Result<bool> {
        self.with_write(|| {
            let key = (slug.to_string(), episode_id.to_string());
            if let Some(mut entry) = self.episodes.get_mut(&key) {
                let episode = entry.value_mut();
                mutate(episode);
                episode.updated_at = Utc::now();
                true
            } else {
                false
            }
        })
    }

    pub fn list_episodes(&self, slug: &str) -> Vec<Episode> {
        let mut episodes: Vec<Episode> = self
            .episodes
            .iter()
            .filter(|e| e.key().0 == slug)
            .map(|e| e.value().clone())
            .collect();
        episodes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        episodes
    }

    /// Existing `(normalized title, published date)` pairs, used to
    /// de-duplicate enclosures on refresh.
    pub fn episode_dedup_keys(&self, slug: &str) -> Vec<(String, Option<chrono::NaiveDate>)> {
        self.episodes
            .iter()
            .filter(|e| e.key().0 == slug)
            .map(|e| {
                (
                    normalize_title(&e.value().title),
                    e.value().published_at.map(|t| t.date_naive()),
                )
            })
            .collect()
    }

    // ── Episode details ─────────────────────────────────────────────────

    pub fn get_details(&self, slug: &str, episode_id: &str) -> Option<EpisodeDetails> {
        self.details
            .get(&(slug.to_string(), episode_id.to_string()))
            .map(|e| e.value().clone())
    }

    /// Create-or-update the details row (created lazily at first artifact
    /// write).
    pub fn update_details(
        &self,
        slug: &str,
        episode_id: &str,
        mutate: impl FnOnce(&mut EpisodeDetails),
    ) -> Result<()> {
        self.with_write(|| {
            let key = (slug.to_string(), episode_id.to_string());
            let mut entry = self.details.entry(key).or_default();
            mutate(entry.value_mut());
        })
    }

    /// Clear stored artifacts (reprocess path).
    pub fn clear_details(&self, slug: &str, episode_id: &str) -> Result<()> {
        self.with_write(|| {
            self.details
                .remove(&(slug.to_string(), episode_id.to_string()));
        })
    }

    // ── Settings ────────────────────────────────────────────────────────

    pub fn get_setting(&self, key: &str) -> Option<String> {
        self.settings.get(key).map(|e| e.value().value.clone())
    }

    pub fn get_setting_bool(&self, key: &str) -> Option<bool> {
        self.get_setting(key).and_then(|v| v.parse().ok())
    }

    pub fn set_setting(&self, key: &str, value: &str, is_default: bool) -> Result<()> {
        self.with_write(|| {
            self.settings.insert(
                key.to_string(),
                Setting {
                    value: value.to_string(),
                    is_default,
                    updated_at: Utc::now(),
                },
            );
        })
    }

    /// Seed default settings on first startup. Idempotent: existing keys,
    /// default or user-set, are never touched.
    pub fn seed_default_settings(&self, llm_model: &str) -> Result<()> {
        let defaults: &[(&str, String)] = &[
            ("retention_period_minutes", "1440".to_string()),
            ("llm_model", llm_model.to_string()),
            ("user_prompt_template", DEFAULT_USER_TEMPLATE.to_string()),
            ("multi_pass_enabled", "false".to_string()),
            ("verification_enabled", "true".to_string()),
            ("heuristic_rolls_enabled", "true".to_string()),
        ];
        self.with_write(|| {
            let now = Utc::now();
            for (key, value) in defaults {
                self.settings.entry(key.to_string()).or_insert(Setting {
                    value: value.clone(),
                    is_default: true,
                    updated_at: now,
                });
            }
        })
    }

    // ── Cumulative stats ────────────────────────────────────────────────

    /// Add to the cumulative total time saved. Additive and monotone:
    /// non-positive values are ignored.
    pub fn increment_total_time_saved(&self, seconds: f64) -> Result<()> {
        if seconds <= 0.0 {
            return Ok(());
        }
        self.with_write(|| {
            *self
                .stats
                .entry(STAT_TOTAL_TIME_SAVED.to_string())
                .or_insert(0.0) += seconds;
        })
    }

    pub fn get_total_time_saved(&self) -> f64 {
        self.stats
            .get(STAT_TOTAL_TIME_SAVED)
            .map(|e| *e.value())
            .unwrap_or(0.0)
    }

    // ── Retention cleanup ───────────────────────────────────────────────

    /// Delete episodes older than the retention cutoff, along with their
    /// details, queue entries, corrections, and on-disk files. Returns
    /// `(episodes deleted, bytes freed)`.
    pub fn cleanup_old(&self, retention_minutes: i64) -> Result<(usize, u64)> {
        if retention_minutes <= 0 {
            return Ok((0, 0));
        }
        let cutoff = Utc::now() - ChronoDuration::minutes(retention_minutes);

        let doomed: Vec<EpisodeKey> = self
            .episodes
            .iter()
            .filter(|e| e.value().created_at < cutoff)
            .map(|e| e.key().clone())
            .collect();

        let mut freed_bytes: u64 = 0;
        for (slug, episode_id) in &doomed {
            let audio = self.episode_audio_path(slug, episode_id);
            if let Ok(meta) = std::fs::metadata(&audio) {
                freed_bytes += meta.len();
                if let Err(e) = std::fs::remove_file(&audio) {
                    warn!("Failed to delete {}: {e}", audio.display());
                }
            }
        }

        let deleted = self.with_write(|| {
            for key in &doomed {
                self.episodes.remove(key);
                self.details.remove(key);
                self.queue.remove(key);
                self.corrections.remove(key);
            }
            doomed.len()
        })?;

        if deleted > 0 {
            info!(
                "Cleaned up {deleted} old episode(s), freed {:.1} MB",
                freed_bytes as f64 / (1024.0 * 1024.0)
            );
        }
        Ok((deleted, freed_bytes))
    }

    // ── Queue ───────────────────────────────────────────────────────────

    /// Enqueue an episode. Entries already queued are left alone; `done` or
    /// `failed` entries are re-armed.
    pub fn enqueue(&self, slug: &str, episode_id: &str, url: &str, title: &str) -> Result<()> {
        self.with_write(|| {
            let key = (slug.to_string(), episode_id.to_string());
            match self.queue.get_mut(&key) {
                Some(mut entry) if entry.status != QueueStatus::Queued => {
                    let e = entry.value_mut();
                    e.status = QueueStatus::Queued;
                    e.updated_at = Utc::now();
                }
                Some(_) => {}
                None => {
                    self.queue.insert(
                        key,
                        QueueEntry {
                            podcast_slug: slug.to_string(),
                            episode_id: episode_id.to_string(),
                            original_url: url.to_string(),
                            title: title.to_string(),
                            status: QueueStatus::Queued,
                            attempts: 0,
                            updated_at: Utc::now(),
                        },
                    );
                }
            }
        })
    }

    /// The oldest entry still in `queued` state.
    pub fn next_queued(&self) -> Option<QueueEntry> {
        self.queue
            .iter()
            .filter(|e| e.value().status == QueueStatus::Queued)
            .min_by_key(|e| e.value().updated_at)
            .map(|e| e.value().clone())
    }

    pub fn queued_entries(&self) -> Vec<QueueEntry> {
        let mut entries: Vec<QueueEntry> = self
            .queue
            .iter()
            .filter(|e| e.value().status == QueueStatus::Queued)
            .map(|e| e.value().clone())
            .collect();
        entries.sort_by_key(|e| e.updated_at);
        entries
    }

    pub fn queue_length(&self) -> usize {
        self.queue
            .iter()
            .filter(|e| e.value().status == QueueStatus::Queued)
            .count()
    }

    pub fn mark_queue_done(&self, slug: &str, episode_id: &str) -> Result<()> {
        self.set_queue_status(slug, episode_id, QueueStatus::Done, false)
    }

    /// Mark failed and count the attempt.
    pub fn mark_queue_failed(&self, slug: &str, episode_id: &str) -> Result<()> {
        self.set_queue_status(slug, episode_id, QueueStatus::Failed, true)
    }

    fn set_queue_status(
        &self,
        slug: &str,
        episode_id: &str,
        status: QueueStatus,
        count_attempt: bool,
    ) -> Result<()> {
        self.with_write(|| {
            if let Some(mut entry) =
                self.queue.get_mut(&(slug.to_string(), episode_id.to_string()))
            {
                let e = entry.value_mut();
                e.status = status;
                if count_attempt {
                    e.attempts += 1;
                }
                e.updated_at = Utc::now();
            }
        })
    }

    /// Re-arm failed queue entries whose backoff has elapsed.
    ///
    /// An entry with `attempts = n` waits 5 / 15 / 45 minutes for
    /// n = 1 / 2 / ≥3. Entries older than `max_age_hours` are abandoned, and
    /// entries whose episode is permanently failed (or out of retries) are
    /// never reset. Returns the number of entries re-armed.
    pub fn reset_failed_queue_items(&self, max_retries: u32, max_age_hours: i64) -> Result<usize> {
        let now = Utc::now();
        let eligible: Vec<EpisodeKey> = self
            .queue
            .iter()
            .filter(|e| {
                let entry = e.value();
                if entry.status != QueueStatus::Failed {
                    return false;
                }
                let age = now - entry.updated_at;
                if age < retry_wait(entry.attempts) {
                    return false;
                }
                if age > ChronoDuration::hours(max_age_hours) {
                    return false;
                }
                match self.get_episode(&entry.podcast_slug, &entry.episode_id) {
                    Some(episode) => {
                        episode.status != EpisodeStatus::PermanentlyFailed
                            && episode.retry_count < max_retries
                    }
                    None => false,
                }
            })
            .map(|e| e.key().clone())
            .collect();

        if eligible.is_empty() {
            return Ok(0);
        }

        self.with_write(|| {
            let mut reset = 0;
            for key in &eligible {
                if let Some(mut entry) = self.queue.get_mut(key) {
                    let e = entry.value_mut();
                    e.status = QueueStatus::Queued;
                    e.updated_at = Utc::now();
                    reset += 1;
                }
            }
            info!("Reset {reset} failed queue item(s)");
            reset
        })
    }

    // ── Ad corrections ──────────────────────────────────────────────────

    /// Record a user correction, first deleting conflicting prior records.
    pub fn add_correction(
        &self,
        slug: &str,
        episode_id: &str,
        action: CorrectionAction,
        start: f64,
        end: f64,
    ) -> Result<()> {
        self.delete_conflicting_corrections(slug, episode_id, action, start, end)?;
        self.with_write(|| {
            let key = (slug.to_string(), episode_id.to_string());
            self.corrections.entry(key).or_default().push(AdCorrection {
                action,
                start,
                end,
                created_at: Utc::now(),
            });
        })
    }

    /// Confirming a span deletes overlapping prior `false_positive` records
    /// and vice versa; overlap counts when it exceeds half the shorter span.
    /// `adjust` is inert.
    pub fn delete_conflicting_corrections(
        &self,
        slug: &str,
        episode_id: &str,
        action: CorrectionAction,
        start: f64,
        end: f64,
    ) -> Result<usize> {
        let conflicting = match action {
            CorrectionAction::Confirmed => CorrectionAction::FalsePositive,
            CorrectionAction::FalsePositive => CorrectionAction::Confirmed,
            CorrectionAction::Adjust => return Ok(0),
        };

        self.with_write(|| {
            let key = (slug.to_string(), episode_id.to_string());
            let Some(mut entry) = self.corrections.get_mut(&key) else {
                return 0;
            };
            let before = entry.value().len();
            entry.value_mut().retain(|c| {
                if c.action != conflicting {
                    return true;
                }
                let overlap = (end.min(c.end) - start.max(c.start)).max(0.0);
                let shorter = (end - start).min(c.end - c.start);
                !(shorter > 0.0 && overlap / shorter > CORRECTION_CONFLICT_OVERLAP)
            });
            before - entry.value().len()
        })
    }

    pub fn get_corrections(&self, slug: &str, episode_id: &str) -> Vec<AdCorrection> {
        self.corrections
            .get(&(slug.to_string(), episode_id.to_string()))
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    /// User-marked "not an ad" spans, for the validator.
    pub fn not_ad_spans(&self, slug: &str, episode_id: &str) -> Vec<Cut> {
        self.get_corrections(slug, episode_id)
            .into_iter()
            .filter(|c| c.action == CorrectionAction::FalsePositive)
            .map(|c| Cut::new(c.start, c.end))
            .collect()
    }
}

/// Normalize an episode title for de-duplication.
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static TEST_DIR_SEQ: AtomicUsize = AtomicUsize::new(0);

    fn test_store() -> (StateStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "podscrub-store-test-{}-{}",
            std::process::id(),
            TEST_DIR_SEQ.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = std::fs::remove_dir_all(&dir);
        (StateStore::open(&dir).unwrap(), dir)
    }

    fn backdate_queue_entry(store: &StateStore, slug: &str, id: &str, minutes: i64) {
        let key = (slug.to_string(), id.to_string());
        let mut entry = store.queue.get_mut(&key).unwrap();
        entry.value_mut().updated_at = Utc::now() - ChronoDuration::minutes(minutes);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let (store, dir) = test_store();
        store
            .upsert_podcast(Podcast {
                slug: "show".to_string(),
                source_url: "https://example.com/feed.xml".to_string(),
                title: Some("Show".to_string()),
                description: None,
                artwork_url: None,
                artwork_cached: false,
                last_checked_at: None,
                etag: None,
                last_modified: None,
                created_at: Utc::now(),
            })
            .unwrap();
        store
            .create_episode_if_absent(Episode::new("show", "ep1", "https://x/audio.mp3", "Ep 1"))
            .unwrap();
        store.increment_total_time_saved(42.5).unwrap();

        let reopened = StateStore::open(&dir).unwrap();
        assert!(reopened.get_podcast("show").is_some());
        assert!(reopened.get_episode("show", "ep1").is_some());
        assert_eq!(reopened.get_total_time_saved(), 42.5);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_create_episode_if_absent_is_unique() {
        let (store, dir) = test_store();
        let ep = Episode::new("show", "ep1", "https://x/a.mp3", "Ep 1");
        assert!(store.create_episode_if_absent(ep.clone()).unwrap());
        assert!(!store.create_episode_if_absent(ep).unwrap());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_cascade_delete_podcast() {
        let (store, dir) = test_store();
        store
            .upsert_podcast(Podcast {
                slug: "show".to_string(),
                source_url: "u".to_string(),
                title: None,
                description: None,
                artwork_url: None,
                artwork_cached: false,
                last_checked_at: None,
                etag: None,
                last_modified: None,
                created_at: Utc::now(),
            })
            .unwrap();
        store
            .create_episode_if_absent(Episode::new("show", "ep1", "u", "t"))
            .unwrap();
        store
            .update_details("show", "ep1", |d| {
                d.transcript_text = Some("text".to_string())
            })
            .unwrap();
        store.enqueue("show", "ep1", "u", "t").unwrap();

        assert!(store.delete_podcast("show").unwrap());
        assert!(store.get_episode("show", "ep1").is_none());
        assert!(store.get_details("show", "ep1").is_none());
        assert_eq!(store.queue_length(), 0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_seed_default_settings_idempotent() {
        let (store, dir) = test_store();
        store.seed_default_settings("model-a").unwrap();
        assert_eq!(store.get_setting("llm_model").unwrap(), "model-a");

        // User override survives a re-seed
        store.set_setting("llm_model", "custom", false).unwrap();
        store.seed_default_settings("model-a").unwrap();
        assert_eq!(store.get_setting("llm_model").unwrap(), "custom");
        assert_eq!(
            store.get_setting("retention_period_minutes").unwrap(),
            "1440"
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_time_saved_monotone() {
        let (store, dir) = test_store();
        store.increment_total_time_saved(60.0).unwrap();
        store.increment_total_time_saved(-30.0).unwrap();
        store.increment_total_time_saved(0.0).unwrap();
        store.increment_total_time_saved(15.0).unwrap();
        assert_eq!(store.get_total_time_saved(), 75.0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_cleanup_old_removes_episode_and_children() {
        let (store, dir) = test_store();
        let mut old = Episode::new("show", "old", "u", "Old");
        old.created_at = Utc::now() - ChronoDuration::minutes(2000);
        store.create_episode_if_absent(old).unwrap();
        store
            .create_episode_if_absent(Episode::new("show", "new", "u", "New"))
            .unwrap();
        store
            .update_details("show", "old", |d| d.transcript_text = Some("x".to_string()))
            .unwrap();

        // Processed file on disk is counted and removed
        let audio = store.episode_audio_path("show", "old");
        std::fs::create_dir_all(audio.parent().unwrap()).unwrap();
        std::fs::write(&audio, vec![0u8; 2048]).unwrap();

        let (deleted, freed) = store.cleanup_old(1440).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(freed, 2048);
        assert!(store.get_episode("show", "old").is_none());
        assert!(store.get_details("show", "old").is_none());
        assert!(store.get_episode("show", "new").is_some());
        assert!(!audio.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_queue_oldest_first() {
        let (store, dir) = test_store();
        store
            .create_episode_if_absent(Episode::new("show", "a", "u", "A"))
            .unwrap();
        store
            .create_episode_if_absent(Episode::new("show", "b", "u", "B"))
            .unwrap();
        store.enqueue("show", "a", "u", "A").unwrap();
        store.enqueue("show", "b", "u", "B").unwrap();
        backdate_queue_entry(&store, "show", "b", 10);

        assert_eq!(store.next_queued().unwrap().episode_id, "b");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(retry_wait(1), ChronoDuration::minutes(5));
        assert_eq!(retry_wait(2), ChronoDuration::minutes(15));
        assert_eq!(retry_wait(3), ChronoDuration::minutes(45));
        assert_eq!(retry_wait(7), ChronoDuration::minutes(45));
    }

    #[test]
    fn test_reset_failed_respects_backoff() {
        let (store, dir) = test_store();
        store
            .create_episode_if_absent(Episode::new("show", "a", "u", "A"))
            .unwrap();
        store.enqueue("show", "a", "u", "A").unwrap();
        store.mark_queue_failed("show", "a").unwrap();

        // attempts=1, just failed: 5 minute wait not yet elapsed
        assert_eq!(store.reset_failed_queue_items(3, 48).unwrap(), 0);

        backdate_queue_entry(&store, "show", "a", 6);
        assert_eq!(store.reset_failed_queue_items(3, 48).unwrap(), 1);
        assert_eq!(store.next_queued().unwrap().episode_id, "a");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_reset_failed_second_attempt_waits_longer() {
        let (store, dir) = test_store();
        store
            .create_episode_if_absent(Episode::new("show", "a", "u", "A"))
            .unwrap();
        store.enqueue("show", "a", "u", "A").unwrap();
        store.mark_queue_failed("show", "a").unwrap();
        store.mark_queue_failed("show", "a").unwrap(); // attempts=2

        backdate_queue_entry(&store, "show", "a", 6);
        // 6 minutes < the 15 minute wait for attempts=2
        assert_eq!(store.reset_failed_queue_items(3, 48).unwrap(), 0);

        backdate_queue_entry(&store, "show", "a", 16);
        assert_eq!(store.reset_failed_queue_items(3, 48).unwrap(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_reset_failed_abandons_old_entries() {
        let (store, dir) = test_store();
        store
            .create_episode_if_absent(Episode::new("show", "a", "u", "A"))
            .unwrap();
        store.enqueue("show", "a", "u", "A").unwrap();
        store.mark_queue_failed("show", "a").unwrap();

        backdate_queue_entry(&store, "show", "a", 49 * 60);
        assert_eq!(store.reset_failed_queue_items(3, 48).unwrap(), 0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_reset_failed_skips_permanently_failed_episode() {
        let (store, dir) = test_store();
        store
            .create_episode_if_absent(Episode::new("show", "a", "u", "A"))
            .unwrap();
        store
            .update_episode("show", "a", |e| {
                e.status = EpisodeStatus::PermanentlyFailed
            })
            .unwrap();
        store.enqueue("show", "a", "u", "A").unwrap();
        store.mark_queue_failed("show", "a").unwrap();
        backdate_queue_entry(&store, "show", "a", 60);

        assert_eq!(store.reset_failed_queue_items(3, 48).unwrap(), 0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_reset_failed_skips_exhausted_retries() {
        let (store, dir) = test_store();
        store
            .create_episode_if_absent(Episode::new("show", "a", "u", "A"))
            .unwrap();
        store
            .update_episode("show", "a", |e| e.retry_count = 3)
            .unwrap();
        store.enqueue("show", "a", "u", "A").unwrap();
        store.mark_queue_failed("show", "a").unwrap();
        backdate_queue_entry(&store, "show", "a", 60);

        assert_eq!(store.reset_failed_queue_items(3, 48).unwrap(), 0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_confirm_deletes_conflicting_false_positive() {
        let (store, dir) = test_store();
        store
            .add_correction("show", "a", CorrectionAction::FalsePositive, 30.0, 90.0)
            .unwrap();
        // Confirming an overlapping span (> 50% of the shorter) removes it
        store
            .add_correction("show", "a", CorrectionAction::Confirmed, 40.0, 95.0)
            .unwrap();

        let corrections = store.get_corrections("show", "a");
        assert_eq!(corrections.len(), 1);
        assert_eq!(corrections[0].action, CorrectionAction::Confirmed);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_false_positive_deletes_conflicting_confirm() {
        let (store, dir) = test_store();
        store
            .add_correction("show", "a", CorrectionAction::Confirmed, 30.0, 90.0)
            .unwrap();
        store
            .add_correction("show", "a", CorrectionAction::FalsePositive, 30.0, 90.0)
            .unwrap();

        let corrections = store.get_corrections("show", "a");
        assert_eq!(corrections.len(), 1);
        assert_eq!(corrections[0].action, CorrectionAction::FalsePositive);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_adjust_never_deletes() {
        let (store, dir) = test_store();
        store
            .add_correction("show", "a", CorrectionAction::Confirmed, 30.0, 90.0)
            .unwrap();
        store
            .add_correction("show", "a", CorrectionAction::FalsePositive, 200.0, 260.0)
            .unwrap();
        store
            .add_correction("show", "a", CorrectionAction::Adjust, 30.0, 90.0)
            .unwrap();

        assert_eq!(store.get_corrections("show", "a").len(), 3);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_low_overlap_corrections_coexist() {
        let (store, dir) = test_store();
        store
            .add_correction("show", "a", CorrectionAction::FalsePositive, 0.0, 60.0)
            .unwrap();
        // 10s overlap of a 60s span: 17% - no conflict
        store
            .add_correction("show", "a", CorrectionAction::Confirmed, 50.0, 110.0)
            .unwrap();
        assert_eq!(store.get_corrections("show", "a").len(), 2);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_not_ad_spans() {
        let (store, dir) = test_store();
        store
            .add_correction("show", "a", CorrectionAction::FalsePositive, 10.0, 20.0)
            .unwrap();
        store
            .add_correction("show", "a", CorrectionAction::Confirmed, 100.0, 160.0)
            .unwrap();
        let spans = store.not_ad_spans("show", "a");
        assert_eq!(spans, vec![Cut::new(10.0, 20.0)]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(
            normalize_title("  Episode #42: The Answer!  "),
            "episode 42 the answer"
        );
    }
}
