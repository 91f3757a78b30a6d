//! Single processing slot and the scheduling loops.
//!
//! One episode may hold the transcribe→edit pipeline at a time. The slot is
//! an RAII guard: release happens on every exit path. The scheduler loop
//! picks the oldest queued entry (re-arming eligible failures), and the
//! refresh loop fetches feeds and enqueues without ever blocking on the
//! slot.

use crate::config::Config;
use crate::error::{PodscrubError, Result};
use crate::feed::{self, FeedParser, FeedSource};
use crate::pipeline::Pipeline;
use crate::status::StatusBus;
use crate::store::StateStore;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{error, info, warn};

/// The single processing slot.
pub struct ProcessingSlot {
    semaphore: Arc<Semaphore>,
    current: Mutex<Option<(String, String)>>,
}

impl Default for ProcessingSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingSlot {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            current: Mutex::new(None),
        }
    }

    /// Try to acquire the slot for an episode. With a zero timeout this is a
    /// non-blocking attempt. Returns `None` when the slot is busy.
    pub async fn acquire(
        self: &Arc<Self>,
        slug: &str,
        episode_id: &str,
        timeout: Duration,
    ) -> Option<SlotGuard> {
        let permit = if timeout.is_zero() {
            self.semaphore.clone().try_acquire_owned().ok()?
        } else {
            tokio::time::timeout(timeout, self.semaphore.clone().acquire_owned())
                .await
                .ok()?
                .ok()?
        };

        *self.current.lock().expect("slot lock") =
            Some((slug.to_string(), episode_id.to_string()));
        Some(SlotGuard {
            _permit: permit,
            slot: Arc::clone(self),
        })
    }

    /// The episode currently holding the slot.
    pub fn current(&self) -> Option<(String, String)> {
        self.current.lock().expect("slot lock").clone()
    }

    pub fn is_busy(&self) -> bool {
        self.current().is_some()
    }

    pub fn is_processing(&self, slug: &str, episode_id: &str) -> bool {
        self.current()
            .is_some_and(|(s, e)| s == slug && e == episode_id)
    }
}

/// Guard returned by [`ProcessingSlot::acquire`]. Dropping it releases the
/// slot; release is idempotent by construction.
pub struct SlotGuard {
    _permit: OwnedSemaphorePermit,
    slot: Arc<ProcessingSlot>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        *self.slot.current.lock().expect("slot lock") = None;
    }
}

/// Drives the pipeline from the queue.
pub struct Scheduler {
    store: Arc<StateStore>,
    status: Arc<StatusBus>,
    pipeline: Arc<Pipeline>,
    config: Config,
}

impl Scheduler {
    pub fn new(
        store: Arc<StateStore>,
        status: Arc<StatusBus>,
        pipeline: Arc<Pipeline>,
        config: Config,
    ) -> Self {
        Self {
            store,
            status,
            pipeline,
            config,
        }
    }

    /// Scheduler loop: one queued episode at a time, oldest first. Failed
    /// entries are re-armed under the backoff policy when nothing is queued.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            crate::metrics::set_queue_depth(self.store.queue_length());

            if self.pipeline.slot().is_busy() {
                continue;
            }

            let entry = match self.store.next_queued() {
                Some(entry) => entry,
                None => {
                    // Nothing queued: see if any failed entries are eligible
                    match self
                        .store
                        .reset_failed_queue_items(self.config.max_retries, self.config.max_age_hours)
                    {
                        Ok(0) | Err(_) => continue,
                        Ok(_) => match self.store.next_queued() {
                            Some(entry) => entry,
                            None => continue,
                        },
                    }
                }
            };

            let podcast_name = self
                .store
                .get_podcast(&entry.podcast_slug)
                .and_then(|p| p.title)
                .unwrap_or_else(|| entry.podcast_slug.clone());
            let description = self
                .store
                .get_episode(&entry.podcast_slug, &entry.episode_id)
                .and_then(|e| e.description);

            info!(
                "[{}:{}] Scheduler starting: {:?}",
                entry.podcast_slug, entry.episode_id, entry.title
            );

            let result = self
                .pipeline
                .process_episode(
                    &entry.podcast_slug,
                    &entry.episode_id,
                    &entry.original_url,
                    &entry.title,
                    &podcast_name,
                    description.as_deref(),
                )
                .await;

            let outcome = match result {
                Ok(true) => self.store.mark_queue_done(&entry.podcast_slug, &entry.episode_id),
                Ok(false) | Err(PodscrubError::SlotBusy) => Ok(()),
                Err(e) => {
                    error!(
                        "[{}:{}] Pipeline failed: {e}",
                        entry.podcast_slug, entry.episode_id
                    );
                    self.store
                        .mark_queue_failed(&entry.podcast_slug, &entry.episode_id)
                }
            };
            if let Err(e) = outcome {
                warn!("Queue bookkeeping failed: {e}");
            }
        }
    }
}

/// Background refresh loop: every `refresh_interval`, refresh all feeds and
/// run retention cleanup. Enqueues only; never touches the slot.
pub async fn run_refresh_loop(
    store: Arc<StateStore>,
    status: Arc<StatusBus>,
    source: Arc<dyn FeedSource>,
    parser: Arc<dyn FeedParser>,
    config: Config,
) {
    let mut ticker = tokio::time::interval(config.refresh_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        feed::refresh_all(
            &store,
            &status,
            source.as_ref(),
            parser.as_ref(),
            config.retention_period_minutes,
        )
        .await;
    }
}

/// Convenience wrapper matching the exposed queue-control interface.
pub fn enqueue_episode(
    store: &StateStore,
    status: &StatusBus,
    slug: &str,
    episode_id: &str,
    url: &str,
    title: &str,
) -> Result<()> {
    store.enqueue(slug, episode_id, url, title)?;
    status.queue_episode(slug, episode_id, title);
    crate::metrics::set_queue_depth(store.queue_length());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_slot_exclusive() {
        let slot = Arc::new(ProcessingSlot::new());
        let guard = slot.acquire("show", "ep1", Duration::ZERO).await;
        assert!(guard.is_some());
        assert!(slot.is_busy());
        assert!(slot.is_processing("show", "ep1"));

        // Second acquisition fails while the slot is held
        assert!(slot.acquire("show", "ep2", Duration::ZERO).await.is_none());

        drop(guard);
        assert!(!slot.is_busy());
        assert!(slot.acquire("show", "ep2", Duration::ZERO).await.is_some());
    }

    #[tokio::test]
    async fn test_slot_release_on_drop_is_idempotent() {
        let slot = Arc::new(ProcessingSlot::new());
        for _ in 0..3 {
            let guard = slot.acquire("show", "ep1", Duration::ZERO).await.unwrap();
            drop(guard);
            assert!(!slot.is_busy());
        }
    }

    #[tokio::test]
    async fn test_slot_acquire_with_timeout() {
        let slot = Arc::new(ProcessingSlot::new());
        let guard = slot.acquire("show", "ep1", Duration::ZERO).await.unwrap();

        // Times out while held
        let waited = slot
            .acquire("show", "ep2", Duration::from_millis(50))
            .await;
        assert!(waited.is_none());

        drop(guard);
        let waited = slot
            .acquire("show", "ep2", Duration::from_millis(50))
            .await;
        assert!(waited.is_some());
        assert!(slot.is_processing("show", "ep2"));
    }

    #[tokio::test]
    async fn test_slot_serializes_two_acquirers() {
        let slot = Arc::new(ProcessingSlot::new());
        let guard = slot.acquire("show", "a", Duration::ZERO).await.unwrap();

        let slot2 = Arc::clone(&slot);
        let waiter = tokio::spawn(async move {
            slot2
                .acquire("show", "b", Duration::from_secs(5))
                .await
                .is_some()
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);
        assert!(waiter.await.unwrap());
    }
}
