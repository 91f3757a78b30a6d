//! Feed refresh: narrow source/parser contracts and the upsert path.
//!
//! RSS fetching and XML parsing live outside the core. The refresh loop
//! consumes parsed episode records through [`FeedSource`] and [`FeedParser`],
//! de-duplicates enclosures, creates pending episodes, and enqueues them.

use crate::error::Result;
use crate::status::StatusBus;
use crate::store::model::{Episode, EpisodeStatus};
use crate::store::{StateStore, normalize_title};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// One enclosure parsed out of a feed.
#[derive(Debug, Clone)]
pub struct ParsedEpisode {
    pub guid: Option<String>,
    pub enclosure_url: String,
    pub title: String,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Result of a conditional feed fetch. `body` is `None` on 304.
#[derive(Debug, Clone)]
pub struct FeedFetch {
    pub body: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// Narrow contract over the feed transport.
///
/// Implementations perform the conditional HTTP fetch; every outbound URL
/// must pass the SSRF guard first.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<FeedFetch>;
}

/// Narrow contract over the feed format: turns a fetched body into the
/// episode records the core consumes.
pub trait FeedParser: Send + Sync {
    fn parse(&self, body: &str) -> Result<Vec<ParsedEpisode>>;
}

/// Stable episode id: FNV-1a over the GUID when present, else the enclosure
/// URL.
pub fn episode_id_for(guid: Option<&str>, enclosure_url: &str) -> String {
    let input = guid.filter(|g| !g.trim().is_empty()).unwrap_or(enclosure_url);
    format!("{:016x}", fnv1a64(input.as_bytes()))
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Refresh one podcast's feed: conditional fetch, parse, de-duplicate,
/// create pending episodes, enqueue. Returns the number of new episodes.
pub async fn refresh_podcast(
    store: &StateStore,
    status: &StatusBus,
    source: &dyn FeedSource,
    parser: &dyn FeedParser,
    slug: &str,
) -> Result<usize> {
    let Some(podcast) = store.get_podcast(slug) else {
        return Ok(0);
    };
    let podcast_name = podcast.title.clone().unwrap_or_else(|| slug.to_string());
    status.start_feed_refresh(slug, &podcast_name);

    let fetch = match source
        .fetch(
            &podcast.source_url,
            podcast.etag.as_deref(),
            podcast.last_modified.as_deref(),
        )
        .await
    {
        Ok(fetch) => fetch,
        Err(e) => {
            status.complete_feed_refresh(slug, 0);
            crate::metrics::record_feed_refresh("error");
            return Err(e);
        }
    };

    store.update_podcast(slug, |p| {
        p.last_checked_at = Some(Utc::now());
        if fetch.etag.is_some() {
            p.etag = fetch.etag.clone();
        }
        if fetch.last_modified.is_some() {
            p.last_modified = fetch.last_modified.clone();
        }
    })?;

    let Some(body) = fetch.body else {
        status.complete_feed_refresh(slug, 0);
        crate::metrics::record_feed_refresh("not_modified");
        return Ok(0);
    };

    let parsed = parser.parse(&body)?;

    // De-duplicate by normalized title + publish date: feeds frequently
    // re-announce the same episode under a fresh GUID.
    let mut seen: Vec<(String, Option<chrono::NaiveDate>)> = store.episode_dedup_keys(slug);
    let mut new_count = 0;

    for item in parsed {
        let dedup_key = (
            normalize_title(&item.title),
            item.published_at.map(|t| t.date_naive()),
        );
        if seen.contains(&dedup_key) {
            continue;
        }

        let episode_id = episode_id_for(item.guid.as_deref(), &item.enclosure_url);
        let mut episode = Episode::new(slug, &episode_id, &item.enclosure_url, &item.title);
        episode.description = item.description.clone();
        episode.published_at = item.published_at;

        if store.create_episode_if_absent(episode)? {
            info!("[{slug}] New episode: {:?}", item.title);
            store.enqueue(slug, &episode_id, &item.enclosure_url, &item.title)?;
            status.queue_episode(slug, &episode_id, &item.title);
            seen.push(dedup_key);
            new_count += 1;
        }
    }

    status.complete_feed_refresh(slug, new_count);
    crate::metrics::record_feed_refresh("updated");
    Ok(new_count)
}

/// Refresh every podcast and run retention cleanup. Never blocks on the
/// processing slot; new work is only enqueued.
pub async fn refresh_all(
    store: &StateStore,
    status: &StatusBus,
    source: &dyn FeedSource,
    parser: &dyn FeedParser,
    default_retention_minutes: i64,
) {
    for podcast in store.list_podcasts() {
        match refresh_podcast(store, status, source, parser, &podcast.slug).await {
            Ok(n) if n > 0 => info!("[{}] Refresh found {n} new episode(s)", podcast.slug),
            Ok(_) => {}
            Err(e) => warn!("[{}] Feed refresh failed: {e}", podcast.slug),
        }
    }

    let retention_minutes = store
        .get_setting("retention_period_minutes")
        .and_then(|v| v.parse().ok())
        .unwrap_or(default_retention_minutes);
    if let Err(e) = store.cleanup_old(retention_minutes) {
        warn!("Retention cleanup failed: {e}");
    }

    crate::metrics::set_queue_depth(store.queue_length());
}

/// Episodes eligible for a fresh processing attempt after a restart:
/// anything stuck in `processing` is reset to `pending` (stale-reset).
pub fn reset_stale_processing(store: &StateStore) -> Result<usize> {
    let mut reset = 0;
    for podcast in store.list_podcasts() {
        for episode in store.list_episodes(&podcast.slug) {
            if episode.status == EpisodeStatus::Processing {
                store.update_episode(&podcast.slug, &episode.episode_id, |e| {
                    e.status = EpisodeStatus::Pending;
                })?;
                reset += 1;
            }
        }
    }
    if reset > 0 {
        info!("Reset {reset} stale processing episode(s) to pending");
    }
    Ok(reset)
}
