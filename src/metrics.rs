use metrics::{counter, gauge, histogram};
use std::time::Instant;

// ── Metric names ────────────────────────────────────────────────────────

/// Episodes fully processed
pub const EPISODES_PROCESSED: &str = "podscrub_episodes_processed_total";
/// Episodes that failed a pipeline stage
pub const EPISODES_FAILED: &str = "podscrub_episodes_failed_total";
/// Ads proposed by detection, labeled by stage
pub const ADS_DETECTED: &str = "podscrub_ads_detected_total";
/// Ads rejected by validation
pub const ADS_REJECTED: &str = "podscrub_ads_rejected_total";
/// Seconds of ad audio removed
pub const AD_SECONDS_REMOVED: &str = "podscrub_ad_seconds_removed_total";
/// Episode pipeline duration in seconds
pub const PIPELINE_DURATION: &str = "podscrub_pipeline_duration_seconds";
/// Episodes waiting in the queue
pub const QUEUE_DEPTH: &str = "podscrub_queue_depth";
/// Feed refreshes by result (updated, not_modified, error)
pub const FEED_REFRESHES: &str = "podscrub_feed_refreshes_total";

// ── Recording helpers ───────────────────────────────────────────────────

/// Record a completed episode
pub fn record_episode_processed() {
    counter!(EPISODES_PROCESSED).increment(1);
}

/// Record a failed episode
pub fn record_episode_failed() {
    counter!(EPISODES_FAILED).increment(1);
}

/// Record detected ads for a stage
pub fn record_ads_detected(stage: &str, count: usize) {
    counter!(ADS_DETECTED, "stage" => stage.to_string()).increment(count as u64);
}

/// Record validation rejections
pub fn record_ads_rejected(count: usize) {
    counter!(ADS_REJECTED).increment(count as u64);
}

/// Record seconds of ad audio removed
pub fn record_ad_seconds_removed(seconds: f64) {
    counter!(AD_SECONDS_REMOVED).increment(seconds.max(0.0) as u64);
}

/// Record the wall-clock duration of one episode run
pub fn record_pipeline_duration(start: Instant) {
    histogram!(PIPELINE_DURATION).record(start.elapsed().as_secs_f64());
}

/// Update the queue depth gauge
pub fn set_queue_depth(depth: usize) {
    gauge!(QUEUE_DEPTH).set(depth as f64);
}

/// Record a feed refresh result
pub fn record_feed_refresh(result: &str) {
    counter!(FEED_REFRESHES, "result" => result.to_string()).increment(1);
}
