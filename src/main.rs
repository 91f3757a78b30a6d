use podscrub::audio::editor::FfmpegEditor;
use podscrub::config::Config;
use podscrub::detect::classifier::AdClassifier;
use podscrub::error::Result;
use podscrub::feed::{FeedFetch, FeedParser, FeedSource, ParsedEpisode};
use podscrub::llm;
use podscrub::pipeline::Pipeline;
use podscrub::queue::{ProcessingSlot, Scheduler, run_refresh_loop};
use podscrub::status::StatusBus;
use podscrub::store::StateStore;
use podscrub::transcribe::{HttpAudioFetcher, WhisperCliBackend};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// The RSS layer is an external collaborator: it fetches feeds and hands the
/// core parsed episode records through the feed contracts. Until one is
/// attached, every feed reads as unmodified and the refresh loop only runs
/// its retention cleanup; episodes arrive through the queue-control
/// interface instead.
struct DetachedFeedSource;

#[async_trait::async_trait]
impl FeedSource for DetachedFeedSource {
    async fn fetch(
        &self,
        _url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<FeedFetch> {
        Ok(FeedFetch {
            body: None,
            etag: etag.map(str::to_string),
            last_modified: last_modified.map(str::to_string),
        })
    }
}

struct DetachedFeedParser;

impl FeedParser for DetachedFeedParser {
    fn parse(&self, _body: &str) -> Result<Vec<ParsedEpisode>> {
        Ok(Vec::new())
    }
}

#[tokio::main]
async fn main() {
    // Setup logging
    tracing_subscriber::fmt::init();

    info!("Starting Podscrub - podcast ad removal");

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let store = match StateStore::open(&config.data_dir) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to open state store: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = store.seed_default_settings(&config.llm_model) {
        error!("Failed to seed default settings: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = podscrub::feed::reset_stale_processing(&store) {
        error!("Failed to reset stale episodes: {}", e);
    }

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(600))
        .connect_timeout(Duration::from_secs(5))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .expect("Failed to create HTTP client");

    let llm_client: Arc<dyn llm::LlmClient> =
        Arc::from(llm::client_from_config(&config, http.clone()));
    let model = store
        .get_setting("llm_model")
        .unwrap_or_else(|| config.llm_model.clone());
    let mut classifier = AdClassifier::new(llm_client, model, config.llm_timeout);
    if let Some(template) = store.get_setting("user_prompt_template") {
        classifier = classifier.with_user_template(template);
    }

    let transcriber = Arc::new(WhisperCliBackend::new(
        config.transcriber_bin.clone(),
        config.whisper_model.clone(),
    ));
    let editor = Arc::new(FfmpegEditor::new(
        config.replace_marker_path.clone(),
        config.bitrate.clone(),
        config.probe_timeout,
        config.edit_timeout,
    ));

    let slot = Arc::new(ProcessingSlot::new());
    let status = Arc::new(StatusBus::new());

    let fetcher = Arc::new(HttpAudioFetcher::new(http, config.max_download_bytes));
    let pipeline = Arc::new(Pipeline::new(
        Arc::clone(&store),
        Arc::clone(&slot),
        Arc::clone(&status),
        transcriber,
        classifier,
        editor,
        fetcher,
        config.clone(),
    ));

    // Background refresh loop: conditional feed fetches + retention cleanup
    let feed_source = Arc::new(DetachedFeedSource);
    let feed_parser = Arc::new(DetachedFeedParser);
    tokio::spawn(run_refresh_loop(
        Arc::clone(&store),
        Arc::clone(&status),
        feed_source,
        feed_parser,
        config.clone(),
    ));

    // Scheduler loop: one episode at a time through the pipeline
    let scheduler = Scheduler::new(store, status, pipeline, config);
    tokio::spawn(async move { scheduler.run().await });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to wait for shutdown signal: {}", e);
    }
    info!("Shutting down");
}
