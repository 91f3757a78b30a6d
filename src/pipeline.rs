//! Per-episode processing pipeline.
//!
//! Explicit state machine: PENDING → PROCESSING → (TRANSCRIBING →
//! CLASSIFYING → VALIDATING → EDITING → VERIFYING → VALIDATING' → EDITING')
//! → PROCESSED, with FAILED on any stage error. The global slot serializes
//! runs; release is RAII on every exit path, and the token accumulator is
//! always drained.

use crate::audio::editor::{AudioEditor, prepare_cuts};
use crate::config::Config;
use crate::detect::classifier::{
    AdClassifier, DetectionStatus, merge_and_deduplicate, merge_same_sponsor_ads,
    refine_ad_boundaries, SAME_SPONSOR_MAX_GAP,
};
use crate::detect::roll;
use crate::detect::{AdMarker, DetectionPass};
use crate::error::{PodscrubError, Result};
use crate::llm::tokens;
use crate::metrics;
use crate::queue::ProcessingSlot;
use crate::status::{Stage, StatusBus};
use crate::store::StateStore;
use crate::store::model::EpisodeStatus;
use crate::transcribe::{
    AudioFetcher, TranscriptSegment, TranscriptionBackend, parse_transcript_text,
    segments_to_text, segments_to_vtt,
};
use crate::util::time::Cut;
use crate::validate::{AdValidator, Decision};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Everything one episode run needs, wired once at startup.
pub struct Pipeline {
    store: Arc<StateStore>,
    slot: Arc<ProcessingSlot>,
    status: Arc<StatusBus>,
    transcriber: Arc<dyn TranscriptionBackend>,
    classifier: AdClassifier,
    editor: Arc<dyn AudioEditor>,
    fetcher: Arc<dyn AudioFetcher>,
    config: Config,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<StateStore>,
        slot: Arc<ProcessingSlot>,
        status: Arc<StatusBus>,
        transcriber: Arc<dyn TranscriptionBackend>,
        classifier: AdClassifier,
        editor: Arc<dyn AudioEditor>,
        fetcher: Arc<dyn AudioFetcher>,
        config: Config,
    ) -> Self {
        Self {
            store,
            slot,
            status,
            transcriber,
            classifier,
            editor,
            fetcher,
            config,
        }
    }

    pub fn slot(&self) -> &Arc<ProcessingSlot> {
        &self.slot
    }

    /// Clear stored artifacts and run the episode again from scratch.
    pub async fn reprocess_episode(
        &self,
        slug: &str,
        episode_id: &str,
        url: &str,
        title: &str,
        podcast_name: &str,
        description: Option<&str>,
    ) -> Result<bool> {
        self.store.clear_details(slug, episode_id)?;
        self.store.update_episode(slug, episode_id, |e| {
            e.status = EpisodeStatus::Pending;
            e.processed_file = None;
            e.processed_at = None;
            e.error_message = None;
        })?;
        self.process_episode(slug, episode_id, url, title, podcast_name, description)
            .await
    }

    /// Process one episode end to end.
    ///
    /// Returns `Ok(true)` on success. A busy slot (or re-entry for the same
    /// episode) is [`PodscrubError::SlotBusy`], the 409-equivalent for
    /// callers.
    pub async fn process_episode(
        &self,
        slug: &str,
        episode_id: &str,
        url: &str,
        title: &str,
        podcast_name: &str,
        description: Option<&str>,
    ) -> Result<bool> {
        // Guard: single slot, no re-entry for the same episode
        if self.slot.is_processing(slug, episode_id) {
            return Err(PodscrubError::SlotBusy);
        }
        let Some(_guard) = self.slot.acquire(slug, episode_id, Duration::ZERO).await else {
            return Err(PodscrubError::SlotBusy);
        };

        let started = Instant::now();
        info!("[{slug}:{episode_id}] Starting: {title:?}");
        self.status.start_job(slug, episode_id, title, podcast_name);

        let (result, token_totals) = tokens::with_episode_tracking(self.run_stages(
            slug,
            episode_id,
            url,
            title,
            podcast_name,
            description,
        ))
        .await;

        if token_totals.calls > 0 {
            info!(
                "[{slug}:{episode_id}] LLM usage: {} calls, {} in / {} out tokens",
                token_totals.calls, token_totals.input_tokens, token_totals.output_tokens
            );
        }

        match result {
            Ok(()) => {
                metrics::record_episode_processed();
                metrics::record_pipeline_duration(started);
                self.status.complete_job();
                info!(
                    "[{slug}:{episode_id}] Complete in {:.1}s",
                    started.elapsed().as_secs_f64()
                );
                Ok(true)
            }
            Err(e) => {
                error!("[{slug}:{episode_id}] Failed: {e}");
                metrics::record_episode_failed();
                self.status.fail_job();
                let max_retries = self.config.max_retries;
                let _ = self.store.update_episode(slug, episode_id, |episode| {
                    episode.retry_count += 1;
                    episode.error_message = Some(e.to_string());
                    episode.status = if episode.retry_count >= max_retries {
                        EpisodeStatus::PermanentlyFailed
                    } else {
                        EpisodeStatus::Failed
                    };
                });
                Err(e)
            }
        }
        // Slot guard drops here on every path
    }

    async fn run_stages(
        &self,
        slug: &str,
        episode_id: &str,
        url: &str,
        title: &str,
        podcast_name: &str,
        description: Option<&str>,
    ) -> Result<()> {
        // Prepare: visible status first, row exists, stale error cleared
        if self.store.get_episode(slug, episode_id).is_none() {
            self.store
                .create_episode_if_absent(crate::store::model::Episode::new(
                    slug, episode_id, url, title,
                ))?;
        }
        self.store.update_episode(slug, episode_id, |e| {
            e.status = EpisodeStatus::Processing;
            e.error_message = None;
            if e.description.is_none() {
                e.description = description.map(str::to_string);
            }
        })?;

        // ── Transcribe ──────────────────────────────────────────────────
        self.status.update_stage(Stage::Downloading, 5.0);
        let staging = self.store.staging_dir();
        let audio_path = staging.join(format!("{slug}-{episode_id}.mp3"));
        self.fetcher.fetch(url, &audio_path).await?;
        let audio_cleanup = TempFile::new(audio_path.clone());

        let stored_transcript = self
            .store
            .get_details(slug, episode_id)
            .and_then(|d| d.transcript_text);
        let segments: Vec<TranscriptSegment> = match stored_transcript {
            Some(text) => {
                let parsed = parse_transcript_text(&text);
                if parsed.is_empty() {
                    info!("[{slug}:{episode_id}] Stored transcript unusable, re-transcribing");
                    self.transcribe_and_persist(slug, episode_id, &audio_cleanup.path).await?
                } else {
                    info!(
                        "[{slug}:{episode_id}] Reusing stored transcript ({} segments)",
                        parsed.len()
                    );
                    parsed
                }
            }
            None => self.transcribe_and_persist(slug, episode_id, &audio_cleanup.path).await?,
        };
        if segments.is_empty() {
            return Err(PodscrubError::TranscriptionError(
                "no transcript segments".to_string(),
            ));
        }

        let episode_duration = match self.editor.media_duration(&audio_cleanup.path).await {
            Some(duration) => duration,
            None => segments.last().map(|s| s.end).unwrap_or(0.0),
        };

        // ── Classify (pass 1) ───────────────────────────────────────────
        self.status.update_stage(Stage::Classifying, 40.0);
        let first = self
            .classifier
            .detect(&segments, podcast_name, title, description)
            .await;
        self.store.update_details(slug, episode_id, |d| {
            d.first_pass_prompt = Some(first.prompt.clone());
            d.first_pass_response = Some(first.raw_response.clone());
        })?;
        if first.status == DetectionStatus::Failed {
            return Err(PodscrubError::DetectionError(
                first.error.unwrap_or_else(|| "ad detection failed".to_string()),
            ));
        }
        metrics::record_ads_detected("first_pass", first.ads.len());
        info!(
            "[{slug}:{episode_id}] First pass: {} ad(s)",
            first.ads.len()
        );
        let first_pass_ads = first.ads;
        let mut all_ads = first_pass_ads.clone();

        // Optional blind second read on the same transcript
        let multi_pass = self
            .store
            .get_setting_bool("multi_pass_enabled")
            .unwrap_or(false);
        if multi_pass {
            info!("[{slug}:{episode_id}] Multi-pass enabled, starting blind second pass");
            let second = self
                .classifier
                .detect_blind(&segments, podcast_name, title, description)
                .await;
            self.store.update_details(slug, episode_id, |d| {
                d.second_pass_prompt = Some(second.prompt.clone());
                d.second_pass_response = Some(second.raw_response.clone());
            })?;
            if second.status == DetectionStatus::Success && !second.ads.is_empty() {
                metrics::record_ads_detected("second_pass", second.ads.len());
                all_ads = merge_and_deduplicate(all_ads, second.ads);
            }
        }

        // ── Heuristics ──────────────────────────────────────────────────
        let rolls_enabled = self
            .store
            .get_setting_bool("heuristic_rolls_enabled")
            .unwrap_or(true);
        if rolls_enabled {
            if let Some(preroll) = roll::detect_preroll(&segments, &all_ads) {
                metrics::record_ads_detected("heuristic_preroll", 1);
                all_ads.push(preroll);
            }
            if let Some(postroll) = roll::detect_postroll(&segments, &all_ads, episode_duration) {
                metrics::record_ads_detected("heuristic_postroll", 1);
                all_ads.push(postroll);
            }
        }

        // ── Refine & fuse (refine runs before same-sponsor merging) ─────
        if !all_ads.is_empty() {
            all_ads = refine_ad_boundaries(all_ads, &segments);
            all_ads = merge_same_sponsor_ads(all_ads, &segments, SAME_SPONSOR_MAX_GAP);
        }

        // Per-pass accounting
        let (first_count, second_count) = pass_counts(&all_ads, first_pass_ads.len(), multi_pass);

        // ── Validate ────────────────────────────────────────────────────
        self.status.update_stage(Stage::Validating, 55.0);
        let validator = AdValidator::new(episode_duration, segments.clone(), description)
            .with_user_corrections(self.store.not_ad_spans(slug, episode_id));
        let validation = validator.validate(all_ads);
        metrics::record_ads_rejected(validation.rejected);
        info!(
            "[{slug}:{episode_id}] Validation: {} accepted, {} review, {} rejected",
            validation.accepted, validation.reviewed, validation.rejected
        );

        // Persist every marker, rejects included, for display
        let mut stored_ads = validation.ads.clone();
        self.persist_ad_markers(slug, episode_id, &stored_ads)?;

        let ads_to_remove: Vec<&AdMarker> = validation
            .ads
            .iter()
            .filter(|ad| {
                ad.validation
                    .as_ref()
                    .is_none_or(|v| v.decision != Decision::Reject)
            })
            .collect();
        let cuts: Vec<Cut> = ads_to_remove
            .iter()
            .map(|ad| Cut::new(ad.start, ad.end))
            .collect();

        // ── Edit (pass 1) ───────────────────────────────────────────────
        self.status.update_stage(Stage::Editing, 65.0);
        let processed_path = staging.join(format!("{slug}-{episode_id}-processed.mp3"));
        let processed_cleanup = TempFile::new(processed_path.clone());
        if !self
            .editor
            .cut_and_splice(&audio_cleanup.path, &cuts, &processed_path)
            .await?
        {
            return Err(PodscrubError::AudioEditError(
                "audio edit failed".to_string(),
            ));
        }

        // Cuts as actually applied (coalesced, short ones dropped): the
        // coordinate map must match the audio, not the request.
        let mut applied_cuts = prepare_cuts(&cuts);

        // ── Verify ──────────────────────────────────────────────────────
        let verification_enabled = self
            .store
            .get_setting_bool("verification_enabled")
            .unwrap_or(true);
        if verification_enabled {
            self.status.update_stage(Stage::Verifying, 80.0);
            let verification = crate::verify::run_verification(
                self.transcriber.as_ref(),
                &self.classifier,
                &processed_path,
                podcast_name,
                title,
                description,
                &applied_cuts,
            )
            .await;

            match verification {
                Ok(outcome) if !outcome.ads_original.is_empty() => {
                    metrics::record_ads_detected("verification", outcome.ads_original.len());
                    if !multi_pass {
                        self.store.update_details(slug, episode_id, |d| {
                            d.second_pass_prompt = Some(outcome.prompt.clone());
                            d.second_pass_response = Some(outcome.raw_response.clone());
                        })?;
                    }
                    info!(
                        "[{slug}:{episode_id}] Verification found {} missed ad(s)",
                        outcome.ads_original.len()
                    );

                    // Re-validate the union in original coordinates
                    self.status.update_stage(Stage::RevalidatingAds, 85.0);
                    let union: Vec<AdMarker> = stored_ads
                        .iter()
                        .cloned()
                        .chain(outcome.ads_original.iter().cloned())
                        .collect();
                    let revalidation = AdValidator::new(episode_duration, segments.clone(), description)
                        .with_user_corrections(self.store.not_ad_spans(slug, episode_id))
                        .validate(union);
                    stored_ads = revalidation.ads.clone();
                    self.persist_ad_markers(slug, episode_id, &stored_ads)?;

                    let union_cuts: Vec<Cut> = revalidation
                        .ads
                        .iter()
                        .filter(|ad| {
                            ad.validation
                                .as_ref()
                                .is_none_or(|v| v.decision != Decision::Reject)
                        })
                        .map(|ad| Cut::new(ad.start, ad.end))
                        .collect();

                    // Idempotent re-splice from the original audio
                    self.status.update_stage(Stage::Reediting, 90.0);
                    if !self
                        .editor
                        .cut_and_splice(&audio_cleanup.path, &union_cuts, &processed_path)
                        .await?
                    {
                        return Err(PodscrubError::AudioEditError(
                            "verification re-edit failed".to_string(),
                        ));
                    }
                    applied_cuts = prepare_cuts(&union_cuts);
                }
                Ok(_) => info!("[{slug}:{episode_id}] Verification clean"),
                Err(e) => warn!("[{slug}:{episode_id}] Verification pass failed: {e}"),
            }
        }

        // ── Finalize ────────────────────────────────────────────────────
        self.status.update_stage(Stage::Finalizing, 95.0);
        let final_path = self.store.episode_audio_path(slug, episode_id);
        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let new_duration = self.editor.media_duration(&processed_path).await;
        tokio::fs::rename(&processed_path, &final_path).await?;
        processed_cleanup.disarm();

        let ads_removed = applied_cuts.len() as u32;
        self.store.update_episode(slug, episode_id, |e| {
            e.status = EpisodeStatus::Processed;
            e.processed_file = Some(format!("episodes/{episode_id}.mp3"));
            e.processed_at = Some(chrono::Utc::now());
            e.original_duration = Some(episode_duration);
            e.new_duration = new_duration;
            e.ads_removed = ads_removed;
            e.ads_removed_first_pass = first_count;
            e.ads_removed_second_pass = second_count;
        })?;

        if let Some(new_duration) = new_duration {
            let saved = episode_duration - new_duration;
            self.store.increment_total_time_saved(saved)?;
            metrics::record_ad_seconds_removed(saved);
            info!(
                "[{slug}:{episode_id}] {:.1} -> {:.1} min, {ads_removed} ad(s) removed",
                episode_duration / 60.0,
                new_duration / 60.0
            );
        }

        Ok(())
    }

    async fn transcribe_and_persist(
        &self,
        slug: &str,
        episode_id: &str,
        audio_path: &std::path::Path,
    ) -> Result<Vec<TranscriptSegment>> {
        self.status.update_stage(Stage::Transcribing, 15.0);
        let segments = self.transcriber.transcribe(audio_path).await?;
        if !segments.is_empty() {
            let text = segments_to_text(&segments);
            let vtt = segments_to_vtt(&segments);
            self.store.update_details(slug, episode_id, |d| {
                d.transcript_text = Some(text);
                d.transcript_vtt = Some(vtt);
            })?;
        }
        Ok(segments)
    }

    fn persist_ad_markers(
        &self,
        slug: &str,
        episode_id: &str,
        ads: &[AdMarker],
    ) -> Result<()> {
        let json = serde_json::to_string(ads)?;
        self.store.update_details(slug, episode_id, |d| {
            d.ad_markers_json = Some(json);
        })
    }
}

/// First/second pass accounting after fusing: merged markers count toward
/// both passes.
fn pass_counts(ads: &[AdMarker], first_pass_len: usize, multi_pass: bool) -> (u32, u32) {
    if !multi_pass {
        return (first_pass_len as u32, 0);
    }
    let first_only = ads
        .iter()
        .filter(|a| a.pass == Some(DetectionPass::First))
        .count();
    let second_only = ads
        .iter()
        .filter(|a| a.pass == Some(DetectionPass::Second))
        .count();
    let merged = ads
        .iter()
        .filter(|a| a.pass == Some(DetectionPass::Merged))
        .count();
    ((first_only + merged) as u32, (second_only + merged) as u32)
}

/// Staging file removed on drop unless disarmed (promoted to a final path).
struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.armed
            && self.path.exists()
            && let Err(e) = std::fs::remove_file(&self.path)
        {
            warn!("Failed to remove staging file {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::DetectionStage;

    fn tagged(start: f64, end: f64, pass: DetectionPass) -> AdMarker {
        let mut m = AdMarker::new(start, end, 0.9, "ad", DetectionStage::FirstPass);
        m.pass = Some(pass);
        m
    }

    #[test]
    fn test_pass_counts_single_pass() {
        let ads = vec![tagged(0.0, 30.0, DetectionPass::First)];
        assert_eq!(pass_counts(&ads, 3, false), (3, 0));
    }

    #[test]
    fn test_pass_counts_multi_pass() {
        let ads = vec![
            tagged(0.0, 30.0, DetectionPass::First),
            tagged(100.0, 130.0, DetectionPass::Merged),
            tagged(200.0, 230.0, DetectionPass::Second),
        ];
        // first = first_only + merged, second = second_only + merged
        assert_eq!(pass_counts(&ads, 2, true), (2, 2));
    }
}
