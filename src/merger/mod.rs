//! Merge orchestration.
//!
//! One merge run invokes every configured provider for the requested
//! document kind, normalizes what comes back, merges the survivors and
//! publishes the result with an atomic rename. A failing provider degrades
//! the output; only a failed write or an entirely empty merge aborts the
//! request, leaving the previously published file authoritative.

use chrono::{DateTime, Utc};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::config::{Config, MergeConfig};
use crate::errors::{MergeError, ProviderError};
use crate::ingestor::{DataNormalizer, ProviderInvoker, ProviderLauncher};
use crate::models::{
    ChannelRecord, MergeKind, MergeRequest, MergeResult, NormalizedPayload, ProgrammeRecord,
    Provider,
};
use crate::utils;

pub mod epg;
pub mod playlist;

pub use epg::EpgWriter;
pub use playlist::PlaylistWriter;

pub type MergeNotificationSender = broadcast::Sender<MergeNotification>;
pub type MergeNotificationReceiver = broadcast::Receiver<MergeNotification>;

/// Emitted after every successful merge so an external PVR consumer can be
/// poked into reloading.
#[derive(Debug, Clone)]
pub struct MergeNotification {
    pub kind: MergeKind,
    pub generated_at: DateTime<Utc>,
}

pub fn create_merge_notification_channel() -> (MergeNotificationSender, MergeNotificationReceiver)
{
    broadcast::channel(16)
}

/// Last successful result for one document kind. Guarded by a mutex held
/// for the whole merge, which is what gives the at-most-one-merge-per-kind
/// guarantee: a concurrent request for the same kind waits, then reuses
/// the fresh result.
#[derive(Default)]
struct CacheSlot {
    last: Option<MergeResult>,
}

struct ProviderOutcome {
    provider: String,
    result: Result<usize, ProviderError>,
}

pub struct MergeOrchestrator {
    providers: Vec<Provider>,
    invoker: ProviderInvoker,
    output_dir: PathBuf,
    cache_ttl: Duration,
    merge_config: MergeConfig,
    playlist_slot: Mutex<CacheSlot>,
    epg_slot: Mutex<CacheSlot>,
    notify_tx: MergeNotificationSender,
}

impl MergeOrchestrator {
    pub fn new(
        config: &Config,
        launcher: Arc<dyn ProviderLauncher>,
        notify_tx: MergeNotificationSender,
    ) -> Self {
        let invoker = ProviderInvoker::new(
            launcher,
            Duration::from_secs(config.merge.accept_timeout_seconds),
        );
        Self {
            providers: config.providers.clone(),
            invoker,
            output_dir: config.storage.output_dir.clone(),
            cache_ttl: Duration::from_secs(config.merge.cache_ttl_seconds),
            merge_config: config.merge.clone(),
            playlist_slot: Mutex::new(CacheSlot::default()),
            epg_slot: Mutex::new(CacheSlot::default()),
            notify_tx,
        }
    }

    /// Run (or reuse) a merge for the requested document kind.
    pub async fn merge(&self, request: MergeRequest) -> Result<MergeResult, MergeError> {
        let slot_mutex = match request.kind {
            MergeKind::Playlist => &self.playlist_slot,
            MergeKind::Epg => &self.epg_slot,
        };
        let mut slot = slot_mutex.lock().await;

        if !request.force_refresh {
            if let Some(last) = &slot.last {
                let age = Utc::now()
                    .signed_duration_since(last.generated_at)
                    .to_std()
                    .unwrap_or(Duration::MAX);
                if age < self.cache_ttl && last.file_path.exists() {
                    debug!(
                        "Reusing {} merge generated at {}",
                        request.kind, last.generated_at
                    );
                    return Ok(last.clone());
                }
            }
        }

        let started = std::time::Instant::now();
        let result = self.run_merge(request.kind).await?;
        info!(
            "{} merge completed: {} records -> {} ({:.2}s)",
            request.kind,
            result.record_count,
            result.file_path.display(),
            started.elapsed().as_secs_f64()
        );

        slot.last = Some(result.clone());
        let _ = self.notify_tx.send(MergeNotification {
            kind: request.kind,
            generated_at: result.generated_at,
        });

        Ok(result)
    }

    async fn run_merge(&self, kind: MergeKind) -> Result<MergeResult, MergeError> {
        let mut channels = Vec::new();
        let mut programmes = Vec::new();
        let mut raw_blocks = Vec::new();
        let mut outcomes = Vec::new();

        // Providers run sequentially in configuration order; that order is
        // the dedup tie-break, so no re-sorting by completion is needed.
        for provider in self
            .providers
            .iter()
            .filter(|p| p.enabled && p.participates_in(kind))
        {
            debug!("Processing provider '{}' for {}", provider.name, kind);
            let collected = self.invoker.collect(provider).await;
            let normalized =
                collected.and_then(|payload| DataNormalizer::normalize(payload, provider));

            match normalized {
                Ok(payload) => {
                    let count = payload.record_count();
                    match payload {
                        NormalizedPayload::Channels(mut batch) => channels.append(&mut batch),
                        NormalizedPayload::Programmes(mut batch) => programmes.append(&mut batch),
                        NormalizedPayload::Raw(text) => raw_blocks.push(text),
                    }
                    outcomes.push(ProviderOutcome {
                        provider: provider.name.clone(),
                        result: Ok(count),
                    });
                }
                Err(e) => {
                    warn!("Provider '{}' excluded from this merge: {}", provider.name, e);
                    outcomes.push(ProviderOutcome {
                        provider: provider.name.clone(),
                        result: Err(e),
                    });
                }
            }
        }

        self.log_report(kind, &outcomes);

        if kind == MergeKind::Playlist {
            channels = dedup_channels(channels);
            apply_group_policy(&mut channels, &self.merge_config);
            order_channels(&mut channels);
            if let Some(start) = self.merge_config.start_channel_number {
                assign_preset_numbers(&mut channels, start);
            }
        }

        let record_count = match kind {
            MergeKind::Playlist => channels.len(),
            MergeKind::Epg => programmes.len(),
        } + raw_blocks
            .iter()
            .filter(|block| !block.trim().is_empty())
            .count();

        if record_count == 0 {
            return Err(MergeError::AllProvidersFailed {
                kind: kind.to_string(),
            });
        }

        self.publish(kind, &channels, &programmes, &raw_blocks, record_count)
    }

    /// Stream the document onto a temp sibling, then atomically rename it
    /// into place. A concurrent reader sees the old file or the new file,
    /// never a partial one.
    fn publish(
        &self,
        kind: MergeKind,
        channels: &[ChannelRecord],
        programmes: &[ProgrammeRecord],
        raw_blocks: &[String],
        record_count: usize,
    ) -> Result<MergeResult, MergeError> {
        std::fs::create_dir_all(&self.output_dir)?;
        let file_path = self.output_dir.join(kind.file_name());
        let tmp_path = utils::temp_sibling(&file_path);

        let write = || -> std::io::Result<()> {
            let file = std::fs::File::create(&tmp_path)?;
            let mut out = BufWriter::new(file);
            match kind {
                MergeKind::Playlist => PlaylistWriter::write(&mut out, channels, raw_blocks)?,
                MergeKind::Epg => EpgWriter::write(&mut out, programmes, raw_blocks)?,
            }
            out.flush()
        };

        if let Err(e) = write() {
            utils::remove_file_quiet(&tmp_path);
            return Err(MergeError::Write {
                path: tmp_path.display().to_string(),
                source: e,
            });
        }

        utils::replace_file_atomic(&tmp_path, &file_path).map_err(|e| {
            utils::remove_file_quiet(&tmp_path);
            MergeError::Write {
                path: file_path.display().to_string(),
                source: e,
            }
        })?;

        Ok(MergeResult {
            file_path,
            generated_at: Utc::now(),
            record_count,
        })
    }

    fn log_report(&self, kind: MergeKind, outcomes: &[ProviderOutcome]) {
        for outcome in outcomes {
            match &outcome.result {
                Ok(count) => info!(
                    "{} merge: provider '{}' contributed {} records",
                    kind, outcome.provider, count
                ),
                Err(e) => info!(
                    "{} merge: provider '{}' failed: {}",
                    kind, outcome.provider, e
                ),
            }
        }
    }
}

/// Deduplicate by channel id; first-seen wins, and since providers run in
/// configuration order the tie-break is deterministic.
fn dedup_channels(channels: Vec<ChannelRecord>) -> Vec<ChannelRecord> {
    let mut seen = std::collections::HashSet::new();
    let mut deduped = Vec::with_capacity(channels.len());
    for channel in channels {
        if seen.insert(channel.id.clone()) {
            deduped.push(channel);
        } else {
            debug!("Dropping duplicate channel id '{}'", channel.id);
        }
    }
    deduped
}

/// Hidden groups exclude a channel entirely; disabled groups strip the
/// tags but keep the channel.
fn apply_group_policy(channels: &mut Vec<ChannelRecord>, config: &MergeConfig) {
    if !config.hidden_groups.is_empty() {
        channels.retain(|channel| {
            let hidden = channel
                .group_tags
                .iter()
                .any(|tag| config.hidden_groups.contains(tag));
            if hidden {
                debug!("Hiding channel '{}' due to hidden group", channel.id);
            }
            !hidden
        });
    }

    if config.disable_groups {
        for channel in channels.iter_mut() {
            channel.group_tags.clear();
        }
    }
}

/// TV block first, then radio, name-sorted with the id as tie-break.
/// Deterministic across runs for identical input.
fn order_channels(channels: &mut [ChannelRecord]) {
    channels.sort_by(|a, b| {
        (a.is_radio, &a.name, &a.id).cmp(&(b.is_radio, &b.name, &b.id))
    });
}

/// Hand sequential channel numbers to channels without a preset, counting
/// the TV and radio blocks independently.
fn assign_preset_numbers(channels: &mut [ChannelRecord], start: u32) {
    let mut next_tv = start;
    let mut next_radio = start;
    for channel in channels.iter_mut() {
        let next = if channel.is_radio {
            &mut next_radio
        } else {
            &mut next_tv
        };
        match channel.preset_number {
            Some(preset) => *next = preset + 1,
            None => {
                channel.preset_number = Some(*next);
                *next += 1;
            }
        }
    }
}
