//! Scheduled re-merges and the PVR consumer poke.
//!
//! The scheduler owns the "when" of merging: a jittered startup delay, one
//! forced merge just after boot, then a cron-driven loop. The HTTP path
//! and this loop go through the same orchestrator entry point, so the
//! in-flight guard and cache behave identically for both.

use anyhow::Result;
use chrono::Utc;
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::merger::{MergeNotificationReceiver, MergeOrchestrator};
use crate::models::{MergeKind, MergeRequest};

pub struct MergeScheduler {
    orchestrator: Arc<MergeOrchestrator>,
    update_cron: String,
    startup_delay: Duration,
}

impl MergeScheduler {
    pub fn new(
        orchestrator: Arc<MergeOrchestrator>,
        update_cron: String,
        startup_delay_seconds: u64,
    ) -> Self {
        Self {
            orchestrator,
            update_cron,
            startup_delay: Duration::from_secs(startup_delay_seconds),
        }
    }

    pub async fn start(self) -> Result<()> {
        let schedule = match Schedule::from_str(&self.update_cron) {
            Ok(schedule) => schedule,
            Err(e) => {
                // The bridge keeps serving on-demand merges; only the
                // scheduled refresh is lost.
                warn!(
                    "Invalid merge cron expression '{}': {} - scheduled refresh disabled",
                    self.update_cron, e
                );
                return Ok(());
            }
        };

        if !self.startup_delay.is_zero() {
            let jitter = Duration::from_millis(fastrand::u64(0..=1000));
            debug!(
                "Delaying startup merge by {:?} (+{:?} jitter)",
                self.startup_delay, jitter
            );
            tokio::time::sleep(self.startup_delay + jitter).await;
        }

        info!("Running boot-time merge");
        self.run_merge_cycle().await;

        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                warn!(
                    "Merge cron expression '{}' has no upcoming runs",
                    self.update_cron
                );
                return Ok(());
            };

            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            debug!(
                "Next scheduled merge at {} (cron: {})",
                next.format("%Y-%m-%d %H:%M:%S UTC"),
                self.update_cron
            );
            tokio::time::sleep(wait).await;

            self.run_merge_cycle().await;
        }
    }

    async fn run_merge_cycle(&self) {
        for kind in [MergeKind::Playlist, MergeKind::Epg] {
            let request = MergeRequest {
                kind,
                force_refresh: true,
            };
            match self.orchestrator.merge(request).await {
                Ok(result) => info!(
                    "Scheduled {} merge wrote {} records to {}",
                    kind,
                    result.record_count,
                    result.file_path.display()
                ),
                Err(e) => error!("Scheduled {} merge failed: {}", kind, e),
            }
        }
    }
}

/// Runs the configured restart command after each successful merge so the
/// external PVR ingestion component re-reads the published files.
pub struct ConsumerNotifier {
    command: String,
    rx: MergeNotificationReceiver,
}

impl ConsumerNotifier {
    pub fn new(command: String, rx: MergeNotificationReceiver) -> Self {
        Self { command, rx }
    }

    pub async fn run(mut self) {
        while let Ok(notification) = self.rx.recv().await {
            debug!(
                "Merge completed for {} at {}; running consumer restart command",
                notification.kind, notification.generated_at
            );
            match tokio::process::Command::new("sh")
                .arg("-c")
                .arg(&self.command)
                .status()
                .await
            {
                Ok(status) if status.success() => {
                    info!("Consumer restart command completed")
                }
                Ok(status) => warn!("Consumer restart command exited with {}", status),
                Err(e) => warn!("Consumer restart command failed to run: {}", e),
            }
        }
    }
}
