//! Sync command - Synchronize the local notes with the configured target
//!
//! Provides the `notesync sync` CLI command which:
//! 1. Loads and validates the configuration, then opens the database
//! 2. Builds the remote backend for the configured target
//! 3. Runs one sync (or the scheduler with `--watch`), cancellable with Ctrl-C
//! 4. Displays the end-of-run report

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use notesync_core::config::TargetKind;
use notesync_core::domain::SyncReport;
use notesync_remote::build_file_api;
use notesync_sync::{LogObserver, SyncEngine, SyncScheduler};

use super::{open_store, CommandContext};
use crate::output::{plural, OutputFormatter};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Keep running, syncing every `sync.interval_secs`
    #[arg(long)]
    pub watch: bool,

    /// Override the interval used with `--watch`, in seconds
    #[arg(long, requires = "watch")]
    pub interval: Option<u64>,
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config()?;

        let errors = config.validate();
        if !errors.is_empty() {
            for error in &errors {
                formatter.error(&error.to_string());
            }
            anyhow::bail!("invalid configuration in {}", ctx.config_path.display());
        }
        if config.target.kind == TargetKind::Memory {
            formatter.warn("Memory target: synced data is discarded when the command exits");
        }

        let store = open_store(&config).await?;
        let api = build_file_api(&config.target)?;
        let engine = SyncEngine::new(&config, api, store)
            .context("Failed to create sync engine")?
            .with_observer(Arc::new(LogObserver));

        info!(
            target_id = %engine.target(),
            client_id = %engine.client_id(),
            watch = self.watch,
            "Starting synchronization"
        );

        let cancel = CancellationToken::new();
        spawn_ctrl_c(cancel.clone());

        if self.watch {
            let interval = Duration::from_secs(self.interval.unwrap_or(config.sync.interval_secs));
            formatter.info(&format!(
                "Syncing every {}s, press Ctrl-C to stop",
                interval.as_secs()
            ));
            let mut scheduler = SyncScheduler::new(Arc::new(engine), interval);
            scheduler.run(cancel).await?;
            formatter.success("Stopped");
            return Ok(());
        }

        formatter.info("Starting synchronization...");
        let report = engine.sync(&cancel).await?;
        print_report(&report, formatter.as_ref(), ctx.format.is_json());
        Ok(())
    }
}

/// Cancels `cancel` on the first Ctrl-C
///
/// The engine stops at the next item boundary and releases its lock.
fn spawn_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, finishing the current item");
            cancel.cancel();
        }
    });
}

fn print_report(report: &SyncReport, formatter: &dyn OutputFormatter, json: bool) {
    if json {
        match serde_json::to_value(report) {
            Ok(value) => formatter.print_json(&value),
            Err(e) => formatter.error(&format!("Failed to serialize report: {}", e)),
        }
        return;
    }

    let duration = match (report.started_at, report.finished_at) {
        (Some(start), Some(end)) => (end - start).num_milliseconds().max(0),
        _ => 0,
    };
    let duration_display = if duration >= 1000 {
        format!("{:.1}s", duration as f64 / 1000.0)
    } else {
        format!("{}ms", duration)
    };

    if report.cancelled {
        formatter.warn("Sync cancelled; progress so far has been saved");
    } else if report.items_synced() == 0 && report.is_clean() {
        formatter.success("Already up to date");
    } else {
        formatter.success(&format!("Sync completed in {}", duration_display));
    }

    let lines = [
        ("Downloaded:     ", report.downloaded),
        ("Uploaded:       ", report.uploaded),
        ("Deleted here:   ", report.deleted_local),
        ("Deleted remote: ", report.deleted_remote),
        ("Merged:         ", report.merged),
    ];
    for (label, count) in lines {
        if count > 0 {
            formatter.info(&format!("{}{}", label, plural(count, "item")));
        }
    }

    if !report.conflicts.is_empty() {
        formatter.warn(&format!(
            "{} created, see 'notesync conflicts'",
            plural(report.conflicts.len() as u64, "conflict")
        ));
    }
    for skipped in &report.skipped {
        let subject = skipped
            .item_id
            .as_ref()
            .map(|id| id.to_string())
            .or_else(|| skipped.path.clone())
            .unwrap_or_default();
        formatter.warn(&format!("Skipped {}: {}", subject, skipped.reason.describe()));
    }
    if !report.failures.is_empty() {
        formatter.error(&format!(
            "{} failed:",
            plural(report.failures.len() as u64, "item")
        ));
        for failure in &report.failures {
            let subject = failure
                .item_id
                .as_ref()
                .map(|id| id.to_string())
                .or_else(|| failure.path.clone())
                .unwrap_or_default();
            formatter.info(&format!("  - {}: {}", subject, failure.message));
        }
    }
}
