//! Report command - Items that sync cannot handle on its own
//!
//! Lists items disabled by size or quota limits and items whose
//! decryption attempts are exhausted. `--reset-decryption` clears the
//! attempt counters so the next sync tries those items again, typically
//! after the missing key has been loaded.

use anyhow::Result;
use clap::Args;
use tracing::info;

use notesync_core::ports::{DecryptionFailure, LocalStore};

use super::{open_existing_store, CommandContext};
use crate::output::plural;

#[derive(Debug, Args)]
pub struct ReportCommand {
    /// Clear exhausted decryption counters so the items are retried
    #[arg(long)]
    pub reset_decryption: bool,
}

impl ReportCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config()?;
        let Some(store) = open_existing_store(&config, formatter.as_ref()).await? else {
            return Ok(());
        };

        let disabled = store.disabled_items().await?;
        let exhausted: Vec<DecryptionFailure> = store
            .decryption_failures()
            .await?
            .into_iter()
            .filter(|f| f.attempts >= config.decryption.max_attempts)
            .collect();

        if self.reset_decryption {
            for failure in &exhausted {
                store.reset_decryption_attempts(&failure.key).await?;
            }
            info!(count = exhausted.len(), "Reset decryption attempt counters");
            if ctx.format.is_json() {
                formatter.print_json(&serde_json::json!({ "reset": exhausted.len() }));
            } else {
                formatter.success(&format!(
                    "{} will be retried on the next sync",
                    plural(exhausted.len() as u64, "item")
                ));
            }
            return Ok(());
        }

        if ctx.format.is_json() {
            let disabled_json: Vec<_> = disabled
                .iter()
                .map(|item| {
                    serde_json::json!({
                        "id": item.id().to_string(),
                        "title": item.title(),
                        "reason": item.sync_disabled_reason(),
                    })
                })
                .collect();
            let undecryptable_json: Vec<_> = exhausted
                .iter()
                .map(|f| {
                    serde_json::json!({
                        "key": f.key,
                        "attempts": f.attempts,
                        "last_error": f.last_error,
                    })
                })
                .collect();
            formatter.print_json(&serde_json::json!({
                "disabled": disabled_json,
                "undecryptable": undecryptable_json,
            }));
            return Ok(());
        }

        if disabled.is_empty() && exhausted.is_empty() {
            formatter.success("All items are syncing");
            return Ok(());
        }

        if !disabled.is_empty() {
            formatter.warn(&format!(
                "{} could not be uploaded:",
                plural(disabled.len() as u64, "item")
            ));
            for item in &disabled {
                formatter.info(&format!(
                    "  {} '{}': {}",
                    item.id(),
                    item.title(),
                    item.sync_disabled_reason().unwrap_or_default()
                ));
            }
        }
        if !exhausted.is_empty() {
            formatter.warn(&format!(
                "Items that cannot be decrypted ({}):",
                exhausted.len()
            ));
            for failure in &exhausted {
                formatter.info(&format!(
                    "  {} after {}: {}",
                    failure.key,
                    plural(u64::from(failure.attempts), "attempt"),
                    failure.last_error.as_deref().unwrap_or("unknown error")
                ));
            }
            formatter.info("");
            formatter.info("Load the encryption key, then run 'notesync report --reset-decryption'");
        }
        Ok(())
    }
}
