//! Status command - Show where the configured target's sync stands

use anyhow::Result;
use clap::Args;
use tracing::info;

use notesync_core::ports::LocalStore;

use super::{open_existing_store, CommandContext};
use crate::output::plural;

#[derive(Debug, Args)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config()?;
        let target = config.target_id()?;

        let Some(store) = open_existing_store(&config, formatter.as_ref()).await? else {
            return Ok(());
        };
        info!(target_id = %target, "Reading sync status");

        let state = store.get_sync_state(&target).await?;
        let items = store.count_items().await?;
        let pending = store.count_pending_changes().await?;
        let conflicts = store.conflict_items().await?.len();
        let disabled = store.disabled_items().await?.len();
        let undecryptable = store.pending_decryptions(&target).await?.len();

        let last_sync = state
            .last_sync_time
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string());

        if ctx.format.is_json() {
            let json = serde_json::json!({
                "target": target.to_string(),
                "kind": format!("{:?}", config.target.kind).to_lowercase(),
                "last_sync": last_sync,
                "has_cursor": state.last_cursor.is_some(),
                "lock_held": state.lock_handle.map(|h| h.to_string()),
                "items": items,
                "pending_changes": pending,
                "conflicts": conflicts,
                "disabled": disabled,
                "pending_decryption": undecryptable,
            });
            formatter.print_json(&json);
            return Ok(());
        }

        match &last_sync {
            Some(time) => formatter.success(&format!("Target '{}' last synced {}", target, time)),
            None => formatter.warn(&format!("Target '{}' has never been synced", target)),
        }
        if let Some(handle) = state.lock_handle {
            formatter.warn(&format!("A sync run is in progress or was interrupted ({})", handle));
        }
        formatter.info(&format!("Items:           {}", items));
        formatter.info(&format!(
            "Pending changes: {}",
            plural(pending as u64, "change")
        ));
        if conflicts > 0 {
            formatter.warn(&format!(
                "{} to review ('notesync conflicts')",
                plural(conflicts as u64, "conflict")
            ));
        }
        if disabled > 0 || undecryptable > 0 {
            formatter.warn("Some items are not syncing ('notesync report')");
        }
        Ok(())
    }
}
