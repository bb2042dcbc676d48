//! Conflicts command - Review conflict copies created by sync
//!
//! Provides the `notesync conflicts` CLI command which:
//! 1. Lists conflict copies with the item each one was copied from
//! 2. Discards a copy once its content has been dealt with; the deletion
//!    reaches other clients on the next sync

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::Subcommand;
use tracing::info;

use notesync_core::domain::{ItemId, SyncItem};
use notesync_core::ports::LocalStore;

use super::{open_existing_store, CommandContext};
use crate::output::plural;

#[derive(Debug, Subcommand)]
pub enum ConflictsCommand {
    /// List conflict copies
    List,
    /// Delete a conflict copy
    Discard {
        /// Id of the conflict copy
        id: String,
    },
}

impl ConflictsCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        match self {
            ConflictsCommand::List => self.execute_list(ctx).await,
            ConflictsCommand::Discard { id } => self.execute_discard(ctx, id).await,
        }
    }

    async fn execute_list(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config()?;
        let Some(store) = open_existing_store(&config, formatter.as_ref()).await? else {
            return Ok(());
        };

        let copies = store.conflict_items().await?;
        info!(count = copies.len(), "Listing conflict copies");

        if ctx.format.is_json() {
            let entries: Vec<_> = copies.iter().map(conflict_json).collect();
            formatter.print_json(&serde_json::json!({ "conflicts": entries }));
            return Ok(());
        }

        if copies.is_empty() {
            formatter.success("No conflicts");
            return Ok(());
        }
        formatter.warn(&plural(copies.len() as u64, "conflict"));
        formatter.info("");
        formatter.info(&format!("{:<34} {:<20} {}", "ID", "MODIFIED", "TITLE"));
        for copy in &copies {
            formatter.info(&format!(
                "{:<34} {:<20} {}",
                copy.id(),
                modified(copy),
                copy.title()
            ));
            if let Some(original) = copy.conflict_original_id() {
                formatter.info(&format!("{:<34} copy of {}", "", original));
            }
        }
        Ok(())
    }

    async fn execute_discard(&self, ctx: &CommandContext, id: &str) -> Result<()> {
        let formatter = ctx.formatter();
        let config = ctx.load_config()?;
        let Some(store) = open_existing_store(&config, formatter.as_ref()).await? else {
            return Ok(());
        };

        let id = ItemId::new(id.to_string()).context("Invalid item id")?;
        let item = store.get_item(&id).await?;
        match item {
            Some(item) if item.is_conflict() && !item.is_deleted() => {
                store.delete_local_item(&id).await?;
                info!(item_id = %id, "Discarded conflict copy");
                if ctx.format.is_json() {
                    formatter.print_json(&serde_json::json!({"discarded": id.to_string()}));
                } else {
                    formatter.success(&format!("Discarded '{}'", item.title()));
                    formatter.info("The deletion is pushed on the next sync");
                }
            }
            Some(_) => formatter.error(&format!("{} is not a conflict copy", id)),
            None => formatter.error(&format!("No item with id {}", id)),
        }
        Ok(())
    }
}

fn modified(item: &SyncItem) -> String {
    Utc.timestamp_millis_opt(item.updated_time())
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

fn conflict_json(item: &SyncItem) -> serde_json::Value {
    serde_json::json!({
        "id": item.id().to_string(),
        "title": item.title(),
        "type": item.item_type().to_string(),
        "original_id": item.conflict_original_id().map(|id| id.to_string()),
        "updated_time": item.updated_time(),
    })
}
