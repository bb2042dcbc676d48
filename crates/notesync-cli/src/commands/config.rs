//! Config command - View and manage notesync configuration
//!
//! Provides the `notesync config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Sets individual values via dot-notation keys
//! 3. Validates the configuration file and reports errors
//! 4. Prints the configuration file path

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use tracing::info;

use notesync_core::config::{Config, TargetKind};

use super::CommandContext;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "sync.interval_secs")
        key: String,
        /// New value
        value: String,
    },
    /// Validate the configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(ctx),
            ConfigCommand::Set { key, value } => self.execute_set(ctx, key, value),
            ConfigCommand::Validate => self.execute_validate(ctx),
            ConfigCommand::Path => {
                let formatter = ctx.formatter();
                if ctx.format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "config_path": ctx.config_path.display().to_string(),
                        "exists": ctx.config_path.exists(),
                    }));
                } else {
                    println!("{}", ctx.config_path.display());
                }
                Ok(())
            }
        }
    }

    fn execute_show(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let mut config = ctx.load_config()?;
        if config.target.password.is_some() {
            config.target.password = Some("<redacted>".to_string());
        }

        info!(config_path = %ctx.config_path.display(), "Showing configuration");

        if ctx.format.is_json() {
            let json = serde_json::to_value(&config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
            formatter.info("");
            for line in config.to_yaml()?.lines() {
                formatter.info(line);
            }
        }
        Ok(())
    }

    fn execute_set(&self, ctx: &CommandContext, key: &str, value: &str) -> Result<()> {
        let formatter = ctx.formatter();
        let mut config = ctx.load_config()?;

        info!(key = %key, "Setting configuration value");

        if let Err(e) = apply_config_value(&mut config, key, value) {
            if ctx.format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "error": e.to_string(),
                }));
            } else {
                formatter.error(&format!("Failed to set '{}': {}", key, e));
                formatter.info("");
                formatter.info("Supported keys:");
                for supported in SUPPORTED_KEYS {
                    formatter.info(&format!("  {}", supported));
                }
            }
            return Ok(());
        }

        let errors: Vec<String> = config.validate().iter().map(|e| e.to_string()).collect();
        if !errors.is_empty() {
            if ctx.format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "errors": errors,
                }));
            } else {
                formatter.error(&format!("Invalid value for '{}': {}", key, errors.join("; ")));
            }
            return Ok(());
        }

        if let Some(parent) = ctx.config_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create configuration directory")?;
        }
        std::fs::write(&ctx.config_path, config.to_yaml()?)
            .context("Failed to write configuration file")?;

        if ctx.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "key": key,
                "config_path": ctx.config_path.display().to_string(),
            }));
        } else {
            formatter.success(&format!("Set {}", key));
            formatter.info(&format!("Saved to {}", ctx.config_path.display()));
        }
        Ok(())
    }

    fn execute_validate(&self, ctx: &CommandContext) -> Result<()> {
        let formatter = ctx.formatter();
        let path = &ctx.config_path;

        if !path.exists() {
            if ctx.format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": true,
                    "config_path": path.display().to_string(),
                    "exists": false,
                }));
            } else {
                formatter.info(&format!("Configuration file not found at {}", path.display()));
                formatter.info("Using defaults. Run 'notesync config set <key> <value>' to create one.");
            }
            return Ok(());
        }

        let config = match Config::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                if ctx.format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": path.display().to_string(),
                        "errors": [format!("Failed to parse configuration: {}", e)],
                    }));
                } else {
                    formatter.error(&format!("Failed to parse configuration: {}", e));
                    formatter.info(&format!("File: {}", path.display()));
                }
                return Ok(());
            }
        };

        info!(config_path = %path.display(), "Validating configuration");
        let errors = config.validate();

        if ctx.format.is_json() {
            let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": path.display().to_string(),
                "errors": error_strings,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", path.display()));
        } else {
            formatter.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ));
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }
        Ok(())
    }
}

const SUPPORTED_KEYS: &[&str] = &[
    "target.id",
    "target.kind                  - filesystem|memory",
    "target.path",
    "target.url                   - empty or 'none' to unset",
    "sync.interval_secs",
    "sync.max_item_size_bytes",
    "sync.push_batch_size",
    "sync.transfer_concurrency",
    "sync.page_size",
    "sync.wipe_out_fail_safe      - true|false",
    "lock.refresh_interval_secs",
    "lock.stale_multiplier",
    "lock.acquire_retries",
    "retry.max_attempts",
    "decryption.max_attempts",
    "store.database_path",
    "logging.level                - trace|debug|info|warn|error",
    "logging.format               - pretty|json",
];

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse::<T>()
        .with_context(|| format!("Unexpected value for {}: '{}'", key, value))
}

/// Apply a dot-notation key/value pair to a [`Config`]
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        // --- target ---
        "target.id" => config.target.id = value.to_string(),
        "target.kind" => {
            config.target.kind = match value {
                "filesystem" => TargetKind::Filesystem,
                "memory" => TargetKind::Memory,
                other => anyhow::bail!("Unknown target kind: '{}'", other),
            };
        }
        "target.path" => config.target.path = PathBuf::from(value),
        "target.url" => {
            config.target.url = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.to_string())
            };
        }

        // --- sync ---
        "sync.interval_secs" => config.sync.interval_secs = parse(key, value)?,
        "sync.max_item_size_bytes" => config.sync.max_item_size_bytes = parse(key, value)?,
        "sync.push_batch_size" => config.sync.push_batch_size = parse(key, value)?,
        "sync.transfer_concurrency" => config.sync.transfer_concurrency = parse(key, value)?,
        "sync.page_size" => config.sync.page_size = parse(key, value)?,
        "sync.wipe_out_fail_safe" => config.sync.wipe_out_fail_safe = parse(key, value)?,

        // --- lock ---
        "lock.refresh_interval_secs" => config.lock.refresh_interval_secs = parse(key, value)?,
        "lock.stale_multiplier" => config.lock.stale_multiplier = parse(key, value)?,
        "lock.acquire_retries" => config.lock.acquire_retries = parse(key, value)?,

        // --- retry / decryption ---
        "retry.max_attempts" => config.retry.max_attempts = parse(key, value)?,
        "decryption.max_attempts" => config.decryption.max_attempts = parse(key, value)?,

        // --- store / logging ---
        "store.database_path" => config.store.database_path = PathBuf::from(value),
        "logging.level" => config.logging.level = value.to_string(),
        "logging.format" => config.logging.format = value.to_string(),

        _ => anyhow::bail!("Unknown configuration key: '{}'", key),
    }
    Ok(())
}
