//! CLI subcommands
//!
//! Each subcommand is a clap `Args`/`Subcommand` type with an async
//! `execute` that receives the shared [`CommandContext`].

pub mod config;
pub mod conflicts;
pub mod report;
pub mod status;
pub mod sync;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use notesync_core::config::Config;
use notesync_store::{DatabasePool, SqliteLocalStore};

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Global flags every subcommand needs
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub format: OutputFormat,
    pub config_path: PathBuf,
}

impl CommandContext {
    pub fn new(format: OutputFormat, config_path: Option<&str>) -> Self {
        Self {
            format,
            config_path: config_path
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_path),
        }
    }

    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.format)
    }

    /// Loads the configuration file, falling back to defaults when it is absent
    ///
    /// A file that exists but does not parse is an error rather than a
    /// silent fallback.
    pub fn load_config(&self) -> Result<Config> {
        if !self.config_path.exists() {
            tracing::debug!(
                config_path = %self.config_path.display(),
                "No configuration file, using defaults"
            );
            return Ok(Config::default());
        }
        Config::load(&self.config_path).with_context(|| {
            format!(
                "Failed to load configuration from {}",
                self.config_path.display()
            )
        })
    }
}

/// Opens (creating if needed) the local store
pub async fn open_store(config: &Config) -> Result<Arc<SqliteLocalStore>> {
    let pool = DatabasePool::new(&config.store.database_path)
        .await
        .context("Failed to open database")?;
    Ok(Arc::new(SqliteLocalStore::new(pool.pool().clone())))
}

/// Opens the local store only if it already exists
///
/// Read-only commands report "nothing synced yet" instead of creating an
/// empty database.
pub async fn open_existing_store(
    config: &Config,
    formatter: &dyn OutputFormatter,
) -> Result<Option<Arc<SqliteLocalStore>>> {
    if !config.store.database_path.exists() {
        formatter.error("No database found. Run 'notesync sync' first.");
        return Ok(None);
    }
    open_store(config).await.map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_core::config::ConfigBuilder;

    #[test]
    fn missing_config_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let ctx = CommandContext::new(OutputFormat::Human, path.to_str());

        let config = ctx.load_config().unwrap();
        assert_eq!(config.sync.interval_secs, Config::default().sync.interval_secs);
    }

    #[test]
    fn unparsable_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "sync: 42").unwrap();
        let ctx = CommandContext::new(OutputFormat::Json, path.to_str());

        assert!(ctx.load_config().is_err());
    }

    #[test]
    fn explicit_config_path_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yaml");
        let config = ConfigBuilder::new().page_size(17).build();
        std::fs::write(&path, config.to_yaml().unwrap()).unwrap();

        let ctx = CommandContext::new(OutputFormat::Human, path.to_str());
        assert_eq!(ctx.config_path, path);
        assert_eq!(ctx.load_config().unwrap().sync.page_size, 17);
    }

    #[tokio::test]
    async fn store_is_created_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("notesync.db");
        let config = ConfigBuilder::new().database_path(db.clone()).build();

        struct Silent;
        impl OutputFormatter for Silent {
            fn success(&self, _: &str) {}
            fn error(&self, _: &str) {}
            fn warn(&self, _: &str) {}
            fn info(&self, _: &str) {}
            fn print_json(&self, _: &serde_json::Value) {}
        }

        assert!(open_existing_store(&config, &Silent).await.unwrap().is_none());
        let store = open_store(&config).await.unwrap();
        assert_eq!(store.count_items().await.unwrap(), 0);
        assert!(db.exists());
        assert!(open_existing_store(&config, &Silent).await.unwrap().is_some());
    }
}
