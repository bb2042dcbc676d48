//! Configuration module for notesync.
//!
//! Typed configuration structs mapping to the YAML configuration file, with
//! loading, validation, defaults, and a builder for programmatic use.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, TargetId};
use crate::ports::is_local_server;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for notesync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub target: TargetConfig,
    pub sync: SyncConfig,
    pub lock: LockConfig,
    pub retry: RetryConfig,
    pub decryption: DecryptionConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// Kind of remote target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// A directory, possibly on a mounted network share.
    Filesystem,
    /// In-process target, lost on exit. Useful for trying things out.
    Memory,
}

/// Remote target settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Name keying this target's sync state.
    pub id: String,
    pub kind: TargetKind,
    /// Root directory for `filesystem` targets.
    pub path: PathBuf,
    /// Server URL for network targets.
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

// Credentials stay out of logs.
impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between scheduled sync runs.
    pub interval_secs: u64,
    /// Largest serialized item the target accepts, in bytes.
    pub max_item_size_bytes: u64,
    /// Local changes pushed per batch.
    pub push_batch_size: usize,
    /// Concurrent transfers within a pull or push phase.
    pub transfer_concurrency: usize,
    /// Items requested per delta page.
    pub page_size: usize,
    /// Refuse to sync against an empty target once this client has synced.
    pub wipe_out_fail_safe: bool,
}

/// Remote lock settings; together they form the exclusive-lock timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Seconds between lock refreshes while a sync runs.
    pub refresh_interval_secs: u64,
    /// A lock not refreshed for this many intervals is stale.
    pub stale_multiplier: u32,
    /// Attempts to acquire a contended lock before giving up.
    pub acquire_retries: u32,
    /// Seconds between acquisition attempts.
    pub retry_delay_secs: u64,
}

/// Network retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per network call, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_secs: u64,
    /// Per-call timeout.
    pub call_timeout_secs: u64,
    /// Immediate re-runs of a whole sync after a transient failure.
    pub run_retries: u32,
}

/// Decryption settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecryptionConfig {
    /// Failed attempts after which an item is reported as undecryptable.
    pub max_attempts: u32,
}

/// Local database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_path: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `pretty` or `json`.
    pub format: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/notesync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("notesync")
            .join("config.yaml")
    }

    /// Serialize back to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Parsed target id.
    pub fn target_id(&self) -> Result<TargetId, DomainError> {
        TargetId::new(self.target.id.clone())
    }
}

impl TargetConfig {
    /// True for targets on this machine or a loopback server.
    pub fn is_local(&self) -> bool {
        self.url.as_deref().map_or(true, is_local_server)
    }
}

impl LockConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Age after which an unrefreshed lock may be reclaimed.
    pub fn stale_after(&self) -> Duration {
        self.refresh_interval() * self.stale_multiplier
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            id: "default".to_string(),
            kind: TargetKind::Filesystem,
            path: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("NotesSync"),
            url: None,
            username: None,
            password: None,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            max_item_size_bytes: 10 * 1024 * 1024,
            push_batch_size: 100,
            transfer_concurrency: 4,
            page_size: 200,
            wipe_out_fail_safe: true,
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 60,
            stale_multiplier: 3,
            acquire_retries: 3,
            retry_delay_secs: 5,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_secs: 60,
            call_timeout_secs: 30,
            run_retries: 1,
        }
    }
}

impl Default for DecryptionConfig {
    fn default() -> Self {
        Self { max_attempts: 2 }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("notesync")
                .join("notesync.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.interval_secs"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["pretty", "json"];

fn positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
}

impl Config {
    /// Validate all fields, returning every problem found.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- target ---
        if TargetId::new(self.target.id.clone()).is_err() {
            errors.push(ValidationError {
                field: "target.id".into(),
                message: "must be non-empty and contain no whitespace".into(),
            });
        }
        if self.target.kind == TargetKind::Filesystem && self.target.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "target.path".into(),
                message: "required for filesystem targets".into(),
            });
        }
        if let Some(url) = &self.target.url {
            if url.starts_with("http://") && !is_local_server(url) {
                errors.push(ValidationError {
                    field: "target.url".into(),
                    message: format!("plain http is only allowed for local servers: {url}"),
                });
            } else if !url.starts_with("http://") && !url.starts_with("https://") {
                errors.push(ValidationError {
                    field: "target.url".into(),
                    message: format!("unsupported scheme: {url}"),
                });
            }
        }

        // --- sync ---
        positive(&mut errors, "sync.interval_secs", self.sync.interval_secs);
        positive(
            &mut errors,
            "sync.max_item_size_bytes",
            self.sync.max_item_size_bytes,
        );
        positive(&mut errors, "sync.push_batch_size", self.sync.push_batch_size as u64);
        positive(
            &mut errors,
            "sync.transfer_concurrency",
            self.sync.transfer_concurrency as u64,
        );
        positive(&mut errors, "sync.page_size", self.sync.page_size as u64);

        // --- lock ---
        positive(
            &mut errors,
            "lock.refresh_interval_secs",
            self.lock.refresh_interval_secs,
        );
        if self.lock.stale_multiplier < 2 {
            errors.push(ValidationError {
                field: "lock.stale_multiplier".into(),
                message: "must be at least 2 so a live holder is never considered stale".into(),
            });
        }
        positive(&mut errors, "lock.acquire_retries", self.lock.acquire_retries as u64);

        // --- retry ---
        positive(&mut errors, "retry.max_attempts", self.retry.max_attempts as u64);
        positive(&mut errors, "retry.base_delay_ms", self.retry.base_delay_ms);
        positive(&mut errors, "retry.call_timeout_secs", self.retry.call_timeout_secs);
        if self.retry.base_delay() > self.retry.max_delay() {
            errors.push(ValidationError {
                field: "retry.base_delay_ms".into(),
                message: format!(
                    "base delay ({} ms) must not exceed max delay ({} s)",
                    self.retry.base_delay_ms, self.retry.max_delay_secs
                ),
            });
        }

        // --- decryption ---
        positive(
            &mut errors,
            "decryption.max_attempts",
            self.decryption.max_attempts as u64,
        );

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError {
                field: "logging.format".into(),
                message: format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Fluent builder over [`Config::default`].
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- target ---

    pub fn target_id(mut self, id: impl Into<String>) -> Self {
        self.config.target.id = id.into();
        self
    }

    pub fn target_kind(mut self, kind: TargetKind) -> Self {
        self.config.target.kind = kind;
        self
    }

    pub fn target_path(mut self, path: PathBuf) -> Self {
        self.config.target.path = path;
        self
    }

    pub fn target_url(mut self, url: impl Into<String>) -> Self {
        self.config.target.url = Some(url.into());
        self
    }

    // --- sync ---

    pub fn sync_interval(mut self, seconds: u64) -> Self {
        self.config.sync.interval_secs = seconds;
        self
    }

    pub fn max_item_size(mut self, bytes: u64) -> Self {
        self.config.sync.max_item_size_bytes = bytes;
        self
    }

    pub fn push_batch_size(mut self, n: usize) -> Self {
        self.config.sync.push_batch_size = n;
        self
    }

    pub fn transfer_concurrency(mut self, n: usize) -> Self {
        self.config.sync.transfer_concurrency = n;
        self
    }

    pub fn page_size(mut self, n: usize) -> Self {
        self.config.sync.page_size = n;
        self
    }

    pub fn wipe_out_fail_safe(mut self, enabled: bool) -> Self {
        self.config.sync.wipe_out_fail_safe = enabled;
        self
    }

    // --- lock ---

    pub fn lock_refresh_interval(mut self, seconds: u64) -> Self {
        self.config.lock.refresh_interval_secs = seconds;
        self
    }

    pub fn lock_stale_multiplier(mut self, n: u32) -> Self {
        self.config.lock.stale_multiplier = n;
        self
    }

    pub fn lock_acquire_retries(mut self, n: u32) -> Self {
        self.config.lock.acquire_retries = n;
        self
    }

    pub fn lock_retry_delay(mut self, seconds: u64) -> Self {
        self.config.lock.retry_delay_secs = seconds;
        self
    }

    // --- retry ---

    pub fn retry_max_attempts(mut self, n: u32) -> Self {
        self.config.retry.max_attempts = n;
        self
    }

    pub fn retry_base_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.base_delay_ms = ms;
        self
    }

    pub fn run_retries(mut self, n: u32) -> Self {
        self.config.retry.run_retries = n;
        self
    }

    // --- misc ---

    pub fn decryption_max_attempts(mut self, n: u32) -> Self {
        self.config.decryption.max_attempts = n;
        self
    }

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.config.store.database_path = path;
        self
    }

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    // -- Defaults --

    #[test]
    fn default_config_has_sensible_values() {
        let cfg = Config::default();
        assert_eq!(cfg.target.id, "default");
        assert_eq!(cfg.target.kind, TargetKind::Filesystem);
        assert_eq!(cfg.sync.interval_secs, 300);
        assert_eq!(cfg.sync.max_item_size_bytes, 10 * 1024 * 1024);
        assert_eq!(cfg.sync.page_size, 200);
        assert!(cfg.sync.wipe_out_fail_safe);
        assert_eq!(cfg.lock.stale_multiplier, 3);
        assert_eq!(cfg.lock.stale_after(), Duration::from_secs(180));
        assert_eq!(cfg.decryption.max_attempts, 2);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.store.database_path.ends_with("notesync.db"));
    }

    #[test]
    fn default_config_passes_validation() {
        assert!(Config::default().validate().is_empty());
    }

    // -- Loading --

    #[test]
    fn load_partial_yaml_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "target:\n  kind: memory\n  id: laptop\nsync:\n  max_item_size_bytes: 1024\n"
        )
        .unwrap();

        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.target.kind, TargetKind::Memory);
        assert_eq!(cfg.target_id().unwrap().as_str(), "laptop");
        assert_eq!(cfg.sync.max_item_size_bytes, 1024);
        assert_eq!(cfg.sync.push_batch_size, 100);
        assert_eq!(cfg.retry.max_attempts, 4);
    }

    #[test]
    fn load_or_default_on_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/notesync.yaml"));
        assert_eq!(cfg.sync.interval_secs, 300);
    }

    #[test]
    fn yaml_round_trip() {
        let cfg = ConfigBuilder::new().sync_interval(42).build();
        let yaml = cfg.to_yaml().unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.sync.interval_secs, 42);
    }

    #[test]
    fn default_path_ends_with_config_yaml() {
        let path = Config::default_path();
        assert!(path.ends_with("notesync/config.yaml"));
    }

    // -- Validation --

    #[test]
    fn zero_values_are_rejected() {
        let errors = ConfigBuilder::new()
            .sync_interval(0)
            .transfer_concurrency(0)
            .build()
            .validate();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"sync.interval_secs"));
        assert!(fields.contains(&"sync.transfer_concurrency"));
    }

    #[test]
    fn stale_multiplier_below_two_is_rejected() {
        let result = ConfigBuilder::new().lock_stale_multiplier(1).build_validated();
        let errors = result.unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "lock.stale_multiplier");
    }

    #[test]
    fn plain_http_only_for_local_servers() {
        assert!(ConfigBuilder::new()
            .target_url("http://localhost:22300")
            .build_validated()
            .is_ok());
        assert!(ConfigBuilder::new()
            .target_url("https://sync.example.com")
            .build_validated()
            .is_ok());

        let errors = ConfigBuilder::new()
            .target_url("http://sync.example.com")
            .build()
            .validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "target.url");
    }

    #[test]
    fn invalid_log_level_is_reported() {
        let errors = ConfigBuilder::new().logging_level("loud").build().validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().starts_with("logging.level: invalid level 'loud'"));
    }

    #[test]
    fn credentials_are_redacted_in_debug() {
        let mut cfg = Config::default();
        cfg.target.password = Some("hunter2".into());
        let shown = format!("{:?}", cfg.target);
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("<redacted>"));
    }

    #[test]
    fn local_target_detection() {
        let mut target = TargetConfig::default();
        assert!(target.is_local());
        target.url = Some("https://example.com".into());
        assert!(!target.is_local());
        target.url = Some("http://127.0.0.1:8080".into());
        assert!(target.is_local());
    }
}
