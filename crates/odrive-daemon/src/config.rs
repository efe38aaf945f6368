//! Daemon configuration.
//!
//! A TOML document (every section optional) followed by `OD_*` environment
//! overrides. The master key normally arrives only through the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use odrive_crypto::keys::MasterKey;
use odrive_db::DaoSettings;

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub encryption: EncryptionConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub dao: DaoSettings,
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file. Created on first start.
    #[serde(default = "default_db_path")]
    pub path: String,
}

/// Encryption settings.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// Passphrase for the process master key. Empty is fatal at startup.
    #[serde(default)]
    pub master_key: String,
}

impl std::fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("master_key", &if self.master_key.is_empty() { "" } else { "<set>" })
            .finish()
    }
}

/// Service registry announcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// `/<org>/<appType>/<appName>/<version>`. Missing components take defaults.
    #[serde(default = "default_registry_root")]
    pub root: String,
    #[serde(default = "default_registry_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_announce_host")]
    pub announce_host: String,
    #[serde(default = "default_announce_port")]
    pub announce_port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

/// Autoscale lifecycle controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Lifecycle queue. `None` disables the message path.
    #[serde(default)]
    pub queue_name: Option<String>,
    #[serde(default = "default_polling_interval")]
    pub polling_interval_secs: u64,
    /// This instance's id as it appears in lifecycle messages.
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default = "default_quiescence")]
    pub quiescence_secs: u64,
    #[serde(default = "default_drain_iterations")]
    pub max_drain_iterations: u32,
}

/// Telemetry loop and status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_metric_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_status_addr")]
    pub status_addr: String,
}

/// Local ciphertext cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_root")]
    pub root: String,
    /// Cache id reported to the drain protocol.
    #[serde(default = "default_cache_partition")]
    pub partition: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_db_path() -> String {
    "odrive.db".to_string()
}

fn default_registry_root() -> String {
    "/cte/service/object-drive/1.0".to_string()
}

fn default_registry_timeout() -> u64 {
    5
}

fn default_announce_host() -> String {
    "127.0.0.1".to_string()
}

fn default_announce_port() -> u16 {
    4430
}

fn default_protocol() -> String {
    "https".to_string()
}

fn default_polling_interval() -> u64 {
    60
}

fn default_quiescence() -> u64 {
    5
}

fn default_drain_iterations() -> u32 {
    10_000
}

fn default_metric_interval() -> u64 {
    60
}

fn default_namespace() -> String {
    "ObjectDrive".to_string()
}

fn default_status_addr() -> String {
    "127.0.0.1:4431".to_string()
}

fn default_cache_root() -> String {
    "cache".to_string()
}

fn default_cache_partition() -> String {
    "local".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            root: default_registry_root(),
            timeout_secs: default_registry_timeout(),
            announce_host: default_announce_host(),
            announce_port: default_announce_port(),
            protocol: default_protocol(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            queue_name: None,
            polling_interval_secs: default_polling_interval(),
            instance_id: None,
            quiescence_secs: default_quiescence(),
            max_drain_iterations: default_drain_iterations(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_metric_interval(),
            namespace: default_namespace(),
            status_addr: default_status_addr(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: default_cache_root(),
            partition: default_cache_partition(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl LifecycleConfig {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs)
    }

    pub fn quiescence(&self) -> Duration {
        Duration::from_secs(self.quiescence_secs)
    }
}

impl TelemetryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl DaemonConfig {
    /// Load from `$OD_CONFIG` (or `./odrive.toml`), then apply the environment.
    ///
    /// A missing file means defaults; an unreadable or malformed one is an error.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    fn config_path() -> PathBuf {
        std::env::var("OD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("odrive.toml"))
    }

    /// Apply `OD_*` overrides read through `lookup`. Empty values are ignored.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<()> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("OD_DB_PATH") {
            self.database.path = v;
        }
        if let Some(v) = get("OD_ENCRYPT_MASTERKEY") {
            self.encryption.master_key = v;
        }
        if let Some(v) = get("OD_ZK_ROOT") {
            self.registry.root = v;
        }
        if let Some(v) = get("OD_ZK_TIMEOUT") {
            self.registry.timeout_secs = parse_number("OD_ZK_TIMEOUT", &v)?;
        }
        if let Some(v) = get("OD_SERVER_HOST") {
            self.registry.announce_host = v;
        }
        if let Some(v) = get("OD_SERVER_PORT") {
            self.registry.announce_port = parse_number("OD_SERVER_PORT", &v)?;
        }
        if let Some(v) = get("OD_AWS_SQS_NAME") {
            self.lifecycle.queue_name = Some(v);
        }
        if let Some(v) = get("OD_AWS_SQS_INTERVAL") {
            self.lifecycle.polling_interval_secs = parse_number("OD_AWS_SQS_INTERVAL", &v)?;
        }
        if let Some(v) = get("OD_EC2_INSTANCE_ID") {
            self.lifecycle.instance_id = Some(v);
        }
        if let Some(v) = get("OD_METRIC_INTERVAL") {
            self.telemetry.interval_secs = parse_number("OD_METRIC_INTERVAL", &v)?;
        }
        if let Some(v) = get("OD_METRIC_NAMESPACE") {
            self.telemetry.namespace = v;
        }
        if let Some(v) = get("OD_STATUS_ADDR") {
            self.telemetry.status_addr = v;
        }
        if let Some(v) = get("OD_CACHE_ROOT") {
            self.cache.root = v;
        }
        if let Some(v) = get("OD_CACHE_PARTITION") {
            self.cache.partition = v;
        }
        Ok(())
    }

    /// The process master key. Fatal when unset.
    pub fn master_key(&self) -> anyhow::Result<MasterKey> {
        MasterKey::from_passphrase(&self.encryption.master_key)
            .context("OD_ENCRYPT_MASTERKEY must be set")
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("{name} is not a number: {value:?}"))
}
