//! # odrive-daemon
//!
//! Process wiring for an Object Drive instance: configuration, the autoscale
//! lifecycle controller, service registry announcement, telemetry, and the
//! local status endpoint.
//!
//! ## Modules
//!
//! - [`config`] — TOML configuration with `OD_*` environment overrides
//! - [`lifecycle`] — Signal and queue driven drain protocol
//! - [`registry`] — Hierarchical service registry client
//! - [`aws`] — Lifecycle queue, autoscaler, and metric sink seams
//! - [`uploads`] — In-flight upload accounting for ciphertext caches
//! - [`telemetry`] — Request accumulator and periodic samples
//! - [`status`] — JSON status endpoint

pub mod aws;
pub mod config;
pub mod lifecycle;
pub mod registry;
pub mod status;
pub mod telemetry;
pub mod uploads;

use tracing_subscriber::EnvFilter;

/// Install the global subscriber: `RUST_LOG` first, then `odrive=<level>`.
pub fn init_tracing(log_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("odrive={log_level}").parse()?)
        .add_directive(format!("odrive_db={log_level}").parse()?)
        .add_directive(format!("odrive_daemon={log_level}").parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing tracing subscriber: {e}"))
}
