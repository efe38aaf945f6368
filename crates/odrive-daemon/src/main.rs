//! odrive: the Object Drive instance daemon.
//!
//! Opens the metadata store, announces the instance, and runs the telemetry
//! loop and HTTP surface until the lifecycle controller picks an exit code.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use odrive_daemon::aws::{LogMetricSink, MemoryQueue, UnmanagedAutoScaler};
use odrive_daemon::config::DaemonConfig;
use odrive_daemon::lifecycle::{Lifecycle, LifecycleSettings};
use odrive_daemon::registry::{MemoryRegistry, ServiceRegistry};
use odrive_daemon::status::{StatusServer, StatusState};
use odrive_daemon::telemetry::{LatestSample, RequestAccumulator, TelemetryLoop};
use odrive_daemon::uploads::{CacheSet, DiskCache};
use odrive_db::Dao;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config and logging
    let config = DaemonConfig::load()?;
    odrive_daemon::init_tracing(&config.advanced.log_level)?;
    info!(version = env!("CARGO_PKG_VERSION"), "Object Drive daemon starting");

    // 2. Open the metadata store
    let master_key = config.master_key()?;
    let mut dao = Dao::open(
        Path::new(&config.database.path),
        master_key,
        config.dao.clone(),
    )
    .with_context(|| format!("opening database {}", config.database.path))?;
    let upgraded = dao.upgrade_legacy_permissions()?;
    let db_state = dao.get_db_state()?;
    info!(
        path = %config.database.path,
        identifier = %db_state.identifier,
        schema_version = %db_state.schema_version,
        upgraded,
        "database ready"
    );
    let dao = Arc::new(tokio::sync::Mutex::new(dao));

    // 3. Announce in the service registry
    tracing::warn!("registry backend is process-local, announcement is not visible to peers");
    let registry = Arc::new(ServiceRegistry::new(
        Arc::new(MemoryRegistry::new()),
        &config.registry.root,
        &config.registry.announce_host,
        config.registry.announce_port,
    ));
    let announce_timeout = std::time::Duration::from_secs(config.registry.timeout_secs);
    let announcing = Arc::clone(&registry);
    let protocol = config.registry.protocol.clone();
    match tokio::time::timeout(
        announce_timeout,
        tokio::task::spawn_blocking(move || announcing.announce(&protocol)),
    )
    .await
    {
        Ok(Ok(Ok(path))) => info!(%path, "instance announced"),
        Ok(Ok(Err(e))) => error!(error = %e, "service registry announcement failed"),
        Ok(Err(e)) => error!(error = %e, "service registry task failed"),
        Err(_) => error!("service registry announcement timed out"),
    }

    // 4. Ciphertext cache, telemetry, HTTP surface
    let caches = Arc::new(CacheSet::new());
    let cache = Arc::new(DiskCache::new(&config.cache.partition, &config.cache.root));
    caches.register(cache.clone());
    let accumulator = Arc::new(RequestAccumulator::new());

    let latest = LatestSample::default();
    let dimensions = config
        .lifecycle
        .instance_id
        .iter()
        .map(|id| ("InstanceId".to_string(), id.clone()))
        .collect();
    let telemetry = TelemetryLoop {
        accumulator: Arc::clone(&accumulator),
        sink: Arc::new(LogMetricSink),
        namespace: config.telemetry.namespace.clone(),
        dimensions,
        interval: config.telemetry.interval(),
        latest: latest.clone(),
    };
    tokio::spawn(telemetry.run());

    let state = StatusState {
        latest,
        accumulator,
        dao: Arc::clone(&dao),
        cache,
    };
    match StatusServer::bind(&config.telemetry.status_addr, state).await {
        Ok(server) => {
            tokio::spawn(async move {
                if let Err(e) = server.run().await {
                    error!(error = %e, "status endpoint stopped");
                }
            });
        }
        Err(e) => error!(addr = %config.telemetry.status_addr, error = %e, "status endpoint disabled"),
    }

    // 5. Lifecycle controller decides when to exit
    let lifecycle = Arc::new(Lifecycle::new(
        LifecycleSettings::from_config(&config.lifecycle, &config.registry.protocol),
        Arc::new(MemoryQueue::for_lifecycle(&config.lifecycle)),
        Arc::new(UnmanagedAutoScaler),
        registry,
        caches,
    ));
    let code = lifecycle.watch_for_shutdown().await?;

    info!(code, "Object Drive daemon stopped");
    std::process::exit(code);
}
