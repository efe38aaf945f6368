//! Autoscale lifecycle controller.
//!
//! [`Lifecycle::watch_for_shutdown`] spawns three tasks sharing one exit
//! channel:
//!
//! - the signal path drains on TERM, HUP, QUIT, USR1 or USR2;
//! - the message path polls the lifecycle queue for a termination notice
//!   addressed to this instance;
//! - the disposer reads exit codes, logs and drops [`EXIT_IGNORE`], and
//!   resolves with the first real code.
//!
//! Draining deregisters from the service registry before any heartbeat, then
//! waits for in-flight uploads to finish.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use odrive_types::wire::LifecycleMessage;

use crate::aws::{AutoScaler, LifecycleResult, MessageQueue};
use crate::config::LifecycleConfig;
use crate::registry::{RegistryBackend, ServiceRegistry};
use crate::uploads::CacheSet;

/// Exit code meaning "log and keep running". Never passed to the OS.
pub const EXIT_IGNORE: i32 = 420;

/// Drain finished with no uploads outstanding.
pub const EXIT_DRAINED: i32 = 0;

/// Uploads were still outstanding after the last drain iteration.
pub const EXIT_DRAIN_TIMEOUT: i32 = 1;

/// Every sender went away before any real exit code arrived.
pub const EXIT_CHANNEL_CLOSED: i32 = 2;

const RECEIVE_BATCH: usize = 10;

#[derive(Clone, Debug)]
pub struct LifecycleSettings {
    pub queue_name: Option<String>,
    pub instance_id: Option<String>,
    pub polling_interval: Duration,
    pub quiescence: Duration,
    pub max_drain_iterations: u32,
    /// Registry protocol withdrawn at the start of a drain.
    pub protocol: String,
}

impl LifecycleSettings {
    pub fn from_config(config: &LifecycleConfig, protocol: &str) -> Self {
        Self {
            queue_name: config.queue_name.clone(),
            instance_id: config.instance_id.clone(),
            polling_interval: config.polling_interval(),
            quiescence: config.quiescence(),
            max_drain_iterations: config.max_drain_iterations,
            protocol: protocol.to_string(),
        }
    }
}

pub struct Lifecycle<Q, A, B> {
    settings: LifecycleSettings,
    queue: Arc<Q>,
    scaler: Arc<A>,
    registry: Arc<ServiceRegistry<B>>,
    caches: Arc<CacheSet>,
}

impl<Q, A, B> Lifecycle<Q, A, B>
where
    Q: MessageQueue,
    A: AutoScaler,
    B: RegistryBackend,
{
    pub fn new(
        settings: LifecycleSettings,
        queue: Arc<Q>,
        scaler: Arc<A>,
        registry: Arc<ServiceRegistry<B>>,
        caches: Arc<CacheSet>,
    ) -> Self {
        Self {
            settings,
            queue,
            scaler,
            registry,
            caches,
        }
    }

    /// Spawn the signal path, the message path, and the disposer.
    ///
    /// The returned handle resolves with the exit status for the process.
    pub fn watch_for_shutdown(self: Arc<Self>) -> JoinHandle<i32> {
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(Arc::clone(&self).signal_path(tx.clone()));
        tokio::spawn(Arc::clone(&self).message_path(tx));
        tokio::spawn(dispose(rx))
    }

    /// Withdraw from the registry, wait for uploads, and report the outcome.
    ///
    /// With a lifecycle message, each wait extends the termination window
    /// with a heartbeat and a clean drain completes the action with CONTINUE.
    pub async fn prepare_for_termination(&self, message: Option<&LifecycleMessage>) -> i32 {
        if let Err(e) = self.registry.deregister(&self.settings.protocol) {
            tracing::warn!(error = %e, "registry deregistration failed");
        }
        tokio::time::sleep(self.settings.quiescence).await;

        for iteration in 0..self.settings.max_drain_iterations {
            let outstanding = self.caches.count_uploaded();
            if outstanding == 0 {
                if let Some(msg) = message {
                    match self.scaler.complete_action(msg, LifecycleResult::Continue).await {
                        Ok(()) => tracing::info!(
                            token = %msg.lifecycle_action_token,
                            "lifecycle action completed"
                        ),
                        Err(e) => tracing::warn!(error = %e, "complete lifecycle action failed"),
                    }
                }
                tracing::info!(iteration, "drain complete");
                return EXIT_DRAINED;
            }
            tracing::info!(outstanding, iteration, "waiting for uploads to finish");
            if let Some(msg) = message {
                if let Err(e) = self.scaler.record_heartbeat(msg).await {
                    tracing::warn!(error = %e, "lifecycle heartbeat failed");
                }
            }
            tokio::time::sleep(self.settings.polling_interval).await;
        }

        tracing::error!(
            outstanding = self.caches.count_uploaded(),
            "drain gave up with uploads outstanding"
        );
        EXIT_DRAIN_TIMEOUT
    }

    async fn signal_path(self: Arc<Self>, tx: mpsc::Sender<i32>) {
        let mut term = install("TERM", SignalKind::terminate());
        let mut hup = install("HUP", SignalKind::hangup());
        let mut quit = install("QUIT", SignalKind::quit());
        let mut usr1 = install("USR1", SignalKind::user_defined1());
        let mut usr2 = install("USR2", SignalKind::user_defined2());
        if [&term, &hup, &quit, &usr1, &usr2].iter().all(|s| s.is_none()) {
            report(&tx, EXIT_IGNORE).await;
            return;
        }

        let received = tokio::select! {
            Some(()) = recv(term.as_mut()) => "TERM",
            Some(()) = recv(hup.as_mut()) => "HUP",
            Some(()) = recv(quit.as_mut()) => "QUIT",
            Some(()) = recv(usr1.as_mut()) => "USR1",
            Some(()) = recv(usr2.as_mut()) => "USR2",
            else => return,
        };
        tracing::info!(signal = received, "shutdown signal received");
        let code = self.prepare_for_termination(None).await;
        report(&tx, code).await;
    }

    async fn message_path(self: Arc<Self>, tx: mpsc::Sender<i32>) {
        let (Some(queue_name), Some(instance_id)) =
            (&self.settings.queue_name, &self.settings.instance_id)
        else {
            tracing::info!("lifecycle queue not configured");
            report(&tx, EXIT_IGNORE).await;
            return;
        };
        let url = match self.queue.queue_url(queue_name).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(queue = %queue_name, error = %e, "lifecycle queue unavailable");
                report(&tx, EXIT_IGNORE).await;
                return;
            }
        };
        tracing::info!(queue = %queue_name, instance_id = %instance_id, "watching lifecycle queue");

        loop {
            match self.queue.receive_messages(&url, RECEIVE_BATCH).await {
                Ok(messages) => {
                    for m in messages {
                        let Ok(msg) = serde_json::from_str::<LifecycleMessage>(&m.body) else {
                            tracing::debug!("ignoring unparseable queue message");
                            continue;
                        };
                        if msg.ec2_instance_id != *instance_id {
                            continue;
                        }
                        if let Err(e) = self.queue.delete_message(&url, &m.receipt_handle).await {
                            tracing::warn!(error = %e, "delete lifecycle message failed");
                        }
                        if msg.is_terminating() {
                            tracing::info!(
                                transition = %msg.lifecycle_transition,
                                hook = %msg.lifecycle_hook_name,
                                "instance terminating"
                            );
                            let code = self.prepare_for_termination(Some(&msg)).await;
                            report(&tx, code).await;
                            return;
                        }
                        tracing::debug!(transition = %msg.lifecycle_transition, "lifecycle message skipped");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "lifecycle receive failed"),
            }
            tokio::time::sleep(self.settings.polling_interval).await;
        }
    }
}

fn install(name: &'static str, kind: SignalKind) -> Option<Signal> {
    match signal(kind) {
        Ok(stream) => Some(stream),
        Err(e) => {
            tracing::warn!(signal = name, error = %e, "signal handler not installed");
            None
        }
    }
}

/// Wait on a signal stream; a missing one never fires.
async fn recv(stream: Option<&mut Signal>) -> Option<()> {
    match stream {
        Some(s) => s.recv().await,
        None => std::future::pending().await,
    }
}

async fn report(tx: &mpsc::Sender<i32>, code: i32) {
    if tx.send(code).await.is_err() {
        tracing::warn!(code, "exit code dropped, disposer is gone");
    }
}

/// Resolve with the first exit code other than [`EXIT_IGNORE`], or
/// [`EXIT_CHANNEL_CLOSED`] if every sender hangs up first.
pub async fn dispose(mut rx: mpsc::Receiver<i32>) -> i32 {
    while let Some(code) = rx.recv().await {
        if code == EXIT_IGNORE {
            tracing::info!(code, "ignoring exit request, still serving");
            continue;
        }
        tracing::info!(code, "exiting");
        return code;
    }
    tracing::error!("exit channel closed without an exit code");
    EXIT_CHANNEL_CLOSED
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::{MemoryQueue, RecordingAutoScaler};
    use crate::registry::MemoryRegistry;
    use crate::uploads::UploadTracker;

    fn settings(queue: Option<&str>) -> LifecycleSettings {
        LifecycleSettings {
            queue_name: queue.map(str::to_string),
            instance_id: Some("i-self".into()),
            polling_interval: Duration::from_secs(60),
            quiescence: Duration::from_secs(5),
            max_drain_iterations: 3,
            protocol: "https".into(),
        }
    }

    fn lifecycle(
        settings: LifecycleSettings,
    ) -> (
        Arc<Lifecycle<MemoryQueue, RecordingAutoScaler, MemoryRegistry>>,
        Arc<RecordingAutoScaler>,
        Arc<CacheSet>,
        Arc<UploadTracker>,
    ) {
        let registry = Arc::new(ServiceRegistry::new(
            Arc::new(MemoryRegistry::new()),
            "",
            "127.0.0.1",
            4430,
        ));
        registry.announce("https").expect("announce");
        let scaler = Arc::new(RecordingAutoScaler::new());
        let caches = Arc::new(CacheSet::new());
        let tracker = Arc::new(UploadTracker::new("primary"));
        caches.register(tracker.clone());
        let lc = Arc::new(Lifecycle::new(
            settings,
            Arc::new(MemoryQueue::new("lifecycle")),
            scaler.clone(),
            registry,
            caches.clone(),
        ));
        (lc, scaler, caches, tracker)
    }

    #[tokio::test]
    async fn test_dispose_skips_ignore() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(EXIT_IGNORE).await.expect("send");
        tx.send(7).await.expect("send");
        assert_eq!(dispose(rx).await, 7);
    }

    #[tokio::test]
    async fn test_dispose_reports_closed_channel_as_failure() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(EXIT_IGNORE).await.expect("send");
        drop(tx);
        let code = dispose(rx).await;
        assert_eq!(code, EXIT_CHANNEL_CLOSED);
        assert_ne!(code, EXIT_DRAINED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_path_survives_missing_disposer() {
        let (lc, _scaler, _caches, _tracker) = lifecycle(settings(None));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        lc.message_path(tx).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_without_uploads_completes_immediately() {
        let (lc, scaler, _caches, _tracker) = lifecycle(settings(None));
        let msg = LifecycleMessage {
            lifecycle_action_token: "tok".into(),
            ..LifecycleMessage::default()
        };
        assert_eq!(lc.prepare_for_termination(Some(&msg)).await, EXIT_DRAINED);
        assert!(scaler.heartbeats().is_empty());
        assert_eq!(
            scaler.completions(),
            vec![("tok".to_string(), LifecycleResult::Continue)]
        );
        assert!(!lc
            .registry
            .backend()
            .exists(&lc.registry.node_path("https"))
            .expect("exists"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_times_out_with_stuck_upload() {
        let (lc, scaler, _caches, tracker) = lifecycle(settings(None));
        let _stuck = tracker.begin();
        let msg = LifecycleMessage::default();
        assert_eq!(
            lc.prepare_for_termination(Some(&msg)).await,
            EXIT_DRAIN_TIMEOUT
        );
        assert_eq!(scaler.heartbeats().len(), 3);
        assert!(scaler.completions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_drain_sends_no_lifecycle_calls() {
        let (lc, scaler, _caches, _tracker) = lifecycle(settings(None));
        assert_eq!(lc.prepare_for_termination(None).await, EXIT_DRAINED);
        assert!(scaler.completions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_path_without_queue_sends_ignore() {
        let (lc, _scaler, _caches, _tracker) = lifecycle(settings(None));
        let (tx, mut rx) = mpsc::channel(1);
        lc.message_path(tx).await;
        assert_eq!(rx.recv().await, Some(EXIT_IGNORE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_path_unknown_queue_sends_ignore() {
        let (lc, _scaler, _caches, _tracker) = lifecycle(settings(Some("missing")));
        let (tx, mut rx) = mpsc::channel(1);
        lc.message_path(tx).await;
        assert_eq!(rx.recv().await, Some(EXIT_IGNORE));
    }
}
