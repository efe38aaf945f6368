//! Fleet-management collaborators: lifecycle queue, autoscaler, metric sink.
//!
//! Each is a trait so the lifecycle and telemetry loops can run against
//! in-process implementations.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use odrive_types::wire::LifecycleMessage;

use crate::config::LifecycleConfig;

#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("request failed: {0}")]
    Request(String),
}

pub type Result<T> = std::result::Result<T, CloudError>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueMessage {
    pub receipt_handle: String,
    pub body: String,
}

pub trait MessageQueue: Send + Sync + 'static {
    fn queue_url(&self, name: &str) -> impl Future<Output = Result<String>> + Send;

    fn receive_messages(
        &self,
        url: &str,
        max: usize,
    ) -> impl Future<Output = Result<Vec<QueueMessage>>> + Send;

    fn delete_message(&self, url: &str, receipt: &str) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleResult {
    Continue,
    Abandon,
}

impl LifecycleResult {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Continue => "CONTINUE",
            Self::Abandon => "ABANDON",
        }
    }
}

pub trait AutoScaler: Send + Sync + 'static {
    fn record_heartbeat(&self, action: &LifecycleMessage)
        -> impl Future<Output = Result<()>> + Send;

    fn complete_action(
        &self,
        action: &LifecycleMessage,
        result: LifecycleResult,
    ) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricDatum {
    pub name: String,
    pub dimensions: Vec<(String, String)>,
    pub unit: &'static str,
    pub value: f64,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
}

pub trait MetricSink: Send + Sync + 'static {
    fn put_metric_data(
        &self,
        namespace: &str,
        data: Vec<MetricDatum>,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Emits samples as `tracing` events.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogMetricSink;

impl MetricSink for LogMetricSink {
    async fn put_metric_data(&self, namespace: &str, data: Vec<MetricDatum>) -> Result<()> {
        for d in data {
            tracing::info!(
                namespace,
                metric = %d.name,
                unit = d.unit,
                value = d.value,
                timestamp = d.timestamp,
                "metric"
            );
        }
        Ok(())
    }
}

/// Autoscaler for instances outside any autoscaling group: calls are logged.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnmanagedAutoScaler;

impl AutoScaler for UnmanagedAutoScaler {
    async fn record_heartbeat(&self, action: &LifecycleMessage) -> Result<()> {
        tracing::info!(group = %action.auto_scaling_group_name, "lifecycle heartbeat");
        Ok(())
    }

    async fn complete_action(
        &self,
        action: &LifecycleMessage,
        result: LifecycleResult,
    ) -> Result<()> {
        tracing::info!(
            group = %action.auto_scaling_group_name,
            hook = %action.lifecycle_hook_name,
            result = result.as_str(),
            "lifecycle action complete"
        );
        Ok(())
    }
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-process queue with a single URL.
#[derive(Default)]
pub struct MemoryQueue {
    name: String,
    pending: Mutex<VecDeque<QueueMessage>>,
    deleted: Mutex<Vec<String>>,
    next_receipt: Mutex<u64>,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// The queue the lifecycle controller will look up by name.
    pub fn for_lifecycle(config: &LifecycleConfig) -> Self {
        Self::new(config.queue_name.clone().unwrap_or_default())
    }

    pub fn url(&self) -> String {
        format!("memory://{}", self.name)
    }

    /// Enqueue a raw body and return its receipt handle.
    pub fn push(&self, body: impl Into<String>) -> String {
        let mut next = locked(&self.next_receipt);
        *next += 1;
        let receipt = format!("receipt-{next}");
        locked(&self.pending).push_back(QueueMessage {
            receipt_handle: receipt.clone(),
            body: body.into(),
        });
        receipt
    }

    pub fn deleted(&self) -> Vec<String> {
        locked(&self.deleted).clone()
    }

    pub fn pending(&self) -> usize {
        locked(&self.pending).len()
    }
}

impl MessageQueue for MemoryQueue {
    async fn queue_url(&self, name: &str) -> Result<String> {
        if name == self.name {
            Ok(self.url())
        } else {
            Err(CloudError::QueueNotFound(name.to_string()))
        }
    }

    /// Messages stay queued until deleted, as with a visibility timeout of zero.
    async fn receive_messages(&self, url: &str, max: usize) -> Result<Vec<QueueMessage>> {
        if url != self.url() {
            return Err(CloudError::QueueNotFound(url.to_string()));
        }
        Ok(locked(&self.pending).iter().take(max).cloned().collect())
    }

    async fn delete_message(&self, url: &str, receipt: &str) -> Result<()> {
        if url != self.url() {
            return Err(CloudError::QueueNotFound(url.to_string()));
        }
        locked(&self.pending).retain(|m| m.receipt_handle != receipt);
        locked(&self.deleted).push(receipt.to_string());
        Ok(())
    }
}

/// Autoscaler that records every call.
#[derive(Default)]
pub struct RecordingAutoScaler {
    heartbeats: Mutex<Vec<String>>,
    completions: Mutex<Vec<(String, LifecycleResult)>>,
}

impl RecordingAutoScaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lifecycle action tokens of every heartbeat, in order.
    pub fn heartbeats(&self) -> Vec<String> {
        locked(&self.heartbeats).clone()
    }

    pub fn completions(&self) -> Vec<(String, LifecycleResult)> {
        locked(&self.completions).clone()
    }
}

impl AutoScaler for RecordingAutoScaler {
    async fn record_heartbeat(&self, action: &LifecycleMessage) -> Result<()> {
        locked(&self.heartbeats).push(action.lifecycle_action_token.clone());
        Ok(())
    }

    async fn complete_action(
        &self,
        action: &LifecycleMessage,
        result: LifecycleResult,
    ) -> Result<()> {
        locked(&self.completions).push((action.lifecycle_action_token.clone(), result));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_queue_redelivers_until_deleted() {
        let queue = MemoryQueue::new("lifecycle");
        let url = queue.queue_url("lifecycle").await.expect("url");
        let receipt = queue.push("{}");

        assert_eq!(queue.receive_messages(&url, 10).await.expect("recv").len(), 1);
        assert_eq!(queue.receive_messages(&url, 10).await.expect("recv").len(), 1);
        queue.delete_message(&url, &receipt).await.expect("delete");
        assert!(queue.receive_messages(&url, 10).await.expect("recv").is_empty());
        assert_eq!(queue.deleted(), vec![receipt]);
    }

    #[tokio::test]
    async fn test_unknown_queue() {
        let queue = MemoryQueue::new("lifecycle");
        assert!(matches!(
            queue.queue_url("other").await,
            Err(CloudError::QueueNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_lifecycle_queue_answers_to_configured_name() {
        let config = LifecycleConfig {
            queue_name: Some("odrive-lifecycle".into()),
            ..LifecycleConfig::default()
        };
        let queue = MemoryQueue::for_lifecycle(&config);
        assert_eq!(
            queue.queue_url("odrive-lifecycle").await.expect("url"),
            "memory://odrive-lifecycle"
        );
    }

    #[tokio::test]
    async fn test_recording_autoscaler() {
        let scaler = RecordingAutoScaler::new();
        let msg = LifecycleMessage {
            lifecycle_action_token: "tok".into(),
            ..LifecycleMessage::default()
        };
        scaler.record_heartbeat(&msg).await.expect("heartbeat");
        scaler
            .complete_action(&msg, LifecycleResult::Continue)
            .await
            .expect("complete");
        assert_eq!(scaler.heartbeats(), vec!["tok".to_string()]);
        assert_eq!(
            scaler.completions(),
            vec![("tok".to_string(), LifecycleResult::Continue)]
        );
        assert_eq!(LifecycleResult::Continue.as_str(), "CONTINUE");
    }
}
