//! Service registry client.
//!
//! Instances announce themselves under
//! `/<org>/<appType>/<appName>/<version>/<protocol>/<nodeId>`. Parents are
//! persistent; the leaf is ephemeral so a lost session removes it.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use odrive_types::wire::ServiceAnnouncement;

const DEFAULT_COMPONENTS: [&str; 4] = ["cte", "service", "object-drive", "1.0"];

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("node exists: {0}")]
    NodeExists(String),

    #[error("no node: {0}")]
    NoNode(String),

    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error("encoding announcement: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeMode {
    Persistent,
    /// Removed when the creating session ends.
    Ephemeral,
}

/// Coordination service capabilities.
pub trait RegistryBackend: Send + Sync + 'static {
    fn create(&self, path: &str, data: &[u8], mode: NodeMode) -> Result<()>;
    fn exists(&self, path: &str) -> Result<bool>;
    fn delete(&self, path: &str) -> Result<()>;
}

/// Fill an underspecified root with `cte/service/object-drive/1.0` components.
pub fn normalize_root(root: &str) -> String {
    let given: Vec<&str> = root.split('/').filter(|p| !p.is_empty()).collect();
    let parts: Vec<&str> = (0..DEFAULT_COMPONENTS.len())
        .map(|i| given.get(i).copied().unwrap_or(DEFAULT_COMPONENTS[i]))
        .collect();
    format!("/{}", parts.join("/"))
}

/// Announces and withdraws this instance.
pub struct ServiceRegistry<B> {
    backend: Arc<B>,
    root: String,
    node_id: String,
    announcement: ServiceAnnouncement,
}

impl<B: RegistryBackend> ServiceRegistry<B> {
    pub fn new(backend: Arc<B>, root: &str, host: &str, port: u16) -> Self {
        Self {
            backend,
            root: normalize_root(root),
            node_id: format!("{host}:{port}"),
            announcement: ServiceAnnouncement::alive(host, port),
        }
    }

    pub fn node_path(&self, protocol: &str) -> String {
        format!("{}/{protocol}/{}", self.root, self.node_id)
    }

    /// Create missing parents and the ephemeral leaf for `protocol`.
    pub fn announce(&self, protocol: &str) -> Result<String> {
        let leaf = self.node_path(protocol);
        let mut path = String::new();
        let parents: Vec<&str> = leaf.split('/').filter(|p| !p.is_empty()).collect();
        for part in &parents[..parents.len().saturating_sub(1)] {
            path.push('/');
            path.push_str(part);
            if !self.backend.exists(&path)? {
                match self.backend.create(&path, &[], NodeMode::Persistent) {
                    Ok(()) | Err(RegistryError::NodeExists(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        let data = serde_json::to_vec(&self.announcement)?;
        self.backend.create(&leaf, &data, NodeMode::Ephemeral)?;
        tracing::info!(path = %leaf, "announced in service registry");
        Ok(leaf)
    }

    /// Remove the leaf for `protocol`. A missing leaf is not an error.
    pub fn deregister(&self, protocol: &str) -> Result<()> {
        let leaf = self.node_path(protocol);
        match self.backend.delete(&leaf) {
            Ok(()) | Err(RegistryError::NoNode(_)) => {
                tracing::info!(path = %leaf, "removed from service registry");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

struct Node {
    data: Vec<u8>,
    mode: NodeMode,
}

/// In-process registry backend with one session.
#[derive(Default)]
pub struct MemoryRegistry {
    nodes: Mutex<BTreeMap<String, Node>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn nodes(&self) -> MutexGuard<'_, BTreeMap<String, Node>> {
        self.nodes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// End the session: every ephemeral node disappears.
    pub fn expire_session(&self) {
        self.nodes().retain(|_, node| node.mode == NodeMode::Persistent);
    }

    pub fn data(&self, path: &str) -> Option<Vec<u8>> {
        self.nodes().get(path).map(|n| n.data.clone())
    }

    pub fn mode(&self, path: &str) -> Option<NodeMode> {
        self.nodes().get(path).map(|n| n.mode)
    }
}

impl RegistryBackend for MemoryRegistry {
    fn create(&self, path: &str, data: &[u8], mode: NodeMode) -> Result<()> {
        let mut nodes = self.nodes();
        if nodes.contains_key(path) {
            return Err(RegistryError::NodeExists(path.to_string()));
        }
        if let Some((parent, _)) = path.rsplit_once('/') {
            if !parent.is_empty() && !nodes.contains_key(parent) {
                return Err(RegistryError::NoNode(parent.to_string()));
            }
        }
        nodes.insert(
            path.to_string(),
            Node {
                data: data.to_vec(),
                mode,
            },
        );
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.nodes().contains_key(path))
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.nodes()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NoNode(path.to_string()))
    }
}
