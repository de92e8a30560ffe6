//! Registry of per-peer connection records

use super::connection::PeerConnection;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Keyed map of peer records; the single source of truth for "who is
/// connected"
///
/// Enforces one live record per peer identity: an `upsert` against an
/// existing non-closed record returns the existing record instead of
/// replacing it, which guards against duplicate connections when both
/// sides initiate simultaneously.
#[derive(Default)]
pub struct PeerRegistry {
    peers: RwLock<HashMap<String, Arc<PeerConnection>>>,
}

impl PeerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the record for `peer_id`, if present
    pub async fn get(&self, peer_id: &str) -> Option<Arc<PeerConnection>> {
        self.peers.read().await.get(peer_id).cloned()
    }

    /// Insert `record` for its peer, unless a live record already
    /// exists, in which case the existing record is returned
    /// unchanged.
    ///
    /// A closed leftover record is replaced (and the leftover closed
    /// again harmlessly).
    pub async fn upsert(&self, record: Arc<PeerConnection>) -> Arc<PeerConnection> {
        let peer_id = record.peer_id().to_string();
        let mut peers = self.peers.write().await;

        if let Some(existing) = peers.get(&peer_id) {
            if existing.state().await.is_live() {
                debug!("Registry keeps existing live record for {}", peer_id);
                return existing.clone();
            }
        }

        info!("Registry inserting record for {}", peer_id);
        peers.insert(peer_id, record.clone());
        record
    }

    /// Remove and close the record for `peer_id`.
    ///
    /// Returns the removed record so the caller can emit lifecycle
    /// events. Never leaves a dangling open connection.
    pub async fn remove(&self, peer_id: &str) -> Option<Arc<PeerConnection>> {
        let removed = self.peers.write().await.remove(peer_id);

        if let Some(record) = &removed {
            info!("Registry removing record for {}", peer_id);
            record.close().await;
        }

        removed
    }

    /// Snapshot of all records. Mutations after the call are not
    /// observed by the returned sequence.
    pub async fn all(&self) -> Vec<Arc<PeerConnection>> {
        self.peers.read().await.values().cloned().collect()
    }

    /// Snapshot of all peer identities
    pub async fn peer_ids(&self) -> Vec<String> {
        self.peers.read().await.keys().cloned().collect()
    }

    /// Whether a record exists for `peer_id`
    pub async fn contains(&self, peer_id: &str) -> bool {
        self.peers.read().await.contains_key(peer_id)
    }

    /// Number of records
    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }

    /// Remove and close every record, returning them in no particular
    /// order.
    pub async fn drain(&self) -> Vec<Arc<PeerConnection>> {
        let drained: Vec<_> = self.peers.write().await.drain().map(|(_, v)| v).collect();

        for record in &drained {
            record.close().await;
        }

        if !drained.is_empty() {
            debug!("Registry drained {} record(s)", drained.len());
        }

        drained
    }
}
