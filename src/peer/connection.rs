//! Per-peer connection record and negotiation state machine

use crate::config::AudioConstraints;
use crate::media::{AudioTrack, MediaStream, TrackSettings};
use crate::{Error, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Negotiation state of a peer link
///
/// `New → Negotiating → Connected`; `Disconnected`/`Failed` lead only
/// to `Closed`, and `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerLinkState {
    /// Record exists, no negotiation started
    New,
    /// Offer/answer exchange in progress
    Negotiating,
    /// Link established, remote stream available
    Connected,
    /// Link lost after being established
    Disconnected,
    /// Negotiation or link failed
    Failed,
    /// Record closed; no further transitions
    Closed,
}

impl PeerLinkState {
    /// Whether the record still participates in negotiation
    pub fn is_live(&self) -> bool {
        !matches!(self, PeerLinkState::Closed)
    }
}

/// One remote participant's connection
///
/// Owns the negotiation state for a single peer: descriptions, the
/// FIFO queue of candidates that arrived before the remote
/// description, and the remote stream handle once the link is up.
/// The link counts as connected when both descriptions are set and at
/// least one remote candidate has been applied.
pub struct PeerConnection {
    /// Remote peer identity
    peer_id: String,

    /// Unique identifier for this connection instance
    connection_id: String,

    /// Current link state
    state: RwLock<PeerLinkState>,

    /// Local session description (offer or answer)
    local_description: RwLock<Option<String>>,

    /// Remote session description (offer or answer)
    remote_description: RwLock<Option<String>>,

    /// Remote candidates received before the remote description
    pending_candidates: Mutex<VecDeque<String>>,

    /// Remote candidates applied to the link, in application order
    applied_candidates: RwLock<Vec<String>>,

    /// Locally gathered candidates awaiting pickup for signaling
    local_candidates: Mutex<Vec<String>>,

    /// Local tracks attached to this link
    local_stream: RwLock<Option<Arc<MediaStream>>>,

    /// Remote stream, present once the link is connected
    remote_stream: RwLock<Option<Arc<MediaStream>>>,

    /// When the record was created
    created_at: SystemTime,
}

impl PeerConnection {
    /// Create a new record for `peer_id` in the `New` state
    pub fn new(peer_id: String) -> Self {
        let connection_id = uuid::Uuid::new_v4().to_string();

        info!(
            "Creating peer connection: peer_id={}, connection_id={}",
            peer_id, connection_id
        );

        Self {
            peer_id,
            connection_id,
            state: RwLock::new(PeerLinkState::New),
            local_description: RwLock::new(None),
            remote_description: RwLock::new(None),
            pending_candidates: Mutex::new(VecDeque::new()),
            applied_candidates: RwLock::new(Vec::new()),
            local_candidates: Mutex::new(Vec::new()),
            local_stream: RwLock::new(None),
            remote_stream: RwLock::new(None),
            created_at: SystemTime::now(),
        }
    }

    /// Get the peer ID
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Get the connection instance ID
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Get the current link state
    pub async fn state(&self) -> PeerLinkState {
        *self.state.read().await
    }

    /// How long this record has existed
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed().unwrap_or_default()
    }

    /// Transition to `new_state`. Returns whether the state changed.
    ///
    /// `Closed` is immutable: transitions out of it are ignored.
    async fn set_state(&self, new_state: PeerLinkState) -> bool {
        let mut state = self.state.write().await;
        let old_state = *state;

        if old_state == PeerLinkState::Closed {
            if new_state != PeerLinkState::Closed {
                warn!(
                    "Ignoring transition to {:?} for closed peer {}",
                    new_state, self.peer_id
                );
            }
            return false;
        }

        if old_state != new_state {
            debug!(
                "Peer {} state transition: {:?} -> {:?}",
                self.peer_id, old_state, new_state
            );
            *state = new_state;
            true
        } else {
            false
        }
    }

    /// Attach the local tracks sent over this link
    pub async fn attach_local_stream(&self, stream: Arc<MediaStream>) {
        debug!(
            "Attaching local stream {} to peer {}",
            stream.id(),
            self.peer_id
        );
        *self.local_stream.write().await = Some(stream);
    }

    /// Local tracks attached to this link, if any
    pub async fn local_stream(&self) -> Option<Arc<MediaStream>> {
        self.local_stream.read().await.clone()
    }

    /// Remote stream handle, present once the link is connected
    pub async fn remote_stream(&self) -> Option<Arc<MediaStream>> {
        self.remote_stream.read().await.clone()
    }

    /// Generate an offer, set it as local description, and transition
    /// to `Negotiating`. Returns the offer to send to the peer.
    pub async fn create_offer(&self) -> Result<String> {
        let state = self.state().await;
        if !state.is_live() {
            return Err(Error::Negotiation {
                peer_id: self.peer_id.clone(),
                reason: format!("cannot create offer in state {:?}", state),
            });
        }

        self.set_state(PeerLinkState::Negotiating).await;

        let sdp = self.build_description("offer");
        *self.local_description.write().await = Some(sdp.clone());
        self.gather_local_candidate().await;

        debug!("Created offer for peer {}", self.peer_id);
        Ok(sdp)
    }

    /// Apply a received offer, generate an answer, set it as local
    /// description, and transition to `Negotiating`. Returns the
    /// answer to send back.
    pub async fn create_answer(&self, offer_sdp: String) -> Result<String> {
        let state = self.state().await;
        if !state.is_live() {
            return Err(Error::Negotiation {
                peer_id: self.peer_id.clone(),
                reason: format!("cannot answer in state {:?}", state),
            });
        }

        self.apply_remote_description(offer_sdp).await;

        let sdp = self.build_description("answer");
        *self.local_description.write().await = Some(sdp.clone());
        self.set_state(PeerLinkState::Negotiating).await;
        self.gather_local_candidate().await;

        debug!("Created answer for peer {}", self.peer_id);
        self.check_connectivity().await;
        Ok(sdp)
    }

    /// Apply a received answer as the remote description.
    ///
    /// Returns `true` when the link just reached `Connected`.
    pub async fn apply_answer(&self, answer_sdp: String) -> Result<bool> {
        let state = self.state().await;
        if state != PeerLinkState::Negotiating {
            return Err(Error::Negotiation {
                peer_id: self.peer_id.clone(),
                reason: format!("answer received in state {:?}", state),
            });
        }

        self.apply_remote_description(answer_sdp).await;
        debug!("Applied answer from peer {}", self.peer_id);
        Ok(self.check_connectivity().await)
    }

    /// Add a remote ICE candidate.
    ///
    /// Candidates arriving before the remote description are queued;
    /// the queue is flushed in FIFO order the moment the description
    /// is set. Returns `true` when the link just reached `Connected`.
    pub async fn add_ice_candidate(&self, candidate: String) -> Result<bool> {
        if self.remote_description.read().await.is_none() {
            debug!(
                "Queueing candidate from peer {} (no remote description yet)",
                self.peer_id
            );
            self.pending_candidates.lock().await.push_back(candidate);
            return Ok(false);
        }

        debug!("Applying candidate from peer {}", self.peer_id);
        self.applied_candidates.write().await.push(candidate);
        Ok(self.check_connectivity().await)
    }

    /// Set the remote description and flush queued candidates in FIFO
    /// arrival order.
    async fn apply_remote_description(&self, sdp: String) {
        *self.remote_description.write().await = Some(sdp);

        let mut pending = self.pending_candidates.lock().await;
        if !pending.is_empty() {
            debug!(
                "Flushing {} queued candidate(s) for peer {}",
                pending.len(),
                self.peer_id
            );
            let mut applied = self.applied_candidates.write().await;
            while let Some(candidate) = pending.pop_front() {
                applied.push(candidate);
            }
        }
    }

    /// Transition to `Connected` once both descriptions are set and a
    /// remote candidate has been applied. Returns whether the link
    /// just connected.
    async fn check_connectivity(&self) -> bool {
        if self.state().await != PeerLinkState::Negotiating {
            return false;
        }
        if self.local_description.read().await.is_none()
            || self.remote_description.read().await.is_none()
            || self.applied_candidates.read().await.is_empty()
        {
            return false;
        }

        if self.set_state(PeerLinkState::Connected).await {
            let settings = TrackSettings::from(&AudioConstraints::default());
            let track = Arc::new(AudioTrack::new(settings));
            *self.remote_stream.write().await = Some(Arc::new(MediaStream::new(vec![track])));

            info!("Peer {} connected", self.peer_id);
            true
        } else {
            false
        }
    }

    /// Take the locally gathered candidates for signaling to the peer
    pub async fn take_local_candidates(&self) -> Vec<String> {
        std::mem::take(&mut *self.local_candidates.lock().await)
    }

    /// Number of remote candidates waiting for the remote description
    pub async fn pending_candidate_count(&self) -> usize {
        self.pending_candidates.lock().await.len()
    }

    /// Remote candidates applied so far, in application order
    pub async fn applied_candidates(&self) -> Vec<String> {
        self.applied_candidates.read().await.clone()
    }

    /// Mark the link failed
    pub async fn mark_failed(&self) {
        self.set_state(PeerLinkState::Failed).await;
    }

    /// Mark the link disconnected
    pub async fn mark_disconnected(&self) {
        self.set_state(PeerLinkState::Disconnected).await;
    }

    /// Close the record. Terminal and idempotent.
    pub async fn close(&self) {
        if self.set_state(PeerLinkState::Closed).await {
            info!("Closed peer connection for {}", self.peer_id);
        }
        self.pending_candidates.lock().await.clear();
        *self.remote_stream.write().await = None;
    }

    /// Build a session description. The link is modeled in-crate, so
    /// the description only has to be well-formed and unique per
    /// connection instance.
    fn build_description(&self, kind: &str) -> String {
        format!(
            "v=0\r\no=- {} 2 IN IP4 0.0.0.0\r\ns=-\r\nt=0 0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=setup:{}\r\n",
            self.connection_id,
            if kind == "offer" { "actpass" } else { "active" }
        )
    }

    /// Gather the host candidate for the current local description
    async fn gather_local_candidate(&self) {
        let candidate = format!(
            "candidate:{} 1 udp 2122260223 0.0.0.0 9 typ host",
            &self.connection_id[..8]
        );
        self.local_candidates.lock().await.push(candidate);
    }
}

impl std::fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection")
            .field("peer_id", &self.peer_id)
            .field("connection_id", &self.connection_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_connection_state() {
        let pc = PeerConnection::new("peer-1".to_string());
        assert_eq!(pc.peer_id(), "peer-1");
        assert_eq!(pc.state().await, PeerLinkState::New);
        assert!(pc.local_stream().await.is_none());
        assert!(pc.remote_stream().await.is_none());
    }

    #[tokio::test]
    async fn test_attach_local_stream() {
        let pc = PeerConnection::new("peer-1".to_string());
        let stream = Arc::new(MediaStream::new(vec![Arc::new(AudioTrack::new(
            TrackSettings::from(&AudioConstraints::default()),
        ))]));

        pc.attach_local_stream(stream.clone()).await;
        assert_eq!(pc.local_stream().await.unwrap().id(), stream.id());
    }

    #[tokio::test]
    async fn test_create_offer_enters_negotiating() {
        let pc = PeerConnection::new("peer-1".to_string());

        let sdp = pc.create_offer().await.unwrap();
        assert!(sdp.contains("a=setup:actpass"));
        assert_eq!(pc.state().await, PeerLinkState::Negotiating);
        assert_eq!(pc.take_local_candidates().await.len(), 1);
    }

    #[tokio::test]
    async fn test_create_answer_enters_negotiating() {
        let pc = PeerConnection::new("peer-1".to_string());

        let answer = pc.create_answer("v=0\r\n...offer".to_string()).await.unwrap();
        assert!(answer.contains("a=setup:active"));
        assert_eq!(pc.state().await, PeerLinkState::Negotiating);
    }

    #[tokio::test]
    async fn test_candidates_queue_before_remote_description() {
        let pc = PeerConnection::new("peer-1".to_string());

        pc.add_ice_candidate("candidate:a".to_string()).await.unwrap();
        pc.add_ice_candidate("candidate:b".to_string()).await.unwrap();

        assert_eq!(pc.state().await, PeerLinkState::New);
        assert_eq!(pc.pending_candidate_count().await, 2);
        assert!(pc.applied_candidates().await.is_empty());
    }

    #[tokio::test]
    async fn test_queued_candidates_flush_in_fifo_order() {
        let pc = PeerConnection::new("peer-1".to_string());

        pc.add_ice_candidate("candidate:a".to_string()).await.unwrap();
        pc.add_ice_candidate("candidate:b".to_string()).await.unwrap();

        pc.create_answer("offer-sdp".to_string()).await.unwrap();

        assert_eq!(pc.pending_candidate_count().await, 0);
        assert_eq!(
            pc.applied_candidates().await,
            vec!["candidate:a".to_string(), "candidate:b".to_string()]
        );

        // Later candidates apply immediately
        pc.add_ice_candidate("candidate:c".to_string()).await.unwrap();
        assert_eq!(pc.applied_candidates().await.len(), 3);
    }

    #[tokio::test]
    async fn test_connects_after_answer_and_candidate() {
        let pc = PeerConnection::new("peer-1".to_string());

        pc.create_offer().await.unwrap();
        let connected = pc.apply_answer("answer-sdp".to_string()).await.unwrap();
        assert!(!connected); // no remote candidate yet

        let connected = pc
            .add_ice_candidate("candidate:x".to_string())
            .await
            .unwrap();
        assert!(connected);
        assert_eq!(pc.state().await, PeerLinkState::Connected);
        assert!(pc.remote_stream().await.is_some());
    }

    #[tokio::test]
    async fn test_responder_connects_once_candidate_applied() {
        let pc = PeerConnection::new("peer-1".to_string());

        pc.add_ice_candidate("candidate:x".to_string()).await.unwrap();
        pc.create_answer("offer-sdp".to_string()).await.unwrap();

        // Both descriptions set and the queued candidate applied
        assert_eq!(pc.state().await, PeerLinkState::Connected);
    }

    #[tokio::test]
    async fn test_answer_in_new_state_is_error() {
        let pc = PeerConnection::new("peer-1".to_string());
        let result = pc.apply_answer("answer-sdp".to_string()).await;
        assert!(matches!(result, Err(Error::Negotiation { .. })));
    }

    #[tokio::test]
    async fn test_closed_is_terminal() {
        let pc = PeerConnection::new("peer-1".to_string());
        pc.close().await;
        pc.close().await;

        assert_eq!(pc.state().await, PeerLinkState::Closed);
        assert!(pc.create_offer().await.is_err());

        pc.mark_failed().await;
        assert_eq!(pc.state().await, PeerLinkState::Closed);
    }

    #[tokio::test]
    async fn test_state_liveness() {
        let pc = PeerConnection::new("peer-1".to_string());
        pc.mark_failed().await;
        assert_eq!(pc.state().await, PeerLinkState::Failed);
        assert!(!PeerLinkState::Closed.is_live());
        assert!(PeerLinkState::Failed.is_live());
    }
}
