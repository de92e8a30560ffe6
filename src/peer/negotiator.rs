//! Offer/answer/ICE negotiation for a room session
//!
//! One negotiator exists per active session. It is driven one message
//! at a time by the coordinator's dispatch task, so per-peer message
//! order is the arrival order and no locking beyond the registry's is
//! needed.

use super::connection::{PeerConnection, PeerLinkState};
use super::registry::PeerRegistry;
use crate::events::{EventBus, SessionEvent};
use crate::media::MediaStream;
use crate::signaling::{SignalPayload, SignalingChannel, SignalingMessage};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Drives negotiation for every peer of one room session
pub(crate) struct Negotiator {
    /// Room this session belongs to
    room: String,

    /// Local participant identity
    local_id: String,

    /// Local tracks attached to every peer link
    local_stream: Arc<MediaStream>,

    /// Shared peer registry
    registry: Arc<PeerRegistry>,

    /// Outbound signaling
    channel: Arc<dyn SignalingChannel>,

    /// Lifecycle event sink
    bus: EventBus,
}

impl Negotiator {
    pub(crate) fn new(
        room: String,
        local_id: String,
        local_stream: Arc<MediaStream>,
        registry: Arc<PeerRegistry>,
        channel: Arc<dyn SignalingChannel>,
        bus: EventBus,
    ) -> Self {
        Self {
            room,
            local_id,
            local_stream,
            registry,
            channel,
            bus,
        }
    }

    /// Deterministic initiator election: the lexicographically smaller
    /// identity generates the offer, so exactly one side of every pair
    /// initiates.
    fn initiates_to(&self, peer_id: &str) -> bool {
        self.local_id.as_str() < peer_id
    }

    /// Process one signaling message.
    ///
    /// Messages from self, for other rooms, or addressed to another
    /// user are ignored; the channel is a broadcast medium and
    /// filtering is the receiver's responsibility.
    pub(crate) async fn handle(&self, message: SignalingMessage) {
        if message.room != self.room {
            trace!("Ignoring {} for room {}", message.kind(), message.room);
            return;
        }
        if message.from == self.local_id {
            trace!("Ignoring own {}", message.kind());
            return;
        }
        if let Some(to) = &message.to {
            if to != &self.local_id {
                trace!("Ignoring {} addressed to {}", message.kind(), to);
                return;
            }
        }

        let from = message.from;
        match message.payload {
            SignalPayload::UserJoined => self.handle_user_joined(&from).await,
            SignalPayload::UserLeft => self.handle_user_left(&from).await,
            SignalPayload::Offer { sdp } => self.handle_offer(&from, sdp).await,
            SignalPayload::Answer { sdp } => self.handle_answer(&from, sdp).await,
            SignalPayload::IceCandidate { candidate, .. } => {
                self.handle_candidate(&from, candidate).await
            }
        }
    }

    /// Presence: a peer entered the room.
    ///
    /// The initiating side (per the tie-break) creates and sends an
    /// offer; the other side creates a record in `New` and waits for
    /// the peer's offer.
    async fn handle_user_joined(&self, peer_id: &str) {
        if self.registry.get(peer_id).await.is_some() {
            debug!("Ignoring repeated user-joined from {}", peer_id);
            return;
        }

        let conn = self.fresh_record(peer_id).await;

        if !self.initiates_to(peer_id) {
            debug!("Awaiting offer from {} (they initiate)", peer_id);
            return;
        }

        info!("Initiating connection to {}", peer_id);
        match conn.create_offer().await {
            Ok(sdp) => {
                if self.is_stale(peer_id, &conn).await {
                    return;
                }
                let offer = SignalingMessage::offer(&self.room, &self.local_id, peer_id, sdp);
                if self.send_or_fail(peer_id, offer).await {
                    self.send_local_candidates(peer_id, &conn).await;
                }
            }
            Err(e) => self.fail_peer(peer_id, &e.to_string()).await,
        }
    }

    /// Presence: a peer left the room. Their record is closed and
    /// removed; a connected link additionally reports the disconnect.
    async fn handle_user_left(&self, peer_id: &str) {
        let Some(conn) = self.registry.get(peer_id).await else {
            debug!("Ignoring user-left from unknown peer {}", peer_id);
            return;
        };

        let was_connected = conn.state().await == PeerLinkState::Connected;
        self.registry.remove(peer_id).await;

        info!("Peer {} left the room", peer_id);
        if was_connected {
            self.bus.emit(SessionEvent::PeerDisconnected {
                peer_id: peer_id.to_string(),
            });
        }
        self.bus.emit(SessionEvent::PeerRemoved {
            peer_id: peer_id.to_string(),
        });
    }

    /// An offer arrived. Unknown peers get a fresh record; an existing
    /// record either answers (it was waiting in `New`), ignores the
    /// offer (glare, we initiate), or is rebuilt with our own offer
    /// discarded (glare, they initiate). Rebuilding a connected link
    /// additionally reports the old link as lost.
    async fn handle_offer(&self, peer_id: &str, sdp: String) {
        let conn = match self.registry.get(peer_id).await {
            Some(existing) => {
                let state = existing.state().await;
                match state {
                    PeerLinkState::New => existing,
                    PeerLinkState::Negotiating | PeerLinkState::Connected => {
                        if self.initiates_to(peer_id) {
                            debug!(
                                "Glare: ignoring offer from {} (local side initiates)",
                                peer_id
                            );
                            return;
                        }
                        debug!("Glare: discarding local offer, accepting {}'s", peer_id);
                        self.registry.remove(peer_id).await;
                        if state == PeerLinkState::Connected {
                            self.bus.emit(SessionEvent::PeerDisconnected {
                                peer_id: peer_id.to_string(),
                            });
                            self.bus.emit(SessionEvent::PeerRemoved {
                                peer_id: peer_id.to_string(),
                            });
                        }
                        self.fresh_record(peer_id).await
                    }
                    _ => {
                        // Leftover closed record: replace it
                        self.registry.remove(peer_id).await;
                        self.fresh_record(peer_id).await
                    }
                }
            }
            None => self.fresh_record(peer_id).await,
        };

        info!("Answering offer from {}", peer_id);
        match conn.create_answer(sdp).await {
            Ok(answer_sdp) => {
                if self.is_stale(peer_id, &conn).await {
                    return;
                }
                let answer =
                    SignalingMessage::answer(&self.room, &self.local_id, peer_id, answer_sdp);
                if self.send_or_fail(peer_id, answer).await {
                    self.send_local_candidates(peer_id, &conn).await;
                }
                // Queued candidates may have completed the link
                // already (answer side connects on flush).
                if conn.state().await == PeerLinkState::Connected {
                    self.emit_connected(peer_id, &conn).await;
                }
            }
            Err(e) => self.fail_peer(peer_id, &e.to_string()).await,
        }
    }

    /// An answer arrived. Only a record mid-negotiation accepts it;
    /// anything else is a late or out-of-order message and is dropped
    /// with a diagnostic, never surfaced as an error.
    async fn handle_answer(&self, peer_id: &str, sdp: String) {
        let Some(conn) = self.registry.get(peer_id).await else {
            debug!("Dropping answer from unknown peer {}", peer_id);
            return;
        };

        if conn.state().await != PeerLinkState::Negotiating {
            debug!(
                "Dropping answer from {} in state {:?}",
                peer_id,
                conn.state().await
            );
            return;
        }

        match conn.apply_answer(sdp).await {
            Ok(connected) => {
                if connected && !self.is_stale(peer_id, &conn).await {
                    self.emit_connected(peer_id, &conn).await;
                }
            }
            Err(e) => self.fail_peer(peer_id, &e.to_string()).await,
        }
    }

    /// An ICE candidate arrived. Unknown peers are a stale drop; known
    /// peers queue or apply per the ordering contract.
    async fn handle_candidate(&self, peer_id: &str, candidate: String) {
        let Some(conn) = self.registry.get(peer_id).await else {
            debug!("Dropping candidate from unknown peer {}", peer_id);
            return;
        };

        if !conn.state().await.is_live() {
            debug!("Dropping candidate for closed peer {}", peer_id);
            return;
        }

        match conn.add_ice_candidate(candidate).await {
            Ok(connected) => {
                if connected && !self.is_stale(peer_id, &conn).await {
                    self.emit_connected(peer_id, &conn).await;
                }
            }
            Err(e) => self.fail_peer(peer_id, &e.to_string()).await,
        }
    }

    /// Mark a peer failed, remove it, and report the loss. Scoped to
    /// the one peer; the session and other peers are untouched.
    pub(crate) async fn fail_peer(&self, peer_id: &str, reason: &str) {
        warn!("Negotiation with {} failed: {}", peer_id, reason);

        if let Some(conn) = self.registry.get(peer_id).await {
            conn.mark_failed().await;
        }
        if self.registry.remove(peer_id).await.is_some() {
            self.bus.emit(SessionEvent::PeerDisconnected {
                peer_id: peer_id.to_string(),
            });
            self.bus.emit(SessionEvent::PeerRemoved {
                peer_id: peer_id.to_string(),
            });
        }
    }

    /// Create and register a record with local tracks attached
    async fn fresh_record(&self, peer_id: &str) -> Arc<PeerConnection> {
        let conn = Arc::new(PeerConnection::new(peer_id.to_string()));
        conn.attach_local_stream(self.local_stream.clone()).await;
        self.registry.upsert(conn).await
    }

    /// A completion is stale when its record left the registry while
    /// the step was suspended (teardown raced it). Stale completions
    /// must no-op rather than resurrect the peer.
    async fn is_stale(&self, peer_id: &str, conn: &Arc<PeerConnection>) -> bool {
        match self.registry.get(peer_id).await {
            Some(current) if current.connection_id() == conn.connection_id() => false,
            _ => {
                debug!("Discarding stale completion for {}", peer_id);
                true
            }
        }
    }

    /// Send one message, converting a channel failure into a per-peer
    /// negotiation failure. Returns whether the send succeeded.
    async fn send_or_fail(&self, peer_id: &str, message: SignalingMessage) -> bool {
        let kind = message.kind();
        if let Err(e) = self.channel.send(message).await {
            self.fail_peer(peer_id, &format!("failed to send {}: {}", kind, e))
                .await;
            false
        } else {
            true
        }
    }

    /// Signal locally gathered candidates to the peer
    async fn send_local_candidates(&self, peer_id: &str, conn: &Arc<PeerConnection>) {
        for candidate in conn.take_local_candidates().await {
            let message =
                SignalingMessage::ice_candidate(&self.room, &self.local_id, peer_id, candidate);
            if !self.send_or_fail(peer_id, message).await {
                break;
            }
        }
    }

    /// Report a freshly connected link: stream first, then the
    /// connection event.
    async fn emit_connected(&self, peer_id: &str, conn: &Arc<PeerConnection>) {
        if let Some(stream) = conn.remote_stream().await {
            self.bus.emit(SessionEvent::RemoteStreamReceived {
                peer_id: peer_id.to_string(),
                stream,
            });
        }
        self.bus.emit(SessionEvent::PeerConnected {
            peer_id: peer_id.to_string(),
        });
    }
}
