//! Top-level session coordinator
//!
//! Owns one room membership at a time: acquires local media, announces
//! presence, dispatches signaling to the negotiator, and tears
//! everything down on leave. Coordinators are plain instances; tests
//! and embedders create as many as they need.

use crate::config::SessionConfig;
use crate::events::{EventBus, SessionEvent};
use crate::media::{CaptureSource, LocalMedia, MediaStream};
use crate::peer::{Negotiator, PeerLinkState, PeerRegistry};
use crate::signaling::{SignalingChannel, SignalingMessage};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle state of a coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Not in a room
    Idle,
    /// Join in progress (media acquisition, subscription)
    Joining,
    /// Room membership established
    Active,
    /// Teardown in progress
    Leaving,
}

/// The local participant's room membership. Immutable once joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSession {
    room_id: String,
    user_id: String,
}

impl RoomSession {
    /// Room identity
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Local user identity
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

/// Orchestrates one participant's audio session
///
/// At most one room session is active per coordinator. All remote
/// state lives in the peer registry; all UI-visible changes surface
/// through the event bus.
pub struct SessionCoordinator {
    config: SessionConfig,
    channel: Arc<dyn SignalingChannel>,
    capture: Arc<dyn CaptureSource>,
    bus: EventBus,

    state: RwLock<CoordinatorState>,
    session: RwLock<Option<RoomSession>>,
    media: Arc<LocalMedia>,
    registry: Arc<PeerRegistry>,
    negotiator: RwLock<Option<Arc<Negotiator>>>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

impl SessionCoordinator {
    /// Create an idle coordinator
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when `config` fails validation.
    pub fn new(
        config: SessionConfig,
        channel: Arc<dyn SignalingChannel>,
        capture: Arc<dyn CaptureSource>,
    ) -> Result<Self> {
        config.validate()?;
        let bus = EventBus::new(config.event_buffer);

        Ok(Self {
            config,
            channel,
            capture,
            bus,
            state: RwLock::new(CoordinatorState::Idle),
            session: RwLock::new(None),
            media: Arc::new(LocalMedia::new()),
            registry: Arc::new(PeerRegistry::new()),
            negotiator: RwLock::new(None),
            dispatch: Mutex::new(None),
        })
    }

    /// Subscribe to session lifecycle events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.bus.subscribe()
    }

    /// Current lifecycle state
    pub async fn state(&self) -> CoordinatorState {
        *self.state.read().await
    }

    /// Current room membership, if any
    pub async fn session(&self) -> Option<RoomSession> {
        self.session.read().await.clone()
    }

    /// Local capture stream, present while joined
    pub async fn local_stream(&self) -> Option<Arc<MediaStream>> {
        self.media.stream().await
    }

    /// Current local mute state
    pub fn is_muted(&self) -> bool {
        self.media.is_muted()
    }

    /// Identities of all registered peers (snapshot)
    pub async fn peer_ids(&self) -> Vec<String> {
        self.registry.peer_ids().await
    }

    /// Link state of one peer, if registered
    pub async fn peer_state(&self, peer_id: &str) -> Option<PeerLinkState> {
        match self.registry.get(peer_id).await {
            Some(conn) => Some(conn.state().await),
            None => None,
        }
    }

    /// Number of registered peers
    pub async fn peer_count(&self) -> usize {
        self.registry.len().await
    }

    /// The connection record for one peer, if registered.
    ///
    /// Callers layering retry or timeout policy inspect records
    /// through this; the core itself never hands out ownership.
    pub async fn peer(&self, peer_id: &str) -> Option<Arc<crate::peer::PeerConnection>> {
        self.registry.get(peer_id).await
    }

    /// Join a room as `user`.
    ///
    /// Acquires local media, subscribes to signaling scoped to the
    /// room, announces presence, and starts dispatching incoming
    /// messages. On any failure the coordinator is back in `Idle`
    /// holding no resources.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyJoined`] when a session is active or joining
    /// - [`Error::MediaAcquisition`] when capture is denied
    /// - [`Error::Channel`] when the signaling channel rejects the
    ///   subscription or the presence announcement
    pub async fn join(&self, room: &str, user: &str) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state != CoordinatorState::Idle {
                let current = self.session.read().await.clone();
                return Err(Error::AlreadyJoined {
                    room: current
                        .map(|s| s.room_id)
                        .unwrap_or_else(|| room.to_string()),
                });
            }
            *state = CoordinatorState::Joining;
        }

        info!("Joining room {} as {}", room, user);

        let stream = match self.media.acquire(&*self.capture, &self.config.audio).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Join aborted: {}", e);
                *self.state.write().await = CoordinatorState::Idle;
                return Err(e);
            }
        };

        let rx = match self.channel.subscribe(room, user).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!("Join aborted: {}", e);
                self.media.release().await;
                *self.state.write().await = CoordinatorState::Idle;
                return Err(e);
            }
        };

        let negotiator = Arc::new(Negotiator::new(
            room.to_string(),
            user.to_string(),
            stream.clone(),
            self.registry.clone(),
            self.channel.clone(),
            self.bus.clone(),
        ));

        *self.session.write().await = Some(RoomSession {
            room_id: room.to_string(),
            user_id: user.to_string(),
        });
        *self.negotiator.write().await = Some(negotiator.clone());
        *self.dispatch.lock().await = Some(tokio::spawn(Self::dispatch_task(negotiator, rx)));

        if let Err(e) = self
            .channel
            .send(SignalingMessage::user_joined(room, user))
            .await
        {
            warn!("Join aborted, presence announcement failed: {}", e);
            self.teardown(room, user).await;
            return Err(e);
        }

        *self.state.write().await = CoordinatorState::Active;
        self.bus.emit(SessionEvent::LocalStreamReady { stream });

        info!("Joined room {} as {}", room, user);
        Ok(())
    }

    /// Leave the current room.
    ///
    /// Announces departure, cancels message dispatch, closes every
    /// peer record, and releases local media. Idempotent: leaving
    /// while `Idle` is a no-op. Teardown always completes; a failed
    /// departure announcement is reported afterwards.
    pub async fn leave(&self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            match *state {
                CoordinatorState::Idle | CoordinatorState::Leaving => {
                    debug!("leave() with no active session is a no-op");
                    return Ok(());
                }
                _ => *state = CoordinatorState::Leaving,
            }
        }

        let Some(session) = self.session.read().await.clone() else {
            *self.state.write().await = CoordinatorState::Idle;
            return Ok(());
        };

        info!(
            "Leaving room {} as {}",
            session.room_id(),
            session.user_id()
        );

        let announce = self
            .channel
            .send(SignalingMessage::user_left(
                session.room_id(),
                session.user_id(),
            ))
            .await;
        if let Err(e) = &announce {
            warn!("Departure announcement failed: {}", e);
        }

        self.teardown(session.room_id(), session.user_id()).await;
        announce
    }

    /// Tear down session state: cancel dispatch, drop the
    /// subscription, close all peers, release media, return to idle.
    async fn teardown(&self, room: &str, user: &str) {
        if let Some(handle) = self.dispatch.lock().await.take() {
            handle.abort();
        }

        if let Err(e) = self.channel.unsubscribe(room, user).await {
            warn!("Unsubscribe failed during teardown: {}", e);
        }

        for record in self.registry.drain().await {
            self.bus.emit(SessionEvent::PeerRemoved {
                peer_id: record.peer_id().to_string(),
            });
        }

        self.media.release().await;
        *self.negotiator.write().await = None;
        *self.session.write().await = None;
        *self.state.write().await = CoordinatorState::Idle;
    }

    /// Tear down the coordinator entirely. Equivalent to [`leave`];
    /// the coordinator may be reused afterwards.
    ///
    /// [`leave`]: SessionCoordinator::leave
    pub async fn destroy(&self) -> Result<()> {
        self.leave().await
    }

    /// Enable/disable the local microphone.
    ///
    /// Toggles track `enabled` flags only; no renegotiation and no
    /// signaling traffic. Idempotent; repeated calls with the same
    /// value emit nothing.
    pub async fn set_muted(&self, muted: bool) {
        if self.media.set_muted(muted).await {
            self.bus.emit(SessionEvent::LocalMuteChanged { muted });
        }
    }

    /// Force a peer into the failed state and remove it.
    ///
    /// The core imposes no negotiation timeouts; callers layering a
    /// liveness policy use this to cut off a stuck peer. Unknown
    /// peers are a no-op.
    pub async fn fail_peer(&self, peer_id: &str, reason: &str) {
        let negotiator = self.negotiator.read().await.clone();
        if let Some(negotiator) = negotiator {
            negotiator.fail_peer(peer_id, reason).await;
        }
    }

    /// Dispatch loop: one message at a time, in arrival order, until
    /// the subscription ends or teardown aborts the task.
    async fn dispatch_task(
        negotiator: Arc<Negotiator>,
        mut rx: tokio::sync::mpsc::UnboundedReceiver<SignalingMessage>,
    ) {
        while let Some(message) = rx.recv().await {
            negotiator.handle(message).await;
        }
        debug!("Dispatch task terminated");
    }
}

impl std::fmt::Debug for SessionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCoordinator")
            .field("config", &self.config)
            .finish()
    }
}
