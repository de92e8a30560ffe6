//! Typed session event bus
//!
//! UI observers subscribe here instead of registering string-keyed
//! callbacks: the event set is a closed enum, so a handler match is
//! checked at compile time and a typo cannot silently drop events.

use crate::media::MediaStream;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// Events emitted by a session coordinator
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Local capture stream acquired and ready (emitted once per join)
    LocalStreamReady {
        /// The local audio stream
        stream: Arc<MediaStream>,
    },

    /// A remote peer's audio stream became available
    RemoteStreamReceived {
        /// Peer the stream belongs to
        peer_id: String,
        /// The remote audio stream
        stream: Arc<MediaStream>,
    },

    /// A peer connection reached the connected state
    PeerConnected {
        /// Connected peer
        peer_id: String,
    },

    /// A peer connection was lost (disconnected or failed)
    PeerDisconnected {
        /// Lost peer
        peer_id: String,
    },

    /// A peer record was removed from the registry
    PeerRemoved {
        /// Removed peer
        peer_id: String,
    },

    /// Local mute state changed
    LocalMuteChanged {
        /// New mute state
        muted: bool,
    },
}

impl SessionEvent {
    /// Short name of the event variant, used in logs
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::LocalStreamReady { .. } => "local_stream_ready",
            SessionEvent::RemoteStreamReceived { .. } => "remote_stream_received",
            SessionEvent::PeerConnected { .. } => "peer_connected",
            SessionEvent::PeerDisconnected { .. } => "peer_disconnected",
            SessionEvent::PeerRemoved { .. } => "peer_removed",
            SessionEvent::LocalMuteChanged { .. } => "local_mute_changed",
        }
    }
}

/// In-process publish/subscribe bus for [`SessionEvent`]
///
/// Cheap to clone; every clone publishes into the same channel.
/// Subscribers that lag behind the buffer capacity lose oldest events
/// (`broadcast` semantics), which is acceptable for UI observers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a new bus with the given buffer capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all current subscribers
    ///
    /// Publishing with no subscribers is not an error; the event is
    /// dropped with a trace diagnostic.
    pub fn emit(&self, event: SessionEvent) {
        let name = event.name();
        match self.tx.send(event) {
            Ok(n) => trace!("Emitted {} to {} subscriber(s)", name, n),
            Err(_) => trace!("Dropped {} (no subscribers)", name),
        }
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.emit(SessionEvent::PeerConnected {
            peer_id: "peer-1".to_string(),
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            SessionEvent::PeerConnected { peer_id } if peer_id == "peer-1"
        ));
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_ok() {
        let bus = EventBus::new(8);
        // Must not panic or error
        bus.emit(SessionEvent::LocalMuteChanged { muted: true });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_see_every_event() {
        let bus = EventBus::new(8);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(SessionEvent::PeerRemoved {
            peer_id: "peer-2".to_string(),
        });

        for rx in [&mut rx1, &mut rx2] {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.name(), "peer_removed");
        }
    }

    #[test]
    fn test_event_names() {
        let event = SessionEvent::LocalMuteChanged { muted: false };
        assert_eq!(event.name(), "local_mute_changed");
    }
}
