//! In-process signaling hub
//!
//! Routes messages between participants of the same process over
//! unbounded mpsc channels. This is the channel tests and demos run
//! on; it delivers in send order per sender, which satisfies the
//! ordering contract the negotiator relies on.

use super::{SignalingChannel, SignalingMessage};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, trace};

type Mailbox = mpsc::UnboundedSender<SignalingMessage>;

/// In-process signaling hub shared by all local participants
#[derive(Clone, Default)]
pub struct LocalSignalingHub {
    /// room -> user -> mailbox
    rooms: Arc<RwLock<HashMap<String, HashMap<String, Mailbox>>>>,
}

impl LocalSignalingHub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered participants in `room`
    pub async fn occupancy(&self, room: &str) -> usize {
        self.rooms
            .read()
            .await
            .get(room)
            .map(|users| users.len())
            .unwrap_or(0)
    }

    fn deliver(user: &str, mailbox: &Mailbox, message: SignalingMessage) {
        let kind = message.kind();
        if mailbox.send(message).is_err() {
            // Receiver dropped without unsubscribing; the entry is
            // pruned on the next unsubscribe or overwritten on
            // re-subscribe.
            debug!("Dropped {} for {}: mailbox closed", kind, user);
        } else {
            trace!("Delivered {} to {}", kind, user);
        }
    }
}

#[async_trait]
impl SignalingChannel for LocalSignalingHub {
    async fn send(&self, message: SignalingMessage) -> Result<()> {
        let rooms = self.rooms.read().await;

        let Some(users) = rooms.get(&message.room) else {
            debug!("Dropped {}: no such room {}", message.kind(), message.room);
            return Ok(());
        };

        match &message.to {
            Some(to) => {
                if let Some(mailbox) = users.get(to) {
                    Self::deliver(to, mailbox, message.clone());
                } else {
                    debug!(
                        "Dropped {} from {}: recipient {} not in room {}",
                        message.kind(),
                        message.from,
                        to,
                        message.room
                    );
                }
            }
            None => {
                for (user, mailbox) in users.iter() {
                    if user != &message.from {
                        Self::deliver(user, mailbox, message.clone());
                    }
                }
            }
        }

        Ok(())
    }

    async fn subscribe(
        &self,
        room: &str,
        user: &str,
    ) -> Result<mpsc::UnboundedReceiver<SignalingMessage>> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room.to_string())
            .or_default()
            .insert(user.to_string(), tx);

        debug!("{} subscribed to room {}", user, room);
        Ok(rx)
    }

    async fn unsubscribe(&self, room: &str, user: &str) -> Result<()> {
        let mut rooms = self.rooms.write().await;

        if let Some(users) = rooms.get_mut(room) {
            if users.remove(user).is_some() {
                debug!("{} unsubscribed from room {}", user, room);
            }
            if users.is_empty() {
                rooms.remove(room);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let hub = LocalSignalingHub::new();
        let mut alice_rx = hub.subscribe("room-1", "alice").await.unwrap();
        let mut bob_rx = hub.subscribe("room-1", "bob").await.unwrap();

        hub.send(SignalingMessage::user_joined("room-1", "alice"))
            .await
            .unwrap();

        let msg = bob_rx.recv().await.unwrap();
        assert_eq!(msg.from, "alice");
        assert_eq!(msg.kind(), "user-joined");

        // The sender must not see its own broadcast
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_addressed_delivery() {
        let hub = LocalSignalingHub::new();
        let mut alice_rx = hub.subscribe("room-1", "alice").await.unwrap();
        let mut bob_rx = hub.subscribe("room-1", "bob").await.unwrap();
        let mut carol_rx = hub.subscribe("room-1", "carol").await.unwrap();

        hub.send(SignalingMessage::offer(
            "room-1",
            "alice",
            "bob",
            "sdp".to_string(),
        ))
        .await
        .unwrap();

        assert_eq!(bob_rx.recv().await.unwrap().kind(), "offer");
        assert!(alice_rx.try_recv().is_err());
        assert!(carol_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_recipient_is_not_an_error() {
        let hub = LocalSignalingHub::new();
        let _rx = hub.subscribe("room-1", "alice").await.unwrap();

        let result = hub
            .send(SignalingMessage::answer(
                "room-1",
                "alice",
                "ghost",
                "sdp".to_string(),
            ))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let hub = LocalSignalingHub::new();
        let _a = hub.subscribe("room-1", "alice").await.unwrap();
        let mut other_rx = hub.subscribe("room-2", "bob").await.unwrap();

        hub.send(SignalingMessage::user_joined("room-1", "alice"))
            .await
            .unwrap();

        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_prunes_room() {
        let hub = LocalSignalingHub::new();
        let _rx = hub.subscribe("room-1", "alice").await.unwrap();
        assert_eq!(hub.occupancy("room-1").await, 1);

        hub.unsubscribe("room-1", "alice").await.unwrap();
        hub.unsubscribe("room-1", "alice").await.unwrap();
        assert_eq!(hub.occupancy("room-1").await, 0);
    }

    #[tokio::test]
    async fn test_per_sender_order_preserved() {
        let hub = LocalSignalingHub::new();
        let mut bob_rx = hub.subscribe("room-1", "bob").await.unwrap();

        hub.send(SignalingMessage::offer(
            "room-1",
            "alice",
            "bob",
            "sdp".to_string(),
        ))
        .await
        .unwrap();
        hub.send(SignalingMessage::ice_candidate(
            "room-1",
            "alice",
            "bob",
            "candidate:1".to_string(),
        ))
        .await
        .unwrap();

        assert_eq!(bob_rx.recv().await.unwrap().kind(), "offer");
        assert_eq!(bob_rx.recv().await.unwrap().kind(), "ice-candidate");
    }
}
