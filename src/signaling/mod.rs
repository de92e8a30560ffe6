//! Signaling channel abstraction and implementations
//!
//! The session core only needs addressed send and per-(room, user)
//! receive; everything about how messages actually move is behind
//! [`SignalingChannel`]. [`LocalSignalingHub`] wires participants
//! together in-process, [`WebSocketSignaling`] talks to a signaling
//! server.

mod local;
mod protocol;
mod websocket;

pub use local::LocalSignalingHub;
pub use protocol::{SignalPayload, SignalingMessage};
pub use websocket::WebSocketSignaling;

use crate::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Transport used to exchange signaling messages
///
/// Implementations must preserve per-sender message order; the
/// negotiation protocol's offer → answer → candidate sequencing
/// depends on it. Delivery is best-effort: a missing recipient is not
/// an error.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Send a message into the channel
    async fn send(&self, message: SignalingMessage) -> Result<()>;

    /// Register `(room, user)` and return the stream of messages
    /// visible to that participant. A second subscription for the
    /// same participant replaces the first.
    async fn subscribe(
        &self,
        room: &str,
        user: &str,
    ) -> Result<mpsc::UnboundedReceiver<SignalingMessage>>;

    /// Drop the registration for `(room, user)`. Idempotent.
    async fn unsubscribe(&self, room: &str, user: &str) -> Result<()>;
}
