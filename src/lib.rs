//! Peer-to-peer audio session core for co-working rooms
//!
//! This crate coordinates multi-peer audio sessions: local capture,
//! presence, offer/answer/ICE negotiation, and connection-state-driven
//! cleanup. Rendering, the signaling transport's internals, and the
//! platform capture stack are collaborators behind traits.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  UI observers                                        │
//! │  ↑ (typed SessionEvent over EventBus)                │
//! │  SessionCoordinator (join/leave/set_muted)           │
//! │  ├─ LocalMedia (capture stream, mute)                │
//! │  ├─ Negotiator (offer/answer/ICE per peer)           │
//! │  │   └─ PeerConnection (per-peer state machine)      │
//! │  ├─ PeerRegistry (one live record per peer)          │
//! │  └─ SignalingChannel (LocalSignalingHub / WebSocket) │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use cowork_webrtc::{
//!     LocalSignalingHub, SessionConfig, SessionCoordinator, SyntheticCapture,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> cowork_webrtc::Result<()> {
//! let hub = LocalSignalingHub::new();
//! let coordinator = SessionCoordinator::new(
//!     SessionConfig::default(),
//!     Arc::new(hub),
//!     Arc::new(SyntheticCapture::new()),
//! )?;
//!
//! let mut events = coordinator.subscribe();
//! coordinator.join("focus-room", "alice").await?;
//! coordinator.set_muted(true).await;
//! // ... react to events.recv().await ...
//! coordinator.leave().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;

// Re-exports for public API
pub use config::{AudioConstraints, SessionConfig};
pub use error::{Error, Result};
pub use events::{EventBus, SessionEvent};
pub use media::{CaptureSource, MediaStream, SyntheticCapture};
pub use peer::{PeerConnection, PeerLinkState, PeerRegistry};
pub use session::{CoordinatorState, RoomSession, SessionCoordinator};
pub use signaling::{LocalSignalingHub, SignalingChannel, SignalingMessage, WebSocketSignaling};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(!ver.is_empty());
    }
}
