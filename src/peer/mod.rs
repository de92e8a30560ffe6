//! Peer connection management: records, registry, and negotiation

mod connection;
mod negotiator;
mod registry;

pub use connection::{PeerConnection, PeerLinkState};
pub use registry::PeerRegistry;

pub(crate) use negotiator::Negotiator;
