//! Error types for the room audio session core

/// Result type alias using the session core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in room session operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Local audio capture could not be acquired (permission denied,
    /// no device). Fatal to `join`; never retried by the core.
    #[error("Media acquisition failed: {0}")]
    MediaAcquisition(String),

    /// A join was attempted while a room session is already active
    #[error("Already joined room: {room}")]
    AlreadyJoined {
        /// Room the coordinator is currently in
        room: String,
    },

    /// Offer/answer negotiation failed for a single peer
    #[error("Negotiation with peer {peer_id} failed: {reason}")]
    Negotiation {
        /// Peer whose negotiation failed
        peer_id: String,
        /// What went wrong
        reason: String,
    },

    /// Signaling channel error (send failure, broken connection)
    #[error("Signaling channel error: {0}")]
    Channel(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not occur in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is scoped to a single peer.
    ///
    /// Peer-scoped failures tear down one `PeerConnection` and leave
    /// the session and every other peer untouched.
    pub fn is_peer_scoped(&self) -> bool {
        matches!(self, Error::Negotiation { .. })
    }

    /// Check if this error aborts the whole session operation,
    /// returning the coordinator to idle.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Error::MediaAcquisition(_) | Error::Channel(_) | Error::InvalidConfig(_)
        )
    }
}
