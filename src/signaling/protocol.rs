//! Signaling wire protocol
//!
//! Every message is a notification: there is no request/response
//! correlation in the room protocol, so the envelope is a plain
//! tagged union rather than an RPC wrapper.

use serde::{Deserialize, Serialize};

/// Payload of a signaling message, tagged by `kind` on the wire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SignalPayload {
    /// SDP offer initiating negotiation
    Offer {
        /// SDP offer text
        sdp: String,
    },

    /// SDP answer completing the handshake
    Answer {
        /// SDP answer text
        sdp: String,
    },

    /// ICE candidate for an in-progress negotiation
    IceCandidate {
        /// Candidate string
        candidate: String,

        /// SDP media stream identification tag
        #[serde(skip_serializing_if = "Option::is_none")]
        sdp_mid: Option<String>,

        /// SDP media line index
        #[serde(skip_serializing_if = "Option::is_none")]
        sdp_m_line_index: Option<u16>,
    },

    /// Presence: a participant entered the room
    UserJoined,

    /// Presence: a participant left the room
    UserLeft,
}

/// An addressed signaling message
///
/// `to: None` means broadcast to the whole room; filtering addressed
/// messages is the receiver's responsibility.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalingMessage {
    /// Room the message belongs to
    pub room: String,

    /// Sender identity
    pub from: String,

    /// Recipient identity; absent for broadcast
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,

    /// Message payload
    #[serde(flatten)]
    pub payload: SignalPayload,
}

impl SignalingMessage {
    /// Addressed SDP offer
    pub fn offer(room: &str, from: &str, to: &str, sdp: String) -> Self {
        Self {
            room: room.to_string(),
            from: from.to_string(),
            to: Some(to.to_string()),
            payload: SignalPayload::Offer { sdp },
        }
    }

    /// Addressed SDP answer
    pub fn answer(room: &str, from: &str, to: &str, sdp: String) -> Self {
        Self {
            room: room.to_string(),
            from: from.to_string(),
            to: Some(to.to_string()),
            payload: SignalPayload::Answer { sdp },
        }
    }

    /// Addressed ICE candidate
    pub fn ice_candidate(room: &str, from: &str, to: &str, candidate: String) -> Self {
        Self {
            room: room.to_string(),
            from: from.to_string(),
            to: Some(to.to_string()),
            payload: SignalPayload::IceCandidate {
                candidate,
                sdp_mid: None,
                sdp_m_line_index: None,
            },
        }
    }

    /// Broadcast presence announcement
    pub fn user_joined(room: &str, from: &str) -> Self {
        Self {
            room: room.to_string(),
            from: from.to_string(),
            to: None,
            payload: SignalPayload::UserJoined,
        }
    }

    /// Broadcast departure announcement
    pub fn user_left(room: &str, from: &str) -> Self {
        Self {
            room: room.to_string(),
            from: from.to_string(),
            to: None,
            payload: SignalPayload::UserLeft,
        }
    }

    /// Wire name of the payload kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self.payload {
            SignalPayload::Offer { .. } => "offer",
            SignalPayload::Answer { .. } => "answer",
            SignalPayload::IceCandidate { .. } => "ice-candidate",
            SignalPayload::UserJoined => "user-joined",
            SignalPayload::UserLeft => "user-left",
        }
    }

    /// Convert message to JSON string
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::Error::Serialization(format!("Failed to serialize signaling message: {}", e))
        })
    }

    /// Parse message from JSON string
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            crate::Error::Serialization(format!("Failed to deserialize signaling message: {}", e))
        })
    }
}
