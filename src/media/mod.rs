//! Local media acquisition and stream/track handles
//!
//! Tracks here are logical handles: the core coordinates *which*
//! tracks exist and whether they are enabled, while actual capture and
//! playback belong to the platform layer behind [`CaptureSource`].

mod capture;
mod tracks;

pub use capture::{CaptureSource, LocalMedia, SyntheticCapture};
pub use tracks::{AudioTrack, MediaStream, TrackSettings};
