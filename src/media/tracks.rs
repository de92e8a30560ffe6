//! Audio stream and track handles

use crate::config::AudioConstraints;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Capture settings a track was opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackSettings {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channel_count: u8,
    /// Echo cancellation enabled
    pub echo_cancellation: bool,
    /// Noise suppression enabled
    pub noise_suppression: bool,
    /// Automatic gain control enabled
    pub auto_gain_control: bool,
}

impl From<&AudioConstraints> for TrackSettings {
    fn from(constraints: &AudioConstraints) -> Self {
        Self {
            sample_rate: constraints.sample_rate,
            channel_count: constraints.channel_count,
            echo_cancellation: constraints.echo_cancellation,
            noise_suppression: constraints.noise_suppression,
            auto_gain_control: constraints.auto_gain_control,
        }
    }
}

/// A single audio track
///
/// `enabled` gates whether the track contributes outbound audio;
/// toggling it never touches negotiation. `ended` is one-way: a
/// stopped track cannot be restarted.
#[derive(Debug)]
pub struct AudioTrack {
    /// Unique track identifier
    id: String,

    /// Whether the track is producing audio
    enabled: AtomicBool,

    /// Whether the track has been stopped
    ended: AtomicBool,

    /// Settings the track was opened with
    settings: TrackSettings,
}

impl AudioTrack {
    /// Create a new enabled track with the given settings
    pub fn new(settings: TrackSettings) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            enabled: AtomicBool::new(true),
            ended: AtomicBool::new(false),
            settings,
        }
    }

    /// Get the track ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the settings the track was opened with
    pub fn settings(&self) -> TrackSettings {
        self.settings
    }

    /// Whether the track is currently enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Enable or disable the track. Idempotent.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Stop the track permanently. Idempotent.
    pub fn stop(&self) {
        if !self.ended.swap(true, Ordering::AcqRel) {
            debug!("Stopped audio track {}", self.id);
        }
    }

    /// Whether the track has been stopped
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }
}

/// A group of audio tracks moving together
///
/// Local streams come from a [`super::CaptureSource`]; remote streams
/// are attached to a peer record once its negotiation completes.
#[derive(Debug)]
pub struct MediaStream {
    /// Unique stream identifier
    id: String,

    /// Tracks carried by this stream
    tracks: Vec<Arc<AudioTrack>>,
}

impl MediaStream {
    /// Create a new stream over the given tracks
    pub fn new(tracks: Vec<Arc<AudioTrack>>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tracks,
        }
    }

    /// Get the stream ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Audio tracks carried by this stream
    pub fn audio_tracks(&self) -> &[Arc<AudioTrack>] {
        &self.tracks
    }

    /// Enable or disable every track on the stream
    pub fn set_enabled(&self, enabled: bool) {
        for track in &self.tracks {
            track.set_enabled(enabled);
        }
    }

    /// Stop every track on the stream. Idempotent.
    pub fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}
