//! Capture source seam and the local media holder

use super::tracks::{AudioTrack, MediaStream, TrackSettings};
use crate::config::AudioConstraints;
use crate::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Source of local audio capture streams
///
/// Platform integrations implement this over the real microphone
/// stack; [`SyntheticCapture`] stands in where no platform audio is
/// available (headless servers, tests, demos).
#[async_trait]
pub trait CaptureSource: Send + Sync {
    /// Request an audio-only capture stream honoring `constraints`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MediaAcquisition`] when the platform
    /// denies permission or no audio device exists.
    async fn acquire(&self, constraints: &AudioConstraints) -> Result<MediaStream>;
}

/// Capture source producing logical tracks without a platform audio
/// stack. Always grants.
#[derive(Debug, Default)]
pub struct SyntheticCapture;

impl SyntheticCapture {
    /// Create a new synthetic capture source
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CaptureSource for SyntheticCapture {
    async fn acquire(&self, constraints: &AudioConstraints) -> Result<MediaStream> {
        let settings = TrackSettings::from(constraints);
        let track = Arc::new(AudioTrack::new(settings));

        debug!(
            "Synthetic capture acquired: {} Hz, {} channel(s)",
            settings.sample_rate, settings.channel_count
        );

        Ok(MediaStream::new(vec![track]))
    }
}

/// Owner of the local capture stream for one room session
///
/// At most one stream is held at a time; mutation goes through
/// `set_muted` and `release` only.
#[derive(Debug)]
pub struct LocalMedia {
    /// Active capture stream, present between join and leave
    stream: RwLock<Option<Arc<MediaStream>>>,

    /// Current mute state
    muted: AtomicBool,
}

impl LocalMedia {
    /// Create an empty holder (no stream, unmuted)
    pub fn new() -> Self {
        Self {
            stream: RwLock::new(None),
            muted: AtomicBool::new(false),
        }
    }

    /// Acquire a stream from `source` and take ownership of it.
    ///
    /// Any previously held stream is released first.
    pub async fn acquire(
        &self,
        source: &dyn CaptureSource,
        constraints: &AudioConstraints,
    ) -> Result<Arc<MediaStream>> {
        let stream = Arc::new(source.acquire(constraints).await?);

        let mut held = self.stream.write().await;
        if let Some(old) = held.take() {
            old.stop();
        }
        *held = Some(stream.clone());
        self.muted.store(false, Ordering::Release);

        info!("Local media acquired: stream {}", stream.id());

        Ok(stream)
    }

    /// Currently held stream, if any
    pub async fn stream(&self) -> Option<Arc<MediaStream>> {
        self.stream.read().await.clone()
    }

    /// Current mute state
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Acquire)
    }

    /// Enable/disable outbound audio without renegotiating.
    ///
    /// Returns `true` when the state actually changed. Idempotent.
    pub async fn set_muted(&self, muted: bool) -> bool {
        if self.muted.swap(muted, Ordering::AcqRel) == muted {
            return false;
        }

        if let Some(stream) = self.stream.read().await.as_ref() {
            stream.set_enabled(!muted);
        }

        debug!("Local mute set to {}", muted);
        true
    }

    /// Stop all tracks and free the stream. Idempotent; safe to call
    /// when no stream is held.
    pub async fn release(&self) {
        let mut held = self.stream.write().await;
        if let Some(stream) = held.take() {
            stream.stop();
            info!("Local media released: stream {}", stream.id());
        }
        self.muted.store(false, Ordering::Release);
    }
}

impl Default for LocalMedia {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    struct DeniedCapture;

    #[async_trait]
    impl CaptureSource for DeniedCapture {
        async fn acquire(&self, _constraints: &AudioConstraints) -> Result<MediaStream> {
            Err(Error::MediaAcquisition("permission denied".to_string()))
        }
    }

    #[tokio::test]
    async fn test_synthetic_capture_honors_constraints() {
        let source = SyntheticCapture::new();
        let stream = source
            .acquire(&AudioConstraints::low_bandwidth())
            .await
            .unwrap();

        let tracks = stream.audio_tracks();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].settings().sample_rate, 16_000);
        assert!(tracks[0].is_enabled());
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let media = LocalMedia::new();
        let source = SyntheticCapture::new();

        let stream = media
            .acquire(&source, &AudioConstraints::default())
            .await
            .unwrap();
        assert!(media.stream().await.is_some());

        media.release().await;
        assert!(media.stream().await.is_none());
        assert!(stream.audio_tracks()[0].is_ended());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let media = LocalMedia::new();
        media.release().await;
        media.release().await;
        assert!(media.stream().await.is_none());
    }

    #[tokio::test]
    async fn test_set_muted_toggles_tracks() {
        let media = LocalMedia::new();
        let source = SyntheticCapture::new();
        let stream = media
            .acquire(&source, &AudioConstraints::default())
            .await
            .unwrap();

        assert!(media.set_muted(true).await);
        assert!(!stream.audio_tracks()[0].is_enabled());

        // Second call is a no-op
        assert!(!media.set_muted(true).await);

        assert!(media.set_muted(false).await);
        assert!(stream.audio_tracks()[0].is_enabled());
    }

    #[tokio::test]
    async fn test_denied_capture_propagates() {
        let media = LocalMedia::new();
        let result = media
            .acquire(&DeniedCapture, &AudioConstraints::default())
            .await;

        assert!(matches!(result, Err(Error::MediaAcquisition(_))));
        assert!(media.stream().await.is_none());
    }
}
