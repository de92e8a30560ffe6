//! Configuration types for room audio sessions

use serde::{Deserialize, Serialize};

/// Default capture sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Reduced sample rate for resource-constrained devices
pub const LOW_BANDWIDTH_SAMPLE_RATE: u32 = 16_000;

/// Audio capture constraints
///
/// Mirrors the options the capture device recognizes. Unrecognized
/// platform options are a capture-source concern, not part of this
/// contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConstraints {
    /// Enable acoustic echo cancellation (default: true)
    pub echo_cancellation: bool,

    /// Enable noise suppression (default: true)
    pub noise_suppression: bool,

    /// Enable automatic gain control (default: true)
    pub auto_gain_control: bool,

    /// Capture sample rate in Hz (default: 48000)
    pub sample_rate: u32,

    /// Number of capture channels (default: 1, mono)
    pub channel_count: u8,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            sample_rate: DEFAULT_SAMPLE_RATE,
            channel_count: 1,
        }
    }
}

impl AudioConstraints {
    /// Constraints tuned for constrained/mobile devices: lower sample
    /// rate to reduce bandwidth and CPU, otherwise defaults.
    pub fn low_bandwidth() -> Self {
        Self {
            sample_rate: LOW_BANDWIDTH_SAMPLE_RATE,
            ..Self::default()
        }
    }
}

/// Configuration for a session coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Audio capture constraints used on join
    pub audio: AudioConstraints,

    /// Capacity of the event bus buffer (default: 64)
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            audio: AudioConstraints::default(),
            event_buffer: 64,
        }
    }
}

impl SessionConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `audio.sample_rate` is not in range 8000-48000
    /// - `audio.channel_count` is not 1 or 2
    /// - `event_buffer` is zero
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.audio.sample_rate < 8_000 || self.audio.sample_rate > 48_000 {
            return Err(Error::InvalidConfig(format!(
                "sample_rate must be in range 8000-48000, got {}",
                self.audio.sample_rate
            )));
        }

        if self.audio.channel_count == 0 || self.audio.channel_count > 2 {
            return Err(Error::InvalidConfig(format!(
                "channel_count must be 1 or 2, got {}",
                self.audio.channel_count
            )));
        }

        if self.event_buffer == 0 {
            return Err(Error::InvalidConfig(
                "event_buffer must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_constraints() {
        let constraints = AudioConstraints::default();
        assert!(constraints.echo_cancellation);
        assert!(constraints.noise_suppression);
        assert!(constraints.auto_gain_control);
        assert_eq!(constraints.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(constraints.channel_count, 1);
    }

    #[test]
    fn test_low_bandwidth_constraints() {
        let constraints = AudioConstraints::low_bandwidth();
        assert_eq!(constraints.sample_rate, LOW_BANDWIDTH_SAMPLE_RATE);
        assert_eq!(constraints.channel_count, 1);
    }

    #[test]
    fn test_invalid_sample_rate_fails() {
        let mut config = SessionConfig::default();
        config.audio.sample_rate = 4_000;
        assert!(config.validate().is_err());

        config.audio.sample_rate = 96_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_channel_count_fails() {
        let mut config = SessionConfig::default();
        config.audio.channel_count = 0;
        assert!(config.validate().is_err());

        config.audio.channel_count = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_event_buffer_fails() {
        let mut config = SessionConfig::default();
        config.event_buffer = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = SessionConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.audio, deserialized.audio);
        assert_eq!(config.event_buffer, deserialized.event_buffer);
    }
}
