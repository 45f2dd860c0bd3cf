use tokio::sync::mpsc;

use super::frame::{CHANNELS, SAMPLE_RATE};
use crate::error::{ConfigWarning, DeviceError};

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Number of whole sample frames in this packet
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

/// Hardware parameters requested from the device
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Device name ("default" picks the host default)
    pub device: String,
    /// Requested sample rate
    pub sample_rate: u32,
    /// Requested channel count
    pub channels: u16,
    /// Frames per period
    pub period_size: u32,
    /// Periods in the device buffer
    pub num_periods: u32,
}

impl AudioBackendConfig {
    pub fn buffer_size(&self) -> u32 {
        self.period_size * self.num_periods
    }

    /// Everything granted exactly as requested
    pub fn exact(&self) -> NegotiatedParams {
        NegotiatedParams {
            sample_rate: Negotiated::exact(self.sample_rate),
            channels: Negotiated::exact(u32::from(self.channels)),
            period_size: Negotiated::exact(self.period_size),
            buffer_size: Negotiated::exact(self.buffer_size()),
        }
    }
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            device: "default".to_string(),
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            period_size: 1024,
            num_periods: 2,
        }
    }
}

/// One hardware parameter: what was asked for and what the device gave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated<T> {
    pub requested: T,
    pub granted: T,
}

impl<T: Copy + PartialEq> Negotiated<T> {
    pub fn new(requested: T, granted: T) -> Self {
        Self { requested, granted }
    }

    pub fn exact(value: T) -> Self {
        Self::new(value, value)
    }

    pub fn is_exact(&self) -> bool {
        self.requested == self.granted
    }
}

/// Result of opening a capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedParams {
    pub sample_rate: Negotiated<u32>,
    pub channels: Negotiated<u32>,
    pub period_size: Negotiated<u32>,
    pub buffer_size: Negotiated<u32>,
}

impl NegotiatedParams {
    /// One warning per parameter the device did not honor
    pub fn warnings(&self) -> Vec<ConfigWarning> {
        [
            ("sample rate", self.sample_rate),
            ("channel count", self.channels),
            ("period size", self.period_size),
            ("buffer size", self.buffer_size),
        ]
        .into_iter()
        .filter(|(_, n)| !n.is_exact())
        .map(|(parameter, n)| ConfigWarning {
            parameter,
            requested: n.requested,
            granted: n.granted,
        })
        .collect()
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: cpal input stream (feature `microphone`)
/// - File: replay a WAV file in real time
#[async_trait::async_trait]
pub trait AudioBackend: Send {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, DeviceError>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<(), DeviceError>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;

    /// Parameters agreed with the device (valid after `start`)
    fn negotiated(&self) -> NegotiatedParams;
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create audio backend for the given source
    pub fn create(
        source: AudioSource,
        config: AudioBackendConfig,
    ) -> Result<Box<dyn AudioBackend>, DeviceError> {
        match source {
            AudioSource::Microphone => {
                #[cfg(feature = "microphone")]
                {
                    use super::microphone::MicrophoneBackend;
                    Ok(Box::new(MicrophoneBackend::new(config)?))
                }

                #[cfg(not(feature = "microphone"))]
                {
                    let _ = config;
                    Err(DeviceError::Unavailable(
                        "built without the `microphone` feature".to_string(),
                    ))
                }
            }

            AudioSource::File(path) => {
                use super::file::FileBackend;
                Ok(Box::new(FileBackend::open(path, config)?))
            }
        }
    }
}

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Hardware input
    Microphone,
    /// Replay a WAV file as if it were the device
    File(String),
}
