//! Error types for the recorder core

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for the recorder
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Audio device error: {0}")]
    Device(#[from] DeviceError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid WAV file {}: {reason}", path.display())]
    InvalidWav { path: PathBuf, reason: String },

    /// User-actionable: a room-noise take is required first
    #[error("No room noise recorded!")]
    NoRoomNoise,

    #[error("Room noise too short: {frames} frames, need more than {required}")]
    RoomNoiseTooShort { frames: usize, required: usize },

    /// The data would not fit the 32-bit WAV size fields
    #[error("{} too long: {frames} frames exceed the WAV size limit", path.display())]
    TooLong { path: PathBuf, frames: usize },
}

impl RecorderError {
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn too_long(path: impl AsRef<Path>, frames: usize) -> Self {
        Self::TooLong {
            path: path.as_ref().to_path_buf(),
            frames,
        }
    }

    pub fn invalid_wav(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::InvalidWav {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Errors the display layer should show to the user verbatim
    pub fn is_user_actionable(&self) -> bool {
        matches!(self, Self::NoRoomNoise | Self::RoomNoiseTooShort { .. })
    }
}

/// Capture device errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("No audio input device available: {0}")]
    Unavailable(String),

    #[error("Failed to configure device: {0}")]
    Config(String),

    #[error("Capture stream disconnected")]
    Disconnected,

    #[error("Capture stream error: {0}")]
    Stream(String),
}

/// A hardware parameter the device did not grant exactly.
///
/// Never fatal: capture continues with the granted value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub parameter: &'static str,
    pub requested: u32,
    pub granted: u32,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} does not match (requested {}, got {})",
            self.parameter, self.requested, self.granted
        )
    }
}

pub type Result<T> = std::result::Result<T, RecorderError>;
