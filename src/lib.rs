pub mod audio;
pub mod config;
pub mod error;
pub mod session;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioSource,
    CaptureDevice, ChannelCapture, Frame, SampleBuffer,
};
pub use config::Config;
pub use error::{ConfigWarning, DeviceError, RecorderError};
pub use session::{
    Command, Outcome, RecordingSession, SessionConfig, SessionState, SessionStatus, TrimMarkers,
};
