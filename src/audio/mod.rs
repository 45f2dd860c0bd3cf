pub mod backend;
pub mod buffer;
pub mod capture;
pub mod file;
pub mod frame;
pub mod wav;

#[cfg(feature = "microphone")]
pub mod microphone;

pub use backend::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource, Negotiated,
    NegotiatedParams,
};
pub use buffer::SampleBuffer;
pub use capture::{CaptureDevice, ChannelCapture};
pub use file::{AudioFile, FileBackend};
pub use frame::Frame;
