//! Recording session management
//!
//! This module provides the `RecordingSession` state machine and the
//! processing it drives:
//! - Room-noise calibration and the noise floor derived from it
//! - Segment capture, silence trimming and persistence
//! - Undo of the last segment and session reopen
//! - Combining all segments into one finished file

pub mod assembler;
mod command;
mod config;
pub mod noise;
mod session;
mod status;
pub mod trim;

pub use assembler::CombineReport;
pub use command::Command;
pub use config::{SessionConfig, ROOM_NOISE_FILE};
pub use session::{Outcome, RecordingSession, ROOM_NOISE_SECS};
pub use status::{waveform_overview, SessionState, SessionStatus, WaveformColumn};
pub use trim::TrimMarkers;
