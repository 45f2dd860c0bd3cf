use chrono::Local;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::audio::frame::SAMPLE_RATE;

/// Calibration take file name inside the session directory
pub const ROOM_NOISE_FILE: &str = "room-noise.wav";

/// Configuration for a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session name (e.g., "20251028-093000" or "chapter-01")
    pub name: String,

    /// Directory holding the room-noise and segment files
    pub dir: PathBuf,

    /// Capture rate in Hz; every duration is counted in frames at this rate
    pub sample_rate: u32,
}

impl SessionConfig {
    /// Session `name` stored under `root`
    pub fn new(root: impl AsRef<Path>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            dir: root.as_ref().join(&name),
            name,
            sample_rate: SAMPLE_RATE,
        }
    }

    /// Session named after the current local time
    pub fn timestamped(root: impl AsRef<Path>) -> Self {
        Self::new(root, Local::now().format("%Y%m%d-%H%M%S").to_string())
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn room_noise_path(&self) -> PathBuf {
        self.dir.join(ROOM_NOISE_FILE)
    }

    /// `segment-NNNN.wav`, 1-based and zero-padded to four digits
    pub fn segment_path(&self, index: u32) -> PathBuf {
        self.dir.join(format!("segment-{:04}.wav", index))
    }

    /// Combined output: `<session-dir>.wav`, next to the directory
    pub fn output_path(&self) -> PathBuf {
        let mut path: OsString = self.dir.clone().into_os_string();
        path.push(".wav");
        PathBuf::from(path)
    }
}
