use serde::{Deserialize, Serialize};

use super::trim::TrimMarkers;
use crate::audio::Frame;

/// Where the session state machine is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Waiting for a command, calibrated
    Idle,
    /// Waiting for a command, no noise floor yet (segments are refused)
    ArmedNoCalibration,
    /// Capturing the room-noise calibration take
    RecordingNoise,
    /// Capturing a content segment
    RecordingSegment,
}

/// Snapshot of everything a renderer draws
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Session name
    pub name: String,

    /// Current state
    pub state: SessionState,

    /// Whether a take is being captured
    pub recording: bool,

    /// Segments saved so far
    pub segment_count: u32,

    /// Silence threshold (0 = uncalibrated)
    pub noise_floor: u32,

    /// Frames in the take buffer
    pub buffered_frames: usize,

    /// Markers of the last trimmed take
    pub trim: Option<TrimMarkers>,

    /// Short message for the user ("No room noise recorded!", ...)
    pub notice: Option<String>,
}

/// One pixel column of a waveform overview
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveformColumn {
    /// Lowest sample on either channel (0 if none below zero)
    pub min: i32,
    /// Highest sample on either channel (0 if none above zero)
    pub max: i32,
    /// Mean of the positive samples
    pub mean_up: i32,
    /// Mean of the negative samples
    pub mean_down: i32,
}

/// Reduce `frames` to at most `columns` columns for drawing.
///
/// Each column covers `ceil(len / columns)` consecutive frames, so every
/// frame lands in some column; the last column may be shorter and a short
/// take produces fewer columns.
pub fn waveform_overview(frames: &[Frame], columns: usize) -> Vec<WaveformColumn> {
    if frames.is_empty() || columns == 0 {
        return Vec::new();
    }

    let per_column = frames.len().div_ceil(columns);
    frames
        .chunks(per_column)
        .map(|chunk| {
            let mut col = WaveformColumn::default();
            let (mut up_sum, mut up_n, mut down_sum, mut down_n) = (0i64, 0i64, 0i64, 0i64);

            for sample in chunk.iter().flat_map(|f| [f.left, f.right]) {
                let s = i32::from(sample);
                col.max = col.max.max(s);
                col.min = col.min.min(s);
                if s > 0 {
                    up_sum += i64::from(s);
                    up_n += 1;
                } else if s < 0 {
                    down_sum += i64::from(s);
                    down_n += 1;
                }
            }

            if up_n > 0 {
                col.mean_up = (up_sum / up_n) as i32;
            }
            if down_n > 0 {
                col.mean_down = (down_sum / down_n) as i32;
            }
            col
        })
        .collect()
}
