use serde::{Deserialize, Serialize};

use crate::audio::Frame;

/// Guard margin: 100 ms of audio kept on each side of the detected speech
/// (4800 frames at 48 kHz)
pub fn guard_frames(sample_rate: u32) -> usize {
    (sample_rate / 10) as usize
}

/// Inclusive range of a take to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimMarkers {
    pub first: usize,
    pub last: usize,
}

impl TrimMarkers {
    /// Frames between the markers, both ends included
    pub fn frame_count(&self) -> usize {
        self.last - self.first + 1
    }

    pub fn slice<'a>(&self, frames: &'a [Frame]) -> &'a [Frame] {
        &frames[self.first..=self.last]
    }
}

/// Find the first and last frame louder than `noise_floor` on either
/// channel, then widen by `guard` frames, clamped to the take.
///
/// A take that never rises above the floor collapses to a single point
/// widened by the guard. Returns `None` only for an empty take.
pub fn trim(frames: &[Frame], noise_floor: u32, guard: usize) -> Option<TrimMarkers> {
    if frames.is_empty() {
        return None;
    }

    let mut first = 0;
    let mut last = frames.len() - 1;

    while first < last && frames[first].is_quiet(noise_floor) {
        first += 1;
    }
    while last > first && frames[last].is_quiet(noise_floor) {
        last -= 1;
    }

    Some(TrimMarkers {
        first: first.saturating_sub(guard),
        last: (last + guard).min(frames.len() - 1),
    })
}
