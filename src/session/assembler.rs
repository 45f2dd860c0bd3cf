//! Joins a session into one file:
//! 2 s of room noise, then each segment followed by 1 s of room noise.
//!
//! The filler is sliced from the calibration take at a random offset each
//! time, so joins sound like the room rather than digital silence and the
//! noise never repeats audibly.

use rand::Rng;
use std::path::PathBuf;
use tracing::{debug, info};

use super::config::SessionConfig;
use crate::audio::frame::frames_for_secs;
use crate::audio::wav::{self, WavStreamWriter};
use crate::audio::Frame;
use crate::error::{RecorderError, Result};

/// Room noise before the first segment
pub const LEAD_IN_SECS: u32 = 2;

/// Room noise after every segment
pub const GAP_SECS: u32 = 1;

/// What `combine` wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombineReport {
    pub path: PathBuf,
    /// Frames in the output, filler included
    pub frames: usize,
    pub segments: u32,
}

/// Total frames `combine` produces for segments of the given lengths
pub fn expected_frames(sample_rate: u32, segment_lengths: &[usize]) -> usize {
    frames_for_secs(sample_rate, LEAD_IN_SECS)
        + segment_lengths
            .iter()
            .map(|len| len + frames_for_secs(sample_rate, GAP_SECS))
            .sum::<usize>()
}

/// Write `<session-dir>.wav` from the room noise and segments `1..=segment_count`
pub fn combine(
    config: &SessionConfig,
    segment_count: u32,
    rng: &mut impl Rng,
) -> Result<CombineReport> {
    let room_noise = config.room_noise_path();
    if !room_noise.exists() {
        return Err(RecorderError::NoRoomNoise);
    }

    let mut pool = Vec::new();
    wav::read_frames(&room_noise, &mut pool)?;

    let lead_in = frames_for_secs(config.sample_rate, LEAD_IN_SECS);
    let gap = frames_for_secs(config.sample_rate, GAP_SECS);
    let longest = lead_in.max(gap);
    if pool.len() <= longest {
        return Err(RecorderError::RoomNoiseTooShort {
            frames: pool.len(),
            required: longest,
        });
    }

    let output = config.output_path();
    info!(
        "Combining {} segments of session {} into {}",
        segment_count,
        config.name,
        output.display()
    );

    let mut writer = WavStreamWriter::create(&output, config.sample_rate)?;
    writer.write_frames(noise_slice(&pool, lead_in, rng))?;

    let mut segment = Vec::new();
    for index in 1..=segment_count {
        let path = config.segment_path(index);
        let header = wav::read_frames(&path, &mut segment)?;
        if header.sample_rate != config.sample_rate {
            debug!(
                "{} declares {}Hz, session runs at {}Hz",
                path.display(),
                header.sample_rate,
                config.sample_rate
            );
        }
        writer.write_frames(&segment)?;
        writer.write_frames(noise_slice(&pool, gap, rng))?;
    }

    let frames = writer.finish()?;
    info!(
        "Combining complete: {} ({:.1}s)",
        output.display(),
        frames as f64 / config.sample_rate as f64
    );

    Ok(CombineReport {
        path: output,
        frames,
        segments: segment_count,
    })
}

/// `len` contiguous frames of `pool` starting uniformly in `[0, pool.len() - len)`
fn noise_slice<'a>(pool: &'a [Frame], len: usize, rng: &mut impl Rng) -> &'a [Frame] {
    let start = rng.gen_range(0..pool.len() - len);
    &pool[start..start + len]
}
