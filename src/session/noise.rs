use crate::audio::Frame;

/// Noise floor of a calibration take: the loudest sample on either
/// channel plus ~11% headroom (`max * 10 / 9`, truncating).
///
/// Zero in, zero out: an all-silent take leaves the session uncalibrated.
pub fn estimate(frames: &[Frame]) -> u32 {
    let max = frames.iter().map(Frame::peak).max().unwrap_or(0);
    max * 10 / 9
}
