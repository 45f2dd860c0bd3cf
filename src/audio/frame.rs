/// Default capture rate (Hz)
pub const SAMPLE_RATE: u32 = 48_000;

/// Channels in every stored file
pub const CHANNELS: u16 = 2;

/// Bytes per stored frame (two 16-bit samples)
pub const BYTES_PER_FRAME: usize = 4;

/// One stereo sample pair (16-bit PCM)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Frame {
    pub left: i16,
    pub right: i16,
}

impl Frame {
    pub const SILENT: Frame = Frame { left: 0, right: 0 };

    pub fn new(left: i16, right: i16) -> Self {
        Self { left, right }
    }

    /// Same sample on both channels
    pub fn mono(sample: i16) -> Self {
        Self {
            left: sample,
            right: sample,
        }
    }

    /// Largest absolute value of either channel
    ///
    /// `i16::MIN` maps to 32768, so the result is widened.
    pub fn peak(&self) -> u32 {
        u32::from(self.left.unsigned_abs()).max(u32::from(self.right.unsigned_abs()))
    }

    /// Both channels at or below `threshold`
    pub fn is_quiet(&self, threshold: u32) -> bool {
        self.peak() <= threshold
    }

    pub fn to_le_bytes(self) -> [u8; BYTES_PER_FRAME] {
        let l = self.left.to_le_bytes();
        let r = self.right.to_le_bytes();
        [l[0], l[1], r[0], r[1]]
    }

    pub fn from_le_bytes(bytes: [u8; BYTES_PER_FRAME]) -> Self {
        Self {
            left: i16::from_le_bytes([bytes[0], bytes[1]]),
            right: i16::from_le_bytes([bytes[2], bytes[3]]),
        }
    }
}

/// Frame count for a whole number of seconds at `sample_rate`
pub fn frames_for_secs(sample_rate: u32, secs: u32) -> usize {
    sample_rate as usize * secs as usize
}

/// Convert interleaved samples with `channels` channels to stereo frames.
///
/// Mono is duplicated to both sides; anything wider keeps the first two
/// channels. A trailing partial frame is dropped.
pub fn frames_from_interleaved(samples: &[i16], channels: u16, out: &mut Vec<Frame>) {
    match channels {
        0 => {}
        1 => out.extend(samples.iter().map(|&s| Frame::mono(s))),
        n => out.extend(
            samples
                .chunks_exact(n as usize)
                .map(|chunk| Frame::new(chunk[0], chunk[1])),
        ),
    }
}
