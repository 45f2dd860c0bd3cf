use super::frame::{frames_for_secs, Frame};

/// Longest take a buffer holds
pub const MAX_TAKE_SECS: u32 = 60;

/// Fixed-capacity store for the take in progress.
///
/// Storage is allocated once and reused for every take; `reset` only
/// rewinds the length. Frames past capacity are dropped silently so a
/// capture tick never fails on overflow.
pub struct SampleBuffer {
    frames: Vec<Frame>,
    len: usize,
}

impl SampleBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: vec![Frame::SILENT; capacity],
            len: 0,
        }
    }

    /// Buffer holding `MAX_TAKE_SECS` at `sample_rate`
    pub fn for_sample_rate(sample_rate: u32) -> Self {
        Self::with_capacity(frames_for_secs(sample_rate, MAX_TAKE_SECS))
    }

    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    pub fn remaining(&self) -> usize {
        self.capacity() - self.len
    }

    /// Start a new take. Memory is not zeroed.
    pub fn reset(&mut self) {
        self.len = 0;
    }

    /// Copy in as many of `frames` as fit; returns the count appended
    pub fn append(&mut self, frames: &[Frame]) -> usize {
        let n = frames.len().min(self.remaining());
        self.frames[self.len..self.len + n].copy_from_slice(&frames[..n]);
        self.len += n;
        n
    }

    /// Let `fill` write directly into the unused tail, up to a total
    /// length of `limit` (clamped to capacity).
    ///
    /// `fill` returns how many frames it wrote; that many are kept.
    pub fn fill_with<E>(
        &mut self,
        limit: usize,
        fill: impl FnOnce(&mut [Frame]) -> Result<usize, E>,
    ) -> Result<usize, E> {
        let end = limit.min(self.capacity());
        if end <= self.len {
            return Ok(0);
        }
        let spare = &mut self.frames[self.len..end];
        let written = fill(spare)?.min(end - self.len);
        self.len += written;
        Ok(written)
    }

    /// The frames of the current take
    pub fn frames(&self) -> &[Frame] {
        &self.frames[..self.len]
    }
}
