//! Pull-style capture interface consumed by the session core
//!
//! The core never blocks on the device: each tick asks how many frames are
//! ready and reads at most that many.

use std::collections::VecDeque;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::debug;

use super::backend::AudioFrame;
use super::frame::{frames_from_interleaved, Frame};
use crate::error::DeviceError;

/// Frames discarded per read while flushing
const FLUSH_CHUNK: usize = 1024;

pub trait CaptureDevice {
    /// Frames ready to read without blocking
    fn available(&mut self) -> Result<usize, DeviceError>;

    /// Read up to `out.len()` frames; returns the count read
    fn read(&mut self, out: &mut [Frame]) -> Result<usize, DeviceError>;

    /// Discard everything buffered so far, so the next take starts clean.
    /// Returns the number of frames dropped.
    fn flush(&mut self) -> Result<usize, DeviceError> {
        let mut scratch = [Frame::SILENT; FLUSH_CHUNK];
        let mut dropped = 0;
        loop {
            let avail = self.available()?;
            if avail == 0 {
                return Ok(dropped);
            }
            let n = self.read(&mut scratch[..avail.min(FLUSH_CHUNK)])?;
            if n == 0 {
                return Ok(dropped);
            }
            dropped += n;
        }
    }
}

/// Adapts a backend's frame channel to `CaptureDevice`.
///
/// Packets are converted to stereo frames as they arrive and queued until
/// the core reads them.
pub struct ChannelCapture {
    rx: mpsc::Receiver<AudioFrame>,
    pending: VecDeque<Frame>,
    scratch: Vec<Frame>,
    closed: bool,
}

impl ChannelCapture {
    pub fn new(rx: mpsc::Receiver<AudioFrame>) -> Self {
        Self {
            rx,
            pending: VecDeque::new(),
            scratch: Vec::new(),
            closed: false,
        }
    }

    /// The backend has hung up
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn pump(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(packet) => {
                    self.scratch.clear();
                    frames_from_interleaved(&packet.samples, packet.channels, &mut self.scratch);
                    self.pending.extend(self.scratch.iter().copied());
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.closed {
                        debug!("Capture channel closed");
                    }
                    self.closed = true;
                    break;
                }
            }
        }
    }
}

impl CaptureDevice for ChannelCapture {
    fn available(&mut self) -> Result<usize, DeviceError> {
        self.pump();
        if self.pending.is_empty() && self.closed {
            return Err(DeviceError::Disconnected);
        }
        Ok(self.pending.len())
    }

    fn read(&mut self, out: &mut [Frame]) -> Result<usize, DeviceError> {
        let n = out.len().min(self.pending.len());
        for (slot, frame) in out.iter_mut().zip(self.pending.drain(..n)) {
            *slot = frame;
        }
        Ok(n)
    }

    fn flush(&mut self) -> Result<usize, DeviceError> {
        self.pump();
        let dropped = self.pending.len();
        self.pending.clear();
        Ok(dropped)
    }
}
