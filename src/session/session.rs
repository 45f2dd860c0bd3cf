use rand::Rng;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::assembler::{self, CombineReport};
use super::command::Command;
use super::config::SessionConfig;
use super::noise;
use super::status::{waveform_overview, SessionState, SessionStatus, WaveformColumn};
use super::trim::{self, TrimMarkers};
use crate::audio::capture::CaptureDevice;
use crate::audio::frame::frames_for_secs;
use crate::audio::wav;
use crate::audio::SampleBuffer;
use crate::error::{RecorderError, Result};

/// Length of the room-noise calibration take
pub const ROOM_NOISE_SECS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Take {
    RoomNoise,
    Segment,
}

/// What a command or tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing changed
    None,
    SegmentStarted(u32),
    RoomNoiseStarted,
    SegmentSaved {
        index: u32,
        path: PathBuf,
        trim: Option<TrimMarkers>,
    },
    RoomNoiseSaved {
        path: PathBuf,
        noise_floor: u32,
    },
    SegmentDeleted(u32),
    Combined(CombineReport),
    /// Command not valid in the current state; the state is unchanged
    Rejected {
        command: Command,
        reason: String,
    },
    Quit,
}

/// A recording session: one calibration take plus numbered segments.
///
/// All commands and capture ticks go through this type; it owns the take
/// buffer and is only ever driven from the control loop.
pub struct RecordingSession {
    config: SessionConfig,
    buffer: SampleBuffer,
    active: Option<Take>,
    noise_floor: u32,
    segment_count: u32,
    trim: Option<TrimMarkers>,
    notice: Option<String>,
}

impl RecordingSession {
    /// Create a fresh session (nothing is written until room noise is recorded)
    pub fn new(config: SessionConfig) -> Self {
        info!(
            "Creating recording session: {} ({})",
            config.name,
            config.dir.display()
        );

        Self {
            buffer: SampleBuffer::for_sample_rate(config.sample_rate),
            config,
            active: None,
            noise_floor: 0,
            segment_count: 0,
            trim: None,
            notice: None,
        }
    }

    /// Resume a session whose directory already holds `room-noise.wav`.
    ///
    /// The noise floor is recomputed from the stored take and the segment
    /// counter resumes at the highest contiguous `segment-NNNN.wav`.
    pub fn reopen(config: SessionConfig) -> Result<Self> {
        let mut session = Self::new(config);

        let room_noise = session.config.room_noise_path();
        if !room_noise.exists() {
            return Err(RecorderError::NoRoomNoise);
        }

        let mut frames = Vec::new();
        wav::read_frames(&room_noise, &mut frames)?;
        session.noise_floor = noise::estimate(&frames);

        let mut count = 0;
        while session.config.segment_path(count + 1).exists() {
            count += 1;
        }
        session.segment_count = count;

        info!(
            "Reopened session {}: {} segments, noise floor {}",
            session.config.name, session.segment_count, session.noise_floor
        );
        Ok(session)
    }

    /// Reopen if the directory holds a calibration take, otherwise start fresh
    pub fn open(config: SessionConfig) -> Result<Self> {
        if config.room_noise_path().exists() {
            Self::reopen(config)
        } else {
            Ok(Self::new(config))
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        match self.active {
            Some(Take::RoomNoise) => SessionState::RecordingNoise,
            Some(Take::Segment) => SessionState::RecordingSegment,
            None if self.noise_floor == 0 => SessionState::ArmedNoCalibration,
            None => SessionState::Idle,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn noise_floor(&self) -> u32 {
        self.noise_floor
    }

    pub fn segment_count(&self) -> u32 {
        self.segment_count
    }

    pub fn trim_markers(&self) -> Option<TrimMarkers> {
        self.trim
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            name: self.config.name.clone(),
            state: self.state(),
            recording: self.is_recording(),
            segment_count: self.segment_count,
            noise_floor: self.noise_floor,
            buffered_frames: self.buffer.len(),
            trim: self.trim,
            notice: self.notice.clone(),
        }
    }

    /// Waveform of the take in the buffer
    pub fn waveform(&self, columns: usize) -> Vec<WaveformColumn> {
        waveform_overview(self.buffer.frames(), columns)
    }

    fn room_noise_frames(&self) -> usize {
        frames_for_secs(self.config.sample_rate, ROOM_NOISE_SECS)
    }

    /// Dispatch one command from the input layer
    pub fn handle(
        &mut self,
        command: Command,
        device: &mut dyn CaptureDevice,
        rng: &mut impl Rng,
    ) -> Result<Outcome> {
        if command.requires_idle() && self.is_recording() {
            return Ok(self.reject(command, "recording in progress"));
        }

        match command {
            Command::StartSegment => self.start_segment(device),
            Command::StartNoiseCalibration => self.record_room_noise(device),
            Command::StopSegment => match self.active {
                Some(Take::Segment) => self.stop_recording(),
                _ => Ok(self.reject(command, "no segment is recording")),
            },
            Command::StopNoiseCalibration => match self.active {
                Some(Take::RoomNoise) => self.stop_recording(),
                _ => Ok(self.reject(command, "room noise is not recording")),
            },
            Command::DeleteLastSegment => self.undo_last_segment(),
            Command::Combine => self.combine(rng),
            Command::Quit => {
                self.shutdown()?;
                Ok(Outcome::Quit)
            }
        }
    }

    /// Arm and start a content take
    pub fn start_segment(&mut self, device: &mut dyn CaptureDevice) -> Result<Outcome> {
        if self.is_recording() {
            return Ok(self.reject(Command::StartSegment, "recording in progress"));
        }
        if self.noise_floor == 0 {
            let reason = RecorderError::NoRoomNoise.to_string();
            self.notice = Some(reason.clone());
            warn!("Refusing to record segment: {}", reason);
            return Ok(Outcome::Rejected {
                command: Command::StartSegment,
                reason,
            });
        }

        let dropped = device.flush()?;
        debug!("Flushed {} stale frames", dropped);

        self.buffer.reset();
        self.segment_count += 1;
        self.active = Some(Take::Segment);
        self.notice = Some(format!("Segment {}", self.segment_count));

        info!("Recording segment {}", self.segment_count);
        Ok(Outcome::SegmentStarted(self.segment_count))
    }

    /// Start the room-noise calibration take; the current floor is dropped
    pub fn record_room_noise(&mut self, device: &mut dyn CaptureDevice) -> Result<Outcome> {
        if self.is_recording() {
            return Ok(self.reject(Command::StartNoiseCalibration, "recording in progress"));
        }

        self.noise_floor = 0;
        self.buffer.reset();
        fs::create_dir_all(&self.config.dir)
            .map_err(|e| RecorderError::io(&self.config.dir, e))?;

        let dropped = device.flush()?;
        debug!("Flushed {} stale frames", dropped);

        self.active = Some(Take::RoomNoise);
        self.notice = Some("Recording Room Noise. Be Silent!".to_string());

        info!("Recording room noise for {}s", ROOM_NOISE_SECS);
        Ok(Outcome::RoomNoiseStarted)
    }

    /// Pull whatever the device has ready.
    ///
    /// While idle the device is drained and the audio dropped. A take stops
    /// itself when the buffer fills or room noise reaches its fixed length.
    pub fn tick(&mut self, device: &mut dyn CaptureDevice) -> Result<Outcome> {
        let Some(take) = self.active else {
            device.flush()?;
            return Ok(Outcome::None);
        };

        let limit = match take {
            Take::RoomNoise => self.room_noise_frames(),
            Take::Segment => self.buffer.capacity(),
        };

        let available = device.available()?;
        if available > 0 {
            let read = self.buffer.fill_with(limit, |spare| {
                let n = available.min(spare.len());
                device.read(&mut spare[..n])
            })?;
            if read > 0 {
                debug!("Captured {} frames ({} total)", read, self.buffer.len());
            }
        }

        if self.buffer.len() >= limit {
            info!("Take reached {} frames, stopping", self.buffer.len());
            return self.stop_recording();
        }

        Ok(Outcome::None)
    }

    /// Finish the running take and persist it.
    ///
    /// The session is back to idle with an empty buffer afterwards, even if
    /// writing the file failed.
    pub fn stop_recording(&mut self) -> Result<Outcome> {
        let Some(take) = self.active.take() else {
            return Ok(Outcome::None);
        };

        let result = match take {
            Take::RoomNoise => self.save_room_noise(),
            Take::Segment => self.save_segment(),
        };

        self.buffer.reset();
        if let Err(e) = &result {
            warn!("Failed to save take: {}", e);
            self.notice = Some(e.to_string());
            // The number goes back to the next take so segments stay 1..N
            if take == Take::Segment {
                self.segment_count -= 1;
            }
        }
        result
    }

    fn save_room_noise(&mut self) -> Result<Outcome> {
        let frames = self.buffer.frames();
        let noise_floor = noise::estimate(frames);
        let path = self.config.room_noise_path();

        wav::encode(&path, frames, self.config.sample_rate)?;
        self.noise_floor = noise_floor;
        self.trim = None;
        self.notice = None;

        info!(
            "Room noise saved: {} ({} frames, noise floor {})",
            path.display(),
            frames.len(),
            noise_floor
        );
        Ok(Outcome::RoomNoiseSaved { path, noise_floor })
    }

    fn save_segment(&mut self) -> Result<Outcome> {
        let index = self.segment_count;
        let path = self.config.segment_path(index);
        let frames = self.buffer.frames();
        let guard = trim::guard_frames(self.config.sample_rate);

        let markers = trim::trim(frames, self.noise_floor, guard);
        let kept = markers.map_or(&frames[..0], |m| m.slice(frames));

        wav::encode(&path, kept, self.config.sample_rate)?;
        self.trim = markers;
        self.notice = None;

        info!(
            "Segment {} saved: {} ({} of {} frames kept)",
            index,
            path.display(),
            kept.len(),
            frames.len()
        );
        Ok(Outcome::SegmentSaved {
            index,
            path,
            trim: markers,
        })
    }

    /// Delete the newest segment file. A missing file counts as deleted.
    pub fn undo_last_segment(&mut self) -> Result<Outcome> {
        if self.is_recording() {
            return Ok(self.reject(Command::DeleteLastSegment, "recording in progress"));
        }
        if self.segment_count == 0 {
            return Ok(self.reject(Command::DeleteLastSegment, "no segments to delete"));
        }

        let index = self.segment_count;
        let path = self.config.segment_path(index);
        match fs::remove_file(&path) {
            Ok(()) => info!("Deleted segment {}: {}", index, path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Segment {} already absent: {}", index, path.display())
            }
            Err(e) => return Err(RecorderError::io(&path, e)),
        }

        self.segment_count -= 1;
        self.notice = None;
        Ok(Outcome::SegmentDeleted(index))
    }

    /// Join room noise and every segment into `<session-dir>.wav`
    pub fn combine(&mut self, rng: &mut impl Rng) -> Result<Outcome> {
        if self.is_recording() {
            return Ok(self.reject(Command::Combine, "recording in progress"));
        }

        self.notice = Some("Combining session...".to_string());
        match assembler::combine(&self.config, self.segment_count, rng) {
            Ok(report) => {
                self.notice = Some("Combining complete.".to_string());
                Ok(Outcome::Combined(report))
            }
            Err(e) => {
                self.notice = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Stop any running take so nothing captured is lost before exit
    pub fn shutdown(&mut self) -> Result<()> {
        if self.is_recording() {
            info!("Stopping take before exit");
            self.stop_recording()?;
        }
        Ok(())
    }

    fn reject(&self, command: Command, reason: &str) -> Outcome {
        warn!("Ignoring {:?}: {}", command, reason);
        Outcome::Rejected {
            command,
            reason: reason.to_string(),
        }
    }
}
