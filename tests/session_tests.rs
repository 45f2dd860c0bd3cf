// Integration tests for the recording session state machine
//
// A scripted capture device stands in for the microphone so each tick
// delivers a known number of frames.

use abook_recorder::audio::wav;
use abook_recorder::error::DeviceError;
use abook_recorder::session::ROOM_NOISE_SECS;
use abook_recorder::{
    CaptureDevice, Command, Frame, Outcome, RecorderError, RecordingSession, SessionConfig,
    SessionState, TrimMarkers,
};
use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::fs;
use tempfile::TempDir;

const ROOM_NOISE_FRAMES: usize = 48_000 * ROOM_NOISE_SECS as usize;

/// Hands out queued frames, at most `per_tick` per `available` call
struct ScriptedDevice {
    pending: VecDeque<Frame>,
    per_tick: usize,
}

impl ScriptedDevice {
    fn new(per_tick: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            per_tick,
        }
    }

    fn push(&mut self, frames: &[Frame]) {
        self.pending.extend(frames.iter().copied());
    }
}

impl CaptureDevice for ScriptedDevice {
    fn available(&mut self) -> Result<usize, DeviceError> {
        Ok(self.pending.len().min(self.per_tick))
    }

    fn read(&mut self, out: &mut [Frame]) -> Result<usize, DeviceError> {
        let n = out.len().min(self.pending.len());
        for (slot, frame) in out.iter_mut().zip(self.pending.drain(..n)) {
            *slot = frame;
        }
        Ok(n)
    }

    fn flush(&mut self) -> Result<usize, DeviceError> {
        let n = self.pending.len();
        self.pending.clear();
        Ok(n)
    }
}

fn rng() -> StdRng {
    StdRng::seed_from_u64(7)
}

/// Tick until the session goes idle or the device runs dry
fn drain(session: &mut RecordingSession, device: &mut ScriptedDevice) -> Result<Vec<Outcome>> {
    let mut outcomes = Vec::new();
    while session.is_recording() && !device.pending.is_empty() {
        let outcome = session.tick(device)?;
        if outcome != Outcome::None {
            outcomes.push(outcome);
        }
    }
    Ok(outcomes)
}

/// Record a full calibration take with the given constant amplitude
fn calibrate(
    session: &mut RecordingSession,
    device: &mut ScriptedDevice,
    amplitude: i16,
) -> Result<Vec<Outcome>> {
    session.handle(Command::StartNoiseCalibration, device, &mut rng())?;
    device.push(&vec![Frame::new(amplitude, -amplitude); ROOM_NOISE_FRAMES]);
    drain(session, device)
}

fn speech_take() -> Vec<Frame> {
    let mut frames = vec![Frame::new(50, -50); 48_000];
    for frame in &mut frames[10_000..=20_000] {
        *frame = Frame::new(5_000, -5_000);
    }
    frames
}

fn record_segment(
    session: &mut RecordingSession,
    device: &mut ScriptedDevice,
    frames: &[Frame],
) -> Result<Outcome> {
    session.handle(Command::StartSegment, device, &mut rng())?;
    device.push(frames);
    drain(session, device)?;
    Ok(session.handle(Command::StopSegment, device, &mut rng())?)
}

#[test]
fn test_new_session_is_uncalibrated() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let session = RecordingSession::new(SessionConfig::new(temp_dir.path(), "book"));

    assert_eq!(session.state(), SessionState::ArmedNoCalibration);
    assert_eq!(session.noise_floor(), 0);
    assert_eq!(session.segment_count(), 0);
    assert!(!session.config().dir.exists(), "Nothing is written up front");

    Ok(())
}

#[test]
fn test_segment_refused_without_room_noise() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = SessionConfig::new(temp_dir.path(), "book");
    let mut session = RecordingSession::new(config.clone());
    let mut device = ScriptedDevice::new(1024);

    let outcome = session.handle(Command::StartSegment, &mut device, &mut rng())?;

    assert!(matches!(
        outcome,
        Outcome::Rejected {
            command: Command::StartSegment,
            ..
        }
    ));
    assert_eq!(session.notice(), Some("No room noise recorded!"));
    assert_eq!(session.state(), SessionState::ArmedNoCalibration);
    assert_eq!(session.segment_count(), 0);
    assert!(!config.segment_path(1).exists());

    Ok(())
}

#[test]
fn test_room_noise_stops_itself_after_five_seconds() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut session = RecordingSession::new(SessionConfig::new(temp_dir.path(), "book"));
    let mut device = ScriptedDevice::new(1000);

    session.handle(Command::StartNoiseCalibration, &mut device, &mut rng())?;
    assert_eq!(session.state(), SessionState::RecordingNoise);

    // One extra second queued; the take must not grow past five
    device.push(&vec![Frame::new(90, -30); ROOM_NOISE_FRAMES + 48_000]);
    let outcomes = drain(&mut session, &mut device)?;

    assert_eq!(outcomes.len(), 1);
    assert!(matches!(
        outcomes[0],
        Outcome::RoomNoiseSaved {
            noise_floor: 100,
            ..
        }
    ));
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.noise_floor(), 100);
    assert!(session.buffer().is_empty());

    let (_, frames) = wav::decode(session.config().room_noise_path())?;
    assert_eq!(frames, ROOM_NOISE_FRAMES);

    Ok(())
}

#[test]
fn test_silent_room_noise_leaves_session_uncalibrated() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut session = RecordingSession::new(SessionConfig::new(temp_dir.path(), "book"));
    let mut device = ScriptedDevice::new(4096);

    calibrate(&mut session, &mut device, 0)?;

    assert_eq!(session.noise_floor(), 0);
    assert_eq!(session.state(), SessionState::ArmedNoCalibration);
    assert!(session.config().room_noise_path().exists());

    let outcome = session.handle(Command::StartSegment, &mut device, &mut rng())?;
    assert!(matches!(outcome, Outcome::Rejected { .. }));

    Ok(())
}

#[test]
fn test_segment_is_trimmed_and_saved() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut session = RecordingSession::new(SessionConfig::new(temp_dir.path(), "book"));
    let mut device = ScriptedDevice::new(1024);
    calibrate(&mut session, &mut device, 90)?;

    let outcome = record_segment(&mut session, &mut device, &speech_take())?;

    let expected_trim = TrimMarkers {
        first: 5_200,
        last: 24_800,
    };
    assert_eq!(
        outcome,
        Outcome::SegmentSaved {
            index: 1,
            path: session.config().segment_path(1),
            trim: Some(expected_trim),
        }
    );
    assert_eq!(session.segment_count(), 1);
    assert_eq!(session.trim_markers(), Some(expected_trim));
    assert_eq!(session.state(), SessionState::Idle);

    let path = temp_dir.path().join("book").join("segment-0001.wav");
    let mut saved = Vec::new();
    wav::read_frames(&path, &mut saved)?;
    assert_eq!(saved.len(), 19_601);
    assert_eq!(saved[0], Frame::new(50, -50));
    assert_eq!(saved[4_800], Frame::new(5_000, -5_000));

    Ok(())
}

#[test]
fn test_start_segment_flushes_stale_audio() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut session = RecordingSession::new(SessionConfig::new(temp_dir.path(), "book"));
    let mut device = ScriptedDevice::new(1024);
    calibrate(&mut session, &mut device, 90)?;

    // Audio captured before the button press must not end up in the take
    device.push(&vec![Frame::new(20_000, 20_000); 10_000]);
    session.handle(Command::StartSegment, &mut device, &mut rng())?;
    assert!(device.pending.is_empty());

    device.push(&vec![Frame::new(7, 7); 2_000]);
    drain(&mut session, &mut device)?;

    assert_eq!(session.buffer().len(), 2_000);
    assert!(session.buffer().frames().iter().all(|f| f.left == 7));

    Ok(())
}

#[test]
fn test_idle_tick_drops_audio() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut session = RecordingSession::new(SessionConfig::new(temp_dir.path(), "book"));
    let mut device = ScriptedDevice::new(1024);
    device.push(&vec![Frame::new(1, 1); 5_000]);

    let outcome = session.tick(&mut device)?;

    assert_eq!(outcome, Outcome::None);
    assert!(device.pending.is_empty());
    assert!(session.buffer().is_empty());

    Ok(())
}

#[test]
fn test_segment_numbers_are_sequential() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = SessionConfig::new(temp_dir.path(), "book");
    let mut session = RecordingSession::new(config.clone());
    let mut device = ScriptedDevice::new(4096);
    calibrate(&mut session, &mut device, 90)?;

    for _ in 0..3 {
        record_segment(&mut session, &mut device, &speech_take())?;
    }

    assert_eq!(session.segment_count(), 3);
    for index in 1..=3 {
        assert!(config.segment_path(index).exists());
    }
    assert!(!config.segment_path(4).exists());

    Ok(())
}

#[test]
fn test_undo_deletes_zero_padded_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut session = RecordingSession::new(SessionConfig::new(temp_dir.path(), "book"));
    let mut device = ScriptedDevice::new(4096);
    calibrate(&mut session, &mut device, 90)?;
    record_segment(&mut session, &mut device, &speech_take())?;
    record_segment(&mut session, &mut device, &speech_take())?;

    let outcome = session.handle(Command::DeleteLastSegment, &mut device, &mut rng())?;

    assert_eq!(outcome, Outcome::SegmentDeleted(2));
    assert_eq!(session.segment_count(), 1);
    let dir = temp_dir.path().join("book");
    assert!(!dir.join("segment-0002.wav").exists());
    assert!(dir.join("segment-0001.wav").exists());

    // The next take reuses the freed number
    record_segment(&mut session, &mut device, &speech_take())?;
    assert!(dir.join("segment-0002.wav").exists());

    Ok(())
}

#[test]
fn test_undo_missing_file_still_decrements() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut session = RecordingSession::new(SessionConfig::new(temp_dir.path(), "book"));
    let mut device = ScriptedDevice::new(4096);
    calibrate(&mut session, &mut device, 90)?;
    record_segment(&mut session, &mut device, &speech_take())?;
    fs::remove_file(session.config().segment_path(1))?;

    let outcome = session.undo_last_segment()?;

    assert_eq!(outcome, Outcome::SegmentDeleted(1));
    assert_eq!(session.segment_count(), 0);

    Ok(())
}

#[test]
fn test_undo_with_no_segments_is_rejected() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut session = RecordingSession::new(SessionConfig::new(temp_dir.path(), "book"));
    let mut device = ScriptedDevice::new(1024);

    let outcome = session.handle(Command::DeleteLastSegment, &mut device, &mut rng())?;

    assert!(matches!(outcome, Outcome::Rejected { .. }));
    assert_eq!(session.segment_count(), 0);

    Ok(())
}

#[test]
fn test_commands_rejected_while_recording() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut session = RecordingSession::new(SessionConfig::new(temp_dir.path(), "book"));
    let mut device = ScriptedDevice::new(1024);
    calibrate(&mut session, &mut device, 90)?;
    session.handle(Command::StartSegment, &mut device, &mut rng())?;

    for command in [
        Command::StartSegment,
        Command::StartNoiseCalibration,
        Command::DeleteLastSegment,
        Command::Combine,
        Command::StopNoiseCalibration,
    ] {
        let outcome = session.handle(command, &mut device, &mut rng())?;
        assert!(
            matches!(outcome, Outcome::Rejected { .. }),
            "{:?} should be rejected while recording",
            command
        );
    }

    assert_eq!(session.state(), SessionState::RecordingSegment);
    assert_eq!(session.segment_count(), 1);
    assert_eq!(session.noise_floor(), 100);

    Ok(())
}

#[test]
fn test_stop_when_idle_is_rejected() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut session = RecordingSession::new(SessionConfig::new(temp_dir.path(), "book"));
    let mut device = ScriptedDevice::new(1024);

    let outcome = session.handle(Command::StopSegment, &mut device, &mut rng())?;

    assert!(matches!(outcome, Outcome::Rejected { .. }));
    assert_eq!(session.state(), SessionState::ArmedNoCalibration);

    Ok(())
}

#[test]
fn test_stopping_room_noise_early_keeps_partial_take() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut session = RecordingSession::new(SessionConfig::new(temp_dir.path(), "book"));
    let mut device = ScriptedDevice::new(1000);

    session.handle(Command::StartNoiseCalibration, &mut device, &mut rng())?;
    device.push(&vec![Frame::new(45, 45); 3_000]);
    drain(&mut session, &mut device)?;
    let outcome = session.handle(Command::StopNoiseCalibration, &mut device, &mut rng())?;

    assert!(matches!(
        outcome,
        Outcome::RoomNoiseSaved {
            noise_floor: 50,
            ..
        }
    ));
    let (_, frames) = wav::decode(session.config().room_noise_path())?;
    assert_eq!(frames, 3_000);

    Ok(())
}

#[test]
fn test_recalibration_resets_noise_floor_until_saved() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut session = RecordingSession::new(SessionConfig::new(temp_dir.path(), "book"));
    let mut device = ScriptedDevice::new(4096);
    calibrate(&mut session, &mut device, 90)?;

    session.handle(Command::StartNoiseCalibration, &mut device, &mut rng())?;
    assert_eq!(session.noise_floor(), 0);

    device.push(&vec![Frame::new(180, 0); ROOM_NOISE_FRAMES]);
    drain(&mut session, &mut device)?;
    assert_eq!(session.noise_floor(), 200);

    Ok(())
}

#[test]
fn test_reopen_restores_floor_and_segment_count() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = SessionConfig::new(temp_dir.path(), "book");
    let mut device = ScriptedDevice::new(4096);

    let live_floor = {
        let mut session = RecordingSession::new(config.clone());
        calibrate(&mut session, &mut device, 1_234)?;
        record_segment(&mut session, &mut device, &speech_take())?;
        record_segment(&mut session, &mut device, &speech_take())?;
        session.noise_floor()
    };

    // A gap in the numbering ends the scan
    wav::encode(config.segment_path(4), &speech_take(), 48_000)?;

    let session = RecordingSession::reopen(config)?;

    assert_eq!(session.noise_floor(), live_floor);
    assert_eq!(session.segment_count(), 2);
    assert_eq!(session.state(), SessionState::Idle);

    Ok(())
}

#[test]
fn test_reopen_without_room_noise_fails() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = SessionConfig::new(temp_dir.path(), "book");
    fs::create_dir_all(&config.dir)?;

    let result = RecordingSession::reopen(config.clone());
    assert!(matches!(result, Err(RecorderError::NoRoomNoise)));

    // `open` falls back to a fresh session instead
    let session = RecordingSession::open(config)?;
    assert_eq!(session.state(), SessionState::ArmedNoCalibration);

    Ok(())
}

#[test]
fn test_quit_saves_running_take() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut session = RecordingSession::new(SessionConfig::new(temp_dir.path(), "book"));
    let mut device = ScriptedDevice::new(4096);
    calibrate(&mut session, &mut device, 90)?;

    session.handle(Command::StartSegment, &mut device, &mut rng())?;
    device.push(&speech_take());
    drain(&mut session, &mut device)?;

    let outcome = session.handle(Command::Quit, &mut device, &mut rng())?;

    assert_eq!(outcome, Outcome::Quit);
    assert!(!session.is_recording());
    assert!(session.config().segment_path(1).exists());

    Ok(())
}

#[test]
fn test_failed_write_returns_to_idle() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut session = RecordingSession::new(SessionConfig::new(temp_dir.path(), "book"));
    let mut device = ScriptedDevice::new(4096);
    calibrate(&mut session, &mut device, 90)?;

    session.handle(Command::StartSegment, &mut device, &mut rng())?;
    device.push(&speech_take());
    drain(&mut session, &mut device)?;
    fs::remove_dir_all(&session.config().dir)?;

    let result = session.handle(Command::StopSegment, &mut device, &mut rng());

    assert!(matches!(result, Err(RecorderError::Io { .. })));
    assert!(!session.is_recording());
    assert!(session.buffer().is_empty());
    assert!(session.notice().is_some());
    assert_eq!(session.segment_count(), 0, "The failed number is handed back");

    Ok(())
}

#[test]
fn test_status_snapshot() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut session = RecordingSession::new(SessionConfig::new(temp_dir.path(), "book"));
    let mut device = ScriptedDevice::new(1000);
    calibrate(&mut session, &mut device, 90)?;

    session.handle(Command::StartSegment, &mut device, &mut rng())?;
    device.push(&vec![Frame::new(3, 3); 2_500]);
    drain(&mut session, &mut device)?;

    let status = session.status();
    assert_eq!(status.name, "book");
    assert_eq!(status.state, SessionState::RecordingSegment);
    assert!(status.recording);
    assert_eq!(status.segment_count, 1);
    assert_eq!(status.noise_floor, 100);
    assert_eq!(status.buffered_frames, 2_500);
    assert_eq!(status.notice.as_deref(), Some("Segment 1"));

    let json = serde_json::to_value(&status)?;
    assert_eq!(json["state"], "RecordingSegment");
    assert_eq!(json["buffered_frames"], 2_500);

    assert_eq!(session.waveform(320).len(), 313, "2500 frames in columns of 8");

    Ok(())
}

#[test]
fn test_key_mapping() {
    assert_eq!(Command::from_key('r'), Some(Command::StartSegment));
    assert_eq!(Command::from_key('S'), Some(Command::StopSegment));
    assert_eq!(Command::from_key('n'), Some(Command::StartNoiseCalibration));
    assert_eq!(Command::from_key('x'), Some(Command::StopNoiseCalibration));
    assert_eq!(Command::from_key('d'), Some(Command::DeleteLastSegment));
    assert_eq!(Command::from_key('c'), Some(Command::Combine));
    assert_eq!(Command::from_key('q'), Some(Command::Quit));
    assert_eq!(Command::from_key('z'), None);

    assert!(Command::Combine.requires_idle());
    assert!(!Command::StopSegment.requires_idle());
    assert!(!Command::Quit.requires_idle());
}

#[test]
fn test_failed_write_keeps_numbering_contiguous() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = SessionConfig::new(temp_dir.path(), "book");
    let mut session = RecordingSession::new(config.clone());
    let mut device = ScriptedDevice::new(4096);
    calibrate(&mut session, &mut device, 90)?;
    record_segment(&mut session, &mut device, &speech_take())?;

    // A directory in the way makes the next save fail
    fs::create_dir(config.segment_path(2))?;
    assert!(record_segment(&mut session, &mut device, &speech_take()).is_err());
    assert_eq!(session.segment_count(), 1);

    fs::remove_dir(config.segment_path(2))?;
    let outcome = record_segment(&mut session, &mut device, &speech_take())?;
    assert!(matches!(outcome, Outcome::SegmentSaved { index: 2, .. }));
    assert!(config.segment_path(2).is_file());
    assert!(!config.segment_path(3).exists());

    let combined = session.handle(Command::Combine, &mut device, &mut rng())?;
    assert!(matches!(combined, Outcome::Combined(ref report) if report.segments == 2));

    let reopened = RecordingSession::reopen(config)?;
    assert_eq!(reopened.segment_count(), 2);

    Ok(())
}

#[test]
fn test_full_buffer_stops_segment() -> Result<()> {
    let temp_dir = TempDir::new()?;
    // 60 s at 100 Hz: a 6000-frame buffer
    let config = SessionConfig::new(temp_dir.path(), "book").with_sample_rate(100);
    let mut session = RecordingSession::new(config.clone());
    let mut device = ScriptedDevice::new(700);
    calibrate(&mut session, &mut device, 90)?;
    assert_eq!(session.buffer().capacity(), 6_000);

    session.handle(Command::StartSegment, &mut device, &mut rng())?;
    device.push(&vec![Frame::new(5_000, -5_000); 7_500]);
    let outcomes = drain(&mut session, &mut device)?;

    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0], Outcome::SegmentSaved { index: 1, .. }));
    assert!(!session.is_recording(), "A full buffer ends the take");
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(device.pending.len(), 1_500, "Nothing is read past capacity");

    let (header, frames) = wav::decode(config.segment_path(1))?;
    assert_eq!(frames, 6_000);
    assert_eq!(header.sample_rate, 100);

    Ok(())
}
