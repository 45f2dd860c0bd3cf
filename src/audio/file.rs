use anyhow::{Context, Result};
use hound::WavReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame, Negotiated, NegotiatedParams};
use super::frame::{frames_from_interleaved, Frame};
use crate::error::DeviceError;

/// Any 16-bit (or narrower) integer WAV file, as read by hound
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Samples as stereo frames (mono duplicated, extra channels dropped)
    pub fn frames(&self) -> Vec<Frame> {
        let mut out = Vec::with_capacity(self.samples.len() / self.channels.max(1) as usize);
        frames_from_interleaved(&self.samples, self.channels, &mut out);
        out
    }
}

/// Replays a WAV file as a capture device, one period per packet, paced
/// in real time at the file's own sample rate.
pub struct FileBackend {
    audio: Arc<AudioFile>,
    config: AudioBackendConfig,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn open(path: impl AsRef<Path>, config: AudioBackendConfig) -> Result<Self, DeviceError> {
        let audio = AudioFile::open(path)
            .map_err(|e| DeviceError::Unavailable(format!("{:#}", e)))?;

        if audio.sample_rate == 0 || audio.channels == 0 {
            return Err(DeviceError::Config(format!(
                "{} declares {}Hz with {} channels",
                audio.path, audio.sample_rate, audio.channels
            )));
        }

        Ok(Self {
            audio: Arc::new(audio),
            config,
            task: None,
        })
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, DeviceError> {
        if self.is_capturing() {
            return Err(DeviceError::Config("Already capturing".to_string()));
        }

        let (tx, rx) = mpsc::channel(64);
        let audio = Arc::clone(&self.audio);
        let period_frames = self.config.period_size.max(1) as usize;
        let period = Duration::from_secs_f64(period_frames as f64 / audio.sample_rate as f64);

        info!("Replaying {} ({} frames per packet)", audio.path, period_frames);

        let task = tokio::spawn(async move {
            let chunk_len = period_frames * audio.channels as usize;
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Burst);

            for (i, chunk) in audio.samples.chunks(chunk_len).enumerate() {
                ticker.tick().await;
                let frame = AudioFrame {
                    samples: chunk.to_vec(),
                    sample_rate: audio.sample_rate,
                    channels: audio.channels,
                    timestamp_ms: (i * period_frames) as u64 * 1000 / audio.sample_rate as u64,
                };
                if tx.send(frame).await.is_err() {
                    warn!("Capture receiver dropped, stopping replay");
                    return;
                }
            }

            info!("Replay of {} complete", audio.path);
        });

        self.task = Some(task);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), DeviceError> {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("File replay stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn name(&self) -> &str {
        "WAV file replay"
    }

    fn negotiated(&self) -> NegotiatedParams {
        NegotiatedParams {
            sample_rate: Negotiated::new(self.config.sample_rate, self.audio.sample_rate),
            channels: Negotiated::new(
                u32::from(self.config.channels),
                u32::from(self.audio.channels),
            ),
            period_size: Negotiated::exact(self.config.period_size),
            buffer_size: Negotiated::exact(self.config.buffer_size()),
        }
    }
}
