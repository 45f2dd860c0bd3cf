// Live capture through cpal
//
// cpal streams are not Send, so the stream lives on a dedicated thread for
// its whole life. The thread reports the negotiated parameters over a
// oneshot once the stream is playing and then parks until told to stop.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SupportedBufferSize};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame, Negotiated, NegotiatedParams};
use crate::error::DeviceError;

pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    negotiated: NegotiatedParams,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Result<Self, DeviceError> {
        let host = cpal::default_host();
        let device = find_device(&host, &config.device)?;
        info!(
            "Microphone backend initialized: {} ({}Hz, {} channels requested)",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            config.sample_rate,
            config.channels
        );

        Ok(Self {
            negotiated: config.exact(),
            config,
            stop_tx: None,
            thread: None,
        })
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, DeviceError> {
        if self.thread.is_some() {
            return Err(DeviceError::Config("Already capturing".to_string()));
        }

        let (tx, rx) = mpsc::channel(256);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let config = self.config.clone();

        let thread = std::thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || {
                let stream = match open_stream(&config, tx) {
                    Ok((stream, negotiated)) => {
                        let _ = ready_tx.send(Ok(negotiated));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Returns on stop() or when the backend is dropped
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| DeviceError::Stream(e.to_string()))?;

        let negotiated = ready_rx
            .await
            .map_err(|_| DeviceError::Stream("capture thread exited early".to_string()))??;

        self.negotiated = negotiated;
        self.stop_tx = Some(stop_tx);
        self.thread = Some(thread);

        info!("Microphone capture started");
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), DeviceError> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Capture thread panicked");
            }
            info!("Microphone capture stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.thread.is_some()
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }

    fn negotiated(&self) -> NegotiatedParams {
        self.negotiated
    }
}

fn find_device(host: &cpal::Host, name: &str) -> Result<Device, DeviceError> {
    if name == "default" {
        return host
            .default_input_device()
            .ok_or_else(|| DeviceError::Unavailable("no default input device".to_string()));
    }

    let devices = host
        .input_devices()
        .map_err(|e| DeviceError::Unavailable(e.to_string()))?;

    for device in devices {
        if let Ok(device_name) = device.name() {
            if device_name.contains(name) {
                return Ok(device);
            }
        }
    }

    Err(DeviceError::Unavailable(format!("device not found: {}", name)))
}

fn open_stream(
    config: &AudioBackendConfig,
    tx: mpsc::Sender<AudioFrame>,
) -> Result<(cpal::Stream, NegotiatedParams), DeviceError> {
    let host = cpal::default_host();
    let device = find_device(&host, &config.device)?;

    let rate = cpal::SampleRate(config.sample_rate);
    let exact = device
        .supported_input_configs()
        .map_err(|e| DeviceError::Config(e.to_string()))?
        .filter(|range| {
            range.channels() == config.channels
                && range.min_sample_rate() <= rate
                && rate <= range.max_sample_rate()
        })
        .max_by_key(|range| range.sample_format() == SampleFormat::I16);

    let supported = match exact {
        Some(range) => range.with_sample_rate(rate),
        None => {
            warn!("No exact input configuration, falling back to device default");
            device
                .default_input_config()
                .map_err(|e| DeviceError::Config(e.to_string()))?
        }
    };

    let mut stream_config = supported.config();
    let period = match supported.buffer_size() {
        SupportedBufferSize::Range { min, max } => {
            let period = config.period_size.clamp(*min, *max);
            stream_config.buffer_size = cpal::BufferSize::Fixed(period);
            period
        }
        SupportedBufferSize::Unknown => config.period_size,
    };

    let negotiated = NegotiatedParams {
        sample_rate: Negotiated::new(config.sample_rate, stream_config.sample_rate.0),
        channels: Negotiated::new(u32::from(config.channels), u32::from(stream_config.channels)),
        period_size: Negotiated::new(config.period_size, period),
        buffer_size: Negotiated::new(config.buffer_size(), period * config.num_periods),
    };

    let stream = match supported.sample_format() {
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, tx)?,
        SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, tx)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, tx)?,
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, tx)?,
        other => {
            return Err(DeviceError::Config(format!(
                "unsupported sample format {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| DeviceError::Stream(e.to_string()))?;

    Ok((stream, negotiated))
}

fn build_stream<T>(
    device: &Device,
    stream_config: &cpal::StreamConfig,
    tx: mpsc::Sender<AudioFrame>,
) -> Result<cpal::Stream, DeviceError>
where
    T: cpal::SizedSample + Send + 'static,
    i16: cpal::FromSample<T>,
{
    let sample_rate = stream_config.sample_rate.0;
    let channels = stream_config.channels;
    let started = Instant::now();

    device
        .build_input_stream(
            stream_config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples: Vec<i16> = data
                    .iter()
                    .map(|&s| cpal::Sample::from_sample(s))
                    .collect();
                let frame = AudioFrame {
                    samples,
                    sample_rate,
                    channels,
                    timestamp_ms: started.elapsed().as_millis() as u64,
                };
                if tx.try_send(frame).is_err() {
                    warn!("Capture channel full, dropping {} samples", data.len());
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| DeviceError::Stream(e.to_string()))
}
