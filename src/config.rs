use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

use crate::audio::AudioBackendConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub audio: AudioConfig,
    pub sessions: SessionsConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    pub device: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub period_size: u32,
    pub num_periods: u32,
    /// Replay this WAV file instead of opening the microphone
    pub input_file: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionsConfig {
    /// Root directory; each session is a subdirectory plus `<name>.wav`
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct DisplayConfig {
    /// Print status snapshots as JSON lines instead of log lines
    pub status_json: bool,
}

impl Config {
    /// Looked up (any extension `config` understands) when no path is given
    pub const DEFAULT_PATH: &'static str = "config/abook-recorder";

    /// Built-in defaults, then the optional file at `path`, then
    /// `ABOOK__SECTION__KEY` environment variables.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("audio.device", "default")?
            .set_default("audio.sample_rate", 48_000_i64)?
            .set_default("audio.channels", 2_i64)?
            .set_default("audio.period_size", 1024_i64)?
            .set_default("audio.num_periods", 2_i64)?
            .set_default("sessions.path", ".")?
            .set_default("display.status_json", false)?
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("ABOOK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Session root with `~` expanded
    pub fn sessions_root(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.sessions.path).into_owned())
    }

    /// Hardware parameters to request from the capture device
    pub fn backend_config(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            device: self.audio.device.clone(),
            sample_rate: self.audio.sample_rate,
            channels: self.audio.channels,
            period_size: self.audio.period_size,
            num_periods: self.audio.num_periods,
        }
    }
}
