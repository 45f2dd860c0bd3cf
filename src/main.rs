use abook_recorder::{
    AudioBackendFactory, AudioSource, ChannelCapture, Command, Config, DeviceError, Outcome,
    RecorderError, RecordingSession, SessionConfig, SessionStatus,
};
use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit code when the capture device cannot be opened
const EXIT_DEVICE: i32 = 20;

/// Control loop cadence
const TICK: Duration = Duration::from_millis(1);

#[derive(Parser)]
#[command(name = "abook-recorder")]
#[command(about = "Push-button audiobook recorder")]
struct Args {
    /// Capture device name ("default" for the host default)
    #[arg(short, long)]
    device: Option<String>,

    /// Session name; an existing session with room noise is reopened
    #[arg(short, long)]
    name: Option<String>,

    /// Config file (extension optional)
    #[arg(short, long, default_value = Config::DEFAULT_PATH)]
    config: String,

    /// Replay a WAV file instead of capturing from the device
    #[arg(short, long)]
    input_file: Option<String>,

    /// Print status snapshots as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;
    if let Some(device) = args.device {
        cfg.audio.device = device;
    }
    if args.input_file.is_some() {
        cfg.audio.input_file = args.input_file;
    }
    if args.json {
        cfg.display.status_json = true;
    }

    info!("Audiobook Recorder v{}", env!("CARGO_PKG_VERSION"));
    info!("Sessions stored under {}", cfg.sessions_root().display());

    let source = match &cfg.audio.input_file {
        Some(path) => AudioSource::File(path.clone()),
        None => AudioSource::Microphone,
    };

    let mut backend = match AudioBackendFactory::create(source, cfg.backend_config()) {
        Ok(backend) => backend,
        Err(e) => {
            error!("Capture open error: {}", e);
            std::process::exit(EXIT_DEVICE);
        }
    };
    let audio_rx = match backend.start().await {
        Ok(rx) => rx,
        Err(e) => {
            error!("Failed to start {}: {}", backend.name(), e);
            std::process::exit(EXIT_DEVICE);
        }
    };

    let negotiated = backend.negotiated();
    for warning in negotiated.warnings() {
        warn!("WARNING: {}", warning);
    }
    let sample_rate = negotiated.sample_rate.granted;
    info!("Capturing from {} at {}Hz", backend.name(), sample_rate);

    let mut capture = ChannelCapture::new(audio_rx);

    let root = cfg.sessions_root();
    let session_config = match args.name {
        Some(name) => SessionConfig::new(&root, name),
        None => SessionConfig::timestamped(&root),
    }
    .with_sample_rate(sample_rate);
    let mut session = RecordingSession::open(session_config).context("Failed to open session")?;

    let (command_tx, mut command_rx) = mpsc::channel(32);
    spawn_key_reader(command_tx.clone());
    spawn_signal_listener(command_tx);

    info!("Keys: n room noise, r record, s stop, d delete last, c combine, q quit");

    let mut renderer = StatusRenderer::new(cfg.display.status_json, sample_rate);
    let mut rng = StdRng::from_entropy();
    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut device_error: Option<DeviceError> = None;

    'control: loop {
        ticker.tick().await;

        while let Ok(command) = command_rx.try_recv() {
            if command == Command::Quit {
                break 'control;
            }
            match session.handle(command, &mut capture, &mut rng) {
                Ok(outcome) => log_outcome(&outcome),
                Err(e) if e.is_user_actionable() => warn!("{}", e),
                Err(e) => error!("{:?} failed: {}", command, e),
            }
        }

        match session.tick(&mut capture) {
            Ok(outcome) => {
                device_error = None;
                log_outcome(&outcome);
            }
            Err(RecorderError::Device(e)) => {
                // Logged once per distinct failure; the next tick retries
                if device_error.as_ref() != Some(&e) {
                    warn!("Capture tick skipped: {}", e);
                    device_error = Some(e);
                }
            }
            Err(e) => error!("Failed to save take: {}", e),
        }

        renderer.render(&session.status());
    }

    info!("Quitting");
    if let Err(e) = session.shutdown() {
        error!("Failed to save take on exit: {}", e);
    }
    backend.stop().await.context("Failed to stop capture")?;

    Ok(())
}

/// Reads keys from stdin, one command per character
fn spawn_key_reader(tx: mpsc::Sender<Command>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            for key in line.chars().filter(|c| !c.is_whitespace()) {
                match Command::from_key(key) {
                    Some(command) => {
                        if tx.send(command).await.is_err() {
                            return;
                        }
                    }
                    None => warn!("Unknown key: {}", key),
                }
            }
        }
    });
}

/// Ctrl-C (and SIGTERM on unix) become a Quit command
fn spawn_signal_listener(tx: mpsc::Sender<Command>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = term.recv() => {}
                    }
                }
                Err(e) => {
                    warn!("Cannot listen for SIGTERM: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }

        let _ = tx.send(Command::Quit).await;
    });
}

fn log_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Combined(report) => info!(
            "Combined {} segments into {} ({} frames)",
            report.segments,
            report.path.display(),
            report.frames
        ),
        Outcome::SegmentSaved {
            index,
            trim: Some(trim),
            ..
        } => info!("Segment {} trimmed to {}..={}", index, trim.first, trim.last),
        _ => {}
    }
}

/// Stand-in for the display: prints the status whenever it changes, and
/// once per captured second while recording.
struct StatusRenderer {
    json: bool,
    sample_rate: usize,
    last: Option<SessionStatus>,
}

impl StatusRenderer {
    fn new(json: bool, sample_rate: u32) -> Self {
        Self {
            json,
            sample_rate: (sample_rate as usize).max(1),
            last: None,
        }
    }

    fn render(&mut self, status: &SessionStatus) {
        let mut key = status.clone();
        key.buffered_frames -= key.buffered_frames % self.sample_rate;
        if self.last.as_ref() == Some(&key) {
            return;
        }
        self.last = Some(key);

        if self.json {
            match serde_json::to_string(status) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to serialize status: {}", e),
            }
            return;
        }

        info!(
            "Session: {} | {:?} | Segments: {} | Noise floor: {} | {:.1}s buffered{}",
            status.name,
            status.state,
            status.segment_count,
            status.noise_floor,
            status.buffered_frames as f64 / self.sample_rate as f64,
            status
                .notice
                .as_ref()
                .map(|n| format!(" | {}", n))
                .unwrap_or_default()
        );
    }
}
