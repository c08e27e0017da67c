//! Trimline - trim a video and change its speed from the command line.
//!
//! Entry point: loads the source, mirrors it into a trim session through a
//! headless playback surface, applies the requested range and speed, and
//! exports with Ctrl-C wired to cancellation.

mod config;

use anyhow::{bail, Context, Result};
use clap::Parser;
use config::AppConfig;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use trimline_core::{format_time, SourceMedia, TrimlineError};
use trimline_media::{
    probe_duration, ExportEvent, ExportOrchestrator, ExportOutcome, FfmpegEngine, TranscodeEngine,
};
use trimline_session::{SharedSession, TrimSession};
use trimline_ui::{HeadlessSurface, PlaybackBridge, PlaybackNotification};

/// Exit status after a user cancellation (128 + SIGINT).
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "trimline", version, about = "Trim a video clip and change its speed")]
struct Cli {
    /// Source video (MP4, WebM or QuickTime)
    input: PathBuf,

    /// Trim start in seconds
    #[arg(long)]
    start: Option<f64>,

    /// Trim end in seconds
    #[arg(long)]
    end: Option<f64>,

    /// Playback speed factor, e.g. 0.5 or 2
    #[arg(long)]
    speed: Option<f64>,

    /// Directory to write the result into (defaults to the input's directory)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Print the final session snapshot as JSON
    #[arg(long)]
    json: bool,

    /// Config file (defaults to $TRIMLINE_CONFIG or the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Download FFmpeg if it is not installed
    #[arg(long)]
    auto_download: bool,

    /// Write the effective configuration back to the config file
    #[arg(long)]
    save_config: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Failed to initialize logging: {e}");
    }

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            let notice = match err.downcast_ref::<TrimlineError>() {
                Some(e) if e.is_user_facing() => e.user_notice(),
                _ => format!("{err:#}"),
            };
            error!("{err:#}");
            eprintln!("error: {notice}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.clone().or_else(AppConfig::default_path);
    let mut config = match &config_path {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if cli.auto_download {
        config.auto_download_ffmpeg = true;
    }
    if cli.save_config {
        let Some(path) = &config_path else {
            bail!("No config location available");
        };
        config.save(path)?;
        info!(path = %path.display(), "Saved config");
    }

    let media = SourceMedia::from_path(&cli.input)?;
    let duration = probe_duration(&cli.input)?;
    info!(
        file = media.name(),
        kind = %media.kind(),
        duration = %format_time(duration),
        "Opened source"
    );

    let session = prepare_session(media, duration, &cli, &config)?;
    let shared = session.into_shared();

    let auto_download = config.auto_download_ffmpeg;
    let orchestrator = Arc::new(
        ExportOrchestrator::new(
            Arc::clone(&shared),
            Box::new(move || {
                Arc::new(FfmpegEngine::new().with_auto_download(auto_download))
                    as Arc<dyn TranscodeEngine>
            }),
        )
        .with_settings(config.export_settings())
        .with_encode(config.encode.clone()),
    );

    let progress = spawn_progress_logger(&orchestrator);
    let ctrl_c = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, cancelling export");
                orchestrator.cancel_user_export();
            }
        })
    };

    let outcome = orchestrator.run_export().await;
    ctrl_c.abort();

    let code = match outcome {
        ExportOutcome::Completed {
            handle,
            file_name,
            data,
        } => {
            let output_dir = match &cli.output_dir {
                Some(dir) => dir.clone(),
                None => cli
                    .input
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default(),
            };
            debug!(handle = %handle, "Writing export result");
            let path = write_result(&output_dir, &file_name, &data)?;
            println!("{}", path.display());
            ExitCode::SUCCESS
        }
        ExportOutcome::Cancelled => {
            eprintln!("{}", TrimlineError::CancellationRequested.user_notice());
            ExitCode::from(EXIT_CANCELLED)
        }
        ExportOutcome::Failed { notice } => {
            eprintln!("error: {notice}");
            ExitCode::FAILURE
        }
        ExportOutcome::Skipped => bail!("Nothing to export"),
    };

    if cli.json {
        println!("{}", shared.lock().snapshot().to_json()?);
    }

    teardown(&shared);
    if progress.join().is_err() {
        warn!("Progress logger panicked");
    }
    Ok(code)
}

/// Load `media` into a fresh session and apply the requested trim and speed.
fn prepare_session(
    media: SourceMedia,
    duration: f64,
    cli: &Cli,
    config: &AppConfig,
) -> Result<TrimSession> {
    let mut session = TrimSession::new();
    let mut surface = HeadlessSurface::new(duration);
    session.load_media(media);
    PlaybackBridge::notify(PlaybackNotification::LoadedMetadata, &mut session, &mut surface);

    if let Some(start) = cli.start {
        session.set_trim_start(start);
    }
    if let Some(end) = cli.end {
        session.set_trim_end(end);
    }
    if let Some(speed) = cli.speed {
        if speed <= 0.0 || !speed.is_finite() {
            bail!("Speed must be positive, got {speed}");
        }
        if !config.speed_presets.contains(&speed) {
            debug!(speed, presets = ?config.speed_presets, "Speed outside presets");
        }
        PlaybackBridge::change_speed(&mut session, &mut surface, speed);
    }

    let trim = session.trim();
    info!(
        start = %format_time(trim.start),
        end = %format_time(trim.end),
        length = %format_time(session.trim_duration()),
        speed = session.speed(),
        "Trim selected"
    );
    if !session.can_export() {
        bail!("Trim range {trim} cannot be exported");
    }
    Ok(session)
}

/// Log export progress in 10% steps until the export ends.
fn spawn_progress_logger(orchestrator: &ExportOrchestrator) -> std::thread::JoinHandle<()> {
    let events = orchestrator.subscribe();
    std::thread::spawn(move || {
        let mut last_step = None;
        for event in events {
            match event {
                ExportEvent::Started => info!("Exporting"),
                ExportEvent::Progress(pct) => {
                    let step = pct / 10;
                    if last_step != Some(step) {
                        last_step = Some(step);
                        info!(progress = pct, "Exporting");
                    }
                }
                ExportEvent::ResultReady { file_name, data, .. } => {
                    debug!(file = %file_name, bytes = data.len(), "Result ready");
                    break;
                }
                ExportEvent::Cancelled => break,
                ExportEvent::Failed { notice } => {
                    debug!(%notice, "Export failed");
                    break;
                }
            }
        }
    })
}

fn write_result(dir: &Path, file_name: &str, data: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(file_name);
    std::fs::write(&path, data).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), bytes = data.len(), "Wrote result");
    Ok(path)
}

/// Release the session's handles now rather than waiting for timers.
fn teardown(shared: &SharedSession) {
    let mut session = shared.lock();
    session.teardown();
    debug!(live = session.resources().live_count(), "Session torn down");
}
