//! FFmpeg-backed transcode engine.
//!
//! The source buffer is written into a scratch directory, trimmed and
//! re-encoded by an `ffmpeg` child process, and the output file is read back.

use ffmpeg_sidecar::command::{ffmpeg_is_installed, FfmpegCommand};
use ffmpeg_sidecar::event::{FfmpegEvent, FfmpegProgress, LogLevel};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, trace, warn};
use trimline_core::CancelToken;
use uuid::Uuid;

use crate::encode::{output_duration, seek_args};
use crate::engine::{ProgressFn, TranscodeEngine, TranscodeRequest};
use crate::error::EngineError;

/// Check if FFmpeg can be run from the current PATH.
pub fn is_ffmpeg_installed() -> bool {
    ffmpeg_is_installed()
}

/// Transcode engine driving an `ffmpeg` child process.
#[derive(Debug, Default)]
pub struct FfmpegEngine {
    auto_download: bool,
    scratch: Mutex<Option<TempDir>>,
}

impl FfmpegEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Download FFmpeg during `prepare()` when it is not installed.
    pub fn with_auto_download(mut self, auto_download: bool) -> Self {
        self.auto_download = auto_download;
        self
    }

    pub fn is_prepared(&self) -> bool {
        self.scratch.lock().is_some()
    }

    fn scratch_dir(&self) -> Result<PathBuf, EngineError> {
        self.scratch
            .lock()
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
            .ok_or(EngineError::NotPrepared)
    }

    fn ensure_binary(&self) -> Result<(), EngineError> {
        if ffmpeg_is_installed() {
            return Ok(());
        }
        if !self.auto_download {
            return Err(EngineError::Unavailable(
                "ffmpeg not found on PATH and auto-download is disabled".into(),
            ));
        }
        info!("Downloading ffmpeg");
        ffmpeg_sidecar::download::auto_download()
            .map_err(|e| EngineError::Unavailable(format!("download failed: {e}")))?;
        if ffmpeg_is_installed() {
            Ok(())
        } else {
            Err(EngineError::Unavailable("ffmpeg still missing after download".into()))
        }
    }
}

impl TranscodeEngine for FfmpegEngine {
    fn prepare(&self) -> Result<(), EngineError> {
        if self.is_prepared() {
            return Ok(());
        }
        self.ensure_binary()?;
        let dir = tempfile::Builder::new().prefix("trimline-").tempdir()?;
        debug!(scratch = %dir.path().display(), "FFmpeg engine prepared");
        *self.scratch.lock() = Some(dir);
        Ok(())
    }

    fn transcode(
        &self,
        request: &TranscodeRequest,
        on_progress: ProgressFn<'_>,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, EngineError> {
        let scratch = self.scratch_dir()?;
        let job = Uuid::new_v4();
        let input = scratch.join(format!("input-{job}.{}", request.kind.extension()));
        let output = scratch.join(format!(
            "output-{job}.{}",
            request.encode.container().extension()
        ));
        fs::write(&input, &request.source)?;

        let result = run_ffmpeg(&input, &output, request, on_progress, cancel)
            .and_then(|()| read_output(&output));

        for path in [&input, &output] {
            if let Err(e) = fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), "Failed to remove scratch file: {e}");
                }
            }
        }
        result
    }

    fn reset(&self) {
        if let Some(dir) = self.scratch.lock().take() {
            debug!(scratch = %dir.path().display(), "FFmpeg engine reset");
        }
    }
}

fn run_ffmpeg(
    input: &Path,
    output: &Path,
    request: &TranscodeRequest,
    on_progress: ProgressFn<'_>,
    cancel: &CancelToken,
) -> Result<(), EngineError> {
    let expected = output_duration(request.range, request.speed);

    let mut cmd = FfmpegCommand::new();
    cmd.hide_banner()
        .args(seek_args(request.range))
        .input(input.display().to_string())
        .args(request.encode.output_args(request.speed))
        .overwrite()
        .output(output.display().to_string());

    let mut child = cmd
        .spawn()
        .map_err(|e| EngineError::Spawn(e.to_string()))?;
    let iter = child
        .iter()
        .map_err(|e| EngineError::Process(format!("failed to read ffmpeg output: {e}")))?;

    let started = Instant::now();
    let mut reported = 0u8;
    let mut last_error = None;
    on_progress(0);

    for event in iter {
        if cancel.is_cancelled() {
            if let Err(e) = child.kill() {
                warn!("Failed to kill ffmpeg after cancellation: {e}");
            }
            if let Err(e) = child.wait() {
                warn!("Failed to reap ffmpeg after cancellation: {e}");
            }
            info!("Stopped ffmpeg after cancellation");
            return Err(EngineError::Cancelled);
        }

        match event {
            FfmpegEvent::Progress(FfmpegProgress { time, .. }) => {
                if let Some(pct) = progress_percent(&time, expected) {
                    if pct > reported {
                        reported = pct;
                        on_progress(pct);
                    }
                }
            }
            FfmpegEvent::Log(LogLevel::Error | LogLevel::Fatal, line) => {
                trace!(%line, "ffmpeg error line");
                last_error = Some(line);
            }
            FfmpegEvent::Error(line) => last_error = Some(line),
            _ => {}
        }
    }

    let status = child
        .wait()
        .map_err(|e| EngineError::Process(format!("failed to wait for ffmpeg: {e}")))?;
    if !status.success() {
        return Err(EngineError::Process(match last_error {
            Some(line) => format!("{status}: {line}"),
            None => status.to_string(),
        }));
    }

    if reported < 100 {
        on_progress(100);
    }
    info!(spent = ?started.elapsed(), "ffmpeg finished");
    Ok(())
}

fn read_output(path: &Path) -> Result<Vec<u8>, EngineError> {
    match fs::read(path) {
        Ok(bytes) if bytes.is_empty() => Err(EngineError::MissingOutput),
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(EngineError::MissingOutput),
        Err(e) => Err(e.into()),
    }
}

/// Parse an FFmpeg `HH:MM:SS.ss` timestamp into seconds.
pub(crate) fn parse_timestamp(timestamp: &str) -> Option<f64> {
    let timestamp = timestamp.trim();
    if timestamp.starts_with('-') {
        return None;
    }
    let mut parts = timestamp.splitn(3, ':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    let total = hours * 3600.0 + minutes * 60.0 + seconds;
    (total.is_finite() && total >= 0.0).then_some(total)
}

/// Percentage of `expected` seconds covered by an FFmpeg progress timestamp.
///
/// Capped at 99 so only a clean exit reports 100.
pub(crate) fn progress_percent(timestamp: &str, expected: f64) -> Option<u8> {
    if expected <= 0.0 {
        return None;
    }
    let done = parse_timestamp(timestamp)?;
    Some(((done / expected) * 100.0).floor().clamp(0.0, 99.0) as u8)
}
