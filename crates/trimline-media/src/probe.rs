//! Media file probing to get the duration without a full decode.

use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegDuration, FfmpegEvent};
use std::path::Path;
use tracing::{debug, warn};
use trimline_core::{Result, TrimlineError};

/// Duration in seconds of the media file at `path`, as parsed by FFmpeg.
///
/// FFmpeg is stopped as soon as the input header has been read.
pub fn probe_duration<P: AsRef<Path>>(path: P) -> Result<f64> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(TrimlineError::NotFound(format!(
            "File not found: {}",
            path.display()
        )));
    }

    let mut child = FfmpegCommand::new()
        .hide_banner()
        .input(path.display().to_string())
        .args(["-f", "null"])
        .output("-")
        .spawn()
        .map_err(|e| TrimlineError::EngineFailure(format!("Failed to spawn ffmpeg: {e}")))?;
    let iter = child
        .iter()
        .map_err(|e| TrimlineError::EngineFailure(format!("Failed to read ffmpeg output: {e}")))?;

    let mut duration = None;
    for event in iter {
        match event {
            FfmpegEvent::ParsedDuration(FfmpegDuration { duration: d, .. }) => {
                duration = Some(d);
                break;
            }
            FfmpegEvent::Error(line) => debug!(%line, "ffmpeg probe error"),
            // Encoding started without a duration line.
            FfmpegEvent::Progress(_) => break,
            _ => {}
        }
    }

    if let Err(e) = child.kill() {
        warn!("Failed to stop ffmpeg after probing: {e}");
    }
    if let Err(e) = child.wait() {
        warn!("Failed to reap ffmpeg after probing: {e}");
    }

    match duration {
        Some(d) if d.is_finite() && d > 0.0 => {
            debug!(path = %path.display(), duration = d, "Probed media");
            Ok(d)
        }
        _ => Err(TrimlineError::UnsupportedFormat(format!(
            "No duration found in {}",
            path.display()
        ))),
    }
}
