//! Encoder settings and FFmpeg argument construction.

use serde::{Deserialize, Serialize};
use trimline_core::{ContainerKind, TrimRange};

/// Lowest and highest factor a single `atempo` stage accepts.
const ATEMPO_MIN: f64 = 0.5;
const ATEMPO_MAX: f64 = 2.0;

/// Video codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    #[default]
    H264,
    H265,
    Vp9,
}

impl VideoCodec {
    /// FFmpeg encoder name.
    pub fn ffmpeg_encoder(self) -> &'static str {
        match self {
            Self::H264 => "libx264",
            Self::H265 => "libx265",
            Self::Vp9 => "libvpx-vp9",
        }
    }

    /// Container the encoded stream is muxed into.
    pub fn container(self) -> ContainerKind {
        match self {
            Self::H264 | Self::H265 => ContainerKind::Mp4,
            Self::Vp9 => ContainerKind::WebM,
        }
    }
}

/// Audio codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCodec {
    #[default]
    Aac,
    Opus,
}

impl AudioCodec {
    /// FFmpeg encoder name.
    pub fn ffmpeg_encoder(self) -> &'static str {
        match self {
            Self::Aac => "aac",
            Self::Opus => "libopus",
        }
    }
}

/// How a trimmed clip is re-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeSettings {
    pub video_codec: VideoCodec,
    pub audio_codec: AudioCodec,
    /// Audio bitrate in kbps.
    pub audio_bitrate: u32,
    /// CRF value (lower = better). Encoder default when unset.
    pub crf: Option<u32>,
    /// Move the MP4 index to the front for progressive playback.
    pub faststart: bool,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            video_codec: VideoCodec::H264,
            audio_codec: AudioCodec::Aac,
            audio_bitrate: 192,
            crf: None,
            faststart: true,
        }
    }
}

impl EncodeSettings {
    /// Container of the encoded output.
    pub fn container(&self) -> ContainerKind {
        self.video_codec.container()
    }

    /// Encoder arguments placed between the input and the output path.
    pub fn output_args(&self, speed: f64) -> Vec<String> {
        let mut args = vec![
            "-vf".to_string(),
            video_speed_filter(speed),
            "-af".to_string(),
            atempo_chain(speed),
            "-c:v".to_string(),
            self.video_codec.ffmpeg_encoder().to_string(),
        ];
        if let Some(crf) = self.crf {
            args.extend(["-crf".to_string(), crf.to_string()]);
        }
        if self.video_codec == VideoCodec::Vp9 {
            // Constant-quality mode for libvpx.
            args.extend(["-b:v".to_string(), "0".to_string()]);
        }
        args.extend([
            "-c:a".to_string(),
            self.audio_codec.ffmpeg_encoder().to_string(),
            "-b:a".to_string(),
            format!("{}k", self.audio_bitrate),
        ]);
        if self.faststart && self.container() == ContainerKind::Mp4 {
            args.extend(["-movflags".to_string(), "+faststart".to_string()]);
        }
        args
    }
}

/// Input seek arguments for a trim range: `-ss <start> -t <length>`.
pub fn seek_args(range: TrimRange) -> [String; 4] {
    [
        "-ss".to_string(),
        format!("{:.3}", range.start),
        "-t".to_string(),
        format!("{:.3}", range.duration()),
    ]
}

/// `setpts` filter retiming video by `speed`.
pub fn video_speed_filter(speed: f64) -> String {
    format!("setpts=PTS/{}", fmt_factor(speed))
}

/// `atempo` filter chain retiming audio by `speed`.
///
/// A single stage accepts factors in `[0.5, 2.0]`; larger changes are split
/// into several stages whose product is `speed`.
pub fn atempo_chain(speed: f64) -> String {
    if !speed.is_finite() || speed <= 0.0 {
        return "atempo=1".to_string();
    }
    let mut stages = Vec::new();
    let mut remaining = speed;
    while remaining > ATEMPO_MAX {
        stages.push(ATEMPO_MAX);
        remaining /= ATEMPO_MAX;
    }
    while remaining < ATEMPO_MIN {
        stages.push(ATEMPO_MIN);
        remaining /= ATEMPO_MIN;
    }
    stages.push(remaining);
    stages
        .iter()
        .map(|s| format!("atempo={}", fmt_factor(*s)))
        .collect::<Vec<_>>()
        .join(",")
}

fn fmt_factor(v: f64) -> String {
    let s = format!("{v:.6}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    s.to_string()
}

/// Expected length of the encoded output in seconds.
pub fn output_duration(range: TrimRange, speed: f64) -> f64 {
    if speed > 0.0 {
        range.duration() / speed
    } else {
        range.duration()
    }
}
