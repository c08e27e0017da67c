//! Source media accepted for trimming.

use crate::error::{Result, TrimlineError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Video container types the trimmer accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerKind {
    Mp4,
    WebM,
    QuickTime,
}

impl ContainerKind {
    /// Recognise a container from a MIME type such as `video/mp4`.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "video/mp4" => Some(Self::Mp4),
            "video/webm" => Some(Self::WebM),
            "video/quicktime" => Some(Self::QuickTime),
            _ => None,
        }
    }

    /// Recognise a container from a file extension (without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mp4" | "m4v" => Some(Self::Mp4),
            "webm" => Some(Self::WebM),
            "mov" | "qt" => Some(Self::QuickTime),
            _ => None,
        }
    }

    /// MIME type for this container.
    pub fn mime(self) -> &'static str {
        match self {
            Self::Mp4 => "video/mp4",
            Self::WebM => "video/webm",
            Self::QuickTime => "video/quicktime",
        }
    }

    /// Canonical file extension for this container.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::WebM => "webm",
            Self::QuickTime => "mov",
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// A loaded source file: its original name, container, and bytes.
///
/// The bytes are shared, so cloning a `SourceMedia` is cheap.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceMedia {
    name: String,
    kind: ContainerKind,
    data: Arc<[u8]>,
}

impl SourceMedia {
    /// Wrap an in-memory upload, accepting it only if `mime` is a recognised video type.
    pub fn from_upload(name: impl Into<String>, mime: &str, data: impl Into<Arc<[u8]>>) -> Result<Self> {
        let name = name.into();
        let kind = ContainerKind::from_mime(mime).ok_or_else(|| {
            TrimlineError::UnsupportedFormat(format!("{name}: {mime}"))
        })?;
        Ok(Self {
            name,
            kind,
            data: data.into(),
        })
    }

    /// Read a file from disk, recognising the container by extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TrimlineError::NotFound(format!(
                "File not found: {}",
                path.display()
            )));
        }

        let kind = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(ContainerKind::from_extension)
            .ok_or_else(|| TrimlineError::UnsupportedFormat(path.display().to_string()))?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                TrimlineError::InvalidParameter(format!("No file name in {}", path.display()))
            })?;

        let data = std::fs::read(path)?;
        tracing::debug!(path = %path.display(), bytes = data.len(), %kind, "Read source media");

        Ok(Self {
            name,
            kind,
            data: data.into(),
        })
    }

    /// Original file name, extension included.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// Shared handle to the file contents.
    pub fn data(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for SourceMedia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceMedia")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("len", &self.data.len())
            .finish()
    }
}
