//! Lifetime tracking for transient object handles.
//!
//! The session issues two kinds of handle: the playable-media handle the
//! playback surface renders from, and the export-result handle offered for
//! download. Each is registered here and must be released exactly once.
//! Releasing an unknown or already-released handle is a no-op.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};
use trimline_core::{Result, TrimlineError};
use uuid::Uuid;

/// What a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandleKind {
    /// The loaded source, as rendered by the playback surface.
    Playable,
    /// An encoded export result.
    ExportResult,
}

/// Opaque reference to a registered resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleId(Uuid);

impl HandleId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Externally visible locator for this handle.
    pub fn url(self) -> String {
        format!("blob:trimline/{}", self.0)
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Entry {
    kind: HandleKind,
    mime: &'static str,
    data: Arc<[u8]>,
}

/// Registry of live handles. Clones share the same registry.
#[derive(Clone, Default)]
pub struct ResourceManager {
    entries: Arc<Mutex<HashMap<HandleId, Entry>>>,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `data` and return a fresh handle to it.
    pub fn issue(&self, kind: HandleKind, mime: &'static str, data: Arc<[u8]>) -> HandleId {
        let id = HandleId::new();
        trace!(handle = %id, ?kind, bytes = data.len(), "Issued handle");
        self.entries.lock().insert(id, Entry { kind, mime, data });
        id
    }

    /// Bytes behind a live handle.
    pub fn resolve(&self, id: HandleId) -> Option<Arc<[u8]>> {
        self.entries.lock().get(&id).map(|e| Arc::clone(&e.data))
    }

    /// MIME type recorded for a live handle.
    pub fn mime(&self, id: HandleId) -> Option<&'static str> {
        self.entries.lock().get(&id).map(|e| e.mime)
    }

    pub fn kind(&self, id: HandleId) -> Option<HandleKind> {
        self.entries.lock().get(&id).map(|e| e.kind)
    }

    pub fn is_live(&self, id: HandleId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    /// Number of handles currently registered.
    pub fn live_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Release a handle, reporting a cleanup warning if it was not live.
    pub fn try_release(&self, id: HandleId) -> Result<()> {
        match self.entries.lock().remove(&id) {
            Some(entry) => {
                trace!(handle = %id, kind = ?entry.kind, "Released handle");
                Ok(())
            }
            None => Err(TrimlineError::ResourceCleanup(format!(
                "handle {id} was already released"
            ))),
        }
    }

    /// Release a handle. Double release is logged and otherwise ignored.
    pub fn release(&self, id: HandleId) {
        if let Err(err) = self.try_release(id) {
            debug!(%err, "Ignoring release");
        }
    }
}

impl fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceManager")
            .field("live", &self.live_count())
            .finish()
    }
}
