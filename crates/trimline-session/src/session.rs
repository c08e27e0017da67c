//! The trim session: authoritative state for one loaded video.
//!
//! Every mutator is synchronous and leaves the session consistent:
//! `0 <= trim_start < trim_end <= duration` whenever `duration > 0`, and
//! both trim points are zero before the duration is known. Rejected
//! mutations are silent no-ops (logged at debug) and publish nothing.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, trace};
use trimline_core::{CancelToken, Result, SourceMedia, TrimRange, TrimlineError};

use crate::events::{Observers, SessionEvent};
use crate::resources::{HandleId, HandleKind, ResourceManager};

/// A session shared between the controller, the orchestrator and the UI.
pub type SharedSession = Arc<Mutex<TrimSession>>;

/// Release the session's export result `id` after `grace`.
///
/// The handle and the session's reference to it are dropped together, and
/// only if `id` is still the current result when the timer fires. The timer
/// does not keep the session alive. Without a tokio runtime the release
/// happens immediately.
pub fn release_result_after(session: &SharedSession, id: HandleId, grace: Duration) {
    let weak: Weak<Mutex<TrimSession>> = Arc::downgrade(session);
    match tokio::runtime::Handle::try_current() {
        Ok(rt) => {
            debug!(handle = %id, grace_ms = grace.as_millis() as u64, "Scheduled result release");
            rt.spawn(async move {
                tokio::time::sleep(grace).await;
                if let Some(session) = weak.upgrade() {
                    session.lock().release_result(id);
                }
            });
        }
        Err(_) => {
            debug!(handle = %id, "No runtime for timed release, releasing now");
            session.lock().release_result(id);
        }
    }
}

/// Whether a video is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    AwaitingUpload,
    Editing,
}

/// Export state machine.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ExportState {
    #[default]
    Idle,
    Exporting {
        /// Percentage, 0 to 100.
        progress: u8,
        token: CancelToken,
    },
    Completed {
        result: HandleId,
    },
}

impl ExportState {
    /// The observable phase, without the token.
    pub fn phase(&self) -> ExportPhase {
        match self {
            Self::Idle => ExportPhase::Idle,
            Self::Exporting { progress, .. } => ExportPhase::Exporting {
                progress: *progress,
            },
            Self::Completed { .. } => ExportPhase::Completed,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_exporting(&self) -> bool {
        matches!(self, Self::Exporting { .. })
    }
}

/// Export state as seen by presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ExportPhase {
    Idle,
    Exporting { progress: u8 },
    Completed,
}

/// The trim session model.
#[derive(Debug)]
pub struct TrimSession {
    source: Option<SourceMedia>,
    playable: Option<HandleId>,
    duration: f64,
    position: f64,
    trim: TrimRange,
    playing: bool,
    speed: f64,
    export: ExportState,
    result: Option<HandleId>,
    resources: ResourceManager,
    observers: Observers<SessionEvent>,
}

impl TrimSession {
    /// Create an empty session with its own resource registry.
    pub fn new() -> Self {
        Self::with_resources(ResourceManager::new())
    }

    /// Create an empty session that issues handles from `resources`.
    pub fn with_resources(resources: ResourceManager) -> Self {
        Self {
            source: None,
            playable: None,
            duration: 0.0,
            position: 0.0,
            trim: TrimRange::EMPTY,
            playing: false,
            speed: 1.0,
            export: ExportState::Idle,
            result: None,
            resources,
            observers: Observers::new(),
        }
    }

    /// Wrap the session for sharing.
    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    /// Subscribe to change events.
    pub fn subscribe(&mut self) -> crossbeam_channel::Receiver<SessionEvent> {
        self.observers.subscribe()
    }

    // ── Reads ───────────────────────────────────────────────────

    pub fn source(&self) -> Option<&SourceMedia> {
        self.source.as_ref()
    }

    /// Handle the playback surface renders from.
    pub fn playable_handle(&self) -> Option<HandleId> {
        self.playable
    }

    /// Most recent export result, until released.
    pub fn result_handle(&self) -> Option<HandleId> {
        self.result
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn trim(&self) -> TrimRange {
        self.trim
    }

    pub fn trim_start(&self) -> f64 {
        self.trim.start
    }

    pub fn trim_end(&self) -> f64 {
        self.trim.end
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn export_state(&self) -> &ExportState {
        &self.export
    }

    /// Current export percentage, 0 unless exporting.
    pub fn export_progress(&self) -> u8 {
        match self.export {
            ExportState::Exporting { progress, .. } => progress,
            _ => 0,
        }
    }

    pub fn mode(&self) -> Mode {
        if self.source.is_some() {
            Mode::Editing
        } else {
            Mode::AwaitingUpload
        }
    }

    /// Length of the trim range, never negative.
    pub fn trim_duration(&self) -> f64 {
        self.trim.duration()
    }

    /// Whether an export may start right now.
    pub fn can_export(&self) -> bool {
        self.source.is_some()
            && self.export.is_idle()
            && self.trim_duration() > 0.0
            && self.duration > 0.0
    }

    /// Serializable view of the session for presentation layers.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            mode: self.mode(),
            file_name: self.source.as_ref().map(|s| s.name().to_string()),
            playable_url: self.playable.map(HandleId::url),
            duration: self.duration,
            position: self.position,
            trim_start: self.trim.start,
            trim_end: self.trim.end,
            trim_duration: self.trim_duration(),
            playing: self.playing,
            speed: self.speed,
            export: self.export.phase(),
            result_url: self.result.map(HandleId::url),
            can_export: self.can_export(),
        }
    }

    // ── Media ───────────────────────────────────────────────────

    /// Replace the loaded media.
    ///
    /// Releases the previous playable and result handles, issues a fresh
    /// playable handle, and clears duration, position and trim until the
    /// playback surface reports metadata.
    pub fn load_media(&mut self, media: SourceMedia) -> HandleId {
        self.abort_export();
        self.release_handles();

        let playable = self
            .resources
            .issue(HandleKind::Playable, media.kind().mime(), media.data());
        info!(name = media.name(), bytes = media.len(), handle = %playable, "Loaded media");

        let name = media.name().to_string();
        self.source = Some(media);
        self.playable = Some(playable);
        self.duration = 0.0;
        self.position = 0.0;
        self.trim = TrimRange::EMPTY;
        self.playing = false;
        self.observers.publish(SessionEvent::MediaLoaded { name });
        playable
    }

    /// Record the media duration once known, selecting the full range.
    pub fn set_duration(&mut self, duration: f64) {
        if !duration.is_finite() || duration <= 0.0 {
            debug!(duration, "Ignoring invalid duration");
            return;
        }
        if self.source.is_none() {
            debug!("Ignoring duration with no media loaded");
            return;
        }
        self.duration = duration;
        self.trim = TrimRange::full(duration);
        self.position = self.position.clamp(0.0, duration);
        self.observers.publish(SessionEvent::DurationChanged(duration));
        self.observers.publish(SessionEvent::TrimChanged(self.trim));
    }

    /// Record the playback position, clamped to `[0, duration]`.
    pub fn set_position(&mut self, t: f64) {
        if !t.is_finite() || self.source.is_none() {
            return;
        }
        let t = t.clamp(0.0, self.duration);
        if t != self.position {
            trace!(position = t, "Position");
            self.position = t;
            self.observers.publish(SessionEvent::PositionChanged(t));
        }
    }

    // ── Trim ────────────────────────────────────────────────────

    /// Move the trim start, keeping it at least the minimum gap before the end.
    pub fn set_trim_start(&mut self, t: f64) {
        if !self.trim_editable(t) {
            return;
        }
        let next = self.trim.with_start(t, self.duration);
        self.apply_trim(next);
    }

    /// Move the trim end, keeping it at least the minimum gap after the start.
    pub fn set_trim_end(&mut self, t: f64) {
        if !self.trim_editable(t) {
            return;
        }
        let next = self.trim.with_end(t, self.duration);
        self.apply_trim(next);
    }

    fn trim_editable(&self, t: f64) -> bool {
        if !t.is_finite() {
            debug!(t, "Ignoring non-finite trim point");
            return false;
        }
        if self.source.is_none() || self.duration <= 0.0 {
            debug!("Ignoring trim before duration is known");
            return false;
        }
        true
    }

    fn apply_trim(&mut self, next: TrimRange) {
        debug_assert!(next.is_valid_for(self.duration), "{next:?}");
        if next != self.trim {
            trace!(start = next.start, end = next.end, "Trim");
            self.trim = next;
            self.observers.publish(SessionEvent::TrimChanged(next));
        }
    }

    /// Restore the full range and normal speed without touching the media.
    pub fn reset_trim(&mut self) {
        let full = TrimRange::full(self.duration);
        if full != self.trim {
            self.trim = full;
            self.observers.publish(SessionEvent::TrimChanged(full));
        }
        if self.speed != 1.0 {
            self.speed = 1.0;
            self.observers.publish(SessionEvent::SpeedChanged(1.0));
        }
    }

    // ── Playback ────────────────────────────────────────────────

    pub fn set_playing(&mut self, playing: bool) {
        if self.playing != playing {
            self.playing = playing;
            self.observers.publish(SessionEvent::PlayingChanged(playing));
        }
    }

    /// Set the playback and export speed. Non-positive values are ignored.
    pub fn set_speed(&mut self, speed: f64) {
        if !speed.is_finite() || speed <= 0.0 {
            debug!(speed, "Ignoring invalid speed");
            return;
        }
        if self.speed != speed {
            self.speed = speed;
            self.observers.publish(SessionEvent::SpeedChanged(speed));
        }
    }

    /// Discard the loaded media and return to awaiting an upload.
    pub fn clear_upload(&mut self) {
        self.abort_export();
        self.release_handles();

        let had_media = self.source.take().is_some();
        self.duration = 0.0;
        self.position = 0.0;
        self.trim = TrimRange::EMPTY;
        self.playing = false;
        self.speed = 1.0;
        if had_media {
            info!("Cleared upload");
            self.observers.publish(SessionEvent::MediaCleared);
        }
    }

    // ── Export ──────────────────────────────────────────────────

    /// Enter `Exporting` and hand out the token for this run.
    pub fn begin_export(&mut self) -> Result<CancelToken> {
        if !self.can_export() {
            return Err(TrimlineError::InvalidState(format!(
                "cannot export (mode {:?}, export {:?}, trim {:.3}s)",
                self.mode(),
                self.export.phase(),
                self.trim_duration()
            )));
        }
        let token = CancelToken::new();
        self.set_export(ExportState::Exporting {
            progress: 0,
            token: token.clone(),
        });
        info!(token = %token.id(), start = self.trim.start, end = self.trim.end, speed = self.speed, "Export started");
        Ok(token)
    }

    /// Record export progress. Ignored unless exporting.
    pub fn report_progress(&mut self, percent: u32) {
        let ExportState::Exporting { progress, token } = &self.export else {
            return;
        };
        let percent = percent.min(100) as u8;
        if *progress != percent {
            let token = token.clone();
            self.set_export(ExportState::Exporting {
                progress: percent,
                token,
            });
        }
    }

    /// Store a finished result and enter `Completed`.
    ///
    /// Only valid while exporting; a late completion after cancellation is
    /// rejected with `InvalidState` and the caller keeps ownership of `result`.
    pub fn complete_export(&mut self, result: HandleId) -> Result<()> {
        if !self.export.is_exporting() {
            return Err(TrimlineError::InvalidState(format!(
                "no export in flight for result {result}"
            )));
        }
        if let Some(prev) = self.result.replace(result) {
            self.resources.release(prev);
        }
        info!(handle = %result, "Export completed");
        self.set_export(ExportState::Completed { result });
        Ok(())
    }

    /// Cancel the running export. Returns whether one was running.
    pub fn cancel_export(&mut self) -> bool {
        if self.abort_export() {
            info!("Export cancelled");
            true
        } else {
            false
        }
    }

    /// Return to `Idle` after the result has been handed to the user.
    ///
    /// Does not release the result handle. Idempotent.
    pub fn finish_export(&mut self) {
        if !self.export.is_idle() {
            self.set_export(ExportState::Idle);
        }
    }

    /// Release the result handle if the session still holds `id`.
    ///
    /// Returns `false` when the result was already replaced or released,
    /// leaving the current one alone.
    pub fn release_result(&mut self, id: HandleId) -> bool {
        if self.result != Some(id) {
            return false;
        }
        self.result = None;
        self.resources.release(id);
        debug!(handle = %id, "Released export result");
        if matches!(self.export, ExportState::Completed { result } if result == id) {
            self.set_export(ExportState::Idle);
        }
        true
    }

    /// Release every handle the session holds. Called on drop.
    pub fn teardown(&mut self) {
        self.abort_export();
        self.release_handles();
    }

    fn abort_export(&mut self) -> bool {
        if let ExportState::Exporting { token, .. } = &self.export {
            token.cancel();
            self.set_export(ExportState::Idle);
            true
        } else {
            false
        }
    }

    fn release_handles(&mut self) {
        if let Some(result) = self.result.take() {
            self.resources.release(result);
        }
        if let Some(playable) = self.playable.take() {
            self.resources.release(playable);
        }
        if matches!(self.export, ExportState::Completed { .. }) {
            self.set_export(ExportState::Idle);
        }
    }

    fn set_export(&mut self, next: ExportState) {
        let phase = next.phase();
        self.export = next;
        self.observers.publish(SessionEvent::ExportChanged(phase));
    }
}

impl Default for TrimSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TrimSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Read-only view of a session, with derived values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub mode: Mode,
    pub file_name: Option<String>,
    pub playable_url: Option<String>,
    pub duration: f64,
    pub position: f64,
    pub trim_start: f64,
    pub trim_end: f64,
    pub trim_duration: f64,
    pub playing: bool,
    pub speed: f64,
    pub export: ExportPhase,
    pub result_url: Option<String>,
    pub can_export: bool,
}

impl SessionSnapshot {
    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| TrimlineError::Serialization(format!("Failed to serialize session: {e}")))
    }
}
