//! Trim handle interaction for the timeline track.
//!
//! The track is a rectangle mapped linearly onto `[0, duration]`. Two handles
//! sit at the trim start and trim end. Pressing a handle starts a drag;
//! every move while dragging maps the pointer x to a time and applies it to
//! the session. Release, cancel and touch-end always end the drag, wherever
//! they happen, and commit the last applied value.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use trimline_core::{Rect, Vec2};
use trimline_session::TrimSession;

use crate::playback::PlaybackSurface;

/// Default width of the grab area around each handle, in pixels.
pub const HANDLE_HIT_WIDTH: f32 = 12.0;

/// Which trim point a handle controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrimEdge {
    Start,
    End,
}

/// Drag state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DragState {
    #[default]
    Idle,
    DraggingStart,
    DraggingEnd,
}

impl DragState {
    /// The edge being dragged, if any.
    pub fn edge(self) -> Option<TrimEdge> {
        match self {
            Self::Idle => None,
            Self::DraggingStart => Some(TrimEdge::Start),
            Self::DraggingEnd => Some(TrimEdge::End),
        }
    }

    fn dragging(edge: TrimEdge) -> Self {
        match edge {
            TrimEdge::Start => Self::DraggingStart,
            TrimEdge::End => Self::DraggingEnd,
        }
    }
}

/// Mouse and touch input unified into one signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down(Vec2),
    Move(Vec2),
    Up,
    Cancel,
}

/// Phase of a raw touch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPhase {
    Start,
    Move,
    End,
    Cancel,
}

impl PointerEvent {
    /// Convert a touch event, tracking the first active touch.
    ///
    /// Start and move events without any touch point carry no position and
    /// yield `None`.
    pub fn from_touch(phase: TouchPhase, touches: &[Vec2]) -> Option<Self> {
        match phase {
            TouchPhase::Start => touches.first().map(|p| Self::Down(*p)),
            TouchPhase::Move => touches.first().map(|p| Self::Move(*p)),
            TouchPhase::End => Some(Self::Up),
            TouchPhase::Cancel => Some(Self::Cancel),
        }
    }
}

/// Whether an event should continue to other handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    Continue,
    Stop,
}

/// What a press on the track did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PressOutcome {
    /// A handle was grabbed. The press is contained and does not seek.
    Grabbed(TrimEdge),
    /// The track body was clicked and playback seeked to this time.
    Seek(f64),
    /// The press missed the track, or the track is not measurable.
    Ignored,
}

/// Hit test a position against the trim handles of a track.
///
/// Returns the closest handle whose grab area contains `pos`.
pub fn hit_test_trim_handle(
    track: Rect,
    start_x: f32,
    end_x: f32,
    pos: Vec2,
    handle_width: f32,
) -> Option<TrimEdge> {
    let half = handle_width * 0.5;
    if pos.y < track.y || pos.y >= track.y + track.height {
        return None;
    }

    let start_dist = (pos.x - start_x).abs();
    let end_dist = (pos.x - end_x).abs();
    match (start_dist <= half, end_dist <= half) {
        (true, true) if end_dist < start_dist => Some(TrimEdge::End),
        (true, _) => Some(TrimEdge::Start),
        (false, true) => Some(TrimEdge::End),
        (false, false) => None,
    }
}

/// Maps pointer input over the timeline track onto the session's trim range.
#[derive(Debug, Clone)]
pub struct TimelineController {
    state: DragState,
    track: Option<Rect>,
    handle_width: f32,
}

impl TimelineController {
    pub fn new() -> Self {
        Self {
            state: DragState::Idle,
            track: None,
            handle_width: HANDLE_HIT_WIDTH,
        }
    }

    /// Override the handle grab width.
    pub fn with_handle_width(mut self, width: f32) -> Self {
        self.handle_width = width;
        self
    }

    /// Update the track bounds. `None` means the track is not mounted.
    pub fn set_track_bounds(&mut self, track: Option<Rect>) {
        self.track = track;
    }

    pub fn track_bounds(&self) -> Option<Rect> {
        self.track
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_dragging(&self) -> bool {
        self.state != DragState::Idle
    }

    /// Map a pointer x to a time in `[0, duration]`.
    ///
    /// Returns `None` when the track is unmounted or has no usable width.
    pub fn time_at(&self, x: f32, duration: f64) -> Option<f64> {
        let fraction = self.track?.fraction_x(x)?;
        Some(f64::from(fraction) * duration)
    }

    /// Screen x of a handle for the session's current trim range.
    pub fn handle_x(&self, edge: TrimEdge, session: &TrimSession) -> Option<f32> {
        let track = self.track.filter(|t| t.is_measurable())?;
        let duration = session.duration();
        if duration <= 0.0 {
            return Some(track.left());
        }
        let t = match edge {
            TrimEdge::Start => session.trim_start(),
            TrimEdge::End => session.trim_end(),
        };
        Some(track.x_at_fraction((t / duration) as f32))
    }

    /// Start dragging a handle the front end already hit-tested.
    pub fn begin_drag(&mut self, edge: TrimEdge) -> Propagation {
        debug!(?edge, "Trim drag started");
        self.state = DragState::dragging(edge);
        Propagation::Stop
    }

    /// Handle a press on the track.
    ///
    /// Handle presses start a drag and are contained. Other presses on the
    /// track seek the playback surface.
    pub fn press(
        &mut self,
        pos: Vec2,
        session: &mut TrimSession,
        surface: &mut dyn PlaybackSurface,
    ) -> PressOutcome {
        let Some(track) = self.track.filter(|t| t.is_measurable()) else {
            return PressOutcome::Ignored;
        };

        if let (Some(start_x), Some(end_x)) = (
            self.handle_x(TrimEdge::Start, session),
            self.handle_x(TrimEdge::End, session),
        ) {
            if session.duration() > 0.0 {
                if let Some(edge) =
                    hit_test_trim_handle(track, start_x, end_x, pos, self.handle_width)
                {
                    self.begin_drag(edge);
                    return PressOutcome::Grabbed(edge);
                }
            }
        }

        if !track.contains(pos) || session.duration() <= 0.0 {
            return PressOutcome::Ignored;
        }
        match self.time_at(pos.x, session.duration()) {
            Some(time) => {
                surface.set_current_time(time);
                session.set_position(time);
                PressOutcome::Seek(time)
            }
            None => PressOutcome::Ignored,
        }
    }

    /// Apply a pointer move. Returns the time applied, if any.
    pub fn pointer_move(
        &mut self,
        x: f32,
        session: &mut TrimSession,
        surface: &mut dyn PlaybackSurface,
    ) -> Option<f64> {
        let edge = self.state.edge()?;
        let Some(time) = self.time_at(x, session.duration()) else {
            trace!("Track not measurable, ignoring move");
            return None;
        };

        match edge {
            TrimEdge::Start => {
                session.set_trim_start(time);
                surface.set_current_time(session.trim_start());
            }
            TrimEdge::End => session.set_trim_end(time),
        }
        Some(time)
    }

    /// End any drag. The last applied value stays committed.
    pub fn release(&mut self) {
        if self.is_dragging() {
            debug!(state = ?self.state, "Trim drag ended");
        }
        self.state = DragState::Idle;
    }

    /// Dispatch a unified pointer event.
    ///
    /// Intended for document-level listeners so drags continue outside the track.
    pub fn handle_event(
        &mut self,
        event: PointerEvent,
        session: &mut TrimSession,
        surface: &mut dyn PlaybackSurface,
    ) -> Propagation {
        match event {
            PointerEvent::Down(pos) => match self.press(pos, session, surface) {
                PressOutcome::Grabbed(_) => Propagation::Stop,
                PressOutcome::Seek(_) | PressOutcome::Ignored => Propagation::Continue,
            },
            PointerEvent::Move(pos) => {
                if self.pointer_move(pos.x, session, surface).is_some() {
                    Propagation::Stop
                } else {
                    Propagation::Continue
                }
            }
            PointerEvent::Up | PointerEvent::Cancel => {
                let was_dragging = self.is_dragging();
                self.release();
                if was_dragging {
                    Propagation::Stop
                } else {
                    Propagation::Continue
                }
            }
        }
    }
}

impl Default for TimelineController {
    fn default() -> Self {
        Self::new()
    }
}
