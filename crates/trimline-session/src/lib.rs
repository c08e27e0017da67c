//! Trimline Session - the trim session model
//!
//! Holds the single source of truth for a loaded video:
//! - Playback mirror (duration, position, playing, speed)
//! - Trim range with its clamping rules
//! - Export state machine (idle, exporting, completed)
//! - Ownership and timed release of playable/result handles
//! - Change notification for presentation layers

pub mod events;
pub mod resources;
pub mod session;

pub use events::{Observers, SessionEvent};
pub use resources::{HandleId, HandleKind, ResourceManager};
pub use session::{
    release_result_after, ExportPhase, ExportState, Mode, SessionSnapshot, SharedSession,
    TrimSession,
};
