//! Playback surface abstraction and its bridge into the session.
//!
//! The surface is the video element (or any decoder/player) rendering the
//! playable handle. It raises notifications; the bridge mirrors them into the
//! session and writes seeks and rate changes back.

use tracing::{debug, warn};
use trimline_core::Result;
use trimline_session::TrimSession;

/// A media decode/playback surface.
pub trait PlaybackSurface {
    /// Total length in seconds, `0` or non-finite until metadata is loaded.
    fn duration(&self) -> f64;

    fn current_time(&self) -> f64;

    fn set_current_time(&mut self, t: f64);

    fn set_playback_rate(&mut self, rate: f64);

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);
}

/// Lifecycle notifications raised by a playback surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackNotification {
    LoadedMetadata,
    TimeUpdate,
    Play,
    Pause,
}

/// Glue between a [`PlaybackSurface`] and a [`TrimSession`].
pub struct PlaybackBridge;

impl PlaybackBridge {
    /// Mirror a surface notification into the session.
    pub fn notify(
        notification: PlaybackNotification,
        session: &mut TrimSession,
        surface: &mut dyn PlaybackSurface,
    ) {
        match notification {
            PlaybackNotification::LoadedMetadata => session.set_duration(surface.duration()),
            PlaybackNotification::TimeUpdate => {
                let t = surface.current_time();
                session.set_position(t);
                // Loop playback inside the trim range.
                if session.trim_end() > 0.0 && t >= session.trim_end() {
                    surface.set_current_time(session.trim_start());
                }
            }
            PlaybackNotification::Play => session.set_playing(true),
            PlaybackNotification::Pause => session.set_playing(false),
        }
    }

    /// Toggle playback. Playing from outside the trim range restarts at the trim start.
    pub fn toggle_play_pause(
        session: &mut TrimSession,
        surface: &mut dyn PlaybackSurface,
    ) -> Result<()> {
        if session.playable_handle().is_none() {
            debug!("Nothing loaded to play");
            return Ok(());
        }
        if session.is_playing() {
            surface.pause();
            session.set_playing(false);
            return Ok(());
        }

        let t = surface.current_time();
        if t >= session.trim_end() || t < session.trim_start() {
            surface.set_current_time(session.trim_start());
        }
        if let Err(err) = surface.play() {
            warn!(%err, "Playback failed to start");
            return Err(err);
        }
        session.set_playing(true);
        Ok(())
    }

    /// Change speed on both the session and the surface.
    pub fn change_speed(session: &mut TrimSession, surface: &mut dyn PlaybackSurface, speed: f64) {
        session.set_speed(speed);
        if session.speed() == speed {
            surface.set_playback_rate(speed);
        }
    }

    /// Reset the trim range and speed, rewinding and pausing the surface.
    pub fn reset_trim(session: &mut TrimSession, surface: &mut dyn PlaybackSurface) {
        session.reset_trim();
        surface.set_current_time(0.0);
        surface.set_playback_rate(1.0);
        surface.pause();
        session.set_playing(false);
    }

    /// Drop the loaded media and return the surface to its initial state.
    pub fn clear_upload(session: &mut TrimSession, surface: &mut dyn PlaybackSurface) {
        session.clear_upload();
        Self::reset_trim(session, surface);
    }
}

/// A playback surface without any output.
///
/// Holds the playhead, rate and playing flag in memory. Used by the
/// command-line front end, where nothing is rendered, and by tests.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessSurface {
    duration: f64,
    current_time: f64,
    rate: f64,
    playing: bool,
}

impl HeadlessSurface {
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            current_time: 0.0,
            rate: 1.0,
            playing: false,
        }
    }

    pub fn playback_rate(&self) -> f64 {
        self.rate
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Advance the playhead as if `seconds` of wall time passed while playing.
    pub fn advance(&mut self, seconds: f64) {
        if self.playing {
            self.current_time = (self.current_time + seconds * self.rate).min(self.duration);
        }
    }
}

impl PlaybackSurface for HeadlessSurface {
    fn duration(&self) -> f64 {
        self.duration
    }

    fn current_time(&self) -> f64 {
        self.current_time
    }

    fn set_current_time(&mut self, t: f64) {
        self.current_time = t.clamp(0.0, self.duration.max(0.0));
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.rate = rate;
    }

    fn play(&mut self) -> Result<()> {
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.playing = false;
    }
}
