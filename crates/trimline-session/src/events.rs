//! Change notification for presentation layers.

use crossbeam_channel::{unbounded, Receiver, Sender};
use trimline_core::TrimRange;

use crate::session::ExportPhase;

/// A change to the trim session. One event per effective mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    MediaLoaded { name: String },
    MediaCleared,
    DurationChanged(f64),
    PositionChanged(f64),
    TrimChanged(TrimRange),
    PlayingChanged(bool),
    SpeedChanged(f64),
    ExportChanged(ExportPhase),
}

/// Fan-out list of channel subscribers.
///
/// Subscribers whose receiver has been dropped are pruned on the next publish.
#[derive(Debug)]
pub struct Observers<T> {
    senders: Vec<Sender<T>>,
}

impl<T: Clone> Observers<T> {
    pub fn new() -> Self {
        Self {
            senders: Vec::new(),
        }
    }

    /// Register a new subscriber.
    pub fn subscribe(&mut self) -> Receiver<T> {
        let (tx, rx) = unbounded();
        self.senders.push(tx);
        rx
    }

    /// Send `event` to every live subscriber.
    pub fn publish(&mut self, event: T) {
        self.senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of live subscribers as of the last publish.
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

impl<T: Clone> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}
