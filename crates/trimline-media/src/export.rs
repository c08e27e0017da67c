//! Export orchestration.
//!
//! Runs one export at a time against a [`TranscodeEngine`]: takes a
//! cancellation token from the session, drives the engine on the blocking
//! pool, relays progress into the session, and hands the result over as a
//! registered handle. The engine call is raced against the token, so an
//! engine that ignores cancellation cannot hold the session in `Exporting`.

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use trimline_core::{CancelToken, TrimlineError};
use tokio::task::JoinHandle;
use trimline_session::{
    release_result_after, ExportState, HandleId, HandleKind, Observers, SharedSession,
};

use crate::encode::EncodeSettings;
use crate::engine::{EngineFactory, TranscodeEngine, TranscodeRequest};
use crate::error::EngineError;

/// Prefix for suggested output file names.
pub const DEFAULT_OUTPUT_PREFIX: &str = "trimmed_";

/// Suggested file name for an export of `source_name`. The name is kept verbatim.
pub fn output_name(prefix: &str, source_name: &str) -> String {
    format!("{prefix}{source_name}")
}

/// Timing and naming knobs for the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSettings {
    pub output_prefix: String,
    /// How long a delivered result stays live before its handle is released.
    pub result_grace: Duration,
    /// How long a cancelled engine call may take to return before the
    /// engine is discarded and rebuilt.
    pub cancel_grace: Duration,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            result_grace: Duration::from_secs(3),
            cancel_grace: Duration::from_secs(2),
        }
    }
}

/// Notifications for the surrounding UI.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportEvent {
    Started,
    Progress(u8),
    /// Offer the result to the user (for example, trigger a download).
    ResultReady {
        handle: HandleId,
        file_name: String,
        data: Arc<[u8]>,
    },
    Cancelled,
    Failed {
        notice: String,
    },
}

/// How a call to [`ExportOrchestrator::run_export`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    Completed {
        handle: HandleId,
        file_name: String,
        data: Arc<[u8]>,
    },
    Cancelled,
    Failed { notice: String },
    /// Nothing ran: another export was in flight or the session could not export.
    Skipped,
}

/// What must happen to the engine before it is used again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineHealth {
    Ready,
    NeedsReset,
    NeedsRebuild,
}

struct EngineSlot {
    engine: Arc<dyn TranscodeEngine>,
    health: EngineHealth,
}

/// Clears the single-flight flag when a run ends, however it ends.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Sequences exports for one session.
pub struct ExportOrchestrator {
    session: SharedSession,
    factory: EngineFactory,
    slot: Arc<Mutex<EngineSlot>>,
    settings: ExportSettings,
    encode: EncodeSettings,
    in_flight: AtomicBool,
    /// Cancelled engine calls still inside their grace window.
    draining: Arc<AtomicUsize>,
    events: Arc<Mutex<Observers<ExportEvent>>>,
}

impl ExportOrchestrator {
    /// Create an orchestrator whose engine instances come from `factory`.
    pub fn new(session: SharedSession, factory: EngineFactory) -> Self {
        let engine = factory();
        Self {
            session,
            factory,
            slot: Arc::new(Mutex::new(EngineSlot {
                engine,
                health: EngineHealth::Ready,
            })),
            settings: ExportSettings::default(),
            encode: EncodeSettings::default(),
            in_flight: AtomicBool::new(false),
            draining: Arc::new(AtomicUsize::new(0)),
            events: Arc::new(Mutex::new(Observers::new())),
        }
    }

    pub fn with_settings(mut self, settings: ExportSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_encode(mut self, encode: EncodeSettings) -> Self {
        self.encode = encode;
        self
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Subscribe to export notifications.
    pub fn subscribe(&self) -> Receiver<ExportEvent> {
        self.events.lock().subscribe()
    }

    /// Whether a run is currently in progress.
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Whether an abandoned engine call is still within its cancel grace.
    ///
    /// New exports do not wait for it; this only tells whether the engine's
    /// fate (reset or rebuild) is settled yet.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire) > 0
    }

    /// Request cancellation of the running export.
    ///
    /// The session returns to `Idle` immediately; the engine call is
    /// abandoned by the running [`run_export`](Self::run_export).
    pub fn cancel_user_export(&self) -> bool {
        self.session.lock().cancel_export()
    }

    /// Run one export of the session's current trim range and speed.
    pub async fn run_export(&self) -> ExportOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Export already in flight");
            return ExportOutcome::Skipped;
        }
        let _guard = FlightGuard(&self.in_flight);

        let (token, request, file_name) = {
            let mut session = self.session.lock();
            let Some(source) = session.source().cloned() else {
                debug!("No media loaded, nothing to export");
                return ExportOutcome::Skipped;
            };
            let token = match session.begin_export() {
                Ok(token) => token,
                Err(err) => {
                    debug!(%err, "Export not started");
                    return ExportOutcome::Skipped;
                }
            };
            let request =
                TranscodeRequest::new(&source, session.trim(), session.speed(), self.encode.clone());
            let file_name = output_name(&self.settings.output_prefix, source.name());
            (token, request, file_name)
        };
        self.publish(ExportEvent::Started);

        let engine = self.checkout_engine();
        let result = self.drive(engine, request, &token).await;
        let outcome = self.settle(result, &token, file_name);

        // No-op when cancellation already returned the session to Idle.
        self.session.lock().finish_export();
        if let ExportOutcome::Completed { handle, .. } = &outcome {
            release_result_after(&self.session, *handle, self.settings.result_grace);
        }
        outcome
    }

    fn checkout_engine(&self) -> Arc<dyn TranscodeEngine> {
        let mut slot = self.slot.lock();
        match slot.health {
            EngineHealth::Ready => {}
            EngineHealth::NeedsReset => {
                debug!("Resetting transcode engine");
                slot.engine.reset();
            }
            EngineHealth::NeedsRebuild => {
                info!("Recreating transcode engine");
                slot.engine = (self.factory)();
            }
        }
        slot.health = EngineHealth::Ready;
        Arc::clone(&slot.engine)
    }

    fn mark_engine(&self, health: EngineHealth) {
        let mut slot = self.slot.lock();
        // A rebuild request is never downgraded to a reset.
        if slot.health != EngineHealth::NeedsRebuild {
            slot.health = health;
        }
    }

    /// Run the engine on the blocking pool, racing it against cancellation.
    async fn drive(
        &self,
        engine: Arc<dyn TranscodeEngine>,
        request: TranscodeRequest,
        token: &CancelToken,
    ) -> Result<Vec<u8>, EngineError> {
        let on_progress = self.progress_relay(token.clone());
        let cancel = token.clone();
        let running = Arc::clone(&engine);
        let mut task = tokio::task::spawn_blocking(move || {
            running.prepare()?;
            running.transcode(&request, &on_progress, &cancel)
        });

        let finished = tokio::select! {
            joined = &mut task => Some(joined),
            _ = token.cancelled() => None,
        };
        let Some(joined) = finished else {
            self.abandon(task, engine);
            return Err(EngineError::Cancelled);
        };

        match joined {
            Ok(result) => result,
            Err(join_err) => {
                self.mark_engine(EngineHealth::NeedsRebuild);
                Err(EngineError::Process(format!("engine task failed: {join_err}")))
            }
        }
    }

    /// Retire an engine call that lost the race against cancellation.
    ///
    /// The engine is marked for rebuild at once, so the next export starts
    /// without waiting. If the call still returns cleanly within
    /// `cancel_grace` the mark is relaxed to a reset, as long as the slot
    /// still holds that same engine.
    fn abandon(
        &self,
        task: JoinHandle<Result<Vec<u8>, EngineError>>,
        engine: Arc<dyn TranscodeEngine>,
    ) {
        self.mark_engine(EngineHealth::NeedsRebuild);
        let slot = Arc::clone(&self.slot);
        let draining = Arc::clone(&self.draining);
        let grace = self.settings.cancel_grace;
        draining.fetch_add(1, Ordering::AcqRel);

        tokio::spawn(async move {
            match tokio::time::timeout(grace, task).await {
                Ok(Ok(_)) => {
                    let mut slot = slot.lock();
                    let same = Arc::ptr_eq(&slot.engine, &engine);
                    if same && slot.health == EngineHealth::NeedsRebuild {
                        debug!("Engine returned after cancellation");
                        slot.health = EngineHealth::NeedsReset;
                    }
                }
                Ok(Err(join_err)) => warn!(%join_err, "Cancelled engine call panicked"),
                Err(_) => warn!(
                    grace_ms = grace.as_millis() as u64,
                    "Engine ignored cancellation, abandoning it"
                ),
            }
            draining.fetch_sub(1, Ordering::AcqRel);
        });
    }

    /// Progress callback forwarding into the session while this run is current.
    fn progress_relay(&self, token: CancelToken) -> impl Fn(u8) + Send + Sync + 'static {
        let session = Arc::clone(&self.session);
        let events = Arc::clone(&self.events);
        move |pct: u8| {
            if token.is_cancelled() {
                return;
            }
            {
                let mut session = session.lock();
                let current = matches!(
                    session.export_state(),
                    ExportState::Exporting { token: t, .. } if t.same_as(&token)
                );
                if !current {
                    return;
                }
                session.report_progress(u32::from(pct));
            }
            events.lock().publish(ExportEvent::Progress(pct));
        }
    }

    fn settle(
        &self,
        result: Result<Vec<u8>, EngineError>,
        token: &CancelToken,
        file_name: String,
    ) -> ExportOutcome {
        match result {
            Ok(bytes) if token.is_cancelled() => {
                debug!(bytes = bytes.len(), "Discarding result of cancelled export");
                self.mark_engine(EngineHealth::NeedsReset);
                self.cancelled()
            }
            Ok(bytes) => self.deliver(bytes, file_name),
            Err(EngineError::Cancelled) => {
                self.mark_engine(EngineHealth::NeedsReset);
                self.cancelled()
            }
            Err(err) => {
                error!(error = %err, "Export failed");
                self.mark_engine(EngineHealth::NeedsReset);
                let notice = TrimlineError::from(err).user_notice();
                self.publish(ExportEvent::Failed {
                    notice: notice.clone(),
                });
                ExportOutcome::Failed { notice }
            }
        }
    }

    fn deliver(&self, bytes: Vec<u8>, file_name: String) -> ExportOutcome {
        let data: Arc<[u8]> = Arc::from(bytes);
        let mut session = self.session.lock();
        let handle = session.resources().issue(
            HandleKind::ExportResult,
            self.encode.container().mime(),
            Arc::clone(&data),
        );
        if let Err(err) = session.complete_export(handle) {
            // The session moved on (cancelled, reloaded or cleared).
            debug!(%err, "Dropping late export result");
            session.resources().release(handle);
            drop(session);
            return self.cancelled();
        }
        drop(session);

        info!(file = %file_name, bytes = data.len(), "Export ready");
        self.publish(ExportEvent::ResultReady {
            handle,
            file_name: file_name.clone(),
            data: Arc::clone(&data),
        });
        ExportOutcome::Completed {
            handle,
            file_name,
            data,
        }
    }

    fn cancelled(&self) -> ExportOutcome {
        info!("Export cancelled by user");
        self.publish(ExportEvent::Cancelled);
        ExportOutcome::Cancelled
    }

    fn publish(&self, event: ExportEvent) {
        self.events.lock().publish(event);
    }
}

impl std::fmt::Debug for ExportOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportOrchestrator")
            .field("settings", &self.settings)
            .field("encode", &self.encode)
            .field("running", &self.is_running())
            .field("draining", &self.is_draining())
            .finish()
    }
}
