//! Scripted transcode engines and shared fixtures.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use trimline_core::{CancelToken, SourceMedia, TrimRange};
use trimline_media::{
    EngineError, EngineFactory, ExportOrchestrator, ExportSettings, ProgressFn, TranscodeEngine,
    TranscodeRequest,
};
use trimline_session::{SharedSession, TrimSession};

/// How a scripted engine behaves inside `transcode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Report progress and return the source bytes.
    Succeed,
    /// Report 40%, then wait for the gate while polling the cancel token.
    Cooperative,
    /// Report 40%, then wait for the gate ignoring cancellation entirely,
    /// then report 90% and return the source bytes.
    Stubborn,
    /// Fail with a process error.
    Fail,
}

/// Counters shared by every engine a factory builds.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub instances: AtomicUsize,
    pub prepares: AtomicUsize,
    pub calls: AtomicUsize,
    pub resets: AtomicUsize,
    pub last_request: Mutex<Option<(TrimRange, f64)>>,
}

impl EngineStats {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn instances(&self) -> usize {
        self.instances.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

pub struct ScriptedEngine {
    script: Arc<Mutex<Script>>,
    stats: Arc<EngineStats>,
    gate: Receiver<()>,
}

impl TranscodeEngine for ScriptedEngine {
    fn prepare(&self) -> Result<(), EngineError> {
        self.stats.prepares.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn transcode(
        &self,
        request: &TranscodeRequest,
        on_progress: ProgressFn<'_>,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>, EngineError> {
        *self.stats.last_request.lock() = Some((request.range, request.speed));
        self.stats.calls.fetch_add(1, Ordering::SeqCst);

        let script = *self.script.lock();
        match script {
            Script::Succeed => {
                on_progress(10);
                on_progress(60);
                on_progress(100);
                Ok(request.source.to_vec())
            }
            Script::Cooperative => {
                on_progress(40);
                loop {
                    if cancel.is_cancelled() {
                        return Err(EngineError::Cancelled);
                    }
                    if self.gate.recv_timeout(Duration::from_millis(5)).is_ok() {
                        break;
                    }
                }
                on_progress(100);
                Ok(request.source.to_vec())
            }
            Script::Stubborn => {
                on_progress(40);
                let _ = self.gate.recv();
                on_progress(90);
                Ok(request.source.to_vec())
            }
            Script::Fail => Err(EngineError::Process("exit status: 1: moov atom not found".into())),
        }
    }

    fn reset(&self) {
        self.stats.resets.fetch_add(1, Ordering::SeqCst);
    }
}

/// A session, an orchestrator over scripted engines, and the levers to drive them.
pub struct Rig {
    pub session: SharedSession,
    pub orchestrator: Arc<ExportOrchestrator>,
    pub stats: Arc<EngineStats>,
    script: Arc<Mutex<Script>>,
    gate: Sender<()>,
}

impl Rig {
    pub fn new(script: Script) -> Self {
        Self::with_settings(script, fast_settings())
    }

    pub fn with_settings(script: Script, settings: ExportSettings) -> Self {
        let session = loaded_session(10.0);
        let stats = Arc::new(EngineStats::default());
        let script = Arc::new(Mutex::new(script));
        let (gate_tx, gate_rx) = unbounded();

        let factory: EngineFactory = {
            let stats = Arc::clone(&stats);
            let script = Arc::clone(&script);
            Box::new(move || {
                stats.instances.fetch_add(1, Ordering::SeqCst);
                Arc::new(ScriptedEngine {
                    script: Arc::clone(&script),
                    stats: Arc::clone(&stats),
                    gate: gate_rx.clone(),
                }) as Arc<dyn TranscodeEngine>
            })
        };
        let orchestrator =
            Arc::new(ExportOrchestrator::new(Arc::clone(&session), factory).with_settings(settings));

        Self {
            session,
            orchestrator,
            stats,
            script,
            gate: gate_tx,
        }
    }

    /// Change the behaviour of every engine, including future instances.
    pub fn set_script(&self, script: Script) {
        *self.script.lock() = script;
    }

    /// Let one blocked (or future) engine call proceed.
    pub fn open_gate(&self) {
        let _ = self.gate.send(());
    }

    /// Start an export on the runtime.
    pub fn spawn_export(&self) -> tokio::task::JoinHandle<trimline_media::ExportOutcome> {
        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move { orchestrator.run_export().await })
    }
}

/// Short timers so cancellation paths finish quickly.
pub fn fast_settings() -> ExportSettings {
    ExportSettings {
        result_grace: Duration::from_millis(100),
        cancel_grace: Duration::from_millis(150),
        ..ExportSettings::default()
    }
}

pub fn media(name: &str) -> SourceMedia {
    SourceMedia::from_upload(name, "video/mp4", vec![0xAB; 32]).unwrap()
}

pub fn loaded_session(duration: f64) -> SharedSession {
    let mut session = TrimSession::new();
    session.load_media(media("beach.mp4"));
    session.set_duration(duration);
    session.into_shared()
}

/// Poll `cond` until it holds, failing the test after a few seconds.
pub async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
