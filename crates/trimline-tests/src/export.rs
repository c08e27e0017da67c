//! Integration tests for the export pipeline.
//!
//! Drives the orchestrator against scripted engines and checks what the
//! shared session looks like at each step.

use std::time::Duration;
use trimline_core::error::{EXPORT_FAILED_NOTICE, TrimlineError};
use trimline_core::TrimRange;
use trimline_media::{ExportEvent, ExportOutcome};
use trimline_session::{ExportPhase, ExportState, SessionEvent};

use crate::fakes::{fast_settings, media, wait_until, Rig, Script};

// ── Single flight ──────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_run_while_in_flight_is_skipped() {
    let rig = Rig::new(Script::Cooperative);
    let first = rig.spawn_export();
    wait_until("engine call", || rig.stats.calls() == 1).await;

    assert_eq!(rig.orchestrator.run_export().await, ExportOutcome::Skipped);
    assert!(rig.session.lock().export_state().is_exporting());

    rig.open_gate();
    let outcome = first.await.unwrap();
    assert!(matches!(outcome, ExportOutcome::Completed { .. }));
    assert_eq!(rig.stats.calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_invoke_engine_once() {
    let rig = Rig::new(Script::Succeed);
    let runs: Vec<_> = (0..4).map(|_| rig.spawn_export()).collect();

    let mut completed = 0;
    for run in runs {
        match run.await.unwrap() {
            ExportOutcome::Completed { .. } => completed += 1,
            ExportOutcome::Skipped => {}
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    // Runs that start after the first finished may legitimately export again.
    assert_eq!(rig.stats.calls(), completed);
    assert!(completed >= 1);
}

// ── Success ────────────────────────────────────────────────────

#[tokio::test]
async fn success_completes_then_returns_to_idle() {
    let rig = Rig::new(Script::Succeed);
    let session_events = rig.session.lock().subscribe();
    let export_events = rig.orchestrator.subscribe();

    let handle = match rig.orchestrator.run_export().await {
        ExportOutcome::Completed {
            handle,
            file_name,
            data,
        } => {
            assert_eq!(file_name, "trimmed_beach.mp4");
            assert_eq!(&*data, &[0xAB; 32][..]);
            handle
        }
        other => panic!("unexpected outcome {other:?}"),
    };

    let phases: Vec<_> = session_events
        .try_iter()
        .filter_map(|e| match e {
            SessionEvent::ExportChanged(phase) => Some(phase),
            _ => None,
        })
        .collect();
    assert_eq!(phases.first(), Some(&ExportPhase::Exporting { progress: 0 }));
    assert!(phases.contains(&ExportPhase::Exporting { progress: 60 }));
    assert_eq!(
        &phases[phases.len() - 2..],
        &[ExportPhase::Completed, ExportPhase::Idle]
    );

    let ready = export_events
        .try_iter()
        .find_map(|e| match e {
            ExportEvent::ResultReady { handle, data, .. } => Some((handle, data)),
            _ => None,
        })
        .unwrap();
    assert_eq!(ready.0, handle);
    assert_eq!(&*ready.1, &[0xAB; 32][..]);

    {
        let session = rig.session.lock();
        assert!(session.export_state().is_idle());
        assert_eq!(session.result_handle(), Some(handle));
        assert!(session.resources().is_live(handle));
        assert!(session.can_export());
    }

    let resources = rig.session.lock().resources().clone();
    wait_until("grace release", || !resources.is_live(handle)).await;
    let session = rig.session.lock();
    assert!(session.result_handle().is_none());
    assert!(session.snapshot().result_url.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn completed_outcome_carries_bytes_past_release() {
    let rig = Rig::with_settings(
        Script::Succeed,
        trimline_media::ExportSettings {
            result_grace: Duration::ZERO,
            ..fast_settings()
        },
    );
    let (handle, data) = match rig.orchestrator.run_export().await {
        ExportOutcome::Completed { handle, data, .. } => (handle, data),
        other => panic!("unexpected outcome {other:?}"),
    };

    let resources = rig.session.lock().resources().clone();
    wait_until("immediate release", || !resources.is_live(handle)).await;
    assert_eq!(data.len(), 32);
    assert!(rig.session.lock().result_handle().is_none());
}

#[tokio::test]
async fn export_uses_current_trim_and_speed() {
    let rig = Rig::new(Script::Succeed);
    {
        let mut session = rig.session.lock();
        session.set_trim_start(2.0);
        session.set_trim_end(6.5);
        session.set_speed(1.5);
    }
    rig.orchestrator.run_export().await;
    assert_eq!(
        *rig.stats.last_request.lock(),
        Some((TrimRange::new(2.0, 6.5), 1.5))
    );
}

#[tokio::test]
async fn second_export_replaces_first_result() {
    let rig = Rig::new(Script::Succeed);
    let first = match rig.orchestrator.run_export().await {
        ExportOutcome::Completed { handle, .. } => handle,
        other => panic!("unexpected outcome {other:?}"),
    };
    let second = match rig.orchestrator.run_export().await {
        ExportOutcome::Completed { handle, .. } => handle,
        other => panic!("unexpected outcome {other:?}"),
    };

    let session = rig.session.lock();
    assert!(!session.resources().is_live(first));
    assert!(session.resources().is_live(second));
    assert_eq!(session.result_handle(), Some(second));
}

// ── Cancellation ───────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_with_cooperative_engine() {
    let rig = Rig::new(Script::Cooperative);
    let events = rig.orchestrator.subscribe();
    let run = rig.spawn_export();
    wait_until("progress 40", || rig.session.lock().export_progress() == 40).await;

    assert!(rig.orchestrator.cancel_user_export());
    {
        let session = rig.session.lock();
        assert_eq!(session.export_state(), &ExportState::Idle);
        assert_eq!(session.export_progress(), 0);
    }

    assert_eq!(run.await.unwrap(), ExportOutcome::Cancelled);
    assert!(events.try_iter().any(|e| e == ExportEvent::Cancelled));
    assert_eq!(rig.session.lock().resources().live_count(), 1);

    // The interrupted engine is reset, not replaced.
    wait_until("engine settled", || !rig.orchestrator.is_draining()).await;
    rig.set_script(Script::Succeed);
    assert!(matches!(
        rig.orchestrator.run_export().await,
        ExportOutcome::Completed { .. }
    ));
    assert_eq!(rig.stats.resets(), 1);
    assert_eq!(rig.stats.instances(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn late_completion_after_cancel_is_discarded() {
    let rig = Rig::with_settings(
        Script::Stubborn,
        trimline_media::ExportSettings {
            cancel_grace: Duration::from_secs(5),
            ..fast_settings()
        },
    );
    let run = rig.spawn_export();
    wait_until("progress 40", || rig.session.lock().export_progress() == 40).await;

    rig.orchestrator.cancel_user_export();
    // The engine ignores the token and finishes on its own, reporting 90%.
    rig.open_gate();

    assert_eq!(run.await.unwrap(), ExportOutcome::Cancelled);
    wait_until("engine settled", || !rig.orchestrator.is_draining()).await;
    let session = rig.session.lock();
    assert!(session.export_state().is_idle());
    assert_eq!(session.export_progress(), 0);
    assert!(session.result_handle().is_none());
    assert_eq!(session.resources().live_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stubborn_engine_is_recreated() {
    let rig = Rig::new(Script::Stubborn);
    let run = rig.spawn_export();
    wait_until("engine call", || rig.stats.calls() == 1).await;

    rig.orchestrator.cancel_user_export();
    assert_eq!(run.await.unwrap(), ExportOutcome::Cancelled);
    assert!(rig.session.lock().export_state().is_idle());

    // Unblock the abandoned call only after its grace ran out; the next
    // export must not reuse its engine.
    wait_until("grace expiry", || !rig.orchestrator.is_draining()).await;
    rig.open_gate();
    rig.set_script(Script::Succeed);
    assert!(matches!(
        rig.orchestrator.run_export().await,
        ExportOutcome::Completed { .. }
    ));
    assert_eq!(rig.stats.instances(), 2);
    assert_eq!(rig.stats.resets(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn export_right_after_cancel_is_not_blocked_by_stuck_engine() {
    let rig = Rig::with_settings(
        Script::Stubborn,
        trimline_media::ExportSettings {
            cancel_grace: Duration::from_secs(5),
            ..fast_settings()
        },
    );
    let run = rig.spawn_export();
    wait_until("engine call", || rig.stats.calls() == 1).await;

    assert!(rig.orchestrator.cancel_user_export());
    assert_eq!(run.await.unwrap(), ExportOutcome::Cancelled);
    assert!(rig.orchestrator.is_draining());
    assert!(rig.session.lock().can_export());

    rig.set_script(Script::Succeed);
    assert!(matches!(
        rig.orchestrator.run_export().await,
        ExportOutcome::Completed { .. }
    ));
    assert_eq!(rig.stats.instances(), 2);
    assert_eq!(rig.stats.resets(), 0);

    // The stuck call finishing later leaves the fresh engine alone.
    rig.open_gate();
    wait_until("engine settled", || !rig.orchestrator.is_draining()).await;
    rig.orchestrator.run_export().await;
    assert_eq!(rig.stats.instances(), 2);
    assert_eq!(rig.stats.resets(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn clearing_upload_cancels_export() {
    let rig = Rig::new(Script::Cooperative);
    let run = rig.spawn_export();
    wait_until("engine call", || rig.stats.calls() == 1).await;

    rig.session.lock().clear_upload();
    assert_eq!(run.await.unwrap(), ExportOutcome::Cancelled);

    let session = rig.session.lock();
    assert_eq!(session.resources().live_count(), 0);
    assert!(session.export_state().is_idle());
    assert!(!session.can_export());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn loading_new_media_cancels_export() {
    let rig = Rig::new(Script::Cooperative);
    let run = rig.spawn_export();
    wait_until("engine call", || rig.stats.calls() == 1).await;

    rig.session.lock().load_media(media("other.webm"));
    assert_eq!(run.await.unwrap(), ExportOutcome::Cancelled);

    let session = rig.session.lock();
    assert!(session.result_handle().is_none());
    assert_eq!(session.resources().live_count(), 1);
    assert_eq!(session.source().map(|s| s.name()), Some("other.webm"));
}

// ── Failure ────────────────────────────────────────────────────

#[tokio::test]
async fn failure_reports_generic_notice() {
    let rig = Rig::new(Script::Fail);
    let events = rig.orchestrator.subscribe();

    let outcome = rig.orchestrator.run_export().await;
    assert_eq!(
        outcome,
        ExportOutcome::Failed {
            notice: EXPORT_FAILED_NOTICE.to_string()
        }
    );
    assert!(events.try_iter().any(|e| matches!(
        e,
        ExportEvent::Failed { ref notice } if !notice.contains("moov")
    )));

    {
        let session = rig.session.lock();
        assert!(session.export_state().is_idle());
        assert!(session.result_handle().is_none());
        assert!(session.can_export());
    }

    rig.set_script(Script::Succeed);
    assert!(matches!(
        rig.orchestrator.run_export().await,
        ExportOutcome::Completed { .. }
    ));
    assert_eq!(rig.stats.resets(), 1);
}

#[test]
fn cancellation_is_not_user_facing_failure() {
    let err = TrimlineError::CancellationRequested;
    assert!(err.is_cancellation());
    assert_ne!(err.user_notice(), EXPORT_FAILED_NOTICE);
}
