//! Integration tests for timeline interaction and playback.
//!
//! Exercises the controller and playback bridge against a shared session,
//! then checks what an export would be asked to encode.

use trimline_core::{Rect, TrimRange, Vec2};
use trimline_media::ExportOutcome;
use trimline_session::TrimSession;
use trimline_ui::{
    DragState, HeadlessSurface, PlaybackBridge, PlaybackNotification, PlaybackSurface,
    PointerEvent, Propagation, TimelineController, TouchPhase,
};

use crate::fakes::{media, wait_until, Rig, Script};

// ── Helpers ────────────────────────────────────────────────────

fn controller() -> TimelineController {
    let mut controller = TimelineController::new();
    controller.set_track_bounds(Some(Rect::new(100.0, 50.0, 200.0, 30.0)));
    controller
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

// ── Dragging ───────────────────────────────────────────────────

#[tokio::test]
async fn drag_start_past_duration_then_export() {
    let rig = Rig::new(Script::Succeed);
    let mut surface = HeadlessSurface::new(10.0);
    let mut ui = controller();

    {
        let mut session = rig.session.lock();
        let grab = ui.handle_event(PointerEvent::Down(Vec2::new(100.0, 60.0)), &mut session, &mut surface);
        assert_eq!(grab, Propagation::Stop);
        assert_eq!(ui.state(), DragState::DraggingStart);

        // x = 340 maps to 12s on a 10s clip.
        ui.handle_event(PointerEvent::Move(Vec2::new(340.0, 60.0)), &mut session, &mut surface);
        ui.handle_event(PointerEvent::Up, &mut session, &mut surface);

        assert!(close(session.trim_start(), 9.9));
        assert_eq!(session.trim_end(), 10.0);
        assert!(close(surface.current_time(), 9.9));
        assert!(close(session.trim_duration(), 0.1));
    }

    assert!(matches!(
        rig.orchestrator.run_export().await,
        ExportOutcome::Completed { .. }
    ));
    let (range, speed) = rig.stats.last_request.lock().unwrap();
    assert!(close(range.start, 9.9));
    assert_eq!(range.end, 10.0);
    assert_eq!(speed, 1.0);
}

#[test]
fn touch_drag_of_end_handle_continues_off_track() {
    let mut session = TrimSession::new();
    session.load_media(media("walk.mp4"));
    session.set_duration(20.0);
    let mut surface = HeadlessSurface::new(20.0);
    let mut ui = controller();

    let down = PointerEvent::from_touch(TouchPhase::Start, &[Vec2::new(299.0, 70.0)]).unwrap();
    assert_eq!(ui.handle_event(down, &mut session, &mut surface), Propagation::Stop);
    assert_eq!(ui.state(), DragState::DraggingEnd);

    // Far below the track: only x matters while dragging.
    let moved = PointerEvent::from_touch(TouchPhase::Move, &[Vec2::new(150.0, 400.0)]).unwrap();
    ui.handle_event(moved, &mut session, &mut surface);
    assert_eq!(session.trim_end(), 5.0);
    // Dragging the end handle does not scrub the preview.
    assert_eq!(surface.current_time(), 0.0);

    let up = PointerEvent::from_touch(TouchPhase::End, &[]).unwrap();
    ui.handle_event(up, &mut session, &mut surface);
    assert_eq!(ui.state(), DragState::Idle);
    assert_eq!(session.trim(), TrimRange::new(0.0, 5.0));
}

#[test]
fn unmounted_track_ignores_moves() {
    let mut session = TrimSession::new();
    session.load_media(media("a.mp4"));
    session.set_duration(10.0);
    let mut surface = HeadlessSurface::new(10.0);
    let mut ui = controller();

    ui.handle_event(PointerEvent::Down(Vec2::new(100.0, 60.0)), &mut session, &mut surface);
    ui.set_track_bounds(None);
    ui.handle_event(PointerEvent::Move(Vec2::new(200.0, 60.0)), &mut session, &mut surface);
    assert_eq!(session.trim_start(), 0.0);

    ui.handle_event(PointerEvent::Cancel, &mut session, &mut surface);
    assert!(!ui.is_dragging());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn drag_during_export_does_not_change_request() {
    let rig = Rig::new(Script::Cooperative);
    let mut surface = HeadlessSurface::new(10.0);
    let mut ui = controller();

    let run = rig.spawn_export();
    wait_until("engine call", || rig.stats.calls() == 1).await;

    {
        let mut session = rig.session.lock();
        ui.handle_event(PointerEvent::Down(Vec2::new(100.0, 60.0)), &mut session, &mut surface);
        ui.handle_event(PointerEvent::Move(Vec2::new(200.0, 60.0)), &mut session, &mut surface);
        ui.handle_event(PointerEvent::Up, &mut session, &mut surface);
        assert_eq!(session.trim_start(), 5.0);
        assert!(session.export_state().is_exporting());
    }

    rig.open_gate();
    assert!(matches!(run.await.unwrap(), ExportOutcome::Completed { .. }));
    let (range, _) = rig.stats.last_request.lock().unwrap();
    assert_eq!(range, TrimRange::new(0.0, 10.0));
}

// ── Playback ───────────────────────────────────────────────────

#[test]
fn playback_loops_inside_trim_range() {
    let mut session = TrimSession::new();
    session.load_media(media("loop.mp4"));
    let mut surface = HeadlessSurface::new(8.0);
    PlaybackBridge::notify(PlaybackNotification::LoadedMetadata, &mut session, &mut surface);
    session.set_trim_start(2.0);
    session.set_trim_end(4.0);

    PlaybackBridge::toggle_play_pause(&mut session, &mut surface).unwrap();
    assert_eq!(surface.current_time(), 2.0);

    for _ in 0..10 {
        surface.advance(0.25);
        PlaybackBridge::notify(PlaybackNotification::TimeUpdate, &mut session, &mut surface);
        assert!(surface.current_time() < 4.0);
        assert!(surface.current_time() >= 2.0);
    }
}

#[test]
fn track_click_seeks_and_reset_rewinds() {
    let mut session = TrimSession::new();
    session.load_media(media("seek.mp4"));
    let mut surface = HeadlessSurface::new(10.0);
    PlaybackBridge::notify(PlaybackNotification::LoadedMetadata, &mut session, &mut surface);
    let mut ui = controller();

    let prop = ui.handle_event(PointerEvent::Down(Vec2::new(250.0, 60.0)), &mut session, &mut surface);
    assert_eq!(prop, Propagation::Continue);
    assert_eq!(surface.current_time(), 7.5);
    assert_eq!(session.position(), 7.5);

    PlaybackBridge::change_speed(&mut session, &mut surface, 2.0);
    PlaybackBridge::reset_trim(&mut session, &mut surface);
    assert_eq!(surface.current_time(), 0.0);
    assert_eq!(surface.playback_rate(), 1.0);
    assert_eq!(session.speed(), 1.0);
}
