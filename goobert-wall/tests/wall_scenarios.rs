//! End-to-end wall scenarios on simulated engines
//!
//! Time is paused so watch-time arithmetic is exact.

mod helpers;

use goobert_common::db::{GridEventKind, SinkOp};
use goobert_common::{CellId, FullscreenMode, WallEvent};
use goobert_wall::cell::Placement;
use goobert_wall::{Action, CellCommand};
use helpers::*;
use std::time::Duration;
use tokio::time::{advance, Instant};

#[tokio::test(start_paused = true)]
async fn test_loop_aware_next_on_2x2() {
    let mut t = TestWall::new(&quiet_config());
    t.wall.start_grid(grid_request(2, 2), media_files(6)).unwrap();
    t.settle();

    let looping = CellId::new(0, 1);
    t.wall.handle_cell_command(looping, CellCommand::Select);
    t.wall.handle_action(Action::ToggleLoop);
    t.settle();

    let before: Vec<Option<String>> = (0..4).map(|i| t.current_file(i / 2, i % 2)).collect();
    t.wall.handle_action(Action::NextAll);
    t.settle();

    for i in 0..4 {
        let (row, col) = (i / 2, i % 2);
        let after = t.current_file(row, col);
        if CellId::new(row, col) == looping {
            assert_eq!(after, before[i], "looping cell must keep its file");
        } else {
            assert_ne!(after, before[i], "cell ({},{}) should have advanced", row, col);
        }
    }
    let loop_events = t
        .take_events()
        .into_iter()
        .filter(|e| matches!(e, WallEvent::CellLoopChanged { looping: true, .. }))
        .count();
    assert_eq!(loop_events, 1);
}

#[tokio::test(start_paused = true)]
async fn test_ten_seconds_with_two_paused_records_8000ms() {
    let mut t = TestWall::new(&quiet_config());
    t.wall.start_grid(grid_request(1, 1), media_files(1)).unwrap();
    t.settle();
    let cell = CellId::new(0, 0);

    advance(Duration::from_secs(3)).await;
    t.wall.handle_cell_command(cell, CellCommand::TogglePause);
    t.settle();
    advance(Duration::from_secs(2)).await;
    t.wall.handle_cell_command(cell, CellCommand::TogglePause);
    t.settle();
    advance(Duration::from_secs(5)).await;

    assert_eq!(t.wall.stop_grid(), 1);
    let ops = t.take_ops();
    assert_eq!(watch_deltas(&ops), vec![8000]);
    let session = ops
        .iter()
        .find_map(|op| match op {
            SinkOp::AppendSession(record) => Some(record.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(session.duration_ms, 8000);
    assert_eq!((session.cell_row, session.cell_col), (0, 0));
    assert_eq!((session.ended_at - session.started_at).num_milliseconds(), 10_000);
}

#[tokio::test(start_paused = true)]
async fn test_next_on_paused_cell_records_no_watch_time() {
    let mut t = TestWall::new(&quiet_config());
    t.wall.start_grid(grid_request(1, 1), media_files(2)).unwrap();
    t.settle();
    let cell = CellId::new(0, 0);

    t.wall.handle_action(Action::PauseAll);
    t.settle();
    let before = t.current_file(0, 0);
    t.wall.handle_cell_command(cell, CellCommand::Next);
    t.settle();
    assert_ne!(t.current_file(0, 0), before);
    advance(Duration::from_secs(10)).await;
    t.wall.stop_grid();

    let ops = t.take_ops();
    assert!(watch_deltas(&ops).is_empty(), "recorded {:?}", watch_deltas(&ops));
    assert_eq!(session_count(&ops), 0);
}

#[tokio::test(start_paused = true)]
async fn test_next_all_during_tile_counts_only_visible_cell() {
    let mut t = TestWall::new(&quiet_config());
    t.wall.start_grid(grid_request(1, 2), media_files(3)).unwrap();
    t.settle();
    t.wall.handle_cell_command(CellId::new(0, 0), CellCommand::Select);
    t.wall.handle_action(Action::FullscreenSelected);
    t.settle();

    t.wall.handle_action(Action::NextAll);
    t.settle();
    advance(Duration::from_secs(10)).await;
    t.wall.stop_grid();

    let ops = t.take_ops();
    assert_eq!(watch_deltas(&ops), vec![10_000]);
    let session = ops
        .iter()
        .find_map(|op| match op {
            SinkOp::AppendSession(record) => Some(record.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!((session.cell_row, session.cell_col), (0, 0));
}

#[tokio::test(start_paused = true)]
async fn test_stop_applies_queued_position_to_final_segment() {
    let mut t = TestWall::new(&quiet_config());
    t.wall.start_grid(grid_request(1, 1), media_files(1)).unwrap();
    t.settle();
    t.wall.handle_cell_command(CellId::new(0, 0), CellCommand::Select);
    advance(Duration::from_secs(2)).await;

    // Seek event still queued in the engine when the grid stops
    t.wall.handle_action(Action::SeekForward);
    assert_eq!(t.wall.stop_grid(), 1);

    let positions: Vec<Option<i64>> = t
        .take_ops()
        .iter()
        .filter_map(|op| match op {
            SinkOp::UpsertAggregate(u) if u.watch_delta_ms > 0 => Some(u.last_position_ms),
            _ => None,
        })
        .collect();
    assert_eq!(positions, vec![Some(5000)]);
}

#[tokio::test(start_paused = true)]
async fn test_short_session_is_discarded() {
    let mut t = TestWall::new(&quiet_config());
    t.wall.start_grid(grid_request(1, 1), media_files(2)).unwrap();
    t.settle();

    advance(Duration::from_millis(999)).await;
    t.wall.handle_action(Action::NextAll);
    t.settle();

    let ops = t.take_ops();
    assert!(watch_deltas(&ops).is_empty());
    assert_eq!(session_count(&ops), 0);
    // Both files still count as played
    let plays = ops
        .iter()
        .filter(|op| matches!(op, SinkOp::UpsertAggregate(u) if u.play_count_increment == 1))
        .count();
    assert_eq!(plays, 2);
}

#[tokio::test(start_paused = true)]
async fn test_periodic_flush_never_double_counts() {
    let mut t = TestWall::new(&quiet_config());
    t.wall.start_grid(grid_request(1, 1), media_files(1)).unwrap();
    t.settle();

    advance(Duration::from_secs(10)).await;
    assert_eq!(t.wall.flush_tick(), 1);
    advance(Duration::from_millis(500)).await;
    // Below the minimum: nothing written, time keeps accumulating
    assert_eq!(t.wall.flush_tick(), 0);
    advance(Duration::from_millis(3500)).await;
    t.wall.stop_grid();

    let ops = t.take_ops();
    assert_eq!(watch_deltas(&ops), vec![10_000, 4000]);
    assert_eq!(session_count(&ops), 2);
}

#[tokio::test(start_paused = true)]
async fn test_tile_fullscreen_on_3x3_and_restore() {
    let mut t = TestWall::new(&quiet_config());
    t.wall.start_grid(grid_request(3, 3), media_files(4)).unwrap();
    t.settle();
    let target = CellId::new(1, 1);
    t.wall.handle_cell_command(target, CellCommand::Select);
    t.take_events();

    t.wall.handle_action(Action::FullscreenSelected);
    t.settle();
    assert_eq!(t.wall.fullscreen_mode(), FullscreenMode::Tile { cell: target });

    let snapshot = t.wall.snapshot();
    for cell in &snapshot.cells {
        if cell.id == target {
            assert_eq!(cell.placement, Placement { row: 0, col: 0, row_span: 3, col_span: 3 });
            assert!(cell.overlay_enabled && !cell.hidden && !cell.muted);
            assert!(!cell.state.paused);
        } else {
            assert!(cell.hidden && cell.muted && cell.state.paused);
        }
    }

    t.wall.handle_action(Action::FullscreenSelected);
    t.settle();
    assert_eq!(t.wall.fullscreen_mode(), FullscreenMode::Window);
    for cell in &t.wall.snapshot().cells {
        assert_eq!(cell.placement, Placement::single(cell.id));
        assert!(!cell.hidden && !cell.muted && !cell.overlay_enabled);
        assert!(!cell.state.paused);
    }

    t.wall.handle_action(Action::ExitFullscreen);
    assert_eq!(t.wall.fullscreen_mode(), FullscreenMode::Normal);

    let modes: Vec<FullscreenMode> = t
        .take_events()
        .into_iter()
        .filter_map(|e| match e {
            WallEvent::FullscreenChanged { mode, .. } => Some(mode),
            _ => None,
        })
        .collect();
    assert_eq!(
        modes,
        vec![FullscreenMode::Tile { cell: target }, FullscreenMode::Window, FullscreenMode::Normal]
    );
}

#[tokio::test(start_paused = true)]
async fn test_rebuild_flushes_and_releases_before_new_sessions() {
    let mut t = TestWall::new(&quiet_config());
    t.wall.start_grid(grid_request(2, 2), media_files(3)).unwrap();
    t.settle();
    assert_eq!(t.wall.accountant().open_sessions(), 4);
    advance(Duration::from_secs(5)).await;
    t.take_ops();

    t.wall.start_grid(grid_request(2, 2), media_files(3)).unwrap();
    assert_eq!(t.wall.accountant().open_sessions(), 0);
    assert_eq!(t.factory.live_sessions(), 4);
    assert_eq!(t.factory.created_total(), 8);

    let ops = t.take_ops();
    let stop_index = ops
        .iter()
        .position(|op| matches!(op, SinkOp::GridEvent(r) if r.kind == GridEventKind::Stop))
        .unwrap();
    let start_index = ops
        .iter()
        .position(|op| matches!(op, SinkOp::GridEvent(r) if r.kind == GridEventKind::Start))
        .unwrap();
    assert_eq!(session_count(&ops[..stop_index]), 4);
    assert!(stop_index < start_index);
    match &ops[stop_index] {
        SinkOp::GridEvent(record) => assert_eq!(record.sessions_flushed, 4),
        other => panic!("unexpected op {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_shuffle_then_next_is_deferred_and_loop_aware() {
    let mut t = TestWall::new(&quiet_config());
    t.wall.start_grid(grid_request(1, 2), media_files(5)).unwrap();
    t.settle();
    let looping = CellId::new(0, 0);
    t.wall.handle_cell_command(looping, CellCommand::ToggleLoop);
    t.settle();

    t.wall.handle_action(Action::ShuffleThenNextAll);
    assert_eq!(t.wall.snapshot().pending_deferred, 1);

    advance(Duration::from_millis(199)).await;
    assert_eq!(t.wall.run_deferred(Instant::now()), 0);
    advance(Duration::from_millis(1)).await;
    assert_eq!(t.wall.run_deferred(Instant::now()), 1);

    let free = t.factory.handle(CellId::new(0, 1)).unwrap().snapshot().commands;
    assert_eq!(&free[free.len() - 2..], &["shuffle", "next"]);
    let fixed = t.factory.handle(looping).unwrap().snapshot().commands;
    assert_eq!(fixed.last(), Some(&"shuffle"));
}

#[tokio::test(start_paused = true)]
async fn test_stop_clears_deferred_tasks() {
    let mut t = TestWall::new(&quiet_config());
    t.wall.start_grid(grid_request(1, 1), media_files(2)).unwrap();
    t.wall.handle_action(Action::ShuffleThenNextAll);
    t.wall.stop_grid();
    assert_eq!(t.wall.next_deferred_deadline(), None);
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_skips_tiled_out_cells_then_restarts() {
    let mut t = TestWall::new(&quiet_config());
    t.wall.start_grid(grid_request(1, 3), media_files(3)).unwrap();
    t.settle();

    t.wall.handle_cell_command(CellId::new(0, 0), CellCommand::Select);
    t.wall.handle_action(Action::FullscreenSelected);
    let dead = CellId::new(0, 2);
    t.factory.handle(dead).unwrap().go_idle();
    t.settle();
    assert_eq!(t.wall.accountant().session_file(dead), None);

    advance(Duration::from_secs(6)).await;
    assert_eq!(t.wall.watchdog_tick(Instant::now()), 0);

    t.wall.handle_action(Action::FullscreenSelected);
    assert_eq!(t.wall.watchdog_tick(Instant::now()), 1);
    t.settle();
    assert!(t.current_file(0, 2).is_some());
    assert!(t.wall.accountant().session_file(dead).is_some());
    assert_eq!(t.wall.restarts_total(), 1);

    let restart = t
        .take_events()
        .into_iter()
        .find(|e| e.event_type() == "WatchdogRestart");
    assert!(matches!(
        restart,
        Some(WallEvent::WatchdogRestart { cell, playlist_len: 3, restarts_total: 1, .. }) if cell == dead
    ));
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_grace_period() {
    let mut config = quiet_config();
    config.watchdog.grace_ms = 3000;
    let mut t = TestWall::new(&config);
    t.wall.start_grid(grid_request(1, 1), media_files(2)).unwrap();
    t.settle();
    t.factory.handle(CellId::new(0, 0)).unwrap().go_idle();
    t.settle();

    advance(Duration::from_millis(2999)).await;
    assert_eq!(t.wall.watchdog_tick(Instant::now()), 0);
    advance(Duration::from_millis(1)).await;
    assert_eq!(t.wall.watchdog_tick(Instant::now()), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rename_retargets_sessions_and_playlists() {
    let mut t = TestWall::new(&quiet_config());
    let files = vec!["/media/old.mp4".to_string()];
    t.wall.start_grid(grid_request(1, 2), files).unwrap();
    t.settle();
    advance(Duration::from_secs(4)).await;

    assert_eq!(t.wall.apply_rename("/media/old.mp4", "/media/new.mp4"), 2);
    advance(Duration::from_secs(2)).await;
    t.wall.stop_grid();

    let ops = t.take_ops();
    let repoint = ops.iter().position(|op| matches!(op, SinkOp::Repoint { .. })).unwrap();
    // Time accrued before and after the rename lands on the new path
    for op in &ops[repoint..] {
        if let SinkOp::UpsertAggregate(update) = op {
            assert_eq!(update.file_path, "/media/new.mp4");
            assert_eq!(update.watch_delta_ms, 6000);
        }
    }
    assert_eq!(watch_deltas(&ops), vec![6000, 6000]);
}

#[tokio::test(start_paused = true)]
async fn test_volume_actions_broadcast() {
    let mut t = TestWall::new(&quiet_config());
    t.wall.start_grid(grid_request(1, 1), media_files(1)).unwrap();
    t.take_events();

    t.wall.handle_action(Action::VolumeUp);
    t.wall.set_volume(80);
    let volumes: Vec<u8> = t
        .take_events()
        .into_iter()
        .filter_map(|e| match e {
            WallEvent::VolumeChanged { volume } => Some(volume),
            _ => None,
        })
        .collect();
    assert_eq!(volumes, vec![35, 80]);
    assert_eq!(t.factory.handle(CellId::new(0, 0)).unwrap().snapshot().volume, 80);
}
