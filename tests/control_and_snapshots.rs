// Abort / pause handling, state snapshots and dry runs.

mod common;

use common::{handler, reservoir_volume, well_volume};
use pipetlab::drivers::DriverCommand;
use pipetlab::{GridPos, LabError};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_abort_homes_and_surfaces_aborted() {
    let mut h = handler(false);
    h.control().request_abort();
    let err = h.move_xy(120.0, 40.0).unwrap_err();
    assert!(matches!(err, LabError::Aborted));
    assert_eq!(
        h.driver().commands(),
        &[DriverCommand::MoveZ { z: 0.0 }, DriverCommand::MoveXy { x: 0.0, y: 0.0 }]
    );
    // The request is consumed; the next command runs normally.
    h.move_xy(120.0, 40.0).unwrap();
    assert_eq!(h.driver().commands().last(), Some(&DriverCommand::MoveXy { x: 120.0, y: 40.0 }));
}

#[test]
fn test_abort_mid_transfer_keeps_completed_steps() {
    let mut h = handler(false);
    h.pick_tips("tips", None).unwrap();
    h.suck("res", GridPos::new(0, 0), 100.0).unwrap();
    h.control().request_abort();
    assert!(matches!(h.spit("plate", GridPos::new(0, 0), 100.0), Err(LabError::Aborted)));
    // Aspirated liquid stays in the tip; nothing reached the well.
    assert!((h.tips().total_volume() - 100.0).abs() < 1e-6);
    assert_eq!(well_volume(&h, "plate", 0, 0), 0.0);
}

#[test]
fn test_pause_blocks_until_resumed() {
    let mut h = handler(false);
    let control = h.control();
    control.pause();
    let resumer = {
        let control = control.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            control.resume();
        })
    };
    let started = Instant::now();
    h.move_xy(10.0, 10.0).unwrap();
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(!control.is_paused());
    resumer.join().unwrap();
}

#[test]
fn test_abort_while_paused() {
    let mut h = handler(false);
    let control = h.control();
    control.pause();
    let aborter = {
        let control = control.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            control.request_abort();
        })
    };
    assert!(matches!(h.home(), Err(LabError::Aborted)));
    aborter.join().unwrap();
    assert!(!control.is_paused());
    // The next operation runs without waiting for a resume.
    h.home().unwrap();
}

#[test]
fn test_snapshot_restores_ledgers_tips_and_version() {
    let mut h = handler(false);
    h.pick_tips("tips", None).unwrap();
    let snapshot = h.push_state();

    h.suck("res", GridPos::new(0, 0), 300.0).unwrap();
    h.spit("plate", GridPos::new(0, 0), 300.0).unwrap();
    h.return_tips("tips", None).unwrap();
    assert_ne!(h.version(), snapshot.version);

    h.pop_state(&snapshot).unwrap();
    assert_eq!(h.version(), snapshot.version);
    assert!(h.has_tips());
    assert!(h.tips().is_empty());
    assert_eq!(well_volume(&h, "plate", 0, 0), 0.0);
    assert!((reservoir_volume(&h, "res", 1) - 20000.0).abs() < 1e-6);
    match h.deck().get_labware("tips").unwrap() {
        pipetlab::Labware::PipetteHolder(rack) => {
            assert!(!rack.is_occupied(GridPos::new(0, 0)).unwrap())
        }
        other => panic!("unexpected {}", other.class_name()),
    }
}

#[test]
fn test_snapshot_of_removed_labware_is_rejected() {
    let mut h = handler(false);
    let snapshot = h.push_state();
    h.deck_mut().remove_labware("drop").unwrap();
    match h.pop_state(&snapshot) {
        Err(LabError::NotFound(msg)) => assert!(msg.contains("drop"), "{msg}"),
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn test_dry_run_rolls_back_and_skips_hardware() {
    let mut h = handler(false);
    h.pick_tips("tips", None).unwrap();
    h.driver_mut().take_commands();
    let version = h.version();

    let outcome = h
        .dry_run(|h| {
            let dests: Vec<GridPos> = (0..4).map(|c| GridPos::new(c, 0)).collect();
            h.add_medium("res", GridPos::new(0, 0), 200.0, "plate", &dests)?;
            Ok::<f64, LabError>(well_volume(h, "plate", 3, 0))
        })
        .unwrap();

    assert!((outcome.unwrap() - 200.0).abs() < 1e-6);
    assert!(h.driver().commands().is_empty());
    assert!(!h.is_simulation());
    assert_eq!(h.version(), version);
    assert_eq!(well_volume(&h, "plate", 3, 0), 0.0);
    assert!((reservoir_volume(&h, "res", 1) - 20000.0).abs() < 1e-6);
}

#[test]
fn test_dry_run_reports_failures_without_side_effects() {
    let mut h = handler(false);
    let outcome = h.dry_run(|h| h.suck("res", GridPos::new(0, 0), 10.0)).unwrap();
    assert!(matches!(outcome, Err(LabError::TipState(_))));
    assert!(h.driver().commands().is_empty());
}

#[test]
fn test_manual_z_outside_travel_is_refused() {
    let mut h = handler(false);
    assert!(matches!(h.move_z(150.0), Err(LabError::Reachability { .. })));
    h.move_z(50.0).unwrap();
}
