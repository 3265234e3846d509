// Pick / return / replace / discard and the candidate search.

mod common;

use common::handler;
use pipetlab::drivers::DriverCommand;
use pipetlab::{GridPos, LabError, Labware, LiquidHandler, PipetteHolder, SimulatedDriver};

fn rack(h: &LiquidHandler<SimulatedDriver>) -> &PipetteHolder {
    match h.deck().get_labware("tips").unwrap() {
        Labware::PipetteHolder(r) => r,
        other => panic!("unexpected {}", other.class_name()),
    }
}

#[test]
fn test_single_channel_pick_takes_first_tip() {
    let mut h = handler(false);
    let picked = h.pick_tips("tips", None).unwrap();
    assert_eq!(picked, vec![GridPos::new(0, 0)]);
    assert!(h.has_tips());
    assert!(!rack(&h).is_occupied(GridPos::new(0, 0)).unwrap());
    assert!(rack(&h).is_occupied(GridPos::new(0, 1)).unwrap());

    let limit = h.driver().commands().iter().find_map(|c| match c {
        DriverCommand::PickTip { limit } => Some(*limit),
        _ => None,
    });
    // Rack top 50 mm, pick at the rim, no tip attached yet.
    assert_eq!(limit, Some(100.0));
    assert_eq!(h.driver().commands().last(), Some(&DriverCommand::MoveZ { z: 0.0 }));
}

#[test]
fn test_multichannel_pick_empties_a_column() {
    let mut h = handler(true);
    let picked = h.pick_tips("tips", None).unwrap();
    assert_eq!(picked, vec![GridPos::new(0, 0)]);
    for row in 0..8 {
        assert!(!rack(&h).is_occupied(GridPos::new(0, row)).unwrap());
        assert!(rack(&h).is_occupied(GridPos::new(1, row)).unwrap());
    }
}

#[test]
fn test_pick_twice_is_refused() {
    let mut h = handler(false);
    h.pick_tips("tips", None).unwrap();
    let err = h.pick_tips("tips", None).unwrap_err();
    assert!(matches!(err, LabError::TipState(_)));
}

#[test]
fn test_failed_single_pick_moves_to_next_candidate() {
    let mut h = handler(false);
    h.driver_mut().fail_next_picks(1);
    let picked = h.pick_tips("tips", None).unwrap();
    assert_eq!(picked, vec![GridPos::new(0, 1)]);
    // The position that reported no tip is no longer offered.
    assert!(!rack(&h).is_occupied(GridPos::new(0, 0)).unwrap());
    assert!(!rack(&h).is_occupied(GridPos::new(0, 1)).unwrap());
    assert!(rack(&h).is_occupied(GridPos::new(0, 2)).unwrap());
}

#[test]
fn test_failed_multichannel_pick_moves_to_next_column() {
    let mut h = handler(true);
    h.driver_mut().fail_next_picks(1);
    let picked = h.pick_tips("tips", None).unwrap();
    assert_eq!(picked, vec![GridPos::new(1, 0)]);
    assert!(rack(&h).is_occupied(GridPos::new(0, 0)).unwrap());
    assert!(!rack(&h).is_occupied(GridPos::new(1, 0)).unwrap());
}

#[test]
fn test_exhausted_candidates_report_every_outcome() {
    let mut h = handler(false);
    h.driver_mut().fail_next_picks(usize::MAX);
    let candidates = [GridPos::new(3, 0), GridPos::new(3, 1)];
    match h.pick_tips("tips", Some(&candidates)) {
        Err(LabError::TipState(msg)) => {
            assert!(msg.contains("(3, 0)"), "{msg}");
            assert!(msg.contains("(3, 1)"), "{msg}");
        }
        other => panic!("expected a tip state error, got {other:?}"),
    }
    assert!(!h.has_tips());
}

#[test]
fn test_explicit_empty_candidate_is_skipped() {
    let mut h = handler(false);
    h.pick_tips("tips", Some(&[GridPos::new(2, 2)])).unwrap();
    h.discard_tips(None).unwrap();
    let picked = h
        .pick_tips("tips", Some(&[GridPos::new(2, 2), GridPos::new(2, 3)]))
        .unwrap();
    assert_eq!(picked, vec![GridPos::new(2, 3)]);
}

#[test]
fn test_return_refills_the_first_free_position() {
    let mut h = handler(false);
    h.pick_tips("tips", None).unwrap();
    let returned = h.return_tips("tips", None).unwrap();
    assert_eq!(returned, vec![GridPos::new(0, 0)]);
    assert!(!h.has_tips());
    assert!(rack(&h).available_positions().is_empty());
    assert!(h.driver().commands().contains(&DriverCommand::EjectTip));
}

#[test]
fn test_return_into_occupied_block_is_refused() {
    let mut h = handler(true);
    h.pick_tips("tips", None).unwrap();
    let err = h.return_tips("tips", Some(&[GridPos::new(4, 0)])).unwrap_err();
    assert!(matches!(err, LabError::TipState(_)));
    assert!(h.has_tips());
}

#[test]
fn test_return_skips_occupied_candidates() {
    let mut h = handler(false);
    h.pick_tips("tips", None).unwrap();
    let returned = h
        .return_tips("tips", Some(&[GridPos::new(0, 1), GridPos::new(0, 0)]))
        .unwrap();
    assert_eq!(returned, vec![GridPos::new(0, 0)]);
    assert!(!h.has_tips());
    assert!(rack(&h).is_occupied(GridPos::new(0, 0)).unwrap());
}

#[test]
fn test_failed_eject_moves_to_next_return_candidate() {
    let mut h = handler(false);
    h.pick_tips("tips", Some(&[GridPos::new(0, 0)])).unwrap();
    h.discard_tips(None).unwrap();
    h.pick_tips("tips", Some(&[GridPos::new(0, 1)])).unwrap();
    h.driver_mut().fail_next_ejects(1);
    h.driver_mut().take_commands();

    let returned = h
        .return_tips("tips", Some(&[GridPos::new(0, 0), GridPos::new(0, 1)]))
        .unwrap();
    assert_eq!(returned, vec![GridPos::new(0, 1)]);
    assert!(!rack(&h).is_occupied(GridPos::new(0, 0)).unwrap());
    assert!(rack(&h).is_occupied(GridPos::new(0, 1)).unwrap());

    // The jammed candidate still parks the head before the next attempt.
    let commands = h.driver().commands();
    let second_xy = commands
        .iter()
        .rposition(|c| matches!(c, DriverCommand::MoveXy { .. }))
        .unwrap();
    assert_eq!(commands[second_xy - 1], DriverCommand::MoveZ { z: 0.0 });
}

#[test]
fn test_blocked_motion_moves_to_next_pick_candidate() {
    let mut h = handler(false);
    h.driver_mut().fail_next_moves(1);
    let picked = h.pick_tips("tips", None).unwrap();
    assert_eq!(picked, vec![GridPos::new(0, 1)]);
    assert!(h.has_tips());
    assert_eq!(h.driver().commands()[0], DriverCommand::MoveZ { z: 0.0 });
}

#[test]
fn test_return_without_tips_is_refused() {
    let mut h = handler(false);
    assert!(matches!(h.return_tips("tips", None), Err(LabError::TipState(_))));
}

#[test]
fn test_replace_returns_then_picks() {
    let mut h = handler(false);
    h.pick_tips("tips", Some(&[GridPos::new(5, 5)])).unwrap();
    let picked = h
        .replace_tips("tips", Some(&[GridPos::new(5, 5)]), None, Some(&[GridPos::new(6, 0)]))
        .unwrap();
    assert_eq!(picked, vec![GridPos::new(6, 0)]);
    assert!(rack(&h).is_occupied(GridPos::new(5, 5)).unwrap());
    assert!(!rack(&h).is_occupied(GridPos::new(6, 0)).unwrap());
}

#[test]
fn test_discard_uses_the_dropzone() {
    let mut h = handler(false);
    h.pick_tips("tips", None).unwrap();
    h.driver_mut().take_commands();
    h.discard_tips(Some("drop")).unwrap();
    assert!(!h.has_tips());
    assert!(!h.driver().has_tip());
    let cmds = h.driver().commands();
    assert!(matches!(cmds[0], DriverCommand::MoveXy { .. }));
    // Dropzone 30 mm tall, eject 20 mm above its base, 90 mm tip attached.
    assert_eq!(cmds[1], DriverCommand::MoveZ { z: 40.0 });
    assert_eq!(cmds[2], DriverCommand::EjectTip);
}

#[test]
fn test_discard_rejects_non_dropzone_and_missing_tips() {
    let mut h = handler(false);
    assert!(matches!(h.discard_tips(None), Err(LabError::TipState(_))));
    h.pick_tips("tips", None).unwrap();
    assert!(matches!(h.discard_tips(Some("plate")), Err(LabError::InvalidInput(_))));
    assert!(h.has_tips());
}

#[test]
fn test_pick_from_non_rack_is_refused() {
    let mut h = handler(false);
    assert!(matches!(h.pick_tips("plate", None), Err(LabError::InvalidInput(_))));
}
