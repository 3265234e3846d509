// Liquid movement through the engine, observed via ledgers and driver commands.

mod common;

use common::{base, empty_deck, handler, reservoir_volume, tip_rack, well_volume};
use pipetlab::drivers::DriverCommand;
use pipetlab::{
    ContentHolder, GridPos, LabError, LiquidHandler, PipettorConfig, Reservoir, SimulatedDriver,
};

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

fn aspirations(h: &LiquidHandler<SimulatedDriver>) -> Vec<f64> {
    h.driver()
        .commands()
        .iter()
        .filter_map(|c| match c {
            DriverCommand::Aspirate { volume } => Some(*volume),
            _ => None,
        })
        .collect()
}

fn dispenses(h: &LiquidHandler<SimulatedDriver>) -> Vec<f64> {
    h.driver()
        .commands()
        .iter()
        .filter_map(|c| match c {
            DriverCommand::Dispense { volume } => Some(*volume),
            _ => None,
        })
        .collect()
}

fn row0(cols: std::ops::Range<usize>) -> Vec<GridPos> {
    cols.map(|c| GridPos::new(c, 0)).collect()
}

#[test]
fn test_add_medium_batches_by_tip_capacity() {
    let mut h = handler(false);
    h.pick_tips("tips", None).unwrap();
    h.driver_mut().take_commands();

    h.add_medium("res", GridPos::new(0, 0), 150.0, "plate", &row0(0..6)).unwrap();

    assert_eq!(aspirations(&h), vec![750.0, 150.0]);
    assert_eq!(dispenses(&h), vec![150.0; 6]);
    for col in 0..6 {
        assert!(approx(well_volume(&h, "plate", col, 0), 150.0));
    }
    assert!(approx(well_volume(&h, "plate", 6, 0), 0.0));
    assert!(approx(reservoir_volume(&h, "res", 1), 19100.0));
    assert!(h.tips().is_empty());
}

#[test]
fn test_remove_medium_rejects_underfilled_source() {
    let mut h = handler(false);
    h.pick_tips("tips", None).unwrap();
    h.deck_mut()
        .get_labware_mut("plate")
        .unwrap()
        .vessel_mut(GridPos::new(0, 0))
        .unwrap()
        .add_content("medium", 100.0)
        .unwrap();
    h.driver_mut().take_commands();
    let before = h.version();

    let err = h
        .remove_medium("plate", &[GridPos::new(0, 0)], 150.0, "res", GridPos::new(5, 0))
        .unwrap_err();
    assert!(matches!(err, LabError::Capacity(_)), "{err}");
    assert!(approx(well_volume(&h, "plate", 0, 0), 100.0));
    assert!(aspirations(&h).is_empty());
    assert_eq!(h.version(), before);
}

#[test]
fn test_remove_medium_pools_into_one_destination() {
    let mut h = handler(false);
    h.pick_tips("tips", None).unwrap();
    for col in 0..3 {
        h.deck_mut()
            .get_labware_mut("plate")
            .unwrap()
            .vessel_mut(GridPos::new(col, 0))
            .unwrap()
            .add_content("medium", 200.0)
            .unwrap();
    }
    h.remove_medium("plate", &row0(0..3), 120.0, "res", GridPos::new(5, 0)).unwrap();
    for col in 0..3 {
        assert!(approx(well_volume(&h, "plate", col, 0), 80.0));
    }
    assert!(approx(reservoir_volume(&h, "res", 6), 360.0));
}

#[test]
fn test_suck_then_spit_restores_the_source() {
    let mut h = handler(false);
    h.pick_tips("tips", None).unwrap();
    let source = GridPos::new(0, 0);

    h.suck("res", source, 200.0).unwrap();
    assert!(approx(h.tips().total_volume(), 200.0));
    assert!(approx(reservoir_volume(&h, "res", 1), 19800.0));

    h.spit("res", source, 200.0).unwrap();
    assert!(h.tips().is_empty());
    assert!(approx(reservoir_volume(&h, "res", 1), 20000.0));
}

#[test]
fn test_suck_without_tips_is_refused() {
    let mut h = handler(false);
    let err = h.suck("res", GridPos::new(0, 0), 100.0).unwrap_err();
    assert!(matches!(err, LabError::TipState(_)));
    assert!(h.driver().commands().is_empty());
}

#[test]
fn test_suck_beyond_tip_volume_is_refused() {
    let mut h = handler(false);
    h.pick_tips("tips", None).unwrap();
    h.suck("res", GridPos::new(0, 0), 900.0).unwrap();
    let err = h.suck("res", GridPos::new(0, 0), 200.0).unwrap_err();
    assert!(matches!(err, LabError::Capacity(_)));
    assert!(approx(h.tips().total_volume(), 900.0));
}

#[test]
fn test_spit_into_full_well_is_refused() {
    let mut h = handler(false);
    h.pick_tips("tips", None).unwrap();
    h.suck("res", GridPos::new(0, 0), 500.0).unwrap();
    let err = h.spit("plate", GridPos::new(0, 0), 500.0).unwrap_err();
    assert!(matches!(err, LabError::Capacity(_)));
    assert!(approx(h.tips().total_volume(), 500.0));
    assert!(approx(well_volume(&h, "plate", 0, 0), 0.0));
}

#[test]
fn test_multichannel_splits_volume_across_tips() {
    let mut h = handler(true);
    h.pick_tips("tips", None).unwrap();
    h.driver_mut().take_commands();

    h.add_medium("res", GridPos::new(0, 0), 100.0, "plate", &row0(0..2)).unwrap();

    // One shared aspiration feeds both columns.
    assert_eq!(aspirations(&h), vec![200.0]);
    assert_eq!(dispenses(&h), vec![100.0, 100.0]);
    for col in 0..2 {
        for row in 0..8 {
            assert!(approx(well_volume(&h, "plate", col, row), 100.0));
        }
    }
    assert!(approx(well_volume(&h, "plate", 2, 0), 0.0));
    assert!(approx(reservoir_volume(&h, "res", 1), 18400.0));
}

#[test]
fn test_multichannel_rejects_partial_column() {
    let mut h = handler(true);
    h.pick_tips("tips", None).unwrap();
    h.suck("res", GridPos::new(0, 0), 800.0).unwrap();
    let err = h.spit("plate", GridPos::new(0, 1), 800.0).unwrap_err();
    assert!(matches!(err, LabError::InvalidInput(_)));
}

#[test]
fn test_invalid_destination_rejects_whole_transfer() {
    let mut h = handler(false);
    h.pick_tips("tips", None).unwrap();
    h.driver_mut().take_commands();
    let version = h.version();

    let destinations = [GridPos::new(0, 0), GridPos::new(40, 0)];
    let err = h.add_medium("res", GridPos::new(0, 0), 100.0, "plate", &destinations).unwrap_err();

    assert!(matches!(err, LabError::InvalidInput(_)));
    assert!(approx(well_volume(&h, "plate", 0, 0), 0.0));
    assert!(approx(reservoir_volume(&h, "res", 1), 20000.0));
    assert!(h.driver().commands().is_empty());
    assert_eq!(h.version(), version);
}

#[test]
fn test_multichannel_partial_column_rejected_before_motion() {
    let mut h = handler(true);
    h.pick_tips("tips", None).unwrap();
    h.driver_mut().take_commands();
    let sources = [GridPos::new(0, 0), GridPos::new(1, 1)];
    let err = h.remove_medium("plate", &sources, 10.0, "res", GridPos::new(5, 0)).unwrap_err();
    assert!(matches!(err, LabError::InvalidInput(_)));
    assert!(h.driver().commands().is_empty());
}

#[test]
fn test_large_transfer_runs_in_trips() {
    let mut deck = empty_deck();
    let src = Reservoir::new(base("src", 100.0, 80.0, 40.0), None)
        .unwrap()
        .with_content("buffer", 5000.0)
        .unwrap();
    let dst = Reservoir::new(base("dst", 100.0, 80.0, 40.0), None).unwrap();
    deck.add_labware(src.into(), "plate_slot", 0.0).unwrap();
    deck.add_labware(dst.into(), "res_slot", 0.0).unwrap();
    deck.add_labware(tip_rack("tips").into(), "tip_slot", 0.0).unwrap();
    let config = PipettorConfig::default();
    let driver = SimulatedDriver::new(1000.0);
    let mut h = LiquidHandler::new(deck, driver, &config, 1000, false).unwrap();
    h.pick_tips("tips", None).unwrap();

    let origin = [GridPos::new(0, 0)];
    h.transfer_plate_to_plate("src", &origin, "dst", &origin, 2500.0).unwrap();

    assert_eq!(aspirations(&h), vec![834.0, 833.0, 833.0]);
    let volume = |id: &str| {
        h.deck()
            .get_labware(id)
            .unwrap()
            .vessel(GridPos::new(0, 0))
            .unwrap()
            .get_total_volume()
    };
    assert!(approx(volume("src"), 2500.0));
    assert!(approx(volume("dst"), 2500.0));
}

#[test]
fn test_transfer_needs_matching_position_lists() {
    let mut h = handler(false);
    h.pick_tips("tips", None).unwrap();
    let err = h
        .transfer_plate_to_plate("plate", &row0(0..2), "plate", &row0(2..3), 10.0)
        .unwrap_err();
    assert!(matches!(err, LabError::InvalidInput(_)));
}

#[test]
fn test_remove_and_add_exchanges_medium() {
    let mut h = handler(false);
    h.pick_tips("tips", None).unwrap();
    for col in 0..3 {
        h.deck_mut()
            .get_labware_mut("plate")
            .unwrap()
            .vessel_mut(GridPos::new(col, 0))
            .unwrap()
            .add_content("old", 200.0)
            .unwrap();
    }

    h.remove_and_add(
        "plate",
        &row0(0..3),
        100.0,
        "res",
        GridPos::new(5, 0),
        "res",
        GridPos::new(0, 0),
    )
    .unwrap();

    let plate = h.deck().get_labware("plate").unwrap();
    for col in 0..3 {
        let well = plate.vessel(GridPos::new(col, 0)).unwrap();
        assert!(approx(well.get_volume_of("old"), 100.0));
        assert!(approx(well.get_volume_of("water"), 100.0));
    }
    assert!(approx(reservoir_volume(&h, "res", 6), 300.0));
    assert!(approx(reservoir_volume(&h, "res", 1), 19700.0));
}

#[test]
fn test_change_tips_discards_and_picks_fresh() {
    let mut h = handler(false);
    h.change_tips = true;

    h.add_medium("res", GridPos::new(0, 0), 50.0, "plate", &row0(0..1)).unwrap();
    h.add_medium("res", GridPos::new(0, 0), 50.0, "plate", &row0(1..2)).unwrap();

    let cmds = h.driver().commands();
    let picks = cmds.iter().filter(|c| matches!(c, DriverCommand::PickTip { .. })).count();
    let ejects = cmds.iter().filter(|c| matches!(c, DriverCommand::EjectTip)).count();
    assert_eq!(picks, 2);
    assert_eq!(ejects, 1);
    assert!(h.has_tips());

    match h.deck().get_labware("tips").unwrap() {
        pipetlab::Labware::PipetteHolder(rack) => {
            assert!(!rack.is_occupied(GridPos::new(0, 0)).unwrap());
            assert!(!rack.is_occupied(GridPos::new(0, 1)).unwrap());
            assert!(rack.is_occupied(GridPos::new(0, 2)).unwrap());
        }
        other => panic!("unexpected {}", other.class_name()),
    }
}

#[test]
fn test_transfer_without_tips_and_no_tip_change_fails() {
    let mut h = handler(false);
    let err = h
        .add_medium("res", GridPos::new(0, 0), 50.0, "plate", &row0(0..1))
        .unwrap_err();
    assert!(matches!(err, LabError::TipState(_)));
}
