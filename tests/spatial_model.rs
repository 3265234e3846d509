// Deck, slots, stacking, allocator and reservoir holder behaviour.

mod common;

use common::{base, empty_deck, plate, populated_deck, reservoir_holder, tip_rack, DECK_Z};
use pipetlab::{
    Dimensions, GridContainer, GridPos, LabError, Labware, LabwareBase, Reservoir, ReservoirHolder,
    Slot, Span, Stack, Well, Xy,
};

#[test]
fn test_overlapping_slot_rejected_without_mutation() {
    let mut deck = empty_deck();
    let clash = Slot::new("clash", Span(100.0, 200.0), Span(50.0, 90.0), DECK_Z).unwrap();
    let err = deck.add_slots(vec![clash]).unwrap_err();
    assert!(matches!(err, LabError::Placement(_)));
    assert_eq!(deck.slots().count(), 4);
    assert!(deck.slot("clash").is_err());
}

#[test]
fn test_add_slots_is_atomic() {
    let mut deck = empty_deck();
    let ok = Slot::new("spare", Span(430.0, 490.0), Span(10.0, 100.0), DECK_Z).unwrap();
    let outside = Slot::new("outside", Span(430.0, 600.0), Span(120.0, 200.0), DECK_Z).unwrap();
    assert!(deck.add_slots(vec![ok, outside]).is_err());
    assert!(deck.slot("spare").is_err());
}

#[test]
fn test_touching_slots_are_allowed() {
    let mut deck = empty_deck();
    let touching = Slot::new("touch", Span(140.0, 150.0), Span(10.0, 100.0), DECK_Z).unwrap();
    deck.add_slots(vec![touching]).unwrap();
    assert!(deck.slot("touch").is_ok());
}

#[test]
fn test_labware_too_large_for_slot() {
    let mut deck = empty_deck();
    let big = Well::new(base("big", 200.0, 50.0, 10.0), None).unwrap();
    let err = deck.add_labware(big.into(), "plate_slot", 0.0).unwrap_err();
    assert!(matches!(err, LabError::Placement(_)));
    assert!(!deck.contains_labware("big"));
}

#[test]
fn test_duplicate_labware_id_names_existing_slot() {
    let mut deck = populated_deck();
    deck.add_slots(vec![Slot::new("spare", Span(430.0, 490.0), Span(10.0, 100.0), DECK_Z).unwrap()])
        .unwrap();
    let twin = Well::new(base("plate", 10.0, 10.0, 10.0), None).unwrap();
    match deck.add_labware(twin.into(), "spare", 0.0) {
        Err(LabError::Placement(msg)) => assert!(msg.contains("plate_slot"), "{msg}"),
        other => panic!("expected placement error, got {other:?}"),
    }
}

#[test]
fn test_stacking_and_lifo_removal() {
    let mut deck = empty_deck();
    let stack = Stack::new(base("riser", 120.0, 80.0, 20.0));
    deck.add_labware(stack.into(), "plate_slot", 0.0).unwrap();
    deck.add_labware(plate("upper", 400.0).into(), "plate_slot", 20.0).unwrap();

    assert!((deck.entry("upper").unwrap().max_z - 34.35).abs() < 1e-9);
    match deck.remove_labware("riser") {
        Err(LabError::Placement(msg)) => assert!(msg.contains("upper"), "{msg}"),
        other => panic!("expected placement error, got {other:?}"),
    }
    let removed = deck.remove_labware("upper").unwrap();
    assert!(removed.position().is_none());
    deck.remove_labware("riser").unwrap();
    assert!(deck.slot("plate_slot").unwrap().is_empty());
}

#[test]
fn test_non_stackable_support_rejected() {
    let mut deck = empty_deck();
    deck.add_labware(plate("lower", 400.0).into(), "plate_slot", 0.0).unwrap();
    let err = deck.add_labware(plate("upper", 400.0).into(), "plate_slot", 20.0).unwrap_err();
    assert!(matches!(err, LabError::Placement(_)));
}

#[test]
fn test_z_band_overlap_rejected() {
    let mut deck = empty_deck();
    let stack = Stack::new(base("riser", 120.0, 80.0, 20.0));
    deck.add_labware(stack.into(), "plate_slot", 0.0).unwrap();
    let err = deck.add_labware(plate("upper", 400.0).into(), "plate_slot", 10.0).unwrap_err();
    assert!(matches!(err, LabError::Placement(_)));
}

#[test]
fn test_remove_slot_requires_cascade_flag() {
    let mut deck = populated_deck();
    assert!(deck.remove_slot("plate_slot", false).is_err());
    assert!(deck.contains_labware("plate"));

    let slot = deck.remove_slot("plate_slot", true).unwrap();
    assert!(!deck.contains_labware("plate"));
    assert!(slot.entries().iter().all(|e| e.labware.position().is_none()));
}

#[test]
fn test_plate_well_positions() {
    let deck = populated_deck();
    let lw = deck.get_labware("plate").unwrap();
    let position = lw.position().unwrap();
    assert_eq!(position, Xy::new(10.0, 10.0));

    let grid = lw.grid().unwrap();
    let first = grid.child_position(GridPos::new(0, 0)).unwrap();
    let second = grid.child_position(GridPos::new(1, 0)).unwrap();
    let below = grid.child_position(GridPos::new(0, 1)).unwrap();
    // X grows leftward across columns, Y grows downward across rows.
    assert!(second.x < first.x);
    assert!(below.y > first.y);
    assert!((first.x - second.x - 11.61).abs() < 1e-6);
    assert!(grid.child_position(GridPos::new(12, 0)).is_err());
}

#[test]
fn test_plate_rejects_wells_that_do_not_fit() {
    let well = Well::new(base("w", 6.96, 12.0, 10.0), None).unwrap();
    let err = pipetlab::Plate::new(base("tight", 127.76, 85.48, 14.35), 12, 8, &well).unwrap_err();
    assert!(matches!(err, LabError::InvalidInput(_) | LabError::Placement(_)));
}

#[test]
fn test_labware_needs_positive_dimensions() {
    assert!(LabwareBase::new(Some("flat"), Dimensions::new(10.0, 10.0, 0.0)).is_err());
}

#[test]
fn test_generated_ids_are_prefixed() {
    let b = LabwareBase::new(None, Dimensions::new(1.0, 1.0, 1.0)).unwrap();
    assert!(b.id.starts_with("labware_"));
    assert_eq!(b.id.len(), "labware_".len() + 8);
}

#[test]
fn test_reservoir_hook_mapping() {
    let holder = ReservoirHolder::new(base("h", 120.0, 80.0, 40.0), 3, 2).unwrap();
    assert_eq!(holder.hook_count(), 6);
    assert_eq!(holder.hook_to_position(1).unwrap(), GridPos::new(0, 0));
    assert_eq!(holder.hook_to_position(4).unwrap(), GridPos::new(0, 1));
    assert_eq!(holder.position_to_hook(GridPos::new(2, 1)).unwrap(), 6);
    assert!(holder.hook_to_position(0).is_err());
    assert!(holder.hook_to_position(7).is_err());
}

#[test]
fn test_reservoir_placement_rules() {
    let mut holder = reservoir_holder("r");
    assert_eq!(holder.occupied_hooks(), vec![1, 6]);

    let wide = Reservoir::new(base("wide", 38.0, 78.0, 35.0), None).unwrap();
    // Hook 6 is taken.
    assert!(holder.place_reservoir(&[5, 6], wide.clone()).is_err());
    let id = holder.place_reservoir(&[2, 3], wide).unwrap();
    assert_eq!(id, "r_1:0");
    assert_eq!(holder.reservoir_at_hook(3).unwrap().base.id, "r_1:0");

    let too_wide = Reservoir::new(base("x", 30.0, 78.0, 35.0), None).unwrap();
    assert!(holder.place_reservoir(&[4], too_wide).is_err());

    let removed = holder.remove_reservoir(3).unwrap();
    assert_eq!(removed.base.id, "r_1:0");
    assert_eq!(holder.available_hooks(), vec![2, 3, 4, 5]);
}

#[test]
fn test_reservoir_auto_fill() {
    let mut holder = ReservoirHolder::new(base("h", 120.0, 80.0, 40.0), 6, 1).unwrap();
    let template = Reservoir::new(base("t", 18.0, 78.0, 35.0), None).unwrap();
    let ids = holder.place_reservoirs(&template).unwrap();
    assert_eq!(ids.len(), 6);
    assert!(holder.available_hooks().is_empty());
}

#[test]
fn test_positioned_holder_lays_out_new_reservoirs() {
    let mut deck = empty_deck();
    deck.add_labware(reservoir_holder("res").into(), "res_slot", 0.0).unwrap();
    let lw = deck.get_labware_mut("res").unwrap();
    let Labware::ReservoirHolder(holder) = lw else {
        panic!("expected a reservoir holder");
    };
    let extra = Reservoir::new(base("t", 18.0, 78.0, 35.0), None).unwrap();
    holder.place_reservoir(&[3], extra).unwrap();
    assert!(holder.reservoir_at_hook(3).unwrap().base.position.is_some());
    assert!(holder.reservoir_at_hook(1).unwrap().base.position.is_some());
}

#[test]
fn test_tip_rack_blocks() {
    let mut rack = tip_rack("t");
    assert_eq!(rack.occupied_blocks(8), (0..12).map(|c| GridPos::new(c, 0)).collect::<Vec<_>>());
    rack.remove_consecutive(&[0], 0, 8).unwrap();
    rack.remove_tip_at(GridPos::new(1, 3)).unwrap();
    assert_eq!(rack.occupied_blocks(8).first(), Some(&GridPos::new(2, 0)));
    assert_eq!(rack.available_blocks(8), vec![GridPos::new(0, 0)]);
    // A bad position leaves every holder untouched.
    assert!(rack
        .set_occupied(&[GridPos::new(0, 0), GridPos::new(20, 0)], true)
        .is_err());
    assert!(!rack.is_occupied(GridPos::new(0, 0)).unwrap());
}
