// Shared deck fixture for the integration tests.
//
// Layout (deck 500 x 300 x 150 mm):
//   plate_slot : 12x8 plate "plate", 400µL wells
//   res_slot   : 6-hook holder "res"; hook 1 = 20 mL water, hook 6 = empty
//   tip_slot   : 12x8 rack "tips", full
//   drop_slot  : dropzone "drop"
#![allow(dead_code)]

use pipetlab::{
    Deck, Dimensions, IndividualPipetteHolder, LabwareBase, LiquidHandler, PipetteHolder,
    PipettorConfig, Plate, Reservoir, ReservoirHolder, SimulatedDriver, Slot, Span, TipDropzone,
    Well,
};

pub const DECK_Z: f64 = 150.0;

pub fn base(id: &str, x: f64, y: f64, z: f64) -> LabwareBase {
    LabwareBase::new(Some(id), Dimensions::new(x, y, z)).unwrap()
}

pub fn empty_deck() -> Deck {
    let mut deck = Deck::new("deck", Span(0.0, 500.0), Span(0.0, 300.0), DECK_Z).unwrap();
    deck.add_slots(vec![
        Slot::new("plate_slot", Span(10.0, 140.0), Span(10.0, 100.0), DECK_Z).unwrap(),
        Slot::new("res_slot", Span(150.0, 280.0), Span(10.0, 100.0), DECK_Z).unwrap(),
        Slot::new("tip_slot", Span(290.0, 420.0), Span(10.0, 100.0), DECK_Z).unwrap(),
        Slot::new("drop_slot", Span(10.0, 140.0), Span(110.0, 200.0), DECK_Z).unwrap(),
    ])
    .unwrap();
    deck
}

pub fn plate(id: &str, well_capacity: f64) -> Plate {
    let well = Well::new(base("well", 6.96, 6.96, 10.67), Some(well_capacity)).unwrap();
    Plate::new(base(id, 127.76, 85.48, 14.35), 12, 8, &well).unwrap()
}

pub fn reservoir_holder(id: &str) -> ReservoirHolder {
    let mut holder = ReservoirHolder::new(base(id, 120.0, 80.0, 40.0), 6, 1).unwrap();
    let water = Reservoir::new(base("tmpl", 18.0, 78.0, 35.0), None)
        .unwrap()
        .with_content("water", 20000.0)
        .unwrap();
    let spare = Reservoir::new(base("tmpl", 18.0, 78.0, 35.0), None).unwrap();
    holder.place_reservoir(&[1], water).unwrap();
    holder.place_reservoir(&[6], spare).unwrap();
    holder
}

pub fn tip_rack(id: &str) -> PipetteHolder {
    let position = IndividualPipetteHolder::new(base("pos", 7.0, 7.0, 40.0));
    PipetteHolder::new(base(id, 120.0, 80.0, 50.0), 12, 8, &position).unwrap()
}

pub fn dropzone(id: &str) -> TipDropzone {
    TipDropzone::new(base(id, 100.0, 80.0, 30.0))
}

pub fn populated_deck() -> Deck {
    let mut deck = empty_deck();
    deck.add_labware(plate("plate", 400.0).into(), "plate_slot", 0.0).unwrap();
    deck.add_labware(reservoir_holder("res").into(), "res_slot", 0.0).unwrap();
    deck.add_labware(tip_rack("tips").into(), "tip_slot", 0.0).unwrap();
    deck.add_labware(dropzone("drop").into(), "drop_slot", 0.0).unwrap();
    deck
}

pub fn handler(multichannel: bool) -> LiquidHandler<SimulatedDriver> {
    let config = PipettorConfig::default();
    let driver = SimulatedDriver::new(1000.0);
    LiquidHandler::new(populated_deck(), driver, &config, 1000, multichannel).unwrap()
}

pub fn well_volume(
    h: &LiquidHandler<SimulatedDriver>,
    plate_id: &str,
    col: usize,
    row: usize,
) -> f64 {
    use pipetlab::ContentHolder;
    match h.deck().get_labware(plate_id).unwrap() {
        pipetlab::Labware::Plate(p) => p
            .well_at(pipetlab::GridPos::new(col, row))
            .unwrap()
            .get_total_volume(),
        other => panic!("{} is not a plate", other.id()),
    }
}

pub fn reservoir_volume(h: &LiquidHandler<SimulatedDriver>, holder_id: &str, hook: usize) -> f64 {
    use pipetlab::ContentHolder;
    match h.deck().get_labware(holder_id).unwrap() {
        pipetlab::Labware::ReservoirHolder(r) => {
            r.reservoir_at_hook(hook).unwrap().get_total_volume()
        }
        other => panic!("{} is not a reservoir holder", other.id()),
    }
}
