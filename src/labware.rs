// src/labware.rs
//
// =============================================================================
// PIPETLAB: LABWARE MODEL (v 0.1 )
// =============================================================================
//
// The closed set of physical objects that can sit on the deck.
//
// Responsibilities:
// 1. `Labware`: tagged union over every variant (serde tag "class").
// 2. Capability traits: `Placeable`, `GridContainer`, `Vessel`
//    (`ContentHolder` lives in content.rs).
// 3. Variant-independent queries used by the deck and the engine.

use crate::content::{ContentHolder, ContentLedger};
use crate::core::{generate_labware_id, Dimensions, GridPos, Shape, Xy};
use crate::errors::{LabError, LabResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod plate;
pub mod reservoir;
pub mod tips;

pub use plate::{Plate, Well};
pub use reservoir::{Reservoir, ReservoirHolder};
pub use tips::{BlockStatus, IndividualPipetteHolder, PipetteHolder, TipDropzone};

// ============================================================================
// 1. SHARED BASE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabwareBase {
    pub id: String,
    pub size: Dimensions,
    #[serde(default)]
    pub offset: Xy,
    /// Set once on placement, cleared on removal.
    #[serde(default)]
    pub position: Option<Xy>,
    #[serde(default)]
    pub can_be_stacked_upon: bool,
}

impl LabwareBase {
    /// `id` of None generates `labware_<hex>`.
    pub fn new(id: Option<&str>, size: Dimensions) -> LabResult<Self> {
        let id = match id {
            Some(s) if s.trim().is_empty() => {
                return Err(LabError::InvalidInput("labware id must not be blank".into()))
            }
            Some(s) => s.to_string(),
            None => generate_labware_id(),
        };
        validate_dimensions(&id, &size)?;
        Ok(Self {
            id,
            size,
            offset: Xy::default(),
            position: None,
            can_be_stacked_upon: false,
        })
    }

    pub fn with_offset(mut self, offset: Xy) -> Self {
        self.offset = offset;
        self
    }

    pub fn stackable(mut self, yes: bool) -> Self {
        self.can_be_stacked_upon = yes;
        self
    }
}

pub(crate) fn validate_dimensions(id: &str, size: &Dimensions) -> LabResult<()> {
    for (axis, v) in [("x", size.x), ("y", size.y), ("z", size.z)] {
        if !(v > 0.0) || !v.is_finite() {
            return Err(LabError::InvalidInput(format!(
                "{id}: size_{axis} must be positive, got {v}"
            )));
        }
    }
    Ok(())
}

// ============================================================================
// 2. CAPABILITY TRAITS
// ============================================================================

/// Anything with a footprint that the deck can position.
pub trait Placeable {
    fn base(&self) -> &LabwareBase;
    fn base_mut(&mut self) -> &mut LabwareBase;

    fn id(&self) -> &str {
        &self.base().id
    }

    fn size(&self) -> Dimensions {
        self.base().size
    }

    fn offset(&self) -> Xy {
        self.base().offset
    }

    fn position(&self) -> Option<Xy> {
        self.base().position
    }

    fn can_be_stacked_upon(&self) -> bool {
        self.base().can_be_stacked_upon
    }
}

/// Labware addressed by (column, row).
pub trait GridContainer {
    fn grid_columns(&self) -> usize;
    fn grid_rows(&self) -> usize;

    /// True when every channel needs its own item (wells, tip holders);
    /// false when one item serves the whole head (a trough).
    fn each_tip_needs_separate_item(&self) -> bool {
        true
    }

    /// Fixed dispense height above the item bottom, when configured.
    fn add_height(&self) -> Option<f64> {
        None
    }

    /// Fixed aspiration height above the item bottom, when configured.
    fn remove_height(&self) -> Option<f64> {
        None
    }

    fn child_position(&self, pos: GridPos) -> LabResult<Xy>;
    fn child_size(&self, pos: GridPos) -> LabResult<Dimensions>;

    fn in_grid(&self, pos: GridPos) -> bool {
        pos.col < self.grid_columns() && pos.row < self.grid_rows()
    }

    /// Checks `columns` and the block `row..row + consecutive_rows`.
    fn validate_col_row(
        &self,
        columns: &[usize],
        row: usize,
        consecutive_rows: usize,
    ) -> LabResult<()> {
        if columns.is_empty() {
            return Err(LabError::InvalidInput("no columns given".into()));
        }
        if let Some(bad) = columns.iter().find(|c| **c >= self.grid_columns()) {
            return Err(LabError::InvalidInput(format!(
                "column {bad} out of range (0..{})",
                self.grid_columns()
            )));
        }
        if consecutive_rows == 0 || row + consecutive_rows > self.grid_rows() {
            return Err(LabError::InvalidInput(format!(
                "rows {row}..{} exceed the {} available rows",
                row + consecutive_rows,
                self.grid_rows()
            )));
        }
        Ok(())
    }
}

/// A liquid-holding item the pipettor can enter.
pub trait Vessel: ContentHolder + Placeable {
    /// None means "no geometry model": fixed parent heights apply.
    fn shape(&self) -> Option<Shape>;
}

// ============================================================================
// 3. THE TAGGED UNION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "class")]
pub enum Labware {
    Plate(Plate),
    Well(Well),
    Reservoir(Reservoir),
    ReservoirHolder(ReservoirHolder),
    PipetteHolder(PipetteHolder),
    IndividualPipetteHolder(IndividualPipetteHolder),
    TipDropzone(TipDropzone),
    Stack(Stack),
}

/// Structural spacer; only provides height for stacking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stack {
    #[serde(flatten)]
    pub base: LabwareBase,
}

impl Stack {
    pub fn new(base: LabwareBase) -> Self {
        Self {
            base: base.stackable(true),
        }
    }
}

impl Placeable for Stack {
    fn base(&self) -> &LabwareBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut LabwareBase {
        &mut self.base
    }
}

/// Per-child state captured by snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabwareState {
    pub contents: BTreeMap<String, ContentLedger>,
    pub occupancy: BTreeMap<String, bool>,
}

impl Labware {
    pub fn class_name(&self) -> &'static str {
        match self {
            Labware::Plate(_) => "Plate",
            Labware::Well(_) => "Well",
            Labware::Reservoir(_) => "Reservoir",
            Labware::ReservoirHolder(_) => "ReservoirHolder",
            Labware::PipetteHolder(_) => "PipetteHolder",
            Labware::IndividualPipetteHolder(_) => "IndividualPipetteHolder",
            Labware::TipDropzone(_) => "TipDropzone",
            Labware::Stack(_) => "Stack",
        }
    }

    pub fn placeable(&self) -> &dyn Placeable {
        match self {
            Labware::Plate(x) => x,
            Labware::Well(x) => x,
            Labware::Reservoir(x) => x,
            Labware::ReservoirHolder(x) => x,
            Labware::PipetteHolder(x) => x,
            Labware::IndividualPipetteHolder(x) => x,
            Labware::TipDropzone(x) => x,
            Labware::Stack(x) => x,
        }
    }

    pub fn placeable_mut(&mut self) -> &mut dyn Placeable {
        match self {
            Labware::Plate(x) => x,
            Labware::Well(x) => x,
            Labware::Reservoir(x) => x,
            Labware::ReservoirHolder(x) => x,
            Labware::PipetteHolder(x) => x,
            Labware::IndividualPipetteHolder(x) => x,
            Labware::TipDropzone(x) => x,
            Labware::Stack(x) => x,
        }
    }

    pub fn id(&self) -> &str {
        self.placeable().id()
    }

    pub fn size(&self) -> Dimensions {
        self.placeable().size()
    }

    pub fn position(&self) -> Option<Xy> {
        self.placeable().position()
    }

    pub fn can_be_stacked_upon(&self) -> bool {
        self.placeable().can_be_stacked_upon()
    }

    /// Grid view. Standalone wells and reservoirs act as a 1x1 shared grid.
    pub fn as_grid(&self) -> Option<&dyn GridContainer> {
        match self {
            Labware::Plate(x) => Some(x),
            Labware::Well(x) => Some(x),
            Labware::Reservoir(x) => Some(x),
            Labware::ReservoirHolder(x) => Some(x),
            Labware::PipetteHolder(x) => Some(x),
            Labware::IndividualPipetteHolder(_)
            | Labware::TipDropzone(_)
            | Labware::Stack(_) => None,
        }
    }

    pub fn grid(&self) -> LabResult<&dyn GridContainer> {
        self.as_grid().ok_or_else(|| {
            LabError::InvalidInput(format!(
                "{} '{}' has no addressable positions",
                self.class_name(),
                self.id()
            ))
        })
    }

    /// Liquid item at a grid position.
    pub fn vessel(&self, pos: GridPos) -> LabResult<&dyn Vessel> {
        match self {
            Labware::Plate(p) => p
                .well_at(pos)
                .map(|w| w as &dyn Vessel)
                .ok_or_else(|| missing_child(self, pos)),
            Labware::ReservoirHolder(h) => h
                .reservoir_at(pos)
                .map(|r| r as &dyn Vessel)
                .ok_or_else(|| missing_child(self, pos)),
            Labware::Well(w) if pos == GridPos::new(0, 0) => Ok(w as &dyn Vessel),
            Labware::Reservoir(r) if pos == GridPos::new(0, 0) => Ok(r as &dyn Vessel),
            Labware::Well(_) | Labware::Reservoir(_) => Err(missing_child(self, pos)),
            _ => Err(LabError::InvalidInput(format!(
                "{} '{}' does not hold liquid",
                self.class_name(),
                self.id()
            ))),
        }
    }

    pub fn vessel_mut(&mut self, pos: GridPos) -> LabResult<&mut dyn Vessel> {
        let class = self.class_name();
        let id = self.id().to_string();
        let missing = || LabError::NotFound(format!("no liquid item at {pos} in {class} '{id}'"));
        match self {
            Labware::Plate(p) => p
                .well_at_mut(pos)
                .map(|w| w as &mut dyn Vessel)
                .ok_or_else(missing),
            Labware::ReservoirHolder(h) => h
                .reservoir_at_mut(pos)
                .map(|r| r as &mut dyn Vessel)
                .ok_or_else(missing),
            Labware::Well(w) if pos == GridPos::new(0, 0) => Ok(w as &mut dyn Vessel),
            Labware::Reservoir(r) if pos == GridPos::new(0, 0) => Ok(r as &mut dyn Vessel),
            Labware::Well(_) | Labware::Reservoir(_) => Err(missing()),
            _ => Err(LabError::InvalidInput(format!("{class} '{id}' does not hold liquid"))),
        }
    }

    /// Clears the position of this labware and every child.
    pub fn clear_positions(&mut self) {
        self.placeable_mut().base_mut().position = None;
        match self {
            Labware::Plate(p) => p.wells.iter_mut().for_each(|w| w.base.position = None),
            Labware::ReservoirHolder(h) => {
                h.reservoirs.iter_mut().for_each(|r| r.base.position = None)
            }
            Labware::PipetteHolder(h) => h.holders.iter_mut().for_each(|i| i.base.position = None),
            _ => {}
        }
    }

    /// Content and occupancy of this labware, keyed by child id.
    pub fn capture_state(&self) -> LabwareState {
        let mut state = LabwareState::default();
        match self {
            Labware::Plate(p) => {
                for w in &p.wells {
                    state.contents.insert(w.base.id.clone(), w.content.clone());
                }
            }
            Labware::ReservoirHolder(h) => {
                for r in &h.reservoirs {
                    state.contents.insert(r.base.id.clone(), r.content.clone());
                }
            }
            Labware::Well(w) => {
                state.contents.insert(w.base.id.clone(), w.content.clone());
            }
            Labware::Reservoir(r) => {
                state.contents.insert(r.base.id.clone(), r.content.clone());
            }
            Labware::PipetteHolder(h) => {
                for i in &h.holders {
                    state.occupancy.insert(i.base.id.clone(), i.is_occupied);
                }
            }
            Labware::IndividualPipetteHolder(i) => {
                state.occupancy.insert(i.base.id.clone(), i.is_occupied);
            }
            Labware::TipDropzone(_) | Labware::Stack(_) => {}
        }
        state
    }

    /// Writes a captured state back. Children absent from `state` end up empty.
    pub fn restore_state(&mut self, state: &LabwareState) {
        let ledger = |id: &str| state.contents.get(id).cloned().unwrap_or_default();
        match self {
            Labware::Plate(p) => p.wells.iter_mut().for_each(|w| w.content = ledger(&w.base.id)),
            Labware::ReservoirHolder(h) => h
                .reservoirs
                .iter_mut()
                .for_each(|r| r.content = ledger(&r.base.id)),
            Labware::Well(w) => w.content = ledger(&w.base.id),
            Labware::Reservoir(r) => r.content = ledger(&r.base.id),
            Labware::PipetteHolder(h) => {
                for i in h.holders.iter_mut() {
                    if let Some(occ) = state.occupancy.get(&i.base.id) {
                        i.is_occupied = *occ;
                    }
                }
            }
            Labware::IndividualPipetteHolder(i) => {
                if let Some(occ) = state.occupancy.get(&i.base.id) {
                    i.is_occupied = *occ;
                }
            }
            Labware::TipDropzone(_) | Labware::Stack(_) => {}
        }
    }

    /// Structural checks run after construction or decoding.
    pub fn validate(&self) -> LabResult<()> {
        validate_dimensions(self.id(), &self.size())?;
        match self {
            Labware::Plate(p) => p.validate(),
            Labware::ReservoirHolder(h) => h.validate(),
            Labware::PipetteHolder(h) => h.validate(),
            Labware::Well(w) => w.validate(),
            Labware::Reservoir(r) => r.validate(),
            _ => Ok(()),
        }
    }
}

fn missing_child(lw: &Labware, pos: GridPos) -> LabError {
    LabError::NotFound(format!(
        "no liquid item at {pos} in {} '{}'",
        lw.class_name(),
        lw.id()
    ))
}

macro_rules! impl_from_variant {
    ($($variant:ident),*) => {
        $(impl From<$variant> for Labware {
            fn from(v: $variant) -> Self {
                Labware::$variant(v)
            }
        })*
    };
}

impl_from_variant!(
    Plate,
    Well,
    Reservoir,
    ReservoirHolder,
    PipetteHolder,
    IndividualPipetteHolder,
    TipDropzone,
    Stack
);
