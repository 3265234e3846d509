// src/labware/plate.rs
//
// =============================================================================
// PIPETLAB: PLATES & WELLS (v 0.1 )
// =============================================================================
//
// A plate owns a fixed grid of wells, deep-copied from one template at
// construction. Wells are stored column-major: index = col * rows + row.

use super::{validate_dimensions, GridContainer, LabwareBase, Placeable, Vessel};
use crate::content::{ContentHolder, ContentLedger};
use crate::core::{child_id, Dimensions, GridPos, Shape, Xy};
use crate::errors::{LabError, LabResult};
use serde::{Deserialize, Serialize};

pub const DEFAULT_WELL_CAPACITY: f64 = 1000.0;

// ============================================================================
// 1. WELL
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Well {
    #[serde(flatten)]
    pub base: LabwareBase,
    pub capacity: f64,
    #[serde(default)]
    pub content: ContentLedger,
    #[serde(default)]
    pub shape: Option<Shape>,
    /// Grid address inside the owning plate.
    #[serde(default)]
    pub grid: Option<GridPos>,
}

impl Well {
    pub fn new(base: LabwareBase, capacity: Option<f64>) -> LabResult<Self> {
        let well = Self {
            base,
            capacity: capacity.unwrap_or(DEFAULT_WELL_CAPACITY),
            content: ContentLedger::new(),
            shape: None,
            grid: None,
        };
        well.validate()?;
        Ok(well)
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = Some(shape);
        self
    }

    pub fn with_content(mut self, substance: &str, volume: f64) -> LabResult<Self> {
        self.add_content(substance, volume)?;
        Ok(self)
    }

    pub(crate) fn validate(&self) -> LabResult<()> {
        validate_capacity(&self.base.id, self.capacity, &self.content)
    }
}

pub(crate) fn validate_capacity(id: &str, capacity: f64, content: &ContentLedger) -> LabResult<()> {
    if !(capacity >= 0.0) {
        return Err(LabError::InvalidInput(format!(
            "{id}: capacity must be non-negative, got {capacity}"
        )));
    }
    if content.total() > capacity {
        return Err(LabError::Capacity(format!(
            "{id}: initial content {:.2}µL exceeds capacity {capacity:.2}µL",
            content.total()
        )));
    }
    Ok(())
}

impl Placeable for Well {
    fn base(&self) -> &LabwareBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut LabwareBase {
        &mut self.base
    }
}

impl ContentHolder for Well {
    fn holder_id(&self) -> &str {
        &self.base.id
    }
    fn capacity(&self) -> f64 {
        self.capacity
    }
    fn ledger(&self) -> &ContentLedger {
        &self.content
    }
    fn ledger_mut(&mut self) -> &mut ContentLedger {
        &mut self.content
    }
}

impl Vessel for Well {
    fn shape(&self) -> Option<Shape> {
        self.shape
    }
}

impl GridContainer for Well {
    fn grid_columns(&self) -> usize {
        1
    }
    fn grid_rows(&self) -> usize {
        1
    }
    fn each_tip_needs_separate_item(&self) -> bool {
        false
    }
    fn child_position(&self, pos: GridPos) -> LabResult<Xy> {
        single_cell(&self.base, pos)
    }
    fn child_size(&self, _pos: GridPos) -> LabResult<Dimensions> {
        Ok(self.base.size)
    }
}

pub(crate) fn single_cell(base: &LabwareBase, pos: GridPos) -> LabResult<Xy> {
    if pos != GridPos::new(0, 0) {
        return Err(LabError::NotFound(format!("{} has no position {pos}", base.id)));
    }
    base.position
        .ok_or_else(|| LabError::Placement(format!("{} is not placed on the deck", base.id)))
}

// ============================================================================
// 2. PLATE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plate {
    #[serde(flatten)]
    pub base: LabwareBase,
    pub columns: usize,
    pub rows: usize,
    pub wells: Vec<Well>,
    /// Dispense height above the well bottom (mm).
    pub add_height: f64,
    /// Aspiration height above the well bottom (mm).
    pub remove_height: f64,
    #[serde(default)]
    pub x_spacing: Option<f64>,
    #[serde(default)]
    pub y_spacing: Option<f64>,
}

impl Plate {
    pub fn new(base: LabwareBase, columns: usize, rows: usize, template: &Well) -> LabResult<Self> {
        if columns == 0 || rows == 0 {
            return Err(LabError::InvalidInput(format!(
                "{}: plate needs at least one column and one row",
                base.id
            )));
        }
        let mut wells = Vec::with_capacity(columns * rows);
        for col in 0..columns {
            for row in 0..rows {
                let mut well = template.clone();
                well.base.id = child_id(&base.id, col, row);
                well.base.position = None;
                well.grid = Some(GridPos::new(col, row));
                wells.push(well);
            }
        }
        let plate = Self {
            base,
            columns,
            rows,
            wells,
            add_height: 5.0,
            remove_height: 1.0,
            x_spacing: None,
            y_spacing: None,
        };
        plate.validate()?;
        Ok(plate)
    }

    pub fn with_heights(mut self, add_height: f64, remove_height: f64) -> Self {
        self.add_height = add_height;
        self.remove_height = remove_height;
        self
    }

    pub fn with_spacing(mut self, x: Option<f64>, y: Option<f64>) -> Self {
        self.x_spacing = x;
        self.y_spacing = y;
        self
    }

    pub(crate) fn validate(&self) -> LabResult<()> {
        let id = &self.base.id;
        if self.wells.len() != self.columns * self.rows {
            return Err(LabError::InvalidInput(format!(
                "{id}: expected {} wells, found {}",
                self.columns * self.rows,
                self.wells.len()
            )));
        }
        let Some(first) = self.wells.first() else {
            return Ok(());
        };
        validate_dimensions(&first.base.id, &first.base.size)?;
        let needed_y = self.rows as f64 * first.base.size.y + 2.0 * self.base.offset.y.abs();
        if self.base.size.y < needed_y {
            return Err(LabError::InvalidInput(format!(
                "{id}: size_y {:.2} too small for {} rows of {:.2} mm wells (needs {needed_y:.2})",
                self.base.size.y, self.rows, first.base.size.y
            )));
        }
        if first.base.size.z > self.base.size.z {
            return Err(LabError::InvalidInput(format!(
                "{id}: well depth {:.2} exceeds plate height {:.2}",
                first.base.size.z, self.base.size.z
            )));
        }
        for w in &self.wells {
            w.validate()?;
        }
        Ok(())
    }

    fn index(&self, pos: GridPos) -> Option<usize> {
        (pos.col < self.columns && pos.row < self.rows).then(|| pos.col * self.rows + pos.row)
    }

    pub fn well_at(&self, pos: GridPos) -> Option<&Well> {
        self.index(pos).and_then(|i| self.wells.get(i))
    }

    pub fn well_at_mut(&mut self, pos: GridPos) -> Option<&mut Well> {
        self.index(pos).and_then(move |i| self.wells.get_mut(i))
    }

    pub fn wells_in_column(&self, col: usize) -> Vec<&Well> {
        (0..self.rows).filter_map(|row| self.well_at(GridPos::new(col, row))).collect()
    }

    pub fn wells_in_row(&self, row: usize) -> Vec<&Well> {
        (0..self.columns).filter_map(|col| self.well_at(GridPos::new(col, row))).collect()
    }

    pub fn total_volume(&self) -> f64 {
        self.wells.iter().map(|w| w.get_total_volume()).sum()
    }
}

impl Placeable for Plate {
    fn base(&self) -> &LabwareBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut LabwareBase {
        &mut self.base
    }
}

impl GridContainer for Plate {
    fn grid_columns(&self) -> usize {
        self.columns
    }
    fn grid_rows(&self) -> usize {
        self.rows
    }
    fn add_height(&self) -> Option<f64> {
        Some(self.add_height)
    }
    fn remove_height(&self) -> Option<f64> {
        Some(self.remove_height)
    }
    fn child_position(&self, pos: GridPos) -> LabResult<Xy> {
        let well = self
            .well_at(pos)
            .ok_or_else(|| LabError::NotFound(format!("{} has no well at {pos}", self.base.id)))?;
        well.base.position.ok_or_else(|| {
            LabError::Placement(format!("{} is not placed on the deck", self.base.id))
        })
    }
    fn child_size(&self, pos: GridPos) -> LabResult<Dimensions> {
        self.well_at(pos)
            .map(|w| w.base.size)
            .ok_or_else(|| LabError::NotFound(format!("{} has no well at {pos}", self.base.id)))
    }
}
