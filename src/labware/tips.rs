// src/labware/tips.rs
//
// =============================================================================
// PIPETLAB: TIP RACKS & DROPZONE (v 0.1 )
// =============================================================================
//
// Occupancy model for tip racks. A position is "occupied" when a fresh or
// returned tip sits in it. Positions are stored column-major like wells.

use super::{GridContainer, LabwareBase, Placeable};
use crate::core::{child_id, column_block, Dimensions, GridPos, Xy};
use crate::errors::{LabError, LabResult};
use serde::{Deserialize, Serialize};

// ============================================================================
// 1. SINGLE POSITION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndividualPipetteHolder {
    #[serde(flatten)]
    pub base: LabwareBase,
    pub is_occupied: bool,
    #[serde(default)]
    pub grid: Option<GridPos>,
}

impl IndividualPipetteHolder {
    /// New positions start occupied (a full rack).
    pub fn new(base: LabwareBase) -> Self {
        Self {
            base,
            is_occupied: true,
            grid: None,
        }
    }

    pub fn empty(mut self) -> Self {
        self.is_occupied = false;
        self
    }
}

impl Placeable for IndividualPipetteHolder {
    fn base(&self) -> &LabwareBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut LabwareBase {
        &mut self.base
    }
}

// ============================================================================
// 2. THE RACK
// ============================================================================

/// Occupancy of a contiguous block of positions in one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    FullyOccupied,
    FullyAvailable,
    Mixed,
    Invalid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipetteHolder {
    #[serde(flatten)]
    pub base: LabwareBase,
    pub columns: usize,
    pub rows: usize,
    pub holders: Vec<IndividualPipetteHolder>,
    /// Tip return height above the position bottom (mm).
    pub add_height: f64,
    /// Tip pick height above the position bottom (mm).
    pub remove_height: f64,
    #[serde(default)]
    pub x_spacing: Option<f64>,
    #[serde(default)]
    pub y_spacing: Option<f64>,
}

impl PipetteHolder {
    pub fn new(
        base: LabwareBase,
        columns: usize,
        rows: usize,
        template: &IndividualPipetteHolder,
    ) -> LabResult<Self> {
        if columns == 0 || rows == 0 {
            return Err(LabError::InvalidInput(format!(
                "{}: tip rack needs at least one column and one row",
                base.id
            )));
        }
        let mut holders = Vec::with_capacity(columns * rows);
        for col in 0..columns {
            for row in 0..rows {
                let mut h = template.clone();
                h.base.id = child_id(&base.id, col, row);
                h.base.position = None;
                h.grid = Some(GridPos::new(col, row));
                holders.push(h);
            }
        }
        // Pick and return at the rim of the position.
        let rim = template.base.size.z;
        let rack = Self {
            base,
            columns,
            rows,
            holders,
            add_height: rim,
            remove_height: rim,
            x_spacing: None,
            y_spacing: None,
        };
        rack.validate()?;
        Ok(rack)
    }

    pub fn with_heights(mut self, add_height: f64, remove_height: f64) -> Self {
        self.add_height = add_height;
        self.remove_height = remove_height;
        self
    }

    pub(crate) fn validate(&self) -> LabResult<()> {
        if self.holders.len() != self.columns * self.rows {
            return Err(LabError::InvalidInput(format!(
                "{}: expected {} tip positions, found {}",
                self.base.id,
                self.columns * self.rows,
                self.holders.len()
            )));
        }
        if let Some(h) = self.holders.iter().find(|h| h.base.size.z > self.base.size.z) {
            return Err(LabError::InvalidInput(format!(
                "{}: position depth {:.2} exceeds rack height {:.2}",
                self.base.id, h.base.size.z, self.base.size.z
            )));
        }
        Ok(())
    }

    fn index(&self, pos: GridPos) -> Option<usize> {
        (pos.col < self.columns && pos.row < self.rows).then(|| pos.col * self.rows + pos.row)
    }

    pub fn holder_at(&self, pos: GridPos) -> Option<&IndividualPipetteHolder> {
        self.index(pos).and_then(|i| self.holders.get(i))
    }

    pub fn holder_at_mut(&mut self, pos: GridPos) -> Option<&mut IndividualPipetteHolder> {
        self.index(pos).and_then(move |i| self.holders.get_mut(i))
    }

    pub fn is_occupied(&self, pos: GridPos) -> LabResult<bool> {
        self.holder_at(pos)
            .map(|h| h.is_occupied)
            .ok_or_else(|| self.out_of_range(pos))
    }

    /// Marks a single position as holding a tip.
    pub fn place_tip_at(&mut self, pos: GridPos) -> LabResult<()> {
        self.set_occupied(&[pos], true)
    }

    /// Marks a single position as empty.
    pub fn remove_tip_at(&mut self, pos: GridPos) -> LabResult<()> {
        self.set_occupied(&[pos], false)
    }

    /// Validates every position before changing any of them.
    pub fn set_occupied(&mut self, positions: &[GridPos], occupied: bool) -> LabResult<()> {
        if let Some(bad) = positions.iter().find(|p| self.index(**p).is_none()) {
            return Err(self.out_of_range(*bad));
        }
        for p in positions {
            if let Some(h) = self.holder_at_mut(*p) {
                h.is_occupied = occupied;
            }
        }
        Ok(())
    }

    /// `count` rows starting at `start_row` in each of `columns`.
    pub fn place_consecutive(
        &mut self,
        columns: &[usize],
        start_row: usize,
        count: usize,
    ) -> LabResult<()> {
        let positions = self.blocks(columns, start_row, count)?;
        self.set_occupied(&positions, true)
    }

    pub fn remove_consecutive(
        &mut self,
        columns: &[usize],
        start_row: usize,
        count: usize,
    ) -> LabResult<()> {
        let positions = self.blocks(columns, start_row, count)?;
        self.set_occupied(&positions, false)
    }

    fn blocks(&self, columns: &[usize], start_row: usize, count: usize) -> LabResult<Vec<GridPos>> {
        self.validate_col_row(columns, start_row, count)?;
        Ok(columns
            .iter()
            .flat_map(|c| column_block(*c, start_row, count))
            .collect())
    }

    pub fn block_status(&self, col: usize, start_row: usize, count: usize) -> BlockStatus {
        if count == 0 || col >= self.columns || start_row + count > self.rows {
            return BlockStatus::Invalid;
        }
        let occupied = column_block(col, start_row, count)
            .into_iter()
            .filter(|p| self.holder_at(*p).map(|h| h.is_occupied).unwrap_or(false))
            .count();
        match occupied {
            n if n == count => BlockStatus::FullyOccupied,
            0 => BlockStatus::FullyAvailable,
            _ => BlockStatus::Mixed,
        }
    }

    /// Start positions of non-overlapping `count`-row blocks, column by column.
    fn scan_blocks(&self, count: usize, want: BlockStatus) -> Vec<GridPos> {
        let mut out = Vec::new();
        if count == 0 || count > self.rows {
            return out;
        }
        for col in 0..self.columns {
            let mut row = 0;
            while row + count <= self.rows {
                if self.block_status(col, row, count) == want {
                    out.push(GridPos::new(col, row));
                }
                row += count;
            }
        }
        out
    }

    pub fn occupied_blocks(&self, count: usize) -> Vec<GridPos> {
        self.scan_blocks(count, BlockStatus::FullyOccupied)
    }

    pub fn available_blocks(&self, count: usize) -> Vec<GridPos> {
        self.scan_blocks(count, BlockStatus::FullyAvailable)
    }

    pub fn occupied_positions(&self) -> Vec<GridPos> {
        self.holders
            .iter()
            .filter(|h| h.is_occupied)
            .filter_map(|h| h.grid)
            .collect()
    }

    pub fn available_positions(&self) -> Vec<GridPos> {
        self.holders
            .iter()
            .filter(|h| !h.is_occupied)
            .filter_map(|h| h.grid)
            .collect()
    }

    fn out_of_range(&self, pos: GridPos) -> LabError {
        LabError::NotFound(format!(
            "{}: no tip position {pos} in a {}x{} rack",
            self.base.id, self.columns, self.rows
        ))
    }
}

impl Placeable for PipetteHolder {
    fn base(&self) -> &LabwareBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut LabwareBase {
        &mut self.base
    }
}

impl GridContainer for PipetteHolder {
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
        let h = self.holder_at(pos).ok_or_else(|| self.out_of_range(pos))?;
        h.base.position.ok_or_else(|| {
            LabError::Placement(format!("{} is not placed on the deck", self.base.id))
        })
    }
    fn child_size(&self, pos: GridPos) -> LabResult<Dimensions> {
        self.holder_at(pos)
            .map(|h| h.base.size)
            .ok_or_else(|| self.out_of_range(pos))
    }
}

// ============================================================================
// 3. DROPZONE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TipDropzone {
    #[serde(flatten)]
    pub base: LabwareBase,
    /// Eject height above the dropzone bottom (mm).
    pub drop_height_relative: f64,
}

impl TipDropzone {
    pub fn new(base: LabwareBase) -> Self {
        Self {
            base,
            drop_height_relative: 20.0,
        }
    }

    pub fn with_drop_height(mut self, h: f64) -> Self {
        self.drop_height_relative = h;
        self
    }
}

impl Placeable for TipDropzone {
    fn base(&self) -> &LabwareBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut LabwareBase {
        &mut self.base
    }
}
