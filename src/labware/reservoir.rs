// src/labware/reservoir.rs
//
// =============================================================================
// PIPETLAB: RESERVOIRS & HOLDERS (v 0.1 )
// =============================================================================
//
// A reservoir holder is a grid of hooks (1-indexed, row-major). Each
// reservoir occupies one rectangular block of hooks.
//
// Responsibilities:
// 1. Hook <-> grid conversion.
// 2. Reservoir placement (explicit hooks or auto-fill from a template).
// 3. Content queries across reservoirs (waste, by substance).

use super::plate::{single_cell, validate_capacity};
use super::{GridContainer, LabwareBase, Placeable, Vessel};
use crate::content::{ContentHolder, ContentLedger};
use crate::core::{child_id, Dimensions, GridPos, Shape, Xy};
use crate::deck::allocator;
use crate::errors::{LabError, LabResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const DEFAULT_RESERVOIR_CAPACITY: f64 = 30000.0;

// Fit checks allow for float noise in hook-size division.
const FIT_EPSILON: f64 = 1e-6;

// ============================================================================
// 1. RESERVOIR
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reservoir {
    #[serde(flatten)]
    pub base: LabwareBase,
    pub capacity: f64,
    #[serde(default)]
    pub content: ContentLedger,
    #[serde(default)]
    pub shape: Option<Shape>,
    /// Hooks occupied inside a holder; empty when free-standing or a template.
    #[serde(default)]
    pub hook_ids: Vec<usize>,
}

impl Reservoir {
    pub fn new(base: LabwareBase, capacity: Option<f64>) -> LabResult<Self> {
        let r = Self {
            base,
            capacity: capacity.unwrap_or(DEFAULT_RESERVOIR_CAPACITY),
            content: ContentLedger::new(),
            shape: None,
            hook_ids: Vec::new(),
        };
        r.validate()?;
        Ok(r)
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = Some(shape);
        self
    }

    pub fn with_content(mut self, substance: &str, volume: f64) -> LabResult<Self> {
        self.add_content(substance, volume)?;
        Ok(self)
    }

    /// Requests specific hooks when used as a placement template.
    pub fn with_hooks(mut self, hooks: Vec<usize>) -> Self {
        self.hook_ids = hooks;
        self
    }

    /// Any substance whose name contains "waste" (case-insensitive).
    pub fn is_waste(&self) -> bool {
        self.content
            .iter()
            .any(|(name, _)| name.to_lowercase().contains("waste"))
    }

    pub(crate) fn validate(&self) -> LabResult<()> {
        validate_capacity(&self.base.id, self.capacity, &self.content)
    }
}

impl Placeable for Reservoir {
    fn base(&self) -> &LabwareBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut LabwareBase {
        &mut self.base
    }
}

impl ContentHolder for Reservoir {
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

impl Vessel for Reservoir {
    fn shape(&self) -> Option<Shape> {
        self.shape
    }
}

impl GridContainer for Reservoir {
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

// ============================================================================
// 2. RESERVOIR HOLDER
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReservoirHolder {
    #[serde(flatten)]
    pub base: LabwareBase,
    pub hooks_across_x: usize,
    pub hooks_across_y: usize,
    #[serde(default)]
    pub reservoirs: Vec<Reservoir>,
    /// Dispense height above the reservoir bottom (mm).
    pub add_height: f64,
    /// Aspiration height above the reservoir bottom (mm).
    pub remove_height: f64,
    #[serde(default)]
    pub each_tip_needs_separate_item: bool,
    #[serde(default)]
    pub x_spacing: Option<f64>,
    #[serde(default)]
    pub y_spacing: Option<f64>,
}

impl ReservoirHolder {
    pub fn new(base: LabwareBase, hooks_across_x: usize, hooks_across_y: usize) -> LabResult<Self> {
        if hooks_across_x == 0 || hooks_across_y == 0 {
            return Err(LabError::InvalidInput(format!(
                "{}: reservoir holder needs at least one hook per axis",
                base.id
            )));
        }
        Ok(Self {
            base,
            hooks_across_x,
            hooks_across_y,
            reservoirs: Vec::new(),
            add_height: 10.0,
            remove_height: 1.0,
            each_tip_needs_separate_item: false,
            x_spacing: None,
            y_spacing: None,
        })
    }

    pub fn with_heights(mut self, add_height: f64, remove_height: f64) -> Self {
        self.add_height = add_height;
        self.remove_height = remove_height;
        self
    }

    pub fn per_tip_items(mut self, yes: bool) -> Self {
        self.each_tip_needs_separate_item = yes;
        self
    }

    pub fn hook_count(&self) -> usize {
        self.hooks_across_x * self.hooks_across_y
    }

    // ==== 1. HOOK ADDRESSING ====

    pub fn hook_to_position(&self, hook: usize) -> LabResult<GridPos> {
        if hook == 0 || hook > self.hook_count() {
            return Err(LabError::NotFound(format!(
                "{}: hook {hook} out of range 1..={}",
                self.base.id,
                self.hook_count()
            )));
        }
        let idx = hook - 1;
        Ok(GridPos::new(idx % self.hooks_across_x, idx / self.hooks_across_x))
    }

    pub fn position_to_hook(&self, pos: GridPos) -> LabResult<usize> {
        if !self.in_grid(pos) {
            return Err(LabError::NotFound(format!(
                "{}: no hook at {pos}",
                self.base.id
            )));
        }
        Ok(pos.row * self.hooks_across_x + pos.col + 1)
    }

    /// Per-hook footprint (mm).
    pub fn hook_size(&self) -> (f64, f64) {
        (
            self.base.size.x / self.hooks_across_x as f64,
            self.base.size.y / self.hooks_across_y as f64,
        )
    }

    pub fn reservoir_at_hook(&self, hook: usize) -> Option<&Reservoir> {
        self.reservoirs.iter().find(|r| r.hook_ids.contains(&hook))
    }

    pub fn reservoir_at_hook_mut(&mut self, hook: usize) -> Option<&mut Reservoir> {
        self.reservoirs.iter_mut().find(|r| r.hook_ids.contains(&hook))
    }

    pub fn reservoir_at(&self, pos: GridPos) -> Option<&Reservoir> {
        let hook = self.position_to_hook(pos).ok()?;
        self.reservoir_at_hook(hook)
    }

    pub fn reservoir_at_mut(&mut self, pos: GridPos) -> Option<&mut Reservoir> {
        let hook = self.position_to_hook(pos).ok()?;
        self.reservoir_at_hook_mut(hook)
    }

    pub fn occupied_hooks(&self) -> Vec<usize> {
        let mut hooks: Vec<usize> = self
            .reservoirs
            .iter()
            .flat_map(|r| r.hook_ids.iter().copied())
            .collect();
        hooks.sort_unstable();
        hooks
    }

    pub fn available_hooks(&self) -> Vec<usize> {
        let taken: BTreeSet<usize> = self.occupied_hooks().into_iter().collect();
        (1..=self.hook_count()).filter(|h| !taken.contains(h)).collect()
    }

    // ==== 2. PLACEMENT ====

    /// Mounts `reservoir` on exactly `hooks`, which must form a free rectangle.
    /// Returns the id assigned to the mounted reservoir.
    pub fn place_reservoir(
        &mut self,
        hooks: &[usize],
        mut reservoir: Reservoir,
    ) -> LabResult<String> {
        let id = self.base.id.clone();
        if hooks.is_empty() {
            return Err(LabError::Placement(format!("{id}: no hooks given for reservoir")));
        }
        let unique: BTreeSet<usize> = hooks.iter().copied().collect();
        if unique.len() != hooks.len() {
            return Err(LabError::Placement(format!("{id}: duplicate hook ids {hooks:?}")));
        }
        let mut cells = Vec::with_capacity(hooks.len());
        for h in &unique {
            if self.reservoir_at_hook(*h).is_some() {
                return Err(LabError::Placement(format!("{id}: hook {h} is already occupied")));
            }
            cells.push(self.hook_to_position(*h)?);
        }

        let min_col = cells.iter().map(|c| c.col).min().unwrap_or(0);
        let max_col = cells.iter().map(|c| c.col).max().unwrap_or(0);
        let min_row = cells.iter().map(|c| c.row).min().unwrap_or(0);
        let max_row = cells.iter().map(|c| c.row).max().unwrap_or(0);
        let width = max_col - min_col + 1;
        let height = max_row - min_row + 1;
        if width * height != cells.len() {
            return Err(LabError::Placement(format!(
                "{id}: hooks {hooks:?} do not form a rectangle"
            )));
        }

        let (hook_w, hook_h) = self.hook_size();
        let size = reservoir.base.size;
        let (span_w, span_h) = (hook_w * width as f64, hook_h * height as f64);
        if size.x > span_w + FIT_EPSILON || size.y > span_h + FIT_EPSILON {
            return Err(LabError::Placement(format!(
                "{id}: reservoir {:.2}x{:.2} mm does not fit {width}x{height} hooks \
                 ({span_w:.2}x{span_h:.2} mm)",
                size.x, size.y
            )));
        }
        if size.z > self.base.size.z {
            return Err(LabError::Placement(format!(
                "{id}: reservoir height {:.2} exceeds holder height {:.2}",
                size.z, self.base.size.z
            )));
        }

        reservoir.hook_ids = unique.into_iter().collect();
        reservoir.base.id = child_id(&id, min_col, min_row);
        reservoir.base.position = None;
        let assigned = reservoir.base.id.clone();
        log::debug!("{id}: mounted {assigned} on hooks {:?}", reservoir.hook_ids);
        self.reservoirs.push(reservoir);

        if self.base.position.is_some() {
            allocator::layout_reservoirs(self);
        }
        Ok(assigned)
    }

    /// Places copies of `template`. Uses the template's hooks when given,
    /// otherwise fills every free block sized from the template footprint.
    pub fn place_reservoirs(&mut self, template: &Reservoir) -> LabResult<Vec<String>> {
        if !template.hook_ids.is_empty() {
            let hooks = template.hook_ids.clone();
            return Ok(vec![self.place_reservoir(&hooks, template.clone())?]);
        }
        let (hook_w, hook_h) = self.hook_size();
        let span_x = ((template.base.size.x / hook_w) - FIT_EPSILON).ceil().max(1.0) as usize;
        let span_y = ((template.base.size.y / hook_h) - FIT_EPSILON).ceil().max(1.0) as usize;
        if span_x > self.hooks_across_x || span_y > self.hooks_across_y {
            return Err(LabError::Placement(format!(
                "{}: reservoir template needs {span_x}x{span_y} hooks, holder has {}x{}",
                self.base.id, self.hooks_across_x, self.hooks_across_y
            )));
        }

        let mut placed = Vec::new();
        for row in 0..=(self.hooks_across_y - span_y) {
            for col in 0..=(self.hooks_across_x - span_x) {
                let mut block = Vec::with_capacity(span_x * span_y);
                for r in row..row + span_y {
                    for c in col..col + span_x {
                        block.push(r * self.hooks_across_x + c + 1);
                    }
                }
                if block.iter().all(|h| self.reservoir_at_hook(*h).is_none()) {
                    placed.push(self.place_reservoir(&block, template.clone())?);
                }
            }
        }
        if placed.is_empty() {
            return Err(LabError::Placement(format!(
                "{}: no free {span_x}x{span_y} hook block left",
                self.base.id
            )));
        }
        Ok(placed)
    }

    /// Unmounts the reservoir covering `hook`.
    pub fn remove_reservoir(&mut self, hook: usize) -> LabResult<Reservoir> {
        self.hook_to_position(hook)?;
        let idx = self
            .reservoirs
            .iter()
            .position(|r| r.hook_ids.contains(&hook))
            .ok_or_else(|| LabError::NotFound(format!("{}: hook {hook} is empty", self.base.id)))?;
        let mut r = self.reservoirs.remove(idx);
        r.base.position = None;
        r.hook_ids.clear();
        Ok(r)
    }

    // ==== 3. CONTENT QUERIES ====

    pub fn add_content_at_hook(
        &mut self,
        hook: usize,
        substance: &str,
        volume: f64,
    ) -> LabResult<()> {
        let holder = self.base.id.clone();
        self.reservoir_at_hook_mut(hook)
            .ok_or_else(|| LabError::NotFound(format!("{holder}: hook {hook} is empty")))?
            .add_content(substance, volume)
    }

    pub fn remove_content_at_hook(&mut self, hook: usize, volume: f64) -> LabResult<ContentLedger> {
        let holder = self.base.id.clone();
        self.reservoir_at_hook_mut(hook)
            .ok_or_else(|| LabError::NotFound(format!("{holder}: hook {hook} is empty")))?
            .remove_content(volume)
    }

    pub fn waste_reservoirs(&self) -> Vec<&Reservoir> {
        self.reservoirs.iter().filter(|r| r.is_waste()).collect()
    }

    pub fn reservoirs_with(&self, substance: &str) -> Vec<&Reservoir> {
        self.reservoirs.iter().filter(|r| r.has_content_type(substance)).collect()
    }

    /// Grid position of the first hook of `reservoir` (its addressing cell).
    pub fn anchor_of(&self, reservoir: &Reservoir) -> Option<GridPos> {
        reservoir.hook_ids.iter().min().and_then(|h| self.hook_to_position(*h).ok())
    }

    pub(crate) fn validate(&self) -> LabResult<()> {
        let mut seen = BTreeSet::new();
        for r in &self.reservoirs {
            r.validate()?;
            for h in &r.hook_ids {
                self.hook_to_position(*h)?;
                if !seen.insert(*h) {
                    return Err(LabError::Placement(format!(
                        "{}: hook {h} claimed by more than one reservoir",
                        self.base.id
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Placeable for ReservoirHolder {
    fn base(&self) -> &LabwareBase {
        &self.base
    }
    fn base_mut(&mut self) -> &mut LabwareBase {
        &mut self.base
    }
}

impl GridContainer for ReservoirHolder {
    fn grid_columns(&self) -> usize {
        self.hooks_across_x
    }
    fn grid_rows(&self) -> usize {
        self.hooks_across_y
    }
    fn each_tip_needs_separate_item(&self) -> bool {
        self.each_tip_needs_separate_item
    }
    fn add_height(&self) -> Option<f64> {
        Some(self.add_height)
    }
    fn remove_height(&self) -> Option<f64> {
        Some(self.remove_height)
    }
    fn child_position(&self, pos: GridPos) -> LabResult<Xy> {
        let r = self
            .reservoir_at(pos)
            .ok_or_else(|| LabError::NotFound(format!("{}: no reservoir at {pos}", self.base.id)))?;
        r.base.position.ok_or_else(|| {
            LabError::Placement(format!("{} is not placed on the deck", self.base.id))
        })
    }
    fn child_size(&self, pos: GridPos) -> LabResult<Dimensions> {
        self.reservoir_at(pos)
            .map(|r| r.base.size)
            .ok_or_else(|| LabError::NotFound(format!("{}: no reservoir at {pos}", self.base.id)))
    }
}
