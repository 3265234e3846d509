// src/transfer.rs
//
// =============================================================================
// PIPETLAB: TRANSFER ENGINE (v 0.1 )
// =============================================================================
//
// Liquid movement.
//
// Responsibilities:
// 1. `suck` / `spit`: one aspirate or dispense at a grid position, with the
//    item ledgers and the tip ledger updated together with the command.
// 2. `add_medium` / `remove_medium` / `transfer_plate_to_plate`: decompose
//    requests into batches (several positions per cycle) or trips (several
//    cycles per position) under the tip capacity.
//
// Volumes passed to suck/spit are totals across all active channels.

use crate::content::{check_volume, resolve_removal, ContentHolder, ContentLedger};
use crate::core::{column_block, GridPos, Xy, VOLUME_TOLERANCE};
use crate::drivers::MotorDriver;
use crate::errors::{LabError, LabResult};
use crate::geometry;
use crate::labware::{GridContainer, Placeable, Vessel};
use crate::pipettor::LiquidHandler;

// ============================================================================
// 1. DECOMPOSITION (pure)
// ============================================================================

/// Splits `total` into `ceil(total / max_per_trip)` trips whose volumes
/// differ by at most one unit and sum exactly to `total`.
pub fn plan_trips(total: u64, max_per_trip: u64) -> Vec<u64> {
    if total == 0 || max_per_trip == 0 {
        return Vec::new();
    }
    let trips = total.div_ceil(max_per_trip);
    let base = total / trips;
    let extra = total % trips;
    (0..trips).map(|i| base + u64::from(i < extra)).collect()
}

/// Positions served per aspirate/dispense cycle.
pub fn batch_size(max_volume: u64, volume_per_position: u64, max_batch: usize) -> usize {
    if volume_per_position == 0 {
        return 1;
    }
    let fits = (max_volume / volume_per_position) as usize;
    fits.min(max_batch).max(1)
}

// ============================================================================
// 2. PLANNING (read-only)
// ============================================================================

/// Everything a suck/spit needs, resolved before any motion.
struct AccessPlan {
    positions: Vec<GridPos>,
    per_tip_items: bool,
    xy: Xy,
    z: f64,
}

#[derive(Clone, Copy, PartialEq)]
enum Direction {
    Aspirate,
    Dispense,
}

impl<D: MotorDriver> LiquidHandler<D> {
    /// Transfer volume per position and per aspirate, as whole µL.
    fn volumes(&self, volume_per_well: f64) -> LabResult<(u64, u64)> {
        check_volume("transfer", volume_per_well)?;
        let channels = self.channels() as f64;
        let per_position = (volume_per_well * channels) as u64;
        if per_position == 0 {
            return Err(LabError::InvalidInput(format!(
                "volume per well {volume_per_well}µL rounds to nothing"
            )));
        }
        let max_volume = u64::from(self.tip_volume) * self.channels() as u64;
        Ok((per_position, max_volume))
    }

    /// Checks every position of a request against the labware grid, with
    /// the row depth the head will occupy there.
    fn validate_positions(&self, labware_id: &str, positions: &[GridPos]) -> LabResult<()> {
        let grid = self.deck.get_labware(labware_id)?.grid()?;
        let rows = if grid.each_tip_needs_separate_item() { self.channels() } else { 1 };
        for pos in positions {
            grid.validate_col_row(&[pos.col], pos.row, rows).map_err(|e| {
                LabError::InvalidInput(format!("'{labware_id}' at {pos}: {e}"))
            })?;
        }
        Ok(())
    }

    fn plan_access(
        &self,
        labware_id: &str,
        pos: GridPos,
        volume: f64,
        dir: Direction,
    ) -> LabResult<AccessPlan> {
        if !(volume > 0.0) || !volume.is_finite() {
            return Err(LabError::InvalidInput(format!(
                "volume must be positive, got {volume}"
            )));
        }
        if !self.has_tips {
            return Err(LabError::TipState(format!(
                "no tips attached for access to '{labware_id}'"
            )));
        }
        let channels = self.channels();
        let lw = self.deck.get_labware(labware_id)?;
        let grid = lw.grid()?;
        let per_tip_items = grid.each_tip_needs_separate_item();
        let rows = if per_tip_items { channels } else { 1 };
        grid.validate_col_row(&[pos.col], pos.row, rows)?;
        let positions = column_block(pos.col, pos.row, rows);

        let per_tip = volume / channels as f64;
        let per_item = if per_tip_items { per_tip } else { volume };
        let mut items: Vec<&dyn Vessel> = Vec::with_capacity(positions.len());
        for p in &positions {
            items.push(lw.vessel(*p)?);
        }
        let first = items[0];

        if channels > 1 && !per_tip_items {
            let needed = channels as f64 * self.config.channel_spacing;
            if first.size().y < needed {
                return Err(LabError::InvalidInput(format!(
                    "{} is {:.2} mm deep in Y; a {channels}-channel head needs {needed:.2} mm",
                    first.holder_id(),
                    first.size().y
                )));
            }
        }

        match dir {
            Direction::Aspirate => {
                for item in &items {
                    resolve_removal(item.holder_id(), item.get_total_volume(), per_item)?;
                }
                for i in 0..channels {
                    let held = self.tips.volume_at(i);
                    if held + per_tip > self.tips.tip_volume() + VOLUME_TOLERANCE {
                        return Err(LabError::Capacity(format!(
                            "tip {i} holds {held:.2}µL; {per_tip:.2}µL more exceeds {}µL",
                            self.tip_volume
                        )));
                    }
                }
            }
            Direction::Dispense => {
                let drains: Vec<(usize, f64)> = (0..channels).map(|i| (i, per_tip)).collect();
                self.tips.check_drain(&drains)?;
                for item in &items {
                    let after = item.get_total_volume() + per_item;
                    if after > item.capacity() + VOLUME_TOLERANCE {
                        return Err(LabError::Capacity(format!(
                            "overflow in {}: {:.2}µL + {per_item:.2}µL exceeds capacity {:.2}µL",
                            item.holder_id(),
                            item.get_total_volume(),
                            item.capacity()
                        )));
                    }
                }
            }
        }

        let depth = first.size().z;
        let relative = match (first.shape(), dir) {
            (Some(_), Direction::Aspirate) => {
                geometry::calculate_dynamic_remove_height(first, per_item)
            }
            (Some(_), Direction::Dispense) => geometry::calculate_dynamic_dispense_height(
                first,
                per_item,
                self.config.dispense_clearance,
            ),
            (None, Direction::Aspirate) => grid.remove_height().unwrap_or(depth * 0.75),
            (None, Direction::Dispense) => grid.add_height().unwrap_or(depth),
        };

        Ok(AccessPlan {
            xy: self.resolve_xy(labware_id, &positions)?,
            z: self.resolve_z(labware_id, depth, relative)?,
            positions,
            per_tip_items,
        })
    }

    // ==== 3. PRIMITIVES ====

    /// Aspirates `volume` (total across channels) at `pos`.
    pub fn suck(&mut self, source_id: &str, pos: GridPos, volume: f64) -> LabResult<()> {
        let plan = self.plan_access(source_id, pos, volume, Direction::Aspirate)?;
        let channels = self.channels();
        let per_tip = volume / channels as f64;

        self.hw_move_xy(plan.xy)?;
        self.hw_move_z(plan.z)?;
        self.hw_aspirate(per_tip)?;

        let lw = self.deck.get_labware_mut(source_id)?;
        let mut fills: Vec<ContentLedger> = Vec::with_capacity(channels);
        if plan.per_tip_items {
            for p in &plan.positions {
                fills.push(lw.vessel_mut(*p)?.remove_content(per_tip)?);
            }
        } else {
            let removed = lw.vessel_mut(plan.positions[0])?.remove_content(volume)?;
            let share = removed.scaled(1.0 / channels as f64);
            fills.extend(std::iter::repeat(share).take(channels));
        }
        let pairs: Vec<(usize, &ContentLedger)> = fills.iter().enumerate().collect();
        self.tips.fill(&pairs)?;
        self.bump();
        log::debug!("suck {volume:.2}µL from '{source_id}' at {pos}");

        self.hw_move_z(0.0)
    }

    /// Dispenses `volume` (total across channels) at `pos`.
    pub fn spit(&mut self, destination_id: &str, pos: GridPos, volume: f64) -> LabResult<()> {
        let plan = self.plan_access(destination_id, pos, volume, Direction::Dispense)?;
        let channels = self.channels();
        let per_tip = volume / channels as f64;

        self.hw_move_xy(plan.xy)?;
        self.hw_move_z(plan.z)?;
        self.hw_dispense(per_tip)?;

        let drains: Vec<(usize, f64)> = (0..channels).map(|i| (i, per_tip)).collect();
        let released = self.tips.drain(&drains)?;
        let lw = self.deck.get_labware_mut(destination_id)?;
        if plan.per_tip_items {
            for (p, mixture) in plan.positions.iter().zip(released.iter()) {
                lw.vessel_mut(*p)?.add_mixture(mixture)?;
            }
        } else {
            let mut pooled = ContentLedger::new();
            for mixture in &released {
                pooled.merge(mixture);
            }
            lw.vessel_mut(plan.positions[0])?.add_mixture(&pooled)?;
        }
        self.bump();
        log::debug!("spit {volume:.2}µL into '{destination_id}' at {pos}");

        self.hw_move_z(0.0)
    }

    // ==== 4. HIGH-LEVEL TRANSFERS ====

    /// Fills `destinations` with `volume_per_well` from one source position.
    pub fn add_medium(
        &mut self,
        source_id: &str,
        source_pos: GridPos,
        volume_per_well: f64,
        destination_id: &str,
        destinations: &[GridPos],
    ) -> LabResult<()> {
        if destinations.is_empty() {
            return Err(LabError::InvalidInput("add_medium needs at least one destination".into()));
        }
        let (per_position, max_volume) = self.volumes(volume_per_well)?;
        self.validate_positions(source_id, &[source_pos])?;
        self.validate_positions(destination_id, destinations)?;
        self.prepare_tips()?;

        if per_position > max_volume {
            let trips = plan_trips(per_position, max_volume);
            log::info!(
                "add_medium: {per_position}µL per position in {} trip(s) to {} position(s)",
                trips.len(),
                destinations.len()
            );
            for dest in destinations {
                for trip in &trips {
                    self.suck(source_id, source_pos, *trip as f64)?;
                    self.spit(destination_id, *dest, *trip as f64)?;
                }
            }
        } else {
            let size = batch_size(max_volume, per_position, self.config.max_batch_size);
            log::info!("add_medium: {per_position}µL per position, batches of {size}");
            for batch in destinations.chunks(size) {
                self.suck(source_id, source_pos, (per_position * batch.len() as u64) as f64)?;
                for dest in batch {
                    self.spit(destination_id, *dest, per_position as f64)?;
                }
            }
        }
        Ok(())
    }

    /// Empties `sources` by `volume_per_well` into one destination position.
    pub fn remove_medium(
        &mut self,
        source_id: &str,
        sources: &[GridPos],
        volume_per_well: f64,
        destination_id: &str,
        destination_pos: GridPos,
    ) -> LabResult<()> {
        if sources.is_empty() {
            return Err(LabError::InvalidInput("remove_medium needs at least one source".into()));
        }
        let (per_position, max_volume) = self.volumes(volume_per_well)?;
        self.validate_positions(source_id, sources)?;
        self.validate_positions(destination_id, &[destination_pos])?;
        self.prepare_tips()?;

        if per_position > max_volume {
            let trips = plan_trips(per_position, max_volume);
            log::info!(
                "remove_medium: {per_position}µL per position in {} trip(s) from {} position(s)",
                trips.len(),
                sources.len()
            );
            for src in sources {
                for trip in &trips {
                    self.suck(source_id, *src, *trip as f64)?;
                    self.spit(destination_id, destination_pos, *trip as f64)?;
                }
            }
        } else {
            let size = batch_size(max_volume, per_position, self.config.max_batch_size);
            log::info!("remove_medium: {per_position}µL per position, batches of {size}");
            for batch in sources.chunks(size) {
                for src in batch {
                    self.suck(source_id, *src, per_position as f64)?;
                }
                let pooled = (per_position * batch.len() as u64) as f64;
                self.spit(destination_id, destination_pos, pooled)?;
            }
        }
        Ok(())
    }

    /// Pairwise transfer; each pair is split into trips if needed.
    pub fn transfer_plate_to_plate(
        &mut self,
        source_id: &str,
        sources: &[GridPos],
        destination_id: &str,
        destinations: &[GridPos],
        volume_per_well: f64,
    ) -> LabResult<()> {
        if sources.len() != destinations.len() {
            return Err(LabError::InvalidInput(format!(
                "{} source position(s) but {} destination position(s)",
                sources.len(),
                destinations.len()
            )));
        }
        if sources.is_empty() {
            return Err(LabError::InvalidInput("transfer needs at least one position pair".into()));
        }
        let (per_position, max_volume) = self.volumes(volume_per_well)?;
        self.validate_positions(source_id, sources)?;
        self.validate_positions(destination_id, destinations)?;
        self.prepare_tips()?;

        let trips = plan_trips(per_position, max_volume);
        for (src, dest) in sources.iter().zip(destinations) {
            for trip in &trips {
                self.suck(source_id, *src, *trip as f64)?;
                self.spit(destination_id, *dest, *trip as f64)?;
            }
        }
        log::info!(
            "transferred {per_position}µL x {} from '{source_id}' to '{destination_id}'",
            sources.len()
        );
        Ok(())
    }

    /// Medium exchange: per batch, remove to waste then refill from source.
    /// Batches hold as many positions as one tip volume covers.
    #[allow(clippy::too_many_arguments)]
    pub fn remove_and_add(
        &mut self,
        plate_id: &str,
        positions: &[GridPos],
        volume_per_well: f64,
        waste_id: &str,
        waste_pos: GridPos,
        source_id: &str,
        source_pos: GridPos,
    ) -> LabResult<()> {
        if positions.is_empty() {
            return Err(LabError::InvalidInput("remove_and_add needs at least one position".into()));
        }
        check_volume("remove_and_add", volume_per_well)?;
        if volume_per_well <= 0.0 {
            return Err(LabError::InvalidInput("volume per well must be positive".into()));
        }
        self.validate_positions(plate_id, positions)?;
        self.validate_positions(waste_id, &[waste_pos])?;
        self.validate_positions(source_id, &[source_pos])?;
        let per_batch = ((f64::from(self.tip_volume) / volume_per_well) as usize).max(1);
        for batch in positions.chunks(per_batch) {
            self.remove_medium(plate_id, batch, volume_per_well, waste_id, waste_pos)?;
            self.add_medium(source_id, source_pos, volume_per_well, plate_id, batch)?;
        }
        Ok(())
    }
}
