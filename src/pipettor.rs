// src/pipettor.rs
//
// =============================================================================
// PIPETLAB: LIQUID HANDLER (v 0.1 )
// =============================================================================
//
// The engine object. Owns the deck, the driver and the tip ledger.
//
// Responsibilities:
// 1. Gate every hardware call behind an abort/pause checkpoint.
// 2. Skip hardware entirely in simulation mode (ledgers still update).
// 3. Resolve labware-relative targets into arm coordinates.
// 4. Take and restore versioned state snapshots.
//
// Tip handling lives in tips.rs, liquid movement in transfer.rs.

use crate::config::PipettorConfig;
use crate::content::TipLedger;
use crate::core::{GridPos, Xy};
use crate::deck::Deck;
use crate::drivers::MotorDriver;
use crate::errors::{LabError, LabResult};
use crate::labware::{GridContainer, LabwareState};
use crate::resolver::{self, ZRequest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// 1. OPERATOR CONTROL
// ============================================================================

/// Cloneable handle for requesting abort/pause from another thread.
#[derive(Debug, Clone, Default)]
pub struct ControlHandle {
    abort: Arc<AtomicBool>,
    pause: Arc<AtomicBool>,
}

impl ControlHandle {
    pub fn request_abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    pub fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.pause.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }

    /// Consumes a pending abort request.
    fn take_abort(&self) -> bool {
        self.abort.swap(false, Ordering::SeqCst)
    }
}

// ============================================================================
// 2. SNAPSHOTS
// ============================================================================

/// Immutable copy of all mutable engine state, keyed by labware id.
/// Placement topology is not part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub version: u64,
    pub has_tips: bool,
    pub tips: TipLedger,
    pub labware: BTreeMap<String, LabwareState>,
}

// ============================================================================
// 3. THE ENGINE
// ============================================================================

pub struct LiquidHandler<D: MotorDriver> {
    pub(crate) deck: Deck,
    pub(crate) driver: D,
    pub(crate) config: PipettorConfig,
    pub(crate) multichannel: bool,
    pub(crate) tip_volume: u32,
    pub(crate) tip_length: f64,
    pub(crate) tips: TipLedger,
    pub(crate) has_tips: bool,
    pub(crate) simulation: bool,
    /// Swap tips before every high-level transfer.
    pub change_tips: bool,
    control: ControlHandle,
    version: u64,
}

impl<D: MotorDriver> LiquidHandler<D> {
    pub fn new(
        deck: Deck,
        driver: D,
        config: &PipettorConfig,
        tip_volume: u32,
        multichannel: bool,
    ) -> LabResult<Self> {
        config.validate()?;
        let tip_length = config.tip_length(tip_volume)?;
        let channels = config.channels(multichannel);
        log::info!(
            "liquid handler ready: {} channel(s), {}µL tips ({:.0} mm), deck '{}'",
            channels,
            tip_volume,
            tip_length,
            deck.id
        );
        Ok(Self {
            deck,
            driver,
            config: config.clone(),
            multichannel,
            tip_volume,
            tip_length,
            tips: TipLedger::new(channels, f64::from(tip_volume)),
            has_tips: false,
            simulation: false,
            change_tips: false,
            control: ControlHandle::default(),
            version: 0,
        })
    }

    // ==== ACCESSORS ====

    pub fn deck(&self) -> &Deck {
        &self.deck
    }

    /// Placement changes only. Content is written by transfer operations.
    pub fn deck_mut(&mut self) -> &mut Deck {
        &mut self.deck
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn config(&self) -> &PipettorConfig {
        &self.config
    }

    pub fn control(&self) -> ControlHandle {
        self.control.clone()
    }

    pub fn channels(&self) -> usize {
        self.config.channels(self.multichannel)
    }

    pub fn is_multichannel(&self) -> bool {
        self.multichannel
    }

    pub fn tip_volume(&self) -> u32 {
        self.tip_volume
    }

    pub fn has_tips(&self) -> bool {
        self.has_tips
    }

    pub fn tips(&self) -> &TipLedger {
        &self.tips
    }

    /// Bumped on every ledger or tip-state change.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn set_simulation_mode(&mut self, on: bool) {
        if on != self.simulation {
            log::info!("simulation mode {}", if on { "ON" } else { "OFF" });
        }
        self.simulation = on;
    }

    pub fn is_simulation(&self) -> bool {
        self.simulation
    }

    pub fn into_parts(self) -> (Deck, D) {
        (self.deck, self.driver)
    }

    pub(crate) fn bump(&mut self) {
        self.version += 1;
    }

    // ==== CHECKPOINT ====

    /// Samples abort/pause before a hardware call. Abort homes the arm and
    /// surfaces `Aborted`; pause blocks until resumed or aborted.
    pub(crate) fn checkpoint(&mut self) -> LabResult<()> {
        if self.simulation {
            return Ok(());
        }
        if self.control.take_abort() {
            return Err(self.abort_and_home());
        }
        if self.control.is_paused() {
            log::info!("⏸ paused; waiting for resume");
            while self.control.is_paused() {
                if self.control.take_abort() {
                    return Err(self.abort_and_home());
                }
                std::thread::sleep(Duration::from_millis(self.config.pause_poll_ms));
            }
            log::info!("▶ resumed");
        }
        Ok(())
    }

    fn abort_and_home(&mut self) -> LabError {
        log::warn!("🛑 abort requested; homing");
        // An aborted run must not leave the next one parked in the pause loop.
        self.control.resume();
        if let Err(e) = self.raw_home() {
            log::error!("recovery home failed: {e}");
        }
        LabError::Aborted
    }

    fn raw_home(&mut self) -> LabResult<()> {
        self.driver.move_z(0.0, true)?;
        self.driver.move_xy(0.0, 0.0, true)?;
        Ok(())
    }

    // ==== HARDWARE WRAPPERS ====

    pub(crate) fn hw_move_xy(&mut self, at: Xy) -> LabResult<()> {
        self.checkpoint()?;
        if self.simulation {
            log::debug!("[sim] move_xy {at}");
            return Ok(());
        }
        Ok(self.driver.move_xy(at.x, at.y, true)?)
    }

    pub(crate) fn hw_move_z(&mut self, z: f64) -> LabResult<()> {
        self.checkpoint()?;
        if self.simulation {
            log::debug!("[sim] move_z {z:.2}");
            return Ok(());
        }
        Ok(self.driver.move_z(z, true)?)
    }

    pub(crate) fn hw_aspirate(&mut self, per_tip: f64) -> LabResult<()> {
        self.checkpoint()?;
        if self.simulation {
            log::debug!("[sim] aspirate {per_tip:.2}µL/tip");
            return Ok(());
        }
        Ok(self.driver.aspirate(per_tip, true)?)
    }

    pub(crate) fn hw_dispense(&mut self, per_tip: f64) -> LabResult<()> {
        self.checkpoint()?;
        if self.simulation {
            log::debug!("[sim] dispense {per_tip:.2}µL/tip");
            return Ok(());
        }
        Ok(self.driver.dispense(per_tip, true)?)
    }

    pub(crate) fn hw_pick_tip(&mut self, limit: f64) -> LabResult<()> {
        self.checkpoint()?;
        if self.simulation {
            log::debug!("[sim] pick_tip limit {limit:.2}");
            return Ok(());
        }
        Ok(self.driver.pick_tip(limit)?)
    }

    pub(crate) fn hw_eject_tip(&mut self) -> LabResult<()> {
        self.checkpoint()?;
        if self.simulation {
            log::debug!("[sim] eject_tip");
            return Ok(());
        }
        Ok(self.driver.eject_tip()?)
    }

    /// Z up to 0, then XY to the origin.
    pub fn home(&mut self) -> LabResult<()> {
        self.hw_move_z(0.0)?;
        self.hw_move_xy(Xy::new(0.0, 0.0))
    }

    pub fn move_xy(&mut self, x: f64, y: f64) -> LabResult<()> {
        self.hw_move_xy(Xy::new(x, y))
    }

    pub fn move_z(&mut self, z: f64) -> LabResult<()> {
        if z < 0.0 || z > self.config.z_max {
            return Err(LabError::Reachability {
                pipettor_z: z,
                z_max: self.config.z_max,
                target: "manual move".into(),
            });
        }
        self.hw_move_z(z)
    }

    // ==== COORDINATES ====

    /// Pipettor Z for a height above the bottom of a child of `labware_id`.
    pub fn resolve_z(&self, labware_id: &str, child_depth: f64, relative_z: f64) -> LabResult<f64> {
        let entry = self.deck.entry(labware_id)?;
        let req = ZRequest {
            labware_top: entry.max_z,
            child_depth,
            relative_z,
            tip_length: if self.has_tips { self.tip_length } else { 0.0 },
        };
        resolver::pipettor_z(&req, self.deck.range_z, self.config.z_max, labware_id)
    }

    /// Arm XY over a contiguous block of children of `labware_id`.
    pub fn resolve_xy(&self, labware_id: &str, positions: &[GridPos]) -> LabResult<Xy> {
        let grid = self.deck.get_labware(labware_id)?.grid()?;
        let points = positions
            .iter()
            .map(|p| grid.child_position(*p))
            .collect::<LabResult<Vec<_>>>()?;
        resolver::robot_xy(&points)
    }

    // ==== SNAPSHOTS ====

    pub fn push_state(&self) -> StateSnapshot {
        let labware = self
            .deck
            .labware()
            .map(|lw| (lw.id().to_string(), lw.capture_state()))
            .collect();
        StateSnapshot {
            version: self.version,
            has_tips: self.has_tips,
            tips: self.tips.clone(),
            labware,
        }
    }

    /// Restores a snapshot. Fails without changes if a captured labware
    /// is no longer on the deck.
    pub fn pop_state(&mut self, snapshot: &StateSnapshot) -> LabResult<()> {
        if let Some(missing) = snapshot.labware.keys().find(|id| !self.deck.contains_labware(id)) {
            return Err(LabError::NotFound(format!(
                "snapshot v{} refers to '{missing}', which is no longer on the deck",
                snapshot.version
            )));
        }
        for (id, state) in &snapshot.labware {
            self.deck.get_labware_mut(id)?.restore_state(state);
        }
        self.tips = snapshot.tips.clone();
        self.has_tips = snapshot.has_tips;
        self.version = snapshot.version;
        log::debug!("restored state snapshot v{}", snapshot.version);
        Ok(())
    }

    /// Runs `f` in simulation mode and rolls all state back afterwards.
    pub fn dry_run<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> LabResult<T> {
        let snapshot = self.push_state();
        let previous = self.simulation;
        self.set_simulation_mode(true);
        let out = f(self);
        self.set_simulation_mode(previous);
        self.pop_state(&snapshot)?;
        Ok(out)
    }
}
