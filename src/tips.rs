// src/tips.rs
//
// =============================================================================
// PIPETLAB: TIP MANAGER (v 0.1 )
// =============================================================================
//
// Pick / return / replace / discard on top of the liquid handler.
//
// States: rack position ∈ {occupied, available}; head ∈ {no-tip, has-tip}.
//
// Candidate search: every candidate is attempted in order and yields an
// explicit outcome. A driver `CommandFailed` is an ordinary outcome
// (try the next one); anything else stops the search. No success means
// a `TipState` error listing every outcome.

use crate::core::{column_block, GridPos, Xy};
use crate::drivers::MotorDriver;
use crate::errors::{LabError, LabResult};
use crate::labware::{BlockStatus, GridContainer, Labware, PipetteHolder, Placeable};
use crate::pipettor::LiquidHandler;
use std::fmt;

// ============================================================================
// 1. CANDIDATE OUTCOMES
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum CandidateOutcome {
    Picked(GridPos),
    Returned(GridPos),
    /// Block was not in the state the operation needs.
    Skipped(GridPos, BlockStatus),
    /// Driver reported `CommandFailed` at this candidate.
    HardwareFailed(GridPos, String),
}

impl CandidateOutcome {
    fn is_done(&self) -> bool {
        matches!(self, CandidateOutcome::Picked(_) | CandidateOutcome::Returned(_))
    }
}

impl fmt::Display for CandidateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateOutcome::Picked(p) => write!(f, "{p}: picked"),
            CandidateOutcome::Returned(p) => write!(f, "{p}: returned"),
            CandidateOutcome::Skipped(p, s) => write!(f, "{p}: skipped ({s:?})"),
            CandidateOutcome::HardwareFailed(p, e) => write!(f, "{p}: {e}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TipMove {
    Pick,
    Return,
}

impl TipMove {
    fn wanted(self) -> BlockStatus {
        match self {
            TipMove::Pick => BlockStatus::FullyOccupied,
            TipMove::Return => BlockStatus::FullyAvailable,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            TipMove::Pick => "pick",
            TipMove::Return => "return",
        }
    }
}

/// Everything needed to move over a rack block, computed before any motion.
struct RackTarget {
    block: Vec<GridPos>,
    xy: Xy,
    z: f64,
}

// ============================================================================
// 2. TIP OPERATIONS
// ============================================================================

impl<D: MotorDriver> LiquidHandler<D> {
    fn rack(&self, holder_id: &str) -> LabResult<&PipetteHolder> {
        match self.deck.get_labware(holder_id)? {
            Labware::PipetteHolder(h) => Ok(h),
            other => Err(LabError::InvalidInput(format!(
                "'{holder_id}' is a {}, not a tip rack",
                other.class_name()
            ))),
        }
    }

    fn rack_mut(&mut self, holder_id: &str) -> LabResult<&mut PipetteHolder> {
        match self.deck.get_labware_mut(holder_id)? {
            Labware::PipetteHolder(h) => Ok(h),
            _ => Err(LabError::InvalidInput(format!("'{holder_id}' is not a tip rack"))),
        }
    }

    fn rack_target(&self, holder_id: &str, start: GridPos, kind: TipMove) -> LabResult<RackTarget> {
        let rack = self.rack(holder_id)?;
        let block = column_block(start.col, start.row, self.channels());
        let depth = rack.child_size(start)?.z;
        let relative = match kind {
            TipMove::Pick => rack.remove_height,
            TipMove::Return => rack.add_height,
        };
        Ok(RackTarget {
            xy: self.resolve_xy(holder_id, &block)?,
            z: self.resolve_z(holder_id, depth, relative)?,
            block,
        })
    }

    /// Picks tips from the first usable candidate. With `positions` None the
    /// rack is scanned for fully occupied blocks. Returns the picked start.
    pub fn pick_tips(
        &mut self,
        holder_id: &str,
        positions: Option<&[GridPos]>,
    ) -> LabResult<Vec<GridPos>> {
        if self.has_tips {
            return Err(LabError::TipState("tips already attached; return or discard first".into()));
        }
        let channels = self.channels();
        let candidates: Vec<GridPos> = match positions {
            Some(p) => p.to_vec(),
            None => {
                let rack = self.rack(holder_id)?;
                if channels > 1 {
                    rack.occupied_blocks(channels)
                } else {
                    rack.occupied_positions()
                }
            }
        };
        if candidates.is_empty() {
            return Err(LabError::TipState(format!("no tips left in '{holder_id}'")));
        }
        let start = self.search(holder_id, candidates, TipMove::Pick)?;
        log::info!("✓ picked {channels} tip(s) at {start} from '{holder_id}'");
        Ok(vec![start])
    }

    /// Returns the attached tips into the first fully available candidate.
    pub fn return_tips(
        &mut self,
        holder_id: &str,
        positions: Option<&[GridPos]>,
    ) -> LabResult<Vec<GridPos>> {
        if !self.has_tips {
            return Err(LabError::TipState("no tips attached to return".into()));
        }
        let channels = self.channels();
        let candidates: Vec<GridPos> = match positions {
            Some(p) => p.to_vec(),
            None => {
                let rack = self.rack(holder_id)?;
                if channels > 1 {
                    rack.available_blocks(channels)
                } else {
                    rack.available_positions()
                }
            }
        };
        if candidates.is_empty() {
            return Err(LabError::TipState(format!(
                "no free block for {channels} tip(s) in '{holder_id}'"
            )));
        }
        let start = self.search(holder_id, candidates, TipMove::Return)?;
        log::info!("returned {channels} tip(s) to {start} in '{holder_id}'");
        Ok(vec![start])
    }

    /// Attempts candidates in order until one succeeds.
    fn search(
        &mut self,
        holder_id: &str,
        candidates: Vec<GridPos>,
        kind: TipMove,
    ) -> LabResult<GridPos> {
        let mut outcomes = Vec::with_capacity(candidates.len());
        for start in candidates {
            let outcome = self.try_candidate(holder_id, start, kind)?;
            if outcome.is_done() {
                return Ok(start);
            }
            outcomes.push(outcome);
        }
        let report: Vec<String> = outcomes.iter().map(ToString::to_string).collect();
        Err(LabError::TipState(format!(
            "could not {} tips in '{holder_id}': {}",
            kind.verb(),
            report.join("; ")
        )))
    }

    fn try_candidate(
        &mut self,
        holder_id: &str,
        start: GridPos,
        kind: TipMove,
    ) -> LabResult<CandidateOutcome> {
        let channels = self.channels();
        let status = self.rack(holder_id)?.block_status(start.col, start.row, channels);
        if status != kind.wanted() {
            return Ok(CandidateOutcome::Skipped(start, status));
        }
        let target = self.rack_target(holder_id, start, kind)?;

        let attempt = match kind {
            TipMove::Pick => self
                .hw_move_xy(target.xy)
                .and_then(|()| self.hw_pick_tip(target.z)),
            TipMove::Return => self
                .hw_move_xy(target.xy)
                .and_then(|()| self.hw_move_z(target.z))
                .and_then(|()| self.hw_eject_tip()),
        };
        // An abort has already homed the arm.
        if matches!(attempt, Err(LabError::Aborted)) {
            return Err(LabError::Aborted);
        }
        self.hw_move_z(0.0)?;

        match attempt {
            Ok(()) => {
                let occupied = kind == TipMove::Return;
                self.rack_mut(holder_id)?.set_occupied(&target.block, occupied)?;
                self.tips.clear();
                self.has_tips = !occupied;
                self.bump();
                Ok(match kind {
                    TipMove::Pick => CandidateOutcome::Picked(start),
                    TipMove::Return => CandidateOutcome::Returned(start),
                })
            }
            Err(e) if e.is_retryable_hardware() => {
                log::warn!("{} at {start} in '{holder_id}' failed: {e}; trying next", kind.verb());
                if kind == TipMove::Pick && channels == 1 {
                    // Single position reported empty: stop offering it.
                    self.rack_mut(holder_id)?.set_occupied(&target.block, false)?;
                    self.bump();
                }
                Ok(CandidateOutcome::HardwareFailed(start, e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Return, then pick (from `pick_holder_id` when given).
    pub fn replace_tips(
        &mut self,
        holder_id: &str,
        return_positions: Option<&[GridPos]>,
        pick_holder_id: Option<&str>,
        pick_positions: Option<&[GridPos]>,
    ) -> LabResult<Vec<GridPos>> {
        self.checkpoint()?;
        self.return_tips(holder_id, return_positions)?;
        self.pick_tips(pick_holder_id.unwrap_or(holder_id), pick_positions)
    }

    /// Ejects the attached tips into a dropzone (the first one when None).
    pub fn discard_tips(&mut self, dropzone_id: Option<&str>) -> LabResult<()> {
        self.checkpoint()?;
        if !self.has_tips {
            return Err(LabError::TipState("no tips attached to discard".into()));
        }
        let zone = match dropzone_id {
            Some(id) => match self.deck.get_labware(id)? {
                Labware::TipDropzone(z) => z,
                other => {
                    return Err(LabError::InvalidInput(format!(
                        "'{id}' is a {}, not a tip dropzone",
                        other.class_name()
                    )))
                }
            },
            None => self
                .deck
                .first_dropzone()
                .ok_or_else(|| LabError::NotFound("no tip dropzone on the deck".into()))?,
        };
        let zone_id = zone.id().to_string();
        let xy = zone
            .position()
            .ok_or_else(|| LabError::Placement(format!("{zone_id} is not placed")))?;
        let z = self.resolve_z(&zone_id, zone.size().z, zone.drop_height_relative)?;

        self.hw_move_xy(xy)?;
        self.hw_move_z(z)?;
        self.hw_eject_tip()?;
        self.hw_move_z(0.0)?;

        self.tips.clear();
        self.has_tips = false;
        self.bump();
        log::info!("✂️ discarded tips into '{zone_id}'");
        Ok(())
    }

    /// Applies the tip-change policy before a high-level transfer.
    pub(crate) fn prepare_tips(&mut self) -> LabResult<()> {
        if !self.change_tips {
            if !self.has_tips {
                return Err(LabError::TipState(
                    "no tips attached and tip changing is disabled".into(),
                ));
            }
            return Ok(());
        }
        let rack = self
            .deck
            .first_pipette_holder()
            .map(|h| h.id().to_string())
            .ok_or_else(|| {
                LabError::TipState("tip change requested but no tip rack on the deck".into())
            })?;
        if self.has_tips {
            if self.deck.first_dropzone().is_some() {
                self.discard_tips(None)?;
            } else {
                self.return_tips(&rack, None)?;
            }
        }
        self.pick_tips(&rack, None).map(|_| ())
    }
}
