// src/resolver.rs
//
// =============================================================================
// PIPETLAB: COORDINATE RESOLVER (v 0.1 )
// =============================================================================
//
// Labware-relative targets -> absolute pipettor coordinates.
//
// Z frame: the pipettor measures Z downward from the top of the deck range,
// so a larger absolute height means a smaller pipettor Z.
//
//   reference_bottom = labware_top - child_depth
//   absolute_height  = max(reference_bottom + relative_z, reference_bottom + 1)
//   pipettor_z       = deck_range_z - absolute_height - tip_length

use crate::core::Xy;
use crate::errors::{LabError, LabResult};

/// Minimum clearance above the reference bottom (mm).
pub const MIN_BOTTOM_CLEARANCE: f64 = 1.0;

/// Inputs to a single Z resolution.
#[derive(Debug, Clone, Copy)]
pub struct ZRequest {
    /// Top of the labware in its slot (max_z of its stack band).
    pub labware_top: f64,
    /// Depth of the addressed child (or of the labware itself).
    pub child_depth: f64,
    /// Target height above the child bottom.
    pub relative_z: f64,
    /// 0 when no tip is attached.
    pub tip_length: f64,
}

pub fn absolute_height(req: &ZRequest) -> f64 {
    let reference_bottom = req.labware_top - req.child_depth;
    (reference_bottom + req.relative_z).max(reference_bottom + MIN_BOTTOM_CLEARANCE)
}

/// Resolves pipettor Z, failing when it leaves `[0, z_max]`.
pub fn pipettor_z(req: &ZRequest, deck_range_z: f64, z_max: f64, target: &str) -> LabResult<f64> {
    let z = deck_range_z - absolute_height(req) - req.tip_length;
    if z < 0.0 || z > z_max {
        return Err(LabError::Reachability {
            pipettor_z: z,
            z_max,
            target: target.to_string(),
        });
    }
    Ok(z)
}

/// Arm XY for a block of accessed items. One item: its own position.
/// Several: midpoint of the first and last, centring the head over the span.
pub fn robot_xy(items: &[Xy]) -> LabResult<Xy> {
    match items {
        [] => Err(LabError::InvalidInput("no positions to move to".into())),
        [single] => Ok(*single),
        [first, .., last] => Ok(first.midpoint(last)),
    }
}
