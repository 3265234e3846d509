// src/geometry.rs
//
// =============================================================================
// PIPETLAB: LIQUID GEOMETRY (v 0.1 )
// =============================================================================
//
// Shape-aware liquid height (mm above the vessel bottom) for a given volume.
// Volumes are µL, i.e. mm³. Every result is clamped to [0, size_z].
//
// All functions are pure: dynamic heights are computed from volumes directly
// instead of temporarily rescaling the vessel's ledger.

use crate::content::ContentHolder;
use crate::core::{Dimensions, Shape};
use crate::labware::{Placeable, Vessel};
use std::f64::consts::PI;

// ============================================================================
// 1. STATIC HEIGHT
// ============================================================================

pub fn liquid_height(shape: Shape, size: Dimensions, volume: f64) -> f64 {
    if !(volume > 0.0) {
        return 0.0;
    }
    let radius = size.x.min(size.y) / 2.0;
    let h = match shape {
        Shape::Rectangular => volume / (size.x * size.y),
        Shape::Circular => volume / (PI * radius * radius),
        Shape::Conical => {
            let depth = size.z;
            (3.0 * volume * depth * depth / (PI * radius * radius)).cbrt()
        }
        Shape::UBottom => {
            let hemisphere = (2.0 / 3.0) * PI * radius.powi(3);
            if volume <= hemisphere {
                // Linear approximation inside the hemisphere.
                volume / hemisphere * radius
            } else {
                radius + (volume - hemisphere) / (PI * radius * radius)
            }
        }
    };
    clamp_height(h, size.z)
}

fn clamp_height(h: f64, depth: f64) -> f64 {
    if h.is_nan() {
        return 0.0;
    }
    h.clamp(0.0, depth)
}

/// Current liquid height of a vessel. Vessels without a shape are
/// treated as rectangular.
pub fn calculate_liquid_height(vessel: &dyn Vessel) -> f64 {
    liquid_height(
        vessel.shape().unwrap_or_default(),
        vessel.size(),
        vessel.get_total_volume(),
    )
}

// ============================================================================
// 2. DYNAMIC HEIGHTS
// ============================================================================

fn midpoint_height(shape: Shape, size: Dimensions, from: f64, to: f64) -> f64 {
    (liquid_height(shape, size, from) + liquid_height(shape, size, to)) / 2.0
}

/// Midpoint between the surface before and after removing `volume`.
pub fn dynamic_remove_height(shape: Shape, size: Dimensions, current: f64, volume: f64) -> f64 {
    midpoint_height(shape, size, current, (current - volume).max(0.0))
}

/// Midpoint between the surface before and after adding `volume`.
pub fn dynamic_dispense_height(shape: Shape, size: Dimensions, current: f64, volume: f64) -> f64 {
    midpoint_height(shape, size, current, current + volume)
}

pub fn calculate_dynamic_remove_height(vessel: &dyn Vessel, volume_to_remove: f64) -> f64 {
    dynamic_remove_height(
        vessel.shape().unwrap_or_default(),
        vessel.size(),
        vessel.get_total_volume(),
        volume_to_remove,
    )
}

/// Dispense target, raised by `clearance` so the tip stays above the liquid.
pub fn calculate_dynamic_dispense_height(
    vessel: &dyn Vessel,
    volume_to_add: f64,
    clearance: f64,
) -> f64 {
    dynamic_dispense_height(
        vessel.shape().unwrap_or_default(),
        vessel.size(),
        vessel.get_total_volume(),
        volume_to_add,
    ) + clearance
}
