// src/core.rs
//
// =============================================================================
// PIPETLAB: CORE SCHEMA (v 0.1 )
// =============================================================================
//
// Shared value types used by every layer of the engine.
//
// Design Principles:
// 1. Plain Values: Positions, sizes and grid addresses are `Copy` structs.
// 2. One Convention: X grows leftward, Y grows downward (hardware frame).
// 3. Rounding: Derived coordinates are rounded to 0.01 mm, like the firmware.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Volumes below this are treated as zero and pruned from ledgers.
pub const PRUNE_EPSILON: f64 = 1e-6;

/// Floating tolerance (µL) applied to removal and tip capacity checks.
pub const VOLUME_TOLERANCE: f64 = 0.01;

// ============================================================================
// 1. SPATIAL VALUES
// ============================================================================

/// Absolute deck coordinate in millimetres.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Xy {
    pub x: f64,
    pub y: f64,
}

impl Xy {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn midpoint(&self, other: &Xy) -> Xy {
        Xy::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

impl fmt::Display for Xy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

/// Physical extent of a piece of labware (mm).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Dimensions {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Dimensions {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Axis-aligned range on one axis. Stored as given; `lo()`/`hi()` normalise.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Span(pub f64, pub f64);

impl Span {
    pub fn lo(&self) -> f64 {
        self.0.min(self.1)
    }

    pub fn hi(&self) -> f64 {
        self.0.max(self.1)
    }

    pub fn len(&self) -> f64 {
        self.hi() - self.lo()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 0.0
    }

    pub fn contains_span(&self, other: &Span) -> bool {
        other.lo() >= self.lo() && other.hi() <= self.hi()
    }

    /// Strict overlap; touching edges do not count.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.lo() < other.hi() && other.lo() < self.hi()
    }
}

/// (column, row) address inside a grid container. Zero-indexed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridPos {
    pub col: usize,
    pub row: usize,
}

impl GridPos {
    pub fn new(col: usize, row: usize) -> Self {
        Self { col, row }
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

/// Builds the contiguous column block `(col, row)..(col, row + count)`.
pub fn column_block(col: usize, start_row: usize, count: usize) -> Vec<GridPos> {
    (start_row..start_row + count)
        .map(|row| GridPos::new(col, row))
        .collect()
}

// ============================================================================
// 2. VESSEL SHAPES
// ============================================================================

/// Cross-section model used by the geometry engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    #[default]
    Rectangular,
    Circular,
    /// Apex down.
    Conical,
    /// Hemispherical bottom under a cylinder.
    UBottom,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Shape::Rectangular => "rectangular",
            Shape::Circular => "circular",
            Shape::Conical => "conical",
            Shape::UBottom => "u_bottom",
        };
        f.write_str(s)
    }
}

// ============================================================================
// 3. HELPERS
// ============================================================================

/// Round to two decimals (0.01 mm resolution of the motion controller).
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Default labware id: `labware_` + 8 hex chars of a v4 uuid.
pub fn generate_labware_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("labware_{}", &hex[..8])
}

/// Id of a grid child: `<parent>_<col>:<row>`.
pub fn child_id(parent: &str, col: usize, row: usize) -> String {
    format!("{}_{}:{}", parent, col, row)
}
