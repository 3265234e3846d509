// src/drivers.rs
//
// =============================================================================
// PIPETLAB: DRIVER PORT (v 0.1 )
// =============================================================================
//
// The Hexagonal Port towards the motor/piston controller.
//
// Responsibilities:
// 1. Define the `MotorDriver` trait (The Contract).
// 2. Provide the recording simulator used for dry runs and tests.
//
// Calls are synchronous; `wait` blocks until the axis has stopped.

use crate::errors::DriverError;
use serde::{Deserialize, Serialize};

pub mod simulator;

pub use simulator::{DriverCommand, SimulatedDriver};

pub type DriverResult<T> = Result<T, DriverError>;

/// Current head coordinates (mm).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HeadPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Axis speed settings as reported by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisSpeeds {
    pub xy: u32,
    pub z: u32,
    pub piston: u32,
}

// ============================================================================
// 1. THE DRIVER TRAIT (The Contract)
// ============================================================================

pub trait MotorDriver {
    fn move_xy(&mut self, x: f64, y: f64, wait: bool) -> DriverResult<()>;
    fn move_z(&mut self, z: f64, wait: bool) -> DriverResult<()>;

    /// Volume per channel (µL).
    fn aspirate(&mut self, volume: f64, wait: bool) -> DriverResult<()>;
    /// Volume per channel (µL).
    fn dispense(&mut self, volume: f64, wait: bool) -> DriverResult<()>;
    fn dispense_all(&mut self) -> DriverResult<()>;

    /// Lowers until a tip is seated; `limit` is the deepest Z allowed.
    fn pick_tip(&mut self, limit: f64) -> DriverResult<()>;
    fn eject_tip(&mut self) -> DriverResult<()>;

    fn wait_until_stopped(&mut self) -> DriverResult<()>;

    fn position(&self) -> HeadPosition;
    fn speeds(&self) -> AxisSpeeds;
    fn is_connected(&self) -> bool;
}

impl<D: MotorDriver + ?Sized> MotorDriver for Box<D> {
    fn move_xy(&mut self, x: f64, y: f64, wait: bool) -> DriverResult<()> {
        (**self).move_xy(x, y, wait)
    }
    fn move_z(&mut self, z: f64, wait: bool) -> DriverResult<()> {
        (**self).move_z(z, wait)
    }
    fn aspirate(&mut self, volume: f64, wait: bool) -> DriverResult<()> {
        (**self).aspirate(volume, wait)
    }
    fn dispense(&mut self, volume: f64, wait: bool) -> DriverResult<()> {
        (**self).dispense(volume, wait)
    }
    fn dispense_all(&mut self) -> DriverResult<()> {
        (**self).dispense_all()
    }
    fn pick_tip(&mut self, limit: f64) -> DriverResult<()> {
        (**self).pick_tip(limit)
    }
    fn eject_tip(&mut self) -> DriverResult<()> {
        (**self).eject_tip()
    }
    fn wait_until_stopped(&mut self) -> DriverResult<()> {
        (**self).wait_until_stopped()
    }
    fn position(&self) -> HeadPosition {
        (**self).position()
    }
    fn speeds(&self) -> AxisSpeeds {
        (**self).speeds()
    }
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}
