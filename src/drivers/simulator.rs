// src/drivers/simulator.rs
//
// =============================================================================
// PIPETLAB: SIMULATED PIPETTOR (v 0.1 )
// =============================================================================
//
// In-memory stand-in for the controller.
//
// Responsibilities:
// 1. Track head position, tip presence and piston volume.
// 2. Record every accepted command for inspection.
// 3. Reproduce controller failures (no tip, overdraw, injected faults).

use super::{AxisSpeeds, DriverResult, HeadPosition, MotorDriver};
use crate::errors::DriverError;
use serde::{Deserialize, Serialize};

/// One accepted command, in issue order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum DriverCommand {
    MoveXy { x: f64, y: f64 },
    MoveZ { z: f64 },
    Aspirate { volume: f64 },
    Dispense { volume: f64 },
    DispenseAll,
    PickTip { limit: f64 },
    EjectTip,
}

#[derive(Debug, Clone)]
pub struct SimulatedDriver {
    position: HeadPosition,
    has_tip: bool,
    volume: f64,
    tip_capacity: f64,
    connected: bool,
    pick_failures: usize,
    move_failures: usize,
    eject_failures: usize,
    log: Vec<DriverCommand>,
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new(1000.0)
    }
}

impl SimulatedDriver {
    pub fn new(tip_capacity: f64) -> Self {
        Self {
            position: HeadPosition::default(),
            has_tip: false,
            volume: 0.0,
            tip_capacity,
            connected: true,
            pick_failures: 0,
            move_failures: 0,
            eject_failures: 0,
            log: Vec::new(),
        }
    }

    /// The next `n` `pick_tip` calls report `CommandFailed`.
    pub fn fail_next_picks(&mut self, n: usize) {
        self.pick_failures = n;
    }

    /// The next `n` `move_xy` calls report `CommandFailed` (blocked motion).
    pub fn fail_next_moves(&mut self, n: usize) {
        self.move_failures = n;
    }

    pub fn fail_next_ejects(&mut self, n: usize) {
        self.eject_failures = n;
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn commands(&self) -> &[DriverCommand] {
        &self.log
    }

    pub fn take_commands(&mut self) -> Vec<DriverCommand> {
        std::mem::take(&mut self.log)
    }

    pub fn has_tip(&self) -> bool {
        self.has_tip
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    fn ensure_connected(&self) -> DriverResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(DriverError::NotConnected)
        }
    }
}

impl MotorDriver for SimulatedDriver {
    fn move_xy(&mut self, x: f64, y: f64, _wait: bool) -> DriverResult<()> {
        self.ensure_connected()?;
        if self.move_failures > 0 {
            self.move_failures -= 1;
            return Err(DriverError::CommandFailed("motion blocked".into()));
        }
        self.position.x = x;
        self.position.y = y;
        self.log.push(DriverCommand::MoveXy { x, y });
        Ok(())
    }

    fn move_z(&mut self, z: f64, _wait: bool) -> DriverResult<()> {
        self.ensure_connected()?;
        if z < 0.0 {
            return Err(DriverError::CommandNotAccepted(format!("z {z:.2} below travel range")));
        }
        self.position.z = z;
        self.log.push(DriverCommand::MoveZ { z });
        Ok(())
    }

    fn aspirate(&mut self, volume: f64, _wait: bool) -> DriverResult<()> {
        self.ensure_connected()?;
        if !self.has_tip {
            return Err(DriverError::CommandFailed("aspirate without a tip".into()));
        }
        if self.volume + volume > self.tip_capacity + 0.01 {
            return Err(DriverError::CommandFailed(format!(
                "aspirate {volume:.2}µL exceeds tip capacity ({:.2}µL held)",
                self.volume
            )));
        }
        self.volume += volume;
        self.log.push(DriverCommand::Aspirate { volume });
        Ok(())
    }

    fn dispense(&mut self, volume: f64, _wait: bool) -> DriverResult<()> {
        self.ensure_connected()?;
        if volume > self.volume + 0.01 {
            return Err(DriverError::CommandFailed(format!(
                "dispense {volume:.2}µL but only {:.2}µL held",
                self.volume
            )));
        }
        self.volume = (self.volume - volume).max(0.0);
        self.log.push(DriverCommand::Dispense { volume });
        Ok(())
    }

    fn dispense_all(&mut self) -> DriverResult<()> {
        self.ensure_connected()?;
        self.volume = 0.0;
        self.log.push(DriverCommand::DispenseAll);
        Ok(())
    }

    fn pick_tip(&mut self, limit: f64) -> DriverResult<()> {
        self.ensure_connected()?;
        if self.has_tip {
            return Err(DriverError::CommandNotAccepted("tip already attached".into()));
        }
        if self.pick_failures > 0 {
            self.pick_failures -= 1;
            return Err(DriverError::CommandFailed("no tip found".into()));
        }
        self.has_tip = true;
        self.position.z = limit;
        self.log.push(DriverCommand::PickTip { limit });
        Ok(())
    }

    fn eject_tip(&mut self) -> DriverResult<()> {
        self.ensure_connected()?;
        if self.eject_failures > 0 {
            self.eject_failures -= 1;
            return Err(DriverError::CommandFailed("tip ejector jammed".into()));
        }
        self.has_tip = false;
        self.volume = 0.0;
        self.log.push(DriverCommand::EjectTip);
        Ok(())
    }

    fn wait_until_stopped(&mut self) -> DriverResult<()> {
        self.ensure_connected()
    }

    fn position(&self) -> HeadPosition {
        self.position
    }

    fn speeds(&self) -> AxisSpeeds {
        AxisSpeeds {
            xy: 5,
            z: 5,
            piston: 3,
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
