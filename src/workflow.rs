// src/workflow.rs
//
// =============================================================================
// PIPETLAB: WORKFLOW EXECUTOR (v 0.1 )
// =============================================================================
//
// Ordered operation lists, loaded from YAML and run against the engine.
//
// Responsibilities:
// 1. Define the operation vocabulary (serde tag "type").
// 2. Validate workflows before anything moves.
// 3. Execute sequentially, journal every outcome, stop at the first failure.
// 4. Dry-run: execute in simulation mode and roll state back.

use crate::core::GridPos;
use crate::drivers::MotorDriver;
use crate::errors::{LabError, LabResult};
use crate::logs::{OperationJournal, Outcome};
use crate::pipettor::LiquidHandler;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// 1. OPERATIONS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    PickTips {
        holder: String,
        #[serde(default)]
        positions: Option<Vec<GridPos>>,
    },
    ReturnTips {
        holder: String,
        #[serde(default)]
        positions: Option<Vec<GridPos>>,
    },
    ReplaceTips {
        holder: String,
        #[serde(default)]
        return_positions: Option<Vec<GridPos>>,
        #[serde(default)]
        pick_holder: Option<String>,
        #[serde(default)]
        pick_positions: Option<Vec<GridPos>>,
    },
    DiscardTips {
        #[serde(default)]
        dropzone: Option<String>,
    },
    AddMedium {
        source: String,
        source_position: GridPos,
        destination: String,
        destination_positions: Vec<GridPos>,
        volume_per_well: f64,
        #[serde(default)]
        change_tips: bool,
        #[serde(default)]
        channels: Option<usize>,
    },
    RemoveMedium {
        source: String,
        source_positions: Vec<GridPos>,
        destination: String,
        destination_position: GridPos,
        volume_per_well: f64,
        #[serde(default)]
        change_tips: bool,
        #[serde(default)]
        channels: Option<usize>,
    },
    TransferPlateToPlate {
        source: String,
        source_positions: Vec<GridPos>,
        destination: String,
        destination_positions: Vec<GridPos>,
        volume_per_well: f64,
        #[serde(default)]
        change_tips: bool,
        #[serde(default)]
        channels: Option<usize>,
    },
    RemoveAndAdd {
        plate: String,
        positions: Vec<GridPos>,
        volume_per_well: f64,
        waste: String,
        waste_position: GridPos,
        source: String,
        source_position: GridPos,
        #[serde(default)]
        change_tips: bool,
        #[serde(default)]
        channels: Option<usize>,
    },
    Suck {
        labware: String,
        position: GridPos,
        volume: f64,
    },
    Spit {
        labware: String,
        position: GridPos,
        volume: f64,
    },
    Home,
    MoveXy {
        x: f64,
        y: f64,
    },
    MoveZ {
        z: f64,
    },
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::PickTips { .. } => "pick_tips",
            Operation::ReturnTips { .. } => "return_tips",
            Operation::ReplaceTips { .. } => "replace_tips",
            Operation::DiscardTips { .. } => "discard_tips",
            Operation::AddMedium { .. } => "add_medium",
            Operation::RemoveMedium { .. } => "remove_medium",
            Operation::TransferPlateToPlate { .. } => "transfer_plate_to_plate",
            Operation::RemoveAndAdd { .. } => "remove_and_add",
            Operation::Suck { .. } => "suck",
            Operation::Spit { .. } => "spit",
            Operation::Home => "home",
            Operation::MoveXy { .. } => "move_xy",
            Operation::MoveZ { .. } => "move_z",
        }
    }

    /// One-line description for journals.
    pub fn describe(&self) -> String {
        match self {
            Operation::PickTips { holder, .. } => format!("pick tips from {holder}"),
            Operation::ReturnTips { holder, .. } => format!("return tips to {holder}"),
            Operation::ReplaceTips { holder, .. } => format!("replace tips at {holder}"),
            Operation::DiscardTips { dropzone } => {
                format!("discard tips into {}", dropzone.as_deref().unwrap_or("first dropzone"))
            }
            Operation::AddMedium {
                source,
                destination,
                destination_positions,
                volume_per_well,
                ..
            } => format!(
                "add {volume_per_well}µL/well {source} -> {destination} ({} position(s))",
                destination_positions.len()
            ),
            Operation::RemoveMedium {
                source,
                destination,
                source_positions,
                volume_per_well,
                ..
            } => format!(
                "remove {volume_per_well}µL/well {source} ({} position(s)) -> {destination}",
                source_positions.len()
            ),
            Operation::TransferPlateToPlate {
                source,
                destination,
                source_positions,
                volume_per_well,
                ..
            } => format!(
                "transfer {volume_per_well}µL/well {source} -> {destination} ({} pair(s))",
                source_positions.len()
            ),
            Operation::RemoveAndAdd { plate, positions, volume_per_well, .. } => format!(
                "exchange {volume_per_well}µL/well in {plate} ({} position(s))",
                positions.len()
            ),
            Operation::Suck {
                labware,
                position,
                volume,
            } => format!("suck {volume}µL from {labware} {position}"),
            Operation::Spit {
                labware,
                position,
                volume,
            } => format!("spit {volume}µL into {labware} {position}"),
            Operation::Home => "home".to_string(),
            Operation::MoveXy { x, y } => format!("move to ({x}, {y})"),
            Operation::MoveZ { z } => format!("move z to {z}"),
        }
    }

    fn transfer_settings(&self) -> Option<(bool, Option<usize>)> {
        match self {
            Operation::AddMedium { change_tips, channels, .. }
            | Operation::RemoveMedium { change_tips, channels, .. }
            | Operation::TransferPlateToPlate { change_tips, channels, .. }
            | Operation::RemoveAndAdd {
                change_tips,
                channels,
                ..
            } => Some((*change_tips, *channels)),
            _ => None,
        }
    }

    pub fn validate(&self) -> LabResult<()> {
        let positive = |v: f64, what: &str| {
            if v > 0.0 && v.is_finite() {
                Ok(())
            } else {
                Err(LabError::InvalidInput(format!(
                    "{}: {what} must be positive, got {v}",
                    self.kind()
                )))
            }
        };
        match self {
            Operation::AddMedium { volume_per_well, destination_positions, .. } => {
                positive(*volume_per_well, "volume_per_well")?;
                non_empty(destination_positions, "destination_positions", self.kind())
            }
            Operation::RemoveMedium { volume_per_well, source_positions, .. } => {
                positive(*volume_per_well, "volume_per_well")?;
                non_empty(source_positions, "source_positions", self.kind())
            }
            Operation::TransferPlateToPlate {
                volume_per_well,
                source_positions,
                destination_positions,
                ..
            } => {
                positive(*volume_per_well, "volume_per_well")?;
                non_empty(source_positions, "source_positions", self.kind())?;
                if source_positions.len() != destination_positions.len() {
                    return Err(LabError::InvalidInput(format!(
                        "transfer_plate_to_plate: {} sources vs {} destinations",
                        source_positions.len(),
                        destination_positions.len()
                    )));
                }
                Ok(())
            }
            Operation::RemoveAndAdd { volume_per_well, positions, .. } => {
                positive(*volume_per_well, "volume_per_well")?;
                non_empty(positions, "positions", self.kind())
            }
            Operation::Suck { volume, .. } | Operation::Spit { volume, .. } => {
                positive(*volume, "volume")
            }
            Operation::MoveZ { z } if *z < 0.0 => Err(LabError::InvalidInput(format!(
                "move_z: z {z} is negative"
            ))),
            _ => Ok(()),
        }
    }
}

fn non_empty(list: &[GridPos], field: &str, kind: &str) -> LabResult<()> {
    if list.is_empty() {
        return Err(LabError::InvalidInput(format!("{kind}: {field} must not be empty")));
    }
    Ok(())
}

// ============================================================================
// 2. WORKFLOW DOCUMENT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub operations: Vec<Operation>,
}

impl Workflow {
    pub fn from_yaml_str(src: &str) -> LabResult<Self> {
        let wf: Workflow = serde_yaml::from_str(src)
            .map_err(|e| LabError::InvalidInput(format!("failed to parse workflow YAML: {e}")))?;
        wf.validate()?;
        Ok(wf)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> LabResult<Self> {
        let path = path.as_ref();
        let src = fs::read_to_string(path).map_err(|e| {
            LabError::InvalidInput(format!("cannot read workflow {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&src)
    }

    pub fn validate(&self) -> LabResult<()> {
        if self.name.trim().is_empty() {
            return Err(LabError::InvalidInput("workflow name must not be empty".into()));
        }
        if self.operations.is_empty() {
            return Err(LabError::InvalidInput(format!(
                "workflow '{}' has no operations",
                self.name
            )));
        }
        for (i, op) in self.operations.iter().enumerate() {
            op.validate().map_err(|e| {
                LabError::InvalidInput(format!("operation #{i} ({}): {e}", op.kind()))
            })?;
        }
        Ok(())
    }
}

// ============================================================================
// 3. DISPATCH
// ============================================================================

impl<D: MotorDriver> LiquidHandler<D> {
    /// Runs one operation. Transfer operations apply their own
    /// `change_tips` setting for the duration of the call.
    pub fn apply(&mut self, op: &Operation) -> LabResult<()> {
        op.validate()?;
        let Some((change_tips, channels)) = op.transfer_settings() else {
            return self.apply_simple(op);
        };
        if let Some(expected) = channels {
            if expected != self.channels() {
                return Err(LabError::InvalidInput(format!(
                    "{} expects {expected} channel(s) but the head runs {}",
                    op.kind(),
                    self.channels()
                )));
            }
        }
        let previous = self.change_tips;
        self.change_tips = change_tips;
        let result = self.apply_transfer(op);
        self.change_tips = previous;
        result
    }

    fn apply_transfer(&mut self, op: &Operation) -> LabResult<()> {
        match op {
            Operation::AddMedium {
                source,
                source_position,
                destination,
                destination_positions,
                volume_per_well,
                ..
            } => self.add_medium(
                source,
                *source_position,
                *volume_per_well,
                destination,
                destination_positions,
            ),
            Operation::RemoveMedium {
                source,
                source_positions,
                destination,
                destination_position,
                volume_per_well,
                ..
            } => self.remove_medium(
                source,
                source_positions,
                *volume_per_well,
                destination,
                *destination_position,
            ),
            Operation::TransferPlateToPlate {
                source,
                source_positions,
                destination,
                destination_positions,
                volume_per_well,
                ..
            } => self.transfer_plate_to_plate(
                source,
                source_positions,
                destination,
                destination_positions,
                *volume_per_well,
            ),
            Operation::RemoveAndAdd {
                plate,
                positions,
                volume_per_well,
                waste,
                waste_position,
                source,
                source_position,
                ..
            } => self.remove_and_add(
                plate,
                positions,
                *volume_per_well,
                waste,
                *waste_position,
                source,
                *source_position,
            ),
            other => self.apply_simple(other),
        }
    }

    fn apply_simple(&mut self, op: &Operation) -> LabResult<()> {
        match op {
            Operation::PickTips { holder, positions } => {
                self.pick_tips(holder, positions.as_deref()).map(|_| ())
            }
            Operation::ReturnTips { holder, positions } => {
                self.return_tips(holder, positions.as_deref()).map(|_| ())
            }
            Operation::ReplaceTips {
                holder,
                return_positions,
                pick_holder,
                pick_positions,
            } => self
                .replace_tips(
                    holder,
                    return_positions.as_deref(),
                    pick_holder.as_deref(),
                    pick_positions.as_deref(),
                )
                .map(|_| ()),
            Operation::DiscardTips { dropzone } => self.discard_tips(dropzone.as_deref()),
            Operation::Suck { labware, position, volume } => self.suck(labware, *position, *volume),
            Operation::Spit { labware, position, volume } => self.spit(labware, *position, *volume),
            Operation::Home => self.home(),
            Operation::MoveXy { x, y } => self.move_xy(*x, *y),
            Operation::MoveZ { z } => self.move_z(*z),
            transfer => self.apply_transfer(transfer),
        }
    }
}

// ============================================================================
// 4. THE EXECUTOR
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    NotStarted,
    Running,
    Completed,
    Failed,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub operations_completed: usize,
    pub total_operations: usize,
    pub failed_operation_index: Option<usize>,
    pub error_message: Option<String>,
}

impl ExecutionResult {
    fn new(total: usize) -> Self {
        Self {
            status: ExecutionStatus::NotStarted,
            operations_completed: 0,
            total_operations: total,
            failed_operation_index: None,
            error_message: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}

#[derive(Clone, Default)]
pub struct WorkflowExecutor {
    journal: OperationJournal,
}

impl WorkflowExecutor {
    pub fn new(journal: OperationJournal) -> Self {
        Self { journal }
    }

    pub fn journal(&self) -> &OperationJournal {
        &self.journal
    }

    pub fn execute<D: MotorDriver>(
        &self,
        handler: &mut LiquidHandler<D>,
        workflow: &Workflow,
    ) -> ExecutionResult {
        self.execute_from(handler, workflow, 0)
    }

    /// Runs operations `start..`. Earlier ones count as completed.
    pub fn execute_from<D: MotorDriver>(
        &self,
        handler: &mut LiquidHandler<D>,
        workflow: &Workflow,
        start: usize,
    ) -> ExecutionResult {
        let total = workflow.operations.len();
        let mut result = ExecutionResult::new(total);
        if let Err(e) = workflow.validate() {
            result.status = ExecutionStatus::Failed;
            result.error_message = Some(e.to_string());
            return result;
        }
        if start > total {
            result.status = ExecutionStatus::Failed;
            result.error_message = Some(format!("start index {start} beyond {total} operations"));
            return result;
        }

        log::info!(
            "⚡ running workflow '{}' ({} operation(s) from #{start}){}",
            workflow.name,
            total - start,
            if handler.is_simulation() { " [simulation]" } else { "" }
        );
        result.status = ExecutionStatus::Running;
        result.operations_completed = start;

        for (index, op) in workflow.operations.iter().enumerate().skip(start) {
            match handler.apply(op) {
                Ok(()) => {
                    self.journal.record(index, op.describe(), Outcome::Success);
                    result.operations_completed += 1;
                }
                Err(e) => {
                    self.journal.record(index, op.describe(), Outcome::Failed(e.to_string()));
                    result.status = if matches!(e, LabError::Aborted) {
                        ExecutionStatus::Aborted
                    } else {
                        ExecutionStatus::Failed
                    };
                    result.failed_operation_index = Some(index);
                    result.error_message = Some(e.to_string());
                    return result;
                }
            }
        }
        result.status = ExecutionStatus::Completed;
        log::info!("workflow '{}' completed", workflow.name);
        result
    }

    /// Executes in simulation mode, then restores the engine state.
    pub fn dry_run<D: MotorDriver>(
        &self,
        handler: &mut LiquidHandler<D>,
        workflow: &Workflow,
    ) -> LabResult<ExecutionResult> {
        handler.dry_run(|h| self.execute(h, workflow))
    }
}
