// src/lib.rs
//
// =============================================================================
// PIPETLAB: LIBRARY ROOT
// =============================================================================
//
// This file declares the module tree and exports public types.

// 1. Declare Modules
pub mod codec;
pub mod config;
pub mod content;
pub mod core;
pub mod deck;
pub mod drivers;
pub mod errors;
pub mod geometry;
pub mod labware;
pub mod logs;
pub mod pipettor;
pub mod resolver;
pub mod tips;
pub mod transfer;
pub mod workflow;

// 2. Re-exports (The Public API)
pub use config::PipettorConfig;
pub use content::{ContentHolder, ContentLedger, TipLedger};
pub use core::{Dimensions, GridPos, Shape, Span, Xy};
pub use deck::{Deck, Slot};
pub use drivers::{MotorDriver, SimulatedDriver};
pub use errors::{DriverError, LabError, LabResult};
pub use labware::{
    GridContainer, IndividualPipetteHolder, Labware, LabwareBase, PipetteHolder, Placeable, Plate,
    Reservoir, ReservoirHolder, Stack, TipDropzone, Vessel, Well,
};
pub use logs::OperationJournal;
pub use pipettor::{ControlHandle, LiquidHandler, StateSnapshot};
pub use workflow::{ExecutionResult, ExecutionStatus, Operation, Workflow, WorkflowExecutor};
