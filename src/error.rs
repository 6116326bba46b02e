//! Error types for the protocol engine.
//!
//! This module defines the primary error type, `EngineError`, raised by the
//! state views, the command handlers and the engine itself. Using the
//! `thiserror` crate, every failure a command can hit is a typed variant, so
//! callers can tell a bad request apart from a hardware fault or a
//! cancellation without parsing messages.
//!
//! ## Error Hierarchy
//!
//! - **Validation**: unknown ids, unknown wells, occupied slots or mounts,
//!   unplannable moves. These are raised before any hardware is touched.
//! - **`HardwareFault`**: the hardware API reported a failure mid-motion.
//! - **`Cancelled`**: the in-flight command was aborted because the run was
//!   stopped. Cancellation is not a protocol error and does not set the run
//!   error.
//!
//! Failures are recorded on commands as an [`ErrorOccurrence`], the
//! serializable `{errorType, detail, createdAt}` triple that readers see.

use crate::hardware::HardwareError;
use crate::types::{DeckSlotName, Mount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience alias for results using the engine error type.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Labware '{0}' does not exist")]
    LabwareDoesNotExist(String),

    #[error("Pipette '{0}' does not exist")]
    PipetteDoesNotExist(String),

    #[error("Labware definition '{0}' not found")]
    LabwareDefinitionNotFound(String),

    #[error("Well '{well_name}' does not exist in labware '{labware_id}'")]
    WellDoesNotExist {
        labware_id: String,
        well_name: String,
    },

    #[error("Labware '{0}' is already loaded")]
    LabwareAlreadyLoaded(String),

    #[error("Pipette '{0}' is already loaded")]
    PipetteAlreadyLoaded(String),

    #[error("Slot {slot} is already occupied by labware '{labware_id}'")]
    SlotOccupied {
        slot: DeckSlotName,
        labware_id: String,
    },

    #[error("Mount {mount} is already occupied by pipette '{pipette_id}'")]
    MountOccupied { mount: Mount, pipette_id: String },

    #[error("No pipette attached to the {mount} mount for '{pipette_id}'")]
    PipetteNotAttached { pipette_id: String, mount: Mount },

    #[error("Labware '{0}' is not a tiprack")]
    LabwareIsNotTiprack(String),

    #[error("Invalid volume {0} uL")]
    InvalidVolume(f64),

    #[error("Failed to plan move: {0}")]
    FailedToPlanMove(String),

    #[error("Failed to load pipette: {0}")]
    FailedToLoadPipette(String),

    #[error("Command '{0}' does not exist")]
    CommandDoesNotExist(String),

    #[error("Command '{command_id}' cannot move from {from} to {to}")]
    InvalidCommandTransition {
        command_id: String,
        from: String,
        to: String,
    },

    #[error("Engine is stopped and accepts no further work")]
    EngineStopped,

    #[error("Hardware fault: {0}")]
    HardwareFault(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl EngineError {
    /// Stable error type identifier recorded in [`ErrorOccurrence::error_type`].
    pub fn error_type(&self) -> &'static str {
        match self {
            EngineError::LabwareDoesNotExist(_) => "LabwareDoesNotExistError",
            EngineError::PipetteDoesNotExist(_) => "PipetteDoesNotExistError",
            EngineError::LabwareDefinitionNotFound(_) => "LabwareDefinitionDoesNotExistError",
            EngineError::WellDoesNotExist { .. } => "WellDoesNotExistError",
            EngineError::LabwareAlreadyLoaded(_) => "LabwareAlreadyLoadedError",
            EngineError::PipetteAlreadyLoaded(_) => "PipetteAlreadyLoadedError",
            EngineError::SlotOccupied { .. } => "SlotOccupiedError",
            EngineError::MountOccupied { .. } => "MountOccupiedError",
            EngineError::PipetteNotAttached { .. } => "PipetteNotAttachedError",
            EngineError::LabwareIsNotTiprack(_) => "LabwareIsNotTipRackError",
            EngineError::InvalidVolume(_) => "InvalidVolumeError",
            EngineError::FailedToPlanMove(_) => "FailedToPlanMoveError",
            EngineError::FailedToLoadPipette(_) => "FailedToLoadPipetteError",
            EngineError::CommandDoesNotExist(_) => "CommandDoesNotExistError",
            EngineError::InvalidCommandTransition { .. } => "InvalidCommandTransitionError",
            EngineError::EngineStopped => "EngineStoppedError",
            EngineError::HardwareFault(_) => "HardwareFaultError",
            EngineError::Cancelled(_) => "CancelledError",
        }
    }

    /// True if this failure came from stopping the run rather than a fault.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, EngineError::Cancelled(_))
    }
}

impl From<HardwareError> for EngineError {
    fn from(err: HardwareError) -> Self {
        match err {
            HardwareError::Cancelled => EngineError::Cancelled("hardware call halted".into()),
            other => EngineError::HardwareFault(other.to_string()),
        }
    }
}

/// Serializable record of a failure attached to a command or run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOccurrence {
    pub error_type: String,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

impl ErrorOccurrence {
    pub fn new(
        error_type: impl Into<String>,
        detail: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            error_type: error_type.into(),
            detail: detail.into(),
            created_at,
        }
    }

    pub fn from_engine_error(err: &EngineError, created_at: DateTime<Utc>) -> Self {
        Self::new(err.error_type(), err.to_string(), created_at)
    }
}

/// Errors from the run orchestration layer.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Protocol source error: {0}")]
    ProtocolSource(String),

    #[error("Protocol was already loaded into a started run")]
    AlreadyStarted,

    #[error("Script error: {0}")]
    Script(#[from] crate::scripting::ScriptError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Invalid protocol JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
