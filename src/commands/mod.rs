//! Command model: requests, lifecycle records and results.
//!
//! A command is created from a [`CommandRequest`] in status `queued`, moves
//! to `running` when the engine dequeues it, and ends in exactly one of
//! `succeeded` (with a result) or `failed` (with an error). Terminal commands
//! never change again.
//!
//! The command catalogue is closed: [`CommandData`] is one enum and every
//! dispatch site matches it exhaustively, so adding a command type is a
//! compile error until every site handles it.
//!
//! # Wire shape
//!
//! ```json
//! {
//!   "id": "8c1f...",
//!   "status": "succeeded",
//!   "createdAt": "2024-05-01T12:00:00Z",
//!   "commandType": "aspirate",
//!   "data": { "pipetteId": "p1", "labwareId": "plate", "wellName": "A1", "volume": 50.0 },
//!   "result": { "volume": 50.0 }
//! }
//! ```

pub mod equipment;
pub mod movement;
pub mod pipetting;
pub mod run_control;

pub use equipment::{
    AddLabwareDefinitionData, AddLabwareDefinitionResult, LoadLabwareData, LoadLabwareResult,
    LoadPipetteData, LoadPipetteResult,
};
pub use movement::{MoveToWellData, MoveToWellResult};
pub use pipetting::{
    AspirateData, AspirateResult, DispenseData, DispenseResult, DropTipData, DropTipResult,
    PickUpTipData, PickUpTipResult,
};
pub use run_control::{PauseData, PauseResult};

use crate::error::ErrorOccurrence;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique command identifier.
pub type CommandId = String;

// =============================================================================
// Lifecycle
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl CommandStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CommandStatus::Succeeded | CommandStatus::Failed)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: CommandStatus) -> bool {
        matches!(
            (self, next),
            (CommandStatus::Queued, CommandStatus::Running)
                | (CommandStatus::Running, CommandStatus::Succeeded)
                | (CommandStatus::Running, CommandStatus::Failed)
        )
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandStatus::Queued => "queued",
            CommandStatus::Running => "running",
            CommandStatus::Succeeded => "succeeded",
            CommandStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Type-specific command parameters, tagged by `commandType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "commandType", content = "data", rename_all = "camelCase")]
pub enum CommandData {
    LoadLabware(LoadLabwareData),
    LoadPipette(LoadPipetteData),
    AddLabwareDefinition(AddLabwareDefinitionData),
    Aspirate(AspirateData),
    Dispense(DispenseData),
    PickUpTip(PickUpTipData),
    DropTip(DropTipData),
    MoveToWell(MoveToWellData),
    Pause(PauseData),
}

/// Discriminant of [`CommandData`], handy for logging and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandType {
    LoadLabware,
    LoadPipette,
    AddLabwareDefinition,
    Aspirate,
    Dispense,
    PickUpTip,
    DropTip,
    MoveToWell,
    Pause,
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandType::LoadLabware => "loadLabware",
            CommandType::LoadPipette => "loadPipette",
            CommandType::AddLabwareDefinition => "addLabwareDefinition",
            CommandType::Aspirate => "aspirate",
            CommandType::Dispense => "dispense",
            CommandType::PickUpTip => "pickUpTip",
            CommandType::DropTip => "dropTip",
            CommandType::MoveToWell => "moveToWell",
            CommandType::Pause => "pause",
        };
        f.write_str(s)
    }
}

impl CommandData {
    pub fn command_type(&self) -> CommandType {
        match self {
            CommandData::LoadLabware(_) => CommandType::LoadLabware,
            CommandData::LoadPipette(_) => CommandType::LoadPipette,
            CommandData::AddLabwareDefinition(_) => CommandType::AddLabwareDefinition,
            CommandData::Aspirate(_) => CommandType::Aspirate,
            CommandData::Dispense(_) => CommandType::Dispense,
            CommandData::PickUpTip(_) => CommandType::PickUpTip,
            CommandData::DropTip(_) => CommandType::DropTip,
            CommandData::MoveToWell(_) => CommandType::MoveToWell,
            CommandData::Pause(_) => CommandType::Pause,
        }
    }
}

/// Caller-supplied command request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandRequest {
    pub data: CommandData,
}

impl CommandRequest {
    pub fn command_type(&self) -> CommandType {
        self.data.command_type()
    }
}

impl From<CommandData> for CommandRequest {
    fn from(data: CommandData) -> Self {
        Self { data }
    }
}

// =============================================================================
// Results & records
// =============================================================================

/// Type-specific result of a succeeded command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandResult {
    LoadLabware(LoadLabwareResult),
    LoadPipette(LoadPipetteResult),
    AddLabwareDefinition(AddLabwareDefinitionResult),
    Aspirate(AspirateResult),
    Dispense(DispenseResult),
    PickUpTip(PickUpTipResult),
    DropTip(DropTipResult),
    MoveToWell(MoveToWellResult),
    Pause(PauseResult),
}

/// A command and its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: CommandId,
    pub status: CommandStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub data: CommandData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CommandResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorOccurrence>,
}

impl Command {
    /// New queued command.
    pub fn queued(id: CommandId, created_at: DateTime<Utc>, data: CommandData) -> Self {
        Self {
            id,
            status: CommandStatus::Queued,
            created_at,
            started_at: None,
            completed_at: None,
            data,
            result: None,
            error: None,
        }
    }

    pub fn command_type(&self) -> CommandType {
        self.data.command_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeckSlotName, LabwareLocation, WellLocation};

    #[test]
    fn test_status_transitions() {
        use CommandStatus::*;
        assert!(Queued.can_transition_to(Running));
        assert!(Running.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Failed));
        assert!(!Queued.can_transition_to(Succeeded));
        assert!(!Succeeded.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Running));
        assert!(Failed.is_terminal());
        assert!(!Running.is_terminal());
    }

    #[test]
    fn test_request_deserializes_from_tagged_json() {
        let request: CommandRequest = serde_json::from_str(
            r#"{
                "commandType": "aspirate",
                "data": {"pipetteId": "p1", "labwareId": "plate", "wellName": "B2", "volume": 25.5}
            }"#,
        )
        .unwrap();

        assert_eq!(request.command_type(), CommandType::Aspirate);
        match request.data {
            CommandData::Aspirate(data) => {
                assert_eq!(data.well_name, "B2");
                assert_eq!(data.volume, 25.5);
                assert_eq!(data.well_location, WellLocation::top());
            }
            other => panic!("unexpected command data {:?}", other),
        }
    }

    #[test]
    fn test_command_serializes_flat() {
        let command = Command::queued(
            "cmd-1".into(),
            Utc::now(),
            CommandData::LoadLabware(LoadLabwareData {
                location: LabwareLocation::slot(DeckSlotName::Slot1),
                load_name: "opentrons_96_tiprack_300ul".into(),
                namespace: "opentrons".into(),
                version: 1,
                labware_id: None,
            }),
        );

        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(json["id"], "cmd-1");
        assert_eq!(json["status"], "queued");
        assert_eq!(json["commandType"], "loadLabware");
        assert_eq!(json["data"]["location"]["slotName"], "1");
        assert!(json.get("result").is_none());
        assert!(json.get("startedAt").is_none());
    }
}
