//! Equipment loading commands.

use crate::resources::LabwareDefinition;
use crate::types::{CalibrationOffset, LabwareLocation, Mount, PipetteName};
use serde::{Deserialize, Serialize};

fn default_namespace() -> String {
    "opentrons".to_string()
}

fn default_version() -> u32 {
    1
}

/// Place a piece of labware in a deck slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadLabwareData {
    pub location: LabwareLocation,
    pub load_name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_version")]
    pub version: u32,
    /// Id to assign; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labware_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadLabwareResult {
    pub labware_id: String,
    pub definition: LabwareDefinition,
    pub calibration: CalibrationOffset,
}

/// Attach a pipette to a mount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadPipetteData {
    pub pipette_name: PipetteName,
    pub mount: Mount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipette_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadPipetteResult {
    pub pipette_id: String,
}

/// Register a custom labware definition for later LoadLabware commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddLabwareDefinitionData {
    pub definition: LabwareDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddLabwareDefinitionResult {
    pub load_name: String,
    pub namespace: String,
    pub version: u32,
}
