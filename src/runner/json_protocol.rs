//! JSON protocol files and their translation into engine commands.
//!
//! ```json
//! {
//!   "metadata": {"protocolName": "Simple transfer"},
//!   "pipettes": {"pipette-id": {"mount": "left", "name": "p300_single"}},
//!   "labware": {
//!     "tiprack-id": {"slot": "1", "definitionId": "opentrons/opentrons_96_tiprack_300ul/1"}
//!   },
//!   "labwareDefinitions": {},
//!   "commands": [
//!     {"command": "pickUpTip", "params": {"pipette": "pipette-id", "labware": "tiprack-id", "well": "A1"}}
//!   ]
//! }
//! ```
//!
//! Translation order: one `addLabwareDefinition` per bundled definition,
//! one `loadPipette` per pipette, one `loadLabware` per labware, then each
//! protocol command 1:1. Pipette and labware keys become the loaded ids.
//! A `definitionId` missing from `labwareDefinitions` is resolved through the
//! labware provider, which requires it to be a `namespace/loadName/version`
//! URI.

use crate::commands::*;
use crate::error::RunError;
use crate::resources::LabwareDefinition;
use crate::types::{DeckSlotName, LabwareLocation, Mount, PipetteName, Point, WellLocation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aspirate/dispense height when a command leaves it out.
pub const DEFAULT_OFFSET_FROM_BOTTOM_MM: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonProtocol {
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub pipettes: BTreeMap<String, JsonPipette>,
    #[serde(default)]
    pub labware: BTreeMap<String, JsonLabware>,
    #[serde(default)]
    pub labware_definitions: BTreeMap<String, LabwareDefinition>,
    #[serde(default)]
    pub commands: Vec<JsonCommand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonPipette {
    pub mount: Mount,
    pub name: PipetteName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonLabware {
    pub slot: DeckSlotName,
    pub definition_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// One protocol step. Parameters are interpreted per command name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonCommand {
    pub command: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Deserialize)]
struct TipParams {
    pipette: String,
    labware: String,
    well: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiquidParams {
    pipette: String,
    labware: String,
    well: String,
    volume: f64,
    #[serde(default)]
    offset_from_bottom_mm: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoveToWellParams {
    pipette: String,
    labware: String,
    well: String,
    #[serde(default)]
    offset: Option<Point>,
}

#[derive(Deserialize)]
struct DelayParams {
    #[serde(default)]
    wait: serde_json::Value,
    #[serde(default)]
    message: Option<String>,
}

impl JsonProtocol {
    pub fn from_json(source: &str) -> Result<Self, RunError> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata.get("protocolName").and_then(|v| v.as_str())
    }

    /// Translate the whole file into command requests, setup first.
    pub fn to_commands(&self) -> Result<Vec<CommandRequest>, RunError> {
        let mut requests = Vec::with_capacity(
            self.labware_definitions.len()
                + self.pipettes.len()
                + self.labware.len()
                + self.commands.len(),
        );

        for definition in self.labware_definitions.values() {
            requests.push(
                CommandData::AddLabwareDefinition(AddLabwareDefinitionData {
                    definition: definition.clone(),
                })
                .into(),
            );
        }

        for (pipette_id, pipette) in &self.pipettes {
            requests.push(
                CommandData::LoadPipette(LoadPipetteData {
                    pipette_name: pipette.name,
                    mount: pipette.mount,
                    pipette_id: Some(pipette_id.clone()),
                })
                .into(),
            );
        }

        for (labware_id, labware) in &self.labware {
            let (namespace, load_name, version) = self.resolve_definition(&labware.definition_id)?;
            requests.push(
                CommandData::LoadLabware(LoadLabwareData {
                    location: LabwareLocation::slot(labware.slot),
                    load_name,
                    namespace,
                    version,
                    labware_id: Some(labware_id.clone()),
                })
                .into(),
            );
        }

        for (index, command) in self.commands.iter().enumerate() {
            let data = translate_command(command).map_err(|msg| {
                RunError::ProtocolSource(format!("command {} ({}): {}", index, command.command, msg))
            })?;
            requests.push(data.into());
        }

        Ok(requests)
    }

    fn resolve_definition(&self, definition_id: &str) -> Result<(String, String, u32), RunError> {
        if let Some(definition) = self.labware_definitions.get(definition_id) {
            return Ok((
                definition.namespace.clone(),
                definition.load_name().to_string(),
                definition.version,
            ));
        }

        let mut parts = definition_id.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(namespace), Some(load_name), Some(version), None) => {
                let version = version.parse::<u32>().map_err(|_| {
                    RunError::ProtocolSource(format!(
                        "Labware definition '{}' has an invalid version",
                        definition_id
                    ))
                })?;
                Ok((namespace.to_string(), load_name.to_string(), version))
            }
            _ => Err(RunError::ProtocolSource(format!(
                "Labware definition '{}' is not bundled and is not a definition URI",
                definition_id
            ))),
        }
    }
}

fn translate_command(command: &JsonCommand) -> Result<CommandData, String> {
    let data = match command.command.as_str() {
        "pickUpTip" => {
            let p: TipParams = params(command)?;
            CommandData::PickUpTip(PickUpTipData {
                pipette_id: p.pipette,
                labware_id: p.labware,
                well_name: p.well,
            })
        }
        "dropTip" => {
            let p: TipParams = params(command)?;
            CommandData::DropTip(DropTipData {
                pipette_id: p.pipette,
                labware_id: p.labware,
                well_name: p.well,
            })
        }
        "aspirate" => {
            let p: LiquidParams = params(command)?;
            CommandData::Aspirate(AspirateData {
                well_location: bottom_location(p.offset_from_bottom_mm),
                pipette_id: p.pipette,
                labware_id: p.labware,
                well_name: p.well,
                volume: p.volume,
            })
        }
        "dispense" => {
            let p: LiquidParams = params(command)?;
            CommandData::Dispense(DispenseData {
                well_location: bottom_location(p.offset_from_bottom_mm),
                pipette_id: p.pipette,
                labware_id: p.labware,
                well_name: p.well,
                volume: p.volume,
            })
        }
        "moveToWell" => {
            let p: MoveToWellParams = params(command)?;
            let mut well_location = WellLocation::top();
            if let Some(offset) = p.offset {
                well_location.offset = offset;
            }
            CommandData::MoveToWell(MoveToWellData {
                pipette_id: p.pipette,
                labware_id: p.labware,
                well_name: p.well,
                well_location,
            })
        }
        "delay" | "pause" => {
            let p: DelayParams = params(command)?;
            // Only indefinite waits are expressible; a timed delay has no command.
            match p.wait {
                serde_json::Value::Bool(true) | serde_json::Value::Null => {
                    CommandData::Pause(PauseData { message: p.message })
                }
                other => return Err(format!("timed delay ({}) is not supported", other)),
            }
        }
        other => return Err(format!("unknown command '{}'", other)),
    };
    Ok(data)
}

fn params<T: DeserializeOwned>(command: &JsonCommand) -> Result<T, String> {
    serde_json::from_value(command.params.clone()).map_err(|e| format!("invalid params: {}", e))
}

fn bottom_location(offset: Option<f64>) -> WellLocation {
    WellLocation::bottom(offset.unwrap_or(DEFAULT_OFFSET_FROM_BOTTOM_MM))
}
