//! Loaded labware, definitions and calibration.

use crate::commands::{Command, CommandData, CommandResult};
use crate::error::{EngineError, EngineResult};
use crate::resources::{LabwareDefinition, StandardDeck, WellDefinition};
use crate::types::{CalibrationOffset, DeckSlotName, LoadedLabware, Point};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct LabwareState {
    /// Loaded labware in load order.
    labware: Vec<LoadedLabware>,
    definitions_by_uri: HashMap<String, Arc<LabwareDefinition>>,
    calibrations_by_id: HashMap<String, CalibrationOffset>,
    deck: StandardDeck,
}

impl LabwareState {
    pub(super) fn new(deck: StandardDeck) -> Self {
        Self {
            labware: Vec::new(),
            definitions_by_uri: HashMap::new(),
            calibrations_by_id: HashMap::new(),
            deck,
        }
    }

    /// Whether a succeeded command changes labware state.
    pub(super) fn is_affected_by(command: &Command) -> bool {
        matches!(
            command.data,
            CommandData::LoadLabware(_) | CommandData::AddLabwareDefinition(_)
        )
    }

    pub(super) fn handle_succeeded_command(&mut self, command: &Command) {
        match (&command.data, &command.result) {
            (CommandData::LoadLabware(data), Some(CommandResult::LoadLabware(result))) => {
                let uri = result.definition.uri();
                self.definitions_by_uri
                    .entry(uri.clone())
                    .or_insert_with(|| Arc::new(result.definition.clone()));
                self.calibrations_by_id
                    .insert(result.labware_id.clone(), result.calibration);
                self.labware.push(LoadedLabware {
                    id: result.labware_id.clone(),
                    location: data.location,
                    load_name: data.load_name.clone(),
                    definition_uri: uri,
                });
            }
            (CommandData::AddLabwareDefinition(data), Some(_)) => {
                self.definitions_by_uri
                    .insert(data.definition.uri(), Arc::new(data.definition.clone()));
            }
            _ => {}
        }
    }
}

/// Read-only view of labware state.
#[derive(Debug, Clone, Copy)]
pub struct LabwareView<'a> {
    state: &'a LabwareState,
}

impl<'a> LabwareView<'a> {
    pub(super) fn new(state: &'a LabwareState) -> Self {
        Self { state }
    }

    pub fn get(&self, labware_id: &str) -> EngineResult<&'a LoadedLabware> {
        self.state
            .labware
            .iter()
            .find(|labware| labware.id == labware_id)
            .ok_or_else(|| EngineError::LabwareDoesNotExist(labware_id.to_string()))
    }

    /// All loaded labware in load order.
    pub fn get_all(&self) -> &'a [LoadedLabware] {
        &self.state.labware
    }

    pub fn get_by_slot(&self, slot: DeckSlotName) -> Option<&'a LoadedLabware> {
        self.state
            .labware
            .iter()
            .find(|labware| labware.location.slot_name == slot)
    }

    pub fn get_definition_by_uri(&self, uri: &str) -> EngineResult<&'a LabwareDefinition> {
        self.state
            .definitions_by_uri
            .get(uri)
            .map(Arc::as_ref)
            .ok_or_else(|| EngineError::LabwareDefinitionNotFound(uri.to_string()))
    }

    pub fn get_labware_definition(&self, labware_id: &str) -> EngineResult<&'a LabwareDefinition> {
        let labware = self.get(labware_id)?;
        self.get_definition_by_uri(&labware.definition_uri)
    }

    pub fn get_definition_uri(&self, labware_id: &str) -> EngineResult<&'a str> {
        Ok(self.get(labware_id)?.definition_uri.as_str())
    }

    pub fn get_well_definition(
        &self,
        labware_id: &str,
        well_name: &str,
    ) -> EngineResult<&'a WellDefinition> {
        self.get_labware_definition(labware_id)?
            .well(well_name)
            .ok_or_else(|| EngineError::WellDoesNotExist {
                labware_id: labware_id.to_string(),
                well_name: well_name.to_string(),
            })
    }

    pub fn is_tiprack(&self, labware_id: &str) -> EngineResult<bool> {
        Ok(self.get_labware_definition(labware_id)?.parameters.is_tiprack)
    }

    /// Nominal tip length of a tiprack.
    pub fn get_tip_length(&self, labware_id: &str) -> EngineResult<f64> {
        let definition = self.get_labware_definition(labware_id)?;
        match (definition.parameters.is_tiprack, definition.parameters.tip_length) {
            (true, Some(length)) => Ok(length),
            _ => Err(EngineError::LabwareIsNotTiprack(labware_id.to_string())),
        }
    }

    pub fn get_has_quirk(&self, labware_id: &str, quirk: &str) -> EngineResult<bool> {
        Ok(self.get_labware_definition(labware_id)?.has_quirk(quirk))
    }

    pub fn get_calibration_offset(&self, labware_id: &str) -> EngineResult<CalibrationOffset> {
        self.get(labware_id)?;
        Ok(self
            .state
            .calibrations_by_id
            .get(labware_id)
            .copied()
            .unwrap_or_default())
    }

    pub fn get_slot_position(&self, slot: DeckSlotName) -> Point {
        self.state.deck.slot_position(slot)
    }
}
