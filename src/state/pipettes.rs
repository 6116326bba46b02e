//! Loaded pipettes, aspirated volume and the current well.

use crate::commands::{Command, CommandData, CommandResult};
use crate::error::{EngineError, EngineResult};
use crate::hardware::{AttachedInstruments, PipetteConfig};
use crate::types::{CurrentWell, LoadedPipette, Mount};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct PipetteState {
    pipettes: Vec<LoadedPipette>,
    aspirated_volume_by_id: HashMap<String, f64>,
    current_well: Option<CurrentWell>,
}

/// Hardware-side view of a loaded pipette.
#[derive(Debug, Clone, PartialEq)]
pub struct HardwarePipette {
    pub mount: Mount,
    pub config: PipetteConfig,
}

impl PipetteState {
    pub(super) fn is_affected_by(command: &Command) -> bool {
        !matches!(
            command.data,
            CommandData::LoadLabware(_) | CommandData::AddLabwareDefinition(_) | CommandData::Pause(_)
        )
    }

    pub(super) fn handle_succeeded_command(&mut self, command: &Command) {
        match (&command.data, &command.result) {
            (CommandData::LoadPipette(data), Some(CommandResult::LoadPipette(result))) => {
                self.pipettes.push(LoadedPipette {
                    id: result.pipette_id.clone(),
                    pipette_name: data.pipette_name,
                    mount: data.mount,
                });
                self.aspirated_volume_by_id
                    .insert(result.pipette_id.clone(), 0.0);
            }
            (CommandData::Aspirate(data), Some(CommandResult::Aspirate(result))) => {
                *self
                    .aspirated_volume_by_id
                    .entry(data.pipette_id.clone())
                    .or_insert(0.0) += result.volume;
                self.current_well = Some(CurrentWell::new(
                    &data.pipette_id,
                    &data.labware_id,
                    &data.well_name,
                ));
            }
            (CommandData::Dispense(data), Some(CommandResult::Dispense(result))) => {
                let volume = self
                    .aspirated_volume_by_id
                    .entry(data.pipette_id.clone())
                    .or_insert(0.0);
                *volume = (*volume - result.volume).max(0.0);
                self.current_well = Some(CurrentWell::new(
                    &data.pipette_id,
                    &data.labware_id,
                    &data.well_name,
                ));
            }
            (CommandData::PickUpTip(data), Some(_)) => {
                self.current_well = Some(CurrentWell::new(
                    &data.pipette_id,
                    &data.labware_id,
                    &data.well_name,
                ));
            }
            (CommandData::DropTip(data), Some(_)) => {
                self.current_well = Some(CurrentWell::new(
                    &data.pipette_id,
                    &data.labware_id,
                    &data.well_name,
                ));
            }
            (CommandData::MoveToWell(data), Some(_)) => {
                self.current_well = Some(CurrentWell::new(
                    &data.pipette_id,
                    &data.labware_id,
                    &data.well_name,
                ));
            }
            _ => {}
        }
    }
}

/// Read-only view of pipette state.
#[derive(Debug, Clone, Copy)]
pub struct PipetteView<'a> {
    state: &'a PipetteState,
}

impl<'a> PipetteView<'a> {
    pub(super) fn new(state: &'a PipetteState) -> Self {
        Self { state }
    }

    pub fn get(&self, pipette_id: &str) -> EngineResult<&'a LoadedPipette> {
        self.state
            .pipettes
            .iter()
            .find(|pipette| pipette.id == pipette_id)
            .ok_or_else(|| EngineError::PipetteDoesNotExist(pipette_id.to_string()))
    }

    /// All loaded pipettes in load order.
    pub fn get_all(&self) -> &'a [LoadedPipette] {
        &self.state.pipettes
    }

    pub fn get_by_mount(&self, mount: Mount) -> Option<&'a LoadedPipette> {
        self.state
            .pipettes
            .iter()
            .find(|pipette| pipette.mount == mount)
    }

    pub fn get_current_well(&self) -> Option<&'a CurrentWell> {
        self.state.current_well.as_ref()
    }

    pub fn get_aspirated_volume(&self, pipette_id: &str) -> EngineResult<f64> {
        self.get(pipette_id)?;
        Ok(self
            .state
            .aspirated_volume_by_id
            .get(pipette_id)
            .copied()
            .unwrap_or(0.0))
    }

    /// Match a loaded pipette to the hardware's attached instruments.
    pub fn get_hardware_pipette(
        &self,
        pipette_id: &str,
        attached: &AttachedInstruments,
    ) -> EngineResult<HardwarePipette> {
        let pipette = self.get(pipette_id)?;
        attached
            .get(&pipette.mount)
            .map(|config| HardwarePipette {
                mount: pipette.mount,
                config: config.clone(),
            })
            .ok_or_else(|| EngineError::PipetteNotAttached {
                pipette_id: pipette_id.to_string(),
                mount: pipette.mount,
            })
    }

    /// Ready only if liquid is already held, or the plunger is primed.
    pub fn get_is_ready_to_aspirate(
        &self,
        pipette_id: &str,
        config: &PipetteConfig,
    ) -> EngineResult<bool> {
        Ok(self.get_aspirated_volume(pipette_id)? > 0.0 || config.ready_to_aspirate)
    }
}
