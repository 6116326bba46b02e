//! Loading labware and pipettes.

use crate::commands::AddLabwareDefinitionResult;
use crate::error::{EngineError, EngineResult};
use crate::hardware::{HardwareApi, HardwareError};
use crate::resources::{definition_uri, LabwareDataProvider, LabwareDefinition, ModelUtils};
use crate::state::StateView;
use crate::types::{CalibrationOffset, LabwareLocation, Mount, PipetteName};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Resolved data for a labware load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedLabwareData {
    pub labware_id: String,
    pub definition: LabwareDefinition,
    pub calibration: CalibrationOffset,
}

#[derive(Clone)]
pub struct EquipmentHandler {
    hardware: Arc<dyn HardwareApi>,
    labware_provider: Arc<dyn LabwareDataProvider>,
    model_utils: Arc<ModelUtils>,
}

impl EquipmentHandler {
    pub fn new(
        hardware: Arc<dyn HardwareApi>,
        labware_provider: Arc<dyn LabwareDataProvider>,
        model_utils: Arc<ModelUtils>,
    ) -> Self {
        Self {
            hardware,
            labware_provider,
            model_utils,
        }
    }

    /// Resolve a definition and calibration for a labware load.
    ///
    /// Definitions already in state (from an earlier load or an
    /// AddLabwareDefinition command) take precedence over the provider.
    pub async fn load_labware(
        &self,
        state: &StateView,
        location: LabwareLocation,
        load_name: &str,
        namespace: &str,
        version: u32,
        labware_id: Option<&str>,
    ) -> EngineResult<LoadedLabwareData> {
        let labware = state.labware();
        if let Some(occupant) = labware.get_by_slot(location.slot_name) {
            return Err(EngineError::SlotOccupied {
                slot: location.slot_name,
                labware_id: occupant.id.clone(),
            });
        }
        if let Some(id) = labware_id {
            if labware.get(id).is_ok() {
                return Err(EngineError::LabwareAlreadyLoaded(id.to_string()));
            }
        }

        let uri = definition_uri(namespace, load_name, version);
        let definition = match labware.get_definition_by_uri(&uri) {
            Ok(definition) => definition.clone(),
            Err(_) => {
                debug!(%uri, "Definition not in state, asking provider");
                self.labware_provider
                    .get_labware_definition(load_name, namespace, version)
                    .await?
            }
        };

        let calibration = self
            .labware_provider
            .get_labware_calibration(&definition, &location)
            .await?;

        let labware_id = labware_id
            .map(str::to_string)
            .unwrap_or_else(|| self.model_utils.generate_id());

        Ok(LoadedLabwareData {
            labware_id,
            definition,
            calibration,
        })
    }

    /// Ask the hardware to cache the requested pipette alongside any
    /// already-loaded one, and return the new pipette's id.
    pub async fn load_pipette(
        &self,
        state: &StateView,
        pipette_name: PipetteName,
        mount: Mount,
        pipette_id: Option<&str>,
    ) -> EngineResult<String> {
        let pipettes = state.pipettes();
        if let Some(id) = pipette_id {
            if pipettes.get(id).is_ok() {
                return Err(EngineError::PipetteAlreadyLoaded(id.to_string()));
            }
        }
        if let Some(existing) = pipettes.get_by_mount(mount) {
            return Err(EngineError::MountOccupied {
                mount,
                pipette_id: existing.id.clone(),
            });
        }

        let mut requested = HashMap::from([(mount, pipette_name)]);
        if let Some(other) = pipettes.get_by_mount(mount.other()) {
            requested.insert(other.mount, other.pipette_name);
        }

        self.hardware
            .cache_instruments(requested)
            .await
            .map_err(|err| match err {
                HardwareError::Cancelled => EngineError::from(err),
                other => EngineError::FailedToLoadPipette(other.to_string()),
            })?;

        Ok(pipette_id
            .map(str::to_string)
            .unwrap_or_else(|| self.model_utils.generate_id()))
    }

    /// Echo the identity of a definition; the store records it on success.
    pub fn add_labware_definition(
        &self,
        definition: &LabwareDefinition,
    ) -> AddLabwareDefinitionResult {
        AddLabwareDefinitionResult {
            load_name: definition.load_name().to_string(),
            namespace: definition.namespace.clone(),
            version: definition.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Command, CommandData, CommandResult, LoadPipetteData, LoadPipetteResult};
    use crate::hardware::{HardwareCall, SimulatedHardware};
    use crate::resources::labware_definition::corning_96_wellplate_360ul_flat;
    use crate::resources::InMemoryLabwareProvider;
    use crate::state::{Action, StateStore};
    use crate::types::DeckSlotName;
    use chrono::Utc;

    fn handler(sim: Arc<SimulatedHardware>, provider: Arc<InMemoryLabwareProvider>) -> EquipmentHandler {
        EquipmentHandler::new(sim, provider, Arc::new(ModelUtils::new()))
    }

    fn load_pipette_into(store: &StateStore, pipette_id: &str, mount: Mount) {
        let command_id = format!("load-{}", pipette_id);
        let data = CommandData::LoadPipette(LoadPipetteData {
            pipette_name: PipetteName::P300Single,
            mount,
            pipette_id: Some(pipette_id.into()),
        });
        store
            .handle_action(Action::AddCommand(Command::queued(
                command_id.clone(),
                Utc::now(),
                data,
            )))
            .unwrap();
        store
            .handle_action(Action::StartCommand {
                command_id: command_id.clone(),
                started_at: Utc::now(),
            })
            .unwrap();
        store
            .handle_action(Action::SucceedCommand {
                command_id,
                result: CommandResult::LoadPipette(LoadPipetteResult {
                    pipette_id: pipette_id.into(),
                }),
                completed_at: Utc::now(),
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_load_labware_from_provider() {
        let provider = Arc::new(InMemoryLabwareProvider::with_builtin());
        let calibration = CalibrationOffset { x: 1.0, y: 0.0, z: -0.5 };
        provider.set_calibration(
            "opentrons/corning_96_wellplate_360ul_flat/1",
            DeckSlotName::Slot3,
            calibration,
        );
        let handler = handler(Arc::new(SimulatedHardware::new()), provider);
        let state = StateStore::default().current();

        let loaded = handler
            .load_labware(
                &state,
                LabwareLocation::slot(DeckSlotName::Slot3),
                "corning_96_wellplate_360ul_flat",
                "opentrons",
                1,
                None,
            )
            .await
            .unwrap();

        assert_eq!(loaded.definition, corning_96_wellplate_360ul_flat());
        assert_eq!(loaded.calibration, calibration);
        assert!(!loaded.labware_id.is_empty());
    }

    #[tokio::test]
    async fn test_load_labware_keeps_explicit_id() {
        let handler = handler(
            Arc::new(SimulatedHardware::new()),
            Arc::new(InMemoryLabwareProvider::with_builtin()),
        );
        let state = StateStore::default().current();

        let loaded = handler
            .load_labware(
                &state,
                LabwareLocation::slot(DeckSlotName::Slot1),
                "opentrons_96_tiprack_300ul",
                "opentrons",
                1,
                Some("tips"),
            )
            .await
            .unwrap();
        assert_eq!(loaded.labware_id, "tips");
    }

    #[tokio::test]
    async fn test_load_labware_unknown_definition() {
        let handler = handler(
            Arc::new(SimulatedHardware::new()),
            Arc::new(InMemoryLabwareProvider::new()),
        );
        let state = StateStore::default().current();

        let result = handler
            .load_labware(
                &state,
                LabwareLocation::slot(DeckSlotName::Slot1),
                "mystery_plate",
                "custom",
                1,
                None,
            )
            .await;
        assert_eq!(
            result.unwrap_err(),
            EngineError::LabwareDefinitionNotFound("custom/mystery_plate/1".into())
        );
    }

    #[tokio::test]
    async fn test_load_pipette_caches_instrument() {
        let sim = Arc::new(SimulatedHardware::new());
        let handler = handler(sim.clone(), Arc::new(InMemoryLabwareProvider::new()));
        let state = StateStore::default().current();

        let id = handler
            .load_pipette(&state, PipetteName::P300Single, Mount::Left, Some("pip"))
            .await
            .unwrap();

        assert_eq!(id, "pip");
        assert_eq!(
            sim.calls(),
            vec![HardwareCall::CacheInstruments(HashMap::from([(
                Mount::Left,
                PipetteName::P300Single
            )]))]
        );
    }

    #[tokio::test]
    async fn test_load_pipette_hardware_mismatch() {
        let sim = Arc::new(
            SimulatedHardware::new().with_physical_pipette(Mount::Left, PipetteName::P20SingleGen2),
        );
        let handler = handler(sim, Arc::new(InMemoryLabwareProvider::new()));
        let state = StateStore::default().current();

        let result = handler
            .load_pipette(&state, PipetteName::P300Single, Mount::Left, None)
            .await;
        assert!(matches!(result, Err(EngineError::FailedToLoadPipette(_))));
    }

    #[test]
    fn test_add_labware_definition_echoes_identity() {
        let handler = handler(
            Arc::new(SimulatedHardware::new()),
            Arc::new(InMemoryLabwareProvider::new()),
        );
        let result = handler.add_labware_definition(&corning_96_wellplate_360ul_flat());

        assert_eq!(result.load_name, "corning_96_wellplate_360ul_flat");
        assert_eq!(result.namespace, "opentrons");
        assert_eq!(result.version, 1);
    }

    #[tokio::test]
    async fn test_load_pipette_rejects_loaded_id() {
        let sim = Arc::new(SimulatedHardware::new());
        let handler = handler(sim.clone(), Arc::new(InMemoryLabwareProvider::new()));
        let store = StateStore::default();
        load_pipette_into(&store, "p", Mount::Left);

        let result = handler
            .load_pipette(&store.current(), PipetteName::P300Single, Mount::Right, Some("p"))
            .await;

        assert_eq!(result, Err(EngineError::PipetteAlreadyLoaded("p".into())));
        assert!(sim.calls().is_empty());
    }
}
