//! Tip handling and liquid handling.

use super::movement::MovementHandler;
use crate::error::{EngineError, EngineResult};
use crate::hardware::HardwareApi;
use crate::state::{HardwarePipette, StateView};
use crate::types::{CurrentWell, WellLocation};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct PipettingHandler {
    hardware: Arc<dyn HardwareApi>,
    movement: MovementHandler,
}

impl PipettingHandler {
    pub fn new(hardware: Arc<dyn HardwareApi>, movement: MovementHandler) -> Self {
        Self { hardware, movement }
    }

    async fn hardware_pipette(
        &self,
        state: &StateView,
        pipette_id: &str,
    ) -> EngineResult<HardwarePipette> {
        let attached = self.hardware.attached_instruments().await?;
        state.pipettes().get_hardware_pipette(pipette_id, &attached)
    }

    pub async fn pick_up_tip(
        &self,
        state: &StateView,
        pipette_id: &str,
        labware_id: &str,
        well_name: &str,
    ) -> EngineResult<()> {
        validate_target(state, pipette_id, labware_id, well_name)?;
        state.labware().get_tip_length(labware_id)?;
        let pipette = self.hardware_pipette(state, pipette_id).await?;
        let tip = state
            .geometry()
            .get_tip_geometry(labware_id, well_name, &pipette.config)?;

        self.movement
            .move_to_well(
                &state.motion(),
                pipette_id,
                labware_id,
                well_name,
                &WellLocation::top(),
                None,
            )
            .await?;

        self.hardware
            .pick_up_tip(pipette.mount, tip.effective_length)
            .await?;
        self.hardware
            .set_current_tiprack_diameter(pipette.mount, tip.diameter)
            .await?;
        self.hardware
            .set_working_volume(pipette.mount, tip.volume)
            .await?;
        Ok(())
    }

    pub async fn drop_tip(
        &self,
        state: &StateView,
        pipette_id: &str,
        labware_id: &str,
        well_name: &str,
    ) -> EngineResult<()> {
        validate_target(state, pipette_id, labware_id, well_name)?;
        let pipette = self.hardware_pipette(state, pipette_id).await?;
        let drop_location = state
            .geometry()
            .get_tip_drop_location(labware_id, &pipette.config)?;

        self.movement
            .move_to_well(
                &state.motion(),
                pipette_id,
                labware_id,
                well_name,
                &drop_location,
                None,
            )
            .await?;

        self.hardware.drop_tip(pipette.mount, true).await?;
        Ok(())
    }

    /// Aspirate, priming the plunger above the well first if needed.
    /// Returns the aspirated volume.
    pub async fn aspirate(
        &self,
        state: &StateView,
        pipette_id: &str,
        labware_id: &str,
        well_name: &str,
        well_location: &WellLocation,
        volume: f64,
    ) -> EngineResult<f64> {
        validate_volume(volume)?;
        validate_target(state, pipette_id, labware_id, well_name)?;
        let pipette = self.hardware_pipette(state, pipette_id).await?;
        let ready = state
            .pipettes()
            .get_is_ready_to_aspirate(pipette_id, &pipette.config)?;
        let motion = state.motion();

        let mut current_well = None;
        if !ready {
            debug!(pipette_id, "Preparing pipette for aspirate");
            self.movement
                .move_to_well(
                    &motion,
                    pipette_id,
                    labware_id,
                    well_name,
                    &WellLocation::top(),
                    None,
                )
                .await?;
            self.hardware.prepare_for_aspirate(pipette.mount).await?;
            current_well = Some(CurrentWell::new(pipette_id, labware_id, well_name));
        }

        self.movement
            .move_to_well(
                &motion,
                pipette_id,
                labware_id,
                well_name,
                well_location,
                current_well.as_ref(),
            )
            .await?;
        self.hardware.aspirate(pipette.mount, volume).await?;
        Ok(volume)
    }

    /// Dispense and return the dispensed volume.
    pub async fn dispense(
        &self,
        state: &StateView,
        pipette_id: &str,
        labware_id: &str,
        well_name: &str,
        well_location: &WellLocation,
        volume: f64,
    ) -> EngineResult<f64> {
        validate_volume(volume)?;
        validate_target(state, pipette_id, labware_id, well_name)?;
        let pipette = self.hardware_pipette(state, pipette_id).await?;

        self.movement
            .move_to_well(
                &state.motion(),
                pipette_id,
                labware_id,
                well_name,
                well_location,
                None,
            )
            .await?;
        self.hardware.dispense(pipette.mount, volume).await?;
        Ok(volume)
    }
}

/// Id checks that must pass before any hardware call.
fn validate_target(
    state: &StateView,
    pipette_id: &str,
    labware_id: &str,
    well_name: &str,
) -> EngineResult<()> {
    state.pipettes().get(pipette_id)?;
    state.labware().get_well_definition(labware_id, well_name)?;
    Ok(())
}

fn validate_volume(volume: f64) -> EngineResult<()> {
    if volume.is_finite() && volume > 0.0 {
        Ok(())
    } else {
        Err(EngineError::InvalidVolume(volume))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::*;
    use crate::hardware::{HardwareCall, SimulatedHardware};
    use crate::resources::labware_definition::{
        corning_96_wellplate_360ul_flat, opentrons_1_trash_1100ml_fixed, opentrons_96_tiprack_300ul,
    };
    use crate::state::{Action, StateStore};
    use crate::types::{CalibrationOffset, DeckSlotName, LabwareLocation, Mount, PipetteName};
    use chrono::Utc;
    use std::collections::HashMap;

    fn apply(store: &StateStore, id: &str, data: CommandData, result: CommandResult) {
        store
            .handle_action(Action::AddCommand(Command::queued(id.into(), Utc::now(), data)))
            .unwrap();
        store
            .handle_action(Action::StartCommand {
                command_id: id.into(),
                started_at: Utc::now(),
            })
            .unwrap();
        store
            .handle_action(Action::SucceedCommand {
                command_id: id.into(),
                result,
                completed_at: Utc::now(),
            })
            .unwrap();
    }

    fn load(store: &StateStore, id: &str, slot: DeckSlotName, definition: crate::resources::LabwareDefinition) {
        apply(
            store,
            &format!("load-{}", id),
            CommandData::LoadLabware(LoadLabwareData {
                location: LabwareLocation::slot(slot),
                load_name: definition.load_name().into(),
                namespace: definition.namespace.clone(),
                version: definition.version,
                labware_id: Some(id.into()),
            }),
            CommandResult::LoadLabware(LoadLabwareResult {
                labware_id: id.into(),
                definition,
                calibration: CalibrationOffset::default(),
            }),
        );
    }

    async fn setup() -> (StateStore, Arc<SimulatedHardware>, PipettingHandler) {
        let store = StateStore::default();
        apply(
            &store,
            "load-pipette",
            CommandData::LoadPipette(LoadPipetteData {
                pipette_name: PipetteName::P300Single,
                mount: Mount::Left,
                pipette_id: Some("pip".into()),
            }),
            CommandResult::LoadPipette(LoadPipetteResult {
                pipette_id: "pip".into(),
            }),
        );
        load(&store, "tips", DeckSlotName::Slot1, opentrons_96_tiprack_300ul());
        load(&store, "plate", DeckSlotName::Slot2, corning_96_wellplate_360ul_flat());
        load(&store, "trash", DeckSlotName::Slot12, opentrons_1_trash_1100ml_fixed());

        let sim = Arc::new(SimulatedHardware::new());
        sim.cache_instruments(HashMap::from([(Mount::Left, PipetteName::P300Single)]))
            .await
            .unwrap();
        let movement = MovementHandler::new(sim.clone());
        let handler = PipettingHandler::new(sim.clone(), movement);
        (store, sim, handler)
    }

    fn non_move_calls(sim: &SimulatedHardware) -> Vec<HardwareCall> {
        sim.calls()
            .into_iter()
            .filter(|call| {
                !matches!(
                    call,
                    HardwareCall::MoveTo { .. } | HardwareCall::CacheInstruments(_)
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_pick_up_tip_sequence() {
        let (store, sim, handler) = setup().await;
        let state = store.current();

        handler.pick_up_tip(&state, "pip", "tips", "A1").await.unwrap();

        let overlap = 7.47;
        assert_eq!(
            non_move_calls(&sim),
            vec![
                HardwareCall::PickUpTip {
                    mount: Mount::Left,
                    tip_length: 59.3 - overlap,
                },
                HardwareCall::SetCurrentTiprackDiameter {
                    mount: Mount::Left,
                    diameter: 5.23,
                },
                HardwareCall::SetWorkingVolume {
                    mount: Mount::Left,
                    volume: 300.0,
                },
            ]
        );
        let last_move = sim.moves().pop().unwrap();
        let top = state
            .geometry()
            .get_well_position("tips", "A1", &WellLocation::top())
            .unwrap();
        assert_eq!(
            last_move,
            HardwareCall::MoveTo {
                mount: Mount::Left,
                position: top,
                critical_point: None,
            }
        );
    }

    #[tokio::test]
    async fn test_drop_tip_in_trash_homes_after() {
        let (store, sim, handler) = setup().await;
        handler
            .drop_tip(&store.current(), "pip", "trash", "A1")
            .await
            .unwrap();

        assert_eq!(
            non_move_calls(&sim),
            vec![HardwareCall::DropTip {
                mount: Mount::Left,
                home_after: true,
            }]
        );
    }

    #[tokio::test]
    async fn test_aspirate_prepares_when_not_ready() {
        let (store, sim, handler) = setup().await;
        let state = store.current();
        let location = WellLocation::bottom(1.0);

        let volume = handler
            .aspirate(&state, "pip", "plate", "A1", &location, 50.0)
            .await
            .unwrap();
        assert_eq!(volume, 50.0);

        assert_eq!(
            non_move_calls(&sim),
            vec![
                HardwareCall::PrepareForAspirate(Mount::Left),
                HardwareCall::Aspirate {
                    mount: Mount::Left,
                    volume: 50.0,
                },
            ]
        );

        // Second move goes straight down inside the same well.
        let moves = sim.moves();
        let bottom = state.geometry().get_well_position("plate", "A1", &location).unwrap();
        assert_eq!(
            moves.last(),
            Some(&HardwareCall::MoveTo {
                mount: Mount::Left,
                position: bottom,
                critical_point: None,
            })
        );
        let top = state
            .geometry()
            .get_well_position("plate", "A1", &WellLocation::top())
            .unwrap();
        assert_eq!(
            moves[moves.len() - 2],
            HardwareCall::MoveTo {
                mount: Mount::Left,
                position: top,
                critical_point: None,
            }
        );
    }

    #[tokio::test]
    async fn test_aspirate_skips_prepare_when_ready() {
        let (store, sim, handler) = setup().await;
        sim.prepare_for_aspirate(Mount::Left).await.unwrap();
        let state = store.current();

        handler
            .aspirate(&state, "pip", "plate", "A1", &WellLocation::top(), 20.0)
            .await
            .unwrap();

        let prepares = sim
            .calls()
            .into_iter()
            .filter(|call| matches!(call, HardwareCall::PrepareForAspirate(_)))
            .count();
        assert_eq!(prepares, 1, "only the explicit prepare above");
    }

    #[tokio::test]
    async fn test_dispense() {
        let (store, sim, handler) = setup().await;
        let volume = handler
            .dispense(&store.current(), "pip", "plate", "H12", &WellLocation::top(), 30.0)
            .await
            .unwrap();
        assert_eq!(volume, 30.0);
        assert_eq!(
            non_move_calls(&sim),
            vec![HardwareCall::Dispense {
                mount: Mount::Left,
                volume: 30.0,
            }]
        );
    }

    #[tokio::test]
    async fn test_invalid_volume_touches_nothing() {
        let (store, sim, handler) = setup().await;
        let result = handler
            .aspirate(&store.current(), "pip", "plate", "A1", &WellLocation::top(), -5.0)
            .await;
        assert_eq!(result, Err(EngineError::InvalidVolume(-5.0)));
        assert!(non_move_calls(&sim).is_empty());
        assert!(sim.moves().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_pipette() {
        let (store, _sim, handler) = setup().await;
        let result = handler.pick_up_tip(&store.current(), "ghost", "tips", "A1").await;
        assert_eq!(result, Err(EngineError::PipetteDoesNotExist("ghost".into())));
    }

    #[tokio::test]
    async fn test_unknown_ids_fail_before_any_hardware_call() {
        let (store, sim, handler) = setup().await;
        let state = store.current();
        let before = sim.boundary_call_count();
        let top = WellLocation::top();

        assert_eq!(
            handler.aspirate(&state, "ghost", "plate", "A1", &top, 10.0).await,
            Err(EngineError::PipetteDoesNotExist("ghost".into()))
        );
        assert_eq!(
            handler.dispense(&state, "pip", "no-such-labware", "A1", &top, 10.0).await,
            Err(EngineError::LabwareDoesNotExist("no-such-labware".into()))
        );
        assert!(matches!(
            handler.drop_tip(&state, "pip", "plate", "Z99").await,
            Err(EngineError::WellDoesNotExist { .. })
        ));
        assert!(matches!(
            handler.pick_up_tip(&state, "pip", "plate", "A1").await,
            Err(EngineError::LabwareIsNotTiprack(_))
        ));

        assert_eq!(sim.boundary_call_count(), before);
    }
}
