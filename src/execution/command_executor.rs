//! Command dispatch: one exhaustive match from command data to handler.

use super::equipment::EquipmentHandler;
use super::movement::MovementHandler;
use super::pipetting::PipettingHandler;
use super::run_control::RunControlHandler;
use crate::commands::*;
use crate::error::EngineResult;
use crate::state::StateView;

/// Routes each command to the handler for its capability.
#[derive(Clone)]
pub struct CommandExecutor {
    equipment: EquipmentHandler,
    movement: MovementHandler,
    pipetting: PipettingHandler,
    run_control: RunControlHandler,
}

impl CommandExecutor {
    pub fn new(
        equipment: EquipmentHandler,
        movement: MovementHandler,
        pipetting: PipettingHandler,
        run_control: RunControlHandler,
    ) -> Self {
        Self {
            equipment,
            movement,
            pipetting,
            run_control,
        }
    }

    /// Execute against a state snapshot. The snapshot is not modified; the
    /// caller applies the result.
    pub async fn execute(&self, state: &StateView, data: &CommandData) -> EngineResult<CommandResult> {
        match data {
            CommandData::LoadLabware(data) => {
                let loaded = self
                    .equipment
                    .load_labware(
                        state,
                        data.location,
                        &data.load_name,
                        &data.namespace,
                        data.version,
                        data.labware_id.as_deref(),
                    )
                    .await?;
                Ok(CommandResult::LoadLabware(LoadLabwareResult {
                    labware_id: loaded.labware_id,
                    definition: loaded.definition,
                    calibration: loaded.calibration,
                }))
            }
            CommandData::LoadPipette(data) => {
                let pipette_id = self
                    .equipment
                    .load_pipette(
                        state,
                        data.pipette_name,
                        data.mount,
                        data.pipette_id.as_deref(),
                    )
                    .await?;
                Ok(CommandResult::LoadPipette(LoadPipetteResult { pipette_id }))
            }
            CommandData::AddLabwareDefinition(data) => Ok(CommandResult::AddLabwareDefinition(
                self.equipment.add_labware_definition(&data.definition),
            )),
            CommandData::Aspirate(data) => {
                let volume = self
                    .pipetting
                    .aspirate(
                        state,
                        &data.pipette_id,
                        &data.labware_id,
                        &data.well_name,
                        &data.well_location,
                        data.volume,
                    )
                    .await?;
                Ok(CommandResult::Aspirate(AspirateResult { volume }))
            }
            CommandData::Dispense(data) => {
                let volume = self
                    .pipetting
                    .dispense(
                        state,
                        &data.pipette_id,
                        &data.labware_id,
                        &data.well_name,
                        &data.well_location,
                        data.volume,
                    )
                    .await?;
                Ok(CommandResult::Dispense(DispenseResult { volume }))
            }
            CommandData::PickUpTip(data) => {
                self.pipetting
                    .pick_up_tip(state, &data.pipette_id, &data.labware_id, &data.well_name)
                    .await?;
                Ok(CommandResult::PickUpTip(PickUpTipResult {}))
            }
            CommandData::DropTip(data) => {
                self.pipetting
                    .drop_tip(state, &data.pipette_id, &data.labware_id, &data.well_name)
                    .await?;
                Ok(CommandResult::DropTip(DropTipResult {}))
            }
            CommandData::MoveToWell(data) => {
                self.movement
                    .move_to_well(
                        &state.motion(),
                        &data.pipette_id,
                        &data.labware_id,
                        &data.well_name,
                        &data.well_location,
                        None,
                    )
                    .await?;
                Ok(CommandResult::MoveToWell(MoveToWellResult {}))
            }
            CommandData::Pause(data) => {
                self.run_control.pause(data.message.as_deref()).await?;
                Ok(CommandResult::Pause(PauseResult {}))
            }
        }
    }
}
