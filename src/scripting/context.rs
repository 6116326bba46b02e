//! Protocol API exposed to Rhai scripts.
//!
//! A script receives a `ctx` global. Every call on it, or on the handles it
//! returns, becomes one engine command submitted with
//! [`ProtocolEngine::execute_command`] and blocks the script until that
//! command is terminal. A failed command raises a script error, so a
//! protocol never runs ahead of its hardware.
//!
//! # Script API
//!
//! ```text
//! ctx.load_labware(load_name, slot)                       -> Labware
//! ctx.load_labware(load_name, slot, namespace, version)   -> Labware
//! ctx.load_pipette(name, mount)                           -> Pipette
//! ctx.pause() / ctx.pause(message)
//!
//! pipette.pick_up_tip(labware, well)
//! pipette.drop_tip(labware, well)
//! pipette.aspirate(volume, labware, well)
//! pipette.dispense(volume, labware, well)
//! pipette.move_to(labware, well)
//!
//! labware.id, labware.load_name, pipette.id, pipette.mount
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let tiprack = ctx.load_labware("opentrons_96_tiprack_300ul", 1);
//! let plate = ctx.load_labware("corning_96_wellplate_360ul_flat", 2);
//! let left = ctx.load_pipette("p300_single", "left");
//!
//! left.pick_up_tip(tiprack, "A1");
//! left.aspirate(50.0, plate, "A1");
//! left.dispense(50.0, plate, "B1");
//! left.drop_tip(tiprack, "A1");
//! ```

use crate::commands::*;
use crate::engine::ProtocolEngine;
use crate::types::{DeckSlotName, LabwareLocation, Mount, PipetteName, WellLocation};
use rhai::{Engine, EvalAltResult};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::debug;

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

// =============================================================================
// Handle Types
// =============================================================================

/// The `ctx` global: a synchronous client of the engine.
#[derive(Clone)]
pub struct ProtocolContext {
    engine: Arc<ProtocolEngine>,
    runtime: Handle,
}

/// A loaded labware as seen by a script.
#[derive(Clone)]
pub struct LabwareHandle {
    pub labware_id: String,
    pub load_name: String,
}

/// A loaded pipette as seen by a script.
#[derive(Clone)]
pub struct PipetteHandle {
    context: ProtocolContext,
    pub pipette_id: String,
    pub mount: Mount,
}

impl ProtocolContext {
    /// `runtime` must belong to the runtime driving `engine`.
    pub fn new(engine: Arc<ProtocolEngine>, runtime: Handle) -> Self {
        Self { engine, runtime }
    }

    /// Submit a command and block until it is terminal.
    ///
    /// Must not be called from an async worker thread.
    pub fn execute(&self, data: CommandData) -> ScriptResult<CommandResult> {
        let command_type = data.command_type();
        debug!(%command_type, "Script submitting command");

        let command = self
            .runtime
            .block_on(self.engine.execute_command(data.into()))
            .map_err(|err| script_error(format!("{} command rejected: {}", command_type, err)))?;

        match (command.status, command.result, command.error) {
            (CommandStatus::Succeeded, Some(result), _) => Ok(result),
            (_, _, Some(error)) => Err(script_error(format!(
                "{} command {} failed: {}: {}",
                command_type, command.id, error.error_type, error.detail
            ))),
            (status, _, _) => Err(script_error(format!(
                "{} command {} ended in status {}",
                command_type, command.id, status
            ))),
        }
    }

    pub fn load_labware(
        &self,
        load_name: &str,
        slot: DeckSlotName,
        namespace: &str,
        version: u32,
    ) -> ScriptResult<LabwareHandle> {
        let result = self.execute(CommandData::LoadLabware(LoadLabwareData {
            location: LabwareLocation::slot(slot),
            load_name: load_name.to_string(),
            namespace: namespace.to_string(),
            version,
            labware_id: None,
        }))?;

        match result {
            CommandResult::LoadLabware(loaded) => Ok(LabwareHandle {
                labware_id: loaded.labware_id,
                load_name: load_name.to_string(),
            }),
            _ => Err(script_error("loadLabware returned an unexpected result")),
        }
    }

    pub fn load_pipette(&self, pipette_name: PipetteName, mount: Mount) -> ScriptResult<PipetteHandle> {
        let result = self.execute(CommandData::LoadPipette(LoadPipetteData {
            pipette_name,
            mount,
            pipette_id: None,
        }))?;

        match result {
            CommandResult::LoadPipette(loaded) => Ok(PipetteHandle {
                context: self.clone(),
                pipette_id: loaded.pipette_id,
                mount,
            }),
            _ => Err(script_error("loadPipette returned an unexpected result")),
        }
    }

    pub fn pause(&self, message: Option<String>) -> ScriptResult<()> {
        self.execute(CommandData::Pause(PauseData { message }))?;
        Ok(())
    }
}

impl PipetteHandle {
    pub fn pick_up_tip(&self, tiprack: &LabwareHandle, well_name: &str) -> ScriptResult<()> {
        self.context.execute(CommandData::PickUpTip(PickUpTipData {
            pipette_id: self.pipette_id.clone(),
            labware_id: tiprack.labware_id.clone(),
            well_name: well_name.to_string(),
        }))?;
        Ok(())
    }

    pub fn drop_tip(&self, labware: &LabwareHandle, well_name: &str) -> ScriptResult<()> {
        self.context.execute(CommandData::DropTip(DropTipData {
            pipette_id: self.pipette_id.clone(),
            labware_id: labware.labware_id.clone(),
            well_name: well_name.to_string(),
        }))?;
        Ok(())
    }

    /// Returns the volume actually aspirated.
    pub fn aspirate(&self, volume: f64, labware: &LabwareHandle, well_name: &str) -> ScriptResult<f64> {
        let result = self.context.execute(CommandData::Aspirate(AspirateData {
            pipette_id: self.pipette_id.clone(),
            labware_id: labware.labware_id.clone(),
            well_name: well_name.to_string(),
            well_location: WellLocation::default(),
            volume,
        }))?;
        match result {
            CommandResult::Aspirate(AspirateResult { volume }) => Ok(volume),
            _ => Err(script_error("aspirate returned an unexpected result")),
        }
    }

    /// Returns the volume actually dispensed.
    pub fn dispense(&self, volume: f64, labware: &LabwareHandle, well_name: &str) -> ScriptResult<f64> {
        let result = self.context.execute(CommandData::Dispense(DispenseData {
            pipette_id: self.pipette_id.clone(),
            labware_id: labware.labware_id.clone(),
            well_name: well_name.to_string(),
            well_location: WellLocation::default(),
            volume,
        }))?;
        match result {
            CommandResult::Dispense(DispenseResult { volume }) => Ok(volume),
            _ => Err(script_error("dispense returned an unexpected result")),
        }
    }

    pub fn move_to(&self, labware: &LabwareHandle, well_name: &str) -> ScriptResult<()> {
        self.context.execute(CommandData::MoveToWell(MoveToWellData {
            pipette_id: self.pipette_id.clone(),
            labware_id: labware.labware_id.clone(),
            well_name: well_name.to_string(),
            well_location: WellLocation::default(),
        }))?;
        Ok(())
    }
}

// =============================================================================
// Registration
// =============================================================================

/// Register the protocol types and methods with a Rhai engine.
pub fn register_protocol_api(engine: &mut Engine) {
    engine.register_type_with_name::<ProtocolContext>("ProtocolContext");
    engine.register_type_with_name::<LabwareHandle>("Labware");
    engine.register_type_with_name::<PipetteHandle>("Pipette");

    // ctx.load_labware
    engine.register_fn(
        "load_labware",
        |ctx: &mut ProtocolContext, load_name: &str, slot: i64| {
            ctx.load_labware(load_name, parse_slot_number(slot)?, "opentrons", 1)
        },
    );
    engine.register_fn(
        "load_labware",
        |ctx: &mut ProtocolContext, load_name: &str, slot: &str| {
            ctx.load_labware(load_name, parse_slot(slot)?, "opentrons", 1)
        },
    );
    engine.register_fn(
        "load_labware",
        |ctx: &mut ProtocolContext, load_name: &str, slot: i64, namespace: &str, version: i64| {
            ctx.load_labware(
                load_name,
                parse_slot_number(slot)?,
                namespace,
                parse_version(version)?,
            )
        },
    );

    // ctx.load_pipette / ctx.pause
    engine.register_fn(
        "load_pipette",
        |ctx: &mut ProtocolContext, name: &str, mount: &str| {
            let name: PipetteName = name.parse().map_err(script_error)?;
            let mount: Mount = mount.parse().map_err(script_error)?;
            ctx.load_pipette(name, mount)
        },
    );
    engine.register_fn("pause", |ctx: &mut ProtocolContext| ctx.pause(None));
    engine.register_fn("pause", |ctx: &mut ProtocolContext, message: &str| {
        ctx.pause(Some(message.to_string()))
    });

    // Pipette methods
    engine.register_fn(
        "pick_up_tip",
        |pipette: &mut PipetteHandle, tiprack: LabwareHandle, well: &str| {
            pipette.pick_up_tip(&tiprack, well)
        },
    );
    engine.register_fn(
        "drop_tip",
        |pipette: &mut PipetteHandle, labware: LabwareHandle, well: &str| {
            pipette.drop_tip(&labware, well)
        },
    );
    engine.register_fn(
        "aspirate",
        |pipette: &mut PipetteHandle, volume: f64, labware: LabwareHandle, well: &str| {
            pipette.aspirate(volume, &labware, well)
        },
    );
    engine.register_fn(
        "aspirate",
        |pipette: &mut PipetteHandle, volume: i64, labware: LabwareHandle, well: &str| {
            pipette.aspirate(volume as f64, &labware, well)
        },
    );
    engine.register_fn(
        "dispense",
        |pipette: &mut PipetteHandle, volume: f64, labware: LabwareHandle, well: &str| {
            pipette.dispense(volume, &labware, well)
        },
    );
    engine.register_fn(
        "dispense",
        |pipette: &mut PipetteHandle, volume: i64, labware: LabwareHandle, well: &str| {
            pipette.dispense(volume as f64, &labware, well)
        },
    );
    engine.register_fn(
        "move_to",
        |pipette: &mut PipetteHandle, labware: LabwareHandle, well: &str| {
            pipette.move_to(&labware, well)
        },
    );

    // Read-only properties
    engine.register_get("id", |labware: &mut LabwareHandle| labware.labware_id.clone());
    engine.register_get("load_name", |labware: &mut LabwareHandle| {
        labware.load_name.clone()
    });
    engine.register_get("id", |pipette: &mut PipetteHandle| pipette.pipette_id.clone());
    engine.register_get("mount", |pipette: &mut PipetteHandle| {
        pipette.mount.as_str().to_string()
    });
}

fn script_error(message: impl Into<String>) -> Box<EvalAltResult> {
    let message: String = message.into();
    message.into()
}

fn parse_slot_number(slot: i64) -> ScriptResult<DeckSlotName> {
    DeckSlotName::from_number(slot)
        .ok_or_else(|| script_error(format!("Invalid deck slot: {}", slot)))
}

fn parse_slot(slot: &str) -> ScriptResult<DeckSlotName> {
    slot.parse().map_err(script_error)
}

fn parse_version(version: i64) -> ScriptResult<u32> {
    u32::try_from(version).map_err(|_| script_error(format!("Invalid labware version: {}", version)))
}
