//! Command execution.
//!
//! Handlers are grouped by capability. Each takes a [`StateView`] snapshot,
//! talks to the hardware through [`HardwareApi`], and returns a typed result.
//! None of them write state; the engine applies results after the handler
//! returns.
//!
//! [`StateView`]: crate::state::StateView
//! [`HardwareApi`]: crate::hardware::HardwareApi

pub mod command_executor;
pub mod equipment;
pub mod movement;
pub mod pipetting;
pub mod run_control;

pub use command_executor::CommandExecutor;
pub use equipment::{EquipmentHandler, LoadedLabwareData};
pub use movement::MovementHandler;
pub use pipetting::PipettingHandler;
pub use run_control::{EngineStatus, RunControl, RunControlHandler};
