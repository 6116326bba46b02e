//! Protocol execution engine for a single liquid-handling robot.
//!
//! A protocol (a JSON command list or a Rhai script) is turned into a
//! sequence of typed commands. The [`engine::ProtocolEngine`] executes them
//! one at a time against a hardware boundary, records every command's
//! lifecycle, and keeps an immutable-snapshot state store of what is loaded
//! on the deck. The [`runner::ProtocolRunner`] wraps a run in load, run and
//! cleanup phases.
//!
//! # Architecture
//!
//! ```text
//! ProtocolRunner ── TaskQueue (Load < Run < Cleanup)
//!      │
//!      ▼
//! ProtocolEngine ── dispatch loop ── CommandExecutor ── handlers
//!      │                                                 │
//!      ▼                                                 ▼
//!  StateStore (StateView snapshots)          HardwareHandle ─▶ worker ─▶ device
//! ```

pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod hardware;
pub mod logging;
pub mod motion_planning;
pub mod resources;
pub mod runner;
pub mod scripting;
pub mod state;
pub mod types;

pub use commands::{Command, CommandData, CommandRequest, CommandResult, CommandStatus};
pub use config::EngineConfig;
pub use engine::{EngineDependencies, ProtocolEngine};
pub use error::{EngineError, EngineResult, ErrorOccurrence, RunError};
pub use execution::EngineStatus;
pub use runner::{create_simulating_runner, ProtocolRunner, ProtocolSource, RunResult, RunStatus};
pub use state::StateView;
