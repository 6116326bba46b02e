//! Script protocols.
//!
//! Protocols can be written as Rhai scripts instead of JSON command lists.
//! A script drives the engine through a [`ProtocolContext`] bound as the
//! global `ctx`; see [`context`] for the API.
//!
//! # Architecture
//!
//! ```text
//! ScriptEngine trait
//!     └── RhaiEngine (embedded, spawn_blocking per run)
//!
//! Protocol bindings
//!     └── ProtocolContext, LabwareHandle, PipetteHandle
//!             │ execute_command (blocking)
//!             ▼
//!         ProtocolEngine
//! ```

pub mod context;
pub mod rhai_engine;
pub mod script_engine;

pub use context::{register_protocol_api, LabwareHandle, PipetteHandle, ProtocolContext};
pub use rhai_engine::{RhaiEngine, DEFAULT_MAX_OPERATIONS};
pub use script_engine::{ScriptEngine, ScriptError};
