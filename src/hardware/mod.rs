//! Hardware control boundary.
//!
//! Everything the engine does to the physical robot goes through the
//! [`HardwareApi`] capability trait. Two implementations ship with the crate:
//!
//! - [`SimulatedHardware`]: in-memory robot with realistic async timing and a
//!   call log, used for simulation runs and tests.
//! - [`HardwareHandle`]: client side of the [`HardwareWorker`] task. It also
//!   implements `HardwareApi`, serializing every call through one worker so
//!   at most one hardware operation is ever in flight.
//!
//! # Cancellation
//!
//! `halt()` is the only call that bypasses the worker queue. It aborts the
//! in-flight operation, the worker stops the motors and the aborted caller
//! receives [`HardwareError::Cancelled`].
//!
//! # Example
//!
//! ```rust,ignore
//! let sim = Arc::new(SimulatedHardware::new());
//! let (hardware, _worker) = HardwareHandle::spawn(sim.clone(), 32);
//! hardware.move_to(Mount::Left, Point::new(10.0, 20.0, 100.0), None).await?;
//! ```

pub mod simulator;
pub mod worker;

pub use simulator::{HardwareCall, SimulatedHardware};
pub use worker::{HardwareHandle, HardwareRequest, HardwareWorker};

use crate::types::{CriticalPoint, Mount, PipetteName, Point};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HardwareError {
    #[error("Hardware fault: {0}")]
    Fault(String),

    #[error("No instrument attached to the {0} mount")]
    NotAttached(Mount),

    #[error("Requested instrument {requested} on the {mount} mount does not match attached instrument")]
    InstrumentMismatch { mount: Mount, requested: PipetteName },

    #[error("Hardware operation cancelled by halt")]
    Cancelled,

    #[error("Hardware worker is not running")]
    WorkerUnavailable,
}

/// Hardware-side configuration of an attached pipette.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipetteConfig {
    pub name: PipetteName,
    pub max_volume: f64,
    /// Tip overlap by tiprack definition URI, with a `"default"` fallback.
    pub tip_overlap: HashMap<String, f64>,
    /// Fraction of the tip length to lower into a tiprack when returning tips.
    pub return_tip_height: f64,
    /// Plunger is at the bottom and ready to aspirate.
    pub ready_to_aspirate: bool,
    pub has_tip: bool,
}

impl PipetteConfig {
    /// Default configuration for a pipette model.
    pub fn for_name(name: PipetteName) -> Self {
        let default_overlap = match name.max_volume() {
            v if v <= 20.0 => 8.25,
            v if v <= 300.0 => 7.47,
            _ => 7.95,
        };
        Self {
            name,
            max_volume: name.max_volume(),
            tip_overlap: HashMap::from([("default".to_string(), default_overlap)]),
            return_tip_height: 0.5,
            ready_to_aspirate: false,
            has_tip: false,
        }
    }

    /// Overlap for a tiprack, falling back to the `"default"` entry.
    pub fn tip_overlap_for(&self, tiprack_uri: &str) -> f64 {
        self.tip_overlap
            .get(tiprack_uri)
            .or_else(|| self.tip_overlap.get("default"))
            .copied()
            .unwrap_or(0.0)
    }
}

/// Hardware-reported pipettes by mount.
pub type AttachedInstruments = HashMap<Mount, PipetteConfig>;

/// Capability trait for the liquid handling robot.
///
/// Positions are absolute deck coordinates. A `critical_point` of `None`
/// keeps the mount's currently active critical point.
#[async_trait]
pub trait HardwareApi: Send + Sync {
    async fn gantry_position(
        &self,
        mount: Mount,
        critical_point: Option<CriticalPoint>,
    ) -> Result<Point, HardwareError>;

    async fn move_to(
        &self,
        mount: Mount,
        position: Point,
        critical_point: Option<CriticalPoint>,
    ) -> Result<(), HardwareError>;

    /// Highest reachable z for the mount with its current tip.
    async fn get_instrument_max_height(&self, mount: Mount) -> Result<f64, HardwareError>;

    /// Verify and cache the requested instruments. Every mount in `requested`
    /// must end up attached.
    async fn cache_instruments(
        &self,
        requested: HashMap<Mount, PipetteName>,
    ) -> Result<(), HardwareError>;

    async fn attached_instruments(&self) -> Result<AttachedInstruments, HardwareError>;

    async fn prepare_for_aspirate(&self, mount: Mount) -> Result<(), HardwareError>;

    async fn aspirate(&self, mount: Mount, volume: f64) -> Result<(), HardwareError>;

    async fn dispense(&self, mount: Mount, volume: f64) -> Result<(), HardwareError>;

    async fn pick_up_tip(&self, mount: Mount, tip_length: f64) -> Result<(), HardwareError>;

    async fn set_current_tiprack_diameter(
        &self,
        mount: Mount,
        diameter: f64,
    ) -> Result<(), HardwareError>;

    async fn set_working_volume(&self, mount: Mount, volume: f64) -> Result<(), HardwareError>;

    async fn drop_tip(&self, mount: Mount, home_after: bool) -> Result<(), HardwareError>;

    /// Stop all motion immediately.
    async fn halt(&self) -> Result<(), HardwareError>;
}
