//! Simulated liquid handling robot.
//!
//! Provides an in-memory [`HardwareApi`] for simulation runs and tests without
//! physical hardware. Motion uses `tokio::time::sleep`, so a halted move is
//! a dropped future, the same as on a real robot.
//!
//! Every call is appended to a call log ([`SimulatedHardware::calls`]) so
//! tests can assert the exact sequence the engine issued.
//!
//! # Fault injection
//!
//! ```rust,ignore
//! let sim = SimulatedHardware::new();
//! sim.fail_next_move("gantry stall");
//! assert!(sim.move_to(Mount::Left, Point::default(), None).await.is_err());
//! ```

use super::{AttachedInstruments, HardwareApi, HardwareError, PipetteConfig};
use crate::types::{CriticalPoint, Mount, PipetteName, Point};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::time::{sleep, Duration};

/// Default gantry ceiling in deck coordinates (mm).
pub const DEFAULT_MAX_HEIGHT: f64 = 200.0;

/// One hardware call as observed by the simulator.
#[derive(Debug, Clone, PartialEq)]
pub enum HardwareCall {
    MoveTo {
        mount: Mount,
        position: Point,
        critical_point: Option<CriticalPoint>,
    },
    CacheInstruments(HashMap<Mount, PipetteName>),
    PrepareForAspirate(Mount),
    Aspirate { mount: Mount, volume: f64 },
    Dispense { mount: Mount, volume: f64 },
    PickUpTip { mount: Mount, tip_length: f64 },
    SetCurrentTiprackDiameter { mount: Mount, diameter: f64 },
    SetWorkingVolume { mount: Mount, volume: f64 },
    DropTip { mount: Mount, home_after: bool },
    Halt,
}

#[derive(Debug)]
struct SimState {
    positions: HashMap<Mount, Point>,
    attached: AttachedInstruments,
    max_height: f64,
    calls: Vec<HardwareCall>,
    /// Read-only calls (position, max height, attached instruments).
    queries: usize,
    move_fault: Option<String>,
    /// Only these pipettes may be cached; `None` attaches whatever is requested.
    physically_attached: Option<HashMap<Mount, PipetteName>>,
}

/// Simulated robot with async timing and a call log.
#[derive(Debug)]
pub struct SimulatedHardware {
    state: Mutex<SimState>,
    move_delay: Duration,
}

impl SimulatedHardware {
    /// Robot at the deck origin, ceiling [`DEFAULT_MAX_HEIGHT`], instant moves.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                positions: HashMap::new(),
                attached: HashMap::new(),
                max_height: DEFAULT_MAX_HEIGHT,
                calls: Vec::new(),
                queries: 0,
                move_fault: None,
                physically_attached: None,
            }),
            move_delay: Duration::ZERO,
        }
    }

    /// Each `move_to` sleeps this long before arriving.
    pub fn with_move_delay(mut self, delay: Duration) -> Self {
        self.move_delay = delay;
        self
    }

    pub fn with_max_height(self, max_height: f64) -> Self {
        self.state.lock().max_height = max_height;
        self
    }

    pub fn with_gantry_position(self, mount: Mount, position: Point) -> Self {
        self.state.lock().positions.insert(mount, position);
        self
    }

    /// Restrict `cache_instruments` to the pipettes "physically" present.
    pub fn with_physical_pipette(self, mount: Mount, name: PipetteName) -> Self {
        self.state
            .lock()
            .physically_attached
            .get_or_insert_with(HashMap::new)
            .insert(mount, name);
        self
    }

    /// Make the next `move_to` fail with a hardware fault.
    pub fn fail_next_move(&self, message: impl Into<String>) {
        self.state.lock().move_fault = Some(message.into());
    }

    /// Snapshot of every call issued so far.
    pub fn calls(&self) -> Vec<HardwareCall> {
        self.state.lock().calls.clone()
    }

    /// Only the `move_to` calls, in order.
    pub fn moves(&self) -> Vec<HardwareCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, HardwareCall::MoveTo { .. }))
            .collect()
    }

    /// Number of read-only queries answered so far.
    pub fn query_count(&self) -> usize {
        self.state.lock().queries
    }

    /// Every call that reached the simulator, commands and queries alike.
    pub fn boundary_call_count(&self) -> usize {
        let state = self.state.lock();
        state.calls.len() + state.queries
    }

    fn record(&self, call: HardwareCall) {
        self.state.lock().calls.push(call);
    }

    fn with_pipette<T>(
        &self,
        mount: Mount,
        f: impl FnOnce(&mut PipetteConfig) -> T,
    ) -> Result<T, HardwareError> {
        let mut state = self.state.lock();
        state
            .attached
            .get_mut(&mount)
            .map(f)
            .ok_or(HardwareError::NotAttached(mount))
    }
}

impl Default for SimulatedHardware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HardwareApi for SimulatedHardware {
    async fn gantry_position(
        &self,
        mount: Mount,
        _critical_point: Option<CriticalPoint>,
    ) -> Result<Point, HardwareError> {
        let mut state = self.state.lock();
        state.queries += 1;
        Ok(state.positions.get(&mount).copied().unwrap_or_default())
    }

    async fn move_to(
        &self,
        mount: Mount,
        position: Point,
        critical_point: Option<CriticalPoint>,
    ) -> Result<(), HardwareError> {
        self.record(HardwareCall::MoveTo {
            mount,
            position,
            critical_point,
        });
        if let Some(message) = self.state.lock().move_fault.take() {
            return Err(HardwareError::Fault(message));
        }

        if !self.move_delay.is_zero() {
            sleep(self.move_delay).await;
        }

        self.state.lock().positions.insert(mount, position);
        Ok(())
    }

    async fn get_instrument_max_height(&self, _mount: Mount) -> Result<f64, HardwareError> {
        let mut state = self.state.lock();
        state.queries += 1;
        Ok(state.max_height)
    }

    async fn cache_instruments(
        &self,
        requested: HashMap<Mount, PipetteName>,
    ) -> Result<(), HardwareError> {
        self.record(HardwareCall::CacheInstruments(requested.clone()));
        let mut state = self.state.lock();
        for (mount, name) in requested {
            if let Some(physical) = &state.physically_attached {
                match physical.get(&mount) {
                    Some(present) if *present == name => {}
                    Some(_) => {
                        return Err(HardwareError::InstrumentMismatch {
                            mount,
                            requested: name,
                        })
                    }
                    None => return Err(HardwareError::NotAttached(mount)),
                }
            }
            let keep_existing = state
                .attached
                .get(&mount)
                .is_some_and(|config| config.name == name);
            if !keep_existing {
                state.attached.insert(mount, PipetteConfig::for_name(name));
            }
        }
        Ok(())
    }

    async fn attached_instruments(&self) -> Result<AttachedInstruments, HardwareError> {
        let mut state = self.state.lock();
        state.queries += 1;
        Ok(state.attached.clone())
    }

    async fn prepare_for_aspirate(&self, mount: Mount) -> Result<(), HardwareError> {
        self.record(HardwareCall::PrepareForAspirate(mount));
        self.with_pipette(mount, |config| config.ready_to_aspirate = true)
    }

    async fn aspirate(&self, mount: Mount, volume: f64) -> Result<(), HardwareError> {
        self.record(HardwareCall::Aspirate { mount, volume });
        self.with_pipette(mount, |_| ())
    }

    async fn dispense(&self, mount: Mount, volume: f64) -> Result<(), HardwareError> {
        self.record(HardwareCall::Dispense { mount, volume });
        self.with_pipette(mount, |_| ())
    }

    async fn pick_up_tip(&self, mount: Mount, tip_length: f64) -> Result<(), HardwareError> {
        self.record(HardwareCall::PickUpTip { mount, tip_length });
        self.with_pipette(mount, |config| {
            config.has_tip = true;
            config.ready_to_aspirate = false;
        })
    }

    async fn set_current_tiprack_diameter(
        &self,
        mount: Mount,
        diameter: f64,
    ) -> Result<(), HardwareError> {
        self.record(HardwareCall::SetCurrentTiprackDiameter { mount, diameter });
        self.with_pipette(mount, |_| ())
    }

    async fn set_working_volume(&self, mount: Mount, volume: f64) -> Result<(), HardwareError> {
        self.record(HardwareCall::SetWorkingVolume { mount, volume });
        self.with_pipette(mount, |_| ())
    }

    async fn drop_tip(&self, mount: Mount, home_after: bool) -> Result<(), HardwareError> {
        self.record(HardwareCall::DropTip { mount, home_after });
        self.with_pipette(mount, |config| {
            config.has_tip = false;
            config.ready_to_aspirate = false;
        })
    }

    async fn halt(&self) -> Result<(), HardwareError> {
        self.record(HardwareCall::Halt);
        Ok(())
    }
}
