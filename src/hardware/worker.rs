//! Hardware worker actor.
//!
//! A single async task owns the [`HardwareApi`] implementation and processes
//! [`HardwareRequest`] messages one at a time, replying over `oneshot`
//! channels. Callers hold a cloneable [`HardwareHandle`], which implements
//! `HardwareApi` by forwarding every call to the worker, so the rest of the
//! engine never knows whether it talks to the worker or a device directly.
//!
//! Halting is signalled out-of-band through a `watch` channel: the worker
//! races every in-flight operation against it, drops the operation future on
//! halt, stops the motors and answers the caller with
//! [`HardwareError::Cancelled`].

use super::{AttachedInstruments, HardwareApi, HardwareError};
use crate::types::{CriticalPoint, Mount, PipetteName, Point};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Reply<T> = oneshot::Sender<Result<T, HardwareError>>;

/// Requests processed by the [`HardwareWorker`].
#[derive(Debug)]
pub enum HardwareRequest {
    GantryPosition {
        mount: Mount,
        critical_point: Option<CriticalPoint>,
        response: Reply<Point>,
    },
    MoveTo {
        mount: Mount,
        position: Point,
        critical_point: Option<CriticalPoint>,
        response: Reply<()>,
    },
    GetInstrumentMaxHeight {
        mount: Mount,
        response: Reply<f64>,
    },
    CacheInstruments {
        requested: HashMap<Mount, PipetteName>,
        response: Reply<()>,
    },
    AttachedInstruments {
        response: Reply<AttachedInstruments>,
    },
    PrepareForAspirate {
        mount: Mount,
        response: Reply<()>,
    },
    Aspirate {
        mount: Mount,
        volume: f64,
        response: Reply<()>,
    },
    Dispense {
        mount: Mount,
        volume: f64,
        response: Reply<()>,
    },
    PickUpTip {
        mount: Mount,
        tip_length: f64,
        response: Reply<()>,
    },
    SetCurrentTiprackDiameter {
        mount: Mount,
        diameter: f64,
        response: Reply<()>,
    },
    SetWorkingVolume {
        mount: Mount,
        volume: f64,
        response: Reply<()>,
    },
    DropTip {
        mount: Mount,
        home_after: bool,
        response: Reply<()>,
    },
}

/// Actor that owns the hardware.
pub struct HardwareWorker {
    hardware: Arc<dyn HardwareApi>,
    halt_rx: watch::Receiver<u64>,
}

impl HardwareWorker {
    pub fn new(hardware: Arc<dyn HardwareApi>, halt_rx: watch::Receiver<u64>) -> Self {
        Self { hardware, halt_rx }
    }

    /// Process requests until every [`HardwareHandle`] is dropped.
    pub async fn run(mut self, mut request_rx: mpsc::Receiver<HardwareRequest>) {
        info!("Hardware worker started");

        loop {
            tokio::select! {
                biased;
                Ok(()) = self.halt_rx.changed() => {
                    debug!("Halt received while idle");
                    stop_motion(self.hardware.as_ref()).await;
                }
                request = request_rx.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => break,
                },
            }
        }

        info!("Hardware worker shutting down");
    }

    async fn handle(&mut self, request: HardwareRequest) {
        // Halts issued before this request was dequeued do not apply to it.
        self.halt_rx.borrow_and_update();
        let hw = self.hardware.as_ref();
        let halt_rx = &mut self.halt_rx;

        match request {
            HardwareRequest::GantryPosition {
                mount,
                critical_point,
                response,
            } => {
                let result = interruptible(hw, halt_rx, hw.gantry_position(mount, critical_point)).await;
                let _ = response.send(result);
            }
            HardwareRequest::MoveTo {
                mount,
                position,
                critical_point,
                response,
            } => {
                debug!(%mount, %position, ?critical_point, "move_to");
                let result =
                    interruptible(hw, halt_rx, hw.move_to(mount, position, critical_point)).await;
                let _ = response.send(result);
            }
            HardwareRequest::GetInstrumentMaxHeight { mount, response } => {
                let result = interruptible(hw, halt_rx, hw.get_instrument_max_height(mount)).await;
                let _ = response.send(result);
            }
            HardwareRequest::CacheInstruments {
                requested,
                response,
            } => {
                let result = interruptible(hw, halt_rx, hw.cache_instruments(requested)).await;
                let _ = response.send(result);
            }
            HardwareRequest::AttachedInstruments { response } => {
                let result = interruptible(hw, halt_rx, hw.attached_instruments()).await;
                let _ = response.send(result);
            }
            HardwareRequest::PrepareForAspirate { mount, response } => {
                let result = interruptible(hw, halt_rx, hw.prepare_for_aspirate(mount)).await;
                let _ = response.send(result);
            }
            HardwareRequest::Aspirate {
                mount,
                volume,
                response,
            } => {
                let result = interruptible(hw, halt_rx, hw.aspirate(mount, volume)).await;
                let _ = response.send(result);
            }
            HardwareRequest::Dispense {
                mount,
                volume,
                response,
            } => {
                let result = interruptible(hw, halt_rx, hw.dispense(mount, volume)).await;
                let _ = response.send(result);
            }
            HardwareRequest::PickUpTip {
                mount,
                tip_length,
                response,
            } => {
                let result = interruptible(hw, halt_rx, hw.pick_up_tip(mount, tip_length)).await;
                let _ = response.send(result);
            }
            HardwareRequest::SetCurrentTiprackDiameter {
                mount,
                diameter,
                response,
            } => {
                let result = interruptible(
                    hw,
                    halt_rx,
                    hw.set_current_tiprack_diameter(mount, diameter),
                )
                .await;
                let _ = response.send(result);
            }
            HardwareRequest::SetWorkingVolume {
                mount,
                volume,
                response,
            } => {
                let result = interruptible(hw, halt_rx, hw.set_working_volume(mount, volume)).await;
                let _ = response.send(result);
            }
            HardwareRequest::DropTip {
                mount,
                home_after,
                response,
            } => {
                let result = interruptible(hw, halt_rx, hw.drop_tip(mount, home_after)).await;
                let _ = response.send(result);
            }
        }
    }
}

/// Run `operation` unless a halt arrives first.
async fn interruptible<T, F>(
    hardware: &dyn HardwareApi,
    halt_rx: &mut watch::Receiver<u64>,
    operation: F,
) -> Result<T, HardwareError>
where
    F: Future<Output = Result<T, HardwareError>>,
{
    tokio::select! {
        biased;
        Ok(()) = halt_rx.changed() => {
            info!("Halting in-flight hardware operation");
            stop_motion(hardware).await;
            Err(HardwareError::Cancelled)
        }
        result = operation => result,
    }
}

async fn stop_motion(hardware: &dyn HardwareApi) {
    if let Err(err) = hardware.halt().await {
        warn!("Hardware halt failed: {}", err);
    }
}

// =============================================================================
// Client handle
// =============================================================================

/// Cloneable client for the [`HardwareWorker`].
#[derive(Clone, Debug)]
pub struct HardwareHandle {
    requests: mpsc::Sender<HardwareRequest>,
    halt_tx: Arc<watch::Sender<u64>>,
}

impl HardwareHandle {
    /// Spawn a worker owning `hardware` and return a handle to it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(hardware: Arc<dyn HardwareApi>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (request_tx, request_rx) = mpsc::channel(capacity.max(1));
        let (halt_tx, halt_rx) = watch::channel(0u64);
        let worker = HardwareWorker::new(hardware, halt_rx);
        let join = tokio::spawn(worker.run(request_rx));
        (
            Self {
                requests: request_tx,
                halt_tx: Arc::new(halt_tx),
            },
            join,
        )
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> HardwareRequest,
    ) -> Result<T, HardwareError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(build(tx))
            .await
            .map_err(|_| HardwareError::WorkerUnavailable)?;
        rx.await.map_err(|_| HardwareError::WorkerUnavailable)?
    }
}

#[async_trait]
impl HardwareApi for HardwareHandle {
    async fn gantry_position(
        &self,
        mount: Mount,
        critical_point: Option<CriticalPoint>,
    ) -> Result<Point, HardwareError> {
        self.call(|response| HardwareRequest::GantryPosition {
            mount,
            critical_point,
            response,
        })
        .await
    }

    async fn move_to(
        &self,
        mount: Mount,
        position: Point,
        critical_point: Option<CriticalPoint>,
    ) -> Result<(), HardwareError> {
        self.call(|response| HardwareRequest::MoveTo {
            mount,
            position,
            critical_point,
            response,
        })
        .await
    }

    async fn get_instrument_max_height(&self, mount: Mount) -> Result<f64, HardwareError> {
        self.call(|response| HardwareRequest::GetInstrumentMaxHeight { mount, response })
            .await
    }

    async fn cache_instruments(
        &self,
        requested: HashMap<Mount, PipetteName>,
    ) -> Result<(), HardwareError> {
        self.call(|response| HardwareRequest::CacheInstruments {
            requested,
            response,
        })
        .await
    }

    async fn attached_instruments(&self) -> Result<AttachedInstruments, HardwareError> {
        self.call(|response| HardwareRequest::AttachedInstruments { response })
            .await
    }

    async fn prepare_for_aspirate(&self, mount: Mount) -> Result<(), HardwareError> {
        self.call(|response| HardwareRequest::PrepareForAspirate { mount, response })
            .await
    }

    async fn aspirate(&self, mount: Mount, volume: f64) -> Result<(), HardwareError> {
        self.call(|response| HardwareRequest::Aspirate {
            mount,
            volume,
            response,
        })
        .await
    }

    async fn dispense(&self, mount: Mount, volume: f64) -> Result<(), HardwareError> {
        self.call(|response| HardwareRequest::Dispense {
            mount,
            volume,
            response,
        })
        .await
    }

    async fn pick_up_tip(&self, mount: Mount, tip_length: f64) -> Result<(), HardwareError> {
        self.call(|response| HardwareRequest::PickUpTip {
            mount,
            tip_length,
            response,
        })
        .await
    }

    async fn set_current_tiprack_diameter(
        &self,
        mount: Mount,
        diameter: f64,
    ) -> Result<(), HardwareError> {
        self.call(|response| HardwareRequest::SetCurrentTiprackDiameter {
            mount,
            diameter,
            response,
        })
        .await
    }

    async fn set_working_volume(&self, mount: Mount, volume: f64) -> Result<(), HardwareError> {
        self.call(|response| HardwareRequest::SetWorkingVolume {
            mount,
            volume,
            response,
        })
        .await
    }

    async fn drop_tip(&self, mount: Mount, home_after: bool) -> Result<(), HardwareError> {
        self.call(|response| HardwareRequest::DropTip {
            mount,
            home_after,
            response,
        })
        .await
    }

    async fn halt(&self) -> Result<(), HardwareError> {
        self.halt_tx.send_modify(|generation| *generation += 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{HardwareCall, SimulatedHardware};
    use std::time::Duration;

    #[tokio::test]
    async fn test_requests_are_forwarded() {
        let sim = Arc::new(SimulatedHardware::new());
        let (handle, _worker) = HardwareHandle::spawn(sim.clone(), 8);

        handle
            .move_to(Mount::Left, Point::new(1.0, 2.0, 3.0), None)
            .await
            .unwrap();
        let position = handle.gantry_position(Mount::Left, None).await.unwrap();

        assert_eq!(position, Point::new(1.0, 2.0, 3.0));
        assert_eq!(sim.moves().len(), 1);
    }

    #[tokio::test]
    async fn test_halt_cancels_in_flight_move() {
        let sim = Arc::new(SimulatedHardware::new().with_move_delay(Duration::from_secs(10)));
        let (handle, _worker) = HardwareHandle::spawn(sim.clone(), 8);

        let mover = handle.clone();
        let in_flight = tokio::spawn(async move {
            mover
                .move_to(Mount::Left, Point::new(5.0, 5.0, 5.0), None)
                .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.halt().await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), in_flight)
            .await
            .expect("halt should interrupt the move")
            .unwrap();
        assert_eq!(result, Err(HardwareError::Cancelled));
        assert_eq!(sim.calls().last(), Some(&HardwareCall::Halt));

        // Position never reached the target.
        let position = handle.gantry_position(Mount::Left, None).await.unwrap();
        assert_eq!(position, Point::default());
    }

    #[tokio::test]
    async fn test_idle_halt_does_not_cancel_next_request() {
        let sim = Arc::new(SimulatedHardware::new());
        let (handle, _worker) = HardwareHandle::spawn(sim.clone(), 8);

        handle.halt().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = handle.move_to(Mount::Right, Point::new(1.0, 1.0, 1.0), None).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_worker_unavailable_after_shutdown() {
        let sim = Arc::new(SimulatedHardware::new());
        let (handle, worker) = HardwareHandle::spawn(sim, 8);
        worker.abort();
        let _ = worker.await;

        let result = handle.attached_instruments().await;
        assert_eq!(result, Err(HardwareError::WorkerUnavailable));
    }
}
