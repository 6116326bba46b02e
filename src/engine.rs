//! Protocol engine: command queue, run control and the dispatch loop.
//!
//! `ProtocolEngine` accepts command requests at any time, executes them
//! strictly one after another in FIFO order while the run is playing, and
//! applies each result to the state store only after the handler returns.
//!
//! # Dispatch loop
//!
//! A background task owned by the engine:
//!
//! 1. waits until the run status is `Running`,
//! 2. takes the head of the queue and marks it `running`,
//! 3. races the handler against a stop request,
//! 4. marks the command `succeeded` or `failed` and applies its effects.
//!
//! Pause is cooperative: it only takes effect between commands. Stop is
//! not: the in-flight command is abandoned, the hardware is halted, and the
//! command fails with a cancellation error. Commands still queued at that
//! point stay queued.
//!
//! A command failing for any other reason stops the run and becomes the
//! run's error.
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = ProtocolEngine::new(EngineDependencies::new(hardware, provider));
//! engine.add_command(load_pipette_request)?;
//! engine.play()?;
//! engine.wait_until_complete().await;
//! ```

use crate::commands::{Command, CommandId, CommandRequest, CommandResult, CommandStatus};
use crate::error::{EngineError, EngineResult, ErrorOccurrence};
use crate::execution::{
    CommandExecutor, EngineStatus, EquipmentHandler, MovementHandler, PipettingHandler, RunControl,
    RunControlHandler,
};
use crate::hardware::HardwareApi;
use crate::resources::{LabwareDataProvider, ModelUtils, StandardDeck};
use crate::state::{Action, StateStore, StateView};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Everything the engine is built from.
pub struct EngineDependencies {
    pub hardware: Arc<dyn HardwareApi>,
    pub labware_provider: Arc<dyn LabwareDataProvider>,
    pub deck: StandardDeck,
    pub model_utils: Arc<ModelUtils>,
}

impl EngineDependencies {
    /// Standard deck and fresh id generation.
    pub fn new(
        hardware: Arc<dyn HardwareApi>,
        labware_provider: Arc<dyn LabwareDataProvider>,
    ) -> Self {
        Self {
            hardware,
            labware_provider,
            deck: StandardDeck::new(),
            model_utils: Arc::new(ModelUtils::new()),
        }
    }
}

struct EngineInner {
    store: StateStore,
    executor: CommandExecutor,
    control: RunControl,
    hardware: Arc<dyn HardwareApi>,
    model_utils: Arc<ModelUtils>,
    work_added: Notify,
    run_error: Mutex<Option<ErrorOccurrence>>,
}

/// The protocol engine. One per device.
pub struct ProtocolEngine {
    inner: Arc<EngineInner>,
    dispatch: JoinHandle<()>,
}

impl ProtocolEngine {
    /// Build the engine and spawn its dispatch loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(deps: EngineDependencies) -> Self {
        let control = RunControl::new();
        let movement = MovementHandler::new(Arc::clone(&deps.hardware));
        let executor = CommandExecutor::new(
            EquipmentHandler::new(
                Arc::clone(&deps.hardware),
                deps.labware_provider,
                Arc::clone(&deps.model_utils),
            ),
            movement.clone(),
            PipettingHandler::new(Arc::clone(&deps.hardware), movement),
            RunControlHandler::new(control.clone()),
        );

        let inner = Arc::new(EngineInner {
            store: StateStore::new(deps.deck),
            executor,
            control,
            hardware: deps.hardware,
            model_utils: deps.model_utils,
            work_added: Notify::new(),
            run_error: Mutex::new(None),
        });
        let dispatch = tokio::spawn(dispatch_loop(Arc::clone(&inner)));

        Self { inner, dispatch }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> StateView {
        self.inner.store.current()
    }

    pub fn status(&self) -> EngineStatus {
        self.inner.control.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<EngineStatus> {
        self.inner.control.subscribe()
    }

    /// Ticks after every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<u64> {
        self.inner.store.subscribe()
    }

    /// The failure that stopped the run, if any. Cancellations never count.
    pub fn run_error(&self) -> Option<ErrorOccurrence> {
        self.inner.run_error.lock().clone()
    }

    /// Queue a command and return it immediately in status `queued`.
    pub fn add_command(&self, request: CommandRequest) -> EngineResult<Command> {
        if self.status() == EngineStatus::Stopped {
            return Err(EngineError::EngineStopped);
        }

        let command = Command::queued(
            self.inner.model_utils.generate_id(),
            self.inner.model_utils.now(),
            request.data,
        );
        let command = self.inner.store.handle_action(Action::AddCommand(command))?;
        debug!(
            command_id = %command.id,
            command_type = %command.command_type(),
            "Command queued"
        );
        self.inner.work_added.notify_one();
        Ok(command)
    }

    /// Queue a command and wait for it to finish. The returned command is
    /// terminal; check its status for success.
    pub async fn execute_command(&self, request: CommandRequest) -> EngineResult<Command> {
        let command = self.add_command(request)?;
        self.wait_for_command(&command.id).await
    }

    /// Wait until a command is terminal. Fails with `EngineStopped` if the
    /// run stops while the command is still queued.
    pub async fn wait_for_command(&self, command_id: &str) -> EngineResult<Command> {
        let mut state_rx = self.inner.store.subscribe();
        let mut status_rx = self.inner.control.subscribe();

        loop {
            state_rx.borrow_and_update();
            let stopped = *status_rx.borrow_and_update() == EngineStatus::Stopped;

            let view = self.state();
            let command = view.commands().get(command_id)?;
            if command.status.is_terminal() {
                return Ok(command.clone());
            }
            if stopped && command.status == CommandStatus::Queued {
                return Err(EngineError::EngineStopped);
            }

            tokio::select! {
                changed = state_rx.changed() => changed.map_err(|_| EngineError::EngineStopped)?,
                changed = status_rx.changed() => changed.map_err(|_| EngineError::EngineStopped)?,
            }
        }
    }

    /// Start or resume dispatch.
    pub fn play(&self) -> EngineResult<()> {
        self.inner.control.play()?;
        info!("Engine playing");
        Ok(())
    }

    /// Hold dispatch once the in-flight command finishes.
    pub fn pause(&self) {
        if self.inner.control.pause() {
            info!("Engine paused");
        }
    }

    /// Stop the run: abort the in-flight command and halt the hardware.
    /// Queued commands are left unexecuted. Idempotent.
    pub async fn halt(&self) -> EngineResult<()> {
        if self.inner.control.stop() {
            info!("Engine stopped");
        }
        self.inner.hardware.halt().await?;
        Ok(())
    }

    /// Alias of [`ProtocolEngine::halt`].
    pub async fn stop(&self) -> EngineResult<()> {
        self.halt().await
    }

    /// Resolve once nothing is queued or running, or once the run has been
    /// stopped and the in-flight command has been settled.
    pub async fn wait_until_complete(&self) {
        let mut state_rx = self.inner.store.subscribe();
        let mut status_rx = self.inner.control.subscribe();

        loop {
            state_rx.borrow_and_update();
            let stopped = *status_rx.borrow_and_update() == EngineStatus::Stopped;

            let view = self.state();
            let commands = view.commands();
            if commands.get_running().is_none() && (stopped || commands.get_next_queued().is_none())
            {
                return;
            }

            tokio::select! {
                changed = state_rx.changed() => if changed.is_err() { return },
                changed = status_rx.changed() => if changed.is_err() { return },
            }
        }
    }
}

impl Drop for ProtocolEngine {
    fn drop(&mut self) {
        self.dispatch.abort();
    }
}

// =============================================================================
// Dispatch loop
// =============================================================================

async fn dispatch_loop(inner: Arc<EngineInner>) {
    let mut status_rx = inner.control.subscribe();
    debug!("Dispatch loop started");

    loop {
        let status = *status_rx.borrow_and_update();
        match status {
            EngineStatus::Stopped => break,
            EngineStatus::ReadyToRun | EngineStatus::Paused => {
                if status_rx.changed().await.is_err() {
                    break;
                }
                continue;
            }
            EngineStatus::Running => {}
        }

        let next = inner.store.current().commands().get_next_queued().cloned();
        match next {
            Some(command_id) => inner.run_command(command_id).await,
            None => {
                tokio::select! {
                    _ = inner.work_added.notified() => {}
                    changed = status_rx.changed() => if changed.is_err() { break },
                }
            }
        }
    }

    debug!("Dispatch loop finished");
}

impl EngineInner {
    async fn run_command(&self, command_id: CommandId) {
        // Started only while still running, so nothing leaves the queue after a stop.
        let start = self.control.while_running(|| {
            self.store.handle_action(Action::StartCommand {
                command_id: command_id.clone(),
                started_at: self.model_utils.now(),
            })
        });
        let started = match start {
            None => {
                debug!(%command_id, "Run no longer playing, command stays queued");
                return;
            }
            Some(Ok(command)) => command,
            Some(Err(err)) => {
                error!(%command_id, "Could not start command: {}", err);
                return;
            }
        };

        let span = info_span!(
            "command",
            command_id = %started.id,
            command_type = %started.command_type()
        );

        async {
            debug!("Executing command");
            let outcome = {
                let state = self.store.current_for_execution();
                tokio::select! {
                    biased;
                    _ = wait_for_stop(self.control.subscribe()) => Err(EngineError::Cancelled(
                        "run stopped while command was in flight".into(),
                    )),
                    result = self.executor.execute(&state, &started.data) => result,
                }
            };
            self.complete(&started.id, outcome);
        }
        .instrument(span)
        .await
    }

    fn complete(&self, command_id: &str, outcome: EngineResult<CommandResult>) {
        let completed_at = self.model_utils.now();
        let mut run_failure = None;

        let action = match outcome {
            Ok(result) => {
                debug!("Command succeeded");
                Action::SucceedCommand {
                    command_id: command_id.to_string(),
                    result,
                    completed_at,
                }
            }
            Err(err) => {
                let occurrence = ErrorOccurrence::from_engine_error(&err, completed_at);
                if err.is_cancellation() {
                    warn!("Command cancelled: {}", err);
                } else {
                    error!(error_type = err.error_type(), "Command failed: {}", err);
                    run_failure = Some(occurrence.clone());
                }
                Action::FailCommand {
                    command_id: command_id.to_string(),
                    error: occurrence,
                    completed_at,
                }
            }
        };

        if let Err(err) = self.store.handle_action(action) {
            error!(command_id, "Could not record command outcome: {}", err);
        }

        if let Some(occurrence) = run_failure {
            self.run_error.lock().get_or_insert(occurrence);
            if self.control.stop() {
                info!("Engine stopped after command failure");
            }
        }
    }
}

async fn wait_for_stop(mut status_rx: watch::Receiver<EngineStatus>) {
    loop {
        if *status_rx.borrow_and_update() == EngineStatus::Stopped {
            return;
        }
        if status_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{CommandData, LoadPipetteData, PauseData};
    use crate::hardware::SimulatedHardware;
    use crate::resources::InMemoryLabwareProvider;
    use crate::types::{Mount, PipetteName};

    fn engine() -> ProtocolEngine {
        ProtocolEngine::new(EngineDependencies::new(
            Arc::new(SimulatedHardware::new()),
            Arc::new(InMemoryLabwareProvider::with_builtin()),
        ))
    }

    fn pause() -> CommandRequest {
        CommandData::Pause(PauseData::default()).into()
    }

    #[tokio::test]
    async fn test_add_command_is_queued_not_run() {
        let engine = engine();
        let command = engine.add_command(pause()).unwrap();
        assert_eq!(command.status, CommandStatus::Queued);

        tokio::task::yield_now().await;
        let view = engine.state();
        assert_eq!(
            view.commands().get(&command.id).unwrap().status,
            CommandStatus::Queued
        );
        assert_eq!(engine.status(), EngineStatus::ReadyToRun);
    }

    #[tokio::test]
    async fn test_identical_requests_get_unique_ids() {
        let engine = engine();
        let a = engine.add_command(pause()).unwrap();
        let b = engine.add_command(pause()).unwrap();
        assert_ne!(a.id, b.id);
        assert!(b.created_at >= a.created_at);
    }

    #[tokio::test]
    async fn test_execute_command_waits_for_terminal() {
        let engine = engine();
        engine.play().unwrap();

        let command = engine
            .execute_command(
                CommandData::LoadPipette(LoadPipetteData {
                    pipette_name: PipetteName::P300Single,
                    mount: Mount::Left,
                    pipette_id: None,
                })
                .into(),
            )
            .await
            .unwrap();

        assert_eq!(command.status, CommandStatus::Succeeded);
        assert_eq!(engine.state().pipettes().get_all().len(), 1);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_queue_and_play_are_logged() {
        let engine = engine();
        engine.add_command(pause()).unwrap();
        engine.play().unwrap();

        assert!(logs_contain("Command queued"));
        assert!(logs_contain("command_type=pause"));
        assert!(logs_contain("Engine playing"));
    }

    #[tokio::test]
    async fn test_add_after_stop_is_rejected() {
        let engine = engine();
        engine.halt().await.unwrap();
        assert_eq!(engine.add_command(pause()), Err(EngineError::EngineStopped));
        assert_eq!(engine.play(), Err(EngineError::EngineStopped));
    }
}
