//! Protocol runner: loads a protocol source into the engine and drives a run
//! through the phased task queue.
//!
//! # Lifecycle
//!
//! ```text
//! load(source) ──▶ play() ──▶ [Run task] ──▶ [Cleanup: halt engine] ──▶ join()
//!                   │  ▲
//!          pause()  ▼  │ play()
//! ```
//!
//! - **JSON** sources are translated 1:1 and every command is enqueued at
//!   load time. The run task waits for the engine to drain.
//! - **Script** sources are compiled at load time. The run task executes the
//!   script, each protocol call becoming one `execute_command`.
//!
//! The first `play()` registers the cleanup task and starts the queue; later
//! calls only resume the engine.
//!
//! # Example
//!
//! ```rust,ignore
//! let (runner, _hardware) = create_simulating_runner(&EngineConfig::default());
//! let result = runner.run(ProtocolSource::from_path("demos/transfer.json")?).await?;
//! println!("{}", serde_json::to_string_pretty(&result)?);
//! ```

pub mod json_protocol;
pub mod task_queue;

pub use json_protocol::{JsonCommand, JsonLabware, JsonPipette, JsonProtocol};
pub use task_queue::{
    TaskFailure, TaskQueue, TaskQueueError, TaskQueueOutcome, TaskQueuePhase, TaskRecord,
};

use crate::commands::{Command, CommandId, CommandStatus};
use crate::config::EngineConfig;
use crate::engine::{EngineDependencies, ProtocolEngine};
use crate::error::{ErrorOccurrence, RunError};
use crate::execution::EngineStatus;
use crate::hardware::{HardwareApi, HardwareHandle, SimulatedHardware};
use crate::resources::{InMemoryLabwareProvider, ModelUtils};
use crate::scripting::{ProtocolContext, RhaiEngine, ScriptEngine};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{info, warn};

/// `errorType` recorded for failures of the protocol source itself.
pub const PROTOCOL_SOURCE_ERROR: &str = "ProtocolSourceError";

// =============================================================================
// Protocol sources
// =============================================================================

/// A protocol ready to be loaded.
#[derive(Debug, Clone)]
pub enum ProtocolSource {
    Json(JsonProtocol),
    Script { name: String, source: String },
}

impl ProtocolSource {
    pub fn script(name: impl Into<String>, source: impl Into<String>) -> Self {
        ProtocolSource::Script {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Read a `.json` or `.rhai` file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, RunError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(ProtocolSource::Json(JsonProtocol::from_json(&contents)?)),
            Some("rhai") => Ok(ProtocolSource::script(path.display().to_string(), contents)),
            _ => Err(RunError::ProtocolSource(format!(
                "Unsupported protocol file '{}': expected .json or .rhai",
                path.display()
            ))),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ProtocolSource::Json(protocol) => protocol.name().unwrap_or("json protocol"),
            ProtocolSource::Script { name, .. } => name,
        }
    }
}

// =============================================================================
// Run result
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Succeeded,
    Failed,
    Stopped,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub status: RunStatus,
    /// Every command that left the queue, in execution order.
    pub commands: Vec<Command>,
    /// Commands still queued when the run ended.
    pub unexecuted: Vec<CommandId>,
    pub errors: Vec<ErrorOccurrence>,
}

// =============================================================================
// ProtocolRunner
// =============================================================================

pub struct ProtocolRunner {
    engine: Arc<ProtocolEngine>,
    task_queue: TaskQueue,
    script_engine: Arc<dyn ScriptEngine>,
    model_utils: ModelUtils,
    played: AtomicBool,
    stop_requested: Arc<AtomicBool>,
}

impl ProtocolRunner {
    pub fn new(engine: Arc<ProtocolEngine>, script_engine: Arc<dyn ScriptEngine>) -> Self {
        Self {
            engine,
            task_queue: TaskQueue::new(),
            script_engine,
            model_utils: ModelUtils::new(),
            played: AtomicBool::new(false),
            stop_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn engine(&self) -> &Arc<ProtocolEngine> {
        &self.engine
    }

    pub fn task_queue(&self) -> &TaskQueue {
        &self.task_queue
    }

    /// Load a protocol. Must happen before the first `play()`.
    pub async fn load(&self, source: ProtocolSource) -> Result<(), RunError> {
        if self.task_queue.is_started() {
            return Err(RunError::AlreadyStarted);
        }
        info!(protocol = source.name(), "Loading protocol");

        match source {
            ProtocolSource::Json(protocol) => self.load_json(&protocol),
            ProtocolSource::Script { name, source } => self.load_script(name, source).await,
        }
    }

    fn load_json(&self, protocol: &JsonProtocol) -> Result<(), RunError> {
        let requests = protocol.to_commands()?;
        let count = requests.len();
        for request in requests {
            self.engine.add_command(request)?;
        }

        let engine = Arc::clone(&self.engine);
        self.task_queue
            .add(TaskQueuePhase::Run, "wait for commands", false, move || async move {
                engine.wait_until_complete().await;
                Ok(())
            })
            .map_err(|_| RunError::AlreadyStarted)?;

        info!(commands = count, "JSON protocol enqueued");
        Ok(())
    }

    async fn load_script(&self, name: String, source: String) -> Result<(), RunError> {
        self.script_engine.validate_script(&source).await?;

        let engine = Arc::clone(&self.engine);
        let script_engine = Arc::clone(&self.script_engine);
        let stop_requested = Arc::clone(&self.stop_requested);
        let runtime = Handle::current();

        self.task_queue
            .add(TaskQueuePhase::Run, format!("run script {}", name), false, move || async move {
                let context = ProtocolContext::new(Arc::clone(&engine), runtime);
                match script_engine.execute_protocol(&source, context).await {
                    Ok(()) => Ok(()),
                    // The failing command is already the run's error, or the
                    // user stopped the run on purpose.
                    Err(err)
                        if engine.run_error().is_some()
                            || stop_requested.load(Ordering::SeqCst) =>
                    {
                        warn!("Script ended after the run stopped: {}", err);
                        Ok(())
                    }
                    Err(err) => Err(anyhow::Error::new(err)),
                }
            })
            .map_err(|_| RunError::AlreadyStarted)?;
        Ok(())
    }

    /// Start or resume the run.
    pub fn play(&self) -> Result<(), RunError> {
        self.engine.play()?;

        if !self.played.swap(true, Ordering::SeqCst) {
            let engine = Arc::clone(&self.engine);
            self.task_queue
                .add(TaskQueuePhase::Cleanup, "halt engine", true, move || async move {
                    engine.halt().await?;
                    Ok(())
                })
                .map_err(|_| RunError::AlreadyStarted)?;
            self.task_queue.start();
        }
        Ok(())
    }

    pub fn pause(&self) {
        self.engine.pause();
    }

    /// Stop the run. Queued commands stay unexecuted.
    pub async fn stop(&self) -> Result<(), RunError> {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.engine.stop().await?;
        Ok(())
    }

    /// Wait for every phase, cleanup included, to finish.
    pub async fn join(&self) -> TaskQueueOutcome {
        self.task_queue.join().await
    }

    /// Load, play and join, then summarize.
    pub async fn run(&self, source: ProtocolSource) -> Result<RunResult, RunError> {
        self.load(source).await?;
        self.play()?;
        let outcome = self.join().await;
        Ok(self.result(&outcome))
    }

    /// Summarize the engine state and a task queue outcome.
    pub fn result(&self, outcome: &TaskQueueOutcome) -> RunResult {
        let state = self.engine.state();
        let commands = state.commands();

        let mut errors: Vec<ErrorOccurrence> = self.engine.run_error().into_iter().collect();
        let now = self.model_utils.now();
        errors.extend(outcome.failures.iter().map(|failure| {
            ErrorOccurrence::new(
                PROTOCOL_SOURCE_ERROR,
                format!("{}: {}", failure.name, failure.message),
                now,
            )
        }));

        let status = if !errors.is_empty() {
            RunStatus::Failed
        } else if self.stop_requested.load(Ordering::SeqCst)
            && self.engine.status() == EngineStatus::Stopped
        {
            RunStatus::Stopped
        } else {
            RunStatus::Succeeded
        };

        RunResult {
            status,
            commands: commands
                .get_all()
                .into_iter()
                .filter(|command| command.status != CommandStatus::Queued)
                .collect(),
            unexecuted: commands.get_queued_ids(),
            errors,
        }
    }
}

/// Runner wired to a simulated device behind a hardware worker.
///
/// Must be called from within a Tokio runtime.
pub fn create_simulating_runner(config: &EngineConfig) -> (ProtocolRunner, Arc<SimulatedHardware>) {
    let simulator = Arc::new(
        SimulatedHardware::new()
            .with_move_delay(Duration::from_millis(config.hardware.move_delay_ms))
            .with_max_height(config.hardware.max_travel_height),
    );
    let device: Arc<dyn HardwareApi> = Arc::clone(&simulator) as Arc<dyn HardwareApi>;
    let (hardware, _worker) = HardwareHandle::spawn(device, config.hardware.request_capacity);

    let engine = ProtocolEngine::new(EngineDependencies::new(
        Arc::new(hardware),
        Arc::new(InMemoryLabwareProvider::with_builtin()),
    ));
    let runner = ProtocolRunner::new(
        Arc::new(engine),
        Arc::new(RhaiEngine::with_limit(config.scripting.max_operations)),
    );
    (runner, simulator)
}
