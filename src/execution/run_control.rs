//! Run control flag and the Pause command handler.
//!
//! [`RunControl`] owns the engine's run status in a `watch` channel. The
//! dispatch loop waits on it between commands and races in-flight commands
//! against `Stopped`.
//!
//! ```text
//! ReadyToRun ──play──▶ Running ◀──play── Paused
//!      │                  │ ──pause──▶     │
//!      └──────stop────────┴─────stop───────┴──▶ Stopped (terminal)
//! ```

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineStatus {
    ReadyToRun,
    Running,
    Paused,
    Stopped,
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineStatus::ReadyToRun => "ready-to-run",
            EngineStatus::Running => "running",
            EngineStatus::Paused => "paused",
            EngineStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Shared run status flag.
#[derive(Debug, Clone)]
pub struct RunControl {
    status: Arc<watch::Sender<EngineStatus>>,
}

impl RunControl {
    pub fn new() -> Self {
        let (status, _) = watch::channel(EngineStatus::ReadyToRun);
        Self {
            status: Arc::new(status),
        }
    }

    pub fn status(&self) -> EngineStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.status.subscribe()
    }

    /// Start or resume dispatch. Fails once stopped.
    pub fn play(&self) -> EngineResult<()> {
        let mut result = Ok(());
        self.status.send_if_modified(|status| match *status {
            EngineStatus::ReadyToRun | EngineStatus::Paused => {
                *status = EngineStatus::Running;
                true
            }
            EngineStatus::Running => false,
            EngineStatus::Stopped => {
                result = Err(EngineError::EngineStopped);
                false
            }
        });
        result
    }

    /// Hold dispatch at the next command boundary. No-op once stopped.
    pub fn pause(&self) -> bool {
        self.status.send_if_modified(|status| match *status {
            EngineStatus::ReadyToRun | EngineStatus::Running => {
                *status = EngineStatus::Paused;
                true
            }
            EngineStatus::Paused | EngineStatus::Stopped => false,
        })
    }

    /// Run `f` only if the status is `Running`. The status is held while `f`
    /// runs, so a concurrent `stop` or `pause` lands strictly before or after.
    /// `f` must not touch this `RunControl`.
    pub fn while_running<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        let mut output = None;
        self.status.send_if_modified(|status| {
            if *status == EngineStatus::Running {
                output = Some(f());
            }
            false
        });
        output
    }

    /// Stop for good. Returns false if already stopped.
    pub fn stop(&self) -> bool {
        self.status.send_if_modified(|status| {
            if *status == EngineStatus::Stopped {
                false
            } else {
                *status = EngineStatus::Stopped;
                true
            }
        })
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Handler for the Pause command.
#[derive(Debug, Clone)]
pub struct RunControlHandler {
    control: RunControl,
}

impl RunControlHandler {
    pub fn new(control: RunControl) -> Self {
        Self { control }
    }

    /// Request a pause; the engine holds before the next command.
    pub async fn pause(&self, message: Option<&str>) -> EngineResult<()> {
        info!(message = message.unwrap_or(""), "Protocol requested pause");
        self.control.pause();
        Ok(())
    }
}
