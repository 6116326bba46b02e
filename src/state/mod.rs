//! Protocol state store.
//!
//! The store is the single source of truth for commands, loaded labware and
//! loaded pipettes. It has exactly one writer, the engine, which applies an
//! [`Action`] for each command lifecycle step. Readers take a [`StateView`]
//! snapshot: shared handles to each sub-state that never change underneath
//! them, so a handler can await hardware calls while holding a view without
//! blocking the writer or seeing a half-applied command. A sub-state is
//! copied only when the writer touches it while a snapshot still shares it.
//!
//! Effects of a command (new labware, volume changes, the current well) are
//! applied only when it succeeds. Failed commands change nothing but their
//! own record.
//!
//! # Views
//!
//! | View | Answers |
//! |------|---------|
//! | [`CommandView`] | command records, queue, running command |
//! | [`LabwareView`] | loaded labware, definitions, wells, quirks |
//! | [`PipetteView`] | loaded pipettes, volumes, current well |
//! | [`GeometryView`] | absolute positions and tip geometry |
//! | [`MotionView`] | critical points and movement waypoints |

pub mod commands;
pub mod geometry;
pub mod labware;
pub mod motion;
pub mod pipettes;

pub use commands::{CommandState, CommandView};
pub use geometry::GeometryView;
pub use labware::{LabwareState, LabwareView};
pub use motion::{MotionPlanning, MotionView, MovementRequest, PipetteLocationData};
pub use pipettes::{HardwarePipette, PipetteState, PipetteView};

use crate::commands::{Command, CommandId, CommandResult};
use crate::error::{EngineResult, ErrorOccurrence};
use crate::resources::StandardDeck;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;

/// A single state transition.
#[derive(Debug, Clone)]
pub enum Action {
    AddCommand(Command),
    StartCommand {
        command_id: CommandId,
        started_at: DateTime<Utc>,
    },
    SucceedCommand {
        command_id: CommandId,
        result: CommandResult,
        completed_at: DateTime<Utc>,
    },
    FailCommand {
        command_id: CommandId,
        error: ErrorOccurrence,
        completed_at: DateTime<Utc>,
    },
}

/// Complete protocol state. Sub-states are shared between snapshots and
/// copied only when written.
#[derive(Debug, Clone)]
pub struct State {
    commands: Arc<CommandState>,
    labware: Arc<LabwareState>,
    pipettes: Arc<PipetteState>,
}

impl State {
    fn new(deck: StandardDeck) -> Self {
        Self {
            commands: Arc::new(CommandState::default()),
            labware: Arc::new(LabwareState::new(deck)),
            pipettes: Arc::new(PipetteState::default()),
        }
    }

    fn apply(&mut self, action: Action) -> EngineResult<Command> {
        match action {
            Action::AddCommand(command) => Arc::make_mut(&mut self.commands).add(command),
            Action::StartCommand {
                command_id,
                started_at,
            } => Arc::make_mut(&mut self.commands).start(&command_id, started_at),
            Action::SucceedCommand {
                command_id,
                result,
                completed_at,
            } => {
                let command =
                    Arc::make_mut(&mut self.commands).succeed(&command_id, result, completed_at)?;
                if LabwareState::is_affected_by(&command) {
                    Arc::make_mut(&mut self.labware).handle_succeeded_command(&command);
                }
                if PipetteState::is_affected_by(&command) {
                    Arc::make_mut(&mut self.pipettes).handle_succeeded_command(&command);
                }
                Ok(command)
            }
            Action::FailCommand {
                command_id,
                error,
                completed_at,
            } => Arc::make_mut(&mut self.commands).fail(&command_id, error, completed_at),
        }
    }
}

/// Immutable snapshot of [`State`] with typed views.
#[derive(Debug, Clone)]
pub struct StateView {
    state: State,
}

impl StateView {
    pub fn commands(&self) -> CommandView<'_> {
        CommandView::new(&self.state.commands)
    }

    pub fn labware(&self) -> LabwareView<'_> {
        LabwareView::new(&self.state.labware)
    }

    pub fn pipettes(&self) -> PipetteView<'_> {
        PipetteView::new(&self.state.pipettes)
    }

    pub fn geometry(&self) -> GeometryView<'_> {
        GeometryView::new(self.labware())
    }

    pub fn motion(&self) -> MotionView<'_> {
        MotionView::new(self.labware(), self.pipettes(), self.geometry())
    }
}

/// Single-writer store; see the module docs.
#[derive(Debug)]
pub struct StateStore {
    state: RwLock<State>,
    version: watch::Sender<u64>,
}

impl StateStore {
    pub fn new(deck: StandardDeck) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            state: RwLock::new(State::new(deck)),
            version,
        }
    }

    /// Snapshot of the current state.
    pub fn current(&self) -> StateView {
        StateView {
            state: self.state.read().clone(),
        }
    }

    /// Snapshot for a command handler: labware and pipettes only, with an
    /// empty command view. Holding it while the handler awaits hardware does
    /// not pin the command records, so commands added meanwhile are
    /// appended in place.
    pub fn current_for_execution(&self) -> StateView {
        let state = self.state.read();
        StateView {
            state: State {
                commands: Arc::new(CommandState::default()),
                labware: Arc::clone(&state.labware),
                pipettes: Arc::clone(&state.pipettes),
            },
        }
    }

    /// Receiver that ticks after every applied action.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Apply an action and notify subscribers. Returns the affected command.
    pub fn handle_action(&self, action: Action) -> EngineResult<Command> {
        let command = self.state.write().apply(action)?;
        self.version.send_modify(|version| *version += 1);
        Ok(command)
    }

    #[cfg(test)]
    fn commands_are_shared(&self) -> bool {
        Arc::strong_count(&self.state.read().commands) > 1
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(StandardDeck::new())
    }
}
