//! Command records, lifecycle bookkeeping and the pending queue.

use crate::commands::{Command, CommandId, CommandResult, CommandStatus};
use crate::error::{EngineError, EngineResult, ErrorOccurrence};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CommandState {
    /// Every command in creation order.
    commands: Vec<Arc<Command>>,
    index_by_id: HashMap<CommandId, usize>,
    /// Queued command ids in FIFO order.
    queue: VecDeque<CommandId>,
    running: Option<CommandId>,
}

impl CommandState {
    pub(super) fn add(&mut self, command: Command) -> EngineResult<Command> {
        if self.index_by_id.contains_key(&command.id) {
            return Err(EngineError::InvalidCommandTransition {
                command_id: command.id,
                from: "existing".into(),
                to: CommandStatus::Queued.to_string(),
            });
        }
        self.index_by_id
            .insert(command.id.clone(), self.commands.len());
        self.queue.push_back(command.id.clone());
        self.commands.push(Arc::new(command.clone()));
        Ok(command)
    }

    pub(super) fn start(&mut self, command_id: &str, at: DateTime<Utc>) -> EngineResult<Command> {
        let command = self.transition(command_id, CommandStatus::Running, |command| {
            command.started_at = Some(at);
        })?;
        self.queue.retain(|id| id != command_id);
        self.running = Some(command.id.clone());
        Ok(command)
    }

    pub(super) fn succeed(
        &mut self,
        command_id: &str,
        result: CommandResult,
        at: DateTime<Utc>,
    ) -> EngineResult<Command> {
        let command = self.transition(command_id, CommandStatus::Succeeded, |command| {
            command.result = Some(result);
            command.completed_at = Some(at);
        })?;
        self.running = None;
        Ok(command)
    }

    pub(super) fn fail(
        &mut self,
        command_id: &str,
        error: ErrorOccurrence,
        at: DateTime<Utc>,
    ) -> EngineResult<Command> {
        let command = self.transition(command_id, CommandStatus::Failed, |command| {
            command.error = Some(error);
            command.completed_at = Some(at);
        })?;
        self.running = None;
        Ok(command)
    }

    fn transition(
        &mut self,
        command_id: &str,
        next: CommandStatus,
        update: impl FnOnce(&mut Command),
    ) -> EngineResult<Command> {
        let index = *self
            .index_by_id
            .get(command_id)
            .ok_or_else(|| EngineError::CommandDoesNotExist(command_id.to_string()))?;
        let slot = &mut self.commands[index];
        if !slot.status.can_transition_to(next) {
            return Err(EngineError::InvalidCommandTransition {
                command_id: command_id.to_string(),
                from: slot.status.to_string(),
                to: next.to_string(),
            });
        }
        let command = Arc::make_mut(slot);
        command.status = next;
        update(command);
        Ok(command.clone())
    }
}

/// Read-only view of commands.
#[derive(Debug, Clone, Copy)]
pub struct CommandView<'a> {
    state: &'a CommandState,
}

impl<'a> CommandView<'a> {
    pub(super) fn new(state: &'a CommandState) -> Self {
        Self { state }
    }

    pub fn get(&self, command_id: &str) -> EngineResult<&'a Command> {
        self.state
            .index_by_id
            .get(command_id)
            .map(|index| self.state.commands[*index].as_ref())
            .ok_or_else(|| EngineError::CommandDoesNotExist(command_id.to_string()))
    }

    /// All commands in creation order.
    pub fn get_all(&self) -> Vec<Command> {
        self.state
            .commands
            .iter()
            .map(|command| command.as_ref().clone())
            .collect()
    }

    /// Head of the pending queue.
    pub fn get_next_queued(&self) -> Option<&'a CommandId> {
        self.state.queue.front()
    }

    /// Queued command ids in execution order.
    pub fn get_queued_ids(&self) -> Vec<CommandId> {
        self.state.queue.iter().cloned().collect()
    }

    pub fn get_running(&self) -> Option<&'a CommandId> {
        self.state.running.as_ref()
    }

    /// Nothing running and nothing waiting.
    pub fn is_complete(&self) -> bool {
        self.state.running.is_none() && self.state.queue.is_empty()
    }

    /// Failed commands in creation order.
    pub fn get_failed(&self) -> Vec<&'a Command> {
        self.state
            .commands
            .iter()
            .map(|command| command.as_ref())
            .filter(|command| command.status == CommandStatus::Failed)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{CommandData, PauseData, PauseResult};

    fn pause_command(id: &str) -> Command {
        Command::queued(id.into(), Utc::now(), CommandData::Pause(PauseData::default()))
    }

    #[test]
    fn test_queue_is_fifo() {
        let mut state = CommandState::default();
        state.add(pause_command("a")).unwrap();
        state.add(pause_command("b")).unwrap();

        let view = CommandView::new(&state);
        assert_eq!(view.get_next_queued().map(String::as_str), Some("a"));
        assert_eq!(view.get_queued_ids(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_lifecycle() {
        let mut state = CommandState::default();
        state.add(pause_command("a")).unwrap();

        let running = state.start("a", Utc::now()).unwrap();
        assert_eq!(running.status, CommandStatus::Running);
        assert!(running.started_at.is_some());
        assert_eq!(CommandView::new(&state).get_running().map(String::as_str), Some("a"));
        assert!(!CommandView::new(&state).is_complete());

        let done = state
            .succeed("a", CommandResult::Pause(PauseResult {}), Utc::now())
            .unwrap();
        assert_eq!(done.status, CommandStatus::Succeeded);
        assert!(CommandView::new(&state).is_complete());
    }

    #[test]
    fn test_terminal_commands_are_frozen() {
        let mut state = CommandState::default();
        state.add(pause_command("a")).unwrap();
        state.start("a", Utc::now()).unwrap();
        state
            .fail(
                "a",
                ErrorOccurrence::new("HardwareFaultError", "stall", Utc::now()),
                Utc::now(),
            )
            .unwrap();

        let again = state.succeed("a", CommandResult::Pause(PauseResult {}), Utc::now());
        assert!(matches!(again, Err(EngineError::InvalidCommandTransition { .. })));
        assert!(state.start("a", Utc::now()).is_err());
        assert_eq!(
            CommandView::new(&state).get("a").unwrap().status,
            CommandStatus::Failed
        );
        let failed = CommandView::new(&state).get_failed();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, "a");
    }

    #[test]
    fn test_cannot_skip_running() {
        let mut state = CommandState::default();
        state.add(pause_command("a")).unwrap();
        let result = state.succeed("a", CommandResult::Pause(PauseResult {}), Utc::now());
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_command() {
        let state = CommandState::default();
        assert_eq!(
            CommandView::new(&state).get("nope").unwrap_err(),
            EngineError::CommandDoesNotExist("nope".into())
        );
    }
}
