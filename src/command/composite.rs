// CompositeCommand - N child commands as one atomic undo/redo unit

use std::any::Any;

use crate::command::trait_def::{BASE_COMMAND_OVERHEAD, Command, CommandError, CommandResult};

/// An ordered group of commands that executes, undoes and redoes as a
/// single history entry
///
/// Children run strictly in declaration order. When a child fails
/// during execute, the children that already succeeded are rolled back
/// in reverse order (best effort) so the group is all-or-nothing from
/// the caller's point of view. Undo unwinds only the children that are
/// currently applied and stops at the first failure.
pub struct CompositeCommand {
    description: String,
    commands: Vec<Box<dyn Command>>,
    /// How many children are currently applied. Children `0..executed`
    /// have taken effect; the rest have not.
    executed: usize,
}

impl CompositeCommand {
    /// Create an empty composite with the given description
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            commands: Vec::new(),
            executed: 0,
        }
    }

    /// Create a composite from not-yet-executed commands
    pub fn with_commands(description: impl Into<String>, commands: Vec<Box<dyn Command>>) -> Self {
        Self {
            description: description.into(),
            commands,
            executed: 0,
        }
    }

    /// Wrap commands that have already been executed individually,
    /// e.g. a committed transaction buffer
    pub(crate) fn from_executed(description: String, commands: Vec<Box<dyn Command>>) -> Self {
        let executed = commands.len();
        Self {
            description,
            commands,
            executed,
        }
    }

    /// Add a child command. Only meaningful before the composite runs.
    pub fn push(&mut self, command: Box<dyn Command>) {
        self.commands.push(command);
    }

    /// Number of child commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the composite has no children
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Comma-joined child descriptions, the default label for a
    /// committed transaction
    pub(crate) fn joined_description(commands: &[Box<dyn Command>]) -> String {
        commands
            .iter()
            .map(|command| command.description())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn rollback_range(&mut self, from: usize, to: usize) {
        for command in self.commands[from..to].iter_mut().rev() {
            if let Err(err) = command.undo() {
                log::warn!(
                    "rollback of '{}' failed, continuing: {err}",
                    command.description()
                );
            }
        }
    }
}

impl Command for CompositeCommand {
    fn execute(&mut self) -> CommandResult {
        for index in 0..self.commands.len() {
            if let Err(err) = self.commands[index].execute() {
                let failed = self.commands[index].description();
                self.rollback_range(0, index);
                self.executed = 0;
                return Err(CommandError::ExecutionFailed(format!(
                    "'{failed}' failed: {err}"
                )));
            }
        }
        self.executed = self.commands.len();
        Ok(())
    }

    fn undo(&mut self) -> CommandResult {
        while self.executed > 0 {
            let index = self.executed - 1;
            if let Err(err) = self.commands[index].undo() {
                let failed = self.commands[index].description();
                return Err(CommandError::UndoFailed(format!(
                    "'{failed}' failed: {err}"
                )));
            }
            self.executed = index;
        }
        Ok(())
    }

    fn redo(&mut self) -> CommandResult {
        let start = self.executed;
        for index in start..self.commands.len() {
            if let Err(err) = self.commands[index].redo() {
                let failed = self.commands[index].description();
                self.rollback_range(start, index);
                self.executed = start;
                return Err(CommandError::RedoFailed(format!(
                    "'{failed}' failed: {err}"
                )));
            }
            self.executed = index + 1;
        }
        Ok(())
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn estimate_memory_size(&self) -> usize {
        BASE_COMMAND_OVERHEAD
            + self
                .commands
                .iter()
                .map(|command| command.estimate_memory_size())
                .sum::<usize>()
    }

    fn dispose(&mut self) {
        // Every child, regardless of execution state
        for command in &mut self.commands {
            command.dispose();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
