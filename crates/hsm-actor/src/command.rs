//! Per-command dispatch policy.
//!
//! Each facade command may carry a rule constraining the states in which it
//! is valid and optionally translating it into a trigger fire instead of a
//! handler invocation. Commands without a rule are unrestricted.

use std::collections::HashMap;

use crate::behavior::Behavior;

/// Dispatch policy for one command.
pub struct CommandRule<B: Behavior> {
    command: B::Command,
    valid_in: Option<Vec<B::State>>,
    trigger: Option<B::Trigger>,
}

impl<B: Behavior> CommandRule<B> {
    /// A rule for `command`, valid in any state and dispatched to the
    /// default handler until refined.
    pub fn new(command: B::Command) -> Self {
        Self {
            command,
            valid_in: None,
            trigger: None,
        }
    }

    /// Restrict the command to the given states (matched via `in_state`,
    /// so listing a parent covers its substates).
    pub fn valid_in(mut self, states: impl IntoIterator<Item = B::State>) -> Self {
        self.valid_in = Some(states.into_iter().collect());
        self
    }

    /// Translate the command into a trigger fire instead of invoking the
    /// default handler.
    pub fn fires(mut self, trigger: B::Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn command(&self) -> B::Command {
        self.command
    }

    pub fn states(&self) -> Option<&[B::State]> {
        self.valid_in.as_deref()
    }

    pub fn trigger(&self) -> Option<B::Trigger> {
        self.trigger
    }
}

/// Command rules indexed by method identity.
pub(crate) struct CommandTable<B: Behavior> {
    rules: HashMap<B::Command, CommandRule<B>>,
}

impl<B: Behavior> CommandTable<B> {
    pub(crate) fn from_rules(rules: Vec<CommandRule<B>>) -> Self {
        Self {
            rules: rules.into_iter().map(|r| (r.command, r)).collect(),
        }
    }

    pub(crate) fn get(&self, command: &B::Command) -> Option<&CommandRule<B>> {
        self.rules.get(command)
    }
}
