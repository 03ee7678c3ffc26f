//! # Runtime Errors
//!
//! This module defines the common error types used throughout the runtime.
//! By centralizing error definitions, the dispatch layer can route every
//! failure through one policy (see [`Behavior`](crate::Behavior) hooks) and
//! hosts can match on the error kind they care about.

use std::time::Duration;

/// A domain-level failure an agent is expected to recover from, typically by
/// firing a recovery trigger from its `on_fault` hook.
///
/// Enter/exit/setup hooks and command handlers report failure by returning
/// `Err(Fault)`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct Fault {
    message: String,
}

impl Fault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors that can occur while an agent is running.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// A recoverable domain failure, routed to `on_fault`.
    #[error(transparent)]
    Fault(#[from] Fault),

    /// A deadline elapsed, routed to `on_timeout`.
    #[error("deadline of {waited:?} elapsed")]
    Timeout { waited: Duration },

    /// A watched peer entered a state declared as an error condition.
    #[error("watched peer '{peer}' entered state {state}")]
    WatchedState { peer: String, state: String },

    /// A facade call arrived that the command table rejects in the current
    /// state.
    #[error("command {command} is not valid in state {state}")]
    InvalidCommand { command: String, state: String },

    /// The state machine definition is broken. Fatal; raised synchronously
    /// from the operation that detected it.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A trigger was fired while a transition was already executing.
    #[error("trigger {trigger} fired during a transition")]
    ReentrantFire { trigger: String },

    /// An asynchronous continuation was canceled before completion.
    #[error("continuation was canceled")]
    Canceled,

    /// Any other failure, routed to `on_error`.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl AgentError {
    pub fn other(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other(Box::new(err))
    }

    /// Whether this error represents a domain fault (including timeouts and
    /// watched-state conditions) rather than an unexpected failure.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            Self::Fault(_) | Self::Timeout { .. } | Self::WatchedState { .. }
        )
    }
}

/// State machine definition errors, reported when a
/// [`MachineSpec`](crate::hfsm::MachineSpec) is built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("state {0} is defined more than once")]
    DuplicateState(String),

    #[error("state {state} names unknown parent {parent}")]
    UnknownParent { state: String, parent: String },

    #[error("transition from {state} targets unknown state {target}")]
    UnknownTarget { state: String, target: String },

    #[error("initial state {0} is not defined")]
    UnknownInitial(String),

    #[error("parent chain of state {0} contains a cycle")]
    ParentCycle(String),
}

/// Errors surfaced by [`Mailbox::execute`](crate::Mailbox::execute).
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum MailboxError {
    /// The work item was discarded (the queue was cleared) before it ran.
    #[error("work item was discarded before it ran")]
    Discarded,
}
