//! # Agent Server Half
//!
//! [`AgentCore`] owns everything one agent mutates: the behavior value, the
//! state machine, the command table and the injected context. It lives
//! behind the agent's mailbox; every work item the facade enqueues runs
//! against it, one at a time, which is what makes `&mut` access safe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::behavior::Behavior;
use crate::command::CommandTable;
use crate::context::AgentCx;
use crate::error::AgentError;
use crate::hfsm::Machine;

/// The behavior value paired with its runtime context. This is the context
/// type the agent's state machine runs against: hooks and guards written
/// with [`hook`](crate::behavior::hook), [`guard`](crate::behavior::guard)
/// and [`setup`](crate::behavior::setup) split it back into
/// `(&mut B, &mut AgentCx<B>)`.
pub struct AgentCell<B: Behavior> {
    behavior: B,
    cx: AgentCx<B>,
}

impl<B: Behavior> AgentCell<B> {
    pub(crate) fn new(behavior: B, cx: AgentCx<B>) -> Self {
        Self { behavior, cx }
    }

    pub fn behavior(&self) -> &B {
        &self.behavior
    }

    pub fn context(&self) -> &AgentCx<B> {
        &self.cx
    }

    /// Split borrow for hook and handler invocation.
    pub fn parts(&mut self) -> (&mut B, &mut AgentCx<B>) {
        (&mut self.behavior, &mut self.cx)
    }

    /// Invokes and removes every watcher whose state is no longer active.
    /// Matured entries are drained before any callback runs, so callbacks
    /// may register new watchers freely.
    pub(crate) fn flush_watchers(&mut self) {
        if self.cx.watchers.is_empty() {
            return;
        }
        let current = self.cx.state();
        let table = std::mem::take(&mut self.cx.watchers);
        let (due, keep): (Vec<_>, Vec<_>) = table.into_iter().partition(|w| {
            !crate::hfsm::types::chain_contains(&self.cx.parents, current, w.state)
        });
        self.cx.watchers = keep;
        for watcher in due {
            let (behavior, cx) = self.parts();
            (watcher.on_leave)(behavior, cx);
        }
    }
}

/// The server half of an agent: state machine plus cell plus command
/// table, driven exclusively by mailbox work items.
pub struct AgentCore<B: Behavior> {
    machine: Machine<AgentCell<B>, B::State, B::Trigger>,
    cell: AgentCell<B>,
    commands: CommandTable<B>,
    transitioning: Arc<AtomicBool>,
}

impl<B: Behavior> AgentCore<B> {
    pub(crate) fn new(
        machine: Machine<AgentCell<B>, B::State, B::Trigger>,
        cell: AgentCell<B>,
        commands: CommandTable<B>,
        transitioning: Arc<AtomicBool>,
    ) -> Self {
        Self {
            machine,
            cell,
            commands,
            transitioning,
        }
    }

    pub fn state(&self) -> B::State {
        self.machine.current()
    }

    pub fn in_state(&self, state: B::State) -> bool {
        self.machine.in_state(state)
    }

    pub fn transitioning(&self) -> bool {
        self.machine.transitioning()
    }

    pub fn behavior(&self) -> &B {
        self.cell.behavior()
    }

    /// Split borrow of the behavior and its context.
    pub fn cell_parts(&mut self) -> (&mut B, &mut AgentCx<B>) {
        self.cell.parts()
    }

    /// The single dispatch entry: validates the call against the command
    /// table, then either enqueues a trigger fire or invokes the default
    /// handler body.
    pub fn dispatch(&mut self, call: B::Call) {
        let command = B::command_of(&call);
        debug!(agent = %self.cell.cx.label(), ?command, "dispatch");

        let policy = self
            .commands
            .get(&command)
            .map(|rule| (rule.states().map(|s| s.to_vec()), rule.trigger()));
        if let Some((valid_in, trigger)) = policy {
            if let Some(valid) = valid_in {
                if !valid.iter().any(|s| self.machine.in_state(*s)) {
                    let error = AgentError::InvalidCommand {
                        command: format!("{command:?}"),
                        state: format!("{:?}", self.machine.current()),
                    };
                    warn!(agent = %self.cell.cx.label(), %error, "call rejected");
                    self.admit_ref(&error);
                    B::reject(call, error);
                    return;
                }
            }
            if let Some(trigger) = trigger {
                // fired as a follow-up item, never inline, so calls already
                // queued keep their order ahead of any transition cascade
                self.cell.cx.fire(trigger);
                return;
            }
        }

        let (behavior, cx) = self.cell.parts();
        if let Err(fault) = behavior.handle(call, cx) {
            self.admit(AgentError::Fault(fault));
        }
    }

    /// Fires a trigger on the worker. While a transition is executing the
    /// fire is re-enqueued instead, so triggers never nest.
    pub fn fire(&mut self, trigger: B::Trigger) {
        if self.machine.transitioning() {
            self.cell.cx.fire(trigger);
            return;
        }
        self.transitioning.store(true, Ordering::Release);
        self.machine.fire(trigger, &mut self.cell);
        self.transitioning.store(false, Ordering::Release);
    }

    /// Re-evaluates guard-driven transitions until none applies.
    pub fn update_states(&mut self) {
        if self.machine.transitioning() {
            return;
        }
        self.transitioning.store(true, Ordering::Release);
        self.machine.update(&mut self.cell);
        self.transitioning.store(false, Ordering::Release);
    }

    pub(crate) fn start(&mut self) {
        self.transitioning.store(true, Ordering::Release);
        self.machine.start(&mut self.cell);
        self.transitioning.store(false, Ordering::Release);
    }

    /// Hands an error to the agent's error policy: observers first, then
    /// the kind-matched behavior hook.
    pub fn admit(&mut self, error: AgentError) {
        self.admit_ref(&error);
    }

    fn admit_ref(&mut self, error: &AgentError) {
        if error.is_fault() {
            debug!(agent = %self.cell.cx.label(), %error, "fault");
        } else {
            warn!(agent = %self.cell.cx.label(), %error, "error");
        }
        for observer in self.cell.cx.anchor.error_observers() {
            observer(error);
        }
        route_error(&mut self.cell, error);
    }
}

/// Routes an error to the behavior hook matching its kind. Hooks are
/// infallible by signature, so a failure inside error handling cannot
/// escape the worker.
pub(crate) fn route_error<B: Behavior>(cell: &mut AgentCell<B>, error: &AgentError) {
    let (behavior, cx) = cell.parts();
    match error {
        AgentError::Timeout { .. } => behavior.on_timeout(cx, error),
        AgentError::Fault(_) | AgentError::WatchedState { .. } => behavior.on_fault(cx, error),
        _ => behavior.on_error(cx, error),
    }
}
