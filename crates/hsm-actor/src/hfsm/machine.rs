//! The running state machine: a state cursor over a validated definition.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::AgentError;

use super::types::{HookFn, MachineSpec, StateChange, StateKey, TransitionSpec, TriggerKey};

/// Observer invoked after every completed transition.
pub type ObserverFn<C, S, T> = Arc<dyn Fn(&mut C, &StateChange<S, T>) + Send + Sync>;

/// Sink for errors raised inside guards, hooks and setup callbacks, and for
/// re-entrant fire attempts.
pub type ErrorSinkFn<C> = Arc<dyn Fn(&mut C, AgentError) + Send + Sync>;

/// Sink invoked when a fired trigger matches no transition anywhere up the
/// parent chain. Non-fatal.
pub type UnhandledSinkFn<C, S, T> = Arc<dyn Fn(&mut C, S, T) + Send + Sync>;

/// Callback invoked the moment the state cursor moves, before enter hooks
/// run. Lets an embedding runtime keep an externally readable mirror of the
/// current state.
pub type CursorSinkFn<S> = Arc<dyn Fn(S) + Send + Sync>;

struct StateNode<C, S, T> {
    parent: Option<S>,
    transitions: Vec<TransitionSpec<C, S, T>>,
    enter: Option<HookFn<C, S, T>>,
    exit: Option<HookFn<C, S, T>>,
}

/// A hierarchical state machine.
///
/// The machine always occupies exactly one node, which may be an internal
/// node: being "in" a parent state with no active substate is legal.
/// All operations take the caller's context `C`, against which guards and
/// hooks run.
pub struct Machine<C, S: StateKey, T: TriggerKey> {
    states: HashMap<S, StateNode<C, S, T>>,
    current: S,
    transitioning: bool,
    observers: Vec<(u64, ObserverFn<C, S, T>)>,
    next_observer: u64,
    error_sink: Option<ErrorSinkFn<C>>,
    unhandled_sink: Option<UnhandledSinkFn<C, S, T>>,
    cursor_sink: Option<CursorSinkFn<S>>,
}

impl<C, S: StateKey, T: TriggerKey> Machine<C, S, T> {
    pub(crate) fn from_spec(spec: MachineSpec<C, S, T>) -> Self {
        let states = spec
            .states
            .into_iter()
            .map(|s| {
                (
                    s.id,
                    StateNode {
                        parent: s.parent,
                        transitions: s.transitions,
                        enter: s.enter,
                        exit: s.exit,
                    },
                )
            })
            .collect();
        Self {
            states,
            current: spec.initial,
            transitioning: false,
            observers: Vec::new(),
            next_observer: 0,
            error_sink: None,
            unhandled_sink: None,
            cursor_sink: None,
        }
    }

    pub fn current(&self) -> S {
        self.current
    }

    /// True while an operation is inside enter/exit/guard/setup callbacks.
    pub fn transitioning(&self) -> bool {
        self.transitioning
    }

    /// True iff `state` equals the current state or any of its transitive
    /// ancestors.
    pub fn in_state(&self, state: S) -> bool {
        let mut cursor = Some(self.current);
        while let Some(s) = cursor {
            if s == state {
                return true;
            }
            cursor = self.parent_of(s);
        }
        false
    }

    pub fn parent_of(&self, state: S) -> Option<S> {
        self.states.get(&state).and_then(|n| n.parent)
    }

    /// Snapshot of the state hierarchy, usable to answer `in_state`
    /// questions without access to the machine.
    pub fn parent_map(&self) -> HashMap<S, Option<S>> {
        self.states.iter().map(|(id, n)| (*id, n.parent)).collect()
    }

    pub fn observe(&mut self, observer: ObserverFn<C, S, T>) -> u64 {
        let id = self.next_observer;
        self.next_observer += 1;
        self.observers.push((id, observer));
        id
    }

    pub fn unobserve(&mut self, id: u64) {
        self.observers.retain(|(i, _)| *i != id);
    }

    pub fn set_error_sink(&mut self, sink: ErrorSinkFn<C>) {
        self.error_sink = Some(sink);
    }

    pub fn set_unhandled_sink(&mut self, sink: UnhandledSinkFn<C, S, T>) {
        self.unhandled_sink = Some(sink);
    }

    pub fn set_cursor_sink(&mut self, sink: CursorSinkFn<S>) {
        self.cursor_sink = Some(sink);
    }

    /// Runs the enter chain of the initial state (root to leaf) and one
    /// update scan. Call once before feeding the machine any triggers.
    pub fn start(&mut self, ctx: &mut C) {
        self.transitioning = true;
        let change = StateChange {
            from: self.current,
            to: self.current,
            trigger: None,
        };
        let enter_hooks: Vec<_> = self
            .ancestors(self.current)
            .iter()
            .filter_map(|s| self.states.get(s).and_then(|n| n.enter.clone()))
            .collect();
        for hook in enter_hooks.iter().rev() {
            if let Err(fault) = hook(ctx, &change) {
                self.report(ctx, fault.into());
            }
        }
        self.run_update_loop(ctx);
        self.transitioning = false;
    }

    /// Fires a trigger.
    ///
    /// Walks from the current state up its parent chain looking for the
    /// first trigger-driven transition matching `trigger`. If one is found
    /// the transition is performed with the original current state as the
    /// exit origin, then guard-driven follow-ups run to a fixpoint. An
    /// unmatched trigger goes to the unhandled sink.
    ///
    /// Firing while a transition is executing is an error, reported through
    /// the error sink.
    pub fn fire(&mut self, trigger: T, ctx: &mut C) {
        if self.transitioning {
            self.report(
                ctx,
                AgentError::ReentrantFire {
                    trigger: format!("{trigger:?}"),
                },
            );
            return;
        }
        self.transitioning = true;

        let mut matched = None;
        let mut cursor = Some(self.current);
        while let Some(s) = cursor {
            let Some(node) = self.states.get(&s) else { break };
            if let Some(transition) = node
                .transitions
                .iter()
                .find(|t| t.guard.is_none() && t.trigger == Some(trigger))
            {
                matched = Some(transition.clone());
                break;
            }
            cursor = node.parent;
        }

        match matched {
            Some(transition) => {
                self.perform(transition, Some(trigger), ctx);
                self.run_update_loop(ctx);
            }
            None => {
                debug!(?trigger, state = ?self.current, "trigger unhandled");
                if let Some(sink) = self.unhandled_sink.clone() {
                    sink(ctx, self.current, trigger);
                } else {
                    warn!(?trigger, state = ?self.current, "trigger had no matching transition");
                }
            }
        }
        self.transitioning = false;
    }

    /// Scans the current state's own transitions for the first guarded one
    /// whose guard holds, performs it, and repeats until no guard applies.
    ///
    /// A no-op when called while a transition is already executing;
    /// trigger-driven transitions run this scan themselves on completion.
    pub fn update(&mut self, ctx: &mut C) {
        if self.transitioning {
            return;
        }
        self.transitioning = true;
        self.run_update_loop(ctx);
        self.transitioning = false;
    }

    fn run_update_loop(&mut self, ctx: &mut C) {
        loop {
            let applicable = self.states.get(&self.current).and_then(|node| {
                node.transitions
                    .iter()
                    .find(|t| t.guard.as_ref().is_some_and(|g| g(ctx)))
                    .cloned()
            });
            match applicable {
                Some(transition) => self.perform(transition, None, ctx),
                None => break,
            }
        }
    }

    /// Executes one transition: exit hooks leaf-to-root up to the least
    /// common ancestor, setup, cursor move, enter hooks root-to-leaf, then
    /// observers. Hook failures are reported and do not abort the
    /// transition.
    fn perform(&mut self, transition: TransitionSpec<C, S, T>, trigger: Option<T>, ctx: &mut C) {
        let old = self.current;
        let target = transition.target;
        let change = StateChange {
            from: old,
            to: target,
            trigger,
        };

        let old_path = self.ancestors(old);
        let new_path = self.ancestors(target);
        let lca = new_path.iter().find(|a| old_path.contains(a)).copied();

        let exit_hooks: Vec<_> = old_path
            .iter()
            .take_while(|s| Some(**s) != lca)
            .filter_map(|s| self.states.get(s).and_then(|n| n.exit.clone()))
            .collect();
        let enter_hooks: Vec<_> = new_path
            .iter()
            .take_while(|s| Some(**s) != lca)
            .filter_map(|s| self.states.get(s).and_then(|n| n.enter.clone()))
            .collect();

        for hook in &exit_hooks {
            if let Err(fault) = hook(ctx, &change) {
                self.report(ctx, fault.into());
            }
        }
        if let Some(setup) = &transition.setup {
            if let Err(fault) = setup(ctx, target) {
                self.report(ctx, fault.into());
            }
        }

        self.current = target;
        if let Some(sink) = &self.cursor_sink {
            sink(target);
        }

        for hook in enter_hooks.iter().rev() {
            if let Err(fault) = hook(ctx, &change) {
                self.report(ctx, fault.into());
            }
        }

        debug!(from = ?old, to = ?target, ?trigger, "transition");

        // snapshot: observers added during notification do not see this
        // transition, and removal during notification is safe
        let observers: Vec<_> = self.observers.iter().map(|(_, f)| f.clone()).collect();
        for observer in observers {
            observer(ctx, &change);
        }
    }

    /// Ancestor list of `state`, self first.
    fn ancestors(&self, state: S) -> Vec<S> {
        let mut chain = Vec::new();
        let mut cursor = Some(state);
        while let Some(s) = cursor {
            chain.push(s);
            cursor = self.parent_of(s);
        }
        chain
    }

    fn report(&self, ctx: &mut C, error: AgentError) {
        match self.error_sink.clone() {
            Some(sink) => sink(ctx, error),
            None => warn!(error = %error, "state machine error with no sink installed"),
        }
    }
}

impl<C, S: StateKey, T: TriggerKey> std::fmt::Debug for Machine<C, S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("current", &self.current)
            .field("transitioning", &self.transitioning)
            .field("states", &self.states.len())
            .finish()
    }
}
