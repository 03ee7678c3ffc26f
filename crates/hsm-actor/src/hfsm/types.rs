//! Core types for hierarchical state machines.
//!
//! # Key Concepts
//!
//! - **State**: a discrete mode the system can be in, drawn from a closed
//!   finite set (an `enum` in practice). States may name a parent, forming
//!   a forest of trees.
//! - **Trigger**: a named event fed to [`Machine::fire`](super::Machine::fire),
//!   matched against transitions up the parent chain.
//! - **Transition**: an outbound edge. Trigger-driven transitions carry a
//!   trigger and no guard; condition-driven transitions carry a guard and
//!   are evaluated during [`Machine::update`](super::Machine::update).
//! - **Hooks**: enter/exit callbacks on states and an optional setup
//!   callback on transitions, all running against a caller-supplied
//!   context `C`.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use crate::error::{ConfigError, Fault};

/// Marker for state identifiers: a cheap, comparable, hashable key.
///
/// Blanket-implemented; in practice a fieldless `enum` per machine.
pub trait StateKey: Copy + Eq + Hash + Debug + Send + Sync + 'static {}
impl<S: Copy + Eq + Hash + Debug + Send + Sync + 'static> StateKey for S {}

/// Marker for trigger identifiers.
pub trait TriggerKey: Copy + PartialEq + Debug + Send + Sync + 'static {}
impl<T: Copy + PartialEq + Debug + Send + Sync + 'static> TriggerKey for T {}

/// One observed state change, handed to hooks and observers.
///
/// `from` is the state the machine occupied before the transition started,
/// even when the matching transition was found on an ancestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange<S, T> {
    pub from: S,
    pub to: S,
    /// The trigger that caused the transition, or `None` for a
    /// condition-driven one.
    pub trigger: Option<T>,
}

/// Guard predicate for condition-driven transitions. Guards must be free of
/// side effects; they may run any number of times per update scan.
pub type GuardFn<C> = Arc<dyn Fn(&C) -> bool + Send + Sync>;

/// Enter/exit hook. A returned [`Fault`] is routed to the machine's error
/// sink; the transition continues regardless.
pub type HookFn<C, S, T> = Arc<dyn Fn(&mut C, &StateChange<S, T>) -> Result<(), Fault> + Send + Sync>;

/// Pre-transition setup callback, invoked with the target state after exit
/// hooks and before the state cursor moves.
pub type SetupFn<C, S> = Arc<dyn Fn(&mut C, S) -> Result<(), Fault> + Send + Sync>;

/// One outbound edge of a state.
pub struct TransitionSpec<C, S, T> {
    pub(crate) trigger: Option<T>,
    pub(crate) target: S,
    pub(crate) guard: Option<GuardFn<C>>,
    pub(crate) setup: Option<SetupFn<C, S>>,
}

impl<C, S: StateKey, T: TriggerKey> TransitionSpec<C, S, T> {
    /// A trigger-driven transition: taken when `trigger` is fired while the
    /// owning state (or one of its descendants) is current.
    pub fn on(trigger: T, target: S) -> Self {
        Self {
            trigger: Some(trigger),
            target,
            guard: None,
            setup: None,
        }
    }

    /// A condition-driven transition: taken during an update scan whenever
    /// `guard` evaluates to true.
    pub fn auto(target: S, guard: impl Fn(&C) -> bool + Send + Sync + 'static) -> Self {
        Self {
            trigger: None,
            target,
            guard: Some(Arc::new(guard)),
            setup: None,
        }
    }

    /// Attach a guard. A transition carrying both a trigger and a guard is
    /// only eligible during update scans.
    pub fn with_guard(mut self, guard: impl Fn(&C) -> bool + Send + Sync + 'static) -> Self {
        self.guard = Some(Arc::new(guard));
        self
    }

    /// Attach a setup callback, run after exit hooks and before the cursor
    /// moves to the target.
    pub fn with_setup(
        mut self,
        setup: impl Fn(&mut C, S) -> Result<(), Fault> + Send + Sync + 'static,
    ) -> Self {
        self.setup = Some(Arc::new(setup));
        self
    }

    pub fn target(&self) -> S {
        self.target
    }

    pub fn is_trigger_driven(&self) -> bool {
        self.guard.is_none()
    }
}

// Manual Clone: Arc'd callbacks clone without requiring C: Clone.
impl<C, S: StateKey, T: TriggerKey> Clone for TransitionSpec<C, S, T> {
    fn clone(&self) -> Self {
        Self {
            trigger: self.trigger,
            target: self.target,
            guard: self.guard.clone(),
            setup: self.setup.clone(),
        }
    }
}

impl<C, S: StateKey, T: TriggerKey> Debug for TransitionSpec<C, S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransitionSpec")
            .field("trigger", &self.trigger)
            .field("target", &self.target)
            .field("guarded", &self.guard.is_some())
            .field("has_setup", &self.setup.is_some())
            .finish()
    }
}

/// Static description of one state: identity, optional parent, ordered
/// transitions and optional enter/exit hooks.
pub struct StateSpec<C, S, T> {
    pub(crate) id: S,
    pub(crate) parent: Option<S>,
    pub(crate) transitions: Vec<TransitionSpec<C, S, T>>,
    pub(crate) enter: Option<HookFn<C, S, T>>,
    pub(crate) exit: Option<HookFn<C, S, T>>,
}

impl<C, S: StateKey, T: TriggerKey> StateSpec<C, S, T> {
    pub fn new(id: S) -> Self {
        Self {
            id,
            parent: None,
            transitions: Vec::new(),
            enter: None,
            exit: None,
        }
    }

    pub fn parent(mut self, parent: S) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn on_enter(
        mut self,
        hook: impl Fn(&mut C, &StateChange<S, T>) -> Result<(), Fault> + Send + Sync + 'static,
    ) -> Self {
        self.enter = Some(Arc::new(hook));
        self
    }

    pub fn on_exit(
        mut self,
        hook: impl Fn(&mut C, &StateChange<S, T>) -> Result<(), Fault> + Send + Sync + 'static,
    ) -> Self {
        self.exit = Some(Arc::new(hook));
        self
    }

    /// Shorthand for adding a trigger-driven transition.
    pub fn when(mut self, trigger: T, target: S) -> Self {
        self.transitions.push(TransitionSpec::on(trigger, target));
        self
    }

    /// Shorthand for adding a condition-driven transition.
    pub fn auto(mut self, target: S, guard: impl Fn(&C) -> bool + Send + Sync + 'static) -> Self {
        self.transitions.push(TransitionSpec::auto(target, guard));
        self
    }

    /// Add a fully built transition. Transitions are scanned in the order
    /// they were added; the first applicable one wins.
    pub fn transition(mut self, transition: TransitionSpec<C, S, T>) -> Self {
        self.transitions.push(transition);
        self
    }
}

/// A full machine definition: a list of states plus the initial state.
///
/// `build` validates the definition and produces a running
/// [`Machine`](super::Machine).
pub struct MachineSpec<C, S, T> {
    pub(crate) initial: S,
    pub(crate) states: Vec<StateSpec<C, S, T>>,
}

impl<C, S: StateKey, T: TriggerKey> MachineSpec<C, S, T> {
    pub fn new(initial: S) -> Self {
        Self {
            initial,
            states: Vec::new(),
        }
    }

    pub fn state(mut self, state: StateSpec<C, S, T>) -> Self {
        self.states.push(state);
        self
    }

    pub fn build(self) -> Result<super::Machine<C, S, T>, ConfigError> {
        self.validate()?;
        Ok(super::Machine::from_spec(self))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut ids = HashSet::new();
        for state in &self.states {
            if !ids.insert(state.id) {
                return Err(ConfigError::DuplicateState(format!("{:?}", state.id)));
            }
        }
        if !ids.contains(&self.initial) {
            return Err(ConfigError::UnknownInitial(format!("{:?}", self.initial)));
        }
        for state in &self.states {
            if let Some(parent) = state.parent {
                if !ids.contains(&parent) {
                    return Err(ConfigError::UnknownParent {
                        state: format!("{:?}", state.id),
                        parent: format!("{parent:?}"),
                    });
                }
            }
            for transition in &state.transitions {
                if !ids.contains(&transition.target) {
                    return Err(ConfigError::UnknownTarget {
                        state: format!("{:?}", state.id),
                        target: format!("{:?}", transition.target),
                    });
                }
            }
        }
        // parent chains must be finite
        let parents: HashMap<S, Option<S>> =
            self.states.iter().map(|s| (s.id, s.parent)).collect();
        for state in &self.states {
            let mut seen = HashSet::new();
            let mut cursor = Some(state.id);
            while let Some(s) = cursor {
                if !seen.insert(s) {
                    return Err(ConfigError::ParentCycle(format!("{:?}", state.id)));
                }
                cursor = parents.get(&s).copied().flatten();
            }
        }
        Ok(())
    }
}

/// Walks the parent chain of `current` looking for `target`.
pub(crate) fn chain_contains<S: StateKey>(
    parents: &HashMap<S, Option<S>>,
    current: S,
    target: S,
) -> bool {
    let mut cursor = Some(current);
    while let Some(s) = cursor {
        if s == target {
            return true;
        }
        cursor = parents.get(&s).copied().flatten();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum S {
        A,
        B,
        C,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Trig {
        Go,
    }

    type Spec = MachineSpec<(), S, Trig>;

    #[test]
    fn valid_spec_builds() {
        let machine = Spec::new(S::A)
            .state(StateSpec::new(S::A).when(Trig::Go, S::B))
            .state(StateSpec::new(S::B).parent(S::A))
            .build()
            .unwrap();
        assert_eq!(machine.current(), S::A);
    }

    #[test]
    fn duplicate_state_rejected() {
        let err = Spec::new(S::A)
            .state(StateSpec::new(S::A))
            .state(StateSpec::new(S::A))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateState(_)));
    }

    #[test]
    fn unknown_initial_rejected() {
        let err = Spec::new(S::C).state(StateSpec::new(S::A)).build().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownInitial(_)));
    }

    #[test]
    fn unknown_parent_rejected() {
        let err = Spec::new(S::A)
            .state(StateSpec::new(S::A).parent(S::C))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownParent { .. }));
    }

    #[test]
    fn unknown_target_rejected() {
        let err = Spec::new(S::A)
            .state(StateSpec::new(S::A).when(Trig::Go, S::C))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTarget { .. }));
    }

    #[test]
    fn parent_cycle_rejected() {
        let err = Spec::new(S::A)
            .state(StateSpec::new(S::A).parent(S::B))
            .state(StateSpec::new(S::B).parent(S::A))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ParentCycle(_)));
    }

    #[test]
    fn chain_walks_ancestors() {
        let parents: HashMap<S, Option<S>> =
            [(S::A, None), (S::B, Some(S::A)), (S::C, Some(S::B))].into();
        assert!(chain_contains(&parents, S::C, S::A));
        assert!(chain_contains(&parents, S::C, S::C));
        assert!(!chain_contains(&parents, S::A, S::B));
    }
}
