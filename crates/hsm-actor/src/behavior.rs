//! # The Behavior Contract
//!
//! [`Behavior`] is the trait an agent type implements to be driven by the
//! runtime. It plays the role the entity trait plays in a plain actor
//! framework, extended with a state machine: the implementor describes its
//! state hierarchy once in [`Behavior::states`], its command policy once in
//! [`Behavior::commands`], and writes handler bodies in
//! [`Behavior::handle`]. The runtime guarantees every one of these runs on
//! the agent's single worker, so `&mut self` access is safe without locks.
//!
//! Associated types pin down the closed finite sets the agent works with:
//! `State` and `Trigger` are the machine's vocabulary, `Call` is the typed
//! message enum the facade delivers, and `Command` is the stable method
//! identity the command table is keyed by.

use std::fmt::Debug;
use std::hash::Hash;

use crate::command::CommandRule;
use crate::context::AgentCx;
use crate::core::AgentCell;
use crate::error::{AgentError, Fault};
use crate::hfsm::{MachineSpec, StateChange, StateKey, TriggerKey};

/// Contract implemented by every stateful agent.
pub trait Behavior: Sized + Send + 'static {
    /// State identifiers, a closed finite set (a fieldless `enum`).
    type State: StateKey;

    /// Trigger identifiers.
    type Trigger: TriggerKey;

    /// The facade message enum. Each variant is one callable method;
    /// variants of value-returning methods carry a
    /// [`Reply`](crate::agent::Reply) channel.
    type Call: Send + Debug + 'static;

    /// Stable method identity used for command-table lookup, normally a
    /// fieldless mirror of `Call`.
    type Command: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    /// Maps a call to its method identity.
    fn command_of(call: &Self::Call) -> Self::Command;

    /// Describes the state hierarchy, transitions and hooks. Invoked once
    /// when the agent is spawned.
    fn states(&self) -> MachineSpec<AgentCell<Self>, Self::State, Self::Trigger>;

    /// Describes the command table. Commands without a rule are
    /// unrestricted.
    fn commands() -> Vec<CommandRule<Self>> {
        Vec::new()
    }

    /// Default handler body for calls the command table routes here.
    fn handle(&mut self, call: Self::Call, cx: &mut AgentCx<Self>) -> Result<(), Fault>;

    /// Invoked after every completed transition.
    fn on_state_changed(
        &mut self,
        cx: &mut AgentCx<Self>,
        change: &StateChange<Self::State, Self::Trigger>,
    ) {
        let _ = (cx, change);
    }

    /// Invoked for domain faults (including watched-state conditions).
    /// Typical implementations fire a recovery trigger.
    fn on_fault(&mut self, cx: &mut AgentCx<Self>, error: &AgentError) {
        let _ = (cx, error);
    }

    /// Invoked when a deadline elapses. Treated as a fault unless
    /// overridden.
    fn on_timeout(&mut self, cx: &mut AgentCx<Self>, error: &AgentError) {
        self.on_fault(cx, error);
    }

    /// Invoked for unexpected failures.
    fn on_error(&mut self, cx: &mut AgentCx<Self>, error: &AgentError) {
        let _ = cx;
        tracing::error!(error = %error, "unhandled agent error");
    }

    /// Invoked when a fired trigger matched no transition anywhere up the
    /// parent chain. Non-fatal.
    fn on_unhandled_trigger(&mut self, cx: &mut AgentCx<Self>, trigger: Self::Trigger) {
        let _ = cx;
        tracing::warn!(?trigger, "trigger had no matching transition");
    }

    /// Invoked with calls the command table rejected, after the error has
    /// gone through the error policy. Lets value-returning variants deliver
    /// the error into their reply channel; the default drops the call,
    /// which closes any reply channel it carries.
    fn reject(call: Self::Call, error: AgentError) {
        let _ = (call, error);
    }
}

/// Adapts a method on the behavior into an enter/exit hook usable in
/// [`Behavior::states`].
///
/// ```ignore
/// StateSpec::new(State::Opening).on_enter(hook(Door::opening_entered))
/// ```
pub fn hook<B, F>(
    f: F,
) -> impl Fn(&mut AgentCell<B>, &StateChange<B::State, B::Trigger>) -> Result<(), Fault>
       + Send
       + Sync
       + 'static
where
    B: Behavior,
    F: Fn(&mut B, &mut AgentCx<B>, &StateChange<B::State, B::Trigger>) -> Result<(), Fault>
        + Send
        + Sync
        + 'static,
{
    move |cell, change| {
        let (behavior, cx) = cell.parts();
        f(behavior, cx, change)
    }
}

/// Adapts a predicate on the behavior into a transition guard.
pub fn guard<B, F>(f: F) -> impl Fn(&AgentCell<B>) -> bool + Send + Sync + 'static
where
    B: Behavior,
    F: Fn(&B) -> bool + Send + Sync + 'static,
{
    move |cell| f(cell.behavior())
}

/// Adapts a method on the behavior into a transition setup callback.
pub fn setup<B, F>(
    f: F,
) -> impl Fn(&mut AgentCell<B>, B::State) -> Result<(), Fault> + Send + Sync + 'static
where
    B: Behavior,
    F: Fn(&mut B, &mut AgentCx<B>, B::State) -> Result<(), Fault> + Send + Sync + 'static,
{
    move |cell, target| {
        let (behavior, cx) = cell.parts();
        f(behavior, cx, target)
    }
}
