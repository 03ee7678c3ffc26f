//! # Agent Context
//!
//! [`AgentCx`] is the runtime context injected into every hook, handler and
//! watcher callback alongside `&mut` access to the behavior itself. It
//! carries the lifecycle-scoped machinery: one-shot state watchers,
//! periodic and one-shot timers canceled by leaving their scope state,
//! cross-agent state watches, and continuation of asynchronous work back
//! onto the agent's worker.
//!
//! Everything here is re-entrancy safe by construction: operations that
//! need the agent's state enqueue a follow-up work item instead of running
//! inline, so a trigger fired from inside a transition executes after the
//! transition (and its guard-driven follow-ups) completes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::agent::{Agent, Anchor};
use crate::behavior::Behavior;
use crate::core::AgentCore;
use crate::error::AgentError;
use crate::hfsm::types::chain_contains;
use crate::hfsm::StateChange;

pub(crate) struct WatcherEntry<B: Behavior> {
    pub(crate) state: B::State,
    pub(crate) on_leave: Box<dyn FnOnce(&mut B, &mut AgentCx<B>) + Send>,
}

/// Runtime context of one agent, passed to hooks and handlers next to the
/// behavior.
pub struct AgentCx<B: Behavior> {
    label: String,
    pub(crate) anchor: Anchor<B>,
    pub(crate) parents: Arc<HashMap<B::State, Option<B::State>>>,
    state_rx: watch::Receiver<B::State>,
    transitioning: Arc<AtomicBool>,
    pub(crate) watchers: Vec<WatcherEntry<B>>,
}

impl<B: Behavior> AgentCx<B> {
    pub(crate) fn new(
        label: String,
        anchor: Anchor<B>,
        parents: Arc<HashMap<B::State, Option<B::State>>>,
        state_rx: watch::Receiver<B::State>,
        transitioning: Arc<AtomicBool>,
    ) -> Self {
        Self {
            label,
            anchor,
            parents,
            state_rx,
            transitioning,
            watchers: Vec::new(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// The facade handle of this agent, if it is still alive.
    pub fn agent(&self) -> Option<Agent<B>> {
        self.anchor.agent()
    }

    pub fn anchor(&self) -> &Anchor<B> {
        &self.anchor
    }

    /// The current state, read from the externally visible mirror. Fresh
    /// from the moment the cursor moves, including inside enter hooks.
    pub fn state(&self) -> B::State {
        *self.state_rx.borrow()
    }

    pub fn in_state(&self, state: B::State) -> bool {
        chain_contains(&self.parents, self.state(), state)
    }

    pub fn transitioning(&self) -> bool {
        self.transitioning.load(Ordering::Acquire)
    }

    /// Fires `trigger` as a follow-up work item. Deferral keeps triggers
    /// from nesting: a fire requested during a transition runs after the
    /// transition and its guard follow-ups complete, and after any calls
    /// already queued.
    pub fn fire(&self, trigger: B::Trigger) {
        self.anchor.fire(trigger);
    }

    /// Re-evaluates guard-driven transitions as a follow-up work item.
    pub fn update_states(&self) {
        self.anchor.act_core(|core| core.update_states());
    }

    /// Enqueues a closure onto this agent's worker.
    pub fn act(&self, f: impl FnOnce(&mut B, &mut AgentCx<B>) + Send + 'static) {
        self.anchor.act(f);
    }

    /// Registers a one-shot callback invoked the first time this agent is
    /// no longer in `state`. If the agent is already outside `state`, the
    /// callback is delivered as the immediately next work item.
    pub fn watch_state(
        &mut self,
        state: B::State,
        on_leave: impl FnOnce(&mut B, &mut AgentCx<B>) + Send + 'static,
    ) {
        if !self.in_state(state) {
            self.anchor.act(on_leave);
            return;
        }
        self.watchers.push(WatcherEntry {
            state,
            on_leave: Box::new(on_leave),
        });
    }

    /// Starts a periodic timer scoped to the current state. `tick` runs on
    /// this agent's worker every `interval`, receiving the seconds elapsed
    /// since the previous tick, and never runs again once the agent leaves
    /// the scope state.
    pub fn repeat_while_in_state(
        &mut self,
        interval: Duration,
        tick: impl Fn(&mut B, &mut AgentCx<B>, f64) + Send + Sync + 'static,
    ) {
        let scope = self.state();
        self.repeat_scoped(interval, scope, tick);
    }

    pub fn repeat_scoped(
        &mut self,
        interval: Duration,
        scope: B::State,
        tick: impl Fn(&mut B, &mut AgentCx<B>, f64) + Send + Sync + 'static,
    ) {
        let left = Arc::new(AtomicBool::new(false));
        let anchor = self.anchor.clone();
        let tick = Arc::new(tick);
        let flag = Arc::clone(&left);
        let task = tokio::spawn(async move {
            let mut clock = tokio::time::interval(interval);
            clock.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            clock.tick().await;
            let mut last = tokio::time::Instant::now();
            loop {
                clock.tick().await;
                if flag.load(Ordering::Acquire) {
                    break;
                }
                let elapsed = last.elapsed().as_secs_f64();
                last = tokio::time::Instant::now();
                let tick = Arc::clone(&tick);
                let seen = Arc::clone(&flag);
                // the left flag, not timer cancellation, decides delivery:
                // a tick already in flight when the state changes is dropped
                anchor.act(move |behavior, cx| {
                    if !seen.load(Ordering::Acquire) {
                        tick(behavior, cx, elapsed);
                    }
                });
            }
        });
        self.watch_state(scope, move |_behavior, _cx| {
            left.store(true, Ordering::Release);
            task.abort();
        });
    }

    /// Arms a one-shot timer scoped to the current state. `on_timeout`
    /// runs at most once, and only if the agent is still in the scope
    /// state when the deadline elapses.
    pub fn timeout_while_in_state(
        &mut self,
        deadline: Duration,
        on_timeout: impl FnOnce(&mut B, &mut AgentCx<B>) + Send + 'static,
    ) {
        let scope = self.state();
        self.timeout_scoped(deadline, scope, on_timeout);
    }

    pub fn timeout_scoped(
        &mut self,
        deadline: Duration,
        scope: B::State,
        on_timeout: impl FnOnce(&mut B, &mut AgentCx<B>) + Send + 'static,
    ) {
        let left = Arc::new(AtomicBool::new(false));
        let anchor = self.anchor.clone();
        let flag = Arc::clone(&left);
        let task = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            anchor.act(move |behavior, cx| {
                if !flag.swap(true, Ordering::AcqRel) {
                    on_timeout(behavior, cx);
                }
            });
        });
        self.watch_state(scope, move |_behavior, _cx| {
            left.store(true, Ordering::Release);
            task.abort();
        });
    }

    /// Like [`timeout_while_in_state`](Self::timeout_while_in_state) with
    /// no callback: raises [`AgentError::Timeout`] through the error
    /// policy when the deadline elapses in-state.
    pub fn expire_while_in_state(&mut self, deadline: Duration) {
        let scope = self.state();
        self.expire_scoped(deadline, scope);
    }

    pub fn expire_scoped(&mut self, deadline: Duration, scope: B::State) {
        let left = Arc::new(AtomicBool::new(false));
        let anchor = self.anchor.clone();
        let flag = Arc::clone(&left);
        let task = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            anchor.act_core(move |core| {
                if !flag.swap(true, Ordering::AcqRel) {
                    core.admit(AgentError::Timeout { waited: deadline });
                }
            });
        });
        self.watch_state(scope, move |_behavior, _cx| {
            left.store(true, Ordering::Release);
            task.abort();
        });
    }

    /// Watches another agent's state changes while this agent stays in
    /// `scope`. Every notification is bounced onto this agent's worker;
    /// `action` runs when both the scope still holds and
    /// `condition(peer_state, change)` is true. The condition is also
    /// evaluated once immediately against the peer's current state. The
    /// subscription is dropped when this agent leaves `scope`.
    pub fn watch_peer_while_in_state<P: Behavior>(
        &mut self,
        peer: &Agent<P>,
        scope: B::State,
        condition: impl Fn(P::State, Option<&StateChange<P::State, P::Trigger>>) -> bool
            + Send
            + Sync
            + 'static,
        action: impl Fn(&mut B, &mut AgentCx<B>) + Send + Sync + 'static,
    ) {
        let action = Arc::new(action);
        let run: Arc<dyn Fn(&mut AgentCore<B>) + Send + Sync> = Arc::new(move |core| {
            let (behavior, cx) = core.cell_parts();
            action(behavior, cx);
        });
        self.watch_peer_core(peer, scope, Arc::new(condition), run);
    }

    /// Convenience: re-evaluate this agent's guards whenever `peer`
    /// changes state, while in `scope`.
    pub fn watch_peer<P: Behavior>(&mut self, peer: &Agent<P>, scope: B::State) {
        self.watch_peer_core(
            peer,
            scope,
            Arc::new(|_, _| true),
            Arc::new(|core| core.update_states()),
        );
    }

    /// Like [`watch_peer`](Self::watch_peer), but raises a watched-state
    /// fault carrying the peer's identity whenever the peer is in
    /// `error_state`.
    pub fn watch_peer_flagging<P: Behavior>(
        &mut self,
        peer: &Agent<P>,
        scope: B::State,
        error_state: P::State,
    ) {
        let peer_label = peer.label().to_string();
        let probe = peer.clone();
        self.watch_peer_core(
            peer,
            scope,
            Arc::new(|_, _| true),
            Arc::new(move |core| {
                if probe.in_state(error_state) {
                    core.admit(AgentError::WatchedState {
                        peer: peer_label.clone(),
                        state: format!("{error_state:?}"),
                    });
                } else {
                    core.update_states();
                }
            }),
        );
    }

    fn watch_peer_core<P: Behavior>(
        &mut self,
        peer: &Agent<P>,
        scope: B::State,
        condition: Arc<
            dyn Fn(P::State, Option<&StateChange<P::State, P::Trigger>>) -> bool + Send + Sync,
        >,
        action: Arc<dyn Fn(&mut AgentCore<B>) + Send + Sync>,
    ) {
        if !self.in_state(scope) {
            debug!(agent = %self.label, ?scope, "peer watch skipped, scope not active");
            return;
        }
        let anchor = self.anchor.clone();
        let cond = Arc::clone(&condition);
        let run = Arc::clone(&action);
        let subscription = peer.observe_state(move |change| {
            let change = *change;
            let cond = Arc::clone(&cond);
            let run = Arc::clone(&run);
            anchor.act_core(move |core| {
                if core.in_state(scope) && cond(change.to, Some(&change)) {
                    run(core);
                }
            });
        });

        let now = peer.state();
        self.anchor.act_core(move |core| {
            if core.in_state(scope) && condition(now, None) {
                action(core);
            }
        });

        let peer = peer.clone();
        self.watch_state(scope, move |_behavior, _cx| {
            peer.unobserve_state(subscription);
        });
    }

    /// Attaches a completion callback to `task`: when it finishes and this
    /// agent is still in the current state, `then` runs on the worker with
    /// the result. A canceled task raises [`AgentError::Canceled`] through
    /// the error policy.
    pub fn continue_while_in_state<R: Send + 'static>(
        &mut self,
        task: JoinHandle<R>,
        then: impl FnOnce(&mut B, &mut AgentCx<B>, R) + Send + 'static,
    ) {
        let scope = self.state();
        self.continue_scoped(task, scope, then);
    }

    pub fn continue_scoped<R: Send + 'static>(
        &mut self,
        task: JoinHandle<R>,
        scope: B::State,
        then: impl FnOnce(&mut B, &mut AgentCx<B>, R) + Send + 'static,
    ) {
        let anchor = self.anchor.clone();
        tokio::spawn(async move {
            match task.await {
                Ok(result) => anchor.act(move |behavior, cx| {
                    if cx.in_state(scope) {
                        then(behavior, cx, result);
                    }
                }),
                Err(join_error) => {
                    let error = if join_error.is_cancelled() {
                        AgentError::Canceled
                    } else {
                        AgentError::other(join_error)
                    };
                    anchor.act_core(move |core| core.admit(error));
                }
            }
        });
    }
}
