//! # Agent Facade
//!
//! [`Agent`] is the cheap-clone handle callers hold. Every operation on it
//! becomes a work item on the agent's mailbox; nothing ever touches the
//! behavior from the calling task. Value-returning calls carry a [`Reply`]
//! channel inside their `Call` variant and are awaited by the caller, void
//! calls are fire-and-forget.
//!
//! The current state is mirrored into a watch channel the moment the
//! cursor moves, so peers (and [`Agent::wait_for_state`]) read and await
//! state without entering the worker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, trace};

use crate::behavior::Behavior;
use crate::command::CommandTable;
use crate::context::AgentCx;
use crate::core::{route_error, AgentCell, AgentCore};
use crate::error::{AgentError, ConfigError, Fault};
use crate::hfsm::types::chain_contains;
use crate::hfsm::StateChange;
use crate::mailbox::{Mailbox, MailboxConfig};

/// Reply channel carried by value-returning `Call` variants.
pub type Reply<T> = oneshot::Sender<Result<T, AgentError>>;

/// Observer of an agent's completed transitions. Invoked on the observed
/// agent's worker; observers belonging to another agent must immediately
/// bounce back onto their own worker.
pub type StateObserverFn<B> = Arc<
    dyn Fn(&StateChange<<B as Behavior>::State, <B as Behavior>::Trigger>) + Send + Sync,
>;

/// Observer of errors admitted to an agent's error policy.
pub type ErrorObserverFn = Arc<dyn Fn(&AgentError) + Send + Sync>;

pub(crate) struct Shared<B: Behavior> {
    label: String,
    mailbox: Mailbox,
    core: Mutex<AgentCore<B>>,
    parents: Arc<HashMap<B::State, Option<B::State>>>,
    state_tx: watch::Sender<B::State>,
    state_rx: watch::Receiver<B::State>,
    transitioning: Arc<AtomicBool>,
    state_observers: Mutex<Vec<(u64, StateObserverFn<B>)>>,
    error_observers: Mutex<Vec<(u64, ErrorObserverFn)>>,
    next_observer: AtomicU64,
}

impl<B: Behavior> Shared<B> {
    fn state_observer_snapshot(&self) -> Vec<StateObserverFn<B>> {
        self.state_observers
            .lock()
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect()
    }

    fn error_observer_snapshot(&self) -> Vec<ErrorObserverFn> {
        self.error_observers
            .lock()
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect()
    }
}

/// Handle to a running agent.
pub struct Agent<B: Behavior> {
    shared: Arc<Shared<B>>,
}

impl<B: Behavior> Clone for Agent<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: Behavior> Agent<B> {
    /// Builds the agent's state machine and command table from the
    /// behavior, spawns its mailbox and runs the initial state's enter
    /// chain as the first work item.
    ///
    /// Fails fast on a broken state machine definition.
    pub fn spawn(label: impl Into<String>, behavior: B) -> Result<Self, ConfigError> {
        let label = label.into();
        let mut machine = behavior.states().build()?;
        let parents = Arc::new(machine.parent_map());
        let initial = machine.current();
        let (state_tx, state_rx) = watch::channel(initial);
        let transitioning = Arc::new(AtomicBool::new(false));

        let shared = Arc::new_cyclic(|weak: &Weak<Shared<B>>| {
            let mirror = weak.clone();
            machine.set_cursor_sink(Arc::new(move |state| {
                if let Some(shared) = mirror.upgrade() {
                    shared.state_tx.send_replace(state);
                }
            }));

            let errors = weak.clone();
            machine.set_error_sink(Arc::new(move |cell: &mut AgentCell<B>, error| {
                if let Some(shared) = errors.upgrade() {
                    for observer in shared.error_observer_snapshot() {
                        observer(&error);
                    }
                }
                route_error(cell, &error);
            }));

            machine.set_unhandled_sink(Arc::new(|cell: &mut AgentCell<B>, _state, trigger| {
                let (behavior, cx) = cell.parts();
                behavior.on_unhandled_trigger(cx, trigger);
            }));

            let observers = weak.clone();
            machine.observe(Arc::new(move |cell: &mut AgentCell<B>, change| {
                cell.flush_watchers();
                let (behavior, cx) = cell.parts();
                behavior.on_state_changed(cx, change);
                if let Some(shared) = observers.upgrade() {
                    for observer in shared.state_observer_snapshot() {
                        observer(change);
                    }
                }
            }));

            let cx = AgentCx::new(
                label.clone(),
                Anchor {
                    shared: weak.clone(),
                },
                Arc::clone(&parents),
                state_rx.clone(),
                Arc::clone(&transitioning),
            );
            let core = AgentCore::new(
                machine,
                AgentCell::new(behavior, cx),
                CommandTable::from_rules(B::commands()),
                Arc::clone(&transitioning),
            );
            Shared {
                mailbox: Mailbox::new(MailboxConfig::new(label.clone())),
                core: Mutex::new(core),
                parents: Arc::clone(&parents),
                state_tx,
                state_rx,
                transitioning,
                state_observers: Mutex::new(Vec::new()),
                error_observers: Mutex::new(Vec::new()),
                next_observer: AtomicU64::new(0),
                label,
            }
        });

        let agent = Self { shared };
        agent.enqueue_core(|core| core.start());
        info!(agent = %agent.label(), "agent started");
        Ok(agent)
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.shared.mailbox
    }

    /// The single dispatch entry: delivers one facade call to the worker.
    /// Returns before the call executes; value-returning variants are
    /// awaited through the [`Reply`] channel they carry.
    pub fn call(&self, call: B::Call) {
        trace!(agent = %self.label(), ?call, "call enqueued");
        self.enqueue_core(move |core| core.dispatch(call));
    }

    /// Fires a trigger from outside the worker.
    pub fn fire(&self, trigger: B::Trigger) {
        self.enqueue_core(move |core| core.fire(trigger));
    }

    /// Enqueues a closure over the behavior and its context.
    pub fn act(&self, f: impl FnOnce(&mut B, &mut AgentCx<B>) + Send + 'static) {
        self.enqueue_core(move |core| {
            let (behavior, cx) = core.cell_parts();
            f(behavior, cx);
        });
    }

    /// Like [`act`](Self::act) for fallible closures; a returned fault is
    /// routed through the agent's error policy.
    pub fn try_act(
        &self,
        f: impl FnOnce(&mut B, &mut AgentCx<B>) -> Result<(), Fault> + Send + 'static,
    ) {
        self.enqueue_core(move |core| {
            let (behavior, cx) = core.cell_parts();
            if let Err(fault) = f(behavior, cx) {
                core.admit(AgentError::Fault(fault));
            }
        });
    }

    /// Runs a closure against the whole core in one work item, so several
    /// dispatches and fires are observed atomically by other callers.
    pub fn atomically(&self, f: impl FnOnce(&mut AgentCore<B>) + Send + 'static) {
        self.enqueue_core(f);
    }

    /// Re-evaluates guard-driven transitions on the worker.
    pub fn update_states(&self) {
        self.enqueue_core(|core| core.update_states());
    }

    /// The current state, read from the mirror without entering the
    /// worker.
    pub fn state(&self) -> B::State {
        *self.shared.state_rx.borrow()
    }

    pub fn transitioning(&self) -> bool {
        self.shared.transitioning.load(Ordering::Acquire)
    }

    /// True iff `state` is the current state or one of its ancestors.
    pub fn in_state(&self, state: B::State) -> bool {
        chain_contains(&self.shared.parents, self.state(), state)
    }

    /// Waits until the agent is in `state` (directly or via a substate),
    /// or fails with [`AgentError::Timeout`].
    pub async fn wait_for_state(
        &self,
        state: B::State,
        timeout: Duration,
    ) -> Result<(), AgentError> {
        let parents = Arc::clone(&self.shared.parents);
        let mut rx = self.shared.state_tx.subscribe();
        let result = tokio::time::timeout(timeout, rx.wait_for(move |s| chain_contains(&parents, *s, state)))
            .await;
        match result {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(AgentError::Canceled),
            Err(_) => Err(AgentError::Timeout { waited: timeout }),
        }
    }

    /// Waits until every work item enqueued before this call has run.
    pub async fn sync(&self) {
        self.shared.mailbox.wait().await;
    }

    /// Subscribes to completed transitions. The observer runs on this
    /// agent's worker; an observer added during a notification does not
    /// see the transition being notified.
    pub fn observe_state(
        &self,
        observer: impl Fn(&StateChange<B::State, B::Trigger>) + Send + Sync + 'static,
    ) -> u64 {
        let id = self.shared.next_observer.fetch_add(1, Ordering::Relaxed);
        self.shared
            .state_observers
            .lock()
            .push((id, Arc::new(observer)));
        id
    }

    pub fn unobserve_state(&self, id: u64) {
        self.shared.state_observers.lock().retain(|(i, _)| *i != id);
    }

    /// Subscribes to errors admitted to this agent's error policy.
    pub fn observe_errors(&self, observer: impl Fn(&AgentError) + Send + Sync + 'static) -> u64 {
        let id = self.shared.next_observer.fetch_add(1, Ordering::Relaxed);
        self.shared
            .error_observers
            .lock()
            .push((id, Arc::new(observer)));
        id
    }

    pub fn unobserve_errors(&self, id: u64) {
        self.shared.error_observers.lock().retain(|(i, _)| *i != id);
    }

    /// A weak handle for storage inside timers and peer subscriptions.
    pub fn anchor(&self) -> Anchor<B> {
        Anchor {
            shared: Arc::downgrade(&self.shared),
        }
    }

    fn enqueue_core(&self, f: impl FnOnce(&mut AgentCore<B>) + Send + 'static) {
        let shared = Arc::clone(&self.shared);
        self.shared.mailbox.enqueue(move || {
            let mut core = shared.core.lock();
            f(&mut core);
        });
    }
}

impl<B: Behavior> std::fmt::Debug for Agent<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("label", &self.shared.label)
            .field("state", &self.state())
            .finish()
    }
}

/// Weak counterpart of [`Agent`]: operations silently become no-ops once
/// the agent is gone, which lets timers and subscriptions outlive it
/// harmlessly.
pub struct Anchor<B: Behavior> {
    pub(crate) shared: Weak<Shared<B>>,
}

impl<B: Behavior> Clone for Anchor<B> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<B: Behavior> Anchor<B> {
    pub fn agent(&self) -> Option<Agent<B>> {
        self.shared.upgrade().map(|shared| Agent { shared })
    }

    pub fn fire(&self, trigger: B::Trigger) {
        if let Some(agent) = self.agent() {
            agent.fire(trigger);
        } else {
            debug!(?trigger, "agent gone, trigger dropped");
        }
    }

    pub fn act(&self, f: impl FnOnce(&mut B, &mut AgentCx<B>) + Send + 'static) {
        if let Some(agent) = self.agent() {
            agent.act(f);
        }
    }

    pub(crate) fn act_core(&self, f: impl FnOnce(&mut AgentCore<B>) + Send + 'static) {
        if let Some(agent) = self.agent() {
            agent.enqueue_core(f);
        }
    }

    pub(crate) fn error_observers(&self) -> Vec<ErrorObserverFn> {
        self.shared
            .upgrade()
            .map(|shared| shared.error_observer_snapshot())
            .unwrap_or_default()
    }
}
