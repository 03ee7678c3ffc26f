//! # hsm-actor
//!
//! A lightweight actor runtime for machine-control systems, built from
//! three tightly coupled pieces:
//!
//! 1. **[`Mailbox`]** - a serialized work queue. Everything an agent does
//!    runs as work items on its own mailbox, one at a time, making every
//!    agent a logical single-threaded island with lock-free `&mut` access
//!    to its state.
//! 2. **[`hfsm`]** - hierarchical state machines with guarded transitions,
//!    enter/exit hooks, automatic guard re-evaluation and
//!    least-common-ancestor crossing semantics.
//! 3. **[`Agent`]** - the stateful actor binding the two: a typed
//!    message-passing facade whose calls are validated against a
//!    per-state command table and either translated into trigger fires or
//!    dispatched to handler bodies on the worker.
//!
//! ## Concurrency model
//!
//! Each agent owns a mailbox; the mailbox owns at most one worker task;
//! all agent state (behavior, machine, watchers) is touched exclusively by
//! that worker. Handles are cheap to clone and callable from anywhere.
//! Within one agent, delivery order equals enqueue order. Timers and peer
//! subscriptions fire on ambient tasks and always re-enter the agent
//! through its mailbox.
//!
//! ## Example
//!
//! ```
//! use hsm_actor::prelude::*;
//! use hsm_actor::Reply;
//! use std::time::Duration;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum ValveState { Closed, Open }
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! enum ValveTrigger { OpenCmd, CloseCmd }
//!
//! #[derive(Debug)]
//! enum ValveCall {
//!     Open,
//!     Close,
//!     Cycles { reply: Reply<u32> },
//! }
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
//! enum ValveCommand { Open, Close, Cycles }
//!
//! struct Valve { cycles: u32 }
//!
//! impl Behavior for Valve {
//!     type State = ValveState;
//!     type Trigger = ValveTrigger;
//!     type Call = ValveCall;
//!     type Command = ValveCommand;
//!
//!     fn command_of(call: &ValveCall) -> ValveCommand {
//!         match call {
//!             ValveCall::Open => ValveCommand::Open,
//!             ValveCall::Close => ValveCommand::Close,
//!             ValveCall::Cycles { .. } => ValveCommand::Cycles,
//!         }
//!     }
//!
//!     fn states(&self) -> MachineSpec<AgentCell<Self>, ValveState, ValveTrigger> {
//!         MachineSpec::new(ValveState::Closed)
//!             .state(
//!                 StateSpec::new(ValveState::Closed)
//!                     .when(ValveTrigger::OpenCmd, ValveState::Open),
//!             )
//!             .state(
//!                 StateSpec::new(ValveState::Open)
//!                     .on_enter(hook(|valve: &mut Valve, _cx, _change| {
//!                         valve.cycles += 1;
//!                         Ok(())
//!                     }))
//!                     .when(ValveTrigger::CloseCmd, ValveState::Closed),
//!             )
//!     }
//!
//!     fn commands() -> Vec<CommandRule<Self>> {
//!         vec![
//!             CommandRule::new(ValveCommand::Open)
//!                 .valid_in([ValveState::Closed])
//!                 .fires(ValveTrigger::OpenCmd),
//!             CommandRule::new(ValveCommand::Close)
//!                 .valid_in([ValveState::Open])
//!                 .fires(ValveTrigger::CloseCmd),
//!         ]
//!     }
//!
//!     fn handle(&mut self, call: ValveCall, _cx: &mut AgentCx<Self>) -> Result<(), Fault> {
//!         if let ValveCall::Cycles { reply } = call {
//!             let _ = reply.send(Ok(self.cycles));
//!         }
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let valve = Agent::spawn("valve", Valve { cycles: 0 }).unwrap();
//!
//! valve.call(ValveCall::Open);
//! valve
//!     .wait_for_state(ValveState::Open, Duration::from_secs(1))
//!     .await
//!     .unwrap();
//!
//! let (reply, response) = tokio::sync::oneshot::channel();
//! valve.call(ValveCall::Cycles { reply });
//! assert_eq!(response.await.unwrap().unwrap(), 1);
//! # }
//! ```
//!
//! ## Error policy
//!
//! Every work item runs through the agent's error policy: errors notify
//! the error observers, then dispatch by kind to the behavior's
//! `on_timeout` / `on_fault` / `on_error` hooks. Errors never cross agent
//! boundaries except via explicit observers or state transitions the agent
//! chooses to make in response.

pub mod agent;
pub mod behavior;
pub mod client;
pub mod command;
pub mod context;
pub mod core;
pub mod error;
pub mod hfsm;
pub mod mailbox;

pub use agent::{Agent, Anchor, ErrorObserverFn, Reply, StateObserverFn};
pub use behavior::{guard, hook, setup, Behavior};
pub use client::AgentClient;
pub use command::CommandRule;
pub use context::AgentCx;
pub use core::{AgentCell, AgentCore};
pub use error::{AgentError, ConfigError, Fault, MailboxError};
pub use hfsm::{Machine, MachineSpec, StateChange, StateSpec, TransitionSpec};
pub use mailbox::{Mailbox, MailboxConfig};

/// Convenient imports for implementing and driving agents.
pub mod prelude {
    pub use crate::agent::{Agent, Anchor, Reply};
    pub use crate::behavior::{guard, hook, setup, Behavior};
    pub use crate::client::AgentClient;
    pub use crate::command::CommandRule;
    pub use crate::context::AgentCx;
    pub use crate::core::{AgentCell, AgentCore};
    pub use crate::error::{AgentError, ConfigError, Fault};
    pub use crate::hfsm::{MachineSpec, StateChange, StateSpec, TransitionSpec};
    pub use crate::mailbox::{Mailbox, MailboxConfig};
}
