//! # Typed Client Trait
//!
//! Wrapper clients give an agent a domain-specific API: a struct holding
//! the [`Agent`] handle with one method per facade call. [`AgentClient`]
//! provides the operations every such wrapper wants, so implementors only
//! write the domain methods.

use std::time::Duration;

use async_trait::async_trait;

use crate::agent::Agent;
use crate::behavior::Behavior;
use crate::error::AgentError;

/// Trait for agent-specific client wrappers to inherit standard
/// operations.
///
/// ```ignore
/// struct DoorClient { agent: Agent<DoorController> }
///
/// impl AgentClient<DoorController> for DoorClient {
///     fn agent(&self) -> &Agent<DoorController> {
///         &self.agent
///     }
/// }
/// ```
#[async_trait]
pub trait AgentClient<B: Behavior>: Send + Sync {
    /// Access the underlying agent handle.
    fn agent(&self) -> &Agent<B>;

    /// The agent's current state.
    fn state(&self) -> B::State {
        self.agent().state()
    }

    /// Whether the agent currently occupies `state` or one of its
    /// substates.
    fn in_state(&self, state: B::State) -> bool {
        self.agent().in_state(state)
    }

    /// Waits until the agent reaches `state`.
    #[tracing::instrument(skip(self))]
    async fn wait_for_state(&self, state: B::State, timeout: Duration) -> Result<(), AgentError> {
        tracing::debug!("waiting for state");
        self.agent().wait_for_state(state, timeout).await
    }

    /// Waits until every work item enqueued so far has run.
    async fn sync(&self) {
        self.agent().sync().await;
    }
}
