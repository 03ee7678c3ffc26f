//! Typed clients wrapping the controller agents.
//!
//! Callers hold one of these instead of a raw [`Agent`]: every facade call
//! becomes a domain method, and value-returning calls await their reply
//! channel.

use async_trait::async_trait;
use hsm_actor::prelude::*;
use tokio::sync::oneshot;

use crate::conveyor::{ConveyorCall, ConveyorController};
use crate::door::{DoorCall, DoorController};
use crate::model::{ConveyorReport, DoorReport};

/// Errors surfaced to controller clients.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error("controller dropped the call")]
    Dropped,
}

pub struct DoorClient {
    agent: Agent<DoorController>,
}

#[async_trait]
impl AgentClient<DoorController> for DoorClient {
    fn agent(&self) -> &Agent<DoorController> {
        &self.agent
    }
}

impl DoorClient {
    pub fn new(agent: Agent<DoorController>) -> Self {
        Self { agent }
    }

    pub fn power_on(&self) {
        self.agent.call(DoorCall::PowerOn);
    }

    pub fn open(&self) {
        self.agent.call(DoorCall::Open);
    }

    pub fn close(&self) {
        self.agent.call(DoorCall::Close);
    }

    pub fn reset(&self) {
        self.agent.call(DoorCall::Reset);
    }

    pub fn report_obstruction(&self) {
        self.agent.call(DoorCall::ReportObstruction);
    }

    #[tracing::instrument(skip(self))]
    pub async fn status(&self) -> Result<DoorReport, ControlError> {
        let (reply, response) = oneshot::channel();
        self.agent.call(DoorCall::Status { reply });
        Ok(response.await.map_err(|_| ControlError::Dropped)??)
    }
}

pub struct ConveyorClient {
    agent: Agent<ConveyorController>,
}

#[async_trait]
impl AgentClient<ConveyorController> for ConveyorClient {
    fn agent(&self) -> &Agent<ConveyorController> {
        &self.agent
    }
}

impl ConveyorClient {
    pub fn new(agent: Agent<ConveyorController>) -> Self {
        Self { agent }
    }

    pub fn start(&self) {
        self.agent.call(ConveyorCall::Start);
    }

    pub fn stop(&self) {
        self.agent.call(ConveyorCall::Stop);
    }

    pub fn reset(&self) {
        self.agent.call(ConveyorCall::Reset);
    }

    #[tracing::instrument(skip(self))]
    pub async fn status(&self) -> Result<ConveyorReport, ControlError> {
        let (reply, response) = oneshot::channel();
        self.agent.call(ConveyorCall::Status { reply });
        Ok(response.await.map_err(|_| ControlError::Dropped)??)
    }
}
