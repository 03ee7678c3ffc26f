//! # Conveyor Controller
//!
//! A belt that may only run while its loading door is fully open. The
//! controller holds the door's agent handle and wires two peer watches on
//! entering `Running`: one re-checks the door position on every change and
//! halts the belt when the door leaves `Open`, the other raises a
//! watched-state fault if the door trips into `Faulted`.

use std::time::Duration;

use hsm_actor::prelude::*;

use crate::door::{DoorController, DoorState};
use crate::model::ConveyorReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConveyorState {
    Standby,
    Running,
    Faulted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConveyorTrigger {
    StartCmd,
    HaltCmd,
    Trip,
    Reset,
}

#[derive(Debug)]
pub enum ConveyorCall {
    Start,
    Stop,
    Reset,
    Status { reply: Reply<ConveyorReport> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConveyorCommand {
    Start,
    Stop,
    Reset,
    Status,
}

pub struct ConveyorController {
    door: Agent<DoorController>,
    /// Belt speed in millimeters per second.
    speed: f64,
    advanced_mm: f64,
}

impl ConveyorController {
    pub fn new(door: Agent<DoorController>, speed: f64) -> Self {
        Self {
            door,
            speed,
            advanced_mm: 0.0,
        }
    }

    fn running_entered(
        &mut self,
        cx: &mut AgentCx<Self>,
        _change: &StateChange<ConveyorState, ConveyorTrigger>,
    ) -> Result<(), Fault> {
        cx.repeat_while_in_state(Duration::from_millis(10), |belt: &mut Self, _cx, elapsed| {
            belt.advanced_mm += belt.speed * elapsed;
        });

        let door = self.door.clone();
        cx.watch_peer_while_in_state(
            &door,
            ConveyorState::Running,
            |door_state, _change| door_state != DoorState::Open,
            |_belt, cx| cx.fire(ConveyorTrigger::HaltCmd),
        );
        cx.watch_peer_flagging(&door, ConveyorState::Running, DoorState::Faulted);
        Ok(())
    }
}

impl Behavior for ConveyorController {
    type State = ConveyorState;
    type Trigger = ConveyorTrigger;
    type Call = ConveyorCall;
    type Command = ConveyorCommand;

    fn command_of(call: &ConveyorCall) -> ConveyorCommand {
        match call {
            ConveyorCall::Start => ConveyorCommand::Start,
            ConveyorCall::Stop => ConveyorCommand::Stop,
            ConveyorCall::Reset => ConveyorCommand::Reset,
            ConveyorCall::Status { .. } => ConveyorCommand::Status,
        }
    }

    fn states(&self) -> MachineSpec<AgentCell<Self>, ConveyorState, ConveyorTrigger> {
        MachineSpec::new(ConveyorState::Standby)
            .state(
                StateSpec::new(ConveyorState::Standby)
                    .when(ConveyorTrigger::StartCmd, ConveyorState::Running)
                    .when(ConveyorTrigger::Trip, ConveyorState::Faulted),
            )
            .state(
                StateSpec::new(ConveyorState::Running)
                    .on_enter(hook(ConveyorController::running_entered))
                    .when(ConveyorTrigger::HaltCmd, ConveyorState::Standby)
                    .when(ConveyorTrigger::Trip, ConveyorState::Faulted),
            )
            .state(
                StateSpec::new(ConveyorState::Faulted)
                    .when(ConveyorTrigger::Reset, ConveyorState::Standby),
            )
    }

    fn commands() -> Vec<CommandRule<Self>> {
        vec![
            CommandRule::new(ConveyorCommand::Start).valid_in([ConveyorState::Standby]),
            CommandRule::new(ConveyorCommand::Stop)
                .valid_in([ConveyorState::Running])
                .fires(ConveyorTrigger::HaltCmd),
            CommandRule::new(ConveyorCommand::Reset)
                .valid_in([ConveyorState::Faulted])
                .fires(ConveyorTrigger::Reset),
        ]
    }

    fn handle(&mut self, call: ConveyorCall, cx: &mut AgentCx<Self>) -> Result<(), Fault> {
        match call {
            ConveyorCall::Start => {
                // the interlock: starting is only sensible with the door
                // fully open
                if !self.door.in_state(DoorState::Open) {
                    return Err(Fault::new("door is not open"));
                }
                cx.fire(ConveyorTrigger::StartCmd);
                Ok(())
            }
            ConveyorCall::Status { reply } => {
                let _ = reply.send(Ok(ConveyorReport {
                    state: format!("{:?}", cx.state()),
                    advanced_mm: self.advanced_mm,
                }));
                Ok(())
            }
            ConveyorCall::Stop | ConveyorCall::Reset => Ok(()),
        }
    }

    fn on_fault(&mut self, cx: &mut AgentCx<Self>, _error: &AgentError) {
        cx.fire(ConveyorTrigger::Trip);
    }

    fn reject(call: ConveyorCall, error: AgentError) {
        if let ConveyorCall::Status { reply } = call {
            let _ = reply.send(Err(error));
        }
    }
}
