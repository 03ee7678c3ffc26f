//! # Door Controller
//!
//! A powered door with travel deadlines and an obstruction budget.
//!
//! The interesting part is the state hierarchy: the four motion states are
//! substates of `Operational`, so the `Trip` transition and the command
//! validity of `Status` are declared once on the parent. Travel is
//! simulated with a lifecycle-scoped one-shot timer; a second, longer
//! deadline raises a timeout fault if the door jams mid-travel, and the
//! default fault policy trips the controller into `Faulted`.

use std::time::Duration;

use hsm_actor::prelude::*;
use tracing::info;

use crate::model::DoorReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DoorState {
    Idle,
    Operational,
    Opening,
    Open,
    Closing,
    Closed,
    Faulted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorTrigger {
    PowerOn,
    OpenCmd,
    CloseCmd,
    MotionDone,
    Trip,
    Reset,
}

#[derive(Debug)]
pub enum DoorCall {
    PowerOn,
    Open,
    Close,
    Reset,
    ReportObstruction,
    Status { reply: Reply<DoorReport> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DoorCommand {
    PowerOn,
    Open,
    Close,
    Reset,
    ReportObstruction,
    Status,
}

/// How many obstruction reports a closed door tolerates before faulting.
const OBSTRUCTION_LIMIT: u32 = 3;

pub struct DoorController {
    /// Simulated travel time between end positions.
    travel: Duration,
    /// Deadline after which an unfinished travel counts as a jam.
    deadline: Duration,
    motor_on: bool,
    jammed: bool,
    cycles: u32,
    obstructions: u32,
    open_seconds: f64,
}

impl DoorController {
    pub fn new(travel: Duration, deadline: Duration) -> Self {
        Self {
            travel,
            deadline,
            motor_on: false,
            jammed: false,
            cycles: 0,
            obstructions: 0,
            open_seconds: 0.0,
        }
    }

    /// Jam the mechanism: travel will never complete until reset.
    pub fn jam(&mut self) {
        self.jammed = true;
    }

    fn report(&self, state: DoorState) -> DoorReport {
        DoorReport {
            state: format!("{state:?}"),
            cycles: self.cycles,
            obstructions: self.obstructions,
            open_seconds: self.open_seconds,
        }
    }

    /// Shared by `Opening` and `Closing`: run the motor, finish travel
    /// after the simulated time, fault if the deadline passes first.
    fn motion_started(
        &mut self,
        cx: &mut AgentCx<Self>,
        _change: &StateChange<DoorState, DoorTrigger>,
    ) -> Result<(), Fault> {
        self.motor_on = true;
        let travel = self.travel;
        cx.timeout_while_in_state(travel, |door: &mut Self, cx| {
            if !door.jammed {
                cx.fire(DoorTrigger::MotionDone);
            }
        });
        cx.expire_while_in_state(self.deadline);
        Ok(())
    }

    fn motion_ended(
        &mut self,
        _cx: &mut AgentCx<Self>,
        _change: &StateChange<DoorState, DoorTrigger>,
    ) -> Result<(), Fault> {
        self.motor_on = false;
        Ok(())
    }

    fn open_entered(
        &mut self,
        cx: &mut AgentCx<Self>,
        _change: &StateChange<DoorState, DoorTrigger>,
    ) -> Result<(), Fault> {
        self.cycles += 1;
        cx.repeat_while_in_state(Duration::from_millis(20), |door: &mut Self, _cx, elapsed| {
            door.open_seconds += elapsed;
        });
        Ok(())
    }

    fn faulted_entered(
        &mut self,
        _cx: &mut AgentCx<Self>,
        change: &StateChange<DoorState, DoorTrigger>,
    ) -> Result<(), Fault> {
        self.motor_on = false;
        info!(from = ?change.from, "door locked out");
        Ok(())
    }

    fn reset_setup(
        &mut self,
        _cx: &mut AgentCx<Self>,
        _target: DoorState,
    ) -> Result<(), Fault> {
        self.jammed = false;
        self.obstructions = 0;
        Ok(())
    }
}

impl Behavior for DoorController {
    type State = DoorState;
    type Trigger = DoorTrigger;
    type Call = DoorCall;
    type Command = DoorCommand;

    fn command_of(call: &DoorCall) -> DoorCommand {
        match call {
            DoorCall::PowerOn => DoorCommand::PowerOn,
            DoorCall::Open => DoorCommand::Open,
            DoorCall::Close => DoorCommand::Close,
            DoorCall::Reset => DoorCommand::Reset,
            DoorCall::ReportObstruction => DoorCommand::ReportObstruction,
            DoorCall::Status { .. } => DoorCommand::Status,
        }
    }

    fn states(&self) -> MachineSpec<AgentCell<Self>, DoorState, DoorTrigger> {
        MachineSpec::new(DoorState::Idle)
            .state(StateSpec::new(DoorState::Idle).when(DoorTrigger::PowerOn, DoorState::Closed))
            .state(
                StateSpec::new(DoorState::Operational)
                    .when(DoorTrigger::Trip, DoorState::Faulted),
            )
            .state(
                StateSpec::new(DoorState::Closed)
                    .parent(DoorState::Operational)
                    .when(DoorTrigger::OpenCmd, DoorState::Opening)
                    .auto(
                        DoorState::Faulted,
                        guard(|door: &DoorController| door.obstructions >= OBSTRUCTION_LIMIT),
                    ),
            )
            .state(
                StateSpec::new(DoorState::Opening)
                    .parent(DoorState::Operational)
                    .on_enter(hook(DoorController::motion_started))
                    .on_exit(hook(DoorController::motion_ended))
                    .when(DoorTrigger::MotionDone, DoorState::Open),
            )
            .state(
                StateSpec::new(DoorState::Open)
                    .parent(DoorState::Operational)
                    .on_enter(hook(DoorController::open_entered))
                    .when(DoorTrigger::CloseCmd, DoorState::Closing),
            )
            .state(
                StateSpec::new(DoorState::Closing)
                    .parent(DoorState::Operational)
                    .on_enter(hook(DoorController::motion_started))
                    .on_exit(hook(DoorController::motion_ended))
                    .when(DoorTrigger::MotionDone, DoorState::Closed),
            )
            .state(
                StateSpec::new(DoorState::Faulted)
                    .on_enter(hook(DoorController::faulted_entered))
                    .transition(
                        TransitionSpec::on(DoorTrigger::Reset, DoorState::Closed)
                            .with_setup(setup(DoorController::reset_setup)),
                    ),
            )
    }

    fn commands() -> Vec<CommandRule<Self>> {
        vec![
            CommandRule::new(DoorCommand::PowerOn)
                .valid_in([DoorState::Idle])
                .fires(DoorTrigger::PowerOn),
            CommandRule::new(DoorCommand::Open)
                .valid_in([DoorState::Closed])
                .fires(DoorTrigger::OpenCmd),
            CommandRule::new(DoorCommand::Close)
                .valid_in([DoorState::Open])
                .fires(DoorTrigger::CloseCmd),
            CommandRule::new(DoorCommand::Reset)
                .valid_in([DoorState::Faulted])
                .fires(DoorTrigger::Reset),
        ]
    }

    fn handle(&mut self, call: DoorCall, cx: &mut AgentCx<Self>) -> Result<(), Fault> {
        match call {
            DoorCall::ReportObstruction => {
                self.obstructions += 1;
                cx.update_states();
                Ok(())
            }
            DoorCall::Status { reply } => {
                let _ = reply.send(Ok(self.report(cx.state())));
                Ok(())
            }
            // trigger-routed commands never reach the handler
            _ => Ok(()),
        }
    }

    fn on_fault(&mut self, cx: &mut AgentCx<Self>, _error: &AgentError) {
        cx.fire(DoorTrigger::Trip);
    }

    fn reject(call: DoorCall, error: AgentError) {
        if let DoorCall::Status { reply } = call {
            let _ = reply.send(Err(error));
        }
    }
}

impl Default for DoorController {
    fn default() -> Self {
        Self::new(Duration::from_millis(30), Duration::from_millis(200))
    }
}
