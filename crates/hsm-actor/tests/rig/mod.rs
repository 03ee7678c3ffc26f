//! A small machine-automation behavior shared by the integration tests.
//!
//! Hierarchy: `Running` and `Paused` are substates of `Started`;
//! `Unstarted`, `Stopping` and `Broken` are roots.

use std::sync::Arc;

use parking_lot::Mutex;

use hsm_actor::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RigState {
    Unstarted,
    Started,
    Running,
    Paused,
    Stopping,
    Broken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RigTrigger {
    Start,
    Halt,
    Pause,
    Trip,
    Reset,
}

#[derive(Debug)]
pub enum RigCall {
    Start,
    Halt,
    Nudge,
    Jam,
    Report { reply: Reply<u32> },
    Counter { reply: Reply<usize> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RigCommand {
    Start,
    Halt,
    Nudge,
    Jam,
    Report,
    Counter,
}

pub struct Rig {
    pub log: Arc<Mutex<Vec<String>>>,
    pub counter: usize,
    pub report: u32,
    pub auto_resume: bool,
}

impl Rig {
    pub fn new(log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            log,
            counter: 0,
            report: 0,
            auto_resume: false,
        }
    }

    fn note(&self, event: impl Into<String>) {
        self.log.lock().push(event.into());
    }

    fn started_entered(
        &mut self,
        _cx: &mut AgentCx<Self>,
        _change: &StateChange<RigState, RigTrigger>,
    ) -> Result<(), Fault> {
        self.report += 1;
        self.note("enter(Started)");
        Ok(())
    }

    fn started_exited(
        &mut self,
        _cx: &mut AgentCx<Self>,
        _change: &StateChange<RigState, RigTrigger>,
    ) -> Result<(), Fault> {
        self.note("exit(Started)");
        Ok(())
    }

    fn running_entered(
        &mut self,
        _cx: &mut AgentCx<Self>,
        _change: &StateChange<RigState, RigTrigger>,
    ) -> Result<(), Fault> {
        self.note("enter(Running)");
        Ok(())
    }

    fn running_exited(
        &mut self,
        _cx: &mut AgentCx<Self>,
        _change: &StateChange<RigState, RigTrigger>,
    ) -> Result<(), Fault> {
        self.note("exit(Running)");
        Ok(())
    }
}

impl Behavior for Rig {
    type State = RigState;
    type Trigger = RigTrigger;
    type Call = RigCall;
    type Command = RigCommand;

    fn command_of(call: &RigCall) -> RigCommand {
        match call {
            RigCall::Start => RigCommand::Start,
            RigCall::Halt => RigCommand::Halt,
            RigCall::Nudge => RigCommand::Nudge,
            RigCall::Jam => RigCommand::Jam,
            RigCall::Report { .. } => RigCommand::Report,
            RigCall::Counter { .. } => RigCommand::Counter,
        }
    }

    fn states(&self) -> MachineSpec<AgentCell<Self>, RigState, RigTrigger> {
        MachineSpec::new(RigState::Unstarted)
            .state(StateSpec::new(RigState::Unstarted).when(RigTrigger::Start, RigState::Running))
            .state(
                StateSpec::new(RigState::Started)
                    .on_enter(hook(Rig::started_entered))
                    .on_exit(hook(Rig::started_exited))
                    .when(RigTrigger::Halt, RigState::Stopping)
                    .when(RigTrigger::Trip, RigState::Broken),
            )
            .state(
                StateSpec::new(RigState::Running)
                    .parent(RigState::Started)
                    .on_enter(hook(Rig::running_entered))
                    .on_exit(hook(Rig::running_exited))
                    .when(RigTrigger::Pause, RigState::Paused),
            )
            .state(
                StateSpec::new(RigState::Paused)
                    .parent(RigState::Started)
                    .auto(RigState::Running, guard(|rig: &Rig| rig.auto_resume)),
            )
            .state(StateSpec::new(RigState::Stopping).when(RigTrigger::Reset, RigState::Unstarted))
            .state(StateSpec::new(RigState::Broken).when(RigTrigger::Reset, RigState::Unstarted))
    }

    fn commands() -> Vec<CommandRule<Self>> {
        vec![
            CommandRule::new(RigCommand::Start)
                .valid_in([RigState::Unstarted])
                .fires(RigTrigger::Start),
            CommandRule::new(RigCommand::Halt)
                .valid_in([RigState::Started])
                .fires(RigTrigger::Halt),
            CommandRule::new(RigCommand::Report).valid_in([RigState::Started]),
        ]
    }

    fn handle(&mut self, call: RigCall, cx: &mut AgentCx<Self>) -> Result<(), Fault> {
        match call {
            RigCall::Nudge => {
                self.auto_resume = true;
                cx.update_states();
                Ok(())
            }
            RigCall::Jam => Err(Fault::new("belt jammed")),
            RigCall::Report { reply } => {
                let _ = reply.send(Ok(self.report));
                Ok(())
            }
            RigCall::Counter { reply } => {
                let _ = reply.send(Ok(self.counter));
                Ok(())
            }
            RigCall::Start | RigCall::Halt => Ok(()),
        }
    }

    fn on_fault(&mut self, cx: &mut AgentCx<Self>, _error: &AgentError) {
        cx.fire(RigTrigger::Trip);
    }

    fn on_unhandled_trigger(&mut self, _cx: &mut AgentCx<Self>, trigger: RigTrigger) {
        self.note(format!("unhandled({trigger:?})"));
    }

    fn reject(call: RigCall, error: AgentError) {
        match call {
            RigCall::Report { reply } => {
                let _ = reply.send(Err(error));
            }
            RigCall::Counter { reply } => {
                let _ = reply.send(Err(error));
            }
            _ => {}
        }
    }
}
