//! End-to-end tests for agent dispatch, command validity and ordering.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use hsm_actor::prelude::*;

mod rig;
use rig::{Rig, RigCall, RigState, RigTrigger};

fn spawn_rig() -> (Agent<Rig>, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let agent = Agent::spawn("rig", Rig::new(Arc::clone(&log))).unwrap();
    (agent, log)
}

#[tokio::test]
async fn starts_in_initial_state() {
    let (agent, _log) = spawn_rig();
    agent.sync().await;
    assert_eq!(agent.state(), RigState::Unstarted);
    assert!(!agent.transitioning());
}

#[tokio::test]
async fn command_fires_trigger_and_reaches_target_state() {
    let (agent, log) = spawn_rig();
    agent.call(RigCall::Start);
    agent
        .wait_for_state(RigState::Started, Duration::from_secs(1))
        .await
        .unwrap();
    agent.sync().await;
    assert_eq!(log.lock().as_slice(), ["enter(Started)", "enter(Running)"]);
}

#[tokio::test]
async fn invalid_command_is_rejected_and_leaves_state_unchanged() {
    let (agent, _log) = spawn_rig();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&errors);
    agent.observe_errors(move |error| seen.lock().push(error.to_string()));

    // Halt is only valid in Started
    agent.call(RigCall::Halt);
    agent.sync().await;

    assert_eq!(agent.state(), RigState::Unstarted);
    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Halt"));
    assert!(errors[0].contains("not valid"));
}

#[tokio::test]
async fn command_validity_matches_ancestor_states() {
    let (agent, _log) = spawn_rig();
    agent.call(RigCall::Start);
    agent
        .wait_for_state(RigState::Running, Duration::from_secs(1))
        .await
        .unwrap();

    // Halt is declared valid in Started; Running is a substate of Started
    agent.call(RigCall::Halt);
    agent
        .wait_for_state(RigState::Stopping, Duration::from_secs(1))
        .await
        .unwrap();
}

#[tokio::test]
async fn rejected_value_call_delivers_the_error() {
    let (agent, _log) = spawn_rig();
    let (reply, response) = oneshot::channel();
    agent.call(RigCall::Report { reply });

    let error = response.await.unwrap().unwrap_err();
    assert!(matches!(error, AgentError::InvalidCommand { .. }));
}

#[tokio::test]
async fn value_call_round_trips_on_the_worker() {
    let (agent, _log) = spawn_rig();
    agent.call(RigCall::Start);
    agent
        .wait_for_state(RigState::Started, Duration::from_secs(1))
        .await
        .unwrap();

    let (reply, response) = oneshot::channel();
    agent.call(RigCall::Report { reply });
    assert_eq!(response.await.unwrap().unwrap(), 1);
}

#[tokio::test]
async fn acts_run_in_enqueue_order() {
    let (agent, _log) = spawn_rig();
    for expected in 0..1000usize {
        agent.act(move |rig, _cx| {
            assert_eq!(rig.counter, expected);
            rig.counter += 1;
        });
    }
    let (reply, response) = oneshot::channel();
    agent.call(RigCall::Counter { reply });
    assert_eq!(response.await.unwrap().unwrap(), 1000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_serialize_without_loss() {
    let (agent, _log) = spawn_rig();
    let mut tasks = Vec::new();
    for _ in 0..10 {
        let agent = agent.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..100 {
                agent.act(|rig, _cx| rig.counter += 1);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    agent.sync().await;

    let (reply, response) = oneshot::channel();
    agent.call(RigCall::Counter { reply });
    assert_eq!(response.await.unwrap().unwrap(), 1000);
}

#[tokio::test]
async fn void_call_returns_before_the_work_runs() {
    let (agent, _log) = spawn_rig();
    let ran = Arc::new(AtomicUsize::new(0));
    let flag = Arc::clone(&ran);
    agent.act(move |_rig, _cx| {
        flag.fetch_add(1, Ordering::SeqCst);
    });
    // single-threaded runtime: nothing can have run before the next await
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    agent.sync().await;
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn guard_reevaluation_chains_after_nudge() {
    let (agent, _log) = spawn_rig();
    agent.call(RigCall::Start);
    agent
        .wait_for_state(RigState::Running, Duration::from_secs(1))
        .await
        .unwrap();
    agent.fire(RigTrigger::Pause);
    agent
        .wait_for_state(RigState::Paused, Duration::from_secs(1))
        .await
        .unwrap();

    // Nudge sets the auto-resume flag and requests a guard scan
    agent.call(RigCall::Nudge);
    agent
        .wait_for_state(RigState::Running, Duration::from_secs(1))
        .await
        .unwrap();
}

#[tokio::test]
async fn atomically_batches_multiple_dispatches() {
    let (agent, _log) = spawn_rig();
    let probe = agent.clone();
    agent.atomically(move |core| {
        core.fire(RigTrigger::Start);
        core.fire(RigTrigger::Pause);
        // both transitions landed inside one work item
        assert_eq!(core.state(), RigState::Paused);
        assert_eq!(probe.state(), RigState::Paused);
    });
    agent.sync().await;
    assert_eq!(agent.state(), RigState::Paused);
}

#[tokio::test]
async fn external_observers_see_every_change_in_order() {
    let (agent, _log) = spawn_rig();
    let changes = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&changes);
    agent.observe_state(move |change| seen.lock().push((change.from, change.to)));

    agent.call(RigCall::Start);
    agent
        .wait_for_state(RigState::Running, Duration::from_secs(1))
        .await
        .unwrap();
    agent.fire(RigTrigger::Pause);
    agent.sync().await;

    assert_eq!(
        changes.lock().as_slice(),
        [
            (RigState::Unstarted, RigState::Running),
            (RigState::Running, RigState::Paused)
        ]
    );
}

#[tokio::test]
async fn unobserved_state_waits_time_out() {
    let (agent, _log) = spawn_rig();
    let error = agent
        .wait_for_state(RigState::Broken, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(error, AgentError::Timeout { .. }));
}

#[tokio::test]
async fn unhandled_trigger_is_surfaced_without_a_state_change() {
    let (agent, log) = spawn_rig();
    // Reset matches nothing while Unstarted
    agent.fire(RigTrigger::Reset);
    agent.sync().await;
    assert_eq!(agent.state(), RigState::Unstarted);
    assert_eq!(log.lock().as_slice(), ["unhandled(Reset)"]);
}

#[tokio::test]
async fn handler_fault_reaches_observers_and_fault_hook() {
    let (agent, _log) = spawn_rig();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&errors);
    agent.observe_errors(move |error| seen.lock().push(error.to_string()));

    agent.call(RigCall::Start);
    agent
        .wait_for_state(RigState::Started, Duration::from_secs(1))
        .await
        .unwrap();

    // Jam's handler returns a fault; on_fault fires Trip
    agent.call(RigCall::Jam);
    agent
        .wait_for_state(RigState::Broken, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(errors.lock().as_slice(), ["belt jammed"]);
}
