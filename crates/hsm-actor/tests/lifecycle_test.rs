//! Tests for lifecycle-scoped watchers, timers, peer watches and
//! continuations.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use hsm_actor::prelude::*;

mod rig;
use rig::{Rig, RigCall, RigState, RigTrigger};

fn spawn_rig() -> (Agent<Rig>, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let agent = Agent::spawn("rig", Rig::new(Arc::clone(&log))).unwrap();
    (agent, log)
}

async fn spawn_running() -> (Agent<Rig>, Arc<Mutex<Vec<String>>>) {
    let (agent, log) = spawn_rig();
    agent.call(RigCall::Start);
    agent
        .wait_for_state(RigState::Running, Duration::from_secs(1))
        .await
        .unwrap();
    (agent, log)
}

#[tokio::test]
async fn watcher_fires_once_on_leaving_its_state() {
    let (agent, _log) = spawn_running().await;
    let fired = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&fired);
    agent.act(move |_rig, cx| {
        cx.watch_state(RigState::Running, move |_rig, _cx| {
            count.fetch_add(1, Ordering::SeqCst);
        });
    });

    agent.fire(RigTrigger::Pause);
    agent.sync().await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // back and out again: the watcher was one-shot
    agent.act(|rig, cx| {
        rig.auto_resume = true;
        cx.update_states();
    });
    agent.fire(RigTrigger::Pause);
    agent.sync().await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn watcher_for_inactive_state_fires_immediately() {
    let (agent, _log) = spawn_running().await;
    let fired = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&fired);
    agent.act(move |_rig, cx| {
        cx.watch_state(RigState::Broken, move |_rig, _cx| {
            count.fetch_add(1, Ordering::SeqCst);
        });
    });
    agent.sync().await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn watcher_on_ancestor_survives_sibling_moves() {
    let (agent, _log) = spawn_running().await;
    let fired = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&fired);
    agent.act(move |_rig, cx| {
        cx.watch_state(RigState::Started, move |_rig, _cx| {
            count.fetch_add(1, Ordering::SeqCst);
        });
    });

    // Running -> Paused stays inside Started
    agent.fire(RigTrigger::Pause);
    agent.sync().await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    agent.fire(RigTrigger::Halt);
    agent.sync().await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn repeating_timer_stops_with_its_scope_state() {
    let (agent, _log) = spawn_running().await;
    let ticks = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&ticks);
    agent.act(move |_rig, cx| {
        cx.repeat_while_in_state(Duration::from_millis(10), move |_rig, _cx, elapsed| {
            assert!(elapsed > 0.0);
            count.fetch_add(1, Ordering::SeqCst);
        });
    });

    tokio::time::sleep(Duration::from_millis(120)).await;
    agent.fire(RigTrigger::Pause);
    agent.sync().await;
    let at_exit = ticks.load(Ordering::SeqCst);
    assert!(at_exit > 0);

    tokio::time::sleep(Duration::from_millis(120)).await;
    agent.sync().await;
    assert_eq!(ticks.load(Ordering::SeqCst), at_exit);
}

#[tokio::test]
async fn one_shot_timeout_delivers_at_most_once() {
    let (agent, _log) = spawn_running().await;
    let fired = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&fired);
    agent.act(move |_rig, cx| {
        cx.timeout_while_in_state(Duration::from_millis(20), move |_rig, _cx| {
            count.fetch_add(1, Ordering::SeqCst);
        });
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    agent.sync().await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn one_shot_timeout_is_canceled_by_leaving_scope() {
    let (agent, _log) = spawn_running().await;
    let fired = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&fired);
    agent.act(move |_rig, cx| {
        cx.timeout_scoped(Duration::from_millis(80), RigState::Running, move |_rig, _cx| {
            count.fetch_add(1, Ordering::SeqCst);
        });
    });

    agent.fire(RigTrigger::Pause);
    agent.sync().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    agent.sync().await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn expiry_raises_a_timeout_fault() {
    let (agent, _log) = spawn_running().await;
    let errors = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&errors);
    agent.observe_errors(move |error| seen.lock().push(error.to_string()));

    agent.act(|_rig, cx| {
        cx.expire_while_in_state(Duration::from_millis(20));
    });

    // on_timeout defaults to on_fault, which trips the rig
    agent
        .wait_for_state(RigState::Broken, Duration::from_secs(1))
        .await
        .unwrap();
    assert!(errors.lock()[0].contains("deadline"));
}

#[tokio::test]
async fn peer_watch_updates_follower_guards() {
    let (leader, _leader_log) = spawn_running().await;
    let (follower, _log) = spawn_running().await;

    // the follower pauses itself and resumes only once the leader stops
    let watched = leader.clone();
    follower.act(move |rig, cx| {
        rig.auto_resume = false;
        cx.watch_peer_while_in_state(
            &watched,
            RigState::Started,
            |peer_state, _change| peer_state == RigState::Stopping,
            |rig, _cx| rig.auto_resume = true,
        );
        cx.watch_peer(&watched, RigState::Started);
    });
    follower.fire(RigTrigger::Pause);
    follower.sync().await;
    assert_eq!(follower.state(), RigState::Paused);

    leader.fire(RigTrigger::Halt);
    leader
        .wait_for_state(RigState::Stopping, Duration::from_secs(1))
        .await
        .unwrap();

    // the condition action set the flag, the update watch re-scanned guards
    follower
        .wait_for_state(RigState::Running, Duration::from_secs(1))
        .await
        .unwrap();
}

#[tokio::test]
async fn peer_entering_flagged_state_raises_watched_state_fault() {
    let (leader, _leader_log) = spawn_running().await;
    let (follower, _log) = spawn_running().await;

    let watched = leader.clone();
    follower.act(move |_rig, cx| {
        cx.watch_peer_flagging(&watched, RigState::Started, RigState::Broken);
    });
    follower.sync().await;

    let errors = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&errors);
    follower.observe_errors(move |error| seen.lock().push(error.to_string()));

    leader.call(RigCall::Jam);
    leader
        .wait_for_state(RigState::Broken, Duration::from_secs(1))
        .await
        .unwrap();

    // watched-state faults route through on_fault, tripping the follower
    follower
        .wait_for_state(RigState::Broken, Duration::from_secs(1))
        .await
        .unwrap();
    assert!(errors.lock().iter().any(|e| e.contains("watched peer")));
}

#[tokio::test]
async fn peer_already_in_flagged_state_faults_on_registration() {
    let (leader, _leader_log) = spawn_running().await;
    leader.call(RigCall::Jam);
    leader
        .wait_for_state(RigState::Broken, Duration::from_secs(1))
        .await
        .unwrap();

    let (follower, _log) = spawn_running().await;
    let watched = leader.clone();
    follower.act(move |_rig, cx| {
        cx.watch_peer_flagging(&watched, RigState::Started, RigState::Broken);
    });

    follower
        .wait_for_state(RigState::Broken, Duration::from_secs(1))
        .await
        .unwrap();
}

#[tokio::test]
async fn continuation_runs_only_in_scope() {
    let (agent, _log) = spawn_running().await;
    let delivered = Arc::new(AtomicUsize::new(0));

    let count = Arc::clone(&delivered);
    agent.act(move |_rig, cx| {
        let task = tokio::spawn(async { 5usize });
        cx.continue_while_in_state(task, move |_rig, _cx, result| {
            count.fetch_add(result, Ordering::SeqCst);
        });
    });
    agent.sync().await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    agent.sync().await;
    assert_eq!(delivered.load(Ordering::SeqCst), 5);

    // a slow task finishing after the scope state was left is dropped
    let count = Arc::clone(&delivered);
    agent.act(move |_rig, cx| {
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            100usize
        });
        cx.continue_scoped(task, RigState::Running, move |_rig, _cx, result| {
            count.fetch_add(result, Ordering::SeqCst);
        });
    });
    agent.fire(RigTrigger::Pause);
    agent.sync().await;
    tokio::time::sleep(Duration::from_millis(120)).await;
    agent.sync().await;
    assert_eq!(delivered.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn canceled_continuation_surfaces_as_error() {
    let (agent, _log) = spawn_running().await;
    let errors = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&errors);
    agent.observe_errors(move |error| seen.lock().push(error.to_string()));

    agent.act(|_rig, cx| {
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        task.abort();
        cx.continue_while_in_state(task, |_rig, _cx, _result| {});
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    agent.sync().await;
    assert!(errors.lock().iter().any(|e| e.contains("canceled")));
}
