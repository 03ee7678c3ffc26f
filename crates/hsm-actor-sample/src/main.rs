//! Demo: a door/conveyor cell going through a normal cycle, a jam, and a
//! recovery.
//!
//! ```bash
//! RUST_LOG=info cargo run -p hsm-actor-sample
//! ```

use std::time::Duration;

use hsm_actor::prelude::*;
use tracing::info;

use hsm_actor_sample::conveyor::ConveyorController;
use hsm_actor_sample::door::{DoorController, DoorState};
use hsm_actor_sample::lifecycle::setup_tracing;
use hsm_actor_sample::{ConveyorClient, ConveyorState, DoorClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_tracing();

    let door_agent = Agent::spawn("door", DoorController::default())?;
    let conveyor_agent = Agent::spawn(
        "conveyor",
        ConveyorController::new(door_agent.clone(), 250.0),
    )?;
    let door = DoorClient::new(door_agent.clone());
    let conveyor = ConveyorClient::new(conveyor_agent);

    // normal cycle: power on, open, run the belt
    door.power_on();
    door.open();
    door.wait_for_state(DoorState::Open, Duration::from_secs(1)).await?;
    conveyor.start();
    conveyor
        .wait_for_state(ConveyorState::Running, Duration::from_secs(1))
        .await?;

    tokio::time::sleep(Duration::from_millis(200)).await;
    info!(belt = ?conveyor.status().await?, "belt running");

    // jam the door mid-close: the travel deadline trips the door, the
    // conveyor watches the door and trips with it
    door_agent.act(|door, _cx| door.jam());
    door.close();
    door.wait_for_state(DoorState::Faulted, Duration::from_secs(1)).await?;
    conveyor
        .wait_for_state(ConveyorState::Faulted, Duration::from_secs(1))
        .await?;
    info!(door = ?door.status().await?, "cell locked out");

    // a command outside its valid states is rejected through the error
    // policy and leaves the state untouched
    let observer = door_agent.observe_errors(|error| info!(%error, "door rejected a command"));
    door.open();
    door_agent.sync().await;
    door_agent.unobserve_errors(observer);

    // recover both controllers
    door.reset();
    conveyor.reset();
    door.wait_for_state(DoorState::Closed, Duration::from_secs(1)).await?;
    conveyor
        .wait_for_state(ConveyorState::Standby, Duration::from_secs(1))
        .await?;
    info!(door = ?door.status().await?, "cell recovered");

    Ok(())
}
