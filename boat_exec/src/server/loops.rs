//! Bodies of the server's activities

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info, trace, warn};
use std::{
    sync::{atomic::Ordering, Arc, Weak},
    time::Duration,
};

use comms_if::{
    net::{Transport, TransportError},
    tc::{CameraState, WaypointState},
};
use util::{module::State, sync::lock, time::now_millis};

use super::Core;
use crate::{
    events::{LogEvent, VehicleEvent},
    loc::Twist,
    loco_ctrl::{self, VehicleType},
    sched::{TaskContext, TaskFlow},
    traj_ctrl::{self, TrajCtrl},
};

// ------------------------------------------------------------------------------------------------
// PERIODIC ACTIVITIES
// ------------------------------------------------------------------------------------------------

/// Refresh the pose estimate and send the actuator demands for the current velocity.
pub(super) fn update_tick(core: &Weak<Core>) -> TaskFlow {
    let core = match core.upgrade() {
        Some(c) => c,
        None => return TaskFlow::Stop,
    };

    // ---- POSE ----

    let pose = core.state.refresh_pose(now_millis());
    core.events.log(LogEvent::pose(&pose));
    core.publisher.publish(VehicleEvent::Pose(pose));

    // ---- ACTUATION ----

    let input = loco_ctrl::InputData {
        velocity: core.state.velocity(),
        thrust_gains: core.state.gains().thrust,
    };

    let dems = match lock(&core.loco_ctrl).proc(&input) {
        Ok((dems, _)) => dems,
        Err(e) => {
            warn!("LocoCtrl error: {}", e);
            return TaskFlow::Continue;
        }
    };

    let cmd = dems.to_command();

    if core.transport.is_connected() {
        if let Err(e) = core.transport.send(&cmd) {
            warn!("Failed to send command: {}", e);
        }
    }

    core.events.log(LogEvent::Cmd(cmd));

    TaskFlow::Continue
}

/// Drive the mission identified by `generation`.
///
/// Stops once that mission is finished or replaced.
pub(super) fn nav_tick(core: &Weak<Core>, controller: &mut TrajCtrl, generation: u64) -> TaskFlow {
    let core = match core.upgrade() {
        Some(c) => c,
        None => return TaskFlow::Stop,
    };

    let mission = core.state.mission();
    if mission.generation() != generation {
        return TaskFlow::Stop;
    }

    if !core.state.is_autonomous() {
        debug!("Paused");
        core.command_velocity(Twist::zero());
        core.publisher
            .publish(VehicleEvent::Waypoint(WaypointState::Paused));
        return TaskFlow::Continue;
    }

    let index = match mission.active_leg() {
        Some(i) => i,
        None => {
            info!("Done");
            core.command_velocity(Twist::zero());
            core.publisher
                .publish(VehicleEvent::Waypoint(WaypointState::Done));
            core.state.finish_mission(generation);
            return TaskFlow::Stop;
        }
    };

    let waypoints = mission.waypoints();
    let gains = core.state.gains();

    let input = traj_ctrl::InputData {
        pose: core.state.pose().pose,
        wp_index: index,
        destination: waypoints[index].pose,
        previous: index.checked_sub(1).map(|i| waypoints[i].pose),
        rudder_gains: gains.rudder,
        thrust_gains: gains.thrust,
        yaw_rate_rads: core.state.gyro()[2],
        is_vectored: core.vehicle_type() == Some(VehicleType::Vectored),
        dt_s: core.params.update_period().as_secs_f64(),
    };

    trace!("{} update, waypoint {}", controller.kind(), index);

    match controller.proc(&input) {
        Ok((traj_ctrl::OutputData::Advance, _)) => {
            if core.state.advance_waypoint(generation, index) {
                info!("Waypoint {} reached", index);
            }
        }
        Ok((traj_ctrl::OutputData::Command(twist), _)) => core.command_velocity(twist),
        Err(e) => warn!("TrajCtrl error: {}", e),
    }

    core.publisher
        .publish(VehicleEvent::Waypoint(WaypointState::Going));

    TaskFlow::Continue
}

/// Count a frame of the capture job.
pub(super) fn capture_tick(core: &Weak<Core>) -> TaskFlow {
    let core = match core.upgrade() {
        Some(c) => c,
        None => return TaskFlow::Stop,
    };

    let job = core.state.capture_frame();
    core.publisher.publish(VehicleEvent::Camera(job.state));

    if job.state == CameraState::Done {
        info!("Capture done, {} frames", job.frames_captured);
        TaskFlow::Stop
    } else {
        TaskFlow::Continue
    }
}

/// Poll the failsafe monitor, sending the vehicle home if it trips.
pub(super) fn failsafe_tick(core: &Weak<Core>) -> TaskFlow {
    let core = match core.upgrade() {
        Some(c) => c,
        None => return TaskFlow::Stop,
    };

    if let Some(cause) = core.failsafe.poll(core.state.is_autonomous()) {
        core.events.log(LogEvent::Failsafe {
            cause: cause.to_string(),
        });
        core.go_home();
    }

    TaskFlow::Continue
}

// ------------------------------------------------------------------------------------------------
// ONE SHOT ACTIVITIES
// ------------------------------------------------------------------------------------------------

/// Give each of the first `num_slots` sensor channels `slot_wait` to report its configured type,
/// warning about those which don't.
pub(super) fn expect_sensors(
    core: &Weak<Core>,
    ctx: &TaskContext,
    slot_wait: Duration,
    num_slots: usize,
) {
    for channel in 1..=num_slots {
        if !ctx.wait(slot_wait) {
            return;
        }

        let core = match core.upgrade() {
            Some(c) => c,
            None => return,
        };

        if core.state.expected_received(channel) {
            continue;
        }

        let expected = core.state.sensor_type(channel);
        if expected.reports_json() {
            warn!("s{} expects {} not received yet", channel, expected);
        }
    }
}

// ------------------------------------------------------------------------------------------------
// INBOUND
// ------------------------------------------------------------------------------------------------

/// Receive and ingest micro-controller messages until the link closes or the server stops.
pub(super) fn inbound(weak: Weak<Core>, transport: Arc<dyn Transport>) {
    loop {
        let result = transport.receive();

        let core = match weak.upgrade() {
            Some(c) => c,
            None => break,
        };

        if !core.state.is_running() {
            break;
        }

        // Track the link state first so a message arriving with the connection counts towards
        // the new connection's sensor check
        let connected = transport.is_connected();
        let was_connected = core.state.set_connected(connected);

        if connected && !was_connected {
            core.on_connect();
        } else if !connected && was_connected {
            info!("Micro-controller disconnected");
        }

        match result {
            Ok(Some(msg)) => {
                let readings = core.ingest.ingest(&msg);
                trace!("{} readings ingested", readings.len());
            }
            Ok(None) | Err(TransportError::NotConnected) => (),
            Err(TransportError::Closed) => {
                info!("Micro-controller link closed");
                core.state.set_connected(false);
                core.link_closed.store(true, Ordering::SeqCst);
                break;
            }
            Err(e) => warn!("Failed to receive from the micro-controller: {}", e),
        }
    }

    debug!("Inbound loop exiting");
}
