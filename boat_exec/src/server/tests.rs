//! Tests of the vehicle server running against an in-process micro-controller link

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use comms_if::{
    eqpt::{McuCommand, SensorType},
    net::{ChannelTransport, McuEndpoint},
    tc::{CameraState, WaypointState},
};

use super::*;
use crate::{
    events::MemoryEventSink,
    loc::{Pose, Twist},
};

// ------------------------------------------------------------------------------------------------
// HELPERS
// ------------------------------------------------------------------------------------------------

struct Fixture {
    server: VehicleServer,
    mcu: McuEndpoint,
    events: Arc<MemoryEventSink>,
}

fn test_params() -> BoatExecParams {
    let mut params = BoatExecParams::default();
    params.update_period_ms = 10;
    params.velocity_timeout_ms = 400;
    params.failsafe.period_ms = 10;
    params.sensor_expect.slot_wait_ms = 10;
    params.sensor_types = vec![
        SensorType::None,
        SensorType::Es2,
        SensorType::Winch,
        SensorType::Sampler,
        SensorType::Sampler,
    ];
    params
}

fn fixture_with(params: BoatExecParams) -> Fixture {
    let (transport, mcu) = ChannelTransport::pair(Duration::from_millis(5));
    let events = Arc::new(MemoryEventSink::new());

    let server = VehicleServer::new(params, Arc::new(transport), events.clone()).unwrap();

    Fixture {
        server,
        mcu,
        events,
    }
}

fn fixture() -> Fixture {
    fixture_with(test_params())
}

/// Poll `cond` until it holds, failing the test after a couple of seconds.
fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !cond() {
        if Instant::now() > deadline {
            panic!("Timed out waiting for {}", what);
        }
        thread::sleep(Duration::from_millis(5));
    }
}

/// Wait for a command carrying the given channel key, skipping the periodic motor commands.
fn recv_command_for(mcu: &McuEndpoint, key: &str) -> McuCommand {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if let Some(cmd) = mcu.recv_command(Duration::from_millis(20)) {
            if cmd.get(key).is_some() {
                return cmd;
            }
        }
    }
    panic!("No command for {} received", key);
}

fn pose_offset(server: &VehicleServer, dx_m: f64) -> UtmPose {
    let mut pose = server.get_pose();
    pose.pose = Pose::new(
        pose.pose.position_m.x + dx_m,
        pose.pose.position_m.y,
        pose.pose.position_m.z,
        0.0,
    );
    pose
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[test]
fn test_invalid_params() {
    let mut params = test_params();
    params.update_period_ms = 0;

    let (transport, _mcu) = ChannelTransport::pair(Duration::from_millis(5));
    let result = VehicleServer::new(
        params,
        Arc::new(transport),
        Arc::new(MemoryEventSink::new()),
    );
    assert!(matches!(result, Err(ServerError::InvalidParams(_))));
}

#[test]
fn test_velocity_watchdog() {
    let f = fixture();
    let demand = Twist::new(0.5, 0.1);

    f.server.set_velocity(demand);
    assert_eq!(f.server.get_velocity(), demand);

    // Refreshing the demand keeps it alive past the original expiry
    thread::sleep(Duration::from_millis(200));
    f.server.set_velocity(demand);
    thread::sleep(Duration::from_millis(250));
    assert_eq!(f.server.get_velocity(), demand);

    wait_until("the watchdog to zero the velocity", || {
        f.server.get_velocity() == Twist::zero()
    });
}

#[test]
fn test_set_autonomous_sets_home_once() {
    let f = fixture();
    let initial = f.server.get_pose();

    f.server.set_velocity(Twist::new(0.3, 0.0));
    f.server.set_autonomous(true);
    assert!(f.server.is_autonomous());
    assert_eq!(f.server.get_velocity(), Twist::zero());
    assert_eq!(f.server.get_home(), initial);

    // Later engagements keep the first home
    let moved = pose_offset(&f.server, 50.0);
    f.server.set_pose(moved);
    f.server.set_autonomous(false);
    f.server.set_autonomous(true);
    assert_eq!(f.server.get_home(), initial);

    f.server.set_home(moved);
    assert_eq!(f.server.get_home(), moved);
}

#[test]
fn test_go_home_before_autonomy_sets_home() {
    let f = fixture();
    let here = pose_offset(&f.server, 5000.0);
    f.server.set_pose(here);

    f.server.start_go_home();
    assert_eq!(f.server.get_home(), here);
    assert_eq!(f.server.get_waypoints(), vec![here]);

    // The later first operator engagement must not move home
    f.server.set_autonomous(true);
    assert_eq!(f.server.get_home(), here);
}

#[test]
fn test_concurrent_missions_keep_navigation_running() {
    let f = fixture();
    f.server.set_autonomous(true);
    let near = pose_offset(&f.server, 100.0);
    let far = pose_offset(&f.server, 200.0);

    for _ in 0..20 {
        let a = Arc::clone(&f.server.core);
        let b = Arc::clone(&f.server.core);
        let ta = thread::spawn(move || a.start_waypoints(vec![near], "LINE_FOLLOW"));
        let tb = thread::spawn(move || b.start_waypoints(vec![far], "POINT_AND_SHOOT"));
        ta.join().unwrap();
        tb.join().unwrap();

        // Long enough for a task driving a replaced mission to stop
        thread::sleep(Duration::from_millis(30));
        assert!(f.server.core.nav_task.is_running());
        assert_eq!(f.server.get_waypoint_status(), WaypointState::Going);
    }
}

#[test]
fn test_empty_mission() {
    let f = fixture();

    assert_eq!(f.server.get_waypoints_index(), -1);
    assert_eq!(f.server.get_waypoint_status(), WaypointState::Done);

    f.server.start_waypoints(Vec::new(), "LINE_FOLLOW");
    assert_eq!(f.server.get_waypoints_index(), -1);
    assert_eq!(f.server.get_waypoint_status(), WaypointState::Done);
    assert!(f.server.get_waypoints().is_empty());
}

#[test]
fn test_mission_paused_then_driven() {
    let f = fixture();
    let target = pose_offset(&f.server, 100.0);

    f.server.start_waypoints(vec![target], "POINT_AND_SHOOT");
    assert_eq!(f.server.get_waypoints_index(), 0);
    assert_eq!(f.server.get_waypoint_status(), WaypointState::Paused);
    assert_eq!(f.server.get_waypoints(), vec![target]);

    f.server.set_autonomous(true);
    assert_eq!(f.server.get_waypoint_status(), WaypointState::Going);

    wait_until("the navigation loop to command a velocity", || {
        f.server.get_velocity() != Twist::zero()
    });

    f.server.stop_waypoints();
    assert_eq!(f.server.get_waypoints_index(), -1);
    assert_eq!(f.server.get_waypoint_status(), WaypointState::Done);
    assert_eq!(f.server.get_velocity(), Twist::zero());
}

#[test]
fn test_mission_completes() {
    let f = fixture();
    let rx = f.server.subscribe();
    let here = f.server.get_pose();

    f.server.set_autonomous(true);
    f.server.start_waypoints(vec![here], "LINE_FOLLOW");

    wait_until("the mission to finish", || f.server.get_waypoints_index() == -1);
    assert_eq!(f.server.get_waypoint_status(), WaypointState::Done);
    assert_eq!(f.server.get_waypoints(), vec![here]);

    let deadline = Instant::now() + Duration::from_secs(2);
    let mut done_published = false;
    while !done_published && Instant::now() < deadline {
        if let Ok(VehicleEvent::Waypoint(WaypointState::Done)) =
            rx.recv_timeout(Duration::from_millis(50))
        {
            done_published = true;
        }
    }
    assert!(done_published);
}

#[test]
fn test_unknown_controller_falls_back() {
    let f = fixture();
    let target = pose_offset(&f.server, 20.0);

    f.server.start_waypoints(vec![target], "ZIGZAG");

    let navs = f.events.find(|e| matches!(e, LogEvent::Nav { .. }));
    assert_eq!(navs.len(), 1);
    match &navs[0] {
        LogEvent::Nav {
            controller,
            waypoints,
        } => {
            assert_eq!(controller, "LINE_FOLLOW");
            assert_eq!(waypoints.len(), 1);
        }
        _ => unreachable!(),
    }
    assert_eq!(
        f.server.core.state.mission().controller(),
        ControllerKind::LineFollow
    );
}

#[test]
fn test_gains() {
    let f = fixture();

    assert_eq!(f.server.get_gains(0), [0.5, 0.0, 0.0]);
    assert_eq!(f.server.get_gains(5), [0.7, 0.0, 0.5]);

    f.server.set_gains(5, &[1.0, 2.0, 3.0]);
    assert_eq!(f.server.get_gains(5), [1.0, 2.0, 3.0]);
    assert_eq!(
        f.events
            .find(|e| matches!(e, LogEvent::Gain { axis: 5, .. }))
            .len(),
        1
    );

    // Wrong lengths and unknown axes change nothing
    f.server.set_gains(0, &[1.0]);
    f.server.set_gains(1, &[1.0, 2.0, 3.0]);
    assert_eq!(f.server.get_gains(0), [0.5, 0.0, 0.0]);
    assert_eq!(f.events.find(|e| matches!(e, LogEvent::Gain { .. })).len(), 1);

    assert!(f.server.get_gains(7).iter().all(|k| k.is_nan()));
    assert!(f.server.get_gains(4).iter().all(|k| k.is_nan()));
    assert!(f.server.get_gains(3)[0].is_nan());
}

#[test]
fn test_winch() {
    let f = fixture();
    f.mcu.set_connected(true);

    f.server.set_gains(3, &[-2.5]);

    let cmd = recv_command_for(&f.mcu, "s2");
    assert_eq!(cmd.field_f64("s2", "p"), Some(2.5));
    assert_eq!(cmd.field_f64("s2", "v"), Some(-500.0));
    assert_eq!(f.events.find(|e| matches!(e, LogEvent::Winch(_))).len(), 1);
    assert!(f.events.find(|e| matches!(e, LogEvent::Gain { .. })).is_empty());

    // The depth reported by the winch is read back on the same axis
    f.mcu
        .send_json(r#"{"s2": {"type": "winch", "depth": 4.0}}"#)
        .unwrap();
    wait_until("the winch depth", || f.server.get_gains(3)[0] == 4.0);
    assert_eq!(f.server.get_gains(3), [4.0, 0.0, 0.0]);
}

#[test]
fn test_sampler() {
    let f = fixture();
    f.mcu.set_connected(true);

    f.server.set_gains(7, &[2.0, 1.0]);

    let cmd = recv_command_for(&f.mcu, "s3");
    assert_eq!(cmd.get("s3").unwrap()["e"], "2.0");
    let cmd = recv_command_for(&f.mcu, "s4");
    assert_eq!(cmd.get("s4").unwrap()["e"], "2.0");

    let started = f
        .events
        .find(|e| matches!(e, LogEvent::Sampler(s) if s == "jar # 3 start"));
    assert_eq!(started.len(), 2);
    assert_eq!(
        f.events
            .find(|e| matches!(e, LogEvent::Gain { axis: 7, .. }))
            .len(),
        1
    );

    f.server.set_gains(7, &[-1.0, 0.0]);
    let cmd = recv_command_for(&f.mcu, "s3");
    assert_eq!(cmd.get("s3").unwrap()["s"], "-1");

    // Neither start nor stop
    f.server.set_gains(7, &[1.0, 2.0]);
    assert!(f
        .events
        .find(|e| matches!(e, LogEvent::Sampler(s) if s.starts_with("jar # 2")))
        .is_empty());
    assert_eq!(
        f.events
            .find(|e| matches!(e, LogEvent::Gain { axis: 7, .. }))
            .len(),
        2
    );
}

#[test]
fn test_camera() {
    let f = fixture();
    assert_eq!(f.server.get_camera_status(), CameraState::Off);

    // Invalid intervals are refused
    f.server.start_camera(1, 0.0, 640, 480);
    f.server.start_camera(1, f64::NAN, 640, 480);
    assert_eq!(f.server.get_camera_status(), CameraState::Off);

    f.server.start_camera(3, 0.02, 640, 480);
    assert_eq!(
        f.events.find(|e| matches!(e, LogEvent::Img { num: 3, .. })).len(),
        1
    );
    wait_until("the capture to finish", || {
        f.server.get_camera_status() == CameraState::Done
    });
    assert_eq!(f.server.core.state.camera_job().frames_captured, 3);

    f.server.start_camera(0, 0.02, 640, 480);
    assert_eq!(f.server.get_camera_status(), CameraState::Capturing);
    f.server.stop_camera();
    assert_eq!(f.server.get_camera_status(), CameraState::Cancelled);
}

#[test]
fn test_failsafe_inert_before_autonomy() {
    let f = fixture();
    f.mcu.set_connected(true);

    f.mcu
        .send_json(r#"{"s1": {"type": "battery", "data": "13.9 0 0"}}"#)
        .unwrap();
    wait_until("the battery reading", || {
        f.server.core.failsafe.battery_voltage() == 13.9
    });

    thread::sleep(Duration::from_millis(100));
    assert_eq!(f.server.failsafe_state(), FailsafeState::Normal);
    assert!(!f.server.is_autonomous());
}

#[test]
fn test_failsafe_low_battery_goes_home() {
    let f = fixture();
    f.mcu.set_connected(true);
    let home = f.server.get_pose();

    f.server.set_autonomous(true);
    f.mcu
        .send_json(r#"{"s1": {"type": "battery", "data": "13.9 0 0"}}"#)
        .unwrap();

    wait_until("the failsafe to trip", || {
        f.server.failsafe_state() == FailsafeState::Active
    });
    wait_until("the mission home", || {
        !f.events.find(|e| matches!(e, LogEvent::Nav { .. })).is_empty()
    });

    assert!(f.server.is_autonomous());
    match &f.events.find(|e| matches!(e, LogEvent::Nav { .. }))[0] {
        LogEvent::Nav {
            controller,
            waypoints,
        } => {
            assert_eq!(controller, "POINT_AND_SHOOT");
            let p = home.pose.position_m;
            assert_eq!(waypoints, &vec![[p.x, p.y, p.z]]);
        }
        _ => unreachable!(),
    }
    assert_eq!(
        f.events.find(|e| matches!(e, LogEvent::Failsafe { .. })).len(),
        1
    );
}

#[test]
fn test_failsafe_heartbeat_lost() {
    let mut params = test_params();
    params.failsafe.heartbeat_max_wait_ms = 50;
    let f = fixture_with(params);

    f.server.set_autonomous(true);
    f.server.set_autonomous(false);

    wait_until("the failsafe to trip", || {
        f.server.failsafe_state() == FailsafeState::Active
    });
    assert!(f.server.is_autonomous());
}

#[test]
fn test_sensor_expectation() {
    let f = fixture();

    f.mcu.set_connected(true);
    f.mcu
        .send_json(r#"{"s1": {"type": "es2", "data": "300 20"}}"#)
        .unwrap();

    wait_until("the expected sensor", || {
        f.server.core.state.expected_received(1)
    });
    assert!(f.server.is_connected());
    assert!(!f.server.core.state.expected_received(2));
}

#[test]
fn test_sensor_types() {
    let f = fixture();

    assert_eq!(f.server.get_num_sensors(), 5);
    assert_eq!(f.server.get_sensor_type(2), SensorType::Winch);

    f.server.set_sensor_type(2, SensorType::AtlasPh);
    assert_eq!(f.server.get_sensor_type(2), SensorType::AtlasPh);

    // Out of range channels are ignored
    f.server.set_sensor_type(9, SensorType::AtlasPh);
    assert_eq!(f.server.get_sensor_type(9), SensorType::None);
    assert_eq!(f.server.get_num_sensors(), 5);
}

#[test]
fn test_gyro() {
    let f = fixture();
    f.server.set_gyro([0.1, 0.2, 0.3]);
    assert_eq!(f.server.get_gyro(), [0.1, 0.2, 0.3]);
}

#[test]
fn test_link_closed() {
    let Fixture { server, mcu, .. } = fixture();
    mcu.set_connected(true);
    assert!(!server.is_link_closed());

    drop(mcu);
    wait_until("the link to close", || server.is_link_closed());
}

#[test]
fn test_shutdown() {
    let f = fixture();
    let target = pose_offset(&f.server, 100.0);

    f.server.set_autonomous(true);
    f.server.start_waypoints(vec![target], "LINE_FOLLOW");
    f.server.start_camera(0, 0.02, 640, 480);

    f.server.shutdown();
    assert!(!f.server.is_autonomous());
    assert_eq!(f.server.get_waypoint_status(), WaypointState::Done);
    assert_eq!(f.server.get_camera_status(), CameraState::Cancelled);
    assert_eq!(f.server.get_velocity(), Twist::zero());

    // Only the first call does anything
    f.server.shutdown();
}
