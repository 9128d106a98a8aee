//! Full navigation run against the simulated bus.

use std::{sync::Arc, thread, time::{Duration, Instant}};

use comms_if::{
    eqpt::drive::{
        DriveCmd, DrivePayload, DATA_FRAME_ID, HEARTBEAT_FRAME_ID, LINEAR_TARGET_SELECTOR,
        ANGULAR_TARGET_SELECTOR
    },
    feed::FeedMsg
};
use nav_lib::{
    bus::{self, SimBus},
    cycle,
    data_store::DataStore,
    feedback::{FeedbackListener, FeedbackParams},
    odom::OdomState,
    params::NavExecParams,
};

#[test]
fn test_goal_run() {
    let params = NavExecParams::default();
    let bus = Arc::new(SimBus::new());
    bus::open_bus(bus.as_ref(), &params.bus).unwrap();

    let odom = OdomState::new_shared();
    let listener = FeedbackListener::start(
        bus.clone(),
        params.bus.rx_channel,
        odom.clone(),
        &FeedbackParams {
            recv_timeout_ms: 5,
            ..Default::default()
        }
    ).unwrap();

    let mut ds = DataStore::new(&params);
    ds.apply_feed(FeedMsg::Range { dist: 120 });
    ds.apply_feed(FeedMsg::Waypoint { x: 2, y: 2 });
    ds.apply_feed(FeedMsg::Waypoint { x: 95, y: 95 });

    let mut cmds = Vec::new();
    while !ds.seg_ctrl.is_finished() && cmds.len() < 5000 {
        ds.cycle_start();
        cycle::step(&mut ds, bus.as_ref(), &odom, params.cycle_period_s).unwrap();
        cmds.push(ds.seg_ctrl_output);
        ds.cycle_end();
    }

    assert!(ds.seg_ctrl.is_finished());

    let num_rotate = cmds.iter().filter(|c| **c == DriveCmd::new(0, 500)).count();
    let num_translate = cmds.iter().filter(|c| **c == DriveCmd::new(1000, 0)).count();
    assert!((130..=145).contains(&num_rotate), "rotate ticks: {}", num_rotate);
    assert!((640..=656).contains(&num_translate), "translate ticks: {}", num_translate);

    // One frame per cycle with the heartbeat on every 20th
    let frames: Vec<_> = bus.transmitted().into_iter().map(|(_, f)| f).collect();
    assert_eq!(frames.len(), cmds.len());
    for (i, f) in frames.iter().enumerate() {
        match i % 20 {
            19 => assert_eq!(f.id, HEARTBEAT_FRAME_ID, "tick {}", i),
            _ => assert_eq!(f.id, DATA_FRAME_ID, "tick {}", i)
        }
    }
    assert_eq!(ds.tx_loop.stats().num_heartbeats as usize, cmds.len() / 20);

    // The echoed demands are what the odometry should add up to
    let mut expected_dist_mm = 0.0;
    let mut expected_head_rad = 0.0;
    for f in frames.iter().filter(|f| f.id == DATA_FRAME_ID) {
        let payload = DrivePayload(f.data);
        match payload.selector() {
            s if s == LINEAR_TARGET_SELECTOR => expected_dist_mm += payload.value() as f64 * 0.01,
            s if s == ANGULAR_TARGET_SELECTOR =>
                expected_head_rad += payload.value() as f64 * 0.001 * 0.01,
            _ => panic!("Unexpected selector in {:02x?}", f.data)
        }
    }
    assert!(expected_dist_mm > 0.0);

    let deadline = Instant::now() + Duration::from_secs(2);
    while (odom.lock().unwrap().dist_sum_mm - expected_dist_mm).abs() > 1e-6
        && Instant::now() < deadline
    {
        thread::sleep(Duration::from_millis(5));
    }

    let stats = listener.stop(Duration::from_secs(1)).unwrap();
    assert_eq!(stats.num_discarded, 0);
    assert_eq!(stats.num_recv_errors, 0);

    let od = *odom.lock().unwrap();
    assert!((od.dist_sum_mm - expected_dist_mm).abs() < 1e-6);
    assert!((od.head_sum_rad - expected_head_rad).abs() < 1e-6);

    bus::close_bus(bus.as_ref(), &params.bus, Duration::from_millis(1)).unwrap();
    assert!(!bus.is_open());
}

#[test]
fn test_no_motion_without_range() {
    let params = NavExecParams::default();
    let bus = SimBus::without_feedback();
    bus::open_bus(&bus, &params.bus).unwrap();
    let odom = OdomState::new_shared();

    let mut ds = DataStore::new(&params);
    ds.apply_feed(FeedMsg::Waypoint { x: 2, y: 2 });
    ds.apply_feed(FeedMsg::Waypoint { x: 95, y: 95 });

    for _ in 0..100 {
        ds.cycle_start();
        cycle::step(&mut ds, &bus, &odom, params.cycle_period_s).unwrap();
        assert!(ds.seg_ctrl_output.is_stop());
        ds.cycle_end();
    }

    // Heartbeats keep flowing while stopped
    assert_eq!(ds.tx_loop.stats().num_heartbeats, 5);
    assert!(!ds.seg_ctrl.is_finished());
}
