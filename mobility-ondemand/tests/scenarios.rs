//! Exercises [`OndemandSimulator`] directly, bypassing HTTP — the same style
//! as `test_integration.py`'s direct `simulation.reserve_user(...)` /
//! `simulation.ready_to_depart(...)` calls, reproduced here as
//! `SimulatorRuntime` usage rather than HTTP round-trips (§8.1).

use mobility_kernel::SimulatorRuntime;
use mobility_ondemand::OndemandSimulator;
use mobility_wire::Time;
use serde_json::json;

fn setup_config(network: serde_json::Value) -> serde_json::Value {
    json!({
        "mobility_id": "car-1",
        "capacity": 2,
        "home_stop": "Stop1",
        "board_time": 10.0,
        "max_delay_time": 30.0,
        "start_window": 60.0,
        "end_window": 1380.0,
        "network": network,
    })
}

fn minutes(t: f64) -> Time {
    Time::from_minutes(t)
}

/// A reservation-free day: the vehicle never leaves home, so `run_until`
/// produces nothing (§8 S1).
#[test]
fn zero_reservations_emits_no_events() {
    let mut sim = OndemandSimulator::new();
    sim.setup(setup_config(json!([
        { "a": "Stop1", "b": "Stop2", "minutes": 30.0 },
    ])))
    .unwrap();
    sim.start().unwrap();

    let events = sim.run_until(minutes(1440.0)).unwrap();
    assert!(events.is_empty(), "expected no events, got {events:?}");
}

/// A single accepted reservation: boarding, departure, arrival, and the
/// vehicle's return-to-home trip at service-window close (§8 S2).
#[test]
fn single_user_round_trip() {
    let mut sim = OndemandSimulator::new();
    sim.setup(setup_config(json!([
        { "a": "Stop1", "b": "Stop2", "minutes": 30.0 },
    ])))
    .unwrap();
    sim.start().unwrap();
    sim.advance_to(minutes(480.0)).unwrap();

    sim.reserve_user("User1", "Stop1", "Stop2", 490.0).unwrap();
    sim.ready_to_depart("User1").unwrap();

    let events = sim.run_until(minutes(1440.0)).unwrap();

    let got: Vec<(String, f64)> = events
        .iter()
        .map(|e| (e.event_type.as_str().to_string(), e.time.as_minutes()))
        .collect();
    assert_eq!(
        got,
        vec![
            ("RESERVED".into(), 480.0),
            ("DEPARTED".into(), 490.0),
            ("DEPARTED".into(), 500.0),
            ("ARRIVED".into(), 530.0),
            ("ARRIVED".into(), 540.0),
            ("DEPARTED".into(), 1380.0),
            ("ARRIVED".into(), 1410.0),
        ]
    );

    let reserved = &events[0];
    assert_eq!(reserved.details["success"], json!(true));
    assert_eq!(reserved.details["route"][0]["dept"], json!(490.0));
    assert_eq!(reserved.details["route"][0]["arrv"], json!(540.0));

    let first_departure = &events[1];
    assert_eq!(first_departure.details["userId"], json!("User1"));
    assert_eq!(first_departure.details["location"]["locationId"], json!("Stop1"));

    let final_arrival = &events[4];
    assert_eq!(final_arrival.details["userId"], json!("User1"));
    assert_eq!(final_arrival.details["location"]["locationId"], json!("Stop2"));
}

/// A second reservation for a leg the vehicle is already committed to, after
/// its boarding window has closed, is rejected (§8 S3).
#[test]
fn reservation_rejected_while_vehicle_committed() {
    let mut sim = OndemandSimulator::new();
    sim.setup(setup_config(json!([
        { "a": "Stop1", "b": "Stop2", "minutes": 30.0 },
        { "a": "Stop1", "b": "Stop3", "minutes": 15.0 },
        { "a": "Stop2", "b": "Stop3", "minutes": 20.0 },
    ])))
    .unwrap();
    sim.start().unwrap();
    sim.advance_to(minutes(480.0)).unwrap();

    sim.reserve_user("User1", "Stop2", "Stop3", 500.0).unwrap();
    sim.ready_to_depart("User1").unwrap();
    let setup_events = sim.run_until(minutes(515.0)).unwrap();
    assert!(setup_events.iter().any(|e| e.event_type.as_str() == "RESERVED"));

    sim.reserve_user("User2", "Stop2", "Stop3", 521.0).unwrap();
    let events = sim.run_until(minutes(516.0)).unwrap();

    assert_eq!(events.len(), 1);
    let rejected = &events[0];
    assert_eq!(rejected.event_type.as_str(), "RESERVED");
    assert_eq!(rejected.time.as_minutes(), 515.0);
    assert_eq!(rejected.details["success"], json!(false));
    assert_eq!(rejected.details["userId"], json!("User2"));
}
