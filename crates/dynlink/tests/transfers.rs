//! Reads and writes: get, get_callback, put, put_callback.

mod common;

use common::{engine, wait_until, Tally, DEADLINE};
use dynlink::{
    status, ConnectionState, DataType, Engine, Fault, LinkError, LinkHandle, LinkOptions,
    LinkState, SimService, Values,
};
use std::sync::Arc;

fn connected_output(
    engine: &Engine,
    name: &str,
    data_type: DataType,
    options: LinkOptions,
) -> LinkHandle {
    let handle = LinkHandle::new();
    engine.add_output(&handle, name, data_type, options, None).unwrap();
    assert!(wait_until(DEADLINE, || handle.connection_status() == ConnectionState::Connected));
    handle
}

fn connected_input(engine: &Engine, name: &str, data_type: DataType) -> LinkHandle {
    let handle = LinkHandle::new();
    engine
        .add_input(&handle, name, data_type, LinkOptions::default(), None, None)
        .unwrap();
    assert!(wait_until(DEADLINE, || handle.connection_status() == ConnectionState::Connected));
    handle
}

#[test]
fn test_valve_put_callback_scenario() {
    let (sim, engine) = engine();
    sim.add_point("dev:valve1", Values::Double(vec![0.0]));
    engine.start().unwrap();
    engine.set_accepting(false);

    let handle = LinkHandle::new();
    let search = Tally::new();
    engine
        .add_output(&handle, "dev:valve1", DataType::Double, LinkOptions::SCALAR,
            Some(search.callback()))
        .unwrap();
    assert_eq!(handle.status(), status::OK);
    assert_eq!(handle.in_flight_count(), 1);

    engine.set_accepting(true);
    assert!(wait_until(DEADLINE, || search.calls() == 1));
    assert_eq!(handle.link_state(), Some(LinkState::Connected));
    assert_eq!(handle.element_count(), Ok(1));

    sim.hold_notifies(true);
    let notify = Tally::new();
    assert_eq!(handle.put_callback(&[42.0f64], notify.callback()), Ok(1));
    assert!(handle.notify_in_progress());
    assert!(wait_until(DEADLINE, || sim.value("dev:valve1") == Some(Values::Double(vec![42.0]))));
    assert_eq!(notify.calls(), 0);

    sim.release_notifies();
    assert!(wait_until(DEADLINE, || notify.calls() == 1));
    assert!(!handle.notify_in_progress());
    assert_eq!(notify.last_status(), Some(status::OK));
    assert_eq!(handle.status(), status::OK);

    std::thread::sleep(std::time::Duration::from_millis(20));
    assert_eq!(notify.calls(), 1);
    assert_eq!(search.calls(), 1);
}

#[test]
fn test_notify_exclusivity() {
    let (sim, engine) = engine();
    sim.add_point("dev:valve3", Values::Double(vec![0.0]));
    let handle = connected_output(&engine, "dev:valve3", DataType::Double, LinkOptions::SCALAR);

    sim.hold_notifies(true);
    let first = Tally::new();
    let second = Tally::new();
    handle.put_callback(&[1.0f64], first.callback()).unwrap();
    let err = handle.put_callback(&[2.0f64], second.callback()).unwrap_err();
    assert_eq!(err, LinkError::NotifyInProgress);
    assert_eq!(err.code(), status::NOTIFY_IN_PROGRESS);

    assert!(wait_until(DEADLINE, || handle.in_flight_count() == 0));
    assert_eq!(sim.writes(), vec![("dev:valve3".to_string(), Values::Double(vec![1.0]))]);

    sim.release_notifies();
    assert!(wait_until(DEADLINE, || first.calls() == 1));
    assert_eq!(second.calls(), 0);

    // The slot is free again.
    sim.hold_notifies(false);
    handle.put_callback(&[3.0f64], second.callback()).unwrap();
    assert!(wait_until(DEADLINE, || second.calls() == 1));
}

#[test]
fn test_scalar_clamp() {
    let (sim, engine) = engine();
    sim.add_point("dev:arr", Values::Double(vec![0.0; 4]));
    let scalar = connected_output(&engine, "dev:arr", DataType::Double, LinkOptions::SCALAR);
    assert_eq!(scalar.put(&[1.0f64, 2.0, 3.0]), Ok(1));
    assert!(wait_until(DEADLINE, || sim.writes().len() == 1));
    assert_eq!(sim.writes()[0].1, Values::Double(vec![1.0]));

    let array = connected_output(&engine, "dev:arr", DataType::Double, LinkOptions::default());
    // Clamped to the remote element count.
    assert_eq!(array.put(&[5.0f64; 6]), Ok(4));
    assert!(wait_until(DEADLINE, || sim.writes().len() == 2));
    assert_eq!(sim.value("dev:arr"), Some(Values::Double(vec![5.0; 4])));
}

#[test]
fn test_sync_put_failure_invokes_callback() {
    let (sim, engine) = engine();
    sim.add_point("dev:valve4", Values::Double(vec![0.0]));
    let handle = connected_output(&engine, "dev:valve4", DataType::Double, LinkOptions::SCALAR);

    sim.inject(Fault::PutSync);
    let notify = Tally::new();
    handle.put_callback(&[7.0f64], notify.callback()).unwrap();
    assert!(wait_until(DEADLINE, || notify.calls() == 1));
    assert_eq!(notify.last_status(), Some(status::FATAL_ERROR));
    assert!(!handle.notify_in_progress());
    assert!(sim.writes().is_empty());
}

#[test]
fn test_async_put_failure_delivers_once() {
    let (sim, engine) = engine();
    sim.add_point("dev:valve5", Values::Double(vec![0.0]));
    let handle = connected_output(&engine, "dev:valve5", DataType::Double, LinkOptions::SCALAR);

    sim.inject(Fault::PutAsync);
    let notify = Tally::new();
    handle.put_callback(&[8.0f64], notify.callback()).unwrap();
    assert!(wait_until(DEADLINE, || notify.calls() == 1));
    assert_eq!(notify.last_status(), Some(status::FATAL_ERROR));
    assert!(!handle.notify_in_progress());
    std::thread::sleep(std::time::Duration::from_millis(20));
    assert_eq!(notify.calls(), 1);
}

#[test]
fn test_get_callback_reads_fresh_value() {
    let (sim, engine) = engine();
    sim.add_point("dev:wave", Values::Short(vec![1, 2, 3, 4]));
    let handle = connected_input(&engine, "dev:wave", DataType::Short);

    let read = Tally::new();
    // Clamped to the element count.
    assert_eq!(handle.get_callback(10, read.callback()), Ok(4));
    assert!(wait_until(DEADLINE, || read.calls() == 1));
    assert_eq!(read.last_status(), Some(status::OK));
    assert!(!handle.read_callback_pending());

    // Narrow the next read and pick up a new value through it.
    sim.set_value("dev:wave", Values::Short(vec![9, 8, 7, 6]));
    sim.set_alarm("dev:wave", 3, dynlink::Severity::Major);
    assert_eq!(handle.get_callback(2, read.callback()), Ok(2));
    assert!(wait_until(DEADLINE, || read.calls() == 2));
    let mut out = [0i16; 4];
    let reading = handle.get(&mut out).unwrap();
    assert_eq!(reading.count, 2);
    assert_eq!(&out[..2], &[9, 8]);
    assert_eq!(&out[2..], &[0, 0]);
    assert_eq!(reading.severity, dynlink::Severity::Major);
}

#[test]
fn test_sync_get_failure_invokes_callback() {
    let (sim, engine) = engine();
    sim.add_point("dev:wave2", Values::Long(vec![5]));
    let handle = connected_input(&engine, "dev:wave2", DataType::Long);

    sim.inject(Fault::GetSync);
    let read = Tally::new();
    handle.get_callback(1, read.callback()).unwrap();
    assert!(wait_until(DEADLINE, || read.calls() == 1));
    assert_eq!(read.last_status(), Some(status::FATAL_ERROR));
    assert!(!handle.read_callback_pending());

    sim.inject(Fault::GetAsync);
    handle.get_callback(1, read.callback()).unwrap();
    assert!(wait_until(DEADLINE, || read.calls() == 2));
    assert_eq!(read.last_status(), Some(status::FATAL_ERROR));
}

#[test]
fn test_direction_and_type_checks() {
    let (sim, engine) = engine();
    sim.add_point("dev:in", Values::ULong(vec![1]));
    sim.add_point("dev:out", Values::ULong(vec![1]));
    let input = connected_input(&engine, "dev:in", DataType::ULong);
    let output = connected_output(&engine, "dev:out", DataType::ULong, LinkOptions::default());

    assert_eq!(input.put(&[2u32]), Err(LinkError::WrongDirection("input")));
    assert_eq!(
        output.get_callback(1, Tally::new().callback()),
        Err(LinkError::WrongDirection("output"))
    );
    assert_eq!(output.put(&[2.0f64]), Err(LinkError::TypeMismatch("ulong")));
    let mut wrong = [0.0f64; 1];
    assert_eq!(input.get(&mut wrong), Err(LinkError::TypeMismatch("ulong")));
    assert_eq!(output.put(&[2u32]), Ok(1));
}

#[test]
fn test_monitor_updates_many_links() {
    let sim = SimService::new().shared();
    let engine = Arc::new(Engine::new(sim.clone(), common::fast_config()));
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let name = format!("dev:ch{}", i);
            sim.add_point(&name, Values::Long(vec![0]));
            connected_input(&engine, &name, DataType::Long)
        })
        .collect();

    for i in 0..8 {
        sim.set_value(&format!("dev:ch{}", i), Values::Long(vec![i * 10]));
    }
    for (i, handle) in handles.iter().enumerate() {
        assert!(wait_until(DEADLINE, || {
            let mut out = [0i32; 1];
            handle.get(&mut out).is_ok() && out[0] == i as i32 * 10
        }));
    }
}
