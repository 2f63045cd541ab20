//! dynlink End-to-End Smoke Test
//!
//! Runs the engine against the in-process `SimService`:
//!   Part A: Output links (attach, connect, acknowledged write)
//!   Part B: Input links (ordering, snapshots, acknowledged read)
//!   Part C: Failure paths (no-hang, exclusivity, double clear, abandon)
//!
//! Run: RUST_LOG=dynlink=debug DYNLINK_DEBUG=10 ./target/release/dynlink-smoke

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dynlink::{
    callback, status, ClearOutcome, ConnectionState, DataType, Engine, EngineConfig, Fault,
    LinkCallback, LinkError, LinkHandle, LinkOptions, SimService, Values,
};
use tracing_subscriber::EnvFilter;

// ── Test harness ──

struct TestRunner {
    total: usize,
    passed: usize,
    failed: usize,
}

const LINE: &str = "────────────────────────────────────────────────────────────";
const DEADLINE: Duration = Duration::from_secs(5);

impl TestRunner {
    fn new() -> Self {
        Self { total: 0, passed: 0, failed: 0 }
    }

    fn section(&self, name: &str) {
        println!("\n{}", LINE);
        println!("  {}", name);
        println!("{}", LINE);
    }

    fn pass(&mut self, name: &str) {
        self.total += 1;
        self.passed += 1;
        println!("  [{:2}] {:<52} PASS", self.total, name);
    }

    fn fail(&mut self, name: &str, reason: &str) {
        self.total += 1;
        self.failed += 1;
        println!("  [{:2}] {:<52} FAIL: {}", self.total, name, reason);
    }

    fn check(&mut self, name: &str, ok: bool, reason: &str) {
        if ok {
            self.pass(name);
        } else {
            self.fail(name, reason);
        }
    }

    fn summary(&self) {
        println!("\n{}", LINE);
        println!(
            "  Total: {}  Passed: {}  Failed: {}",
            self.total, self.passed, self.failed
        );
        println!("{}", LINE);
    }
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + DEADLINE;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}

/// Records the handle status seen by each invocation.
fn recorder() -> (LinkCallback, Arc<Mutex<Vec<i64>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let cb = callback(move |h| {
        if let Ok(mut v) = sink.lock() {
            v.push(h.status());
        }
    });
    (cb, seen)
}

fn calls(seen: &Arc<Mutex<Vec<i64>>>) -> Vec<i64> {
    seen.lock().map(|v| v.clone()).unwrap_or_default()
}

fn connected(h: &LinkHandle) -> bool {
    h.connection_status() == ConnectionState::Connected
}

// ════════════════════════════════════════════════════════════
// Part A: Output links
// ════════════════════════════════════════════════════════════

fn test_outputs(t: &mut TestRunner, engine: &Engine, sim: &SimService) {
    t.section("Part A: Output links");

    sim.add_point("dev:valve1", Values::Double(vec![0.0]));
    engine.set_accepting(false);
    let valve = LinkHandle::new();
    let (search_cb, searches) = recorder();
    let r = engine.add_output(
        &valve,
        "dev:valve1",
        DataType::Double,
        LinkOptions::SCALAR,
        Some(search_cb),
    );
    t.check("add_output dev:valve1", r.is_ok(), &format!("{:?}", r));
    t.check(
        "one command in flight",
        valve.in_flight_count() == 1,
        &format!("in_flight={}", valve.in_flight_count()),
    );
    engine.set_accepting(true);

    let ok = wait_until(|| connected(&valve));
    t.check("valve connects", ok, "still not connected");
    t.check(
        "search callback once",
        wait_until(|| calls(&searches).len() == 1),
        &format!("{:?}", calls(&searches)),
    );

    sim.hold_notifies(true);
    let (notify_cb, notifies) = recorder();
    let r = valve.put_callback(&[42.0f64], notify_cb);
    t.check("put_callback 42.0", r == Ok(1), &format!("{:?}", r));
    t.check("notify in progress", valve.notify_in_progress(), "flag not set");
    sim.release_notifies();
    sim.hold_notifies(false);
    let ok = wait_until(|| calls(&notifies) == vec![status::OK]);
    t.check("notify callback once with OK", ok, &format!("{:?}", calls(&notifies)));
    t.check("notify flag released", !valve.notify_in_progress(), "flag still set");
    t.check(
        "remote value written",
        sim.value("dev:valve1") == Some(Values::Double(vec![42.0])),
        &format!("{:?}", sim.value("dev:valve1")),
    );

    sim.add_point("dev:table", Values::Long(vec![0; 8]));
    let table = LinkHandle::new();
    let _ = engine.add_output(&table, "dev:table", DataType::Long, LinkOptions::SCALAR, None);
    wait_until(|| connected(&table));
    let r = table.put(&[7i32, 8, 9]);
    t.check("scalar put clamps to 1", r == Ok(1), &format!("{:?}", r));
    let ok = wait_until(|| {
        sim.value("dev:table")
            .map_or(false, |v| v.prefix(2) == Values::Long(vec![7, 0]))
    });
    t.check("only first element written", ok, &format!("{:?}", sim.value("dev:table")));

    let _ = valve.clear();
    let _ = table.clear();
}

// ════════════════════════════════════════════════════════════
// Part B: Input links
// ════════════════════════════════════════════════════════════

fn test_inputs(t: &mut TestRunner, engine: &Engine, sim: &SimService) {
    t.section("Part B: Input links");

    sim.add_point("dev:wave", Values::Short(vec![10, 20, 30, 40]));
    let order = Arc::new(Mutex::new(Vec::new()));
    let (o1, o2) = (Arc::clone(&order), Arc::clone(&order));
    let wave = LinkHandle::new();
    let r = engine.add_input(
        &wave,
        "dev:wave",
        DataType::Short,
        LinkOptions::default(),
        Some(callback(move |_| if let Ok(mut v) = o1.lock() { v.push('S') })),
        Some(callback(move |_| if let Ok(mut v) = o2.lock() { v.push('M') })),
    );
    t.check("add_input dev:wave", r.is_ok(), &format!("{:?}", r));
    let ok = wait_until(|| order.lock().map_or(false, |v| v.len() >= 2));
    let seen: Vec<char> = order.lock().map(|v| v.clone()).unwrap_or_default();
    t.check("search before monitor", ok && seen.starts_with(&['S', 'M']), &format!("{:?}", seen));

    let mut out = [0i16; 8];
    let r = wave.get(&mut out);
    let ok = matches!(r, Ok(ref reading) if reading.count == 4) && out[..4] == [10, 20, 30, 40];
    t.check("get snapshot clamps to 4", ok, &format!("{:?} {:?}", r, out));

    sim.set_value("dev:wave", Values::Short(vec![11, 21, 31, 41]));
    let (read_cb, reads) = recorder();
    let r = wave.get_callback(2, read_cb);
    t.check("get_callback count 2", r == Ok(2), &format!("{:?}", r));
    let ok = wait_until(|| calls(&reads) == vec![status::OK]);
    t.check("read callback once with OK", ok, &format!("{:?}", calls(&reads)));

    let ghost = LinkHandle::new();
    let _ = engine.add_input(
        &ghost,
        "dev:nowhere",
        DataType::Double,
        LinkOptions::default(),
        None,
        None,
    );
    std::thread::sleep(Duration::from_millis(50));
    let mut buf = [1.5f64; 2];
    let r = ghost.get(&mut buf);
    t.check(
        "unresolved input stays NotConnected",
        !connected(&ghost)
            && r.as_ref().map_err(|e| e.code()) == Err(status::FAILURE)
            && buf == [1.5; 2],
        &format!("{:?}", r),
    );

    let _ = wave.clear();
    let _ = ghost.clear();
}

// ════════════════════════════════════════════════════════════
// Part C: Failure paths
// ════════════════════════════════════════════════════════════

fn test_failures(t: &mut TestRunner, engine: &Engine, sim: &SimService) {
    t.section("Part C: Failure paths");

    sim.add_point("dev:valve2", Values::Double(vec![0.0]));
    let valve = LinkHandle::new();
    let _ = engine.add_output(&valve, "dev:valve2", DataType::Double, LinkOptions::SCALAR, None);
    wait_until(|| connected(&valve));

    sim.inject(Fault::PutSync);
    let (notify_cb, notifies) = recorder();
    let _ = valve.put_callback(&[1.0f64], notify_cb);
    let ok = wait_until(|| calls(&notifies) == vec![status::FATAL_ERROR]);
    t.check("sync put failure -> FATAL_ERROR callback", ok, &format!("{:?}", calls(&notifies)));

    sim.hold_notifies(true);
    let (first, _) = recorder();
    let (second, second_calls) = recorder();
    let _ = valve.put_callback(&[2.0f64], first);
    let r = valve.put_callback(&[3.0f64], second);
    t.check(
        "second put_callback -> NOTIFY_IN_PROGRESS",
        r.as_ref().map_err(|e| e.code()) == Err(status::NOTIFY_IN_PROGRESS),
        &format!("{:?}", r),
    );
    sim.release_notifies();
    sim.hold_notifies(false);
    t.check("rejected callback never runs", calls(&second_calls).is_empty(), "it ran");

    let first = valve.clear();
    let second = valve.clear();
    t.check("clear", first.is_ok(), &format!("{:?}", first));
    t.check(
        "clear again -> NotAttached",
        second == Err(LinkError::NotAttached),
        &format!("{:?}", second),
    );

    engine.set_accepting(false);
    let stuck = LinkHandle::new();
    let _ = engine.add_output(&stuck, "dev:valve2", DataType::Double, LinkOptions::SCALAR, None);
    let r = stuck.clear();
    t.check(
        "clear with queued search -> Abandoned",
        r == Ok(ClearOutcome::Abandoned),
        &format!("{:?}", r),
    );
    t.check("handle detached", !stuck.is_attached(), "still attached");
    engine.set_accepting(true);
    let ok = wait_until(|| stuck.in_flight_count() == 0);
    t.check("abandoned search released", ok, &format!("in_flight={}", stuck.in_flight_count()));
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== dynlink End-to-End Smoke Test ===");
    let config = EngineConfig::from_env()
        .input_pend_event_time(Duration::from_millis(10))
        .output_wake_timeout(Duration::from_millis(10))
        .output_pend(true);
    println!("    queue depth: {}", config.queue_depth);

    let sim = SimService::new().shared();
    let engine = Engine::new(sim.clone(), config);
    let mut t = TestRunner::new();

    if let Err(e) = engine.start() {
        println!("\nFATAL: engine start failed: {}", e);
        t.summary();
        std::process::exit(1);
    }

    test_outputs(&mut t, &engine, &sim);
    test_inputs(&mut t, &engine, &sim);
    test_failures(&mut t, &engine, &sim);

    engine.shutdown();
    t.check(
        "no clears left parked after shutdown",
        engine.deferred_clears() == 0 && sim.channel_count() == 0,
        &format!("deferred={} channels={}", engine.deferred_clears(), sim.channel_count()),
    );
    t.summary();
    std::process::exit(if t.failed > 0 { 1 } else { 0 });
}
