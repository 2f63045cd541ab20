//! `SimService`: in-process `RemoteAccess` implementation.
//!
//! Holds a table of simulated points keyed by name. Requests take effect
//! on the table immediately; every completion and connectivity change is
//! queued as an event and delivered by whichever thread next calls
//! `pump_events()` or `pend_io()` (in the engine, a worker thread).
//!
//! Test hooks: `add_point`, `set_value`, `set_reachable`,
//! `hold_notifies`/`release_notifies`, and one-shot `inject(Fault)`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use dynlink_core::sync::{lock, wait_while};
use dynlink_core::{
    ChannelId, ConnectionEvent, ConnectionHandler, ConnectionState, ControlHandler,
    ControlInfo, DataType, MonitorHandler, NotifyHandler, ReadHandler, RemoteAccess,
    ServiceError, ServiceResult, Severity, SubscriptionId, TimedValues, Timestamp, Values,
};

/// Upper bound on event rounds delivered by one pump call.
const MAX_PUMP_ROUNDS: usize = 64;

/// One-shot failure to inject into the next matching request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// Next `connect` fails synchronously.
    ConnectSync,
    /// Next `get_with_callback` fails synchronously.
    GetSync,
    /// Next `get_with_callback` completes with an error.
    GetAsync,
    /// Next `put`/`put_with_callback` fails synchronously.
    PutSync,
    /// Next `put_with_callback` completes with an error.
    PutAsync,
    /// Next `get_control` completes with an error.
    ControlAsync,
}

type Event = Box<dyn FnOnce() + Send>;

struct SimPoint {
    value: TimedValues,
    control: ControlInfo,
    reachable: bool,
}

struct Subscription {
    id: SubscriptionId,
    count: usize,
    handler: Arc<MonitorHandler>,
}

struct SimChannel {
    name: String,
    connected: bool,
    on_connection: Arc<ConnectionHandler>,
    subscriptions: Vec<Subscription>,
}

#[derive(Default)]
struct SimState {
    points: HashMap<String, SimPoint>,
    channels: HashMap<u64, SimChannel>,
    next_id: u64,
    faults: HashMap<Fault, usize>,
    hold_notifies: bool,
    held: Vec<NotifyHandler>,
    writes: Vec<(String, Values)>,
    flushes: usize,
}

impl SimState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn take_fault(&mut self, fault: Fault) -> bool {
        match self.faults.get_mut(&fault) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }

    fn connected_channel(&self, channel: ChannelId) -> ServiceResult<&SimChannel> {
        let ch = self
            .channels
            .get(&channel.0)
            .ok_or(ServiceError::UnknownChannel(channel.0))?;
        if ch.connected {
            Ok(ch)
        } else {
            Err(ServiceError::Disconnected)
        }
    }

    /// Monitor deliveries for every subscription on `name`.
    fn monitor_events(&self, name: &str) -> Vec<Event> {
        let Some(point) = self.points.get(name) else {
            return Vec::new();
        };
        self.channels
            .values()
            .filter(|ch| ch.connected && ch.name == name)
            .flat_map(|ch| ch.subscriptions.iter())
            .map(|sub| monitor_event(sub, &point.value))
            .collect()
    }

    /// Apply a write to the named point.
    fn apply_write(&mut self, channel: ChannelId, values: &Values) -> ServiceResult<String> {
        let name = self.connected_channel(channel)?.name.clone();
        let point = self
            .points
            .get_mut(&name)
            .ok_or(ServiceError::Disconnected)?;
        if point.value.values.data_type() != values.data_type() {
            return Err(ServiceError::Rejected(format!(
                "type {} does not match {}",
                values.data_type(),
                point.value.values.data_type()
            )));
        }
        point.value.values.copy_prefix_from(values, values.len());
        point.value.timestamp = Timestamp::now();
        self.writes.push((name.clone(), values.clone()));
        Ok(name)
    }
}

fn monitor_event(sub: &Subscription, value: &TimedValues) -> Event {
    let handler = Arc::clone(&sub.handler);
    let update = TimedValues {
        values: value.values.prefix(sub.count),
        ..value.clone()
    };
    Box::new(move || handler(Ok(&update)))
}

fn connection_event(handler: &Arc<ConnectionHandler>, event: ConnectionEvent) -> Event {
    let handler = Arc::clone(handler);
    Box::new(move || handler(event))
}

/// In-process Remote Access Service.
#[derive(Default)]
pub struct SimService {
    state: Mutex<SimState>,
    events: Mutex<VecDeque<Event>>,
    ready: Condvar,
    /// Held while handlers run, so updates arrive in posting order even
    /// when both workers pump at once.
    dispatch: Mutex<()>,
}

impl SimService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new shared handle to a service instance.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn post(&self, events: impl IntoIterator<Item = Event>) {
        let mut queue = lock(&self.events);
        let before = queue.len();
        queue.extend(events);
        if queue.len() > before {
            self.ready.notify_all();
        }
    }

    /// Add (or replace) a reachable point. Channels already searching for
    /// `name` connect.
    pub fn add_point(&self, name: &str, values: Values) {
        self.add_point_with(name, values, ControlInfo::default());
    }

    pub fn add_point_with(&self, name: &str, values: Values, control: ControlInfo) {
        let events = {
            let mut st = lock(&self.state);
            st.points.insert(
                name.to_string(),
                SimPoint { value: TimedValues::new(values), control, reachable: true },
            );
            Self::connect_waiting(&mut st, name)
        };
        self.post(events);
    }

    /// Mark channels on `name` connected and return their Up events.
    fn connect_waiting(st: &mut SimState, name: &str) -> Vec<Event> {
        st.channels
            .values_mut()
            .filter(|ch| ch.name == name && !ch.connected)
            .map(|ch| {
                ch.connected = true;
                connection_event(&ch.on_connection, ConnectionEvent::Up)
            })
            .collect()
    }

    /// Update a point's value and notify its subscribers.
    pub fn set_value(&self, name: &str, values: Values) {
        let events = {
            let mut st = lock(&self.state);
            let Some(point) = st.points.get_mut(name) else {
                return;
            };
            point.value = TimedValues::new(values);
            st.monitor_events(name)
        };
        self.post(events);
    }

    /// Change the alarm state that accompanies future updates.
    pub fn set_alarm(&self, name: &str, alarm_status: i16, severity: Severity) {
        if let Some(point) = lock(&self.state).points.get_mut(name) {
            point.value.alarm_status = alarm_status;
            point.value.severity = severity;
        }
    }

    /// Bring every channel on `name` up or down.
    pub fn set_reachable(&self, name: &str, reachable: bool) {
        let events = {
            let mut st = lock(&self.state);
            let Some(point) = st.points.get_mut(name) else {
                return;
            };
            point.reachable = reachable;
            if reachable {
                Self::connect_waiting(&mut st, name)
            } else {
                st.channels
                    .values_mut()
                    .filter(|ch| ch.name == name && ch.connected)
                    .map(|ch| {
                        ch.connected = false;
                        connection_event(&ch.on_connection, ConnectionEvent::Down)
                    })
                    .collect()
            }
        };
        self.post(events);
    }

    /// Make the next `fault`-matching request fail.
    pub fn inject(&self, fault: Fault) {
        *lock(&self.state).faults.entry(fault).or_insert(0) += 1;
    }

    /// While held, acknowledged-write completions are parked instead of
    /// delivered.
    pub fn hold_notifies(&self, hold: bool) {
        lock(&self.state).hold_notifies = hold;
    }

    /// Deliver every parked acknowledged-write completion.
    pub fn release_notifies(&self) {
        let held = std::mem::take(&mut lock(&self.state).held);
        self.post(held.into_iter().map(|h| -> Event { Box::new(move || h(Ok(()))) }));
    }

    pub fn value(&self, name: &str) -> Option<Values> {
        lock(&self.state).points.get(name).map(|p| p.value.values.clone())
    }

    /// Every write applied so far, in order.
    pub fn writes(&self) -> Vec<(String, Values)> {
        lock(&self.state).writes.clone()
    }

    pub fn channel_count(&self) -> usize {
        lock(&self.state).channels.len()
    }

    pub fn subscription_count(&self, name: &str) -> usize {
        lock(&self.state)
            .channels
            .values()
            .filter(|ch| ch.name == name)
            .map(|ch| ch.subscriptions.len())
            .sum()
    }

    pub fn flush_count(&self) -> usize {
        lock(&self.state).flushes
    }

    /// Wait up to `timeout` for events, then deliver them outside every
    /// lock. Events posted by handlers are delivered in the same call.
    fn deliver(&self, timeout: Duration) {
        let mut wait = timeout;
        for _ in 0..MAX_PUMP_ROUNDS {
            {
                let queue = lock(&self.events);
                let queue = wait_while(&self.ready, queue, wait, |q| q.is_empty());
                if queue.is_empty() {
                    return;
                }
            }
            let _dispatching = lock(&self.dispatch);
            let batch: Vec<Event> = lock(&self.events).drain(..).collect();
            for event in batch {
                event();
            }
            wait = Duration::ZERO;
        }
    }
}

impl RemoteAccess for SimService {
    fn connect(
        &self,
        name: &str,
        on_connection: ConnectionHandler,
        _timeout: Duration,
    ) -> ServiceResult<ChannelId> {
        let (id, events) = {
            let mut st = lock(&self.state);
            if st.take_fault(Fault::ConnectSync) {
                return Err(ServiceError::Rejected("injected connect failure".into()));
            }
            let id = st.next_id();
            let reachable = st.points.get(name).map_or(false, |p| p.reachable);
            let on_connection = Arc::new(on_connection);
            let mut events = Vec::new();
            if reachable {
                events.push(connection_event(&on_connection, ConnectionEvent::Up));
            }
            st.channels.insert(
                id,
                SimChannel {
                    name: name.to_string(),
                    connected: reachable,
                    on_connection,
                    subscriptions: Vec::new(),
                },
            );
            (id, events)
        };
        self.post(events);
        Ok(ChannelId(id))
    }

    fn resolves_locally(&self, name: &str) -> bool {
        lock(&self.state).points.contains_key(name)
    }

    fn disconnect(&self, channel: ChannelId) -> ServiceResult<()> {
        lock(&self.state)
            .channels
            .remove(&channel.0)
            .map(|_| ())
            .ok_or(ServiceError::UnknownChannel(channel.0))
    }

    fn get_control(&self, channel: ChannelId, on_done: ControlHandler) -> ServiceResult<()> {
        let result = {
            let mut st = lock(&self.state);
            let name = st.connected_channel(channel)?.name.clone();
            if st.take_fault(Fault::ControlAsync) {
                Err(ServiceError::Io("injected metadata failure".into()))
            } else {
                st.points
                    .get(&name)
                    .map(|p| p.control.clone())
                    .ok_or(ServiceError::Disconnected)
            }
        };
        self.post([Box::new(move || on_done(result)) as Event]);
        Ok(())
    }

    fn subscribe(
        &self,
        channel: ChannelId,
        _data_type: DataType,
        count: usize,
        on_update: MonitorHandler,
    ) -> ServiceResult<SubscriptionId> {
        let (id, initial) = {
            let mut st = lock(&self.state);
            st.connected_channel(channel)?;
            let id = SubscriptionId(st.next_id());
            let sub = Subscription { id, count, handler: Arc::new(on_update) };
            let name = st.connected_channel(channel)?.name.clone();
            let initial = st.points.get(&name).map(|p| monitor_event(&sub, &p.value));
            if let Some(ch) = st.channels.get_mut(&channel.0) {
                ch.subscriptions.push(sub);
            }
            (id, initial)
        };
        self.post(initial);
        Ok(id)
    }

    fn get_with_callback(
        &self,
        channel: ChannelId,
        _data_type: DataType,
        count: usize,
        on_done: ReadHandler,
    ) -> ServiceResult<()> {
        let result = {
            let mut st = lock(&self.state);
            if st.take_fault(Fault::GetSync) {
                return Err(ServiceError::Rejected("injected read failure".into()));
            }
            let name = st.connected_channel(channel)?.name.clone();
            if st.take_fault(Fault::GetAsync) {
                Err(ServiceError::Io("injected read completion failure".into()))
            } else {
                st.points
                    .get(&name)
                    .map(|p| TimedValues {
                        values: p.value.values.prefix(count),
                        ..p.value.clone()
                    })
                    .ok_or(ServiceError::Disconnected)
            }
        };
        self.post([Box::new(move || on_done(result)) as Event]);
        Ok(())
    }

    fn put(&self, channel: ChannelId, values: &Values) -> ServiceResult<()> {
        let events = {
            let mut st = lock(&self.state);
            if st.take_fault(Fault::PutSync) {
                return Err(ServiceError::Rejected("injected write failure".into()));
            }
            let name = st.apply_write(channel, values)?;
            st.monitor_events(&name)
        };
        self.post(events);
        Ok(())
    }

    fn put_with_callback(
        &self,
        channel: ChannelId,
        values: &Values,
        on_done: NotifyHandler,
    ) -> ServiceResult<()> {
        let events = {
            let mut st = lock(&self.state);
            if st.take_fault(Fault::PutSync) {
                return Err(ServiceError::Rejected("injected write failure".into()));
            }
            let name = st.apply_write(channel, values)?;
            let mut events = st.monitor_events(&name);
            if st.take_fault(Fault::PutAsync) {
                events.push(Box::new(move || {
                    on_done(Err(ServiceError::Io("injected write completion failure".into())))
                }));
            } else if st.hold_notifies {
                st.held.push(on_done);
            } else {
                events.push(Box::new(move || on_done(Ok(()))));
            }
            events
        };
        self.post(events);
        Ok(())
    }

    fn element_count(&self, channel: ChannelId) -> usize {
        let st = lock(&self.state);
        st.connected_channel(channel)
            .ok()
            .and_then(|ch| st.points.get(&ch.name))
            .map_or(0, |p| p.value.values.len())
    }

    fn connection_state(&self, channel: ChannelId) -> ConnectionState {
        match lock(&self.state).connected_channel(channel) {
            Ok(_) => ConnectionState::Connected,
            Err(_) => ConnectionState::NotConnected,
        }
    }

    fn pump_events(&self, timeout: Duration) -> ServiceResult<()> {
        self.deliver(timeout);
        Ok(())
    }

    fn pend_io(&self, timeout: Duration) -> ServiceResult<()> {
        self.deliver(timeout);
        Ok(())
    }

    fn flush_outgoing(&self) -> ServiceResult<()> {
        lock(&self.state).flushes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_connection(counter: &Arc<AtomicUsize>) -> ConnectionHandler {
        let c = Arc::clone(counter);
        Box::new(move |ev| {
            if ev == ConnectionEvent::Up {
                c.fetch_add(1, Ordering::SeqCst);
            }
        })
    }

    #[test]
    fn test_connect_known_point() {
        let sim = SimService::new();
        sim.add_point("dev:a", Values::Double(vec![1.0]));
        let ups = Arc::new(AtomicUsize::new(0));
        let ch = sim.connect("dev:a", counting_connection(&ups), Duration::ZERO).unwrap();
        assert_eq!(sim.connection_state(ch), ConnectionState::Connected);
        assert_eq!(sim.element_count(ch), 1);
        // Handlers only run inside a pump.
        assert_eq!(ups.load(Ordering::SeqCst), 0);
        sim.pump_events(Duration::ZERO).unwrap();
        assert_eq!(ups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_point_never_connects() {
        let sim = SimService::new();
        let ups = Arc::new(AtomicUsize::new(0));
        let ch = sim.connect("nowhere", counting_connection(&ups), Duration::ZERO).unwrap();
        sim.pump_events(Duration::from_millis(5)).unwrap();
        assert_eq!(ups.load(Ordering::SeqCst), 0);
        assert_eq!(sim.connection_state(ch), ConnectionState::NotConnected);
        assert_eq!(sim.element_count(ch), 0);

        // A point appearing later resolves the waiting channel.
        sim.add_point("nowhere", Values::Long(vec![0; 3]));
        sim.pump_events(Duration::ZERO).unwrap();
        assert_eq!(ups.load(Ordering::SeqCst), 1);
        assert_eq!(sim.element_count(ch), 3);
    }

    #[test]
    fn test_subscription_delivers_initial_and_updates() {
        let sim = SimService::new();
        sim.add_point("dev:arr", Values::Short(vec![1, 2, 3]));
        let ch = sim.connect("dev:arr", Box::new(|_| {}), Duration::ZERO).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        sim.subscribe(
            ch,
            DataType::Short,
            2,
            Box::new(move |r: ServiceResult<&TimedValues>| {
                if let Ok(tv) = r {
                    lock(&s).push(tv.values.clone());
                }
            }),
        )
        .unwrap();
        sim.set_value("dev:arr", Values::Short(vec![7, 8, 9]));
        sim.pump_events(Duration::ZERO).unwrap();
        assert_eq!(
            *lock(&seen),
            vec![Values::Short(vec![1, 2]), Values::Short(vec![7, 8])]
        );
        assert_eq!(sim.subscription_count("dev:arr"), 1);
        sim.disconnect(ch).unwrap();
        assert_eq!(sim.subscription_count("dev:arr"), 0);
    }

    #[test]
    fn test_put_with_callback_hold_and_release() {
        let sim = SimService::new();
        sim.add_point("dev:valve", Values::Double(vec![0.0]));
        let ch = sim.connect("dev:valve", Box::new(|_| {}), Duration::ZERO).unwrap();
        sim.hold_notifies(true);
        let done = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&done);
        sim.put_with_callback(
            ch,
            &Values::Double(vec![42.0]),
            Box::new(move |r| {
                assert!(r.is_ok());
                d.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
        assert_eq!(sim.value("dev:valve"), Some(Values::Double(vec![42.0])));
        sim.pump_events(Duration::ZERO).unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 0);
        sim.release_notifies();
        sim.pump_events(Duration::ZERO).unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_injected_faults_are_one_shot() {
        let sim = SimService::new();
        sim.add_point("dev:x", Values::Long(vec![5]));
        let ch = sim.connect("dev:x", Box::new(|_| {}), Duration::ZERO).unwrap();
        sim.inject(Fault::PutSync);
        assert!(sim.put(ch, &Values::Long(vec![1])).is_err());
        assert!(sim.put(ch, &Values::Long(vec![2])).is_ok());

        sim.inject(Fault::GetSync);
        assert!(sim.get_with_callback(ch, DataType::Long, 1, Box::new(|_| {})).is_err());
        assert_eq!(sim.writes().len(), 1);
    }

    #[test]
    fn test_put_type_mismatch_rejected() {
        let sim = SimService::new();
        sim.add_point("dev:x", Values::Long(vec![5]));
        let ch = sim.connect("dev:x", Box::new(|_| {}), Duration::ZERO).unwrap();
        assert!(matches!(
            sim.put(ch, &Values::Double(vec![1.0])),
            Err(ServiceError::Rejected(_))
        ));
    }

    #[test]
    fn test_reachability_events() {
        let sim = SimService::new();
        sim.add_point("dev:y", Values::UChar(vec![0]));
        let downs = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&downs);
        let ch = sim
            .connect(
                "dev:y",
                Box::new(move |ev| {
                    if ev == ConnectionEvent::Down {
                        d.fetch_add(1, Ordering::SeqCst);
                    }
                }),
                Duration::ZERO,
            )
            .unwrap();
        sim.set_reachable("dev:y", false);
        sim.pump_events(Duration::ZERO).unwrap();
        assert_eq!(downs.load(Ordering::SeqCst), 1);
        assert_eq!(sim.connection_state(ch), ConnectionState::NotConnected);
        assert!(sim.put(ch, &Values::UChar(vec![1])).is_err());
    }
}
