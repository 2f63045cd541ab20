//! Handlers registered with the `RemoteAccess` service.
//!
//! Each handler holds a `Weak` reference to the private state it was
//! issued for and does nothing once that state is detached or released.
//! Every payload arrives as a `Result`; the error arm never touches link
//! data.

use std::sync::{Arc, Weak};

use tracing::{debug, error, warn};

use dynlink_core::status;
use dynlink_core::{
    ChannelId, ConnectionEvent, ConnectionHandler, ControlHandler, ControlInfo, Direction,
    LinkState, MonitorHandler, NotifyHandler, ReadHandler, ServiceResult, TimedValues, Values,
};

use crate::handle::LinkHandle;
use crate::pvt::{LinkData, LinkPvt};

/// Upgrade only while the link is still attached.
fn live(weak: &Weak<LinkPvt>) -> Option<Arc<LinkPvt>> {
    weak.upgrade().filter(|pvt| pvt.is_attached())
}

// ============================================================================
// Connection and metadata
// ============================================================================

pub(crate) fn connection_handler(pvt: &Arc<LinkPvt>, handle: &LinkHandle) -> ConnectionHandler {
    let weak = Arc::downgrade(pvt);
    let handle = handle.clone();
    Box::new(move |event| {
        if let Some(pvt) = live(&weak) {
            on_connection(&pvt, &handle, event);
        }
    })
}

fn on_connection(pvt: &Arc<LinkPvt>, handle: &LinkHandle, event: ConnectionEvent) {
    if pvt.chatty(5) {
        debug!(link = pvt.name(), ?event, "connection event");
    }
    match event {
        ConnectionEvent::Up => {
            let Some(channel) = pvt.channel() else {
                return;
            };
            pvt.set_state(LinkState::FetchingMetadata);
            let service = pvt.shared().service();
            if let Err(e) = service.get_control(channel, control_handler(pvt, handle)) {
                error!(link = pvt.name(), "metadata request failed: {}", e);
            }
        }
        ConnectionEvent::Down => {
            // A new connection attempt starts; metadata readers refuse
            // until it completes.
            pvt.set_state(LinkState::Searching);
            if let Some(cb) = pvt.search_cb() {
                cb(handle);
            }
        }
    }
}

fn control_handler(pvt: &Arc<LinkPvt>, handle: &LinkHandle) -> ControlHandler {
    let weak = Arc::downgrade(pvt);
    let handle = handle.clone();
    Box::new(move |result: ServiceResult<ControlInfo>| {
        let Some(pvt) = live(&weak) else {
            return;
        };
        match result {
            Ok(info) => on_metadata(&pvt, &handle, info),
            Err(e) => warn!(link = pvt.name(), "metadata fetch failed: {}", e),
        }
    })
}

/// Metadata arrived: size the buffer, report the connection, then
/// subscribe. `search_cb` therefore always runs before the first monitor
/// update of each connection.
fn on_metadata(pvt: &Arc<LinkPvt>, handle: &LinkHandle, info: ControlInfo) {
    let Some(channel) = pvt.channel() else {
        return;
    };
    let service = pvt.shared().service();
    let element_count = service.element_count(channel);
    let request_count = if pvt.is_scalar() {
        element_count.min(1)
    } else {
        element_count
    };
    {
        let mut data = pvt.lock_data();
        data.control = info;
        data.element_count = element_count;
        data.request_count = request_count;
        // A reconnect to a point of the same size keeps the last value.
        if data.buffer.as_ref().map(Values::len) != Some(element_count) {
            data.buffer = Some(Values::zeroed(pvt.data_type(), element_count));
        }
    }
    pvt.set_state(LinkState::Connected);
    handle.set_status(status::OK);
    if pvt.chatty(5) {
        debug!(link = pvt.name(), element_count, "link connected");
    }

    if let Some(cb) = pvt.search_cb() {
        cb(handle);
    }
    if pvt.direction() == Direction::Input {
        let resubscribed = subscribe_once(pvt, handle, channel, element_count);
        if !resubscribed {
            refresh(pvt, handle, channel, request_count);
        }
    }
}

/// Subscribe unless the link already holds a subscription. Returns false
/// when an existing subscription was kept.
fn subscribe_once(
    pvt: &Arc<LinkPvt>,
    handle: &LinkHandle,
    channel: ChannelId,
    count: usize,
) -> bool {
    let mut subscription = pvt.lock_subscription();
    if subscription.is_some() {
        return false;
    }
    let service = pvt.shared().service();
    match service.subscribe(channel, pvt.data_type(), count, monitor_handler(pvt, handle)) {
        Ok(id) => *subscription = Some(id),
        Err(e) => error!(link = pvt.name(), "subscribe failed: {}", e),
    }
    true
}

/// Re-read the value after a reconnect. Updates that arrived while the
/// link was fetching metadata were dropped, so this one stands in for
/// the initial update of a fresh subscription.
fn refresh(pvt: &Arc<LinkPvt>, handle: &LinkHandle, channel: ChannelId, count: usize) {
    let weak = Arc::downgrade(pvt);
    let reader = handle.clone();
    let on_done: ReadHandler = Box::new(move |result: ServiceResult<TimedValues>| {
        let Some(pvt) = live(&weak) else {
            return;
        };
        match result {
            Ok(update) => deliver_update(&pvt, &reader, &update),
            Err(e) => warn!(link = pvt.name(), "reconnect refresh failed: {}", e),
        }
    });
    let service = pvt.shared().service();
    if let Err(e) = service.get_with_callback(channel, pvt.data_type(), count, on_done) {
        error!(link = pvt.name(), "reconnect refresh request failed: {}", e);
    }
}

// ============================================================================
// Value updates
// ============================================================================

fn monitor_handler(pvt: &Arc<LinkPvt>, handle: &LinkHandle) -> MonitorHandler {
    let weak = Arc::downgrade(pvt);
    let handle = handle.clone();
    Box::new(move |result: ServiceResult<&TimedValues>| {
        let Some(pvt) = live(&weak) else {
            return;
        };
        match result {
            Ok(update) => deliver_update(&pvt, &handle, update),
            Err(e) => warn!(link = pvt.name(), "monitor update failed: {}", e),
        }
    })
}

/// Store a value update and run `monitor_cb`. Updates reaching a link
/// that is not connected belong to a connection whose `search_cb` has
/// not run yet, so they are dropped.
fn deliver_update(pvt: &LinkPvt, handle: &LinkHandle, update: &TimedValues) {
    if pvt.state() != LinkState::Connected {
        if pvt.chatty(10) {
            debug!(link = pvt.name(), state = ?pvt.state(), "update dropped");
        }
        return;
    }
    store_update(pvt, update);
    handle.set_status(status::OK);
    if let Some(cb) = pvt.monitor_cb() {
        cb(handle);
    }
}

/// Copy an update into the link buffer, up to `request_count` elements.
fn store_update(pvt: &LinkPvt, update: &TimedValues) {
    let mut data = pvt.lock_data();
    let LinkData { buffer, request_count, .. } = &mut *data;
    let copied = match buffer {
        Some(buf) => buf.copy_prefix_from(&update.values, *request_count),
        None => 0,
    };
    if copied == 0 && !update.values.is_empty() && buffer.is_some() {
        warn!(
            link = pvt.name(),
            "update of type {} dropped, link holds {}",
            update.values.data_type(),
            pvt.data_type()
        );
    }
    data.timestamp = update.timestamp;
    data.alarm_status = update.alarm_status;
    data.severity = update.severity;
    drop(data);

    if pvt.chatty(5) && update.values.len() > 1 {
        debug!(link = pvt.name(), "update {}", update.values.head_summary());
    }
}

pub(crate) fn read_handler(pvt: &Arc<LinkPvt>, handle: &LinkHandle) -> ReadHandler {
    let weak = Arc::downgrade(pvt);
    let handle = handle.clone();
    Box::new(move |result: ServiceResult<TimedValues>| {
        let Some(pvt) = live(&weak) else {
            return;
        };
        match result {
            Ok(update) => {
                store_update(&pvt, &update);
                handle.set_status(status::OK);
            }
            Err(e) => {
                warn!(link = pvt.name(), "read completion failed: {}", e);
                handle.set_status(status::FATAL_ERROR);
            }
        }
        handle.set_read_callback_pending(false);
        if let Some(cb) = pvt.take_read_cb() {
            cb(&handle);
        }
    })
}

pub(crate) fn notify_handler(pvt: &Arc<LinkPvt>, handle: &LinkHandle) -> NotifyHandler {
    let weak = Arc::downgrade(pvt);
    let handle = handle.clone();
    Box::new(move |result: ServiceResult<()>| {
        let Some(pvt) = live(&weak) else {
            return;
        };
        match result {
            Ok(()) => handle.set_status(status::OK),
            Err(e) => {
                warn!(link = pvt.name(), "write completion failed: {}", e);
                handle.set_status(status::FATAL_ERROR);
            }
        }
        // Released before the callback so it may issue the next write.
        pvt.release_notify();
        if let Some(cb) = pvt.take_notify_cb() {
            cb(&handle);
        }
    })
}
