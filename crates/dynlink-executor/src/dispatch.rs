//! Command dispatch, run on the worker threads.
//!
//! ```text
//! Search       connect(name)            -> connection handler takes over
//! Clear        disconnect, drop buffer  -> private state released
//! Put          put(buffer prefix)
//! PutCallback  put_with_callback        -> notify handler
//! GetCallback  get_with_callback        -> read handler
//! ```
//!
//! A request the service rejects synchronously never reaches its handler,
//! so dispatch invokes the user callback itself with `FATAL_ERROR`.

use tracing::{debug, error};

use dynlink_core::{status, Direction, LinkState};

use crate::command::{Command, LinkRef};
use crate::protocol;
use crate::pvt::LinkPvt;
use crate::shared::Shared;

/// Dispatch one command. Returns true if a read-with-acknowledgement was
/// issued, so the input worker waits on I/O rather than events.
///
/// The command's pending ticket is released when this returns.
pub fn dispatch(shared: &Shared, cmd: Command) -> bool {
    if shared.chatty(10) {
        debug!("dispatch {:?}", cmd);
    }
    let link = match &cmd {
        Command::Clear(pvt) => {
            teardown(shared, pvt);
            return false;
        }
        Command::Search(link)
        | Command::Put(link)
        | Command::PutCallback(link)
        | Command::GetCallback(link) => link,
    };
    if !link.pvt.is_attached() {
        // Cleared while queued; the Clear behind it does the teardown.
        if shared.chatty(10) {
            debug!("skip {:?}, link detached", cmd);
        }
        return false;
    }
    if link.pvt.name().is_empty() || !direction_ok(&cmd) {
        error!("logic error: cannot dispatch {:?}", cmd);
        return false;
    }
    match &cmd {
        Command::Search(link) => search(shared, link),
        Command::Put(link) => put(shared, link, false),
        Command::PutCallback(link) => put(shared, link, true),
        Command::GetCallback(link) => return get_callback(shared, link),
        Command::Clear(_) => {}
    }
    false
}

fn direction_ok(cmd: &Command) -> bool {
    let dir = cmd.pvt().direction();
    match cmd {
        Command::Search(_) | Command::Clear(_) => true,
        Command::Put(_) | Command::PutCallback(_) => dir == Direction::Output,
        Command::GetCallback(_) => dir == Direction::Input,
    }
}

fn search(shared: &Shared, link: &LinkRef) {
    let pvt = &link.pvt;
    pvt.set_state(LinkState::Searching);
    let mut channel = pvt.lock_channel();
    let handler = protocol::connection_handler(pvt, &link.handle);
    match shared.service().connect(pvt.name(), handler, shared.config().connect_timeout) {
        Ok(id) => {
            *channel = Some(id);
            if shared.chatty(10) {
                debug!(link = pvt.name(), channel = id.0, "search issued");
            }
        }
        Err(e) => {
            drop(channel);
            error!(link = pvt.name(), "connect failed: {}", e);
            if let Some(cb) = pvt.search_cb() {
                cb(&link.handle);
            }
        }
    }
}

fn put(shared: &Shared, link: &LinkRef, notify: bool) {
    let pvt = &link.pvt;
    let outgoing = {
        let data = pvt.lock_data();
        data.buffer.as_ref().map(|buf| buf.prefix(data.request_count))
    };
    let result = match (pvt.channel(), outgoing) {
        (Some(ch), Some(values)) => {
            if shared.chatty(10) {
                debug!(link = pvt.name(), "put {}", values.head_summary());
            }
            if notify {
                let handler = protocol::notify_handler(pvt, &link.handle);
                shared.service().put_with_callback(ch, &values, handler)
            } else {
                shared.service().put(ch, &values)
            }
        }
        _ => Err(dynlink_core::ServiceError::Disconnected),
    };
    if let Err(e) = result {
        error!(link = pvt.name(), "put failed: {}", e);
        link.handle.set_status(status::FATAL_ERROR);
        if notify {
            pvt.release_notify();
            if let Some(cb) = pvt.take_notify_cb() {
                cb(&link.handle);
            }
        }
    }
}

fn get_callback(shared: &Shared, link: &LinkRef) -> bool {
    let pvt = &link.pvt;
    let count = pvt.lock_data().request_count;
    let result = match pvt.channel() {
        Some(ch) => {
            let handler = protocol::read_handler(pvt, &link.handle);
            shared.service().get_with_callback(ch, pvt.data_type(), count, handler)
        }
        None => Err(dynlink_core::ServiceError::Disconnected),
    };
    match result {
        Ok(()) => true,
        Err(e) => {
            error!(link = pvt.name(), "get failed: {}", e);
            fail_read(link);
            false
        }
    }
}

fn fail_read(link: &LinkRef) {
    link.handle.set_status(status::FATAL_ERROR);
    link.handle.set_read_callback_pending(false);
    if let Some(cb) = link.pvt.take_read_cb() {
        cb(&link.handle);
    }
}

/// Release everything the private state holds on the service side.
pub fn teardown(shared: &Shared, pvt: &LinkPvt) {
    let channel = pvt.lock_channel().take();
    pvt.lock_subscription().take();
    if let Some(ch) = channel {
        if let Err(e) = shared.service().disconnect(ch) {
            debug!(link = pvt.name(), "disconnect: {}", e);
        }
    }
    pvt.lock_data().buffer = None;
    pvt.take_notify_cb();
    pvt.take_read_cb();
    if shared.chatty(10) {
        debug!(link = pvt.name(), "private state released");
    }
}

/// Settle a command that will never be dispatched.
pub fn reject(shared: &Shared, cmd: Command) {
    match cmd {
        Command::Clear(pvt) => teardown(shared, &pvt),
        Command::PutCallback(link) if link.pvt.is_attached() => {
            link.handle.set_status(status::FATAL_ERROR);
            link.pvt.release_notify();
            if let Some(cb) = link.pvt.take_notify_cb() {
                cb(&link.handle);
            }
        }
        Command::GetCallback(link) if link.pvt.is_attached() => fail_read(&link),
        other => {
            if shared.chatty(10) {
                debug!("dropping {:?}", other);
            }
        }
    }
}
