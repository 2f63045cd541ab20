//! Commands carried from caller threads to the worker threads.

use std::fmt;
use std::sync::Arc;

use crate::handle::LinkHandle;
use crate::pending::PendingTicket;
use crate::pvt::LinkPvt;

/// A handle together with the private state a command was issued for.
///
/// The private state is pinned here rather than re-read from the handle at
/// dispatch time: the handle may have been cleared and reattached since.
pub struct LinkRef {
    pub handle: LinkHandle,
    pub pvt: Arc<LinkPvt>,
    _ticket: PendingTicket,
}

impl LinkRef {
    /// Pin `pvt` and register one pending operation on `handle`.
    pub fn new(handle: &LinkHandle, pvt: &Arc<LinkPvt>) -> Self {
        Self {
            handle: handle.clone(),
            pvt: Arc::clone(pvt),
            _ticket: handle.pending().issue(),
        }
    }
}

pub enum Command {
    /// Resolve and connect the link's remote point.
    Search(LinkRef),
    /// Tear down private state. The only path that releases it.
    Clear(Arc<LinkPvt>),
    Put(LinkRef),
    PutCallback(LinkRef),
    GetCallback(LinkRef),
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Search(_) => "search",
            Command::Clear(_) => "clear",
            Command::Put(_) => "put",
            Command::PutCallback(_) => "put-callback",
            Command::GetCallback(_) => "get-callback",
        }
    }

    pub fn pvt(&self) -> &Arc<LinkPvt> {
        match self {
            Command::Clear(pvt) => pvt,
            Command::Search(l)
            | Command::Put(l)
            | Command::PutCallback(l)
            | Command::GetCallback(l) => &l.pvt,
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}('{}')", self.kind(), self.pvt().name())
    }
}
