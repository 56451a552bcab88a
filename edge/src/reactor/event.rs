use std::os::fd::RawFd;

/// A read-readiness event reported by the poller.
///
/// An `Event` names the ready descriptor and, when the backend knows it,
/// how many operations are pending on it. It is produced by the poller
/// and consumed by the reactor to run the matching source's handler.
pub(crate) struct Event {
    /// The descriptor that became readable.
    pub(crate) fd: RawFd,

    /// Pending count reported by the backend, `0` when unknown.
    ///
    /// For a listening socket under `kqueue` this is the accept backlog
    /// length. `epoll` never fills it in.
    pub(crate) pending: usize,
}
