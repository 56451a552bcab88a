use super::platform::sys_close;

use std::os::fd::RawFd;

/// Handle used to interrupt a blocking poll from another thread.
///
/// The wrapped descriptor is backend specific: an `eventfd` for
/// `epoll`, the `kqueue` itself for `kqueue`. It is closed when the
/// last reference goes away, so a late wake-up from a stale handle
/// never lands on a reused descriptor number.
pub(crate) struct Waker(pub(crate) RawFd);

unsafe impl Send for Waker {}
unsafe impl Sync for Waker {}

impl Drop for Waker {
    fn drop(&mut self) {
        sys_close(self.0);
    }
}
