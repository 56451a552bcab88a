//! macOS `kqueue`-based poller implementation.
//!
//! Functionally equivalent to the Linux `epoll` poller. `EVFILT_READ`
//! on a listening socket reports the accept backlog length in `data`,
//! which is forwarded as the event's pending count.

use super::platform::sys_close;
use crate::error::{Operation, Result, SystemError};
use crate::reactor::event::Event;
use crate::reactor::poller::Waker;

use libc::{
    EV_ADD, EV_CLEAR, EV_DELETE, EV_ENABLE, EVFILT_READ, EVFILT_USER, NOTE_TRIGGER, kevent,
    kqueue,
};
use std::os::unix::io::RawFd;
use std::ptr;
use std::sync::Arc;

/// Identifier of the `EVFILT_USER` wake-up event.
const WAKE_IDENT: usize = usize::MAX;

/// macOS `kqueue` poller.
pub(crate) struct KqueuePoller {
    /// Kqueue file descriptor, owned by `waker`.
    kqueue: RawFd,

    /// Reusable buffer for kernel events.
    events: Vec<kevent>,

    /// Waker triggering the user event on the same kqueue.
    waker: Arc<Waker>,
}

unsafe impl Send for KqueuePoller {}

impl Waker {
    /// Wake the poller by triggering the `EVFILT_USER` event.
    pub(crate) fn wake(&self) {
        let event = change(WAKE_IDENT, EVFILT_USER, 0, NOTE_TRIGGER);
        unsafe {
            kevent(self.0, &event, 1, ptr::null_mut(), 0, ptr::null());
        }
    }
}

fn change(ident: usize, filter: i16, flags: u16, fflags: u32) -> kevent {
    kevent {
        ident,
        filter,
        flags,
        fflags,
        data: 0,
        udata: ptr::null_mut(),
    }
}

fn apply(kqueue: RawFd, event: &kevent) -> i32 {
    unsafe { kevent(kqueue, event, 1, ptr::null_mut(), 0, ptr::null()) }
}

impl KqueuePoller {
    /// Creates the kqueue and registers the user wake-up event.
    pub(crate) fn new() -> Result<Self> {
        let kqueue = unsafe { kqueue() };
        if kqueue < 0 {
            return Err(SystemError::last_os_error(Operation::Poll));
        }

        let wake = change(WAKE_IDENT, EVFILT_USER, EV_ADD | EV_ENABLE | EV_CLEAR, 0);
        if apply(kqueue, &wake) < 0 {
            let error = SystemError::last_os_error(Operation::Register);
            sys_close(kqueue);
            return Err(error);
        }

        Ok(Self {
            kqueue,
            events: Vec::with_capacity(64),
            waker: Arc::new(Waker(kqueue)),
        })
    }

    /// Return the poller waker.
    pub(crate) fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    /// Register a descriptor for read readiness (level-triggered).
    pub(crate) fn register(&self, fd: RawFd) -> Result<()> {
        let event = change(fd as usize, EVFILT_READ, EV_ADD | EV_ENABLE, 0);

        if apply(self.kqueue, &event) < 0 {
            Err(SystemError::last_os_error(Operation::Register))
        } else {
            Ok(())
        }
    }

    /// Remove a descriptor from the poller.
    pub(crate) fn deregister(&self, fd: RawFd) {
        let event = change(fd as usize, EVFILT_READ, EV_DELETE, 0);
        apply(self.kqueue, &event);
    }

    /// Blocks until a descriptor becomes ready or the waker fires.
    pub(crate) fn poll(&mut self, events: &mut Vec<Event>) -> Result<()> {
        let n = unsafe {
            kevent(
                self.kqueue,
                ptr::null(),
                0,
                self.events.as_mut_ptr(),
                self.events.capacity() as i32,
                ptr::null(),
            )
        };

        if n < 0 {
            let error = SystemError::last_os_error(Operation::Poll);
            if error.raw_os_error() == Some(libc::EINTR) {
                return Ok(());
            }
            return Err(error);
        }

        unsafe {
            self.events.set_len(n as usize);
        }

        for ev in &self.events {
            if ev.filter == EVFILT_USER {
                continue;
            }

            if ev.filter == EVFILT_READ {
                events.push(Event {
                    fd: ev.ident as RawFd,
                    pending: ev.data.max(0) as usize,
                });
            }
        }

        Ok(())
    }
}
