//! Linux `epoll`-based poller implementation.
//!
//! Responsibilities:
//! - Register listening descriptors for (level-triggered) read readiness
//! - Block waiting for readiness
//! - Wake the reactor when new commands are submitted
//!
//! Level triggering matters here: if a drain stops early, the listener
//! is reported again on the next poll instead of being forgotten.

use super::platform::sys_close;
use crate::error::{Operation, Result, SystemError};
use crate::reactor::event::Event;
use crate::reactor::poller::Waker;

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLLERR, EPOLLHUP, EPOLLIN, epoll_create1,
    epoll_ctl, epoll_event, epoll_wait,
};
use std::os::unix::io::RawFd;
use std::sync::Arc;

/// Reserved token used internally for the wake-up event.
///
/// Registered descriptors use their own (non-negative) number as token,
/// so `u64::MAX` can never collide.
const WAKE_TOKEN: u64 = u64::MAX;

/// Linux `epoll` poller.
///
/// This poller owns:
/// - an `epoll` instance,
/// - an internal `eventfd` used as a wake-up signal,
/// - a reusable event buffer.
pub(crate) struct EpollPoller {
    /// Epoll file descriptor.
    epoll: RawFd,

    /// Reusable buffer for epoll events.
    events: Vec<epoll_event>,

    /// Waker wrapping the internal eventfd.
    waker: Arc<Waker>,
}

unsafe impl Send for EpollPoller {}

impl Waker {
    /// Wake the poller.
    ///
    /// This writes to the internal `eventfd`, causing `epoll_wait`
    /// to return immediately.
    pub(crate) fn wake(&self) {
        let buf: u64 = 1;
        unsafe {
            libc::write(self.0, &buf as *const _ as *const _, 8);
        }
    }
}

impl EpollPoller {
    /// Create a new `EpollPoller`.
    ///
    /// This creates the epoll instance and a non-blocking `eventfd`
    /// registered as a persistent wake source.
    pub(crate) fn new() -> Result<Self> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(SystemError::last_os_error(Operation::Poll));
        }

        let eventfd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if eventfd < 0 {
            let error = SystemError::last_os_error(Operation::Poll);
            sys_close(epoll);
            return Err(error);
        }

        let mut event = epoll_event {
            events: EPOLLIN as u32,
            u64: WAKE_TOKEN,
        };

        let rc = unsafe { epoll_ctl(epoll, EPOLL_CTL_ADD, eventfd, &mut event) };
        if rc < 0 {
            let error = SystemError::last_os_error(Operation::Register);
            sys_close(eventfd);
            sys_close(epoll);
            return Err(error);
        }

        Ok(Self {
            epoll,
            events: Vec::with_capacity(64),
            waker: Arc::new(Waker(eventfd)),
        })
    }

    /// Return the poller waker.
    pub(crate) fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    /// Register a descriptor for read readiness.
    pub(crate) fn register(&self, fd: RawFd) -> Result<()> {
        let mut event = epoll_event {
            events: EPOLLIN as u32,
            u64: fd as u64,
        };

        let rc = unsafe { epoll_ctl(self.epoll, EPOLL_CTL_ADD, fd, &mut event) };
        if rc < 0 {
            Err(SystemError::last_os_error(Operation::Register))
        } else {
            Ok(())
        }
    }

    /// Remove a descriptor from the poller.
    pub(crate) fn deregister(&self, fd: RawFd) {
        unsafe {
            epoll_ctl(self.epoll, EPOLL_CTL_DEL, fd, std::ptr::null_mut());
        }
    }

    /// Poll for readiness events.
    ///
    /// Blocks until a descriptor becomes ready or the waker fires.
    /// `epoll` carries no pending count, so
    /// every event reports `pending == 0` and the reactor asks the
    /// socket itself.
    pub(crate) fn poll(&mut self, events: &mut Vec<Event>) -> Result<()> {
        let n = unsafe {
            epoll_wait(
                self.epoll,
                self.events.as_mut_ptr(),
                self.events.capacity() as i32,
                -1,
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
            if ev.u64 == WAKE_TOKEN {
                let mut buf = 0u64;
                unsafe {
                    libc::read(self.waker.0, &mut buf as *mut _ as *mut _, 8);
                }
                continue;
            }

            let readable = ev.events & ((EPOLLIN | EPOLLERR | EPOLLHUP) as u32) != 0;
            if readable {
                events.push(Event {
                    fd: ev.u64 as RawFd,
                    pending: 0,
                });
            }
        }

        Ok(())
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        sys_close(self.epoll);
    }
}
