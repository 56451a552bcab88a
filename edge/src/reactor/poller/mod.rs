//! Platform-specific readiness poller.
//!
//! This module provides a unified interface over the OS readiness
//! mechanism: `epoll` on Linux, `kqueue` on macOS.
//!
//! The poller is used by the reactor to:
//! - register listening descriptors for read readiness,
//! - block until one of them has pending connections,
//! - wake up early when new commands are queued.
//!
//! The concrete implementation is selected at compile time
//! depending on the target operating system.

pub(crate) mod common;

pub(crate) use common::Waker;

#[cfg(target_os = "macos")]
mod kqueue;

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "macos")]
pub(crate) type Poller = kqueue::KqueuePoller;

#[cfg(target_os = "linux")]
pub(crate) type Poller = epoll::EpollPoller;

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(unix)]
pub(crate) use unix as platform;
