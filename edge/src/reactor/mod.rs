//! Reactor thread and readiness sources.
//!
//! This module implements the execution context that delivers
//! readiness notifications. The reactor is responsible for:
//! - driving OS readiness (`epoll`/`kqueue`),
//! - calling source handlers with the pending count, serially,
//! - running each source's teardown exactly once on cancellation.
//!
//! A [`Reactor`] is started explicitly and its [`ReactorHandle`] is
//! injected into whatever needs it; there is no global instance.

mod core;
mod event;
mod source;

pub(crate) mod command;
pub(crate) mod poller;

pub use core::{Reactor, ReactorHandle};
pub use source::{ReadinessHandler, ReadinessSource};
