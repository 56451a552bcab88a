//! TCP networking primitives.
//!
//! This module provides the synchronous, non-blocking building blocks
//! the [`server`](crate::server) drives: address resolution, the
//! listening socket and the connections it accepts.
//!
//! Nothing here blocks or waits for readiness on its own; pair a
//! [`ListeningSocket`] with a [`ReadinessSource`](crate::reactor::ReadinessSource)
//! (or simply use [`Server`](crate::server::Server)) to be woken up.
mod tcp;

pub use tcp::connection::Connection;
pub use tcp::family::AddressFamily;
pub use tcp::listener::{Accept, ListeningSocket};
pub use tcp::resolver::{Resolved, resolve};
