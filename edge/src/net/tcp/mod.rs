//! TCP listening primitives.
//!
//! It is split into:
//! - [`resolver`]: turning a host/port pair into bindable addresses,
//! - [`listener`]: the non-blocking listening socket,
//! - [`connection`]: connections handed out by the listener.

pub mod connection;
pub mod family;
pub mod listener;
pub mod resolver;
