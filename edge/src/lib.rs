//! # Edge
//!
//! **Edge** is a non-blocking TCP listening endpoint for the **Nebula**
//! ecosystem. It turns raw socket readiness into a cancellable stream of
//! accepted connections.
//!
//! A server is built from three pieces:
//!
//! - A **listening socket** that owns one non-blocking descriptor and
//!   exposes configure, bind, listen and accept-one primitives
//! - A **reactor** thread that watches descriptors with `epoll` (Linux)
//!   or `kqueue` (macOS) and calls each source's handler serially
//! - An **accept loop** that drains at most the reported number of
//!   pending connections per wake-up and ends the stream on the first
//!   hard error
//!
//! Cancelling the stream, shutting the server down, a failed accept and
//! stopping the reactor all close the listening socket through one
//! teardown that runs exactly once.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use edge::{Reactor, Server};
//!
//! fn main() -> edge::Result<()> {
//!     let reactor = Reactor::start()?;
//!
//!     let server = Server::builder().backlog(64).build(&reactor.handle())?;
//!     server.bind("127.0.0.1", 0)?;
//!     println!("listening on {}", server.local_addr()?);
//!
//!     let _subscription = server.incoming().subscribe(|event: edge::Result<edge::Connection>| {
//!         match event {
//!             Ok(connection) => println!("accepted {}", connection.peer_addr()),
//!             Err(error) => eprintln!("server failed: {error}"),
//!         }
//!     });
//!
//!     std::thread::park();
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`net`]: Address resolution, listening sockets and accepted connections
//! - [`reactor`]: The readiness thread and its sources
//! - [`server`]: Servers, subscriptions and the connection stream
//! - [`error`]: The error type shared by every fallible call
//!
//! ## Getting Started
//!
//! Add Edge to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! edge = { git = "https://github.com/Nebula-ecosystem/Edge", package = "edge" }
//! ```

pub mod error;
pub mod net;
pub mod reactor;
pub mod server;

pub use error::{Result, SystemError};
pub use net::{Accept, AddressFamily, Connection, ListeningSocket, resolve};
pub use reactor::{Reactor, ReactorHandle};
pub use server::{Connections, Incoming, Observer, Server, ServerBuilder, Subscription};
