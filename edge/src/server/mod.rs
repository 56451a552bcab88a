//! Listening servers and their connection streams.
//!
//! A [`Server`] ties a [`ListeningSocket`] to a [`ReadinessSource`] on a
//! reactor. The source's teardown closes the socket, so every path that
//! ends the server (explicit [`shutdown`](Server::shutdown), disposal of
//! the subscription, an accept failure, reactor shutdown) goes through
//! the same single close.
//!
//! ```rust,ignore
//! let reactor = Reactor::start()?;
//! let server = Server::new(&reactor.handle())?;
//! server.bind("127.0.0.1", 8080)?;
//!
//! let subscription = server.incoming().subscribe(|event: Result<Connection>| match event {
//!     Ok(connection) => println!("accepted {}", connection.peer_addr()),
//!     Err(error) => eprintln!("server stopped: {error}"),
//! });
//! ```

mod accept;
mod builder;
mod incoming;
mod observer;
mod stream;

pub use builder::{DEFAULT_BACKLOG, ServerBuilder};
pub use incoming::{Incoming, Subscription};
pub use observer::Observer;
pub use stream::Connections;

use crate::error::Result;
use crate::net::{AddressFamily, ListeningSocket};
use crate::reactor::{ReactorHandle, ReadinessSource};

use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// A TCP server accepting connections on one listening socket.
#[derive(Debug)]
pub struct Server {
    socket: Arc<ListeningSocket>,
    source: ReadinessSource,

    /// Set while a subscription owns the accept loop.
    activated: Arc<AtomicBool>,

    backlog: u32,
}

impl Server {
    /// Returns a builder for configuring a server.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Creates a server with the default configuration.
    pub fn new(reactor: &ReactorHandle) -> Result<Self> {
        ServerBuilder::new().build(reactor)
    }

    pub(crate) fn from_socket(socket: ListeningSocket, backlog: u32, reactor: &ReactorHandle) -> Self {
        let socket = Arc::new(socket);
        let source = ReadinessSource::new(reactor, socket.fd(), {
            let socket = socket.clone();
            move || socket.close()
        });

        Self {
            socket,
            source,
            activated: Arc::new(AtomicBool::new(false)),
            backlog,
        }
    }

    /// Resolves `host:port` and binds the socket to the first candidate.
    ///
    /// Port `0` binds an ephemeral port; see [`local_addr`](Self::local_addr).
    /// On failure the socket stays open and owned by the server.
    pub fn bind(&self, host: &str, port: u16) -> Result<()> {
        self.socket.bind(host, port)
    }

    /// Binds to an already resolved address.
    pub fn bind_addr(&self, addr: SocketAddr) -> Result<()> {
        self.socket.bind_addr(addr)
    }

    /// Returns the address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Returns the address family of the listening socket.
    pub fn family(&self) -> AddressFamily {
        self.socket.family()
    }

    /// Returns the stream of accepted connections, listening with the
    /// configured backlog.
    pub fn incoming(&self) -> Incoming {
        self.incoming_with_backlog(self.backlog)
    }

    /// Returns the stream of accepted connections with an explicit backlog.
    pub fn incoming_with_backlog(&self, backlog: u32) -> Incoming {
        Incoming {
            socket: self.socket.clone(),
            source: self.source.clone(),
            activated: self.activated.clone(),
            backlog,
        }
    }

    /// Stops the server and closes the socket.
    ///
    /// An active subscription ends without an error. Calling this more
    /// than once, or after the stream has already ended, does nothing.
    pub fn shutdown(&self) {
        self.source.cancel();
    }

    /// Returns `true` once the listening socket has been closed.
    pub fn is_closed(&self) -> bool {
        self.socket.is_closed()
    }
}

impl AsRawFd for Server {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.fd()
    }
}
