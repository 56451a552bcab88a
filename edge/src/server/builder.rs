use super::Server;
use crate::error::Result;
use crate::net::{AddressFamily, ListeningSocket};
use crate::reactor::ReactorHandle;

/// Backlog used by [`Server::incoming`] unless configured otherwise.
pub const DEFAULT_BACKLOG: u32 = 32;

/// Builder for configuring and creating a [`Server`].
///
/// # Examples
///
/// ```rust,ignore
/// let server = ServerBuilder::new()
///     .family(AddressFamily::Inet6)
///     .backlog(128)
///     .build(&reactor.handle())?;
/// ```
#[derive(Debug, Clone)]
pub struct ServerBuilder {
    /// Address family of the listening socket.
    family: AddressFamily,

    /// Whether `SO_REUSEADDR` is set before binding.
    reuse_address: bool,

    /// Value of `IPV6_V6ONLY` for `Inet6` sockets.
    only_v6: bool,

    /// Backlog used by [`Server::incoming`].
    backlog: u32,
}

impl ServerBuilder {
    /// Creates a builder with the default configuration: IPv4,
    /// `SO_REUSEADDR` on, backlog [`DEFAULT_BACKLOG`].
    pub fn new() -> Self {
        Self {
            family: AddressFamily::Inet,
            reuse_address: true,
            only_v6: false,
            backlog: DEFAULT_BACKLOG,
        }
    }

    /// Sets the address family of the listening socket.
    pub fn family(mut self, family: AddressFamily) -> Self {
        self.family = family;
        self
    }

    /// Enables or disables `SO_REUSEADDR`.
    pub fn reuse_address(mut self, on: bool) -> Self {
        self.reuse_address = on;
        self
    }

    /// Restricts an IPv6 listener to IPv6 peers.
    ///
    /// Off by default, which gives a dual-stack listener. Ignored for
    /// IPv4 sockets.
    pub fn only_v6(mut self, on: bool) -> Self {
        self.only_v6 = on;
        self
    }

    /// Sets the backlog used by [`Server::incoming`].
    pub fn backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Creates the listening socket and the server around it.
    ///
    /// # Errors
    ///
    /// Fails if the socket cannot be created or configured. The socket is
    /// closed in that case.
    pub fn build(self, reactor: &ReactorHandle) -> Result<Server> {
        let socket = ListeningSocket::create(self.family)?;
        self.configure(&socket)?;

        Ok(self.build_with(socket, reactor))
    }

    /// Applies the socket options to an existing, not yet bound socket.
    ///
    /// On error the socket is left open and still belongs to the caller.
    pub fn configure(&self, socket: &ListeningSocket) -> Result<()> {
        if self.reuse_address {
            socket.set_reuse_address(true)?;
        }

        if socket.family() == AddressFamily::Inet6 {
            socket.set_only_v6(self.only_v6)?;
        }

        Ok(())
    }

    /// Wraps a socket in a server without touching its options.
    ///
    /// Only the backlog setting applies; call [`configure`](Self::configure)
    /// first to apply the rest.
    pub fn build_with(self, socket: ListeningSocket, reactor: &ReactorHandle) -> Server {
        Server::from_socket(socket, self.backlog, reactor)
    }
}

impl Default for ServerBuilder {
    /// Creates a default `ServerBuilder`.
    fn default() -> Self {
        Self::new()
    }
}
