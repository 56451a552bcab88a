use super::family::AddressFamily;
use crate::error::Result;
use crate::reactor::poller::platform::{sys_is_nonblocking, sys_sockname};

use std::net::{SocketAddr, TcpStream};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};

/// A connection accepted by a listening socket.
///
/// The connection owns its descriptor outright: nothing in the listener
/// keeps a reference to it once it has been emitted. Its descriptor is
/// already in non-blocking mode.
///
/// Dropping a `Connection` closes the socket. Use
/// [`into_std`](Self::into_std) or the `OwnedFd` conversion to hand it to
/// another I/O layer.
#[derive(Debug)]
pub struct Connection {
    /// The accepted socket.
    fd: OwnedFd,

    /// Address family inherited from the listening socket.
    family: AddressFamily,

    /// Address of the remote end.
    peer: SocketAddr,
}

impl Connection {
    /// Takes ownership of a freshly accepted descriptor.
    ///
    /// # Safety
    ///
    /// `fd` must be an open socket that nothing else owns.
    pub(crate) unsafe fn from_accepted(fd: RawFd, family: AddressFamily, peer: SocketAddr) -> Self {
        Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
            family,
            peer,
        }
    }

    /// Returns the address family of the listening socket.
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    /// Returns the remote address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Returns the local address of this connection.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        sys_sockname(self.fd.as_raw_fd())
    }

    /// Reads the descriptor's current `O_NONBLOCK` flag.
    pub fn is_nonblocking(&self) -> Result<bool> {
        sys_is_nonblocking(self.fd.as_raw_fd())
    }

    /// Converts into a standard library stream, keeping non-blocking mode.
    pub fn into_std(self) -> TcpStream {
        TcpStream::from(self.fd)
    }
}

impl AsRawFd for Connection {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl AsFd for Connection {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl IntoRawFd for Connection {
    fn into_raw_fd(self) -> RawFd {
        self.fd.into_raw_fd()
    }
}

impl From<Connection> for OwnedFd {
    fn from(connection: Connection) -> Self {
        connection.fd
    }
}

impl From<Connection> for TcpStream {
    fn from(connection: Connection) -> Self {
        connection.into_std()
    }
}
