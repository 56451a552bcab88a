use super::connection::Connection;
use super::family::AddressFamily;
use super::resolver::resolve;
use crate::error::{Operation, Result, SystemError};
use crate::reactor::poller::platform::{
    RawFd, socketaddr_to_storage, sys_accept, sys_bind, sys_close, sys_listen, sys_set_reuseaddr,
    sys_set_v6only, sys_socket, sys_sockname,
};

use libc::c_int;
use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

/// Outcome of a single non-blocking accept attempt.
#[derive(Debug)]
pub enum Accept {
    /// A client connection was taken off the queue.
    Connection(Connection),

    /// Nothing is pending right now. Not an error.
    WouldBlock,
}

/// A non-blocking stream socket used to accept connections.
///
/// `ListeningSocket` owns exactly one descriptor for its whole life. It
/// is configured, bound, switched to listening once, and closed exactly
/// once: [`close`](Self::close) is idempotent, and dropping the socket
/// closes it if nobody did.
///
/// After closing, every operation fails with `EBADF` without reaching
/// the OS, so a descriptor number reused elsewhere is never touched.
#[derive(Debug)]
pub struct ListeningSocket {
    /// File descriptor of the socket.
    fd: RawFd,

    /// Address family the socket was created with.
    family: AddressFamily,

    /// Set once the descriptor has been released.
    closed: AtomicBool,
}

impl ListeningSocket {
    /// Creates a new non-blocking stream socket.
    pub fn create(family: AddressFamily) -> Result<Self> {
        let fd = sys_socket(family.as_raw())?;

        Ok(Self {
            fd,
            family,
            closed: AtomicBool::new(false),
        })
    }

    /// Returns the descriptor number.
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Returns the address family.
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    fn live_fd(&self, operation: Operation) -> Result<RawFd> {
        if self.is_closed() {
            Err(SystemError::os(operation, libc::EBADF))
        } else {
            Ok(self.fd)
        }
    }

    /// Sets or clears `SO_REUSEADDR`. Must happen before [`bind`](Self::bind).
    pub fn set_reuse_address(&self, on: bool) -> Result<()> {
        sys_set_reuseaddr(self.live_fd(Operation::SetOption)?, on)
    }

    /// Sets or clears `IPV6_V6ONLY`. Only meaningful for `Inet6` sockets.
    pub fn set_only_v6(&self, on: bool) -> Result<()> {
        sys_set_v6only(self.live_fd(Operation::SetOption)?, on)
    }

    /// Resolves `host:port` and binds to the first candidate.
    ///
    /// Resolution is restricted to the socket's address family. Only the
    /// first resolved address is tried; there is no fallback to the
    /// remaining candidates.
    pub fn bind(&self, host: &str, port: u16) -> Result<()> {
        let fd = self.live_fd(Operation::Bind)?;
        let addr = resolve(host, port, Some(self.family))?.first();

        let (storage, len) = socketaddr_to_storage(&addr);
        sys_bind(fd, &storage as *const _ as *const libc::sockaddr, len)?;

        debug!(fd, %addr, "socket bound");
        Ok(())
    }

    /// Binds to an already resolved address.
    pub fn bind_addr(&self, addr: SocketAddr) -> Result<()> {
        let fd = self.live_fd(Operation::Bind)?;

        if AddressFamily::of(&addr) != self.family {
            return Err(SystemError::os(Operation::Bind, libc::EAFNOSUPPORT));
        }

        let (storage, len) = socketaddr_to_storage(&addr);
        sys_bind(fd, &storage as *const _ as *const libc::sockaddr, len)
    }

    /// Switches the socket to the listening state.
    ///
    /// Backlogs above `c_int::MAX` are clamped.
    pub fn listen(&self, backlog: u32) -> Result<()> {
        let fd = self.live_fd(Operation::Listen)?;
        let backlog = backlog.min(c_int::MAX as u32) as c_int;

        sys_listen(fd, backlog)?;

        debug!(fd, backlog, "socket listening");
        Ok(())
    }

    /// Attempts one non-blocking accept.
    ///
    /// The new connection is non-blocking and carries this socket's
    /// address family.
    pub fn accept_one(&self) -> Result<Accept> {
        let fd = self.live_fd(Operation::Accept)?;

        match sys_accept(fd) {
            Ok((client, peer)) => {
                let connection = unsafe { Connection::from_accepted(client, self.family, peer) };
                Ok(Accept::Connection(connection))
            }
            Err(e) if e.is_would_block() => Ok(Accept::WouldBlock),
            Err(e) => Err(e),
        }
    }

    /// Returns the address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        sys_sockname(self.live_fd(Operation::LocalAddr)?)
    }

    /// Closes the descriptor. Later calls do nothing.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            sys_close(self.fd);
            debug!(fd = self.fd, "socket closed");
        }
    }

    /// Returns `true` once the descriptor has been released.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl AsRawFd for ListeningSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for ListeningSocket {
    /// Closes the socket if it is still open.
    fn drop(&mut self) {
        self.close();
    }
}
