//! Thin wrappers over the POSIX socket calls used by the listener.
//!
//! Every wrapper translates a failing call into a [`SystemError`] tagged
//! with the [`Operation`] that failed. None of them retries except on
//! `EINTR`.

use crate::error::{Operation, Result, SystemError};

use libc::{
    AF_INET, AF_INET6, F_GETFL, IPPROTO_IPV6, IPV6_V6ONLY, O_NONBLOCK, SO_REUSEADDR, SOCK_STREAM,
    SOL_SOCKET, bind, c_int, close, fcntl, getsockname, listen, setsockopt, sockaddr, sockaddr_in, sockaddr_in6, sockaddr_storage, socket,
    socklen_t,
};
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

pub(crate) use std::os::fd::RawFd;

/// Closes a file descriptor.
pub(crate) fn sys_close(fd: RawFd) {
    unsafe { close(fd) };
}

/// Sets a file descriptor to non-blocking mode.
#[cfg(not(target_os = "linux"))]
pub(crate) fn sys_set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = unsafe { fcntl(fd, F_GETFL) };
    if flags < 0 {
        return Err(SystemError::last_os_error(Operation::SetOption));
    }

    let rc = unsafe { fcntl(fd, libc::F_SETFL, flags | O_NONBLOCK) };
    if rc < 0 {
        return Err(SystemError::last_os_error(Operation::SetOption));
    }

    Ok(())
}

/// Reports whether `O_NONBLOCK` is set on a file descriptor.
pub(crate) fn sys_is_nonblocking(fd: RawFd) -> Result<bool> {
    let flags = unsafe { fcntl(fd, F_GETFL) };
    if flags < 0 {
        return Err(SystemError::last_os_error(Operation::SetOption));
    }

    Ok(flags & O_NONBLOCK != 0)
}

/// Marks a file descriptor close-on-exec.
#[cfg(not(target_os = "linux"))]
fn sys_set_cloexec(fd: RawFd) -> Result<()> {
    let flags = unsafe { fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(SystemError::last_os_error(Operation::SetOption));
    }

    let rc = unsafe { fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) };
    if rc < 0 {
        return Err(SystemError::last_os_error(Operation::SetOption));
    }

    Ok(())
}

/// Creates a non-blocking, close-on-exec stream socket.
///
/// On Linux both flags are set by `socket` itself, so a concurrent
/// `fork`/`exec` never inherits the descriptor.
#[cfg(target_os = "linux")]
pub(crate) fn sys_socket(domain: c_int) -> Result<RawFd> {
    let fd = unsafe { socket(domain, SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC, 0) };
    if fd < 0 {
        return Err(SystemError::last_os_error(Operation::Socket));
    }

    Ok(fd)
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn sys_socket(domain: c_int) -> Result<RawFd> {
    let fd = unsafe { socket(domain, SOCK_STREAM, 0) };
    if fd < 0 {
        return Err(SystemError::last_os_error(Operation::Socket));
    }

    if let Err(e) = sys_set_nonblocking(fd).and_then(|_| sys_set_cloexec(fd)) {
        sys_close(fd);
        return Err(e);
    }

    Ok(fd)
}

/// Binds a socket to a raw address.
pub(crate) fn sys_bind(fd: RawFd, addr: *const sockaddr, len: socklen_t) -> Result<()> {
    let rc = unsafe { bind(fd, addr, len) };
    if rc < 0 {
        Err(SystemError::last_os_error(Operation::Bind))
    } else {
        Ok(())
    }
}

/// Marks a socket as a listening socket.
pub(crate) fn sys_listen(fd: RawFd, backlog: c_int) -> Result<()> {
    let rc = unsafe { listen(fd, backlog) };
    if rc < 0 {
        Err(SystemError::last_os_error(Operation::Listen))
    } else {
        Ok(())
    }
}

/// Accepts a single pending connection.
///
/// The returned client socket is non-blocking and close-on-exec.
/// `EAGAIN` is returned as an error; the caller decides what it means.
pub(crate) fn sys_accept(fd: RawFd) -> Result<(RawFd, SocketAddr)> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };

    let client_fd = loop {
        let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;
        let rc = unsafe { raw_accept(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) };

        if rc >= 0 {
            break rc;
        }

        let error = SystemError::last_os_error(Operation::Accept);
        if error.raw_os_error() != Some(libc::EINTR) {
            return Err(error);
        }
    };

    if let Err(e) = set_accepted_flags(client_fd) {
        sys_close(client_fd);
        return Err(e);
    }

    match sockaddr_storage_to_socketaddr(&storage) {
        Some(addr) => Ok((client_fd, addr)),
        None => {
            sys_close(client_fd);
            Err(SystemError::os(Operation::Accept, libc::EAFNOSUPPORT))
        }
    }
}

#[cfg(target_os = "linux")]
unsafe fn raw_accept(fd: RawFd, addr: *mut sockaddr, len: *mut socklen_t) -> c_int {
    unsafe { libc::accept4(fd, addr, len, libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC) }
}

#[cfg(target_os = "linux")]
fn set_accepted_flags(_fd: RawFd) -> Result<()> {
    Ok(())
}

#[cfg(not(target_os = "linux"))]
unsafe fn raw_accept(fd: RawFd, addr: *mut sockaddr, len: *mut socklen_t) -> c_int {
    unsafe { libc::accept(fd, addr, len) }
}

#[cfg(not(target_os = "linux"))]
fn set_accepted_flags(fd: RawFd) -> Result<()> {
    sys_set_nonblocking(fd).and_then(|_| sys_set_cloexec(fd))
}

/// Returns the local address of a socket.
pub(crate) fn sys_sockname(fd: RawFd) -> Result<SocketAddr> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<sockaddr_storage>() as socklen_t;

    let rc = unsafe { getsockname(fd, &mut storage as *mut _ as *mut sockaddr, &mut len) };
    if rc < 0 {
        return Err(SystemError::last_os_error(Operation::LocalAddr));
    }

    sockaddr_storage_to_socketaddr(&storage)
        .ok_or(SystemError::os(Operation::LocalAddr, libc::EAFNOSUPPORT))
}

/// Sets or clears `SO_REUSEADDR` on a socket.
pub(crate) fn sys_set_reuseaddr(fd: RawFd, on: bool) -> Result<()> {
    sys_setsockopt_flag(fd, SOL_SOCKET, SO_REUSEADDR, on)
}

/// Sets or clears `IPV6_V6ONLY` on a socket.
pub(crate) fn sys_set_v6only(fd: RawFd, on: bool) -> Result<()> {
    sys_setsockopt_flag(fd, IPPROTO_IPV6, IPV6_V6ONLY, on)
}

fn sys_setsockopt_flag(fd: RawFd, level: c_int, name: c_int, on: bool) -> Result<()> {
    let value: c_int = on.into();
    let rc = unsafe {
        setsockopt(
            fd,
            level,
            name,
            &value as *const _ as *const _,
            mem::size_of::<c_int>() as socklen_t,
        )
    };

    if rc < 0 {
        Err(SystemError::last_os_error(Operation::SetOption))
    } else {
        Ok(())
    }
}

/// Returns the length of a listening socket's accept queue.
///
/// Linux reports the queue length of a listening socket in
/// `tcpi_unacked`. `None` means the count is unavailable.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub(crate) fn sys_pending_connections(fd: RawFd) -> Option<usize> {
    let mut info: libc::tcp_info = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::tcp_info>() as socklen_t;

    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::IPPROTO_TCP,
            libc::TCP_INFO,
            &mut info as *mut _ as *mut _,
            &mut len,
        )
    };

    if rc < 0 {
        None
    } else {
        Some(info.tcpi_unacked as usize)
    }
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
pub(crate) fn sys_pending_connections(_fd: RawFd) -> Option<usize> {
    None
}

/// Converts a `sockaddr_storage` to a Rust `SocketAddr`.
///
/// Returns `None` for families other than `AF_INET`/`AF_INET6`.
pub(crate) fn sockaddr_storage_to_socketaddr(storage: &sockaddr_storage) -> Option<SocketAddr> {
    match storage.ss_family as c_int {
        AF_INET => {
            let addr = unsafe { &*(storage as *const _ as *const sockaddr_in) };
            let ip = Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr));
            let port = u16::from_be(addr.sin_port);

            Some(SocketAddr::V4(SocketAddrV4::new(ip, port)))
        }

        AF_INET6 => {
            let addr = unsafe { &*(storage as *const _ as *const sockaddr_in6) };
            let ip = Ipv6Addr::from(addr.sin6_addr.s6_addr);
            let port = u16::from_be(addr.sin6_port);

            Some(SocketAddr::V6(SocketAddrV6::new(
                ip,
                port,
                addr.sin6_flowinfo,
                addr.sin6_scope_id,
            )))
        }

        _ => None,
    }
}

/// Converts a `SocketAddr` to a `sockaddr_storage`.
pub(crate) fn socketaddr_to_storage(addr: &SocketAddr) -> (sockaddr_storage, socklen_t) {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };

    match addr {
        SocketAddr::V4(v4) => {
            let sa = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in) };
            sa.sin_family = AF_INET as _;
            sa.sin_port = v4.port().to_be();
            sa.sin_addr.s_addr = u32::from(*v4.ip()).to_be();

            (storage, mem::size_of::<sockaddr_in>() as socklen_t)
        }

        SocketAddr::V6(v6) => {
            let sa = unsafe { &mut *(&mut storage as *mut _ as *mut sockaddr_in6) };
            sa.sin6_family = AF_INET6 as _;
            sa.sin6_port = v6.port().to_be();
            sa.sin6_addr.s6_addr = v6.ip().octets();
            sa.sin6_flowinfo = v6.flowinfo();
            sa.sin6_scope_id = v6.scope_id();

            (storage, mem::size_of::<sockaddr_in6>() as socklen_t)
        }
    }
}

/// Copies a raw `sockaddr` of the given length into a `SocketAddr`.
pub(crate) fn sockaddr_to_socketaddr(addr: *const sockaddr, len: socklen_t) -> Option<SocketAddr> {
    if addr.is_null() || len as usize > mem::size_of::<sockaddr_storage>() {
        return None;
    }

    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    unsafe {
        std::ptr::copy_nonoverlapping(
            addr as *const u8,
            &mut storage as *mut _ as *mut u8,
            len as usize,
        );
    }

    sockaddr_storage_to_socketaddr(&storage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_conversion_keeps_v6_scope() {
        let addr: SocketAddr = "[fe80::1%3]:8080".parse().unwrap();
        let (storage, len) = socketaddr_to_storage(&addr);

        assert_eq!(len as usize, mem::size_of::<sockaddr_in6>());
        assert_eq!(sockaddr_storage_to_socketaddr(&storage), Some(addr));
    }

    fn is_cloexec(fd: RawFd) -> bool {
        let flags = unsafe { fcntl(fd, libc::F_GETFD) };
        assert!(flags >= 0, "fcntl failed");
        flags & libc::FD_CLOEXEC != 0
    }

    #[test]
    fn test_socket_is_nonblocking_and_cloexec() {
        let fd = sys_socket(AF_INET).expect("socket");

        assert!(sys_is_nonblocking(fd).expect("fcntl"));
        assert!(is_cloexec(fd));

        sys_close(fd);
    }

    #[test]
    fn test_accepted_socket_is_nonblocking_and_cloexec() {
        let fd = sys_socket(AF_INET).expect("socket");
        let (storage, len) = socketaddr_to_storage(&"127.0.0.1:0".parse().unwrap());

        sys_bind(fd, &storage as *const _ as *const sockaddr, len).expect("bind");
        sys_listen(fd, 1).expect("listen");
        let addr = sys_sockname(fd).expect("getsockname");

        let client = std::net::TcpStream::connect(addr).expect("connect");
        let (accepted, peer) = loop {
            match sys_accept(fd) {
                Ok(pair) => break pair,
                Err(e) if e.is_would_block() => std::thread::yield_now(),
                Err(e) => panic!("accept failed: {e}"),
            }
        };

        assert_eq!(peer, client.local_addr().expect("client addr"));
        assert!(sys_is_nonblocking(accepted).expect("fcntl"));
        assert!(is_cloexec(accepted));

        sys_close(accepted);
        sys_close(fd);
    }

    #[test]
    fn test_accept_on_idle_listener_would_block() {
        let fd = sys_socket(AF_INET).expect("socket");
        let (storage, len) = socketaddr_to_storage(&"127.0.0.1:0".parse().unwrap());

        sys_bind(fd, &storage as *const _ as *const sockaddr, len).expect("bind");
        sys_listen(fd, 1).expect("listen");

        let error = sys_accept(fd).expect_err("nothing is pending");
        assert!(error.is_would_block(), "got {error}");

        sys_close(fd);
    }

    #[test]
    fn test_sockname_reports_ephemeral_port() {
        let fd = sys_socket(AF_INET).expect("socket");
        let (storage, len) = socketaddr_to_storage(&"127.0.0.1:0".parse().unwrap());

        sys_bind(fd, &storage as *const _ as *const sockaddr, len).expect("bind");

        let local = sys_sockname(fd).expect("getsockname");
        assert_eq!(local.ip(), Ipv4Addr::LOCALHOST);
        assert_ne!(local.port(), 0);

        sys_close(fd);
    }
}
