//! Host/port resolution for bind targets.
//!
//! [`resolve`] wraps `getaddrinfo(3)` and copies every candidate out of
//! the returned list before releasing it, so no resolver-owned memory
//! outlives the call.

use super::family::AddressFamily;
use crate::error::{Result, SystemError};
use crate::reactor::poller::platform::sockaddr_to_socketaddr;

use libc::{
    AI_NUMERICSERV, AI_PASSIVE, IPPROTO_TCP, SOCK_STREAM, addrinfo, freeaddrinfo, getaddrinfo,
};
use std::ffi::CString;
use std::net::SocketAddr;
use std::{mem, ptr, slice, vec};

/// The candidate addresses for one host/port pair, in resolver order.
///
/// Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    addrs: Vec<SocketAddr>,
}

impl Resolved {
    /// Returns the first candidate, the one used for binding.
    pub fn first(&self) -> SocketAddr {
        self.addrs[0]
    }

    /// Iterates over every candidate.
    pub fn iter(&self) -> slice::Iter<'_, SocketAddr> {
        self.addrs.iter()
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    /// Returns `true` if there are no candidates, which a successful
    /// [`resolve`] never produces.
    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}

impl IntoIterator for Resolved {
    type Item = SocketAddr;
    type IntoIter = vec::IntoIter<SocketAddr>;

    fn into_iter(self) -> Self::IntoIter {
        self.addrs.into_iter()
    }
}

impl<'a> IntoIterator for &'a Resolved {
    type Item = &'a SocketAddr;
    type IntoIter = slice::Iter<'a, SocketAddr>;

    fn into_iter(self) -> Self::IntoIter {
        self.addrs.iter()
    }
}

/// Owns a list returned by `getaddrinfo` and frees it on drop.
struct AddrInfoList(*mut addrinfo);

impl AddrInfoList {
    fn iter(&self) -> impl Iterator<Item = &addrinfo> {
        let mut next = self.0;

        std::iter::from_fn(move || {
            let current = unsafe { next.as_ref()? };
            next = current.ai_next;
            Some(current)
        })
    }
}

impl Drop for AddrInfoList {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe { freeaddrinfo(self.0) };
        }
    }
}

/// Resolves `host:port` into stream-socket addresses.
///
/// With `Some(family)`, only candidates of that family are requested.
/// An empty `host` resolves to the wildcard address of the family.
/// Port `0` is passed through, so binding to the result lets the OS pick
/// an ephemeral port.
///
/// # Errors
///
/// Returns a [`SystemError`] carrying the `EAI_*` code (or the `errno`
/// behind `EAI_SYSTEM`) when resolution fails.
pub fn resolve(host: &str, port: u16, family: Option<AddressFamily>) -> Result<Resolved> {
    let node = if host.is_empty() {
        None
    } else {
        Some(CString::new(host).map_err(|_| SystemError::resolver(libc::EAI_NONAME))?)
    };
    let service = CString::new(port.to_string())
        .map_err(|_| SystemError::resolver(libc::EAI_SERVICE))?;

    let mut hints: addrinfo = unsafe { mem::zeroed() };
    hints.ai_family = family.map(AddressFamily::as_raw).unwrap_or(libc::AF_UNSPEC);
    hints.ai_socktype = SOCK_STREAM;
    hints.ai_protocol = IPPROTO_TCP;
    hints.ai_flags = AI_NUMERICSERV | if node.is_none() { AI_PASSIVE } else { 0 };

    let mut list: *mut addrinfo = ptr::null_mut();
    let rc = unsafe {
        getaddrinfo(
            node.as_ref().map_or(ptr::null(), |n| n.as_ptr()),
            service.as_ptr(),
            &hints,
            &mut list,
        )
    };

    if rc != 0 {
        return Err(SystemError::resolver(rc));
    }

    let list = AddrInfoList(list);
    let addrs: Vec<SocketAddr> = list
        .iter()
        .filter_map(|info| sockaddr_to_socketaddr(info.ai_addr, info.ai_addrlen))
        .collect();

    if addrs.is_empty() {
        return Err(SystemError::resolver(libc::EAI_NONAME));
    }

    Ok(Resolved { addrs })
}
