//! Error type shared by every fallible operation of the crate.
//!
//! All syscall and resolver failures are folded into a single
//! [`SystemError`] that records *which* operation failed and the raw
//! code the OS (or the resolver) reported.

use std::ffi::CStr;
use std::fmt;
use std::io;

use libc::c_int;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SystemError>;

/// The operation that produced a [`SystemError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Allocating a socket descriptor.
    Socket,
    /// Setting a socket option or descriptor flag.
    SetOption,
    /// Resolving a host/port pair.
    Resolve,
    /// Binding the socket to an address.
    Bind,
    /// Switching the socket into the listening state.
    Listen,
    /// Accepting a pending connection.
    Accept,
    /// Querying the locally bound address.
    LocalAddr,
    /// Registering a descriptor with the poller.
    Register,
    /// Waiting for readiness events.
    Poll,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Socket => "socket",
            Operation::SetOption => "setsockopt",
            Operation::Resolve => "getaddrinfo",
            Operation::Bind => "bind",
            Operation::Listen => "listen",
            Operation::Accept => "accept",
            Operation::LocalAddr => "getsockname",
            Operation::Register => "register",
            Operation::Poll => "poll",
        };

        f.write_str(name)
    }
}

/// The numeric code carried by a [`SystemError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// An `errno` value.
    Os(i32),
    /// An `EAI_*` value returned by `getaddrinfo`.
    Resolver(i32),
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ErrorCode::Os(code) => write!(f, "{}", io::Error::from_raw_os_error(code)),
            ErrorCode::Resolver(code) => {
                let message = unsafe { CStr::from_ptr(libc::gai_strerror(code)) };
                write!(f, "{} (resolver error {code})", message.to_string_lossy())
            }
        }
    }
}

/// A failed system call or name resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{operation} failed: {code}")]
pub struct SystemError {
    operation: Operation,
    code: ErrorCode,
}

impl SystemError {
    /// Creates an error from an explicit `errno` value.
    pub fn os(operation: Operation, errno: i32) -> Self {
        Self {
            operation,
            code: ErrorCode::Os(errno),
        }
    }

    /// Captures the calling thread's current `errno`.
    pub(crate) fn last_os_error(operation: Operation) -> Self {
        let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);

        Self::os(operation, errno)
    }

    /// Translates a non-zero `getaddrinfo` return value.
    ///
    /// `EAI_SYSTEM` means the real cause is in `errno`, so it is reported
    /// as an OS error instead.
    pub(crate) fn resolver(code: c_int) -> Self {
        if code == libc::EAI_SYSTEM {
            return Self::last_os_error(Operation::Resolve);
        }

        Self {
            operation: Operation::Resolve,
            code: ErrorCode::Resolver(code),
        }
    }

    /// Returns the operation that failed.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Returns the code reported by the OS or the resolver.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Returns the `errno` value, if this is an OS error.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self.code {
            ErrorCode::Os(code) => Some(code),
            ErrorCode::Resolver(_) => None,
        }
    }

    /// Returns `true` if the error is `EAGAIN`/`EWOULDBLOCK`.
    pub(crate) fn is_would_block(&self) -> bool {
        matches!(self.code, ErrorCode::Os(code) if code == libc::EAGAIN || code == libc::EWOULDBLOCK)
    }
}

impl From<SystemError> for io::Error {
    fn from(error: SystemError) -> Self {
        match error.code {
            ErrorCode::Os(code) => io::Error::from_raw_os_error(code),
            ErrorCode::Resolver(_) => io::Error::other(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_error_keeps_errno() {
        let error = SystemError::os(Operation::Bind, libc::EADDRINUSE);

        assert_eq!(error.operation(), Operation::Bind);
        assert_eq!(error.raw_os_error(), Some(libc::EADDRINUSE));

        let io: io::Error = error.into();
        assert_eq!(io.kind(), io::ErrorKind::AddrInUse);
    }

    #[test]
    fn test_display_names_the_operation() {
        let error = SystemError::os(Operation::Accept, libc::EBADF);
        let text = error.to_string();

        assert!(text.starts_with("accept failed: "), "got {text}");
        assert!(text.contains(&format!("os error {}", libc::EBADF)));
    }

    #[test]
    fn test_resolver_error_is_not_an_os_error() {
        let error = SystemError::resolver(libc::EAI_NONAME);

        assert_eq!(error.code(), ErrorCode::Resolver(libc::EAI_NONAME));
        assert_eq!(error.raw_os_error(), None);
        assert!(error.to_string().starts_with("getaddrinfo failed: "));
    }

    #[test]
    fn test_would_block_detection() {
        assert!(SystemError::os(Operation::Accept, libc::EAGAIN).is_would_block());
        assert!(!SystemError::os(Operation::Accept, libc::ECONNABORTED).is_would_block());
        assert!(!SystemError::resolver(libc::EAI_AGAIN).is_would_block());
    }
}
