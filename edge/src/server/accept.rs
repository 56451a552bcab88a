//! The accept loop driven by the reactor thread.
//!
//! One [`AcceptLoop`] is created per subscription. Each readiness
//! notification drains at most `pending` connections; a would-block ends
//! the drain early and any other error ends the stream.

use super::Observer;
use crate::error::{Result, SystemError};
use crate::net::{Accept, ListeningSocket};
use crate::reactor::ReadinessHandler;

use std::ops::ControlFlow;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{trace, warn};

/// Something connections can be accepted from.
pub(crate) trait Acceptor: Send + Sync + 'static {
    fn accept_one(&self) -> Result<Accept>;
}

impl Acceptor for ListeningSocket {
    fn accept_one(&self) -> Result<Accept> {
        ListeningSocket::accept_one(self)
    }
}

/// Flags shared by a subscription and its accept loop.
#[derive(Debug, Default)]
pub(crate) struct StreamState {
    /// Set by the consumer. No value is emitted once this is set.
    disposed: AtomicBool,

    /// Set by the reactor thread once the loop has finished.
    terminated: AtomicBool,
}

impl StreamState {
    pub(crate) fn dispose(&self) -> bool {
        !self.disposed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }
}

pub(crate) struct AcceptLoop<A, O> {
    acceptor: Arc<A>,
    observer: O,
    state: Arc<StreamState>,

    /// Descriptor, for log events only.
    fd: RawFd,

    /// Error that ended the last drain, reported once torn down.
    failure: Option<SystemError>,
}

impl<A: Acceptor, O: Observer> AcceptLoop<A, O> {
    pub(crate) fn new(acceptor: Arc<A>, observer: O, state: Arc<StreamState>, fd: RawFd) -> Self {
        Self {
            acceptor,
            observer,
            state,
            fd,
            failure: None,
        }
    }
}

impl<A: Acceptor, O: Observer> ReadinessHandler for AcceptLoop<A, O> {
    fn on_ready(&mut self, pending: usize) -> ControlFlow<()> {
        let mut accepted = 0;

        for _ in 0..pending {
            if self.state.is_disposed() {
                return ControlFlow::Break(());
            }

            match self.acceptor.accept_one() {
                Ok(Accept::Connection(connection)) => {
                    accepted += 1;
                    self.observer.on_next(connection);
                }
                Ok(Accept::WouldBlock) => break,
                Err(e) => {
                    warn!(fd = self.fd, error = %e, "accept failed, ending stream");
                    self.failure = Some(e);
                    return ControlFlow::Break(());
                }
            }
        }

        trace!(fd = self.fd, pending, accepted, "drain finished");
        ControlFlow::Continue(())
    }

    fn on_terminated(&mut self, error: Option<SystemError>) {
        let failure = self.failure.take().or(error);

        if !self.state.is_disposed() {
            match failure {
                Some(e) => self.observer.on_failed(e),
                None => self.observer.on_completed(),
            }
        }

        self.state.terminate();
    }
}
