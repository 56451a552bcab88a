use super::Observer;
use super::accept::{AcceptLoop, StreamState};
use super::stream::Connections;
use crate::error::{Operation, SystemError};
use crate::net::ListeningSocket;
use crate::reactor::ReadinessSource;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

/// A cold stream of accepted connections.
///
/// Nothing happens until [`subscribe`](Self::subscribe) is called. The
/// subscription issues `listen`, registers the socket with the reactor,
/// and from then on delivers every accepted connection to its observer.
///
/// Only one subscription may be active per server. A second one fails
/// immediately with `EALREADY` and leaves the first untouched.
#[must_use = "streams do nothing unless subscribed"]
#[derive(Debug)]
pub struct Incoming {
    pub(super) socket: Arc<ListeningSocket>,
    pub(super) source: ReadinessSource,
    pub(super) activated: Arc<AtomicBool>,
    pub(super) backlog: u32,
}

impl Incoming {
    /// Starts listening and delivers connections to `observer`.
    ///
    /// Failures are never returned here: a failed `listen` or a
    /// rejected activation is delivered through
    /// [`Observer::on_failed`] before this method returns.
    pub fn subscribe(self, mut observer: impl Observer) -> Subscription {
        let state = Arc::new(StreamState::default());
        let fd = self.socket.fd();

        if self.activated.swap(true, Ordering::AcqRel) {
            observer.on_failed(SystemError::os(Operation::Listen, libc::EALREADY));
            state.terminate();
            return Subscription::detached(state);
        }

        if let Err(e) = self.socket.listen(self.backlog) {
            self.activated.store(false, Ordering::Release);
            observer.on_failed(e);
            state.terminate();
            return Subscription::detached(state);
        }

        let accept_loop = AcceptLoop::new(self.socket.clone(), observer, state.clone(), fd);

        // Activation failures reach the observer through on_terminated.
        if let Err(e) = self.source.activate(accept_loop) {
            debug!(fd, error = %e, "accept loop not started");
        }

        Subscription {
            source: Some(self.source),
            state,
        }
    }

    /// Subscribes with a channel-backed observer and returns it as a
    /// [`Stream`](futures_core::Stream).
    pub fn into_stream(self) -> Connections {
        Connections::subscribe(self)
    }
}

/// The consumer side of an active [`Incoming`] stream.
///
/// Dropping the subscription disposes it: no further connection is
/// delivered and the listening socket is closed once the current drain,
/// if any, has finished.
#[must_use = "dropping a subscription cancels it"]
#[derive(Debug)]
pub struct Subscription {
    source: Option<ReadinessSource>,
    state: Arc<StreamState>,
}

impl Subscription {
    fn detached(state: Arc<StreamState>) -> Self {
        Self {
            source: None,
            state,
        }
    }

    /// Cancels the stream. Same as dropping it.
    pub fn dispose(self) {}

    /// Returns `true` once the stream has ended, by failure or disposal,
    /// and its teardown has run.
    pub fn is_terminated(&self) -> bool {
        self.state.is_terminated()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.state.dispose() {
            return;
        }

        if let Some(source) = &self.source {
            source.cancel();
        }
    }
}
