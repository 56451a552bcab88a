//! Readiness sources: one registered descriptor plus its callbacks.
//!
//! A [`ReadinessSource`] is created idle, bound to a descriptor and a
//! teardown callback. [`activate`](ReadinessSource::activate) hands a
//! [`ReadinessHandler`] to the reactor thread, which from then on calls
//! it with the pending count every time the descriptor becomes readable.
//! [`cancel`](ReadinessSource::cancel) may be called from any thread and
//! any number of times; the teardown callback runs exactly once.

use super::ReactorHandle;
use super::command::Command;
use crate::error::{Operation, Result, SystemError};

use std::fmt;
use std::ops::ControlFlow;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::SendError;
use std::sync::{Arc, Mutex};

const IDLE: u8 = 0;
const ACTIVE: u8 = 1;
const CANCELLED: u8 = 2;

type Teardown = Box<dyn FnOnce() + Send>;

/// Callbacks driven by the reactor thread for an active source.
///
/// All calls for one source happen on the reactor thread, one at a
/// time. A handler never observes two notifications concurrently.
pub trait ReadinessHandler: Send + 'static {
    /// Called when the descriptor is readable, with the number of
    /// operations the OS reports as pending (always at least 1).
    ///
    /// Returning [`ControlFlow::Break`] cancels the source before any
    /// further notification is delivered.
    fn on_ready(&mut self, pending: usize) -> ControlFlow<()>;

    /// Called once, after the source's teardown has run.
    ///
    /// `error` is set when the reactor itself ended the source, for
    /// instance because the descriptor could not be registered.
    fn on_terminated(&mut self, error: Option<SystemError>) {
        let _ = error;
    }
}

impl<F> ReadinessHandler for F
where
    F: FnMut(usize) -> ControlFlow<()> + Send + 'static,
{
    fn on_ready(&mut self, pending: usize) -> ControlFlow<()> {
        self(pending)
    }
}

/// State shared between a source's handles and the reactor thread.
pub(crate) struct SourceState {
    fd: RawFd,
    phase: AtomicU8,
    teardown: Mutex<Option<Teardown>>,
}

impl SourceState {
    pub(crate) fn fd(&self) -> RawFd {
        self.fd
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.phase.load(Ordering::Acquire) == CANCELLED
    }

    /// Marks the source cancelled without running the teardown.
    pub(crate) fn mark_cancelled(&self) {
        self.phase.store(CANCELLED, Ordering::Release);
    }

    /// Runs the teardown callback if it has not run yet.
    pub(crate) fn run_teardown(&self) {
        let teardown = self.teardown.lock().unwrap().take();

        if let Some(teardown) = teardown {
            teardown();
        }
    }

    pub(crate) fn is_torn_down(&self) -> bool {
        self.teardown.lock().unwrap().is_none()
    }
}

/// A source's state paired with its handler, on its way to or held by
/// the reactor thread.
///
/// Ending an entry runs the teardown and then `on_terminated`, once.
/// An entry dropped without being terminated, for instance inside a
/// command the reactor never received, ends itself without an error.
pub(crate) struct Entry {
    state: Arc<SourceState>,
    handler: Option<Box<dyn ReadinessHandler>>,
}

impl Entry {
    pub(crate) fn new(state: Arc<SourceState>, handler: Box<dyn ReadinessHandler>) -> Self {
        Self {
            state,
            handler: Some(handler),
        }
    }

    pub(crate) fn state(&self) -> &Arc<SourceState> {
        &self.state
    }

    pub(crate) fn on_ready(&mut self, pending: usize) -> ControlFlow<()> {
        match self.handler.as_mut() {
            Some(handler) => handler.on_ready(pending),
            None => ControlFlow::Break(()),
        }
    }

    /// Runs the teardown, then notifies the handler.
    pub(crate) fn terminate(mut self, error: Option<SystemError>) {
        self.finish(error);
    }

    fn finish(&mut self, error: Option<SystemError>) {
        if let Some(mut handler) = self.handler.take() {
            self.state.mark_cancelled();
            self.state.run_teardown();
            handler.on_terminated(error);
        }
    }
}

impl Drop for Entry {
    fn drop(&mut self) {
        self.finish(None);
    }
}

/// A descriptor registered (or about to be) with a reactor.
///
/// Clones share the same underlying source.
#[derive(Clone)]
pub struct ReadinessSource {
    reactor: ReactorHandle,
    state: Arc<SourceState>,
}

impl ReadinessSource {
    /// Creates an idle source for `fd`.
    ///
    /// `teardown` runs exactly once when the source is cancelled, either
    /// explicitly, after a handler asks to stop, or when the reactor
    /// shuts down. Nothing is registered until [`activate`](Self::activate).
    pub fn new(reactor: &ReactorHandle, fd: RawFd, teardown: impl FnOnce() + Send + 'static) -> Self {
        let state = Arc::new(SourceState {
            fd,
            phase: AtomicU8::new(IDLE),
            teardown: Mutex::new(Some(Box::new(teardown))),
        });

        Self {
            reactor: reactor.clone(),
            state,
        }
    }

    /// Returns the descriptor this source watches.
    pub fn fd(&self) -> RawFd {
        self.state.fd
    }

    /// Starts dispatching readiness notifications to `handler`.
    ///
    /// # Errors
    ///
    /// - `EALREADY` if the source was already activated,
    /// - `ECANCELED` if it was cancelled first,
    /// - `ESHUTDOWN` if the reactor thread is gone; the teardown has
    ///   run in that case.
    ///
    /// On error the handler has already received
    /// [`on_terminated`](ReadinessHandler::on_terminated): with the error,
    /// except for a cancelled source, which ends without one as if the
    /// cancellation had happened after registration. Registration itself
    /// happens on the reactor thread; if it fails there, the handler
    /// learns about it the same way.
    pub fn activate(&self, handler: impl ReadinessHandler) -> Result<()> {
        let mut handler: Box<dyn ReadinessHandler> = Box::new(handler);

        if let Err(phase) =
            self.state
                .phase
                .compare_exchange(IDLE, ACTIVE, Ordering::AcqRel, Ordering::Acquire)
        {
            if phase == ACTIVE {
                let error = SystemError::os(Operation::Register, libc::EALREADY);
                handler.on_terminated(Some(error));
                return Err(error);
            }

            handler.on_terminated(None);
            return Err(SystemError::os(Operation::Register, libc::ECANCELED));
        }

        let command = Command::Register(Entry::new(self.state.clone(), handler));

        if let Err(SendError(command)) = self.reactor.send(command) {
            let error = SystemError::os(Operation::Register, libc::ESHUTDOWN);

            if let Command::Register(entry) = command {
                entry.terminate(Some(error));
            }
            return Err(error);
        }

        Ok(())
    }

    /// Cancels the source.
    ///
    /// Safe to call from any thread, any number of times. An idle source
    /// runs its teardown right away; an active one is deregistered and
    /// torn down by the reactor thread once the current notification, if
    /// any, has been handled.
    pub fn cancel(&self) {
        match self.state.phase.swap(CANCELLED, Ordering::AcqRel) {
            IDLE => self.state.run_teardown(),
            ACTIVE => {
                let command = Command::Cancel {
                    state: self.state.clone(),
                };

                if self.reactor.send(command).is_err() {
                    self.state.run_teardown();
                }
            }
            _ => {}
        }
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    /// Returns `true` once the teardown callback has run.
    pub fn is_torn_down(&self) -> bool {
        self.state.is_torn_down()
    }
}

impl fmt::Debug for ReadinessSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadinessSource")
            .field("fd", &self.state.fd)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
