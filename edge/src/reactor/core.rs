use super::command::Command;
use super::event::Event;
use super::poller::platform::{RawFd, sys_pending_connections};
use super::poller::{Poller, Waker};
use super::source::{Entry, SourceState};
use crate::error::{Operation, Result, SystemError};

use std::collections::HashMap;
use std::{fmt, mem};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, SendError, Sender, channel};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, trace, warn};

/// Name given to the reactor thread.
const THREAD_NAME: &str = "edge-reactor";

/// A running reactor.
///
/// The reactor runs on a dedicated thread and is responsible for:
/// - polling OS readiness for every activated source,
/// - calling each source's handler, one notification at a time,
/// - deregistering and tearing down sources when they are cancelled.
///
/// Every handler runs on that one thread, which is what serializes
/// notifications for a given listener. Dropping the `Reactor` stops the
/// thread; sources still registered at that point are torn down first.
pub struct Reactor {
    /// Handle used to talk to the reactor thread.
    handle: ReactorHandle,

    /// Join handle of the reactor thread.
    thread: Option<JoinHandle<()>>,
}

impl Reactor {
    /// Starts the reactor thread.
    ///
    /// # Errors
    ///
    /// Fails if the OS poller cannot be created or the thread cannot be
    /// spawned.
    pub fn start() -> Result<Self> {
        let (sender, receiver) = channel();
        let poller = Poller::new()?;
        let waker = poller.waker();

        let thread = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || Core::new(receiver, poller).run())
            .map_err(|e| {
                SystemError::os(Operation::Poll, e.raw_os_error().unwrap_or(libc::EAGAIN))
            })?;

        debug!("reactor started");

        Ok(Self {
            handle: ReactorHandle { sender, waker },
            thread: Some(thread),
        })
    }

    /// Returns a handle that can be injected into sources and servers.
    pub fn handle(&self) -> ReactorHandle {
        self.handle.clone()
    }
}

impl Drop for Reactor {
    /// Shuts the reactor thread down and waits for it to exit.
    fn drop(&mut self) {
        let _ = self.handle.send(Command::Shutdown);

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("reactor thread panicked");
            }
        }

        debug!("reactor stopped");
    }
}

impl fmt::Debug for Reactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactor").finish_non_exhaustive()
    }
}

/// A handle used to communicate with the reactor thread.
///
/// Cloning this handle allows multiple threads to register and cancel
/// sources on the same reactor.
#[derive(Clone)]
pub struct ReactorHandle {
    /// Sender side of the command channel.
    sender: Sender<Command>,

    /// Waker used to interrupt the poller.
    waker: Arc<Waker>,
}

impl ReactorHandle {
    /// Sends a command to the reactor and wakes it.
    pub(crate) fn send(&self, cmd: Command) -> std::result::Result<(), SendError<Command>> {
        let result = self.sender.send(cmd);
        self.waker.wake();
        result
    }
}

impl fmt::Debug for ReactorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactorHandle").finish_non_exhaustive()
    }
}

/// State owned by the reactor thread.
struct Core {
    /// Channel receiving commands from handles.
    receiver: Receiver<Command>,

    /// Platform-specific poller (epoll, kqueue).
    poller: Poller,

    /// Buffer used to collect readiness events from the poller.
    events: Vec<Event>,

    /// Registered sources, keyed by descriptor.
    ///
    /// A descriptor is registered at most once at any time.
    registry: HashMap<RawFd, Entry>,
}

impl Core {
    fn new(receiver: Receiver<Command>, poller: Poller) -> Self {
        Self {
            receiver,
            poller,
            events: Vec::with_capacity(64),
            registry: HashMap::new(),
        }
    }

    /// Main reactor event loop.
    ///
    /// The loop performs the following steps:
    /// 1. Handle readiness events from the previous poll
    /// 2. Process pending commands
    /// 3. Block until the OS reports readiness or a handle wakes us
    fn run(mut self) {
        loop {
            let mut events = mem::take(&mut self.events);
            for event in events.drain(..) {
                self.dispatch(event);
            }
            self.events = events;

            while let Ok(cmd) = self.receiver.try_recv() {
                match cmd {
                    Command::Register(entry) => self.register(entry),
                    Command::Cancel { state } => self.cancel(&state),
                    Command::Shutdown => {
                        // Anything sent after the final drain is dropped
                        // with the receiver; registrations end themselves.
                        self.terminate_all(None);
                        return;
                    }
                }
            }

            if let Err(e) = self.poller.poll(&mut self.events) {
                error!(error = %e, "poller failed, stopping reactor");
                self.terminate_all(Some(e));
                return;
            }
        }
    }

    /// Runs one notification for the source watching `event.fd`.
    fn dispatch(&mut self, event: Event) {
        let Some(entry) = self.registry.get_mut(&event.fd) else {
            return;
        };

        // A cancel command is queued; do not drain any further.
        if entry.state().is_cancelled() {
            return;
        }

        let pending = sys_pending_connections(event.fd)
            .unwrap_or(event.pending)
            .max(1);

        trace!(fd = event.fd, pending, "source ready");

        if entry.on_ready(pending).is_break() {
            if let Some(entry) = self.registry.remove(&event.fd) {
                debug!(fd = event.fd, "source stopped by its handler");
                self.poller.deregister(event.fd);
                entry.terminate(None);
            }
        }
    }

    fn register(&mut self, entry: Entry) {
        let fd = entry.state().fd();

        if entry.state().is_cancelled() {
            entry.terminate(None);
            return;
        }

        if self.registry.contains_key(&fd) {
            warn!(fd, "descriptor already registered, rejecting second source");
            entry.terminate(Some(SystemError::os(Operation::Register, libc::EEXIST)));
            return;
        }

        if let Err(e) = self.poller.register(fd) {
            warn!(fd, error = %e, "failed to register source");
            entry.terminate(Some(e));
            return;
        }

        debug!(fd, "source registered");
        self.registry.insert(fd, entry);
    }

    fn cancel(&mut self, state: &Arc<SourceState>) {
        let fd = state.fd();

        let owned = self
            .registry
            .get(&fd)
            .is_some_and(|entry| Arc::ptr_eq(entry.state(), state));

        if !owned {
            // Not registered yet (or never will be): the pending register
            // command sees the cancelled flag and tears down instead.
            return;
        }

        if let Some(entry) = self.registry.remove(&fd) {
            debug!(fd, "source cancelled");
            self.poller.deregister(fd);
            entry.terminate(None);
        }
    }

    /// Tears down every registered source and every queued registration.
    fn terminate_all(&mut self, error: Option<SystemError>) {
        for (fd, entry) in self.registry.drain() {
            self.poller.deregister(fd);
            entry.terminate(error);
        }

        while let Ok(cmd) = self.receiver.try_recv() {
            if let Command::Register(entry) = cmd {
                entry.terminate(error);
            }
        }
    }
}
