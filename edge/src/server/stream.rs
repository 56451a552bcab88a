use super::incoming::{Incoming, Subscription};
use super::Observer;
use crate::error::{Result, SystemError};
use crate::net::Connection;

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use futures_core::Stream;

#[derive(Default)]
struct Channel {
    queue: VecDeque<Connection>,
    failure: Option<SystemError>,
    done: bool,
    waker: Option<Waker>,
}

impl Channel {
    fn wake(&mut self) {
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }
}

/// Feeds the accept loop's events into a [`Channel`].
struct Sink(Arc<Mutex<Channel>>);

impl Observer for Sink {
    fn on_next(&mut self, connection: Connection) {
        let mut channel = self.0.lock().unwrap();
        channel.queue.push_back(connection);
        channel.wake();
    }

    fn on_failed(&mut self, error: SystemError) {
        let mut channel = self.0.lock().unwrap();
        channel.failure = Some(error);
        channel.done = true;
        channel.wake();
    }

    fn on_completed(&mut self) {
        let mut channel = self.0.lock().unwrap();
        channel.done = true;
        channel.wake();
    }
}

/// Accepted connections as a [`Stream`].
///
/// Yields `Ok(connection)` for every accepted connection. If the accept
/// loop fails, the error is yielded once after the connections already
/// queued, then the stream ends. Dropping `Connections` disposes the
/// underlying subscription.
///
/// # Examples
///
/// ```rust,ignore
/// let mut connections = futures::executor::block_on_stream(server.incoming().into_stream());
///
/// while let Some(connection) = connections.next() {
///     handle(connection?);
/// }
/// ```
#[must_use = "streams do nothing unless polled"]
pub struct Connections {
    channel: Arc<Mutex<Channel>>,
    subscription: Subscription,
}

impl Connections {
    pub(super) fn subscribe(incoming: Incoming) -> Self {
        let channel = Arc::new(Mutex::new(Channel::default()));
        let subscription = incoming.subscribe(Sink(channel.clone()));

        Self {
            channel,
            subscription,
        }
    }

    /// Returns `true` once the underlying subscription has terminated.
    pub fn is_terminated(&self) -> bool {
        self.subscription.is_terminated()
    }
}

impl Stream for Connections {
    type Item = Result<Connection>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut channel = self.channel.lock().unwrap();

        if let Some(connection) = channel.queue.pop_front() {
            return Poll::Ready(Some(Ok(connection)));
        }

        if let Some(error) = channel.failure.take() {
            return Poll::Ready(Some(Err(error)));
        }

        if channel.done {
            return Poll::Ready(None);
        }

        channel.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl std::fmt::Debug for Connections {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connections")
            .field("subscription", &self.subscription)
            .finish_non_exhaustive()
    }
}
