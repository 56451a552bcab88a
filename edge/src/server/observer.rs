use crate::error::{Result, SystemError};
use crate::net::Connection;

/// Consumer side of an [`Incoming`](super::Incoming) subscription.
///
/// Every method runs on the reactor thread. At most one of `on_failed`
/// and `on_completed` is called, and nothing is delivered after it; by
/// then the listening socket has already been closed. Neither is called
/// once the consumer has disposed the subscription.
pub trait Observer: Send + 'static {
    /// A connection was accepted. Ownership passes to the observer.
    fn on_next(&mut self, connection: Connection);

    /// The stream ended with an error.
    fn on_failed(&mut self, error: SystemError);

    /// The stream ended without error, because the server was shut down
    /// or the reactor stopped.
    fn on_completed(&mut self) {}
}

/// Closures receive `Ok(connection)` for each connection and a single
/// `Err(error)` if the stream fails.
impl<F> Observer for F
where
    F: FnMut(Result<Connection>) + Send + 'static,
{
    fn on_next(&mut self, connection: Connection) {
        self(Ok(connection))
    }

    fn on_failed(&mut self, error: SystemError) {
        self(Err(error))
    }
}
