use super::source::{Entry, SourceState};

use std::sync::Arc;

/// Messages sent from [`ReactorHandle`](super::ReactorHandle)s to the
/// reactor thread.
pub(crate) enum Command {
    /// Start dispatching readiness for the source's descriptor.
    ///
    /// A command dropped before the reactor handles it still tears the
    /// source down, through the entry's `Drop`.
    Register(Entry),
    /// Stop dispatching and run the source's teardown.
    Cancel { state: Arc<SourceState> },
    /// Cancel every source and leave the event loop.
    Shutdown,
}
