//! Example: Log every accepted connection
//!
//! Run with `RUST_LOG=edge=trace` to see the reactor at work.

use edge::{Connection, Reactor, Server};

use std::sync::mpsc;
use tracing_subscriber::EnvFilter;

fn main() -> edge::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let reactor = Reactor::start()?;

    // Bind a server to localhost:8080 with a larger backlog
    let server = Server::builder().backlog(128).build(&reactor.handle())?;
    server.bind("127.0.0.1", 8080)?;
    tracing::info!(addr = %server.local_addr()?, "listening");

    let (done_tx, done_rx) = mpsc::channel();
    let _subscription = server
        .incoming()
        .subscribe(move |event: edge::Result<Connection>| match event {
            Ok(connection) => tracing::info!(peer = %connection.peer_addr(), "accepted"),
            Err(error) => {
                tracing::error!(%error, "server stopped");
                let _ = done_tx.send(());
            }
        });

    // Runs until the stream fails
    let _ = done_rx.recv();
    Ok(())
}
