//! Example: TCP echo server over the connection stream

use edge::{Connection, Reactor, Server};

use futures::executor::block_on_stream;
use std::io::{Read, Write};
use std::thread;

fn main() -> edge::Result<()> {
    tracing_subscriber::fmt::init();

    let reactor = Reactor::start()?;

    // Bind an echo server to localhost:9000
    let server = Server::new(&reactor.handle())?;
    server.bind("127.0.0.1", 9000)?;
    println!("Echo server listening on {}", server.local_addr()?);

    for connection in block_on_stream(server.incoming().into_stream()) {
        let connection = connection?;
        println!("Accepted connection from {}", connection.peer_addr());

        // One thread per client; the connection is blocking from here on
        thread::spawn(move || handle_client(connection));
    }

    Ok(())
}

// Echo handler: reads data and writes it back to the client
fn handle_client(connection: Connection) {
    let mut stream = connection.into_std();
    if stream.set_nonblocking(false).is_err() {
        return;
    }

    let mut buf = [0u8; 1024];
    loop {
        let n = match stream.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        if stream.write_all(&buf[..n]).is_err() {
            break;
        }
    }
}
