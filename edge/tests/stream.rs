#[cfg(test)]
mod tests {
    use edge::{AddressFamily, Reactor, Server};

    use futures::executor::block_on_stream;
    use std::net::TcpStream;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_stream_yields_accepted_connections() {
        let reactor = Reactor::start().expect("Failed to start reactor");
        let server = Server::builder()
            .backlog(8)
            .build(&reactor.handle())
            .expect("Failed to create server");
        server.bind("127.0.0.1", 0).expect("Failed to bind server");
        let addr = server.local_addr().expect("Failed to get local address");

        let mut connections = block_on_stream(server.incoming().into_stream());

        let clients: Vec<TcpStream> = (0..3)
            .map(|_| TcpStream::connect(addr).expect("Failed to connect"))
            .collect();

        for _ in &clients {
            let connection = connections
                .next()
                .expect("Stream ended early")
                .expect("Stream failed");

            assert_eq!(connection.family(), AddressFamily::Inet);
            assert_eq!(
                connection.local_addr().expect("Failed to get local address"),
                addr
            );
        }
    }

    #[test]
    fn test_stream_ends_after_shutdown() {
        let reactor = Reactor::start().expect("Failed to start reactor");
        let server = Server::new(&reactor.handle()).expect("Failed to create server");
        server.bind("127.0.0.1", 0).expect("Failed to bind server");

        let mut connections = block_on_stream(server.incoming().into_stream());

        thread::scope(|scope| {
            scope.spawn(|| {
                thread::sleep(Duration::from_millis(50));
                server.shutdown();
            });

            assert!(connections.next().is_none());
        });

        assert!(server.is_closed());
    }

    #[test]
    fn test_stream_reports_listen_failure_once() {
        let reactor = Reactor::start().expect("Failed to start reactor");
        let server = Server::new(&reactor.handle()).expect("Failed to create server");
        server.bind("127.0.0.1", 0).expect("Failed to bind server");
        server.shutdown();

        let mut connections = block_on_stream(server.incoming().into_stream());

        let error = connections
            .next()
            .expect("Failure must be yielded")
            .expect_err("Listen on a closed socket");
        assert_eq!(error.raw_os_error(), Some(libc::EBADF));
        assert!(connections.next().is_none());
    }

    #[test]
    fn test_stream_ends_when_reactor_stops() {
        let reactor = Reactor::start().expect("Failed to start reactor");
        let server = Server::new(&reactor.handle()).expect("Failed to create server");
        server.bind("127.0.0.1", 0).expect("Failed to bind server");

        let mut connections = block_on_stream(server.incoming().into_stream());
        drop(reactor);

        assert!(connections.next().is_none());
        assert!(server.is_closed());
    }

    #[test]
    fn test_stream_ends_when_reactor_stops_while_subscribing() {
        for _ in 0..50 {
            let reactor = Reactor::start().expect("Failed to start reactor");
            let server = Server::new(&reactor.handle()).expect("Failed to create server");
            server.bind("127.0.0.1", 0).expect("Failed to bind server");

            let items: Vec<_> = thread::scope(|scope| {
                let consumer =
                    scope.spawn(|| block_on_stream(server.incoming().into_stream()).collect::<Vec<_>>());
                scope.spawn(move || drop(reactor));

                consumer.join().expect("Consumer panicked")
            });

            for item in items {
                let error = item.expect_err("No client ever connected");
                assert_eq!(error.raw_os_error(), Some(libc::ESHUTDOWN));
            }
            assert!(server.is_closed());
        }
    }
}
