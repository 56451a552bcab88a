#[cfg(test)]
mod tests {
    use edge::error::Operation;
    use edge::{Connection, Reactor, Result, Server};

    use std::collections::HashSet;
    use std::net::{SocketAddr, TcpStream};
    use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
    use std::thread;
    use std::time::{Duration, Instant};

    const WAIT: Duration = Duration::from_secs(10);

    fn bound_server(reactor: &Reactor) -> (Server, SocketAddr) {
        let server = Server::new(&reactor.handle()).expect("Failed to create server");
        server.bind("127.0.0.1", 0).expect("Failed to bind server");
        let addr = server.local_addr().expect("Failed to get local address");
        (server, addr)
    }

    fn channel() -> (
        impl FnMut(Result<Connection>) + Send + 'static,
        Receiver<Result<Connection>>,
    ) {
        let (tx, rx) = mpsc::channel();
        (
            move |event: Result<Connection>| {
                let _ = tx.send(event);
            },
            rx,
        )
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + WAIT;

        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }

        condition()
    }

    #[test]
    fn test_listening_server_emits_nothing_while_idle() {
        let reactor = Reactor::start().expect("Failed to start reactor");
        let (server, _) = bound_server(&reactor);
        let (observer, rx) = channel();

        let subscription = server.incoming().subscribe(observer);

        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(200)),
            Err(RecvTimeoutError::Timeout)
        ));
        assert!(!subscription.is_terminated());
        assert!(!server.is_closed());
    }

    #[test]
    fn test_every_connection_is_emitted_exactly_once() {
        const CLIENTS: usize = 16;

        let reactor = Reactor::start().expect("Failed to start reactor");
        let (server, addr) = bound_server(&reactor);
        let (observer, rx) = channel();

        let _subscription = server.incoming().subscribe(observer);

        let clients: Vec<TcpStream> = (0..CLIENTS)
            .map(|_| TcpStream::connect(addr).expect("Failed to connect"))
            .collect();
        let expected: HashSet<SocketAddr> = clients
            .iter()
            .map(|client| client.local_addr().expect("Failed to get client address"))
            .collect();

        let mut peers = HashSet::new();
        for _ in 0..CLIENTS {
            let connection = rx
                .recv_timeout(WAIT)
                .expect("Connection not emitted in time")
                .expect("Stream failed");

            assert!(connection.is_nonblocking().expect("Failed to read flags"));
            assert!(peers.insert(connection.peer_addr()), "duplicate emission");
        }

        assert_eq!(peers, expected);
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(200)),
            Err(RecvTimeoutError::Timeout)
        ));
    }

    #[test]
    fn test_backlog_of_one_still_emits_both_clients() {
        let reactor = Reactor::start().expect("Failed to start reactor");
        let (server, addr) = bound_server(&reactor);
        let (observer, rx) = channel();

        let _subscription = server.incoming_with_backlog(1).subscribe(observer);

        let handles: Vec<_> = (0..2)
            .map(|_| thread::spawn(move || TcpStream::connect(addr).expect("Failed to connect")))
            .collect();

        let first = rx.recv_timeout(WAIT).expect("First client").expect("Stream failed");
        let second = rx.recv_timeout(WAIT).expect("Second client").expect("Stream failed");
        assert_ne!(first.peer_addr(), second.peer_addr());

        for handle in handles {
            handle.join().expect("Thread panicked");
        }
    }

    #[test]
    fn test_dispose_closes_the_socket_once() {
        let reactor = Reactor::start().expect("Failed to start reactor");
        let (server, addr) = bound_server(&reactor);
        let (observer, rx) = channel();

        let subscription = server.incoming().subscribe(observer);
        subscription.dispose();

        assert!(wait_until(|| server.is_closed()), "socket still open");

        // The accept loop and its observer are gone without emitting.
        assert!(matches!(
            rx.recv_timeout(WAIT),
            Err(RecvTimeoutError::Disconnected)
        ));

        server.shutdown();
        assert!(server.is_closed());

        let rebound = Server::new(&reactor.handle()).expect("Failed to create server");
        rebound
            .bind("127.0.0.1", addr.port())
            .expect("Port should be free after disposal");
    }

    #[test]
    fn test_dropping_the_subscription_cancels() {
        let reactor = Reactor::start().expect("Failed to start reactor");
        let (server, _) = bound_server(&reactor);
        let (observer, _rx) = channel();

        drop(server.incoming().subscribe(observer));

        assert!(wait_until(|| server.is_closed()), "socket still open");
    }

    #[test]
    fn test_second_subscription_is_rejected() {
        let reactor = Reactor::start().expect("Failed to start reactor");
        let (server, addr) = bound_server(&reactor);
        let (first, first_rx) = channel();
        let (second, second_rx) = channel();

        let _active = server.incoming().subscribe(first);
        let rejected = server.incoming().subscribe(second);

        let error = second_rx
            .try_recv()
            .expect("Failure delivered synchronously")
            .expect_err("Second subscription must fail");
        assert_eq!(error.operation(), Operation::Listen);
        assert_eq!(error.raw_os_error(), Some(libc::EALREADY));
        assert!(rejected.is_terminated());

        drop(rejected);

        let _client = TcpStream::connect(addr).expect("Failed to connect");
        first_rx
            .recv_timeout(WAIT)
            .expect("First subscription still active")
            .expect("Stream failed");
        assert!(!server.is_closed());
    }

    #[test]
    fn test_subscribing_after_shutdown_fails_listen() {
        let reactor = Reactor::start().expect("Failed to start reactor");
        let (server, _) = bound_server(&reactor);
        let (observer, rx) = channel();

        server.shutdown();
        assert!(server.is_closed());

        let subscription = server.incoming().subscribe(observer);

        let error = rx
            .try_recv()
            .expect("Failure delivered synchronously")
            .expect_err("Listen on a closed socket");
        assert_eq!(error.operation(), Operation::Listen);
        assert_eq!(error.raw_os_error(), Some(libc::EBADF));
        assert!(subscription.is_terminated());
    }

    #[test]
    fn test_shutdown_stops_delivery() {
        let reactor = Reactor::start().expect("Failed to start reactor");
        let (server, addr) = bound_server(&reactor);
        let (observer, rx) = channel();

        let subscription = server.incoming().subscribe(observer);
        server.shutdown();
        server.shutdown();

        assert!(wait_until(|| subscription.is_terminated()), "stream still running");
        assert!(server.is_closed());
        assert!(matches!(
            rx.recv_timeout(WAIT),
            Err(RecvTimeoutError::Disconnected)
        ));
        assert!(TcpStream::connect(addr).is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_forced_accept_failure_ends_the_stream() {
        use std::os::fd::AsRawFd;

        let reactor = Reactor::start().expect("Failed to start reactor");
        let (server, _) = bound_server(&reactor);
        let (observer, rx) = channel();

        let subscription = server.incoming().subscribe(observer);

        // Takes the socket out of the listening state; the next accept
        // fails with EINVAL.
        let rc = unsafe { libc::shutdown(server.as_raw_fd(), libc::SHUT_RDWR) };
        assert_eq!(rc, 0);

        let error = rx
            .recv_timeout(WAIT)
            .expect("Failure not emitted in time")
            .expect_err("Stream must fail");
        assert_eq!(error.operation(), Operation::Accept);
        assert!(server.is_closed(), "socket must be closed before the failure");

        assert!(matches!(
            rx.recv_timeout(WAIT),
            Err(RecvTimeoutError::Disconnected)
        ));
        assert!(wait_until(|| subscription.is_terminated()));
    }

    #[test]
    fn test_reactor_shutdown_closes_active_servers() {
        let reactor = Reactor::start().expect("Failed to start reactor");
        let (server, _) = bound_server(&reactor);
        let (observer, rx) = channel();

        let subscription = server.incoming().subscribe(observer);
        drop(reactor);

        assert!(server.is_closed());
        assert!(subscription.is_terminated());
        assert!(matches!(
            rx.recv_timeout(WAIT),
            Err(RecvTimeoutError::Disconnected)
        ));
    }
}
