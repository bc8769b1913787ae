//! Shutdown behaviour of a running server.

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

mod common;

use common::{connect, read_exact, start_server, tag_of};

#[test]
fn shutdown_closes_all_clients() {
    let server = start_server();
    let mut a = connect(server.addr);
    let mut b = connect(server.addr);

    // make sure both are accepted before stopping
    a.write_all(b"ping").unwrap();
    let expected = format!("{}ping", tag_of(&a));
    assert_eq!(read_exact(&mut b, expected.len()), expected.into_bytes());

    let (result, stats) = server.stop();
    result.unwrap();
    assert_eq!(stats.active_connections, 0);
    assert_eq!(stats.accepted_total, 2);

    let mut buf = [0u8; 16];
    for client in [&mut a, &mut b] {
        match client.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => panic!("unexpected {} bytes after shutdown", n),
            Err(e) => assert_eq!(e.kind(), ErrorKind::ConnectionReset),
        }
    }
}

#[test]
fn repeated_shutdown_requests_are_harmless() {
    let mut server = start_server();
    server.shutdown.trigger();
    server.shutdown.trigger();
    assert!(server.signals.len() <= 1);

    let (result, _stats) = server.join();
    result.unwrap();
}

#[test]
fn listener_is_gone_after_shutdown() {
    let server = start_server();
    let addr = server.addr;
    let (result, _stats) = server.stop();
    result.unwrap();

    let attempt = TcpStream::connect_timeout(&addr, Duration::from_millis(500));
    assert!(attempt.is_err());
}
