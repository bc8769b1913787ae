//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chat_server::config::{ListenerConfig, ServerConfig};
use chat_server::lifecycle::SignalQueue;
use chat_server::net::Listener;
use chat_server::observability::ServerStats;
use chat_server::{EventLoop, ServerError, Shutdown};

/// A chat server running its event loop on a background thread.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub signals: Arc<SignalQueue>,
    handle: Option<JoinHandle<(Result<(), ServerError>, ServerStats)>>,
}

impl TestServer {
    /// Request shutdown and wait for the loop to finish.
    pub fn stop(mut self) -> (Result<(), ServerError>, ServerStats) {
        self.shutdown.trigger();
        self.join()
    }

    /// Wait for the loop to finish on its own.
    pub fn join(&mut self) -> (Result<(), ServerError>, ServerStats) {
        self.handle
            .take()
            .expect("server already joined")
            .join()
            .expect("event loop thread panicked")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.shutdown.trigger();
            let _ = handle.join();
        }
    }
}

/// Boot a server on an ephemeral loopback port.
pub fn start_server() -> TestServer {
    start_server_with(|_| {})
}

/// Boot a server after adjusting the default test configuration.
pub fn start_server_with(configure: impl FnOnce(&mut ServerConfig)) -> TestServer {
    let mut config = ServerConfig::default();
    config.listener = ListenerConfig {
        host: "127.0.0.1".into(),
        port: 0,
    };
    config.event_loop.poll_timeout_ms = 20;
    configure(&mut config);

    let signals = Arc::new(SignalQueue::new());
    let listener = Listener::bind(&config.listener).unwrap();
    let mut event_loop = EventLoop::new(&config, listener, Arc::clone(&signals)).unwrap();
    let addr = event_loop.local_addr();

    let handle = std::thread::spawn(move || {
        let result = event_loop.run();
        (result, event_loop.stats())
    });

    TestServer {
        addr,
        shutdown: Shutdown::new(Arc::clone(&signals)),
        signals,
        handle: Some(handle),
    }
}

/// Connect a blocking client with a generous read timeout.
pub fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream
}

/// The tag the server prepends to bytes sent by `client`.
pub fn tag_of(client: &TcpStream) -> String {
    let addr = client.local_addr().unwrap();
    format!("[{}:{}]: ", addr.ip(), addr.port())
}

/// Read exactly `len` bytes or fail after the stream's read timeout.
pub fn read_exact(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).unwrap();
    buf
}

/// Assert that nothing arrives on `stream` for `wait`.
pub fn assert_silent(stream: &mut TcpStream, wait: Duration) {
    stream.set_read_timeout(Some(wait)).unwrap();
    let mut buf = [0u8; 256];
    match stream.read(&mut buf) {
        Ok(n) => panic!("unexpected {} bytes: {:?}", n, String::from_utf8_lossy(&buf[..n])),
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
        Err(e) => panic!("read failed: {}", e),
    }
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
}

/// Keep reading until `done` accepts the accumulated bytes.
pub fn read_until(stream: &mut TcpStream, mut done: impl FnMut(&[u8]) -> bool) -> Vec<u8> {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut received = Vec::new();
    let mut buf = [0u8; 16 * 1024];
    while !done(&received) {
        assert!(Instant::now() < deadline, "timed out after {} bytes", received.len());
        match stream.read(&mut buf) {
            Ok(0) => panic!("server closed the connection"),
            Ok(n) => received.extend_from_slice(&buf[..n]),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => panic!("read failed: {}", e),
        }
    }
    received
}
