#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use qos_agent::WorkerSettings;
use qos_common::protocol::{EchoMessage, ECHO_REPLY};

/// Loopback stand-in for the remote echo service.
pub struct Responder {
    pub addr: SocketAddr,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

pub struct ResponderBehavior {
    pub payload: &'static [u8],
    pub delay: Duration,
    pub copies: usize,
    /// Datagram sent after `delay`, followed by `preamble_gap` before the
    /// payload goes out.
    pub preamble: Option<&'static [u8]>,
    pub preamble_gap: Duration,
}

impl Default for ResponderBehavior {
    fn default() -> Self {
        Self {
            payload: &ECHO_REPLY,
            delay: Duration::ZERO,
            copies: 1,
            preamble: None,
            preamble_gap: Duration::ZERO,
        }
    }
}

impl Responder {
    pub fn spawn(ip: Ipv4Addr, behavior: ResponderBehavior) -> Self {
        let socket = UdpSocket::bind(SocketAddr::new(IpAddr::V4(ip), 0)).unwrap();
        socket.set_read_timeout(Some(Duration::from_millis(20))).unwrap();
        let addr = socket.local_addr().unwrap();
        let stop = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 16];
            while !flag.load(Ordering::SeqCst) {
                let Ok((n, from)) = socket.recv_from(&mut buf) else {
                    continue;
                };
                if EchoMessage::parse(&buf[..n]) != Some(EchoMessage::Request) {
                    continue;
                }
                std::thread::sleep(behavior.delay);
                if let Some(preamble) = behavior.preamble {
                    let _ = socket.send_to(preamble, from);
                    std::thread::sleep(behavior.preamble_gap);
                }
                for _ in 0..behavior.copies {
                    let _ = socket.send_to(behavior.payload, from);
                }
            }
        });

        Self {
            addr,
            stop,
            handle: Some(handle),
        }
    }

    pub fn echo(ip: Ipv4Addr) -> Self {
        Self::spawn(ip, ResponderBehavior::default())
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub fn settings() -> WorkerSettings {
    WorkerSettings {
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        poll_interval: Duration::from_millis(100),
        thread_name: "qos-test-worker".to_string(),
    }
}

/// Second loopback address; Linux routes all of 127/8 to `lo`.
pub const ALT_LOOPBACK: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 2);
