//! Cross-process recording start synchronization.
//!
//! Every capture worker in the process shares one [`SyncGate`]: a retain flag
//! that starts closed in wait mode and opens exactly once per session. The
//! [`TriggerChannel`] is how independently launched recorder processes agree
//! on that instant: each binds a UDP port and blocks until the marker
//! datagram arrives, so cross-process start skew is bounded by channel
//! latency instead of per-process startup jitter.

use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};

use crate::errors::RecorderError;

/// Datagram payload that opens the gate.
pub const START_MARKER: &str = "Action";

/// Shared retain flag. Once opened it never closes within the session.
#[derive(Debug)]
pub struct SyncGate {
    retain: AtomicBool,
}

impl SyncGate {
    /// Gate that retains from the first frame (no external trigger).
    pub fn open_from_start() -> Self {
        Self {
            retain: AtomicBool::new(true),
        }
    }

    /// Gate that discards frames until [`SyncGate::open`] is called.
    pub fn closed() -> Self {
        Self {
            retain: AtomicBool::new(false),
        }
    }

    /// Release ordering: every frame a worker retains after observing the
    /// open gate is consistently sequenced across all devices.
    pub fn open(&self) {
        self.retain.store(true, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.retain.load(Ordering::Acquire)
    }
}

/// Inbound trigger channel. Single-shot per session: after the marker is
/// seen once, later datagrams are irrelevant to this session.
pub struct TriggerChannel {
    socket: UdpSocket,
    port: u16,
}

impl TriggerChannel {
    pub fn bind(port: u16) -> Result<Self, RecorderError> {
        let socket = UdpSocket::bind(("0.0.0.0", port))
            .map_err(|e| RecorderError::Trigger(format!("bind on port {} failed: {}", port, e)))?;
        // Read the port back so an ephemeral bind (port 0) reports the real one.
        let port = socket
            .local_addr()
            .map_err(|e| RecorderError::Trigger(format!("local address lookup failed: {}", e)))?
            .port();
        Ok(Self { socket, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Blocks until a datagram equal to `marker` arrives. Other payloads are
    /// ignored and the wait continues. There is deliberately no timeout:
    /// absence of a trigger is an explicit hang, not a failure.
    pub fn wait_for(&self, marker: &str) -> Result<(), RecorderError> {
        info!("waiting for \"{}\" on udp port {}", marker, self.port);
        let mut buf = [0u8; 256];
        loop {
            let (len, peer) = self
                .socket
                .recv_from(&mut buf)
                .map_err(|e| RecorderError::Trigger(format!("recv failed: {}", e)))?;
            let payload = &buf[..len];
            if payload == marker.as_bytes() {
                info!("trigger \"{}\" received from {}", marker, peer);
                return Ok(());
            }
            debug!(
                "ignoring non-marker datagram from {} ({} bytes)",
                peer, len
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn gate_default_modes() {
        assert!(SyncGate::open_from_start().is_open());
        assert!(!SyncGate::closed().is_open());
    }

    #[test]
    fn gate_opens_once_and_stays_open() {
        let gate = SyncGate::closed();
        gate.open();
        assert!(gate.is_open());
        gate.open();
        assert!(gate.is_open());
    }

    #[test]
    fn ephemeral_bind_reports_real_port() {
        let channel = TriggerChannel::bind(0).expect("bind ephemeral port");
        assert_ne!(channel.port(), 0);
    }

    #[test]
    fn trigger_ignores_other_payloads_then_fires() {
        let channel = TriggerChannel::bind(0).expect("bind ephemeral port");
        let port = channel.port();

        let gate = Arc::new(SyncGate::closed());
        let gate2 = gate.clone();
        let waiter = std::thread::spawn(move || {
            channel.wait_for(START_MARKER).expect("wait_for");
            gate2.open();
        });

        let sender = UdpSocket::bind(("127.0.0.1", 0)).expect("sender bind");
        sender.send_to(b"noise", ("127.0.0.1", port)).expect("send");
        sender.send_to(b"Actio", ("127.0.0.1", port)).expect("send");
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!gate.is_open(), "gate must stay closed until the marker");

        sender
            .send_to(START_MARKER.as_bytes(), ("127.0.0.1", port))
            .expect("send marker");
        waiter.join().expect("waiter join");
        assert!(gate.is_open());
    }
}
