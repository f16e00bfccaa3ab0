//! DatagramTransport - queue-fronted UDP channel
//!
//! `send` and `receive` only touch in-memory queues. A worker thread started
//! by [`DatagramTransport::start`] does the socket I/O: one bounded receive
//! attempt per cycle, then an outbound drain. Cancellation is cooperative, so
//! [`DatagramTransport::stop`] returns immediately and callers poll
//! [`DatagramTransport::has_stopped`].

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};
use vta_core::Envelope;

use crate::config::UdpConfig;
use crate::error::TransportError;
use crate::worker::{Counters, Queues, Worker, WorkerHandle, WorkerOptions};

/// Poll step used by [`DatagramTransport::wait_stopped`]
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Traffic counters since the transport was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransportStats {
    pub datagrams_sent: u64,
    pub datagrams_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Sends rejected by the socket; each one ended the worker that hit it
    pub send_failures: u64,
}

struct ActiveWorker {
    handle: Arc<WorkerHandle>,
    thread: Option<thread::JoinHandle<()>>,
}

/// UDP transport with non-blocking queue access from any thread
pub struct DatagramTransport {
    config: UdpConfig,
    queues: Arc<Queues>,
    counters: Arc<Counters>,
    worker: Mutex<Option<ActiveWorker>>,
}

impl DatagramTransport {
    /// Transport with default settings; endpoints are given to [`Self::start`]
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_config(&UdpConfig {
            name: name.into(),
            ..UdpConfig::default()
        })
    }

    pub fn from_config(config: &UdpConfig) -> Self {
        Self {
            config: config.clone(),
            queues: Arc::new(Queues::default()),
            counters: Arc::new(Counters::default()),
            worker: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &UdpConfig {
        &self.config
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start a worker bound to `local_port`, sending to the remote endpoint
    ///
    /// Fails with [`TransportError::AlreadyRunning`] while an earlier worker
    /// has not closed yet. That earlier worker is asked to cancel, so a retry
    /// once [`Self::has_stopped`] turns true succeeds. A bind failure is not
    /// reported here; the worker closes immediately instead.
    pub fn try_start(
        &self,
        local_port: u16,
        remote_address: &str,
        remote_port: u16,
    ) -> Result<(), TransportError> {
        let mut slot = self.worker.lock();

        if let Some(active) = slot.as_mut() {
            if !active.handle.is_closed() {
                warn!(transport = %self.config.name, "Previous worker still open, cancelling it");
                active.handle.request_cancel();
                return Err(TransportError::AlreadyRunning(self.config.name.clone()));
            }
            if let Some(thread) = active.thread.take() {
                // Closed workers have already left their loop
                if thread.join().is_err() {
                    warn!(transport = %self.config.name, "Previous worker panicked");
                }
            }
        }

        let handle = Arc::new(WorkerHandle::new(
            local_port,
            remote_address.to_string(),
            remote_port,
        ));
        let worker = Worker::new(
            handle.clone(),
            self.queues.clone(),
            self.counters.clone(),
            WorkerOptions {
                name: self.config.name.clone(),
                receive_timeout: self.config.receive_timeout(),
                max_datagram_len: self.config.max_datagram_len,
                max_sends_per_cycle: self.config.max_sends_per_cycle,
            },
        );

        let thread = thread::Builder::new()
            .name(format!("udp-{}", self.config.name))
            .spawn(move || worker.run())
            .map_err(|e| {
                handle.closed.store(true, Ordering::SeqCst);
                TransportError::Spawn(e.to_string())
            });

        match thread {
            Ok(thread) => {
                info!(
                    transport = %self.config.name,
                    local_port,
                    remote = %format!("{}:{}", remote_address, remote_port),
                    "Datagram transport started"
                );
                *slot = Some(ActiveWorker {
                    handle,
                    thread: Some(thread),
                });
                Ok(())
            }
            Err(e) => {
                *slot = Some(ActiveWorker {
                    handle,
                    thread: None,
                });
                Err(e)
            }
        }
    }

    /// [`Self::try_start`] reduced to success or failure
    pub fn start(&self, local_port: u16, remote_address: &str, remote_port: u16) -> bool {
        match self.try_start(local_port, remote_address, remote_port) {
            Ok(()) => true,
            Err(e) => {
                debug!(transport = %self.config.name, error = %e, "Start rejected");
                false
            }
        }
    }

    /// Start with the endpoints from the configuration
    pub fn start_configured(&self) -> bool {
        let config = &self.config;
        self.start(config.local_port, &config.remote_address, config.remote_port)
    }

    /// Ask the worker to finish; returns without waiting
    pub fn stop(&self) {
        if let Some(active) = self.worker.lock().as_ref() {
            if !active.handle.is_cancel_requested() {
                debug!(transport = %self.config.name, "Stop requested");
            }
            active.handle.request_cancel();
        }
    }

    /// `true` if no worker was ever started or the last one has closed
    pub fn has_stopped(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map_or(true, |active| active.handle.is_closed())
    }

    /// Poll [`Self::has_stopped`] until it holds or `timeout` elapses
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.has_stopped() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(STOP_POLL_INTERVAL);
        }
    }

    /// Port the current worker bound, once its socket is open
    pub fn bound_port(&self) -> Option<u16> {
        self.worker.lock().as_ref().and_then(|active| {
            match active.handle.bound_port.load(Ordering::SeqCst) {
                0 => None,
                port => Some(port),
            }
        })
    }

    // =========================================================================
    // Queues
    // =========================================================================

    /// Queue an envelope for the worker to send
    pub fn send(&self, envelope: Envelope) {
        self.queues.outbound.lock().push_back(envelope);
    }

    /// Oldest received envelope, if any
    pub fn receive(&self) -> Option<Envelope> {
        self.queues.inbound.lock().pop_front()
    }

    /// Remove the oldest queued outbound envelope
    ///
    /// Only allowed while no worker is running, since a live worker may be
    /// sending that envelope. Returns `None` if a worker is open or the queue
    /// is empty.
    pub fn discard_outbound_head(&self) -> Option<Envelope> {
        let slot = self.worker.lock();
        if slot.as_ref().is_some_and(|active| !active.handle.is_closed()) {
            return None;
        }
        self.queues.outbound.lock().pop_front()
    }

    pub fn has_pending_outbound(&self) -> bool {
        !self.queues.outbound.lock().is_empty()
    }

    pub fn pending_outbound(&self) -> usize {
        self.queues.outbound.lock().len()
    }

    pub fn pending_inbound(&self) -> usize {
        self.queues.inbound.lock().len()
    }

    pub fn stats(&self) -> TransportStats {
        TransportStats {
            datagrams_sent: self.counters.datagrams_sent.load(Ordering::Relaxed),
            datagrams_received: self.counters.datagrams_received.load(Ordering::Relaxed),
            bytes_sent: self.counters.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.counters.bytes_received.load(Ordering::Relaxed),
            send_failures: self.counters.send_failures.load(Ordering::Relaxed),
        }
    }
}

impl Drop for DatagramTransport {
    fn drop(&mut self) {
        if let Some(active) = self.worker.get_mut().as_ref() {
            active.handle.request_cancel();
        }
    }
}

impl std::fmt::Debug for DatagramTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatagramTransport")
            .field("name", &self.config.name)
            .field("stopped", &self.has_stopped())
            .field("pending_outbound", &self.pending_outbound())
            .field("pending_inbound", &self.pending_inbound())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::net::UdpSocket;

    fn peer() -> (UdpSocket, u16) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, port)
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_never_started_has_stopped() {
        let transport = DatagramTransport::new("idle");
        assert!(transport.has_stopped());
        transport.stop();
        assert!(transport.has_stopped());
        assert_eq!(transport.bound_port(), None);
    }

    #[test]
    fn test_queues_work_without_worker() {
        let transport = DatagramTransport::new("queue");
        assert!(transport.receive().is_none());
        assert!(!transport.has_pending_outbound());

        transport.send(Envelope::copy_from_slice(b"A"));
        transport.send(Envelope::copy_from_slice(b"B"));
        assert!(transport.has_pending_outbound());
        assert_eq!(transport.pending_outbound(), 2);
    }

    #[test]
    #[serial]
    fn test_sends_in_fifo_order() {
        let (peer, peer_port) = peer();
        let transport = DatagramTransport::new("fifo");
        for msg in [b"A", b"B", b"C"] {
            transport.send(Envelope::copy_from_slice(msg));
        }
        assert!(transport.start(0, "127.0.0.1", peer_port));

        let mut buf = [0u8; 16];
        let mut got = Vec::new();
        for _ in 0..3 {
            let (len, _) = peer.recv_from(&mut buf).unwrap();
            got.push(buf[..len].to_vec());
        }
        assert_eq!(got, vec![b"A".to_vec(), b"B".to_vec(), b"C".to_vec()]);
        assert!(wait_for(|| !transport.has_pending_outbound()));
        assert_eq!(transport.stats().datagrams_sent, 3);

        transport.stop();
        assert!(transport.wait_stopped(Duration::from_secs(1)));
    }

    #[test]
    #[serial]
    fn test_receives_into_inbound_queue() {
        let transport = DatagramTransport::new("rx");
        assert!(transport.start(0, "127.0.0.1", 9));
        assert!(wait_for(|| transport.bound_port().is_some()));
        let port = transport.bound_port().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(&[1, 2, 3], ("127.0.0.1", port)).unwrap();

        assert!(wait_for(|| transport.pending_inbound() == 1));
        assert_eq!(transport.receive().unwrap().as_ref(), &[1u8, 2, 3][..]);
        assert!(transport.receive().is_none());
        assert_eq!(transport.stats().bytes_received, 3);

        transport.stop();
        assert!(transport.wait_stopped(Duration::from_secs(1)));
    }

    #[test]
    #[serial]
    fn test_double_start_rejected_until_closed() {
        let transport = DatagramTransport::new("double");
        assert!(transport.start(0, "127.0.0.1", 9));
        assert_eq!(
            transport.try_start(0, "127.0.0.1", 9),
            Err(TransportError::AlreadyRunning("double".to_string()))
        );

        // The rejected start cancelled the first worker
        assert!(transport.wait_stopped(Duration::from_secs(1)));
        assert!(transport.start(0, "127.0.0.1", 9));
        transport.stop();
        assert!(transport.wait_stopped(Duration::from_secs(1)));
    }

    #[test]
    #[serial]
    fn test_bind_failure_closes_worker() {
        let holder = UdpSocket::bind("0.0.0.0:0").unwrap();
        let port = holder.local_addr().unwrap().port();

        let transport = DatagramTransport::new("busy");
        assert!(transport.start(port, "127.0.0.1", 9));
        assert!(transport.wait_stopped(Duration::from_secs(1)));
        assert_eq!(transport.bound_port(), None);
    }

    #[test]
    #[serial]
    fn test_oversized_head_stops_worker_until_discarded() {
        let (peer, peer_port) = peer();
        let transport = DatagramTransport::new("oversized");
        transport.send(Envelope::from(vec![0u8; 70_000]));
        transport.send(Envelope::copy_from_slice(b"next"));

        assert!(transport.start(0, "127.0.0.1", peer_port));
        assert!(transport.wait_stopped(Duration::from_secs(1)));
        assert_eq!(transport.pending_outbound(), 2);
        assert_eq!(transport.stats().send_failures, 1);
        assert_eq!(transport.stats().datagrams_sent, 0);

        let dropped = transport.discard_outbound_head().unwrap();
        assert_eq!(dropped.len(), 70_000);
        assert!(transport.start(0, "127.0.0.1", peer_port));
        let mut buf = [0u8; 16];
        let (len, _) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"next");
        transport.stop();
        assert!(transport.wait_stopped(Duration::from_secs(1)));
    }

    #[test]
    #[serial]
    fn test_discard_refused_while_worker_open() {
        let (peer, peer_port) = peer();
        // Long receive wait keeps the envelope queued for the first cycle
        let transport = DatagramTransport::from_config(&UdpConfig {
            name: "busy-discard".to_string(),
            receive_timeout_ms: 1000,
            ..UdpConfig::new(0, "127.0.0.1", peer_port)
        });
        assert!(transport.start_configured());
        transport.send(Envelope::copy_from_slice(b"x"));
        assert!(transport.discard_outbound_head().is_none());

        let mut buf = [0u8; 16];
        let (len, _) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"x");
        transport.stop();
        assert!(transport.wait_stopped(Duration::from_secs(3)));
    }

    #[test]
    #[serial]
    fn test_unresolvable_remote_keeps_envelope_queued() {
        let transport = DatagramTransport::new("resolve");
        transport.send(Envelope::copy_from_slice(b"keep"));
        assert!(transport.start(0, "host.invalid", 6000));

        assert!(transport.wait_stopped(Duration::from_secs(5)));
        assert_eq!(transport.pending_outbound(), 1);

        // Queued envelope survives for a restarted worker
        let (peer, peer_port) = peer();
        assert!(transport.start(0, "127.0.0.1", peer_port));
        let mut buf = [0u8; 16];
        let (len, _) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"keep");
        transport.stop();
        assert!(transport.wait_stopped(Duration::from_secs(1)));
    }
}
