//! Worker thread: socket ownership and the receive/send loop

use std::collections::VecDeque;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, error, info, trace, warn};
use vta_core::Envelope;

use crate::error::TransportError;

/// Inbound and outbound queues, each behind its own lock
#[derive(Debug, Default)]
pub(crate) struct Queues {
    pub inbound: Mutex<VecDeque<Envelope>>,
    pub outbound: Mutex<VecDeque<Envelope>>,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub datagrams_sent: AtomicU64,
    pub datagrams_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub send_failures: AtomicU64,
}

/// State shared between a transport and the one worker it started
#[derive(Debug)]
pub(crate) struct WorkerHandle {
    pub local_port: u16,
    pub remote_address: String,
    pub remote_port: u16,
    /// Port actually bound (differs from `local_port` when that is 0)
    pub bound_port: AtomicU16,
    pub cancel_requested: AtomicBool,
    pub closed: AtomicBool,
}

impl WorkerHandle {
    pub fn new(local_port: u16, remote_address: String, remote_port: u16) -> Self {
        Self {
            local_port,
            remote_address,
            remote_port,
            bound_port: AtomicU16::new(0),
            cancel_requested: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Marks the handle closed when the worker thread exits
struct CloseOnExit(Arc<WorkerHandle>);

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        self.0.closed.store(true, Ordering::SeqCst);
    }
}

/// Per-worker settings copied out of the transport configuration
#[derive(Debug, Clone)]
pub(crate) struct WorkerOptions {
    pub name: String,
    pub receive_timeout: Duration,
    pub max_datagram_len: usize,
    pub max_sends_per_cycle: usize,
}

pub(crate) struct Worker {
    handle: Arc<WorkerHandle>,
    queues: Arc<Queues>,
    counters: Arc<Counters>,
    options: WorkerOptions,
    destination: Option<SocketAddr>,
}

impl Worker {
    pub fn new(
        handle: Arc<WorkerHandle>,
        queues: Arc<Queues>,
        counters: Arc<Counters>,
        options: WorkerOptions,
    ) -> Self {
        Self {
            handle,
            queues,
            counters,
            options,
            destination: None,
        }
    }

    /// Thread body. Always leaves the handle marked closed, even on panic.
    pub fn run(mut self) {
        let name = self.options.name.clone();
        let _closed = CloseOnExit(self.handle.clone());

        match bind_socket(self.handle.local_port, self.options.receive_timeout) {
            Ok(socket) => {
                if let Ok(addr) = socket.local_addr() {
                    self.handle.bound_port.store(addr.port(), Ordering::SeqCst);
                }
                debug!(
                    transport = %name,
                    port = self.handle.bound_port.load(Ordering::SeqCst),
                    "UDP worker started"
                );
                self.run_loop(&socket);
                // Closing a UDP socket cannot fail in a way we could act on
                drop(socket);
                debug!(transport = %name, "UDP worker terminated");
            }
            Err(e) => {
                error!(transport = %name, error = %e, "Cannot open datagram socket");
            }
        }
    }

    fn run_loop(&mut self, socket: &UdpSocket) {
        let mut buf = vec![0u8; self.options.max_datagram_len.max(1)];

        while !self.handle.is_cancel_requested() {
            match receive_one(socket, &mut buf) {
                Ok(Some(envelope)) => {
                    debug!(transport = %self.options.name, len = envelope.len(), "rcv");
                    trace!(
                        transport = %self.options.name,
                        "packet <-- {}",
                        hex::encode(envelope.as_ref())
                    );
                    self.counters
                        .datagrams_received
                        .fetch_add(1, Ordering::Relaxed);
                    self.counters
                        .bytes_received
                        .fetch_add(envelope.len() as u64, Ordering::Relaxed);
                    self.queues.inbound.lock().push_back(envelope);
                }
                Ok(None) => {}
                Err(e) => {
                    error!(transport = %self.options.name, error = %e, "Socket read failed, cancelling worker");
                    self.handle.request_cancel();
                }
            }

            if !self.handle.is_cancel_requested() {
                if let Err(e) = self.drain_outbound(socket) {
                    error!(transport = %self.options.name, error = %e, "Unable to send datagram, cancelling worker");
                    self.handle.request_cancel();
                }
            }
        }
    }

    /// Send queued envelopes in FIFO order
    ///
    /// The head is only removed after it was sent, so an envelope that failed
    /// stays queued. The lock is never held across the send itself; only this
    /// worker removes entries, so the head cannot change underneath it.
    fn drain_outbound(&mut self, socket: &UdpSocket) -> Result<(), TransportError> {
        let limit = match self.options.max_sends_per_cycle {
            0 => usize::MAX,
            n => n,
        };

        for _ in 0..limit {
            let Some(envelope) = self.queues.outbound.lock().front().cloned() else {
                break;
            };

            let destination = self.destination()?;
            debug!(
                transport = %self.options.name,
                len = envelope.len(),
                to = %destination,
                "send"
            );
            trace!(
                transport = %self.options.name,
                "packet --> {}",
                hex::encode(envelope.as_ref())
            );

            let sent = socket
                .send_to(envelope.as_ref(), destination)
                .map_err(|e| {
                    self.counters.send_failures.fetch_add(1, Ordering::Relaxed);
                    TransportError::SendFailed(e.to_string())
                })?;
            if sent < envelope.len() {
                warn!(transport = %self.options.name, sent, len = envelope.len(), "Short datagram send");
            }

            self.queues.outbound.lock().pop_front();
            self.counters.datagrams_sent.fetch_add(1, Ordering::Relaxed);
            self.counters
                .bytes_sent
                .fetch_add(sent as u64, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Remote endpoint, resolved on first use
    fn destination(&mut self) -> Result<SocketAddr, TransportError> {
        if let Some(addr) = self.destination {
            return Ok(addr);
        }

        let target = format!("{}:{}", self.handle.remote_address, self.handle.remote_port);
        let addr = (self.handle.remote_address.as_str(), self.handle.remote_port)
            .to_socket_addrs()
            .map_err(|e| TransportError::Resolve(format!("{}: {}", target, e)))?
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| TransportError::Resolve(target))?;

        info!(transport = %self.options.name, remote = %addr, "Remote endpoint resolved");
        self.destination = Some(addr);
        Ok(addr)
    }
}

/// Open a datagram socket on `0.0.0.0:port` with address reuse and a bounded
/// receive wait
fn bind_socket(port: u16, receive_timeout: Duration) -> Result<UdpSocket, TransportError> {
    let bind_err = |e: io::Error| TransportError::BindFailed {
        port,
        reason: e.to_string(),
    };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_err)?;
    socket.set_reuse_address(true).map_err(bind_err)?;
    socket
        .set_read_timeout(Some(receive_timeout))
        .map_err(bind_err)?;
    let local = SocketAddr::from(([0, 0, 0, 0], port));
    socket.bind(&local.into()).map_err(bind_err)?;

    Ok(socket.into())
}

/// One receive attempt; `Ok(None)` when the timeout elapsed with nothing read
fn receive_one(socket: &UdpSocket, buf: &mut [u8]) -> Result<Option<Envelope>, TransportError> {
    match socket.recv_from(buf) {
        Ok((len, _from)) => Ok(Some(Envelope::copy_from_slice(&buf[..len]))),
        Err(ref e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
            Ok(None)
        }
        Err(ref e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
        Err(e) => Err(TransportError::ReceiveFailed(e.to_string())),
    }
}
