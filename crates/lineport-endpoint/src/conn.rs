use std::io::Read;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lineport_frame::{split_fragments, LineWriter};
use lineport_transport::{LinkStream, TcpServer};
use tracing::{debug, error, info, warn};

use crate::queue::BoundedQueue;
use crate::shutdown::ShutdownToken;
use crate::worker::LazyWorker;

const STATE_AWAITING: u8 = 0;
const STATE_CONNECTED: u8 = 1;
const STATE_RECONNECTING: u8 = 2;
const STATE_TERMINATED: u8 = 3;

/// Where the connection lifecycle currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Listening, no client attached.
    AwaitingConnection,
    /// One client attached, receive loop active.
    Connected,
    /// Client lost; waiting out the reconnect delay before listening again.
    Reconnecting,
    /// Endpoint shut down. Terminal.
    Terminated,
}

impl ConnState {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            STATE_CONNECTED => ConnState::Connected,
            STATE_RECONNECTING => ConnState::Reconnecting,
            STATE_TERMINATED => ConnState::Terminated,
            _ => ConnState::AwaitingConnection,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnState::AwaitingConnection => STATE_AWAITING,
            ConnState::Connected => STATE_CONNECTED,
            ConnState::Reconnecting => STATE_RECONNECTING,
            ConnState::Terminated => STATE_TERMINATED,
        }
    }
}

/// Shared handle to the currently attached client; empty whenever no client
/// is connected.
///
/// The writer lock is held for the full duration of a socket write, so it is
/// never safe to wait on it during shutdown. The shutdown half of the stream
/// therefore lives behind its own lock, which no write ever holds:
/// [`disconnect`](ClientHandle::disconnect) closes the socket through it
/// first, forcing any in-flight blocked write to return, and only then clears
/// the writer slot.
pub(crate) struct ClientHandle {
    writer: Mutex<Option<LineWriter<LinkStream>>>,
    shutdown: Mutex<Option<LinkStream>>,
}

impl ClientHandle {
    pub(crate) fn new() -> Self {
        Self {
            writer: Mutex::new(None),
            shutdown: Mutex::new(None),
        }
    }

    fn attach(&self, writer: LineWriter<LinkStream>, shutdown: LinkStream) {
        *self
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(shutdown);
        *self.writer.lock().unwrap_or_else(PoisonError::into_inner) = Some(writer);
    }

    /// Close the attached socket and clear the slot. Safe to call while a
    /// write is in flight: the socket is shut down before the writer lock is
    /// taken, so a blocked write returns with an error instead of holding the
    /// lock indefinitely.
    pub(crate) fn disconnect(&self) {
        if let Some(stream) = self
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = stream.shutdown();
        }
        *self.writer.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Lock the writer slot for one outbound line.
    pub(crate) fn writer(&self) -> MutexGuard<'_, Option<LineWriter<LinkStream>>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) type ClientSlot = Arc<ClientHandle>;

/// Owns the listening socket and drives the accept → connected →
/// reconnect-wait cycle on a dedicated thread.
///
/// Exactly one client is served at a time. Received buffers are framed into
/// CR-delimited fragments, pushed to the inbound queue and the receiver
/// worker is triggered after each batch. Any receive fault or end-of-stream
/// tears the session down and schedules one reconnect wait; the loop then
/// listens again until the stop token latches.
pub struct ConnectionManager {
    server: TcpServer,
    client: ClientSlot,
    state: Arc<AtomicU8>,
    inbound: Arc<BoundedQueue<String>>,
    rx_worker: LazyWorker<String>,
    token: ShutdownToken,
    reconnect_delay: Duration,
    poll_interval: Duration,
    write_timeout: Option<Duration>,
}

impl ConnectionManager {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        server: TcpServer,
        client: ClientSlot,
        state: Arc<AtomicU8>,
        inbound: Arc<BoundedQueue<String>>,
        rx_worker: LazyWorker<String>,
        token: ShutdownToken,
        reconnect_delay: Duration,
        poll_interval: Duration,
        write_timeout: Option<Duration>,
    ) -> Self {
        Self {
            server,
            client,
            state,
            inbound,
            rx_worker,
            token,
            reconnect_delay,
            poll_interval,
            write_timeout,
        }
    }

    /// Run the lifecycle loop until the stop token latches. Consumes the
    /// manager; intended to be the body of its thread.
    pub fn run(self) {
        while !self.token.is_stopping() {
            self.set_state(ConnState::AwaitingConnection);
            info!("waiting for connection");

            let stream = match self.server.accept() {
                Ok(stream) => stream,
                Err(err) => {
                    if self.token.is_stopping() {
                        break;
                    }
                    error!(%err, "accept failed");
                    if self.token.wait_timeout(self.poll_interval) {
                        break;
                    }
                    continue;
                }
            };

            // A wake connection issued during shutdown lands here.
            if self.token.is_stopping() {
                break;
            }

            self.session(stream);
            self.detach_client();

            if self.token.is_stopping() {
                break;
            }
            self.set_state(ConnState::Reconnecting);
            info!(delay = ?self.reconnect_delay, "starting reconnect wait");
            if self.token.wait_timeout(self.reconnect_delay) {
                break;
            }
        }

        self.detach_client();
        self.set_state(ConnState::Terminated);
        debug!("connection manager terminated");
    }

    /// Serve one attached client until it disconnects or the token latches.
    fn session(&self, mut stream: LinkStream) {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        info!(%peer, "connection accepted from processor");

        if let Err(err) = stream.set_read_timeout(Some(self.poll_interval)) {
            warn!(%err, "could not set read timeout; dropping client");
            return;
        }
        if !self.attach_client(&stream) {
            return;
        }
        self.set_state(ConnState::Connected);

        let mut chunk = [0u8; 4096];
        loop {
            if self.token.is_stopping() {
                return;
            }
            match stream.read(&mut chunk) {
                Ok(0) => {
                    // End of stream is the disconnect signal, logged apart
                    // from ordinary receive faults.
                    error!(%peer, "client disconnected");
                    return;
                }
                Ok(read) => self.ingest(&chunk[..read]),
                Err(err)
                    if matches!(
                        err.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    // Idle link; loop back around to poll the token.
                    continue;
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(%peer, %err, "receive failed; treating as disconnect");
                    return;
                }
            }
        }
    }

    /// Frame one received buffer and hand the fragments to the inbound
    /// queue. Every fragment is enqueued, noise included — the consumer hook
    /// discards artifacts, keeping framing and validation apart.
    fn ingest(&self, buf: &[u8]) {
        for fragment in split_fragments(buf) {
            if !self.inbound.try_enqueue(fragment) {
                warn!("inbound queue full; dropping fragment");
            }
        }
        self.rx_worker.ensure_running();
    }

    fn attach_client(&self, stream: &LinkStream) -> bool {
        let writer_stream = match stream.try_clone() {
            Ok(cloned) => cloned,
            Err(err) => {
                warn!(%err, "could not clone client stream; dropping client");
                return false;
            }
        };
        let shutdown_stream = match stream.try_clone() {
            Ok(cloned) => cloned,
            Err(err) => {
                warn!(%err, "could not clone client stream; dropping client");
                return false;
            }
        };
        let writer = match LineWriter::with_write_timeout(writer_stream, self.write_timeout) {
            Ok(writer) => writer,
            Err(err) => {
                warn!(%err, "could not set write timeout; dropping client");
                return false;
            }
        };
        self.client.attach(writer, shutdown_stream);
        true
    }

    fn detach_client(&self) {
        self.client.disconnect();
    }

    fn set_state(&self, state: ConnState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }
}
