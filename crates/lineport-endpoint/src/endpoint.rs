use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use lineport_frame::is_noise;
use lineport_transport::{TcpServer, DEFAULT_BACKLOG};
use tracing::{debug, error, info, warn};

use crate::conn::{ClientHandle, ClientSlot, ConnState, ConnectionManager};
use crate::error::Result;
use crate::queue::BoundedQueue;
use crate::shutdown::ShutdownToken;
use crate::worker::{DispatchMode, LazyWorker, DEFAULT_DEQUEUE_TIMEOUT};

/// Endpoint behavior knobs. The defaults are the production constants; tests
/// shrink the timing fields to run waits at millisecond scale.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Local address to bind. Default: all interfaces.
    pub host: IpAddr,
    /// Local port to bind. `0` picks an ephemeral port.
    pub port: u16,
    /// Accept backlog handed to the transport layer.
    pub backlog: i32,
    /// Capacity of each message queue.
    pub queue_capacity: usize,
    /// Blocking-dequeue timeout per worker loop iteration.
    pub dequeue_timeout: Duration,
    /// Delay between losing a client and listening again.
    pub reconnect_delay: Duration,
    /// Receive-side read timeout; bounds how often the stop token is polled.
    pub poll_interval: Duration,
    /// Bounds how long one outbound line may block on a client that stops
    /// reading. `None` removes the bound.
    pub write_timeout: Option<Duration>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            backlog: DEFAULT_BACKLOG,
            queue_capacity: 50,
            dequeue_timeout: DEFAULT_DEQUEUE_TIMEOUT,
            reconnect_delay: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
            write_timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl EndpointConfig {
    /// Default configuration bound to `port` on all interfaces.
    pub fn for_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }
}

/// Host process lifecycle notifications an embedding application forwards to
/// the endpoint. Every one of them shuts the endpoint down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The host program is stopping.
    Stopping,
    /// The host program is being paused.
    Paused,
    /// The system is rebooting.
    Rebooting,
}

/// A persistent TCP server endpoint for one control-processor client.
///
/// Construction binds the listener and starts the connection lifecycle;
/// [`send`] queues outbound lines for best-effort delivery; the `on_line`
/// hook passed to [`bind`] observes every received message. [`terminate`]
/// shuts everything down and is idempotent; dropping the endpoint calls it.
///
/// [`bind`]: LineEndpoint::bind
/// [`send`]: LineEndpoint::send
/// [`terminate`]: LineEndpoint::terminate
pub struct LineEndpoint {
    outbound: Arc<BoundedQueue<String>>,
    tx_worker: LazyWorker<String>,
    client: ClientSlot,
    state: Arc<AtomicU8>,
    token: ShutdownToken,
    local_addr: SocketAddr,
    manager: Mutex<Option<JoinHandle<()>>>,
}

impl LineEndpoint {
    /// Bind the listening socket and start accepting.
    ///
    /// `on_line` is invoked once per received message fragment that is not a
    /// framing artifact (empty or a lone CR). It runs on a fire-and-forget
    /// thread per message: a slow hook cannot stall the endpoint, and
    /// completion order across messages is not guaranteed.
    pub fn bind(
        config: EndpointConfig,
        on_line: impl Fn(&str) + Send + Sync + 'static,
    ) -> Result<Self> {
        let server = TcpServer::bind_with_backlog((config.host, config.port), config.backlog)?;
        let local_addr = server.local_addr();

        let token = ShutdownToken::new();
        let inbound = Arc::new(BoundedQueue::new(config.queue_capacity));
        let outbound = Arc::new(BoundedQueue::new(config.queue_capacity));
        let client: ClientSlot = Arc::new(ClientHandle::new());
        let state = Arc::new(AtomicU8::new(0));

        let hook = Arc::new(on_line);
        let rx_worker = LazyWorker::new(
            "lineport-rx",
            Arc::clone(&inbound),
            token.clone(),
            config.dequeue_timeout,
            DispatchMode::Spawned,
            move |fragment: String| {
                if is_noise(&fragment) {
                    return;
                }
                hook(&fragment);
            },
        );

        let writer_slot = Arc::clone(&client);
        let tx_worker = LazyWorker::new(
            "lineport-tx",
            Arc::clone(&outbound),
            token.clone(),
            config.dequeue_timeout,
            DispatchMode::Inline,
            move |msg: String| {
                let mut slot = writer_slot.writer();
                match slot.as_mut() {
                    Some(writer) => {
                        if let Err(err) = writer.send_line(&msg) {
                            warn!(%err, "send failed; dropping line");
                        }
                    }
                    None => warn!("no client connected; dropping line"),
                }
            },
        );

        let manager = ConnectionManager::new(
            server,
            Arc::clone(&client),
            Arc::clone(&state),
            inbound,
            rx_worker,
            token.clone(),
            config.reconnect_delay,
            config.poll_interval,
            config.write_timeout,
        );
        let handle = std::thread::Builder::new()
            .name("lineport-conn".to_string())
            .spawn(move || manager.run())
            .map_err(lineport_transport::TransportError::Io)?;

        info!(%local_addr, "endpoint started");

        Ok(Self {
            outbound,
            tx_worker,
            client,
            state,
            token,
            local_addr,
            manager: Mutex::new(Some(handle)),
        })
    }

    /// Queue a line for delivery to the attached client.
    ///
    /// Best-effort: when the endpoint is stopping or the outbound queue is
    /// full the line is dropped with a log entry, and a later socket write
    /// failure also only logs. Nothing is reported back to the caller.
    pub fn send(&self, msg: impl Into<String>) {
        if self.token.is_stopping() {
            debug!("endpoint stopping; dropping outbound line");
            return;
        }
        if !self.outbound.try_enqueue(msg.into()) {
            warn!("outbound queue full; dropping line");
        }
        self.tx_worker.ensure_running();
    }

    /// React to a host process lifecycle notification.
    pub fn handle_lifecycle(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Stopping | LifecycleEvent::Paused | LifecycleEvent::Rebooting => {
                info!(?event, "host lifecycle event; terminating");
                self.terminate();
            }
        }
    }

    /// Shut the endpoint down: stop the workers, disconnect the client, stop
    /// listening. Idempotent — only the first call has side effects.
    pub fn terminate(&self) {
        if !self.token.trigger() {
            return;
        }
        info!("terminating endpoint");

        // Disconnecting the client unblocks the session read immediately,
        // and any sender write blocked on a stalled client returns with an
        // error once the socket closes under it.
        self.client.disconnect();

        // A blocked accept only returns when a connection arrives; feed it
        // one so the manager loop observes the token.
        if let Err(err) = lineport_transport::connect(wake_addr(self.local_addr)) {
            debug!(%err, "shutdown wake connect failed");
        }

        let handle = self
            .manager
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("connection manager thread panicked");
            }
        }
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Current connection lifecycle state.
    pub fn state(&self) -> ConnState {
        ConnState::from_u8(self.state.load(Ordering::SeqCst))
    }
}

impl Drop for LineEndpoint {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Address a shutdown wake connection should target. A listener bound to the
/// unspecified address is reachable via loopback.
fn wake_addr(local: SocketAddr) -> SocketAddr {
    if local.ip().is_unspecified() {
        let loopback: IpAddr = match local.ip() {
            IpAddr::V4(_) => Ipv4Addr::LOCALHOST.into(),
            IpAddr::V6(_) => Ipv6Addr::LOCALHOST.into(),
        };
        SocketAddr::new(loopback, local.port())
    } else {
        local
    }
}
