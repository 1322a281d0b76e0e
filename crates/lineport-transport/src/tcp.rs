use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Default accept backlog for [`TcpServer::bind`].
pub const DEFAULT_BACKLOG: i32 = 1000;

/// A connected TCP stream — implements `Read` + `Write`.
///
/// This is the fundamental I/O type returned by transport operations.
/// Wraps the std stream with the timeout, clone and shutdown helpers the
/// upper layers need.
#[derive(Debug)]
pub struct LinkStream {
    inner: TcpStream,
}

impl Read for LinkStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for LinkStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl LinkStream {
    fn from_tcp(stream: TcpStream) -> Self {
        Self { inner: stream }
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self::from_tcp(cloned))
    }

    /// Shut down both halves of the connection.
    ///
    /// Unblocks any thread currently reading from the stream. `NotConnected`
    /// is ignored so repeated shutdowns are harmless.
    pub fn shutdown(&self) -> Result<()> {
        match self.inner.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    /// Address of the connected remote endpoint.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.inner.peer_addr().map_err(Into::into)
    }

    /// Local address of this end of the connection.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.local_addr().map_err(Into::into)
    }
}

/// TCP listening socket.
///
/// Binds a local endpoint and accepts one connection at a time. The accept
/// backlog is applied at bind; pending connection attempts beyond it are
/// refused by the kernel.
pub struct TcpServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpServer {
    /// Bind and listen on `addr` with the default backlog.
    pub fn bind(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<Self> {
        Self::bind_with_backlog(addr, DEFAULT_BACKLOG)
    }

    /// Bind and listen on `addr` with an explicit accept backlog.
    pub fn bind_with_backlog(
        addr: impl ToSocketAddrs + std::fmt::Debug,
        backlog: i32,
    ) -> Result<Self> {
        let display = format!("{addr:?}");
        let listener = TcpListener::bind(&addr).map_err(|e| TransportError::Bind {
            addr: display.clone(),
            source: e,
        })?;
        apply_backlog(&listener, backlog);
        let local_addr = listener.local_addr().map_err(|e| TransportError::Bind {
            addr: display,
            source: e,
        })?;

        info!(%local_addr, backlog, "listening on tcp socket");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<LinkStream> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "accepted connection");
        Ok(LinkStream::from_tcp(stream))
    }

    /// The address this server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Connect to a listening endpoint (blocking).
pub fn connect(addr: SocketAddr) -> Result<LinkStream> {
    let stream = TcpStream::connect(addr).map_err(|e| TransportError::Connect {
        addr,
        source: e,
    })?;
    debug!(%addr, "connected to tcp endpoint");
    Ok(LinkStream::from_tcp(stream))
}

/// Re-issue `listen(2)` on the bound descriptor to apply the configured
/// backlog. std hardcodes its own backlog at bind; on Unix a second listen
/// call updates it in place.
#[cfg(unix)]
fn apply_backlog(listener: &TcpListener, backlog: i32) {
    use std::os::fd::AsRawFd;

    // SAFETY: `fd` is an open, listening socket descriptor owned by this
    // process for the lifetime of the call.
    let rc = unsafe { libc::listen(listener.as_raw_fd(), backlog) };
    if rc != 0 {
        debug!(
            backlog,
            errno = std::io::Error::last_os_error().raw_os_error(),
            "could not apply accept backlog; keeping platform default"
        );
    }
}

#[cfg(not(unix))]
fn apply_backlog(_listener: &TcpListener, backlog: i32) {
    debug!(backlog, "accept backlog not adjustable on this platform");
}
