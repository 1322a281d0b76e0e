use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use lineport_transport::LinkStream;

use crate::codec::encode_line;
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Writes complete lines to any `Write` stream.
///
/// Each line is ASCII-encoded, CR LF terminated, fully written and flushed
/// before `send_line` returns.
pub struct LineWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> LineWriter<T> {
    /// Create a new line writer.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Encode and send one line (blocking).
    ///
    /// A write timeout set on the underlying stream surfaces as
    /// [`FrameError::WriteTimeout`]; the line is abandoned, not retried, so
    /// one stalled peer cannot pin the caller indefinitely.
    pub fn send_line(&mut self, msg: &str) -> Result<()> {
        self.buf.clear();
        encode_line(msg, &mut self.buf);

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    return Err(FrameError::WriteTimeout)
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    return Err(FrameError::WriteTimeout)
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl LineWriter<LinkStream> {
    /// Create a line writer for a connected stream with a write timeout.
    pub fn with_write_timeout(
        inner: LinkStream,
        timeout: Option<std::time::Duration>,
    ) -> Result<Self> {
        inner
            .set_write_timeout(timeout)
            .map_err(|err| FrameError::Io(std::io::Error::other(err.to_string())))?;
        Ok(Self::new(inner))
    }
}
