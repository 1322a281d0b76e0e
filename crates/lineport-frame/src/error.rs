/// Errors that can occur while writing framed lines.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An I/O error occurred while writing a line.
    #[error("line I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before the line was fully written.
    #[error("connection closed (incomplete line write)")]
    ConnectionClosed,

    /// The stream's write timeout elapsed before the line was fully written.
    #[error("line write timed out")]
    WriteTimeout,
}

pub type Result<T> = std::result::Result<T, FrameError>;
