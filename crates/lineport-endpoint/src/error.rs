/// Errors that can occur while constructing or running an endpoint.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] lineport_transport::TransportError),

    /// Framing-level error.
    #[error("frame error: {0}")]
    Frame(#[from] lineport_frame::FrameError),
}

pub type Result<T> = std::result::Result<T, EndpointError>;
