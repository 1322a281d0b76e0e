//! Single-client TCP line endpoint with queue-driven lazy workers.
//!
//! lineport keeps a persistent TCP listening endpoint for one
//! control-processor client, exchanges newline-delimited ASCII messages over
//! bounded queues, and transparently recovers from disconnects.
//!
//! # Crate Structure
//!
//! - [`transport`] — TCP listening socket and connected stream
//! - [`frame`] — ASCII text-line framing (CR-delimited)
//! - [`endpoint`] — bounded queues, lazy workers, connection lifecycle and
//!   the [`endpoint::LineEndpoint`] facade

/// Re-export transport types.
pub mod transport {
    pub use lineport_transport::*;
}

/// Re-export framing types.
pub mod frame {
    pub use lineport_frame::*;
}

/// Re-export endpoint types.
pub mod endpoint {
    pub use lineport_endpoint::*;
}
