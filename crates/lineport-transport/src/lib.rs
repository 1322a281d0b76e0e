//! TCP transport layer for lineport.
//!
//! Provides the listening socket and connected stream types everything else
//! builds on:
//! - [`TcpServer`] — bind/accept with a configurable accept backlog
//! - [`LinkStream`] — a connected stream with timeout, clone and shutdown
//!   helpers
//! - [`connect`] — client-side connect, used by tooling and tests
//!
//! This is the lowest layer of lineport.

pub mod error;
pub mod tcp;

pub use error::{Result, TransportError};
pub use tcp::{connect, LinkStream, TcpServer, DEFAULT_BACKLOG};
