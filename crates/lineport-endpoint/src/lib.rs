//! Single-client TCP line endpoint with queue-driven lazy workers.
//!
//! This is the "just works" layer. A [`LineEndpoint`] accepts one inbound
//! control-processor client at a time, frames received bytes into CR-delimited
//! messages and hands each one to a caller-supplied hook, while outbound lines
//! flow through a bounded queue to the connected client. Disconnects are
//! recovered transparently: the endpoint waits out a reconnect delay and
//! listens again, for the lifetime of the endpoint.
//!
//! Delivery is best-effort. A full queue drops the message with a
//! log entry, and a failed socket write abandons that line — nothing surfaces
//! through [`LineEndpoint::send`]. Callers that need delivery guarantees must
//! layer their own acknowledgement protocol on top.

pub mod conn;
pub mod endpoint;
pub mod error;
pub mod queue;
pub mod shutdown;
pub mod worker;

pub use conn::ConnState;
pub use endpoint::{EndpointConfig, LifecycleEvent, LineEndpoint};
pub use error::{EndpointError, Result};
pub use queue::BoundedQueue;
pub use shutdown::ShutdownToken;
pub use worker::{DispatchMode, LazyWorker, WorkerState};
