//! ASCII text-line framing for lineport.
//!
//! The wire protocol is a plain textline protocol:
//! - Outbound messages are ASCII-encoded and terminated with CR LF
//! - Inbound buffers are ASCII-decoded and split on bare CR
//!
//! There is no length prefix and no cross-buffer reassembly — each received
//! buffer is split independently, so a line straddling two reads arrives as
//! two fragments. Fragment noise (`""` and a lone CR) is classified here and
//! discarded by the consumer, not by the framing layer.

pub mod codec;
pub mod error;
pub mod writer;

pub use codec::{encode_line, is_noise, split_fragments, DELIMITER, LINE_TERMINATOR};
pub use error::{FrameError, Result};
pub use writer::LineWriter;
