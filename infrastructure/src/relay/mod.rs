//! Framing relay
//!
//! A standalone process (`conduit relay`) that terminates a
//! length-prefixed byte pipe on stdio and an outbound socket on the other
//! side, forwarding payloads both ways without interpreting them. The
//! [`framing`] module owns the wire format; [`bridge`] owns the loop and
//! the socket reconnect policy.

pub mod bridge;
pub mod framing;

pub use bridge::{RelayConfig, RelayError, run, run_with_io};
pub use framing::{FramingError, encode_frame, extract_frames};
