//! Tool server descriptors
//!
//! A [`ServerDescriptor`] is the static definition of a tool-providing
//! server: which transport reaches it and what is needed to establish that
//! transport. Descriptors are created at startup (built-in defaults plus a
//! loaded configuration document) and are immutable after load — live
//! connection state lives elsewhere, keyed by the same name.

pub mod descriptor;

pub use descriptor::{ServerDescriptor, TransportKind};
