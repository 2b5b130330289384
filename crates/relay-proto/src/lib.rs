//! Wire protocol definitions shared by the chat relay and its clients.
//!
//! This crate provides:
//! - The tagged JSON envelope exchanged over WebSocket ([`envelope`])
//! - Payload limits and protocol constants ([`types`])
//!
//! It deliberately knows nothing about transports: the relay server and
//! any test client consume these types and do their own WebSocket I/O.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod envelope;
pub mod types;

pub use envelope::{classify, Classified, Inbound, Outbound};
pub use types::{decoded_file_len, DEFAULT_PORT, FILE_TOO_LARGE, MAX_FILE_SIZE};
