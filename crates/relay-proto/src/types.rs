//! Protocol constants and limits for the chat relay.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Default listen port when the `PORT` environment variable is unset.
pub const DEFAULT_PORT: u16 = 8080;

/// Maximum decoded file payload size in bytes (10 MiB).
///
/// Enforced only for `file` envelopes; audio payloads are deliberately
/// unvalidated to match the observed contract of the original service.
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// Error message sent back to the origin of an oversized file upload.
/// The text is part of the wire contract; clients match on it.
pub const FILE_TOO_LARGE: &str = "File size exceeds maximum limit of 10MB";

/// Decoded byte length of a base64 `fileData` payload.
///
/// This is the number the relay compares against [`MAX_FILE_SIZE`] and
/// reports as `fileSize`; client-declared sizes are never trusted.
///
/// # Errors
///
/// Returns an error if the payload is not valid standard-alphabet base64.
pub fn decoded_file_len(file_data: &str) -> Result<usize, base64::DecodeError> {
    BASE64.decode(file_data).map(|bytes| bytes.len())
}
