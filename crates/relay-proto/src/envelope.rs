//! Tagged JSON envelopes exchanged between clients and the relay.
//!
//! Every structured message is a JSON object with a `type` tag. Payloads
//! that do not parse as JSON at all are *legacy* messages from older
//! clients and are relayed verbatim; payloads that parse but carry an
//! unknown or missing `type` are silently ignored by the relay.

use serde::{Deserialize, Serialize};
use serde_json::Number;

use crate::types::FILE_TOO_LARGE;

/// A structured envelope received from a client.
///
/// `timestamp` is an arbitrary JSON number chosen by the client and is
/// relayed unchanged; the relay never interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Inbound {
    /// Plain chat text.
    #[serde(rename_all = "camelCase")]
    Text {
        /// Message body.
        content: String,
        /// Client-chosen sender name.
        sender: String,
        /// Client-chosen timestamp, relayed unchanged.
        timestamp: Number,
    },
    /// A recorded audio clip, base64-encoded.
    #[serde(rename_all = "camelCase")]
    Audio {
        /// Base64-encoded audio bytes.
        audio_data: String,
        /// Client-chosen sender name.
        sender: String,
        /// Client-chosen timestamp, relayed unchanged.
        timestamp: Number,
    },
    /// A file upload, base64-encoded.
    ///
    /// Note there is no size field: the relay computes the decoded byte
    /// length itself and never trusts a client-declared value.
    #[serde(rename_all = "camelCase")]
    File {
        /// Base64-encoded file bytes.
        file_data: String,
        /// Original file name.
        file_name: String,
        /// Declared MIME type.
        file_type: String,
        /// Client-chosen sender name.
        sender: String,
        /// Client-chosen timestamp, relayed unchanged.
        timestamp: Number,
    },
}

/// A structured envelope sent from the relay to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Outbound {
    /// Broadcast chat text.
    #[serde(rename_all = "camelCase")]
    Text {
        /// Message body.
        content: String,
        /// Sender name as declared by the origin client.
        sender: String,
        /// Timestamp as declared by the origin client.
        timestamp: Number,
    },
    /// Broadcast audio clip.
    #[serde(rename_all = "camelCase")]
    Audio {
        /// Base64-encoded audio bytes.
        audio_data: String,
        /// Sender name as declared by the origin client.
        sender: String,
        /// Timestamp as declared by the origin client.
        timestamp: Number,
    },
    /// Broadcast file, with the relay-computed decoded size attached.
    #[serde(rename_all = "camelCase")]
    File {
        /// Base64-encoded file bytes.
        file_data: String,
        /// Original file name.
        file_name: String,
        /// Declared MIME type.
        file_type: String,
        /// Decoded byte length computed by the relay.
        file_size: u64,
        /// Sender name as declared by the origin client.
        sender: String,
        /// Timestamp as declared by the origin client.
        timestamp: Number,
    },
    /// Error report, sent only to the origin connection.
    Error {
        /// Human-readable error description.
        message: String,
    },
}

impl Outbound {
    /// The rejection sent to a client whose file exceeds the size limit.
    #[must_use]
    pub fn file_too_large() -> Self {
        Outbound::Error {
            message: FILE_TOO_LARGE.to_string(),
        }
    }

    /// Short tag for logging and metrics labels.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::Text { .. } => "text",
            Outbound::Audio { .. } => "audio",
            Outbound::File { .. } => "file",
            Outbound::Error { .. } => "error",
        }
    }
}

/// Result of classifying a raw WebSocket payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    /// A well-formed envelope with a recognized `type`.
    Envelope(Inbound),
    /// Valid JSON, but not a recognized envelope. Silently dropped.
    Unrecognized,
    /// Not JSON at all; relayed verbatim for older clients.
    Legacy,
}

/// Classify a raw payload into the three handling categories.
///
/// The two-step decode mirrors the dispatch contract exactly: only a
/// *syntactic* JSON failure selects the legacy path, while syntactically
/// valid JSON that is not a recognized envelope (missing `type`, unknown
/// `type`, or missing fields for a known `type`) is a no-op.
#[must_use]
pub fn classify(payload: &[u8]) -> Classified {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(payload) else {
        return Classified::Legacy;
    };
    match serde_json::from_value::<Inbound>(value) {
        Ok(envelope) => Classified::Envelope(envelope),
        Err(_) => Classified::Unrecognized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_inbound_parses_wire_fields() {
        let raw = r#"{"type":"text","content":"hi","sender":"A","timestamp":1000}"#;
        let parsed = classify(raw.as_bytes());
        assert_eq!(
            parsed,
            Classified::Envelope(Inbound::Text {
                content: "hi".into(),
                sender: "A".into(),
                timestamp: Number::from(1000),
            })
        );
    }

    #[test]
    fn audio_inbound_uses_camel_case_field() {
        let raw = r#"{"type":"audio","audioData":"AAAA","sender":"B","timestamp":1}"#;
        match classify(raw.as_bytes()) {
            Classified::Envelope(Inbound::Audio { audio_data, .. }) => {
                assert_eq!(audio_data, "AAAA");
            }
            other => panic!("expected audio envelope, got {other:?}"),
        }
    }

    #[test]
    fn inbound_file_ignores_client_declared_size() {
        // A lying client may attach its own fileSize; the relay must not
        // read it, so the parse succeeds and the field is discarded.
        let raw = json!({
            "type": "file",
            "fileData": "aGVsbG8=",
            "fileName": "a.txt",
            "fileType": "text/plain",
            "fileSize": 999_999,
            "sender": "A",
            "timestamp": 5,
        });
        let parsed = classify(raw.to_string().as_bytes());
        assert!(matches!(
            parsed,
            Classified::Envelope(Inbound::File { .. })
        ));
    }

    #[test]
    fn outbound_text_wire_shape() {
        let out = Outbound::Text {
            content: "hi".into(),
            sender: "A".into(),
            timestamp: Number::from(1000),
        };
        let value = serde_json::to_value(&out).unwrap();
        assert_eq!(
            value,
            json!({"type": "text", "content": "hi", "sender": "A", "timestamp": 1000})
        );
    }

    #[test]
    fn outbound_file_carries_computed_size() {
        let out = Outbound::File {
            file_data: "aGVsbG8=".into(),
            file_name: "a.txt".into(),
            file_type: "text/plain".into(),
            file_size: 5,
            sender: "A".into(),
            timestamp: Number::from(7),
        };
        let value = serde_json::to_value(&out).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "file",
                "fileData": "aGVsbG8=",
                "fileName": "a.txt",
                "fileType": "text/plain",
                "fileSize": 5,
                "sender": "A",
                "timestamp": 7,
            })
        );
    }

    #[test]
    fn error_envelope_has_exact_contract_message() {
        let value = serde_json::to_value(Outbound::file_too_large()).unwrap();
        assert_eq!(
            value,
            json!({"type": "error", "message": "File size exceeds maximum limit of 10MB"})
        );
    }

    #[test]
    fn unknown_type_is_unrecognized_not_legacy() {
        let raw = r#"{"type":"presence","sender":"A"}"#;
        assert_eq!(classify(raw.as_bytes()), Classified::Unrecognized);
    }

    #[test]
    fn missing_type_is_unrecognized() {
        let raw = r#"{"content":"hi","sender":"A","timestamp":1}"#;
        assert_eq!(classify(raw.as_bytes()), Classified::Unrecognized);
    }

    #[test]
    fn error_type_from_client_is_unrecognized() {
        // `error` is relay-to-client only; a client sending it gets the
        // same no-op treatment as any other unknown tag.
        let raw = r#"{"type":"error","message":"spoofed"}"#;
        assert_eq!(classify(raw.as_bytes()), Classified::Unrecognized);
    }

    #[test]
    fn valid_json_scalar_is_unrecognized() {
        // A bare JSON string parses, so it takes the no-op branch rather
        // than the legacy one.
        assert_eq!(classify(b"\"hello\""), Classified::Unrecognized);
    }

    #[test]
    fn known_type_with_missing_fields_is_unrecognized() {
        let raw = r#"{"type":"text","sender":"A"}"#;
        assert_eq!(classify(raw.as_bytes()), Classified::Unrecognized);
    }

    #[test]
    fn non_json_is_legacy() {
        assert_eq!(classify(b"hello old client"), Classified::Legacy);
        assert_eq!(classify(&[0xde, 0xad, 0xbe, 0xef]), Classified::Legacy);
    }

    #[test]
    fn fractional_timestamp_survives_roundtrip() {
        let raw = r#"{"type":"text","content":"x","sender":"A","timestamp":1699999999.25}"#;
        let Classified::Envelope(Inbound::Text { timestamp, .. }) = classify(raw.as_bytes())
        else {
            panic!("expected text envelope");
        };
        let out = Outbound::Text {
            content: "x".into(),
            sender: "A".into(),
            timestamp,
        };
        let value = serde_json::to_value(&out).unwrap();
        assert_eq!(value["timestamp"], json!(1699999999.25));
    }
}
