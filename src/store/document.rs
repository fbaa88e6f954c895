//! Store document shapes
//!
//! What travels between the session and the store: raw documents coming in on
//! a snapshot, new messages going out on append.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Key marking a field value the store computes on write
const SERVER_VALUE_KEY: &str = ".sv";

/// Server value kind for the store's own clock
const SERVER_TIMESTAMP: &str = "timestamp";

/// Placeholder asking the store to stamp a field with its own clock
///
/// Stores replace it before the document is delivered in a snapshot; a
/// latency-compensated local copy shows it as `null`.
pub fn server_timestamp() -> Value {
    let mut fields = Map::new();
    fields.insert(SERVER_VALUE_KEY.to_string(), Value::from(SERVER_TIMESTAMP));
    Value::Object(fields)
}

/// Whether `value` is a [`server_timestamp`] placeholder
pub fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .filter(|fields| fields.len() == 1)
        .and_then(|fields| fields.get(SERVER_VALUE_KEY))
        .and_then(Value::as_str)
        == Some(SERVER_TIMESTAMP)
}

/// A document as delivered in a snapshot
///
/// `data` is the untyped field map; mapping it to a
/// [`MessageRecord`](crate::feed::MessageRecord) happens in the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    /// Store-assigned document id
    pub id: String,
    /// Document fields
    pub data: Value,
}

impl RemoteDocument {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

/// A message about to be appended
///
/// The timestamp is never supplied by the client; the store fills it in with
/// its own clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: String,
    pub text: String,
}

impl NewMessage {
    pub fn new(sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            text: text.into(),
        }
    }

    /// Document fields for this message, requesting a server timestamp
    pub fn to_fields(&self) -> Value {
        json!({
            "text": self.text,
            "senderId": self.sender_id,
            "timestamp": server_timestamp(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_fields() {
        let fields = NewMessage::new("u1", "hello").to_fields();
        assert_eq!(fields["senderId"], "u1");
        assert_eq!(fields["text"], "hello");
        assert!(!fields["timestamp"].is_null());
        assert!(is_server_timestamp(&fields["timestamp"]));
    }

    #[test]
    fn test_server_timestamp_is_distinct_from_absent() {
        assert!(!is_server_timestamp(&Value::Null));
        assert!(!is_server_timestamp(&json!({"seconds": 5, "nanoseconds": 0})));
        assert!(!is_server_timestamp(&json!({".sv": "increment"})));
        assert!(!is_server_timestamp(&json!({".sv": "timestamp", "seconds": 5})));
    }
}
