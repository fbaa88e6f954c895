//! Message records
//!
//! - `ServerTimestamp`: logical time assigned by the store
//! - `MessageRecord`: one chat message as shown in the feed

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::store::{is_server_timestamp, RemoteDocument};

/// Store-assigned timestamp
///
/// Ordered by seconds, then nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerTimestamp {
    pub seconds: i64,
    #[serde(rename = "nanoseconds", default)]
    pub nanos: u32,
}

impl ServerTimestamp {
    pub const ZERO: ServerTimestamp = ServerTimestamp {
        seconds: 0,
        nanos: 0,
    };

    pub fn new(seconds: i64, nanos: u32) -> Self {
        Self { seconds, nanos }
    }

    pub fn from_seconds(seconds: i64) -> Self {
        Self::new(seconds, 0)
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        let now = Utc::now();
        Self::new(now.timestamp(), now.timestamp_subsec_nanos())
    }

    /// Convert to a UTC datetime; `None` if out of chrono's range
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.seconds, self.nanos).single()
    }

    /// Field value as stored in a document
    pub fn to_value(&self) -> Value {
        json!({
            "seconds": self.seconds,
            "nanoseconds": self.nanos,
        })
    }
}

/// A chat message in the feed
///
/// Records are never mutated after creation; a record with no timestamp is a
/// pending write the store has not stamped yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    /// Store-assigned document id, unique within the collection
    pub id: String,
    /// Session identity of the author
    pub sender_id: String,
    /// Message body
    pub text: String,
    /// Server timestamp, `None` while pending
    pub timestamp: Option<ServerTimestamp>,
}

/// Document fields of a message
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageFields {
    sender_id: String,
    #[serde(default)]
    text: String,
    /// `null`, absent or an unresolved server-timestamp request means pending
    #[serde(default)]
    timestamp: Option<Value>,
}

impl MessageRecord {
    /// Create a pending record
    pub fn new(
        id: impl Into<String>,
        sender_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            sender_id: sender_id.into(),
            text: text.into(),
            timestamp: None,
        }
    }

    /// Builder method: set the server timestamp
    pub fn at(mut self, timestamp: ServerTimestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn is_pending(&self) -> bool {
        self.timestamp.is_none()
    }

    /// Map a snapshot document to a record, keeping the store-assigned id
    pub fn from_document(document: &RemoteDocument) -> Result<Self, RecordError> {
        let malformed = |e: serde_json::Error| RecordError::Malformed {
            id: document.id.clone(),
            reason: e.to_string(),
        };

        let fields: MessageFields =
            serde_json::from_value(document.data.clone()).map_err(malformed)?;

        let timestamp = match fields.timestamp {
            Some(value) if !value.is_null() && !is_server_timestamp(&value) => {
                Some(serde_json::from_value(value).map_err(malformed)?)
            }
            _ => None,
        };

        Ok(Self {
            id: document.id.clone(),
            sender_id: fields.sender_id,
            text: fields.text,
            timestamp,
        })
    }
}

/// Errors mapping a document to a record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Malformed message {id}: {reason}")]
    Malformed { id: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_document() {
        let doc = RemoteDocument::new(
            "a",
            json!({"senderId": "u1", "text": "hi", "timestamp": {"seconds": 5, "nanoseconds": 10}}),
        );
        let record = MessageRecord::from_document(&doc).unwrap();
        assert_eq!(record.id, "a");
        assert_eq!(record.sender_id, "u1");
        assert_eq!(record.text, "hi");
        assert_eq!(record.timestamp, Some(ServerTimestamp::new(5, 10)));
    }

    #[test]
    fn test_null_or_missing_timestamp_is_pending() {
        let null_ts = RemoteDocument::new("a", json!({"senderId": "u1", "text": "hi", "timestamp": null}));
        let no_ts = RemoteDocument::new("b", json!({"senderId": "u1", "text": "hi"}));

        assert!(MessageRecord::from_document(&null_ts).unwrap().is_pending());
        assert!(MessageRecord::from_document(&no_ts).unwrap().is_pending());
    }

    #[test]
    fn test_unresolved_server_timestamp_is_pending() {
        let doc = RemoteDocument::new(
            "a",
            json!({"senderId": "u1", "text": "hi", "timestamp": crate::store::server_timestamp()}),
        );
        assert!(MessageRecord::from_document(&doc).unwrap().is_pending());
    }

    #[test]
    fn test_bad_timestamp_is_malformed() {
        let doc = RemoteDocument::new("a", json!({"senderId": "u1", "timestamp": "yesterday"}));
        assert!(MessageRecord::from_document(&doc).is_err());
    }

    #[test]
    fn test_missing_text_maps_to_empty() {
        let doc = RemoteDocument::new("a", json!({"senderId": "u1"}));
        assert_eq!(MessageRecord::from_document(&doc).unwrap().text, "");
    }

    #[test]
    fn test_missing_sender_is_malformed() {
        let doc = RemoteDocument::new("a", json!({"text": "hi"}));
        let err = MessageRecord::from_document(&doc).unwrap_err();
        assert!(matches!(err, RecordError::Malformed { ref id, .. } if id == "a"));
    }

    #[test]
    fn test_timestamp_ordering() {
        assert!(ServerTimestamp::new(1, 999) < ServerTimestamp::new(2, 0));
        assert!(ServerTimestamp::new(2, 1) > ServerTimestamp::new(2, 0));
        assert!(ServerTimestamp::ZERO < ServerTimestamp::from_seconds(1));
    }

    #[test]
    fn test_timestamp_value_parses_back() {
        let ts = ServerTimestamp::new(1_700_000_000, 42);
        let parsed: ServerTimestamp = serde_json::from_value(ts.to_value()).unwrap();
        assert_eq!(parsed, ts);
        assert_eq!(ts.to_datetime().unwrap().timestamp(), 1_700_000_000);
    }
}
