//! Ordered feed view
//!
//! A view is rebuilt from scratch out of each full snapshot; nothing carries
//! over from the previous one, so documents missing from the snapshot simply
//! disappear.

use std::collections::HashMap;

use super::order::{sort_messages, PendingOrder};
use super::record::MessageRecord;
use crate::store::RemoteDocument;

/// Sorted, de-duplicated messages ready for display
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedView {
    /// Bumped every time a new view is published
    pub revision: u64,
    pub messages: Vec<MessageRecord>,
}

impl FeedView {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a view from one snapshot
    ///
    /// Documents that fail to map are skipped. A repeated id replaces the
    /// earlier record in place rather than adding a second entry.
    pub fn from_snapshot(revision: u64, documents: &[RemoteDocument], order: PendingOrder) -> Self {
        let mut messages: Vec<MessageRecord> = Vec::with_capacity(documents.len());
        let mut positions: HashMap<String, usize> = HashMap::with_capacity(documents.len());

        for document in documents {
            match MessageRecord::from_document(document) {
                Ok(record) => match positions.get(&record.id) {
                    Some(&index) => messages[index] = record,
                    None => {
                        positions.insert(record.id.clone(), messages.len());
                        messages.push(record);
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping malformed message document");
                }
            }
        }

        sort_messages(&mut messages, order);

        Self { revision, messages }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessageRecord> {
        self.messages.iter()
    }

    /// Message ids in display order
    pub fn ids(&self) -> Vec<&str> {
        self.messages.iter().map(|m| m.id.as_str()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&MessageRecord> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn pending_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_pending()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, sender: &str, text: &str, seconds: Option<i64>) -> RemoteDocument {
        let timestamp = match seconds {
            Some(s) => json!({"seconds": s, "nanoseconds": 0}),
            None => serde_json::Value::Null,
        };
        RemoteDocument::new(id, json!({"senderId": sender, "text": text, "timestamp": timestamp}))
    }

    #[test]
    fn test_snapshot_sorted_by_timestamp() {
        let documents = vec![doc("a", "u1", "hi", Some(5)), doc("b", "u2", "yo", Some(2))];
        let view = FeedView::from_snapshot(1, &documents, PendingOrder::Last);
        assert_eq!(view.ids(), vec!["b", "a"]);
        assert_eq!(view.revision, 1);
    }

    #[test]
    fn test_duplicate_id_replaces() {
        let documents = vec![
            doc("a", "u1", "first", Some(1)),
            doc("b", "u2", "other", Some(2)),
            doc("a", "u1", "second", Some(3)),
        ];
        let view = FeedView::from_snapshot(1, &documents, PendingOrder::Last);
        assert_eq!(view.len(), 2);
        assert_eq!(view.get("a").unwrap().text, "second");
        assert_eq!(view.ids(), vec!["b", "a"]);
    }

    #[test]
    fn test_malformed_documents_skipped() {
        let documents = vec![
            doc("a", "u1", "hi", Some(1)),
            RemoteDocument::new("bad", json!("not an object")),
            RemoteDocument::new("anon", json!({"text": "no sender"})),
        ];
        let view = FeedView::from_snapshot(1, &documents, PendingOrder::Last);
        assert_eq!(view.ids(), vec!["a"]);
    }

    #[test]
    fn test_pending_count() {
        let documents = vec![doc("a", "u1", "hi", Some(1)), doc("p", "u1", "wait", None)];
        let view = FeedView::from_snapshot(1, &documents, PendingOrder::Last);
        assert_eq!(view.pending_count(), 1);
        assert_eq!(view.ids(), vec!["a", "p"]);
    }

    #[test]
    fn test_empty_snapshot() {
        let view = FeedView::from_snapshot(3, &[], PendingOrder::Last);
        assert!(view.is_empty());
        assert_eq!(view.revision, 3);
    }
}
