//! Feed ordering
//!
//! Records sort ascending by server timestamp. The sort is stable, so records
//! with equal timestamps keep the order the store delivered them in.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::record::{MessageRecord, ServerTimestamp};

/// Where pending records (no server timestamp yet) are placed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingOrder {
    /// After every timestamped record, so a just-sent message shows at the bottom
    #[default]
    Last,
    /// As if stamped at time zero, which puts it ahead of every positive timestamp
    First,
}

impl PendingOrder {
    /// Compare two records by timestamp under this policy
    pub fn compare(&self, a: &MessageRecord, b: &MessageRecord) -> Ordering {
        match self {
            PendingOrder::Last => match (a.timestamp, b.timestamp) {
                (Some(x), Some(y)) => x.cmp(&y),
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
            },
            PendingOrder::First => {
                let x = a.timestamp.unwrap_or(ServerTimestamp::ZERO);
                let y = b.timestamp.unwrap_or(ServerTimestamp::ZERO);
                x.cmp(&y)
            }
        }
    }
}

/// Sort records in place under `order`
pub fn sort_messages(messages: &mut [MessageRecord], order: PendingOrder) {
    messages.sort_by(|a, b| order.compare(a, b));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamped(id: &str, seconds: i64) -> MessageRecord {
        MessageRecord::new(id, "u1", id).at(ServerTimestamp::from_seconds(seconds))
    }

    fn pending(id: &str) -> MessageRecord {
        MessageRecord::new(id, "u1", id)
    }

    fn ids(messages: &[MessageRecord]) -> Vec<&str> {
        messages.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_sorts_ascending() {
        let mut messages = vec![stamped("a", 5), stamped("b", 2), stamped("c", 9)];
        sort_messages(&mut messages, PendingOrder::Last);
        assert_eq!(ids(&messages), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_equal_timestamps_keep_delivery_order() {
        let mut messages = vec![
            stamped("x", 3),
            stamped("b", 7),
            stamped("a", 3),
            stamped("c", 3),
        ];
        sort_messages(&mut messages, PendingOrder::Last);
        assert_eq!(ids(&messages), vec!["x", "a", "c", "b"]);
    }

    #[test]
    fn test_pending_sorts_last_by_default() {
        let mut messages = vec![pending("p"), stamped("big", 1_000_000), stamped("one", 1)];
        sort_messages(&mut messages, PendingOrder::default());
        assert_eq!(ids(&messages), vec!["one", "big", "p"]);
    }

    #[test]
    fn test_pending_first_policy() {
        let mut messages = vec![stamped("big", 1_000_000), pending("p"), stamped("one", 1)];
        sort_messages(&mut messages, PendingOrder::First);
        assert_eq!(ids(&messages), vec!["p", "one", "big"]);
    }

    #[test]
    fn test_multiple_pending_keep_delivery_order() {
        let mut messages = vec![pending("p2"), stamped("a", 1), pending("p1")];
        sort_messages(&mut messages, PendingOrder::Last);
        assert_eq!(ids(&messages), vec!["a", "p2", "p1"]);
    }

    #[test]
    fn test_pending_order_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            order: PendingOrder,
        }
        let w: Wrapper = toml::from_str(r#"order = "first""#).unwrap();
        assert_eq!(w.order, PendingOrder::First);
    }
}
