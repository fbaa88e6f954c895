//! Feed rendering
//!
//! Display-ready values for each message: who sent it, when, and whether it
//! belongs to the local user. Used by the terminal client.

use chrono::Local;

use crate::feed::{FeedView, MessageRecord, ServerTimestamp};

/// Shown in place of the feed when there are no messages
pub const EMPTY_FEED_NOTICE: &str = "No messages yet. Start chatting!";

/// Shown in place of the time for messages still waiting for a server timestamp
pub const PENDING_LABEL: &str = "Sending...";

/// Number of sender id characters shown for other users
const SENDER_PREFIX_LEN: usize = 8;

/// One message as displayed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageView {
    pub id: String,
    pub is_own: bool,
    pub sender_label: String,
    pub text: String,
    pub time_label: String,
}

impl MessageView {
    pub fn from_record(record: &MessageRecord, current_id: Option<&str>) -> Self {
        let is_own = current_id == Some(record.sender_id.as_str());

        Self {
            id: record.id.clone(),
            is_own,
            sender_label: sender_label(&record.sender_id, is_own),
            text: record.text.clone(),
            time_label: time_label(record.timestamp),
        }
    }

    /// Single-line form, own messages indented to the right
    pub fn to_line(&self) -> String {
        let line = format!("[{}] {}: {}", self.time_label, self.sender_label, self.text);
        if self.is_own {
            format!("{:>width$}", line, width = 60)
        } else {
            line
        }
    }
}

fn sender_label(sender_id: &str, is_own: bool) -> String {
    if is_own {
        "You".to_string()
    } else {
        let prefix: String = sender_id.chars().take(SENDER_PREFIX_LEN).collect();
        format!("User: {}...", prefix)
    }
}

fn time_label(timestamp: Option<ServerTimestamp>) -> String {
    match timestamp.and_then(|ts| ts.to_datetime()) {
        Some(time) => time.with_timezone(&Local).format("%H:%M:%S").to_string(),
        None => PENDING_LABEL.to_string(),
    }
}

/// Lines for a whole feed view
pub fn render_feed(view: &FeedView, current_id: Option<&str>) -> Vec<String> {
    if view.is_empty() {
        return vec![EMPTY_FEED_NOTICE.to_string()];
    }

    view.iter()
        .map(|record| MessageView::from_record(record, current_id).to_line())
        .collect()
}
