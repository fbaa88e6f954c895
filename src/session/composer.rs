//! Message composer
//!
//! Holds the draft the user is typing. A draft is cleared only once the store
//! has accepted the write; a rejected or skipped send leaves it in place so the
//! user can retry.

use super::{ChatSession, SendOutcome};
use crate::error::ChatResult;

/// Draft input for one chat window
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Composer {
    draft: String,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, draft: impl Into<String>) {
        self.draft = draft.into();
    }

    pub fn clear(&mut self) {
        self.draft.clear();
    }

    /// Whether the send control should be enabled
    pub fn can_submit(&self, ready: bool) -> bool {
        ready && !self.draft.trim().is_empty()
    }

    /// Send the draft through `session`
    pub async fn submit(&mut self, session: &ChatSession) -> ChatResult<SendOutcome> {
        let outcome = session.send(&self.draft).await?;
        if let SendOutcome::Sent { .. } = outcome {
            self.draft.clear();
        }
        Ok(outcome)
    }
}
