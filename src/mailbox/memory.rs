//! In-memory mail source, for tests and offline runs over saved messages.

use std::collections::BTreeMap;

use crate::error::{Result, StashError};
use crate::mailbox::MailSource;
use crate::model::message::MessageId;

/// A mailbox held in memory.
///
/// Identifiers are listed in insertion order. Messages registered with
/// [`MemoryMailbox::push_unfetchable`] are listed but fail to fetch, like a
/// message expunged between SEARCH and FETCH.
#[derive(Debug, Default)]
pub struct MemoryMailbox {
    order: Vec<MessageId>,
    messages: BTreeMap<MessageId, Vec<u8>>,
    missing_mailbox: bool,
    selected: bool,
    logged_out: bool,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// A source whose mailbox cannot be selected.
    pub fn without_inbox() -> Self {
        Self {
            missing_mailbox: true,
            ..Self::default()
        }
    }

    /// Add a message at the end of the mailbox.
    pub fn push(&mut self, id: impl Into<MessageId>, raw: impl Into<Vec<u8>>) -> &mut Self {
        let id = id.into();
        self.order.push(id.clone());
        self.messages.insert(id, raw.into());
        self
    }

    /// List an identifier whose content cannot be fetched.
    pub fn push_unfetchable(&mut self, id: impl Into<MessageId>) -> &mut Self {
        self.order.push(id.into());
        self
    }

    pub fn is_logged_out(&self) -> bool {
        self.logged_out
    }

    fn require_selected(&self) -> Result<()> {
        if self.selected {
            Ok(())
        } else {
            Err(StashError::Mailbox {
                name: "INBOX".to_string(),
                reason: "no mailbox selected".to_string(),
            })
        }
    }
}

impl MailSource for MemoryMailbox {
    fn select_inbox(&mut self) -> Result<()> {
        if self.missing_mailbox {
            return Err(StashError::Mailbox {
                name: "INBOX".to_string(),
                reason: "mailbox does not exist".to_string(),
            });
        }
        self.selected = true;
        Ok(())
    }

    fn list_all_message_ids(&mut self) -> Result<Vec<MessageId>> {
        self.require_selected()?;
        Ok(self.order.clone())
    }

    fn fetch_raw(&mut self, id: &MessageId) -> Result<Vec<u8>> {
        self.require_selected()?;
        self.messages
            .get(id)
            .cloned()
            .ok_or_else(|| StashError::Fetch {
                id: id.to_string(),
                reason: "no such message".to_string(),
            })
    }

    fn logout(&mut self) -> Result<()> {
        self.logged_out = true;
        Ok(())
    }
}
