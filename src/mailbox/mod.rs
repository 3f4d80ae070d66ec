//! Mailbox access: the [`MailSource`] trait and its implementations.
//!
//! A source is one live session against one mailbox. It is selected once,
//! listed once, then asked for raw messages one identifier at a time.

use std::num::NonZeroUsize;

use crate::error::Result;
use crate::model::message::MessageId;

pub mod imap_client;
pub mod memory;

pub use imap_client::{ImapMailbox, ServerSettings};
pub use memory::MemoryMailbox;

/// Username and password for a mailbox login.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A session that can list and fetch messages from one mailbox.
pub trait MailSource {
    /// Select the mailbox. Must succeed before listing or fetching.
    fn select_inbox(&mut self) -> Result<()>;

    /// Every message identifier in ascending arrival order. May be empty.
    fn list_all_message_ids(&mut self) -> Result<Vec<MessageId>>;

    /// The complete raw message. A stale or removed identifier is a
    /// [`StashError::Fetch`](crate::error::StashError::Fetch).
    fn fetch_raw(&mut self, id: &MessageId) -> Result<Vec<u8>>;

    /// End the session. Calling it again is a no-op.
    fn logout(&mut self) -> Result<()>;
}

/// The last `min(n, ids.len())` identifiers, in their original order.
pub fn window_last_n(ids: &[MessageId], n: NonZeroUsize) -> Vec<MessageId> {
    let start = ids.len().saturating_sub(n.get());
    ids[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: u32) -> Vec<MessageId> {
        (1..=n).map(MessageId::from).collect()
    }

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_window_takes_most_recent() {
        let window = window_last_n(&ids(5), nz(2));
        assert_eq!(window, vec![MessageId::from(4u32), MessageId::from(5u32)]);
    }

    #[test]
    fn test_window_larger_than_mailbox() {
        assert_eq!(window_last_n(&ids(3), nz(20)), ids(3));
    }

    #[test]
    fn test_window_of_empty_mailbox() {
        assert!(window_last_n(&[], nz(5)).is_empty());
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials {
            username: "me".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
