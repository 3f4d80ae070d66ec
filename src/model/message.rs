//! Decoded message and MIME part types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Protocol-assigned message identifier.
///
/// Opaque to everything but the mailbox client that issued it. For IMAP
/// this is the message UID, which stays stable across sessions as long as
/// the mailbox's UIDVALIDITY does not change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u32> for MessageId {
    fn from(uid: u32) -> Self {
        Self(uid.to_string())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message decoded from raw bytes.
#[derive(Debug, Clone, Default)]
pub struct ParsedMessage {
    pub id: MessageId,

    /// Decoded `From:` header (encoded words resolved).
    pub from: String,

    /// Decoded `Subject:` header (encoded words resolved).
    pub subject: String,

    /// `true` if the top-level `Content-Type` is `multipart/*`.
    pub is_multipart: bool,

    /// Every MIME part in document order, root first.
    pub parts: Vec<MimePart>,
}

/// One node of a message's MIME tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MimePart {
    /// The `Content-Disposition` header value as transmitted (unfolded).
    pub content_disposition: Option<String>,

    /// Decoded filename from `Content-Disposition` or `Content-Type`.
    pub filename: Option<String>,

    /// Transfer-decoded content. `None` for containers and for parts whose
    /// content could not be decoded.
    pub payload: Option<Vec<u8>>,

    /// `false` for `multipart/*` containers and attached `message/rfc822`
    /// messages, whose own parts follow them in the list.
    pub is_leaf: bool,
}

impl MimePart {
    /// Whether the part qualifies as an attachment: the raw disposition
    /// contains `attachment` (case-sensitive) and the filename is non-empty.
    pub fn is_attachment_candidate(&self) -> bool {
        let disposition = self
            .content_disposition
            .as_deref()
            .is_some_and(|d| d.contains("attachment"));
        let named = self.filename.as_deref().is_some_and(|f| !f.is_empty());
        disposition && named
    }
}
