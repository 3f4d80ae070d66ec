//! Attachment candidates produced by the extractor.

/// One attachment found in a message, borrowed from its [`ParsedMessage`].
///
/// [`ParsedMessage`]: super::message::ParsedMessage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment<'a> {
    /// Filename as decoded from the part headers. Never empty.
    pub filename: &'a str,

    /// Transfer-decoded content. May be zero bytes long.
    pub payload: &'a [u8],
}

impl Attachment<'_> {
    /// Size of the decoded payload in bytes.
    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }
}
