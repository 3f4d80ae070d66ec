//! Attachment extraction: pick the attachment parts out of a decoded message.

use tracing::debug;

use crate::model::attachment::Attachment;
use crate::model::message::{MimePart, ParsedMessage};

/// Lazily yield the attachments of `msg` in document order.
///
/// A part is yielded when its raw `Content-Disposition` contains
/// `attachment`, its decoded filename is non-empty, and its content decoded
/// cleanly. Zero-byte payloads are yielded; undecodable ones are not.
/// Single-part messages never yield anything: their one part is the body.
pub fn extract(msg: &ParsedMessage) -> impl Iterator<Item = Attachment<'_>> + '_ {
    let parts: &[MimePart] = if msg.is_multipart { &msg.parts } else { &[] };

    parts
        .iter()
        .filter(|part| part.is_leaf && part.is_attachment_candidate())
        .filter_map(move |part| {
            let filename = part.filename.as_deref()?;
            match part.payload.as_deref() {
                Some(payload) => Some(Attachment { filename, payload }),
                None => {
                    debug!(id = %msg.id, filename, "Skipping attachment without decodable content");
                    None
                }
            }
        })
}
