//! MIME message decoding: raw bytes to a [`ParsedMessage`] with parts in document order.

use mail_parser::{HeaderName, MessageParser, MessagePart, MimeHeaders, PartType};
use tracing::{debug, warn};

use crate::model::message::{MessageId, MimePart, ParsedMessage};
use crate::parser::header::{self, Headers};
use crate::parser::transfer;

/// Maximum nesting depth for multipart descent (adversarial input guard).
const MAX_DEPTH: usize = 32;

/// Decode a complete raw message (headers + body).
///
/// Never fails. Uses `mail-parser` for the MIME tree; a part whose
/// transfer encoding cannot be decoded keeps no payload, and a message
/// `mail-parser` rejects outright comes back with its headers and no parts.
pub fn decode(id: MessageId, raw_message: &[u8]) -> ParsedMessage {
    let headers = Headers::parse(raw_message);
    let from = headers.get_decoded("from").unwrap_or_default();
    let subject = headers.get_decoded("subject").unwrap_or_default();

    let parser = MessageParser::default();
    let Some(msg) = parser.parse(raw_message) else {
        warn!(id = %id, "Unparseable MIME structure, keeping headers only");
        return ParsedMessage {
            id,
            from,
            subject,
            is_multipart: false,
            parts: Vec::new(),
        };
    };

    let is_multipart = matches!(
        msg.parts.first().map(|p| &p.body),
        Some(PartType::Multipart(_))
    );

    let mut parts = Vec::with_capacity(msg.parts.len());
    if !msg.parts.is_empty() {
        walk(&msg.parts, 0, 0, msg.raw_message.as_ref(), &mut parts);
    }

    debug!(id = %id, parts = parts.len(), multipart = is_multipart, "Decoded message");

    ParsedMessage {
        id,
        from,
        subject,
        is_multipart,
        parts,
    }
}

/// Depth-first, pre-order walk of the part tree starting at `index`.
///
/// Descends into `multipart/*` children and into the parts of attached
/// `message/rfc822` messages. `raw` is the message the part offsets refer
/// to, which for a nested message is the nested message itself.
fn walk(
    all: &[MessagePart<'_>],
    index: usize,
    depth: usize,
    raw: &[u8],
    out: &mut Vec<MimePart>,
) {
    let Some(part) = all.get(index) else {
        return;
    };

    out.push(convert_part(part, raw));

    match &part.body {
        PartType::Multipart(children) => {
            if depth >= MAX_DEPTH {
                warn!(depth, "Multipart nesting too deep, ignoring children");
                return;
            }
            for &child in children {
                #[allow(clippy::unnecessary_cast)]
                walk(all, child as usize, depth + 1, raw, out);
            }
        }
        PartType::Message(inner) => {
            if depth >= MAX_DEPTH {
                warn!(depth, "Attached message nested too deep, ignoring it");
                return;
            }
            walk(&inner.parts, 0, depth + 1, inner.raw_message.as_ref(), out);
        }
        _ => {}
    }
}

/// Build a [`MimePart`] from one `mail-parser` part.
fn convert_part(part: &MessagePart<'_>, raw: &[u8]) -> MimePart {
    let is_leaf = !matches!(part.body, PartType::Multipart(_) | PartType::Message(_));

    let filename = part
        .attachment_name()
        .map(header::decode_encoded_words)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());

    let payload = if is_leaf {
        leaf_payload(part, raw)
    } else {
        None
    };
    if is_leaf && payload.is_none() {
        debug!(filename = ?filename, "Part content could not be decoded");
    }

    MimePart {
        content_disposition: raw_disposition(part, raw),
        filename,
        payload,
        is_leaf,
    }
}

/// The transfer-decoded bytes of a leaf part.
///
/// `mail-parser` hands text parts back already converted from their charset
/// to UTF-8, so those are decoded again from the raw body to keep the bytes
/// the sender attached.
fn leaf_payload(part: &MessagePart<'_>, raw: &[u8]) -> Option<Vec<u8>> {
    if part.is_encoding_problem {
        return None;
    }
    match &part.body {
        PartType::Text(_) | PartType::Html(_) => {
            #[allow(clippy::unnecessary_cast)]
            let range = part.raw_body_offset() as usize..part.raw_end_offset() as usize;
            let body = raw.get(range)?;
            transfer::decode(part.content_transfer_encoding(), body)
        }
        _ => Some(part.contents().to_vec()),
    }
}

/// The `Content-Disposition` value as transmitted, unfolded.
///
/// Falls back to a rendering of the parsed header if the raw offsets do not
/// point inside the message.
fn raw_disposition(part: &MessagePart<'_>, raw: &[u8]) -> Option<String> {
    let header = part
        .headers
        .iter()
        .find(|h| matches!(h.name, HeaderName::ContentDisposition))?;

    #[allow(clippy::unnecessary_cast)]
    let range = header.offset_start as usize..header.offset_end as usize;
    match raw.get(range) {
        Some(bytes) => Some(unfold_value(&header::decode_header_bytes(bytes))),
        None => part.content_disposition().map(|cd| {
            let mut text = cd.ctype().to_string();
            if let Some(name) = cd.attribute("filename") {
                text.push_str("; filename=\"");
                text.push_str(name);
                text.push('"');
            }
            text
        }),
    }
}

/// Join folded header lines with single spaces.
fn unfold_value(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
