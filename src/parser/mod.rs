//! Message decoding: header decoding, MIME structure and transfer encodings.

pub mod header;
pub mod mime;
pub mod transfer;
