//! Core data model types: messages, MIME parts, attachments, and log records.

pub mod attachment;
pub mod message;
pub mod record;
