//! `mailstash`: save email attachments from an IMAP mailbox and keep an
//! idempotent CSV log of what was saved.
//!
//! This crate provides the library behind the CLI: mailbox access, MIME
//! decoding, attachment extraction, the attachment directory and the log.

pub mod config;
pub mod error;
pub mod extract;
pub mod mailbox;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod store;
