//! Rows of the attachment log.

use serde::{Deserialize, Serialize};

/// Column header of the attachment log, in field order.
pub const LOG_COLUMNS: [&str; 5] = ["Email_ID", "From", "Subject", "Attachment", "Saved_Path"];

/// One saved attachment.
///
/// Records are keyed by `(message_id, attachment_filename)`; the log never
/// holds two records with the same key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(rename = "Email_ID")]
    pub message_id: String,
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "Subject")]
    pub subject: String,
    #[serde(rename = "Attachment")]
    pub attachment_filename: String,
    #[serde(rename = "Saved_Path")]
    pub saved_path: String,
}

impl LogRecord {
    /// The uniqueness key of this record.
    pub fn key(&self) -> (&str, &str) {
        (&self.message_id, &self.attachment_filename)
    }

    /// Build a record from the five log columns, in [`LOG_COLUMNS`] order.
    pub fn from_fields(fields: [String; 5]) -> Self {
        let [message_id, from, subject, attachment_filename, saved_path] = fields;
        Self {
            message_id,
            from,
            subject,
            attachment_filename,
            saved_path,
        }
    }

    /// The five log columns, in [`LOG_COLUMNS`] order.
    pub fn fields(&self) -> [&str; 5] {
        [
            &self.message_id,
            &self.from,
            &self.subject,
            &self.attachment_filename,
            &self.saved_path,
        ]
    }
}
