//! The attachment log: a deduplicated record set persisted as CSV.
//!
//! The whole log is held in memory. A run appends to it through
//! [`LogStore::try_append`] and writes it back once at the end with
//! [`LogStore::persist`], which replaces the file atomically.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::{Result, StashError};
use crate::model::record::{LogRecord, LOG_COLUMNS};
use crate::store::{csv, write_atomic};

/// In-memory attachment log keyed by `(message_id, attachment_filename)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogStore {
    records: Vec<LogRecord>,
    keys: HashSet<(String, String)>,
}

impl LogStore {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a log from records, keeping the first record of each key.
    pub fn from_records(records: impl IntoIterator<Item = LogRecord>) -> Self {
        let mut store = Self::new();
        for record in records {
            store.try_append(record);
        }
        store
    }

    /// Load a persisted log.
    ///
    /// A missing or empty file yields an empty log. A file whose header is
    /// not the attachment log header, or whose rows do not have exactly five
    /// columns, is rejected rather than silently rewritten.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No attachment log yet, starting empty");
                return Ok(Self::new());
            }
            Err(e) => return Err(StashError::io(path, e)),
        };

        let store = Self::from_csv(&text).map_err(|reason| StashError::InvalidLog {
            path: path.to_path_buf(),
            reason,
        })?;
        info!(path = %path.display(), records = store.len(), "Loaded attachment log");
        Ok(store)
    }

    /// Parse the CSV form of a log.
    pub fn from_csv(text: &str) -> std::result::Result<Self, String> {
        let rows = csv::parse(text).map_err(|e| e.to_string())?;
        let mut rows = rows.into_iter();

        let Some(header) = rows.next() else {
            return Ok(Self::new());
        };
        if header.iter().map(String::as_str).ne(LOG_COLUMNS) {
            return Err(format!(
                "unexpected header '{}', expected '{}'",
                header.join(","),
                LOG_COLUMNS.join(",")
            ));
        }

        let mut store = Self::new();
        for (i, row) in rows.enumerate() {
            let fields: [String; 5] = row.try_into().map_err(|row: Vec<String>| {
                format!("record {} has {} columns, expected 5", i + 1, row.len())
            })?;
            let record = LogRecord::from_fields(fields);
            if !store.try_append(record) {
                warn!(record = i + 1, "Dropping duplicate log record");
            }
        }
        Ok(store)
    }

    /// Insert `record` unless a record with the same key already exists.
    ///
    /// Returns whether the record was inserted.
    pub fn try_append(&mut self, record: LogRecord) -> bool {
        let key = (
            record.message_id.clone(),
            record.attachment_filename.clone(),
        );
        if !self.keys.insert(key) {
            return false;
        }
        self.records.push(record);
        true
    }

    /// Whether a record exists for this message and attachment.
    pub fn contains(&self, message_id: &str, attachment_filename: &str) -> bool {
        self.keys
            .contains(&(message_id.to_string(), attachment_filename.to_string()))
    }

    /// The CSV form of the log: header row, then records in insertion order.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        csv::write_row(&mut out, LOG_COLUMNS);
        for record in &self.records {
            csv::write_row(&mut out, record.fields());
        }
        out
    }

    /// Write the whole log to `path`, replacing any previous content.
    pub fn persist(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.to_csv().as_bytes())?;
        info!(path = %path.display(), records = self.len(), "Saved attachment log");
        Ok(())
    }

    /// Create a header-only log at `path` if no file exists there.
    ///
    /// Returns `true` if a new file was written.
    pub fn ensure_exists(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        Self::new().persist(path)?;
        Ok(true)
    }

    /// All records in insertion order.
    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    /// The last `n` records.
    pub fn tail(&self, n: usize) -> &[LogRecord] {
        &self.records[self.records.len().saturating_sub(n)..]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, name: &str) -> LogRecord {
        LogRecord {
            message_id: id.to_string(),
            from: "Alice <alice@example.com>".to_string(),
            subject: "Quarterly, \"final\"".to_string(),
            attachment_filename: name.to_string(),
            saved_path: format!("attachments/{name}"),
        }
    }

    #[test]
    fn test_try_append_rejects_duplicate_key() {
        let mut store = LogStore::new();
        assert!(store.try_append(record("1", "a.pdf")));
        assert!(!store.try_append(record("1", "a.pdf")));
        assert!(store.try_append(record("1", "b.pdf")));
        assert!(store.try_append(record("2", "a.pdf")));
        assert_eq!(store.len(), 3);
        assert!(store.contains("2", "a.pdf"));
    }

    #[test]
    fn test_duplicate_keeps_first_record() {
        let mut store = LogStore::new();
        store.try_append(record("1", "a.pdf"));
        let mut other = record("1", "a.pdf");
        other.saved_path = "elsewhere".into();
        store.try_append(other);
        assert_eq!(store.records()[0].saved_path, "attachments/a.pdf");
    }

    #[test]
    fn test_empty_log_csv_is_header_only() {
        assert_eq!(
            LogStore::new().to_csv(),
            "Email_ID,From,Subject,Attachment,Saved_Path\n"
        );
    }

    #[test]
    fn test_csv_round_trip() {
        let store = LogStore::from_records([record("1", "a.pdf"), record("7", "b, c.txt")]);
        let text = store.to_csv();
        let loaded = LogStore::from_csv(&text).unwrap();
        assert_eq!(loaded, store);
        assert_eq!(loaded.to_csv(), text);
    }

    #[test]
    fn test_from_csv_rejects_wrong_header() {
        let err = LogStore::from_csv("id,name\n1,a\n").unwrap_err();
        assert!(err.contains("unexpected header"));
    }

    #[test]
    fn test_from_csv_rejects_short_row() {
        let text = "Email_ID,From,Subject,Attachment,Saved_Path\n1,a,b\n";
        let err = LogStore::from_csv(text).unwrap_err();
        assert!(err.contains("3 columns"));
    }

    #[test]
    fn test_from_csv_collapses_duplicates() {
        let text = "Email_ID,From,Subject,Attachment,Saved_Path\n\
1,a,s,r.pdf,attachments/r.pdf\n\
1,a,s,r.pdf,attachments/r.pdf\n";
        let store = LogStore::from_csv(text).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_from_csv_empty_text() {
        assert!(LogStore::from_csv("").unwrap().is_empty());
    }

    #[test]
    fn test_tail() {
        let store = LogStore::from_records((0..5).map(|i| record(&i.to_string(), "x")));
        let tail = store.tail(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].message_id, "3");
        assert_eq!(store.tail(50).len(), 5);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LogStore::load(&dir.path().join("logs.csv")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.csv");
        let store = LogStore::from_records([record("3", "r.pdf")]);
        store.persist(&path).unwrap();
        assert_eq!(LogStore::load(&path).unwrap(), store);
    }

    #[test]
    fn test_ensure_exists_only_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs.csv");
        assert!(LogStore::ensure_exists(&path).unwrap());
        assert!(!LogStore::ensure_exists(&path).unwrap());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Email_ID,From,Subject,Attachment,Saved_Path\n"
        );
    }
}
