//! One processing run: select, list, then fetch, extract, save and log each
//! message of the window.
//!
//! Selecting and listing failures end the run. Anything that goes wrong with
//! a single message (fetch) or a single attachment (write) is logged and
//! skipped, and the log is still written at the end. The session is logged
//! out on every path.

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, info_span, warn};

use crate::error::Result;
use crate::extract::extract;
use crate::mailbox::{window_last_n, MailSource};
use crate::model::message::ParsedMessage;
use crate::model::record::LogRecord;
use crate::parser::mime;
use crate::store::attachments::AttachmentStore;
use crate::store::log::LogStore;

/// What goes into the `Email_ID` column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyStrategy {
    /// The mailbox identifier (IMAP UID).
    #[default]
    Uid,
    /// A digest of From, Subject and raw size, for servers whose
    /// identifiers do not survive between sessions.
    ContentHash,
}

/// Per-run settings.
pub struct RunOptions<'a> {
    /// How many of the most recent messages to examine.
    pub window: NonZeroUsize,
    pub key_strategy: KeyStrategy,
    /// Checked before each message; when set the run stops early (and
    /// still writes the log).
    pub cancel: Option<&'a AtomicBool>,
    /// Receives `(current, total)` as messages are processed.
    pub progress: Option<&'a dyn Fn(usize, usize)>,
}

impl RunOptions<'_> {
    pub fn new(window: NonZeroUsize) -> Self {
        Self {
            window,
            key_strategy: KeyStrategy::Uid,
            cancel: None,
            progress: None,
        }
    }
}

/// Outcome of a run, including the updated log.
#[derive(Debug, Default)]
pub struct RunReport {
    pub log: LogStore,
    /// Messages in the mailbox when it was listed.
    pub mailbox_size: usize,
    pub messages_examined: usize,
    pub messages_failed: usize,
    pub attachments_saved: usize,
    pub bytes_written: u64,
    pub records_added: usize,
    /// Saved attachments whose record was already in the log.
    pub records_existing: usize,
    pub write_failures: usize,
    pub cancelled: bool,
}

/// Run the pipeline over the most recent `options.window` messages.
///
/// The log is taken by value, updated, written to `log_path` in one piece,
/// and handed back in the report.
pub fn run<S: MailSource + ?Sized>(
    source: &mut S,
    log: LogStore,
    attachments: &AttachmentStore,
    log_path: &Path,
    options: &RunOptions<'_>,
) -> Result<RunReport> {
    let result = process_window(source, log, attachments, log_path, options);
    if let Err(e) = source.logout() {
        warn!(error = %e, "Logout failed");
    }
    result
}

fn process_window<S: MailSource + ?Sized>(
    source: &mut S,
    log: LogStore,
    attachments: &AttachmentStore,
    log_path: &Path,
    options: &RunOptions<'_>,
) -> Result<RunReport> {
    source.select_inbox()?;
    let ids = source.list_all_message_ids()?;
    let window = window_last_n(&ids, options.window);
    info!(
        mailbox_size = ids.len(),
        window = window.len(),
        "Processing most recent messages"
    );

    let mut report = RunReport {
        log,
        mailbox_size: ids.len(),
        ..RunReport::default()
    };
    let total = window.len();

    for (i, id) in window.iter().enumerate() {
        if options.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            info!(processed = i, "Run cancelled");
            report.cancelled = true;
            break;
        }
        if let Some(progress) = options.progress {
            progress(i, total);
        }

        let span = info_span!("message", id = %id);
        let _enter = span.enter();

        report.messages_examined += 1;
        let raw = match source.fetch_raw(id) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Skipping message");
                report.messages_failed += 1;
                continue;
            }
        };

        let msg = mime::decode(id.clone(), &raw);
        let key = match options.key_strategy {
            KeyStrategy::Uid => id.to_string(),
            KeyStrategy::ContentHash => content_key(&msg, raw.len()),
        };
        save_attachments(&msg, &key, attachments, &mut report);
    }
    if let Some(progress) = options.progress {
        progress(report.messages_examined, total);
    }

    report.log.persist(log_path)?;
    info!(
        saved = report.attachments_saved,
        new_records = report.records_added,
        failed_messages = report.messages_failed,
        "Run finished"
    );
    Ok(report)
}

/// Save every attachment of `msg` and log the ones written successfully.
fn save_attachments(
    msg: &ParsedMessage,
    key: &str,
    attachments: &AttachmentStore,
    report: &mut RunReport,
) {
    for attachment in extract(msg) {
        let path = match attachments.save(attachment.filename, attachment.payload) {
            Ok(path) => path,
            Err(e) => {
                warn!(filename = attachment.filename, error = %e, "Skipping attachment");
                report.write_failures += 1;
                continue;
            }
        };
        report.attachments_saved += 1;
        report.bytes_written += attachment.size();

        let record = LogRecord {
            message_id: key.to_string(),
            from: msg.from.clone(),
            subject: msg.subject.clone(),
            attachment_filename: attachment.filename.to_string(),
            saved_path: path.display().to_string(),
        };
        if report.log.try_append(record) {
            report.records_added += 1;
        } else {
            debug!(filename = attachment.filename, "Already logged");
            report.records_existing += 1;
        }
    }
}

/// Content-derived message key: 16 hex digits of SHA-256 over From,
/// Subject and the raw message size.
pub fn content_key(msg: &ParsedMessage, raw_size: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(msg.from.as_bytes());
    hasher.update(b"\n");
    hasher.update(msg.subject.as_bytes());
    hasher.update(b"\n");
    hasher.update(raw_size.to_string().as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    hash[..16].to_string()
}
