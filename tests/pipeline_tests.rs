//! End-to-end runs against an in-memory mailbox.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::Path;

use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

use mailstash::error::StashError;
use mailstash::mailbox::MemoryMailbox;
use mailstash::model::record::LogRecord;
use mailstash::pipeline::{self, RunOptions, RunReport};
use mailstash::store::attachments::AttachmentStore;
use mailstash::store::log::LogStore;

const HEADER: &str = "Email_ID,From,Subject,Attachment,Saved_Path\n";

fn fixture(name: &str) -> Vec<u8> {
    std::fs::read(
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join(name),
    )
    .unwrap()
}

/// Message 1 has no attachment, 2 carries report.pdf, 3 cannot be fetched.
fn three_messages() -> MemoryMailbox {
    let mut mailbox = MemoryMailbox::new();
    mailbox
        .push(1u32, fixture("plain.eml"))
        .push(2u32, fixture("report.eml"))
        .push_unfetchable(3u32);
    mailbox
}

fn run_once(mailbox: &mut MemoryMailbox, tmp: &TempDir, window: usize) -> RunReport {
    let log_path = tmp.child("logs.csv");
    let log = LogStore::load(log_path.path()).unwrap();
    let store = AttachmentStore::new(tmp.child("attachments").path());
    let options = RunOptions::new(NonZeroUsize::new(window).unwrap());
    pipeline::run(mailbox, log, &store, log_path.path(), &options).unwrap()
}

#[test]
fn test_three_message_scenario() {
    let tmp = TempDir::new().unwrap();
    let mut mailbox = three_messages();

    let report = run_once(&mut mailbox, &tmp, 3);
    assert_eq!(report.messages_examined, 3);
    assert_eq!(report.messages_failed, 1);
    assert_eq!(report.attachments_saved, 1);
    assert_eq!(report.records_added, 1);
    assert!(mailbox.is_logged_out());

    tmp.child("attachments/report.pdf")
        .assert(predicate::path::is_file());
    tmp.child("attachments/report.pdf")
        .assert(predicate::str::starts_with("%PDF-1.4"));

    let expected_path = tmp.child("attachments").path().join("report.pdf");
    let record = &report.log.records()[0];
    assert_eq!(
        *record,
        LogRecord {
            message_id: "2".into(),
            from: "Bob <bob@example.com>".into(),
            subject: "Hello World".into(),
            attachment_filename: "report.pdf".into(),
            saved_path: expected_path.display().to_string(),
        }
    );

    tmp.child("logs.csv").assert(predicate::str::starts_with(HEADER));
    tmp.child("logs.csv")
        .assert(predicate::str::contains("2,Bob <bob@example.com>,Hello World,report.pdf,"));
}

#[test]
fn test_rerun_adds_nothing() {
    let tmp = TempDir::new().unwrap();

    run_once(&mut three_messages(), &tmp, 3);
    let first = std::fs::read(tmp.child("logs.csv").path()).unwrap();

    let report = run_once(&mut three_messages(), &tmp, 3);
    assert_eq!(report.records_added, 0);
    assert_eq!(report.records_existing, 1);
    assert_eq!(report.attachments_saved, 1);
    assert_eq!(report.log.len(), 1);

    let second = std::fs::read(tmp.child("logs.csv").path()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_rerun_rewrites_attachment_last_write_wins() {
    let tmp = TempDir::new().unwrap();
    run_once(&mut three_messages(), &tmp, 3);

    // Same UID and filename, different content
    let revised = String::from_utf8(fixture("report.eml"))
        .unwrap()
        .replace(
            "JVBERi0xLjQKJcOkw7zDtsOfCjIgMCBvYmoKPDwvTGVuZ3RoIDMgMCBSPj4Kc3RyZWFtCg==",
            "JVBERi0xLjcK",
        );
    let mut mailbox = MemoryMailbox::new();
    mailbox
        .push(1u32, fixture("plain.eml"))
        .push(2u32, revised)
        .push_unfetchable(3u32);

    let report = run_once(&mut mailbox, &tmp, 3);
    assert_eq!(report.records_added, 0);
    assert_eq!(report.log.len(), 1);
    tmp.child("attachments/report.pdf").assert("%PDF-1.7\n");
}

#[test]
fn test_overlapping_windows_keep_keys_unique() {
    let tmp = TempDir::new().unwrap();
    let build = || {
        let mut mailbox = MemoryMailbox::new();
        mailbox
            .push(10u32, fixture("report.eml"))
            .push(11u32, fixture("nested.eml"))
            .push(12u32, fixture("plain.eml"))
            .push(13u32, fixture("report.eml"));
        mailbox
    };

    let narrow = run_once(&mut build(), &tmp, 2);
    assert_eq!(narrow.records_added, 1);

    let wide = run_once(&mut build(), &tmp, 4);
    assert_eq!(wide.records_added, 3);
    assert_eq!(wide.records_existing, 1);

    let log = LogStore::load(tmp.child("logs.csv").path()).unwrap();
    assert_eq!(log.len(), 4);
    let keys: HashSet<(&str, &str)> = log
        .records()
        .iter()
        .map(|r| (r.message_id.as_str(), r.attachment_filename.as_str()))
        .collect();
    assert_eq!(keys.len(), log.len());
    assert!(log.contains("11", "data.csv"));
    assert!(log.contains("11", "résumé notes.txt"));
    assert!(!log.contains("11", "logo.png"));

    // Both report.pdf messages share one file on disk
    tmp.child("attachments/report.pdf")
        .assert(predicate::path::is_file());
}

#[test]
fn test_log_round_trip_is_byte_stable() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.child("logs.csv");
    let log = LogStore::from_records([
        LogRecord {
            message_id: "7".into(),
            from: "\"Doe, Jane\" <jane@example.com>".into(),
            subject: "Line one\nline two".into(),
            attachment_filename: "a,b.txt".into(),
            saved_path: "attachments/a,b.txt".into(),
        },
        LogRecord {
            message_id: "8".into(),
            from: String::new(),
            subject: "plain".into(),
            attachment_filename: "x.bin".into(),
            saved_path: "attachments/x.bin".into(),
        },
    ]);
    log.persist(path.path()).unwrap();
    let written = std::fs::read(path.path()).unwrap();

    let loaded = LogStore::load(path.path()).unwrap();
    assert_eq!(loaded, log);
    loaded.persist(path.path()).unwrap();
    assert_eq!(std::fs::read(path.path()).unwrap(), written);
}

#[test]
fn test_missing_mailbox_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let mut mailbox = MemoryMailbox::without_inbox();
    let store = AttachmentStore::new(tmp.child("attachments").path());
    let options = RunOptions::new(NonZeroUsize::new(5).unwrap());

    let err = pipeline::run(
        &mut mailbox,
        LogStore::new(),
        &store,
        tmp.child("logs.csv").path(),
        &options,
    )
    .unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, StashError::Mailbox { .. }));
    assert!(mailbox.is_logged_out());
    tmp.child("logs.csv").assert(predicate::path::missing());
}

#[test]
fn test_empty_mailbox_writes_header_only_log() {
    let tmp = TempDir::new().unwrap();
    let report = run_once(&mut MemoryMailbox::new(), &tmp, 20);
    assert_eq!(report.mailbox_size, 0);
    assert_eq!(report.messages_examined, 0);
    tmp.child("logs.csv").assert(HEADER);
}

#[test]
fn test_write_failure_skips_record() {
    let tmp = TempDir::new().unwrap();
    // A regular file where the attachment directory should be
    tmp.child("attachments").write_str("not a directory").unwrap();

    let mut mailbox = MemoryMailbox::new();
    mailbox.push(1u32, fixture("report.eml"));
    let report = run_once(&mut mailbox, &tmp, 1);
    assert_eq!(report.write_failures, 1);
    assert_eq!(report.attachments_saved, 0);
    assert!(report.log.is_empty());
    tmp.child("logs.csv").assert(HEADER);
}

#[test]
fn test_foreign_csv_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.child("logs.csv");
    path.write_str("name,age\nbob,4\n").unwrap();
    assert!(matches!(
        LogStore::load(path.path()),
        Err(StashError::InvalidLog { .. })
    ));
}
