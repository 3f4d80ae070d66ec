//! The attachment directory: writes decoded attachments to disk.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::store::write_atomic;

/// Longest filename written, in characters.
const MAX_FILENAME_LEN: usize = 200;

/// Flat directory of saved attachments.
///
/// Files are named after the attachment's decoded filename. Saving the same
/// name again overwrites the earlier file (last write wins).
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    dir: PathBuf,
}

impl AttachmentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The path `filename` is saved under.
    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.join(sanitize_filename(filename))
    }

    /// Write `payload` as `filename` and return the path written.
    ///
    /// The directory is created if needed. The file appears with its full
    /// content or not at all.
    pub fn save(&self, filename: &str, payload: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(filename);
        write_atomic(&path, payload)?;
        debug!(path = %path.display(), bytes = payload.len(), "Saved attachment");
        Ok(path)
    }
}

/// Flatten a filename taken from message headers into a single path component.
///
/// Path separators, control characters and characters Windows rejects become
/// `_`; leading dots are removed so the result can be neither hidden nor `..`.
pub fn sanitize_filename(name: &str) -> String {
    let flattened: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_FILENAME_LEN)
        .collect();

    let trimmed = flattened.trim().trim_start_matches('.').trim();
    if trimmed.is_empty() {
        "attachment".to_string()
    } else {
        trimmed.to_string()
    }
}
