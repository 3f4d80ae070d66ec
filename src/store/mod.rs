//! Local persistence: saved attachment files and the attachment log.

pub mod attachments;
pub mod csv;
pub mod log;

use std::io::Write;
use std::path::Path;

use crate::error::{Result, StashError};

/// Replace `path` with `data` in one step.
///
/// The bytes go to a temporary file in the same directory which is then
/// renamed over the destination, so readers see either the old content or
/// the new content, never a partial write.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| StashError::io(dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StashError::io(dir, e))?;
    tmp.write_all(data).map_err(|e| StashError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StashError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| StashError::io(path, e.error))?;
    Ok(())
}
