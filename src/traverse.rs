//! Source-tree traversal: produce the ordered, filtered entry list the
//! container codec consumes.
//!
//! The walk is depth-first with children visited in name order, so two
//! walks of an unchanged tree yield the same list — packing is then
//! deterministic. Symlinks are recorded, never followed.

use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use walkdir::WalkDir;

use crate::filter::{self, FilterOptions};
use crate::metadata;
use crate::record::FileRecord;

/// Join path components with `/` regardless of platform.
fn to_archive_path(rel: &Path) -> String {
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    parts.join("/")
}

/// Walk `source` and return `(root, records)` where every record's path is
/// relative to `root`.
///
/// A directory source yields its descendants (the directory itself is not
/// an entry); a file source yields the single file relative to its parent.
pub fn collect(
    source: &Path,
    opts:   &FilterOptions,
) -> io::Result<(PathBuf, Vec<FileRecord>)> {
    let meta = std::fs::symlink_metadata(source)?;

    if !meta.is_dir() {
        let root = source.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        let rel = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "source has no file name"))?;
        let record = metadata::capture(source, &rel)?;
        let records = if filter::matches(&record, opts) { vec![record] } else { Vec::new() };
        return Ok((root, records));
    }

    let mut records = Vec::new();
    for entry in WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name()
        .min_depth(1)
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("traversal error under {:?}: {}", source, e);
                return Err(io::Error::new(io::ErrorKind::Other, e));
            }
        };
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let rel = to_archive_path(rel);
        let record = metadata::capture(entry.path(), &rel)?;
        if filter::matches(&record, opts) {
            records.push(record);
        }
    }

    debug!("traversal of {:?} selected {} entries", source, records.len());
    Ok((source.to_path_buf(), records))
}
