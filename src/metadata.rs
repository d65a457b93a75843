//! Capture OS metadata into [`FileRecord`]s and re-apply it to restored
//! files.
//!
//! Capture never follows symlinks. Apply is best-effort by design: the
//! pipeline logs and continues when the OS refuses an attribute, since the
//! file contents are already on disk at that point.

use std::fs;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::record::{FileKind, FileRecord};

fn unix_seconds(t: io::Result<SystemTime>) -> i64 {
    t.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(unix)]
fn kind_of(meta: &fs::Metadata) -> FileKind {
    use std::os::unix::fs::FileTypeExt;
    let ft = meta.file_type();
    if ft.is_dir() {
        FileKind::Directory
    } else if ft.is_symlink() {
        FileKind::Symlink
    } else if ft.is_block_device() {
        FileKind::Block
    } else if ft.is_char_device() {
        FileKind::Character
    } else if ft.is_socket() {
        FileKind::Socket
    } else if ft.is_fifo() {
        FileKind::Fifo
    } else {
        FileKind::Regular
    }
}

#[cfg(not(unix))]
fn kind_of(meta: &fs::Metadata) -> FileKind {
    let ft = meta.file_type();
    if ft.is_dir() {
        FileKind::Directory
    } else if ft.is_symlink() {
        FileKind::Symlink
    } else {
        FileKind::Regular
    }
}

/// Build a [`FileRecord`] for the filesystem entry at `abs_path`, carrying
/// `rel_path` as the archive-relative path.
pub fn capture(abs_path: &Path, rel_path: &str) -> io::Result<FileRecord> {
    let meta = fs::symlink_metadata(abs_path)?;
    let kind = kind_of(&meta);

    let name = Path::new(rel_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| rel_path.to_owned());

    let symlink_target = if kind == FileKind::Symlink {
        fs::read_link(abs_path)?.to_string_lossy().into_owned()
    } else {
        String::new()
    };

    #[cfg(unix)]
    let (mode, uid, gid) = {
        use std::os::unix::fs::MetadataExt;
        (meta.mode() & 0o7777, meta.uid(), meta.gid())
    };
    #[cfg(not(unix))]
    let (mode, uid, gid) = (0o644u32, 0u32, 0u32);

    Ok(FileRecord {
        path: rel_path.to_owned(),
        name,
        kind,
        size: if kind == FileKind::Regular { meta.len() } else { 0 },
        create_time: unix_seconds(meta.created()),
        modify_time: unix_seconds(meta.modified()),
        access_time: unix_seconds(meta.accessed()),
        mode,
        uid,
        gid,
        symlink_target,
    })
}

#[cfg(unix)]
fn set_file_times(path: &Path, access: i64, modify: i64) -> io::Result<()> {
    use std::os::unix::ffi::OsStrExt;

    let cpath = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "NUL in path"))?;
    let times = [
        libc::timespec { tv_sec: access as libc::time_t, tv_nsec: 0 },
        libc::timespec { tv_sec: modify as libc::time_t, tv_nsec: 0 },
    ];
    let rc = unsafe { libc::utimensat(libc::AT_FDCWD, cpath.as_ptr(), times.as_ptr(), 0) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Re-apply mode and timestamps to a restored entry.
///
/// Symlinks are skipped: their permissions are meaningless on most
/// platforms and touching them would follow the link.
pub fn apply(path: &Path, record: &FileRecord) -> io::Result<()> {
    if record.kind == FileKind::Symlink {
        return Ok(());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(record.mode))?;
        set_file_times(path, record.access_time, record.modify_time)?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
