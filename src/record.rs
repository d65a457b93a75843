//! Per-entry metadata carried through the whole pipeline.
//!
//! A [`FileRecord`] is produced once by traversal, filtered, handed to the
//! container codec, and never mutated afterwards. Paths are always
//! archive-relative with `/` separators; the container writers reject
//! anything absolute or containing `..`.

use std::path::Path;

/// Filesystem entry kind.
///
/// Discriminants are single bits so a set of kinds can be expressed as a
/// mask (see [`FileKind::matches_mask`]); an individual record always
/// carries exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FileKind {
    Regular   = 0x01,
    Directory = 0x02,
    Symlink   = 0x04,
    Block     = 0x08,
    Character = 0x10,
    Socket    = 0x20,
    Fifo      = 0x40,
}

/// Mask accepting every kind.
pub const KIND_MASK_ALL: u32 = 0x7F;

impl FileKind {
    /// Decode a wire discriminant. Unknown bits map to `None`.
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0x01 => Some(FileKind::Regular),
            0x02 => Some(FileKind::Directory),
            0x04 => Some(FileKind::Symlink),
            0x08 => Some(FileKind::Block),
            0x10 => Some(FileKind::Character),
            0x20 => Some(FileKind::Socket),
            0x40 => Some(FileKind::Fifo),
            _    => None,
        }
    }

    /// True when this kind's bit is set in `mask`.
    pub fn matches_mask(self, mask: u32) -> bool {
        (self as u32) & mask != 0
    }
}

/// Metadata for one entry to archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Archive-relative path, `/`-separated, at most 255 bytes on the wire.
    pub path: String,
    /// Final path component.
    pub name: String,
    pub kind: FileKind,
    /// Byte length of the entry's data. Zero for non-regular entries.
    pub size: u64,
    /// Unix seconds.
    pub create_time: i64,
    pub modify_time: i64,
    pub access_time: i64,
    /// Unix permission bits.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Link target for symlinks, empty otherwise.
    pub symlink_target: String,
}

impl FileRecord {
    /// Minimal record for a regular file; timestamps and ownership zeroed.
    /// Used by container readers for formats that carry no such fields.
    pub fn synthetic(path: &str, size: u64) -> Self {
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_owned());
        FileRecord {
            path: path.to_owned(),
            name,
            kind: FileKind::Regular,
            size,
            create_time: 0,
            modify_time: 0,
            access_time: 0,
            mode: 0o644,
            uid: 0,
            gid: 0,
            symlink_target: String::new(),
        }
    }

    /// True when the archive-relative path is safe to create under a
    /// restore root: relative, no `..` component.
    pub fn has_safe_path(&self) -> bool {
        let p = Path::new(&self.path);
        !self.path.is_empty()
            && p.is_relative()
            && !p.components().any(|c| matches!(c, std::path::Component::ParentDir))
    }
}
