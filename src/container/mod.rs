//! Container codecs: one file list plus data, three interchangeable
//! on-disk layouts.
//!
//! The formats are deliberately **not** self-describing as a family — an
//! archive does not record which container was used. Restore discovers the
//! format by trial ([`crate::pipeline::restore`]); to make that safe, every
//! reader here fails fast with [`PackError::InvalidMagic`] as soon as its
//! leading bytes do not match, without consuming meaningful input.
//!
//! All integers are little-endian. Fixed-width string fields are
//! NUL-padded; content is capped one byte short of the field so a
//! terminator always fits.

use std::fs::File;
use std::io::{self, Read, Seek, Write};
use std::path::Path;

use thiserror::Error;

use crate::record::FileRecord;

pub mod custom;
pub mod tar;
pub mod zip;

/// Width of the fixed path/name/symlink-target fields in the custom format.
pub const FIXED_STR_LEN: usize = 256;

#[derive(Error, Debug)]
pub enum PackError {
    #[error("Invalid container magic")]
    InvalidMagic,
    #[error("Unsupported container version: {0}")]
    UnsupportedVersion(u32),
    #[error("Truncated container: {0}")]
    Truncated(&'static str),
    #[error("Malformed container field: {0}")]
    Malformed(&'static str),
    #[error("Entry path rejected: {0}")]
    BadPath(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// On-disk container layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    /// Fixed-record "BACK" layout carrying full metadata.
    Custom,
    /// ustar-style 512-byte blocks.
    Tar,
    /// Store-only zip (never deflate).
    Zip,
}

impl ContainerFormat {
    /// Human-readable name (diagnostics and CLI parsing).
    pub fn name(self) -> &'static str {
        match self {
            ContainerFormat::Custom => "custom",
            ContainerFormat::Tar    => "tar",
            ContainerFormat::Zip    => "zip",
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "custom" | "pack" => Some(ContainerFormat::Custom),
            "tar"             => Some(ContainerFormat::Tar),
            "zip"             => Some(ContainerFormat::Zip),
            _                 => None,
        }
    }
}

/// Serialize `entries` and their data into `writer` using `format`.
///
/// Entry data is read from `root.join(entry.path)`. Entries are written in
/// slice order; the caller owns ordering. Writers reject absolute, empty,
/// or `..`-containing paths before emitting anything for the entry.
pub fn pack<W: Write + Seek>(
    writer:  &mut W,
    root:    &Path,
    entries: &[FileRecord],
    format:  ContainerFormat,
) -> Result<(), PackError> {
    for entry in entries {
        if !entry.has_safe_path() {
            return Err(PackError::BadPath(entry.path.clone()));
        }
    }
    match format {
        ContainerFormat::Custom => custom::pack(writer, root, entries),
        ContainerFormat::Tar    => tar::pack(writer, root, entries),
        ContainerFormat::Zip    => zip::pack(writer, root, entries),
    }
}

/// Deserialize a container produced by [`pack`] back into records plus
/// their data, in archive order.
pub fn unpack<R: Read + Seek>(
    reader: &mut R,
    format: ContainerFormat,
) -> Result<Vec<(FileRecord, Vec<u8>)>, PackError> {
    match format {
        ContainerFormat::Custom => custom::unpack(reader),
        ContainerFormat::Tar    => tar::unpack(reader),
        ContainerFormat::Zip    => zip::unpack(reader),
    }
}

// ── shared helpers ───────────────────────────────────────────────────────────

/// Write `s` into a NUL-padded field of `width` bytes.
/// Content longer than `width - 1` is a [`PackError::BadPath`].
pub(crate) fn write_fixed_str<W: Write>(
    writer: &mut W,
    s:      &str,
    width:  usize,
) -> Result<(), PackError> {
    let bytes = s.as_bytes();
    if bytes.len() >= width {
        return Err(PackError::BadPath(s.to_owned()));
    }
    writer.write_all(bytes)?;
    let pad = vec![0u8; width - bytes.len()];
    writer.write_all(&pad)?;
    Ok(())
}

/// Read a NUL-padded field of `width` bytes back into a `String`.
pub(crate) fn read_fixed_str<R: Read>(reader: &mut R, width: usize) -> Result<String, PackError> {
    let mut buf = vec![0u8; width];
    reader.read_exact(&mut buf)?;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(width);
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

/// Stream exactly `size` bytes of `entry`'s file data into `writer`.
pub(crate) fn copy_entry_data<W: Write>(
    root:   &Path,
    entry:  &FileRecord,
    writer: &mut W,
) -> Result<(), PackError> {
    let mut src = File::open(root.join(&entry.path))?;
    let mut remaining = entry.size;
    let mut buf = [0u8; 4096];
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = src.read(&mut buf[..want])?;
        if n == 0 {
            return Err(PackError::Truncated("source file shorter than declared size"));
        }
        writer.write_all(&buf[..n])?;
        remaining -= n as u64;
    }
    Ok(())
}
