//! Tar-compatible container: one 512-byte header per entry, data padded to
//! the next 512-byte boundary, two all-zero blocks at the end.
//!
//! Field placement follows the historic ustar layout: name at 0, mode/uid/
//! gid as zero-padded octal ASCII at 100/108/116, size as 11-digit octal
//! at 124, mtime as 11-digit octal at 136, type flag `'0'` at 156 and the
//! literal bytes `"ustar  "` at 257. The checksum field is left zeroed,
//! matching the archives this format must stay interoperable with.
//!
//! End-of-archive detection: an all-zero block followed by a second
//! all-zero block. A lone zero block followed by non-zero data is *data*
//! (a file whose contents happen to be zeros) — the reader rewinds and
//! keeps parsing.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::debug;

use crate::record::{FileKind, FileRecord};

use super::{copy_entry_data, PackError};

pub const BLOCK_LEN: usize = 512;
const NAME_LEN: usize = 100;
const USTAR_OFFSET: usize = 257;
const USTAR_MAGIC: &[u8; 7] = b"ustar  ";

/// Render `value` as `width` zero-padded octal digits (no terminator).
fn put_octal(field: &mut [u8], width: usize, value: u64) {
    let s = format!("{:0width$o}", value, width = width);
    field[..width].copy_from_slice(&s.as_bytes()[s.len() - width..]);
}

/// Parse a zero-padded octal field, stopping at NUL or space.
fn parse_octal(field: &[u8]) -> Result<u64, PackError> {
    let mut value: u64 = 0;
    let mut seen = false;
    for &b in field {
        match b {
            b'0'..=b'7' => {
                value = value
                    .checked_mul(8)
                    .and_then(|v| v.checked_add((b - b'0') as u64))
                    .ok_or(PackError::Malformed("octal field overflow"))?;
                seen = true;
            }
            0 | b' ' => break,
            _ => return Err(PackError::Malformed("non-octal digit in header field")),
        }
    }
    if !seen {
        return Ok(0);
    }
    Ok(value)
}

fn build_header(entry: &FileRecord) -> Result<[u8; BLOCK_LEN], PackError> {
    let name = entry.path.as_bytes();
    if name.len() >= NAME_LEN {
        return Err(PackError::BadPath(entry.path.clone()));
    }
    let mut header = [0u8; BLOCK_LEN];
    header[..name.len()].copy_from_slice(name);
    put_octal(&mut header[100..], 7, entry.mode as u64);
    put_octal(&mut header[108..], 7, entry.uid as u64);
    put_octal(&mut header[116..], 7, entry.gid as u64);
    put_octal(&mut header[124..], 11, entry.size);
    put_octal(&mut header[136..], 11, entry.modify_time.max(0) as u64);
    header[156] = b'0';
    header[USTAR_OFFSET..USTAR_OFFSET + USTAR_MAGIC.len()].copy_from_slice(USTAR_MAGIC);
    Ok(header)
}

pub fn pack<W: Write + Seek>(
    writer:  &mut W,
    root:    &Path,
    entries: &[FileRecord],
) -> Result<(), PackError> {
    let mut written = 0usize;
    for entry in entries {
        // Directories and special files carry no data block in this
        // layout; only their descendants are archived.
        if entry.kind != FileKind::Regular {
            continue;
        }
        writer.write_all(&build_header(entry)?)?;
        copy_entry_data(root, entry, writer)?;
        let tail = (entry.size % BLOCK_LEN as u64) as usize;
        if tail != 0 {
            writer.write_all(&vec![0u8; BLOCK_LEN - tail])?;
        }
        written += 1;
    }
    // Two all-zero blocks terminate the archive.
    writer.write_all(&[0u8; BLOCK_LEN])?;
    writer.write_all(&[0u8; BLOCK_LEN])?;
    debug!("tar pack: {} regular entries", written);
    Ok(())
}

fn read_block<R: Read>(reader: &mut R, block: &mut [u8; BLOCK_LEN]) -> Result<bool, PackError> {
    match reader.read_exact(block) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

pub fn unpack<R: Read + Seek>(reader: &mut R) -> Result<Vec<(FileRecord, Vec<u8>)>, PackError> {
    let mut entries = Vec::new();
    let mut block = [0u8; BLOCK_LEN];

    loop {
        if !read_block(reader, &mut block)? {
            break;
        }

        if block.iter().all(|&b| b == 0) {
            // Candidate terminator: confirm with the next block.
            if !read_block(reader, &mut block)? {
                break;
            }
            if block.iter().all(|&b| b == 0) {
                break;
            }
            // A zero data block mid-archive — rewind and parse it as a
            // header on the next iteration.
            reader.seek(SeekFrom::Current(-(BLOCK_LEN as i64)))?;
            continue;
        }

        if &block[USTAR_OFFSET..USTAR_OFFSET + USTAR_MAGIC.len()] != USTAR_MAGIC {
            return Err(PackError::InvalidMagic);
        }

        let name_end = block[..NAME_LEN]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_LEN);
        let path = String::from_utf8_lossy(&block[..name_end]).into_owned();
        if path.is_empty() {
            continue;
        }

        let mode = parse_octal(&block[100..108])? as u32;
        let uid = parse_octal(&block[108..116])? as u32;
        let gid = parse_octal(&block[116..124])? as u32;
        let size = parse_octal(&block[124..136])?;
        let mtime = parse_octal(&block[136..148])? as i64;

        let mut data = vec![0u8; size as usize];
        reader
            .read_exact(&mut data)
            .map_err(|_| PackError::Truncated("entry data"))?;
        let tail = (size % BLOCK_LEN as u64) as usize;
        if tail != 0 {
            reader.seek(SeekFrom::Current((BLOCK_LEN - tail) as i64))?;
        }

        let mut record = FileRecord::synthetic(&path, size);
        record.mode = mode;
        record.uid = uid;
        record.gid = gid;
        record.create_time = mtime;
        record.modify_time = mtime;
        record.access_time = mtime;
        entries.push((record, data));
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn roundtrip_preserves_order_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("first.bin"), vec![7u8; 700]).unwrap();
        std::fs::write(dir.path().join("second.txt"), b"hello").unwrap();

        let mut first = FileRecord::synthetic("first.bin", 700);
        first.mode = 0o755;
        first.modify_time = 1_700_000_000;
        let second = FileRecord::synthetic("second.txt", 5);

        let mut buf = Cursor::new(Vec::new());
        pack(&mut buf, dir.path(), &[first.clone(), second]).unwrap();

        buf.set_position(0);
        let entries = unpack(&mut buf).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0.path, "first.bin");
        assert_eq!(entries[0].0.mode, 0o755);
        assert_eq!(entries[0].0.modify_time, 1_700_000_000);
        assert_eq!(entries[0].1, vec![7u8; 700]);
        assert_eq!(entries[1].0.path, "second.txt");
        assert_eq!(entries[1].1, b"hello");
    }

    #[test]
    fn zero_block_followed_by_data_is_rewound() {
        // A lone all-zero block ahead of a valid header must not be taken
        // for the terminator; the reader rewinds and keeps parsing.
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("after.txt"), b"still here").unwrap();

        let mut bytes = vec![0u8; BLOCK_LEN];
        let mut rest = Cursor::new(Vec::new());
        pack(&mut rest, dir.path(), &[FileRecord::synthetic("after.txt", 10)]).unwrap();
        bytes.extend_from_slice(&rest.into_inner());

        let mut buf = Cursor::new(bytes);
        let unpacked = unpack(&mut buf).unwrap();
        assert_eq!(unpacked.len(), 1);
        assert_eq!(unpacked[0].0.path, "after.txt");
        assert_eq!(unpacked[0].1, b"still here");
    }

    #[test]
    fn zero_filled_file_contents_survive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("zeros.bin"), vec![0u8; BLOCK_LEN]).unwrap();
        std::fs::write(dir.path().join("after.txt"), b"still here").unwrap();

        let entries = vec![
            FileRecord::synthetic("zeros.bin", BLOCK_LEN as u64),
            FileRecord::synthetic("after.txt", 10),
        ];
        let mut buf = Cursor::new(Vec::new());
        pack(&mut buf, dir.path(), &entries).unwrap();

        buf.set_position(0);
        let unpacked = unpack(&mut buf).unwrap();
        assert_eq!(unpacked.len(), 2);
        assert_eq!(unpacked[0].1, vec![0u8; BLOCK_LEN]);
        assert_eq!(unpacked[1].1, b"still here");
    }

    #[test]
    fn non_tar_input_fails_fast() {
        // A custom-format header does not carry the ustar magic.
        let mut bytes = vec![0u8; BLOCK_LEN];
        bytes[..4].copy_from_slice(b"BACK");
        let mut buf = Cursor::new(bytes);
        assert!(matches!(unpack(&mut buf), Err(PackError::InvalidMagic)));
    }

    #[test]
    fn octal_fields() {
        let mut field = [0u8; 12];
        put_octal(&mut field, 11, 0o755);
        assert_eq!(&field[..11], b"00000000755");
        assert_eq!(parse_octal(&field).unwrap(), 0o755);
        assert!(parse_octal(b"12x").is_err());
    }
}
