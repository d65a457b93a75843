//! The native "BACK" container: a fixed header, one fixed-size metadata
//! record per entry, then the concatenated raw file bytes at the offsets
//! the records declare.
//!
//! Layout (all little-endian):
//!
//! ```text
//! magic[4]="BACK"  version:u32  file_count:u32  header_size:u64  data_offset:u64
//! file_count × record:
//!   path[256] name[256] kind:u32 size:u64 offset:u64
//!   create:i64 modify:i64 access:i64 mode:u32 uid:u32 gid:u32
//!   symlink_target[256]
//! raw data, each entry at its declared offset
//! ```
//!
//! The writer derives the first data offset from the header size and
//! accumulates by entry size, so declared ranges never overlap — a
//! mismatch there would silently shift every later extraction.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

use crate::record::{FileKind, FileRecord};

use super::{copy_entry_data, read_fixed_str, write_fixed_str, PackError, FIXED_STR_LEN};

pub const MAGIC: &[u8; 4] = b"BACK";
pub const VERSION: u32 = 1;

/// Fixed header length in bytes.
pub const HEADER_LEN: u64 = 4 + 4 + 4 + 8 + 8;
/// Fixed per-entry record length in bytes.
pub const RECORD_LEN: u64 = 256 + 256 + 4 + 8 + 8 + 8 + 8 + 8 + 4 + 4 + 4 + 256;

fn write_record<W: Write>(
    writer: &mut W,
    entry:  &FileRecord,
    offset: u64,
) -> Result<(), PackError> {
    write_fixed_str(writer, &entry.path, FIXED_STR_LEN)?;
    write_fixed_str(writer, &entry.name, FIXED_STR_LEN)?;
    writer.write_u32::<LittleEndian>(entry.kind as u32)?;
    writer.write_u64::<LittleEndian>(entry.size)?;
    writer.write_u64::<LittleEndian>(offset)?;
    writer.write_i64::<LittleEndian>(entry.create_time)?;
    writer.write_i64::<LittleEndian>(entry.modify_time)?;
    writer.write_i64::<LittleEndian>(entry.access_time)?;
    writer.write_u32::<LittleEndian>(entry.mode)?;
    writer.write_u32::<LittleEndian>(entry.uid)?;
    writer.write_u32::<LittleEndian>(entry.gid)?;
    write_fixed_str(writer, &entry.symlink_target, FIXED_STR_LEN)?;
    Ok(())
}

fn read_record<R: Read>(reader: &mut R) -> Result<(FileRecord, u64), PackError> {
    let path = read_fixed_str(reader, FIXED_STR_LEN)?;
    let name = read_fixed_str(reader, FIXED_STR_LEN)?;
    let kind = reader.read_u32::<LittleEndian>()?;
    let kind = FileKind::from_u32(kind).ok_or(PackError::Malformed("entry kind"))?;
    let size = reader.read_u64::<LittleEndian>()?;
    let offset = reader.read_u64::<LittleEndian>()?;
    let create_time = reader.read_i64::<LittleEndian>()?;
    let modify_time = reader.read_i64::<LittleEndian>()?;
    let access_time = reader.read_i64::<LittleEndian>()?;
    let mode = reader.read_u32::<LittleEndian>()?;
    let uid = reader.read_u32::<LittleEndian>()?;
    let gid = reader.read_u32::<LittleEndian>()?;
    let symlink_target = read_fixed_str(reader, FIXED_STR_LEN)?;
    let record = FileRecord {
        path,
        name,
        kind,
        size,
        create_time,
        modify_time,
        access_time,
        mode,
        uid,
        gid,
        symlink_target,
    };
    Ok((record, offset))
}

pub fn pack<W: Write + Seek>(
    writer:  &mut W,
    root:    &Path,
    entries: &[FileRecord],
) -> Result<(), PackError> {
    let header_size = HEADER_LEN + entries.len() as u64 * RECORD_LEN;

    writer.write_all(MAGIC)?;
    writer.write_u32::<LittleEndian>(VERSION)?;
    writer.write_u32::<LittleEndian>(entries.len() as u32)?;
    writer.write_u64::<LittleEndian>(header_size)?;
    writer.write_u64::<LittleEndian>(header_size)?;

    // Data offsets start right after the metadata block and accumulate by
    // size; only regular entries carry data.
    let mut offset = header_size;
    for entry in entries {
        let data_len = if entry.kind == FileKind::Regular { entry.size } else { 0 };
        write_record(writer, entry, offset)?;
        offset += data_len;
    }

    for entry in entries {
        if entry.kind == FileKind::Regular && entry.size > 0 {
            copy_entry_data(root, entry, writer)?;
        }
    }
    debug!("custom pack: {} entries, {} data bytes", entries.len(), offset - header_size);
    Ok(())
}

pub fn unpack<R: Read + Seek>(reader: &mut R) -> Result<Vec<(FileRecord, Vec<u8>)>, PackError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic).map_err(|_| PackError::InvalidMagic)?;
    if &magic != MAGIC {
        return Err(PackError::InvalidMagic);
    }
    let version = reader.read_u32::<LittleEndian>()?;
    if version != VERSION {
        return Err(PackError::UnsupportedVersion(version));
    }
    let file_count = reader.read_u32::<LittleEndian>()?;
    let _header_size = reader.read_u64::<LittleEndian>()?;
    let _data_offset = reader.read_u64::<LittleEndian>()?;

    let mut metas = Vec::with_capacity(file_count as usize);
    for _ in 0..file_count {
        metas.push(read_record(reader)?);
    }

    let mut entries = Vec::with_capacity(metas.len());
    for (record, offset) in metas {
        let data = if record.kind == FileKind::Regular && record.size > 0 {
            reader.seek(SeekFrom::Start(offset))?;
            let mut data = vec![0u8; record.size as usize];
            reader
                .read_exact(&mut data)
                .map_err(|_| PackError::Truncated("entry data"))?;
            data
        } else {
            Vec::new()
        };
        entries.push((record, data));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{pack as pack_any, ContainerFormat};
    use std::io::Cursor;

    fn sample_tree() -> (tempfile::TempDir, Vec<FileRecord>) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"abc").unwrap();
        std::fs::create_dir(dir.path().join("dir")).unwrap();
        std::fs::write(dir.path().join("dir/b.txt"), b"").unwrap();
        let entries = vec![
            FileRecord::synthetic("a.txt", 3),
            FileRecord::synthetic("dir/b.txt", 0),
        ];
        (dir, entries)
    }

    #[test]
    fn roundtrip_two_files() {
        let (dir, entries) = sample_tree();
        let mut buf = Cursor::new(Vec::new());
        pack(&mut buf, dir.path(), &entries).unwrap();

        buf.set_position(0);
        let unpacked = unpack(&mut buf).unwrap();
        assert_eq!(unpacked.len(), 2);
        assert_eq!(unpacked[0].0, entries[0]);
        assert_eq!(unpacked[0].1, b"abc");
        assert_eq!(unpacked[1].0.name, "b.txt");
        assert_eq!(unpacked[1].0.size, 0);
        assert!(unpacked[1].1.is_empty());
    }

    #[test]
    fn pack_is_deterministic() {
        let (dir, entries) = sample_tree();
        let mut first = Cursor::new(Vec::new());
        let mut second = Cursor::new(Vec::new());
        pack(&mut first, dir.path(), &entries).unwrap();
        pack(&mut second, dir.path(), &entries).unwrap();
        assert_eq!(first.into_inner(), second.into_inner());
    }

    #[test]
    fn foreign_magic_rejected() {
        let mut buf = Cursor::new(b"NOPE............".to_vec());
        assert!(matches!(unpack(&mut buf), Err(PackError::InvalidMagic)));
    }

    #[test]
    fn traversal_path_escape_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![FileRecord::synthetic("../escape.txt", 0)];
        let mut buf = Cursor::new(Vec::new());
        let err = pack_any(&mut buf, dir.path(), &entries, ContainerFormat::Custom).unwrap_err();
        assert!(matches!(err, PackError::BadPath(_)));
    }
}
