//! Zip-compatible container, store-only — compression method is always 0,
//! never deflate; the surrounding pipeline compresses the whole container
//! instead.
//!
//! Writer emits, per entry, a local file header + name + raw data, then one
//! central-directory record per entry, then the end-of-central-directory
//! record. The CRC-32 over the raw bytes is computed and written.
//!
//! Reader walks only the local-file-header chain and stops at the first
//! four bytes that are not the local-file-header signature; the central
//! directory is ignored and the stored CRC-32 is not verified.

use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use log::debug;

use crate::record::FileRecord;

use super::{copy_entry_data, PackError};

pub const LOCAL_FILE_HEADER_SIG: u32 = 0x0403_4B50;
pub const CENTRAL_DIR_HEADER_SIG: u32 = 0x0201_4B50;
pub const END_CENTRAL_DIR_SIG: u32 = 0x0605_4B50;

const VERSION_NEEDED: u16 = 20;
const METHOD_STORED: u16 = 0;
/// Unix regular file 0644 in the upper half of the external-attributes word.
const EXTERNAL_ATTRS: u32 = 0x81A4_0000;

/// Unix seconds → MS-DOS (date, time) pair. Resolution is two seconds;
/// years before 1980 clamp to the epoch of the format.
fn to_dos_datetime(unix: i64) -> (u16, u16) {
    let dt = DateTime::<Utc>::from_timestamp(unix, 0).unwrap_or(DateTime::UNIX_EPOCH);
    let year = dt.year().max(1980);
    let date = (((year - 1980) as u16 & 0x7F) << 9)
        | ((dt.month() as u16 & 0x0F) << 5)
        | (dt.day() as u16 & 0x1F);
    let time = ((dt.hour() as u16 & 0x1F) << 11)
        | ((dt.minute() as u16 & 0x3F) << 5)
        | ((dt.second() as u16 / 2) & 0x1F);
    (date, time)
}

/// Inverse of [`to_dos_datetime`]; malformed fields decode to 0.
fn from_dos_datetime(date: u16, time: u16) -> i64 {
    let year = 1980 + ((date >> 9) & 0x7F) as i32;
    let month = ((date >> 5) & 0x0F) as u32;
    let day = (date & 0x1F) as u32;
    let hour = ((time >> 11) & 0x1F) as u32;
    let minute = ((time >> 5) & 0x3F) as u32;
    let second = ((time & 0x1F) * 2) as u32;
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, second))
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(0)
}

fn entry_crc32(root: &Path, entry: &FileRecord) -> Result<u32, PackError> {
    let mut src = File::open(root.join(&entry.path))?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = src.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

struct CentralEntry {
    name:          String,
    crc32:         u32,
    size:          u32,
    dos_date:      u16,
    dos_time:      u16,
    header_offset: u32,
}

pub fn pack<W: Write + Seek>(
    writer:  &mut W,
    root:    &Path,
    entries: &[FileRecord],
) -> Result<(), PackError> {
    let mut central: Vec<CentralEntry> = Vec::new();

    for entry in entries {
        if entry.kind != crate::record::FileKind::Regular {
            continue;
        }
        let name = entry.path.clone();
        if name.len() > u16::MAX as usize {
            return Err(PackError::BadPath(name));
        }
        let size = u32::try_from(entry.size)
            .map_err(|_| PackError::Malformed("entry larger than 4 GiB"))?;
        let crc32 = entry_crc32(root, entry)?;
        let (dos_date, dos_time) = to_dos_datetime(entry.modify_time);
        let header_offset = writer.stream_position()? as u32;

        writer.write_u32::<LittleEndian>(LOCAL_FILE_HEADER_SIG)?;
        writer.write_u16::<LittleEndian>(VERSION_NEEDED)?;
        writer.write_u16::<LittleEndian>(0)?; // flags
        writer.write_u16::<LittleEndian>(METHOD_STORED)?;
        writer.write_u16::<LittleEndian>(dos_time)?;
        writer.write_u16::<LittleEndian>(dos_date)?;
        writer.write_u32::<LittleEndian>(crc32)?;
        writer.write_u32::<LittleEndian>(size)?; // compressed == uncompressed
        writer.write_u32::<LittleEndian>(size)?;
        writer.write_u16::<LittleEndian>(name.len() as u16)?;
        writer.write_u16::<LittleEndian>(0)?; // extra field length
        writer.write_all(name.as_bytes())?;
        copy_entry_data(root, entry, writer)?;

        central.push(CentralEntry { name, crc32, size, dos_date, dos_time, header_offset });
    }

    let central_dir_offset = writer.stream_position()? as u32;
    for ce in &central {
        writer.write_u32::<LittleEndian>(CENTRAL_DIR_HEADER_SIG)?;
        writer.write_u16::<LittleEndian>(VERSION_NEEDED)?; // created by
        writer.write_u16::<LittleEndian>(VERSION_NEEDED)?;
        writer.write_u16::<LittleEndian>(0)?; // flags
        writer.write_u16::<LittleEndian>(METHOD_STORED)?;
        writer.write_u16::<LittleEndian>(ce.dos_time)?;
        writer.write_u16::<LittleEndian>(ce.dos_date)?;
        writer.write_u32::<LittleEndian>(ce.crc32)?;
        writer.write_u32::<LittleEndian>(ce.size)?;
        writer.write_u32::<LittleEndian>(ce.size)?;
        writer.write_u16::<LittleEndian>(ce.name.len() as u16)?;
        writer.write_u16::<LittleEndian>(0)?; // extra field length
        writer.write_u16::<LittleEndian>(0)?; // comment length
        writer.write_u16::<LittleEndian>(0)?; // disk number
        writer.write_u16::<LittleEndian>(0)?; // internal attributes
        writer.write_u32::<LittleEndian>(EXTERNAL_ATTRS)?;
        writer.write_u32::<LittleEndian>(ce.header_offset)?;
        writer.write_all(ce.name.as_bytes())?;
    }
    let central_dir_size = writer.stream_position()? as u32 - central_dir_offset;

    writer.write_u32::<LittleEndian>(END_CENTRAL_DIR_SIG)?;
    writer.write_u16::<LittleEndian>(0)?; // this disk
    writer.write_u16::<LittleEndian>(0)?; // disk with central dir
    writer.write_u16::<LittleEndian>(central.len() as u16)?;
    writer.write_u16::<LittleEndian>(central.len() as u16)?;
    writer.write_u32::<LittleEndian>(central_dir_size)?;
    writer.write_u32::<LittleEndian>(central_dir_offset)?;
    writer.write_u16::<LittleEndian>(0)?; // comment length

    debug!("zip pack: {} stored entries", central.len());
    Ok(())
}

pub fn unpack<R: Read + Seek>(reader: &mut R) -> Result<Vec<(FileRecord, Vec<u8>)>, PackError> {
    let mut entries = Vec::new();

    loop {
        let signature = match reader.read_u32::<LittleEndian>() {
            Ok(sig) => sig,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        if signature != LOCAL_FILE_HEADER_SIG {
            // Central directory or foreign bytes — end of the chain.
            break;
        }

        let _version_needed = reader.read_u16::<LittleEndian>()?;
        let _flags = reader.read_u16::<LittleEndian>()?;
        let method = reader.read_u16::<LittleEndian>()?;
        let dos_time = reader.read_u16::<LittleEndian>()?;
        let dos_date = reader.read_u16::<LittleEndian>()?;
        let _crc32 = reader.read_u32::<LittleEndian>()?;
        let _compressed_size = reader.read_u32::<LittleEndian>()?;
        let uncompressed_size = reader.read_u32::<LittleEndian>()?;
        let name_len = reader.read_u16::<LittleEndian>()? as usize;
        let extra_len = reader.read_u16::<LittleEndian>()? as i64;

        if method != METHOD_STORED {
            return Err(PackError::Malformed("unsupported compression method"));
        }

        let mut name = vec![0u8; name_len];
        reader
            .read_exact(&mut name)
            .map_err(|_| PackError::Truncated("file name"))?;
        let path = String::from_utf8_lossy(&name).into_owned();
        reader.seek(std::io::SeekFrom::Current(extra_len))?;

        let mut data = vec![0u8; uncompressed_size as usize];
        reader
            .read_exact(&mut data)
            .map_err(|_| PackError::Truncated("entry data"))?;

        let mut record = FileRecord::synthetic(&path, uncompressed_size as u64);
        let mtime = from_dos_datetime(dos_date, dos_time);
        record.create_time = mtime;
        record.modify_time = mtime;
        record.access_time = mtime;
        entries.push((record, data));
    }

    if entries.is_empty() {
        return Err(PackError::InvalidMagic);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn roundtrip_keeps_paths_and_data() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("top.txt"), b"top level").unwrap();
        std::fs::write(dir.path().join("sub/nested.bin"), vec![0xAB; 100]).unwrap();

        let mut a = FileRecord::synthetic("top.txt", 9);
        a.modify_time = 1_600_000_000;
        let b = FileRecord::synthetic("sub/nested.bin", 100);

        let mut buf = Cursor::new(Vec::new());
        pack(&mut buf, dir.path(), &[a, b]).unwrap();

        buf.set_position(0);
        let entries = unpack(&mut buf).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0.path, "top.txt");
        assert_eq!(entries[0].1, b"top level");
        assert_eq!(entries[1].0.path, "sub/nested.bin");
        assert_eq!(entries[1].1, vec![0xAB; 100]);
    }

    #[test]
    fn dos_datetime_two_second_resolution() {
        let unix = 1_700_000_001; // odd second truncates to the even one
        let (date, time) = to_dos_datetime(unix);
        assert_eq!(from_dos_datetime(date, time), unix - 1);
    }

    #[test]
    fn foreign_bytes_rejected() {
        let mut buf = Cursor::new(b"BACKxxxxxxxxxxxxxxxx".to_vec());
        assert!(matches!(unpack(&mut buf), Err(PackError::InvalidMagic)));
    }
}
