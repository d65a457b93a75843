//! Compression codec registry and the on-disk compressed-blob framing.
//!
//! A compressed file is a [`CompressHeader`] followed by a codec-specific
//! payload. The header is written once with `compressed_size = 0`, the
//! payload is streamed after it, and the header is then rewritten in place
//! with the true size — the size is not known until the transform
//! completes, so the output must be seekable.
//!
//! Decoding is driven by the header's algorithm tag, but
//! [`decompress_file`] additionally requires the caller's expected
//! algorithm to match the tag. Restore relies on that: it tries the
//! algorithms in a fixed order and lets the mismatch error move the trial
//! along.
//!
//! # Endianness
//! All header fields are little-endian. Codec payloads define their own
//! layouts; see `huffman.rs` and `lz77.rs`.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use thiserror::Error;

pub mod huffman;
pub mod lz77;

pub use huffman::HuffmanCodec;
pub use lz77::Lz77Codec;

pub const COMPRESS_MAGIC: &[u8; 4] = b"COMP";
pub const COMPRESS_VERSION: u32 = 1;

/// Byte length of the serialized [`CompressHeader`].
pub const COMPRESS_HEADER_LEN: u64 = 4 + 4 + 4 + 8 + 8;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Invalid compressed-blob magic")]
    InvalidMagic,
    #[error("Unsupported compressed-blob version: {0}")]
    UnsupportedVersion(u32),
    #[error("Unknown compression algorithm tag: {0}")]
    UnknownAlgorithm(u32),
    #[error("Blob compressed with {found}, expected {expected}")]
    AlgorithmMismatch { expected: &'static str, found: &'static str },
    #[error("Corrupt compressed payload: {0}")]
    Corrupt(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── CodecId ──────────────────────────────────────────────────────────────────

/// Runtime codec discriminant; the value is the header's algorithm tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CodecId {
    /// Payload stored verbatim.
    None    = 0,
    Huffman = 1,
    Lz77    = 2,
}

impl CodecId {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            0 => Some(CodecId::None),
            1 => Some(CodecId::Huffman),
            2 => Some(CodecId::Lz77),
            _ => None,
        }
    }

    /// Human-readable name (diagnostics and CLI parsing — never written to
    /// disk).
    pub fn name(self) -> &'static str {
        match self {
            CodecId::None    => "none",
            CodecId::Huffman => "huffman",
            CodecId::Lz77    => "lz77",
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none"             => Some(CodecId::None),
            "huffman" | "haff" => Some(CodecId::Huffman),
            "lz77"             => Some(CodecId::Lz77),
            _                  => None,
        }
    }
}

// ── CompressHeader ───────────────────────────────────────────────────────────

/// Framing header in front of every compressed payload.
#[derive(Debug, Clone)]
pub struct CompressHeader {
    pub magic:           [u8; 4],
    pub version:         u32,
    pub algorithm:       u32,
    pub original_size:   u64,
    pub compressed_size: u64,
}

impl CompressHeader {
    pub fn new(algorithm: CodecId, original_size: u64) -> Self {
        Self {
            magic: *COMPRESS_MAGIC,
            version: COMPRESS_VERSION,
            algorithm: algorithm as u32,
            original_size,
            compressed_size: 0,
        }
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.magic)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_u32::<LittleEndian>(self.algorithm)?;
        writer.write_u64::<LittleEndian>(self.original_size)?;
        writer.write_u64::<LittleEndian>(self.compressed_size)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self, CodecError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(|_| CodecError::InvalidMagic)?;
        if &magic != COMPRESS_MAGIC {
            return Err(CodecError::InvalidMagic);
        }
        let version = reader.read_u32::<LittleEndian>()?;
        if version != COMPRESS_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let algorithm = reader.read_u32::<LittleEndian>()?;
        let original_size = reader.read_u64::<LittleEndian>()?;
        let compressed_size = reader.read_u64::<LittleEndian>()?;
        Ok(Self { magic, version, algorithm, original_size, compressed_size })
    }
}

// ── Codec trait ──────────────────────────────────────────────────────────────

/// Seekable input stream; compression passes over its input twice.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

pub trait Codec: Send + Sync {
    fn id(&self) -> CodecId;

    /// Transform the whole of `input` (from its current position) into the
    /// codec payload on `output`.
    fn compress(&self, input: &mut dyn ReadSeek, output: &mut dyn Write)
        -> Result<(), CodecError>;

    /// Inverse transform. `original_size` comes from the surrounding
    /// header — the payload alone does not delimit itself.
    fn decompress(
        &self,
        input:         &mut dyn Read,
        output:        &mut dyn Write,
        original_size: u64,
    ) -> Result<(), CodecError>;
}

/// Pass-through codec for algorithm tag 0.
pub struct StoredCodec;

impl Codec for StoredCodec {
    fn id(&self) -> CodecId {
        CodecId::None
    }

    fn compress(&self, input: &mut dyn ReadSeek, output: &mut dyn Write)
        -> Result<(), CodecError>
    {
        let mut buf = [0u8; 4096];
        loop {
            let n = input.read(&mut buf)?;
            if n == 0 {
                break;
            }
            output.write_all(&buf[..n])?;
        }
        Ok(())
    }

    fn decompress(
        &self,
        input:          &mut dyn Read,
        output:         &mut dyn Write,
        _original_size: u64,
    ) -> Result<(), CodecError> {
        io::copy(input, output)?;
        Ok(())
    }
}

/// Resolve a [`CodecId`] to its implementation.
pub fn get_codec(id: CodecId) -> Box<dyn Codec> {
    match id {
        CodecId::None    => Box::new(StoredCodec),
        CodecId::Huffman => Box::new(HuffmanCodec),
        CodecId::Lz77    => Box::new(Lz77Codec),
    }
}

// ── File-level operations ────────────────────────────────────────────────────

/// Compress `input_path` into `output_path` with `algorithm`, framed by a
/// [`CompressHeader`]. The compressed size is patched into the header once
/// the payload is on disk.
pub fn compress_file(
    input_path:  &Path,
    output_path: &Path,
    algorithm:   CodecId,
) -> Result<(), CodecError> {
    let input = File::open(input_path)?;
    let original_size = input.metadata()?.len();
    let mut reader = BufReader::new(input);

    let mut output = File::create(output_path)?;
    let mut header = CompressHeader::new(algorithm, original_size);
    header.write(&mut output)?;

    {
        let mut writer = BufWriter::new(&mut output);
        get_codec(algorithm).compress(&mut reader, &mut writer)?;
        writer.flush()?;
    }

    let end = output.stream_position()?;
    header.compressed_size = end - COMPRESS_HEADER_LEN;
    output.seek(SeekFrom::Start(0))?;
    header.write(&mut output)?;

    debug!(
        "compressed {:?} with {}: {} -> {} bytes",
        input_path,
        algorithm.name(),
        original_size,
        header.compressed_size
    );
    Ok(())
}

/// Decompress `input_path` into `output_path`, requiring its header to
/// carry `expected` as the algorithm tag.
pub fn decompress_file(
    input_path:  &Path,
    output_path: &Path,
    expected:    CodecId,
) -> Result<(), CodecError> {
    let mut reader = BufReader::new(File::open(input_path)?);
    let header = CompressHeader::read(&mut reader)?;
    let algorithm = CodecId::from_u32(header.algorithm)
        .ok_or(CodecError::UnknownAlgorithm(header.algorithm))?;
    if algorithm != expected {
        return Err(CodecError::AlgorithmMismatch {
            expected: expected.name(),
            found:    algorithm.name(),
        });
    }

    let mut writer = BufWriter::new(File::create(output_path)?);
    get_codec(algorithm).decompress(&mut reader, &mut writer, header.original_size)?;
    writer.flush()?;
    debug!("decompressed {:?} with {}", input_path, algorithm.name());
    Ok(())
}

// ── In-memory helpers ────────────────────────────────────────────────────────

/// Payload-level compression of a byte slice (no header framing).
pub fn compress_bytes(id: CodecId, data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut input = io::Cursor::new(data);
    let mut output = Vec::new();
    get_codec(id).compress(&mut input, &mut output)?;
    Ok(output)
}

/// Payload-level decompression of a byte slice (no header framing).
pub fn decompress_bytes(
    id:            CodecId,
    data:          &[u8],
    original_size: u64,
) -> Result<Vec<u8>, CodecError> {
    let mut input = io::Cursor::new(data);
    let mut output = Vec::new();
    get_codec(id).decompress(&mut input, &mut output, original_size)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let mut header = CompressHeader::new(CodecId::Lz77, 12345);
        header.compressed_size = 678;
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, COMPRESS_HEADER_LEN);

        let parsed = CompressHeader::read(&buf[..]).unwrap();
        assert_eq!(parsed.algorithm, CodecId::Lz77 as u32);
        assert_eq!(parsed.original_size, 12345);
        assert_eq!(parsed.compressed_size, 678);
    }

    #[test]
    fn foreign_magic_rejected() {
        let buf = b"ENCRxxxxxxxxxxxxxxxxxxxxxxxx".to_vec();
        assert!(matches!(CompressHeader::read(&buf[..]), Err(CodecError::InvalidMagic)));
    }

    #[test]
    fn mismatched_algorithm_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain");
        let packed = dir.path().join("packed");
        let out = dir.path().join("out");
        std::fs::write(&plain, b"some bytes to squeeze, some bytes to squeeze").unwrap();

        compress_file(&plain, &packed, CodecId::Huffman).unwrap();
        let err = decompress_file(&packed, &out, CodecId::Lz77).unwrap_err();
        assert!(matches!(err, CodecError::AlgorithmMismatch { .. }));
        decompress_file(&packed, &out, CodecId::Huffman).unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), std::fs::read(&plain).unwrap());
    }

    #[test]
    fn compressed_size_is_patched() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain");
        let packed = dir.path().join("packed");
        std::fs::write(&plain, vec![b'x'; 4096]).unwrap();

        compress_file(&plain, &packed, CodecId::Lz77).unwrap();
        let bytes = std::fs::read(&packed).unwrap();
        let header = CompressHeader::read(&bytes[..]).unwrap();
        assert_eq!(header.original_size, 4096);
        assert_eq!(header.compressed_size, bytes.len() as u64 - COMPRESS_HEADER_LEN);
        assert!(header.compressed_size > 0);
    }
}
