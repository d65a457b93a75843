//! LZ77 codec with a 4096-byte sliding window.
//!
//! Token stream, after the surrounding [`CompressHeader`]:
//!
//! ```text
//! high bit 0: literal — the byte itself
//! high bit 1: match  — length in the low 7 bits (3..=18),
//!             followed by a little-endian u16 offset into the window
//! ```
//!
//! Matching is greedy longest-match over the window, earliest candidate
//! wins ties, and a match source never extends past the current position.
//!
//! # Format hazard
//! A literal byte ≥ 0x80 carries the match-token high bit and is emitted
//! unescaped, exactly as the archives this codec must stay compatible
//! with. Such input can decode incorrectly; round-trip is guaranteed only
//! for bytes < 0x80. The decoder's offset and size validation turns most
//! misreads into [`CodecError::Corrupt`] instead of silent garbage.

use std::io::{ErrorKind, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{Codec, CodecError, CodecId, ReadSeek};

pub const WINDOW_SIZE: usize = 4096;
pub const MIN_MATCH: usize = 3;
pub const MAX_MATCH: usize = 18;

/// Decoder-side sliding window.
struct Window {
    buf:  [u8; WINDOW_SIZE],
    pos:  usize,
    fill: usize,
}

impl Window {
    fn new() -> Self {
        Self { buf: [0u8; WINDOW_SIZE], pos: 0, fill: 0 }
    }

    fn push(&mut self, byte: u8) {
        self.buf[self.pos] = byte;
        self.pos = (self.pos + 1) % WINDOW_SIZE;
        if self.fill < WINDOW_SIZE {
            self.fill += 1;
        }
    }
}

pub struct Lz77Codec;

impl Codec for Lz77Codec {
    fn id(&self) -> CodecId {
        CodecId::Lz77
    }

    fn compress(&self, input: &mut dyn ReadSeek, output: &mut dyn Write)
        -> Result<(), CodecError>
    {
        let mut data = Vec::new();
        input.read_to_end(&mut data)?;

        let mut pos = 0usize;
        while pos < data.len() {
            let window_start = pos.saturating_sub(WINDOW_SIZE);
            let mut best_len = 0usize;
            let mut best_offset = 0usize;

            for candidate in window_start..pos {
                let mut len = 0usize;
                while pos + len < data.len()
                    && candidate + len < pos
                    && data[candidate + len] == data[pos + len]
                    && len < MAX_MATCH
                {
                    len += 1;
                }
                if len >= MIN_MATCH && len > best_len {
                    best_len = len;
                    best_offset = pos - candidate;
                }
            }

            if best_len >= MIN_MATCH {
                output.write_u8(0x80 | (best_len as u8 & 0x7F))?;
                output.write_u16::<LittleEndian>(best_offset as u16)?;
                pos += best_len;
            } else {
                // Literal, emitted verbatim — including bytes ≥ 0x80.
                output.write_u8(data[pos])?;
                pos += 1;
            }
        }
        Ok(())
    }

    fn decompress(
        &self,
        input:         &mut dyn Read,
        output:        &mut dyn Write,
        original_size: u64,
    ) -> Result<(), CodecError> {
        let mut window = Window::new();
        let mut written = 0u64;

        loop {
            let token = match input.read_u8() {
                Ok(token) => token,
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };

            if token & 0x80 == 0 {
                output.write_all(&[token])?;
                window.push(token);
                written += 1;
            } else {
                let length = (token & 0x7F) as usize;
                let offset = match input.read_u16::<LittleEndian>() {
                    Ok(offset) => offset as usize,
                    Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                        return Err(CodecError::Corrupt("truncated match token"));
                    }
                    Err(e) => return Err(e.into()),
                };
                if offset == 0 || offset > window.fill {
                    return Err(CodecError::Corrupt("invalid match offset"));
                }

                let mut match_pos = (window.pos + WINDOW_SIZE - offset) % WINDOW_SIZE;
                for _ in 0..length {
                    let byte = window.buf[match_pos];
                    output.write_all(&[byte])?;
                    window.push(byte);
                    match_pos = (match_pos + 1) % WINDOW_SIZE;
                    written += 1;
                }
            }

            if written > original_size {
                return Err(CodecError::Corrupt("output exceeds declared size"));
            }
        }

        if written != original_size {
            return Err(CodecError::Corrupt("decoded size mismatch"));
        }
        Ok(())
    }
}
