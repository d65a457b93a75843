//! Huffman codec over the byte alphabet.
//!
//! Payload layout, after the surrounding [`CompressHeader`]:
//!
//! ```text
//! entry_count:u16
//! entry_count × ( symbol:u8  frequency:u64 )   — non-zero buckets only
//! bit-packed codes, MSB-first, final byte zero-padded
//! ```
//!
//! The decoder rebuilds the identical tree from the frequency table and
//! stops after `original_size` decoded bytes; without that count the
//! trailing pad bits would be indistinguishable from real codes.
//!
//! The tree lives in an arena of nodes addressed by index, owned by the
//! single encode or decode call — nothing is shared or retained.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{Codec, CodecError, CodecId, ReadSeek};

const ALPHABET: usize = 256;

#[derive(Clone, Copy)]
enum Node {
    Leaf(u8),
    Internal { left: usize, right: usize },
}

struct Tree {
    arena: Vec<Node>,
    root:  usize,
}

/// Build the coding tree from a frequency table.
///
/// Returns `None` when the table is empty. A single-symbol table produces
/// a lone leaf; its code is defined as the single bit `0`.
fn build_tree(freq: &[u64; ALPHABET]) -> Option<Tree> {
    let mut arena = Vec::new();
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = BinaryHeap::new();

    for (symbol, &count) in freq.iter().enumerate() {
        if count > 0 {
            arena.push(Node::Leaf(symbol as u8));
            heap.push(Reverse((count, arena.len() - 1)));
        }
    }
    if heap.is_empty() {
        return None;
    }

    while heap.len() > 1 {
        let Reverse((left_freq, left)) = heap.pop().unwrap();
        let Reverse((right_freq, right)) = heap.pop().unwrap();
        arena.push(Node::Internal { left, right });
        heap.push(Reverse((left_freq + right_freq, arena.len() - 1)));
    }

    let Reverse((_, root)) = heap.pop().unwrap();
    Some(Tree { arena, root })
}

/// Walk the tree assigning `0` to left edges and `1` to right edges.
fn build_code_table(tree: &Tree) -> Vec<Vec<u8>> {
    fn walk(arena: &[Node], idx: usize, path: &mut Vec<u8>, codes: &mut [Vec<u8>]) {
        match arena[idx] {
            Node::Leaf(symbol) => codes[symbol as usize] = path.clone(),
            Node::Internal { left, right } => {
                path.push(0);
                walk(arena, left, path, codes);
                path.pop();
                path.push(1);
                walk(arena, right, path, codes);
                path.pop();
            }
        }
    }

    let mut codes = vec![Vec::new(); ALPHABET];
    if let Node::Leaf(symbol) = tree.arena[tree.root] {
        codes[symbol as usize] = vec![0];
    } else {
        let mut path = Vec::new();
        walk(&tree.arena, tree.root, &mut path, &mut codes);
    }
    codes
}

struct BitWriter<'a> {
    out:   &'a mut dyn Write,
    cur:   u8,
    nbits: u8,
}

impl<'a> BitWriter<'a> {
    fn new(out: &'a mut dyn Write) -> Self {
        Self { out, cur: 0, nbits: 0 }
    }

    fn push(&mut self, bit: u8) -> std::io::Result<()> {
        self.cur = (self.cur << 1) | (bit & 1);
        self.nbits += 1;
        if self.nbits == 8 {
            self.out.write_all(&[self.cur])?;
            self.cur = 0;
            self.nbits = 0;
        }
        Ok(())
    }

    /// Flush the final partial byte, padding with zero bits.
    fn finish(mut self) -> std::io::Result<()> {
        if self.nbits > 0 {
            self.cur <<= 8 - self.nbits;
            self.out.write_all(&[self.cur])?;
        }
        Ok(())
    }
}

pub struct HuffmanCodec;

impl Codec for HuffmanCodec {
    fn id(&self) -> CodecId {
        CodecId::Huffman
    }

    fn compress(&self, input: &mut dyn ReadSeek, output: &mut dyn Write)
        -> Result<(), CodecError>
    {
        // Pass 1: frequency table.
        let start = input.stream_position()?;
        let mut freq = [0u64; ALPHABET];
        let mut buf = [0u8; 4096];
        loop {
            let n = input.read(&mut buf)?;
            if n == 0 {
                break;
            }
            for &b in &buf[..n] {
                freq[b as usize] += 1;
            }
        }
        input.seek(SeekFrom::Start(start))?;

        let entries: Vec<(u8, u64)> = freq
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0)
            .map(|(symbol, &count)| (symbol as u8, count))
            .collect();
        output.write_u16::<LittleEndian>(entries.len() as u16)?;
        for &(symbol, count) in &entries {
            output.write_u8(symbol)?;
            output.write_u64::<LittleEndian>(count)?;
        }
        if entries.is_empty() {
            return Ok(());
        }

        let tree = match build_tree(&freq) {
            Some(tree) => tree,
            None => return Ok(()),
        };
        let codes = build_code_table(&tree);

        // Pass 2: emit codes.
        let mut bits = BitWriter::new(output);
        loop {
            let n = input.read(&mut buf)?;
            if n == 0 {
                break;
            }
            for &b in &buf[..n] {
                for &bit in &codes[b as usize] {
                    bits.push(bit)?;
                }
            }
        }
        bits.finish()?;
        Ok(())
    }

    fn decompress(
        &self,
        input:         &mut dyn Read,
        output:        &mut dyn Write,
        original_size: u64,
    ) -> Result<(), CodecError> {
        let count = input.read_u16::<LittleEndian>()? as usize;
        if count > ALPHABET {
            return Err(CodecError::Corrupt("frequency table entry count"));
        }
        let mut freq = [0u64; ALPHABET];
        for _ in 0..count {
            let symbol = input.read_u8()?;
            let f = input.read_u64::<LittleEndian>()?;
            if f == 0 {
                return Err(CodecError::Corrupt("zero-frequency table entry"));
            }
            freq[symbol as usize] = f;
        }

        if original_size == 0 {
            return Ok(());
        }
        let tree = build_tree(&freq).ok_or(CodecError::Corrupt("empty frequency table"))?;

        let single = match tree.arena[tree.root] {
            Node::Leaf(symbol) => Some(symbol),
            Node::Internal { .. } => None,
        };

        let mut written = 0u64;
        let mut node = tree.root;
        let mut buf = [0u8; 4096];
        'decode: loop {
            let n = input.read(&mut buf)?;
            if n == 0 {
                return Err(CodecError::Corrupt("truncated bit stream"));
            }
            for &byte in &buf[..n] {
                for shift in (0..8).rev() {
                    let bit = (byte >> shift) & 1;
                    if let Some(symbol) = single {
                        // One-leaf tree: every bit stands for the symbol.
                        output.write_all(&[symbol])?;
                        written += 1;
                    } else {
                        node = match tree.arena[node] {
                            Node::Internal { left, right } => {
                                if bit == 0 { left } else { right }
                            }
                            Node::Leaf(_) => unreachable!("walk restarts at the root"),
                        };
                        if let Node::Leaf(symbol) = tree.arena[node] {
                            output.write_all(&[symbol])?;
                            written += 1;
                            node = tree.root;
                        }
                    }
                    if written == original_size {
                        break 'decode;
                    }
                }
            }
        }
        Ok(())
    }
}
