//! Password-based archive encryption.
//!
//! Key derivation: PBKDF2-HMAC-SHA-256(password, salt, 100,000) → 32-byte
//! key. The salt and IV are generated fresh from the OS RNG for every
//! encryption and travel in the clear inside the [`EncryptHeader`] — they
//! are not secret; only the password is.
//!
//! Two ciphers share the header, selected by the algorithm tag:
//!
//! - **AES-256-CBC** (tag 1, default): the legacy wire format. Streamed in
//!   64 KiB chunks so memory use is independent of file size. PKCS#7
//!   padding, no authentication tag — tampering surfaces only as a padding
//!   failure, indistinguishable from a wrong password.
//! - **AES-256-GCM** (tag 2, opt-in): authenticated mode for new archives;
//!   the 12-byte nonce occupies the front of the header's IV field and the
//!   GCM tag rides at the end of the ciphertext.
//!
//! Derived keys are held in [`Zeroizing`] buffers and wiped on every exit
//! path.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::Aes256Gcm;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

pub const ENCRYPT_MAGIC: &[u8; 4] = b"ENCR";
pub const ENCRYPT_VERSION: u32 = 1;
pub const SALT_LEN: usize = 16;
pub const IV_LEN: usize = 16;
pub const KEY_LEN: usize = 32;
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Streaming chunk size; CBC memory use is bounded by this buffer.
pub const CHUNK_SIZE: usize = 64 * 1024;

const AES_BLOCK: usize = 16;
const GCM_NONCE_LEN: usize = 12;

/// Byte length of the serialized [`EncryptHeader`].
pub const ENCRYPT_HEADER_LEN: u64 = 4 + 4 + 4 + 8 + SALT_LEN as u64 + IV_LEN as u64 + 4;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid encrypted-blob magic")]
    InvalidMagic,
    #[error("Unsupported encrypted-blob version: {0}")]
    UnsupportedVersion(u32),
    #[error("Unknown cipher tag: {0}")]
    UnknownAlgorithm(u32),
    #[error("Encryption failed")]
    EncryptFailed,
    #[error("Decryption failed — wrong password or corrupted data")]
    DecryptFailed,
    #[error("Archive is encrypted but no password was provided")]
    MissingPassword,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── CipherId ─────────────────────────────────────────────────────────────────

/// Cipher discriminant; the value is the header's algorithm tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CipherId {
    Aes256Cbc = 1,
    Aes256Gcm = 2,
}

impl CipherId {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v {
            1 => Some(CipherId::Aes256Cbc),
            2 => Some(CipherId::Aes256Gcm),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CipherId::Aes256Cbc => "aes-256-cbc",
            CipherId::Aes256Gcm => "aes-256-gcm",
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "aes-256-cbc" | "aes-cbc" | "cbc" | "aes" => Some(CipherId::Aes256Cbc),
            "aes-256-gcm" | "aes-gcm" | "gcm"         => Some(CipherId::Aes256Gcm),
            _                                         => None,
        }
    }
}

// ── EncryptHeader ────────────────────────────────────────────────────────────

/// Clear-text framing in front of the ciphertext. Never covered by any
/// integrity check of its own.
#[derive(Debug, Clone)]
pub struct EncryptHeader {
    pub magic:         [u8; 4],
    pub version:       u32,
    pub algorithm:     u32,
    pub original_size: u64,
    pub salt:          [u8; SALT_LEN],
    pub iv:            [u8; IV_LEN],
    pub iterations:    u32,
}

impl EncryptHeader {
    /// Fresh header with random salt and IV.
    pub fn new(cipher: CipherId, original_size: u64) -> Self {
        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut iv);
        Self {
            magic: *ENCRYPT_MAGIC,
            version: ENCRYPT_VERSION,
            algorithm: cipher as u32,
            original_size,
            salt,
            iv,
            iterations: PBKDF2_ITERATIONS,
        }
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.magic)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_u32::<LittleEndian>(self.algorithm)?;
        writer.write_u64::<LittleEndian>(self.original_size)?;
        writer.write_all(&self.salt)?;
        writer.write_all(&self.iv)?;
        writer.write_u32::<LittleEndian>(self.iterations)?;
        Ok(())
    }

    pub fn read<R: Read>(mut reader: R) -> Result<Self, CryptoError> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(|_| CryptoError::InvalidMagic)?;
        if &magic != ENCRYPT_MAGIC {
            return Err(CryptoError::InvalidMagic);
        }
        let version = reader.read_u32::<LittleEndian>()?;
        if version != ENCRYPT_VERSION {
            return Err(CryptoError::UnsupportedVersion(version));
        }
        let algorithm = reader.read_u32::<LittleEndian>()?;
        let original_size = reader.read_u64::<LittleEndian>()?;
        let mut salt = [0u8; SALT_LEN];
        reader.read_exact(&mut salt)?;
        let mut iv = [0u8; IV_LEN];
        reader.read_exact(&mut iv)?;
        let iterations = reader.read_u32::<LittleEndian>()?;
        Ok(Self { magic, version, algorithm, original_size, salt, iv, iterations })
    }
}

// ── Key derivation ───────────────────────────────────────────────────────────

/// Derive the 256-bit key. The result self-wipes on drop.
pub fn derive_key(password: &str, salt: &[u8], iterations: u32) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, key.as_mut());
    key
}

/// Peek at the first four bytes of `path` to see whether it carries an
/// encrypted blob.
pub fn is_encrypted(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 4];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(&magic == ENCRYPT_MAGIC),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

// ── Streaming helpers ────────────────────────────────────────────────────────

/// Read up to `limit` bytes, stopping early only at EOF.
fn read_up_to<R: Read>(reader: &mut R, limit: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; limit];
    let mut filled = 0usize;
    while filled < limit {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

// ── File-level operations ────────────────────────────────────────────────────

/// Encrypt `input_path` into `output_path`. An empty password is rejected.
pub fn encrypt_file(
    input_path:  &Path,
    output_path: &Path,
    password:    &str,
    cipher:      CipherId,
) -> Result<(), CryptoError> {
    if password.is_empty() {
        return Err(CryptoError::MissingPassword);
    }

    let input = File::open(input_path)?;
    let original_size = input.metadata()?.len();
    let mut reader = BufReader::new(input);

    let header = EncryptHeader::new(cipher, original_size);
    let mut writer = BufWriter::new(File::create(output_path)?);
    header.write(&mut writer)?;

    let key = derive_key(password, &header.salt, header.iterations);
    match cipher {
        CipherId::Aes256Cbc => encrypt_cbc(&mut reader, &mut writer, &key, &header.iv)?,
        CipherId::Aes256Gcm => encrypt_gcm(&mut reader, &mut writer, &key, &header.iv)?,
    }
    writer.flush()?;
    debug!("encrypted {:?} with {} ({} bytes)", input_path, cipher.name(), original_size);
    Ok(())
}

/// Decrypt `output_path` from `input_path`. The cipher is taken from the
/// header's algorithm tag; the caller only supplies the password.
pub fn decrypt_file(
    input_path:  &Path,
    output_path: &Path,
    password:    &str,
) -> Result<(), CryptoError> {
    if password.is_empty() {
        return Err(CryptoError::MissingPassword);
    }

    let mut reader = BufReader::new(File::open(input_path)?);
    let header = EncryptHeader::read(&mut reader)?;
    let cipher = CipherId::from_u32(header.algorithm)
        .ok_or(CryptoError::UnknownAlgorithm(header.algorithm))?;

    let key = derive_key(password, &header.salt, header.iterations);
    let mut writer = BufWriter::new(File::create(output_path)?);
    match cipher {
        CipherId::Aes256Cbc => {
            decrypt_cbc(&mut reader, &mut writer, &key, &header.iv, header.original_size)?
        }
        CipherId::Aes256Gcm => {
            decrypt_gcm(&mut reader, &mut writer, &key, &header.iv, header.original_size)?
        }
    }
    writer.flush()?;
    debug!("decrypted {:?} with {}", input_path, cipher.name());
    Ok(())
}

// ── AES-256-CBC ──────────────────────────────────────────────────────────────

fn encrypt_cbc<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    key:    &[u8; KEY_LEN],
    iv:     &[u8; IV_LEN],
) -> Result<(), CryptoError> {
    let mut enc = cbc::Encryptor::<Aes256>::new_from_slices(key.as_slice(), iv)
        .map_err(|_| CryptoError::EncryptFailed)?;

    // Read one chunk ahead so the final (to-be-padded) chunk is known.
    let mut current = read_up_to(reader, CHUNK_SIZE)?;
    loop {
        let next = read_up_to(reader, CHUNK_SIZE)?;
        if next.is_empty() {
            let msg_len = current.len();
            current.resize(msg_len + AES_BLOCK - msg_len % AES_BLOCK, 0);
            let ciphertext = enc
                .encrypt_padded_mut::<Pkcs7>(&mut current, msg_len)
                .map_err(|_| CryptoError::EncryptFailed)?;
            writer.write_all(ciphertext)?;
            return Ok(());
        }

        // A full chunk is always block-aligned.
        for block in current.chunks_exact_mut(AES_BLOCK) {
            enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        writer.write_all(&current)?;
        current = next;
    }
}

fn decrypt_cbc<R: Read, W: Write>(
    reader:        &mut R,
    writer:        &mut W,
    key:           &[u8; KEY_LEN],
    iv:            &[u8; IV_LEN],
    original_size: u64,
) -> Result<(), CryptoError> {
    let mut dec = cbc::Decryptor::<Aes256>::new_from_slices(key.as_slice(), iv)
        .map_err(|_| CryptoError::DecryptFailed)?;

    let mut written = 0u64;
    let mut current = read_up_to(reader, CHUNK_SIZE)?;
    if current.is_empty() || current.len() % AES_BLOCK != 0 {
        return Err(CryptoError::DecryptFailed);
    }

    loop {
        let next = read_up_to(reader, CHUNK_SIZE)?;
        let last = next.is_empty();
        if !last && next.len() % AES_BLOCK != 0 {
            return Err(CryptoError::DecryptFailed);
        }

        for block in current.chunks_exact_mut(AES_BLOCK) {
            dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }

        if last {
            // PKCS#7: the final block's last byte is the pad length, and
            // every pad byte must repeat it.
            let pad = current[current.len() - 1] as usize;
            if pad == 0 || pad > AES_BLOCK {
                return Err(CryptoError::DecryptFailed);
            }
            let data_len = current.len() - pad;
            if current[data_len..].iter().any(|&b| b as usize != pad) {
                return Err(CryptoError::DecryptFailed);
            }
            writer.write_all(&current[..data_len])?;
            written += data_len as u64;
            if written != original_size {
                return Err(CryptoError::DecryptFailed);
            }
            return Ok(());
        }

        writer.write_all(&current)?;
        written += current.len() as u64;
        current = next;
    }
}

// ── AES-256-GCM ──────────────────────────────────────────────────────────────

fn encrypt_gcm<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    key:    &[u8; KEY_LEN],
    iv:     &[u8; IV_LEN],
) -> Result<(), CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_slice())
        .map_err(|_| CryptoError::EncryptFailed)?;
    let mut plaintext = Vec::new();
    reader.read_to_end(&mut plaintext)?;
    let nonce = aes_gcm::Nonce::from_slice(&iv[..GCM_NONCE_LEN]);
    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_slice())
        .map_err(|_| CryptoError::EncryptFailed)?;
    writer.write_all(&ciphertext)?;
    Ok(())
}

fn decrypt_gcm<R: Read, W: Write>(
    reader:        &mut R,
    writer:        &mut W,
    key:           &[u8; KEY_LEN],
    iv:            &[u8; IV_LEN],
    original_size: u64,
) -> Result<(), CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_slice())
        .map_err(|_| CryptoError::DecryptFailed)?;
    let mut ciphertext = Vec::new();
    reader.read_to_end(&mut ciphertext)?;
    let nonce = aes_gcm::Nonce::from_slice(&iv[..GCM_NONCE_LEN]);
    let plaintext = cipher
        .decrypt(nonce, ciphertext.as_slice())
        .map_err(|_| CryptoError::DecryptFailed)?;
    if plaintext.len() as u64 != original_size {
        return Err(CryptoError::DecryptFailed);
    }
    writer.write_all(&plaintext)?;
    Ok(())
}
