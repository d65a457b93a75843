//! The archive pipeline: Container → Compression → Encryption on backup,
//! and the inverse with stage auto-detection on restore.
//!
//! Backup stages write `archive.pack`, `archive.pack.cmp` and
//! `archive.pack.enc` in the target directory; each stage that succeeds
//! deletes its input file, and the last stage's output is renamed to the
//! final archive name. A failure at any stage aborts the rest, cleans up
//! the stage files, and surfaces the first error verbatim — no retries,
//! no partial-success bookkeeping.
//!
//! Restore has no record of which stages ran, so each layer identifies
//! itself: encryption by the `"ENCR"` magic, compression by trying LZ77
//! then Huffman (falling back to "not compressed"), and the container by
//! trying tar, then zip, then the native format. Every reader fails fast
//! on a magic mismatch, which is what makes the trials safe.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use log::{debug, info, warn};
use thiserror::Error;

use crate::codec::{self, CodecError, CodecId};
use crate::container::{self, ContainerFormat, PackError};
use crate::crypto::{self, CipherId, CryptoError};
use crate::filter::FilterOptions;
use crate::metadata;
use crate::record::FileKind;
use crate::traverse;

/// Output name used when the caller does not pick one.
pub const DEFAULT_ARCHIVE_NAME: &str = "backup.pack";

const STAGE_PACK: &str = "archive.pack";
const STAGE_COMPRESS: &str = "archive.pack.cmp";
const STAGE_ENCRYPT: &str = "archive.pack.enc";

const RESTORE_DECRYPT_TMP: &str = "restore_decrypt.tmp";
const RESTORE_DECOMPRESS_TMP: &str = "restore_uncompress.tmp";

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(&'static str),
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
    #[error("No files selected for backup")]
    NoFilesSelected,
    #[error("Pack error: {0}")]
    Pack(#[from] PackError),
    #[error("Compression error: {0}")]
    Compression(#[from] CodecError),
    #[error("Encryption error: {0}")]
    Encryption(#[from] CryptoError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ── Options ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub source:      PathBuf,
    pub target_dir:  PathBuf,
    pub format:      ContainerFormat,
    /// `CodecId::None` skips the compression stage entirely.
    pub codec:       CodecId,
    /// `None` skips the encryption stage; `Some` requires a password.
    pub cipher:      Option<CipherId>,
    pub password:    Option<String>,
    pub filter:      FilterOptions,
    /// When false and the output name exists, a timestamped alternate
    /// name is used instead of overwriting.
    pub overwrite:   bool,
    pub output_name: Option<String>,
}

impl BackupOptions {
    pub fn new(source: impl Into<PathBuf>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            source:      source.into(),
            target_dir:  target_dir.into(),
            format:      ContainerFormat::Tar,
            codec:       CodecId::None,
            cipher:      None,
            password:    None,
            filter:      FilterOptions::default(),
            overwrite:   false,
            output_name: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RestoreOptions {
    pub archive:    PathBuf,
    pub target_dir: PathBuf,
    pub password:   Option<String>,
}

// ── Backup ───────────────────────────────────────────────────────────────────

struct StagePaths {
    pack:     PathBuf,
    compress: PathBuf,
    encrypt:  PathBuf,
}

impl StagePaths {
    fn in_dir(dir: &Path) -> Self {
        Self {
            pack:     dir.join(STAGE_PACK),
            compress: dir.join(STAGE_COMPRESS),
            encrypt:  dir.join(STAGE_ENCRYPT),
        }
    }

    fn cleanup(&self) {
        for path in [&self.pack, &self.compress, &self.encrypt] {
            if path.exists() {
                let _ = fs::remove_file(path);
            }
        }
    }
}

/// Pick the final archive path, honoring the overwrite policy.
fn resolve_output_path(dir: &Path, name: Option<&str>, overwrite: bool) -> PathBuf {
    let name = name.unwrap_or(DEFAULT_ARCHIVE_NAME);
    let path = dir.join(name);
    if overwrite || !path.exists() {
        return path;
    }

    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let named = Path::new(name);
    let alternate = match (named.file_stem(), named.extension()) {
        (Some(stem), Some(ext)) => {
            format!("{}-{}.{}", stem.to_string_lossy(), stamp, ext.to_string_lossy())
        }
        _ => format!("{}-{}", name, stamp),
    };
    info!("{} exists and overwrite is off; using {}", name, alternate);
    dir.join(alternate)
}

/// Run a full backup and return the path of the archive that was written.
pub fn backup(opts: &BackupOptions) -> Result<PathBuf, EngineError> {
    let password = match opts.cipher {
        Some(_) => match opts.password.as_deref() {
            Some(pw) if !pw.is_empty() => Some(pw),
            _ => return Err(EngineError::InvalidParameter("encryption requires a password")),
        },
        None => None,
    };
    if !opts.source.exists() {
        return Err(EngineError::PathNotFound(opts.source.clone()));
    }
    fs::create_dir_all(&opts.target_dir)?;

    let (root, records) = traverse::collect(&opts.source, &opts.filter)?;
    if records.is_empty() {
        return Err(EngineError::NoFilesSelected);
    }
    info!(
        "backing up {} entries from {:?} ({} container, {} codec)",
        records.len(),
        opts.source,
        opts.format.name(),
        opts.codec.name()
    );

    let stages = StagePaths::in_dir(&opts.target_dir);
    let final_path = resolve_output_path(
        &opts.target_dir,
        opts.output_name.as_deref(),
        opts.overwrite,
    );

    let result = (|| -> Result<(), EngineError> {
        {
            let mut writer = BufWriter::new(File::create(&stages.pack)?);
            container::pack(&mut writer, &root, &records, opts.format)?;
            writer.flush()?;
        }
        let mut current = stages.pack.clone();

        if opts.codec != CodecId::None {
            codec::compress_file(&current, &stages.compress, opts.codec)?;
            fs::remove_file(&current)?;
            current = stages.compress.clone();
        }

        if let Some(cipher) = opts.cipher {
            let pw = password.unwrap_or_default();
            crypto::encrypt_file(&current, &stages.encrypt, pw, cipher)?;
            fs::remove_file(&current)?;
            current = stages.encrypt.clone();
        }

        fs::rename(&current, &final_path)?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            info!("backup written to {:?}", final_path);
            Ok(final_path)
        }
        Err(e) => {
            stages.cleanup();
            Err(e)
        }
    }
}

// ── Restore ──────────────────────────────────────────────────────────────────

/// Restore an archive into `target_dir`, auto-detecting each stage.
pub fn restore(opts: &RestoreOptions) -> Result<(), EngineError> {
    if !opts.archive.exists() {
        return Err(EngineError::PathNotFound(opts.archive.clone()));
    }
    fs::create_dir_all(&opts.target_dir)?;

    let mut temps: Vec<PathBuf> = Vec::new();
    let result = run_restore(opts, &mut temps);
    for temp in temps {
        let _ = fs::remove_file(temp);
    }
    result
}

fn run_restore(opts: &RestoreOptions, temps: &mut Vec<PathBuf>) -> Result<(), EngineError> {
    let target = &opts.target_dir;
    let mut current = opts.archive.clone();

    // Stage 1: decryption, self-identified by the header magic.
    if crypto::is_encrypted(&current)? {
        let password = match opts.password.as_deref() {
            Some(pw) if !pw.is_empty() => pw,
            _ => return Err(EngineError::Encryption(CryptoError::MissingPassword)),
        };
        let decrypted = target.join(RESTORE_DECRYPT_TMP);
        crypto::decrypt_file(&current, &decrypted, password)?;
        temps.push(decrypted.clone());
        current = decrypted;
        debug!("archive decrypted");
    }

    // Stage 2: decompression, by trial. Whichever algorithm matches the
    // header wins; if neither does, the bytes are taken as uncompressed.
    let decompressed = target.join(RESTORE_DECOMPRESS_TMP);
    let mut matched = None;
    for candidate in [CodecId::Lz77, CodecId::Huffman] {
        match codec::decompress_file(&current, &decompressed, candidate) {
            Ok(()) => {
                matched = Some(candidate);
                break;
            }
            Err(e) => {
                debug!("{} trial: {}", candidate.name(), e);
                let _ = fs::remove_file(&decompressed);
            }
        }
    }
    match matched {
        Some(candidate) => {
            debug!("archive decompressed with {}", candidate.name());
            if current != opts.archive {
                let _ = fs::remove_file(&current);
                temps.retain(|t| t != &current);
            }
            temps.push(decompressed.clone());
            current = decompressed;
        }
        None => debug!("no compression layer detected"),
    }

    // Stage 3: container, by trial — tar first, then zip, then native.
    let mut reader = BufReader::new(File::open(&current)?);
    let mut entries = None;
    let mut last_err = PackError::InvalidMagic;
    for format in [ContainerFormat::Tar, ContainerFormat::Zip, ContainerFormat::Custom] {
        reader.seek(SeekFrom::Start(0))?;
        match container::unpack(&mut reader, format) {
            Ok(list) if !list.is_empty() => {
                info!("unpacked {} entries as {}", list.len(), format.name());
                entries = Some(list);
                break;
            }
            // Zero entries means the reader ran off foreign bytes (a short
            // zip looks like tar EOF) — treat it as a miss and keep trying.
            Ok(_) => debug!("{} trial: no entries", format.name()),
            Err(e) => {
                debug!("{} trial: {}", format.name(), e);
                last_err = e;
            }
        }
    }
    let entries = entries.ok_or(EngineError::Pack(last_err))?;
    drop(reader);

    // Materialize entries under the restore root.
    for (record, data) in &entries {
        if !record.has_safe_path() {
            return Err(EngineError::Pack(PackError::BadPath(record.path.clone())));
        }
        let dest = target.join(&record.path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        match record.kind {
            FileKind::Directory => fs::create_dir_all(&dest)?,
            FileKind::Symlink => restore_symlink(&dest, &record.symlink_target)?,
            _ => fs::write(&dest, data)?,
        }
        if let Err(e) = metadata::apply(&dest, record) {
            warn!("could not apply metadata to {:?}: {}", dest, e);
        }
    }

    info!("restored {} entries into {:?}", entries.len(), target);
    Ok(())
}

#[cfg(unix)]
fn restore_symlink(dest: &Path, link_target: &str) -> Result<(), EngineError> {
    if dest.is_symlink() || dest.exists() {
        fs::remove_file(dest)?;
    }
    std::os::unix::fs::symlink(link_target, dest)?;
    Ok(())
}

#[cfg(not(unix))]
fn restore_symlink(dest: &Path, _link_target: &str) -> Result<(), EngineError> {
    warn!("skipping symlink {:?}: unsupported on this platform", dest);
    Ok(())
}
