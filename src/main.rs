use clap::{Parser, Subcommand};
use packvault::cleanup::{prune, RetentionPolicy};
use packvault::filter::FilterOptions;
use packvault::pipeline::{backup, restore, BackupOptions, RestoreOptions};
use packvault::schedule::{ScheduleJob, Scheduler};
use packvault::{CipherId, CodecId, ContainerFormat};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "packvault", about = "Point-in-time file-tree archiver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive a file tree into a single backup file
    Backup {
        /// Directory or file to archive
        source: PathBuf,
        /// Directory the archive is written into
        #[arg(short, long)]
        target: PathBuf,
        /// Container: tar (default), zip, custom
        #[arg(short, long, default_value = "tar")]
        format: String,
        /// Compression: none (default), huffman, lz77
        #[arg(short, long, default_value = "none")]
        codec: String,
        /// Encrypt the archive with this password
        #[arg(short, long)]
        password: Option<String>,
        /// Cipher when encrypting: aes-cbc (default), aes-gcm
        #[arg(long, default_value = "aes-cbc")]
        cipher: String,
        /// Overwrite an existing archive instead of picking a new name
        #[arg(long)]
        overwrite: bool,
        /// Archive file name (default backup.pack)
        #[arg(short, long)]
        output: Option<String>,
        /// Drop entries whose file name matches this regex
        #[arg(long)]
        exclude_name: Option<String>,
        /// Drop entries whose path contains this fragment (repeatable)
        #[arg(long)]
        exclude_dir: Vec<String>,
        /// Keep only entries of at least this many bytes
        #[arg(long)]
        min_size: Option<u64>,
        /// Keep only entries of at most this many bytes
        #[arg(long)]
        max_size: Option<u64>,
    },
    /// Restore a backup archive into a directory
    Restore {
        /// Archive produced by `backup`
        archive: PathBuf,
        #[arg(short = 'C', long, default_value = ".")]
        target: PathBuf,
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Run periodic backups until interrupted
    Schedule {
        /// Job definition JSON written by a previous `--save`
        #[arg(long, conflicts_with_all = ["source", "target"])]
        job: Option<PathBuf>,
        source: Option<PathBuf>,
        #[arg(short, long)]
        target: Option<PathBuf>,
        /// Minutes between backups
        #[arg(short, long, default_value = "60")]
        interval: u64,
        #[arg(short, long, default_value = "tar")]
        format: String,
        #[arg(short, long, default_value = "none")]
        codec: String,
        #[arg(short, long)]
        password: Option<String>,
        /// Delete archives older than this many days after each run
        #[arg(long)]
        keep_days: Option<u32>,
        /// Keep at most this many archives after each run
        #[arg(long)]
        max_count: Option<usize>,
        /// Write the job definition to this file and exit
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Apply a retention policy to a backup directory
    Cleanup {
        dir: PathBuf,
        #[arg(long)]
        keep_days: Option<u32>,
        #[arg(long)]
        max_count: Option<usize>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    match Cli::parse().command {

        // ── Backup ───────────────────────────────────────────────────────────
        Commands::Backup {
            source, target, format, codec, password, cipher, overwrite,
            output, exclude_name, exclude_dir, min_size, max_size,
        } => {
            let mut filter = FilterOptions::default();
            if let Some(pattern) = exclude_name {
                filter.exclude_name = Some(regex::Regex::new(&pattern)?);
            }
            filter.exclude_dirs = exclude_dir;
            if let Some(min) = min_size {
                filter.min_size = min;
            }
            filter.max_size = max_size;

            let opts = BackupOptions {
                source,
                target_dir: target,
                format: parse_format(&format)?,
                codec: parse_codec(&codec)?,
                cipher: password.as_ref().map(|_| parse_cipher(&cipher)).transpose()?,
                password,
                filter,
                overwrite,
                output_name: output,
            };
            let path = backup(&opts)?;
            println!("Created: {}", path.display());
        }

        // ── Restore ──────────────────────────────────────────────────────────
        Commands::Restore { archive, target, password } => {
            let opts = RestoreOptions { archive, target_dir: target.clone(), password };
            restore(&opts)?;
            println!("Restored to: {}", target.display());
        }

        // ── Schedule ─────────────────────────────────────────────────────────
        Commands::Schedule {
            job, source, target, interval, format, codec, password,
            keep_days, max_count, save,
        } => {
            let job = match job {
                Some(path) => ScheduleJob::from_bytes(&std::fs::read(path)?)?,
                None => {
                    let source = source.ok_or("schedule needs a source (or --job)")?;
                    let target = target.ok_or("schedule needs --target (or --job)")?;
                    let mut job = ScheduleJob::new(source, target, interval * 60);
                    job.format = format;
                    job.codec = codec;
                    if password.is_some() {
                        job.cipher = Some(CipherId::Aes256Cbc.name().to_owned());
                        job.password = password;
                    }
                    job.retention = RetentionPolicy { keep_days, max_count };
                    job
                }
            };

            if let Some(path) = save {
                std::fs::write(&path, job.to_bytes()?)?;
                println!("Saved job {}: {}", job.id, path.display());
                return Ok(());
            }

            println!("Scheduling job {} every {}s", job.id, job.interval_secs);
            Scheduler::start(job)?.join();
        }

        // ── Cleanup ──────────────────────────────────────────────────────────
        Commands::Cleanup { dir, keep_days, max_count } => {
            let deleted = prune(&dir, &RetentionPolicy { keep_days, max_count })?;
            println!("Deleted {} archive(s)", deleted);
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn parse_format(s: &str) -> Result<ContainerFormat, String> {
    ContainerFormat::from_name(s).ok_or_else(|| format!("unknown container format '{s}'"))
}

fn parse_codec(s: &str) -> Result<CodecId, String> {
    CodecId::from_name(s).ok_or_else(|| format!("unknown codec '{s}'"))
}

fn parse_cipher(s: &str) -> Result<CipherId, String> {
    CipherId::from_name(s).ok_or_else(|| format!("unknown cipher '{s}'"))
}
