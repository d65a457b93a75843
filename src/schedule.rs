//! Periodic backups on a background thread.
//!
//! The thread owns its own copy of the job definition and is stopped
//! through a channel acting as a cancellation token — there is no shared
//! mutable state and no global run flag. Each tick invokes the regular
//! [`crate::pipeline::backup`] entry point and then, when configured,
//! the retention sweep.

use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cleanup::{self, RetentionPolicy};
use crate::codec::CodecId;
use crate::container::ContainerFormat;
use crate::crypto::CipherId;
use crate::filter::FilterOptions;
use crate::pipeline::{backup, BackupOptions, EngineError};

/// A persistable periodic-backup definition.
///
/// Format, codec and cipher are carried by name so the JSON stays
/// readable and stable; they resolve through the same parsers the CLI
/// uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleJob {
    pub id:            Uuid,
    pub interval_secs: u64,
    pub source:        PathBuf,
    pub target_dir:    PathBuf,
    pub format:        String,
    pub codec:         String,
    #[serde(default)]
    pub cipher:        Option<String>,
    #[serde(default)]
    pub password:      Option<String>,
    #[serde(default)]
    pub retention:     RetentionPolicy,
}

impl ScheduleJob {
    pub fn new(source: impl Into<PathBuf>, target_dir: impl Into<PathBuf>, interval_secs: u64) -> Self {
        Self {
            id:            Uuid::new_v4(),
            interval_secs,
            source:        source.into(),
            target_dir:    target_dir.into(),
            format:        ContainerFormat::Tar.name().to_owned(),
            codec:         CodecId::None.name().to_owned(),
            cipher:        None,
            password:      None,
            retention:     RetentionPolicy::default(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Resolve the name-keyed fields into concrete pipeline options.
    pub fn backup_options(&self) -> Result<BackupOptions, EngineError> {
        let format = ContainerFormat::from_name(&self.format)
            .ok_or(EngineError::InvalidParameter("unknown container format"))?;
        let codec = CodecId::from_name(&self.codec)
            .ok_or(EngineError::InvalidParameter("unknown compression codec"))?;
        let cipher = match &self.cipher {
            Some(name) => Some(
                CipherId::from_name(name)
                    .ok_or(EngineError::InvalidParameter("unknown cipher"))?,
            ),
            None => None,
        };
        Ok(BackupOptions {
            source:      self.source.clone(),
            target_dir:  self.target_dir.clone(),
            format,
            codec,
            cipher,
            password:    self.password.clone(),
            filter:      FilterOptions::default(),
            overwrite:   false,
            output_name: None,
        })
    }
}

/// Handle to a running periodic-backup thread.
pub struct Scheduler {
    stop:   Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn the background thread. The first backup runs after one full
    /// interval, matching a timer that was just armed.
    pub fn start(job: ScheduleJob) -> Result<Self, EngineError> {
        // Resolve once up front so a bad job fails here, not in the thread.
        job.backup_options()?;

        let (stop, ticks) = bounded::<()>(1);
        let handle = thread::spawn(move || {
            let interval = Duration::from_secs(job.interval_secs.max(1));
            info!("schedule {}: every {:?}, source {:?}", job.id, interval, job.source);
            loop {
                match ticks.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => run_once(&job),
                }
            }
            info!("schedule {}: stopped", job.id);
        });

        Ok(Self { stop, handle: Some(handle) })
    }

    /// Signal the thread and wait for it to exit.
    pub fn stop(mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Block until the scheduler is stopped from elsewhere (or forever).
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Dropping the handle stops the thread; stop()/join() already took
        // the JoinHandle in the explicit paths.
        let _ = self.stop.send(());
    }
}

fn run_once(job: &ScheduleJob) {
    let opts = match job.backup_options() {
        Ok(opts) => opts,
        Err(e) => {
            error!("schedule {}: bad job definition: {}", job.id, e);
            return;
        }
    };
    match backup(&opts) {
        Ok(path) => info!("schedule {}: wrote {:?}", job.id, path),
        Err(e) => warn!("schedule {}: backup failed: {}", job.id, e),
    }
    if job.retention.is_enabled() {
        match cleanup::prune(&job.target_dir, &job.retention) {
            Ok(n) if n > 0 => info!("schedule {}: pruned {} old archives", job.id, n),
            Ok(_) => {}
            Err(e) => warn!("schedule {}: retention sweep failed: {}", job.id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_json_roundtrip() {
        let mut job = ScheduleJob::new("/data", "/backups", 3600);
        job.codec = "huffman".into();
        job.retention.max_count = Some(5);

        let bytes = job.to_bytes().unwrap();
        let parsed = ScheduleJob::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.id, job.id);
        assert_eq!(parsed.interval_secs, 3600);
        assert_eq!(parsed.codec, "huffman");
        assert_eq!(parsed.retention.max_count, Some(5));
    }

    #[test]
    fn bad_job_is_rejected_at_start() {
        let mut job = ScheduleJob::new("/data", "/backups", 60);
        job.format = "rar".into();
        assert!(matches!(
            Scheduler::start(job),
            Err(EngineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn scheduler_runs_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir(&src).unwrap();
        std::fs::write(src.join("file.txt"), b"tick").unwrap();

        let mut job = ScheduleJob::new(&src, dir.path().join("out"), 1);
        job.format = "custom".into();
        let scheduler = Scheduler::start(job).unwrap();
        std::thread::sleep(Duration::from_millis(1500));
        scheduler.stop();

        let produced: Vec<_> = std::fs::read_dir(dir.path().join("out"))
            .unwrap()
            .collect();
        assert!(!produced.is_empty());
    }
}
