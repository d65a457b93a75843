//! Retention policy over a backup directory: drop archives past an age
//! limit and beyond a newest-N count.
//!
//! Individual deletions that fail are logged and skipped — a stuck file
//! must not block the rest of the sweep.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Delete archives whose modification time is older than this many
    /// days. `None` disables the age rule.
    pub keep_days: Option<u32>,
    /// Keep at most this many archives (newest first). `None` disables
    /// the count rule.
    pub max_count: Option<usize>,
}

impl RetentionPolicy {
    pub fn is_enabled(&self) -> bool {
        self.keep_days.is_some() || self.max_count.is_some()
    }
}

/// Apply `policy` to the plain files of `dir`. Returns the number of
/// files deleted.
pub fn prune(dir: &Path, policy: &RetentionPolicy) -> io::Result<usize> {
    if !policy.is_enabled() {
        return Ok(0);
    }

    let mut files: Vec<(PathBuf, SystemTime)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_file() {
            files.push((entry.path(), meta.modified()?));
        }
    }
    // Newest first.
    files.sort_by(|a, b| b.1.cmp(&a.1));

    let now = SystemTime::now();
    let mut doomed: Vec<&PathBuf> = Vec::new();

    if let Some(days) = policy.keep_days {
        let limit = Duration::from_secs(days as u64 * 24 * 60 * 60);
        for (path, modified) in &files {
            let age = now.duration_since(*modified).unwrap_or(Duration::ZERO);
            if age > limit {
                doomed.push(path);
            }
        }
    }
    if let Some(max) = policy.max_count {
        for (path, _) in files.iter().skip(max) {
            if !doomed.contains(&path) {
                doomed.push(path);
            }
        }
    }

    let mut deleted = 0usize;
    for path in doomed {
        match fs::remove_file(path) {
            Ok(()) => {
                info!("retention: deleted {:?}", path);
                deleted += 1;
            }
            Err(e) => warn!("retention: could not delete {:?}: {}", path, e),
        }
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_policy_deletes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("keep.pack"), b"x").unwrap();
        assert_eq!(prune(dir.path(), &RetentionPolicy::default()).unwrap(), 0);
        assert!(dir.path().join("keep.pack").exists());
    }

    #[test]
    fn count_rule_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..4 {
            let path = dir.path().join(format!("backup-{}.pack", i));
            std::fs::write(&path, b"x").unwrap();
            // Distinct, strictly increasing mtimes without sleeping.
            let file = std::fs::File::open(&path).unwrap();
            let t = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000 + i * 60);
            file.set_modified(t).unwrap();
        }

        let policy = RetentionPolicy { keep_days: None, max_count: Some(2) };
        assert_eq!(prune(dir.path(), &policy).unwrap(), 2);
        assert!(!dir.path().join("backup-0.pack").exists());
        assert!(!dir.path().join("backup-1.pack").exists());
        assert!(dir.path().join("backup-2.pack").exists());
        assert!(dir.path().join("backup-3.pack").exists());
    }

    #[test]
    fn age_rule_deletes_old_files() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("ancient.pack");
        let new = dir.path().join("recent.pack");
        std::fs::write(&old, b"x").unwrap();
        std::fs::write(&new, b"x").unwrap();
        let file = std::fs::File::open(&old).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(10 * 24 * 60 * 60))
            .unwrap();

        let policy = RetentionPolicy { keep_days: Some(7), max_count: None };
        assert_eq!(prune(dir.path(), &policy).unwrap(), 1);
        assert!(!old.exists());
        assert!(new.exists());
    }

    #[test]
    fn directories_are_untouched() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();
        let policy = RetentionPolicy { keep_days: Some(0), max_count: Some(0) };
        prune(dir.path(), &policy).unwrap();
        assert!(dir.path().join("subdir").exists());
    }
}
