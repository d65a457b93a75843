//! Attribute-based selection of traversal entries.
//!
//! Every predicate must pass for a record to be kept; an empty
//! [`FilterOptions`] keeps everything.

use regex::Regex;

use crate::record::{FileRecord, KIND_MASK_ALL};

/// Inclusive `[start, end]` bound on a Unix-seconds timestamp.
#[derive(Debug, Clone, Copy)]
pub struct TimeRange {
    pub start: i64,
    pub end:   i64,
}

impl TimeRange {
    fn contains(&self, t: i64) -> bool {
        t >= self.start && t <= self.end
    }
}

#[derive(Debug, Clone)]
pub struct FilterOptions {
    /// Bitwise OR of [`crate::record::FileKind`] discriminants to keep.
    pub kind_mask:    u32,
    pub create_time:  Option<TimeRange>,
    pub modify_time:  Option<TimeRange>,
    pub access_time:  Option<TimeRange>,
    pub min_size:     u64,
    /// `None` means unbounded.
    pub max_size:     Option<u64>,
    pub exclude_uids: Vec<u32>,
    pub exclude_gids: Vec<u32>,
    /// Entries whose file name matches are dropped.
    pub exclude_name: Option<Regex>,
    /// Entries whose path contains any of these fragments are dropped.
    pub exclude_dirs: Vec<String>,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            kind_mask:    KIND_MASK_ALL,
            create_time:  None,
            modify_time:  None,
            access_time:  None,
            min_size:     0,
            max_size:     None,
            exclude_uids: Vec::new(),
            exclude_gids: Vec::new(),
            exclude_name: None,
            exclude_dirs: Vec::new(),
        }
    }
}

/// The filter predicate: true when `record` survives every rule.
pub fn matches(record: &FileRecord, opts: &FilterOptions) -> bool {
    if !record.kind.matches_mask(opts.kind_mask) {
        return false;
    }

    if let Some(range) = opts.create_time {
        if !range.contains(record.create_time) {
            return false;
        }
    }
    if let Some(range) = opts.modify_time {
        if !range.contains(record.modify_time) {
            return false;
        }
    }
    if let Some(range) = opts.access_time {
        if !range.contains(record.access_time) {
            return false;
        }
    }

    if record.size < opts.min_size {
        return false;
    }
    if let Some(max) = opts.max_size {
        if record.size > max {
            return false;
        }
    }

    if opts.exclude_uids.contains(&record.uid) || opts.exclude_gids.contains(&record.gid) {
        return false;
    }

    if let Some(pattern) = &opts.exclude_name {
        if pattern.is_match(&record.name) {
            return false;
        }
    }

    if opts.exclude_dirs.iter().any(|dir| record.path.contains(dir.as_str())) {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FileKind, FileRecord};

    fn sample() -> FileRecord {
        let mut r = FileRecord::synthetic("logs/app.log", 2048);
        r.modify_time = 1_000_000;
        r.uid = 1000;
        r.gid = 1000;
        r
    }

    #[test]
    fn default_keeps_everything() {
        assert!(matches(&sample(), &FilterOptions::default()));
    }

    #[test]
    fn kind_mask_filters() {
        let opts = FilterOptions { kind_mask: FileKind::Directory as u32, ..Default::default() };
        assert!(!matches(&sample(), &opts));
    }

    #[test]
    fn time_range_filters() {
        let keep = FilterOptions {
            modify_time: Some(TimeRange { start: 0, end: 2_000_000 }),
            ..Default::default()
        };
        let drop = FilterOptions {
            modify_time: Some(TimeRange { start: 2_000_000, end: 3_000_000 }),
            ..Default::default()
        };
        assert!(matches(&sample(), &keep));
        assert!(!matches(&sample(), &drop));
    }

    #[test]
    fn size_range_filters() {
        let opts = FilterOptions { min_size: 4096, ..Default::default() };
        assert!(!matches(&sample(), &opts));
        let opts = FilterOptions { max_size: Some(1024), ..Default::default() };
        assert!(!matches(&sample(), &opts));
    }

    #[test]
    fn owner_exclusion() {
        let opts = FilterOptions { exclude_uids: vec![1000], ..Default::default() };
        assert!(!matches(&sample(), &opts));
        let opts = FilterOptions { exclude_gids: vec![999], ..Default::default() };
        assert!(matches(&sample(), &opts));
    }

    #[test]
    fn name_pattern_exclusion() {
        let opts = FilterOptions {
            exclude_name: Some(Regex::new(r"\.log$").unwrap()),
            ..Default::default()
        };
        assert!(!matches(&sample(), &opts));
    }

    #[test]
    fn directory_fragment_exclusion() {
        let opts = FilterOptions { exclude_dirs: vec!["logs".into()], ..Default::default() };
        assert!(!matches(&sample(), &opts));
    }
}
