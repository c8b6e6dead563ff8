// src/model.rs

use std::collections::BTreeMap;
use std::fmt;

/// Full hex id of a commit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitId(String);

impl CommitId {
    pub fn new(hex: impl Into<String>) -> Self {
        CommitId(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<git2::Oid> for CommitId {
    fn from(oid: git2::Oid) -> Self {
        CommitId(oid.to_string())
    }
}

/// Order in which commits reachable from HEAD are listed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Children always before their parents
    Topological,
    /// Newest commit time first
    Chronological,
}

/// A 1-based run of lines in one side of a diff.
///
/// A `count` of zero is an empty range; `start` then names the line just
/// before the insertion or deletion point, as in unified diff headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start: u32,
    pub count: u32,
}

impl LineRange {
    pub fn new(start: u32, count: u32) -> Self {
        LineRange { start, count }
    }

    pub fn lines(&self) -> impl Iterator<Item = u32> {
        let start = self.start;
        start..start.saturating_add(self.count)
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Correspondence between a changed range in the old and new revision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hunk {
    pub old: LineRange,
    pub new: LineRange,
}

/// HEAD line number -> commit that last touched the line
pub type BlameMap = BTreeMap<u32, CommitId>;

/// HEAD line number -> raw metric value (days, changes or rank)
pub type LineMap = BTreeMap<u32, u32>;

/// A commit that modified a file, with the path the file had there
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRevision {
    pub commit: CommitId,
    pub path: String,
}

/// A source line as seen by the debug info of a compiled block
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceLine {
    pub path: String,
    pub line: u32,
}

impl SourceLine {
    pub fn new(path: impl Into<String>, line: u32) -> Self {
        SourceLine {
            path: path.into(),
            line,
        }
    }
}

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Repository-wide facts every metric is measured against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryProfile {
    pub head: CommitId,
    pub head_time: i64,
    /// Commit time of the oldest commit reachable from HEAD
    pub first_time: i64,
    pub commit_count: u32,
}

impl HistoryProfile {
    pub fn is_one_commit(&self) -> bool {
        self.commit_count <= 1
    }

    pub fn head_day(&self) -> i64 {
        day_of(self.head_time)
    }

    /// Lifetime of the repository in days
    pub fn max_days(&self) -> u32 {
        let span = self.head_day() - day_of(self.first_time);
        span.clamp(0, i64::from(u32::MAX)) as u32
    }
}

pub fn day_of(timestamp: i64) -> i64 {
    timestamp.div_euclid(SECONDS_PER_DAY)
}
