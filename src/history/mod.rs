// src/history/mod.rs

pub mod command;
#[cfg(test)]
pub(crate) mod fake;
pub mod libgit2;
pub mod parse;

use crate::error::{HistoryError, HistoryResult};
use crate::model::{BlameMap, CommitId, FileRevision, Hunk, SortOrder};
use std::path::Path;
use std::str::FromStr;

pub use command::CommandHistory;
pub use libgit2::Libgit2History;

/// Id of the empty tree, standing in for the missing parent of a root commit
pub const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

pub type CommitIter<'a> = Box<dyn Iterator<Item = HistoryResult<CommitId>> + 'a>;

/// Read-only queries against one repository.
///
/// Revisions are anything the backend can resolve: full ids, `HEAD`, or
/// [`EMPTY_TREE`]. Paths are relative to the work tree root and use `/`.
pub trait HistoryAccessor {
    /// Work tree root
    fn root(&self) -> &Path;

    fn head(&self) -> HistoryResult<CommitId>;

    /// File content at a revision
    fn resolve(&self, revision: &str, path: &str) -> HistoryResult<Vec<u8>>;

    /// Commits reachable from HEAD. Every call starts a fresh walk.
    fn list_commits(&self, order: SortOrder) -> HistoryResult<CommitIter<'_>>;

    fn parents(&self, commit: &CommitId) -> HistoryResult<Vec<CommitId>>;

    /// Commit time in seconds since the epoch
    fn timestamp(&self, commit: &CommitId) -> HistoryResult<i64>;

    /// Line attribution of `path` at HEAD
    fn blame_head(&self, path: &str) -> HistoryResult<BlameMap>;

    /// Zero-context hunks turning `old` into `new` for one path.
    /// A path missing on one side diffs against an empty file.
    fn diff_lines(&self, old: &str, new: &str, path: &str) -> HistoryResult<Vec<Hunk>>;

    /// Number of commits reachable from HEAD
    fn commit_count(&self) -> HistoryResult<u32>;

    /// Number of commits reachable from `commit`, itself included
    fn count_up_to(&self, commit: &CommitId) -> HistoryResult<u32>;

    /// Up to `limit` non-merge commits that modified `path`, newest first.
    /// Where the backend detects a rename, older entries carry the previous
    /// path.
    fn file_history(&self, path: &str, limit: usize) -> HistoryResult<Vec<FileRevision>>;

    /// Every file path in the HEAD tree
    fn tracked_files(&self) -> HistoryResult<Vec<String>>;

    /// Smallest commit time reachable from HEAD. With clock skew or several
    /// roots this need not be the last commit of any walk.
    fn oldest_time(&self) -> HistoryResult<i64> {
        let mut oldest: Option<i64> = None;
        for commit in self.list_commits(SortOrder::Chronological)? {
            let time = self.timestamp(&commit?)?;
            oldest = Some(oldest.map_or(time, |seen| seen.min(time)));
        }
        oldest.ok_or_else(|| HistoryError::NotFound("commits reachable from HEAD".to_string()))
    }
}

/// Which implementation answers history queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Libgit2,
    Command,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "libgit2" | "git2" => Ok(Backend::Libgit2),
            "command" | "git" => Ok(Backend::Command),
            other => Err(format!("unknown history backend `{other}`")),
        }
    }
}

/// Open the repository enclosing `path` with the chosen backend
pub fn open_repository(path: &Path, backend: Backend) -> HistoryResult<Box<dyn HistoryAccessor>> {
    let repo: Box<dyn HistoryAccessor> = match backend {
        Backend::Libgit2 => Box::new(Libgit2History::discover(path)?),
        Backend::Command => Box::new(CommandHistory::discover(path)?),
    };
    log::debug!("opened repository at {}", repo.root().display());
    Ok(repo)
}

/// First parent of `commit`, or the empty tree for a root commit
pub fn parent_revision(parents: &[CommitId]) -> &str {
    parents.first().map(CommitId::as_str).unwrap_or(EMPTY_TREE)
}

pub(crate) fn not_found_in(path: &Path) -> HistoryError {
    HistoryError::RepositoryNotFound(path.to_path_buf())
}
