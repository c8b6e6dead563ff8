// src/metrics/mod.rs

pub mod age;
pub mod churn;
pub mod rank;

use crate::error::{HistoryError, HistoryResult};
use crate::history::HistoryAccessor;
use crate::model::{BlameMap, CommitId, HistoryProfile, LineMap};
use std::collections::HashMap;
use std::rc::Rc;

pub const DEFAULT_CHURN_LIMIT: usize = 1000;

type FileCache<T> = HashMap<String, Option<Rc<T>>>;

/// Per-commit facts that stay valid across files and passes over the same
/// repository
#[derive(Debug, Default)]
pub struct CommitMemo {
    times: HashMap<CommitId, i64>,
    ranks: HashMap<CommitId, u32>,
}

/// Read HEAD, commit count and the span of history in one go
pub fn load_profile(repo: &dyn HistoryAccessor) -> HistoryResult<HistoryProfile> {
    let head = repo.head()?;
    let head_time = repo.timestamp(&head)?;
    let commit_count = repo.commit_count()?;

    let first_time = if commit_count <= 1 {
        head_time
    } else {
        repo.oldest_time()?
    };

    Ok(HistoryProfile {
        head,
        head_time,
        first_time,
        commit_count,
    })
}

/// Per-line age, churn and rank of files at HEAD, memoized for the lifetime
/// of one pass.
///
/// Every query answers `None` when the file cannot be measured: single-commit
/// history, a path absent from HEAD, or a failed history query. Failures are
/// logged once per file and metric, since the result is cached either way.
pub struct LineMetrics<'r> {
    repo: &'r dyn HistoryAccessor,
    profile: HistoryProfile,
    churn_limit: usize,
    blames: FileCache<BlameMap>,
    ages: FileCache<LineMap>,
    churns: FileCache<LineMap>,
    ranks: FileCache<LineMap>,
    commits: CommitMemo,
}

impl<'r> LineMetrics<'r> {
    pub fn new(repo: &'r dyn HistoryAccessor, profile: HistoryProfile, churn_limit: usize) -> Self {
        Self::with_memo(repo, profile, churn_limit, CommitMemo::default())
    }

    /// Start from commit facts gathered by an earlier `LineMetrics`
    pub fn with_memo(
        repo: &'r dyn HistoryAccessor,
        profile: HistoryProfile,
        churn_limit: usize,
        commits: CommitMemo,
    ) -> Self {
        if profile.is_one_commit() {
            log::info!(
                "{}: single-commit history, no line metrics available",
                repo.root().display()
            );
        }
        LineMetrics {
            repo,
            profile,
            churn_limit: churn_limit.max(1),
            blames: HashMap::new(),
            ages: HashMap::new(),
            churns: HashMap::new(),
            ranks: HashMap::new(),
            commits,
        }
    }

    /// Drop the per-file caches, keeping what is known about commits
    pub fn into_memo(self) -> CommitMemo {
        self.commits
    }

    pub fn profile(&self) -> &HistoryProfile {
        &self.profile
    }

    /// Days since each line last changed
    pub fn age(&mut self, path: &str) -> Option<Rc<LineMap>> {
        if let Some(cached) = self.ages.get(path) {
            return cached.clone();
        }
        let measured = match self.blame(path) {
            Some(blame) => absorb(
                path,
                "age",
                age::line_ages(self.repo, &self.profile, &blame, &mut self.commits.times),
            ),
            None => None,
        };
        self.ages.insert(path.to_string(), measured.clone());
        measured
    }

    /// Commits ago each line last changed
    pub fn rank(&mut self, path: &str) -> Option<Rc<LineMap>> {
        if let Some(cached) = self.ranks.get(path) {
            return cached.clone();
        }
        let measured = match self.blame(path) {
            Some(blame) => absorb(
                path,
                "rank",
                rank::line_ranks(self.repo, &self.profile, &blame, &mut self.commits.ranks),
            ),
            None => None,
        };
        self.ranks.insert(path.to_string(), measured.clone());
        measured
    }

    /// Number of changes traceable to each line
    pub fn churn(&mut self, path: &str) -> Option<Rc<LineMap>> {
        if let Some(cached) = self.churns.get(path) {
            return cached.clone();
        }
        let measured = if self.profile.is_one_commit() {
            None
        } else {
            let walk = churn::line_changes(self.repo, &self.profile, path, self.churn_limit);
            absorb(
                path,
                "churn",
                walk.map(|walk| {
                    if walk.truncated {
                        log::info!(
                            "{path}: churn walk stopped after {} commits, counts are partial",
                            self.churn_limit
                        );
                    }
                    walk.counts
                }),
            )
        };
        self.churns.insert(path.to_string(), measured.clone());
        measured
    }

    fn blame(&mut self, path: &str) -> Option<Rc<BlameMap>> {
        if self.profile.is_one_commit() {
            return None;
        }
        if let Some(cached) = self.blames.get(path) {
            return cached.clone();
        }
        let blame = absorb(path, "blame", self.repo.blame_head(path));
        self.blames.insert(path.to_string(), blame.clone());
        blame
    }
}

/// Turn a failed measurement into "no data"
fn absorb<T>(path: &str, metric: &str, result: HistoryResult<T>) -> Option<Rc<T>> {
    match result {
        Ok(value) => Some(Rc::new(value)),
        Err(err @ HistoryError::NotFound(_)) => {
            log::debug!("{path}: not in history, no {metric} ({err})");
            None
        }
        Err(err) => {
            log::warn!("{path}: {metric} unavailable: {err}");
            None
        }
    }
}
