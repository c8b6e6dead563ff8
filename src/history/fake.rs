// src/history/fake.rs

use super::{CommitIter, HistoryAccessor, EMPTY_TREE};
use crate::error::{HistoryError, HistoryResult};
use crate::model::{BlameMap, CommitId, FileRevision, Hunk, LineRange, SortOrder};
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// In-memory history that counts every query it answers
pub(crate) struct FakeHistory {
    pub root: PathBuf,
    pub head: CommitId,
    /// (commit, parents, time), newest first
    pub commits: Vec<(CommitId, Vec<CommitId>, i64)>,
    pub blames: HashMap<String, BlameMap>,
    pub diffs: HashMap<(String, String, String), Vec<Hunk>>,
    pub histories: HashMap<String, Vec<FileRevision>>,
    pub fail_paths: HashSet<String>,
    pub calls: Cell<usize>,
}

pub(crate) fn id(name: &str) -> CommitId {
    CommitId::new(name)
}

pub(crate) fn hunk(old: (u32, u32), new: (u32, u32)) -> Hunk {
    Hunk {
        old: LineRange::new(old.0, old.1),
        new: LineRange::new(new.0, new.1),
    }
}

impl FakeHistory {
    /// Linear history `c1 <- c2 <- ... <- cN` with the given commit times
    pub fn linear(times: &[i64]) -> Self {
        let mut commits = Vec::new();
        for (i, &time) in times.iter().enumerate() {
            let parents = if i == 0 {
                Vec::new()
            } else {
                vec![id(&format!("c{i}"))]
            };
            commits.push((id(&format!("c{}", i + 1)), parents, time));
        }
        commits.reverse();
        let head = commits
            .first()
            .map(|(c, _, _)| c.clone())
            .unwrap_or_else(|| id("c0"));
        FakeHistory {
            root: PathBuf::from("/repo"),
            head,
            commits,
            blames: HashMap::new(),
            diffs: HashMap::new(),
            histories: HashMap::new(),
            fail_paths: HashSet::new(),
            calls: Cell::new(0),
        }
    }

    pub fn with_blame(mut self, path: &str, origins: &[(u32, &str)]) -> Self {
        let blame = origins
            .iter()
            .map(|&(line, commit)| (line, id(commit)))
            .collect();
        self.blames.insert(path.to_string(), blame);
        self
    }

    pub fn with_diff(mut self, old: &str, new: &str, path: &str, hunks: Vec<Hunk>) -> Self {
        self.diffs
            .insert((old.to_string(), new.to_string(), path.to_string()), hunks);
        self
    }

    pub fn with_history(mut self, path: &str, commits: &[&str]) -> Self {
        let revisions = commits
            .iter()
            .map(|c| FileRevision {
                commit: id(c),
                path: path.to_string(),
            })
            .collect();
        self.histories.insert(path.to_string(), revisions);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    fn tick(&self) {
        self.calls.set(self.calls.get() + 1);
    }

    fn check_path(&self, path: &str) -> HistoryResult<()> {
        if self.fail_paths.contains(path) {
            return Err(HistoryError::Backend(format!("injected failure for {path}")));
        }
        Ok(())
    }

    fn entry(&self, commit: &CommitId) -> HistoryResult<&(CommitId, Vec<CommitId>, i64)> {
        self.commits
            .iter()
            .find(|(c, _, _)| c == commit)
            .ok_or_else(|| HistoryError::NotFound(commit.to_string()))
    }

    fn ancestors(&self, commit: &CommitId) -> HistoryResult<u32> {
        let mut seen = HashSet::new();
        let mut stack = vec![commit.clone()];
        while let Some(next) = stack.pop() {
            if !seen.insert(next.clone()) {
                continue;
            }
            stack.extend(self.entry(&next)?.1.iter().cloned());
        }
        Ok(seen.len() as u32)
    }
}

impl HistoryAccessor for FakeHistory {
    fn root(&self) -> &Path {
        &self.root
    }

    fn head(&self) -> HistoryResult<CommitId> {
        self.tick();
        Ok(self.head.clone())
    }

    fn resolve(&self, _revision: &str, path: &str) -> HistoryResult<Vec<u8>> {
        self.tick();
        self.check_path(path)?;
        Err(HistoryError::NotFound(path.to_string()))
    }

    fn list_commits(&self, _order: SortOrder) -> HistoryResult<CommitIter<'_>> {
        self.tick();
        Ok(Box::new(self.commits.iter().map(|(c, _, _)| Ok(c.clone()))))
    }

    fn parents(&self, commit: &CommitId) -> HistoryResult<Vec<CommitId>> {
        self.tick();
        Ok(self.entry(commit)?.1.clone())
    }

    fn timestamp(&self, commit: &CommitId) -> HistoryResult<i64> {
        self.tick();
        Ok(self.entry(commit)?.2)
    }

    fn blame_head(&self, path: &str) -> HistoryResult<BlameMap> {
        self.tick();
        self.check_path(path)?;
        self.blames
            .get(path)
            .cloned()
            .ok_or_else(|| HistoryError::NotFound(path.to_string()))
    }

    fn diff_lines(&self, old: &str, new: &str, path: &str) -> HistoryResult<Vec<Hunk>> {
        self.tick();
        self.check_path(path)?;
        let key = (old.to_string(), new.to_string(), path.to_string());
        Ok(self.diffs.get(&key).cloned().unwrap_or_default())
    }

    fn commit_count(&self) -> HistoryResult<u32> {
        self.tick();
        self.ancestors(&self.head)
    }

    fn count_up_to(&self, commit: &CommitId) -> HistoryResult<u32> {
        self.tick();
        self.ancestors(commit)
    }

    fn file_history(&self, path: &str, limit: usize) -> HistoryResult<Vec<FileRevision>> {
        self.tick();
        self.check_path(path)?;
        let revisions = self
            .histories
            .get(path)
            .ok_or_else(|| HistoryError::NotFound(path.to_string()))?;
        Ok(revisions.iter().take(limit).cloned().collect())
    }

    fn tracked_files(&self) -> HistoryResult<Vec<String>> {
        self.tick();
        let mut files: Vec<String> = self.blames.keys().cloned().collect();
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::parent_revision;

    #[test]
    fn empty_tree_is_the_root_parent() {
        let fake = FakeHistory::linear(&[0, 10]);
        assert!(fake.parents(&id("c1")).unwrap().is_empty());
        assert_eq!(parent_revision(&[]), EMPTY_TREE);
        assert_eq!(fake.count_up_to(&id("c2")).unwrap(), 2);
    }

    #[test]
    fn oldest_time_scans_every_commit() {
        let fake = FakeHistory::linear(&[30, 10, 20]);
        assert_eq!(fake.oldest_time().unwrap(), 10);
    }
}
