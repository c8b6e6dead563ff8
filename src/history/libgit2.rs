// src/history/libgit2.rs

use super::{not_found_in, CommitIter, HistoryAccessor, EMPTY_TREE};
use crate::error::{HistoryError, HistoryResult};
use crate::model::{BlameMap, CommitId, FileRevision, Hunk, LineRange, SortOrder};
use git2::{
    BlameOptions, Commit, Delta, DiffFindOptions, DiffOptions, ObjectType, Oid, Repository, Sort,
    Tree, TreeWalkMode, TreeWalkResult,
};
use std::path::{Path, PathBuf};

/// History queries answered in-process by libgit2
pub struct Libgit2History {
    repo: Repository,
    root: PathBuf,
}

impl Libgit2History {
    pub fn discover(path: &Path) -> HistoryResult<Self> {
        let start = if path.is_file() {
            path.parent().unwrap_or(path)
        } else {
            path
        };
        let repo = Repository::discover(start).map_err(|_| not_found_in(path))?;
        let root = repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| not_found_in(path))?;
        Ok(Libgit2History { repo, root })
    }

    fn find_commit(&self, commit: &CommitId) -> HistoryResult<Commit<'_>> {
        let oid = Oid::from_str(commit.as_str())?;
        Ok(self.repo.find_commit(oid)?)
    }

    fn tree_at(&self, revision: &str) -> HistoryResult<Option<Tree<'_>>> {
        if revision == EMPTY_TREE {
            return Ok(None);
        }
        let object = self.repo.revparse_single(revision)?;
        Ok(Some(object.peel_to_tree()?))
    }

    fn count_from(&self, oid: Oid) -> HistoryResult<u32> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push(oid)?;
        let mut count: u32 = 0;
        for oid in revwalk {
            oid?;
            count = count.saturating_add(1);
        }
        Ok(count)
    }

    /// Previous path of `path` if `commit` renamed it relative to `parent`
    fn renamed_from(&self, parent: &Commit, commit: &Commit, path: &str) -> HistoryResult<Option<String>> {
        let mut diff_opts = DiffOptions::new();
        diff_opts.ignore_filemode(true);
        let mut diff = self.repo.diff_tree_to_tree(
            Some(&parent.tree()?),
            Some(&commit.tree()?),
            Some(&mut diff_opts),
        )?;
        let mut find_opts = DiffFindOptions::new();
        find_opts.renames(true);
        diff.find_similar(Some(&mut find_opts))?;

        for delta in diff.deltas() {
            if delta.status() == Delta::Renamed && delta.new_file().path() == Some(Path::new(path)) {
                return Ok(delta
                    .old_file()
                    .path()
                    .and_then(|p| p.to_str())
                    .map(String::from));
            }
        }
        Ok(None)
    }
}

fn entry_id(tree: &Tree, path: &str) -> Option<Oid> {
    tree.get_path(Path::new(path)).ok().map(|entry| entry.id())
}

fn to_u32(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

impl HistoryAccessor for Libgit2History {
    fn root(&self) -> &Path {
        &self.root
    }

    fn head(&self) -> HistoryResult<CommitId> {
        Ok(self.repo.head()?.peel_to_commit()?.id().into())
    }

    fn resolve(&self, revision: &str, path: &str) -> HistoryResult<Vec<u8>> {
        let tree = self
            .tree_at(revision)?
            .ok_or_else(|| HistoryError::NotFound(format!("{path} in the empty tree")))?;
        let entry = tree.get_path(Path::new(path))?;
        let blob = entry.to_object(&self.repo)?.peel_to_blob()?;
        Ok(blob.content().to_vec())
    }

    fn list_commits(&self, order: SortOrder) -> HistoryResult<CommitIter<'_>> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.set_sorting(match order {
            SortOrder::Topological => Sort::TOPOLOGICAL,
            SortOrder::Chronological => Sort::TIME,
        })?;
        Ok(Box::new(
            revwalk.map(|oid| oid.map(CommitId::from).map_err(HistoryError::from)),
        ))
    }

    fn parents(&self, commit: &CommitId) -> HistoryResult<Vec<CommitId>> {
        let commit = self.find_commit(commit)?;
        Ok(commit.parent_ids().map(CommitId::from).collect())
    }

    fn timestamp(&self, commit: &CommitId) -> HistoryResult<i64> {
        Ok(self.find_commit(commit)?.time().seconds())
    }

    fn blame_head(&self, path: &str) -> HistoryResult<BlameMap> {
        let head = self.repo.head()?.peel_to_commit()?;
        // untracked paths must fail as NotFound, not blame the work tree
        entry_id(&head.tree()?, path)
            .ok_or_else(|| HistoryError::NotFound(format!("{path} in HEAD")))?;

        let mut blame_opts = BlameOptions::new();
        blame_opts.newest_commit(head.id());
        let blame = self.repo.blame_file(Path::new(path), Some(&mut blame_opts))?;

        let mut lines = BlameMap::new();
        for hunk in blame.iter() {
            let start = to_u32(hunk.final_start_line());
            let commit = CommitId::from(hunk.final_commit_id());
            for offset in 0..to_u32(hunk.lines_in_hunk()) {
                lines.insert(start + offset, commit.clone());
            }
        }
        Ok(lines)
    }

    fn diff_lines(&self, old: &str, new: &str, path: &str) -> HistoryResult<Vec<Hunk>> {
        let old_tree = self.tree_at(old)?;
        let new_tree = self.tree_at(new)?;

        let mut diff_opts = DiffOptions::new();
        diff_opts
            .pathspec(path)
            .disable_pathspec_match(true)
            .context_lines(0)
            .interhunk_lines(0)
            .ignore_filemode(true);

        let diff = self
            .repo
            .diff_tree_to_tree(old_tree.as_ref(), new_tree.as_ref(), Some(&mut diff_opts))?;

        let mut hunks = Vec::new();
        diff.foreach(
            &mut |_, _| true,
            None,
            Some(&mut |_, hunk| {
                hunks.push(Hunk {
                    old: LineRange::new(hunk.old_start(), hunk.old_lines()),
                    new: LineRange::new(hunk.new_start(), hunk.new_lines()),
                });
                true
            }),
            None,
        )?;
        Ok(hunks)
    }

    fn commit_count(&self) -> HistoryResult<u32> {
        let head = self.repo.head()?.peel_to_commit()?;
        self.count_from(head.id())
    }

    fn count_up_to(&self, commit: &CommitId) -> HistoryResult<u32> {
        self.count_from(Oid::from_str(commit.as_str())?)
    }

    fn file_history(&self, path: &str, limit: usize) -> HistoryResult<Vec<FileRevision>> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.set_sorting(Sort::TIME)?;

        let mut tracked = path.to_string();
        let mut revisions = Vec::new();

        for oid in revwalk {
            if revisions.len() >= limit {
                break;
            }
            let commit = self.repo.find_commit(oid?)?;
            let Some(blob_id) = entry_id(&commit.tree()?, &tracked) else {
                continue;
            };

            let parents: Vec<Commit> = commit.parents().collect();
            // merges only repeat changes made on their branches
            if parents.len() > 1 {
                continue;
            }
            let mut unchanged = false;
            let mut in_parent = false;
            for parent in &parents {
                if let Some(parent_blob) = entry_id(&parent.tree()?, &tracked) {
                    in_parent = true;
                    unchanged |= parent_blob == blob_id;
                }
            }
            if unchanged {
                continue;
            }

            revisions.push(FileRevision {
                commit: commit.id().into(),
                path: tracked.clone(),
            });

            // 'follow': older commits know the file by its previous name
            if !in_parent {
                if let Some(parent) = parents.first() {
                    if let Some(previous) = self.renamed_from(parent, &commit, &tracked)? {
                        tracked = previous;
                    }
                }
            }
        }

        Ok(revisions)
    }

    fn tracked_files(&self) -> HistoryResult<Vec<String>> {
        let tree = self.repo.head()?.peel_to_tree()?;
        let mut files = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |dir, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    files.push(format!("{dir}{name}"));
                }
            }
            TreeWalkResult::Ok
        })?;
        Ok(files)
    }
}
