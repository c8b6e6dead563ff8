// src/metrics/churn.rs

use crate::error::HistoryResult;
use crate::history::{parent_revision, HistoryAccessor};
use crate::model::{HistoryProfile, LineMap};
use std::collections::BTreeSet;

/// Change counts of one file, keyed by HEAD line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChurnWalk {
    pub counts: LineMap,
    /// The walk stopped at the commit cap before reaching the file's origin
    pub truncated: bool,
}

/// Count, for every HEAD line of `path`, the commits whose change is
/// traceable to that line.
///
/// Walks at most `limit` commits that modified the file, newest first. For
/// a commit `C` with first parent `P`, the lines `C` introduced are taken
/// from `diff(P, C)`; `diff(C, HEAD)` then says which of them were rewritten
/// later and where the rewrite sits at HEAD, and `diff(P, HEAD)` minus those
/// rewritten lines gives the lines of `C` that survive verbatim. The walk
/// ends at a rename: older revisions know the file under another path.
pub fn line_changes(
    repo: &dyn HistoryAccessor,
    profile: &HistoryProfile,
    path: &str,
    limit: usize,
) -> HistoryResult<ChurnWalk> {
    let mut revisions = repo.file_history(path, limit.saturating_add(1))?;
    let truncated = revisions.len() > limit;
    revisions.truncate(limit);

    let head = profile.head.as_str();
    let mut counts = LineMap::new();
    let mut bump = |line: u32| {
        let count = counts.entry(line).or_insert(0);
        *count = count.saturating_add(1);
    };

    for revision in &revisions {
        if revision.path != path {
            log::debug!(
                "{path}: renamed from {} in {}, older changes not counted",
                revision.path,
                revision.commit
            );
            break;
        }

        let parents = repo.parents(&revision.commit)?;
        let base = parent_revision(&parents);
        let commit = revision.commit.as_str();

        let introduced: BTreeSet<u32> = repo
            .diff_lines(base, commit, path)?
            .iter()
            .flat_map(|hunk| hunk.new.lines())
            .collect();
        if introduced.is_empty() {
            continue;
        }

        if revision.commit == profile.head {
            introduced.iter().copied().for_each(&mut bump);
            continue;
        }

        // Lines of C replaced by later commits, mapped to their HEAD position
        let mut rewritten = BTreeSet::new();
        for hunk in repo.diff_lines(commit, head, path)? {
            rewritten.extend(hunk.new.lines());
            if hunk.old.lines().any(|line| introduced.contains(&line)) {
                hunk.new.lines().for_each(&mut bump);
            }
        }

        for hunk in repo.diff_lines(base, head, path)? {
            hunk.new
                .lines()
                .filter(|line| !rewritten.contains(line))
                .for_each(&mut bump);
        }
    }

    Ok(ChurnWalk { counts, truncated })
}
