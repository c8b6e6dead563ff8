// src/metrics/rank.rs

use crate::error::HistoryResult;
use crate::history::HistoryAccessor;
use crate::model::{BlameMap, CommitId, HistoryProfile, LineMap};
use std::collections::HashMap;

/// How many commits ago each line was last touched, counted as
/// `commits(HEAD) - commits(origin)`. `ranks` memoizes per origin commit.
pub fn line_ranks(
    repo: &dyn HistoryAccessor,
    profile: &HistoryProfile,
    blame: &BlameMap,
    ranks: &mut HashMap<CommitId, u32>,
) -> HistoryResult<LineMap> {
    let mut lines = LineMap::new();

    for (&line, commit) in blame {
        let rank = match ranks.get(commit) {
            Some(&rank) => rank,
            None => {
                let rank = profile
                    .commit_count
                    .saturating_sub(repo.count_up_to(commit)?);
                ranks.insert(commit.clone(), rank);
                rank
            }
        };
        lines.insert(line, rank);
    }

    Ok(lines)
}
