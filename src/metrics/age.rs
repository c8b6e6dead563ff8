// src/metrics/age.rs

use crate::error::HistoryResult;
use crate::history::HistoryAccessor;
use crate::model::{day_of, BlameMap, CommitId, HistoryProfile, LineMap};
use std::collections::HashMap;

/// Days between HEAD and the commit that last touched each line.
///
/// `times` memoizes commit timestamps across files. A commit dated after
/// HEAD (clock skew) makes its lines 0 days old.
pub fn line_ages(
    repo: &dyn HistoryAccessor,
    profile: &HistoryProfile,
    blame: &BlameMap,
    times: &mut HashMap<CommitId, i64>,
) -> HistoryResult<LineMap> {
    let head_day = profile.head_day();
    let mut ages = LineMap::new();

    for (&line, commit) in blame {
        let time = match times.get(commit) {
            Some(&time) => time,
            None => {
                let time = repo.timestamp(commit)?;
                times.insert(commit.clone(), time);
                time
            }
        };
        let days = (head_day - day_of(time)).clamp(0, i64::from(u32::MAX));
        ages.insert(line, days as u32);
    }

    Ok(ages)
}
