// src/history/parse.rs

//! Parsers for the text the `git` executable prints.
//!
//! Every parser is line-oriented and total: malformed or empty input yields
//! empty output (or `None`), never a panic, so a misbehaving `git` degrades
//! to "no data".

use crate::model::{BlameMap, CommitId, FileRevision, Hunk, LineRange};
use std::collections::HashMap;

/// Parse one unified-diff hunk header.
///
/// Grammar:
/// ```text
/// hunk-header = "@@ -" range " +" range " @@" [ " " section-heading ]
/// range       = start [ "," count ]      ; count defaults to 1
/// ```
///
/// Accepted variants:
/// - single line on both sides: `@@ -8 +9 @@`
/// - ranged: `@@ -466,8 +475 @@`
/// - insertion only (empty old side): `@@ -8,0 +9,2 @@`
/// - deletion only (empty new side): `@@ -10 +9,0 @@`
///
/// Combined-diff headers (`@@@ ...`) are rejected.
pub fn parse_hunk_header(line: &str) -> Option<Hunk> {
    let rest = line.strip_prefix("@@ ")?;
    let end = rest.find(" @@")?;
    let mut parts = rest[..end].split(' ');
    let old = parse_range(parts.next()?.strip_prefix('-')?)?;
    let new = parse_range(parts.next()?.strip_prefix('+')?)?;
    if parts.next().is_some() {
        return None;
    }
    Some(Hunk { old, new })
}

fn parse_range(text: &str) -> Option<LineRange> {
    let (start, count) = match text.split_once(',') {
        Some((start, count)) => (start.parse().ok()?, count.parse().ok()?),
        None => (text.parse().ok()?, 1),
    };
    Some(LineRange::new(start, count))
}

/// Collect every hunk header of a unified diff, skipping all other lines
pub fn parse_unified_hunks(diff: &str) -> Vec<Hunk> {
    diff.lines().filter_map(parse_hunk_header).collect()
}

/// Result of `git blame --porcelain`
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BlamePorcelain {
    pub lines: BlameMap,
    pub committer_times: HashMap<CommitId, i64>,
}

/// Parse `git blame --porcelain` output.
///
/// Grammar:
/// ```text
/// output  = *group
/// group   = header LF *(metadata LF) TAB content LF
/// header  = sha SP orig-line SP final-line [ SP line-count ]
/// metadata = key [ SP value ]             ; e.g. "committer-time 1700000000"
/// ```
///
/// Every blamed line gets its own header; metadata only follows the first
/// header of each commit. Only `committer-time` is retained.
pub fn parse_blame_porcelain(output: &str) -> BlamePorcelain {
    let mut parsed = BlamePorcelain::default();
    let mut current: Option<CommitId> = None;

    for line in output.lines() {
        if line.starts_with('\t') {
            continue;
        }
        if let Some((commit, final_line)) = parse_blame_header(line) {
            parsed.lines.insert(final_line, commit.clone());
            current = Some(commit);
            continue;
        }
        let Some(commit) = current.as_ref() else {
            continue;
        };
        if let Some(value) = line.strip_prefix("committer-time ") {
            if let Ok(time) = value.trim().parse::<i64>() {
                parsed.committer_times.insert(commit.clone(), time);
            }
        }
    }

    parsed
}

fn parse_blame_header(line: &str) -> Option<(CommitId, u32)> {
    let mut parts = line.split(' ');
    let sha = parts.next()?;
    if !is_object_id(sha) {
        return None;
    }
    let _orig: u32 = parts.next()?.parse().ok()?;
    let final_line: u32 = parts.next()?.parse().ok()?;
    if let Some(count) = parts.next() {
        count.parse::<u32>().ok()?;
    }
    if parts.next().is_some() || final_line == 0 {
        return None;
    }
    Some((CommitId::new(sha), final_line))
}

/// SHA-1 or SHA-256 hex object id
pub fn is_object_id(text: &str) -> bool {
    (text.len() == 40 || text.len() == 64) && text.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Parse one `git rev-list --parents` line: `commit [parent...]`
pub fn parse_parents_line(line: &str) -> Option<(CommitId, Vec<CommitId>)> {
    let mut ids = line.split_whitespace();
    let commit = ids.next().filter(|id| is_object_id(id))?;
    let mut parents = Vec::new();
    for id in ids {
        if !is_object_id(id) {
            return None;
        }
        parents.push(CommitId::new(id));
    }
    Some((CommitId::new(commit), parents))
}

/// Parse `git log --format="commit %H" [--name-only]` output.
///
/// Grammar:
/// ```text
/// output = *( "commit " sha LF *( [path] LF ) )
/// ```
///
/// A commit without a listed path keeps `default_path`. When several paths
/// are listed the first one wins.
pub fn parse_file_log(output: &str, default_path: &str) -> Vec<FileRevision> {
    let mut revisions: Vec<FileRevision> = Vec::new();
    let mut path_seen = false;

    for line in output.lines() {
        if let Some(sha) = line.strip_prefix("commit ") {
            let sha = sha.trim();
            if is_object_id(sha) {
                revisions.push(FileRevision {
                    commit: CommitId::new(sha),
                    path: default_path.to_string(),
                });
                path_seen = false;
            }
            continue;
        }
        let path = line.trim_end();
        if path.is_empty() || path_seen {
            continue;
        }
        if let Some(revision) = revisions.last_mut() {
            revision.path = path.to_string();
            path_seen = true;
        }
    }

    revisions
}

/// Parse a bare decimal count such as `git rev-list --count` prints
pub fn parse_count(output: &str) -> Option<u32> {
    output.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA_A: &str = "9f1a353f68d6586b898c47c71a7631cdc816215f";
    const SHA_B: &str = "abcdef0123456789abcdef0123456789abcdef01";

    #[test]
    fn single_line_hunk() {
        let hunk = parse_hunk_header("@@ -8 +9 @@").unwrap();
        assert_eq!(hunk.old, LineRange::new(8, 1));
        assert_eq!(hunk.new, LineRange::new(9, 1));
    }

    #[test]
    fn ranged_hunk_with_section_heading() {
        let hunk = parse_hunk_header("@@ -466,8 +475 @@ static int main(void)").unwrap();
        assert_eq!(hunk.old, LineRange::new(466, 8));
        assert_eq!(hunk.new, LineRange::new(475, 1));
    }

    #[test]
    fn insertion_only_hunk() {
        let hunk = parse_hunk_header("@@ -8,0 +9,2 @@").unwrap();
        assert!(hunk.old.is_empty());
        assert_eq!(hunk.new.lines().collect::<Vec<_>>(), vec![9, 10]);
    }

    #[test]
    fn deletion_only_hunk() {
        let hunk = parse_hunk_header("@@ -10 +9,0 @@").unwrap();
        assert_eq!(hunk.old, LineRange::new(10, 1));
        assert!(hunk.new.is_empty());
    }

    #[test]
    fn malformed_hunks_are_rejected() {
        assert!(parse_hunk_header("@@@ -1,2 -1,2 +1,3 @@@").is_none());
        assert!(parse_hunk_header("@@ -x +1 @@").is_none());
        assert!(parse_hunk_header("@@ -1 +1").is_none());
        assert!(parse_hunk_header("@@ +1 -1 @@").is_none());
        assert!(parse_hunk_header("").is_none());
        assert!(parse_hunk_header("-@@ -1 +1 @@").is_none());
    }

    #[test]
    fn unified_diff_collects_only_headers() {
        let diff = "diff --git a/f.c b/f.c\n\
                    index 1111111..2222222 100644\n\
                    --- a/f.c\n\
                    +++ b/f.c\n\
                    @@ -2 +2 @@ int f()\n\
                    -old\n\
                    +new\n\
                    @@ -5,0 +6,2 @@\n\
                    +a\n\
                    +b\n";
        let hunks = parse_unified_hunks(diff);
        assert_eq!(hunks.len(), 2);
        assert_eq!(hunks[1].new, LineRange::new(6, 2));
    }

    #[test]
    fn empty_diff_has_no_hunks() {
        assert!(parse_unified_hunks("").is_empty());
    }

    #[test]
    fn blame_porcelain_maps_every_line() {
        let output = format!(
            "{SHA_A} 1 1 2\n\
             author Alice\n\
             author-time 1700000000\n\
             committer Alice\n\
             committer-time 1700000100\n\
             summary first\n\
             filename f.c\n\
             \tint a;\n\
             {SHA_A} 2 2\n\
             \tint b;\n\
             {SHA_B} 2 3 1\n\
             author Bob\n\
             committer-time 1700086400\n\
             previous {SHA_A} f.c\n\
             filename f.c\n\
             \tint c;\n"
        );
        let blame = parse_blame_porcelain(&output);
        assert_eq!(blame.lines.len(), 3);
        assert_eq!(blame.lines[&1].as_str(), SHA_A);
        assert_eq!(blame.lines[&2].as_str(), SHA_A);
        assert_eq!(blame.lines[&3].as_str(), SHA_B);
        assert_eq!(blame.committer_times[&CommitId::new(SHA_A)], 1_700_000_100);
        assert_eq!(blame.committer_times[&CommitId::new(SHA_B)], 1_700_086_400);
    }

    #[test]
    fn blame_content_resembling_header_is_ignored() {
        let output = format!("{SHA_A} 1 1 1\n\t{SHA_B} 7 7 1\n");
        let blame = parse_blame_porcelain(&output);
        assert_eq!(blame.lines.len(), 1);
        assert_eq!(blame.lines[&1].as_str(), SHA_A);
    }

    #[test]
    fn garbage_blame_is_no_data() {
        let blame = parse_blame_porcelain("fatal: no such path 'x' in HEAD\n");
        assert!(blame.lines.is_empty());
        assert!(blame.committer_times.is_empty());
    }

    #[test]
    fn parents_line() {
        let (commit, parents) = parse_parents_line(&format!("{SHA_A} {SHA_B}")).unwrap();
        assert_eq!(commit.as_str(), SHA_A);
        assert_eq!(parents, vec![CommitId::new(SHA_B)]);

        let (_, roots) = parse_parents_line(SHA_B).unwrap();
        assert!(roots.is_empty());

        assert!(parse_parents_line("").is_none());
        assert!(parse_parents_line(&format!("{SHA_A} nothex")).is_none());
    }

    #[test]
    fn file_log_with_follow_paths() {
        let output = format!(
            "commit {SHA_A}\n\nsrc/new.c\ncommit {SHA_B}\n\nsrc/old.c\n"
        );
        let revisions = parse_file_log(&output, "src/new.c");
        assert_eq!(revisions.len(), 2);
        assert_eq!(revisions[0].path, "src/new.c");
        assert_eq!(revisions[1].path, "src/old.c");
        assert_eq!(revisions[1].commit.as_str(), SHA_B);
    }

    #[test]
    fn file_log_without_paths_uses_default() {
        let output = format!("commit {SHA_A}\ncommit {SHA_B}\n");
        let revisions = parse_file_log(&output, "f.c");
        assert!(revisions.iter().all(|r| r.path == "f.c"));
    }

    #[test]
    fn count_output() {
        assert_eq!(parse_count("42\n"), Some(42));
        assert_eq!(parse_count(""), None);
        assert_eq!(parse_count("fatal: bad revision"), None);
    }
}
