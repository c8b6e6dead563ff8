// src/history/command.rs

use super::parse::{
    is_object_id, parse_blame_porcelain, parse_count, parse_file_log, parse_parents_line,
    parse_unified_hunks,
};
use super::{not_found_in, CommitIter, HistoryAccessor, EMPTY_TREE};
use crate::error::{HistoryError, HistoryResult};
use crate::model::{BlameMap, CommitId, FileRevision, Hunk, SortOrder};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Output, Stdio};

/// Messages git prints when a revision or path is absent
const NOT_FOUND_MARKERS: &[&str] = &[
    "does not exist",
    "no such path",
    "unknown revision",
    "bad revision",
    "bad object",
    "invalid object name",
    "not a valid object name",
    "ambiguous argument",
    "exists on disk, but not in",
];

/// Create a `git` command immune to an inherited `GIT_DIR`/`GIT_WORK_TREE`
fn git_cmd() -> Command {
    let mut cmd = Command::new("git");
    cmd.env_remove("GIT_DIR").env_remove("GIT_WORK_TREE");
    cmd
}

/// History queries answered by running the `git` executable
pub struct CommandHistory {
    root: PathBuf,
    /// Filled as a side effect of blame, which already reports commit times
    commit_times: RefCell<HashMap<CommitId, i64>>,
}

impl CommandHistory {
    pub fn discover(path: &Path) -> HistoryResult<Self> {
        let start = if path.is_file() {
            path.parent().unwrap_or(path)
        } else {
            path
        };
        let output = git_cmd()
            .arg("-C")
            .arg(start)
            .args(["rev-parse", "--show-toplevel"])
            .stderr(Stdio::null())
            .output()
            .map_err(|_| not_found_in(path))?;
        if !output.status.success() {
            return Err(not_found_in(path));
        }
        let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if root.is_empty() {
            return Err(not_found_in(path));
        }
        Ok(CommandHistory {
            root: PathBuf::from(root),
            commit_times: RefCell::new(HashMap::new()),
        })
    }

    fn command(&self) -> Command {
        let mut cmd = git_cmd();
        cmd.arg("-C")
            .arg(&self.root)
            .args(["-c", "core.quotepath=off"]);
        cmd
    }

    fn run(&self, args: &[&str]) -> HistoryResult<Output> {
        let output = self.command().args(args).output()?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(classify_failure(args, &String::from_utf8_lossy(&output.stderr)))
        }
    }

    fn git(&self, args: &[&str]) -> HistoryResult<String> {
        let output = self.run(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn count(&self, revision: &str) -> HistoryResult<u32> {
        let stdout = self.git(&["rev-list", "--count", revision])?;
        parse_count(&stdout).ok_or_else(|| malformed("rev-list --count", &stdout))
    }
}

fn classify_failure(args: &[&str], stderr: &str) -> HistoryError {
    let message = format!("git {}: {}", args.join(" "), stderr.trim());
    let lower = stderr.to_ascii_lowercase();
    if NOT_FOUND_MARKERS.iter().any(|marker| lower.contains(marker)) {
        HistoryError::NotFound(message)
    } else {
        HistoryError::Backend(message)
    }
}

fn malformed(what: &str, output: &str) -> HistoryError {
    let sample: String = output.chars().take(80).collect();
    HistoryError::Backend(format!("unexpected output from git {what}: {sample:?}"))
}

/// Streams `git rev-list` so long histories are never buffered whole
struct RevList {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    done: bool,
}

impl Iterator for RevList {
    type Item = HistoryResult<CommitId>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.lines.next() {
                Some(Ok(line)) => {
                    let id = line.trim();
                    if is_object_id(id) {
                        return Some(Ok(CommitId::new(id)));
                    }
                }
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err.into()));
                }
                None => {
                    self.done = true;
                    return match self.child.wait() {
                        Ok(status) if status.success() => None,
                        Ok(status) => Some(Err(HistoryError::Backend(format!(
                            "git rev-list exited with {status}"
                        )))),
                        Err(err) => Some(Err(err.into())),
                    };
                }
            }
        }
        None
    }
}

impl Drop for RevList {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

impl HistoryAccessor for CommandHistory {
    fn root(&self) -> &Path {
        &self.root
    }

    fn head(&self) -> HistoryResult<CommitId> {
        let stdout = self.git(&["rev-parse", "--verify", "HEAD"])?;
        let id = stdout.trim();
        if is_object_id(id) {
            Ok(CommitId::new(id))
        } else {
            Err(malformed("rev-parse HEAD", &stdout))
        }
    }

    fn resolve(&self, revision: &str, path: &str) -> HistoryResult<Vec<u8>> {
        if revision == EMPTY_TREE {
            return Err(HistoryError::NotFound(format!("{path} in the empty tree")));
        }
        let object = format!("{revision}:{path}");
        Ok(self.run(&["cat-file", "blob", &object])?.stdout)
    }

    fn list_commits(&self, order: SortOrder) -> HistoryResult<CommitIter<'_>> {
        let sort = match order {
            SortOrder::Topological => "--topo-order",
            SortOrder::Chronological => "--date-order",
        };
        let mut child = self
            .command()
            .args(["rev-list", sort, "HEAD"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HistoryError::Backend("git rev-list has no stdout".to_string()))?;
        Ok(Box::new(RevList {
            child,
            lines: BufReader::new(stdout).lines(),
            done: false,
        }))
    }

    fn parents(&self, commit: &CommitId) -> HistoryResult<Vec<CommitId>> {
        let stdout = self.git(&["rev-list", "--parents", "-n", "1", commit.as_str()])?;
        let line = stdout.lines().next().unwrap_or("");
        parse_parents_line(line)
            .map(|(_, parents)| parents)
            .ok_or_else(|| malformed("rev-list --parents", &stdout))
    }

    fn timestamp(&self, commit: &CommitId) -> HistoryResult<i64> {
        if let Some(time) = self.commit_times.borrow().get(commit) {
            return Ok(*time);
        }
        let stdout = self.git(&["show", "-s", "--format=%ct", commit.as_str()])?;
        let time = stdout
            .trim()
            .parse::<i64>()
            .map_err(|_| malformed("show --format=%ct", &stdout))?;
        self.commit_times.borrow_mut().insert(commit.clone(), time);
        Ok(time)
    }

    fn blame_head(&self, path: &str) -> HistoryResult<BlameMap> {
        let stdout = self.git(&["blame", "--porcelain", "HEAD", "--", path])?;
        let parsed = parse_blame_porcelain(&stdout);
        self.commit_times
            .borrow_mut()
            .extend(parsed.committer_times);
        Ok(parsed.lines)
    }

    fn diff_lines(&self, old: &str, new: &str, path: &str) -> HistoryResult<Vec<Hunk>> {
        let stdout = self.git(&[
            "diff",
            "-U0",
            "--no-color",
            "--no-ext-diff",
            "--no-renames",
            old,
            new,
            "--",
            path,
        ])?;
        Ok(parse_unified_hunks(&stdout))
    }

    fn commit_count(&self) -> HistoryResult<u32> {
        self.count("HEAD")
    }

    fn count_up_to(&self, commit: &CommitId) -> HistoryResult<u32> {
        self.count(commit.as_str())
    }

    fn file_history(&self, path: &str, limit: usize) -> HistoryResult<Vec<FileRevision>> {
        let max_count = format!("--max-count={limit}");
        let stdout = self.git(&[
            "log",
            "--follow",
            "--no-merges",
            "--name-only",
            "--format=commit %H",
            &max_count,
            "--",
            path,
        ])?;
        Ok(parse_file_log(&stdout, path))
    }

    fn oldest_time(&self) -> HistoryResult<i64> {
        let stdout = self.git(&["log", "--format=%ct", "HEAD"])?;
        stdout
            .lines()
            .filter_map(|line| line.trim().parse::<i64>().ok())
            .min()
            .ok_or_else(|| malformed("log --format=%ct", &stdout))
    }

    fn tracked_files(&self) -> HistoryResult<Vec<String>> {
        let output = self.run(&["ls-tree", "-r", "-z", "--name-only", "HEAD"])?;
        Ok(output
            .stdout
            .split(|&b| b == 0)
            .filter(|name| !name.is_empty())
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect())
    }
}
