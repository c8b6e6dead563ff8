// tests/common/mod.rs

#![allow(dead_code)]

use git_fitness::model::{CommitId, SECONDS_PER_DAY};
use std::fs;
use std::path::Path;
use std::process::{Command, Output};

/// Commit time of day zero
pub const T0: i64 = SECONDS_PER_DAY * 18_500;

fn git(repo: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE")
        .current_dir(repo)
        .args(["-c", "user.name=Fitness Test"])
        .args(["-c", "user.email=fitness@example.com"])
        .args(["-c", "commit.gpgsign=false"])
        .args(["-c", "init.defaultBranch=main"]);
    cmd
}

fn run_git_ok(repo: &Path, args: &[&str], date: Option<&str>) -> Output {
    let mut cmd = git(repo);
    if let Some(date) = date {
        cmd.env("GIT_AUTHOR_DATE", date)
            .env("GIT_COMMITTER_DATE", date);
    }
    let out = cmd.args(args).output().expect("run native git");
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    out
}

/// A scratch repository whose commits carry pinned dates
pub struct TestRepo {
    dir: tempfile::TempDir,
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        run_git_ok(dir.path(), &["init", "-q"], None);
        TestRepo { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, path: &str, content: &str) {
        let full = self.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(full, content).expect("write file");
    }

    /// Commit everything in the work tree, dated `day` days after day zero
    pub fn commit(&self, day: i64, message: &str) -> CommitId {
        let date = format!("{} +0000", T0 + day * SECONDS_PER_DAY);
        run_git_ok(self.path(), &["add", "-A"], None);
        run_git_ok(self.path(), &["commit", "-q", "-m", message], Some(&date));
        let out = run_git_ok(self.path(), &["rev-parse", "HEAD"], None);
        CommitId::new(String::from_utf8_lossy(&out.stdout).trim())
    }

    pub fn rename(&self, from: &str, to: &str) {
        run_git_ok(self.path(), &["mv", from, to], None);
    }

    /// Create `name` at HEAD and switch to it
    pub fn branch(&self, name: &str) {
        run_git_ok(self.path(), &["checkout", "-q", "-b", name], None);
    }

    pub fn checkout(&self, name: &str) {
        run_git_ok(self.path(), &["checkout", "-q", name], None);
    }

    /// Merge `branch` into the current branch with a merge commit
    pub fn merge(&self, day: i64, branch: &str, message: &str) -> CommitId {
        let date = format!("{} +0000", T0 + day * SECONDS_PER_DAY);
        run_git_ok(
            self.path(),
            &["merge", "-q", "--no-ff", "-m", message, branch],
            Some(&date),
        );
        let out = run_git_ok(self.path(), &["rev-parse", "HEAD"], None);
        CommitId::new(String::from_utf8_lossy(&out.stdout).trim())
    }
}

/// `count` numbered lines `<tag>1` .. `<tag>N`, with `edits` replacing some
pub fn numbered(tag: &str, count: u32, edits: &[(u32, &str)]) -> String {
    (1..=count)
        .map(|line| {
            edits
                .iter()
                .find(|(at, _)| *at == line)
                .map(|(_, text)| text.to_string())
                .unwrap_or_else(|| format!("{tag}{line}"))
        })
        .map(|line| line + "\n")
        .collect()
}

/// Five commits ten days apart:
///
/// 1. add `a.c` and `b.c`, six lines each
/// 2. edit `a.c:2`
/// 3. edit `b.c:4`
/// 4. edit `a.c:2` again
/// 5. edit `b.c:1`
pub fn five_commit_repo() -> (TestRepo, Vec<CommitId>) {
    let repo = TestRepo::new();
    let mut commits = Vec::new();

    repo.write("a.c", &numbered("a", 6, &[]));
    repo.write("b.c", &numbered("b", 6, &[]));
    commits.push(repo.commit(0, "add sources"));

    repo.write("a.c", &numbered("a", 6, &[(2, "a2 first")]));
    commits.push(repo.commit(10, "tweak a"));

    repo.write("b.c", &numbered("b", 6, &[(4, "b4 first")]));
    commits.push(repo.commit(20, "tweak b"));

    repo.write("a.c", &numbered("a", 6, &[(2, "a2 second")]));
    commits.push(repo.commit(30, "tweak a again"));

    repo.write("b.c", &numbered("b", 6, &[(1, "b1 first"), (4, "b4 first")]));
    commits.push(repo.commit(40, "tweak b again"));

    (repo, commits)
}

/// Commits of [`merge_repo`]
pub struct MergeCommits {
    pub root: CommitId,
    pub side1: CommitId,
    pub main1: CommitId,
    pub main2: CommitId,
    pub side2: CommitId,
    pub merge: CommitId,
    pub head: CommitId,
}

/// A branch merged back into `main`, over `m.c` with eight lines:
///
/// ```text
/// root(0) ── main1(10) ── main2(30) ── merge(50) ── head(60)
///    └─ side1(-5) ── side2(40) ───────────┘
/// ```
///
/// `side1` is dated before its parent. Edited lines: main1 `m2`, main2 `m3`,
/// side1 `m7`, side2 `m8`, head `m4`. The merge itself is clean.
pub fn merge_repo() -> (TestRepo, MergeCommits) {
    let repo = TestRepo::new();
    let side = [(7, "m7 side")];
    let both_sides = [(7, "m7 side"), (8, "m8 side")];

    repo.write("m.c", &numbered("m", 8, &[]));
    let root = repo.commit(0, "root");

    repo.branch("side");
    repo.write("m.c", &numbered("m", 8, &side));
    let side1 = repo.commit(-5, "side one");

    repo.checkout("main");
    repo.write("m.c", &numbered("m", 8, &[(2, "m2 main")]));
    let main1 = repo.commit(10, "main one");
    repo.write("m.c", &numbered("m", 8, &[(2, "m2 main"), (3, "m3 main")]));
    let main2 = repo.commit(30, "main two");

    repo.checkout("side");
    repo.write("m.c", &numbered("m", 8, &both_sides));
    let side2 = repo.commit(40, "side two");

    repo.checkout("main");
    let merge = repo.merge(50, "side", "merge side");

    let head_lines = [
        (2, "m2 main"),
        (3, "m3 main"),
        (4, "m4 head"),
        (7, "m7 side"),
        (8, "m8 side"),
    ];
    repo.write("m.c", &numbered("m", 8, &head_lines));
    let head = repo.commit(60, "head");

    let commits = MergeCommits {
        root,
        side1,
        main1,
        main2,
        side2,
        merge,
        head,
    };
    (repo, commits)
}
