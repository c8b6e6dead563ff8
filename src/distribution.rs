// src/distribution.rs

use crate::aggregate::MetricThresholds;
use crate::error::{ConfigError, HistoryResult};
use crate::history::{open_repository, Backend, HistoryAccessor};
use crate::metrics::{load_profile, CommitMemo, LineMetrics, DEFAULT_CHURN_LIMIT};
use crate::model::{CommitId, HistoryProfile};
use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const CHURN_BUCKETS: u32 = 1000;
pub const AGE_BUCKETS: u32 = 8000;
pub const RANK_BUCKETS: u32 = 1 << 16;

pub const AGE_FILE: &str = "dist_age.txt";
pub const CHURN_FILE: &str = "dist_churn.txt";
pub const RANK_FILE: &str = "dist_rank.txt";
pub const THRESHOLDS_FILE: &str = "thresholds.txt";

pub const DEFAULT_PERCENT: u8 = 10;

/// Line counts per metric value. Values past the last bucket land in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    cap: u32,
    buckets: BTreeMap<u32, u64>,
}

impl Histogram {
    pub fn new(cap: u32) -> Self {
        Histogram {
            cap: cap.max(1),
            buckets: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, value: u32) {
        self.add_lines(value, 1);
    }

    pub fn add_lines(&mut self, value: u32, lines: u64) {
        if lines == 0 {
            return;
        }
        let bucket = value.min(self.cap - 1);
        *self.buckets.entry(bucket).or_insert(0) += lines;
    }

    pub fn lines(&self, value: u32) -> u64 {
        self.buckets.get(&value).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.buckets.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Non-empty buckets in ascending value order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (u32, u64)> + '_ {
        self.buckets.iter().map(|(&value, &lines)| (value, lines))
    }

    pub fn merge(mut self, other: Histogram) -> Histogram {
        for (value, lines) in other.buckets {
            self.add_lines(value, lines);
        }
        self
    }

    /// First value, scanning from the top, at which `percent` of the lines
    /// have been seen
    pub fn threshold_from_top(&self, percent: u8) -> Option<u32> {
        threshold(self.iter().rev(), self.keep(percent))
    }

    /// Same scan from the bottom
    pub fn threshold_from_bottom(&self, percent: u8) -> Option<u32> {
        threshold(self.iter(), self.keep(percent))
    }

    fn keep(&self, percent: u8) -> u64 {
        self.total() * u64::from(percent) / 100
    }
}

fn threshold(buckets: impl Iterator<Item = (u32, u64)>, keep: u64) -> Option<u32> {
    let mut seen = 0;
    for (value, lines) in buckets {
        seen += lines;
        if seen >= keep {
            return Some(value);
        }
    }
    None
}

/// Histograms of all three metrics over a set of lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution {
    pub age: Histogram,
    pub churn: Histogram,
    pub rank: Histogram,
}

impl Default for Distribution {
    fn default() -> Self {
        Distribution {
            age: Histogram::new(AGE_BUCKETS),
            churn: Histogram::new(CHURN_BUCKETS),
            rank: Histogram::new(RANK_BUCKETS),
        }
    }
}

impl Distribution {
    pub fn merge(self, other: Distribution) -> Distribution {
        Distribution {
            age: self.age.merge(other.age),
            churn: self.churn.merge(other.churn),
            rank: self.rank.merge(other.rank),
        }
    }
}

/// Add every HEAD line of `path` to a fresh distribution. Lines never
/// changed do not enter the churn histogram.
pub fn sample_file(metrics: &mut LineMetrics, path: &str) -> Distribution {
    let mut dist = Distribution::default();
    if let Some(ages) = metrics.age(path) {
        ages.values().for_each(|&days| dist.age.add(days));
    }
    if let Some(ranks) = metrics.rank(path) {
        ranks.values().for_each(|&rank| dist.rank.add(rank));
    }
    if let Some(churn) = metrics.churn(path) {
        churn
            .values()
            .filter(|&&count| count >= 1)
            .for_each(|&count| dist.churn.add(count));
    }
    dist
}

/// Whole-repository sampling run, one history handle per worker thread
pub struct DistributionSampler {
    root: PathBuf,
    backend: Backend,
    churn_limit: usize,
}

/// What a sampling run found
#[derive(Debug, Clone)]
pub struct SampleRun {
    pub profile: HistoryProfile,
    pub files: usize,
    pub distribution: Distribution,
}

impl DistributionSampler {
    pub fn new(root: impl Into<PathBuf>, backend: Backend) -> Self {
        DistributionSampler {
            root: root.into(),
            backend,
            churn_limit: DEFAULT_CHURN_LIMIT,
        }
    }

    pub fn with_churn_limit(mut self, churn_limit: usize) -> Self {
        self.churn_limit = churn_limit;
        self
    }

    /// Measure every file tracked at HEAD. `bar` is sized here and
    /// advanced once per file.
    pub fn sample(&self, bar: ProgressBar) -> HistoryResult<SampleRun> {
        let repo = open_repository(&self.root, self.backend)?;
        let profile = load_profile(repo.as_ref())?;
        let files = repo.tracked_files()?;
        let root = repo.root().to_path_buf();
        drop(repo);

        bar.set_length(files.len() as u64);
        bar.set_message("Sampling line metrics");

        let distribution = files
            .par_iter()
            .progress_with(bar.clone())
            .map_init(
                || Worker::open(&root, self.backend),
                |worker, path| worker.sample(&profile, self.churn_limit, path),
            )
            .reduce(Distribution::default, Distribution::merge);

        bar.finish_with_message("Sampling complete");
        log::info!(
            "sampled {} files: {} age lines, {} churned lines, {} ranked lines",
            files.len(),
            distribution.age.total(),
            distribution.churn.total(),
            distribution.rank.total()
        );

        Ok(SampleRun {
            profile,
            files: files.len(),
            distribution,
        })
    }
}

struct Worker {
    repo: Option<Box<dyn HistoryAccessor>>,
    memo: CommitMemo,
}

impl Worker {
    fn open(root: &Path, backend: Backend) -> Self {
        let repo = open_repository(root, backend)
            .map_err(|err| log::warn!("worker cannot open {}: {err}", root.display()))
            .ok();
        Worker {
            repo,
            memo: CommitMemo::default(),
        }
    }

    fn sample(&mut self, profile: &HistoryProfile, churn_limit: usize, path: &str) -> Distribution {
        let Some(repo) = self.repo.as_deref() else {
            return Distribution::default();
        };
        let memo = std::mem::take(&mut self.memo);
        let mut metrics = LineMetrics::with_memo(repo, profile.clone(), churn_limit, memo);
        let dist = sample_file(&mut metrics, path);
        self.memo = metrics.into_memo();
        dist
    }
}

/// Percentile thresholds derived from a distribution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thresholds {
    pub head: CommitId,
    pub percent: u8,
    /// Minimum change count of the most churned lines
    pub churn: Option<u32>,
    /// Maximum age in days of the newest lines
    pub age: Option<u32>,
    /// Maximum rank of the most recently changed lines
    pub rank: Option<u32>,
}

impl Thresholds {
    pub fn from_distribution(head: CommitId, dist: &Distribution, percent: u8) -> Self {
        Thresholds {
            head,
            percent,
            churn: dist.churn.threshold_from_top(percent),
            age: dist.age.threshold_from_bottom(percent),
            rank: dist.rank.threshold_from_bottom(percent),
        }
    }

    pub fn metric_thresholds(&self) -> MetricThresholds {
        MetricThresholds {
            age: self.age,
            rank: self.rank,
            churn: self.churn,
        }
    }

    fn render(&self) -> String {
        let mut out = format!("# head {}\npercent {}\n", self.head, self.percent);
        for (name, value) in [("churn", self.churn), ("age", self.age), ("rank", self.rank)] {
            if let Some(value) = value {
                let _ = writeln!(out, "{name} {value}");
            }
        }
        out
    }

    fn parse(text: &str) -> Result<Self, String> {
        let mut lines = text.lines();
        let head = lines
            .next()
            .and_then(|line| line.strip_prefix("# head "))
            .map(|sha| CommitId::new(sha.trim()))
            .ok_or("missing `# head` line")?;

        let mut thresholds = Thresholds {
            head,
            percent: DEFAULT_PERCENT,
            churn: None,
            age: None,
            rank: None,
        };
        for line in lines.filter(|line| !line.trim().is_empty()) {
            let mut parts = line.split_whitespace();
            let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
                return Err(format!("malformed line {line:?}"));
            };
            let value: u32 = value
                .parse()
                .map_err(|_| format!("bad number in {line:?}"))?;
            match key {
                "percent" if (1..=100).contains(&value) => thresholds.percent = value as u8,
                "churn" => thresholds.churn = Some(value),
                "age" => thresholds.age = Some(value),
                "rank" => thresholds.rank = Some(value),
                _ => return Err(format!("unexpected line {line:?}")),
            }
        }
        Ok(thresholds)
    }
}

/// Sampler output kept on disk between runs, stamped with the HEAD it
/// describes
pub struct DistributionStore {
    dir: PathBuf,
}

const AGE_HEADER: &str = "age(days)  lines_count";
const CHURN_HEADER: &str = "#changes  lines_count";
const RANK_HEADER: &str = "#ranks  lines_count";

impl DistributionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DistributionStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The stored distribution, if all three records are well-formed and
    /// describe `head`
    pub fn load(&self, head: &CommitId) -> Option<Distribution> {
        let read = |name: &str, cap: u32| -> Option<Histogram> {
            let path = self.dir.join(name);
            let text = fs::read_to_string(&path).ok()?;
            match parse_record(&text, cap) {
                Ok((recorded, hist)) if &recorded == head => Some(hist),
                Ok((recorded, _)) => {
                    log::info!("{} describes {recorded}, HEAD is {head}", path.display());
                    None
                }
                Err(reason) => {
                    log::warn!("ignoring {}: {reason}", path.display());
                    None
                }
            }
        };

        Some(Distribution {
            age: read(AGE_FILE, AGE_BUCKETS)?,
            churn: read(CHURN_FILE, CHURN_BUCKETS)?,
            rank: read(RANK_FILE, RANK_BUCKETS)?,
        })
    }

    pub fn save(&self, head: &CommitId, dist: &Distribution) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        // churn is listed most changed first
        let churn: Vec<_> = dist.churn.iter().rev().collect();
        fs::write(
            self.dir.join(CHURN_FILE),
            render_record(head, CHURN_HEADER, churn),
        )?;
        fs::write(
            self.dir.join(AGE_FILE),
            render_record(head, AGE_HEADER, dist.age.iter()),
        )?;
        fs::write(
            self.dir.join(RANK_FILE),
            render_record(head, RANK_HEADER, dist.rank.iter()),
        )
    }

    pub fn save_thresholds(&self, thresholds: &Thresholds) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.dir.join(THRESHOLDS_FILE), thresholds.render())
    }

    /// Stored thresholds, `None` when none were written yet
    pub fn load_thresholds(&self) -> Result<Option<Thresholds>, ConfigError> {
        let path = self.dir.join(THRESHOLDS_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(ConfigError::Thresholds {
                    path,
                    reason: err.to_string(),
                })
            }
        };
        Thresholds::parse(&text)
            .map(Some)
            .map_err(|reason| ConfigError::Thresholds { path, reason })
    }
}

fn render_record(
    head: &CommitId,
    header: &str,
    buckets: impl IntoIterator<Item = (u32, u64)>,
) -> String {
    let mut out = format!("# head {head}\n{header}\n");
    for (value, lines) in buckets {
        let _ = writeln!(out, "{value}  {lines}");
    }
    out
}

fn parse_record(text: &str, cap: u32) -> Result<(CommitId, Histogram), String> {
    let mut lines = text.lines();
    let head = lines
        .next()
        .and_then(|line| line.strip_prefix("# head "))
        .map(str::trim)
        .filter(|sha| !sha.is_empty())
        .ok_or("missing `# head` line")?;
    lines.next().ok_or("missing column header")?;

    let mut hist = Histogram::new(cap);
    for line in lines.filter(|line| !line.trim().is_empty()) {
        let mut parts = line.split_whitespace();
        let (Some(value), Some(count), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(format!("malformed line {line:?}"));
        };
        let value: u32 = value.parse().map_err(|_| format!("bad value in {line:?}"))?;
        let count: u64 = count.parse().map_err(|_| format!("bad count in {line:?}"))?;
        if value >= cap {
            return Err(format!("value {value} past the last bucket"));
        }
        hist.add_lines(value, count);
    }
    Ok((CommitId::new(head), hist))
}
