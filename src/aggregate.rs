// src/aggregate.rs

use crate::metrics::LineMetrics;
use crate::model::SourceLine;
use crate::normalize::{norm_age, norm_rank, ChurnTransform};
use rand::Rng;
use std::collections::BTreeSet;
use std::str::FromStr;

/// The time-like metric of a block, at most one per run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recency {
    Age,
    Rank,
}

/// Which metrics feed a block's fitness
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricSelection {
    pub recency: Option<Recency>,
    pub churn: bool,
}

impl Default for MetricSelection {
    fn default() -> Self {
        MetricSelection {
            recency: Some(Recency::Age),
            churn: true,
        }
    }
}

/// How the values of a block's lines become one value per metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reduction {
    /// The most interesting line decides
    #[default]
    Max,
    Average,
}

impl Reduction {
    fn reduce(self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        Some(match self {
            Reduction::Max => values.iter().copied().fold(f64::MIN, f64::max),
            Reduction::Average => values.iter().sum::<f64>() / values.len() as f64,
        })
    }
}

impl FromStr for Reduction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "max" | "maximum" => Ok(Reduction::Max),
            "average" | "avg" | "mean" => Ok(Reduction::Average),
            other => Err(format!("unknown reduction `{other}`")),
        }
    }
}

/// Inclusion thresholds in raw units: days, commits ago, change count.
///
/// Each threshold is normalized like the block value it is compared with,
/// and a block passes when its value reaches the bar (`>=`), so lines at
/// the percentile cutoff itself are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricThresholds {
    pub age: Option<u32>,
    pub rank: Option<u32>,
    pub churn: Option<u32>,
}

impl MetricThresholds {
    /// Fill the thresholds `self` leaves unset from `other`
    pub fn or(self, other: MetricThresholds) -> MetricThresholds {
        MetricThresholds {
            age: self.age.or(other.age),
            rank: self.rank.or(other.rank),
            churn: self.churn.or(other.churn),
        }
    }
}

/// Everything that decides how blocks are scored
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringSettings {
    pub selection: MetricSelection,
    pub churn_transform: ChurnTransform,
    pub reduction: Reduction,
    pub thresholds: MetricThresholds,
    /// Percent of blocks recorded regardless of the thresholds
    pub sample_ratio: u8,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        ScoringSettings {
            selection: MetricSelection::default(),
            churn_transform: ChurnTransform::default(),
            reduction: Reduction::default(),
            thresholds: MetricThresholds::default(),
            sample_ratio: 10,
        }
    }
}

/// Outcome of scoring one block
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BlockScore {
    /// Reduced normalized age or rank, `None` without data
    pub recency: Option<f64>,
    pub churn: Option<f64>,
    pub fitness: f64,
    /// Whether the fitness goes into the shared layout
    pub recorded: bool,
}

/// Scores basic blocks from the metrics of their source lines
pub struct BlockAggregator<'r> {
    metrics: LineMetrics<'r>,
    settings: ScoringSettings,
}

impl<'r> BlockAggregator<'r> {
    pub fn new(metrics: LineMetrics<'r>, settings: ScoringSettings) -> Self {
        BlockAggregator { metrics, settings }
    }

    pub fn metrics(&self) -> &LineMetrics<'r> {
        &self.metrics
    }

    /// Score a block touching `lines`. Each distinct line counts once.
    pub fn score<R: Rng>(&mut self, lines: &[SourceLine], rng: &mut R) -> BlockScore {
        let lines: BTreeSet<&SourceLine> = lines.iter().collect();
        let selection = self.settings.selection;
        let reduction = self.settings.reduction;

        let recency = selection
            .recency
            .and_then(|recency| reduction.reduce(&self.recency_values(recency, &lines)));
        let churn = if selection.churn {
            reduction.reduce(&self.churn_values(&lines))
        } else {
            None
        };

        let fitness = match (selection.recency.is_some(), selection.churn) {
            (true, true) => recency.unwrap_or(0.0) * churn.unwrap_or(0.0),
            (true, false) => recency.unwrap_or(0.0),
            (false, _) => churn.unwrap_or(0.0),
        };

        let recorded = fitness > 0.0
            && (self.passes_thresholds(recency, churn)
                || rng.gen_range(0..100u8) < self.settings.sample_ratio);

        BlockScore {
            recency,
            churn,
            fitness,
            recorded,
        }
    }

    fn recency_values(&mut self, recency: Recency, lines: &BTreeSet<&SourceLine>) -> Vec<f64> {
        let max_days = self.metrics.profile().max_days();
        let mut values = Vec::new();
        for line in lines {
            let map = match recency {
                Recency::Age => self.metrics.age(&line.path),
                Recency::Rank => self.metrics.rank(&line.path),
            };
            let Some(raw) = map.and_then(|map| map.get(&line.line).copied()) else {
                continue;
            };
            values.push(match recency {
                Recency::Age => norm_age(max_days, raw),
                Recency::Rank => norm_rank(raw),
            });
        }
        values
    }

    fn churn_values(&mut self, lines: &BTreeSet<&SourceLine>) -> Vec<f64> {
        let transform = self.settings.churn_transform;
        let mut values = Vec::new();
        for line in lines {
            // a measured file's untouched line has changed zero times
            if let Some(map) = self.metrics.churn(&line.path) {
                let count = map.get(&line.line).copied().unwrap_or(0);
                values.push(transform.apply(count));
            }
        }
        values
    }

    /// Every active metric with a threshold must reach it
    fn passes_thresholds(&self, recency: Option<f64>, churn: Option<f64>) -> bool {
        let thresholds = self.settings.thresholds;
        let selection = self.settings.selection;

        let recency_bar = match selection.recency {
            Some(Recency::Age) => thresholds
                .age
                .map(|days| norm_age(self.metrics.profile().max_days(), days)),
            Some(Recency::Rank) => thresholds.rank.map(norm_rank),
            None => None,
        };
        let churn_bar = if selection.churn {
            thresholds
                .churn
                .map(|count| self.settings.churn_transform.apply(count))
        } else {
            None
        };

        let reaches = |value: Option<f64>, bar: Option<f64>| match bar {
            Some(bar) => value.unwrap_or(0.0) >= bar,
            None => true,
        };
        reaches(recency, recency_bar) && reaches(churn, churn_bar)
    }
}
