// src/config.rs

use crate::aggregate::{MetricSelection, MetricThresholds, Recency, Reduction, ScoringSettings};
use crate::distribution::{DistributionStore, Thresholds};
use crate::error::ConfigError;
use crate::history::Backend;
use crate::layout::{FitnessEncoding, ScoringLayout, WordSize};
use crate::metrics::DEFAULT_CHURN_LIMIT;
use crate::normalize::ChurnTransform;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::str::FromStr;

pub const INST_RATIO: &str = "AFL_INST_RATIO";
pub const DISABLE: &str = "GIT_FITNESS_DISABLE";
pub const BACKEND: &str = "GIT_FITNESS_BACKEND";
pub const METRICS: &str = "GIT_FITNESS_METRICS";
pub const CHURN: &str = "GIT_FITNESS_CHURN";
pub const REDUCTION: &str = "GIT_FITNESS_REDUCTION";
pub const SAMPLE_RATIO: &str = "GIT_FITNESS_SAMPLE_RATIO";
pub const AGE_THRESHOLD: &str = "GIT_FITNESS_AGE_THRESHOLD";
pub const RANK_THRESHOLD: &str = "GIT_FITNESS_RANK_THRESHOLD";
pub const CHURN_THRESHOLD: &str = "GIT_FITNESS_CHURN_THRESHOLD";
pub const DIST_DIR: &str = "GIT_FITNESS_DIST_DIR";
pub const CHURN_LIMIT: &str = "GIT_FITNESS_CHURN_LIMIT";
pub const REPO: &str = "GIT_FITNESS_REPO";
pub const SEED: &str = "GIT_FITNESS_SEED";
pub const WORD: &str = "GIT_FITNESS_WORD";
pub const ENCODING: &str = "GIT_FITNESS_ENCODING";

/// Settings of an instrumentation run, validated up front
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Percent of blocks that get edge instrumentation at all
    pub inst_ratio: u8,
    /// Scoring switched off; blocks still get edge coverage
    pub disabled: bool,
    pub backend: Backend,
    pub scoring: ScoringSettings,
    pub churn_limit: usize,
    pub dist_dir: Option<PathBuf>,
    /// Sampler thresholds found in `dist_dir`, applied only while their HEAD
    /// is current
    pub stored_thresholds: Option<Thresholds>,
    pub repo_hint: Option<PathBuf>,
    pub seed: Option<u64>,
    pub layout: ScoringLayout,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            inst_ratio: 100,
            disabled: false,
            backend: Backend::default(),
            scoring: ScoringSettings::default(),
            churn_limit: DEFAULT_CHURN_LIMIT,
            dist_dir: None,
            stored_thresholds: None,
            repo_hint: None,
            seed: None,
            layout: ScoringLayout::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key-value source. Unset and empty values take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Config::default();

        if let Some(value) = get(INST_RATIO) {
            config.inst_ratio = percent(INST_RATIO, &value, 1)?;
        }
        config.disabled = get(DISABLE).is_some();
        if let Some(value) = get(BACKEND) {
            config.backend = parse_with(BACKEND, &value, "libgit2 or command")?;
        }
        if let Some(value) = lookup(METRICS) {
            config.scoring.selection = parse_metrics(&value)?;
        }
        if let Some(value) = get(CHURN) {
            config.scoring.churn_transform =
                parse_with::<ChurnTransform>(CHURN, &value, "log2, linear or quadratic")?;
        }
        if let Some(value) = get(REDUCTION) {
            config.scoring.reduction = parse_with::<Reduction>(REDUCTION, &value, "max or average")?;
        }
        if let Some(value) = get(SAMPLE_RATIO) {
            config.scoring.sample_ratio = percent(SAMPLE_RATIO, &value, 0)?;
        }
        config.scoring.thresholds = MetricThresholds {
            age: get(AGE_THRESHOLD)
                .map(|value| number(AGE_THRESHOLD, &value))
                .transpose()?,
            rank: get(RANK_THRESHOLD)
                .map(|value| number(RANK_THRESHOLD, &value))
                .transpose()?,
            churn: get(CHURN_THRESHOLD)
                .map(|value| number(CHURN_THRESHOLD, &value))
                .transpose()?,
        };
        if let Some(value) = get(CHURN_LIMIT) {
            let limit: u32 = number(CHURN_LIMIT, &value)?;
            if limit == 0 {
                return Err(invalid(CHURN_LIMIT, &value, "a positive commit count"));
            }
            config.churn_limit = limit as usize;
        }
        if let Some(value) = get(SEED) {
            config.seed = Some(
                value
                    .trim()
                    .parse()
                    .map_err(|_| invalid(SEED, &value, "an unsigned integer"))?,
            );
        }
        if let Some(value) = get(WORD) {
            config.layout.word = parse_with::<WordSize>(WORD, &value, "4 or 8")?;
        }
        if let Some(value) = get(ENCODING) {
            config.layout.encoding =
                parse_with::<FitnessEncoding>(ENCODING, &value, "integer or double")?;
        }
        config.repo_hint = get(REPO).map(PathBuf::from);
        config.dist_dir = get(DIST_DIR).map(PathBuf::from);
        if let Some(dir) = &config.dist_dir {
            config.stored_thresholds = DistributionStore::new(dir).load_thresholds()?;
        }

        Ok(config)
    }

    /// The RNG behind block ids and sampling, reproducible when seeded
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

fn invalid(key: &'static str, value: &str, expected: &'static str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        expected,
    }
}

fn parse_with<T: FromStr>(
    key: &'static str,
    value: &str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(key, value, expected))
}

fn number(key: &'static str, value: &str) -> Result<u32, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(key, value, "an unsigned integer"))
}

fn percent(key: &'static str, value: &str, min: u8) -> Result<u8, ConfigError> {
    let expected = if min == 0 { "a percentage 0..=100" } else { "a percentage 1..=100" };
    match value.trim().parse::<u8>() {
        Ok(ratio) if (min..=100).contains(&ratio) => Ok(ratio),
        _ => Err(invalid(key, value, expected)),
    }
}

/// Comma list of `age`, `rank` and `churn`
fn parse_metrics(value: &str) -> Result<MetricSelection, ConfigError> {
    let mut selection = MetricSelection {
        recency: None,
        churn: false,
    };
    for name in value.split(',').map(str::trim).filter(|name| !name.is_empty()) {
        let recency = match name.to_ascii_lowercase().as_str() {
            "age" => Recency::Age,
            "rank" => Recency::Rank,
            "churn" => {
                selection.churn = true;
                continue;
            }
            _ => return Err(invalid(METRICS, value, "a list of age, rank and churn")),
        };
        match selection.recency {
            Some(current) if current != recency => return Err(ConfigError::ConflictingRecency),
            _ => selection.recency = Some(recency),
        }
    }
    if selection.recency.is_none() && !selection.churn {
        return Err(ConfigError::NoMetrics(METRICS));
    }
    Ok(selection)
}
