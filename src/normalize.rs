// src/normalize.rs

use std::str::FromStr;

/// Recency score of a line last changed `days_since` days before HEAD, in a
/// repository whose history spans `max_days` days.
///
/// Hyperbolic in the age: 1 for the newest lines, 0 from `max_days` on.
pub fn norm_age(max_days: u32, days_since: u32) -> f64 {
    if days_since == 0 || max_days <= 1 {
        return 1.0;
    }
    if days_since >= max_days {
        return 0.0;
    }
    let max_days = f64::from(max_days);
    let days_since = f64::from(days_since);
    (max_days - days_since) / (days_since * (max_days - 1.0))
}

/// Score of a line whose origin is `rank` commits behind HEAD
pub fn norm_rank(rank: u32) -> f64 {
    if rank == 0 {
        log::debug!("rank 0 line scored as maximal priority");
        return 1.0;
    }
    1.0 / f64::from(rank)
}

/// How a line's change count becomes a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChurnTransform {
    /// `log2(count + 1)`, damps outliers
    #[default]
    Log2,
    Linear,
    /// `count²`, amplifies outliers
    Quadratic,
}

impl ChurnTransform {
    pub fn apply(self, count: u32) -> f64 {
        let count = f64::from(count);
        match self {
            ChurnTransform::Log2 => (count + 1.0).log2(),
            ChurnTransform::Linear => count,
            ChurnTransform::Quadratic => count * count,
        }
    }
}

impl FromStr for ChurnTransform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log2" | "log" => Ok(ChurnTransform::Log2),
            "linear" => Ok(ChurnTransform::Linear),
            "quadratic" | "square" => Ok(ChurnTransform::Quadratic),
            other => Err(format!("unknown churn transform `{other}`")),
        }
    }
}
