// src/pass.rs

use crate::aggregate::{BlockAggregator, BlockScore};
use crate::config::Config;
use crate::distribution::Thresholds;
use crate::error::HistoryError;
use crate::history::{open_repository, HistoryAccessor};
use crate::layout::{CoverageMap, MAP_SIZE};
use crate::metrics::{load_profile, LineMetrics};
use crate::model::{CommitId, SourceLine};
use rand::Rng;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// A basic block as the compiler's debug info describes it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasicBlock {
    /// Source location of each instruction, in order. Paths are as recorded
    /// by the compiler: absolute, or relative to the build directory.
    pub locations: Vec<SourceLine>,
}

impl BasicBlock {
    pub fn new(locations: Vec<SourceLine>) -> Self {
        BasicBlock { locations }
    }
}

/// One translation unit handed to the pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilationUnit {
    pub source_path: PathBuf,
    pub blocks: Vec<BasicBlock>,
}

/// A block that received edge instrumentation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstrumentedBlock {
    /// Position of the block in its unit
    pub index: usize,
    /// Edge location id, `cur_loc` in the coverage bitmap
    pub location: u32,
    /// Value written to the scoring region when the block runs
    pub fitness: Option<f64>,
    pub score: Option<BlockScore>,
}

/// Facts about one pass invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassDiagnostics {
    pub scoring_enabled: bool,
    pub is_one_commit: bool,
    pub instrumented_blocks: usize,
    pub scored_blocks: usize,
}

/// Result of the pass over one unit
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlockScoreTable {
    pub blocks: Vec<InstrumentedBlock>,
    pub diagnostics: PassDiagnostics,
}

impl BlockScoreTable {
    /// Run every instrumented block once, in order, against `map`
    pub fn execute(&self, map: &mut CoverageMap) {
        for block in &self.blocks {
            map.visit(block.location, block.fitness);
        }
    }

    pub fn block(&self, index: usize) -> Option<&InstrumentedBlock> {
        self.blocks.iter().find(|block| block.index == index)
    }
}

/// Assign edge ids and fitness to the blocks of `unit`.
///
/// Without `repo`, or when its history cannot be read, blocks get plain
/// edge coverage. Line metrics are cached for this call only.
pub fn compute_block_scores(
    unit: &CompilationUnit,
    repo: Option<&dyn HistoryAccessor>,
    config: &Config,
) -> BlockScoreTable {
    let mut rng = config.rng();
    let mut diagnostics = PassDiagnostics::default();

    let mut scorer = match repo {
        Some(_) if config.disabled => {
            log::info!("scoring disabled by configuration");
            None
        }
        Some(repo) => match load_profile(repo) {
            Ok(profile) => {
                diagnostics.scoring_enabled = true;
                diagnostics.is_one_commit = profile.is_one_commit();

                let mut settings = config.scoring.clone();
                let stored = current_thresholds(config.stored_thresholds.as_ref(), &profile.head);
                if let Some(stored) = stored {
                    settings.thresholds = settings.thresholds.or(stored.metric_thresholds());
                }
                let metrics = LineMetrics::new(repo, profile, config.churn_limit);
                Some((BlockAggregator::new(metrics, settings), PathMapper::new(repo.root())))
            }
            Err(err) => {
                log::warn!(
                    "{}: cannot read history, scoring disabled: {err}",
                    repo.root().display()
                );
                None
            }
        },
        None => None,
    };

    let mut blocks = Vec::new();
    for (index, block) in unit.blocks.iter().enumerate() {
        if rng.gen_range(0..100u8) >= config.inst_ratio {
            continue;
        }
        let location = rng.gen_range(0..MAP_SIZE as u32);

        let score = scorer.as_mut().map(|(aggregator, paths)| {
            let lines: Vec<SourceLine> = block
                .locations
                .iter()
                .filter_map(|loc| {
                    paths
                        .relative(&loc.path)
                        .map(|path| SourceLine::new(path, loc.line))
                })
                .collect();
            aggregator.score(&lines, &mut rng)
        });
        let fitness = score.filter(|s| s.recorded).map(|s| s.fitness);

        diagnostics.instrumented_blocks += 1;
        if fitness.is_some() {
            diagnostics.scored_blocks += 1;
        }
        log::debug!("block {index}: location {location}, fitness {fitness:?}");

        blocks.push(InstrumentedBlock {
            index,
            location,
            fitness,
            score,
        });
    }

    if diagnostics.instrumented_blocks == 0 {
        log::warn!("{}: no instrumentation targets found", unit.source_path.display());
    } else {
        log::info!(
            "instrumented {} locations, {} scored (ratio {}%)",
            diagnostics.instrumented_blocks,
            diagnostics.scored_blocks,
            config.inst_ratio
        );
    }

    BlockScoreTable {
        blocks,
        diagnostics,
    }
}

/// Locate the repository of `unit` and score its blocks. A missing
/// repository falls back to plain edge coverage.
pub fn instrument_unit(unit: &CompilationUnit, config: &Config) -> BlockScoreTable {
    if config.disabled {
        return compute_block_scores(unit, None, config);
    }
    let start = config.repo_hint.as_deref().unwrap_or(&unit.source_path);
    match open_repository(start, config.backend) {
        Ok(repo) => compute_block_scores(unit, Some(repo.as_ref()), config),
        Err(err @ HistoryError::RepositoryNotFound(_)) => {
            log::info!("{err}; instrumenting edges only");
            compute_block_scores(unit, None, config)
        }
        Err(err) => {
            log::warn!("cannot open repository: {err}; instrumenting edges only");
            compute_block_scores(unit, None, config)
        }
    }
}

fn current_thresholds<'t>(
    stored: Option<&'t Thresholds>,
    head: &CommitId,
) -> Option<&'t Thresholds> {
    let stored = stored?;
    if &stored.head == head {
        Some(stored)
    } else {
        log::info!(
            "stored thresholds describe {}, HEAD is {head}; ignoring them",
            stored.head
        );
        None
    }
}

/// Maps debug-info paths onto repository-relative ones
struct PathMapper {
    roots: Vec<PathBuf>,
}

impl PathMapper {
    fn new(root: &Path) -> Self {
        let mut roots = vec![root.to_path_buf()];
        if let Ok(canonical) = fs::canonicalize(root) {
            if canonical != root {
                roots.push(canonical);
            }
        }
        PathMapper { roots }
    }

    /// `None` for absolute paths outside the work tree
    fn relative(&self, path: &str) -> Option<String> {
        let path = Path::new(path);
        if path.is_absolute() {
            let canonical = fs::canonicalize(path).ok();
            let candidates = std::iter::once(path).chain(canonical.as_deref());
            for candidate in candidates {
                for root in &self.roots {
                    if let Ok(rest) = candidate.strip_prefix(root) {
                        return Some(slash_path(rest));
                    }
                }
            }
            return None;
        }
        Some(strip_leading_dots(path))
    }
}

/// Drop leading `./` and `../` components
fn strip_leading_dots(path: &Path) -> String {
    let rest: PathBuf = path
        .components()
        .skip_while(|c| matches!(c, Component::CurDir | Component::ParentDir))
        .collect();
    slash_path(&rest)
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
