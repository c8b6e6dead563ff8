// src/main.rs

mod cli;

use anyhow::{Context, Result};
use chrono::TimeZone;
use clap::Parser;
use cli::{Args, Command};
use git_fitness::distribution::{DistributionSampler, DistributionStore, Thresholds};
use git_fitness::model::LineMap;
use git_fitness::{load_profile, open_repository, Backend, LineMetrics};
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use std::time::Instant;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let start_time = Instant::now();

    match args.command {
        Command::Distribution {
            repo,
            percent,
            out,
            backend,
            force,
            churn_limit,
        } => distribution(&repo, percent, out, backend.into(), force, churn_limit)?,
        Command::Lines {
            repo,
            file,
            backend,
            churn_limit,
        } => lines(&repo, &file, backend.into(), churn_limit)?,
    }

    println!("Total time: {:.2?}", start_time.elapsed());
    Ok(())
}

fn rfc2822(timestamp: i64) -> String {
    chrono::Utc
        .timestamp_opt(timestamp, 0)
        .single()
        .map(|time| time.to_rfc2822())
        .unwrap_or_else(|| timestamp.to_string())
}

fn distribution(
    repo_path: &Path,
    percent: u8,
    out: Option<PathBuf>,
    backend: Backend,
    force: bool,
    churn_limit: usize,
) -> Result<()> {
    let repo = open_repository(repo_path, backend)
        .with_context(|| format!("cannot open repository at {}", repo_path.display()))?;
    let profile = load_profile(repo.as_ref()).context("cannot read repository history")?;
    let root = repo.root().to_path_buf();
    drop(repo);

    println!(
        "Repository history spans from {} to {} ({} commits).",
        rfc2822(profile.first_time),
        rfc2822(profile.head_time),
        profile.commit_count
    );
    if profile.is_one_commit() {
        log::warn!("single-commit history: every metric will be empty");
    }

    let out = out.unwrap_or_else(|| root.clone());
    let store = DistributionStore::new(&out);

    let cached = if force { None } else { store.load(&profile.head) };
    let (head, dist) = match cached {
        Some(dist) => {
            println!("Reusing distribution records in {}", out.display());
            (profile.head, dist)
        }
        None => {
            let sample_start = Instant::now();
            let run = DistributionSampler::new(&root, backend)
                .with_churn_limit(churn_limit)
                .sample(ProgressBar::new(0))
                .context("sampling failed")?;
            println!(
                "Sampled {} files in {:.2?}.",
                run.files,
                sample_start.elapsed()
            );
            store
                .save(&run.profile.head, &run.distribution)
                .with_context(|| format!("cannot write records to {}", out.display()))?;
            (run.profile.head, run.distribution)
        }
    };

    let thresholds = Thresholds::from_distribution(head, &dist, percent);
    store
        .save_thresholds(&thresholds)
        .with_context(|| format!("cannot write thresholds to {}", out.display()))?;

    let show = |value: Option<u32>| value.map_or_else(|| "none".to_string(), |v| v.to_string());
    println!("Percentage of lines to insert churn info: {percent}%");
    println!("Threshold of #change: {}", show(thresholds.churn));
    println!("Threshold of age(days): {}", show(thresholds.age));
    println!("Threshold of #rank: {}", show(thresholds.rank));
    println!("The distribution files are in {}", out.display());
    Ok(())
}

fn lines(repo_path: &Path, file: &str, backend: Backend, churn_limit: usize) -> Result<()> {
    let repo = open_repository(repo_path, backend)
        .with_context(|| format!("cannot open repository at {}", repo_path.display()))?;
    let profile = load_profile(repo.as_ref()).context("cannot read repository history")?;
    let content = repo
        .resolve("HEAD", file)
        .with_context(|| format!("{file} is not in HEAD"))?;

    let mut metrics = LineMetrics::new(repo.as_ref(), profile, churn_limit);
    let ages = metrics.age(file);
    let churn = metrics.churn(file);
    let ranks = metrics.rank(file);

    let cell = |map: &Option<std::rc::Rc<LineMap>>, line: u32| {
        map.as_ref()
            .and_then(|map| map.get(&line))
            .map_or_else(|| "-".to_string(), |v| v.to_string())
    };

    println!("{:>6} {:>6} {:>6} {:>6}  source", "line", "age", "churn", "rank");
    for (index, text) in String::from_utf8_lossy(&content).lines().enumerate() {
        let line = index as u32 + 1;
        // lines HEAD never changed have a churn of zero
        let changes = match &churn {
            Some(map) => map.get(&line).copied().unwrap_or(0).to_string(),
            None => "-".to_string(),
        };
        println!(
            "{:>6} {:>6} {:>6} {:>6}  {}",
            line,
            cell(&ages, line),
            changes,
            cell(&ranks, line),
            text
        );
    }
    Ok(())
}
