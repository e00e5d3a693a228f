// CLI command implementations

pub mod index;
pub mod query;
pub mod start;
pub mod stats;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

use crate::indexer::{AnalysisSummary, AnalyzeOptions, Indexer};

/// Output format for query commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Absolute form of a project argument; the CLI accepts relative paths for convenience
pub fn absolute_project(project: &str) -> Result<String> {
    let path = Path::new(project);
    let absolute = path
        .canonicalize()
        .with_context(|| format!("Project directory not found: {}", project))?;
    Ok(absolute.to_string_lossy().into_owned())
}

/// Analyze with a progress bar on stderr
pub async fn analyze_with_bar(indexer: &Indexer, options: &AnalyzeOptions) -> Result<AnalysisSummary> {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} files ({elapsed})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let summary = indexer
        .analyze_with_progress(options, |done, total| {
            bar.set_length(total as u64);
            bar.set_position(done as u64);
        })
        .await;
    bar.finish_and_clear();

    Ok(summary?)
}

/// Load (or build) the index for `project` before running a query
pub async fn prepare_index(indexer: &Indexer, project: &str) -> Result<AnalysisSummary> {
    let options = AnalyzeOptions::new(absolute_project(project)?);
    analyze_with_bar(indexer, &options).await
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
