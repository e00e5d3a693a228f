use anyhow::Result;
use tracing::info;

use super::{absolute_project, analyze_with_bar, print_json, OutputFormat};
use crate::indexer::{AnalyzeOptions, Indexer};

pub async fn index_project(
    indexer: &Indexer,
    project: String,
    include: Vec<String>,
    exclude: Vec<String>,
    force: bool,
    format: OutputFormat,
) -> Result<()> {
    let project_path = absolute_project(&project)?;
    info!("Indexing project: {}", project_path);

    let options = AnalyzeOptions {
        project_path: project_path.clone(),
        include_patterns: include,
        exclude_patterns: exclude,
        force_reindex: force,
    };
    let summary = analyze_with_bar(indexer, &options).await?;

    if format == OutputFormat::Json {
        return print_json(&summary);
    }

    println!("tsgraph {}", env!("CARGO_PKG_VERSION"));
    println!("Project: {}", project_path);
    println!(
        "Index: {}",
        if summary.from_cache { "restored from cache" } else { "rebuilt" }
    );
    println!("  Files:        {}", summary.total_files);
    println!("  Symbols:      {}", summary.total_methods);
    println!("  Routes:       {}", summary.total_paths);
    println!("  Dependencies: {}", summary.total_dependencies);
    println!("  Duration:     {}ms", summary.duration_ms);

    Ok(())
}
