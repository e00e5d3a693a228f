use anyhow::Result;

use super::{prepare_index, print_json, OutputFormat};
use crate::indexer::Indexer;

pub async fn show_stats(indexer: &Indexer, project: String, verbose: bool, format: OutputFormat) -> Result<()> {
    let summary = prepare_index(indexer, &project).await?;
    let stats = indexer.stats();

    if format == OutputFormat::Json {
        return print_json(&stats);
    }

    println!("tsgraph statistics");
    println!("Project: {}", project);
    println!("Index: {}", if summary.from_cache { "cached" } else { "fresh" });

    println!("\nIndex Statistics:");
    println!("  Total files: {}", stats.total_files);
    println!("  Total symbols: {}", stats.total_symbols);
    println!("  Total routes: {}", stats.total_routes);
    println!(
        "  Total dependencies: {} ({} resolved)",
        stats.total_dependencies, stats.resolved_dependencies
    );

    if verbose {
        println!("\nDetailed Statistics:");
        if !stats.symbols_by_kind.is_empty() {
            println!("  Symbols by kind:");
            let mut by_kind: Vec<_> = stats.symbols_by_kind.iter().collect();
            by_kind.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
            for (kind, count) in by_kind {
                println!("    {}: {}", kind, count);
            }
        }

        if let Some(indexed_at) = chrono::DateTime::from_timestamp_millis(stats.last_indexed) {
            println!("  Last indexed: {}", indexed_at.to_rfc3339());
        }
        println!("  Cache directory: {}", indexer.cache().dir().display());
    }

    Ok(())
}
