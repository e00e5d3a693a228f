use anyhow::Result;

use super::{prepare_index, print_json, OutputFormat};
use crate::index::HttpMethod;
use crate::indexer::Indexer;
use crate::query::engine::{parse_kind_filter, DependencyDirection, SearchType, UsageQuery};

pub async fn search(
    indexer: &Indexer,
    project: String,
    query: String,
    kind: String,
    usages: bool,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    prepare_index(indexer, &project).await?;
    let kind = parse_kind_filter(&kind)?;
    let limit = limit.min(indexer.config().query.search_limit);
    let outcome = indexer.query(|engine| engine.search(&query, kind, usages, limit))??;

    if format == OutputFormat::Json {
        return print_json(&outcome);
    }

    if outcome.items.is_empty() {
        println!("No symbols found matching '{}'", query);
        return Ok(());
    }

    println!(
        "Found {} symbols matching '{}' (showing {}, {}ms):",
        outcome.total_count,
        query,
        outcome.items.len(),
        outcome.search_time_ms
    );
    for hit in &outcome.items {
        let symbol = &hit.symbol;
        println!("  {}:{} - {} ({})", symbol.file_path, symbol.line, symbol.name, symbol.kind);
        if let Some(locations) = &hit.usages {
            for location in locations {
                println!("      used at {}", location);
            }
        }
    }

    Ok(())
}

pub async fn usages(
    indexer: &Indexer,
    project: String,
    query: UsageQuery,
    format: OutputFormat,
) -> Result<()> {
    prepare_index(indexer, &project).await?;
    let mut records = indexer.query(|engine| engine.find_usages(&query))??;
    let total = records.len();
    records.truncate(indexer.config().query.usage_limit);

    if format == OutputFormat::Json {
        return print_json(&records);
    }

    if records.is_empty() {
        println!("No usages found");
        return Ok(());
    }

    println!("Found {} usages:", total);
    for record in records {
        println!("  {}:{} [{:?}] {}", record.file, record.line, record.kind, record.context);
    }

    Ok(())
}

pub fn parse_search_type(value: &str) -> Result<SearchType> {
    Ok(value.parse()?)
}

pub async fn dependencies(
    indexer: &Indexer,
    project: String,
    entity: String,
    direction: String,
    depth: usize,
    format: OutputFormat,
) -> Result<()> {
    prepare_index(indexer, &project).await?;
    let direction: DependencyDirection = direction.parse()?;
    let depth = depth.min(indexer.config().query.max_depth);
    let graph = indexer.query(|engine| engine.find_dependencies(&entity, direction, depth))?;

    if format == OutputFormat::Json {
        return print_json(&graph);
    }

    println!("Dependencies of '{}':", graph.entity);
    println!("  Outgoing ({}):", graph.outgoing.len());
    for edge in &graph.outgoing {
        println!("    {}:{} -> {}", edge.from, edge.line, edge.target());
    }
    println!("  Incoming ({}):", graph.incoming.len());
    for edge in &graph.incoming {
        println!("    {}:{} -> {}", edge.from, edge.line, edge.target());
    }

    Ok(())
}

pub async fn routes(
    indexer: &Indexer,
    project: String,
    method: Option<String>,
    path_contains: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    prepare_index(indexer, &project).await?;
    let method = method.as_deref().map(str::parse::<HttpMethod>).transpose()?;
    let routes = indexer.query(|engine| engine.list_routes(method, path_contains.as_deref()))?;

    if format == OutputFormat::Json {
        return print_json(&routes);
    }

    if routes.is_empty() {
        println!("No routes found");
        return Ok(());
    }

    for route in routes {
        println!(
            "  {:<7} {:<40} {}:{}{}",
            route.method.as_str(),
            route.path,
            route.file_path,
            route.line,
            route.handler.map(|h| format!(" -> {}", h)).unwrap_or_default()
        );
    }

    Ok(())
}
