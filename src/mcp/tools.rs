// MCP tool handlers

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::error::{IndexError, Result};
use crate::index::HttpMethod;
use crate::indexer::{AnalyzeOptions, Indexer};
use crate::query::engine::{parse_kind_filter, DependencyDirection, SearchType, UsageQuery, MAX_DEPENDENCY_DEPTH};

type Args = Map<String, Value>;

const DEFAULT_DEPENDENCY_DEPTH: usize = 3;

/// Wrap a `{success, ...}` payload as MCP text content
pub fn tool_result(payload: Value) -> Value {
    let is_error = payload.get("success").and_then(Value::as_bool) == Some(false);
    let text = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string());
    json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error
    })
}

fn failure(message: impl std::fmt::Display) -> Value {
    json!({ "success": false, "error": message.to_string() })
}

/// Merge `success: true` into a serialized payload
fn success<T: Serialize>(payload: &T) -> Value {
    match serde_json::to_value(payload) {
        Ok(Value::Object(mut fields)) => {
            let mut object = Map::new();
            object.insert("success".to_string(), Value::Bool(true));
            object.append(&mut fields);
            Value::Object(object)
        }
        Ok(other) => json!({ "success": true, "result": other }),
        Err(e) => failure(e),
    }
}

fn respond<T: Serialize>(outcome: Result<T>) -> Value {
    match outcome {
        Ok(payload) => success(&payload),
        Err(e) => {
            debug!("Tool call failed: {}", e);
            failure(e)
        }
    }
}

fn str_arg<'a>(args: &'a Args, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn required_str<'a>(args: &'a Args, name: &str) -> Result<&'a str> {
    str_arg(args, name).ok_or_else(|| IndexError::InvalidArgument(format!("Missing required parameter '{}'", name)))
}

fn bool_arg(args: &Args, name: &str) -> bool {
    args.get(name).and_then(Value::as_bool).unwrap_or(false)
}

fn usize_arg(args: &Args, name: &str) -> Option<usize> {
    args.get(name).and_then(Value::as_u64).map(|n| n as usize)
}

fn string_list(args: &Args, name: &str) -> Vec<String> {
    args.get(name)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

/// Analyze (or restore) a project index
pub async fn analyze_project(indexer: &Indexer, args: &Args) -> Value {
    let project_path = match required_str(args, "projectPath") {
        Ok(path) => path,
        Err(e) => return failure(e),
    };

    let options = AnalyzeOptions {
        project_path: project_path.to_string(),
        include_patterns: string_list(args, "includePatterns"),
        exclude_patterns: string_list(args, "excludePatterns"),
        force_reindex: bool_arg(args, "forceReindex"),
    };

    match indexer.analyze(&options).await {
        Ok(summary) => success(&summary),
        Err(e) => {
            warn!("Analysis of {} failed: {}", project_path, e);
            failure(e)
        }
    }
}

/// Search symbols by name
pub async fn search_symbols(indexer: &Indexer, args: &Args) -> Value {
    let search_limit = indexer.config().query.search_limit;
    respond((|| {
        let query = required_str(args, "query")?;
        let kind = parse_kind_filter(str_arg(args, "kind").unwrap_or("all"))?;
        let include_usages = bool_arg(args, "includeUsages");
        let limit = usize_arg(args, "limit").unwrap_or(search_limit).min(search_limit);

        indexer.query(|engine| engine.search(query, kind, include_usages, limit))?
    })())
}

/// Find importers of a file or edges mentioning a method/class name
pub async fn find_usages(indexer: &Indexer, args: &Args) -> Value {
    let usage_limit = indexer.config().query.usage_limit;
    respond((|| {
        let search_type = match str_arg(args, "searchType") {
            Some(value) => value.parse::<SearchType>()?,
            None => SearchType::Both,
        };
        let query = UsageQuery {
            file_path: str_arg(args, "filePath").map(str::to_string),
            method_name: str_arg(args, "methodName").map(str::to_string),
            class_name: str_arg(args, "className").map(str::to_string),
            search_type,
        };

        let mut usages = indexer.query(|engine| engine.find_usages(&query))??;
        let total_count = usages.len();
        usages.truncate(usage_limit);
        Ok(json!({ "usages": usages, "totalCount": total_count }))
    })())
}

/// Bounded dependency traversal around a file or name
pub async fn find_dependencies(indexer: &Indexer, args: &Args) -> Value {
    let max_depth = indexer.config().query.max_depth.min(MAX_DEPENDENCY_DEPTH);
    respond((|| {
        let entity = required_str(args, "entityName")?;
        let direction = match str_arg(args, "direction") {
            Some(value) => value.parse::<DependencyDirection>()?,
            None => DependencyDirection::Both,
        };
        let depth = usize_arg(args, "depth").unwrap_or(DEFAULT_DEPENDENCY_DEPTH).min(max_depth);

        indexer.query(|engine| engine.find_dependencies(entity, direction, depth))
    })())
}

/// HTTP routes, optionally filtered
pub async fn list_routes(indexer: &Indexer, args: &Args) -> Value {
    respond((|| {
        let method = str_arg(args, "method").map(str::parse::<HttpMethod>).transpose()?;
        let path_contains = str_arg(args, "pathContains");

        let routes = indexer.query(|engine| engine.list_routes(method, path_contains))?;
        let total_count = routes.len();
        Ok(json!({ "routes": routes, "totalCount": total_count }))
    })())
}

/// Everything recorded for one file
pub async fn get_file_symbols(indexer: &Indexer, args: &Args) -> Value {
    respond((|| {
        let file_path = required_str(args, "filePath")?;
        indexer
            .query(|engine| engine.file_outline(file_path))?
            .ok_or_else(|| IndexError::InvalidArgument(format!("File is not in the index: {}", file_path)))
    })())
}

/// Index statistics
pub async fn index_stats(indexer: &Indexer, _args: &Args) -> Value {
    respond(indexer.query(|engine| engine.stats()))
}
