// Query execution engine

use regex::RegexBuilder;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;

use crate::error::{IndexError, Result};
use crate::index::store::{IndexStats, IndexStore};
use crate::index::{DependencyEdge, DependencyKind, FileRecord, HttpMethod, RouteRecord, SymbolKind, SymbolRecord};
use crate::indexer::resolver::{normalize_path, ImportResolver};

/// Upper bound for dependency traversal depth
pub const MAX_DEPENDENCY_DEPTH: usize = 10;

const STRIPPED_EXTENSIONS: &[&str] = &[".ts", ".js", ".tsx", ".jsx"];

/// A symbol matched by `search`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    #[serde(flatten)]
    pub symbol: SymbolRecord,
    /// `file:line` locations of edges mentioning the symbol name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usages: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub items: Vec<SearchHit>,
    /// Matches before truncation
    pub total_count: usize,
    #[serde(rename = "searchTime_ms")]
    pub search_time_ms: u64,
}

/// Which usage records `find_usages` keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchType {
    Imports,
    Usages,
    #[default]
    Both,
}

impl FromStr for SearchType {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "imports" => Ok(SearchType::Imports),
            "usages" => Ok(SearchType::Usages),
            "both" => Ok(SearchType::Both),
            _ => Err(IndexError::InvalidArgument(format!(
                "Unknown search type '{}', expected imports, usages or both",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UsageQuery {
    pub file_path: Option<String>,
    pub method_name: Option<String>,
    pub class_name: Option<String>,
    pub search_type: SearchType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageKind {
    Import,
    Usage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    /// Project-relative path of the file containing the edge
    pub file: String,
    pub line: usize,
    #[serde(rename = "type")]
    pub kind: UsageKind,
    pub context: String,
    pub from: String,
    pub to: String,
    pub resolved_to: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DependencyDirection {
    Incoming,
    Outgoing,
    #[default]
    Both,
}

impl DependencyDirection {
    fn includes_incoming(self) -> bool {
        matches!(self, DependencyDirection::Incoming | DependencyDirection::Both)
    }

    fn includes_outgoing(self) -> bool {
        matches!(self, DependencyDirection::Outgoing | DependencyDirection::Both)
    }
}

impl FromStr for DependencyDirection {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "incoming" => Ok(DependencyDirection::Incoming),
            "outgoing" => Ok(DependencyDirection::Outgoing),
            "both" => Ok(DependencyDirection::Both),
            _ => Err(IndexError::InvalidArgument(format!(
                "Unknown direction '{}', expected incoming, outgoing or both",
                s
            ))),
        }
    }
}

/// Result of a bounded dependency traversal
#[derive(Debug, Clone, Default, Serialize)]
pub struct DependencyGraph {
    pub entity: String,
    pub incoming: Vec<DependencyEdge>,
    pub outgoing: Vec<DependencyEdge>,
    /// Adjacency from importing file to imported target
    pub graph: BTreeMap<String, Vec<String>>,
}

fn link(graph: &mut BTreeMap<String, Vec<String>>, from: &str, to: &str) {
    let targets = graph.entry(from.to_string()).or_default();
    if !targets.iter().any(|t| t == to) {
        targets.push(to.to_string());
    }
}

/// Everything recorded for one file
#[derive(Debug, Clone, Serialize)]
pub struct FileOutline {
    pub file: FileRecord,
    pub symbols: Vec<SymbolRecord>,
    pub routes: Vec<RouteRecord>,
    pub dependencies: Vec<DependencyEdge>,
}

/// Parse a kind filter; `"all"` means no filter
pub fn parse_kind_filter(kind: &str) -> Result<Option<SymbolKind>> {
    if kind.eq_ignore_ascii_case("all") {
        Ok(None)
    } else {
        kind.parse().map(Some)
    }
}

/// Read-only queries over an [`IndexStore`]
pub struct QueryEngine<'a> {
    store: &'a IndexStore,
    resolver: &'a ImportResolver,
    project_root: &'a Path,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: &'a IndexStore, resolver: &'a ImportResolver, project_root: &'a Path) -> Self {
        Self {
            store,
            resolver,
            project_root,
        }
    }

    pub fn stats(&self) -> IndexStats {
        self.store.stats()
    }

    /// Case-insensitive substring search over symbol names, best matches first
    pub fn search(
        &self,
        query: &str,
        kind: Option<SymbolKind>,
        include_usages: bool,
        limit: usize,
    ) -> Result<SearchOutcome> {
        let started = Instant::now();
        let pattern = RegexBuilder::new(&regex::escape(query))
            .case_insensitive(true)
            .build()
            .map_err(|e| IndexError::InvalidArgument(format!("Invalid search query '{}': {}", query, e)))?;

        let lowered = query.to_lowercase();
        let mut matches: Vec<(u8, &SymbolRecord)> = self
            .store
            .symbols()
            .filter(|s| kind.map_or(true, |k| s.kind == k))
            .filter(|s| pattern.is_match(&s.name))
            .map(|s| (match_rank(&s.name, &lowered), s))
            .collect();

        matches.sort_by(|(rank_a, a), (rank_b, b)| {
            rank_a
                .cmp(rank_b)
                .then(a.name.len().cmp(&b.name.len()))
                .then_with(|| a.file_path.cmp(&b.file_path))
                .then(a.line.cmp(&b.line))
        });

        let total_count = matches.len();
        let items = matches
            .into_iter()
            .take(limit)
            .map(|(_, symbol)| SearchHit {
                usages: include_usages.then(|| self.usage_locations(&symbol.name)),
                symbol: symbol.clone(),
            })
            .collect();

        Ok(SearchOutcome {
            items,
            total_count,
            search_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn usage_locations(&self, name: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.store
            .dependencies()
            .filter(|edge| edge.to.contains(name) || edge.from.contains(name))
            .map(|edge| format!("{}:{}", edge.file_path, edge.line))
            .filter(|location| seen.insert(location.clone()))
            .collect()
    }

    /// Who imports a file, or which edges mention a method or class name
    pub fn find_usages(&self, query: &UsageQuery) -> Result<Vec<UsageRecord>> {
        let name = query.method_name.as_deref().or(query.class_name.as_deref());
        if query.file_path.is_none() && name.is_none() {
            return Err(IndexError::InvalidArgument(
                "One of filePath, methodName or className is required".to_string(),
            ));
        }

        let mut records = Vec::new();

        if let Some(file_path) = query.file_path.as_deref() {
            let target = self.absolute(file_path);
            for edge in self.store.dependencies() {
                if edge.kind == DependencyKind::Import && self.edge_targets_file(edge, &target) {
                    records.push(self.usage_record(edge, UsageKind::Import));
                }
            }
        }

        for name in [query.method_name.as_deref(), query.class_name.as_deref()].into_iter().flatten() {
            for edge in self.store.dependencies() {
                if edge.to.contains(name) || edge.from.contains(name) {
                    records.push(self.usage_record(edge, UsageKind::Usage));
                }
            }
        }

        records.retain(|r| match query.search_type {
            SearchType::Imports => r.kind == UsageKind::Import,
            SearchType::Usages => r.kind == UsageKind::Usage,
            SearchType::Both => true,
        });

        let mut seen = HashSet::new();
        records.retain(|r| seen.insert((r.from.clone(), r.line, r.to.clone())));
        records.sort_by(|a, b| a.file.cmp(&b.file).then(a.line.cmp(&b.line)));
        Ok(records)
    }

    /// Resolved path first, then a fresh resolution, then a path-suffix match
    fn edge_targets_file(&self, edge: &DependencyEdge, target: &str) -> bool {
        if edge.resolved_to.as_deref() == Some(target) {
            return true;
        }
        if self.resolver.resolve_import_path(&edge.to, &edge.from).as_deref() == Some(target) {
            return true;
        }
        suffix_matches(target, edge.resolved_to.as_deref().unwrap_or(&edge.to))
    }

    fn usage_record(&self, edge: &DependencyEdge, kind: UsageKind) -> UsageRecord {
        let context = match kind {
            UsageKind::Import => format!("imports '{}'", edge.to),
            UsageKind::Usage => format!("references '{}'", edge.to),
        };
        UsageRecord {
            file: self.relative(&edge.file_path),
            line: edge.line,
            kind,
            context,
            from: edge.from.clone(),
            to: edge.to.clone(),
            resolved_to: edge.resolved_to.clone(),
        }
    }

    /// Breadth-first walk of edges whose endpoints mention `entity`, up to `depth` hops
    pub fn find_dependencies(&self, entity: &str, direction: DependencyDirection, depth: usize) -> DependencyGraph {
        let depth = depth.clamp(1, MAX_DEPENDENCY_DEPTH);
        let mut result = DependencyGraph {
            entity: entity.to_string(),
            ..DependencyGraph::default()
        };

        if direction.includes_outgoing() {
            result.outgoing = self.traverse(entity, depth, |edge, name| edge.from.contains(name), |edge| {
                edge.target().to_string()
            });
            for edge in &result.outgoing {
                link(&mut result.graph, &edge.from, edge.target());
            }
        }

        if direction.includes_incoming() {
            result.incoming = self.traverse(
                entity,
                depth,
                |edge, name| edge.to.contains(name) || edge.resolved_to.as_deref().is_some_and(|r| r.contains(name)),
                |edge| edge.from.clone(),
            );
            for edge in &result.incoming {
                link(&mut result.graph, &edge.from, edge.target());
            }
        }

        result
    }

    fn traverse(
        &self,
        entity: &str,
        depth: usize,
        matches: impl Fn(&DependencyEdge, &str) -> bool,
        next: impl Fn(&DependencyEdge) -> String,
    ) -> Vec<DependencyEdge> {
        let mut visited = HashSet::new();
        let mut seen_edges = BTreeSet::new();
        let mut edges = Vec::new();
        let mut frontier = vec![entity.to_string()];

        for _ in 0..depth {
            let mut upcoming = Vec::new();
            for name in frontier {
                if !visited.insert(name.clone()) {
                    continue;
                }
                for edge in self.store.dependencies().filter(|e| matches(e, &name)) {
                    if seen_edges.insert((edge.from.as_str(), edge.to.as_str(), edge.line)) {
                        edges.push(edge.clone());
                    }
                    upcoming.push(next(edge));
                }
            }
            if upcoming.is_empty() {
                break;
            }
            frontier = upcoming;
        }

        edges
    }

    /// Routes, optionally filtered by verb and path substring, ordered by file then line
    pub fn list_routes(&self, method: Option<HttpMethod>, path_contains: Option<&str>) -> Vec<RouteRecord> {
        let mut routes: Vec<RouteRecord> = self
            .store
            .routes()
            .filter(|r| method.map_or(true, |m| r.method == m))
            .filter(|r| path_contains.map_or(true, |p| r.path.contains(p)))
            .cloned()
            .collect();
        routes.sort_by(|a, b| a.file_path.cmp(&b.file_path).then(a.line.cmp(&b.line)));
        routes
    }

    pub fn file_outline(&self, file_path: &str) -> Option<FileOutline> {
        let path = self.absolute(file_path);
        let file = self.store.file(&path)?.clone();
        Some(FileOutline {
            file,
            symbols: self.store.symbols_in(&path).to_vec(),
            routes: self.store.routes_in(&path).to_vec(),
            dependencies: self.store.dependencies_in(&path).to_vec(),
        })
    }

    /// Absolute, normalized form of a path given relative to the project root or absolute
    fn absolute(&self, path: &str) -> String {
        let path = Path::new(path);
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        };
        normalize_path(&joined).to_string_lossy().into_owned()
    }

    fn relative(&self, path: &str) -> String {
        let relative = Path::new(path).strip_prefix(self.project_root).unwrap_or(Path::new(path));
        relative.to_string_lossy().replace('\\', "/")
    }
}

/// 0 for an exact match, 1 for a prefix match, 2 otherwise
fn match_rank(name: &str, lowered_query: &str) -> u8 {
    let lowered = name.to_lowercase();
    if lowered == lowered_query {
        0
    } else if lowered.starts_with(lowered_query) {
        1
    } else {
        2
    }
}

fn strip_source_extension(path: &str) -> &str {
    STRIPPED_EXTENSIONS
        .iter()
        .find_map(|ext| path.strip_suffix(ext))
        .unwrap_or(path)
}

/// Segment-wise suffix match with extensions stripped: `../lib/b` matches `/p/src/lib/b.ts`.
/// Bare package names never match.
fn suffix_matches(target: &str, candidate: &str) -> bool {
    let candidate_segments: Vec<&str> = strip_source_extension(candidate)
        .split('/')
        .filter(|s| !matches!(*s, "" | "." | ".." | "~" | "@"))
        .collect();
    if candidate_segments.len() < 2 && !candidate.starts_with('.') && !candidate.starts_with('/') {
        return false;
    }
    if candidate_segments.is_empty() {
        return false;
    }

    let target_segments: Vec<&str> = strip_source_extension(target).split('/').collect();
    target_segments.ends_with(&candidate_segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn edge(from: &str, to: &str, resolved_to: Option<&str>, line: usize) -> DependencyEdge {
        DependencyEdge {
            from: from.to_string(),
            to: to.to_string(),
            resolved_to: resolved_to.map(str::to_string),
            kind: DependencyKind::Import,
            file_path: from.to_string(),
            line,
        }
    }

    fn file(path: &str) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            name: path.rsplit('/').next().unwrap().to_string(),
            extension: ".ts".to_string(),
            size: 0,
            last_modified: 0,
            relative_path: path.trim_start_matches("/p/").to_string(),
        }
    }

    fn symbol(name: &str, kind: SymbolKind, file_path: &str, line: usize) -> SymbolRecord {
        SymbolRecord::new(name, kind, file_path, line, 1, name)
    }

    fn sample_store() -> IndexStore {
        let mut store = IndexStore::new();
        for path in ["/p/src/a.ts", "/p/src/b.ts", "/p/src/config.ts", "/p/src/routes.ts"] {
            store.insert_file(file(path));
        }

        store.insert_extraction(
            "/p/src/a.ts",
            vec![symbol("run", SymbolKind::Function, "/p/src/a.ts", 2)],
            vec![],
            vec![
                edge("/p/src/a.ts", "./b", Some("/p/src/b.ts"), 1),
                edge("/p/src/a.ts", "./config", Some("/p/src/config.ts"), 2),
            ],
        );
        store.insert_extraction(
            "/p/src/b.ts",
            vec![symbol("Config", SymbolKind::Interface, "/p/src/b.ts", 3)],
            vec![],
            vec![edge("/p/src/b.ts", "./a", Some("/p/src/a.ts"), 1)],
        );
        store.insert_extraction(
            "/p/src/config.ts",
            vec![
                symbol("loadConfig", SymbolKind::Function, "/p/src/config.ts", 5),
                symbol("CONFIG_INIT", SymbolKind::Variable, "/p/src/config.ts", 1),
                symbol("config", SymbolKind::Variable, "/p/src/config.ts", 9),
            ],
            vec![],
            vec![edge("/p/src/config.ts", "lodash", None, 1)],
        );
        store.insert_extraction(
            "/p/src/routes.ts",
            vec![],
            vec![
                RouteRecord {
                    path: "/users/:id".to_string(),
                    method: HttpMethod::Post,
                    file_path: "/p/src/routes.ts".to_string(),
                    line: 4,
                    handler: Some("updateUser".to_string()),
                    middleware: None,
                },
                RouteRecord {
                    path: "/health".to_string(),
                    method: HttpMethod::Get,
                    file_path: "/p/src/routes.ts".to_string(),
                    line: 2,
                    handler: None,
                    middleware: None,
                },
            ],
            vec![],
        );
        store
    }

    fn with_engine<R>(run: impl FnOnce(&QueryEngine<'_>) -> R) -> R {
        let store = sample_store();
        let resolver = ImportResolver::new();
        let root = PathBuf::from("/p");
        run(&QueryEngine::new(&store, &resolver, &root))
    }

    #[test]
    fn test_search_is_case_insensitive_and_ranked() {
        with_engine(|engine| {
            let outcome = engine.search("config", None, false, 50).unwrap();
            let names: Vec<&str> = outcome.items.iter().map(|h| h.symbol.name.as_str()).collect();
            assert_eq!(outcome.total_count, 4);
            assert_eq!(names, vec!["Config", "config", "CONFIG_INIT", "loadConfig"]);
            assert!(outcome.items.iter().all(|h| h.usages.is_none()));

            let wire = serde_json::to_value(&outcome).unwrap();
            assert_eq!(wire["totalCount"], 4);
            assert!(wire.get("searchTime_ms").is_some());
            assert_eq!(wire["items"][0]["name"], "Config");
        });
    }

    #[test]
    fn test_search_kind_filter_limit_and_usages() {
        with_engine(|engine| {
            let functions = engine.search("config", Some(SymbolKind::Function), false, 50).unwrap();
            assert_eq!(functions.total_count, 1);
            assert_eq!(functions.items[0].symbol.name, "loadConfig");

            let limited = engine.search("config", None, false, 2).unwrap();
            assert_eq!(limited.items.len(), 2);
            assert_eq!(limited.total_count, 4);

            let with_usages = engine.search("config", Some(SymbolKind::Variable), true, 50).unwrap();
            let config = with_usages.items.iter().find(|h| h.symbol.name == "config").unwrap();
            assert_eq!(
                config.usages.as_deref(),
                Some(&["/p/src/a.ts:2".to_string(), "/p/src/config.ts:1".to_string()][..])
            );
        });
    }

    #[test]
    fn test_search_escapes_regex_characters() {
        with_engine(|engine| {
            let outcome = engine.search("conf.g", None, false, 50).unwrap();
            assert_eq!(outcome.total_count, 0);
        });
    }

    #[test]
    fn test_kind_filter_parsing() {
        assert_eq!(parse_kind_filter("all").unwrap(), None);
        assert_eq!(parse_kind_filter("method").unwrap(), Some(SymbolKind::Method));
        assert!(parse_kind_filter("widget").is_err());
    }

    #[test]
    fn test_find_usages_by_relative_file_path() {
        with_engine(|engine| {
            let records = engine
                .find_usages(&UsageQuery {
                    file_path: Some("src/b.ts".to_string()),
                    search_type: SearchType::Imports,
                    ..UsageQuery::default()
                })
                .unwrap();

            assert_eq!(records.len(), 1);
            assert_eq!(records[0].file, "src/a.ts");
            assert_eq!(records[0].line, 1);
            assert_eq!(records[0].kind, UsageKind::Import);
            assert_eq!(records[0].resolved_to.as_deref(), Some("/p/src/b.ts"));
        });
    }

    #[test]
    fn test_find_usages_by_name_and_search_type() {
        with_engine(|engine| {
            let usages = engine
                .find_usages(&UsageQuery {
                    class_name: Some("config".to_string()),
                    ..UsageQuery::default()
                })
                .unwrap();
            let locations: Vec<(&str, usize)> = usages.iter().map(|u| (u.file.as_str(), u.line)).collect();
            assert_eq!(locations, vec![("src/a.ts", 2), ("src/config.ts", 1)]);
            assert!(usages.iter().all(|u| u.kind == UsageKind::Usage));

            let imports_only = engine
                .find_usages(&UsageQuery {
                    class_name: Some("config".to_string()),
                    search_type: SearchType::Imports,
                    ..UsageQuery::default()
                })
                .unwrap();
            assert!(imports_only.is_empty());
        });
    }

    #[test]
    fn test_find_usages_requires_a_target() {
        with_engine(|engine| {
            let err = engine.find_usages(&UsageQuery::default()).unwrap_err();
            assert!(matches!(err, IndexError::InvalidArgument(_)));
        });
    }

    #[test]
    fn test_find_dependencies_directions() {
        with_engine(|engine| {
            let graph = engine.find_dependencies("/p/src/config.ts", DependencyDirection::Incoming, 1);
            assert_eq!(graph.incoming.len(), 1);
            assert_eq!(graph.incoming[0].from, "/p/src/a.ts");
            assert!(graph.outgoing.is_empty());

            let graph = engine.find_dependencies("/p/src/a.ts", DependencyDirection::Outgoing, 2);
            let targets: Vec<&str> = graph.outgoing.iter().map(|e| e.target()).collect();
            assert!(targets.contains(&"/p/src/b.ts"));
            assert!(targets.contains(&"/p/src/config.ts"));
            assert!(targets.contains(&"lodash"));
            assert_eq!(
                graph.graph.get("/p/src/a.ts"),
                Some(&vec!["/p/src/b.ts".to_string(), "/p/src/config.ts".to_string()])
            );
        });
    }

    #[test]
    fn test_find_dependencies_terminates_on_cycles() {
        with_engine(|engine| {
            for depth in 0..=12 {
                let graph = engine.find_dependencies("/p/src/a.ts", DependencyDirection::Both, depth);
                let mut keys: Vec<_> = graph.outgoing.iter().map(|e| (&e.from, &e.to, e.line)).collect();
                let before = keys.len();
                keys.sort();
                keys.dedup();
                assert_eq!(keys.len(), before, "duplicate edge at depth {}", depth);
            }
        });
    }

    #[test]
    fn test_list_routes_and_outline() {
        with_engine(|engine| {
            let routes = engine.list_routes(None, None);
            assert_eq!(routes.iter().map(|r| r.line).collect::<Vec<_>>(), vec![2, 4]);

            let posts = engine.list_routes(Some(HttpMethod::Post), Some("users"));
            assert_eq!(posts.len(), 1);
            assert_eq!(posts[0].handler.as_deref(), Some("updateUser"));

            let outline = engine.file_outline("src/config.ts").unwrap();
            assert_eq!(outline.symbols.len(), 3);
            assert_eq!(outline.dependencies.len(), 1);
            assert!(engine.file_outline("/p/src/missing.ts").is_none());
        });
    }

    #[test]
    fn test_suffix_matching() {
        assert!(suffix_matches("/p/src/lib/b.ts", "../lib/b"));
        assert!(suffix_matches("/p/src/lib/b.ts", "@/lib/b.js"));
        assert!(!suffix_matches("/p/src/lib/b.ts", "b"));
        assert!(!suffix_matches("/p/src/lib/ab.ts", "./b"));
    }
}
