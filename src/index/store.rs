// In-memory index of files, symbols, routes and dependency edges

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{DependencyEdge, FileRecord, RouteRecord, SymbolRecord};

/// The full index for one analyzed project, keyed by absolute file path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStore {
    files: BTreeMap<String, FileRecord>,
    symbols: BTreeMap<String, Vec<SymbolRecord>>,
    routes: BTreeMap<String, Vec<RouteRecord>>,
    dependencies: BTreeMap<String, Vec<DependencyEdge>>,
    last_indexed: i64,
}

/// Persisted form of an [`IndexStore`]: each mapping as an array of `[key, value]` pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSnapshot {
    pub files: Vec<(String, FileRecord)>,
    pub symbols: Vec<(String, Vec<SymbolRecord>)>,
    pub routes: Vec<(String, Vec<RouteRecord>)>,
    pub dependencies: Vec<(String, Vec<DependencyEdge>)>,
    pub last_indexed: i64,
}

/// Index statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub total_files: usize,
    pub total_symbols: usize,
    pub total_routes: usize,
    pub total_dependencies: usize,
    pub resolved_dependencies: usize,
    pub symbols_by_kind: BTreeMap<String, usize>,
    pub last_indexed: i64,
}

impl IndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything, including the last-indexed timestamp
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Record a file. Replaces any earlier record for the same path.
    pub fn insert_file(&mut self, record: FileRecord) {
        self.files.insert(record.path.clone(), record);
    }

    /// Store the extraction results of a file previously passed to [`insert_file`](Self::insert_file).
    pub fn insert_extraction(
        &mut self,
        path: &str,
        symbols: Vec<SymbolRecord>,
        routes: Vec<RouteRecord>,
        dependencies: Vec<DependencyEdge>,
    ) {
        debug_assert!(self.files.contains_key(path), "extraction for unrecorded file {}", path);
        self.symbols.insert(path.to_string(), symbols);
        self.routes.insert(path.to_string(), routes);
        self.dependencies.insert(path.to_string(), dependencies);
    }

    pub fn set_last_indexed(&mut self, timestamp_ms: i64) {
        self.last_indexed = timestamp_ms;
    }

    pub fn last_indexed(&self) -> i64 {
        self.last_indexed
    }

    pub fn file(&self, path: &str) -> Option<&FileRecord> {
        self.files.get(path)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &SymbolRecord> {
        self.symbols.values().flatten()
    }

    pub fn symbols_in(&self, path: &str) -> &[SymbolRecord] {
        self.symbols.get(path).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn routes(&self) -> impl Iterator<Item = &RouteRecord> {
        self.routes.values().flatten()
    }

    pub fn routes_in(&self, path: &str) -> &[RouteRecord] {
        self.routes.get(path).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &DependencyEdge> {
        self.dependencies.values().flatten()
    }

    pub fn dependencies_in(&self, path: &str) -> &[DependencyEdge] {
        self.dependencies.get(path).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn stats(&self) -> IndexStats {
        let mut symbols_by_kind = BTreeMap::new();
        for symbol in self.symbols() {
            *symbols_by_kind.entry(symbol.kind.as_str().to_string()).or_insert(0) += 1;
        }

        IndexStats {
            total_files: self.files.len(),
            total_symbols: self.symbols().count(),
            total_routes: self.routes().count(),
            total_dependencies: self.dependencies().count(),
            resolved_dependencies: self.dependencies().filter(|d| d.resolved_to.is_some()).count(),
            symbols_by_kind,
            last_indexed: self.last_indexed,
        }
    }

    /// Flatten into the persisted pair-array form
    pub fn to_snapshot(&self) -> IndexSnapshot {
        fn pairs<V: Clone>(map: &BTreeMap<String, V>) -> Vec<(String, V)> {
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        }

        IndexSnapshot {
            files: pairs(&self.files),
            symbols: pairs(&self.symbols),
            routes: pairs(&self.routes),
            dependencies: pairs(&self.dependencies),
            last_indexed: self.last_indexed,
        }
    }

    /// Rebuild the four mappings and the timestamp from a snapshot
    pub fn from_snapshot(snapshot: IndexSnapshot) -> Self {
        Self {
            files: snapshot.files.into_iter().collect(),
            symbols: snapshot.symbols.into_iter().collect(),
            routes: snapshot.routes.into_iter().collect(),
            dependencies: snapshot.dependencies.into_iter().collect(),
            last_indexed: snapshot.last_indexed,
        }
    }
}
