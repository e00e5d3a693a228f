// Analysis pipeline: discovery, batched extraction and snapshot caching

pub mod discovery;
pub mod parser;
pub mod resolver;

use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{IndexError, Result};
use crate::index::cache::{now_ms, CacheStore};
use crate::index::store::{IndexSnapshot, IndexStats, IndexStore};
use crate::index::FileRecord;
use crate::query::engine::QueryEngine;

use discovery::{discover, file_record, FileFilter};
use parser::{Extraction, TypeScriptParser};
use resolver::{normalize_path, ImportResolver};

/// Inputs of one `analyze` call. Empty pattern lists fall back to the configured defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzeOptions {
    pub project_path: String,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub force_reindex: bool,
}

impl AnalyzeOptions {
    pub fn new(project_path: impl Into<String>) -> Self {
        Self {
            project_path: project_path.into(),
            ..Self::default()
        }
    }
}

/// Totals reported after an analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub total_files: usize,
    /// Every symbol record, not only methods
    pub total_methods: usize,
    pub total_paths: usize,
    pub total_dependencies: usize,
    #[serde(rename = "duration_ms")]
    pub duration_ms: u64,
    pub from_cache: bool,
}

impl AnalysisSummary {
    fn from_stats(stats: &IndexStats, started: Instant, from_cache: bool) -> Self {
        Self {
            total_files: stats.total_files,
            total_methods: stats.total_symbols,
            total_paths: stats.total_routes,
            total_dependencies: stats.total_dependencies,
            duration_ms: started.elapsed().as_millis() as u64,
            from_cache,
        }
    }
}

/// Output of processing a single discovered file
struct ProcessedFile {
    record: FileRecord,
    extraction: Option<Extraction>,
}

/// Long-lived engine state: the current index, the import resolver for the
/// analyzed project and the snapshot cache.
pub struct Indexer {
    config: Config,
    store: RwLock<IndexStore>,
    resolver: RwLock<Arc<ImportResolver>>,
    project_root: RwLock<Option<PathBuf>>,
    cache: CacheStore,
}

impl Indexer {
    pub fn new(config: Config) -> Self {
        let cache = CacheStore::new(config.cache.resolved_directory());
        Self {
            config,
            store: RwLock::new(IndexStore::new()),
            resolver: RwLock::new(Arc::new(ImportResolver::new())),
            project_root: RwLock::new(None),
            cache,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Root of the most recently analyzed project
    pub fn project_root(&self) -> Option<PathBuf> {
        self.project_root.read().clone()
    }

    /// Drop the current index and resolver state
    pub fn reset(&self) {
        self.store.write().clear();
        *self.resolver.write() = Arc::new(ImportResolver::new());
        *self.project_root.write() = None;
        debug!("Indexer state reset");
    }

    pub async fn analyze(&self, options: &AnalyzeOptions) -> Result<AnalysisSummary> {
        self.analyze_with_progress(options, |_, _| {}).await
    }

    /// Analyze a project, reporting `(processed, total)` after each file.
    ///
    /// An unexpired cached snapshot for the same path and patterns is restored
    /// instead of re-scanning, unless `force_reindex` is set.
    pub async fn analyze_with_progress<F>(&self, options: &AnalyzeOptions, progress: F) -> Result<AnalysisSummary>
    where
        F: Fn(usize, usize) + Send + Sync,
    {
        let started = Instant::now();
        let root = validate_project_path(&options.project_path)?;
        let root_str = root.to_string_lossy().into_owned();

        let include = non_empty_or(&options.include_patterns, &self.config.indexing.include);
        let exclude = non_empty_or(&options.exclude_patterns, &self.config.indexing.exclude);
        let filter = FileFilter::new(&include, &exclude)?;
        let key = cache_key(&root_str, &include, &exclude)?;

        if options.force_reindex {
            info!("Forced reindex of {}", root.display());
            self.reset();
            self.cache.delete(&key).await;
        }

        let resolver = Arc::new(ImportResolver::load(&root));
        *self.resolver.write() = Arc::clone(&resolver);
        *self.project_root.write() = Some(root.clone());

        if !options.force_reindex && self.config.cache.enabled {
            if let Some(snapshot) = self.cache.get::<IndexSnapshot>(&key).await {
                let store = IndexStore::from_snapshot(snapshot);
                let summary = AnalysisSummary::from_stats(&store.stats(), started, true);
                *self.store.write() = store;
                info!("Restored index for {} from cache ({} files)", root.display(), summary.total_files);
                return Ok(summary);
            }
        }

        let files = discover(&root, &filter);
        let total = files.len();
        info!("Analyzing {} files under {}", total, root.display());

        let parser = TypeScriptParser::new(resolver);
        let batch_size = self.config.indexing.batch_size.max(1);
        let mut store = IndexStore::new();
        let mut done = 0;

        for batch in files.chunks(batch_size) {
            let tasks = batch.iter().map(|path| {
                let parser = parser.clone();
                let root = root.clone();
                let path = path.clone();
                tokio::spawn(async move { process_file(&parser, &root, &path).await })
            });

            for (path, outcome) in batch.iter().zip(join_all(tasks).await) {
                match outcome {
                    Ok(Ok(processed)) => {
                        let file_path = processed.record.path.clone();
                        store.insert_file(processed.record);
                        if let Some(extraction) = processed.extraction {
                            store.insert_extraction(
                                &file_path,
                                extraction.symbols,
                                extraction.routes,
                                extraction.dependencies,
                            );
                        }
                    }
                    Ok(Err(e)) => warn!("Skipping {}: {}", path.display(), e),
                    Err(e) => warn!("Extraction task for {} failed: {}", path.display(), e),
                }
                done += 1;
                progress(done, total);
            }
        }

        store.set_last_indexed(now_ms());
        let summary = AnalysisSummary::from_stats(&store.stats(), started, false);
        let snapshot = self.config.cache.enabled.then(|| store.to_snapshot());
        *self.store.write() = store;

        if let Some(snapshot) = snapshot {
            if let Err(e) = self.cache.set(&key, &snapshot, Some(self.config.cache.ttl_ms)).await {
                warn!("Failed to cache index snapshot: {}", e);
            }
        }

        info!(
            "Indexed {} files: {} symbols, {} routes, {} dependencies in {}ms",
            summary.total_files, summary.total_methods, summary.total_paths, summary.total_dependencies, summary.duration_ms
        );
        Ok(summary)
    }

    /// Run queries against the current index
    pub fn query<R>(&self, run: impl FnOnce(&QueryEngine<'_>) -> R) -> Result<R> {
        let root = self.project_root().ok_or(IndexError::NotAnalyzed)?;
        let resolver = Arc::clone(&self.resolver.read());
        let store = self.store.read();
        let engine = QueryEngine::new(&store, &resolver, &root);
        Ok(run(&engine))
    }

    pub fn stats(&self) -> IndexStats {
        self.store.read().stats()
    }
}

/// Reject relative paths before touching the filesystem, then require a directory
fn validate_project_path(project_path: &str) -> Result<PathBuf> {
    let path = Path::new(project_path);
    if !path.is_absolute() {
        return Err(IndexError::RelativeProjectPath(project_path.to_string()));
    }
    if !path.is_dir() {
        return Err(IndexError::NotADirectory(path.to_path_buf()));
    }
    Ok(normalize_path(path))
}

fn non_empty_or(patterns: &[String], defaults: &[String]) -> Vec<String> {
    if patterns.is_empty() {
        defaults.to_vec()
    } else {
        patterns.to_vec()
    }
}

/// `analysis_<hash>_<path>`, where the hash covers the path and both pattern lists
fn cache_key(project_path: &str, include: &[String], exclude: &[String]) -> Result<String> {
    let options = serde_json::to_string(&serde_json::json!({
        "includePatterns": include,
        "excludePatterns": exclude,
    }))?;

    let mut hasher = blake3::Hasher::new();
    hasher.update(project_path.as_bytes());
    hasher.update(options.as_bytes());
    let hash = hasher.finalize().to_hex();

    Ok(format!("analysis_{}_{}", &hash.as_str()[..16], project_path))
}

async fn process_file(parser: &TypeScriptParser, root: &Path, path: &Path) -> std::io::Result<ProcessedFile> {
    let metadata = tokio::fs::metadata(path).await?;
    let record = file_record(root, path, &metadata);

    let extraction = if parser.can_parse(&record.path) {
        let content = tokio::fs::read_to_string(path).await?;
        Some(parser.parse(&content, &record.path))
    } else {
        None
    };

    Ok(ProcessedFile { record, extraction })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::{tempdir, TempDir};

    fn test_indexer(cache_dir: &TempDir) -> Indexer {
        let mut config = Config::default();
        config.cache.directory = Some(cache_dir.path().to_path_buf());
        config.indexing.batch_size = 2;
        Indexer::new(config)
    }

    fn write_project(dir: &Path) {
        std::fs::create_dir_all(dir.join("src")).unwrap();
        std::fs::create_dir_all(dir.join("node_modules/dep")).unwrap();
        std::fs::write(
            dir.join("src/a.ts"),
            "import { b } from './b';\nexport function run(): void {\n  b();\n}\n",
        )
        .unwrap();
        std::fs::write(dir.join("src/b.ts"), "export const b = () => 1;\n").unwrap();
        std::fs::write(
            dir.join("src/routes.js"),
            "const r = require('express').Router();\nr.get('/health', health);\n",
        )
        .unwrap();
        std::fs::write(dir.join("node_modules/dep/index.ts"), "export function dep() {}\n").unwrap();
    }

    #[tokio::test]
    async fn test_relative_path_is_rejected() {
        let cache = tempdir().unwrap();
        let indexer = test_indexer(&cache);

        let err = indexer.analyze(&AnalyzeOptions::new("relative/project")).await.unwrap_err();
        assert!(matches!(err, IndexError::RelativeProjectPath(_)));
        assert!(indexer.project_root().is_none());
    }

    #[tokio::test]
    async fn test_missing_directory_is_rejected() {
        let cache = tempdir().unwrap();
        let indexer = test_indexer(&cache);
        let missing = cache.path().join("does-not-exist");

        let err = indexer
            .analyze(&AnalyzeOptions::new(missing.to_string_lossy()))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::NotADirectory(_)));
    }

    #[tokio::test]
    async fn test_analyze_builds_index() {
        let project = tempdir().unwrap();
        let cache = tempdir().unwrap();
        write_project(project.path());

        let indexer = test_indexer(&cache);
        let calls = AtomicUsize::new(0);
        let summary = indexer
            .analyze_with_progress(&AnalyzeOptions::new(project.path().to_string_lossy()), |done, total| {
                assert!(done <= total);
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert_eq!(summary.total_files, 3);
        assert_eq!(summary.total_methods, 2);
        assert_eq!(summary.total_paths, 1);
        assert_eq!(summary.total_dependencies, 2);
        assert!(!summary.from_cache);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let stats = indexer.stats();
        assert_eq!(stats.resolved_dependencies, 1);
        assert!(stats.last_indexed > 0);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_skipped() {
        let project = tempdir().unwrap();
        let cache = tempdir().unwrap();
        std::fs::create_dir_all(project.path().join("src")).unwrap();
        std::fs::write(project.path().join("src/bad.ts"), [0xff, 0xfe, b'{', 0x80]).unwrap();
        std::fs::write(project.path().join("src/ok.ts"), "export function ok() {}\n").unwrap();

        let indexer = test_indexer(&cache);
        let calls = AtomicUsize::new(0);
        let summary = indexer
            .analyze_with_progress(&AnalyzeOptions::new(project.path().to_string_lossy()), |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert_eq!(summary.total_files, 1);
        assert_eq!(summary.total_methods, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let outline = indexer.query(|q| q.file_outline("src/bad.ts")).unwrap();
        assert!(outline.is_none());
    }

    #[test]
    fn test_summary_wire_names() {
        let summary = AnalysisSummary {
            total_files: 2,
            total_methods: 5,
            total_paths: 1,
            total_dependencies: 3,
            duration_ms: 12,
            from_cache: false,
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["totalFiles"], 2);
        assert_eq!(value["duration_ms"], 12);
        assert_eq!(value["fromCache"], false);
        assert!(value.get("durationMs").is_none());
    }

    #[tokio::test]
    async fn test_second_analysis_restores_from_cache() {
        let project = tempdir().unwrap();
        let cache = tempdir().unwrap();
        write_project(project.path());
        let options = AnalyzeOptions::new(project.path().to_string_lossy());

        let first = test_indexer(&cache).analyze(&options).await.unwrap();

        std::fs::write(project.path().join("src/c.ts"), "export class C {}\n").unwrap();
        let fresh = test_indexer(&cache);
        let second = fresh.analyze(&options).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.total_files, first.total_files);

        let forced = fresh
            .analyze(&AnalyzeOptions {
                force_reindex: true,
                ..options.clone()
            })
            .await
            .unwrap();
        assert!(!forced.from_cache);
        assert_eq!(forced.total_files, first.total_files + 1);
    }

    #[tokio::test]
    async fn test_patterns_change_the_cache_key() {
        let project = tempdir().unwrap();
        let cache = tempdir().unwrap();
        write_project(project.path());
        let indexer = test_indexer(&cache);

        indexer
            .analyze(&AnalyzeOptions::new(project.path().to_string_lossy()))
            .await
            .unwrap();

        let only_ts = AnalyzeOptions {
            include_patterns: vec!["**/*.ts".to_string()],
            ..AnalyzeOptions::new(project.path().to_string_lossy())
        };
        let summary = indexer.analyze(&only_ts).await.unwrap();
        assert!(!summary.from_cache);
        assert_eq!(summary.total_files, 2);
    }

    #[tokio::test]
    async fn test_query_requires_analysis() {
        let cache = tempdir().unwrap();
        let indexer = test_indexer(&cache);
        assert!(matches!(indexer.query(|q| q.stats()), Err(IndexError::NotAnalyzed)));
    }

    #[test]
    fn test_cache_key_shape() {
        let include = vec!["**/*.ts".to_string()];
        let key = cache_key("/p", &include, &[]).unwrap();
        assert!(key.starts_with("analysis_"));
        assert!(key.ends_with("_/p"));
        assert_eq!(key.len(), "analysis_".len() + 16 + "_/p".len());

        let other = cache_key("/p", &[], &include).unwrap();
        assert_ne!(key, other);
    }
}
