use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

use tsgraph::config::Config;
use tsgraph::index::{HttpMethod, SymbolKind};
use tsgraph::query::engine::{DependencyDirection, SearchType, UsageQuery};
use tsgraph::{AnalyzeOptions, IndexError, Indexer};

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn indexer_with_cache(cache: &TempDir) -> Indexer {
    let mut config = Config::default();
    config.cache.directory = Some(cache.path().to_path_buf());
    Indexer::new(config)
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[tokio::test]
async fn test_two_file_project() {
    let project = tempdir().unwrap();
    let cache = tempdir().unwrap();
    std::fs::create_dir_all(project.path().join("src")).unwrap();
    std::fs::write(project.path().join("src/a.ts"), "import { b } from './b';\nb();\n").unwrap();
    std::fs::write(project.path().join("src/b.ts"), "export function b() {}\n").unwrap();

    let indexer = indexer_with_cache(&cache);
    let summary = indexer.analyze(&AnalyzeOptions::new(path_str(project.path()))).await.unwrap();
    assert_eq!(summary.total_files, 2);
    assert_eq!(summary.total_dependencies, 1);

    let a = path_str(&project.path().join("src/a.ts"));
    let b = path_str(&project.path().join("src/b.ts"));
    let outline = indexer.query(|q| q.file_outline(&a)).unwrap().unwrap();
    let edge = &outline.dependencies[0];
    assert_eq!(edge.from, a);
    assert_eq!(edge.to, "./b");
    assert_eq!(edge.resolved_to.as_deref(), Some(b.as_str()));

    let usages = indexer
        .query(|q| {
            q.find_usages(&UsageQuery {
                file_path: Some("src/b.ts".to_string()),
                search_type: SearchType::Imports,
                ..UsageQuery::default()
            })
        })
        .unwrap()
        .unwrap();
    assert_eq!(usages.len(), 1);
    assert_eq!(usages[0].file, "src/a.ts");
    assert_eq!(usages[0].line, 1);
}

#[tokio::test]
async fn test_fixture_extraction_totals() {
    let cache = tempdir().unwrap();
    let indexer = indexer_with_cache(&cache);
    let root = fixture_path("ts_app");

    let summary = indexer.analyze(&AnalyzeOptions::new(path_str(&root))).await.unwrap();
    assert_eq!(summary.total_files, 4);
    assert_eq!(summary.total_methods, 13);
    assert_eq!(summary.total_paths, 3);
    assert_eq!(summary.total_dependencies, 7);
    assert_eq!(indexer.stats().resolved_dependencies, 5);
    assert_eq!(indexer.stats().symbols_by_kind.get("method"), Some(&4));
}

#[tokio::test]
async fn test_fixture_alias_resolution() {
    let cache = tempdir().unwrap();
    let indexer = indexer_with_cache(&cache);
    let root = fixture_path("ts_app");
    indexer.analyze(&AnalyzeOptions::new(path_str(&root))).await.unwrap();

    let outline = indexer.query(|q| q.file_outline("src/index.ts")).unwrap().unwrap();
    let resolved: Vec<(&str, Option<&str>)> = outline
        .dependencies
        .iter()
        .map(|d| (d.to.as_str(), d.resolved_to.as_deref()))
        .collect();

    let src = root.join("src");
    assert_eq!(
        resolved,
        vec![
            ("express", None),
            ("#config", Some(path_str(&src.join("config.ts")).as_str())),
            (
                "@/services/user.service",
                Some(path_str(&src.join("services/user.service.ts")).as_str())
            ),
            (
                "./controllers/users.controller",
                Some(path_str(&src.join("controllers/users.controller.ts")).as_str())
            ),
        ]
    );
}

#[tokio::test]
async fn test_fixture_queries() {
    let cache = tempdir().unwrap();
    let indexer = indexer_with_cache(&cache);
    indexer
        .analyze(&AnalyzeOptions::new(path_str(&fixture_path("ts_app"))))
        .await
        .unwrap();

    let search = indexer.query(|q| q.search("config", None, false, 50)).unwrap().unwrap();
    let names: Vec<&str> = search.items.iter().map(|h| h.symbol.name.as_str()).collect();
    assert_eq!(names, vec!["Config", "ConfigKey", "loadConfig"]);

    let classes = indexer
        .query(|q| q.search("user", Some(SymbolKind::Class), false, 50))
        .unwrap()
        .unwrap();
    let names: Vec<&str> = classes.items.iter().map(|h| h.symbol.name.as_str()).collect();
    assert_eq!(names, vec!["UserService", "UsersController"]);

    let importers = indexer
        .query(|q| {
            q.find_usages(&UsageQuery {
                file_path: Some("src/config.ts".to_string()),
                search_type: SearchType::Imports,
                ..UsageQuery::default()
            })
        })
        .unwrap()
        .unwrap();
    let locations: Vec<(&str, usize)> = importers.iter().map(|u| (u.file.as_str(), u.line)).collect();
    assert_eq!(locations, vec![("src/index.ts", 2), ("src/services/user.service.ts", 1)]);

    let shallow = indexer
        .query(|q| q.find_dependencies("index.ts", DependencyDirection::Outgoing, 1))
        .unwrap();
    assert_eq!(shallow.outgoing.len(), 4);
    let deep = indexer
        .query(|q| q.find_dependencies("index.ts", DependencyDirection::Outgoing, 2))
        .unwrap();
    assert_eq!(deep.outgoing.len(), 7);

    let incoming = indexer
        .query(|q| q.find_dependencies("config.ts", DependencyDirection::Incoming, 1))
        .unwrap();
    assert_eq!(incoming.incoming.len(), 2);

    let routes = indexer.query(|q| q.list_routes(Some(HttpMethod::Get), None)).unwrap();
    let paths: Vec<&str> = routes.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths, vec!["/users/:id", "/users"]);
}

#[tokio::test]
async fn test_cached_snapshot_matches_fresh_index() {
    let cache = tempdir().unwrap();
    let options = AnalyzeOptions::new(path_str(&fixture_path("ts_app")));

    let first = indexer_with_cache(&cache);
    let fresh = first.analyze(&options).await.unwrap();
    assert!(!fresh.from_cache);

    let second = indexer_with_cache(&cache);
    let restored = second.analyze(&options).await.unwrap();
    assert!(restored.from_cache);
    assert_eq!(restored.total_methods, fresh.total_methods);

    let first_stats = first.stats();
    let second_stats = second.stats();
    assert_eq!(first_stats.total_dependencies, second_stats.total_dependencies);
    assert_eq!(first_stats.symbols_by_kind, second_stats.symbols_by_kind);
    assert_eq!(first_stats.last_indexed, second_stats.last_indexed);
}

#[tokio::test]
async fn test_relative_project_path_is_rejected() {
    let cache = tempdir().unwrap();
    let indexer = indexer_with_cache(&cache);

    let err = indexer.analyze(&AnalyzeOptions::new("tests/fixtures/ts_app")).await.unwrap_err();
    assert!(matches!(err, IndexError::RelativeProjectPath(_)));
    assert!(err.to_string().contains("tests/fixtures/ts_app"));
}
