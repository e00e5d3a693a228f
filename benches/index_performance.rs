use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::path::PathBuf;
use std::sync::Arc;

use tsgraph::config::Config;
use tsgraph::indexer::parser::TypeScriptParser;
use tsgraph::indexer::resolver::ImportResolver;
use tsgraph::{AnalyzeOptions, Indexer};

fn fixture_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("ts_app")
}

/// A synthetic service file with imports, a class, methods and routes
fn synthetic_source(classes: usize) -> String {
    let mut source = String::from("import express from 'express';\nimport { Config } from '../config';\n\n");
    for i in 0..classes {
        source.push_str(&format!(
            "export class Service{i} extends Base implements Disposable {{\n\
             \x20 constructor(private readonly config: Config) {{}}\n\
             \x20 async load{i}(id: string, opts?: Options): Promise<Item{i}> {{\n\
             \x20   return this.fetch(`/items/${{id}}`);\n\
             \x20 }}\n\
             }}\n\
             router.get('/service{i}/:id', handler{i});\n\
             export const helper{i} = async (x: number) => x * {i};\n\n"
        ));
    }
    source
}

fn bench_extraction(c: &mut Criterion) {
    let root = fixture_root();
    let resolver = Arc::new(ImportResolver::load(&root));
    let parser = TypeScriptParser::new(resolver);
    let source = synthetic_source(200);
    let file_path = root.join("src/services/generated.ts").to_string_lossy().into_owned();

    let mut group = c.benchmark_group("extraction");
    group.throughput(Throughput::Bytes(source.len() as u64));
    group.bench_function("synthetic_200_classes", |b| {
        b.iter(|| black_box(parser.parse(black_box(&source), &file_path)))
    });
    group.finish();
}

fn bench_analyze(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let cache = tempfile::tempdir().expect("cache dir");
    let options = AnalyzeOptions {
        force_reindex: true,
        ..AnalyzeOptions::new(fixture_root().to_string_lossy())
    };

    let mut config = Config::default();
    config.cache.directory = Some(cache.path().to_path_buf());
    config.cache.enabled = false;
    let indexer = Indexer::new(config);

    c.bench_function("analyze_fixture", |b| {
        b.iter(|| runtime.block_on(indexer.analyze(&options)).expect("analysis"))
    });
}

criterion_group!(benches, bench_extraction, bench_analyze);
criterion_main!(benches);
