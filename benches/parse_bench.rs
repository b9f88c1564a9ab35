//! Benchmarks for parsing and schema building.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use protoschema::parser::{parse, printer};
use protoschema::schema::{build, revalidate, BuildOptions, MemoryLoader};

// ============================================================================
// Generated Sources
// ============================================================================

/// A file with `messages` messages, each with a nested enum, a map and a
/// oneof, referencing the previous message.
fn generate_file(package: &str, messages: usize) -> String {
    let mut out = format!("syntax = \"proto3\";\npackage {};\n\n", package);
    for i in 0..messages {
        out.push_str(&format!(
            "// Message number {i}.\nmessage M{i} {{\n  enum Kind {{ KIND_UNSPECIFIED = 0; KIND_A = 1; }}\n  string name = 1;\n  repeated int64 ids = 2 [packed = true];\n  map<string, M{prev}> children = 3;\n  oneof choice {{ Kind kind = 4; bytes raw = 5; }}\n}}\n\n",
            i = i,
            prev = i.saturating_sub(1),
        ));
    }
    out
}

/// The same file with some `name` fields left half-typed.
fn generate_broken_file(messages: usize) -> String {
    generate_file("broken", messages)
        .lines()
        .enumerate()
        .map(|(n, line)| {
            if n % 5 == 0 && line.trim_start().starts_with("string name") {
                "  string name\n".to_string()
            } else {
                format!("{}\n", line)
            }
        })
        .collect()
}

/// `files` files, each importing the previous one.
fn generate_project(files: usize) -> MemoryLoader {
    let loader = MemoryLoader::new();
    for i in 0..files {
        let mut source = String::new();
        if i > 0 {
            source.push_str(&format!("import \"f{}.proto\";\n", i - 1));
        }
        source.push_str(&generate_file(&format!("p{}", i), 20));
        loader.insert(format!("f{}.proto", i), source);
    }
    loader
}

// ============================================================================
// Parsing
// ============================================================================

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for messages in [10, 100, 1000] {
        let source = generate_file("bench", messages);
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::new("clean", messages), &source, |b, source| {
            b.iter(|| parse(black_box(source)))
        });
    }

    let broken = generate_broken_file(100);
    group.throughput(Throughput::Bytes(broken.len() as u64));
    group.bench_with_input(BenchmarkId::new("recovering", 100), &broken, |b, source| {
        b.iter(|| parse(black_box(source)))
    });
    group.finish();
}

fn bench_print(c: &mut Criterion) {
    let out = parse(&generate_file("bench", 100));
    c.bench_function("print/100", |b| b.iter(|| printer::print(black_box(&out.proto))));
}

// ============================================================================
// Schema Building
// ============================================================================

fn bench_build(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("build");
    for files in [5, 50] {
        let loader = generate_project(files);
        let entry = format!("f{}.proto", files - 1);
        group.throughput(Throughput::Elements(files as u64));
        group.bench_with_input(BenchmarkId::new("full", files), &entry, |b, entry| {
            b.iter(|| runtime.block_on(build(&loader, &[entry.as_str()])))
        });
    }

    let loader = generate_project(50);
    let schema = runtime.block_on(build(&loader, &["f49.proto"]));
    let options = BuildOptions::default();
    group.bench_function("revalidate/one_of_50", |b| {
        b.iter(|| runtime.block_on(revalidate(&loader, &schema, &["f25.proto"], &options)))
    });
    group.finish();
}

criterion_group!(benches, bench_parse, bench_print, bench_build);
criterion_main!(benches);
