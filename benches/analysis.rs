//! Benchmarks for parsing and null-dereference analysis.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nullfix::cfg::build_cfgs;
use nullfix::checkers::{check_cfgs, CheckerOptions};
use nullfix::harness::{run_suite, SuiteOptions};
use nullfix::parser::parse_c;
use nullfix::{Metrics, NullfixConfig};
use std::path::Path;

/// A translation unit with `count` functions alternating between the two
/// defect shapes, plus a chain of callers to exercise callee summaries.
fn generate_c_file(count: usize) -> String {
    let mut code = String::from("struct S { int x; };\n\n");
    for i in 0..count {
        if i % 2 == 0 {
            code.push_str(&format!(
                "int fwd_{i}(int *p, int n) {{\n    int x = 0;\n    if (p == 0) {{\n        x = n;\n    }} else {{\n        x = *p;\n    }}\n    while (n > 0) {{\n        x += n;\n        n--;\n    }}\n    *p = x;\n    return x;\n}}\n\n"
            ));
        } else {
            code.push_str(&format!(
                "int rev_{i}(struct S *s) {{\n    s->x = {i};\n    switch (s->x) {{\n    case 0:\n        break;\n    default:\n        s->x++;\n    }}\n    if (s == NULL)\n        return -1;\n    return 0;\n}}\n\n"
            ));
        }
    }
    for i in 0..count / 4 {
        code.push_str(&format!(
            "void call_{i}(struct S *s) {{\n    if (!s) {{ }}\n    rev_{}(s);\n}}\n\n",
            i * 4 + 1
        ));
    }
    code
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_c");
    for count in [10, 100, 500] {
        let code = generate_c_file(count);
        group.throughput(Throughput::Bytes(code.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &code, |b, code| {
            b.iter(|| parse_c(black_box(code)).unwrap());
        });
    }
    group.finish();
}

fn bench_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("check");
    for count in [10, 100, 500] {
        let code = generate_c_file(count);
        let parsed = parse_c(&code).unwrap();
        let cfgs = build_cfgs(&parsed, "bench.c", &[]);

        group.bench_with_input(BenchmarkId::new("interprocedural", count), &cfgs, |b, cfgs| {
            b.iter(|| check_cfgs(black_box(cfgs), &CheckerOptions::default()));
        });

        let intra = CheckerOptions {
            interprocedural: false,
            ..Default::default()
        };
        group.bench_with_input(BenchmarkId::new("intraprocedural", count), &cfgs, |b, cfgs| {
            b.iter(|| check_cfgs(black_box(cfgs), &intra));
        });
    }
    group.finish();
}

fn bench_build_cfgs(c: &mut Criterion) {
    let code = generate_c_file(100);
    let parsed = parse_c(&code).unwrap();

    c.bench_function("build_cfgs_100_functions", |b| {
        b.iter(|| build_cfgs(black_box(&parsed), "bench.c", &[]));
    });
}

fn bench_suite(c: &mut Criterion) {
    let config = NullfixConfig {
        suite_dir: Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures"),
        ..Default::default()
    };
    let options = SuiteOptions::from(&config);

    c.bench_function("run_shipped_suite", |b| {
        b.iter(|| run_suite(black_box(&options), &Metrics::new()).unwrap());
    });
}

criterion_group!(benches, bench_parse, bench_check, bench_build_cfgs, bench_suite);
criterion_main!(benches);
