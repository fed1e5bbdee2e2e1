//! Criterion benchmarks for routemap-core.
//!
//! ## Benchmark groups
//!
//! 1. **scanner**: line classification and statement reconstruction.
//! 2. **extraction**: per-unit idiom matching on a router module.
//! 3. **analysis**: end-to-end analysis of synthetic corpora of growing size.
//!
//! ## Running
//!
//! ```sh
//! cargo bench --manifest-path crates/routemap-core/Cargo.toml
//! # Run only the end-to-end group:
//! cargo bench --manifest-path crates/routemap-core/Cargo.toml -- analysis
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use routemap_core::extract::extract_unit;
use routemap_core::scanner::{classify, reconstruct};
use routemap_core::{analyze_with, AnalyzerConfig, Language, SourceUnit};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A FastAPI router module with `n` multi-line decorated handlers.
fn router_module(n: usize) -> String {
    let mut text = String::from(
        "from fastapi import APIRouter, Depends\n\nrouter = APIRouter(prefix='/items', tags=['items'])\n\n",
    );
    for i in 0..n {
        text.push_str(&format!(
            "# handler {i}\n@router.get(\n    '/{i}/{{item_id}}',\n    status_code=200,\n    dependencies=[Depends(auth)],\n)\nasync def handler_{i}(item_id: int):\n    \"\"\"Return item {i}.\"\"\"\n    return {{'id': item_id}}\n\n"
        ));
    }
    text
}

/// `modules` router modules included by one application module.
fn synthetic_corpus(modules: usize, handlers: usize) -> Vec<SourceUnit> {
    let mut main = String::from("from fastapi import FastAPI\nfrom app import routers\n\napp = FastAPI()\n");
    let mut units = Vec::with_capacity(modules + 1);
    for m in 0..modules {
        main.push_str(&format!(
            "app.include_router(routers.mod_{m}.router, prefix='/m{m}')\n"
        ));
        units.push(SourceUnit::new(
            format!("app/routers/mod_{m}.py"),
            router_module(handlers),
        ));
    }
    units.push(SourceUnit::new("app/main.py", main));
    units
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_scanner(c: &mut Criterion) {
    let mut group = c.benchmark_group("scanner");
    let text = router_module(200);

    group.bench_function("classify_python_200_handlers", |b| {
        b.iter(|| classify(black_box(&text), Language::Python));
    });

    let classified = classify(&text, Language::Python);
    group.bench_function("reconstruct_python_200_handlers", |b| {
        b.iter(|| reconstruct(black_box(&classified), "app/routers/items.py", Language::Python));
    });

    let script = "router.get('/users/:id', async (req, res) => {\n  res.json(await load(req.params.id));\n});\n"
        .repeat(200);
    group.bench_function("classify_script_200_handlers", |b| {
        b.iter(|| classify(black_box(&script), Language::Script));
    });

    group.finish();
}

fn bench_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("extraction");
    for n in [10usize, 100, 500] {
        let unit = SourceUnit::new("app/routers/items.py", router_module(n));
        group.bench_with_input(BenchmarkId::new("extract_unit", n), &unit, |b, unit| {
            b.iter(|| extract_unit(black_box(unit), true));
        });
    }
    group.finish();
}

fn bench_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("analysis");
    group.sample_size(20);
    let config = AnalyzerConfig::default();
    for modules in [5usize, 50] {
        let corpus = synthetic_corpus(modules, 20);
        group.bench_with_input(
            BenchmarkId::new("analyze_corpus", modules),
            &corpus,
            |b, corpus| {
                b.iter(|| analyze_with(black_box(corpus), &config, None));
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_scanner, bench_extraction, bench_analysis);
criterion_main!(benches);
