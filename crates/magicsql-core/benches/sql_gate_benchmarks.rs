//! Benchmarks for the SQL safety gate.
//!
//! The gate runs once per question between generation and execution, so
//! its cost should stay negligible next to a model round trip. These
//! benchmarks cover typical generated queries and the denial path.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use magicsql_core::safety::{row_limit, SqlGate};

/// Generate a realistic model-written query; the shape varies by index.
fn generate_query(index: usize) -> String {
    match index % 4 {
        0 => format!(
            "SELECT [SourceSystem], COUNT(*) AS [Entries] FROM [Logs] \
             WHERE [Type] = 'Error' AND [Description] LIKE '%timeout {}%' \
             GROUP BY [SourceSystem] ORDER BY [Entries] DESC LIMIT 10",
            index
        ),
        1 => format!(
            "SELECT [GUID], [TimeStamp], [Description] FROM [Logs] \
             WHERE date([TimeStamp]) = date('now') ORDER BY [TimeStamp] DESC LIMIT {}",
            index % 10 + 1
        ),
        2 => "WITH recent AS (SELECT [Type], [TimeStamp] FROM [Logs] ORDER BY [TimeStamp] DESC LIMIT 100) \
              SELECT [Type], COUNT(*) FROM recent GROUP BY [Type]"
            .to_string(),
        _ => format!(
            "SELECT TOP 10 [SourceApplication], [Tags] FROM [Logs] -- run {}\n\
             WHERE [Tags] LIKE '%deploy%' /* newest first */ ORDER BY [TimeStamp] DESC",
            index
        ),
    }
}

fn bench_gate_check(c: &mut Criterion) {
    let gate = SqlGate::new();

    // Pre-generate queries to exclude formatting time from measurements.
    let queries: Vec<String> = (0..1000).map(generate_query).collect();

    let mut group = c.benchmark_group("sql_gate");
    group.sample_size(200);
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("check_read_query", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let decision = gate.check(&queries[idx % queries.len()]);
            idx += 1;
            decision
        });
    });

    group.bench_function("check_denied_query", |b| {
        b.iter(|| gate.check("SELECT 1; DROP TABLE [Logs]"));
    });

    group.bench_function("row_limit", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let limit = row_limit(&queries[idx % queries.len()]);
            idx += 1;
            limit
        });
    });

    group.finish();
}

criterion_group!(benches, bench_gate_check);
criterion_main!(benches);
