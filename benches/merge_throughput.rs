use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use esg_rollup::config::Settings;
use esg_rollup::document::{Document, Value};
use esg_rollup::merge::merge;
use esg_rollup::rows::Table;
use esg_rollup::{analysis, analysis::AnalysisKind};

fn generate_readings(rows: usize) -> Table {
    let mut table = Table::new(vec![
        "site".into(),
        "electricity_kwh".into(),
        "fuel_kwh".into(),
        "co2_kg".into(),
        "water_liters".into(),
        "recycled_waste_kg".into(),
    ]);
    for i in 0..rows {
        let reading = |scale: f64| {
            if i % 17 == 0 {
                Value::Null
            } else {
                Value::Float((i % 97) as f64 * scale)
            }
        };
        table
            .push_row(vec![
                Value::text(format!("site-{}", i % 5)),
                reading(1.5),
                reading(0.25),
                reading(0.4),
                reading(12.0),
                reading(0.8),
            ])
            .expect("row");
    }
    table
}

fn bench_merge(c: &mut Criterion) {
    let settings = Settings::default();
    let table = generate_readings(20_000);
    let incoming = analysis::analyze(AnalysisKind::Environmental, &table, &settings);
    let existing = (0..50).fold(Document::new(), |state, _| merge(&state, &incoming));

    let mut group = c.benchmark_group("site_state");

    group.bench_function("analyze_environmental_20k", |b| {
        b.iter(|| analysis::analyze(AnalysisKind::Environmental, &table, &settings));
    });

    group.bench_function("merge_into_cumulative", |b| {
        b.iter_batched(
            || existing.clone(),
            |state| merge(&state, &incoming),
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_merge);
criterion_main!(benches);
