//! Benchmarks for the ingestion and forecasting pipeline.

use chrono::{Duration, TimeZone, Utc};
use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use career_compass::config::{EngineConfig, ForecastConfig};
use career_compass::demand::Period;
use career_compass::engine::Engine;
use career_compass::forecast::Forecaster;
use career_compass::ontology::Ontology;
use career_compass::posting::RawPosting;
use career_compass::seeds::SeedPack;

const TERMS: &[&str] = &[
    "Python", "SQL", "Kubernetes", "Docker", "Terraform", "Spark", "Kafka", "AWS",
    "PyTorch", "React", "TypeScript", "Airflow", "dbt", "Rust", "Java", "Tableau",
];

fn postings(n: usize, seed: u64) -> Vec<RawPosting> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let picked: Vec<&str> = TERMS.choose_multiple(&mut rng, 4).copied().collect();
            let at = start + Duration::days(rng.gen_range(0..180));
            RawPosting {
                source: "bench".into(),
                company: format!("Company {}", rng.gen_range(0..200)),
                title: "Data Engineer".into(),
                description: format!("Posting {i}: experience with {}", picked.join(", ")),
                location: None,
                role: None,
                posted_at: at,
                fetched_at: at,
            }
        })
        .collect()
}

fn seeded_engine() -> Engine {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    engine.apply_seed(&SeedPack::bundled_default().unwrap()).unwrap();
    engine
}

fn bench_ingest(c: &mut Criterion) {
    let batch = postings(1_000, 0);
    c.bench_function("ingest_batch_1k", |bench| {
        bench.iter_batched(
            || (seeded_engine(), batch.clone()),
            |(engine, batch)| black_box(engine.ingest_batch(batch).unwrap()),
            BatchSize::LargeInput,
        )
    });
}

fn bench_resolve(c: &mut Criterion) {
    let ontology = Ontology::default();
    SeedPack::bundled_default().unwrap().apply(&ontology).unwrap();

    c.bench_function("resolve_fuzzy_miss", |bench| {
        bench.iter(|| black_box(ontology.lookup("kubernetess")))
    });
}

fn bench_forecast(c: &mut Criterion) {
    let forecaster = Forecaster::new(ForecastConfig::default()).unwrap();
    let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    let series: Vec<u64> = (0..104).map(|i| 50 + i + rng.gen_range(0..10)).collect();
    let skill = Ontology::default().resolve("Python").unwrap();

    c.bench_function("forecast_104_periods", |bench| {
        bench.iter(|| black_box(forecaster.forecast(skill, Period(104), &series, 0)))
    });
}

fn bench_forecast_all(c: &mut Criterion) {
    let engine = seeded_engine();
    engine.ingest_batch(postings(2_000, 1)).unwrap();

    c.bench_function("forecast_all_cold_cache", |bench| {
        bench.iter(|| {
            engine.cache().clear();
            black_box(engine.forecast_all(None))
        })
    });
}

criterion_group!(benches, bench_ingest, bench_resolve, bench_forecast, bench_forecast_all);
criterion_main!(benches);
