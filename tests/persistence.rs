//! Persistence and recovery tests for the career-compass engine.
//!
//! These tests verify that the ontology, demand journal and closed-period
//! marker survive engine restart (persist + reopen cycle).

use chrono::{DateTime, Duration, TimeZone, Utc};

use career_compass::config::EngineConfig;
use career_compass::engine::{Engine, IngestOutcome};
use career_compass::posting::RawPosting;
use career_compass::seeds::SeedPack;

fn persistent_engine(dir: &std::path::Path) -> Engine {
    Engine::new(EngineConfig {
        data_dir: Some(dir.to_path_buf()),
        ..Default::default()
    })
    .unwrap()
}

fn at(week: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 5, 9, 30, 0).unwrap() + Duration::weeks(week)
}

fn posting(company: &str, description: &str, week: i64) -> RawPosting {
    RawPosting {
        source: "test-board".into(),
        company: company.into(),
        title: "Data Engineer".into(),
        description: description.into(),
        location: None,
        role: None,
        posted_at: at(week),
        fetched_at: at(week),
    }
}

#[test]
fn ontology_and_demand_survive_restart() {
    let dir = tempfile::TempDir::new().unwrap();

    // First session: seed, ingest and persist.
    let version = {
        let engine = persistent_engine(dir.path());
        engine.apply_seed(&SeedPack::bundled_default().unwrap()).unwrap();
        engine.ingest(posting("Acme", "Spark and Kafka", 0)).unwrap();
        engine.ingest(posting("Globex", "Spark and Airflow", 1)).unwrap();
        engine.persist().unwrap();
        engine.ontology().version()
    };

    // Second session: reopen and verify.
    {
        let engine = persistent_engine(dir.path());
        assert_eq!(engine.ontology().version(), version);
        let spark = engine.skill("pyspark").unwrap();
        let through = engine.scheme().period_of(at(1));
        assert_eq!(engine.demand().series(&[spark], through), vec![1, 1]);
        assert_eq!(engine.info().postings, 2);
    }
}

#[test]
fn redelivery_after_restart_is_still_a_duplicate() {
    let dir = tempfile::TempDir::new().unwrap();
    {
        let engine = persistent_engine(dir.path());
        engine.apply_seed(&SeedPack::bundled_default().unwrap()).unwrap();
        engine.ingest(posting("Acme", "Python and SQL", 0)).unwrap();
        engine.persist().unwrap();
    }
    let engine = persistent_engine(dir.path());
    let outcome = engine.ingest(posting("Acme", "Python and SQL", 0)).unwrap();
    assert!(matches!(outcome, IngestOutcome::Duplicate { .. }));
    let python = engine.skill("python").unwrap();
    assert_eq!(engine.demand().count(python, engine.scheme().period_of(at(0))), 1);
}

#[test]
fn persisting_twice_does_not_duplicate_events() {
    let dir = tempfile::TempDir::new().unwrap();
    {
        let engine = persistent_engine(dir.path());
        engine.apply_seed(&SeedPack::bundled_default().unwrap()).unwrap();
        engine.ingest(posting("Acme", "Rust", 0)).unwrap();
        engine.persist().unwrap();
        engine.ingest(posting("Globex", "Rust", 0)).unwrap();
        engine.persist().unwrap();
        engine.persist().unwrap();
    }
    let engine = persistent_engine(dir.path());
    let rust = engine.skill("rust").unwrap();
    assert_eq!(engine.demand().count(rust, engine.scheme().period_of(at(0))), 2);
    assert_eq!(engine.demand().journal_len(), 2);
}

#[test]
fn merges_and_closed_periods_survive_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let (survivor, absorbed) = {
        let engine = persistent_engine(dir.path());
        let a = engine.ontology().resolve("Golang").unwrap();
        let b = engine.ontology().resolve("Go programming").unwrap();
        engine.ingest(posting("Acme", "golang microservices", 0)).unwrap();
        engine.ingest(posting("Globex", "go programming", 0)).unwrap();
        engine.merge_skills(a, b).unwrap();
        engine.close_through(engine.scheme().period_of(at(0)));
        engine.persist().unwrap();
        (a, b)
    };

    let engine = persistent_engine(dir.path());
    assert_eq!(engine.ontology().canonical(absorbed), Some(survivor));
    let forecast = engine
        .forecast(absorbed, Some(engine.scheme().period_of(at(0))))
        .unwrap();
    assert_eq!(forecast.skill, survivor);
    assert_eq!(forecast.current_volume, 2.0);

    let late = engine
        .ingest_batch(vec![posting("Initech", "golang", 0)])
        .unwrap();
    assert_eq!(late.rejected, 1);
}

#[test]
fn changed_period_width_rebuckets_history() {
    let dir = tempfile::TempDir::new().unwrap();
    {
        let engine = persistent_engine(dir.path());
        engine.apply_seed(&SeedPack::bundled_default().unwrap()).unwrap();
        for week in 0..4 {
            engine
                .ingest(posting(&format!("Co {week}"), "Terraform", week))
                .unwrap();
        }
        engine.persist().unwrap();
    }

    let four_weekly = || {
        let mut config = EngineConfig {
            data_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        config.demand.period_days = 28;
        Engine::new(config).unwrap()
    };
    let totals = |engine: &Engine| {
        let terraform = engine.skill("terraform").unwrap();
        let through = engine.scheme().period_of(at(3));
        assert_eq!(engine.demand().latest_period(), Some(through));
        engine.demand().series(&[terraform], through)
    };

    // Reopen under the new width, persist, and reopen again: the stored
    // journal must keep bucketing by posting date.
    let first = {
        let engine = four_weekly();
        let series = totals(&engine);
        engine.persist().unwrap();
        series
    };
    assert_eq!(first.iter().sum::<u64>(), 4);

    let engine = four_weekly();
    assert_eq!(totals(&engine), first);
    assert_eq!(engine.info().postings, 4);
}
