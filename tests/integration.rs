//! End-to-end integration tests for the career-compass engine.
//!
//! These tests drive the full pipeline from raw postings through extraction,
//! ontology resolution, demand aggregation, forecasting and gap analysis.

use chrono::{DateTime, Duration, TimeZone, Utc};

use career_compass::config::EngineConfig;
use career_compass::engine::{Engine, IngestOutcome};
use career_compass::forecast::TrendClass;
use career_compass::error::{CompassError, GapError};
use career_compass::gap::{Proficiency, StudyBudget, TransitionRoadmap, TransitionVerdict, UserProfile};
use career_compass::ontology::EdgeKind;
use career_compass::posting::RawPosting;
use career_compass::seeds::SeedPack;

fn seeded_engine() -> Engine {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    engine.apply_seed(&SeedPack::bundled_default().unwrap()).unwrap();
    engine
}

/// Monday of the first week used by these tests.
fn week_start(week: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 8, 10, 0, 0).unwrap() + Duration::weeks(week)
}

fn posting(company: &str, title: &str, description: &str, at: DateTime<Utc>) -> RawPosting {
    RawPosting {
        source: "test-board".into(),
        company: company.into(),
        title: title.into(),
        description: description.into(),
        location: None,
        role: None,
        posted_at: at,
        fetched_at: at,
    }
}

/// Eight weeks of "platform engineer" postings. Every posting asks for Python
/// and SQL; Kubernetes demand grows, Terraform stays flat at 20 per week.
fn platform_market(engine: &Engine) {
    let kubernetes = [10, 11, 12, 14, 17, 21, 26, 32];
    let mut batch = Vec::new();
    for (week, &k8s) in kubernetes.iter().enumerate() {
        for i in 0..32 {
            let mut description = String::from("Python and SQL");
            if i < k8s {
                description.push_str(" with Kubernetes");
            }
            if i < 20 {
                description.push_str(" and Terraform");
            }
            batch.push(posting(
                &format!("Company {week}-{i}"),
                "Platform Engineer",
                &description,
                week_start(week as i64),
            ));
        }
    }
    let report = engine.ingest_batch(batch).unwrap();
    assert_eq!(report.recorded, 8 * 32);
}

#[test]
fn sample_postings_flow_end_to_end() {
    let engine = seeded_engine();
    let postings: Vec<RawPosting> =
        serde_json::from_str(include_str!("../data/sample_postings.json")).unwrap();
    let total = postings.len();
    let report = engine.ingest_batch(postings).unwrap();
    assert_eq!(report.recorded, total);
    assert_eq!(report.rejected, 0);

    let spark = engine.skill("pyspark").unwrap();
    assert_eq!(engine.skill("Apache Spark"), Some(spark));
    let forecast = engine.forecast(spark, None).unwrap();
    assert_eq!(forecast.trend, TrendClass::InsufficientData);
    assert!(forecast.projected.is_empty());

    let (profile, unknown) = UserProfile::resolve(engine.ontology(), &["python:advanced", "sql", "cobol"]);
    assert_eq!(unknown, vec!["cobol".to_string()]);
    let report = engine.analyze_gap(&profile, "data engineer", None).unwrap();
    assert!(!report.insufficient_market_data);
    assert!(report.missing.iter().all(|e| e.display_name != "Python"));
    assert!(report.missing.iter().any(|e| e.display_name == "Spark"));

    let plan = engine.learning_plan(&report, 10.0, 52).unwrap();
    assert_eq!(plan.steps.len() + plan.deferred.len(), report.missing.len());
}

#[test]
fn ingesting_twice_leaves_counts_unchanged() {
    let engine = seeded_engine();
    let raw = posting("Acme", "Data Engineer", "Python, SQL and Kafka", week_start(0));
    let first = engine.ingest(raw.clone()).unwrap();
    assert!(matches!(first, IngestOutcome::Recorded { .. }));

    let period = engine.scheme().period_of(week_start(0));
    let kafka = engine.skill("kafka").unwrap();
    let before = engine.demand().count(kafka, period);

    let second = engine.ingest(raw).unwrap();
    assert!(matches!(second, IngestOutcome::Duplicate { .. }));
    assert_eq!(engine.demand().count(kafka, period), before);
    assert_eq!(before, 1);
}

#[test]
fn redelivery_in_a_later_period_is_a_duplicate() {
    let engine = seeded_engine();
    let first = engine
        .ingest(posting("Acme", "Data Engineer", "Airflow and dbt", week_start(0)))
        .unwrap();
    let again = engine
        .ingest(posting("Acme", "Data Engineer", "Airflow and dbt", week_start(1)))
        .unwrap();
    let IngestOutcome::Recorded { posting_id, .. } = first else {
        panic!("expected the first delivery to be recorded");
    };
    assert_eq!(again, IngestOutcome::Duplicate { posting_id });

    let airflow = engine.skill("airflow").unwrap();
    let series = engine
        .demand()
        .series(&[airflow], engine.scheme().period_of(week_start(1)));
    assert_eq!(series, vec![1, 0]);
    assert_eq!(engine.info().postings, 1);
}

#[test]
fn no_alias_maps_to_two_skills() {
    let engine = seeded_engine();
    for term in ["ReactJS", "react.js", "Reactjs", "K8s", "pyspark", "Golang", "go-lang"] {
        engine.ontology().resolve(term).unwrap();
    }
    let aliases = engine.ontology().aliases();
    let mut seen = std::collections::HashMap::new();
    for (alias, id) in aliases {
        if let Some(prev) = seen.insert(alias.clone(), id) {
            panic!("alias {alias} maps to {prev} and {id}");
        }
    }
}

#[test]
fn reactjs_resolves_to_existing_react() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let react = engine.ontology().resolve("React").unwrap();
    let before = engine.ontology().len();
    assert_eq!(engine.ontology().resolve("ReactJS").unwrap(), react);
    assert_eq!(engine.ontology().len(), before);
}

#[test]
fn merge_keeps_demand_history_under_survivor() {
    let engine = Engine::new(EngineConfig::default()).unwrap();
    let ml = engine.ontology().resolve("Machine Learning").unwrap();
    let stats = engine.ontology().resolve("Statistical Learning").unwrap();
    assert_ne!(ml, stats);
    for week in 0..3 {
        engine
            .ingest(posting("Acme", "Scientist", &format!("machine learning {week}"), week_start(week)))
            .unwrap();
        engine
            .ingest(posting("Globex", "Scientist", &format!("statistical learning {week}"), week_start(week)))
            .unwrap();
    }
    let as_of = engine.scheme().period_of(week_start(2));
    let sum_before: u64 = engine.demand().series(&[ml], as_of).iter().sum::<u64>()
        + engine.demand().series(&[stats], as_of).iter().sum::<u64>();

    let outcome = engine.merge_skills(ml, stats).unwrap();
    assert_eq!(outcome.survivor, ml);

    let ids = engine.ontology().merged_ids(ml);
    let merged: Vec<u64> = engine.demand().series(&ids, as_of);
    assert_eq!(merged, vec![2, 2, 2]);
    assert_eq!(merged.iter().sum::<u64>(), sum_before);
    assert_eq!(engine.ontology().canonical(stats), Some(ml));
    assert_eq!(engine.skill("statistical learning"), Some(ml));
}

#[test]
fn forecasts_are_deterministic() {
    let engine = seeded_engine();
    platform_market(&engine);
    let k8s = engine.skill("kubernetes").unwrap();
    let as_of = engine.scheme().period_of(week_start(7));

    let a = engine.forecast(k8s, Some(as_of)).unwrap();
    engine.cache().clear();
    let b = engine.forecast(k8s, Some(as_of)).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.growth_rate.to_bits(), b.growth_rate.to_bits());
    assert_eq!(a.confidence.to_bits(), b.confidence.to_bits());
}

#[test]
fn growing_demand_is_emerging_and_flat_demand_is_stable() {
    let engine = seeded_engine();
    platform_market(&engine);
    let as_of = engine.scheme().period_of(week_start(7));

    let k8s = engine.forecast(engine.skill("k8s").unwrap(), Some(as_of)).unwrap();
    assert_eq!(k8s.trend, TrendClass::Emerging);
    assert_eq!(k8s.history_len, 8);
    let terraform = engine.forecast(engine.skill("terraform").unwrap(), Some(as_of)).unwrap();
    assert_eq!(terraform.trend, TrendClass::Stable);

    let ranked = engine.forecast_all(Some(as_of));
    assert_eq!(ranked[0].skill, k8s.skill);
}

#[test]
fn shrinking_demand_is_declining() {
    let engine = seeded_engine();
    let counts = [50, 48, 45, 40, 34, 27, 19, 12];
    let mut batch = Vec::new();
    for (week, &n) in counts.iter().enumerate() {
        for i in 0..n {
            batch.push(posting(
                &format!("Shop {week}-{i}"),
                "Hadoop Developer",
                "Hadoop and MapReduce jobs",
                week_start(week as i64),
            ));
        }
    }
    engine.ingest_batch(batch).unwrap();
    let hadoop = engine.skill("hadoop").unwrap();
    let forecast = engine
        .forecast(hadoop, Some(engine.scheme().period_of(week_start(7))))
        .unwrap();
    assert_eq!(forecast.trend, TrendClass::Declining);
    assert!(forecast.projected.iter().all(|p| p.lower >= 0.0));
}

#[test]
fn short_history_is_insufficient_data() {
    let engine = seeded_engine();
    for week in 0..3 {
        for i in 0..(10 * (week + 1)) {
            engine
                .ingest(posting(&format!("Co {week}-{i}"), "Engineer", "LLM agents", week_start(week)))
                .unwrap();
        }
    }
    let llm = engine.skill("llm").unwrap();
    let forecast = engine.forecast(llm, None).unwrap();
    assert_eq!(forecast.trend, TrendClass::InsufficientData);
    assert_eq!(forecast.history_len, 3);
}

#[test]
fn emerging_gap_outranks_stable_gap() {
    let engine = seeded_engine();
    platform_market(&engine);
    let profile = UserProfile::new()
        .with(engine.skill("python").unwrap(), Proficiency::Intermediate)
        .with(engine.skill("sql").unwrap(), Proficiency::Advanced);

    let report = engine
        .analyze_gap(&profile, "platform engineer", Some(engine.default_as_of()))
        .unwrap();
    let names: Vec<&str> = report.missing.iter().map(|e| e.display_name.as_str()).collect();
    assert_eq!(names, vec!["Kubernetes", "Terraform"]);
    assert_eq!(report.missing[0].trend, TrendClass::Emerging);
    assert_eq!(report.missing[1].trend, TrendClass::Stable);

    for pair in report.missing.windows(2) {
        assert!(pair[0].priority_score >= pair[1].priority_score);
        if pair[0].priority_score == pair[1].priority_score {
            assert!(pair[0].estimated_hours <= pair[1].estimated_hours);
        }
    }
    assert!(report.coverage > 0.0 && report.coverage < 1.0);
}

#[test]
fn plan_schedules_prerequisites_first() {
    let engine = seeded_engine();
    platform_market(&engine);
    let docker = engine.skill("docker").unwrap();
    let k8s = engine.skill("kubernetes").unwrap();
    let prereqs = engine.ontology().prerequisites_of(k8s);
    assert!(prereqs.contains(&docker));

    // A role whose postings ask for Kubernetes and Docker.
    for i in 0..5 {
        engine
            .ingest(posting(&format!("Ops {i}"), "SRE", "Kubernetes and Docker", week_start(7)))
            .unwrap();
    }
    let report = engine.analyze_gap(&UserProfile::new(), "sre", None).unwrap();
    let plan = engine.learning_plan(&report, 10.0, 52).unwrap();
    let order: Vec<_> = plan.steps.iter().map(|s| s.skill).collect();
    let docker_at = order.iter().position(|s| *s == docker).unwrap();
    let k8s_at = order.iter().position(|s| *s == k8s).unwrap();
    assert!(docker_at < k8s_at);
}

#[test]
fn closed_periods_reject_late_postings() {
    let engine = seeded_engine();
    engine
        .ingest(posting("Acme", "Data Engineer", "SQL", week_start(0)))
        .unwrap();
    engine.close_through(engine.scheme().period_of(week_start(0)));

    let late = engine
        .ingest_batch(vec![posting("Globex", "Data Engineer", "SQL and Python", week_start(0))])
        .unwrap();
    assert_eq!(late.rejected, 1);
    let fresh = engine
        .ingest(posting("Globex", "Data Engineer", "SQL and Python", week_start(1)))
        .unwrap();
    assert!(matches!(fresh, IngestOutcome::Recorded { .. }));
}

#[test]
fn curated_edges_feed_learning_paths() {
    let engine = seeded_engine();
    let python = engine.skill("python").unwrap();
    let dl = engine.skill("deep learning").unwrap();
    let path = engine.learning_path(&[python], dl).unwrap();
    assert!(path.connected);
    assert_eq!(path.steps.first(), Some(&python));
    assert_eq!(path.steps.last(), Some(&dl));

    let rust = engine.skill("rust").unwrap();
    let edge = engine.add_edge(rust, dl, EdgeKind::Related, 0.2).unwrap();
    assert_eq!(edge.kind, EdgeKind::Related);
}

/// Six postings each for three data roles in one week.
fn data_roles_market(engine: &Engine) {
    let roles = [
        ("Data Analyst", "SQL, Excel and Tableau"),
        ("Data Engineer", "SQL, Python, Spark and Airflow"),
        ("BI Developer", "SQL, Tableau and Power BI"),
    ];
    let mut batch = Vec::new();
    for (title, skills) in roles {
        for i in 0..6 {
            batch.push(posting(
                &format!("{title} Co {i}"),
                title,
                &format!("We need {skills}."),
                week_start(0),
            ));
        }
    }
    assert_eq!(engine.ingest_batch(batch).unwrap().recorded, 18);
}

#[test]
fn transition_builds_on_current_role_core() {
    let engine = seeded_engine();
    data_roles_market(&engine);
    let id = |name: &str| engine.skill(name).unwrap();

    let analysis = engine
        .analyze_transition(
            &UserProfile::new(),
            "Senior Data Analyst",
            "Data Engineer",
            None,
            StudyBudget::default(),
        )
        .unwrap();
    assert_eq!(analysis.current_role, "data analyst");
    assert_eq!(analysis.shift.shared, vec![id("sql")]);
    assert!(analysis.shift.dropped.contains(&id("excel")));
    for skill in ["python", "spark", "airflow"] {
        assert!(analysis.shift.gained.contains(&id(skill)), "{skill} not gained");
    }
    assert!(analysis.gap.missing.iter().all(|e| e.skill != id("sql")));
    assert_eq!(analysis.gap.missing.len(), 3);
    assert_eq!(analysis.market_share, 0.5);
    assert_eq!(analysis.verdict, TransitionVerdict::from_score(analysis.score));

    let roadmap = TransitionRoadmap::build(&analysis);
    assert!(roadmap.on_track);
    assert_eq!(roadmap.phases.last().unwrap().end_week, 52.0);
}

#[test]
fn transitions_rank_closer_roles_first() {
    let engine = seeded_engine();
    data_roles_market(&engine);

    let ranked = engine
        .compare_transitions(
            &UserProfile::new(),
            "data analyst",
            &["data engineer", "bi developer", "astronaut"],
            None,
            StudyBudget::default(),
        )
        .unwrap();
    let order: Vec<&str> = ranked.iter().map(|t| t.target_role.as_str()).collect();
    assert_eq!(order, vec!["bi developer", "data engineer", "astronaut"]);
    assert_eq!(ranked[2].verdict, TransitionVerdict::InsufficientData);

    assert!(matches!(
        engine.analyze_transition(&UserProfile::new(), "Data Analyst", "data analyst", None, StudyBudget::default()),
        Err(CompassError::Gap(GapError::SameRole { .. }))
    ));
}
