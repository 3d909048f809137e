// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # career-compass
//!
//! Job-market intelligence: turns a stream of job postings into a versioned
//! skill ontology, per-period demand counts, trend forecasts and personalized
//! skill-gap reports with a budgeted learning plan.
//!
//! ## Architecture
//!
//! - **Postings** (`posting`): Normalization, content-hash ids, dedup ledger
//! - **Extraction** (`extract`): Pluggable term tagger behind a dictionary default
//! - **Ontology** (`ontology`): Alias resolution, merges, typed weighted edges
//! - **Demand** (`demand`): Concurrent per-period counters with an event journal
//! - **Forecasting** (`forecast`): Smoothed growth, trend classes, projections
//! - **Gap analysis** (`gap`): Priority and ROI ranking, learning plans
//! - **Storage** (`store`): redb snapshot and journal for restarts
//!
//! ## Library usage
//!
//! ```no_run
//! use career_compass::config::EngineConfig;
//! use career_compass::engine::Engine;
//! use career_compass::gap::UserProfile;
//! use career_compass::seeds::SeedPack;
//!
//! let engine = Engine::new(EngineConfig::default()).unwrap();
//! engine.apply_seed(&SeedPack::bundled_default().unwrap()).unwrap();
//!
//! let postings = serde_json::from_str(include_str!("../data/sample_postings.json")).unwrap();
//! engine.ingest_batch(postings).unwrap();
//!
//! let (profile, _unknown) = UserProfile::resolve(engine.ontology(), &["python:advanced", "sql"]);
//! let report = engine.analyze_gap(&profile, "data engineer", None).unwrap();
//! let plan = engine.learning_plan(&report, 8.0, 26).unwrap();
//! println!("{} steps, feasible: {}", plan.steps.len(), plan.feasible);
//! ```

pub mod config;
pub mod demand;
pub mod engine;
pub mod error;
pub mod export;
pub mod extract;
pub mod forecast;
pub mod gap;
pub mod ontology;
pub mod posting;
pub mod seeds;
pub mod skill;
pub mod store;
