//! Engine facade: top-level API for career-compass.
//!
//! The `Engine` owns every pipeline stage (extractor, ontology, demand
//! aggregator with its posting ledger, forecaster with its cache, gap analyzer) and
//! the optional redb store, and exposes the operations callers use:
//! ingesting postings, forecasting demand and analyzing skill gaps.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use rayon::prelude::*;

use crate::config::EngineConfig;
use crate::demand::{
    DemandAggregator, Period, PeriodScheme, RecordOutcome, ResolvedMention, RoleDistribution,
};
use crate::error::{CompassError, CompassResult, GapError, OntologyError};
use crate::extract::{DictionaryTagger, Extractor, SkillTagger, TermDictionary};
use crate::forecast::cache::window_token;
use crate::forecast::{ForecastCache, ForecastResult, Forecaster, TrendClass, rank_forecasts};
use crate::gap::transition::{self, RoleShift, StudyBudget, TransitionAnalysis};
use crate::gap::{DifficultyTable, GapAnalyzer, GapReport, LearningPlan, SeededDifficultyTable, UserProfile};
use crate::ontology::traverse::{self, LearningPath, SkillCluster};
use crate::ontology::{EdgeKind, MergeOutcome, Ontology, SkillEdge};
use crate::posting::{Posting, PostingId, RawPosting, role_label};
use crate::seeds::{SeedPack, SeedReport};
use crate::skill::SkillId;
use crate::store::CompassStore;

/// Result of ingesting one posting.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Recorded {
        posting_id: PostingId,
        period: Period,
        /// Distinct canonical skills counted as demand.
        skills: Vec<SkillId>,
        /// Mentions resolved but not counted, being below the confidence
        /// threshold.
        low_confidence: usize,
    },
    /// Already counted; nothing changed.
    Duplicate { posting_id: PostingId },
}

/// Summary of a batch ingestion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub recorded: usize,
    pub duplicates: usize,
    /// Postings rejected as invalid or targeting a closed period.
    pub rejected: usize,
    /// Skill counts added across all recorded postings.
    pub skill_mentions: usize,
}

/// The career-compass engine.
pub struct Engine {
    config: EngineConfig,
    ontology: Ontology,
    demand: DemandAggregator,
    extractor: RwLock<Arc<Extractor>>,
    /// Set once a caller installs its own tagger; seeding then leaves it alone.
    custom_tagger: AtomicBool,
    forecaster: Forecaster,
    cache: ForecastCache,
    gap: GapAnalyzer,
    difficulty: RwLock<SeededDifficultyTable>,
    store: Option<CompassStore>,
    /// Journal entries already written to the store.
    persisted_events: AtomicUsize,
}

impl Engine {
    /// Create an engine. With a `data_dir`, previously persisted state is
    /// restored: the ontology snapshot is loaded and the demand journal replayed.
    pub fn new(config: EngineConfig) -> CompassResult<Self> {
        config.validate()?;
        let scheme = PeriodScheme::from_config(&config.demand)?;
        let forecaster = Forecaster::new(config.forecast.clone())?;
        let threshold = config.extract.confidence_threshold;

        let store = match config.data_dir {
            Some(ref dir) => Some(CompassStore::open(dir)?),
            None => None,
        };

        let (ontology, demand) = match store {
            Some(ref store) => restore(store, &config, scheme)?,
            None => (
                Ontology::new(config.ontology.clone()),
                DemandAggregator::new(scheme, threshold),
            ),
        };

        let extractor = Extractor::new(
            Arc::new(DictionaryTagger::new(TermDictionary::from_ontology(&ontology))),
            threshold,
        );

        tracing::info!(
            skills = ontology.len(),
            postings = demand.processed_count(),
            persistent = store.is_some(),
            "initializing career-compass engine"
        );

        Ok(Self {
            persisted_events: AtomicUsize::new(demand.journal_len()),
            gap: GapAnalyzer::new(config.gap.clone()),
            difficulty: RwLock::new(SeededDifficultyTable::new(config.gap.default_hours)),
            config,
            ontology,
            demand,
            extractor: RwLock::new(Arc::new(extractor)),
            custom_tagger: AtomicBool::new(false),
            forecaster,
            cache: ForecastCache::new(),
            store,
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ontology(&self) -> &Ontology {
        &self.ontology
    }

    pub fn demand(&self) -> &DemandAggregator {
        &self.demand
    }

    pub fn scheme(&self) -> &PeriodScheme {
        self.demand.scheme()
    }

    pub fn cache(&self) -> &ForecastCache {
        &self.cache
    }

    /// Current extractor. The dictionary tagger is rebuilt whenever the
    /// ontology has moved past the version it was built from.
    fn extractor(&self) -> Arc<Extractor> {
        let current = Arc::clone(&self.extractor.read().expect("extractor lock poisoned"));
        if self.custom_tagger.load(Ordering::SeqCst)
            || current.dictionary_version() == TermDictionary::version_for(&self.ontology)
        {
            return current;
        }
        self.refresh_dictionary()
    }

    /// Replace the bundled dictionary tagger, e.g. with an NLP backend.
    pub fn set_tagger(&self, tagger: Arc<dyn SkillTagger>) {
        let extractor = Extractor::new(tagger, self.config.extract.confidence_threshold);
        tracing::info!(dictionary = extractor.dictionary_version(), "installed custom tagger");
        let mut slot = self.extractor.write().expect("extractor lock poisoned");
        self.custom_tagger.store(true, Ordering::SeqCst);
        *slot = Arc::new(extractor);
    }

    fn refresh_dictionary(&self) -> Arc<Extractor> {
        let mut slot = self.extractor.write().expect("extractor lock poisoned");
        if self.custom_tagger.load(Ordering::SeqCst) {
            return Arc::clone(&slot);
        }
        // Double-check: another ingest may have rebuilt it meanwhile.
        let dictionary = TermDictionary::from_ontology(&self.ontology);
        if slot.dictionary_version() != dictionary.version {
            tracing::debug!(version = %dictionary.version, terms = dictionary.len(), "rebuilt term dictionary");
            *slot = Arc::new(Extractor::new(
                Arc::new(DictionaryTagger::new(dictionary)),
                self.config.extract.confidence_threshold,
            ));
        }
        Arc::clone(&slot)
    }

    /// Resolve a skill name without creating anything.
    pub fn skill(&self, term: &str) -> Option<SkillId> {
        self.ontology.lookup(term)
    }

    // -----------------------------------------------------------------------
    // Seeding and curation
    // -----------------------------------------------------------------------

    /// Apply a seed pack. Idempotent. The pack's hour estimates feed the
    /// default difficulty table.
    pub fn apply_seed(&self, pack: &SeedPack) -> CompassResult<SeedReport> {
        let report = pack.apply(&self.ontology)?;
        self.difficulty
            .write()
            .expect("difficulty lock poisoned")
            .absorb(pack.difficulty_table(self.config.gap.default_hours));
        Ok(report)
    }

    /// Merge skill `b` into `a`. Demand history of both is kept under `a`.
    pub fn merge_skills(&self, a: SkillId, b: SkillId) -> CompassResult<MergeOutcome> {
        let outcome = self.ontology.merge(a, b)?;
        let dropped = self.cache.invalidate(outcome.survivor, Period(i64::MIN))
            + self.cache.invalidate(outcome.absorbed, Period(i64::MIN));
        tracing::info!(
            survivor = %outcome.survivor,
            absorbed = %outcome.absorbed,
            version = outcome.version,
            cache_dropped = dropped,
            "merged skills"
        );
        Ok(outcome)
    }

    pub fn add_edge(
        &self,
        from: SkillId,
        to: SkillId,
        kind: EdgeKind,
        weight: f32,
    ) -> CompassResult<SkillEdge> {
        Ok(self.ontology.add_edge(from, to, kind, weight)?)
    }

    pub fn cluster(&self, skill: SkillId, depth: usize) -> CompassResult<SkillCluster> {
        Ok(traverse::cluster(&self.ontology, skill, depth)?)
    }

    pub fn learning_path(&self, known: &[SkillId], target: SkillId) -> CompassResult<LearningPath> {
        Ok(traverse::learning_path(&self.ontology, known, target)?)
    }

    // -----------------------------------------------------------------------
    // Ingestion
    // -----------------------------------------------------------------------

    /// Normalize, extract, resolve and count one posting.
    pub fn ingest(&self, raw: RawPosting) -> CompassResult<IngestOutcome> {
        let posting = Posting::normalize(raw)?;
        let period = self.demand.scheme().period_of(posting.posted_at);

        // Re-delivery, in this period or another: skip extraction entirely.
        if self.demand.is_processed(&posting.id) {
            tracing::debug!(posting = %posting.id, period = %period, "duplicate posting");
            return Ok(IngestOutcome::Duplicate {
                posting_id: posting.id,
            });
        }
        for issue in posting.quality_issues() {
            tracing::warn!(posting = %posting.id, source = %posting.source, %issue, "posting quality issue");
        }

        // Every mention resolves, low-confidence ones included; the
        // aggregator applies the demand cutoff.
        let mentions = self.extractor().extract(&posting);
        let low_confidence = mentions.iter().filter(|m| m.low_confidence).count();
        let resolved = mentions
            .iter()
            .map(|mention| {
                Ok(ResolvedMention {
                    skill: self.ontology.resolve(&mention.raw_term)?,
                    confidence: mention.confidence,
                })
            })
            .collect::<CompassResult<Vec<_>>>()?;

        match self.demand.record(&posting, &resolved, period)? {
            RecordOutcome::Recorded(event) => {
                for skill in &event.skills {
                    self.cache.invalidate(*skill, period);
                }
                Ok(IngestOutcome::Recorded {
                    posting_id: event.posting_id,
                    period,
                    skills: event.skills,
                    low_confidence,
                })
            }
            RecordOutcome::Duplicate => Ok(IngestOutcome::Duplicate {
                posting_id: posting.id,
            }),
        }
    }

    /// Ingest many postings in parallel.
    ///
    /// Invalid postings and postings for closed periods are counted as
    /// rejected; any other failure aborts the batch.
    pub fn ingest_batch(&self, raws: Vec<RawPosting>) -> CompassResult<IngestReport> {
        let outcomes: Vec<CompassResult<IngestOutcome>> =
            raws.into_par_iter().map(|raw| self.ingest(raw)).collect();

        let mut report = IngestReport::default();
        for outcome in outcomes {
            match outcome {
                Ok(IngestOutcome::Recorded { skills, .. }) => {
                    report.recorded += 1;
                    report.skill_mentions += skills.len();
                }
                Ok(IngestOutcome::Duplicate { .. }) => report.duplicates += 1,
                Err(e @ (CompassError::Posting(_) | CompassError::Demand(_))) => {
                    tracing::warn!("rejected posting: {e}");
                    report.rejected += 1;
                }
                Err(e) => return Err(e),
            }
        }
        tracing::info!(
            recorded = report.recorded,
            duplicates = report.duplicates,
            rejected = report.rejected,
            mentions = report.skill_mentions,
            "ingested batch"
        );
        Ok(report)
    }

    /// Close every period up to and including `period` to new postings.
    pub fn close_through(&self, period: Period) -> Period {
        self.demand.close_through(period)
    }

    // -----------------------------------------------------------------------
    // Forecasting
    // -----------------------------------------------------------------------

    /// Period used when the caller does not name one: the latest with data,
    /// else the current one.
    pub fn default_as_of(&self) -> Period {
        self.demand
            .latest_period()
            .unwrap_or_else(|| self.demand.scheme().period_of(Utc::now()))
    }

    /// Forecast demand for a skill, memoized per input window.
    pub fn forecast(&self, skill: SkillId, as_of: Option<Period>) -> CompassResult<ForecastResult> {
        let survivor = self
            .ontology
            .canonical(skill)
            .ok_or(OntologyError::UnknownSkill { skill_id: skill.get() })?;
        let as_of = as_of.unwrap_or_else(|| self.default_as_of());
        Ok(self.forecast_canonical(survivor, as_of))
    }

    fn forecast_canonical(&self, survivor: SkillId, as_of: Period) -> ForecastResult {
        let ids = self.ontology.merged_ids(survivor);
        let series = self.demand.series(&ids, as_of);
        let first = self.demand.first_period(&ids).filter(|p| *p <= as_of);
        let version = self.ontology.version();
        let key = (survivor, as_of, self.forecaster.config().fingerprint());
        let token = window_token(first, &series, version);

        if let Some(hit) = self.cache.get(&key, token) {
            return hit;
        }
        let result = self.forecaster.forecast(survivor, as_of, &series, version);
        self.cache.insert(key, token, result.clone());
        result
    }

    /// Forecast every skill with recorded demand, ranked emerging first.
    pub fn forecast_all(&self, as_of: Option<Period>) -> Vec<ForecastResult> {
        let as_of = as_of.unwrap_or_else(|| self.default_as_of());
        let mut skills: Vec<SkillId> = self
            .demand
            .skills()
            .into_iter()
            .filter_map(|id| self.ontology.canonical(id))
            .collect();
        skills.sort();
        skills.dedup();

        let mut results: Vec<ForecastResult> = skills
            .par_iter()
            .map(|&id| self.forecast_canonical(id, as_of))
            .collect();
        rank_forecasts(&mut results);
        results
    }

    /// Most-demanded canonical skills in one period.
    pub fn top_skills(&self, period: Period, n: usize) -> Vec<(SkillId, u64)> {
        self.demand
            .top_skills(period, n, |id| self.ontology.canonical(id).unwrap_or(id))
    }

    // -----------------------------------------------------------------------
    // Gap analysis
    // -----------------------------------------------------------------------

    /// Recency-weighted skill distribution of a role.
    pub fn role_distribution(&self, role: &str, as_of: Option<Period>) -> RoleDistribution {
        let as_of = as_of.unwrap_or_else(|| self.default_as_of());
        self.demand.role_distribution(
            role,
            as_of,
            self.config.gap.half_life_days,
            self.config.gap.min_role_weight,
            |id| self.ontology.canonical(id).unwrap_or(id),
        )
    }

    /// Gap report against a target role using the seeded difficulty table.
    pub fn analyze_gap(
        &self,
        profile: &UserProfile,
        role: &str,
        as_of: Option<Period>,
    ) -> CompassResult<GapReport> {
        let difficulty = self.difficulty.read().expect("difficulty lock poisoned");
        self.analyze_gap_with(profile, role, as_of, &*difficulty)
    }

    /// Gap report with a caller-supplied difficulty table.
    pub fn analyze_gap_with(
        &self,
        profile: &UserProfile,
        role: &str,
        as_of: Option<Period>,
        difficulty: &dyn DifficultyTable,
    ) -> CompassResult<GapReport> {
        if role.trim().is_empty() {
            return Err(GapError::BlankRole.into());
        }
        let as_of = as_of.unwrap_or_else(|| self.default_as_of());
        let distribution = self.role_distribution(role, Some(as_of));
        Ok(self.gap_against(profile, &distribution, difficulty))
    }

    fn gap_against(
        &self,
        profile: &UserProfile,
        distribution: &RoleDistribution,
        difficulty: &dyn DifficultyTable,
    ) -> GapReport {
        let as_of = distribution.as_of;
        let report = self.gap.analyze(
            profile,
            distribution,
            &self.ontology,
            |id| self.forecast_canonical(id, as_of).trend,
            difficulty,
        );
        if report.insufficient_market_data {
            tracing::warn!(role = %report.target_role, "no postings for target role");
        }
        report
    }

    /// Trend class of a skill as of a period, `InsufficientData` when unknown.
    pub fn trend_of(&self, skill: SkillId, as_of: Option<Period>) -> TrendClass {
        self.forecast(skill, as_of)
            .map_or(TrendClass::InsufficientData, |f| f.trend)
    }

    /// Schedule a gap report into a weekly budget.
    pub fn learning_plan(
        &self,
        report: &GapReport,
        hours_per_week: f32,
        timeline_weeks: u32,
    ) -> CompassResult<LearningPlan> {
        Ok(LearningPlan::build(
            report,
            &self.ontology,
            hours_per_week,
            timeline_weeks,
        )?)
    }

    // -----------------------------------------------------------------------
    // Career transitions
    // -----------------------------------------------------------------------

    /// Feasibility of moving from `current_role` to `target_role`.
    ///
    /// The current role's core skills count as held alongside `profile`; the
    /// remaining gap to the target is scheduled into `budget`.
    pub fn analyze_transition(
        &self,
        profile: &UserProfile,
        current_role: &str,
        target_role: &str,
        as_of: Option<Period>,
        budget: StudyBudget,
    ) -> CompassResult<TransitionAnalysis> {
        if current_role.trim().is_empty() || target_role.trim().is_empty() {
            return Err(GapError::BlankRole.into());
        }
        let (from, to) = (role_label(current_role), role_label(target_role));
        if from == to {
            return Err(GapError::SameRole { role: from }.into());
        }

        let as_of = as_of.unwrap_or_else(|| self.default_as_of());
        let core = self.config.gap.core_skill_weight;
        let current = self.role_distribution(&from, Some(as_of));
        let target = self.role_distribution(&to, Some(as_of));
        let shift = RoleShift::between(&current, &target, core);
        let implied =
            transition::implied_profile(profile, &current, core, self.config.gap.min_proficiency);

        let gap = {
            let difficulty = self.difficulty.read().expect("difficulty lock poisoned");
            self.gap_against(&implied, &target, &*difficulty)
        };
        let plan = self.learning_plan(&gap, budget.hours_per_week, budget.timeline_weeks)?;
        let analysis = TransitionAnalysis::assemble(&current, shift, gap, plan);
        tracing::debug!(
            from = %analysis.current_role,
            to = %analysis.target_role,
            score = analysis.score,
            verdict = %analysis.verdict,
            "analyzed transition"
        );
        Ok(analysis)
    }

    /// Analyze a transition to each of `target_roles`, best first.
    pub fn compare_transitions<S: AsRef<str>>(
        &self,
        profile: &UserProfile,
        current_role: &str,
        target_roles: &[S],
        as_of: Option<Period>,
        budget: StudyBudget,
    ) -> CompassResult<Vec<TransitionAnalysis>> {
        let as_of = Some(as_of.unwrap_or_else(|| self.default_as_of()));
        let mut analyses = target_roles
            .iter()
            .map(|target| {
                self.analyze_transition(profile, current_role, target.as_ref(), as_of, budget)
            })
            .collect::<CompassResult<Vec<_>>>()?;
        transition::rank_transitions(&mut analyses);
        Ok(analyses)
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Write the ontology snapshot and any new journal events. No-op in
    /// memory-only mode.
    pub fn persist(&self) -> CompassResult<()> {
        let Some(ref store) = self.store else {
            return Ok(());
        };
        store.save_ontology(&self.ontology.snapshot())?;
        store.save_scheme(self.demand.scheme())?;

        let start = self.persisted_events.load(Ordering::SeqCst);
        let pending = self.demand.journal_since(start);
        if !pending.is_empty() {
            store.append_events(&pending)?;
            self.persisted_events
                .store(start + pending.len(), Ordering::SeqCst);
        }
        store.save_closed_through(self.demand.closed_through())?;
        tracing::info!(
            skills = self.ontology.len(),
            version = self.ontology.version(),
            new_events = pending.len(),
            "persisted engine state"
        );
        Ok(())
    }

    /// Summary of the engine state.
    pub fn info(&self) -> EngineInfo {
        let (cache_hits, cache_misses) = self.cache.stats();
        EngineInfo {
            skills: self.ontology.len(),
            aliases: self.ontology.aliases().len(),
            edges: self.ontology.edge_count(),
            ontology_version: self.ontology.version(),
            postings: self.demand.processed_count(),
            period_days: self.demand.scheme().width_days(),
            latest_period: self.demand.latest_period().map(|p| self.scheme().label(p)),
            closed_through: self.demand.closed_through().map(|p| self.scheme().label(p)),
            dictionary_version: self.extractor().dictionary_version().to_string(),
            cached_forecasts: self.cache.len(),
            cache_hits,
            cache_misses,
            persistent: self.store.is_some(),
        }
    }
}

/// Load the ontology and replay the demand journal from `store`.
///
/// Replay buckets events under the configured scheme, so a journal written
/// with another period width is re-bucketed on every open.
fn restore(
    store: &CompassStore,
    config: &EngineConfig,
    scheme: PeriodScheme,
) -> CompassResult<(Ontology, DemandAggregator)> {
    let ontology = match store.load_ontology()? {
        Some(snapshot) => Ontology::from_snapshot(config.ontology.clone(), snapshot),
        None => Ontology::new(config.ontology.clone()),
    };

    let demand = DemandAggregator::new(scheme, config.extract.confidence_threshold);
    let events = store.load_events()?;
    let replayed = demand.replay(&events);

    match store.load_scheme()? {
        Some(stored) if stored != scheme => {
            // Closed markers refer to the old buckets and are dropped.
            tracing::warn!(
                old_days = stored.width_days(),
                new_days = scheme.width_days(),
                "period scheme changed, re-bucketed demand journal"
            );
        }
        _ => {
            if let Some(period) = store.load_closed_through()? {
                demand.close_through(period);
            }
        }
    }

    tracing::info!(
        skills = ontology.len(),
        version = ontology.version(),
        events = replayed,
        "restored engine state"
    );
    Ok((ontology, demand))
}

/// Summary information about the engine state.
#[derive(Debug, Clone)]
pub struct EngineInfo {
    pub skills: usize,
    pub aliases: usize,
    pub edges: usize,
    pub ontology_version: u64,
    pub postings: usize,
    pub period_days: i64,
    pub latest_period: Option<String>,
    pub closed_through: Option<String>,
    pub dictionary_version: String,
    pub cached_forecasts: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub persistent: bool,
}

impl std::fmt::Display for EngineInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let or_dash = |p: &Option<String>| p.clone().unwrap_or_else(|| "-".to_string());
        writeln!(f, "career-compass engine info")?;
        writeln!(f, "  skills:        {}", self.skills)?;
        writeln!(f, "  aliases:       {}", self.aliases)?;
        writeln!(f, "  edges:         {}", self.edges)?;
        writeln!(f, "  ontology ver:  {}", self.ontology_version)?;
        writeln!(f, "  postings:      {}", self.postings)?;
        writeln!(f, "  period days:   {}", self.period_days)?;
        writeln!(f, "  latest period: {}", or_dash(&self.latest_period))?;
        writeln!(f, "  closed:        {}", or_dash(&self.closed_through))?;
        writeln!(f, "  dictionary:    {}", self.dictionary_version)?;
        writeln!(
            f,
            "  forecasts:     {} cached ({} hits, {} misses)",
            self.cached_forecasts, self.cache_hits, self.cache_misses
        )?;
        writeln!(f, "  persistent:    {}", self.persistent)?;
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("ontology", &self.ontology)
            .field("demand", &self.demand)
            .finish()
    }
}
