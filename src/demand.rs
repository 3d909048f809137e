//! Demand aggregation: resolved mentions → time-bucketed skill counts.
//!
//! Counters are keyed by `(SkillId, Period)` in a `DashMap`, so an increment
//! only locks the shard holding that counter. Recording is idempotent per
//! `PostingId`: a posting is counted in exactly one period, whichever it was
//! first recorded in. Every accepted posting is appended to an in-memory
//! journal of [`RecordedPosting`] events from which the whole aggregate can
//! be rebuilt. Replay buckets each event by its `posted_at` under the
//! aggregator's own scheme, so a journal written under another period width
//! replays correctly.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::DemandConfig;
use crate::error::DemandError;
use crate::posting::{Posting, PostingId, PostingLedger, role_label};
use crate::skill::SkillId;

/// Result type for demand operations.
pub type DemandResult<T> = std::result::Result<T, DemandError>;

// ---------------------------------------------------------------------------
// Periods
// ---------------------------------------------------------------------------

/// Index of a fixed-width time bucket counted from the scheme's anchor date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Period(pub i64);

impl Period {
    pub fn next(self) -> Self {
        Period(self.0 + 1)
    }

    pub fn prev(self) -> Self {
        Period(self.0 - 1)
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Fixed-width bucketing of timestamps into periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodScheme {
    width_days: i64,
    anchor: NaiveDate,
}

impl PeriodScheme {
    pub fn new(width_days: i64, anchor: NaiveDate) -> DemandResult<Self> {
        if width_days < 1 {
            return Err(DemandError::InvalidWidth { days: width_days });
        }
        Ok(Self { width_days, anchor })
    }

    pub fn from_config(config: &DemandConfig) -> DemandResult<Self> {
        Self::new(config.period_days, config.anchor)
    }

    pub fn width_days(&self) -> i64 {
        self.width_days
    }

    /// Bucket containing `ts`.
    pub fn period_of(&self, ts: DateTime<Utc>) -> Period {
        self.period_of_date(ts.date_naive())
    }

    pub fn period_of_date(&self, date: NaiveDate) -> Period {
        Period((date - self.anchor).num_days().div_euclid(self.width_days))
    }

    /// First day of a period.
    pub fn start_of(&self, period: Period) -> NaiveDate {
        self.anchor + Duration::days(period.0 * self.width_days)
    }

    /// Human label: ISO week for Monday-anchored weekly schemes, else the start date.
    pub fn label(&self, period: Period) -> String {
        let start = self.start_of(period);
        if self.width_days == 7 && self.anchor.weekday() == Weekday::Mon {
            let week = start.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        } else {
            start.format("%Y-%m-%d").to_string()
        }
    }

    /// Age of `period` relative to `as_of`, in days.
    pub fn age_days(&self, period: Period, as_of: Period) -> f64 {
        ((as_of.0 - period.0).max(0) * self.width_days) as f64
    }
}

impl Default for PeriodScheme {
    fn default() -> Self {
        let config = DemandConfig::default();
        Self {
            width_days: config.period_days,
            anchor: config.anchor,
        }
    }
}

// ---------------------------------------------------------------------------
// Events and samples
// ---------------------------------------------------------------------------

/// A mention already resolved to a canonical skill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedMention {
    pub skill: SkillId,
    pub confidence: f32,
}

/// Journal event: one posting accepted into one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedPosting {
    pub posting_id: PostingId,
    pub period: Period,
    pub posted_at: DateTime<Utc>,
    /// Lowercased company key; empty when unknown.
    pub company: String,
    pub role: String,
    /// Distinct skills counted for this posting, ascending.
    pub skills: Vec<SkillId>,
}

/// Result of [`DemandAggregator::record`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Recorded(RecordedPosting),
    /// Posting already counted; counts unchanged.
    Duplicate,
}

/// Demand for one skill (summed over merged ids) in one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandSample {
    pub skill: SkillId,
    pub period: Period,
    pub count: u64,
    pub distinct_companies: usize,
}

#[derive(Debug, Default)]
struct Cell {
    count: u64,
    companies: HashSet<String>,
}

/// Share of a role's postings that ask for a skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleSkillWeight {
    pub skill: SkillId,
    pub weight: f64,
}

/// Recency-weighted skill requirements of a target role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDistribution {
    pub role: String,
    pub as_of: Period,
    /// Raw number of postings tagged with the role up to `as_of`.
    pub total_postings: u64,
    /// Ordered by weight descending, then skill id.
    pub weights: Vec<RoleSkillWeight>,
}

impl RoleDistribution {
    pub fn weight_of(&self, skill: SkillId) -> f64 {
        self.weights
            .iter()
            .find(|w| w.skill == skill)
            .map_or(0.0, |w| w.weight)
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Concurrent, append-only demand counters.
pub struct DemandAggregator {
    scheme: PeriodScheme,
    confidence_threshold: f32,
    samples: DashMap<(SkillId, Period), Cell>,
    processed: PostingLedger,
    role_counts: DashMap<(String, SkillId, Period), u64>,
    role_postings: DashMap<(String, Period), u64>,
    company_counts: DashMap<(String, SkillId, Period), u64>,
    period_postings: DashMap<Period, u64>,
    first_seen: DashMap<SkillId, Period>,
    latest: AtomicI64,
    /// Recording holds the read side; closing takes the write side.
    closed_through: RwLock<Option<Period>>,
    journal: Mutex<Vec<RecordedPosting>>,
}

impl DemandAggregator {
    pub fn new(scheme: PeriodScheme, confidence_threshold: f32) -> Self {
        Self {
            scheme,
            confidence_threshold,
            samples: DashMap::new(),
            processed: PostingLedger::new(),
            role_counts: DashMap::new(),
            role_postings: DashMap::new(),
            company_counts: DashMap::new(),
            period_postings: DashMap::new(),
            first_seen: DashMap::new(),
            latest: AtomicI64::new(i64::MIN),
            closed_through: RwLock::new(None),
            journal: Mutex::new(Vec::new()),
        }
    }

    pub fn scheme(&self) -> &PeriodScheme {
        &self.scheme
    }

    /// Count a posting's mentions into `period`.
    ///
    /// Mentions below the confidence threshold are ignored, and each skill
    /// counts once per posting. Re-recording a posting id already counted is
    /// a no-op, whatever `period` it is offered for. A new posting for a
    /// closed period is rejected.
    pub fn record(
        &self,
        posting: &Posting,
        mentions: &[ResolvedMention],
        period: Period,
    ) -> DemandResult<RecordOutcome> {
        let closed = self.closed_through.read().expect("closed-period lock poisoned");
        if self.processed.contains(&posting.id) {
            return Ok(RecordOutcome::Duplicate);
        }
        if let Some(through) = *closed {
            if period <= through {
                return Err(DemandError::PeriodClosed {
                    period: period.0,
                    closed_through: through.0,
                });
            }
        }
        if !self.processed.admit(&posting.id) {
            return Ok(RecordOutcome::Duplicate);
        }

        let skills: BTreeSet<SkillId> = mentions
            .iter()
            .filter(|m| m.confidence >= self.confidence_threshold)
            .map(|m| m.skill)
            .collect();
        let event = RecordedPosting {
            posting_id: posting.id.clone(),
            period,
            posted_at: posting.posted_at,
            company: posting.company_key(),
            role: posting.role.clone(),
            skills: skills.into_iter().collect(),
        };
        self.apply(&event);
        drop(closed);
        self.journal
            .lock()
            .expect("journal lock poisoned")
            .push(event.clone());
        Ok(RecordOutcome::Recorded(event))
    }

    fn apply(&self, event: &RecordedPosting) {
        let period = event.period;
        for &skill in &event.skills {
            {
                let mut cell = self.samples.entry((skill, period)).or_default();
                cell.count += 1;
                if !event.company.is_empty() {
                    cell.companies.insert(event.company.clone());
                }
            }
            *self
                .role_counts
                .entry((event.role.clone(), skill, period))
                .or_insert(0) += 1;
            if !event.company.is_empty() {
                *self
                    .company_counts
                    .entry((event.company.clone(), skill, period))
                    .or_insert(0) += 1;
            }
            self.first_seen
                .entry(skill)
                .and_modify(|p| *p = (*p).min(period))
                .or_insert(period);
        }
        *self
            .role_postings
            .entry((event.role.clone(), period))
            .or_insert(0) += 1;
        *self.period_postings.entry(period).or_insert(0) += 1;
        self.latest.fetch_max(period.0, Ordering::SeqCst);
    }

    /// Rebuild state from journal events, in order. Each event is bucketed
    /// by `posted_at` under this aggregator's scheme; already-processed
    /// postings are skipped.
    pub fn replay<'a>(&self, events: impl IntoIterator<Item = &'a RecordedPosting>) -> usize {
        let mut applied = 0;
        let mut journal = self.journal.lock().expect("journal lock poisoned");
        for event in events {
            if !self.processed.admit(&event.posting_id) {
                continue;
            }
            let mut event = event.clone();
            event.period = self.scheme.period_of(event.posted_at);
            self.apply(&event);
            journal.push(event);
            applied += 1;
        }
        applied
    }

    /// Journal events from position `start` on.
    pub fn journal_since(&self, start: usize) -> Vec<RecordedPosting> {
        let journal = self.journal.lock().expect("journal lock poisoned");
        journal.get(start..).map(<[_]>::to_vec).unwrap_or_default()
    }

    pub fn journal_len(&self) -> usize {
        self.journal.lock().expect("journal lock poisoned").len()
    }

    // -----------------------------------------------------------------------
    // Closing periods
    // -----------------------------------------------------------------------

    /// Mark every period up to and including `period` as closed.
    ///
    /// Closing never moves backwards.
    pub fn close_through(&self, period: Period) -> Period {
        let mut closed = self.closed_through.write().expect("closed-period lock poisoned");
        let through = closed.map_or(period, |c| c.max(period));
        *closed = Some(through);
        through
    }

    pub fn closed_through(&self) -> Option<Period> {
        *self.closed_through.read().expect("closed-period lock poisoned")
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Most recent period with any recorded posting.
    pub fn latest_period(&self) -> Option<Period> {
        let raw = self.latest.load(Ordering::SeqCst);
        (raw != i64::MIN).then_some(Period(raw))
    }

    /// Earliest period in which any of `ids` was counted.
    pub fn first_period(&self, ids: &[SkillId]) -> Option<Period> {
        ids.iter()
            .filter_map(|id| self.first_seen.get(id).map(|p| *p.value()))
            .min()
    }

    /// Count for one raw id in one period.
    pub fn count(&self, id: SkillId, period: Period) -> u64 {
        self.samples.get(&(id, period)).map_or(0, |c| c.count)
    }

    /// Combined sample for `survivor` and the `ids` merged into it.
    pub fn sample(&self, survivor: SkillId, ids: &[SkillId], period: Period) -> DemandSample {
        let mut count = 0;
        let mut companies: HashSet<String> = HashSet::new();
        for id in ids {
            if let Some(cell) = self.samples.get(&(*id, period)) {
                count += cell.count;
                companies.extend(cell.companies.iter().cloned());
            }
        }
        DemandSample {
            skill: survivor,
            period,
            count,
            distinct_companies: companies.len(),
        }
    }

    /// Dense series of counts from the first period `ids` were seen through
    /// `through`, zero-filled. Empty when `ids` were never seen.
    pub fn series(&self, ids: &[SkillId], through: Period) -> Vec<u64> {
        let Some(first) = self.first_period(ids) else {
            return Vec::new();
        };
        (first.0..=through.0)
            .map(|p| ids.iter().map(|id| self.count(*id, Period(p))).sum())
            .collect()
    }

    /// Combined samples for `ids` over the same range as [`Self::series`].
    pub fn samples(&self, survivor: SkillId, ids: &[SkillId], through: Period) -> Vec<DemandSample> {
        let Some(first) = self.first_period(ids) else {
            return Vec::new();
        };
        (first.0..=through.0)
            .map(|p| self.sample(survivor, ids, Period(p)))
            .collect()
    }

    /// Every raw skill id with at least one count.
    pub fn skills(&self) -> Vec<SkillId> {
        let mut ids: Vec<SkillId> = self.first_seen.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    /// Most-demanded skills in one period after canonicalization.
    pub fn top_skills(
        &self,
        period: Period,
        n: usize,
        canonical: impl Fn(SkillId) -> SkillId,
    ) -> Vec<(SkillId, u64)> {
        let mut totals: HashMap<SkillId, u64> = HashMap::new();
        for entry in self.samples.iter() {
            let (skill, p) = *entry.key();
            if p == period {
                *totals.entry(canonical(skill)).or_insert(0) += entry.value().count;
            }
        }
        let mut ranked: Vec<(SkillId, u64)> = totals.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }

    /// Companies asking for `ids` most often, across all periods.
    pub fn top_companies(&self, ids: &[SkillId], n: usize) -> Vec<(String, u64)> {
        let mut totals: BTreeMap<String, u64> = BTreeMap::new();
        for entry in self.company_counts.iter() {
            let (company, skill, _) = entry.key();
            if ids.contains(skill) {
                *totals.entry(company.clone()).or_insert(0) += *entry.value();
            }
        }
        let mut ranked: Vec<(String, u64)> = totals.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }

    /// Role labels with their total posting counts, most common first.
    pub fn roles(&self) -> Vec<(String, u64)> {
        let mut totals: BTreeMap<String, u64> = BTreeMap::new();
        for entry in self.role_postings.iter() {
            *totals.entry(entry.key().0.clone()).or_insert(0) += *entry.value();
        }
        let mut ranked: Vec<(String, u64)> = totals.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }

    /// Number of postings recorded in `period`.
    pub fn postings_in(&self, period: Period) -> u64 {
        self.period_postings.get(&period).map_or(0, |c| *c.value())
    }

    /// Whether a posting has already been counted, in any period.
    pub fn is_processed(&self, posting_id: &PostingId) -> bool {
        self.processed.contains(posting_id)
    }

    /// Distinct postings processed.
    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    /// Recency-weighted skill distribution of a role up to `as_of`.
    ///
    /// A skill's weight is the decayed count of role postings mentioning it
    /// over the decayed count of all role postings, with decay
    /// `0.5^(age_days / half_life_days)`. Ids are folded through `canonical`
    /// so merged skills count once.
    pub fn role_distribution(
        &self,
        role: &str,
        as_of: Period,
        half_life_days: f64,
        min_weight: f64,
        canonical: impl Fn(SkillId) -> SkillId,
    ) -> RoleDistribution {
        let role = role_label(role);
        let decay = |p: Period| 0.5f64.powf(self.scheme.age_days(p, as_of) / half_life_days);

        let mut total_postings = 0;
        let mut denominator = 0.0;
        for entry in self.role_postings.iter() {
            let (r, p) = entry.key();
            if *r == role && *p <= as_of {
                total_postings += *entry.value();
                denominator += *entry.value() as f64 * decay(*p);
            }
        }

        let mut numerators: BTreeMap<SkillId, f64> = BTreeMap::new();
        if denominator > 0.0 {
            for entry in self.role_counts.iter() {
                let (r, skill, p) = entry.key();
                if *r == role && *p <= as_of {
                    *numerators.entry(canonical(*skill)).or_insert(0.0) +=
                        *entry.value() as f64 * decay(*p);
                }
            }
        }

        let mut weights: Vec<RoleSkillWeight> = numerators
            .into_iter()
            .map(|(skill, num)| RoleSkillWeight {
                skill,
                weight: (num / denominator).min(1.0),
            })
            .filter(|w| w.weight >= min_weight && w.weight > 0.0)
            .collect();
        weights.sort_by(|a, b| b.weight.total_cmp(&a.weight).then(a.skill.cmp(&b.skill)));

        RoleDistribution {
            role,
            as_of,
            total_postings,
            weights,
        }
    }
}

impl Default for DemandAggregator {
    fn default() -> Self {
        Self::new(PeriodScheme::default(), 0.3)
    }
}

impl std::fmt::Debug for DemandAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DemandAggregator")
            .field("scheme", &self.scheme)
            .field("samples", &self.samples.len())
            .field("processed", &self.processed.len())
            .field("closed_through", &self.closed_through())
            .finish()
    }
}
