//! Gap and ROI analysis against a target role.
//!
//! A [`UserProfile`] is compared with a role's recency-weighted skill
//! distribution. Every required skill the user lacks (or holds below the
//! configured proficiency) becomes a [`GapEntry`] whose priority is the
//! role weight scaled by the skill's forecast trend. The [`transition`]
//! module compares two roles the same way.

pub mod plan;
pub mod transition;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::GapConfig;
use crate::demand::{Period, RoleDistribution};
use crate::forecast::TrendClass;
use crate::ontology::{Ontology, SkillNode, normalize_term};
use crate::skill::{SkillCategory, SkillId};

pub use plan::{LearningPlan, PlanStep};
pub use transition::{
    PhaseFocus, RoadmapPhase, RoleShift, StudyBudget, TransitionAnalysis, TransitionRoadmap,
    TransitionVerdict,
};

/// Self-assessed skill level, ordered from weakest to strongest.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Proficiency {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
    Expert,
}

impl Proficiency {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "beginner" | "basic" | "novice" => Some(Self::Beginner),
            "intermediate" | "working" => Some(Self::Intermediate),
            "advanced" => Some(Self::Advanced),
            "expert" => Some(Self::Expert),
            _ => None,
        }
    }
}

impl std::fmt::Display for Proficiency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Beginner => write!(f, "beginner"),
            Self::Intermediate => write!(f, "intermediate"),
            Self::Advanced => write!(f, "advanced"),
            Self::Expert => write!(f, "expert"),
        }
    }
}

/// The skills a user already has. Owned by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub skills: BTreeMap<SkillId, Proficiency>,
}

impl UserProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, skill: SkillId, level: Proficiency) -> Self {
        self.insert(skill, level);
        self
    }

    /// Add a skill, keeping the higher level if it is already present.
    pub fn insert(&mut self, skill: SkillId, level: Proficiency) {
        let entry = self.skills.entry(skill).or_insert(level);
        *entry = (*entry).max(level);
    }

    /// Build a profile from skill names, each optionally suffixed with
    /// `:level` (`"python:advanced"`). Names default to intermediate.
    ///
    /// Resolution is read-only. Returns the profile and the names the
    /// ontology does not know.
    pub fn resolve<S: AsRef<str>>(ontology: &Ontology, names: &[S]) -> (Self, Vec<String>) {
        let mut profile = Self::new();
        let mut unknown = Vec::new();
        for raw in names {
            let raw = raw.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            let (name, level) = match raw.rsplit_once(':') {
                Some((name, level)) => match Proficiency::parse(level) {
                    Some(level) => (name, level),
                    None => (raw, Proficiency::default()),
                },
                None => (raw, Proficiency::default()),
            };
            match ontology.lookup(name) {
                Some(id) => profile.insert(id, level),
                None => unknown.push(name.to_string()),
            }
        }
        (profile, unknown)
    }

    /// Profile with ids folded onto their surviving canonical ids.
    fn canonicalized(&self, ontology: &Ontology) -> HashMap<SkillId, Proficiency> {
        let mut held: HashMap<SkillId, Proficiency> = HashMap::new();
        for (&id, &level) in &self.skills {
            let id = ontology.canonical(id).unwrap_or(id);
            let entry = held.entry(id).or_insert(level);
            *entry = (*entry).max(level);
        }
        held
    }
}

/// Estimated learning effort per skill. External collaborator.
pub trait DifficultyTable: Send + Sync {
    fn estimated_hours(&self, skill: &SkillNode) -> f32;
}

/// Hours from curated seed data, then per-category defaults, then a flat default.
#[derive(Debug, Clone, Default)]
pub struct SeededDifficultyTable {
    /// Normalized alias → hours. Keyed by alias so merges keep their estimate.
    by_alias: HashMap<String, f32>,
    by_category: HashMap<SkillCategory, f32>,
    default_hours: f32,
}

impl SeededDifficultyTable {
    pub fn new(default_hours: f32) -> Self {
        let by_category = HashMap::from([
            (SkillCategory::Programming, 40.0),
            (SkillCategory::DataScience, 60.0),
            (SkillCategory::DataEngineering, 40.0),
            (SkillCategory::CloudDevops, 40.0),
            (SkillCategory::SoftSkills, 20.0),
        ]);
        Self {
            by_alias: HashMap::new(),
            by_category,
            default_hours,
        }
    }

    pub fn set_hours(&mut self, name: &str, hours: f32) {
        self.by_alias.insert(normalize_term(name), hours);
    }

    /// Take over every per-skill estimate of `other`, replacing shared keys.
    pub fn absorb(&mut self, other: SeededDifficultyTable) {
        self.by_alias.extend(other.by_alias);
    }

    pub fn set_category_hours(&mut self, category: SkillCategory, hours: f32) {
        self.by_category.insert(category, hours);
    }

    pub fn len(&self) -> usize {
        self.by_alias.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_alias.is_empty()
    }
}

impl DifficultyTable for SeededDifficultyTable {
    fn estimated_hours(&self, skill: &SkillNode) -> f32 {
        let seeded = std::iter::once(normalize_term(&skill.display_name))
            .chain(skill.aliases.iter().cloned())
            .find_map(|alias| self.by_alias.get(&alias).copied());
        seeded
            .or_else(|| self.by_category.get(&skill.category).copied())
            .unwrap_or(self.default_hours)
    }
}

/// One missing skill in a gap report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapEntry {
    pub skill: SkillId,
    pub display_name: String,
    /// Share of recency-weighted role postings asking for this skill.
    pub required_weight: f64,
    pub trend: TrendClass,
    pub priority_score: f64,
    pub estimated_hours: f32,
    /// Priority per learning hour.
    pub roi: f64,
    /// Held level when present but below the threshold.
    pub current_proficiency: Option<Proficiency>,
}

/// Ranked gap between a profile and a target role. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapReport {
    pub target_role: String,
    pub as_of: Period,
    pub ontology_version: u64,
    pub generated_at: DateTime<Utc>,
    pub total_postings: u64,
    /// Ordered by priority descending, then estimated hours ascending.
    pub missing: Vec<GapEntry>,
    /// Weighted share of the role distribution the user already covers.
    pub coverage: f64,
    /// The role has no postings; `missing` is empty for lack of data, not
    /// because nothing is missing.
    pub insufficient_market_data: bool,
}

/// Computes gap reports.
#[derive(Debug, Clone)]
pub struct GapAnalyzer {
    config: GapConfig,
}

impl GapAnalyzer {
    pub fn new(config: GapConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GapConfig {
        &self.config
    }

    /// Forecast multiplier for a trend class.
    pub fn multiplier(&self, trend: TrendClass) -> f64 {
        match trend {
            TrendClass::Emerging => self.config.emerging_multiplier,
            TrendClass::Declining => self.config.declining_multiplier,
            TrendClass::Stable | TrendClass::InsufficientData => self.config.stable_multiplier,
        }
    }

    /// Compare `profile` with the role `distribution`.
    pub fn analyze(
        &self,
        profile: &UserProfile,
        distribution: &RoleDistribution,
        ontology: &Ontology,
        trend_of: impl Fn(SkillId) -> TrendClass,
        difficulty: &dyn DifficultyTable,
    ) -> GapReport {
        let mut report = GapReport {
            target_role: distribution.role.clone(),
            as_of: distribution.as_of,
            ontology_version: ontology.version(),
            generated_at: Utc::now(),
            total_postings: distribution.total_postings,
            missing: Vec::new(),
            coverage: 0.0,
            insufficient_market_data: distribution.total_postings == 0,
        };
        if report.insufficient_market_data {
            return report;
        }

        let held = profile.canonicalized(ontology);
        let mut total_weight = 0.0;
        let mut covered_weight = 0.0;

        for required in &distribution.weights {
            if required.weight < self.config.min_role_weight {
                continue;
            }
            total_weight += required.weight;
            let skill = ontology.canonical(required.skill).unwrap_or(required.skill);
            let current = held.get(&skill).copied();
            if current.is_some_and(|level| level >= self.config.min_proficiency) {
                covered_weight += required.weight;
                continue;
            }

            let trend = trend_of(skill);
            let priority_score = required.weight * self.multiplier(trend);
            let (display_name, estimated_hours) = match ontology.node(skill) {
                Some(node) => {
                    let hours = difficulty.estimated_hours(&node);
                    (node.display_name, hours)
                }
                None => (skill.to_string(), self.config.default_hours),
            };
            let estimated_hours = estimated_hours.max(f32::EPSILON);
            report.missing.push(GapEntry {
                skill,
                display_name,
                required_weight: required.weight,
                trend,
                priority_score,
                estimated_hours,
                roi: priority_score / estimated_hours as f64,
                current_proficiency: current,
            });
        }

        report.missing.sort_by(|a, b| {
            b.priority_score
                .total_cmp(&a.priority_score)
                .then_with(|| a.estimated_hours.total_cmp(&b.estimated_hours))
                .then_with(|| a.skill.cmp(&b.skill))
        });
        if total_weight > 0.0 {
            report.coverage = covered_weight / total_weight;
        }
        report
    }
}

impl Default for GapAnalyzer {
    fn default() -> Self {
        Self::new(GapConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demand::RoleSkillWeight;

    struct Fixture {
        ont: Ontology,
        python: SkillId,
        sql: SkillId,
        k8s: SkillId,
        terraform: SkillId,
    }

    fn fixture() -> Fixture {
        let ont = Ontology::default();
        let python = ont
            .ensure_skill("Python", SkillCategory::Programming, &["py"])
            .unwrap();
        let sql = ont.ensure_skill("SQL", SkillCategory::Programming, &[] as &[&str]).unwrap();
        let k8s = ont
            .ensure_skill("Kubernetes", SkillCategory::CloudDevops, &["k8s"])
            .unwrap();
        let terraform = ont
            .ensure_skill("Terraform", SkillCategory::CloudDevops, &[] as &[&str])
            .unwrap();
        Fixture {
            ont,
            python,
            sql,
            k8s,
            terraform,
        }
    }

    fn distribution(weights: &[(SkillId, f64)], postings: u64) -> RoleDistribution {
        RoleDistribution {
            role: "devops engineer".into(),
            as_of: Period(10),
            total_postings: postings,
            weights: weights
                .iter()
                .map(|&(skill, weight)| RoleSkillWeight { skill, weight })
                .collect(),
        }
    }

    #[test]
    fn emerging_gap_outranks_stable_gap() {
        let f = fixture();
        let profile = UserProfile::new()
            .with(f.python, Proficiency::Advanced)
            .with(f.sql, Proficiency::Intermediate);
        let dist = distribution(
            &[(f.python, 0.8), (f.sql, 0.8), (f.k8s, 0.8), (f.terraform, 0.8)],
            20,
        );
        let trends = |id: SkillId| {
            if id == f.k8s {
                TrendClass::Emerging
            } else {
                TrendClass::Stable
            }
        };
        let table = SeededDifficultyTable::new(30.0);
        let report = GapAnalyzer::default().analyze(&profile, &dist, &f.ont, trends, &table);

        let order: Vec<SkillId> = report.missing.iter().map(|e| e.skill).collect();
        assert_eq!(order, vec![f.k8s, f.terraform]);
        assert!((report.missing[0].priority_score - 1.2).abs() < 1e-9);
        assert!((report.coverage - 0.5).abs() < 1e-9);
        assert!(!report.insufficient_market_data);
    }

    #[test]
    fn equal_priority_prefers_cheaper_skill() {
        let f = fixture();
        let dist = distribution(&[(f.k8s, 0.5), (f.terraform, 0.5)], 4);
        let mut table = SeededDifficultyTable::new(30.0);
        table.set_hours("kubernetes", 40.0);
        table.set_hours("Terraform", 20.0);
        let report = GapAnalyzer::default().analyze(
            &UserProfile::new(),
            &dist,
            &f.ont,
            |_| TrendClass::Stable,
            &table,
        );
        assert_eq!(report.missing[0].skill, f.terraform);
        assert!((report.missing[0].roi - 0.5 / 20.0).abs() < 1e-9);
    }

    #[test]
    fn low_proficiency_still_counts_as_missing() {
        let f = fixture();
        let profile = UserProfile::new().with(f.python, Proficiency::Beginner);
        let dist = distribution(&[(f.python, 1.0)], 3);
        let report = GapAnalyzer::default().analyze(
            &profile,
            &dist,
            &f.ont,
            |_| TrendClass::Stable,
            &SeededDifficultyTable::new(30.0),
        );
        assert_eq!(report.missing.len(), 1);
        assert_eq!(report.missing[0].current_proficiency, Some(Proficiency::Beginner));
    }

    #[test]
    fn role_without_postings_is_flagged() {
        let f = fixture();
        let dist = distribution(&[], 0);
        let report = GapAnalyzer::default().analyze(
            &UserProfile::new(),
            &dist,
            &f.ont,
            |_| TrendClass::Stable,
            &SeededDifficultyTable::new(30.0),
        );
        assert!(report.insufficient_market_data);
        assert!(report.missing.is_empty());
    }

    #[test]
    fn declining_skills_are_discounted() {
        let analyzer = GapAnalyzer::default();
        assert_eq!(analyzer.multiplier(TrendClass::Emerging), 1.5);
        assert_eq!(analyzer.multiplier(TrendClass::Declining), 0.5);
        assert_eq!(analyzer.multiplier(TrendClass::InsufficientData), 1.0);
    }

    #[test]
    fn difficulty_falls_back_by_category_then_default() {
        let f = fixture();
        let mut table = SeededDifficultyTable::new(30.0);
        table.set_hours("k8s", 45.0);
        let k8s = f.ont.node(f.k8s).unwrap();
        assert_eq!(table.estimated_hours(&k8s), 45.0);
        let terraform = f.ont.node(f.terraform).unwrap();
        assert_eq!(table.estimated_hours(&terraform), 40.0);
        let misc = f.ont.resolve("Basket Weaving").unwrap();
        assert_eq!(table.estimated_hours(&f.ont.node(misc).unwrap()), 30.0);
    }

    #[test]
    fn profile_resolution_reports_unknown_names() {
        let f = fixture();
        let (profile, unknown) =
            UserProfile::resolve(&f.ont, &["python:expert", "K8s", "Cobol", "  "]);
        assert_eq!(profile.skills.get(&f.python), Some(&Proficiency::Expert));
        assert_eq!(profile.skills.get(&f.k8s), Some(&Proficiency::Intermediate));
        assert_eq!(unknown, vec!["Cobol".to_string()]);
        assert_eq!(f.ont.len(), 4);
    }

    #[test]
    fn proficiency_orders_and_parses() {
        assert!(Proficiency::Beginner < Proficiency::Intermediate);
        assert!(Proficiency::Advanced < Proficiency::Expert);
        assert_eq!(Proficiency::parse(" Advanced "), Some(Proficiency::Advanced));
        assert_eq!(Proficiency::parse("guru"), None);
    }
}
