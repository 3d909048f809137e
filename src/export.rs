//! Export types for serializing engine results.
//!
//! These types provide human-readable, label-resolved representations of
//! forecasts, gap reports and demand counts suitable for JSON export. Skill
//! ids are paired with display names and periods with ISO week labels.

use serde::{Deserialize, Serialize};

use crate::demand::{Period, PeriodScheme};
use crate::forecast::ForecastResult;
use crate::gap::{GapReport, LearningPlan, TransitionAnalysis, TransitionRoadmap};
use crate::ontology::Ontology;
use crate::skill::SkillId;

/// Exported projection point with a labeled period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionExport {
    pub period: String,
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Exported forecast with resolved skill name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastExport {
    /// Numeric skill ID.
    pub skill_id: u64,
    /// Display name of the surviving skill.
    pub skill: String,
    pub as_of: String,
    /// Trend class (emerging, stable, declining, insufficient_data).
    pub trend: String,
    pub growth_rate: f64,
    pub current_volume: f64,
    pub history_len: usize,
    pub confidence: f64,
    pub projected: Vec<ProjectionExport>,
    pub ontology_version: u64,
}

impl ForecastExport {
    pub fn new(result: &ForecastResult, ontology: &Ontology, scheme: &PeriodScheme) -> Self {
        Self {
            skill_id: result.skill.get(),
            skill: ontology.display_name(result.skill),
            as_of: scheme.label(result.as_of),
            trend: result.trend.to_string(),
            growth_rate: result.growth_rate,
            current_volume: result.current_volume,
            history_len: result.history_len,
            confidence: result.confidence,
            projected: result
                .projected
                .iter()
                .map(|p| ProjectionExport {
                    period: scheme.label(p.period),
                    value: p.value,
                    lower: p.lower,
                    upper: p.upper,
                })
                .collect(),
            ontology_version: result.ontology_version,
        }
    }
}

/// Exported gap entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapEntryExport {
    pub skill_id: u64,
    pub skill: String,
    pub required_weight: f64,
    pub trend: String,
    pub priority_score: f64,
    pub estimated_hours: f32,
    pub roi: f64,
    /// Held proficiency below the threshold, if any.
    pub current_proficiency: Option<String>,
}

/// Exported gap report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapExport {
    pub target_role: String,
    pub as_of: String,
    pub total_postings: u64,
    pub coverage: f64,
    pub insufficient_market_data: bool,
    pub ontology_version: u64,
    pub missing: Vec<GapEntryExport>,
}

impl GapExport {
    pub fn new(report: &GapReport, scheme: &PeriodScheme) -> Self {
        Self {
            target_role: report.target_role.clone(),
            as_of: scheme.label(report.as_of),
            total_postings: report.total_postings,
            coverage: report.coverage,
            insufficient_market_data: report.insufficient_market_data,
            ontology_version: report.ontology_version,
            missing: report
                .missing
                .iter()
                .map(|e| GapEntryExport {
                    skill_id: e.skill.get(),
                    skill: e.display_name.clone(),
                    required_weight: e.required_weight,
                    trend: e.trend.to_string(),
                    priority_score: e.priority_score,
                    estimated_hours: e.estimated_hours,
                    roi: e.roi,
                    current_proficiency: e.current_proficiency.map(|p| p.to_string()),
                })
                .collect(),
        }
    }
}

/// Exported plan step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStepExport {
    pub skill: String,
    pub estimated_hours: f32,
    pub start_week: f32,
    pub end_week: f32,
    /// Names of missing prerequisites scheduled earlier.
    pub after: Vec<String>,
}

/// Exported learning plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanExport {
    pub target_role: String,
    pub hours_per_week: f32,
    pub timeline_weeks: u32,
    pub total_hours: f32,
    pub total_weeks: f32,
    pub feasible: bool,
    pub steps: Vec<PlanStepExport>,
    /// Names of skills that did not fit.
    pub deferred: Vec<String>,
}

impl PlanExport {
    pub fn new(plan: &LearningPlan, ontology: &Ontology) -> Self {
        Self {
            target_role: plan.target_role.clone(),
            hours_per_week: plan.hours_per_week,
            timeline_weeks: plan.timeline_weeks,
            total_hours: plan.total_hours,
            total_weeks: plan.total_weeks,
            feasible: plan.feasible,
            steps: plan
                .steps
                .iter()
                .map(|s| PlanStepExport {
                    skill: s.display_name.clone(),
                    estimated_hours: s.estimated_hours,
                    start_week: s.start_week,
                    end_week: s.end_week,
                    after: s.after.iter().map(|id| ontology.display_name(*id)).collect(),
                })
                .collect(),
            deferred: plan.deferred.iter().map(|e| e.display_name.clone()).collect(),
        }
    }
}

/// Exported roadmap phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadmapPhaseExport {
    pub focus: String,
    pub start_week: f32,
    pub end_week: f32,
    pub skills: Vec<String>,
}

/// Exported career transition with its roadmap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionExport {
    pub current_role: String,
    pub target_role: String,
    pub current_postings: u64,
    pub target_postings: u64,
    pub shared_skills: Vec<String>,
    pub gained_skills: Vec<String>,
    pub dropped_skills: Vec<String>,
    pub market_share: f64,
    pub estimated_weeks: f32,
    pub score: f64,
    pub verdict: String,
    pub gap: GapExport,
    pub plan: PlanExport,
    pub roadmap: Vec<RoadmapPhaseExport>,
    pub on_track: bool,
}

impl TransitionExport {
    pub fn new(analysis: &TransitionAnalysis, ontology: &Ontology, scheme: &PeriodScheme) -> Self {
        let names = |ids: &[SkillId]| -> Vec<String> {
            ids.iter().map(|id| ontology.display_name(*id)).collect()
        };
        let roadmap = TransitionRoadmap::build(analysis);
        Self {
            current_role: analysis.current_role.clone(),
            target_role: analysis.target_role.clone(),
            current_postings: analysis.current_postings,
            target_postings: analysis.target_postings,
            shared_skills: names(&analysis.shift.shared),
            gained_skills: names(&analysis.shift.gained),
            dropped_skills: names(&analysis.shift.dropped),
            market_share: analysis.market_share,
            estimated_weeks: analysis.estimated_weeks,
            score: analysis.score,
            verdict: analysis.verdict.to_string(),
            gap: GapExport::new(&analysis.gap, scheme),
            plan: PlanExport::new(&analysis.plan, ontology),
            roadmap: roadmap
                .phases
                .iter()
                .map(|p| RoadmapPhaseExport {
                    focus: p.focus.to_string(),
                    start_week: p.start_week,
                    end_week: p.end_week,
                    skills: names(&p.skills),
                })
                .collect(),
            on_track: roadmap.on_track,
        }
    }
}

/// Exported demand count of one skill in one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillDemandExport {
    pub skill_id: u64,
    pub skill: String,
    pub period: String,
    pub count: u64,
}

impl SkillDemandExport {
    pub fn new(
        skill: SkillId,
        count: u64,
        period: Period,
        ontology: &Ontology,
        scheme: &PeriodScheme,
    ) -> Self {
        Self {
            skill_id: skill.get(),
            skill: ontology.display_name(skill),
            period: scheme.label(period),
            count,
        }
    }
}
