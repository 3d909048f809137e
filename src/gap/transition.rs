//! Career transitions: moving from a current role to a target role.
//!
//! Both roles are read from the market as recency-weighted skill
//! distributions. Skills at or above the core weight of a role are its core
//! skills; someone working in the current role is assumed to hold that
//! role's core skills, so the transition gap is the target's requirements
//! minus the user's profile and the current role's core.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::demand::RoleDistribution;
use crate::skill::SkillId;

use super::{GapReport, LearningPlan, Proficiency, UserProfile};

/// Average weeks per month, for month-based scoring.
const WEEKS_PER_MONTH: f32 = 4.33;

/// Weekly study time and the horizon it must fit in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StudyBudget {
    pub hours_per_week: f32,
    pub timeline_weeks: u32,
}

impl Default for StudyBudget {
    fn default() -> Self {
        Self {
            hours_per_week: 10.0,
            timeline_weeks: 52,
        }
    }
}

/// Core-skill difference between two roles. Every list is ascending by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleShift {
    /// Core to both roles.
    pub shared: Vec<SkillId>,
    /// Core to the target only.
    pub gained: Vec<SkillId>,
    /// Core to the current role only.
    pub dropped: Vec<SkillId>,
}

impl RoleShift {
    pub fn between(current: &RoleDistribution, target: &RoleDistribution, core_weight: f64) -> Self {
        let from = core_skills(current, core_weight);
        let to = core_skills(target, core_weight);
        Self {
            shared: from.intersection(&to).copied().collect(),
            gained: to.difference(&from).copied().collect(),
            dropped: from.difference(&to).copied().collect(),
        }
    }
}

fn core_skills(distribution: &RoleDistribution, core_weight: f64) -> BTreeSet<SkillId> {
    distribution
        .weights
        .iter()
        .filter(|w| w.weight >= core_weight)
        .map(|w| w.skill)
        .collect()
}

/// `profile` plus the core skills of the current role at `level`. Skills the
/// user listed keep their stated level.
pub fn implied_profile(
    profile: &UserProfile,
    current: &RoleDistribution,
    core_weight: f64,
    level: Proficiency,
) -> UserProfile {
    let mut implied = profile.clone();
    for skill in core_skills(current, core_weight) {
        implied.skills.entry(skill).or_insert(level);
    }
    implied
}

/// Overall judgement of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionVerdict {
    HighlyRecommended,
    Recommended,
    Feasible,
    Challenging,
    NotRecommended,
    /// The target role has no postings to judge by.
    InsufficientData,
}

impl TransitionVerdict {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 80.0 => Self::HighlyRecommended,
            s if s >= 60.0 => Self::Recommended,
            s if s >= 40.0 => Self::Feasible,
            s if s >= 20.0 => Self::Challenging,
            _ => Self::NotRecommended,
        }
    }
}

impl std::fmt::Display for TransitionVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::HighlyRecommended => "highly recommended",
            Self::Recommended => "recommended",
            Self::Feasible => "feasible, needs significant upskilling",
            Self::Challenging => "challenging, major skill gap",
            Self::NotRecommended => "not recommended",
            Self::InsufficientData => "insufficient market data",
        };
        f.write_str(label)
    }
}

/// Score in `[0, 100]` from target coverage, time to close the gap and the
/// target's share of postings across both roles.
///
/// Coverage counts half (saturating at two thirds covered), market share
/// 30% and time 20%, where every month of study costs 5 points.
pub fn transition_score(coverage: f64, estimated_weeks: f32, market_share: f64) -> f64 {
    let skill = (coverage * 150.0).clamp(0.0, 100.0);
    let months = (estimated_weeks / WEEKS_PER_MONTH) as f64;
    let time = (100.0 - months * 5.0).max(0.0);
    let market = (market_share * 100.0).clamp(0.0, 100.0);
    let score = 0.5 * skill + 0.3 * market + 0.2 * time;
    (score * 10.0).round() / 10.0
}

/// Feasibility of moving from one role to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionAnalysis {
    pub current_role: String,
    pub target_role: String,
    pub current_postings: u64,
    pub target_postings: u64,
    pub shift: RoleShift,
    /// Gap against the target with the current role's core taken as held.
    pub gap: GapReport,
    pub plan: LearningPlan,
    /// Target postings over the postings of both roles.
    pub market_share: f64,
    /// Weeks to learn every missing skill at the budgeted pace.
    pub estimated_weeks: f32,
    pub score: f64,
    pub verdict: TransitionVerdict,
}

impl TransitionAnalysis {
    pub fn assemble(
        current: &RoleDistribution,
        shift: RoleShift,
        gap: GapReport,
        plan: LearningPlan,
    ) -> Self {
        let hours: f32 = gap.missing.iter().map(|e| e.estimated_hours).sum();
        let estimated_weeks = hours / plan.hours_per_week;
        let both = current.total_postings + gap.total_postings;
        let market_share = if both == 0 {
            0.0
        } else {
            gap.total_postings as f64 / both as f64
        };
        let (score, verdict) = if gap.insufficient_market_data {
            (0.0, TransitionVerdict::InsufficientData)
        } else {
            let score = transition_score(gap.coverage, estimated_weeks, market_share);
            (score, TransitionVerdict::from_score(score))
        };
        Self {
            current_role: current.role.clone(),
            target_role: gap.target_role.clone(),
            current_postings: current.total_postings,
            target_postings: gap.total_postings,
            shift,
            gap,
            plan,
            market_share,
            estimated_weeks,
            score,
            verdict,
        }
    }
}

/// Order transitions best first: score descending, then target role name.
pub fn rank_transitions(transitions: &mut [TransitionAnalysis]) {
    transitions.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.target_role.cmp(&b.target_role))
    });
}

/// Stage of a transition roadmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseFocus {
    /// First half of the scheduled skills, prerequisites included.
    Foundation,
    /// Remaining scheduled skills, applied in projects.
    Application,
    JobSearch,
    Placement,
}

impl std::fmt::Display for PhaseFocus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Foundation => "foundation",
            Self::Application => "application",
            Self::JobSearch => "job search",
            Self::Placement => "placement",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadmapPhase {
    pub focus: PhaseFocus,
    pub start_week: f32,
    pub end_week: f32,
    /// Skills learned in this phase, in plan order.
    pub skills: Vec<SkillId>,
}

/// A transition laid out in phases over the plan's timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRoadmap {
    pub current_role: String,
    pub target_role: String,
    pub timeline_weeks: u32,
    pub phases: Vec<RoadmapPhase>,
    /// Missing skills left out of the timeline.
    pub deferred: Vec<SkillId>,
    /// Every missing skill fits, leaving time for the job search.
    pub on_track: bool,
}

impl TransitionRoadmap {
    /// Split the analysis' learning plan into learning phases, then divide
    /// the time left in the timeline between job search and placement.
    pub fn build(analysis: &TransitionAnalysis) -> Self {
        let plan = &analysis.plan;
        let timeline = plan.timeline_weeks as f32;
        let mut phases = Vec::new();

        let split = plan.steps.len().div_ceil(2);
        let (foundation, application) = plan.steps.split_at(split);
        for (focus, steps) in [
            (PhaseFocus::Foundation, foundation),
            (PhaseFocus::Application, application),
        ] {
            if let (Some(first), Some(last)) = (steps.first(), steps.last()) {
                phases.push(RoadmapPhase {
                    focus,
                    start_week: first.start_week,
                    end_week: last.end_week,
                    skills: steps.iter().map(|s| s.skill).collect(),
                });
            }
        }

        let learned = plan.total_weeks.min(timeline);
        let search_end = learned + (timeline - learned) / 2.0;
        phases.push(RoadmapPhase {
            focus: PhaseFocus::JobSearch,
            start_week: learned,
            end_week: search_end,
            skills: Vec::new(),
        });
        phases.push(RoadmapPhase {
            focus: PhaseFocus::Placement,
            start_week: search_end,
            end_week: timeline,
            skills: Vec::new(),
        });

        Self {
            current_role: analysis.current_role.clone(),
            target_role: analysis.target_role.clone(),
            timeline_weeks: plan.timeline_weeks,
            phases,
            deferred: plan.deferred.iter().map(|e| e.skill).collect(),
            on_track: plan.feasible && learned < timeline,
        }
    }
}
