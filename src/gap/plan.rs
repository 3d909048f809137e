//! Learning plans: a gap report scheduled into a weekly time budget.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::GapError;
use crate::ontology::Ontology;
use crate::skill::SkillId;

use super::{GapEntry, GapReport};

/// One scheduled skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub skill: SkillId,
    pub display_name: String,
    pub estimated_hours: f32,
    pub priority_score: f64,
    /// Week offsets (fractional) at which this skill starts and ends.
    pub start_week: f32,
    pub end_week: f32,
    /// Missing prerequisites scheduled before this step.
    pub after: Vec<SkillId>,
}

/// A gap report turned into an ordered, budgeted schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPlan {
    pub target_role: String,
    pub hours_per_week: f32,
    pub timeline_weeks: u32,
    pub steps: Vec<PlanStep>,
    /// Gaps that did not fit the budget, or whose prerequisites did not.
    pub deferred: Vec<GapEntry>,
    pub total_hours: f32,
    pub total_weeks: f32,
    /// Every gap fits into the timeline.
    pub feasible: bool,
}

impl LearningPlan {
    /// Schedule `report` into `hours_per_week × timeline_weeks` hours.
    ///
    /// Missing prerequisites are scheduled before the skills needing them;
    /// otherwise the report's priority order is kept. Prerequisite cycles are
    /// broken in favor of the higher-priority skill. A skill whose missing
    /// prerequisite is deferred is deferred too.
    pub fn build(
        report: &GapReport,
        ontology: &Ontology,
        hours_per_week: f32,
        timeline_weeks: u32,
    ) -> Result<Self, GapError> {
        if hours_per_week.is_nan() || hours_per_week <= 0.0 {
            return Err(GapError::InvalidBudget {
                hours: hours_per_week,
            });
        }
        let budget = hours_per_week * timeline_weeks as f32;

        let order = prerequisite_order(&report.missing, ontology);
        let rank: HashMap<SkillId, usize> = report
            .missing
            .iter()
            .enumerate()
            .map(|(i, e)| (e.skill, i))
            .collect();

        let mut steps = Vec::new();
        let mut deferred = Vec::new();
        let mut deferred_ids: HashSet<SkillId> = HashSet::new();
        let mut used = 0.0f32;

        for idx in order {
            let entry = &report.missing[idx];
            let mut after: Vec<SkillId> = ontology
                .prerequisites_of(entry.skill)
                .into_iter()
                .filter(|p| rank.contains_key(p))
                .collect();
            after.sort_by_key(|p| rank[p]);

            let blocked = after.iter().any(|p| deferred_ids.contains(p));
            if blocked || used + entry.estimated_hours > budget {
                deferred_ids.insert(entry.skill);
                deferred.push(entry.clone());
                continue;
            }
            let start = used;
            used += entry.estimated_hours;
            steps.push(PlanStep {
                skill: entry.skill,
                display_name: entry.display_name.clone(),
                estimated_hours: entry.estimated_hours,
                priority_score: entry.priority_score,
                start_week: start / hours_per_week,
                end_week: used / hours_per_week,
                after,
            });
        }

        Ok(Self {
            target_role: report.target_role.clone(),
            hours_per_week,
            timeline_weeks,
            feasible: deferred.is_empty(),
            steps,
            deferred,
            total_hours: used,
            total_weeks: used / hours_per_week,
        })
    }
}

/// Kahn's algorithm over the prerequisite edges among `missing`. Among ready
/// skills, the one unlocking the highest-priority gap goes first. Returns
/// indices into `missing`.
fn prerequisite_order(missing: &[GapEntry], ontology: &Ontology) -> Vec<usize> {
    let index: HashMap<SkillId, usize> = missing
        .iter()
        .enumerate()
        .map(|(i, e)| (e.skill, i))
        .collect();
    let mut indegree = vec![0usize; missing.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); missing.len()];
    for (i, entry) in missing.iter().enumerate() {
        let prereqs: BTreeSet<usize> = ontology
            .prerequisites_of(entry.skill)
            .into_iter()
            .filter_map(|p| index.get(&p).copied())
            .filter(|&p| p != i)
            .collect();
        indegree[i] = prereqs.len();
        for p in prereqs {
            dependents[p].push(i);
        }
    }

    // A skill inherits the best rank among the skills it unlocks.
    let mut key: Vec<usize> = (0..missing.len()).collect();
    let mut changed = true;
    while changed {
        changed = false;
        for i in 0..missing.len() {
            for &d in &dependents[i] {
                if key[d] < key[i] {
                    key[i] = key[d];
                    changed = true;
                }
            }
        }
    }

    let mut ready: BTreeSet<(usize, usize)> = (0..missing.len())
        .filter(|&i| indegree[i] == 0)
        .map(|i| (key[i], i))
        .collect();
    let mut done = vec![false; missing.len()];
    let mut order = Vec::with_capacity(missing.len());

    while order.len() < missing.len() {
        let next = match ready.pop_first() {
            Some((_, i)) => i,
            // Cycle: release the best-ranked remaining skill.
            None => match (0..missing.len())
                .filter(|&i| !done[i])
                .min_by_key(|&i| (key[i], i))
            {
                Some(i) => i,
                None => break,
            },
        };
        if done[next] {
            continue;
        }
        done[next] = true;
        order.push(next);
        for &d in &dependents[next] {
            indegree[d] = indegree[d].saturating_sub(1);
            if indegree[d] == 0 && !done[d] {
                ready.insert((key[d], d));
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demand::Period;
    use crate::forecast::TrendClass;
    use crate::ontology::EdgeKind;
    use chrono::Utc;

    fn entry(skill: SkillId, priority: f64, hours: f32) -> GapEntry {
        GapEntry {
            skill,
            display_name: skill.to_string(),
            required_weight: priority,
            trend: TrendClass::Stable,
            priority_score: priority,
            estimated_hours: hours,
            roi: priority / hours as f64,
            current_proficiency: None,
        }
    }

    fn report(missing: Vec<GapEntry>) -> GapReport {
        GapReport {
            target_role: "ml engineer".into(),
            as_of: Period(0),
            ontology_version: 0,
            generated_at: Utc::now(),
            total_postings: 10,
            missing,
            coverage: 0.0,
            insufficient_market_data: false,
        }
    }

    #[test]
    fn prerequisites_come_first() {
        let ont = Ontology::default();
        let python = ont.resolve("Python").unwrap();
        let ml = ont.resolve("Machine Learning").unwrap();
        let docker = ont.resolve("Docker").unwrap();
        ont.add_edge(python, ml, EdgeKind::Prerequisite, 0.9).unwrap();

        let r = report(vec![entry(ml, 0.9, 60.0), entry(docker, 0.6, 25.0), entry(python, 0.5, 40.0)]);
        let plan = LearningPlan::build(&r, &ont, 10.0, 52).unwrap();
        let order: Vec<SkillId> = plan.steps.iter().map(|s| s.skill).collect();
        assert_eq!(order, vec![python, ml, docker]);
        assert_eq!(plan.steps[1].after, vec![python]);
        assert!(plan.feasible);
        assert_eq!(plan.total_hours, 125.0);
        assert_eq!(plan.steps[1].start_week, 4.0);
        assert_eq!(plan.steps[1].end_week, 10.0);
    }

    #[test]
    fn over_budget_skills_are_deferred_with_dependents() {
        let ont = Ontology::default();
        let python = ont.resolve("Python").unwrap();
        let ml = ont.resolve("Machine Learning").unwrap();
        let sql = ont.resolve("SQL").unwrap();
        ont.add_edge(python, ml, EdgeKind::Prerequisite, 0.9).unwrap();

        let r = report(vec![entry(python, 0.9, 50.0), entry(sql, 0.8, 20.0), entry(ml, 0.7, 10.0)]);
        let plan = LearningPlan::build(&r, &ont, 10.0, 4).unwrap();
        let scheduled: Vec<SkillId> = plan.steps.iter().map(|s| s.skill).collect();
        assert_eq!(scheduled, vec![sql]);
        let deferred: Vec<SkillId> = plan.deferred.iter().map(|e| e.skill).collect();
        assert_eq!(deferred, vec![python, ml]);
        assert!(!plan.feasible);
    }

    #[test]
    fn cycles_do_not_stall_the_plan() {
        let ont = Ontology::default();
        let a = ont.resolve("Docker").unwrap();
        let b = ont.resolve("Kubernetes").unwrap();
        ont.add_edge(a, b, EdgeKind::Prerequisite, 0.5).unwrap();
        ont.add_edge(b, a, EdgeKind::Prerequisite, 0.5).unwrap();

        let r = report(vec![entry(b, 0.9, 10.0), entry(a, 0.5, 10.0)]);
        let plan = LearningPlan::build(&r, &ont, 5.0, 10).unwrap();
        let order: Vec<SkillId> = plan.steps.iter().map(|s| s.skill).collect();
        assert_eq!(order, vec![b, a]);
    }

    #[test]
    fn zero_budget_is_rejected() {
        let ont = Ontology::default();
        let r = report(Vec::new());
        assert!(matches!(
            LearningPlan::build(&r, &ont, 0.0, 10),
            Err(GapError::InvalidBudget { .. })
        ));
    }
}
