//! Ontology traversal: skill clusters and learning paths.
//!
//! Clusters are BFS neighborhoods split by edge direction and kind. Learning
//! paths are shortest paths over a `petgraph` view of the ontology, with edge
//! cost `2 - weight` so that strong relationships are preferred.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::astar;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::error::OntologyError;
use crate::skill::SkillId;

use super::{EdgeKind, Ontology, OntologyResult};

/// Skills grouped around a center skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillCluster {
    pub center: SkillId,
    /// Transitive prerequisites, nearest first.
    pub prerequisites: Vec<SkillId>,
    /// Skills this one is a prerequisite for, nearest first.
    pub next_steps: Vec<SkillId>,
    /// Direct `related`/`implies` neighbors in either direction.
    pub related: Vec<SkillId>,
}

/// Collect the neighborhood of `id` up to `depth` hops.
pub fn cluster(ontology: &Ontology, id: SkillId, depth: usize) -> OntologyResult<SkillCluster> {
    let center = ontology
        .canonical(id)
        .ok_or(OntologyError::UnknownSkill { skill_id: id.get() })?;

    let prerequisites = bfs(center, depth, |n| ontology.prerequisites_of(n));
    let next_steps = bfs(center, depth, |n| {
        ontology
            .edges_from(n, &[EdgeKind::Prerequisite])
            .into_iter()
            .map(|e| e.to)
            .collect()
    });

    let related = ontology.neighbors(center, &[EdgeKind::Related, EdgeKind::Implies]);

    Ok(SkillCluster {
        center,
        prerequisites,
        next_steps,
        related,
    })
}

fn bfs(start: SkillId, depth: usize, step: impl Fn(SkillId) -> Vec<SkillId>) -> Vec<SkillId> {
    let mut visited: HashSet<SkillId> = HashSet::from([start]);
    let mut order = Vec::new();
    let mut queue: VecDeque<(SkillId, usize)> = VecDeque::from([(start, 0)]);

    while let Some((node, d)) = queue.pop_front() {
        if d >= depth {
            continue;
        }
        let mut next = step(node);
        next.sort();
        for n in next {
            if visited.insert(n) {
                order.push(n);
                queue.push_back((n, d + 1));
            }
        }
    }
    order
}

/// A route from the skills a user knows to a target skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPath {
    pub target: SkillId,
    /// Ordered steps ending at the target. When `connected`, the first step is
    /// a known skill.
    pub steps: Vec<SkillId>,
    /// Steps the user does not know yet.
    pub to_learn: Vec<SkillId>,
    /// Sum of edge costs along the path.
    pub cost: f32,
    /// False when no known skill reaches the target; `steps` then lists the
    /// target's prerequisite chain instead.
    pub connected: bool,
}

/// Find the cheapest path from any known skill to `target`.
///
/// Prerequisite edges are followed forward only; `related` and `implies`
/// edges in both directions.
pub fn learning_path(
    ontology: &Ontology,
    known: &[SkillId],
    target: SkillId,
) -> OntologyResult<LearningPath> {
    let target = ontology.canonical(target).ok_or(OntologyError::UnknownSkill {
        skill_id: target.get(),
    })?;
    let known: HashSet<SkillId> = known.iter().filter_map(|k| ontology.canonical(*k)).collect();

    if known.contains(&target) {
        return Ok(LearningPath {
            target,
            steps: vec![target],
            to_learn: Vec::new(),
            cost: 0.0,
            connected: true,
        });
    }

    // Node weight `None` is the virtual source wired to every known skill.
    let mut graph: DiGraph<Option<SkillId>, f32> = DiGraph::new();
    let mut index: HashMap<SkillId, NodeIndex> = HashMap::new();
    for node in ontology.nodes() {
        index.insert(node.id, graph.add_node(Some(node.id)));
    }
    for edge in ontology.edges() {
        let (Some(&from), Some(&to)) = (index.get(&edge.from), index.get(&edge.to)) else {
            continue;
        };
        let cost = 2.0 - edge.weight;
        graph.add_edge(from, to, cost);
        if edge.kind != EdgeKind::Prerequisite {
            graph.add_edge(to, from, cost);
        }
    }
    let source = graph.add_node(None);
    let mut known_sorted: Vec<SkillId> = known.iter().copied().collect();
    known_sorted.sort();
    for k in &known_sorted {
        if let Some(&idx) = index.get(k) {
            graph.add_edge(source, idx, 0.0);
        }
    }

    let goal = index[&target];
    let found = astar(&graph, source, |n| n == goal, |e| *e.weight(), |_| 0.0);

    if let Some((cost, path)) = found {
        let steps: Vec<SkillId> = path.iter().filter_map(|n| graph[*n]).collect();
        let to_learn = steps.iter().copied().filter(|s| !known.contains(s)).collect();
        return Ok(LearningPath {
            target,
            steps,
            to_learn,
            cost,
            connected: true,
        });
    }

    let mut chain = bfs(target, usize::MAX, |n| ontology.prerequisites_of(n));
    chain.reverse();
    chain.push(target);
    let to_learn = chain.iter().copied().filter(|s| !known.contains(s)).collect();
    Ok(LearningPath {
        target,
        steps: chain,
        to_learn,
        cost: 0.0,
        connected: false,
    })
}
