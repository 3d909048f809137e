//! Skill ontology: canonical skill nodes, aliases, merge redirects and typed edges.
//!
//! The [`Ontology`] resolves raw terms to canonical [`SkillId`]s. Exact alias
//! hits are served lock-free from a `DashMap` index. Every structural mutation
//! (node creation, fuzzy alias attachment, merge, edge insertion) runs behind
//! a single graph-scoped writer lock with a double-check after acquisition, so
//! two workers resolving the same unseen term always agree on one node.
//!
//! Alias sets are disjoint across nodes: the alias index maps each normalized
//! alias to exactly one surviving id.

pub mod alias;
pub mod traverse;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::OntologyConfig;
use crate::error::OntologyError;
use crate::skill::{AtomicSkillAllocator, SkillCategory, SkillId};

pub use alias::normalize_term;
use alias::{FuzzyHit, better, fuzzy_score};

/// Result type for ontology operations.
pub type OntologyResult<T> = std::result::Result<T, OntologyError>;

/// Relationship between two skills. Edges are directed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Knowing `from` implies familiarity with `to`.
    Implies,
    /// Commonly co-required with `to`.
    Related,
    /// `from` should be learned before `to`.
    Prerequisite,
}

impl EdgeKind {
    pub const ALL: [EdgeKind; 3] = [Self::Implies, Self::Related, Self::Prerequisite];

    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "implies" => Some(Self::Implies),
            "related" | "co-requisite" | "corequisite" => Some(Self::Related),
            "prerequisite" | "prereq" => Some(Self::Prerequisite),
            _ => None,
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Implies => write!(f, "implies"),
            Self::Related => write!(f, "related"),
            Self::Prerequisite => write!(f, "prerequisite"),
        }
    }
}

/// A canonical skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillNode {
    pub id: SkillId,
    pub display_name: String,
    /// Normalized alias keys, display name included.
    pub aliases: BTreeSet<String>,
    pub category: SkillCategory,
}

/// A weighted, directed edge between two canonical skills.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkillEdge {
    pub from: SkillId,
    pub to: SkillId,
    pub kind: EdgeKind,
    pub weight: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct EdgeKey {
    from: SkillId,
    to: SkillId,
    kind: EdgeKind,
}

/// How a raw term was resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchKind {
    Exact,
    Fuzzy { score: f64 },
    Created,
}

/// Outcome of [`Ontology::resolve_term`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub id: SkillId,
    pub kind: MatchKind,
}

/// Outcome of [`Ontology::merge`].
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub survivor: SkillId,
    pub absorbed: SkillId,
    pub aliases_moved: usize,
    pub edges_reassigned: usize,
    pub version: u64,
}

/// Serializable image of an ontology, used for persistence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OntologySnapshot {
    pub version: u64,
    pub next_id: u64,
    pub nodes: Vec<SkillNode>,
    /// `(absorbed, survivor)` pairs.
    pub redirects: Vec<(SkillId, SkillId)>,
    pub edges: Vec<SkillEdge>,
}

/// The versioned skill graph.
pub struct Ontology {
    config: OntologyConfig,
    allocator: AtomicSkillAllocator,
    nodes: DashMap<SkillId, SkillNode>,
    /// Normalized alias → owning id.
    alias_index: DashMap<String, SkillId>,
    /// Absorbed id → surviving id. Always one hop.
    redirects: DashMap<SkillId, SkillId>,
    /// Surviving id → every id merged into it.
    absorbed: DashMap<SkillId, Vec<SkillId>>,
    edges: DashMap<EdgeKey, f32>,
    version: AtomicU64,
    writer: Mutex<()>,
}

impl Ontology {
    /// Create an empty ontology.
    pub fn new(config: OntologyConfig) -> Self {
        Self {
            config,
            allocator: AtomicSkillAllocator::new(),
            nodes: DashMap::new(),
            alias_index: DashMap::new(),
            redirects: DashMap::new(),
            absorbed: DashMap::new(),
            edges: DashMap::new(),
            version: AtomicU64::new(0),
            writer: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &OntologyConfig {
        &self.config
    }

    /// Current ontology version. Increases on every structural mutation.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    fn bump(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    /// Resolve a raw term to its canonical id, creating a node if nothing matches.
    pub fn resolve(&self, raw_term: &str) -> OntologyResult<SkillId> {
        self.resolve_term(raw_term).map(|r| r.id)
    }

    /// Resolve a raw term: exact alias, then fuzzy alias, then a new node.
    ///
    /// A fuzzy hit attaches the term as a new alias of the matched node, so
    /// the next occurrence resolves exactly.
    pub fn resolve_term(&self, raw_term: &str) -> OntologyResult<Resolution> {
        let key = normalize_term(raw_term);
        if key.is_empty() {
            return Err(OntologyError::BlankTerm);
        }
        if let Some(id) = self.exact(&key) {
            return Ok(Resolution {
                id,
                kind: MatchKind::Exact,
            });
        }

        let _guard = self.writer.lock().expect("ontology writer lock poisoned");
        // Double-check: another writer may have created it meanwhile.
        if let Some(id) = self.exact(&key) {
            return Ok(Resolution {
                id,
                kind: MatchKind::Exact,
            });
        }

        if let Some(hit) = self.best_fuzzy(&key) {
            self.attach_alias(hit.id, &key);
            self.bump();
            tracing::debug!(
                term = raw_term,
                matched = %hit.alias,
                skill = %hit.id,
                score = hit.score,
                "fuzzy alias match"
            );
            return Ok(Resolution {
                id: hit.id,
                kind: MatchKind::Fuzzy { score: hit.score },
            });
        }

        let display = raw_term.split_whitespace().collect::<Vec<_>>().join(" ");
        let id = self.create_node(&display, key, SkillCategory::Uncategorized)?;
        tracing::debug!(term = raw_term, skill = %id, "created skill node");
        Ok(Resolution {
            id,
            kind: MatchKind::Created,
        })
    }

    /// Read-only resolution: exact then fuzzy. Never creates nodes.
    pub fn lookup(&self, raw_term: &str) -> Option<SkillId> {
        let key = normalize_term(raw_term);
        if key.is_empty() {
            return None;
        }
        self.exact(&key)
            .or_else(|| self.best_fuzzy(&key).map(|hit| hit.id))
    }

    fn exact(&self, key: &str) -> Option<SkillId> {
        let id = *self.alias_index.get(key)?.value();
        self.canonical(id)
    }

    fn best_fuzzy(&self, key: &str) -> Option<FuzzyHit<SkillId>> {
        let query_len = key.chars().count();
        let mut best = None;
        for entry in self.alias_index.iter() {
            let Some(score) = fuzzy_score(
                key,
                entry.key(),
                self.config.fuzzy_min_length_ratio,
                self.config.fuzzy_max_edits,
            ) else {
                continue;
            };
            if score < self.config.fuzzy_threshold {
                continue;
            }
            best = better(
                query_len,
                best,
                FuzzyHit {
                    alias: entry.key().clone(),
                    id: *entry.value(),
                    score,
                },
            );
        }
        let hit = best?;
        Some(FuzzyHit {
            id: self.canonical(hit.id)?,
            ..hit
        })
    }

    /// Caller holds the writer lock.
    fn attach_alias(&self, id: SkillId, key: &str) {
        self.alias_index.insert(key.to_string(), id);
        if let Some(mut node) = self.nodes.get_mut(&id) {
            node.aliases.insert(key.to_string());
        }
    }

    /// Caller holds the writer lock.
    fn create_node(
        &self,
        display_name: &str,
        key: String,
        category: SkillCategory,
    ) -> OntologyResult<SkillId> {
        let id = self.allocator.next_id()?;
        let node = SkillNode {
            id,
            display_name: display_name.to_string(),
            aliases: BTreeSet::from([key.clone()]),
            category,
        };
        self.nodes.insert(id, node);
        self.alias_index.insert(key, id);
        self.bump();
        Ok(id)
    }

    /// Create or extend a curated skill. Idempotent.
    ///
    /// Reuses the node that already owns the display name. Aliases owned by a
    /// different node are skipped to keep alias sets disjoint.
    pub fn ensure_skill<S: AsRef<str>>(
        &self,
        display_name: &str,
        category: SkillCategory,
        aliases: &[S],
    ) -> OntologyResult<SkillId> {
        let display_key = normalize_term(display_name);
        if display_key.is_empty() {
            return Err(OntologyError::BlankTerm);
        }
        let keys: Vec<String> = std::iter::once(display_key.clone())
            .chain(aliases.iter().map(|a| normalize_term(a.as_ref())))
            .filter(|k| !k.is_empty())
            .collect();

        let _guard = self.writer.lock().expect("ontology writer lock poisoned");
        let id = match self.exact(&display_key) {
            Some(id) => id,
            None => self.create_node(display_name.trim(), display_key, category)?,
        };

        let mut changed = false;
        for key in &keys {
            let owner = self.alias_index.get(key).map(|r| *r.value());
            match owner {
                None => {
                    self.attach_alias(id, key);
                    changed = true;
                }
                Some(owner) if self.canonical(owner) == Some(id) => {}
                Some(owner) => {
                    tracing::warn!(alias = %key, owner = %owner, skill = %id, "alias already owned, skipped");
                }
            }
        }
        if category != SkillCategory::Uncategorized {
            if let Some(mut node) = self.nodes.get_mut(&id) {
                if node.category == SkillCategory::Uncategorized {
                    node.category = category;
                    changed = true;
                }
            }
        }
        if changed {
            self.bump();
        }
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Canonical ids
    // -----------------------------------------------------------------------

    /// Map any id ever allocated (including merged ones) to its surviving id.
    pub fn canonical(&self, id: SkillId) -> Option<SkillId> {
        if self.nodes.contains_key(&id) {
            return Some(id);
        }
        let target = *self.redirects.get(&id)?.value();
        self.nodes.contains_key(&target).then_some(target)
    }

    /// The surviving id followed by every id merged into it, ascending.
    pub fn merged_ids(&self, id: SkillId) -> Vec<SkillId> {
        let Some(survivor) = self.canonical(id) else {
            return Vec::new();
        };
        let mut ids = vec![survivor];
        if let Some(absorbed) = self.absorbed.get(&survivor) {
            ids.extend(absorbed.iter().copied());
        }
        ids.sort();
        ids.dedup();
        ids
    }

    // -----------------------------------------------------------------------
    // Merge and edges
    // -----------------------------------------------------------------------

    /// Merge `b` into `a`. `a` survives; `b` becomes a permanent redirect.
    ///
    /// Aliases and edges move to the survivor. Edges that collapse onto an
    /// existing edge are combined through the moving average; edges that
    /// would become self-loops are dropped.
    pub fn merge(&self, a: SkillId, b: SkillId) -> OntologyResult<MergeOutcome> {
        let _guard = self.writer.lock().expect("ontology writer lock poisoned");
        let survivor = self
            .canonical(a)
            .ok_or(OntologyError::UnknownSkill { skill_id: a.get() })?;
        let absorbed = self
            .canonical(b)
            .ok_or(OntologyError::UnknownSkill { skill_id: b.get() })?;
        if survivor == absorbed {
            return Err(OntologyError::SelfMerge {
                skill_id: survivor.get(),
            });
        }
        let gone = self
            .nodes
            .get(&absorbed)
            .map(|n| n.clone())
            .ok_or(OntologyError::UnknownSkill {
                skill_id: absorbed.get(),
            })?;

        // Redirects first so `canonical(b)` never observes a gap.
        let mut chain = self
            .absorbed
            .remove(&absorbed)
            .map(|(_, ids)| ids)
            .unwrap_or_default();
        for old in &chain {
            self.redirects.insert(*old, survivor);
        }
        self.redirects.insert(absorbed, survivor);
        chain.push(absorbed);
        self.absorbed.entry(survivor).or_default().extend(chain);

        for alias in &gone.aliases {
            self.alias_index.insert(alias.clone(), survivor);
        }
        if let Some(mut node) = self.nodes.get_mut(&survivor) {
            node.aliases.extend(gone.aliases.iter().cloned());
            if node.category == SkillCategory::Uncategorized {
                node.category = gone.category;
            }
        }
        self.nodes.remove(&absorbed);

        let touching: Vec<(EdgeKey, f32)> = self
            .edges
            .iter()
            .filter(|e| e.key().from == absorbed || e.key().to == absorbed)
            .map(|e| (*e.key(), *e.value()))
            .collect();
        let mut edges_reassigned = 0;
        for (key, weight) in touching {
            self.edges.remove(&key);
            let swap = |id: SkillId| if id == absorbed { survivor } else { id };
            let moved = EdgeKey {
                from: swap(key.from),
                to: swap(key.to),
                kind: key.kind,
            };
            if moved.from == moved.to {
                continue;
            }
            self.upsert_edge(moved, weight);
            edges_reassigned += 1;
        }

        let version = self.bump();
        tracing::debug!(
            survivor = %survivor,
            absorbed = %absorbed,
            aliases = gone.aliases.len(),
            edges = edges_reassigned,
            version,
            "merged skills"
        );
        Ok(MergeOutcome {
            survivor,
            absorbed,
            aliases_moved: gone.aliases.len(),
            edges_reassigned,
            version,
        })
    }

    /// Add a directed edge, or reinforce an identical one.
    ///
    /// Re-adding `(from, to, kind)` updates the weight to
    /// `retention * old + (1 - retention) * incoming` instead of duplicating.
    pub fn add_edge(
        &self,
        from: SkillId,
        to: SkillId,
        kind: EdgeKind,
        weight: f32,
    ) -> OntologyResult<SkillEdge> {
        if !(0.0..=1.0).contains(&weight) {
            return Err(OntologyError::InvalidWeight { weight });
        }
        let _guard = self.writer.lock().expect("ontology writer lock poisoned");
        let from = self
            .canonical(from)
            .ok_or(OntologyError::UnknownSkill { skill_id: from.get() })?;
        let to = self
            .canonical(to)
            .ok_or(OntologyError::UnknownSkill { skill_id: to.get() })?;
        if from == to {
            return Err(OntologyError::SelfLoop {
                skill_id: from.get(),
            });
        }
        let (weight, created) = self.upsert_edge(EdgeKey { from, to, kind }, weight);
        if created {
            self.bump();
        }
        Ok(SkillEdge {
            from,
            to,
            kind,
            weight,
        })
    }

    /// Caller holds the writer lock. Returns the stored weight and whether
    /// the edge is new.
    fn upsert_edge(&self, key: EdgeKey, incoming: f32) -> (f32, bool) {
        let retention = self.config.edge_retention;
        let mut created = false;
        let weight = *self
            .edges
            .entry(key)
            .and_modify(|w| *w = retention * *w + (1.0 - retention) * incoming)
            .or_insert_with(|| {
                created = true;
                incoming
            });
        (weight, created)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Node for any id, following a merge redirect.
    pub fn node(&self, id: SkillId) -> Option<SkillNode> {
        let id = self.canonical(id)?;
        self.nodes.get(&id).map(|n| n.clone())
    }

    /// Display name, falling back to the id itself.
    pub fn display_name(&self, id: SkillId) -> String {
        self.node(id)
            .map(|n| n.display_name)
            .unwrap_or_else(|| id.to_string())
    }

    /// All canonical nodes, ordered by id.
    pub fn nodes(&self) -> Vec<SkillNode> {
        let mut nodes: Vec<SkillNode> = self.nodes.iter().map(|n| n.value().clone()).collect();
        nodes.sort_by_key(|n| n.id);
        nodes
    }

    /// All edges, ordered by `(from, to, kind)`.
    pub fn edges(&self) -> Vec<SkillEdge> {
        let mut edges: Vec<(EdgeKey, f32)> =
            self.edges.iter().map(|e| (*e.key(), *e.value())).collect();
        edges.sort_by_key(|(k, _)| *k);
        edges
            .into_iter()
            .map(|(k, weight)| SkillEdge {
                from: k.from,
                to: k.to,
                kind: k.kind,
                weight,
            })
            .collect()
    }

    /// Outgoing edges of `id` restricted to `kinds`.
    pub fn edges_from(&self, id: SkillId, kinds: &[EdgeKind]) -> Vec<SkillEdge> {
        let Some(id) = self.canonical(id) else {
            return Vec::new();
        };
        self.edges()
            .into_iter()
            .filter(|e| e.from == id && kinds.contains(&e.kind))
            .collect()
    }

    /// Incoming edges of `id` restricted to `kinds`.
    pub fn edges_to(&self, id: SkillId, kinds: &[EdgeKind]) -> Vec<SkillEdge> {
        let Some(id) = self.canonical(id) else {
            return Vec::new();
        };
        self.edges()
            .into_iter()
            .filter(|e| e.to == id && kinds.contains(&e.kind))
            .collect()
    }

    /// Distinct skills adjacent to `id` over `kinds`, in either direction.
    pub fn neighbors(&self, id: SkillId, kinds: &[EdgeKind]) -> Vec<SkillId> {
        let Some(id) = self.canonical(id) else {
            return Vec::new();
        };
        let adjacent: BTreeSet<SkillId> = self
            .edges()
            .into_iter()
            .filter(|e| kinds.contains(&e.kind))
            .filter_map(|e| match (e.from == id, e.to == id) {
                (true, false) => Some(e.to),
                (false, true) => Some(e.from),
                _ => None,
            })
            .collect();
        adjacent.into_iter().collect()
    }

    /// Direct prerequisites of a skill.
    pub fn prerequisites_of(&self, id: SkillId) -> Vec<SkillId> {
        self.edges_to(id, &[EdgeKind::Prerequisite])
            .into_iter()
            .map(|e| e.from)
            .collect()
    }

    /// Every alias with its owning canonical id, ordered by alias.
    pub fn aliases(&self) -> Vec<(String, SkillId)> {
        let mut aliases: BTreeMap<String, SkillId> = BTreeMap::new();
        for entry in self.alias_index.iter() {
            if let Some(id) = self.canonical(*entry.value()) {
                aliases.insert(entry.key().clone(), id);
            }
        }
        aliases.into_iter().collect()
    }

    /// Number of canonical nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Consistent image of the whole ontology.
    pub fn snapshot(&self) -> OntologySnapshot {
        let _guard = self.writer.lock().expect("ontology writer lock poisoned");
        let mut redirects: Vec<(SkillId, SkillId)> =
            self.redirects.iter().map(|r| (*r.key(), *r.value())).collect();
        redirects.sort();
        OntologySnapshot {
            version: self.version(),
            next_id: self.allocator.peek_next(),
            nodes: self.nodes(),
            redirects,
            edges: self.edges(),
        }
    }

    /// Rebuild an ontology from a snapshot.
    pub fn from_snapshot(config: OntologyConfig, snapshot: OntologySnapshot) -> Self {
        let ontology = Self {
            allocator: AtomicSkillAllocator::starting_from(snapshot.next_id),
            version: AtomicU64::new(snapshot.version),
            ..Self::new(config)
        };
        for node in snapshot.nodes {
            for alias in &node.aliases {
                ontology.alias_index.insert(alias.clone(), node.id);
            }
            ontology.nodes.insert(node.id, node);
        }
        for (absorbed, survivor) in snapshot.redirects {
            ontology.redirects.insert(absorbed, survivor);
            ontology.absorbed.entry(survivor).or_default().push(absorbed);
        }
        for edge in snapshot.edges {
            ontology.edges.insert(
                EdgeKey {
                    from: edge.from,
                    to: edge.to,
                    kind: edge.kind,
                },
                edge.weight,
            );
        }
        ontology
    }
}

impl Default for Ontology {
    fn default() -> Self {
        Self::new(OntologyConfig::default())
    }
}

impl std::fmt::Debug for Ontology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ontology")
            .field("nodes", &self.len())
            .field("edges", &self.edge_count())
            .field("version", &self.version())
            .finish()
    }
}
