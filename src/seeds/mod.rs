//! Seed packs: curated skill ontologies.
//!
//! A seed pack is a TOML bundle of canonical skills (category, aliases,
//! estimated learning hours) and typed relations between them. One pack,
//! `tech`, is bundled into the binary; more can be discovered on disk.
//! Applying a pack is idempotent.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

use crate::gap::SeededDifficultyTable;
use crate::ontology::{EdgeKind, Ontology, normalize_term};
use crate::skill::{SkillCategory, SkillId};

// ── Errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Error, Diagnostic)]
pub enum SeedError {
    #[error("seed pack not found: \"{id}\"")]
    #[diagnostic(
        code(compass::seed::not_found),
        help("List available packs with `compass seeds list`. External packs live in <data-dir>/seeds/<id>/seed.toml")
    )]
    NotFound { id: String },

    #[error("failed to parse seed pack \"{id}\": {message}")]
    #[diagnostic(
        code(compass::seed::parse),
        help("Check the seed.toml syntax: a [seed] table, [[skills]] and [[relations]] arrays.")
    )]
    Parse { id: String, message: String },

    #[error("failed to read seed file: {path}")]
    #[diagnostic(code(compass::seed::io), help("Ensure the file exists and is readable."))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid seed pack \"{id}\": {message}")]
    #[diagnostic(
        code(compass::seed::invalid),
        help("Relations may only reference skills declared in the same pack, with weights in [0.0, 1.0].")
    )]
    Invalid { id: String, message: String },

    #[error("failed to apply seed \"{id}\": {message}")]
    #[diagnostic(
        code(compass::seed::apply),
        help("The ontology rejected a seeded skill or relation; see the message for the offending entry.")
    )]
    Apply { id: String, message: String },
}

pub type SeedResult<T> = std::result::Result<T, SeedError>;

// ── Seed pack data model ────────────────────────────────────────────────

/// A curated ontology bundle.
#[derive(Debug, Clone)]
pub struct SeedPack {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub skills: Vec<SeedSkill>,
    pub relations: Vec<SeedRelation>,
    pub source: SeedSource,
}

/// Where a seed pack came from.
#[derive(Debug, Clone, PartialEq)]
pub enum SeedSource {
    /// Bundled into the binary via `include_str!`.
    Bundled,
    /// Loaded from an external directory.
    External(PathBuf),
}

/// A canonical skill in a seed pack.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedSkill {
    pub name: String,
    #[serde(default)]
    pub category: SkillCategory,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Estimated learning hours.
    #[serde(default)]
    pub hours: Option<f32>,
}

/// A typed relation between two skills of the same pack.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedRelation {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
    #[serde(default = "default_weight")]
    pub weight: f32,
}

fn default_weight() -> f32 {
    0.7
}

/// Report after applying a seed pack.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedReport {
    pub id: String,
    pub skills: usize,
    pub relations_added: usize,
    pub relations_present: usize,
    /// The ontology did not change.
    pub already_applied: bool,
    pub ontology_version: u64,
}

// ── TOML deserialization helpers ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SeedToml {
    seed: SeedMeta,
    #[serde(default)]
    skills: Vec<SeedSkill>,
    #[serde(default)]
    relations: Vec<SeedRelation>,
}

#[derive(Debug, Deserialize)]
struct SeedMeta {
    id: String,
    name: String,
    version: String,
    #[serde(default)]
    description: String,
}

// ── Bundled seed packs ──────────────────────────────────────────────────

const TECH_TOML: &str = include_str!("../../data/seeds/tech/seed.toml");

/// Id of the bundled default pack.
pub const DEFAULT_PACK: &str = "tech";

impl SeedPack {
    /// Parse and validate a seed pack from TOML.
    pub fn parse(toml_str: &str, source: SeedSource) -> SeedResult<Self> {
        let parsed: SeedToml = toml::from_str(toml_str).map_err(|e| SeedError::Parse {
            id: "(unknown)".into(),
            message: e.to_string(),
        })?;
        let pack = Self {
            id: parsed.seed.id,
            name: parsed.seed.name,
            version: parsed.seed.version,
            description: parsed.seed.description,
            skills: parsed.skills,
            relations: parsed.relations,
            source,
        };
        pack.validate()?;
        Ok(pack)
    }

    /// The bundled `tech` pack.
    pub fn bundled_default() -> SeedResult<Self> {
        Self::parse(TECH_TOML, SeedSource::Bundled)
    }

    fn validate(&self) -> SeedResult<()> {
        let invalid = |message: String| SeedError::Invalid {
            id: self.id.clone(),
            message,
        };
        let declared: HashMap<String, usize> = self
            .skills
            .iter()
            .enumerate()
            .map(|(i, s)| (normalize_term(&s.name), i))
            .collect();
        if declared.len() != self.skills.len() {
            return Err(invalid("skill names must be unique".into()));
        }
        for skill in &self.skills {
            if let Some(hours) = skill.hours {
                if hours.is_nan() || hours <= 0.0 {
                    return Err(invalid(format!("`{}` has non-positive hours", skill.name)));
                }
            }
        }
        for rel in &self.relations {
            for end in [&rel.from, &rel.to] {
                if !declared.contains_key(&normalize_term(end)) {
                    return Err(invalid(format!("relation references undeclared skill `{end}`")));
                }
            }
            if !(0.0..=1.0).contains(&rel.weight) {
                return Err(invalid(format!(
                    "relation {} -> {} has weight {} outside [0.0, 1.0]",
                    rel.from, rel.to, rel.weight
                )));
            }
        }
        Ok(())
    }

    /// Create this pack's skills, aliases and relations in `ontology`.
    ///
    /// Existing skills are extended rather than duplicated, and relations
    /// already present are left untouched, so re-applying changes nothing.
    pub fn apply(&self, ontology: &Ontology) -> SeedResult<SeedReport> {
        let before = ontology.version();
        let apply_err = |message: String| SeedError::Apply {
            id: self.id.clone(),
            message,
        };

        let mut ids: BTreeMap<String, SkillId> = BTreeMap::new();
        for skill in &self.skills {
            let id = ontology
                .ensure_skill(&skill.name, skill.category, &skill.aliases)
                .map_err(|e| apply_err(format!("skill `{}`: {e}", skill.name)))?;
            ids.insert(normalize_term(&skill.name), id);
        }

        let mut relations_added = 0;
        let mut relations_present = 0;
        for rel in &self.relations {
            let id_of = |name: &str| {
                ids.get(&normalize_term(name))
                    .copied()
                    .ok_or_else(|| apply_err(format!("undeclared skill `{name}`")))
            };
            let (from, to) = (id_of(&rel.from)?, id_of(&rel.to)?);
            // Merged endpoints collapse the relation into a self-loop.
            let collapsed = ontology.canonical(from) == ontology.canonical(to);
            let exists = ontology
                .edges_from(from, &[rel.kind])
                .iter()
                .any(|e| Some(e.to) == ontology.canonical(to));
            if collapsed || exists {
                relations_present += 1;
                continue;
            }
            ontology
                .add_edge(from, to, rel.kind, rel.weight)
                .map_err(|e| apply_err(format!("relation {} -> {}: {e}", rel.from, rel.to)))?;
            relations_added += 1;
        }

        let version = ontology.version();
        tracing::info!(
            seed = %self.id,
            skills = self.skills.len(),
            relations_added,
            version,
            "applied seed pack"
        );
        Ok(SeedReport {
            id: self.id.clone(),
            skills: self.skills.len(),
            relations_added,
            relations_present,
            already_applied: version == before,
            ontology_version: version,
        })
    }

    /// Difficulty table with this pack's hours, keyed by every skill name and alias.
    pub fn difficulty_table(&self, default_hours: f32) -> SeededDifficultyTable {
        let mut table = SeededDifficultyTable::new(default_hours);
        for skill in &self.skills {
            if let Some(hours) = skill.hours {
                table.set_hours(&skill.name, hours);
                for alias in &skill.aliases {
                    table.set_hours(alias, hours);
                }
            }
        }
        table
    }
}

// ── Seed Registry ───────────────────────────────────────────────────────

/// Registry of available seed packs (bundled + discovered from disk).
pub struct SeedRegistry {
    packs: HashMap<String, SeedPack>,
}

impl SeedRegistry {
    /// Create a registry with only bundled packs.
    pub fn bundled() -> Self {
        let mut packs = HashMap::new();
        match SeedPack::bundled_default() {
            Ok(pack) => {
                packs.insert(pack.id.clone(), pack);
            }
            Err(e) => tracing::warn!(seed = DEFAULT_PACK, "failed to parse bundled seed: {e}"),
        }
        Self { packs }
    }

    /// Discover seed packs from a directory (in addition to bundled packs).
    ///
    /// Each subdirectory containing a `seed.toml` is loaded as a pack. A
    /// discovered pack replaces a bundled one with the same id.
    pub fn discover(seeds_dir: &Path) -> Self {
        let mut registry = Self::bundled();
        let Ok(entries) = std::fs::read_dir(seeds_dir) else {
            return registry;
        };
        for entry in entries.flatten() {
            let seed_file = entry.path().join("seed.toml");
            if !seed_file.is_file() {
                continue;
            }
            match load_pack(&seed_file, entry.path()) {
                Ok(pack) => {
                    registry.packs.insert(pack.id.clone(), pack);
                }
                Err(e) => {
                    tracing::warn!(path = %seed_file.display(), "skipping seed pack: {e}");
                }
            }
        }
        registry
    }

    /// List all available seed packs.
    pub fn list(&self) -> Vec<&SeedPack> {
        let mut packs: Vec<&SeedPack> = self.packs.values().collect();
        packs.sort_by(|a, b| a.id.cmp(&b.id));
        packs
    }

    /// Get a seed pack by ID.
    pub fn get(&self, id: &str) -> SeedResult<&SeedPack> {
        self.packs
            .get(id)
            .ok_or_else(|| SeedError::NotFound { id: id.to_string() })
    }
}

fn load_pack(seed_file: &Path, dir: PathBuf) -> SeedResult<SeedPack> {
    let content = std::fs::read_to_string(seed_file).map_err(|e| SeedError::Io {
        path: seed_file.display().to_string(),
        source: e,
    })?;
    SeedPack::parse(&content, SeedSource::External(dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gap::DifficultyTable;

    #[test]
    fn bundled_pack_parses() {
        let pack = SeedPack::bundled_default().unwrap();
        assert_eq!(pack.id, DEFAULT_PACK);
        assert_eq!(pack.source, SeedSource::Bundled);
        assert!(pack.skills.len() > 40);
        assert!(pack.relations.iter().any(|r| r.kind == EdgeKind::Prerequisite));
    }

    #[test]
    fn apply_is_idempotent() {
        let ont = Ontology::default();
        let pack = SeedPack::bundled_default().unwrap();

        let first = pack.apply(&ont).unwrap();
        assert!(!first.already_applied);
        assert_eq!(first.relations_added, pack.relations.len());
        let edges = ont.edge_count();
        let nodes = ont.len();

        let second = pack.apply(&ont).unwrap();
        assert!(second.already_applied);
        assert_eq!(second.relations_added, 0);
        assert_eq!(second.relations_present, pack.relations.len());
        assert_eq!(ont.edge_count(), edges);
        assert_eq!(ont.len(), nodes);
    }

    #[test]
    fn seeded_aliases_resolve_to_one_node() {
        let ont = Ontology::default();
        SeedPack::bundled_default().unwrap().apply(&ont).unwrap();

        let k8s = ont.lookup("k8s").unwrap();
        assert_eq!(ont.lookup("Kubernetes"), Some(k8s));
        assert_eq!(ont.lookup("pyspark"), ont.lookup("Spark"));
        assert_eq!(ont.node(k8s).unwrap().category, SkillCategory::CloudDevops);

        let python = ont.lookup("python").unwrap();
        let ml = ont.lookup("machine learning").unwrap();
        assert!(ont.prerequisites_of(ml).contains(&python));
    }

    #[test]
    fn difficulty_table_uses_seeded_hours() {
        let ont = Ontology::default();
        let pack = SeedPack::bundled_default().unwrap();
        pack.apply(&ont).unwrap();
        let table = pack.difficulty_table(30.0);

        let dl = ont.node(ont.lookup("deep learning").unwrap()).unwrap();
        assert_eq!(table.estimated_hours(&dl), 80.0);
        let docker = ont.node(ont.lookup("docker").unwrap()).unwrap();
        assert_eq!(table.estimated_hours(&docker), 25.0);
    }

    #[test]
    fn undeclared_relation_is_rejected() {
        let toml = r#"
[seed]
id = "broken"
name = "Broken"
version = "1"

[[skills]]
name = "Python"

[[relations]]
from = "Python"
to = "Cobol"
kind = "prerequisite"
"#;
        assert!(matches!(
            SeedPack::parse(toml, SeedSource::Bundled),
            Err(SeedError::Invalid { .. })
        ));
    }

    #[test]
    fn discover_loads_external_packs() {
        let dir = tempfile::TempDir::new().unwrap();
        let pack_dir = dir.path().join("custom");
        std::fs::create_dir_all(&pack_dir).unwrap();
        std::fs::write(
            pack_dir.join("seed.toml"),
            "[seed]\nid = \"custom\"\nname = \"Custom\"\nversion = \"1\"\n\n[[skills]]\nname = \"Zig\"\ncategory = \"programming\"\nhours = 45\n",
        )
        .unwrap();

        let registry = SeedRegistry::discover(dir.path());
        assert!(registry.get("custom").is_ok());
        assert!(registry.get(DEFAULT_PACK).is_ok());
        assert!(matches!(registry.get("nope"), Err(SeedError::NotFound { .. })));
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn missing_pack_help_names_the_list_command() {
        let err = SeedError::NotFound { id: "nope".into() };
        let help = err.help().map(|h| h.to_string()).unwrap_or_default();
        assert!(help.contains("`compass seeds list`"), "{help}");
    }
}
