//! Core skill identity types.
//!
//! Every canonical skill in the ontology is identified by a [`SkillId`].
//! Ids are handed out by the [`AtomicSkillAllocator`] and are never reused,
//! so an id stays meaningful across ontology versions even after a merge
//! turns it into a redirect.

use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::OntologyError;

/// Unique, niche-optimized identifier for a canonical skill.
///
/// Uses `NonZeroU64` so that `Option<SkillId>` is the same size as `SkillId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SkillId(NonZeroU64);

impl SkillId {
    /// Create a `SkillId` from a raw `u64`.
    ///
    /// Returns `None` if `raw` is zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(SkillId)
    }

    /// Get the underlying `u64` value.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for SkillId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// Coarse grouping of skills, used for display and default learning-cost estimates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkillCategory {
    Programming,
    DataScience,
    DataEngineering,
    CloudDevops,
    SoftSkills,
    /// Auto-created from an unknown term; not yet curated.
    #[default]
    Uncategorized,
}

impl SkillCategory {
    /// Parse a category label as used in seed packs and on the command line.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().replace(['_', ' '], "-").as_str() {
            "programming" => Some(Self::Programming),
            "data-science" | "ml" | "ml-ai" => Some(Self::DataScience),
            "data-engineering" => Some(Self::DataEngineering),
            "cloud-devops" | "devops" | "cloud" => Some(Self::CloudDevops),
            "soft-skills" | "soft" => Some(Self::SoftSkills),
            "uncategorized" => Some(Self::Uncategorized),
            _ => None,
        }
    }
}

impl std::fmt::Display for SkillCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Programming => "programming",
            Self::DataScience => "data-science",
            Self::DataEngineering => "data-engineering",
            Self::CloudDevops => "cloud-devops",
            Self::SoftSkills => "soft-skills",
            Self::Uncategorized => "uncategorized",
        };
        f.write_str(label)
    }
}

/// Thread-safe skill id allocator.
///
/// Produces monotonically increasing ids starting from 1.
#[derive(Debug)]
pub struct AtomicSkillAllocator {
    next: AtomicU64,
}

impl AtomicSkillAllocator {
    /// Create a new allocator that starts from id 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Create an allocator that resumes from a given id.
    ///
    /// Used when restoring an ontology snapshot.
    pub fn starting_from(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start.max(1)),
        }
    }

    /// Allocate the next skill id.
    pub fn next_id(&self) -> Result<SkillId, OntologyError> {
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        SkillId::new(raw).ok_or(OntologyError::AllocatorExhausted)
    }

    /// Return the next id that *would* be allocated, without consuming it.
    pub fn peek_next(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for AtomicSkillAllocator {
    fn default() -> Self {
        Self::new()
    }
}
