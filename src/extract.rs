//! Skill extraction: posting text → candidate skill mentions.
//!
//! Extraction is a pure function of the posting text and a versioned term
//! dictionary. The actual tagging is delegated to a [`SkillTagger`] so an NLP
//! backend can replace the bundled [`DictionaryTagger`]. Mentions below the
//! confidence threshold are kept and flagged; consumers pick their own cutoff.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::ontology::Ontology;
use crate::posting::{Posting, PostingId};

/// Base confidence for aliases of two characters or fewer ("r", "go", "ml").
pub const AMBIGUOUS_CONFIDENCE: f32 = 0.4;

/// Base confidence for every other dictionary term.
pub const DEFAULT_CONFIDENCE: f32 = 0.9;

/// Confidence added per repeated occurrence of the same term.
const REPEAT_BONUS: f32 = 0.05;

/// Byte range of a mention inside `Posting::normalized_text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A skill term detected in one posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillMention {
    pub posting_id: PostingId,
    pub raw_term: String,
    /// Confidence in [0.0, 1.0].
    pub confidence: f32,
    pub span: Span,
    /// Set when `confidence` is below the configured threshold.
    pub low_confidence: bool,
}

/// Raw output of a tagger, before it is tied to a posting.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedTerm {
    pub term: String,
    pub confidence: f32,
    pub span: Span,
}

/// Pluggable term tagger.
///
/// Implementations must be pure: the same text and dictionary version always
/// yield the same terms.
pub trait SkillTagger: Send + Sync {
    fn tag(&self, text: &str) -> Vec<TaggedTerm>;

    /// Version of the term dictionary this tagger uses.
    fn dictionary_version(&self) -> &str;
}

/// One entry of a term dictionary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermEntry {
    pub term: String,
    pub base_confidence: f32,
}

/// Versioned dictionary of skill terms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermDictionary {
    pub version: String,
    pub entries: Vec<TermEntry>,
}

impl TermDictionary {
    /// Build a dictionary from plain terms, assigning base confidences by length.
    pub fn from_terms<I, S>(version: impl Into<String>, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut by_key: BTreeMap<String, TermEntry> = BTreeMap::new();
        for term in terms {
            let term = term.as_ref().trim();
            if term.is_empty() {
                continue;
            }
            let base_confidence = if term.chars().count() <= 2 {
                AMBIGUOUS_CONFIDENCE
            } else {
                DEFAULT_CONFIDENCE
            };
            by_key.entry(term.to_ascii_lowercase()).or_insert(TermEntry {
                term: term.to_string(),
                base_confidence,
            });
        }
        Self {
            version: version.into(),
            entries: by_key.into_values().collect(),
        }
    }

    /// Every alias known to `ontology`, versioned by the ontology version.
    pub fn from_ontology(ontology: &Ontology) -> Self {
        Self::from_terms(
            Self::version_for(ontology),
            ontology.aliases().into_iter().map(|(alias, _)| alias),
        )
    }

    /// Version label [`TermDictionary::from_ontology`] would assign today.
    pub fn version_for(ontology: &Ontology) -> String {
        format!("ontology-v{}", ontology.version())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Default tagger: boundary-aware dictionary matching, longest match wins.
#[derive(Debug, Clone)]
pub struct DictionaryTagger {
    dictionary: TermDictionary,
    /// Lowercased patterns, longest first.
    patterns: Vec<(String, usize)>,
}

impl DictionaryTagger {
    pub fn new(dictionary: TermDictionary) -> Self {
        let mut patterns: Vec<(String, usize)> = dictionary
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.term.to_ascii_lowercase(), i))
            .collect();
        patterns.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Self {
            dictionary,
            patterns,
        }
    }

    pub fn dictionary(&self) -> &TermDictionary {
        &self.dictionary
    }
}

impl SkillTagger for DictionaryTagger {
    fn tag(&self, text: &str) -> Vec<TaggedTerm> {
        // ASCII lowercasing keeps byte offsets aligned with the original text.
        let haystack = text.to_ascii_lowercase();
        let mut taken: Vec<Span> = Vec::new();
        let mut hits: BTreeMap<usize, (Span, u32)> = BTreeMap::new();

        for (pattern, entry_idx) in &self.patterns {
            for (start, _) in haystack.match_indices(pattern.as_str()) {
                let span = Span {
                    start,
                    end: start + pattern.len(),
                };
                if !on_term_boundary(&haystack, span) || taken.iter().any(|t| t.overlaps(&span)) {
                    continue;
                }
                taken.push(span);
                hits.entry(*entry_idx)
                    .and_modify(|(first, count)| {
                        if span.start < first.start {
                            *first = span;
                        }
                        *count += 1;
                    })
                    .or_insert((span, 1));
            }
        }

        let mut tagged: Vec<TaggedTerm> = hits
            .into_iter()
            .map(|(idx, (span, count))| {
                let entry = &self.dictionary.entries[idx];
                let confidence =
                    (entry.base_confidence + REPEAT_BONUS * (count - 1) as f32).min(1.0);
                TaggedTerm {
                    term: entry.term.clone(),
                    confidence,
                    span,
                }
            })
            .collect();
        tagged.sort_by_key(|t| t.span.start);
        tagged
    }

    fn dictionary_version(&self) -> &str {
        &self.dictionary.version
    }
}

fn is_term_char(c: char) -> bool {
    c.is_alphanumeric() || c == '+' || c == '#'
}

fn on_term_boundary(text: &str, span: Span) -> bool {
    let before = text[..span.start].chars().next_back();
    if before.is_some_and(|c| is_term_char(c) || c == '.') {
        return false;
    }
    let mut after = text[span.end..].chars();
    match after.next() {
        None => true,
        Some(c) if is_term_char(c) => false,
        // "node" must not match inside "node.js", but "sql." ends a sentence.
        Some('.') | Some('/') | Some('-') => !after.next().is_some_and(char::is_alphanumeric),
        Some(_) => true,
    }
}

/// Extracts mentions from postings through a pluggable tagger.
#[derive(Clone)]
pub struct Extractor {
    tagger: Arc<dyn SkillTagger>,
    threshold: f32,
}

impl Extractor {
    pub fn new(tagger: Arc<dyn SkillTagger>, threshold: f32) -> Self {
        Self { tagger, threshold }
    }

    /// Extract mentions. Empty text yields an empty list, never an error.
    pub fn extract(&self, posting: &Posting) -> Vec<SkillMention> {
        if posting.normalized_text.trim().is_empty() {
            return Vec::new();
        }
        self.tagger
            .tag(&posting.normalized_text)
            .into_iter()
            .filter(|t| !t.term.trim().is_empty())
            .map(|t| {
                let confidence = t.confidence.clamp(0.0, 1.0);
                SkillMention {
                    posting_id: posting.id.clone(),
                    raw_term: t.term,
                    confidence,
                    span: t.span,
                    low_confidence: confidence < self.threshold,
                }
            })
            .collect()
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn dictionary_version(&self) -> &str {
        self.tagger.dictionary_version()
    }
}

impl std::fmt::Debug for Extractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractor")
            .field("dictionary_version", &self.tagger.dictionary_version())
            .field("threshold", &self.threshold)
            .finish()
    }
}
