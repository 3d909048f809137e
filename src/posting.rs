//! Posting ingestion: normalization, content-hash ids and de-duplication.
//!
//! Raw postings arrive from an external scraping collaborator. They are turned
//! into immutable [`Posting`] records whose [`PostingId`] is a content hash, so
//! re-deliveries and trivially different copies of the same advert collapse to
//! one id.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use crate::error::PostingError;

/// Characters of normalized text that contribute to the content hash.
pub const HASH_TEXT_CHARS: usize = 2_000;

/// Descriptions shorter than this are reported as a quality issue.
const MIN_DESCRIPTION_CHARS: usize = 80;

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));
static ROLE_NOISE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(senior|sr|junior|jr|lead|principal|staff|head|chief|intern|associate|mid|entry|level|remote|hybrid|i{1,3}|iv|[1-4])\b",
    )
    .expect("static regex")
});

/// Content-hash identifier of a posting (hex SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PostingId(String);

impl PostingId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PostingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0[..self.0.len().min(12)])
    }
}

/// A job posting as delivered by a scraping collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPosting {
    pub source: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
    /// Explicit role tag. Derived from the title when absent.
    #[serde(default)]
    pub role: Option<String>,
    pub posted_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
}

/// A normalized, immutable job posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub id: PostingId,
    pub source: String,
    pub company: String,
    pub title: String,
    pub location: Option<String>,
    /// Normalized role label used for target-role distributions.
    pub role: String,
    pub normalized_text: String,
    pub posted_at: DateTime<Utc>,
    pub fetched_at: DateTime<Utc>,
}

/// Non-fatal data quality findings for a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityIssue {
    MissingCompany,
    ShortDescription,
    PostedAfterFetch,
}

impl std::fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCompany => write!(f, "missing company"),
            Self::ShortDescription => write!(f, "short description"),
            Self::PostedAfterFetch => write!(f, "posted_at is after fetched_at"),
        }
    }
}

impl Posting {
    /// Normalize a raw posting into its canonical record.
    pub fn normalize(raw: RawPosting) -> Result<Self, PostingError> {
        let source = collapse(&raw.source);
        if source.is_empty() {
            return Err(PostingError::MissingSource);
        }
        let title = normalize_text(&raw.title);
        let description = normalize_text(&raw.description);
        if title.is_empty() && description.is_empty() {
            return Err(PostingError::Empty {
                source_name: source,
            });
        }

        let company = collapse(&raw.company);
        let normalized_text = match (title.is_empty(), description.is_empty()) {
            (_, true) => title.clone(),
            (true, false) => description.clone(),
            (false, false) => format!("{title}\n{description}"),
        };
        let role = match raw.role.as_deref().map(role_label) {
            Some(label) if !label.is_empty() => label,
            _ => role_label(&title),
        };
        let id = content_id(&source, &company, &title, &normalized_text);

        Ok(Self {
            id,
            source,
            company,
            title,
            location: raw.location.map(|l| collapse(&l)).filter(|l| !l.is_empty()),
            role,
            normalized_text,
            posted_at: raw.posted_at,
            fetched_at: raw.fetched_at,
        })
    }

    /// Company key used for distinct-company counting.
    pub fn company_key(&self) -> String {
        self.company.to_lowercase()
    }

    /// Report data quality problems. None of them block ingestion.
    pub fn quality_issues(&self) -> Vec<QualityIssue> {
        let mut issues = Vec::new();
        if self.company.is_empty() {
            issues.push(QualityIssue::MissingCompany);
        }
        let body_chars = self.normalized_text.chars().count() - self.title.chars().count();
        if body_chars < MIN_DESCRIPTION_CHARS {
            issues.push(QualityIssue::ShortDescription);
        }
        if self.posted_at > self.fetched_at {
            issues.push(QualityIssue::PostedAfterFetch);
        }
        issues
    }
}

/// NFKC, strip markup, decode the common entities, collapse whitespace.
pub fn normalize_text(input: &str) -> String {
    let nfkc: String = input.nfkc().collect();
    let stripped = TAG_RE.replace_all(&nfkc, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    collapse(&decoded)
}

fn collapse(input: &str) -> String {
    WS_RE.replace_all(input.trim(), " ").into_owned()
}

/// Derive a role label from a job title.
///
/// "Senior Data Engineer II (Remote)" becomes "data engineer".
pub fn role_label(title: &str) -> String {
    let lower = title.to_lowercase();
    let head = lower
        .split(['(', ',', '|', '@'])
        .next()
        .unwrap_or_default()
        .split(" - ")
        .next()
        .unwrap_or_default()
        .to_string();
    let cleaned: String = head
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '+' || c == '#' { c } else { ' ' })
        .collect();
    let without_levels = ROLE_NOISE_RE.replace_all(&cleaned, " ");
    collapse(&without_levels)
}

fn content_id(source: &str, company: &str, title: &str, text: &str) -> PostingId {
    let truncated: String = text.chars().take(HASH_TEXT_CHARS).collect();
    let mut hasher = Sha256::new();
    for part in [source, company, title, truncated.as_str()] {
        hasher.update(collapse(&part.to_lowercase()).as_bytes());
        hasher.update([0x1f]);
    }
    let digest = hasher.finalize();
    PostingId(digest.iter().map(|b| format!("{b:02x}")).collect())
}

/// Concurrent set of posting ids already accepted by the engine.
#[derive(Debug, Default)]
pub struct PostingLedger {
    seen: DashSet<PostingId>,
}

impl PostingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an id. Returns `false` if it had been seen before.
    pub fn admit(&self, id: &PostingId) -> bool {
        self.seen.insert(id.clone())
    }

    pub fn contains(&self, id: &PostingId) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn raw(title: &str, description: &str) -> RawPosting {
        RawPosting {
            source: "board".into(),
            company: "Acme".into(),
            title: title.into(),
            description: description.into(),
            location: Some("  Berlin ".into()),
            role: None,
            posted_at: Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap(),
            fetched_at: Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn normalize_strips_markup_and_whitespace() {
        let posting = Posting::normalize(raw(
            "Data Engineer",
            "<p>We use <b>Python</b> &amp; SQL.</p>\n\n  Apply now",
        ))
        .unwrap();
        assert_eq!(
            posting.normalized_text,
            "Data Engineer\nWe use Python & SQL. Apply now"
        );
        assert_eq!(posting.location.as_deref(), Some("Berlin"));
    }

    #[test]
    fn near_identical_postings_share_an_id() {
        let a = Posting::normalize(raw("Data Engineer", "Python and SQL")).unwrap();
        let b = Posting::normalize(raw("data  engineer", "<div>python   AND sql</div>")).unwrap();
        assert_eq!(a.id, b.id);

        let c = Posting::normalize(raw("Data Engineer", "Python and Scala")).unwrap();
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn empty_posting_is_rejected() {
        let err = Posting::normalize(raw("  ", "<br/>")).unwrap_err();
        assert!(matches!(err, PostingError::Empty { .. }));
    }

    #[test]
    fn role_label_strips_seniority() {
        assert_eq!(role_label("Senior Data Engineer II (Remote)"), "data engineer");
        assert_eq!(role_label("Sr. ML Engineer - Platform"), "ml engineer");
        assert_eq!(role_label("Lead C++ Developer"), "c++ developer");
    }

    #[test]
    fn explicit_role_wins_over_title() {
        let mut r = raw("Wizard of Data", "Python");
        r.role = Some("Data Scientist".into());
        let posting = Posting::normalize(r).unwrap();
        assert_eq!(posting.role, "data scientist");
    }

    #[test]
    fn quality_issues_are_reported() {
        let mut r = raw("Data Engineer", "Python");
        r.company = String::new();
        r.posted_at = r.fetched_at + chrono::Duration::days(1);
        let posting = Posting::normalize(r).unwrap();
        let issues = posting.quality_issues();
        assert!(issues.contains(&QualityIssue::MissingCompany));
        assert!(issues.contains(&QualityIssue::ShortDescription));
        assert!(issues.contains(&QualityIssue::PostedAfterFetch));
    }

    #[test]
    fn ledger_admits_once() {
        let ledger = PostingLedger::new();
        let posting = Posting::normalize(raw("Data Engineer", "Python")).unwrap();
        assert!(ledger.admit(&posting.id));
        assert!(!ledger.admit(&posting.id));
        assert_eq!(ledger.len(), 1);
    }
}
