//! Alias normalization and fuzzy term similarity.

use unicode_normalization::UnicodeNormalization;

/// Terms shorter than this (in chars) only ever match exactly.
///
/// Short aliases ("r", "go", "c#", "aws") are too close to each other for
/// string similarity to mean anything.
pub const MIN_FUZZY_CHARS: usize = 4;

/// Normalize a raw term into its alias key: NFKC, lowercase, trimmed,
/// inner whitespace collapsed to single spaces.
pub fn normalize_term(term: &str) -> String {
    let folded: String = term.nfkc().collect::<String>().to_lowercase();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Alias key with separators dropped, so "react.js", "react js" and
/// "reactjs" compare equal.
fn compact(term: &str) -> String {
    term.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '+' | '#'))
        .collect()
}

/// Jaro-Winkler similarity of two normalized terms, or `None` when the pair
/// is not eligible for fuzzy matching.
///
/// Both terms are compared with separators dropped. Pairs are ineligible when
/// either side is shorter than [`MIN_FUZZY_CHARS`], when the shorter term is
/// less than `min_length_ratio` of the longer one, or when they are more than
/// `max_edits` Levenshtein edits apart. The edit bound rejects siblings that
/// only share a prefix ("spring boot"/"spring batch").
pub fn fuzzy_score(a: &str, b: &str, min_length_ratio: f64, max_edits: usize) -> Option<f64> {
    let (a, b) = (compact(a), compact(b));
    let (la, lb) = (a.chars().count(), b.chars().count());
    if la < MIN_FUZZY_CHARS || lb < MIN_FUZZY_CHARS {
        return None;
    }
    let ratio = la.min(lb) as f64 / la.max(lb) as f64;
    if ratio < min_length_ratio || strsim::levenshtein(&a, &b) > max_edits {
        return None;
    }
    Some(strsim::jaro_winkler(&a, &b))
}

/// A fuzzy candidate: alias, owning id, similarity.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FuzzyHit<Id> {
    pub alias: String,
    pub id: Id,
    pub score: f64,
}

/// Keep the better of two candidates. Higher score wins, then the alias
/// closest in length to the query, then the lexicographically smaller alias.
pub(crate) fn better<Id>(query_len: usize, current: Option<FuzzyHit<Id>>, next: FuzzyHit<Id>) -> Option<FuzzyHit<Id>> {
    let Some(cur) = current else {
        return Some(next);
    };
    let len_gap = |h: &FuzzyHit<Id>| h.alias.chars().count().abs_diff(query_len);
    let next_wins = match next.score.total_cmp(&cur.score) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => {
            (len_gap(&next), next.alias.as_str()) < (len_gap(&cur), cur.alias.as_str())
        }
    };
    Some(if next_wins { next } else { cur })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_case_and_whitespace() {
        assert_eq!(normalize_term("  Machine   Learning "), "machine learning");
        assert_eq!(normalize_term("ＰＹＴＨＯＮ"), "python");
        assert_eq!(normalize_term("   "), "");
    }

    #[test]
    fn reactjs_is_close_to_react() {
        for variant in ["reactjs", "react.js", "react js"] {
            let score = fuzzy_score(variant, "react", 0.6, 2).unwrap();
            assert!(score >= 0.85, "{variant}: score {score}");
        }
    }

    #[test]
    fn typos_stay_within_the_edit_bound() {
        assert!(fuzzy_score("kubernates", "kubernetes", 0.6, 2).unwrap() >= 0.85);
        assert!(fuzzy_score("postgres", "postgresql", 0.6, 2).unwrap() >= 0.85);
    }

    #[test]
    fn siblings_sharing_a_prefix_are_not_fuzzy_matches() {
        for (a, b) in [
            ("google cloud", "google ads"),
            ("microsoft excel", "microsoft word"),
            ("spring boot", "spring batch"),
            ("postgresql", "postgis"),
        ] {
            assert!(fuzzy_score(a, b, 0.6, 2).is_none(), "{a} ~ {b}");
        }
    }

    #[test]
    fn length_guard_keeps_java_and_javascript_apart() {
        assert!(fuzzy_score("java", "javascript", 0.6, 10).is_none());
    }

    #[test]
    fn short_terms_are_exact_only() {
        assert!(fuzzy_score("aws", "awss", 0.0, 2).is_none());
        assert!(fuzzy_score("c++", "c#", 0.0, 2).is_none());
    }

    #[test]
    fn unrelated_terms_score_low() {
        assert!(fuzzy_score("python", "pytorch", 0.6, 2).is_none());
        let score = fuzzy_score("python", "pytorch", 0.6, 10).unwrap();
        assert!(score < 0.85, "score {score}");
    }

    #[test]
    fn better_prefers_score_then_length_then_alias() {
        let hit = |alias: &str, score| FuzzyHit {
            alias: alias.to_string(),
            id: alias.len(),
            score,
        };
        let best = better(6, None, hit("abcdef", 0.9));
        let best = better(6, best, hit("abcdeg", 0.95));
        assert_eq!(best.as_ref().unwrap().alias, "abcdeg");
        let best = better(6, best, hit("abcdeh", 0.95));
        assert_eq!(best.as_ref().unwrap().alias, "abcdeg");
        let best = better(6, best, hit("abcdefgh", 0.95));
        assert_eq!(best.unwrap().alias, "abcdeg");
    }
}
