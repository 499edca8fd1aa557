//! Term Extractor - turns a question into graph search terms
//!
//! Provides:
//! - Whitespace/case normalization
//! - Alias canonicalization of known spelling variants
//! - Domain phrase detection from a fixed dictionary
//! - Single-token terms minus stop words

use regex_lite::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Default number of terms queried per question
pub const DEFAULT_MAX_TERMS: usize = 4;

/// Shortest single token kept as a term
const MIN_TOKEN_LEN: usize = 3;

/// Multi-word domain phrases, in detection order
const DOMAIN_PHRASES: &[&str] = &[
    "hybrid bonding",
    "advanced packaging",
    "direct to wafer",
    "wafer to wafer",
    "die to wafer",
    "chip on wafer",
    "fan out",
    "panel level packaging",
    "thermal expansion",
    "through silicon via",
];

/// Variant spelling -> canonical form, applied once in this order
const ALIASES: &[(&str, &str)] = &[
    ("advance packaging", "advanced packaging"),
    ("hybrid-bonding", "hybrid bonding"),
    ("die-to-wafer", "die to wafer"),
    ("wafer-to-wafer", "wafer to wafer"),
    ("direct-to-wafer", "direct to wafer"),
    ("chip-on-wafer", "chip on wafer"),
    ("fan-out", "fan out"),
    ("d2w", "die to wafer"),
    ("w2w", "wafer to wafer"),
    ("co-wos", "cowos"),
    ("co wo s", "cowos"),
];

// Domain words (defect, warpage, delamination, thermal, ...) stay out of
// this list even when they sound generic.
const STOP_WORDS: &[&str] = &[
    // function words
    "the", "a", "an", "to", "of", "and", "or", "in", "on", "at", "for", "with", "without", "by",
    "from", "into", "is", "are", "was", "were", "be", "been", "being", "that", "this", "these",
    "those", "it", "its", "not", "also", "than", "then", "there", "other",
    "what", "which", "who", "whom", "whose", "how", "why", "when", "where",
    "do", "does", "did", "has", "have", "had",
    // question/imperative filler
    "can", "could", "would", "should", "please", "kindly",
    "you", "your", "yours", "we", "us", "our", "ours", "i", "me", "my", "mine",
    "they", "them", "their", "theirs",
    "find", "show", "list", "several", "some", "any", "many", "much", "more", "most", "few", "lot",
    "need", "face", "related", "about", "around", "regarding", "regards", "regard",
    "best", "good", "main", "key", "type", "types", "way", "ways",
    // generic boilerplate
    "paper", "papers", "problem", "problems", "issue", "issues", "challenge", "challenges",
];

fn token_pattern() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"[A-Za-z0-9_]+").unwrap())
}

/// Lowercase, collapse internal whitespace, trim
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Extracts ordered, deduplicated search terms from free text
#[derive(Debug, Clone)]
pub struct TermExtractor {
    phrases: Vec<String>,
    aliases: Vec<(String, String)>,
    stop_words: HashSet<String>,
}

impl Default for TermExtractor {
    fn default() -> Self {
        Self {
            phrases: DOMAIN_PHRASES.iter().map(|p| p.to_string()).collect(),
            aliases: ALIASES
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
            stop_words: STOP_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }
}

impl TermExtractor {
    /// Build an extractor over a custom phrase dictionary
    pub fn with_phrases(phrases: &[&str]) -> Self {
        Self {
            phrases: phrases.iter().map(|p| normalize(p)).collect(),
            ..Self::default()
        }
    }

    pub fn is_stop_word(&self, word: &str) -> bool {
        self.stop_words.contains(word)
    }

    /// Replace every known variant with its canonical phrase (single pass)
    pub fn apply_aliases(&self, question: &str) -> String {
        let mut canonical = question.to_string();
        for (from, to) in &self.aliases {
            if canonical.contains(from.as_str()) {
                canonical = canonical.replace(from.as_str(), to);
            }
        }
        canonical
    }

    /// Normalized, alias-canonicalized question text
    pub fn canonicalize(&self, question: &str) -> String {
        self.apply_aliases(&normalize(question))
    }

    /// Phrases first (dictionary order), then single tokens (question order),
    /// deduplicated case-insensitively and capped at `max_terms`.
    pub fn extract(&self, question: &str, max_terms: usize) -> Vec<String> {
        let question = self.canonicalize(question);

        let phrases: Vec<&str> = self
            .phrases
            .iter()
            .map(String::as_str)
            .filter(|phrase| question.contains(phrase))
            .collect();

        // words already carried by a matched phrase are not repeated as tokens
        let phrase_words: HashSet<&str> = phrases
            .iter()
            .flat_map(|phrase| phrase.split(' '))
            .collect();

        let singles = token_pattern()
            .find_iter(&question)
            .map(|m| m.as_str())
            .filter(|token| token.len() >= MIN_TOKEN_LEN)
            .filter(|token| !self.is_stop_word(token))
            .filter(|token| !phrase_words.contains(token));

        let mut seen = HashSet::new();
        phrases
            .into_iter()
            .chain(singles)
            .filter(|term| seen.insert(term.to_lowercase()))
            .take(max_terms)
            .map(str::to_string)
            .collect()
    }
}

/// Extract terms with the built-in dictionaries
pub fn extract_terms(question: &str, max_terms: usize) -> Vec<String> {
    TermExtractor::default().extract(question, max_terms)
}

/// Append extra candidate terms (e.g. from a query rewriter) after `base`,
/// skipping blanks and case-insensitive duplicates.
pub fn merge_terms(base: Vec<String>, extra: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = base.iter().map(|t| t.to_lowercase()).collect();
    let mut merged = base;
    for term in extra {
        let term = normalize(term);
        if !term.is_empty() && seen.insert(term.clone()) {
            merged.push(term);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUESTIONS: &[&str] = &[
        "What is the best bonding temperature?",
        "hybrid bonding die-to-wafer defects",
        "Which papers discuss warpage in Fan-Out panel level packaging?",
        "Advance packaging CTE mismatch and thermal expansion issues",
        "D2W vs W2W alignment accuracy for hybrid-bonding",
        "co-wos interposer delamination",
        "Can you list the problems we face?",
    ];

    #[test]
    fn test_stop_words_removed() {
        assert_eq!(
            extract_terms("What is the best bonding temperature?", DEFAULT_MAX_TERMS),
            vec!["bonding", "temperature"]
        );
    }

    #[test]
    fn test_aliases_then_phrases_first() {
        assert_eq!(
            extract_terms("hybrid bonding die-to-wafer defects", DEFAULT_MAX_TERMS),
            vec!["hybrid bonding", "die to wafer", "defects"]
        );
    }

    #[test]
    fn test_abbreviation_aliases() {
        let terms = extract_terms("D2W vs W2W alignment", 8);
        assert_eq!(terms, vec!["wafer to wafer", "die to wafer", "alignment"]);
    }

    #[test]
    fn test_phrases_precede_single_tokens() {
        let extractor = TermExtractor::default();
        for question in QUESTIONS {
            let terms = extractor.extract(question, 10);
            let first_single = terms.iter().position(|t| !t.contains(' '));
            if let Some(pos) = first_single {
                assert!(
                    terms[pos..].iter().all(|t| !t.contains(' ')),
                    "phrase after token in {terms:?}"
                );
            }
        }
    }

    #[test]
    fn test_never_a_lone_stop_word() {
        let extractor = TermExtractor::default();
        for question in QUESTIONS {
            for term in extractor.extract(question, 10) {
                assert!(!extractor.is_stop_word(&term), "{term} leaked from {question}");
            }
        }
    }

    #[test]
    fn test_bounded_and_unique() {
        let extractor = TermExtractor::default();
        for max_terms in 0..6 {
            for question in QUESTIONS {
                let terms = extractor.extract(question, max_terms);
                assert!(terms.len() <= max_terms);
                let unique: HashSet<String> = terms.iter().map(|t| t.to_lowercase()).collect();
                assert_eq!(unique.len(), terms.len());
            }
        }
        let repeated = extractor.extract("Warpage warpage WARPAGE wafer", 4);
        assert_eq!(repeated, vec!["warpage", "wafer"]);
    }

    #[test]
    fn test_alias_canonicalization_idempotent() {
        let extractor = TermExtractor::default();
        for question in QUESTIONS {
            let once = extractor.canonicalize(question);
            let twice = extractor.canonicalize(&once);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_no_terms_is_empty_not_error() {
        assert!(extract_terms("Can you list the problems we face?", 4).is_empty());
        assert!(extract_terms("   ", 4).is_empty());
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize("  Hybrid \t Bonding\n\nYield "), "hybrid bonding yield");
    }

    #[test]
    fn test_custom_phrase_dictionary() {
        let extractor = TermExtractor::with_phrases(&["Copper Pad", "surface roughness"]);
        assert_eq!(
            extractor.extract("copper pad surface roughness after CMP", 4),
            vec!["copper pad", "surface roughness", "after", "cmp"]
        );
    }

    #[test]
    fn test_merge_terms_dedups_case_insensitively() {
        let merged = merge_terms(
            vec!["hybrid bonding".to_string(), "voids".to_string()],
            &["Voids".to_string(), "  Copper  Dishing ".to_string(), "".to_string()],
        );
        assert_eq!(merged, vec!["hybrid bonding", "voids", "copper dishing"]);
    }
}
