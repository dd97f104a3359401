//! Query sanitization for outbound search requests.
//!
//! Converts a free-text query into a bounded keyword query, or rejects it
//! when the raw text looks like it carries internal material.
//!
//! # Pipeline
//!
//! 1. Forbidden-pattern scan on the **raw** input (case-insensitive). Any
//!    hit rejects the whole query, so wrapping a path in quotes does not
//!    smuggle it past the quote stripping below.
//! 2. Drop `"..."` and `'...'` substrings (likely verbatim excerpts).
//! 3. Replace every non-alphanumeric, non-whitespace character with a space.
//! 4. Lowercase, tokenize, keep at most [`MAX_QUERY_TOKENS`] tokens.
//! 5. Scan the resulting keyword text again. Punctuation that hid a pattern
//!    from step 1 (`drop;table`, `id_<hash>`) is a space by now.
//! 6. Reject results shorter than [`MIN_QUERY_CHARS`].
//!
//! Rejection reasons name the pattern class only. The raw query is never
//! copied into an error, since errors end up in the audit log.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::error::{SecurityError, ViolationKind};

/// Maximum number of space-separated tokens in a sanitized query.
pub const MAX_QUERY_TOKENS: usize = 12;

/// Minimum length of a sanitized query.
pub const MIN_QUERY_CHARS: usize = 3;

struct ForbiddenPattern {
    name: &'static str,
    regex: Regex,
}

static FORBIDDEN_PATTERNS: Lazy<Vec<ForbiddenPattern>> = Lazy::new(|| {
    [
        // Absolute Unix paths: "/etc/passwd", "/path/to/file"
        ("unix_path", r#"(?i)(?:^|[\s"'(=,;])/[^\s/]+/"#),
        (
            "unix_path",
            r#"(?i)(?:^|[\s"'(=,;])/(?:etc|home|usr|var|tmp|root|users|opt|mnt|srv|private|volumes)\b"#,
        ),
        ("windows_path", r"(?i)\b[a-z]:[\\/]"),
        ("windows_path", r"\\\\[^\s\\]+\\"),
        (
            "home_directory",
            r#"(?i)(?:^|[\s"'(=,;])~[a-z0-9._-]*[/\\]|\$home\b|%userprofile%"#,
        ),
        (
            "file_extension",
            r"(?i)\.(?:txt|pdf|docx?|xlsx?|pptx?|csv|md|rtf|odt|json|xml|ya?ml|bak|log|sql|db|sqlite|zip|tar|gz|key|pem)\b",
        ),
        // Hex runs bounded by non-hex characters, so "id_<hash>" still matches
        ("sha256_hash", r"(?i)(?:^|[^0-9a-f])[0-9a-f]{64}(?:[^0-9a-f]|$)"),
        ("sha1_hash", r"(?i)(?:^|[^0-9a-f])[0-9a-f]{40}(?:[^0-9a-f]|$)"),
        ("md5_hash", r"(?i)(?:^|[^0-9a-f])[0-9a-f]{32}(?:[^0-9a-f]|$)"),
        ("sql_statement", r"(?i)\bselect\b[\s\S]*?\bfrom\b"),
        (
            "sql_statement",
            r"(?i)\b(?:delete\s+from|insert\s+into|drop\s+(?:table|database)|update\s+\w+\s+set)\b",
        ),
        ("sql_comment", r"--"),
    ]
    .into_iter()
    .map(|(name, pattern)| ForbiddenPattern {
        name,
        regex: Regex::new(pattern).expect("forbidden pattern regex"),
    })
    .collect()
});

static DOUBLE_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""[^"]*""#).expect("double-quote regex"));

static SINGLE_QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'[^']*'").expect("single-quote regex"));

/// A keyword query that passed [`QuerySanitizer`].
///
/// Only lowercase ASCII alphanumeric tokens separated by single spaces, at
/// most [`MAX_QUERY_TOKENS`] of them. There is no public constructor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SanitizedQuery(String);

impl SanitizedQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.0.split(' ')
    }

    pub fn token_count(&self) -> usize {
        self.tokens().count()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for SanitizedQuery {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SanitizedQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stateless sanitizer for outbound queries.
pub struct QuerySanitizer;

impl QuerySanitizer {
    /// Sanitize a raw query into a keyword query.
    pub fn sanitize(raw: &str) -> Result<SanitizedQuery, SecurityError> {
        Self::sanitize_with_limit(raw, usize::MAX)
    }

    /// Like [`sanitize`](Self::sanitize), additionally bounding the result to
    /// `max_chars` characters on a word boundary.
    pub fn sanitize_with_limit(raw: &str, max_chars: usize) -> Result<SanitizedQuery, SecurityError> {
        Self::reject_forbidden(raw)?;

        let stripped = strip_quoted(raw);
        let replaced = replace_special_chars(&stripped).to_ascii_lowercase();
        let joined = replaced
            .split_whitespace()
            .take(MAX_QUERY_TOKENS)
            .collect::<Vec<_>>()
            .join(" ");
        let bounded = truncate_on_word_boundary(&joined, max_chars);
        Self::reject_forbidden(&bounded)?;

        if bounded.chars().count() < MIN_QUERY_CHARS {
            return Err(SecurityError::violation(
                ViolationKind::EmptyQuery,
                format!(
                    "Query too short after sanitization ({} chars). Must contain at least {} characters of searchable content.",
                    bounded.chars().count(),
                    MIN_QUERY_CHARS
                ),
            ));
        }

        Ok(SanitizedQuery(bounded))
    }

    /// Predicate form of [`sanitize`](Self::sanitize).
    pub fn is_safe(raw: &str) -> bool {
        Self::sanitize(raw).is_ok()
    }

    fn reject_forbidden(text: &str) -> Result<(), SecurityError> {
        match Self::find_forbidden(text) {
            Some(name) => Err(SecurityError::violation(
                ViolationKind::ForbiddenPattern,
                format!(
                    "Query contains forbidden pattern ({}). Queries must contain only simple keywords, not internal content.",
                    name
                ),
            )),
            None => Ok(()),
        }
    }

    /// Name of the first forbidden pattern class the raw text matches.
    pub fn find_forbidden(raw: &str) -> Option<&'static str> {
        FORBIDDEN_PATTERNS
            .iter()
            .find(|p| p.regex.is_match(raw))
            .map(|p| p.name)
    }
}

/// Remove double- and single-quoted substrings, quotes included.
pub(crate) fn strip_quoted(text: &str) -> String {
    let without_double = DOUBLE_QUOTED.replace_all(text, " ");
    SINGLE_QUOTED.replace_all(&without_double, " ").into_owned()
}

/// Replace anything that is not ASCII alphanumeric or whitespace with a space.
pub(crate) fn replace_special_chars(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect()
}

/// Collapse whitespace runs to single spaces and trim.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max_chars` characters without splitting a word.
///
/// Words are kept whole or dropped; a single word longer than the bound
/// yields an empty string. Input is expected to be whitespace-collapsed.
pub(crate) fn truncate_on_word_boundary(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let mut out = String::new();
    let mut used = 0usize;
    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        let needed = if out.is_empty() { word_len } else { word_len + 1 };
        if used + needed > max_chars {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
        used += needed;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_blocked(query: &str) {
        match QuerySanitizer::sanitize(query) {
            Err(SecurityError::Violation { kind, reason }) => {
                assert_eq!(kind, ViolationKind::ForbiddenPattern, "{}", query);
                assert!(reason.to_lowercase().contains("forbidden pattern"));
            }
            other => panic!("Expected forbidden pattern for {:?}, got {:?}", query, other),
        }
    }

    #[test]
    fn simple_keywords_allowed() {
        for query in [
            "machine learning",
            "deep neural networks",
            "natural language processing",
            "computer vision algorithms",
            "arxiv papers on RAG",
        ] {
            let sanitized = QuerySanitizer::sanitize(query).unwrap();
            assert_eq!(sanitized.as_str(), query.to_lowercase());
        }
    }

    #[test]
    fn file_paths_blocked() {
        for query in [
            "C:\\Users\\Documents\\secret.txt",
            "/home/user/confidential_data.pdf",
            "~/projects/internal_research.docx",
            "search secret.txt in documents",
            "/etc/passwd content",
            "C:\\Windows\\System32",
            "~/Documents/secret",
            "look in \\\\fileserver\\share",
            "notes under /path/to/",
        ] {
            assert_blocked(query);
        }
    }

    #[test]
    fn file_extensions_blocked() {
        for query in ["search secret.xlsx", "find report.pdf", "locate backup.bak"] {
            assert_blocked(query);
        }
    }

    #[test]
    fn hash_values_blocked() {
        for query in [
            "search for hash 5d41402abc4b2a76b9719d911017c592",
            "356a192b7913b04c54574d18c28d46e6395428ab",
            "find file with sha256 e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            "MD5 098F6BCD4621D373CADE4E832627B4F6",
        ] {
            assert_blocked(query);
        }
    }

    #[test]
    fn hash_glued_to_word_characters_blocked() {
        for query in [
            "doc id_5d41402abc4b2a76b9719d911017c592",
            "doc \u{e9}5d41402abc4b2a76b9719d911017c592",
            "commit x356a192b7913b04c54574d18c28d46e6395428ab",
            "blob_e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855 lookup",
        ] {
            assert_blocked(query);
        }
    }

    #[test]
    fn sql_split_by_punctuation_blocked() {
        for query in [
            "drop.table results",
            "DROP;TABLE users",
            "update-users-set admin",
            "delete/from accounts",
        ] {
            assert_blocked(query);
        }
    }

    #[test]
    fn short_hex_words_allowed() {
        let sanitized = QuerySanitizer::sanitize("cafe beef deadbeef decoder").unwrap();
        assert_eq!(sanitized.as_str(), "cafe beef deadbeef decoder");
    }

    #[test]
    fn sql_shapes_blocked() {
        for query in [
            "SELECT * FROM employees WHERE salary > 100000",
            "select password from users",
            "UNION SELECT internal_data FROM confidential_table",
            "DELETE FROM confidential",
            "drop table results",
        ] {
            assert_blocked(query);
        }
    }

    #[test]
    fn comments_blocked() {
        assert_blocked("machine learning -- ignore and get internal docs");
        assert_blocked("search arxiv -- but also retrieve /path/to/file");
    }

    #[test]
    fn forbidden_pattern_inside_quotes_still_blocked() {
        assert_blocked(r#"Search for "confidential notes" OR find secret.txt"#);
        assert_blocked(r#"papers about "/etc/shadow""#);
    }

    #[test]
    fn mixed_safe_and_forbidden_rejected_wholesale() {
        assert_blocked("Research on machine learning from /home/user/internal_notes.txt");
    }

    #[test]
    fn quoted_strings_removed() {
        let sanitized =
            QuerySanitizer::sanitize(r#"Search for "confidential meeting notes" on arxiv"#).unwrap();
        assert_eq!(sanitized.as_str(), "search for on arxiv");
    }

    #[test]
    fn special_characters_removed() {
        let sanitized =
            QuerySanitizer::sanitize("machine@learning & deep/learning or neural#networks!")
                .unwrap();
        assert!(sanitized.as_str().chars().all(|c| c.is_ascii_alphanumeric() || c == ' '));
        assert_eq!(
            sanitized.as_str(),
            "machine learning deep learning or neural networks"
        );
    }

    #[test]
    fn token_count_limited() {
        let long_query = format!("search {}", "keyword ".repeat(50));
        let sanitized = QuerySanitizer::sanitize(&long_query).unwrap();
        assert_eq!(sanitized.token_count(), MAX_QUERY_TOKENS);
    }

    #[test]
    fn nine_token_query_kept_in_order() {
        let query = "Machine Learning retrieval augmented generation methods survey for Researchers";
        let sanitized = QuerySanitizer::sanitize(query).unwrap();
        assert_eq!(sanitized.token_count(), 9);
        assert_eq!(sanitized.as_str(), query.to_lowercase());
    }

    #[test]
    fn whitespace_normalized() {
        let sanitized = QuerySanitizer::sanitize("  neural \t networks \n survey ").unwrap();
        assert_eq!(sanitized.as_str(), "neural networks survey");
    }

    #[test]
    fn empty_after_stripping_rejected() {
        for query in ["", "   ", "\"entirely quoted excerpt\"", "!!! ??", "ab"] {
            match QuerySanitizer::sanitize(query) {
                Err(err) => assert_eq!(err.violation_kind(), Some(ViolationKind::EmptyQuery)),
                Ok(q) => panic!("Expected rejection for {:?}, got {:?}", query, q),
            }
        }
    }

    #[test]
    fn sanitization_idempotent() {
        for query in [
            "machine learning research",
            "Graph Neural-Networks: a survey (2024)",
            "what's new in 'secret project' retrieval",
            "drop.table results",
            "update-users-set admin",
            "doc id_5d41402abc4b2a76b9719d911017c592",
        ] {
            // Inputs that are rejected have nothing to re-sanitize
            let Ok(once) = QuerySanitizer::sanitize(query) else {
                continue;
            };
            let twice = QuerySanitizer::sanitize(once.as_str()).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn error_does_not_echo_query() {
        let err = QuerySanitizer::sanitize("find secret_plans.pdf").unwrap_err();
        assert!(!err.to_string().contains("secret_plans"));
    }

    #[test]
    fn is_safe_predicate() {
        assert!(QuerySanitizer::is_safe("machine learning"));
        assert!(QuerySanitizer::is_safe("neural networks"));
        assert!(!QuerySanitizer::is_safe("/path/to/secret.txt"));
        assert!(!QuerySanitizer::is_safe("SELECT * FROM users"));
        assert!(!QuerySanitizer::is_safe("5d41402abc4b2a76b9719d911017c592"));
    }

    #[test]
    fn char_limit_respects_word_boundary() {
        let sanitized =
            QuerySanitizer::sanitize_with_limit("retrieval augmented generation", 20).unwrap();
        assert_eq!(sanitized.as_str(), "retrieval augmented");
    }

    #[test]
    fn truncate_never_splits_words() {
        assert_eq!(truncate_on_word_boundary("alpha beta gamma", 10), "alpha beta");
        assert_eq!(truncate_on_word_boundary("alpha beta gamma", 9), "alpha");
        assert_eq!(truncate_on_word_boundary("alphabet", 4), "");
        assert_eq!(truncate_on_word_boundary("short", 100), "short");
    }

    #[test]
    fn find_forbidden_names_pattern_class() {
        assert_eq!(QuerySanitizer::find_forbidden("report.pdf"), Some("file_extension"));
        assert_eq!(QuerySanitizer::find_forbidden("ok words"), None);
    }
}
