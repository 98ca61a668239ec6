//! Route exclusion patterns.
//!
//! A pattern either contains `*` wildcards, in which case it must match the
//! whole path, or it is a literal prefix. Prefix comparison is byte-literal:
//! `/health` excludes `/health2` as well as `/health/live`.

use regex::Regex;

use crate::error::CoreError;

/// One compiled exclusion pattern.
#[derive(Debug, Clone)]
enum Rule {
    Prefix(String),
    Wildcard(Regex),
}

impl Rule {
    fn compile(pattern: &str) -> Result<Self, CoreError> {
        if !pattern.contains('*') {
            return Ok(Rule::Prefix(pattern.to_string()));
        }

        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");

        Regex::new(&format!("(?s)^{body}$"))
            .map(Rule::Wildcard)
            .map_err(|e| CoreError::Validation(format!("Invalid exclusion pattern '{pattern}': {e}")))
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            Rule::Prefix(prefix) => path.starts_with(prefix.as_str()),
            Rule::Wildcard(re) => re.is_match(path),
        }
    }
}

/// A set of exclusion patterns compiled once at startup.
#[derive(Debug, Clone, Default)]
pub struct ExclusionMatcher {
    rules: Vec<Rule>,
}

impl ExclusionMatcher {
    /// Compile the given patterns, preserving their order.
    pub fn new<I, S>(patterns: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = patterns
            .into_iter()
            .map(|p| Rule::compile(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Returns `true` if any pattern matches `path`.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(path))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// One-shot form of [`ExclusionMatcher::is_excluded`].
///
/// Compiles `patterns` on every call; prefer a long-lived
/// [`ExclusionMatcher`] on hot paths. A pattern that fails to compile never
/// matches.
pub fn is_excluded<S: AsRef<str>>(path: &str, patterns: &[S]) -> bool {
    patterns.iter().any(|p| {
        Rule::compile(p.as_ref())
            .map(|rule| rule.matches(path))
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(patterns: &[&str]) -> ExclusionMatcher {
        ExclusionMatcher::new(patterns.iter().copied()).expect("patterns compile")
    }

    #[test]
    fn literal_pattern_is_prefix_match() {
        let m = matcher(&["/health"]);
        assert!(m.is_excluded("/health"));
        assert!(m.is_excluded("/health/live"));
        // Byte-literal prefix, no segment boundary.
        assert!(m.is_excluded("/health2"));
        assert!(!m.is_excluded("/api/health"));
    }

    #[test]
    fn wildcard_pattern_matches_whole_path() {
        let m = matcher(&["/api/*"]);
        assert!(m.is_excluded("/api/anything"));
        assert!(m.is_excluded("/api/"));
        assert!(m.is_excluded("/api/orders/42"));
        assert!(!m.is_excluded("/apiv2"));
        assert!(!m.is_excluded("/api"));
        assert!(!m.is_excluded("/v1/api/x"));
    }

    #[test]
    fn wildcard_in_the_middle() {
        let m = matcher(&["/users/*/avatar"]);
        assert!(m.is_excluded("/users/7/avatar"));
        assert!(!m.is_excluded("/users/7/avatar/large"));
        assert!(!m.is_excluded("/users/7/profile"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let m = matcher(&["/files/*.json"]);
        assert!(m.is_excluded("/files/a.json"));
        assert!(!m.is_excluded("/files/ajson"));
    }

    #[test]
    fn no_case_normalization() {
        let m = matcher(&["/Health"]);
        assert!(!m.is_excluded("/health"));
    }

    #[test]
    fn any_pattern_excludes() {
        let m = matcher(&["/health", "/api/*"]);
        assert!(m.is_excluded("/health"));
        assert!(m.is_excluded("/api/anything"));
        assert!(!m.is_excluded("/apiv2"));
        assert!(!m.is_excluded("/orders"));
    }

    #[test]
    fn empty_matcher_excludes_nothing() {
        let m = ExclusionMatcher::default();
        assert!(m.is_empty());
        assert!(!m.is_excluded("/anything"));
    }

    #[test]
    fn one_shot_function_agrees_with_matcher() {
        let patterns = vec!["/health".to_string(), "/api/*".to_string()];
        assert!(is_excluded("/health", &patterns));
        assert!(is_excluded("/api/x", &patterns));
        assert!(!is_excluded("/apiv2", &patterns));
        assert!(!is_excluded::<&str>("/health", &[]));
    }
}
