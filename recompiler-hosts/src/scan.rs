//! Regex scanning shared by the hosts.

use once_cell::sync::Lazy;
use regex::Regex;

static BLOCK_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid regex"));
static LINE_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*//.*$").expect("valid regex"));
static REQUIRE_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\brequire\s*\(\s*['"]([^'"]+)['"]\s*\)"#).expect("valid regex")
});

/// Drops block comments and whole-line comments.
pub(crate) fn strip_comments(contents: &str) -> String {
    let without_blocks = BLOCK_COMMENT.replace_all(contents, "");
    LINE_COMMENT.replace_all(&without_blocks, "").into_owned()
}

/// Specifiers of every `require('x')` call.
pub(crate) fn require_calls(contents: &str) -> impl Iterator<Item = String> + '_ {
    REQUIRE_CALL
        .captures_iter(contents)
        .map(|caps| caps[1].to_string())
}

/// Keeps the first occurrence of each specifier.
pub(crate) fn dedupe(specifiers: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    specifiers
        .into_iter()
        .filter(|s| seen.insert(s.clone()))
        .collect()
}
