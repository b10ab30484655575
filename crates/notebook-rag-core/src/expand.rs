//! Synonym-based query expansion.
//!
//! Widens lexical recall for everyday note-taking vocabulary: "find the
//! problem" also matches notes that say "search", "locate", "issue", "bug".
//! Each recognised token contributes at most [`MAX_SYNONYMS_PER_TERM`] extra
//! terms so long queries cannot balloon.

use std::collections::HashSet;

/// Upper bound on synonyms appended per query token.
pub const MAX_SYNONYMS_PER_TERM: usize = 2;

/// Fixed synonym table. Only the first [`MAX_SYNONYMS_PER_TERM`] entries of
/// each list are ever used; the rest document intent.
const SYNONYMS: &[(&str, &[&str])] = &[
    ("find", &["search", "locate", "discover"]),
    ("search", &["find", "lookup", "query"]),
    ("problem", &["issue", "bug", "error"]),
    ("issue", &["problem", "bug", "ticket"]),
    ("bug", &["defect", "issue", "error"]),
    ("error", &["failure", "exception", "fault"]),
    ("fix", &["repair", "resolve", "patch"]),
    ("idea", &["concept", "thought", "plan"]),
    ("plan", &["roadmap", "strategy", "schedule"]),
    ("meeting", &["call", "sync", "discussion"]),
    ("todo", &["task", "action", "checklist"]),
    ("task", &["todo", "action", "job"]),
    ("note", &["memo", "entry", "record"]),
    ("summary", &["overview", "recap", "digest"]),
    ("learn", &["study", "understand", "practice"]),
    ("fast", &["quick", "performance", "speed"]),
    ("slow", &["latency", "performance", "lag"]),
    ("create", &["make", "build", "add"]),
    ("delete", &["remove", "erase", "drop"]),
    ("change", &["modify", "update", "edit"]),
    ("update", &["change", "modify", "refresh"]),
    ("start", &["begin", "launch", "initialize"]),
    ("stop", &["end", "halt", "terminate"]),
    ("config", &["configuration", "settings", "setup"]),
    ("setup", &["install", "configure", "config"]),
    ("doc", &["documentation", "guide", "manual"]),
    ("docs", &["documentation", "guide", "manual"]),
    ("money", &["budget", "finance", "cost"]),
    ("health", &["fitness", "wellness", "medical"]),
    ("recipe", &["cooking", "meal", "dish"]),
    ("book", &["reading", "novel", "literature"]),
    ("travel", &["trip", "journey", "vacation"]),
];

/// Synonyms for an already lower-cased token, capped at
/// [`MAX_SYNONYMS_PER_TERM`].
pub fn synonyms_for(token: &str) -> &'static [&'static str] {
    SYNONYMS
        .iter()
        .find(|(term, _)| *term == token)
        .map(|(_, syns)| &syns[..syns.len().min(MAX_SYNONYMS_PER_TERM)])
        .unwrap_or(&[])
}

/// Expand a query with synonyms.
///
/// Tokens are lower-cased and deduplicated (first occurrence wins); each
/// token is followed by the synonyms it contributes. An empty or
/// whitespace-only query expands to an empty string.
///
/// ```rust
/// use notebook_rag_core::expand::expand_query;
///
/// let expanded = expand_query("Find the problem");
/// for term in ["find", "the", "problem", "search", "locate", "issue", "bug"] {
///     assert!(expanded.split(' ').any(|t| t == term));
/// }
/// ```
pub fn expand_query(query: &str) -> String {
    let mut seen: HashSet<String> = HashSet::new();
    let mut terms: Vec<String> = Vec::new();

    for word in query.split_whitespace() {
        let token = word.to_lowercase();
        let synonyms = synonyms_for(&token);
        if seen.insert(token.clone()) {
            terms.push(token);
        }
        for syn in synonyms {
            if seen.insert((*syn).to_string()) {
                terms.push((*syn).to_string());
            }
        }
    }

    terms.join(" ")
}
