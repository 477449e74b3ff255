//! Completion parsing.
//!
//! Pulls the SQL statement and the final answer out of model completions
//! written in the `Question / SQLQuery / SQLResult / Answer` format.

use regex::Regex;
use std::sync::LazyLock;

// =============================================================================
// Compiled patterns (compiled once, reused across calls)
// =============================================================================

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:[A-Za-z]+[ \t]*\r?\n|[ \t]*\r?\n?)(.*?)```").expect("Invalid fence regex")
});

// Section markers only count at the start of a line, so the same words
// inside a string literal (`LIKE '%Answer: none%'`) are left alone.
static SQL_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*SQL[ \t]*Query[ \t]*:").expect("Invalid marker regex")
});

static SECTION_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*(?:SQL[ \t]*Result|Answer|Question)[ \t]*:")
        .expect("Invalid section regex")
});

static ANSWER_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bAnswer\s*:").expect("Invalid answer regex"));

/// Extract the SQL statement from a generation completion.
///
/// Handles an optional `SQLQuery:` marker, markdown code fences, and any
/// trailing `SQLResult:` / `Answer:` sections the model wrote anyway.
/// Returns `None` when nothing resembling a statement remains.
pub fn extract_sql(completion: &str) -> Option<String> {
    let mut text = completion.trim();

    if let Some(m) = SQL_MARKER.find(text) {
        text = &text[m.end()..];
    }
    if let Some(m) = SECTION_END.find(text) {
        text = &text[..m.start()];
    }

    let unfenced = match CODE_FENCE.captures(text) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or_default(),
        None => text,
    };

    let sql = unfenced
        .trim()
        .trim_matches('`')
        .trim()
        .trim_end_matches(';')
        .trim();

    if sql.is_empty() {
        None
    } else {
        Some(sql.to_string())
    }
}

/// Extract the user-facing answer from a summarization completion.
///
/// Takes the text after the last `Answer:` marker when one is present,
/// otherwise the whole completion.
pub fn extract_answer(completion: &str) -> String {
    let text = completion.trim();
    let answer = match ANSWER_MARKER.find_iter(text).last() {
        Some(m) => &text[m.end()..],
        None => text,
    };
    answer.trim().to_string()
}
