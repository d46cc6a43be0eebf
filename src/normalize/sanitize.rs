//! Cleanup of raw model output before it is handed to the JSON parser.
//!
//! Every step is idempotent on already-clean input, so running
//! [`sanitize`] on its own output is a no-op.

use regex::Regex;
use std::sync::LazyLock;

static FENCE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```json\s*").expect("valid fence regex"));
static FENCE_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*```$").expect("valid fence regex"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// A `"text": "..."` member. Whitespace around the colon is optional and the
/// body honours backslash escapes. Single-quoted keys are not recognised.
static TEXT_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)"text"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("valid text value regex")
});

/// Reduce a raw model response to the substring believed to hold one JSON array.
///
/// Never fails; worst case the result does not parse downstream.
pub fn sanitize(raw: &str) -> String {
    let s = strip_stray_controls(raw);
    let s = s.trim();
    let s = FENCE_OPEN.replace(s, "");
    let s = FENCE_CLOSE.replace(&s, "");
    let s = collapse_outside_text_values(&s);
    let s = strip_control_chars(&s);
    isolate_array(&s).to_string()
}

/// Collapse whitespace runs to one space everywhere except inside `text`
/// values, whose line breaks become the two-character escape `\n`.
fn collapse_outside_text_values(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last = 0;

    for caps in TEXT_VALUE.captures_iter(s) {
        let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&WHITESPACE.replace_all(&s[last..whole.start()], " "));
        out.push_str("\"text\": \"");
        out.push_str(&escape_line_breaks(body.as_str()));
        out.push('"');
        last = whole.end();
    }

    out.push_str(&WHITESPACE.replace_all(&s[last..], " "));
    out
}

fn escape_line_breaks(body: &str) -> String {
    body.replace("\r\n", "\\n")
        .replace(['\n', '\r'], "\\n")
        .replace('\t', " ")
}

/// C0 controls that are not whitespace would otherwise block the trim and the
/// fence match, or split a whitespace run in two.
fn strip_stray_controls(s: &str) -> String {
    s.chars()
        .filter(|&ch| ch >= ' ' || matches!(ch, '\t' | '\n' | '\r' | '\u{000B}' | '\u{000C}'))
        .collect()
}

fn strip_control_chars(s: &str) -> String {
    s.chars().filter(|&ch| ch == '\n' || ch as u32 >= 32).collect()
}

/// First `[` through last `]`, inclusive; the input unchanged when there is no such pair.
fn isolate_array(s: &str) -> &str {
    match (s.find('['), s.rfind(']')) {
        (Some(start), Some(end)) if start <= end => &s[start..=end],
        _ => s,
    }
}
