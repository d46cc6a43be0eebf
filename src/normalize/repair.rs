use crate::{error::ContentError, quiz::BlankItem};
use serde::Serialize;
use serde_json::Value;

/// How the item list was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Recovery {
    Intact,
    /// Parsed only after the repair heuristic; items may be missing.
    Repaired,
}

#[derive(Debug, Clone)]
pub struct ParsedItems {
    pub items: Vec<BlankItem>,
    pub recovery: Recovery,
}

/// Why one parse attempt failed.
enum Failure {
    /// Not valid JSON; worth a repair attempt.
    Syntax(String),
    /// Valid JSON that is not an array of item objects.
    Shape(String),
}

/// Parse the sanitized response into items, with a single repair attempt.
///
/// `raw` is only carried into the error for diagnostics.
pub fn parse_items(cleaned: &str, raw: &str) -> Result<ParsedItems, ContentError> {
    let first_err = match try_parse(cleaned) {
        Ok(items) => {
            return Ok(ParsedItems {
                items,
                recovery: Recovery::Intact,
            });
        }
        Err(Failure::Shape(reason)) => return Err(unprocessable(raw, reason)),
        Err(Failure::Syntax(e)) => e,
    };

    let repaired = repair(cleaned);
    if repaired == cleaned {
        return Err(malformed(cleaned, raw, first_err));
    }

    match try_parse(&repaired) {
        Ok(items) => Ok(ParsedItems {
            items,
            recovery: Recovery::Repaired,
        }),
        Err(Failure::Shape(reason)) => Err(unprocessable(raw, reason)),
        Err(Failure::Syntax(second_err)) => Err(malformed(
            cleaned,
            raw,
            format!("{first_err}; after repair: {second_err}"),
        )),
    }
}

/// Close whatever a truncated array left open.
///
/// Input that does not start with `[` only gets a closing bracket appended
/// when it lacks one.
pub fn repair(cleaned: &str) -> String {
    let trimmed = cleaned.trim_end();

    if !trimmed.starts_with('[') {
        return if trimmed.ends_with(']') {
            trimmed.to_string()
        } else {
            format!("{trimmed}]")
        };
    }

    let mut closers = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in trimmed.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' => closers.push(']'),
            '{' => closers.push('}'),
            ']' | '}' => {
                closers.pop();
            }
            _ => {}
        }
    }

    let mut out = trimmed.to_string();
    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    while out.ends_with(',') || out.ends_with(' ') {
        out.pop();
    }
    out.extend(closers.iter().rev());
    out
}

fn try_parse(s: &str) -> Result<Vec<BlankItem>, Failure> {
    let value: Value = serde_json::from_str(s).map_err(|e| Failure::Syntax(e.to_string()))?;
    let Value::Array(values) = value else {
        return Err(Failure::Shape(format!(
            "expected a JSON array of items, found {}",
            kind(&value)
        )));
    };
    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            let found = kind(&v);
            BlankItem::from_value(v)
                .ok_or_else(|| Failure::Shape(format!("item {i} is {found}, not an object")))
        })
        .collect()
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn malformed(cleaned: &str, raw: &str, reason: String) -> ContentError {
    ContentError::MalformedContent {
        cleaned: cleaned.to_string(),
        raw: raw.to_string(),
        reason,
    }
}

fn unprocessable(raw: &str, reason: String) -> ContentError {
    ContentError::UnprocessableContent {
        raw: raw.to_string(),
        reason,
    }
}
