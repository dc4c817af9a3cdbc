//! Defensive parsing of oracle replies
//!
//! Replies are free-form text. Parsers accept a handful of shapes and return `None`
//! for anything else, leaving the caller to fall back.

use serde_json::Value;

/// Keys an object-shaped ranking reply may hold its list under
const RANKING_KEYS: &[&str] = &["ranking", "tools", "ids", "order", "result"];

/// Keys an object-shaped similarity reply may hold its answer under
const SIMILAR_KEYS: &[&str] = &["intent", "match", "most_similar", "result"];

/// Strip a surrounding markdown code fence, if any
fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g., "json") on the opening line
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn unquote(token: &str) -> &str {
    token
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
        .trim()
}

/// Strip one leading list marker: "-" or "*" or "12." or "3)", each followed by whitespace
fn strip_list_marker(token: &str) -> &str {
    let token = token.trim();
    let digits = token.len() - token.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let rest = if digits > 0 {
        token[digits..].strip_prefix(['.', ')'])
    } else {
        token.strip_prefix(['-', '*'])
    };
    match rest {
        Some(rest) if rest.starts_with(char::is_whitespace) => rest.trim_start(),
        _ => token,
    }
}

fn clean_token(token: &str) -> &str {
    unquote(strip_list_marker(token))
}

fn strings_from_array(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(map) => map
                .get("id")
                .or_else(|| map.get("name"))
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse a ranking reply into an ordered list of identifiers.
///
/// Accepts a JSON array (of strings, or objects with `id`/`name`), a JSON object
/// holding such an array, either of those inside a code fence or embedded in prose,
/// or a comma/newline separated list. Returns `None` when nothing usable is found.
pub fn parse_ranking(reply: &str) -> Option<Vec<String>> {
    let body = strip_fence(reply);
    if body.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return ranking_from_json(&value);
    }

    // JSON array embedded in surrounding prose
    if let (Some(start), Some(end)) = (body.find('['), body.rfind(']'))
        && start < end
        && let Ok(value) = serde_json::from_str::<Value>(&body[start..=end])
    {
        return ranking_from_json(&value);
    }

    // Plain list; reject anything that reads like a sentence
    let ids: Vec<String> = body
        .split(|c: char| c == ',' || c == '\n')
        .map(clean_token)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    if ids.is_empty() || ids.iter().any(|t| t.contains(char::is_whitespace)) {
        return None;
    }
    Some(ids)
}

fn ranking_from_json(value: &Value) -> Option<Vec<String>> {
    let ids = match value {
        Value::Array(items) => strings_from_array(items),
        Value::Object(map) => RANKING_KEYS
            .iter()
            .find_map(|k| map.get(*k).and_then(|v| v.as_array()))
            .map(|items| strings_from_array(items))?,
        _ => return None,
    };
    if ids.is_empty() { None } else { Some(ids) }
}

/// Parse a similarity reply into one of the known intents.
///
/// The reply must name a known intent (exactly, or ignoring case and surrounding
/// quotes), optionally wrapped in JSON. "none", empty replies and unknown answers
/// yield `None`.
pub fn parse_similar(reply: &str, known: &[String]) -> Option<String> {
    let body = strip_fence(reply);

    match serde_json::from_str::<Value>(body) {
        Ok(Value::String(s)) => match_known(&s, known),
        Ok(Value::Object(map)) => SIMILAR_KEYS
            .iter()
            .find_map(|k| map.get(*k).and_then(|v| v.as_str()))
            .and_then(|s| match_known(s, known)),
        Ok(Value::Null) => None,
        // The whole body first, so intents like "5 most recent emails" keep their digits
        _ => match_known(unquote(body), known).or_else(|| match_known(clean_token(body), known)),
    }
}

fn match_known(candidate: &str, known: &[String]) -> Option<String> {
    let candidate = candidate.trim();
    if candidate.is_empty() || candidate.eq_ignore_ascii_case("none") || candidate.eq_ignore_ascii_case("null") {
        return None;
    }

    known
        .iter()
        .find(|k| k.as_str() == candidate)
        .or_else(|| known.iter().find(|k| k.trim().eq_ignore_ascii_case(candidate)))
        .cloned()
}
