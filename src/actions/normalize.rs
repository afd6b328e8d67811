//! Response Validator/Normalizer.
//!
//! Backends wrap their action list in prose, markdown fences, or cut it off
//! mid-stream. Extraction finds the first well-formed JSON array/object that
//! carries actions; each element is then validated on its own so one bad
//! element never sinks the rest of the response.
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::actions::types::{Action, NormalizedPoint, Target};
use crate::errors::{PilotError, PilotResult};

/// Object keys that may carry the action kind.
const KIND_KEYS: [&str; 3] = ["type", "operation", "action"];
/// Envelope keys wrapping an action array.
const ENVELOPE_KEYS: [&str; 2] = ["actions", "operations"];

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").expect("fence regex is valid")
    })
}

/// Parse raw backend text into an ordered action list.
///
/// Fails with `PilotError::Parse` when no action container can be found or
/// when every element of it is invalid.
pub fn normalize(raw: &str) -> PilotResult<Vec<Action>> {
    let container = extract_container(raw)
        .ok_or_else(|| PilotError::Parse(format!("no JSON action list in response ({} chars)", raw.len())))?;

    let items = container_items(container);
    let total = items.len();
    let mut actions = Vec::with_capacity(total);

    for (idx, item) in items.into_iter().enumerate() {
        match parse_action(&item) {
            Ok(action) => actions.push(action),
            Err(reason) => {
                tracing::warn!(index = idx, reason = %reason, element = %item, "dropping action");
            }
        }
    }

    if actions.is_empty() {
        return Err(PilotError::Parse(format!("none of {total} response elements is a valid action")));
    }

    tracing::debug!(valid = actions.len(), total, "response normalized");
    Ok(actions)
}

/// Locate the JSON value holding the actions: fenced blocks first, then the
/// whole text. An array cut off mid-stream yields its complete leading elements.
pub fn extract_container(raw: &str) -> Option<Value> {
    for caps in fence_regex().captures_iter(raw) {
        if let Some(body) = caps.get(1) {
            if let Some(v) = first_action_container(body.as_str()) {
                return Some(v);
            }
        }
    }
    first_action_container(raw)
}

fn first_action_container(text: &str) -> Option<Value> {
    text.char_indices()
        .filter(|&(_, c)| c == '[' || c == '{')
        .find_map(|(i, c)| {
            let mut stream = serde_json::Deserializer::from_str(&text[i..]).into_iter::<Value>();
            match stream.next() {
                Some(Ok(v)) if is_action_container(&v) => Some(v),
                Some(Err(e)) if e.is_eof() && c == '[' => salvage_truncated_array(&text[i + 1..]),
                _ => None,
            }
        })
}

fn is_action_container(v: &Value) -> bool {
    match v {
        Value::Array(items) => items.iter().any(Value::is_object),
        Value::Object(obj) => {
            ENVELOPE_KEYS.iter().any(|k| obj.get(*k).map_or(false, Value::is_array))
                || kind_of(obj).is_some()
        }
        _ => false,
    }
}

/// Collect the complete elements following an opening bracket whose array
/// never closes.
fn salvage_truncated_array(mut rest: &str) -> Option<Value> {
    let mut items = Vec::new();
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
        if rest.is_empty() || rest.starts_with(']') {
            break;
        }
        let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
        match stream.next() {
            Some(Ok(v)) => {
                let consumed = stream.byte_offset();
                items.push(v);
                rest = &rest[consumed..];
            }
            _ => break,
        }
    }
    if !items.iter().any(Value::is_object) {
        return None;
    }
    tracing::warn!(recovered = items.len(), "response array was truncated, salvaged leading elements");
    Some(Value::Array(items))
}

fn container_items(container: Value) -> Vec<Value> {
    match container {
        Value::Array(items) => items,
        Value::Object(mut obj) => {
            for key in ENVELOPE_KEYS {
                if let Some(Value::Array(items)) = obj.remove(key) {
                    return items;
                }
            }
            vec![Value::Object(obj)]
        }
        _ => Vec::new(),
    }
}

fn kind_of(obj: &Map<String, Value>) -> Option<String> {
    KIND_KEYS
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(|s| s.trim().to_lowercase())
}

/// Validate one element. `Err` carries the reason it was dropped.
fn parse_action(item: &Value) -> Result<Action, String> {
    let obj = item.as_object().ok_or_else(|| "element is not an object".to_string())?;
    let kind = kind_of(obj).ok_or_else(|| "missing action type".to_string())?;

    if let Some(thought) = obj.get("thought").and_then(Value::as_str) {
        tracing::debug!(kind = %kind, thought = %thought, "backend reasoning");
    }

    match kind.as_str() {
        "click" => parse_click(obj),
        "write" | "type_text" => Ok(Action::Write {
            text: text_field(obj, &["text", "content"]).ok_or("write without text")?,
        }),
        "press" | "hotkey" | "key" => parse_press(obj),
        "search" => Ok(Action::Search {
            text: text_field(obj, &["text", "content", "query"]).ok_or("search without text")?,
        }),
        "done" | "finish" => Ok(Action::Done {
            summary: text_field(obj, &["summary", "text"]),
        }),
        other => Err(format!("unknown action type '{other}'")),
    }
}

fn parse_click(obj: &Map<String, Value>) -> Result<Action, String> {
    match (obj.get("x"), obj.get("y")) {
        (Some(x), Some(y)) => {
            let x = coordinate(x).ok_or("click x is not a number")?;
            let y = coordinate(y).ok_or("click y is not a number")?;
            let point = NormalizedPoint::clamped_from(x, y);
            if point.clamped {
                tracing::warn!(x, y, clamped_x = point.x, clamped_y = point.y, "click coordinates out of range, clamped");
            }
            Ok(Action::Click {
                target: Target::Point(point),
            })
        }
        (Some(_), None) | (None, Some(_)) => Err("click needs both x and y".into()),
        (None, None) => {
            let label = ["label", "element", "text"]
                .iter()
                .find_map(|k| match obj.get(*k) {
                    Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
                    Some(Value::Number(n)) => Some(n.to_string()),
                    _ => None,
                })
                .ok_or("click without coordinates or label")?;
            Ok(Action::Click {
                target: Target::Label { label },
            })
        }
    }
}

fn parse_press(obj: &Map<String, Value>) -> Result<Action, String> {
    let keys: Vec<String> = match obj.get("keys").or_else(|| obj.get("key")) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|k| k.as_str().map(|s| s.trim().to_string()))
            .collect::<Option<Vec<_>>>()
            .ok_or("press keys must be strings")?,
        Some(Value::String(combo)) => split_combo(combo),
        _ => return Err("press without keys".into()),
    };
    let keys: Vec<String> = keys.into_iter().filter(|k| !k.is_empty()).collect();
    if keys.is_empty() {
        return Err("press with empty key list".into());
    }
    Ok(Action::Press { keys })
}

/// Splits `"ctrl+shift+s"` on `+`. A `+` where a key is expected is the
/// plus key itself, so `"ctrl++"` is `["ctrl", "+"]` and `"+"` is `["+"]`.
fn split_combo(combo: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let mut current = String::new();
    for ch in combo.trim().chars() {
        if ch == '+' && !current.trim().is_empty() {
            keys.push(current.trim().to_string());
            current.clear();
        } else if ch == '+' {
            keys.push("+".to_string());
            current.clear();
        } else {
            current.push(ch);
        }
    }
    if !current.trim().is_empty() {
        keys.push(current.trim().to_string());
    }
    keys
}

/// A number, or a numeric string such as `"0.50"`. Non-finite values are rejected.
fn coordinate(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}
