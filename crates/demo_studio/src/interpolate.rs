//! Variable interpolation over the raw screenplay document.
//!
//! Runs before validation. `{{name}}` tokens are substituted from the
//! resolved variable map; a string that is exactly one token keeps the
//! variable's type, otherwise matches are stringified in place.

use crate::error::ValidationIssue;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").unwrap_or_else(|_| unreachable!())
    })
}

fn full_token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}$").unwrap_or_else(|_| unreachable!())
    })
}

fn value_to_token_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Resolve variable-to-variable references within the bindings map.
///
/// Bindings may reference each other; cycles and unknown names are errors.
pub fn resolve_variables(
    variables: &BTreeMap<String, Value>,
) -> Result<BTreeMap<String, Value>, ValidationIssue> {
    fn resolve(
        name: &str,
        variables: &BTreeMap<String, Value>,
        resolved: &mut BTreeMap<String, Value>,
        resolving: &mut Vec<String>,
    ) -> Result<Value, ValidationIssue> {
        if let Some(value) = resolved.get(name) {
            return Ok(value.clone());
        }
        if resolving.iter().any(|pending| pending == name) {
            return Err(ValidationIssue::new(
                format!("variables.{name}"),
                "cyclic variable reference",
            ));
        }
        let Some(value) = variables.get(name) else {
            return Err(ValidationIssue::new(
                format!("variables.{name}"),
                "unresolved variable reference",
            ));
        };

        resolving.push(name.to_string());
        let value = if let Value::String(text) = value {
            if let Some(capture) = full_token_pattern().captures(text) {
                let token = &capture[1];
                resolve(token, variables, resolved, resolving)?
            } else {
                let mut out = String::new();
                let mut last = 0;
                for capture in token_pattern().captures_iter(text) {
                    let whole = capture.get(0).ok_or_else(|| {
                        ValidationIssue::new(format!("variables.{name}"), "malformed token")
                    })?;
                    out.push_str(&text[last..whole.start()]);
                    let inner = resolve(&capture[1], variables, resolved, resolving)?;
                    out.push_str(&value_to_token_string(&inner));
                    last = whole.end();
                }
                out.push_str(&text[last..]);
                Value::String(out)
            }
        } else {
            value.clone()
        };
        resolving.pop();
        resolved.insert(name.to_string(), value.clone());
        Ok(value)
    }

    let mut resolved = BTreeMap::new();
    let mut resolving = Vec::new();
    for name in variables.keys() {
        resolve(name, variables, &mut resolved, &mut resolving)?;
    }
    Ok(resolved)
}

/// Substitute `{{name}}` tokens throughout a document tree.
pub fn interpolate(
    data: &Value,
    variables: &BTreeMap<String, Value>,
    path: &str,
) -> Result<Value, ValidationIssue> {
    match data {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                out.insert(
                    key.clone(),
                    interpolate(value, variables, &format!("{path}.{key}"))?,
                );
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                out.push(interpolate(item, variables, &format!("{path}[{index}]"))?);
            }
            Ok(Value::Array(out))
        }
        Value::String(text) => {
            if let Some(capture) = full_token_pattern().captures(text) {
                let token = &capture[1];
                return variables.get(token).cloned().ok_or_else(|| {
                    ValidationIssue::new(path, format!("unresolved variable '{token}'"))
                });
            }
            let mut out = String::new();
            let mut last = 0;
            for capture in token_pattern().captures_iter(text) {
                let whole = capture
                    .get(0)
                    .ok_or_else(|| ValidationIssue::new(path, "malformed token"))?;
                let token = &capture[1];
                let Some(value) = variables.get(token) else {
                    return Err(ValidationIssue::new(
                        path,
                        format!("unresolved variable '{token}'"),
                    ));
                };
                out.push_str(&text[last..whole.start()]);
                out.push_str(&value_to_token_string(value));
                last = whole.end();
            }
            out.push_str(&text[last..]);
            Ok(Value::String(out))
        }
        other => Ok(other.clone()),
    }
}
