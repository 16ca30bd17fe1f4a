//! Profile domain types and the pure parts of the Profile Resolver (C2):
//! deep merge and environment-variable substitution. Filesystem search and
//! caching are infrastructure concerns and live in `jn-engine`.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::CoreError;

/// Profile kind, inferred from the top-level directory under `profiles/`
/// (spec.md §3.1). Free-form rather than a closed enum: new plugin roles
/// introduce new kinds without a core change.
pub type ProfileKind = String;

/// A fully resolved profile: merged configuration plus the credential pairs
/// extracted from it after substitution.
#[derive(Debug, Clone)]
pub struct Profile {
    pub namespace: String,
    pub name: String,
    pub kind: ProfileKind,
    pub merged: Value,
}

impl Profile {
    /// Ordered `defaults` parameters declared by the profile, if any.
    pub fn defaults(&self) -> Vec<(String, String)> {
        let Some(Value::Object(defaults)) = self.merged.get("defaults") else {
            return Vec::new();
        };
        defaults
            .iter()
            .filter_map(|(k, v)| value_as_param_string(v).map(|s| (k.clone(), s)))
            .collect()
    }
}

fn value_as_param_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Deep-merge `overlay` onto `base`: objects merge key by key recursively,
/// scalars and arrays are replaced outright by the overlay (spec.md §4.2,
/// "Merge rule").
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (k, v) in overlay_map {
                let merged = match base_map.remove(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => v,
                };
                base_map.insert(k, merged);
            }
            Value::Object(base_map)
        }
        // Arrays and scalars: overlay replaces base outright.
        (_, overlay) => overlay,
    }
}

/// Left fold of a chain of documents, ancestor-first, leaf last (spec.md §9,
/// "Cyclic references & profile inheritance" — the merge is deliberately
/// `(a ⊕ b) ⊕ c`, never `a ⊕ (b ⊕ c)`).
pub fn merge_chain(docs: impl IntoIterator<Item = Value>) -> Value {
    let mut iter = docs.into_iter();
    let mut acc = iter.next().unwrap_or(Value::Object(Default::default()));
    for doc in iter {
        acc = deep_merge(acc, doc);
    }
    acc
}

/// Expand `${VAR}` / `${VAR:-default}` / `$$` in every string value of a
/// JSON document, using `lookup` to resolve variable names (spec.md §4.2,
/// "Environment substitution"). Runs single-pass: defaults are themselves
/// expanded, but a variable can never refer to another profile key, so no
/// cycle detection is required.
pub fn substitute_env(value: Value, lookup: &impl Fn(&str) -> Option<String>) -> Result<Value, CoreError> {
    match value {
        Value::String(s) => Ok(Value::String(expand_string(&s, lookup)?)),
        Value::Array(items) => Ok(Value::Array(
            items
                .into_iter()
                .map(|v| substitute_env(v, lookup))
                .collect::<Result<_, _>>()?,
        )),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k, substitute_env(v, lookup)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other),
    }
}

/// Expand one string's `${...}` / `$$` occurrences.
pub fn expand_string(s: &str, lookup: &impl Fn(&str) -> Option<String>) -> Result<String, CoreError> {
    let mut out = String::with_capacity(s.len());
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'$' {
            out.push('$');
            i += 2;
            continue;
        }
        if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            let Some(end) = s[i..].find('}') else {
                out.push_str(&s[i..]);
                break;
            };
            let inner = &s[i + 2..i + end];
            let expanded = expand_var(inner, lookup)?;
            out.push_str(&expanded);
            i += end + 1;
            continue;
        }
        // Advance by one full UTF-8 char, not one byte.
        let ch_len = utf8_char_len(bytes[i]);
        out.push_str(&s[i..i + ch_len]);
        i += ch_len;
    }
    Ok(out)
}

fn utf8_char_len(lead: u8) -> usize {
    if lead & 0x80 == 0 {
        1
    } else if lead & 0xE0 == 0xC0 {
        2
    } else if lead & 0xF0 == 0xE0 {
        3
    } else {
        4
    }
}

fn expand_var(inner: &str, lookup: &impl Fn(&str) -> Option<String>) -> Result<String, CoreError> {
    if let Some((name, default)) = inner.split_once(":-") {
        match lookup(name) {
            Some(v) => Ok(v),
            None => expand_string(default, lookup),
        }
    } else {
        lookup(inner).ok_or_else(|| CoreError::VarUnset(inner.to_string()))
    }
}

/// Convenience `lookup` built from a plain map, for tests and for callers
/// that already snapshotted `std::env::vars()`.
pub fn env_lookup(env: &HashMap<String, String>) -> impl Fn(&str) -> Option<String> + '_ {
    move |name| env.get(name).cloned()
}
