//! Fixture filter plugin: role=filter, mode=[filter], matches [`.*`].
//! Evaluates the restricted predicate grammar `jn_core::pipeline` emits:
//! `.key op value` clauses, grouped `(... or ...)` within a repeated key,
//! joined ` and ` across distinct keys. Not a general jq implementation.

use std::io::{BufRead, Write};

use serde_json::Value;

fn metadata() -> serde_json::Value {
    serde_json::json!({
        "name": "jn-fixture-filter",
        "version": "0.1.0",
        "role": "filter",
        "modes": ["filter"],
        "matches": [".*"],
        "config_params": [],
    })
}

fn main() {
    let meta = metadata();
    if jn_test_support::maybe_self_describe(&meta) {
        return;
    }

    let expr = jn_test_support::flag("expr").unwrap_or_default();
    let clauses = parse_conjunction(&expr);

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for line in stdin.lock().lines().map_while(Result::ok) {
        if line.trim().is_empty() {
            continue;
        }
        let Ok(record) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        if clauses.iter().all(|group| group.iter().any(|c| c.matches(&record))) {
            let _ = writeln!(out, "{line}");
        }
    }
}

struct Clause {
    key: String,
    op: String,
    value: Value,
}

impl Clause {
    fn matches(&self, record: &Value) -> bool {
        let Some(actual) = record.get(&self.key) else {
            return false;
        };
        match self.op.as_str() {
            "==" => actual == &self.value,
            "!=" => actual != &self.value,
            ">" | "<" | ">=" | "<=" => {
                let (Some(a), Some(b)) = (actual.as_f64(), self.value.as_f64()) else {
                    return false;
                };
                match self.op.as_str() {
                    ">" => a > b,
                    "<" => a < b,
                    ">=" => a >= b,
                    "<=" => a <= b,
                    _ => unreachable!(),
                }
            }
            _ => false,
        }
    }
}

/// Top-level ` and `-joined groups; each group is either one clause or a
/// parenthesized ` or `-joined set of clauses.
fn parse_conjunction(expr: &str) -> Vec<Vec<Clause>> {
    if expr.trim().is_empty() {
        return Vec::new();
    }
    split_top_level(expr, " and ")
        .into_iter()
        .map(|term| {
            let term = term.trim();
            if let Some(inner) = term.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
                inner.split(" or ").filter_map(parse_clause).collect()
            } else {
                parse_clause(term).into_iter().collect()
            }
        })
        .collect()
}

fn split_top_level<'a>(expr: &'a str, sep: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    let bytes = expr.as_bytes();
    let mut i = 0;
    while i < expr.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ => {}
        }
        if depth == 0 && expr[i..].starts_with(sep) {
            parts.push(&expr[start..i]);
            i += sep.len();
            start = i;
            continue;
        }
        i += 1;
    }
    parts.push(&expr[start..]);
    parts
}

fn parse_clause(s: &str) -> Option<Clause> {
    let s = s.trim();
    let mut parts = s.splitn(3, ' ');
    let key = parts.next()?.strip_prefix('.')?.to_string();
    let op = parts.next()?.to_string();
    let raw_value = parts.next()?;
    let value = parse_value(raw_value);
    Some(Clause { key, op, value })
}

fn parse_value(raw: &str) -> Value {
    if let Some(inner) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        return Value::String(inner.replace("\\\"", "\"").replace("\\\\", "\\"));
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
