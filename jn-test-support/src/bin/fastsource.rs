//! Fixture protocol plugin that emits NDJSON records as fast as it can,
//! used to drive the early-termination scenario (spec.md §8.2, S2): a
//! downstream stage that stops reading early should make this stage exit
//! via SIGPIPE, not be treated as a pipeline failure.

use std::io::Write;

fn metadata() -> serde_json::Value {
    serde_json::json!({
        "name": "jn-fixture-fastsource",
        "version": "0.1.0",
        "role": "protocol",
        "modes": ["read"],
        "matches": ["^fastsource$"],
        "config_params": ["count"],
    })
}

fn main() {
    let meta = metadata();
    if jn_test_support::maybe_self_describe(&meta) {
        return;
    }

    let count: u64 = jn_test_support::flag("count").and_then(|s| s.parse().ok()).unwrap_or(1_000_000);

    let stdout = std::io::stdout();
    let mut out = std::io::BufWriter::new(stdout.lock());
    for i in 0..count {
        if writeln!(out, "{{\"seq\":{i}}}").is_err() {
            // Downstream closed its read end; exit cleanly rather than
            // panicking on a broken pipe.
            return;
        }
    }
}
