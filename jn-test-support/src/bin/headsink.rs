//! Fixture sink that reads only the first `--count` records from stdin and
//! exits 0, deliberately not draining the rest (spec.md §8.2, S2). The
//! upstream stage(s) then see their writes fail with SIGPIPE, which the
//! executor must classify as a benign early exit rather than a failure.

use std::io::BufRead;

fn metadata() -> serde_json::Value {
    serde_json::json!({
        "name": "jn-fixture-headsink",
        "version": "0.1.0",
        "role": "protocol",
        "modes": ["write"],
        "matches": ["^headsink$"],
        "config_params": ["count"],
    })
}

fn main() {
    let meta = metadata();
    if jn_test_support::maybe_self_describe(&meta) {
        return;
    }

    let count: usize = jn_test_support::flag("count").and_then(|s| s.parse().ok()).unwrap_or(3);

    let stdin = std::io::stdin();
    for (i, line) in stdin.lock().lines().enumerate() {
        if line.is_err() || i + 1 >= count {
            break;
        }
    }
}
