//! Shared plumbing for the fixture plugin binaries under `src/bin/`: every
//! fixture answers `--jn-meta` the same way before looking at its mode flag,
//! matching the self-description half of the wire contract every real
//! plugin must also implement.

use std::io::Write;

/// If `--jn-meta` was passed, print `metadata` to stdout and return `true`
/// so the caller's `main` can exit immediately (spec.md §6.3).
pub fn maybe_self_describe(metadata: &serde_json::Value) -> bool {
    if std::env::args().any(|a| a == "--jn-meta") {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let _ = writeln!(lock, "{metadata}");
        true
    } else {
        false
    }
}

/// The `--mode=<mode>` argument's value, or `None` if not present.
pub fn mode_arg() -> Option<String> {
    std::env::args().find_map(|a| a.strip_prefix("--mode=").map(str::to_string))
}

/// Value of a `--name=value` style flag.
pub fn flag(name: &str) -> Option<String> {
    let prefix = format!("--{name}=");
    std::env::args().find_map(|a| a.strip_prefix(&prefix).map(str::to_string))
}

/// First positional (non `--flag`) argument, typically the source/sink
/// path for the head stage of a pipeline.
pub fn first_positional() -> Option<String> {
    std::env::args().skip(1).find(|a| !a.starts_with("--"))
}
