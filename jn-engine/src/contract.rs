//! Plugin Contract (C4): the argv/stdio shape every plugin executable must
//! honor, and the two process-level operations layered on top of it —
//! self-description (`--jn-meta`) and exit/signal interpretation. Grounded
//! in the subprocess plugin host pattern (`std::process::Command`, captured
//! stdio, JSON over the wire) rather than the teacher's own `dlopen`-based
//! plugin loader, which this substrate replaces with a process boundary.

use std::path::Path;
use std::process::Stdio;

use jn_core::{Mode, PluginMetadata};
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::error::EngineError;

/// Flag a plugin recognizes in place of a mode, returning its metadata on
/// stdout and exiting 0 (spec.md §6.3).
pub const META_FLAG: &str = "--jn-meta";

/// SIGPIPE, the signal whose receipt by an upstream stage is not by itself
/// a failure (spec.md §4.6).
pub const SIGPIPE: i32 = 13;

pub fn mode_flag(mode: Mode) -> String {
    format!("--mode={}", mode.as_str())
}

/// Invoke a candidate executable with `--jn-meta` and parse its stdout as
/// `PluginMetadata` (spec.md §6.3, "Self-description"). Used by discovery
/// when no embedded manifest was found and `--strict-discovery` is off.
pub async fn self_describe(path: &Path) -> Result<PluginMetadata, EngineError> {
    let output = Command::new(path)
        .arg(META_FLAG)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| EngineError::Config(format!("{}: failed to spawn for --jn-meta: {e}", path.display())))?;

    if !output.status.success() {
        let stderr_tail = tail(&output.stderr, 2048);
        return Err(EngineError::Config(format!(
            "{}: --jn-meta exited {:?}: {}",
            path.display(),
            output.status.code(),
            stderr_tail
        )));
    }

    serde_json::from_slice(&output.stdout)
        .map_err(|e| EngineError::Config(format!("{}: malformed --jn-meta output: {e}", path.display())))
}

fn tail(bytes: &[u8], max: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() > max {
        text[text.len() - max..].to_string()
    } else {
        text.to_string()
    }
}

/// Read up to `limit` bytes from a stream and decode lossily, for error
/// messages attached to `CoreError::StageFailure`.
pub async fn read_stderr_tail(mut stderr: tokio::process::ChildStderr, limit: usize) -> String {
    let mut buf = Vec::new();
    let _ = stderr.read_to_end(&mut buf).await;
    if buf.len() > limit {
        buf.drain(0..buf.len() - limit);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Whether a signal termination on a non-final stage should be treated as
/// success rather than `CoreError::StageFailure` (spec.md §4.6, "early
/// termination"): a downstream stage that exits early (e.g. a `head`-style
/// limit) closes its read end, and the upstream writer receives SIGPIPE as
/// the expected consequence, not a bug.
pub fn signal_is_benign_upstream_exit(signal: i32, is_final_stage: bool) -> bool {
    signal == SIGPIPE && !is_final_stage
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigpipe_on_non_final_stage_is_benign() {
        assert!(signal_is_benign_upstream_exit(SIGPIPE, false));
        assert!(!signal_is_benign_upstream_exit(SIGPIPE, true));
        assert!(!signal_is_benign_upstream_exit(9, false));
    }
}
