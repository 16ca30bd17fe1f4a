//! Pipeline Executor (C6): spawns every stage as a child process, wires
//! adjacent stages together with real OS pipes so backpressure flows end to
//! end, waits on stages in descending (downstream-first) order so an early
//! exit downstream is observed before its upstream's resulting SIGPIPE is
//! classified, and tears a cancelled pipeline down last-spawned-first.
//! Grounded in the subprocess orchestration of
//! `other_examples/.../plugin-manager.rs` (`Child::kill`, captured stdio)
//! and the SIGINT/SIGTERM future pattern from
//! `other_examples/.../timescale-helr/src/main.rs`.

use std::process::Stdio;
use std::time::Duration;

use jn_core::pipeline::{Pipeline, StageResult, StreamEndpoint};
use jn_core::plugin::Role;
use jn_core::CoreError;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::contract;
use crate::error::EngineError;

/// Grace period between SIGTERM and SIGKILL when tearing down a cancelled
/// pipeline (spec.md §4.6, "Cancellation").
const TERMINATE_GRACE: Duration = Duration::from_secs(3);

struct SpawnedStage {
    name: String,
    role: Role,
    is_final: bool,
    child: Child,
    stderr_task: JoinHandle<String>,
}

/// Run a fully assembled pipeline to completion, or until `cancel` resolves.
pub async fn execute(pipeline: Pipeline, cancel: impl std::future::Future<Output = ()>) -> Result<Vec<StageResult>, EngineError> {
    let mut spawned = spawn_all(&pipeline)?;

    tokio::select! {
        results = wait_all(&mut spawned) => results,
        _ = cancel => {
            warn!("cancellation requested, tearing down pipeline");
            terminate_all(spawned).await;
            Err(CoreError::Cancelled.into())
        }
    }
}

fn spawn_all(pipeline: &Pipeline) -> Result<Vec<SpawnedStage>, EngineError> {
    let n = pipeline.stages.len();
    let mut spawned = Vec::with_capacity(n);
    let mut carried_stdin: Option<Stdio> = None;

    for (i, stage) in pipeline.stages.iter().enumerate() {
        let mut cmd = Command::new(&stage.descriptor.executable_path);
        cmd.args(&stage.descriptor.launch_prefix);
        cmd.args(&stage.argv_extras);
        for (k, v) in &stage.env_extras {
            cmd.env(k, v);
        }

        let stdin_stdio = match carried_stdin.take() {
            Some(s) => s,
            None => endpoint_as_stdin(&stage.stdin_source)?,
        };
        cmd.stdin(stdin_stdio);

        let stdout_is_pipe = matches!(stage.stdout_sink, StreamEndpoint::Pipe);
        cmd.stdout(endpoint_as_stdout(&stage.stdout_sink)?);
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            EngineError::Config(format!("{}: failed to spawn: {e}", stage.descriptor.executable_path))
        })?;

        if stdout_is_pipe {
            let out = child.stdout.take().expect("stdout was requested piped");
            let stdio: Stdio = out
                .try_into()
                .map_err(|e| EngineError::Config(format!("{}: could not chain stdout: {e}", stage.descriptor.name)))?;
            carried_stdin = Some(stdio);
        }

        let stderr = child.stderr.take().expect("stderr always piped");
        let stderr_task = tokio::spawn(contract::read_stderr_tail(stderr, 4096));

        info!(stage = %stage.descriptor.name, role = stage.descriptor.role.as_str(), pid = child.id(), "spawned stage");

        spawned.push(SpawnedStage {
            name: stage.descriptor.name.clone(),
            role: stage.descriptor.role,
            is_final: i == n - 1,
            child,
            stderr_task,
        });
    }

    Ok(spawned)
}

fn endpoint_as_stdin(endpoint: &StreamEndpoint) -> Result<Stdio, EngineError> {
    Ok(match endpoint {
        StreamEndpoint::Inherit => Stdio::inherit(),
        StreamEndpoint::Pipe => Stdio::piped(),
        StreamEndpoint::File(path) => Stdio::from(std::fs::File::open(path)?),
    })
}

fn endpoint_as_stdout(endpoint: &StreamEndpoint) -> Result<Stdio, EngineError> {
    Ok(match endpoint {
        StreamEndpoint::Inherit => Stdio::inherit(),
        StreamEndpoint::Pipe => Stdio::piped(),
        StreamEndpoint::File(path) => Stdio::from(std::fs::File::create(path)?),
    })
}

/// Wait on every stage in descending (downstream-first) index order, so a
/// downstream stage's own exit status is known before an upstream SIGPIPE is
/// judged benign or not (spec.md §4.6, "early termination").
async fn wait_all(spawned: &mut [SpawnedStage]) -> Result<Vec<StageResult>, EngineError> {
    let n = spawned.len();
    let mut results: Vec<Option<StageResult>> = (0..n).map(|_| None).collect();

    for i in (0..n).rev() {
        let stage = &mut spawned[i];
        let status = stage.child.wait().await?;
        let stderr_tail = (&mut stage.stderr_task).await.unwrap_or_default();

        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal: Option<i32> = None;

        let benign = signal.is_some_and(|s| contract::signal_is_benign_upstream_exit(s, stage.is_final));
        let exit_code = if benign { Some(0) } else { status.code() };

        results[i] = Some(StageResult {
            plugin_name: stage.name.clone(),
            role: stage.role,
            exit_code,
            captured_stderr: stderr_tail,
            signal,
        });
    }

    let results: Vec<StageResult> = results.into_iter().map(|r| r.unwrap()).collect();

    if let Some(failed) = results.iter().find(|r| !r.succeeded()) {
        return Err(CoreError::StageFailure {
            plugin: failed.plugin_name.clone(),
            exit_code: failed.exit_code.unwrap_or(-1),
            stderr_tail: failed.captured_stderr.clone(),
        }
        .into());
    }

    Ok(results)
}

/// Tear down every spawned stage, LIFO: the last-spawned (most downstream)
/// process is signalled first so an upstream process doesn't keep blocking
/// on a write to a pipe whose reader is already gone.
async fn terminate_all(spawned: Vec<SpawnedStage>) {
    for mut stage in spawned.into_iter().rev() {
        if let Some(pid) = stage.child.id() {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
        let graceful = tokio::time::timeout(TERMINATE_GRACE, stage.child.wait()).await;
        if graceful.is_err() {
            warn!(stage = %stage.name, "did not exit within grace period, sending SIGKILL");
            let _ = stage.child.start_kill();
            let _ = stage.child.wait().await;
        }
        stage.stderr_task.abort();
    }
}

/// Wait for the exit signal future used by the CLI: SIGINT or SIGTERM
/// (spec.md §4.6, "Cancellation"), mirroring the shutdown-signal future in
/// other process-managing binaries in this corpus.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }
}

#[cfg(not(unix))]
pub async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
