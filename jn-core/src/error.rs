use std::fmt;

/// One of the ten error kinds from the core's error handling design.
///
/// Parse/resolution/validation errors (the first eight variants) are
/// returned directly to the caller before any process is spawned. The
/// remaining two are produced only once execution has started.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("address parse error at byte {position}: {message} (in {raw:?})")]
    AddressParse {
        raw: String,
        position: usize,
        message: String,
    },

    #[error("profile not found: kind={kind} namespace={namespace} name={name}")]
    ProfileNotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("profile merge error at {path}: {message}")]
    ProfileMerge { path: String, message: String },

    #[error("VAR_UNSET({0})")]
    VarUnset(String),

    #[error("no plugin found for role={role} matching {address:?}")]
    PluginNotFound { role: String, address: String },

    #[error("plugin metadata extraction failed for {path}: {reason}")]
    PluginMetaError { path: String, reason: String },

    #[error("plugin {plugin} does not support mode {mode}")]
    ModeUnsupported { plugin: String, mode: String },

    #[error("stage {plugin} exited {exit_code}: {stderr_tail}")]
    StageFailure {
        plugin: String,
        exit_code: i32,
        stderr_tail: String,
    },

    #[error("pipeline validation error: {0}")]
    PipelineValidation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled by signal")]
    Cancelled,
}

impl CoreError {
    pub fn address_parse(raw: impl Into<String>, position: usize, message: impl Into<String>) -> Self {
        Self::AddressParse {
            raw: raw.into(),
            position,
            message: message.into(),
        }
    }

    /// Whether this error kind is reported before any child process is
    /// spawned (spec.md §7, "Propagation policy").
    pub fn is_pre_spawn(&self) -> bool {
        !matches!(self, Self::StageFailure { .. } | Self::Cancelled)
    }
}

/// Position-tagged wrapper used while scanning an address string, so callers
/// further up the parser don't have to recompute byte offsets.
#[derive(Debug, Clone, Copy)]
pub struct AtPos(pub usize);

impl fmt::Display for AtPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
