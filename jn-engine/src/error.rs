use jn_core::CoreError;

/// Engine-level error: wraps the domain's `CoreError` with the context a
/// particular infrastructure operation was performing, the same pattern the
/// teacher uses for `EngineError::Plugin(#[from] PluginError)` plus
/// `with_context`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("config parse error in {path}: {message}")]
    ConfigParse { path: String, message: String },
}

impl EngineError {
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            Self::Core(CoreError::ProfileMerge { path, message }) => Self::Core(CoreError::ProfileMerge {
                path,
                message: format!("{ctx}: {message}"),
            }),
            Self::Core(CoreError::VarUnset(var)) => Self::Core(CoreError::ProfileMerge {
                path: ctx.to_string(),
                message: format!("VAR_UNSET({var})"),
            }),
            Self::Config(msg) => Self::Config(format!("{ctx}: {msg}")),
            other => other,
        }
    }

    /// Exit code mapping from spec.md §6.5.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Core(CoreError::StageFailure { .. }) => 1,
            Self::Core(CoreError::Cancelled) => 130,
            _ => 2,
        }
    }
}
