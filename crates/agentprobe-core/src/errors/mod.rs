//! Error taxonomy for the execution, snapshot, replay and regression pipeline.
//!
//! Per-test failures (adapter errors, timeouts, evaluator crashes) never leave the runner:
//! they are folded into a terminal `TestResult` status. Only the single-entity operations
//! (loading a named baseline or snapshot, replaying past the recorded boundary) surface
//! these errors to callers.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, ProbeError>;

/// Which kind of sub-call a replay session was asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    Model,
    Tool,
}

impl std::fmt::Display for CallKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallKind::Model => f.write_str("model"),
            CallKind::Tool => f.write_str("tool"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// Adapter invocation failed. Chaos-injected failures use this variant too.
    #[error("adapter '{adapter}' error: {message}")]
    Adapter { adapter: String, message: String },

    #[error("test '{test}' exceeded {timeout:?} timeout")]
    TestTimeout {
        test: String,
        timeout: std::time::Duration,
    },

    /// Structural evaluator failure (misconfiguration, unknown evaluator).
    /// A normal failed evaluation is a verdict, not this error.
    #[error("evaluator '{evaluator}' error: {message}")]
    Evaluator { evaluator: String, message: String },

    #[error("snapshot not found: {name}")]
    SnapshotNotFound { name: String },

    #[error("baseline not found: {name}")]
    BaselineNotFound { name: String },

    #[error("replay exhausted: requested {kind} call #{requested} but only {recorded} recorded")]
    ReplayExhausted {
        kind: CallKind,
        requested: usize,
        recorded: usize,
    },

    #[error(
        "replay incomplete: consumed {consumed_model}/{recorded_model} model and \
         {consumed_tool}/{recorded_tool} tool calls"
    )]
    ReplayIncomplete {
        consumed_model: usize,
        recorded_model: usize,
        consumed_tool: usize,
        recorded_tool: usize,
    },

    #[error("no recording for test '{test}'")]
    RecordingNotFound { test: String },

    #[error("step {index} out of range [0, {len})")]
    StepOutOfRange { index: usize, len: usize },

    #[error("invalid test case '{name}': {reason}")]
    InvalidTestCase { name: String, reason: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProbeError {
    pub fn adapter(adapter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Adapter {
            adapter: adapter.into(),
            message: message.into(),
        }
    }

    pub fn evaluator(evaluator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Evaluator {
            evaluator: evaluator.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable label, recorded on errored test results.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Adapter { .. } => "adapter",
            ProbeError::TestTimeout { .. } => "timeout",
            ProbeError::Evaluator { .. } => "evaluator",
            ProbeError::SnapshotNotFound { .. } => "snapshot_not_found",
            ProbeError::BaselineNotFound { .. } => "baseline_not_found",
            ProbeError::ReplayExhausted { .. } => "replay_exhausted",
            ProbeError::ReplayIncomplete { .. } => "replay_incomplete",
            ProbeError::RecordingNotFound { .. } => "recording_not_found",
            ProbeError::StepOutOfRange { .. } => "step_out_of_range",
            ProbeError::InvalidTestCase { .. } => "invalid_test_case",
            ProbeError::Config { .. } => "config",
            ProbeError::Io { .. } => "io",
            ProbeError::Serialization(_) => "serialization",
        }
    }
}
