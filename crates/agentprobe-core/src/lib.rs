//! Execution, snapshot, replay and regression pipeline for agent tests.
//!
//! The [`engine::Runner`] drives a batch of [`model::TestCase`]s through an
//! [`providers::Adapter`] and a set of [`eval::Evaluator`]s and always returns an
//! [`model::AgentRun`]. Traces can be pinned with [`snapshot`], re-driven from a
//! recording with [`replay`], and whole runs compared over time with [`baseline`].

pub mod baseline;
pub mod config;
pub mod engine;
pub mod errors;
pub mod eval;
pub mod fingerprint;
pub mod model;
pub mod providers;
pub mod replay;
pub mod report;
pub mod snapshot;
pub mod suite;
pub mod trace;

pub use config::ProbeConfig;
pub use engine::{Runner, RunnerSettings};
pub use errors::{ProbeError, Result};
pub use eval::Evaluator;
pub use model::{AgentRun, EvalResult, EvalVerdict, RunStatus, TestCase, TestResult, TestStatus};
pub use providers::{Adapter, InvokeOptions};
pub use trace::{LlmCall, TimeTravel, ToolCall, Trace, Turn};
