pub mod latency;
pub mod tokens;
pub mod tool;
pub mod truncate;

use agentprobe_core::Trace;
use anyhow::Result;

pub use latency::AddLatency;
pub use tokens::CorruptTokens;
pub use tool::{ToolFault, ToolFaultKind};
pub use truncate::TruncateOutput;

/// Produces a perturbed copy of a trace. The input is never modified.
pub trait Mutator {
    fn mutate(&self, trace: &Trace) -> Result<Trace>;
}
