use super::Mutator;
use agentprobe_core::Trace;
use anyhow::Result;

/// Inflates the reported token totals. Per-call counts are left alone so the
/// corruption shows up as a mismatch between totals and calls.
pub struct CorruptTokens {
    pub factor: u64,
}

impl Mutator for CorruptTokens {
    fn mutate(&self, trace: &Trace) -> Result<Trace> {
        let mut corrupted = trace.clone();
        corrupted.total_input_tokens = trace.total_input_tokens.saturating_mul(self.factor);
        corrupted.total_output_tokens = trace.total_output_tokens.saturating_mul(self.factor);
        Ok(corrupted)
    }
}
