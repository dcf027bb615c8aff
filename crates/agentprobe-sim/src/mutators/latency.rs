use super::Mutator;
use agentprobe_core::Trace;
use anyhow::Result;

pub struct AddLatency {
    pub delay_ms: u64,
}

impl Mutator for AddLatency {
    fn mutate(&self, trace: &Trace) -> Result<Trace> {
        let mut slowed = trace.clone();
        slowed.total_latency_ms = trace.total_latency_ms.saturating_add(self.delay_ms);
        Ok(slowed)
    }
}
