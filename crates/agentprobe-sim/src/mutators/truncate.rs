use super::Mutator;
use agentprobe_core::Trace;
use anyhow::{ensure, Result};

pub struct TruncateOutput {
    pub keep_ratio: f64,
}

impl Mutator for TruncateOutput {
    fn mutate(&self, trace: &Trace) -> Result<Trace> {
        ensure!(
            (0.0..=1.0).contains(&self.keep_ratio),
            "keep_ratio must be within [0, 1], got {}",
            self.keep_ratio
        );
        let chars = trace.output_text.chars().count();
        let keep = (chars as f64 * self.keep_ratio).floor() as usize;
        let mut corrupted = trace.clone();
        corrupted.output_text = trace.output_text.chars().take(keep).collect();
        Ok(corrupted)
    }
}
