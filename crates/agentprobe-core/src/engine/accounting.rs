use crate::model::RunTotals;
use crate::trace::Trace;
use std::sync::{Mutex, PoisonError};

/// Run-wide totals shared by all workers. Every update is one guarded accumulation,
/// so the final sum does not depend on interleaving.
#[derive(Debug, Default)]
pub struct RunAccounting {
    totals: Mutex<RunTotals>,
}

impl RunAccounting {
    pub fn record(&self, trace: &Trace) {
        self.totals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add_trace(trace);
    }

    pub fn totals(&self) -> RunTotals {
        *self.totals.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::LlmCall;
    use std::sync::Arc;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_sum_exactly() {
        let acc = Arc::new(RunAccounting::default());
        let mut trace = Trace::simple("a", "in", "out");
        trace.llm_calls.push(LlmCall::new("m"));
        trace.total_input_tokens = 3;
        trace.total_output_tokens = 2;
        trace.total_latency_ms = 10;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let acc = acc.clone();
            let trace = trace.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    acc.record(&trace);
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let totals = acc.totals();
        assert_eq!(totals.input_tokens, 2_400);
        assert_eq!(totals.output_tokens, 1_600);
        assert_eq!(totals.latency_ms, 8_000);
        assert_eq!(totals.model_calls, 800);
    }
}
