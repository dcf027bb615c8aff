#![allow(dead_code)]

use agentprobe_core::errors::Result;
use agentprobe_core::{EvalResult, EvalVerdict, Evaluator, TestCase, Trace};
use async_trait::async_trait;
use tracing_subscriber::EnvFilter;

/// Installs a test-writer subscriber once per test binary; `RUST_LOG` overrides the filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Scores by the last digit of the output: even digits pass with 1.0,
/// odd digits are partial at 0.5, and a trailing 7 fails.
pub struct DigitEvaluator;

#[async_trait]
impl Evaluator for DigitEvaluator {
    fn name(&self) -> &str {
        "digit"
    }

    async fn evaluate(&self, _tc: &TestCase, trace: &Trace) -> Result<EvalResult> {
        let digit = trace
            .output_text
            .chars()
            .last()
            .and_then(|c| c.to_digit(10))
            .unwrap_or(0);
        Ok(match digit {
            7 => EvalResult::fail("digit", "seven"),
            d if d % 2 == 0 => EvalResult::pass("digit", "even"),
            _ => EvalResult::new("digit", EvalVerdict::Partial, 0.5, "odd"),
        })
    }
}

pub fn batch(n: usize) -> Vec<TestCase> {
    (0..n)
        .map(|i| TestCase::new(format!("case-{i}"), format!("input {i}")))
        .collect()
}
