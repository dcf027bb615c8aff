pub mod rules;

use crate::errors::{ProbeError, Result};
use crate::model::{EvalResult, TestCase};
use crate::trace::Trace;
use async_trait::async_trait;
use std::future::Future;
use std::time::Instant;

pub use rules::{Rule, RuleBasedEvaluator, RuleSpec};

/// Judges one (test case, trace) pair.
///
/// A failed judgement is a verdict inside `Ok`. `Err` is for breakage: the runner
/// passes every call through [`with_timing_and_recovery`], which turns ordinary errors
/// into an `error` verdict and lets only [`ProbeError::Evaluator`] through.
#[async_trait]
pub trait Evaluator: Send + Sync {
    fn name(&self) -> &str;

    async fn evaluate(&self, tc: &TestCase, trace: &Trace) -> Result<EvalResult>;
}

/// Times an evaluation and recovers from non-structural failures.
///
/// On success the elapsed time is added to the result's metadata as `duration_ms`.
/// Any error other than `ProbeError::Evaluator` becomes an `error` verdict scoring 0.0.
pub async fn with_timing_and_recovery<F>(name: &str, test_name: &str, fut: F) -> Result<EvalResult>
where
    F: Future<Output = Result<EvalResult>>,
{
    let started = Instant::now();
    let outcome = fut.await;
    let elapsed_ms = crate::model::millis(started.elapsed());
    match outcome {
        Ok(result) => {
            tracing::debug!(
                evaluator = name,
                test = test_name,
                elapsed_ms,
                verdict = ?result.verdict,
                score = result.score,
                "evaluator completed"
            );
            Ok(result.with_metadata("duration_ms", serde_json::json!(elapsed_ms)))
        }
        Err(e @ ProbeError::Evaluator { .. }) => Err(e),
        Err(e) => {
            tracing::error!(evaluator = name, test = test_name, error = %e, "evaluator failed");
            Ok(EvalResult::error(name, format!("evaluation error: {e}"))
                .with_metadata("duration_ms", serde_json::json!(elapsed_ms)))
        }
    }
}
