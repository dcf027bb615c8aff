use crate::trace::Trace;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// A single registered test. Immutable once built; the runner only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Per-test deadline. `None` falls back to the runner's default timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<f64>,
    /// Evaluators to apply, by name, in order. Empty means every registered evaluator.
    #[serde(default)]
    pub evaluators: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl TestCase {
    pub fn new(name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: input.into(),
            expected_output: None,
            tags: Vec::new(),
            timeout_seconds: None,
            evaluators: Vec::new(),
            metadata: BTreeMap::new(),
            skip_reason: None,
        }
    }

    pub fn expected(mut self, expected: impl Into<String>) -> Self {
        self.expected_output = Some(expected.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_seconds = Some(timeout.as_secs_f64());
        self
    }

    pub fn evaluator(mut self, name: impl Into<String>) -> Self {
        self.evaluators.push(name.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.skip_reason = Some(reason.into());
        self
    }

    /// Effective deadline given the runner default. Non-finite or non-positive
    /// per-test values fall back to the default; values too large for a
    /// `Duration` saturate.
    pub fn deadline(&self, default: Duration) -> Duration {
        match self.timeout_seconds {
            Some(s) if s.is_finite() && s > 0.0 => {
                Duration::try_from_secs_f64(s).unwrap_or(Duration::MAX)
            }
            _ => default,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalVerdict {
    Pass,
    Fail,
    Partial,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    pub evaluator_name: String,
    pub verdict: EvalVerdict,
    /// Always within [0, 1].
    pub score: f64,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl EvalResult {
    pub fn new(
        evaluator_name: impl Into<String>,
        verdict: EvalVerdict,
        score: f64,
        reason: impl Into<String>,
    ) -> Self {
        let score = if score.is_nan() {
            0.0
        } else {
            score.clamp(0.0, 1.0)
        };
        Self {
            evaluator_name: evaluator_name.into(),
            verdict,
            score,
            reason: reason.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn pass(evaluator_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(evaluator_name, EvalVerdict::Pass, 1.0, reason)
    }

    pub fn fail(evaluator_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(evaluator_name, EvalVerdict::Fail, 0.0, reason)
    }

    /// Evaluator-level errors carry score 0.0 by convention.
    pub fn error(evaluator_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(evaluator_name, EvalVerdict::Error, 0.0, reason)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Error,
    Timeout,
    Skipped,
}

impl TestStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TestStatus::Pending | TestStatus::Running)
    }
}

/// Outcome of one test. Status and score are derived by the constructors below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_name: String,
    pub status: TestStatus,
    pub score: f64,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Trace>,
    #[serde(default)]
    pub eval_results: Vec<EvalResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl TestResult {
    /// Score is the mean of the evaluator scores (1.0 when none ran);
    /// the test fails only when some evaluator voted `fail`.
    pub fn from_evaluations(
        test_name: impl Into<String>,
        trace: Trace,
        eval_results: Vec<EvalResult>,
        duration: Duration,
    ) -> Self {
        let score = if eval_results.is_empty() {
            1.0
        } else {
            eval_results.iter().map(|r| r.score).sum::<f64>() / eval_results.len() as f64
        };
        let status = if eval_results
            .iter()
            .any(|r| r.verdict == EvalVerdict::Fail)
        {
            TestStatus::Failed
        } else {
            TestStatus::Passed
        };
        Self {
            test_name: test_name.into(),
            status,
            score,
            duration_ms: millis(duration),
            trace: Some(trace),
            eval_results,
            error_message: None,
            error_kind: None,
        }
    }

    pub fn errored(
        test_name: impl Into<String>,
        err: &crate::errors::ProbeError,
        duration: Duration,
    ) -> Self {
        Self::terminal(
            test_name,
            TestStatus::Error,
            Some(err.to_string()),
            Some(err.kind()),
            duration,
        )
    }

    /// A failure that has no `ProbeError` behind it (panic, join error).
    pub fn crashed(test_name: impl Into<String>, message: String, duration: Duration) -> Self {
        Self::terminal(
            test_name,
            TestStatus::Error,
            Some(message),
            Some("panic"),
            duration,
        )
    }

    pub fn timed_out(test_name: impl Into<String>, deadline: Duration) -> Self {
        let test_name = test_name.into();
        let err = crate::errors::ProbeError::TestTimeout {
            test: test_name.clone(),
            timeout: deadline,
        };
        Self::terminal(
            test_name,
            TestStatus::Timeout,
            Some(err.to_string()),
            Some(err.kind()),
            deadline,
        )
    }

    pub fn skipped(test_name: impl Into<String>, reason: &str) -> Self {
        Self::terminal(
            test_name,
            TestStatus::Skipped,
            Some(reason.to_string()),
            None,
            Duration::ZERO,
        )
    }

    fn terminal(
        test_name: impl Into<String>,
        status: TestStatus,
        error_message: Option<String>,
        error_kind: Option<&str>,
        duration: Duration,
    ) -> Self {
        Self {
            test_name: test_name.into(),
            status,
            score: 0.0,
            duration_ms: millis(duration),
            trace: None,
            eval_results: Vec::new(),
            error_message,
            error_kind: error_kind.map(str::to_string),
        }
    }

    pub fn passed(&self) -> bool {
        self.status == TestStatus::Passed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Run-wide token/latency/call accounting, summed over every produced trace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub latency_ms: u64,
    pub model_calls: u64,
    pub tool_calls: u64,
}

impl RunTotals {
    pub fn add_trace(&mut self, trace: &Trace) {
        self.input_tokens = self.input_tokens.saturating_add(trace.total_input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(trace.total_output_tokens);
        self.latency_ms = self.latency_ms.saturating_add(trace.total_latency_ms);
        self.model_calls = self
            .model_calls
            .saturating_add(trace.llm_calls.len() as u64);
        self.tool_calls = self.tool_calls.saturating_add(trace.tool_calls.len() as u64);
    }
}

/// Aggregate report of one batch run.
///
/// `test_results` is in input order, and
/// `total == passed + failed + errors + skipped` (timeouts count as errors).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRun {
    pub run_id: String,
    pub agent_name: String,
    pub status: RunStatus,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub skipped: usize,
    /// Subset of `errors` caused by deadlines.
    pub timeouts: usize,
    pub duration_ms: u64,
    pub test_results: Vec<TestResult>,
    #[serde(default)]
    pub totals: RunTotals,
    pub created_at: DateTime<Utc>,
}

impl AgentRun {
    pub fn assemble(
        agent_name: impl Into<String>,
        test_results: Vec<TestResult>,
        totals: RunTotals,
        duration: Duration,
    ) -> Self {
        let (mut passed, mut failed, mut errors, mut skipped, mut timeouts) = (0, 0, 0, 0, 0);
        for r in &test_results {
            match r.status {
                TestStatus::Passed => passed += 1,
                TestStatus::Failed => failed += 1,
                TestStatus::Skipped => skipped += 1,
                TestStatus::Timeout => {
                    timeouts += 1;
                    errors += 1;
                }
                // Pending/Running never leave the runner; count them as errors if they do.
                TestStatus::Error | TestStatus::Pending | TestStatus::Running => errors += 1,
            }
        }
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            agent_name: agent_name.into(),
            status: if errors == 0 {
                RunStatus::Completed
            } else {
                RunStatus::Failed
            },
            total: test_results.len(),
            passed,
            failed,
            errors,
            skipped,
            timeouts,
            duration_ms: millis(duration),
            test_results,
            totals,
            created_at: Utc::now(),
        }
    }

    pub fn pass_rate(&self) -> f64 {
        let ran = self.total - self.skipped;
        if ran == 0 {
            return 0.0;
        }
        self.passed as f64 / ran as f64
    }

    pub fn result(&self, test_name: &str) -> Option<&TestResult> {
        self.test_results.iter().find(|r| r.test_name == test_name)
    }
}

pub(crate) fn millis(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProbeError;

    fn eval(verdict: EvalVerdict, score: f64) -> EvalResult {
        EvalResult::new("e", verdict, score, "")
    }

    #[test]
    fn score_is_mean_and_defaults_to_one() {
        let trace = Trace::simple("a", "in", "out");
        let none = TestResult::from_evaluations("t", trace.clone(), vec![], Duration::ZERO);
        assert_eq!(none.score, 1.0);
        assert_eq!(none.status, TestStatus::Passed);

        let mixed = TestResult::from_evaluations(
            "t",
            trace,
            vec![eval(EvalVerdict::Pass, 1.0), eval(EvalVerdict::Partial, 0.5)],
            Duration::ZERO,
        );
        assert!((mixed.score - 0.75).abs() < 1e-9);
        assert_eq!(mixed.status, TestStatus::Passed);
    }

    #[test]
    fn any_fail_verdict_fails_the_test_but_error_verdict_does_not() {
        let trace = Trace::simple("a", "in", "out");
        let failed = TestResult::from_evaluations(
            "t",
            trace.clone(),
            vec![eval(EvalVerdict::Pass, 1.0), eval(EvalVerdict::Fail, 0.0)],
            Duration::ZERO,
        );
        assert_eq!(failed.status, TestStatus::Failed);

        let errored_eval = TestResult::from_evaluations(
            "t",
            trace,
            vec![eval(EvalVerdict::Error, 0.0)],
            Duration::ZERO,
        );
        assert_eq!(errored_eval.status, TestStatus::Passed);
        assert_eq!(errored_eval.score, 0.0);
    }

    #[test]
    fn eval_score_is_clamped() {
        assert_eq!(eval(EvalVerdict::Pass, 3.0).score, 1.0);
        assert_eq!(eval(EvalVerdict::Fail, -1.0).score, 0.0);
        assert_eq!(eval(EvalVerdict::Fail, f64::NAN).score, 0.0);
    }

    #[test]
    fn counts_add_up_and_timeouts_are_errors() {
        let trace = Trace::simple("a", "in", "out");
        let results = vec![
            TestResult::from_evaluations("p", trace.clone(), vec![], Duration::ZERO),
            TestResult::from_evaluations(
                "f",
                trace,
                vec![eval(EvalVerdict::Fail, 0.0)],
                Duration::ZERO,
            ),
            TestResult::errored("e", &ProbeError::adapter("x", "boom"), Duration::ZERO),
            TestResult::timed_out("t", Duration::from_millis(10)),
            TestResult::skipped("s", "flaky"),
        ];
        let run = AgentRun::assemble("a", results, RunTotals::default(), Duration::ZERO);
        assert_eq!(run.total, 5);
        assert_eq!(run.total, run.passed + run.failed + run.errors + run.skipped);
        assert_eq!(run.errors, 2);
        assert_eq!(run.timeouts, 1);
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.test_results[2].error_kind.as_deref(), Some("adapter"));
    }

    #[test]
    fn deadline_falls_back_to_default() {
        let default = Duration::from_secs(30);
        let tc = TestCase::new("t", "x");
        assert_eq!(tc.deadline(default), default);
        let tc = tc.timeout(Duration::from_millis(250));
        assert_eq!(tc.deadline(default), Duration::from_millis(250));
    }

    #[test]
    fn oversized_deadline_saturates() {
        let mut tc = TestCase::new("t", "x");
        tc.timeout_seconds = Some(1e20);
        assert_eq!(tc.deadline(Duration::from_secs(30)), Duration::MAX);
        tc.timeout_seconds = Some(f64::NAN);
        assert_eq!(tc.deadline(Duration::from_secs(30)), Duration::from_secs(30));
    }

    #[test]
    fn timeout_result_carries_the_timeout_error() {
        let r = TestResult::timed_out("slow", Duration::from_millis(10));
        let expected = ProbeError::TestTimeout {
            test: "slow".into(),
            timeout: Duration::from_millis(10),
        };
        assert_eq!(r.status, TestStatus::Timeout);
        assert_eq!(r.error_kind.as_deref(), Some("timeout"));
        assert_eq!(r.error_message, Some(expected.to_string()));
    }
}
