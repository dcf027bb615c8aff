use super::accounting::RunAccounting;
use crate::config::{RunnerConfig, DEFAULT_MAX_WORKERS, DEFAULT_TIMEOUT_SECS};
use crate::errors::{ProbeError, Result};
use crate::eval::{with_timing_and_recovery, Evaluator};
use crate::model::{AgentRun, EvalResult, TestCase, TestResult};
use crate::providers::{Adapter, InvokeOptions};
use crate::report::progress::{ProgressEvent, ProgressSink};
use crate::trace::Trace;
use futures::FutureExt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout, Duration};
use tracing::Instrument;

#[derive(Debug, Clone, PartialEq)]
pub struct RunnerSettings {
    pub parallel: bool,
    pub max_workers: usize,
    pub default_timeout: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            parallel: false,
            max_workers: DEFAULT_MAX_WORKERS,
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl TryFrom<&RunnerConfig> for RunnerSettings {
    type Error = ProbeError;

    fn try_from(cfg: &RunnerConfig) -> Result<Self> {
        Ok(Self {
            parallel: cfg.parallel,
            max_workers: cfg.max_workers,
            default_timeout: cfg.default_timeout()?,
        })
    }
}

impl RunnerSettings {
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    pub fn parallel(max_workers: usize) -> Self {
        Self {
            parallel: true,
            max_workers,
            ..Self::default()
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

/// Schedules a batch of test cases against one adapter.
///
/// `run` always returns an [`AgentRun`]: adapter errors, timeouts, panics and
/// structural evaluator errors end up as that test's status. Test names must be
/// unique within a batch; a repeated name is not executed and gets status `error`. Results are placed at
/// the test's input index, so the report order never depends on completion order.
pub struct Runner {
    settings: RunnerSettings,
    progress: Option<ProgressSink>,
}

impl Runner {
    pub fn new(settings: RunnerSettings) -> Result<Self> {
        if settings.max_workers == 0 {
            return Err(ProbeError::config("runner.max_workers must be at least 1"));
        }
        if settings.default_timeout.is_zero() {
            return Err(ProbeError::config("runner.default_timeout must be positive"));
        }
        Ok(Self {
            settings,
            progress: None,
        })
    }

    pub fn from_config(cfg: &RunnerConfig) -> Result<Self> {
        Self::new(RunnerSettings::try_from(cfg)?)
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    pub async fn run(
        &self,
        cases: &[TestCase],
        adapter: Arc<dyn Adapter>,
        evaluators: &[Arc<dyn Evaluator>],
    ) -> AgentRun {
        let span = tracing::info_span!(
            "agentprobe.run",
            agent = %adapter.name(),
            total = cases.len(),
            parallel = self.settings.parallel,
        );
        self.run_inner(cases, adapter, evaluators)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        cases: &[TestCase],
        adapter: Arc<dyn Adapter>,
        evaluators: &[Arc<dyn Evaluator>],
    ) -> AgentRun {
        let started = Instant::now();
        let agent_name = adapter.name().to_string();
        let task = TestTask {
            adapter,
            evaluators: evaluators.to_vec().into(),
            accounting: Arc::new(RunAccounting::default()),
            default_timeout: self.settings.default_timeout,
            progress: self.progress.clone().map(|sink| {
                Arc::new(ProgressTracker {
                    sink,
                    done: AtomicUsize::new(0),
                    total: cases.len(),
                })
            }),
        };

        let repeated = repeated_names(cases);
        let slots = if self.settings.parallel {
            self.run_parallel(cases, &repeated, &task).await
        } else {
            run_sequential(cases, &repeated, &task).await
        };

        // A slot is empty only if its worker task died outside the caught pipeline.
        let results: Vec<TestResult> = slots
            .into_iter()
            .zip(cases)
            .map(|(slot, tc)| {
                slot.unwrap_or_else(|| {
                    TestResult::crashed(&tc.name, "worker task failed".into(), Duration::ZERO)
                })
            })
            .collect();

        let run = AgentRun::assemble(
            agent_name,
            results,
            task.accounting.totals(),
            started.elapsed(),
        );
        tracing::info!(
            run_id = %run.run_id,
            passed = run.passed,
            failed = run.failed,
            errors = run.errors,
            timeouts = run.timeouts,
            skipped = run.skipped,
            duration_ms = run.duration_ms,
            "run finished"
        );
        run
    }

    async fn run_parallel(
        &self,
        cases: &[TestCase],
        repeated: &[bool],
        task: &TestTask,
    ) -> Vec<Option<TestResult>> {
        let sem = Arc::new(Semaphore::new(self.settings.max_workers));
        let mut join_set = JoinSet::new();
        let mut slots: Vec<Option<TestResult>> = vec![None; cases.len()];

        for (index, tc) in cases.iter().enumerate() {
            if repeated[index] {
                slots[index] = Some(task.reject_repeated(index, tc));
                continue;
            }
            let permit = match sem.clone().acquire_owned().await {
                Ok(p) => p,
                Err(e) => {
                    slots[index] = Some(TestResult::crashed(
                        &tc.name,
                        format!("worker pool closed: {e}"),
                        Duration::ZERO,
                    ));
                    continue;
                }
            };
            let this = task.clone_for_task();
            let tc = tc.clone();
            join_set.spawn(async move {
                let _permit = permit;
                let result = this.execute(index, &tc).await;
                (index, result)
            });
        }

        while let Some(res) = join_set.join_next().await {
            match res {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => tracing::error!(error = %e, "test worker join error"),
            }
        }
        slots
    }
}

async fn run_sequential(
    cases: &[TestCase],
    repeated: &[bool],
    task: &TestTask,
) -> Vec<Option<TestResult>> {
    let mut slots = Vec::with_capacity(cases.len());
    for (index, tc) in cases.iter().enumerate() {
        let result = if repeated[index] {
            task.reject_repeated(index, tc)
        } else {
            task.execute(index, tc).await
        };
        slots.push(Some(result));
    }
    slots
}

/// Marks every occurrence of a name after its first.
fn repeated_names(cases: &[TestCase]) -> Vec<bool> {
    let mut seen = HashSet::with_capacity(cases.len());
    cases.iter().map(|tc| !seen.insert(tc.name.as_str())).collect()
}

struct ProgressTracker {
    sink: ProgressSink,
    done: AtomicUsize,
    total: usize,
}

impl ProgressTracker {
    fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        (self.sink)(ProgressEvent {
            done,
            total: self.total,
        });
    }
}

/// Everything one test needs, cheap to clone into a spawned task.
struct TestTask {
    adapter: Arc<dyn Adapter>,
    evaluators: Arc<[Arc<dyn Evaluator>]>,
    accounting: Arc<RunAccounting>,
    default_timeout: Duration,
    progress: Option<Arc<ProgressTracker>>,
}

impl TestTask {
    fn clone_for_task(&self) -> Self {
        Self {
            adapter: self.adapter.clone(),
            evaluators: self.evaluators.clone(),
            accounting: self.accounting.clone(),
            default_timeout: self.default_timeout,
            progress: self.progress.clone(),
        }
    }

    async fn execute(&self, index: usize, tc: &TestCase) -> TestResult {
        let span = tracing::info_span!("agentprobe.test", test = %tc.name, index);
        let result = self.execute_inner(index, tc).instrument(span).await;
        if let Some(progress) = &self.progress {
            progress.tick();
        }
        result
    }

    fn reject_repeated(&self, index: usize, tc: &TestCase) -> TestResult {
        let err = ProbeError::InvalidTestCase {
            name: tc.name.clone(),
            reason: "test name repeats an earlier case in this batch".into(),
        };
        tracing::warn!(test = %tc.name, index, "duplicate test name; not executed");
        if let Some(progress) = &self.progress {
            progress.tick();
        }
        TestResult::errored(&tc.name, &err, Duration::ZERO)
    }

    async fn execute_inner(&self, index: usize, tc: &TestCase) -> TestResult {
        if let Some(reason) = &tc.skip_reason {
            tracing::debug!(reason = %reason, "test skipped");
            return TestResult::skipped(&tc.name, reason);
        }

        let deadline = tc.deadline(self.default_timeout);
        let started = Instant::now();
        let pipeline = AssertUnwindSafe(self.pipeline(index, tc)).catch_unwind();

        match timeout(deadline, pipeline).await {
            Err(_) => {
                tracing::warn!(timeout_ms = deadline.as_millis() as u64, "test timed out");
                TestResult::timed_out(&tc.name, deadline)
            }
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(panic = %message, "test pipeline panicked");
                TestResult::crashed(&tc.name, format!("panic: {message}"), started.elapsed())
            }
            Ok(Ok(Err(e))) => {
                tracing::warn!(kind = e.kind(), error = %e, "test errored");
                TestResult::errored(&tc.name, &e, started.elapsed())
            }
            Ok(Ok(Ok((trace, evals)))) => {
                self.accounting.record(&trace);
                let result = TestResult::from_evaluations(&tc.name, trace, evals, started.elapsed());
                tracing::debug!(status = ?result.status, score = result.score, "test finished");
                result
            }
        }
    }

    /// Adapter call followed by the selected evaluators, in order.
    async fn pipeline(&self, index: usize, tc: &TestCase) -> Result<(Trace, Vec<EvalResult>)> {
        let selected = self.select_evaluators(tc)?;
        let trace = self
            .adapter
            .invoke(&tc.input, InvokeOptions::for_test(&tc.name, index))
            .await?;

        let mut evals = Vec::with_capacity(selected.len());
        for ev in selected {
            let result =
                with_timing_and_recovery(ev.name(), &tc.name, ev.evaluate(tc, &trace)).await?;
            evals.push(result);
        }
        Ok((trace, evals))
    }

    fn select_evaluators(&self, tc: &TestCase) -> Result<Vec<Arc<dyn Evaluator>>> {
        if tc.evaluators.is_empty() {
            return Ok(self.evaluators.to_vec());
        }
        tc.evaluators
            .iter()
            .map(|name| {
                self.evaluators
                    .iter()
                    .find(|ev| ev.name() == name)
                    .cloned()
                    .ok_or_else(|| ProbeError::evaluator(name, "evaluator is not registered"))
            })
            .collect()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EvalVerdict, RunStatus, TestStatus};
    use crate::providers::fake::FakeAdapter;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Fails any output containing "bad"; otherwise scores by output length parity.
    struct ScriptedEvaluator {
        name: &'static str,
        calls: AtomicUsize,
    }

    impl ScriptedEvaluator {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Evaluator for ScriptedEvaluator {
        fn name(&self) -> &str {
            self.name
        }

        async fn evaluate(&self, _tc: &TestCase, trace: &Trace) -> Result<EvalResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if trace.output_text.contains("bad") {
                Ok(EvalResult::fail(self.name, "bad output"))
            } else if trace.output_text.len() % 2 == 0 {
                Ok(EvalResult::pass(self.name, "even"))
            } else {
                Ok(EvalResult::new(self.name, EvalVerdict::Partial, 0.5, "odd"))
            }
        }
    }

    struct PanickingEvaluator;

    #[async_trait]
    impl Evaluator for PanickingEvaluator {
        fn name(&self) -> &str {
            "panics"
        }

        async fn evaluate(&self, _tc: &TestCase, _trace: &Trace) -> Result<EvalResult> {
            panic!("evaluator bug");
        }
    }

    fn runner(settings: RunnerSettings) -> Runner {
        Runner::new(settings).unwrap()
    }

    #[test]
    fn zero_workers_is_a_config_error() {
        assert!(Runner::new(RunnerSettings::parallel(0)).is_err());
    }

    #[tokio::test]
    async fn repeated_names_are_rejected_in_both_modes() {
        for settings in [RunnerSettings::sequential(), RunnerSettings::parallel(3)] {
            let fake = Arc::new(FakeAdapter::new("agent"));
            let cases = vec![
                TestCase::new("same", "first"),
                TestCase::new("other", "x"),
                TestCase::new("same", "second"),
            ];
            let run = runner(settings)
                .run(&cases, fake.clone() as Arc<dyn Adapter>, &[])
                .await;

            assert_eq!(run.test_results[0].status, TestStatus::Passed);
            assert_eq!(run.test_results[1].status, TestStatus::Passed);
            let repeat = &run.test_results[2];
            assert_eq!(repeat.status, TestStatus::Error);
            assert_eq!(repeat.error_kind.as_deref(), Some("invalid_test_case"));
            assert_eq!(fake.invocations(), 2);
            assert_eq!(run.errors, 1);
        }
    }

    #[test]
    fn unusable_default_timeout_is_a_config_error() {
        for secs in [1e20, -1.0, f64::NAN] {
            let cfg = RunnerConfig {
                default_timeout: secs,
                ..RunnerConfig::default()
            };
            assert!(
                matches!(Runner::from_config(&cfg), Err(ProbeError::Config { .. })),
                "{secs}"
            );
        }
        assert!(Runner::from_config(&RunnerConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn adapter_failure_is_isolated_to_its_test() {
        let adapter: Arc<dyn Adapter> =
            Arc::new(FakeAdapter::new("agent").fail_on("boom", "upstream down"));
        let cases = vec![TestCase::new("ok", "fine"), TestCase::new("broken", "boom")];
        let run = runner(RunnerSettings::sequential())
            .run(&cases, adapter, &[])
            .await;

        assert_eq!(run.test_results[0].status, TestStatus::Passed);
        assert_eq!(run.test_results[0].score, 1.0);
        let broken = &run.test_results[1];
        assert_eq!(broken.status, TestStatus::Error);
        assert!(broken
            .error_message
            .as_deref()
            .unwrap()
            .contains("upstream down"));
        assert_eq!(run.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn failing_verdict_fails_test_and_score_is_mean() {
        let adapter: Arc<dyn Adapter> = Arc::new(FakeAdapter::new("agent").with_reply("bad!"));
        let evals: Vec<Arc<dyn Evaluator>> =
            vec![ScriptedEvaluator::new("a"), ScriptedEvaluator::new("b")];
        let run = runner(RunnerSettings::sequential())
            .run(&[TestCase::new("t", "x")], adapter, &evals)
            .await;
        let r = &run.test_results[0];
        assert_eq!(r.status, TestStatus::Failed);
        assert_eq!(r.score, 0.0);
        assert_eq!(r.eval_results.len(), 2);
        assert_eq!(run.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn evaluator_selection_respects_names_and_order() {
        let a = ScriptedEvaluator::new("a");
        let b = ScriptedEvaluator::new("b");
        let evals: Vec<Arc<dyn Evaluator>> = vec![a.clone(), b.clone()];
        let adapter: Arc<dyn Adapter> = Arc::new(FakeAdapter::new("agent"));
        let cases = vec![
            TestCase::new("only-b", "x").evaluator("b"),
            TestCase::new("unknown", "x").evaluator("missing"),
        ];
        let run = runner(RunnerSettings::sequential())
            .run(&cases, adapter, &evals)
            .await;

        assert_eq!(run.test_results[0].eval_results.len(), 1);
        assert_eq!(run.test_results[0].eval_results[0].evaluator_name, "b");
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);

        let unknown = &run.test_results[1];
        assert_eq!(unknown.status, TestStatus::Error);
        assert_eq!(unknown.error_kind.as_deref(), Some("evaluator"));
    }

    #[tokio::test]
    async fn panics_become_error_status() {
        let adapter: Arc<dyn Adapter> = Arc::new(FakeAdapter::new("agent").panic_on("explode"));
        let evals: Vec<Arc<dyn Evaluator>> = vec![Arc::new(PanickingEvaluator)];
        let cases = vec![
            TestCase::new("adapter-panic", "explode"),
            TestCase::new("evaluator-panic", "calm"),
        ];
        let run = runner(RunnerSettings::parallel(2))
            .run(&cases, adapter, &evals)
            .await;
        for r in &run.test_results {
            assert_eq!(r.status, TestStatus::Error);
            assert_eq!(r.error_kind.as_deref(), Some("panic"));
        }
        assert!(run.test_results[1]
            .error_message
            .as_deref()
            .unwrap()
            .contains("evaluator bug"));
    }

    #[tokio::test]
    async fn skipped_tests_never_reach_the_adapter() {
        let fake = Arc::new(FakeAdapter::new("agent"));
        let adapter: Arc<dyn Adapter> = fake.clone();
        let cases = vec![TestCase::new("s", "x").skip("flaky upstream")];
        let run = runner(RunnerSettings::sequential())
            .run(&cases, adapter, &[])
            .await;
        assert_eq!(run.skipped, 1);
        assert_eq!(fake.invocations(), 0);
        assert_eq!(run.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn progress_reports_every_test() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink: ProgressSink = Arc::new(move |ev: ProgressEvent| sink_seen.lock().unwrap().push(ev));
        let adapter: Arc<dyn Adapter> = Arc::new(FakeAdapter::new("agent"));
        let cases: Vec<_> = (0..4)
            .map(|i| TestCase::new(format!("t{i}"), "x"))
            .collect();
        runner(RunnerSettings::parallel(2))
            .with_progress(sink)
            .run(&cases, adapter, &[])
            .await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen.last().unwrap().done, 4);
        assert!(seen.iter().all(|ev| ev.total == 4));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_error_and_timeout() {
        let adapter: Arc<dyn Adapter> =
            Arc::new(FakeAdapter::new("agent").delay_on("slow", Duration::from_secs(60)));
        let cases = vec![TestCase::new("slow", "slow")];
        let run = runner(RunnerSettings::sequential().with_default_timeout(Duration::from_secs(5)))
            .run(&cases, adapter, &[])
            .await;
        assert_eq!(run.test_results[0].status, TestStatus::Timeout);
        assert_eq!(run.timeouts, 1);
        assert_eq!(run.errors, 1);
        assert_eq!(run.total, run.passed + run.failed + run.errors + run.skipped);
    }
}
