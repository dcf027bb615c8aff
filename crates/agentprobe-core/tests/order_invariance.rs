//! Parallel and sequential runs of the same batch must report identical
//! (name, status, score) tuples in input order, whatever the completion order.

mod common;

use agentprobe_core::errors::Result;
use agentprobe_core::providers::fake::FakeAdapter;
use agentprobe_core::{Adapter, Evaluator, InvokeOptions, Runner, RunnerSettings, Trace, TestStatus};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const N: usize = 8;

/// Later inputs answer faster, so parallel completion order is reversed.
fn staggered_adapter() -> Arc<dyn Adapter> {
    let mut fake = FakeAdapter::new("staggered");
    for i in 0..N {
        fake = fake.delay_on(format!("input {i}"), Duration::from_millis(((N - i) * 10) as u64));
    }
    Arc::new(fake)
}

fn outcome(run: &agentprobe_core::AgentRun) -> Vec<(String, TestStatus, f64)> {
    run.test_results
        .iter()
        .map(|r| (r.test_name.clone(), r.status, r.score))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn parallel_matches_sequential_for_every_worker_count() {
    common::init_tracing();
    let cases = common::batch(N);
    let evaluators: Vec<Arc<dyn Evaluator>> = vec![Arc::new(common::DigitEvaluator)];

    let sequential = Runner::new(RunnerSettings::sequential())
        .unwrap()
        .run(&cases, staggered_adapter(), &evaluators)
        .await;
    let expected = outcome(&sequential);
    assert_eq!(expected.len(), N);
    assert_eq!(expected[7].1, TestStatus::Failed);
    assert_eq!(expected[3].2, 0.5);

    for k in 1..=N {
        let parallel = Runner::new(RunnerSettings::parallel(k))
            .unwrap()
            .run(&cases, staggered_adapter(), &evaluators)
            .await;
        assert_eq!(outcome(&parallel), expected, "max_workers={k}");
        assert_eq!(parallel.passed, sequential.passed);
        assert_eq!(parallel.failed, sequential.failed);
    }
}

#[tokio::test(start_paused = true)]
async fn parallel_run_is_faster_than_sequential_with_enough_workers() {
    let cases = common::batch(N);

    let started = tokio::time::Instant::now();
    Runner::new(RunnerSettings::parallel(N))
        .unwrap()
        .run(&cases, staggered_adapter(), &[])
        .await;
    let parallel_elapsed = started.elapsed();

    // With every test in flight at once the batch takes as long as its slowest test.
    assert!(parallel_elapsed >= Duration::from_millis((N * 10) as u64));
    assert!(parallel_elapsed < Duration::from_millis((N * 10 * 2) as u64));
}

/// Tracks how many invocations are in flight at once.
#[derive(Default)]
struct GaugeAdapter {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl Adapter for GaugeAdapter {
    fn name(&self) -> &str {
        "gauge"
    }

    async fn invoke(&self, input: &str, _opts: InvokeOptions) -> Result<Trace> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Trace::simple("gauge", input, "ok"))
    }
}

#[tokio::test(start_paused = true)]
async fn concurrency_never_exceeds_max_workers() {
    let cases = common::batch(12);
    for k in 1..=4 {
        let gauge = Arc::new(GaugeAdapter::default());
        let run = Runner::new(RunnerSettings::parallel(k))
            .unwrap()
            .run(&cases, gauge.clone() as Arc<dyn Adapter>, &[])
            .await;
        assert_eq!(run.passed, 12);
        let peak = gauge.peak.load(Ordering::SeqCst);
        assert!(peak <= k, "k={k} peak={peak}");
        assert_eq!(peak, k, "k={k} never saturated the pool");
    }

    let gauge = Arc::new(GaugeAdapter::default());
    Runner::new(RunnerSettings::sequential())
        .unwrap()
        .run(&cases, gauge.clone() as Arc<dyn Adapter>, &[])
        .await;
    assert_eq!(gauge.peak.load(Ordering::SeqCst), 1);
}
