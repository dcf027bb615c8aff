use agentprobe_core::engine::{Runner, RunnerSettings};
use agentprobe_core::providers::fake::FakeAdapter;
use agentprobe_core::{Adapter, AgentRun, TestCase, TestStatus};
use agentprobe_sim::{ChaosAdapter, ChaosPolicy, FaultLabel};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Test-writer subscriber, once per binary. `RUST_LOG=agentprobe_sim=debug` shows each injected fault.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn cases(n: usize) -> Vec<TestCase> {
    (0..n)
        .map(|i| TestCase::new(format!("case-{i}"), format!("input {i}")))
        .collect()
}

fn chaos(seed: u64) -> anyhow::Result<Arc<ChaosAdapter<FakeAdapter>>> {
    let inner = FakeAdapter::new("bot")
        .with_reply("a steady answer")
        .delay_on("input 1", Duration::from_millis(40))
        .delay_on("input 3", Duration::from_millis(10));
    Ok(Arc::new(ChaosAdapter::new(
        inner,
        ChaosPolicy::seeded(seed, 0.5),
    )?))
}

async fn run_with(
    settings: RunnerSettings,
    seed: u64,
    n: usize,
) -> anyhow::Result<(AgentRun, BTreeMap<usize, Option<FaultLabel>>)> {
    let adapter = chaos(seed)?;
    let runner = Runner::new(settings)?;
    let run = runner
        .run(&cases(n), adapter.clone() as Arc<dyn Adapter>, &[])
        .await;
    Ok((run, adapter.decisions()))
}

fn statuses(run: &AgentRun) -> Vec<(String, TestStatus)> {
    run.test_results
        .iter()
        .map(|r| (r.test_name.clone(), r.status))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn same_seed_same_faults_regardless_of_scheduling() -> anyhow::Result<()> {
    init_tracing();
    let (seq_run, seq) = run_with(RunnerSettings::sequential(), 42, 5).await?;
    let (par_run, par) = run_with(RunnerSettings::parallel(3), 42, 5).await?;

    assert_eq!(seq.len(), 5);
    assert_eq!(seq, par);
    assert_eq!(statuses(&seq_run), statuses(&par_run));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn injected_failures_surface_as_errors() -> anyhow::Result<()> {
    init_tracing();
    let (run, decisions) = run_with(RunnerSettings::parallel(4), 42, 12).await?;

    for (position, label) in &decisions {
        let result = &run.test_results[*position];
        if *label == Some(FaultLabel::Failure) {
            assert_eq!(result.status, TestStatus::Error, "{}", result.test_name);
            assert_eq!(result.error_kind.as_deref(), Some("adapter"));
        } else {
            assert_eq!(result.status, TestStatus::Passed, "{}", result.test_name);
        }
    }
    let failures = decisions
        .values()
        .filter(|d| **d == Some(FaultLabel::Failure))
        .count();
    assert_eq!(run.errors, failures);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn repeated_runs_reproduce_the_report() -> anyhow::Result<()> {
    let first = chaos(9)?;
    let second = chaos(9)?;
    for adapter in [&first, &second] {
        Runner::new(RunnerSettings::parallel(2))?
            .run(&cases(8), adapter.clone() as Arc<dyn Adapter>, &[])
            .await;
    }
    assert_eq!(first.report(), second.report());
    assert_eq!(first.report().invocations, 8);
    Ok(())
}
