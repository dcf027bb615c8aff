pub mod policy;

pub use policy::{ChaosPolicy, FaultKind, FaultLabel, FaultSpec};

use crate::mutators::{
    AddLatency, CorruptTokens, Mutator, ToolFault, ToolFaultKind, TruncateOutput,
};
use crate::report::ChaosReport;
use agentprobe_core::errors::{ProbeError, Result};
use agentprobe_core::{Adapter, InvokeOptions, Trace};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// The three uniform draws consumed by one position.
#[derive(Debug, Clone, Copy)]
struct Draw {
    gate: f64,
    pick: f64,
    aux: f64,
}

/// Draws generated strictly in position order from one seeded stream, so the
/// draw for a position does not depend on which task asks first.
struct DrawTable {
    rng: StdRng,
    draws: Vec<Draw>,
}

impl DrawTable {
    fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            draws: Vec::new(),
        }
    }

    fn at(&mut self, position: usize) -> Draw {
        while self.draws.len() <= position {
            let draw = Draw {
                gate: self.rng.gen(),
                pick: self.rng.gen(),
                aux: self.rng.gen(),
            };
            self.draws.push(draw);
        }
        self.draws[position]
    }
}

/// A fault resolved for one invocation.
#[derive(Debug, Clone, PartialEq)]
enum Injection {
    Latency { delay_ms: u64 },
    Failure { message: String },
    Truncate { keep_ratio: f64 },
    CorruptTokens { factor: u64 },
    Tool {
        target_tool: Option<String>,
        fault: ToolFaultKind,
    },
}

impl Injection {
    fn resolve(kind: &FaultKind, aux: f64) -> Self {
        match kind {
            FaultKind::Latency { delay_ms } => Injection::Latency {
                delay_ms: *delay_ms,
            },
            FaultKind::Failure { message } => Injection::Failure {
                message: message.clone(),
            },
            FaultKind::Truncate { keep_ratio } => Injection::Truncate {
                keep_ratio: *keep_ratio,
            },
            FaultKind::CorruptTokens { factor_max } => {
                let span = factor_max.saturating_sub(1) as f64;
                let factor = (2 + (aux * span).floor() as u64).min(*factor_max);
                Injection::CorruptTokens { factor }
            }
            FaultKind::ToolFault { target_tool, fault } => Injection::Tool {
                target_tool: target_tool.clone(),
                fault: fault.clone(),
            },
        }
    }

    fn label(&self) -> FaultLabel {
        match self {
            Injection::Latency { .. } => FaultLabel::Latency,
            Injection::Failure { .. } => FaultLabel::Failure,
            Injection::Truncate { .. } => FaultLabel::Truncate,
            Injection::CorruptTokens { .. } => FaultLabel::CorruptTokens,
            Injection::Tool { .. } => FaultLabel::ToolFault,
        }
    }
}

/// Adapter middleware that injects seeded faults around another adapter.
///
/// Decisions are keyed by the test's position in the batch
/// ([`InvokeOptions::position`]), so a fixed seed yields the same fault for the
/// same test whether the batch runs sequentially or in parallel. Invocations
/// without a position are numbered in arrival order.
pub struct ChaosAdapter<A> {
    inner: A,
    name: String,
    policy: ChaosPolicy,
    faults: Vec<FaultSpec>,
    table: Mutex<DrawTable>,
    next_position: AtomicUsize,
    decisions: Mutex<BTreeMap<usize, Option<FaultLabel>>>,
}

impl<A: Adapter> ChaosAdapter<A> {
    pub fn new(inner: A, policy: ChaosPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            name: format!("chaos-{}", inner.name()),
            faults: policy.effective_faults(),
            table: Mutex::new(DrawTable::new(policy.seed)),
            next_position: AtomicUsize::new(0),
            decisions: Mutex::new(BTreeMap::new()),
            policy,
            inner,
        })
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn policy(&self) -> &ChaosPolicy {
        &self.policy
    }

    /// Fault applied at each position seen so far; `None` means the call went through untouched.
    pub fn decisions(&self) -> BTreeMap<usize, Option<FaultLabel>> {
        lock(&self.decisions).clone()
    }

    pub fn report(&self) -> ChaosReport {
        ChaosReport::from_decisions(&self.name, self.policy.seed, self.decisions())
    }

    fn decide(&self, position: usize, test_name: Option<&str>) -> Option<Injection> {
        if !self.policy.enabled {
            return None;
        }
        let draw = lock(&self.table).at(position);
        if draw.gate >= self.policy.probability_for(test_name) {
            return None;
        }

        let total: f64 = self.faults.iter().map(FaultSpec::weight).sum();
        if total <= 0.0 {
            return None;
        }
        let target = draw.pick * total;
        let mut cumulative = 0.0;
        let mut chosen = None;
        for fault in self.faults.iter().filter(|f| f.weight() > 0.0) {
            cumulative += fault.weight();
            chosen = Some(fault);
            if target < cumulative {
                break;
            }
        }
        chosen.map(|fault| Injection::resolve(&fault.kind, draw.aux))
    }

    fn mutation_failed(&self, err: anyhow::Error) -> ProbeError {
        ProbeError::adapter(&self.name, format!("chaos mutation failed: {err}"))
    }
}

#[async_trait]
impl<A: Adapter> Adapter for ChaosAdapter<A> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, input: &str, opts: InvokeOptions) -> Result<Trace> {
        let position = opts
            .position
            .unwrap_or_else(|| self.next_position.fetch_add(1, Ordering::SeqCst));
        let injection = self.decide(position, opts.test_name.as_deref());
        lock(&self.decisions).insert(position, injection.as_ref().map(Injection::label));

        let Some(injection) = injection else {
            return self.inner.invoke(input, opts).await;
        };
        let label = injection.label();
        tracing::debug!(
            adapter = %self.name,
            position,
            fault = %label,
            "injecting chaos fault"
        );

        let mut trace = match injection {
            Injection::Failure { message } => {
                return Err(ProbeError::adapter(&self.name, format!("chaos: {message}")));
            }
            Injection::Latency { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                let trace = self.inner.invoke(input, opts).await?;
                AddLatency { delay_ms }
                    .mutate(&trace)
                    .map_err(|e| self.mutation_failed(e))?
            }
            Injection::Truncate { keep_ratio } => {
                let trace = self.inner.invoke(input, opts).await?;
                TruncateOutput { keep_ratio }
                    .mutate(&trace)
                    .map_err(|e| self.mutation_failed(e))?
            }
            Injection::CorruptTokens { factor } => {
                let trace = self.inner.invoke(input, opts).await?;
                CorruptTokens { factor }
                    .mutate(&trace)
                    .map_err(|e| self.mutation_failed(e))?
            }
            Injection::Tool { target_tool, fault } => {
                let trace = self.inner.invoke(input, opts).await?;
                ToolFault { target_tool, fault }
                    .mutate(&trace)
                    .map_err(|e| self.mutation_failed(e))?
            }
        };
        trace
            .metadata
            .insert("chaos_fault".into(), serde_json::json!(label));
        Ok(trace)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
