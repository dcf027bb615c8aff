//! Step-by-step inspection of a trace's turns with running totals.

use super::{Trace, Turn};
use crate::errors::{ProbeError, Result};
use serde::Serialize;

/// One turn plus the totals accumulated up to and including it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceStep {
    pub step_index: usize,
    pub turn: Turn,
    pub cumulative_input_tokens: u64,
    pub cumulative_output_tokens: u64,
    pub cumulative_cost_usd: f64,
    pub cumulative_latency_ms: u64,
}

#[derive(Debug, Clone)]
pub struct TimeTravel {
    trace: Trace,
    steps: Vec<TraceStep>,
}

impl TimeTravel {
    /// Inspector without pricing; cumulative cost stays 0.
    pub fn new(trace: Trace) -> Self {
        Self::with_pricing(trace, 0.0, 0.0)
    }

    /// Prices are per 1K tokens and apply to model turns only.
    pub fn with_pricing(trace: Trace, cost_per_1k_input: f64, cost_per_1k_output: f64) -> Self {
        let mut steps = Vec::with_capacity(trace.turns.len());
        let (mut input, mut output, mut latency) = (0u64, 0u64, 0u64);
        let mut cost = 0.0;

        for (step_index, turn) in trace.turns.iter().enumerate() {
            if let Turn::Model(call) = turn {
                input = input.saturating_add(call.input_tokens);
                output = output.saturating_add(call.output_tokens);
                cost += call.input_tokens as f64 / 1000.0 * cost_per_1k_input
                    + call.output_tokens as f64 / 1000.0 * cost_per_1k_output;
            }
            latency = latency.saturating_add(turn.latency_ms());
            steps.push(TraceStep {
                step_index,
                turn: turn.clone(),
                cumulative_input_tokens: input,
                cumulative_output_tokens: output,
                cumulative_cost_usd: (cost * 1_000_000.0).round() / 1_000_000.0,
                cumulative_latency_ms: latency,
            });
        }
        Self { trace, steps }
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TraceStep> {
        self.steps.get(index)
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TraceStep> {
        self.steps.iter()
    }

    /// Steps from `step_index` to the end.
    pub fn rerun_from(&self, step_index: usize) -> Result<&[TraceStep]> {
        if step_index >= self.steps.len() {
            return Err(ProbeError::StepOutOfRange {
                index: step_index,
                len: self.steps.len(),
            });
        }
        Ok(&self.steps[step_index..])
    }
}

impl<'a> IntoIterator for &'a TimeTravel {
    type Item = &'a TraceStep;
    type IntoIter = std::slice::Iter<'a, TraceStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}
