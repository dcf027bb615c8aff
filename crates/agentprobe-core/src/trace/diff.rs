//! Structural comparison between two arbitrary traces.

use super::{ToolCall, Trace};
use serde::{Deserialize, Serialize};

/// One compared dimension. `expected` comes from the reference side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffItem {
    pub dimension: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceDiffReport {
    pub trace_a_id: String,
    pub trace_b_id: String,
    pub tool_call_diffs: Vec<DiffItem>,
    pub output_matches: bool,
    /// `b - a`, total tokens.
    pub token_delta: i64,
    pub latency_delta_ms: i64,
    pub overall_similarity: f64,
}

impl TraceDiffReport {
    pub fn is_match(&self, threshold: f64) -> bool {
        self.overall_similarity >= threshold
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TraceDiffer;

impl TraceDiffer {
    pub fn diff(&self, a: &Trace, b: &Trace) -> TraceDiffReport {
        let tool_call_diffs = tool_call_diffs(&a.tool_calls, &b.tool_calls);
        let output_matches = a.output_text == b.output_text;
        let output_score = if output_matches { 1.0 } else { 0.0 };

        let overall = if tool_call_diffs.is_empty() {
            output_score
        } else {
            let tools = tool_call_diffs.iter().map(|d| d.similarity).sum::<f64>()
                / tool_call_diffs.len() as f64;
            0.4 * output_score + 0.6 * tools
        };

        TraceDiffReport {
            trace_a_id: a.trace_id.clone(),
            trace_b_id: b.trace_id.clone(),
            tool_call_diffs,
            output_matches,
            token_delta: signed_delta(a.total_tokens(), b.total_tokens()),
            latency_delta_ms: signed_delta(a.total_latency_ms, b.total_latency_ms),
            overall_similarity: round4(overall),
        }
    }
}

/// Agreement on name, input and output, a third each.
pub fn tool_call_similarity(a: &ToolCall, b: &ToolCall) -> f64 {
    let hits = [
        a.tool_name == b.tool_name,
        a.tool_input == b.tool_input,
        a.tool_output == b.tool_output,
    ]
    .iter()
    .filter(|hit| **hit)
    .count();
    hits as f64 / 3.0
}

/// Per-index diffs over the longer of the two call lists; unpaired calls score 0.
pub fn tool_call_diffs(a: &[ToolCall], b: &[ToolCall]) -> Vec<DiffItem> {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            let (ea, eb) = (a.get(i), b.get(i));
            let similarity = match (ea, eb) {
                (Some(x), Some(y)) => round4(tool_call_similarity(x, y)),
                _ => 0.0,
            };
            DiffItem {
                dimension: format!("tool_call_{i}"),
                expected: ea.map(|c| c.tool_name.clone()),
                actual: eb.map(|c| c.tool_name.clone()),
                similarity,
            }
        })
        .collect()
}

pub(crate) fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

fn signed_delta(a: u64, b: u64) -> i64 {
    let a = i64::try_from(a).unwrap_or(i64::MAX);
    let b = i64::try_from(b).unwrap_or(i64::MAX);
    b.saturating_sub(a)
}
