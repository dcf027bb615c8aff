//! Golden-file comparison of traces.

pub mod store;

use crate::config::SnapshotConfig;
use crate::errors::{ProbeError, Result};
use crate::fingerprint::trace_fingerprint;
use crate::trace::diff::{round4, DiffItem};
use crate::trace::Trace;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub use store::{SnapshotEnvelope, SnapshotStore};

const OUTPUT_WEIGHT: f64 = 0.4;
const TOOLS_WEIGHT: f64 = 0.35;
const TOKENS_WEIGHT: f64 = 0.25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    pub snapshot_name: String,
    pub overall_similarity: f64,
    pub diffs: Vec<DiffItem>,
    pub is_match: bool,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotCheck {
    /// No snapshot existed; the current trace became the reference.
    Created,
    /// Snapshot testing is switched off; nothing was read or written.
    Disabled,
    Matched(SnapshotDiff),
    Mismatched(SnapshotDiff),
}

impl SnapshotCheck {
    pub fn passed(&self) -> bool {
        !matches!(self, SnapshotCheck::Mismatched(_))
    }
}

/// Similarity of `current` against `reference` in [0, 1].
///
/// Output keyword overlap, tool-name sequence agreement and total-token ratio,
/// weighted 0.4 / 0.35 / 0.25. Latency is ignored. Traces with equal fingerprints
/// score exactly 1.0.
pub fn compare(name: &str, reference: &Trace, current: &Trace, threshold: f64) -> SnapshotDiff {
    compare_with_fingerprint(name, &trace_fingerprint(reference), reference, current, threshold)
}

fn compare_with_fingerprint(
    name: &str,
    reference_fingerprint: &str,
    reference: &Trace,
    current: &Trace,
    threshold: f64,
) -> SnapshotDiff {
    let ref_tools: Vec<&str> = reference.tool_names().collect();
    let cur_tools: Vec<&str> = current.tool_names().collect();
    let tools = sequence_similarity(&ref_tools, &cur_tools);
    let output = keyword_overlap(&reference.output_text, &current.output_text);
    let tokens = ratio(reference.total_tokens(), current.total_tokens());

    let diffs = vec![
        DiffItem {
            dimension: "output".into(),
            expected: Some(preview(&reference.output_text)),
            actual: Some(preview(&current.output_text)),
            similarity: round4(output),
        },
        DiffItem {
            dimension: "tool_calls".into(),
            expected: Some(ref_tools.join(",")),
            actual: Some(cur_tools.join(",")),
            similarity: round4(tools),
        },
        DiffItem {
            dimension: "token_usage".into(),
            expected: Some(reference.total_tokens().to_string()),
            actual: Some(current.total_tokens().to_string()),
            similarity: round4(tokens),
        },
    ];

    let overall = if trace_fingerprint(current) == reference_fingerprint {
        1.0
    } else {
        round4(OUTPUT_WEIGHT * output + TOOLS_WEIGHT * tools + TOKENS_WEIGHT * tokens)
    };

    SnapshotDiff {
        snapshot_name: name.to_string(),
        overall_similarity: overall,
        diffs,
        is_match: overall >= threshold,
        threshold,
    }
}

/// Jaccard index of lower-cased whitespace-separated words.
fn keyword_overlap(a: &str, b: &str) -> f64 {
    let a: HashSet<String> = a.split_whitespace().map(str::to_lowercase).collect();
    let b: HashSet<String> = b.split_whitespace().map(str::to_lowercase).collect();
    match (a.is_empty(), b.is_empty()) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        _ => a.intersection(&b).count() as f64 / a.union(&b).count() as f64,
    }
}

/// Positional agreement over the longer sequence.
fn sequence_similarity(a: &[&str], b: &[&str]) -> f64 {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        _ => {
            let hits = a.iter().zip(b).filter(|(x, y)| x == y).count();
            hits as f64 / a.len().max(b.len()) as f64
        }
    }
}

fn ratio(a: u64, b: u64) -> f64 {
    match (a, b) {
        (0, 0) => 1.0,
        (0, _) | (_, 0) => 0.0,
        _ => a.min(b) as f64 / a.max(b) as f64,
    }
}

fn preview(s: &str) -> String {
    s.chars().take(200).collect()
}

/// The comparison flow used by callers: compare against the stored reference,
/// creating it on first run when allowed.
#[derive(Debug, Clone)]
pub struct SnapshotTester {
    store: SnapshotStore,
    threshold: f64,
    update_on_first_run: bool,
    enabled: bool,
}

impl SnapshotTester {
    pub fn new(store: SnapshotStore, threshold: f64) -> Self {
        Self {
            store,
            threshold,
            update_on_first_run: true,
            enabled: true,
        }
    }

    pub fn from_config(cfg: &SnapshotConfig) -> Self {
        Self {
            store: SnapshotStore::new(cfg.dir.clone()),
            threshold: cfg.threshold,
            update_on_first_run: cfg.update_on_first_run,
            enabled: cfg.enabled,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn update_on_first_run(mut self, enabled: bool) -> Self {
        self.update_on_first_run = enabled;
        self
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn check(&self, name: &str, current: &Trace) -> Result<SnapshotCheck> {
        if !self.enabled {
            return Ok(SnapshotCheck::Disabled);
        }
        let envelope = match self.store.load_envelope(name) {
            Ok(env) => env,
            Err(ProbeError::SnapshotNotFound { .. }) if self.update_on_first_run => {
                self.store.save(name, current)?;
                tracing::info!(snapshot = name, "no snapshot yet; saved current trace");
                return Ok(SnapshotCheck::Created);
            }
            Err(e) => return Err(e),
        };

        let diff = compare_with_fingerprint(
            name,
            &envelope.fingerprint,
            &envelope.trace,
            current,
            self.threshold,
        );
        if diff.is_match {
            Ok(SnapshotCheck::Matched(diff))
        } else {
            tracing::warn!(
                snapshot = name,
                similarity = diff.overall_similarity,
                threshold = self.threshold,
                "snapshot mismatch"
            );
            Ok(SnapshotCheck::Mismatched(diff))
        }
    }

    pub fn update(&self, name: &str, trace: &Trace) -> Result<()> {
        self.store.save(name, trace).map(|_| ())
    }

    /// Returns how many snapshots were written.
    pub fn update_all<'a, I>(&self, snapshots: I) -> Result<usize>
    where
        I: IntoIterator<Item = (&'a str, &'a Trace)>,
    {
        let mut count = 0;
        for (name, trace) in snapshots {
            self.store.save(name, trace)?;
            count += 1;
        }
        Ok(count)
    }
}
