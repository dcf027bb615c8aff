use super::BaselineStore;
use crate::config::RegressionConfig;
use crate::errors::Result;
use crate::model::TestResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestComparison {
    pub test_name: String,
    pub baseline_score: f64,
    pub current_score: f64,
    /// `current - baseline`, rounded to 6 decimals.
    pub delta: f64,
    pub is_regression: bool,
    pub is_improvement: bool,
}

/// Only names present on both sides are compared;
/// `total == regressions + improvements + unchanged`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionReport {
    pub baseline_name: String,
    /// Sorted by test name.
    pub comparisons: Vec<TestComparison>,
    pub total: usize,
    pub regressions: usize,
    pub improvements: usize,
    pub unchanged: usize,
    pub threshold: f64,
}

impl RegressionReport {
    pub fn has_regressions(&self) -> bool {
        self.regressions > 0
    }

    pub fn regressed(&self) -> impl Iterator<Item = &TestComparison> {
        self.comparisons.iter().filter(|c| c.is_regression)
    }

    pub fn improved(&self) -> impl Iterator<Item = &TestComparison> {
        self.comparisons.iter().filter(|c| c.is_improvement)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegressionDetector {
    threshold: f64,
    enabled: bool,
}

impl Default for RegressionDetector {
    fn default() -> Self {
        Self::new(0.05)
    }
}

impl RegressionDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            enabled: true,
        }
    }

    pub fn from_config(cfg: &RegressionConfig) -> Self {
        Self::new(cfg.threshold).enabled(cfg.enabled)
    }

    /// A disabled detector compares nothing and never reads the store.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// A delta exactly at `±threshold` counts as unchanged.
    pub fn compare(
        &self,
        baseline_name: &str,
        baseline: &[TestResult],
        current: &[TestResult],
    ) -> RegressionReport {
        let base: BTreeMap<&str, f64> = baseline
            .iter()
            .map(|r| (r.test_name.as_str(), r.score))
            .collect();
        let cur: BTreeMap<&str, f64> = current
            .iter()
            .map(|r| (r.test_name.as_str(), r.score))
            .collect();

        let mut report = RegressionReport {
            baseline_name: baseline_name.to_string(),
            comparisons: Vec::new(),
            total: 0,
            regressions: 0,
            improvements: 0,
            unchanged: 0,
            threshold: self.threshold,
        };
        if !self.enabled {
            return report;
        }

        for (name, baseline_score) in &base {
            let Some(current_score) = cur.get(name).copied() else {
                continue;
            };
            let delta = round6(current_score - baseline_score);
            let is_regression = delta < -self.threshold;
            let is_improvement = delta > self.threshold;
            if is_regression {
                report.regressions += 1;
                tracing::warn!(test = %name, baseline_score, current_score, delta, "regression detected");
            } else if is_improvement {
                report.improvements += 1;
                tracing::info!(test = %name, baseline_score, current_score, delta, "improvement detected");
            } else {
                report.unchanged += 1;
            }
            report.comparisons.push(TestComparison {
                test_name: name.to_string(),
                baseline_score: *baseline_score,
                current_score,
                delta,
                is_regression,
                is_improvement,
            });
        }
        report.total = report.comparisons.len();
        report
    }

    /// Loads `baseline_name` from the store and compares `current` against it.
    pub fn compare_to_store(
        &self,
        store: &BaselineStore,
        baseline_name: &str,
        current: &[TestResult],
    ) -> Result<RegressionReport> {
        if !self.enabled {
            return Ok(self.compare(baseline_name, &[], current));
        }
        let baseline = store.load(baseline_name)?;
        Ok(self.compare(baseline_name, &baseline, current))
    }
}

fn round6(v: f64) -> f64 {
    (v * 1_000_000.0).round() / 1_000_000.0
}
