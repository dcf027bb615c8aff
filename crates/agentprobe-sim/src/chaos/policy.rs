use crate::mutators::ToolFaultKind;
use agentprobe_core::config::ChaosConfig;
use agentprobe_core::errors::{ProbeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fault kinds the middleware can inject. At most one applies per invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FaultKind {
    /// Sleep before calling the adapter and add the delay to the trace latency.
    Latency { delay_ms: u64 },
    /// Fail the call as an adapter error; the wrapped adapter is not invoked.
    Failure { message: String },
    /// Keep only this fraction of the output text (by characters).
    Truncate { keep_ratio: f64 },
    /// Multiply reported token totals by a factor drawn from `2..=factor_max`.
    CorruptTokens { factor_max: u64 },
    /// Call the adapter, then rewrite the results of calls to `target_tool`
    /// (every tool when unset).
    ToolFault {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_tool: Option<String>,
        fault: ToolFaultKind,
    },
}

impl FaultKind {
    pub fn label(&self) -> FaultLabel {
        match self {
            FaultKind::Latency { .. } => FaultLabel::Latency,
            FaultKind::Failure { .. } => FaultLabel::Failure,
            FaultKind::Truncate { .. } => FaultLabel::Truncate,
            FaultKind::CorruptTokens { .. } => FaultLabel::CorruptTokens,
            FaultKind::ToolFault { .. } => FaultLabel::ToolFault,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultLabel {
    Latency,
    Failure,
    Truncate,
    CorruptTokens,
    ToolFault,
}

impl std::fmt::Display for FaultLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FaultLabel::Latency => "latency",
            FaultLabel::Failure => "failure",
            FaultLabel::Truncate => "truncate",
            FaultLabel::CorruptTokens => "corrupt_tokens",
            FaultLabel::ToolFault => "tool_fault",
        })
    }
}

/// A configured fault. `probability` is its relative weight when a fault fires;
/// `None` weighs 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultSpec {
    #[serde(flatten)]
    pub kind: FaultKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
}

impl FaultSpec {
    pub fn new(kind: FaultKind) -> Self {
        Self {
            kind,
            probability: None,
        }
    }

    pub fn weighted(kind: FaultKind, probability: f64) -> Self {
        Self {
            kind,
            probability: Some(probability),
        }
    }

    pub fn weight(&self) -> f64 {
        self.probability.unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaosPolicy {
    pub enabled: bool,
    /// `None` seeds from entropy; decisions are then not reproducible.
    pub seed: Option<u64>,
    /// Chance that an invocation gets a fault at all.
    pub default_probability: f64,
    /// Per-test overrides of `default_probability`, by test name.
    pub per_test: BTreeMap<String, f64>,
    /// Empty means [`ChaosPolicy::default_faults`].
    pub faults: Vec<FaultSpec>,
}

impl Default for ChaosPolicy {
    fn default() -> Self {
        Self::from_config(&ChaosConfig::default())
    }
}

impl ChaosPolicy {
    pub fn from_config(cfg: &ChaosConfig) -> Self {
        Self {
            enabled: cfg.enabled,
            seed: cfg.seed,
            default_probability: cfg.default_probability,
            per_test: cfg.per_test.clone(),
            faults: Vec::new(),
        }
    }

    /// Enabled policy with the given seed and fault chance.
    pub fn seeded(seed: u64, probability: f64) -> Self {
        Self {
            enabled: true,
            seed: Some(seed),
            default_probability: probability,
            per_test: BTreeMap::new(),
            faults: Vec::new(),
        }
    }

    pub fn with_fault(mut self, fault: FaultSpec) -> Self {
        self.faults.push(fault);
        self
    }

    pub fn with_test_probability(mut self, test: impl Into<String>, probability: f64) -> Self {
        self.per_test.insert(test.into(), probability);
        self
    }

    pub fn default_faults() -> Vec<FaultSpec> {
        vec![
            FaultSpec::new(FaultKind::Latency { delay_ms: 250 }),
            FaultSpec::new(FaultKind::Failure {
                message: "injected failure".into(),
            }),
            FaultSpec::new(FaultKind::Truncate { keep_ratio: 0.5 }),
            FaultSpec::new(FaultKind::CorruptTokens { factor_max: 10 }),
        ]
    }

    pub fn effective_faults(&self) -> Vec<FaultSpec> {
        if self.faults.is_empty() {
            Self::default_faults()
        } else {
            self.faults.clone()
        }
    }

    pub fn probability_for(&self, test_name: Option<&str>) -> f64 {
        test_name
            .and_then(|name| self.per_test.get(name))
            .copied()
            .unwrap_or(self.default_probability)
    }

    pub fn validate(&self) -> Result<()> {
        let unit = |field: String, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ProbeError::config(format!("{field} must be within [0, 1], got {v}")))
            }
        };
        unit("chaos.default_probability".into(), self.default_probability)?;
        for (name, p) in &self.per_test {
            unit(format!("chaos.per_test.{name}"), *p)?;
        }
        for fault in &self.faults {
            let label = fault.kind.label();
            if !(fault.weight().is_finite() && fault.weight() >= 0.0) {
                return Err(ProbeError::config(format!(
                    "chaos fault {label} has invalid weight {}",
                    fault.weight()
                )));
            }
            match &fault.kind {
                FaultKind::Truncate { keep_ratio } => {
                    unit(format!("chaos fault {label} keep_ratio"), *keep_ratio)?
                }
                FaultKind::CorruptTokens { factor_max } if *factor_max < 2 => {
                    return Err(ProbeError::config(format!(
                        "chaos fault {label} needs factor_max >= 2"
                    )))
                }
                _ => {}
            }
        }
        if !self.faults.is_empty() && self.faults.iter().all(|f| f.weight() == 0.0) {
            return Err(ProbeError::config("chaos faults all have zero weight"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_carries_seed_and_overrides() {
        let mut cfg = ChaosConfig::default();
        cfg.enabled = true;
        cfg.per_test.insert("flaky".into(), 0.9);
        let policy = ChaosPolicy::from_config(&cfg);
        assert_eq!(policy.seed, Some(42));
        assert_eq!(policy.probability_for(Some("flaky")), 0.9);
        assert_eq!(policy.probability_for(Some("other")), 0.5);
        assert_eq!(policy.probability_for(None), 0.5);
        assert_eq!(policy.effective_faults().len(), 4);
    }

    #[test]
    fn fault_specs_deserialize_flat() {
        let spec: FaultSpec =
            serde_json::from_str(r#"{"kind": "latency", "delay_ms": 50, "probability": 2.0}"#)
                .unwrap();
        assert_eq!(spec.kind, FaultKind::Latency { delay_ms: 50 });
        assert_eq!(spec.weight(), 2.0);
    }

    #[test]
    fn validate_rejects_bad_faults() {
        let bad_ratio = ChaosPolicy::seeded(1, 0.5)
            .with_fault(FaultSpec::new(FaultKind::Truncate { keep_ratio: 1.5 }));
        assert!(bad_ratio.validate().is_err());

        let bad_factor = ChaosPolicy::seeded(1, 0.5)
            .with_fault(FaultSpec::new(FaultKind::CorruptTokens { factor_max: 1 }));
        assert!(bad_factor.validate().is_err());

        let zero = ChaosPolicy::seeded(1, 0.5).with_fault(FaultSpec::weighted(
            FaultKind::Latency { delay_ms: 1 },
            0.0,
        ));
        assert!(zero.validate().is_err());

        assert!(ChaosPolicy::seeded(1, 0.5).validate().is_ok());
    }

    #[test]
    fn tool_faults_nest_their_own_tag() {
        let spec: FaultSpec = serde_json::from_str(
            r#"{"kind": "tool_fault", "target_tool": "search", "fault": {"type": "slow", "delay_ms": 900}}"#,
        )
        .unwrap();
        assert_eq!(
            spec.kind,
            FaultKind::ToolFault {
                target_tool: Some("search".into()),
                fault: ToolFaultKind::Slow { delay_ms: 900 },
            }
        );
        assert_eq!(spec.kind.label().to_string(), "tool_fault");

        let any_tool: FaultSpec =
            serde_json::from_str(r#"{"kind": "tool_fault", "fault": {"type": "malformed"}}"#)
                .unwrap();
        assert!(matches!(
            any_tool.kind,
            FaultKind::ToolFault { target_tool: None, fault: ToolFaultKind::Malformed }
        ));
    }
}
