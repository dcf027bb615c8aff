//! Declarative rule evaluator with weighted scoring.

use super::Evaluator;
use crate::errors::Result;
use crate::model::{EvalResult, EvalVerdict, TestCase};
use crate::trace::Trace;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const PARTIAL_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule_type", rename_all = "snake_case")]
pub enum Rule {
    ContainsAny { values: Vec<String> },
    NotContains { values: Vec<String> },
    MaxLength { max: usize },
    Regex { pattern: String },
    JsonValid,
    /// Output contains the test's expected output. Vacuously true when none is set.
    ExpectedOutput,
}

impl Rule {
    fn label(&self) -> &'static str {
        match self {
            Rule::ContainsAny { .. } => "contains_any",
            Rule::NotContains { .. } => "not_contains",
            Rule::MaxLength { .. } => "max_length",
            Rule::Regex { .. } => "regex",
            Rule::JsonValid => "json_valid",
            Rule::ExpectedOutput => "expected_output",
        }
    }

    /// `Err` carries a reason the rule could not be checked; it counts as a failure.
    fn check(&self, output: &str, tc: &TestCase) -> std::result::Result<bool, String> {
        Ok(match self {
            Rule::ContainsAny { values } => values.iter().any(|v| output.contains(v.as_str())),
            Rule::NotContains { values } => values.iter().all(|v| !output.contains(v.as_str())),
            Rule::MaxLength { max } => output.chars().count() <= *max,
            Rule::Regex { pattern } => regex::Regex::new(pattern)
                .map_err(|e| format!("invalid regex: {e}"))?
                .is_match(output),
            Rule::JsonValid => serde_json::from_str::<serde_json::Value>(output).is_ok(),
            Rule::ExpectedOutput => tc
                .expected_output
                .as_deref()
                .is_none_or(|expected| output.contains(expected)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    #[serde(flatten)]
    pub rule: Rule,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub description: String,
}

fn default_weight() -> f64 {
    1.0
}

impl RuleSpec {
    pub fn new(rule: Rule) -> Self {
        Self {
            rule,
            weight: 1.0,
            description: String::new(),
        }
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RuleBasedEvaluator {
    name: String,
    rules: Vec<RuleSpec>,
}

impl RuleBasedEvaluator {
    pub fn new(name: impl Into<String>, rules: Vec<RuleSpec>) -> Self {
        Self {
            name: name.into(),
            rules,
        }
    }
}

#[async_trait]
impl Evaluator for RuleBasedEvaluator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, tc: &TestCase, trace: &Trace) -> Result<EvalResult> {
        if self.rules.is_empty() {
            return Ok(EvalResult::pass(&self.name, "no rules configured"));
        }

        let output = trace.output_text.as_str();
        let mut total_weight = 0.0;
        let mut passed_weight = 0.0;
        let mut all_passed = true;
        let mut details = Vec::with_capacity(self.rules.len());

        for spec in &self.rules {
            // Non-positive weights are treated as neutral rather than inverting the score.
            let weight = if spec.weight > 0.0 { spec.weight } else { 0.0 };
            total_weight += weight;
            let (passed, error) = match spec.rule.check(output, tc) {
                Ok(p) => (p, None),
                Err(e) => {
                    tracing::warn!(evaluator = %self.name, rule = spec.rule.label(), error = %e, "rule could not be checked");
                    (false, Some(e))
                }
            };
            if passed {
                passed_weight += weight;
            } else {
                all_passed = false;
            }
            details.push(serde_json::json!({
                "rule": spec.rule.label(),
                "description": spec.description,
                "passed": passed,
                "weight": weight,
                "error": error,
            }));
        }

        let score = if total_weight > 0.0 {
            passed_weight / total_weight
        } else {
            0.0
        };
        let verdict = if all_passed {
            EvalVerdict::Pass
        } else if score >= PARTIAL_THRESHOLD {
            EvalVerdict::Partial
        } else {
            EvalVerdict::Fail
        };
        let reason = format!("{passed_weight}/{total_weight} rule weight passed");
        Ok(EvalResult::new(&self.name, verdict, score, reason)
            .with_metadata("rule_results", serde_json::Value::Array(details)))
    }
}
