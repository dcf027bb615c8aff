use crate::errors::{ProbeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration consumed by the pipeline. Loading it from disk is the caller's job;
/// JSON documents deserialize directly, with every field optional.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ProbeConfig {
    pub runner: RunnerConfig,
    pub chaos: ChaosConfig,
    pub snapshot: SnapshotConfig,
    pub regression: RegressionConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    pub parallel: bool,
    pub max_workers: usize,
    /// Seconds.
    pub default_timeout: f64,
}

pub const DEFAULT_MAX_WORKERS: usize = 4;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            max_workers: DEFAULT_MAX_WORKERS,
            default_timeout: DEFAULT_TIMEOUT_SECS as f64,
        }
    }
}

impl RunnerConfig {
    /// Fails unless `default_timeout` is a positive number of seconds that fits a `Duration`.
    pub fn default_timeout(&self) -> Result<Duration> {
        let secs = self.default_timeout;
        if !(secs.is_finite() && secs > 0.0) {
            return Err(ProbeError::config(format!(
                "runner.default_timeout must be a positive number of seconds, got {secs}"
            )));
        }
        Duration::try_from_secs_f64(secs).map_err(|e| {
            ProbeError::config(format!("runner.default_timeout {secs} is out of range: {e}"))
        })
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ChaosConfig {
    pub enabled: bool,
    /// `None` draws from entropy; runs are then not reproducible.
    pub seed: Option<u64>,
    pub default_probability: f64,
    /// Per-test probability overrides, keyed by test name.
    pub per_test: BTreeMap<String, f64>,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            seed: Some(42),
            default_probability: 0.5,
            per_test: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SnapshotConfig {
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub update_on_first_run: bool,
    pub threshold: f64,
    pub dir: PathBuf,
}

fn default_true() -> bool {
    true
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            update_on_first_run: true,
            threshold: 0.8,
            dir: PathBuf::from(".agentprobe/snapshots"),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RegressionConfig {
    pub enabled: bool,
    pub threshold: f64,
    pub dir: PathBuf,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.05,
            dir: PathBuf::from(".agentprobe/baselines"),
        }
    }
}

impl ProbeConfig {
    pub fn from_json(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.runner.max_workers == 0 {
            return Err(ProbeError::config("runner.max_workers must be at least 1"));
        }
        self.runner.default_timeout()?;
        unit_interval("chaos.default_probability", self.chaos.default_probability)?;
        for (name, p) in &self.chaos.per_test {
            unit_interval(&format!("chaos.per_test.{name}"), *p)?;
        }
        unit_interval("snapshot.threshold", self.snapshot.threshold)?;
        unit_interval("regression.threshold", self.regression.threshold)?;
        Ok(())
    }
}

fn unit_interval(field: &str, v: f64) -> Result<()> {
    if (0.0..=1.0).contains(&v) {
        Ok(())
    } else {
        Err(ProbeError::config(format!(
            "{field} must be within [0, 1], got {v}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = ProbeConfig::default();
        assert!(!cfg.runner.parallel);
        assert_eq!(cfg.runner.max_workers, 4);
        assert_eq!(cfg.runner.default_timeout().unwrap(), Duration::from_secs(30));
        assert_eq!(cfg.chaos.seed, Some(42));
        assert_eq!(cfg.chaos.default_probability, 0.5);
        assert!(cfg.snapshot.update_on_first_run);
        assert_eq!(cfg.snapshot.threshold, 0.8);
        assert_eq!(cfg.regression.threshold, 0.05);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = ProbeConfig::from_json(r#"{"runner": {"parallel": true}}"#).unwrap();
        assert!(cfg.runner.parallel);
        assert_eq!(cfg.runner.max_workers, 4);
        assert!(cfg.snapshot.update_on_first_run);
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut cfg = ProbeConfig::default();
        cfg.runner.max_workers = 0;
        assert!(matches!(cfg.validate(), Err(ProbeError::Config { .. })));

        let mut cfg = ProbeConfig::default();
        cfg.runner.default_timeout = 0.0;
        assert!(cfg.validate().is_err());

        let err = ProbeConfig::from_json(r#"{"runner": {"default_timeout": 1e20}}"#).unwrap_err();
        assert!(err.to_string().contains("out of range"));

        let mut cfg = ProbeConfig::default();
        cfg.runner.default_timeout = -1.0;
        assert!(matches!(
            cfg.runner.default_timeout(),
            Err(ProbeError::Config { .. })
        ));

        let mut cfg = ProbeConfig::default();
        cfg.chaos.per_test.insert("t1".into(), 1.5);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("chaos.per_test.t1"));
    }
}
