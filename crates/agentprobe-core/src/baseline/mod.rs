//! Named result sets kept for regression comparison.

pub mod regression;

use crate::errors::{ProbeError, Result};
use crate::model::{AgentRun, TestResult};
use crate::snapshot::store::{list_json_stems, write_json};
use crate::suite::validate_name;
use std::path::{Path, PathBuf};

pub use regression::{RegressionDetector, RegressionReport, TestComparison};

/// One JSON array of test results per baseline: `<dir>/<name>.json`.
#[derive(Debug, Clone)]
pub struct BaselineStore {
    dir: PathBuf,
}

impl BaselineStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{name}.json")))
    }

    pub fn save(&self, name: &str, results: &[TestResult]) -> Result<PathBuf> {
        let path = self.path(name)?;
        write_json(&self.dir, &path, &results)?;
        tracing::info!(baseline = name, tests = results.len(), path = %path.display(), "baseline saved");
        Ok(path)
    }

    pub fn save_run(&self, name: &str, run: &AgentRun) -> Result<PathBuf> {
        self.save(name, &run.test_results)
    }

    pub fn load(&self, name: &str) -> Result<Vec<TestResult>> {
        let path = self.path(name)?;
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProbeError::BaselineNotFound {
                    name: name.to_string(),
                })
            }
            Err(e) => return Err(ProbeError::io(path, e)),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).map(|p| p.is_file()).unwrap_or(false)
    }

    /// `false` when no such baseline existed.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let path = self.path(name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(baseline = name, "baseline deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ProbeError::io(path, e)),
        }
    }

    pub fn list(&self) -> Result<Vec<String>> {
        list_json_stems(&self.dir)
    }
}
