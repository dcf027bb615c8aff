use crate::errors::{ProbeError, Result};
use crate::fingerprint::trace_fingerprint;
use crate::suite::validate_name;
use crate::trace::Trace;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk snapshot document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEnvelope {
    pub name: String,
    pub fingerprint: String,
    pub saved_at: DateTime<Utc>,
    pub trace: Trace,
}

/// One JSON file per snapshot: `<dir>/<name>.json`.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
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

    pub fn save(&self, name: &str, trace: &Trace) -> Result<PathBuf> {
        let path = self.path(name)?;
        let envelope = SnapshotEnvelope {
            name: name.to_string(),
            fingerprint: trace_fingerprint(trace),
            saved_at: Utc::now(),
            trace: trace.clone(),
        };
        write_json(&self.dir, &path, &envelope)?;
        tracing::info!(snapshot = name, path = %path.display(), "snapshot saved");
        Ok(path)
    }

    pub fn load_envelope(&self, name: &str) -> Result<SnapshotEnvelope> {
        let path = self.path(name)?;
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProbeError::SnapshotNotFound {
                    name: name.to_string(),
                })
            }
            Err(e) => return Err(ProbeError::io(path, e)),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn load(&self, name: &str) -> Result<Trace> {
        Ok(self.load_envelope(name)?.trace)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).map(|p| p.is_file()).unwrap_or(false)
    }

    /// `false` when there was nothing to delete.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let path = self.path(name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(snapshot = name, "snapshot deleted");
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

/// Writes through a sibling temp file and renames it into place.
pub(crate) fn write_json<T: Serialize>(dir: &Path, path: &Path, value: &T) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| ProbeError::io(dir, e))?;
    let body = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body).map_err(|e| ProbeError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| ProbeError::io(path, e))?;
    Ok(())
}

/// Sorted stems of `*.json` files; a missing directory lists as empty.
pub(crate) fn list_json_stems(dir: &Path) -> Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ProbeError::io(dir, e)),
    };
    let mut names = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ProbeError::io(dir, e))?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            names.push(stem.to_string());
        }
    }
    names.sort();
    Ok(names)
}
