use crate::chaos::FaultLabel;
use serde::Serialize;
use std::collections::BTreeMap;

/// Summary of what a chaos adapter did, one entry per batch position.
#[derive(Debug, Serialize, Clone, Default, PartialEq)]
pub struct ChaosReport {
    pub adapter: String,
    pub seed: Option<u64>,
    pub invocations: usize,
    pub faults_injected: usize,
    pub by_kind: BTreeMap<FaultLabel, usize>,
    pub decisions: BTreeMap<usize, Option<FaultLabel>>,
}

impl ChaosReport {
    pub fn from_decisions(
        adapter: &str,
        seed: Option<u64>,
        decisions: BTreeMap<usize, Option<FaultLabel>>,
    ) -> Self {
        let mut by_kind = BTreeMap::new();
        for label in decisions.values().flatten() {
            *by_kind.entry(*label).or_insert(0) += 1;
        }
        Self {
            adapter: adapter.to_string(),
            seed,
            invocations: decisions.len(),
            faults_injected: by_kind.values().sum(),
            by_kind,
            decisions,
        }
    }

    pub fn injection_rate(&self) -> f64 {
        if self.invocations == 0 {
            return 0.0;
        }
        self.faults_injected as f64 / self.invocations as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_kind() {
        let decisions = BTreeMap::from([
            (0, Some(FaultLabel::Failure)),
            (1, None),
            (2, Some(FaultLabel::Failure)),
            (3, Some(FaultLabel::Latency)),
        ]);
        let report = ChaosReport::from_decisions("chaos-bot", Some(42), decisions);
        assert_eq!(report.invocations, 4);
        assert_eq!(report.faults_injected, 3);
        assert_eq!(report.by_kind[&FaultLabel::Failure], 2);
        assert_eq!(report.injection_rate(), 0.75);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["by_kind"]["failure"], 2);
        assert_eq!(json["decisions"]["1"], serde_json::Value::Null);
    }
}
