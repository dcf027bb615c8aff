//! Seeded fault injection for AgentProbe adapters.
//!
//! [`ChaosAdapter`] wraps any [`agentprobe_core::Adapter`] and perturbs its
//! traces according to a [`ChaosPolicy`]. The trace perturbations themselves
//! live in [`mutators`].

pub mod chaos;
pub mod mutators;
pub mod report;

pub use chaos::{ChaosAdapter, ChaosPolicy, FaultKind, FaultLabel, FaultSpec};
pub use mutators::ToolFaultKind;
pub use report::ChaosReport;
