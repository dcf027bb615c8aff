pub mod accounting;
pub mod runner;

pub use accounting::RunAccounting;
pub use runner::{Runner, RunnerSettings};
