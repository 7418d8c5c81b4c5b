//! Running the PWS analysis over cubes.
//!
//! [`Analysis`] prepares a reference once and then analyzes any number of
//! cubes; [`run_batch`] does so in parallel with per-cube failure isolation.

pub mod batch;
pub mod orchestrator;
pub mod settings;
pub mod warnings;

#[cfg(test)]
mod tests;

pub use batch::{BatchJob, BatchReport, CubeOutcome, run_batch};
pub use orchestrator::{Analysis, PipelineStage};
pub use settings::{AnalysisSettings, OpdSettings};
pub use warnings::{AnalysisWarning, WarningKind};
