//! Parallel analysis of many cubes sharing one reference.
//!
//! Cubes run on the rayon pool. A failure is recorded against the cube that
//! caused it and never stops sibling work. Cancellation is checked before each
//! cube starts; a cube already running finishes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rayon::prelude::*;

use super::orchestrator::Analysis;
use super::warnings::AnalysisWarning;
use crate::data::SpectralCube;
use crate::error::{AnalysisError, Result};
use crate::results::{self, AnalysisResults};

/// One unit of batch work.
#[derive(Debug)]
pub struct BatchJob {
    pub cube: SpectralCube,
    /// Acquisition directory and analysis name to save results under
    pub destination: Option<(PathBuf, String)>,
}

impl BatchJob {
    /// Analyze a cube and keep its results in memory.
    pub fn in_memory(cube: SpectralCube) -> Self {
        Self {
            cube,
            destination: None,
        }
    }

    /// Analyze a cube and save its results into `<acquisition_dir>/analyses`.
    pub fn saved(cube: SpectralCube, acquisition_dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            cube,
            destination: Some((acquisition_dir.into(), name.into())),
        }
    }
}

/// What happened to one cube.
#[derive(Debug)]
pub enum CubeOutcome {
    Completed {
        warnings: Vec<AnalysisWarning>,
        /// Results kept in memory (jobs without a destination)
        results: Option<AnalysisResults>,
        /// Path written (jobs with a destination)
        saved_to: Option<PathBuf>,
    },
    Failed(AnalysisError),
    Cancelled,
}

impl CubeOutcome {
    /// In-memory results of a completed cube, or why there are none.
    ///
    /// Cubes skipped by cancellation give [`AnalysisError::Cancelled`]; saved
    /// cubes give `Ok(None)`.
    pub fn into_result(self) -> Result<Option<AnalysisResults>> {
        match self {
            CubeOutcome::Completed { results, .. } => Ok(results),
            CubeOutcome::Failed(e) => Err(e),
            CubeOutcome::Cancelled => Err(AnalysisError::Cancelled),
        }
    }
}

/// Outcome of every cube in a batch, in submission order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub entries: Vec<(String, CubeOutcome)>,
}

impl BatchReport {
    /// Cubes that completed without any warning.
    pub fn completed(&self) -> Vec<&str> {
        self.filter(|o| matches!(o, CubeOutcome::Completed { warnings, .. } if warnings.is_empty()))
    }

    /// Cubes that completed with at least one warning.
    pub fn completed_with_warnings(&self) -> Vec<&str> {
        self.filter(|o| matches!(o, CubeOutcome::Completed { warnings, .. } if !warnings.is_empty()))
    }

    /// Cubes that failed, with their errors.
    pub fn failed(&self) -> Vec<(&str, &AnalysisError)> {
        self.entries
            .iter()
            .filter_map(|(id, outcome)| match outcome {
                CubeOutcome::Failed(e) => Some((id.as_str(), e)),
                _ => None,
            })
            .collect()
    }

    /// Cubes that never started because the batch was cancelled.
    pub fn cancelled(&self) -> Vec<&str> {
        self.filter(|o| matches!(o, CubeOutcome::Cancelled))
    }

    pub fn is_success(&self) -> bool {
        self.failed().is_empty() && self.cancelled().is_empty()
    }

    fn filter(&self, predicate: impl Fn(&CubeOutcome) -> bool) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, outcome)| predicate(outcome))
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} cubes: {} completed, {} completed with warnings, {} failed, {} cancelled",
            self.entries.len(),
            self.completed().len(),
            self.completed_with_warnings().len(),
            self.failed().len(),
            self.cancelled().len()
        )?;
        for (id, outcome) in &self.entries {
            match outcome {
                CubeOutcome::Completed { warnings, .. } if !warnings.is_empty() => {
                    writeln!(f, "  {}: completed with warnings", id)?;
                    for warning in warnings {
                        writeln!(f, "    - {}", warning.short)?;
                    }
                }
                CubeOutcome::Failed(e) => writeln!(f, "  {}: failed: {}", id, e)?,
                CubeOutcome::Cancelled => writeln!(f, "  {}: cancelled", id)?,
                CubeOutcome::Completed { .. } => {}
            }
        }
        Ok(())
    }
}

/// Analyze every job in parallel.
pub fn run_batch(analysis: &Analysis, jobs: Vec<BatchJob>, cancel: &AtomicBool) -> BatchReport {
    let start = Instant::now();
    let total = jobs.len();
    log::info!("Starting batch of {} cubes", total);

    let entries: Vec<(String, CubeOutcome)> = jobs
        .into_par_iter()
        .map(|job| {
            let id = job.cube.metadata().id_tag.clone();
            if cancel.load(Ordering::Relaxed) {
                log::debug!("Skipping '{}': batch cancelled", id);
                return (id, CubeOutcome::Cancelled);
            }
            let outcome = match process(analysis, job) {
                Ok(outcome) => outcome,
                Err(e) if e.is_structural() => {
                    log::warn!("Analysis of '{}' failed: {}", id, e);
                    CubeOutcome::Failed(e)
                }
                Err(e) => {
                    log::error!("Analysis of '{}' failed: {}", id, e);
                    CubeOutcome::Failed(e)
                }
            };
            (id, outcome)
        })
        .collect();

    let report = BatchReport { entries };
    log::info!(
        "Finished batch of {} cubes in {:.2} s ({} failed, {} cancelled)",
        total,
        start.elapsed().as_secs_f64(),
        report.failed().len(),
        report.cancelled().len()
    );
    report
}

fn process(analysis: &Analysis, job: BatchJob) -> Result<CubeOutcome> {
    let (results, warnings) = analysis.run(job.cube)?;
    match job.destination {
        Some((directory, name)) => {
            let path = save(&results, &directory, &name)?;
            Ok(CubeOutcome::Completed {
                warnings,
                results: None,
                saved_to: Some(path),
            })
        }
        None => Ok(CubeOutcome::Completed {
            warnings,
            results: Some(results),
            saved_to: None,
        }),
    }
}

fn save(results: &AnalysisResults, acquisition_dir: &Path, name: &str) -> Result<PathBuf> {
    results::save_results(results, acquisition_dir, name)
}
