//! PWS analysis - Partial Wave Spectroscopy analysis pipeline
//!
//! Turns hyperspectral image cubes from a PWS microscope into per-pixel
//! quantities (mean reflectance, spectral RMS, autocorrelation decay, Ld and
//! optical path difference spectra) and stores them in versioned results
//! files that can be read back one field at a time.
//!
//! The usual flow is:
//! 1. load a reference and sample cubes ([`data::npy`])
//! 2. prepare an [`analysis::Analysis`] from [`analysis::AnalysisSettings`]
//! 3. run it per cube, or over many cubes with [`analysis::run_batch`]
//! 4. save with [`results::save_results`] and read back with [`results::LazyResults`]

pub mod analysis;
pub mod config;
pub mod constants;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod reflection;
pub mod results;

pub use analysis::{Analysis, AnalysisSettings, AnalysisWarning};
pub use data::SpectralCube;
pub use error::{AnalysisError, Result};
pub use results::{AnalysisResults, LazyResults};
