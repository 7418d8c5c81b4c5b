//! Numerical stages of the PWS analysis.
//!
//! Stages are free functions over [`SpectralCube`](crate::data::SpectralCube)
//! data so they can be composed by the orchestrator or used on their own:
//! - `correction`: exposure, extra reflection and reference normalization
//! - `dust`: spatial Gaussian blur of references
//! - `filter`: zero-phase Butterworth low-pass along the spectral axis
//! - `domain`: spectral window selection and wavenumber resampling
//! - `polynomial`: per-pixel polynomial detrending
//! - `statistics`: RMS, autocorrelation, Ld and OPD

pub mod correction;
pub mod domain;
pub mod dust;
pub mod filter;
pub mod polynomial;
pub mod statistics;

pub use correction::{
    correct_camera_effects, divide_by_spectrum, normalize, normalize_by_exposure,
    normalize_by_reference, subtract_extra_reflection,
};
pub use domain::{select_range, to_wavenumber, wavenumbers};
pub use dust::{filter_dust, gaussian_blur};
pub use filter::{FilterCoefficients, filter_spectra};
pub use polynomial::{detrend, fit_polynomial};
pub use statistics::{AutocorrelationFit, OpdSpectra, autocorrelation, ld, opd, rms};
