//! Data structures for PWS acquisitions and calibrations.
//!
//! This module provides:
//! - `SpectralCube`: a (row, column, spectral-index) cube with metadata
//! - `CameraCorrection`: dark-count and linearity correction descriptor
//! - `ExtraReflectanceCube` / `ExtraReflectionCube`: stray reflectance calibration
//! - `SharedBuffer` / `SharedCube`: read-only data shared between workers
//! - `npy`: loading acquisitions stored as NumPy arrays

mod camera;
mod cube;
mod extra_reflectance;
pub mod npy;
mod shared;

pub use camera::CameraCorrection;
pub use cube::{CubeMetadata, ProcessingStatus, SpectralAxis, SpectralCube};
pub use extra_reflectance::{ExtraReflectanceCube, ExtraReflectanceMetadata, ExtraReflectionCube};
pub use shared::{SharedBuffer, SharedCube};
