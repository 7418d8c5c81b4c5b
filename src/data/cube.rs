//! Spectral image cube: a (row, column, spectral-index) array plus its axis.

use ndarray::{Array2, Array3, ArrayView3, ArrayViewMut3, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// What the values of a cube's spectral index represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpectralAxis {
    /// Wavelengths in nanometers
    Wavelength,
    /// Angular wavenumbers (2π/λ) in inverse micrometers, evenly spaced
    Wavenumber,
}

/// Acquisition metadata carried along with a cube.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CubeMetadata {
    /// Stable identity of the acquisition, used for provenance
    pub id_tag: String,
    /// Exposure time in milliseconds
    pub exposure_ms: f64,
    /// Physical size of one pixel in micrometers, if it was recorded
    #[serde(default)]
    pub pixel_size_um: Option<f64>,
}

impl CubeMetadata {
    /// Create metadata with no pixel size.
    pub fn new(id_tag: impl Into<String>, exposure_ms: f64) -> Self {
        Self {
            id_tag: id_tag.into(),
            exposure_ms,
            pixel_size_um: None,
        }
    }

    /// Set the pixel size in micrometers.
    pub fn with_pixel_size(mut self, pixel_size_um: f64) -> Self {
        self.pixel_size_um = Some(pixel_size_um);
        self
    }
}

/// Which one-shot corrections have already been applied to a cube.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingStatus {
    pub camera_corrected: bool,
    pub exposure_normalized: bool,
    pub extra_reflection_subtracted: bool,
    pub reference_normalized: bool,
}

/// A hyperspectral cube of reflectance or intensity samples.
///
/// Data is stored as `f32` with axes (row, column, spectral index). The
/// spectral index is strictly increasing and its length always equals the
/// third dimension of the data. Correction functions mutate a cube in place;
/// range selection and domain conversion return a new cube.
#[derive(Debug, Clone)]
pub struct SpectralCube {
    data: Array3<f32>,
    index: Vec<f64>,
    axis: SpectralAxis,
    metadata: CubeMetadata,
    status: ProcessingStatus,
}

impl SpectralCube {
    /// Create a wavelength-indexed cube.
    pub fn new(data: Array3<f32>, wavelengths: Vec<f64>, metadata: CubeMetadata) -> Result<Self> {
        Self::with_axis(data, wavelengths, SpectralAxis::Wavelength, metadata)
    }

    /// Create a cube with an explicit axis kind.
    pub fn with_axis(
        data: Array3<f32>,
        index: Vec<f64>,
        axis: SpectralAxis,
        metadata: CubeMetadata,
    ) -> Result<Self> {
        validate_index(&index, data.dim().2)?;
        Ok(Self {
            data,
            index,
            axis,
            metadata,
            status: ProcessingStatus::default(),
        })
    }

    /// Mark the cube as already camera corrected (e.g. by the acquisition software).
    pub fn camera_corrected(mut self) -> Self {
        self.status.camera_corrected = true;
        self
    }

    /// Sample data, axes (row, column, spectral index).
    pub fn data(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// Mutable access to the sample data. The shape cannot change through this view.
    pub fn data_mut(&mut self) -> ArrayViewMut3<'_, f32> {
        self.data.view_mut()
    }

    /// The spectral index (wavelengths or wavenumbers).
    pub fn index(&self) -> &[f64] {
        &self.index
    }

    pub fn axis(&self) -> SpectralAxis {
        self.axis
    }

    pub fn metadata(&self) -> &CubeMetadata {
        &self.metadata
    }

    pub fn status(&self) -> ProcessingStatus {
        self.status
    }

    pub(crate) fn status_mut(&mut self) -> &mut ProcessingStatus {
        &mut self.status
    }

    /// (rows, columns, spectral length)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Spatial (rows, columns) shape.
    pub fn spatial_dim(&self) -> (usize, usize) {
        let (rows, cols, _) = self.data.dim();
        (rows, cols)
    }

    /// Mean of every pixel's spectrum.
    pub fn spectral_mean(&self) -> Array2<f32> {
        let n = self.index.len().max(1) as f64;
        self.data
            .map_axis(Axis(2), |lane| (lane.iter().map(|&v| f64::from(v)).sum::<f64>() / n) as f32)
    }

    /// Build a cube sharing this cube's metadata and status with new data and index.
    pub(crate) fn derive(&self, data: Array3<f32>, index: Vec<f64>, axis: SpectralAxis) -> Result<Self> {
        validate_index(&index, data.dim().2)?;
        Ok(Self {
            data,
            index,
            axis,
            metadata: self.metadata.clone(),
            status: self.status,
        })
    }

    /// Decompose into data, index and metadata.
    pub fn into_parts(self) -> (Array3<f32>, Vec<f64>, CubeMetadata) {
        (self.data, self.index, self.metadata)
    }
}

fn validate_index(index: &[f64], spectral_len: usize) -> Result<()> {
    if index.len() != spectral_len {
        return Err(AnalysisError::shape_mismatch(format!(
            "spectral index has {} entries but the data has {} spectral samples",
            index.len(),
            spectral_len
        )));
    }
    if index
        .windows(2)
        .any(|w| w[1].partial_cmp(&w[0]) != Some(std::cmp::Ordering::Greater))
    {
        return Err(AnalysisError::configuration(
            "spectral index must be strictly increasing",
        ));
    }
    Ok(())
}
