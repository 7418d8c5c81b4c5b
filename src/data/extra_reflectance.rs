//! System stray-reflectance calibration and its conversion into reference units.

use ndarray::{Array3, ArrayView3, Axis, Zip};
use serde::{Deserialize, Serialize};

use crate::data::shared::SharedBuffer;
use crate::error::{AnalysisError, Result};

/// Identity of an extra reflectance calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraReflectanceMetadata {
    pub id_tag: String,
    /// Numerical aperture the calibration was measured at
    pub numerical_aperture: f64,
}

/// Extra reflectance of a PWS system in units of reflectance (0 to 1).
#[derive(Debug, Clone)]
pub struct ExtraReflectanceCube {
    data: Array3<f32>,
    wavelengths: Vec<f64>,
    metadata: ExtraReflectanceMetadata,
}

impl ExtraReflectanceCube {
    pub fn new(
        data: Array3<f32>,
        wavelengths: Vec<f64>,
        metadata: ExtraReflectanceMetadata,
    ) -> Result<Self> {
        if wavelengths.len() != data.dim().2 {
            return Err(AnalysisError::shape_mismatch(format!(
                "extra reflectance has {} wavelengths but {} spectral samples",
                wavelengths.len(),
                data.dim().2
            )));
        }
        if data.iter().any(|&v| !(0.0..=1.0).contains(&v)) {
            log::warn!(
                "Extra reflectance '{}' has values outside 0-1",
                metadata.id_tag
            );
        }
        Ok(Self {
            data,
            wavelengths,
            metadata,
        })
    }

    pub fn data(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    pub fn metadata(&self) -> &ExtraReflectanceMetadata {
        &self.metadata
    }
}

/// Extra reflection expressed in the units of a particular reference
/// measurement (usually counts/ms), ready to be subtracted from raw data.
#[derive(Debug, Clone)]
pub struct ExtraReflectionCube {
    buffer: SharedBuffer,
    wavelengths: Vec<f64>,
    id_tag: String,
}

impl ExtraReflectionCube {
    /// Convert a reflectance calibration into reference units.
    ///
    /// The reference is modeled as `I0 * (theory_r + extra)`, so the source
    /// intensity is `I0 = reference / (theory_r + extra)` and the extra
    /// reflection in counts is `extra * I0`.
    pub fn create(
        reflectance: &ExtraReflectanceCube,
        theory_r: &[f64],
        reference: ArrayView3<'_, f32>,
        reference_wavelengths: &[f64],
    ) -> Result<Self> {
        if reflectance.wavelengths() != reference_wavelengths {
            return Err(AnalysisError::shape_mismatch(
                "extra reflectance wavelengths do not match the reference",
            ));
        }
        if theory_r.len() != reference_wavelengths.len() {
            return Err(AnalysisError::shape_mismatch(
                "theoretical reflectance length does not match the reference",
            ));
        }
        if reflectance.data.dim() != reference.dim() {
            return Err(AnalysisError::shape_mismatch(format!(
                "extra reflectance shape {:?} does not match reference shape {:?}",
                reflectance.data.dim(),
                reference.dim()
            )));
        }

        let mut data = Array3::<f32>::zeros(reference.dim());
        for (k, &theory) in theory_r.iter().enumerate() {
            Zip::from(data.index_axis_mut(Axis(2), k))
                .and(reference.index_axis(Axis(2), k))
                .and(reflectance.data.index_axis(Axis(2), k))
                .for_each(|out, &r, &er| {
                    let i0 = f64::from(r) / (theory + f64::from(er));
                    *out = (f64::from(er) * i0) as f32;
                });
        }

        Ok(Self {
            buffer: SharedBuffer::new(data),
            wavelengths: reference_wavelengths.to_vec(),
            id_tag: reflectance.metadata.id_tag.clone(),
        })
    }

    pub fn data(&self) -> ArrayView3<'_, f32> {
        self.buffer.view()
    }

    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    pub fn id_tag(&self) -> &str {
        &self.id_tag
    }
}
