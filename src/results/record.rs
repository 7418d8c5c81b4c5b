//! The immutable output of one analysis run.

use ndarray::{Array2, Array3};

use crate::analysis::AnalysisSettings;
use crate::constants::DATE_TIME_FORMAT;
use crate::error::{AnalysisError, Result};
use crate::pipeline::OpdSpectra;

/// Detrended reflectance over an evenly spaced wavenumber axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectanceCube {
    pub data: Array3<f32>,
    /// Angular wavenumbers in µm⁻¹
    pub wavenumbers: Vec<f64>,
}

/// Per-pixel values computed by the pipeline.
///
/// The advanced fields are `None` when the analysis skipped them.
#[derive(Debug, Clone, Default)]
pub struct ComputedFields {
    pub reflectance: Option<ReflectanceCube>,
    pub mean_reflectance: Option<Array2<f32>>,
    pub rms: Option<Array2<f32>>,
    pub polynomial_rms: Option<Array2<f32>>,
    pub autocorrelation_slope: Option<Array2<f32>>,
    pub r_squared: Option<Array2<f32>>,
    pub ld: Option<Array2<f32>>,
    pub opd: Option<OpdSpectra>,
}

/// Identity of the inputs that produced a result.
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    pub im_cube_id_tag: String,
    pub reference_id_tag: String,
    pub extra_reflection_tag: Option<String>,
}

/// Results of analyzing one cube with one set of settings.
///
/// Created once by [`AnalysisResults::create`] and never modified. Every 2D
/// and 3D field shares the (row, column) shape of the analyzed cube.
#[derive(Debug, Clone)]
pub struct AnalysisResults {
    time: String,
    settings: AnalysisSettings,
    reflectance: ReflectanceCube,
    mean_reflectance: Array2<f32>,
    rms: Array2<f32>,
    polynomial_rms: Option<Array2<f32>>,
    autocorrelation_slope: Option<Array2<f32>>,
    r_squared: Option<Array2<f32>>,
    ld: Option<Array2<f32>>,
    opd: Option<OpdSpectra>,
    provenance: Provenance,
}

impl AnalysisResults {
    /// Package computed fields, stamping the current local time.
    pub fn create(
        settings: AnalysisSettings,
        fields: ComputedFields,
        provenance: Provenance,
    ) -> Result<Self> {
        let time = chrono::Local::now().format(DATE_TIME_FORMAT).to_string();
        Self::from_parts(time, settings, fields, provenance)
    }

    /// Rebuild a record from stored parts, checking field presence and shapes.
    pub fn from_parts(
        time: String,
        settings: AnalysisSettings,
        fields: ComputedFields,
        provenance: Provenance,
    ) -> Result<Self> {
        let reflectance = fields
            .reflectance
            .ok_or_else(|| AnalysisError::missing_field("reflectance"))?;
        let mean_reflectance = fields
            .mean_reflectance
            .ok_or_else(|| AnalysisError::missing_field("meanReflectance"))?;
        let rms = fields.rms.ok_or_else(|| AnalysisError::missing_field("rms"))?;

        let (rows, cols, len) = reflectance.data.dim();
        if len != reflectance.wavenumbers.len() {
            return Err(AnalysisError::shape_mismatch(format!(
                "reflectance has {} spectral samples but {} wavenumbers",
                len,
                reflectance.wavenumbers.len()
            )));
        }
        let expected = (rows, cols);
        let maps = [
            ("meanReflectance", Some(&mean_reflectance)),
            ("rms", Some(&rms)),
            ("polynomialRms", fields.polynomial_rms.as_ref()),
            ("autoCorrelationSlope", fields.autocorrelation_slope.as_ref()),
            ("rSquared", fields.r_squared.as_ref()),
            ("ld", fields.ld.as_ref()),
        ];
        for (name, map) in maps {
            if let Some(map) = map {
                if map.dim() != expected {
                    return Err(AnalysisError::shape_mismatch(format!(
                        "{} has shape {:?} but the reflectance is {:?}",
                        name,
                        map.dim(),
                        expected
                    )));
                }
            }
        }
        if let Some(opd) = &fields.opd {
            let (r, c, bins) = opd.data.dim();
            if (r, c) != expected || bins != opd.index.len() {
                return Err(AnalysisError::shape_mismatch(format!(
                    "opd has shape {:?} with {} index values, reflectance is {:?}",
                    opd.data.dim(),
                    opd.index.len(),
                    expected
                )));
            }
        }

        Ok(Self {
            time,
            settings,
            reflectance,
            mean_reflectance,
            rms,
            polynomial_rms: fields.polynomial_rms,
            autocorrelation_slope: fields.autocorrelation_slope,
            r_squared: fields.r_squared,
            ld: fields.ld,
            opd: fields.opd,
            provenance,
        })
    }

    /// Creation time, formatted `%d-%m-%Y %H:%M:%S`.
    pub fn time(&self) -> &str {
        &self.time
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Reflectance after every correction and polynomial removal.
    pub fn reflectance(&self) -> &ReflectanceCube {
        &self.reflectance
    }

    /// Spectral mean of each pixel over the analyzed wavelength window.
    pub fn mean_reflectance(&self) -> &Array2<f32> {
        &self.mean_reflectance
    }

    pub fn rms(&self) -> &Array2<f32> {
        &self.rms
    }

    pub fn polynomial_rms(&self) -> Option<&Array2<f32>> {
        self.polynomial_rms.as_ref()
    }

    pub fn autocorrelation_slope(&self) -> Option<&Array2<f32>> {
        self.autocorrelation_slope.as_ref()
    }

    pub fn r_squared(&self) -> Option<&Array2<f32>> {
        self.r_squared.as_ref()
    }

    pub fn ld(&self) -> Option<&Array2<f32>> {
        self.ld.as_ref()
    }

    pub fn opd(&self) -> Option<&OpdSpectra> {
        self.opd.as_ref()
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn im_cube_id_tag(&self) -> &str {
        &self.provenance.im_cube_id_tag
    }

    pub fn reference_id_tag(&self) -> &str {
        &self.provenance.reference_id_tag
    }

    pub fn extra_reflection_tag(&self) -> Option<&str> {
        self.provenance.extra_reflection_tag.as_deref()
    }

    /// (rows, columns) shared by every field.
    pub fn spatial_dim(&self) -> (usize, usize) {
        let (rows, cols, _) = self.reflectance.data.dim();
        (rows, cols)
    }
}
