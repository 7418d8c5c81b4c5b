//! Non-fatal conditions reported alongside analysis results.

use std::fmt;

/// What a warning is about.
#[derive(Debug, Clone, PartialEq)]
pub enum WarningKind {
    /// No reference material configured; theoretical reflectance is ignored
    IgnoredReferenceMaterial,
    /// No extra reflectance calibration was supplied
    IgnoredExtraReflection,
    /// Calibration and analysis were done at different numerical apertures
    NumericalApertureMismatch { calibration: f64, analysis: f64 },
    /// Some pixels of a derived statistic are NaN or infinite
    NumericDegeneracy { field: &'static str, pixels: usize },
}

/// A warning with a short title and a longer explanation.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisWarning {
    pub kind: WarningKind,
    pub short: String,
    pub long: String,
}

impl AnalysisWarning {
    pub fn new(kind: WarningKind, short: impl Into<String>, long: impl Into<String>) -> Self {
        Self {
            kind,
            short: short.into(),
            long: long.into(),
        }
    }

    pub fn ignored_reference_material() -> Self {
        Self::new(
            WarningKind::IgnoredReferenceMaterial,
            "Ignoring reference material",
            "Analysis ignoring reference material correction. Extra reflection subtraction can not be performed.",
        )
    }

    pub fn ignored_extra_reflection() -> Self {
        Self::new(
            WarningKind::IgnoredExtraReflection,
            "Ignoring extra reflection correction",
            "No extra reflectance calibration was supplied.",
        )
    }

    pub fn numerical_aperture_mismatch(calibration: f64, analysis: f64) -> Self {
        Self::new(
            WarningKind::NumericalApertureMismatch {
                calibration,
                analysis,
            },
            "NA mismatch!",
            format!(
                "The numerical aperture of your analysis does not match the NA of the extra reflectance calibration. Calibration file NA: {}. Analysis NA: {}.",
                calibration, analysis
            ),
        )
    }

    pub fn numeric_degeneracy(field: &'static str, pixels: usize, total: usize) -> Self {
        Self::new(
            WarningKind::NumericDegeneracy { field, pixels },
            format!("Non-finite {}", field),
            format!("{} of {} pixels have a non-finite {}.", pixels, total, field),
        )
    }
}

impl fmt::Display for AnalysisWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.short, self.long)
    }
}
