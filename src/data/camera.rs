//! Camera dark-count and non-linearity correction descriptor.

use ndarray::ArrayViewMut3;
use serde::{Deserialize, Serialize};

/// Describes how raw camera counts are turned into linear counts.
///
/// `linearity_polynomial` holds the coefficients of powers 1, 2, ... (the
/// constant term is always zero) applied after dark counts are removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraCorrection {
    /// Dark counts per unbinned pixel
    pub dark_counts: f64,
    /// Linearity correction coefficients, ascending powers starting at 1
    #[serde(default)]
    pub linearity_polynomial: Option<Vec<f64>>,
    /// Pixel binning used during acquisition
    #[serde(default)]
    pub binning: Option<u32>,
}

impl CameraCorrection {
    /// Correction that only subtracts dark counts.
    pub fn dark_counts(dark_counts: f64) -> Self {
        Self {
            dark_counts,
            linearity_polynomial: None,
            binning: None,
        }
    }

    /// Set the linearity polynomial.
    pub fn with_linearity(mut self, coefficients: Vec<f64>) -> Self {
        self.linearity_polynomial = Some(coefficients);
        self
    }

    /// Dark counts after accounting for binning.
    pub fn effective_dark_counts(&self) -> f64 {
        let binning = f64::from(self.binning.unwrap_or(1));
        self.dark_counts * binning * binning
    }

    /// Apply the correction to raw counts in place.
    pub fn apply(&self, mut data: ArrayViewMut3<'_, f32>) {
        let dark = self.effective_dark_counts();
        let polynomial = self
            .linearity_polynomial
            .as_deref()
            .filter(|p| !p.is_empty() && *p != [1.0]);

        data.mapv_inplace(|raw| {
            let counts = f64::from(raw) - dark;
            let linear = match polynomial {
                // Horner evaluation of c1*x + c2*x^2 + ...
                Some(coefficients) => {
                    coefficients.iter().rev().fold(0.0, |acc, &c| (acc + c) * counts)
                }
                None => counts,
            };
            linear as f32
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_dark_counts_scale_with_binning() {
        let mut correction = CameraCorrection::dark_counts(100.0);
        correction.binning = Some(2);
        assert_eq!(correction.effective_dark_counts(), 400.0);
    }

    #[test]
    fn test_apply_dark_only() {
        let mut data = Array3::from_elem((1, 2, 3), 150.0f32);
        CameraCorrection::dark_counts(100.0).apply(data.view_mut());
        assert!(data.iter().all(|&v| v == 50.0));
    }

    #[test]
    fn test_apply_linearity() {
        let mut data = Array3::from_elem((1, 1, 1), 12.0f32);
        // 2 counts after dark removal, corrected as 1*x + 0.5*x^2 = 4
        CameraCorrection::dark_counts(10.0)
            .with_linearity(vec![1.0, 0.5])
            .apply(data.view_mut());
        assert_eq!(data[[0, 0, 0]], 4.0);
    }

    #[test]
    fn test_legacy_json_without_optional_keys() {
        let correction: CameraCorrection = serde_json::from_str(r#"{"darkCounts": 2000}"#).unwrap();
        assert_eq!(correction, CameraCorrection::dark_counts(2000.0));
    }
}
