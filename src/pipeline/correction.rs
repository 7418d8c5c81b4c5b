//! In-place normalization of a cube against exposure, extra reflection and a reference.
//!
//! Order matters and is enforced through the cube's [`ProcessingStatus`]:
//! camera correction, then exposure normalization, then extra reflection
//! subtraction, then division by the reference. Subtracting extra reflection
//! after the reference ratio is rejected.
//!
//! [`ProcessingStatus`]: crate::data::ProcessingStatus

use ndarray::{ArrayView3, ArrayViewMut3, Axis};

use crate::data::{CameraCorrection, SharedCube, SpectralCube};
use crate::error::{AnalysisError, Result};

/// Apply a camera correction to raw counts.
pub fn correct_camera_effects(cube: &mut SpectralCube, correction: &CameraCorrection) -> Result<()> {
    if cube.status().camera_corrected {
        return Err(AnalysisError::AlreadyApplied {
            step: "camera correction",
        });
    }
    correction.apply(cube.data_mut());
    cube.status_mut().camera_corrected = true;
    Ok(())
}

/// Divide every sample by the cube's exposure time, giving counts/ms.
pub fn normalize_by_exposure(cube: &mut SpectralCube) -> Result<()> {
    if cube.status().exposure_normalized {
        return Err(AnalysisError::AlreadyApplied {
            step: "exposure normalization",
        });
    }
    let exposure = cube.metadata().exposure_ms;
    if exposure.is_nan() || exposure <= 0.0 {
        return Err(AnalysisError::configuration(format!(
            "cube '{}' has invalid exposure {} ms",
            cube.metadata().id_tag,
            exposure
        )));
    }
    cube.data_mut().mapv_inplace(|v| (f64::from(v) / exposure) as f32);
    cube.status_mut().exposure_normalized = true;
    Ok(())
}

/// Subtract an extra reflection (already in counts/ms) from an exposure-normalized cube.
pub fn subtract_extra_reflection(
    cube: &mut SpectralCube,
    extra: ArrayView3<'_, f32>,
    extra_index: &[f64],
) -> Result<()> {
    let status = cube.status();
    if status.extra_reflection_subtracted {
        return Err(AnalysisError::AlreadyApplied {
            step: "extra reflection subtraction",
        });
    }
    if !status.exposure_normalized {
        return Err(AnalysisError::configuration(
            "extra reflection must be subtracted after exposure normalization",
        ));
    }
    if status.reference_normalized {
        return Err(AnalysisError::configuration(
            "extra reflection must be subtracted before reference normalization",
        ));
    }
    check_compatible(cube, extra.dim(), extra_index, "extra reflection")?;

    let mut data = cube.data_mut();
    data -= &extra;
    cube.status_mut().extra_reflection_subtracted = true;
    Ok(())
}

/// Divide a cube, pixelwise and per spectral index, by a prepared reference.
///
/// Fails with [`AnalysisError::ShapeMismatch`] before touching any data when
/// the spectral indices or spatial shapes differ.
pub fn normalize_by_reference(cube: &mut SpectralCube, reference: &SharedCube) -> Result<()> {
    if cube.status().reference_normalized {
        return Err(AnalysisError::AlreadyApplied {
            step: "reference normalization",
        });
    }
    check_compatible(cube, reference.dim(), reference.index(), "reference")?;

    let mut data = cube.data_mut();
    data /= &reference.view();
    cube.status_mut().reference_normalized = true;
    Ok(())
}

/// Divide every pixel's spectrum by a single spectrum.
pub fn divide_by_spectrum(mut data: ArrayViewMut3<'_, f32>, spectrum: &[f64]) -> Result<()> {
    if spectrum.len() != data.len_of(Axis(2)) {
        return Err(AnalysisError::shape_mismatch(format!(
            "spectrum has {} entries but the data has {} spectral samples",
            spectrum.len(),
            data.len_of(Axis(2))
        )));
    }
    for (k, &value) in spectrum.iter().enumerate() {
        data.index_axis_mut(Axis(2), k)
            .mapv_inplace(|v| (f64::from(v) / value) as f32);
    }
    Ok(())
}

/// Run the full sample normalization: camera correction when needed, exposure,
/// optional extra reflection subtraction, then the reference ratio.
pub fn normalize(
    cube: &mut SpectralCube,
    reference: &SharedCube,
    extra_reflection: Option<(ArrayView3<'_, f32>, &[f64])>,
    camera_correction: Option<&CameraCorrection>,
) -> Result<()> {
    // Structural checks first so no arithmetic runs on incompatible inputs
    check_compatible(cube, reference.dim(), reference.index(), "reference")?;
    if let Some((extra, index)) = extra_reflection {
        check_compatible(cube, extra.dim(), index, "extra reflection")?;
    }

    if !cube.status().camera_corrected {
        let correction = camera_correction.ok_or_else(|| {
            AnalysisError::configuration(format!(
                "cube '{}' is not camera corrected and no camera correction was configured",
                cube.metadata().id_tag
            ))
        })?;
        correct_camera_effects(cube, correction)?;
    }
    normalize_by_exposure(cube)?;
    if let Some((extra, index)) = extra_reflection {
        subtract_extra_reflection(cube, extra, index)?;
    }
    normalize_by_reference(cube, reference)
}

fn check_compatible(
    cube: &SpectralCube,
    other_dim: (usize, usize, usize),
    other_index: &[f64],
    what: &str,
) -> Result<()> {
    if cube.index().len() != other_index.len() {
        return Err(AnalysisError::shape_mismatch(format!(
            "cube '{}' has {} spectral samples but the {} has {}",
            cube.metadata().id_tag,
            cube.index().len(),
            what,
            other_index.len()
        )));
    }
    if cube.index() != other_index {
        return Err(AnalysisError::shape_mismatch(format!(
            "cube '{}' and the {} have different spectral indices",
            cube.metadata().id_tag,
            what
        )));
    }
    if cube.dim() != other_dim {
        return Err(AnalysisError::shape_mismatch(format!(
            "cube '{}' has shape {:?} but the {} has shape {:?}",
            cube.metadata().id_tag,
            cube.dim(),
            what,
            other_dim
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CubeMetadata, SharedBuffer};
    use ndarray::Array3;

    fn cube(value: f32, n: usize, exposure: f64) -> SpectralCube {
        SpectralCube::new(
            Array3::from_elem((2, 2, n), value),
            (0..n).map(|i| 500.0 + i as f64).collect(),
            CubeMetadata::new("sample", exposure),
        )
        .unwrap()
        .camera_corrected()
    }

    fn reference(value: f32, n: usize) -> SharedCube {
        SharedCube::new(
            SharedBuffer::new(Array3::from_elem((2, 2, n), value)),
            (0..n).map(|i| 500.0 + i as f64).collect(),
            "ref",
        )
    }

    #[test]
    fn test_exposure_normalization() {
        let mut c = cube(200.0, 3, 100.0);
        normalize_by_exposure(&mut c).unwrap();
        assert!(c.data().iter().all(|&v| v == 2.0));
        assert!(matches!(
            normalize_by_exposure(&mut c),
            Err(AnalysisError::AlreadyApplied { .. })
        ));
    }

    #[test]
    fn test_full_normalization_order() {
        let mut c = cube(300.0, 3, 100.0);
        let extra = Array3::from_elem((2, 2, 3), 1.0f32);
        let index: Vec<f64> = c.index().to_vec();
        normalize(&mut c, &reference(4.0, 3), Some((extra.view(), &index)), None).unwrap();
        // (300 / 100 - 1) / 4
        assert!(c.data().iter().all(|&v| (v - 0.5).abs() < 1e-6));
        let status = c.status();
        assert!(status.exposure_normalized);
        assert!(status.extra_reflection_subtracted);
        assert!(status.reference_normalized);
    }

    #[test]
    fn test_extra_reflection_after_ratio_is_rejected() {
        let mut c = cube(300.0, 3, 100.0);
        normalize_by_exposure(&mut c).unwrap();
        normalize_by_reference(&mut c, &reference(1.0, 3)).unwrap();
        let extra = Array3::from_elem((2, 2, 3), 1.0f32);
        let index: Vec<f64> = c.index().to_vec();
        assert!(matches!(
            subtract_extra_reflection(&mut c, extra.view(), &index),
            Err(AnalysisError::Configuration { .. })
        ));
    }

    #[test]
    fn test_mismatched_reference_leaves_data_untouched() {
        let mut c = cube(300.0, 4, 100.0);
        let result = normalize(&mut c, &reference(1.0, 3), None, None);
        assert!(matches!(result, Err(AnalysisError::ShapeMismatch { .. })));
        assert!(c.data().iter().all(|&v| v == 300.0));
        assert!(!c.status().exposure_normalized);
    }

    #[test]
    fn test_uncorrected_cube_without_correction_fails() {
        let mut c = SpectralCube::new(
            Array3::from_elem((2, 2, 3), 1.0),
            vec![500.0, 501.0, 502.0],
            CubeMetadata::new("raw", 1.0),
        )
        .unwrap();
        let result = normalize(&mut c, &reference(1.0, 3), None, None);
        assert!(matches!(result, Err(AnalysisError::Configuration { .. })));

        let correction = CameraCorrection::dark_counts(0.5);
        normalize(&mut c, &reference(1.0, 3), None, Some(&correction)).unwrap();
        assert!(c.data().iter().all(|&v| v == 0.5));
    }

    #[test]
    fn test_divide_by_spectrum() {
        let mut data = Array3::from_elem((1, 1, 2), 1.0f32);
        divide_by_spectrum(data.view_mut(), &[0.5, 0.25]).unwrap();
        assert_eq!(data.as_slice().unwrap(), &[2.0, 4.0]);
        assert!(divide_by_spectrum(data.view_mut(), &[1.0]).is_err());
    }
}
