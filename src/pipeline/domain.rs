//! Spectral window selection and wavelength to wavenumber conversion.

use ndarray::{Array3, Axis, Slice, Zip};

use crate::data::{SpectralAxis, SpectralCube};
use crate::error::{AnalysisError, Result};

/// Return a new cube restricted to spectral indices within `[start, stop]`.
pub fn select_range(cube: &SpectralCube, start: f64, stop: f64) -> Result<SpectralCube> {
    let first = cube.index().partition_point(|&v| v < start);
    let end = cube.index().partition_point(|&v| v <= stop);
    if first >= end {
        return Err(AnalysisError::EmptyRange { start, stop });
    }

    let data = cube
        .data()
        .slice_axis(Axis(2), Slice::from(first..end))
        .to_owned();
    let index = cube.index()[first..end].to_vec();
    log::trace!(
        "Selected {} of {} spectral samples in [{}, {}]",
        index.len(),
        cube.index().len(),
        start,
        stop
    );
    cube.derive(data, index, cube.axis())
}

/// Angular wavenumbers (µm⁻¹) of wavelengths given in nm.
pub fn wavenumbers(wavelengths_nm: &[f64]) -> Vec<f64> {
    wavelengths_nm
        .iter()
        .map(|&wl| 2.0 * std::f64::consts::PI / (wl * 1e-3))
        .collect()
}

/// Convert a wavelength cube into a wavenumber cube.
///
/// Wavenumbers of the original samples are unevenly spaced; the data is
/// linearly interpolated onto an evenly spaced, increasing grid spanning the
/// same range with the same number of samples.
pub fn to_wavenumber(cube: &SpectralCube) -> Result<SpectralCube> {
    if cube.axis() == SpectralAxis::Wavenumber {
        return Err(AnalysisError::configuration(format!(
            "cube '{}' is already in the wavenumber domain",
            cube.metadata().id_tag
        )));
    }

    // Increasing wavelength gives decreasing wavenumber
    let mut k = wavenumbers(cube.index());
    k.reverse();
    let n = k.len();
    let grid = even_grid(&k);

    // (lower sample, weight of the upper sample) on the reversed axis
    let stencil: Vec<(usize, f64)> = grid
        .iter()
        .map(|&target| {
            if n < 2 {
                return (0, 0.0);
            }
            let upper = k.partition_point(|&v| v < target).clamp(1, n - 1);
            let lower = upper - 1;
            let t = ((target - k[lower]) / (k[upper] - k[lower])).clamp(0.0, 1.0);
            (lower, t)
        })
        .collect();

    let data = cube.data();
    let mut out = Array3::<f32>::zeros(data.dim());
    Zip::from(out.lanes_mut(Axis(2)))
        .and(data.lanes(Axis(2)))
        .par_for_each(|mut out_lane, lane| {
            for (slot, &(lower, t)) in out_lane.iter_mut().zip(&stencil) {
                // Reversed storage: position i on the wavenumber axis is n - 1 - i
                let a = f64::from(lane[n - 1 - lower]);
                if t == 0.0 {
                    *slot = a as f32;
                    continue;
                }
                let b = f64::from(lane[n - 2 - lower]);
                *slot = if t == 1.0 { b as f32 } else { (a + t * (b - a)) as f32 };
            }
        });

    cube.derive(out, grid, SpectralAxis::Wavenumber)
}

/// Evenly spaced grid with the same endpoints and length as `values`.
fn even_grid(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    match (values.first(), values.last()) {
        (Some(&first), Some(&last)) if n > 1 => {
            let step = (last - first) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { last } else { first + step * i as f64 })
                .collect()
        }
        _ => values.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CubeMetadata;
    use approx::assert_relative_eq;

    fn cube(wavelengths: Vec<f64>, f: impl Fn(f64) -> f32) -> SpectralCube {
        let n = wavelengths.len();
        let data = Array3::from_shape_fn((2, 2, n), |(_, _, k)| f(wavelengths[k]));
        SpectralCube::new(data, wavelengths, CubeMetadata::new("c", 1.0)).unwrap()
    }

    #[test]
    fn test_select_range_is_inclusive() {
        let c = cube((0..10).map(|i| 500.0 + 10.0 * i as f64).collect(), |wl| wl as f32);
        let selected = select_range(&c, 520.0, 560.0).unwrap();
        assert_eq!(selected.index(), &[520.0, 530.0, 540.0, 550.0, 560.0]);
        assert_eq!(selected.dim(), (2, 2, 5));
        assert_eq!(selected.data()[[0, 0, 0]], 520.0);
        let lane = selected.data().index_axis_move(Axis(0), 1).index_axis_move(Axis(0), 0);
        for (&value, &wl) in lane.iter().zip(selected.index()) {
            assert_eq!(f64::from(value), wl);
        }
    }

    #[test]
    fn test_select_empty_range() {
        let c = cube(vec![500.0, 510.0, 520.0], |_| 1.0);
        assert!(matches!(
            select_range(&c, 600.0, 700.0),
            Err(AnalysisError::EmptyRange { .. })
        ));
        assert!(matches!(
            select_range(&c, 511.0, 519.0),
            Err(AnalysisError::EmptyRange { .. })
        ));
    }

    #[test]
    fn test_wavenumber_grid_is_even_and_increasing() {
        let c = cube((0..21).map(|i| 500.0 + 10.0 * i as f64).collect(), |_| 1.0);
        let k = to_wavenumber(&c).unwrap();
        assert_eq!(k.axis(), SpectralAxis::Wavenumber);

        let index = k.index();
        assert_relative_eq!(index[0], 2.0 * std::f64::consts::PI / 0.7, epsilon = 1e-12);
        assert_relative_eq!(index[20], 2.0 * std::f64::consts::PI / 0.5, epsilon = 1e-12);
        let step = index[1] - index[0];
        for w in index.windows(2) {
            assert_relative_eq!(w[1] - w[0], step, epsilon = 1e-9);
        }
        assert!(k.data().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_wavenumber_interpolation_is_linear_in_k() {
        // A signal linear in wavenumber must survive resampling
        let c = cube((0..11).map(|i| 500.0 + 20.0 * i as f64).collect(), |wl| {
            (2.0 * std::f64::consts::PI / (wl * 1e-3)) as f32
        });
        let k = to_wavenumber(&c).unwrap();
        let lane = k.data().index_axis_move(Axis(0), 1).index_axis_move(Axis(0), 1);
        for (value, &index) in lane.iter().zip(k.index()) {
            assert_relative_eq!(f64::from(*value), index, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_conversion_is_one_shot() {
        let c = cube(vec![500.0, 510.0], |_| 1.0);
        let k = to_wavenumber(&c).unwrap();
        assert!(to_wavenumber(&k).is_err());
    }
}
