//! Per-pixel least-squares polynomial fits along the spectral axis.
//!
//! Every pixel shares the same spectral index, so the normal equations
//! `VᵀV c = Vᵀy` have the same left-hand side for all pixels. It is factored
//! once (LU) and each pixel only forms `Vᵀy` and back-substitutes.
//! Coefficients are in ascending power order of a centered and scaled index,
//! which leaves the fitted values identical to a fit against the raw index.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array3, ArrayView3, Axis, Zip};

use crate::data::SpectralCube;
use crate::error::{AnalysisError, Result};

/// Fitted polynomial values for every pixel, same shape as `data`.
pub fn fit_polynomial(data: ArrayView3<'_, f32>, index: &[f64], order: usize) -> Result<Array3<f32>> {
    let n = index.len();
    if n != data.len_of(Axis(2)) {
        return Err(AnalysisError::shape_mismatch(format!(
            "spectral index has {} entries but the data has {} spectral samples",
            n,
            data.len_of(Axis(2))
        )));
    }
    let terms = order + 1;
    if n < terms {
        return Err(AnalysisError::configuration(format!(
            "a polynomial of order {} needs at least {} spectral samples, found {}",
            order, terms, n
        )));
    }

    let basis = vandermonde(index, terms);
    let normal = basis.transpose() * &basis;
    let lu = normal.lu();
    if !lu.is_invertible() {
        return Err(AnalysisError::configuration(format!(
            "polynomial fit of order {} is singular for this spectral index",
            order
        )));
    }

    let mut fitted = Array3::<f32>::zeros(data.dim());
    Zip::from(fitted.lanes_mut(Axis(2)))
        .and(data.lanes(Axis(2)))
        .par_for_each(|mut out, lane| {
            let rhs = DVector::from_iterator(
                terms,
                (0..terms).map(|j| {
                    lane.iter()
                        .enumerate()
                        .map(|(i, &y)| basis[(i, j)] * f64::from(y))
                        .sum::<f64>()
                }),
            );
            match lu.solve(&rhs) {
                Some(coefficients) => {
                    for (i, slot) in out.iter_mut().enumerate() {
                        let value: f64 = (0..terms).map(|j| basis[(i, j)] * coefficients[j]).sum();
                        *slot = value as f32;
                    }
                }
                None => out.fill(f32::NAN),
            }
        });
    Ok(fitted)
}

/// Fit a polynomial to every pixel of the cube, subtract it in place and
/// return the fitted values.
pub fn detrend(cube: &mut SpectralCube, order: usize) -> Result<Array3<f32>> {
    let fitted = fit_polynomial(cube.data(), cube.index(), order)?;
    let mut data = cube.data_mut();
    data -= &fitted;
    Ok(fitted)
}

/// Design matrix with columns `u^0 .. u^(terms-1)`, `u` being the index
/// mapped onto `[-1, 1]`.
fn vandermonde(index: &[f64], terms: usize) -> DMatrix<f64> {
    let (lo, hi) = index
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let center = (lo + hi) / 2.0;
    let half_width = if hi > lo { (hi - lo) / 2.0 } else { 1.0 };

    DMatrix::from_fn(index.len(), terms, |i, j| {
        let u = (index[i] - center) / half_width;
        u.powi(j as i32)
    })
}
