//! Per-pixel statistics of detrended spectra.
//!
//! Every statistic is computed independently per pixel. Degenerate pixels
//! (flat spectra, non-positive autocorrelation) give NaN for that pixel only.

use std::sync::Arc;

use ndarray::{Array2, Array3, ArrayView1, ArrayView2, ArrayView3, Axis, Zip};
use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use crate::constants::{LD_A1, LD_A2, LD_REFRACTIVE_INDEX, LD_WAVELENGTH_UM};
use crate::error::{AnalysisError, Result};

/// Population standard deviation of every pixel's spectrum.
pub fn rms(data: ArrayView3<'_, f32>) -> Array2<f32> {
    data.map_axis(Axis(2), |lane| std_dev(lane) as f32)
}

fn std_dev(lane: ArrayView1<'_, f32>) -> f64 {
    let n = lane.len();
    if n == 0 {
        return f64::NAN;
    }
    let mean = lane.iter().map(|&v| f64::from(v)).sum::<f64>() / n as f64;
    let variance = lane
        .iter()
        .map(|&v| {
            let d = f64::from(v) - mean;
            d * d
        })
        .sum::<f64>()
        / n as f64;
    variance.sqrt()
}

/// Slope and coefficient of determination of the autocorrelation decay.
#[derive(Debug, Clone)]
pub struct AutocorrelationFit {
    /// Slope of `ln(ACF)` against lag distance, per pixel
    pub slope: Array2<f32>,
    /// R² of the linear fit, per pixel
    pub r_squared: Array2<f32>,
}

/// Fit a line to the logarithm of each pixel's biased autocorrelation.
///
/// Lags are expressed in units of the (evenly spaced) spectral index, and the
/// first `stop_index` lags are used. With `min_sub` the minimum of the full
/// autocorrelation is subtracted before taking the logarithm.
pub fn autocorrelation(
    data: ArrayView3<'_, f32>,
    index: &[f64],
    stop_index: usize,
    min_sub: bool,
) -> Result<AutocorrelationFit> {
    let n = data.len_of(Axis(2));
    if stop_index < 2 {
        return Err(AnalysisError::configuration(
            "autocorrelation fit needs at least two lags",
        ));
    }
    if index.len() != n {
        return Err(AnalysisError::shape_mismatch(format!(
            "spectral index has {} entries but the data has {} spectral samples",
            index.len(),
            n
        )));
    }
    let lags = stop_index.min(n);
    let dk = if index.len() > 1 { index[1] - index[0] } else { 1.0 };
    let positions: Vec<f64> = (0..lags).map(|l| l as f64 * dk).collect();

    let fft_len = (2 * n).max(1).next_power_of_two();
    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(fft_len);
    let inverse = planner.plan_fft_inverse(fft_len);

    let (rows, cols, _) = data.dim();
    let mut slope = Array2::<f32>::zeros((rows, cols));
    let mut r_squared = Array2::<f32>::zeros((rows, cols));
    Zip::from(&mut slope)
        .and(&mut r_squared)
        .and(data.lanes(Axis(2)))
        .par_for_each(|slope, r2, lane| {
            let mut acf = biased_acf(lane, &forward, &inverse);
            if min_sub {
                let min = acf.iter().copied().fold(f64::INFINITY, f64::min);
                acf.iter_mut().for_each(|v| *v -= min);
            }
            let log_acf: Vec<f64> = acf[..lags].iter().map(|v| v.ln()).collect();
            let (s, r) = linear_fit(&positions, &log_acf);
            *slope = s as f32;
            *r2 = r as f32;
        });

    Ok(AutocorrelationFit { slope, r_squared })
}

/// `r[l] = (1/N) Σ x[i] x[i+l]` for `l` in `0..N`, computed with a zero-padded FFT.
fn biased_acf(
    lane: ArrayView1<'_, f32>,
    forward: &Arc<dyn Fft<f64>>,
    inverse: &Arc<dyn Fft<f64>>,
) -> Vec<f64> {
    let n = lane.len();
    let fft_len = forward.len();
    let mut buffer = vec![Complex64::new(0.0, 0.0); fft_len];
    for (slot, &v) in buffer.iter_mut().zip(lane.iter()) {
        *slot = Complex64::new(f64::from(v), 0.0);
    }
    forward.process(&mut buffer);
    for c in buffer.iter_mut() {
        *c = Complex64::new(c.norm_sqr(), 0.0);
    }
    inverse.process(&mut buffer);

    // rustfft does not normalize the inverse transform
    let scale = 1.0 / (fft_len as f64 * n as f64);
    buffer[..n].iter().map(|c| c.re * scale).collect()
}

/// Ordinary least squares line fit with intercept; returns (slope, R²).
fn linear_fit(x: &[f64], y: &[f64]) -> (f64, f64) {
    if y.iter().any(|v| !v.is_finite()) {
        return (f64::NAN, f64::NAN);
    }
    let n = x.len() as f64;
    let x_mean = x.iter().sum::<f64>() / n;
    let y_mean = y.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi - x_mean;
        let dy = yi - y_mean;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;
    let residual: f64 = x
        .iter()
        .zip(y)
        .map(|(&xi, &yi)| {
            let e = yi - (intercept + slope * xi);
            e * e
        })
        .sum();
    (slope, 1.0 - residual / syy)
}

/// Ld from RMS and autocorrelation slope.
///
/// `ld = (A2 / A1) · fact · rms / (-slope)` with `k = 2π / 0.55` and
/// `fact = 1.38² / (2k²)`. Zero or NaN slopes give non-finite values.
pub fn ld(rms: ArrayView2<'_, f32>, slope: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
    if rms.dim() != slope.dim() {
        return Err(AnalysisError::shape_mismatch(format!(
            "rms has shape {:?} but the slope has shape {:?}",
            rms.dim(),
            slope.dim()
        )));
    }
    let k = 2.0 * std::f64::consts::PI / LD_WAVELENGTH_UM;
    let fact = LD_REFRACTIVE_INDEX * LD_REFRACTIVE_INDEX / 2.0 / k / k;
    let scale = (LD_A2 / LD_A1) * fact;
    Ok(Zip::from(&rms)
        .and(&slope)
        .map_collect(|&r, &s| (scale * (f64::from(r) / (-f64::from(s)))) as f32))
}

/// Optical path difference spectra and their OPD axis (µm).
#[derive(Debug, Clone, PartialEq)]
pub struct OpdSpectra {
    pub data: Array3<f32>,
    pub index: Vec<f64>,
}

/// Magnitude spectrum of each pixel's (optionally Hann-windowed) detrended
/// signal over an evenly spaced wavenumber axis, truncated to `index_stop` bins.
///
/// The transform is zero-padded to twice the next power of two above
/// `2N - 1`, normalized by `N` and by the RMS of the window.
pub fn opd(
    data: ArrayView3<'_, f32>,
    wavenumbers: &[f64],
    hann_window: bool,
    index_stop: usize,
) -> Result<OpdSpectra> {
    let n = data.len_of(Axis(2));
    if wavenumbers.len() != n || n < 2 {
        return Err(AnalysisError::shape_mismatch(format!(
            "OPD needs an evenly spaced index matching {} spectral samples, found {}",
            n,
            wavenumbers.len()
        )));
    }

    let fft_len = (2 * n - 1).next_power_of_two() * 2;
    let bins = (fft_len / 2 + 1).min(index_stop);
    let window: Vec<f64> = if hann_window {
        (0..n)
            .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / (n - 1) as f64).cos())
            .collect()
    } else {
        vec![1.0; n]
    };
    let window_rms = (window.iter().map(|w| w * w).sum::<f64>() / n as f64).sqrt();
    let scale = 1.0 / (n as f64 * window_rms);

    let dk = wavenumbers[1] - wavenumbers[0];
    let index: Vec<f64> = (0..bins)
        .map(|m| 2.0 * std::f64::consts::PI * m as f64 / (fft_len as f64 * dk))
        .collect();

    let forward = FftPlanner::<f64>::new().plan_fft_forward(fft_len);
    let (rows, cols, _) = data.dim();
    let mut out = Array3::<f32>::zeros((rows, cols, bins));
    Zip::from(out.lanes_mut(Axis(2)))
        .and(data.lanes(Axis(2)))
        .par_for_each(|mut out_lane, lane| {
            let mut buffer = vec![Complex64::new(0.0, 0.0); fft_len];
            for ((slot, &v), &w) in buffer.iter_mut().zip(lane.iter()).zip(&window) {
                *slot = Complex64::new(f64::from(v) * w, 0.0);
            }
            forward.process(&mut buffer);
            for (slot, c) in out_lane.iter_mut().zip(&buffer) {
                *slot = (c.norm() * scale) as f32;
            }
        });

    Ok(OpdSpectra { data: out, index })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn even_index(n: usize, dk: f64) -> Vec<f64> {
        (0..n).map(|i| 9.0 + dk * i as f64).collect()
    }

    #[test]
    fn test_rms_is_population_std() {
        let values = [1.0f32, 2.0, 3.0, 4.0];
        let data = Array3::from_shape_fn((2, 1, 4), |(_, _, k)| values[k]);
        let r = rms(data.view());
        for v in r.iter() {
            assert_relative_eq!(*v, 1.25f32.sqrt(), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_flat_spectrum_is_degenerate() {
        let data = Array3::<f32>::zeros((2, 2, 16));
        let r = rms(data.view());
        assert!(r.iter().all(|&v| v == 0.0));

        let fit = autocorrelation(data.view(), &even_index(16, 0.1), 6, true).unwrap();
        assert!(fit.slope.iter().all(|v| v.is_nan()));
        let l = ld(r.view(), fit.slope.view()).unwrap();
        assert!(l.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_acf_matches_direct_sum() {
        let x = [0.3f32, -0.1, 0.4, 0.2, -0.5, 0.1, 0.0, -0.2];
        let lane = ndarray::Array1::from(x.to_vec());
        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(16);
        let inverse = planner.plan_fft_inverse(16);
        let acf = biased_acf(lane.view(), &forward, &inverse);
        for (lag, value) in acf.iter().enumerate() {
            let direct: f64 = (0..x.len() - lag)
                .map(|i| f64::from(x[i]) * f64::from(x[i + lag]))
                .sum::<f64>()
                / x.len() as f64;
            assert_abs_diff_eq!(*value, direct, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_linear_fit_of_exact_line() {
        let x = [0.0, 0.5, 1.0, 1.5];
        let y: Vec<f64> = x.iter().map(|v| -2.0 * v + 1.0).collect();
        let (slope, r2) = linear_fit(&x, &y);
        assert_relative_eq!(slope, -2.0, epsilon = 1e-12);
        assert_relative_eq!(r2, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_alternating_signal_gives_nan_without_min_sub() {
        // Lag 1 autocorrelation of an alternating signal is negative
        let data = Array3::from_shape_fn((1, 1, 8), |(_, _, k)| if k % 2 == 0 { 1.0 } else { -1.0 });
        let fit = autocorrelation(data.view(), &even_index(8, 0.1), 4, false).unwrap();
        assert!(fit.slope[[0, 0]].is_nan());
        assert!(fit.r_squared[[0, 0]].is_nan());
    }

    #[test]
    fn test_smooth_signal_has_negative_slope() {
        let n = 64;
        let data = Array3::from_shape_fn((1, 2, n), |(_, c, k)| {
            let t = k as f64 * 0.1;
            ((t * (1.0 + c as f64)).sin() * (-0.05 * t).exp()) as f32
        });
        let fit = autocorrelation(data.view(), &even_index(n, 0.05), 5, true).unwrap();
        for (&s, &r) in fit.slope.iter().zip(fit.r_squared.iter()) {
            assert!(s < 0.0);
            assert!(r > 0.5 && r <= 1.0);
        }
    }

    #[test]
    fn test_ld_formula() {
        let rms = Array2::from_elem((1, 2), 0.05f32);
        let slope = Array2::from_shape_vec((1, 2), vec![-2.0f32, 0.0]).unwrap();
        let l = ld(rms.view(), slope.view()).unwrap();

        let k = 2.0 * std::f64::consts::PI / 0.55;
        let fact = 1.38 * 1.38 / 2.0 / k / k;
        let expected = (4.0 / 0.008) * fact * 0.05 / 2.0;
        assert_relative_eq!(f64::from(l[[0, 0]]), expected, max_relative = 1e-6);
        assert!(!l[[0, 1]].is_finite());
    }

    #[test]
    fn test_opd_peak_location() {
        let n = 32;
        let dk = 0.1;
        let index = even_index(n, dk);
        // fft length is 128; place a cosine exactly on bin 20
        let bin = 20.0;
        let depth = 2.0 * std::f64::consts::PI * bin / (128.0 * dk);
        let data = Array3::from_shape_fn((1, 1, n), |(_, _, i)| (index[i] * depth).cos() as f32);

        let spectra = opd(data.view(), &index, false, 100).unwrap();
        assert_eq!(spectra.data.dim(), (1, 1, 65));
        assert_eq!(spectra.index.len(), 65);
        assert_relative_eq!(spectra.index[20], depth, epsilon = 1e-9);

        let lane = spectra.data.index_axis(Axis(0), 0).index_axis_move(Axis(0), 0);
        let peak = lane
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(20));
    }

    #[test]
    fn test_opd_truncation_and_window() {
        let index = even_index(16, 0.2);
        let data = Array3::from_elem((2, 3, 16), 1.0f32);
        let spectra = opd(data.view(), &index, true, 10).unwrap();
        assert_eq!(spectra.data.dim(), (2, 3, 10));
        assert_eq!(spectra.index.len(), 10);
        assert_eq!(spectra.index[0], 0.0);
    }
}
