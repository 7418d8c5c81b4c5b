//! Zero-phase Butterworth low-pass filtering along the spectral axis.
//!
//! The filter design and the forward-backward application reproduce
//! `scipy.signal.butter(order, cutoff, fs=fs)` (transfer-function form) and
//! `scipy.signal.filtfilt(b, a, x)` with its default odd extension of
//! `3 * max(len(a), len(b))` samples and steady-state initial conditions.

use nalgebra::{DMatrix, DVector};
use ndarray::{ArrayViewMut3, Axis, Zip};
use num_complex::Complex64;

use crate::error::{AnalysisError, Result};

/// Digital filter coefficients, `a[0] == 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCoefficients {
    pub b: Vec<f64>,
    pub a: Vec<f64>,
}

impl FilterCoefficients {
    /// Design a low-pass Butterworth filter.
    ///
    /// `cutoff` and `sample_rate` share a unit; the cutoff must lie strictly
    /// between zero and the Nyquist frequency.
    pub fn butterworth_lowpass(order: usize, cutoff: f64, sample_rate: f64) -> Result<Self> {
        if order == 0 {
            return Err(AnalysisError::configuration("filter order must be at least 1"));
        }
        let wn = 2.0 * cutoff / sample_rate;
        if wn.is_nan() || wn <= 0.0 || wn >= 1.0 {
            return Err(AnalysisError::configuration(format!(
                "filter cutoff {} must be between 0 and the Nyquist frequency {}",
                cutoff,
                sample_rate / 2.0
            )));
        }

        // Analog prototype poles on the unit circle, left half plane
        let n = order as f64;
        let prototype = (0..order).map(|i| {
            let m = -(n - 1.0) + 2.0 * i as f64;
            -Complex64::from_polar(1.0, std::f64::consts::PI * m / (2.0 * n))
        });

        // Pre-warp for a bilinear transform at fs = 2
        let fs2 = 4.0;
        let warped = fs2 * (std::f64::consts::PI * wn / 2.0).tan();

        let analog: Vec<Complex64> = prototype.map(|p| p * warped).collect();
        let denominator: Complex64 = analog.iter().map(|&p| fs2 - p).product();
        let gain = warped.powi(order as i32) / denominator.re;
        let poles: Vec<Complex64> = analog.iter().map(|&p| (fs2 + p) / (fs2 - p)).collect();

        let b: Vec<f64> = binomial_row(order).into_iter().map(|c| c * gain).collect();
        let a: Vec<f64> = poly_from_roots(&poles).into_iter().map(|c| c.re).collect();
        Ok(Self { b, a })
    }

    /// Number of samples added on each side by the odd extension.
    pub fn pad_len(&self) -> usize {
        3 * self.a.len().max(self.b.len())
    }

    /// Steady-state initial conditions for a unit step, as `lfilter_zi`.
    fn initial_conditions(&self) -> Vec<f64> {
        let n = self.a.len().max(self.b.len());
        let mut a = self.a.clone();
        let mut b = self.b.clone();
        a.resize(n, 0.0);
        b.resize(n, 0.0);
        if n < 2 {
            return Vec::new();
        }

        let m = n - 1;
        let mut i_minus_a = DMatrix::<f64>::identity(m, m);
        for i in 0..m {
            i_minus_a[(i, 0)] += a[i + 1];
            if i + 1 < m {
                i_minus_a[(i, i + 1)] -= 1.0;
            }
        }
        let rhs = DVector::from_iterator(m, (0..m).map(|i| b[i + 1] - a[i + 1] * b[0]));
        i_minus_a
            .lu()
            .solve(&rhs)
            .map(|v| v.iter().copied().collect())
            .unwrap_or_else(|| vec![0.0; m])
    }

    /// Single-direction filtering (direct form II transposed).
    fn lfilter(&self, x: &mut [f64], mut state: Vec<f64>) {
        let order = state.len();
        for sample in x.iter_mut() {
            let input = *sample;
            let output = self.b[0] * input + state.first().copied().unwrap_or(0.0);
            for i in 0..order {
                let next = if i + 1 < order { state[i + 1] } else { 0.0 };
                let b = self.b.get(i + 1).copied().unwrap_or(0.0);
                let a = self.a.get(i + 1).copied().unwrap_or(0.0);
                state[i] = b * input + next - a * output;
            }
            *sample = output;
        }
    }

    /// Forward-backward filtering of one signal.
    pub fn filtfilt(&self, signal: &[f64]) -> Result<Vec<f64>> {
        let pad = self.pad_len();
        let len = signal.len();
        if len <= pad {
            return Err(AnalysisError::SignalTooShort { len, required: pad });
        }
        let zi = self.initial_conditions();

        let first = signal[0];
        let last = signal[len - 1];
        let mut extended = Vec::with_capacity(len + 2 * pad);
        extended.extend((1..=pad).rev().map(|i| 2.0 * first - signal[i]));
        extended.extend_from_slice(signal);
        extended.extend((1..=pad).map(|i| 2.0 * last - signal[len - 1 - i]));

        let x0 = extended[0];
        self.lfilter(&mut extended, zi.iter().map(|z| z * x0).collect());
        extended.reverse();
        let y0 = extended[0];
        self.lfilter(&mut extended, zi.iter().map(|z| z * y0).collect());
        extended.reverse();

        Ok(extended[pad..pad + len].to_vec())
    }

    /// Filter every pixel's spectrum in place, keeping `f32` storage.
    pub fn apply(&self, mut data: ArrayViewMut3<'_, f32>) -> Result<()> {
        let len = data.len_of(Axis(2));
        let pad = self.pad_len();
        if len <= pad {
            return Err(AnalysisError::SignalTooShort { len, required: pad });
        }

        Zip::from(data.lanes_mut(Axis(2))).par_for_each(|mut lane| {
            let signal: Vec<f64> = lane.iter().map(|&v| f64::from(v)).collect();
            // Length was checked above so filtering cannot fail here
            if let Ok(filtered) = self.filtfilt(&signal) {
                for (out, value) in lane.iter_mut().zip(filtered) {
                    *out = value as f32;
                }
            }
        });
        Ok(())
    }
}

/// Coefficients of `(x + 1)^n`, highest power first.
fn binomial_row(n: usize) -> Vec<f64> {
    let mut row = vec![1.0];
    for _ in 0..n {
        let mut next = vec![1.0; row.len() + 1];
        for i in 1..row.len() {
            next[i] = row[i - 1] + row[i];
        }
        row = next;
    }
    row
}

/// Monic polynomial with the given roots, highest power first.
fn poly_from_roots(roots: &[Complex64]) -> Vec<Complex64> {
    let mut coefficients = vec![Complex64::new(1.0, 0.0)];
    for &root in roots {
        let mut next = vec![Complex64::new(0.0, 0.0); coefficients.len() + 1];
        for (i, &c) in coefficients.iter().enumerate() {
            next[i] += c;
            next[i + 1] -= c * root;
        }
        coefficients = next;
    }
    coefficients
}

/// Low-pass filter a cube's spectra with a sample rate derived from its
/// index spacing, treating the index as evenly spaced.
pub fn filter_spectra(
    data: ArrayViewMut3<'_, f32>,
    index: &[f64],
    order: usize,
    cutoff: f64,
) -> Result<()> {
    if index.len() < 2 {
        return Err(AnalysisError::SignalTooShort {
            len: index.len(),
            required: 3 * (order + 1),
        });
    }
    let interval = (index[index.len() - 1] - index[0]) / (index.len() - 1) as f64;
    let coefficients = FilterCoefficients::butterworth_lowpass(order, cutoff, 1.0 / interval)?;
    log::trace!(
        "Butterworth order {} cutoff {} at interval {}: b={:?} a={:?}",
        order,
        cutoff,
        interval,
        coefficients.b,
        coefficients.a
    );
    coefficients.apply(data)
}
