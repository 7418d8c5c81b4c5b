//! Scenario tests for the analysis pipeline, batch runner and results files.
//!
//! These tests run complete analyses on small synthetic acquisitions and
//! check the properties every result must satisfy.

mod batch_tests;
mod results_tests;

use ndarray::{Array3, ArrayView1, Axis};

use super::{Analysis, AnalysisSettings};
use crate::data::{CubeMetadata, SpectralCube};
use crate::reflection::{Material, RefractiveIndexTable};

const ROWS: usize = 3;
const COLS: usize = 4;

/// 500 to 700 nm in 2 nm steps.
fn wavelengths() -> Vec<f64> {
    (0..101).map(|i| 500.0 + 2.0 * i as f64).collect()
}

/// Number of samples between 510 and 690 nm inclusive.
const SELECTED_SAMPLES: usize = 91;

fn lookup() -> RefractiveIndexTable {
    RefractiveIndexTable::new()
        .with_constant(Material::Water, 1.333)
        .with_constant(Material::Glass, 1.52)
}

fn water_glass_reflectance() -> f64 {
    ((1.333_f64 - 1.52) / (1.333 + 1.52)).powi(2)
}

/// Uniformly lit reference, already camera corrected.
fn reference_cube() -> SpectralCube {
    SpectralCube::new(
        Array3::from_elem((ROWS, COLS, 101), 1000.0),
        wavelengths(),
        CubeMetadata::new("reference", 100.0),
    )
    .unwrap()
    .camera_corrected()
}

/// Cell-like acquisition: a per-pixel level with a slow spectral oscillation.
fn sample_cube(id: &str) -> SpectralCube {
    let wl = wavelengths();
    let data = Array3::from_shape_fn((ROWS, COLS, wl.len()), |(r, c, k)| {
        let level = 0.3 + 0.02 * (r + c) as f64;
        let period = 30.0 + 4.0 * r as f64 + 2.0 * c as f64;
        let ripple = 0.05 * (2.0 * std::f64::consts::PI * wl[k] / period).sin();
        (1000.0 * level * (1.0 + ripple)) as f32
    });
    SpectralCube::new(data, wl, CubeMetadata::new(id, 50.0))
        .unwrap()
        .camera_corrected()
}

fn analysis(settings: AnalysisSettings) -> Analysis {
    Analysis::new(settings, reference_cube(), None, &lookup()).unwrap()
}

fn population_std(lane: ArrayView1<'_, f32>) -> f64 {
    let n = lane.len() as f64;
    let mean = lane.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    (lane
        .iter()
        .map(|&v| (f64::from(v) - mean).powi(2))
        .sum::<f64>()
        / n)
        .sqrt()
}

/// Exact comparison that also treats identical NaNs as equal.
fn assert_same_bits<'a>(
    a: impl IntoIterator<Item = &'a f32>,
    b: impl IntoIterator<Item = &'a f32>,
) {
    let a: Vec<u32> = a.into_iter().map(|v| v.to_bits()).collect();
    let b: Vec<u32> = b.into_iter().map(|v| v.to_bits()).collect();
    assert_eq!(a, b);
}

fn spectral_lanes(data: &Array3<f32>) -> impl Iterator<Item = ArrayView1<'_, f32>> {
    data.lanes(Axis(2)).into_iter()
}
