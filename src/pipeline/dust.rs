//! Spatial Gaussian blur used to suppress dust on reference acquisitions.

use ndarray::{Array2, ArrayViewMut2, ArrayViewMut3, Axis};

use crate::data::SpectralCube;

/// Blur a cube by `sigma_um` micrometers using its recorded pixel size.
///
/// Returns `false` without touching the data when the pixel size is unknown.
pub fn filter_dust(cube: &mut SpectralCube, sigma_um: f64) -> bool {
    let Some(pixel_size) = cube.metadata().pixel_size_um.filter(|&p| p > 0.0) else {
        return false;
    };
    let sigma_px = sigma_um / pixel_size;
    log::debug!(
        "Dust filtering '{}' with sigma {:.3} px",
        cube.metadata().id_tag,
        sigma_px
    );
    gaussian_blur(cube.data_mut(), sigma_px);
    true
}

/// Blur every spectral plane with a Gaussian of `sigma_px` pixels.
///
/// Edges are reflected (`d c b a | a b c d`) and the kernel is truncated at
/// four standard deviations, matching `scipy.ndimage.gaussian_filter`.
pub fn gaussian_blur(mut data: ArrayViewMut3<'_, f32>, sigma_px: f64) {
    if sigma_px.is_nan() || sigma_px <= 0.0 {
        return;
    }
    let kernel = gaussian_kernel(sigma_px);
    data.axis_iter_mut(Axis(2)).for_each(|mut plane| {
        blur_axis(&mut plane, &kernel, Axis(0));
        blur_axis(&mut plane, &kernel, Axis(1));
    });
}

/// Normalized kernel of radius `round(4σ)`.
fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (4.0 * sigma + 0.5) as isize;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|x| (-0.5 * (x as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

fn reflect(i: isize, len: usize) -> usize {
    let period = 2 * len as isize;
    let m = i.rem_euclid(period) as usize;
    if m < len { m } else { 2 * len - 1 - m }
}

fn blur_axis(plane: &mut ArrayViewMut2<'_, f32>, kernel: &[f64], axis: Axis) {
    let radius = (kernel.len() / 2) as isize;
    let source: Array2<f32> = plane.to_owned();
    for (mut out, lane) in plane.lanes_mut(axis).into_iter().zip(source.lanes(axis)) {
        let len = lane.len();
        for (i, slot) in out.iter_mut().enumerate() {
            let value: f64 = kernel
                .iter()
                .enumerate()
                .map(|(j, &w)| {
                    let offset = j as isize - radius;
                    w * f64::from(lane[reflect(i as isize + offset, len)])
                })
                .sum();
            *slot = value as f32;
        }
    }
}
