//! Loading acquisitions stored as NumPy `.npy` arrays.
//!
//! An acquisition directory holds `cube.npy`, a `(rows, columns, wavelengths)`
//! array, and `metadata.json` with the acquisition metadata and wavelengths.
//! Extra reflectance calibrations use the same layout.

use std::io::Cursor;
use std::path::Path;

use ndarray::{Array3, ArrayD, Ix3};
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use serde::{Deserialize, Serialize};

use crate::data::cube::{CubeMetadata, SpectralCube};
use crate::data::extra_reflectance::{ExtraReflectanceCube, ExtraReflectanceMetadata};
use crate::error::{AnalysisError, Result};

/// File name of the array inside an acquisition directory.
pub const CUBE_FILE: &str = "cube.npy";

/// File name of the metadata inside an acquisition directory.
pub const METADATA_FILE: &str = "metadata.json";

/// NumPy magic bytes: \x93NUMPY
const MAGIC: &[u8] = &[0x93, b'N', b'U', b'M', b'P', b'Y'];

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcquisitionMetadata {
    #[serde(flatten)]
    metadata: CubeMetadata,
    wavelengths: Vec<f64>,
    #[serde(default)]
    camera_corrected: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalibrationMetadata {
    #[serde(flatten)]
    metadata: ExtraReflectanceMetadata,
    wavelengths: Vec<f64>,
}

/// Check whether bytes look like a NumPy array file.
pub fn is_npy(data: &[u8]) -> bool {
    data.len() >= MAGIC.len() && data.starts_with(MAGIC)
}

/// Decode a 3D `.npy` array of any common numeric dtype into `f32` counts.
///
/// No normalization is applied: integer counts keep their values.
pub fn read_cube_array(data: &[u8]) -> Result<Array3<f32>> {
    if !is_npy(data) {
        return Err(AnalysisError::configuration("not a NumPy .npy file"));
    }
    let mut cursor = Cursor::new(data);

    // f32 is most common for scientific data
    if let Ok(array) = ArrayD::<f32>::read_npy(&mut cursor) {
        return into_cube(array);
    }

    cursor.set_position(0);
    if let Ok(array) = ArrayD::<f64>::read_npy(&mut cursor) {
        return into_cube(array.mapv(|v| v as f32));
    }

    // Raw camera frames are usually 16-bit
    cursor.set_position(0);
    if let Ok(array) = ArrayD::<u16>::read_npy(&mut cursor) {
        return into_cube(array.mapv(f32::from));
    }

    cursor.set_position(0);
    if let Ok(array) = ArrayD::<u8>::read_npy(&mut cursor) {
        return into_cube(array.mapv(f32::from));
    }

    cursor.set_position(0);
    if let Ok(array) = ArrayD::<i32>::read_npy(&mut cursor) {
        return into_cube(array.mapv(|v| v as f32));
    }

    Err(AnalysisError::configuration(
        "failed to read NumPy array: unsupported dtype or invalid format",
    ))
}

fn into_cube(array: ArrayD<f32>) -> Result<Array3<f32>> {
    let ndim = array.ndim();
    log::debug!("npy: array shape = {:?}", array.shape());
    array.into_dimensionality::<Ix3>().map_err(|_| {
        AnalysisError::shape_mismatch(format!(
            "expected a 3D (rows, columns, wavelengths) array, found {} dimensions",
            ndim
        ))
    })
}

/// Load an acquisition from a directory.
pub fn load_cube(directory: &Path) -> Result<SpectralCube> {
    let bytes = std::fs::read(directory.join(CUBE_FILE))?;
    let data = read_cube_array(&bytes)?;
    let json = std::fs::read_to_string(directory.join(METADATA_FILE))?;
    let meta: AcquisitionMetadata = serde_json::from_str(&json)?;

    let cube = SpectralCube::new(data, meta.wavelengths, meta.metadata)?;
    log::info!(
        "Loaded acquisition '{}' from {:?} with shape {:?}",
        cube.metadata().id_tag,
        directory,
        cube.dim()
    );
    Ok(if meta.camera_corrected {
        cube.camera_corrected()
    } else {
        cube
    })
}

/// Save an acquisition to a directory, creating it if needed.
pub fn save_cube(directory: &Path, cube: &SpectralCube) -> Result<()> {
    std::fs::create_dir_all(directory)?;
    let mut bytes = Vec::new();
    cube.data().write_npy(&mut bytes)?;
    std::fs::write(directory.join(CUBE_FILE), bytes)?;

    let meta = AcquisitionMetadata {
        metadata: cube.metadata().clone(),
        wavelengths: cube.index().to_vec(),
        camera_corrected: cube.status().camera_corrected,
    };
    std::fs::write(
        directory.join(METADATA_FILE),
        serde_json::to_string_pretty(&meta)?,
    )?;
    Ok(())
}

/// Load an extra reflectance calibration from a directory.
pub fn load_extra_reflectance(directory: &Path) -> Result<ExtraReflectanceCube> {
    let bytes = std::fs::read(directory.join(CUBE_FILE))?;
    let data = read_cube_array(&bytes)?;
    let json = std::fs::read_to_string(directory.join(METADATA_FILE))?;
    let meta: CalibrationMetadata = serde_json::from_str(&json)?;
    log::info!(
        "Loaded extra reflectance '{}' from {:?}",
        meta.metadata.id_tag,
        directory
    );
    ExtraReflectanceCube::new(data, meta.wavelengths, meta.metadata)
}
