//! On-disk layout of analysis results.
//!
//! A results file is a ZIP archive laid out like a NumPy `.npz`: one `.npy`
//! entry per array field plus small UTF-8 text entries for the version, time,
//! settings and provenance tags. Fields that were not computed are omitted.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};
use ndarray_npy::WriteNpyExt;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::record::AnalysisResults;
use crate::constants::{ANALYSES_DIR, RESULTS_FILE_EXTENSION, RESULTS_FILE_PREFIX};
use crate::error::{AnalysisError, Result};

/// Version written into every results file.
pub const FORMAT_VERSION: &str = "1.0.0";

pub(crate) const VERSION_ENTRY: &str = "version.txt";
pub(crate) const TIME_ENTRY: &str = "time.txt";
pub(crate) const SETTINGS_ENTRY: &str = "settings.json";
pub(crate) const IM_CUBE_ID_ENTRY: &str = "imCubeIdTag.txt";
pub(crate) const REFERENCE_ID_ENTRY: &str = "referenceIdTag.txt";
pub(crate) const EXTRA_REFLECTION_ENTRY: &str = "extraReflectionTag.txt";
pub(crate) const REFLECTANCE_ENTRY: &str = "reflectance/data.npy";
pub(crate) const WAVENUMBERS_ENTRY: &str = "reflectance/wavenumbers.npy";
pub(crate) const OPD_ENTRY: &str = "opd/data.npy";
pub(crate) const OPD_INDEX_ENTRY: &str = "opd/index.npy";

/// File name used for an analysis called `name`.
pub fn name_to_file_name(name: &str) -> String {
    format!("{}{}.{}", RESULTS_FILE_PREFIX, name, RESULTS_FILE_EXTENSION)
}

/// Analysis name encoded in a results file name, if it is one.
pub fn file_name_to_name(file_name: &str) -> Option<&str> {
    file_name
        .strip_prefix(RESULTS_FILE_PREFIX)?
        .strip_suffix(RESULTS_FILE_EXTENSION)?
        .strip_suffix('.')
        .filter(|name| !name.is_empty())
}

/// Path of the results file for analysis `name` of the acquisition in `acquisition_dir`.
pub fn results_path(acquisition_dir: &Path, name: &str) -> PathBuf {
    acquisition_dir
        .join(ANALYSES_DIR)
        .join(name_to_file_name(name))
}

/// Names of every analysis saved for an acquisition, sorted.
///
/// An acquisition without an `analyses` folder has no analyses.
pub fn list_analyses(acquisition_dir: &Path) -> Result<Vec<String>> {
    let dir = acquisition_dir.join(ANALYSES_DIR);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        if let Some(name) = file_name.to_str().and_then(file_name_to_name) {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Save results for analysis `name` next to an acquisition, creating the
/// `analyses` folder when needed. Returns the path written.
pub fn save_results(
    results: &AnalysisResults,
    acquisition_dir: &Path,
    name: &str,
) -> Result<PathBuf> {
    std::fs::create_dir_all(acquisition_dir.join(ANALYSES_DIR))?;
    let path = results_path(acquisition_dir, name);
    write_results(results, &path)?;
    Ok(path)
}

/// Write results to `path`.
///
/// Fails with [`AnalysisError::AlreadyExists`] if anything is already at
/// `path`; the existing file is left untouched.
pub fn write_results(results: &AnalysisResults, path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => AnalysisError::AlreadyExists {
                path: path.to_path_buf(),
            },
            _ => AnalysisError::Io(e),
        })?;

    if let Err(e) = write_archive(results, file) {
        // Do not leave a truncated archive behind
        if let Err(remove) = std::fs::remove_file(path) {
            log::warn!("Failed to remove partial results {:?}: {}", path, remove);
        }
        return Err(e);
    }
    log::info!(
        "Saved results for '{}' to {:?}",
        results.im_cube_id_tag(),
        path
    );
    Ok(())
}

fn write_archive(results: &AnalysisResults, file: File) -> Result<()> {
    let mut writer = ArchiveWriter::new(file);

    writer.text(VERSION_ENTRY, FORMAT_VERSION)?;
    writer.text(TIME_ENTRY, results.time())?;
    writer.text(SETTINGS_ENTRY, &results.settings().to_json()?)?;
    writer.text(IM_CUBE_ID_ENTRY, results.im_cube_id_tag())?;
    writer.text(REFERENCE_ID_ENTRY, results.reference_id_tag())?;
    if let Some(tag) = results.extra_reflection_tag() {
        writer.text(EXTRA_REFLECTION_ENTRY, tag)?;
    }

    let reflectance = results.reflectance();
    writer.array(REFLECTANCE_ENTRY, &reflectance.data)?;
    writer.array(
        WAVENUMBERS_ENTRY,
        &Array1::from(reflectance.wavenumbers.clone()),
    )?;
    writer.array(&map_entry("meanReflectance"), results.mean_reflectance())?;
    writer.array(&map_entry("rms"), results.rms())?;

    let optional_maps: [(&str, Option<&Array2<f32>>); 4] = [
        ("polynomialRms", results.polynomial_rms()),
        ("autoCorrelationSlope", results.autocorrelation_slope()),
        ("rSquared", results.r_squared()),
        ("ld", results.ld()),
    ];
    for (name, map) in optional_maps {
        if let Some(map) = map {
            writer.array(&map_entry(name), map)?;
        }
    }
    if let Some(opd) = results.opd() {
        writer.array(OPD_ENTRY, &opd.data)?;
        writer.array(OPD_INDEX_ENTRY, &Array1::from(opd.index.clone()))?;
    }

    writer.finish()
}

/// Entry name of a 2D per-pixel map.
pub(crate) fn map_entry(field: &str) -> String {
    format!("{}.npy", field)
}

struct ArchiveWriter {
    zip: ZipWriter<File>,
    options: SimpleFileOptions,
}

impl ArchiveWriter {
    fn new(file: File) -> Self {
        Self {
            zip: ZipWriter::new(file),
            options: SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated),
        }
    }

    fn text(&mut self, name: &str, value: &str) -> Result<()> {
        self.zip.start_file(name, self.options)?;
        self.zip.write_all(value.as_bytes())?;
        Ok(())
    }

    fn array<A: WriteNpyExt>(&mut self, name: &str, array: &A) -> Result<()> {
        let mut bytes = Vec::new();
        array.write_npy(&mut bytes)?;
        log::trace!("Writing '{}' ({} bytes)", name, bytes.len());
        self.zip.start_file(name, self.options)?;
        self.zip.write_all(&bytes)?;
        Ok(())
    }

    fn finish(self) -> Result<()> {
        let mut file = self.zip.finish()?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_name_round_trip() {
        assert_eq!(name_to_file_name("p1"), "analysisResults_p1.npz");
        assert_eq!(file_name_to_name("analysisResults_p1.npz"), Some("p1"));
        assert_eq!(file_name_to_name("analysisResults_.npz"), None);
        assert_eq!(file_name_to_name("analysisResults_p1.h5"), None);
        assert_eq!(file_name_to_name("cube.npy"), None);
    }

    #[test]
    fn test_results_path() {
        let path = results_path(Path::new("/data/Cell1"), "p1");
        assert_eq!(
            path,
            PathBuf::from("/data/Cell1/analyses/analysisResults_p1.npz")
        );
    }

    #[test]
    fn test_list_analyses() {
        let dir = TempDir::new().unwrap();
        assert!(list_analyses(dir.path()).unwrap().is_empty());

        let analyses = dir.path().join(ANALYSES_DIR);
        std::fs::create_dir_all(&analyses).unwrap();
        for file in [
            "analysisResults_b.npz",
            "analysisResults_a.npz",
            "notes.txt",
        ] {
            std::fs::write(analyses.join(file), b"").unwrap();
        }
        assert_eq!(list_analyses(dir.path()).unwrap(), vec!["a", "b"]);
    }
}
