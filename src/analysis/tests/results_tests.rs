//! Writing results files and reading them back lazily.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::*;
use crate::analysis::OpdSettings;
use crate::error::AnalysisError;
use crate::results::{
    self, AnalysisResults, FORMAT_VERSION, LazyResults, ResultField, list_analyses,
    write_results,
};

fn full_results() -> AnalysisResults {
    let settings = AnalysisSettings {
        opd: Some(OpdSettings {
            hann_window: true,
            index_stop: 30,
        }),
        ..AnalysisSettings::recommended()
    };
    analysis(settings).run(sample_cube("cell1")).unwrap().0
}

fn basic_results() -> AnalysisResults {
    let settings = AnalysisSettings {
        skip_advanced: true,
        ..AnalysisSettings::recommended()
    };
    analysis(settings).run(sample_cube("cell2")).unwrap().0
}

fn write_raw_archive(path: &Path, entries: &[(&str, &[u8])]) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    for (name, bytes) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

#[test]
fn test_write_then_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let results = full_results();
    let path = results::save_results(&results, dir.path(), "p1").unwrap();
    assert!(path.ends_with("analyses/analysisResults_p1.npz"));

    let mut lazy = LazyResults::open_named(dir.path(), "p1").unwrap();
    assert_eq!(lazy.time().unwrap(), results.time());
    assert_eq!(lazy.settings().unwrap(), results.settings());
    assert_eq!(lazy.im_cube_id_tag().unwrap(), "cell1");
    assert_eq!(lazy.reference_id_tag().unwrap(), "reference");
    assert_eq!(lazy.extra_reflection_tag().unwrap(), None);

    let reflectance = lazy.reflectance().unwrap();
    assert_same_bits(&reflectance.data, &results.reflectance().data);
    assert_eq!(reflectance.wavenumbers, results.reflectance().wavenumbers);
    assert_same_bits(lazy.mean_reflectance().unwrap(), results.mean_reflectance());
    assert_same_bits(lazy.rms().unwrap(), results.rms());
    assert_same_bits(
        lazy.polynomial_rms().unwrap(),
        results.polynomial_rms().unwrap(),
    );
    assert_same_bits(
        lazy.autocorrelation_slope().unwrap(),
        results.autocorrelation_slope().unwrap(),
    );
    assert_same_bits(lazy.r_squared().unwrap(), results.r_squared().unwrap());
    assert_same_bits(lazy.ld().unwrap(), results.ld().unwrap());
    let opd = lazy.opd().unwrap();
    assert_same_bits(&opd.data, &results.opd().unwrap().data);
    assert_eq!(opd.index, results.opd().unwrap().index);
}

#[test]
fn test_into_results_validates_whole_file() {
    let dir = TempDir::new().unwrap();
    let results = full_results();
    let path = dir.path().join("full.npz");
    write_results(&results, &path).unwrap();

    let rebuilt = LazyResults::open(&path).unwrap().into_results().unwrap();
    assert_eq!(rebuilt.time(), results.time());
    assert_eq!(rebuilt.provenance(), results.provenance());
    assert_eq!(rebuilt.spatial_dim(), results.spatial_dim());
    assert_same_bits(rebuilt.ld().unwrap(), results.ld().unwrap());
}

#[test]
fn test_existing_file_is_not_overwritten() {
    let dir = TempDir::new().unwrap();
    let first = full_results();
    let path = results::save_results(&first, dir.path(), "p1").unwrap();
    let before = std::fs::read(&path).unwrap();

    let second = basic_results();
    let result = results::save_results(&second, dir.path(), "p1");
    assert!(matches!(
        result,
        Err(AnalysisError::AlreadyExists { path: existing }) if existing == path
    ));
    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[test]
fn test_skipped_fields_are_missing_not_corrupt() {
    let dir = TempDir::new().unwrap();
    results::save_results(&basic_results(), dir.path(), "basic").unwrap();

    let mut lazy = LazyResults::open_named(dir.path(), "basic").unwrap();
    for field in [
        ResultField::PolynomialRms,
        ResultField::AutoCorrelationSlope,
        ResultField::RSquared,
        ResultField::Ld,
        ResultField::Opd,
    ] {
        assert!(!lazy.has_field(field));
    }
    assert!(matches!(
        lazy.ld(),
        Err(AnalysisError::MissingField { field }) if field == "ld"
    ));
    assert!(matches!(
        lazy.r_squared(),
        Err(AnalysisError::MissingField { field }) if field == "rSquared"
    ));
    lazy.load_all().unwrap();
}

#[test]
fn test_fields_load_on_first_access() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lazy.npz");
    write_results(&full_results(), &path).unwrap();

    let mut lazy = LazyResults::open(&path).unwrap();
    assert!(ResultField::all().iter().all(|&f| !lazy.is_loaded(f)));
    lazy.rms().unwrap();
    assert!(lazy.is_loaded(ResultField::Rms));
    assert!(!lazy.is_loaded(ResultField::Reflectance));

    lazy.load_all().unwrap();
    assert!(lazy.is_loaded(ResultField::Reflectance));
    assert!(lazy.is_loaded(ResultField::Opd));
    assert!(!lazy.is_loaded(ResultField::ExtraReflectionTag));
}

#[test]
fn test_closed_results_keep_cached_fields() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("closed.npz");
    write_results(&full_results(), &path).unwrap();

    let mut lazy = LazyResults::open(&path).unwrap();
    let rms = lazy.rms().unwrap().clone();
    lazy.close();
    std::fs::remove_file(&path).unwrap();

    assert!(!lazy.is_open());
    assert_eq!(lazy.rms().unwrap(), &rms);
    assert!(lazy.ld().is_err());
}

#[test]
fn test_opd_derived_from_stored_reflectance() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("basic.npz");
    write_results(&basic_results(), &path).unwrap();

    let mut lazy = LazyResults::open(&path).unwrap();
    let custom = lazy.compute_opd(true, 12).unwrap();
    assert_eq!(custom.data.dim(), (ROWS, COLS, 12));
    assert!(!lazy.is_loaded(ResultField::Opd));

    let opd = lazy.opd().unwrap();
    assert_eq!(opd.data.dim().0, ROWS);
    assert_eq!(opd.data.dim().1, COLS);
    assert!(!lazy.is_loaded(ResultField::Opd));
    assert!(!lazy.has_field(ResultField::Opd));

    // A record rebuilt from the file holds only what the file stores
    let rebuilt = lazy.into_results().unwrap();
    assert!(rebuilt.opd().is_none());
}

#[test]
fn test_newer_major_version_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("future.npz");
    write_raw_archive(&path, &[("version.txt", b"2.0.0".as_slice())]);

    let result = LazyResults::open(&path);
    assert!(matches!(
        result,
        Err(AnalysisError::VersionMismatch { expected, found })
            if expected == FORMAT_VERSION && found == "2.0.0"
    ));
}

#[test]
fn test_undecodable_field_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("corrupt.npz");
    write_raw_archive(
        &path,
        &[
            ("version.txt", b"1.2.0".as_slice()),
            ("rms.npy", b"definitely not an array".as_slice()),
        ],
    );

    let mut lazy = LazyResults::open(&path).unwrap();
    assert!(matches!(
        lazy.rms(),
        Err(AnalysisError::CorruptField { field, .. }) if field == "rms"
    ));
    assert!(matches!(
        lazy.load_all(),
        Err(AnalysisError::CorruptField { field, .. }) if field == "time"
    ));
}

#[test]
fn test_absent_required_field_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("truncated.npz");
    write_raw_archive(&path, &[("version.txt", b"1.0.0".as_slice())]);

    let mut lazy = LazyResults::open(&path).unwrap();
    assert!(matches!(
        lazy.rms(),
        Err(AnalysisError::CorruptField { field, .. }) if field == "rms"
    ));
    assert!(matches!(
        lazy.reflectance(),
        Err(AnalysisError::CorruptField { field, .. }) if field == "reflectance"
    ));
    assert!(matches!(
        lazy.ld(),
        Err(AnalysisError::MissingField { field }) if field == "ld"
    ));
    assert!(matches!(
        lazy.into_results(),
        Err(AnalysisError::CorruptField { field, .. }) if field == "time"
    ));
}

#[test]
fn test_saved_analyses_are_listed() {
    let dir = TempDir::new().unwrap();
    results::save_results(&basic_results(), dir.path(), "second").unwrap();
    results::save_results(&basic_results(), dir.path(), "first").unwrap();
    assert_eq!(list_analyses(dir.path()).unwrap(), vec!["first", "second"]);
}
