//! Parallel batches sharing one prepared reference.

use std::sync::atomic::AtomicBool;

use ndarray::Array3;
use tempfile::TempDir;

use super::*;
use crate::analysis::{BatchJob, CubeOutcome, run_batch};
use crate::error::AnalysisError;
use crate::results::list_analyses;

fn mismatched_cube(id: &str) -> SpectralCube {
    let short: Vec<f64> = wavelengths().into_iter().take(60).collect();
    SpectralCube::new(
        Array3::from_elem((ROWS, COLS, 60), 400.0),
        short,
        CubeMetadata::new(id, 50.0),
    )
    .unwrap()
    .camera_corrected()
}

#[test]
fn test_failure_is_isolated_to_its_cube() {
    let analysis = analysis(AnalysisSettings::recommended());
    let jobs = vec![
        BatchJob::in_memory(sample_cube("cell1")),
        BatchJob::in_memory(mismatched_cube("broken")),
        BatchJob::in_memory(sample_cube("cell3")),
        BatchJob::in_memory(sample_cube("cell4")),
    ];
    let report = run_batch(&analysis, jobs, &AtomicBool::new(false));

    let ids: Vec<&str> = report.entries.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["cell1", "broken", "cell3", "cell4"]);

    let failed = report.failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, "broken");
    assert!(matches!(failed[0].1, AnalysisError::ShapeMismatch { .. }));

    // No extra reflectance calibration, so every run carries that warning
    assert_eq!(report.completed_with_warnings(), vec!["cell1", "cell3", "cell4"]);
    assert!(report.completed().is_empty());
    assert!(report.cancelled().is_empty());
    assert!(!report.is_success());

    for (id, outcome) in &report.entries {
        if let CubeOutcome::Completed { results, saved_to, .. } = outcome {
            let results = results.as_ref().unwrap();
            assert_eq!(results.im_cube_id_tag(), id);
            assert!(saved_to.is_none());
        }
    }

    let summary = report.to_string();
    assert!(summary.starts_with("4 cubes: 0 completed, 3 completed with warnings, 1 failed"));
    assert!(summary.contains("broken: failed"));
}

#[test]
fn test_cancelled_batch_runs_nothing() {
    let analysis = analysis(AnalysisSettings::recommended());
    let jobs = vec![
        BatchJob::in_memory(sample_cube("cell1")),
        BatchJob::in_memory(sample_cube("cell2")),
    ];
    let report = run_batch(&analysis, jobs, &AtomicBool::new(true));

    assert_eq!(report.cancelled(), vec!["cell1", "cell2"]);
    assert!(report.failed().is_empty());
    assert!(report.completed_with_warnings().is_empty());
    for (_, outcome) in report.entries {
        assert!(matches!(outcome.into_result(), Err(AnalysisError::Cancelled)));
    }
}

#[test]
fn test_batch_saves_next_to_acquisitions() {
    let dir = TempDir::new().unwrap();
    let analysis = analysis(AnalysisSettings::recommended());
    let cell1 = dir.path().join("Cell1");
    let cell2 = dir.path().join("Cell2");

    let jobs = vec![
        BatchJob::saved(sample_cube("cell1"), &cell1, "p1"),
        BatchJob::saved(sample_cube("cell2"), &cell2, "p1"),
    ];
    let report = run_batch(&analysis, jobs, &AtomicBool::new(false));
    assert!(report.failed().is_empty());
    for (_, outcome) in &report.entries {
        match outcome {
            CubeOutcome::Completed { results, saved_to, .. } => {
                assert!(results.is_none());
                assert!(saved_to.as_ref().unwrap().is_file());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
    assert_eq!(list_analyses(&cell1).unwrap(), vec!["p1"]);
    assert_eq!(list_analyses(&cell2).unwrap(), vec!["p1"]);

    // Saving under the same name again fails per cube without overwriting
    let jobs = vec![BatchJob::saved(sample_cube("cell1"), &cell1, "p1")];
    let report = run_batch(&analysis, jobs, &AtomicBool::new(false));
    assert!(matches!(
        report.failed()[0].1,
        AnalysisError::AlreadyExists { .. }
    ));
}
