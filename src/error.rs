//! Error types for analysis and results-archive operations.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors that can occur while analyzing cubes or reading/writing results.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// I/O error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Results archive container error
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Failed to decode a stored array
    #[error("Failed to read array: {0}")]
    NpyRead(#[from] ndarray_npy::ReadNpyError),

    /// Failed to encode an array for storage
    #[error("Failed to write array: {0}")]
    NpyWrite(#[from] ndarray_npy::WriteNpyError),

    /// Array construction with an incompatible shape
    #[error("Array shape error: {0}")]
    ArrayShape(#[from] ndarray::ShapeError),

    /// Refractive index table parsing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Two cubes that must agree on their spectral axis or spatial shape do not
    #[error("Shape mismatch: {message}")]
    ShapeMismatch {
        /// Description of the disagreement
        message: String,
    },

    /// A spectral window selected no samples
    #[error("No spectral samples fall within [{start}, {stop}]")]
    EmptyRange {
        /// Inclusive lower bound of the window
        start: f64,
        /// Inclusive upper bound of the window
        stop: f64,
    },

    /// Writing would overwrite an existing file
    #[error("{path:?} already exists")]
    AlreadyExists {
        /// The path that already exists
        path: PathBuf,
    },

    /// A results field was requested that the file does not contain
    #[error("The analysis file does not contain a {field} item")]
    MissingField {
        /// Name of the absent field
        field: String,
    },

    /// A stored field could not be decoded, or a required field is absent
    #[error("Corrupt field '{field}': {message}")]
    CorruptField {
        /// Name of the field
        field: String,
        /// Description of the problem
        message: String,
    },

    /// Invalid settings, or a settings combination that cannot be honored
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem
        message: String,
    },

    /// The spectral axis is too short for the requested zero-phase filter
    #[error("Spectrum of length {len} is too short for filtering (needs more than {required})")]
    SignalTooShort {
        /// Spectral length of the cube
        len: usize,
        /// Padding length required by the filter
        required: usize,
    },

    /// A one-shot correction was applied to a cube a second time
    #[error("Correction already applied: {step}")]
    AlreadyApplied {
        /// Name of the correction step
        step: &'static str,
    },

    /// Results file version is not readable by this build
    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected version string
        expected: String,
        /// Found version string
        found: String,
    },

    /// Work was abandoned because the batch was cancelled
    #[error("Cancelled before processing started")]
    Cancelled,
}

impl AnalysisError {
    /// Create a shape mismatch error with a message.
    pub fn shape_mismatch(message: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            message: message.into(),
        }
    }

    /// Create a configuration error with a message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Create a corrupt field error.
    pub fn corrupt_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CorruptField {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether this error aborts only the current cube (as opposed to an
    /// environment problem such as I/O that is likely to affect every cube).
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::ShapeMismatch { .. }
                | Self::EmptyRange { .. }
                | Self::Configuration { .. }
                | Self::SignalTooShort { .. }
                | Self::AlreadyApplied { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_errors() {
        assert!(AnalysisError::shape_mismatch("3 vs 4 samples").is_structural());
        assert!(AnalysisError::EmptyRange { start: 1.0, stop: 0.0 }.is_structural());
        assert!(AnalysisError::configuration("bad order").is_structural());

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(!AnalysisError::from(io).is_structural());
        assert!(!AnalysisError::corrupt_field("rms", "truncated").is_structural());
        assert!(!AnalysisError::Cancelled.is_structural());
    }
}
