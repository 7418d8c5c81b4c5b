//! Global constants for the PWS analysis pipeline

/// Empirical constant A1 of the Ld model
pub const LD_A1: f64 = 0.008;

/// Empirical constant A2 of the Ld model
pub const LD_A2: f64 = 4.0;

/// Wavelength (µm) at which the Ld model is evaluated
pub const LD_WAVELENGTH_UM: f64 = 0.55;

/// Refractive index used by the Ld model
pub const LD_REFRACTIVE_INDEX: f64 = 1.38;

/// Gaussian blur applied to the reference to suppress dust (µm)
pub const DUST_FILTER_SIGMA_UM: f64 = 0.75;

/// Number of OPD bins kept when OPD is derived on demand from stored reflectance
pub const DEFAULT_OPD_INDEX_STOP: usize = 100;

/// Name of the folder (next to an acquisition) holding its analysis results
pub const ANALYSES_DIR: &str = "analyses";

/// Prefix of every results file name
pub const RESULTS_FILE_PREFIX: &str = "analysisResults_";

/// Extension of every results file name
pub const RESULTS_FILE_EXTENSION: &str = "npz";

/// Suffix of a saved settings file
pub const SETTINGS_FILE_SUFFIX: &str = "_analysis.json";

/// Timestamp format used for results creation times
pub const DATE_TIME_FORMAT: &str = "%d-%m-%Y %H:%M:%S";
