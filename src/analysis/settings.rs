//! Analysis settings and their JSON representation.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::SETTINGS_FILE_SUFFIX;
use crate::data::CameraCorrection;
use crate::error::{AnalysisError, Result};
use crate::reflection::Material;

/// Optional OPD computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpdSettings {
    /// Apply a Hann window before the transform
    #[serde(default)]
    pub hann_window: bool,
    /// Number of OPD bins kept
    pub index_stop: usize,
}

/// Settings shared by every cube analyzed with one reference.
///
/// Keys use the camelCase names of saved settings files. Keys that older
/// files lack (`relativeUnits`, `extraReflectanceId`, `cameraCorrection`)
/// load as `None`; unknown keys are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSettings {
    /// Order of the Butterworth low-pass filter
    pub filter_order: usize,
    /// Cutoff of the low-pass filter, in cycles per spectral index unit (1/nm)
    pub filter_cutoff: f64,
    /// Order of the polynomial removed from every spectrum
    pub polynomial_order: usize,
    /// Id tag of the extra reflectance calibration to use
    #[serde(default)]
    pub extra_reflectance_id: Option<String>,
    /// Material imaged by the reference acquisition
    #[serde(default)]
    pub reference_material: Option<Material>,
    /// First wavelength (nm) kept for analysis, inclusive
    pub wavelength_start: f64,
    /// Last wavelength (nm) kept for analysis, inclusive
    pub wavelength_stop: f64,
    /// Skip polynomial RMS, autocorrelation, Ld and OPD
    pub skip_advanced: bool,
    /// Number of autocorrelation lags used for the slope fit
    pub auto_corr_stop_index: usize,
    /// Subtract the autocorrelation minimum before the fit
    pub auto_corr_min_sub: bool,
    /// Numerical aperture of the illumination
    pub numerical_aperture: f64,
    /// Report results relative to the reference instead of physical reflectance
    #[serde(default)]
    pub relative_units: Option<bool>,
    /// Correction applied to cubes not yet camera corrected
    #[serde(default)]
    pub camera_correction: Option<CameraCorrection>,
    /// Compute OPD spectra when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opd: Option<OpdSettings>,
}

impl AnalysisSettings {
    /// Settings recommended for typical cell imaging.
    pub fn recommended() -> Self {
        Self {
            filter_order: 2,
            filter_cutoff: 0.15,
            polynomial_order: 0,
            extra_reflectance_id: None,
            reference_material: Some(Material::Water),
            wavelength_start: 510.0,
            wavelength_stop: 690.0,
            skip_advanced: false,
            auto_corr_stop_index: 6,
            auto_corr_min_sub: true,
            numerical_aperture: 0.52,
            relative_units: Some(true),
            camera_correction: None,
            opd: None,
        }
    }

    /// Whether results stay relative to the reference.
    ///
    /// Files written before the setting existed are treated as absolute.
    pub fn uses_relative_units(&self) -> bool {
        self.relative_units.unwrap_or(false)
    }

    /// Reject settings that cannot be honored.
    pub fn validate(&self) -> Result<()> {
        if self.filter_order == 0 {
            return Err(AnalysisError::configuration("filterOrder must be at least 1"));
        }
        if !self.filter_cutoff.is_finite() || self.filter_cutoff <= 0.0 {
            return Err(AnalysisError::configuration(format!(
                "filterCutoff must be positive, got {}",
                self.filter_cutoff
            )));
        }
        let ordered = self.wavelength_start < self.wavelength_stop;
        if !ordered {
            return Err(AnalysisError::configuration(format!(
                "wavelengthStart ({}) must be below wavelengthStop ({})",
                self.wavelength_start, self.wavelength_stop
            )));
        }
        if !self.numerical_aperture.is_finite() || self.numerical_aperture <= 0.0 {
            return Err(AnalysisError::configuration(format!(
                "numericalAperture must be positive, got {}",
                self.numerical_aperture
            )));
        }
        if self.auto_corr_stop_index < 2 {
            return Err(AnalysisError::configuration(
                "autoCorrStopIndex must be at least 2",
            ));
        }
        if self.extra_reflectance_id.is_some() && self.reference_material.is_none() {
            return Err(AnalysisError::configuration(
                "extra reflectance correction requires a reference material",
            ));
        }
        if let Some(opd) = &self.opd {
            if opd.index_stop == 0 {
                return Err(AnalysisError::configuration("opd.indexStop must be at least 1"));
            }
        }
        Ok(())
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Path of a named settings file in a directory.
    pub fn file_path(directory: &Path, name: &str) -> PathBuf {
        directory.join(format!("{}{}", name, SETTINGS_FILE_SUFFIX))
    }

    /// Save as `<name>_analysis.json`, refusing to overwrite.
    pub fn save(&self, directory: &Path, name: &str) -> Result<PathBuf> {
        let path = Self::file_path(directory, name);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    AnalysisError::AlreadyExists { path: path.clone() }
                }
                _ => AnalysisError::Io(e),
            })?;
        file.write_all(self.to_json()?.as_bytes())?;
        log::info!("Saved analysis settings to {:?}", path);
        Ok(path)
    }

    /// Load `<name>_analysis.json` from a directory.
    pub fn load(directory: &Path, name: &str) -> Result<Self> {
        Self::load_file(&Self::file_path(directory, name))
    }

    /// Load settings from an explicit path.
    pub fn load_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let settings = Self::from_json(&json)?;
        log::debug!("Loaded analysis settings from {:?}", path);
        Ok(settings)
    }
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self::recommended()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_recommended_is_valid() {
        AnalysisSettings::recommended().validate().unwrap();
    }

    #[test]
    fn test_json_uses_camel_case_keys() {
        let json = AnalysisSettings::recommended().to_json().unwrap();
        for key in [
            "filterOrder",
            "filterCutoff",
            "polynomialOrder",
            "referenceMaterial",
            "wavelengthStart",
            "skipAdvanced",
            "autoCorrStopIndex",
            "autoCorrMinSub",
            "numericalAperture",
            "relativeUnits",
        ] {
            assert!(json.contains(key), "missing key {}", key);
        }
        assert!(json.contains("\"Water\""));
    }

    #[test]
    fn test_legacy_settings_default_to_none() {
        let json = r#"{
            "filterOrder": 2,
            "filterCutoff": 0.15,
            "polynomialOrder": 0,
            "referenceMaterial": "Water",
            "wavelengthStart": 510,
            "wavelengthStop": 690,
            "skipAdvanced": false,
            "autoCorrStopIndex": 6,
            "autoCorrMinSub": true,
            "numericalAperture": 0.52,
            "someRetiredKey": 12
        }"#;
        let settings = AnalysisSettings::from_json(json).unwrap();
        assert_eq!(settings.relative_units, None);
        assert_eq!(settings.extra_reflectance_id, None);
        assert_eq!(settings.camera_correction, None);
        assert!(!settings.uses_relative_units());
        assert_eq!(settings.wavelength_start, 510.0);
    }

    #[test]
    fn test_null_reference_material() {
        let mut settings = AnalysisSettings::recommended();
        settings.reference_material = None;
        let json = settings.to_json().unwrap();
        assert!(json.contains("\"referenceMaterial\": null"));
        assert_eq!(AnalysisSettings::from_json(&json).unwrap(), settings);
    }

    #[test]
    fn test_validate_rejects_bad_combinations() {
        let mut settings = AnalysisSettings::recommended();
        settings.wavelength_start = 700.0;
        assert!(settings.validate().is_err());

        let mut settings = AnalysisSettings::recommended();
        settings.reference_material = None;
        settings.extra_reflectance_id = Some("er".into());
        assert!(matches!(
            settings.validate(),
            Err(AnalysisError::Configuration { .. })
        ));

        let mut settings = AnalysisSettings::recommended();
        settings.auto_corr_stop_index = 1;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_save_load_and_no_overwrite() {
        let dir = TempDir::new().unwrap();
        let mut settings = AnalysisSettings::recommended();
        settings.opd = Some(OpdSettings {
            hann_window: true,
            index_stop: 50,
        });

        let path = settings.save(dir.path(), "default").unwrap();
        assert!(path.ends_with("default_analysis.json"));
        assert_eq!(AnalysisSettings::load(dir.path(), "default").unwrap(), settings);

        assert!(matches!(
            AnalysisSettings::recommended().save(dir.path(), "default"),
            Err(AnalysisError::AlreadyExists { .. })
        ));
        assert_eq!(AnalysisSettings::load(dir.path(), "default").unwrap(), settings);
    }
}
