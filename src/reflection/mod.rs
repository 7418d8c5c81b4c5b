//! Theoretical reflectance of material interfaces.
//!
//! The analysis needs the expected reflectance of its reference (for example
//! a water/glass interface) to convert results into physical reflectance and
//! to express extra reflectance calibrations in reference units. The lookup
//! is injected into the analysis as a [`ReflectanceLookup`] rather than held
//! in a global.

mod table;

pub use table::{IndexSample, RefractiveIndexTable};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Materials with tabulated refractive indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Material {
    Glass,
    Water,
    Air,
    Silicon,
    #[serde(rename = "Oil_1_7")]
    Oil1_7,
    #[serde(rename = "Oil_1_4")]
    Oil1_4,
    Ipa,
    Ethanol,
    #[serde(rename = "ITO")]
    Ito,
}

impl Material {
    /// Name used in settings files.
    pub fn name(&self) -> &'static str {
        match self {
            Material::Glass => "Glass",
            Material::Water => "Water",
            Material::Air => "Air",
            Material::Silicon => "Silicon",
            Material::Oil1_7 => "Oil_1_7",
            Material::Oil1_4 => "Oil_1_4",
            Material::Ipa => "Ipa",
            Material::Ethanol => "Ethanol",
            Material::Ito => "ITO",
        }
    }

    /// All known materials.
    pub fn all() -> &'static [Material] {
        &[
            Material::Glass,
            Material::Water,
            Material::Air,
            Material::Silicon,
            Material::Oil1_7,
            Material::Oil1_4,
            Material::Ipa,
            Material::Ethanol,
            Material::Ito,
        ]
    }
}

/// Source of theoretical interface reflectance.
///
/// Implementations must be pure: the same arguments always give the same
/// spectrum.
pub trait ReflectanceLookup: Send + Sync {
    /// Reflectance (0 to 1) of the interface between `first` and `second` at
    /// each wavelength (nm), for light collected with the given numerical
    /// aperture.
    fn reflectance(
        &self,
        first: Material,
        second: Material,
        wavelengths_nm: &[f64],
        numerical_aperture: f64,
    ) -> Result<Vec<f64>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_names_match_serde() {
        for material in Material::all() {
            let json = serde_json::to_string(material).unwrap();
            assert_eq!(json, format!("\"{}\"", material.name()));
        }
    }
}
