//! Tabulated refractive indices and normal-incidence Fresnel reflectance.

use std::collections::HashMap;
use std::io::Read;

use num_complex::Complex64;

use super::{Material, ReflectanceLookup};
use crate::error::{AnalysisError, Result};

/// One tabulated sample of a complex refractive index `n + ik`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexSample {
    pub wavelength_nm: f64,
    pub n: f64,
    pub k: f64,
}

/// Refractive index tables keyed by material.
///
/// Lookups are limited to the wavelength span covered by every registered
/// material so that no material is ever extrapolated.
#[derive(Debug, Clone, Default)]
pub struct RefractiveIndexTable {
    materials: HashMap<Material, Vec<IndexSample>>,
}

impl RefractiveIndexTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register samples for a material. Samples are sorted by wavelength.
    pub fn insert(&mut self, material: Material, mut samples: Vec<IndexSample>) -> Result<()> {
        if samples.len() < 2 {
            return Err(AnalysisError::configuration(format!(
                "refractive index table for {} needs at least two samples",
                material.name()
            )));
        }
        samples.sort_by(|a, b| a.wavelength_nm.total_cmp(&b.wavelength_nm));
        self.materials.insert(material, samples);
        Ok(())
    }

    /// Builder-style registration of a wavelength-independent index.
    pub fn with_constant(mut self, material: Material, n: f64) -> Self {
        let samples = vec![
            IndexSample {
                wavelength_nm: 200.0,
                n,
                k: 0.0,
            },
            IndexSample {
                wavelength_nm: 2000.0,
                n,
                k: 0.0,
            },
        ];
        self.materials.insert(material, samples);
        self
    }

    /// Register a material from CSV with columns `wavelength_um,n[,k]` and a header row.
    pub fn load_csv<R: Read>(&mut self, material: Material, reader: R) -> Result<()> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut samples = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            let field = |i: usize| -> Result<Option<f64>> {
                match record.get(i).filter(|s| !s.is_empty()) {
                    Some(s) => s.parse::<f64>().map(Some).map_err(|e| {
                        AnalysisError::configuration(format!(
                            "invalid number '{}' in {} table: {}",
                            s,
                            material.name(),
                            e
                        ))
                    }),
                    None => Ok(None),
                }
            };
            let (Some(wavelength_um), Some(n)) = (field(0)?, field(1)?) else {
                continue;
            };
            samples.push(IndexSample {
                wavelength_nm: wavelength_um * 1e3,
                n,
                k: field(2)?.unwrap_or(0.0),
            });
        }

        log::debug!(
            "Loaded {} refractive index samples for {}",
            samples.len(),
            material.name()
        );
        self.insert(material, samples)
    }

    /// Wavelength span (nm) covered by every registered material.
    pub fn valid_span(&self) -> Option<(f64, f64)> {
        let mut span: Option<(f64, f64)> = None;
        for samples in self.materials.values() {
            let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
                continue;
            };
            span = Some(match span {
                None => (first.wavelength_nm, last.wavelength_nm),
                Some((lo, hi)) => (lo.max(first.wavelength_nm), hi.min(last.wavelength_nm)),
            });
        }
        span
    }

    /// Complex refractive index of a material at each wavelength.
    pub fn refractive_index(
        &self,
        material: Material,
        wavelengths_nm: &[f64],
    ) -> Result<Vec<Complex64>> {
        let samples = self.materials.get(&material).ok_or_else(|| {
            AnalysisError::configuration(format!(
                "no refractive index table for {}",
                material.name()
            ))
        })?;
        let (lo, hi) = self
            .valid_span()
            .ok_or_else(|| AnalysisError::configuration("refractive index table is empty"))?;

        wavelengths_nm
            .iter()
            .map(|&wl| {
                if wl < lo || wl > hi {
                    return Err(AnalysisError::configuration(format!(
                        "wavelength {} nm is outside the tabulated range {}-{} nm",
                        wl, lo, hi
                    )));
                }
                Ok(interpolate(samples, wl))
            })
            .collect()
    }
}

/// Linear interpolation of `n` and `k` between bracketing samples.
fn interpolate(samples: &[IndexSample], wavelength_nm: f64) -> Complex64 {
    let upper = samples
        .partition_point(|s| s.wavelength_nm < wavelength_nm)
        .clamp(1, samples.len() - 1);
    let a = samples[upper - 1];
    let b = samples[upper];
    let t = (wavelength_nm - a.wavelength_nm) / (b.wavelength_nm - a.wavelength_nm);
    Complex64::new(a.n + t * (b.n - a.n), a.k + t * (b.k - a.k))
}

impl ReflectanceLookup for RefractiveIndexTable {
    /// Normal-incidence Fresnel reflectance `|(n1 - n2) / (n1 + n2)|²`.
    ///
    /// The numerical aperture does not change the result.
    fn reflectance(
        &self,
        first: Material,
        second: Material,
        wavelengths_nm: &[f64],
        _numerical_aperture: f64,
    ) -> Result<Vec<f64>> {
        let n1 = self.refractive_index(first, wavelengths_nm)?;
        let n2 = self.refractive_index(second, wavelengths_nm)?;
        Ok(n1
            .iter()
            .zip(&n2)
            .map(|(&a, &b)| ((a - b) / (a + b)).norm_sqr())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_water_glass_constant_index() {
        let table = RefractiveIndexTable::new()
            .with_constant(Material::Water, 1.333)
            .with_constant(Material::Glass, 1.52);
        let r = table
            .reflectance(Material::Water, Material::Glass, &[500.0, 600.0], 0.52)
            .unwrap();
        let expected = ((1.333_f64 - 1.52) / (1.333 + 1.52)).powi(2);
        assert_relative_eq!(r[0], expected, epsilon = 1e-12);
        assert_relative_eq!(r[1], expected, epsilon = 1e-12);
    }

    #[test]
    fn test_csv_interpolation() {
        let csv_text = "wl,n,k\n0.4,1.50,0.0\n0.6,1.54,0.0\n0.8,1.56,0.0\n";
        let mut table = RefractiveIndexTable::new();
        table.load_csv(Material::Glass, csv_text.as_bytes()).unwrap();

        let n = table.refractive_index(Material::Glass, &[500.0, 700.0]).unwrap();
        assert_relative_eq!(n[0].re, 1.52, epsilon = 1e-12);
        assert_relative_eq!(n[1].re, 1.55, epsilon = 1e-12);
    }

    #[test]
    fn test_span_is_intersection() {
        let mut table = RefractiveIndexTable::new();
        table
            .load_csv(Material::Glass, "wl,n\n0.3,1.5\n0.9,1.5\n".as_bytes())
            .unwrap();
        table
            .load_csv(Material::Water, "wl,n,k\n0.4,1.33,0\n1.0,1.33,0\n".as_bytes())
            .unwrap();
        assert_eq!(table.valid_span(), Some((400.0, 900.0)));

        let result = table.reflectance(Material::Water, Material::Glass, &[350.0], 0.5);
        assert!(matches!(result, Err(AnalysisError::Configuration { .. })));
    }

    #[test]
    fn test_missing_material() {
        let table = RefractiveIndexTable::new().with_constant(Material::Glass, 1.5);
        assert!(table.refractive_index(Material::Ito, &[500.0]).is_err());
    }
}
