//! End-to-end analysis of spectral cubes against one prepared reference.

use std::fmt;
use std::time::Instant;

use ndarray::Array2;

use super::settings::AnalysisSettings;
use super::warnings::AnalysisWarning;
use crate::constants::DUST_FILTER_SIGMA_UM;
use crate::data::{
    ExtraReflectanceCube, ExtraReflectionCube, SharedBuffer, SharedCube, SpectralCube,
};
use crate::error::{AnalysisError, Result};
use crate::pipeline;
use crate::reflection::{Material, ReflectanceLookup};
use crate::results::{AnalysisResults, ComputedFields, Provenance, ReflectanceCube};

/// Stage of a single `run` invocation, used for logging and error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Created,
    Normalizing,
    Filtering,
    RangeSelecting,
    DomainConverting,
    Detrending,
    ComputingStatistics,
    Packaged,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Created => "created",
            PipelineStage::Normalizing => "normalizing",
            PipelineStage::Filtering => "filtering",
            PipelineStage::RangeSelecting => "range selecting",
            PipelineStage::DomainConverting => "domain converting",
            PipelineStage::Detrending => "detrending",
            PipelineStage::ComputingStatistics => "computing statistics",
            PipelineStage::Packaged => "packaged",
            PipelineStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The standard PWS analysis.
///
/// Construct once per (settings, reference) pair; the reference is corrected
/// and moved into read-only shared storage here, so [`Analysis::run`] can be
/// called for any number of cubes, including concurrently.
#[derive(Debug)]
pub struct Analysis {
    settings: AnalysisSettings,
    reference: SharedCube,
    extra_reflection: Option<ExtraReflectionCube>,
    init_warnings: Vec<AnalysisWarning>,
}

impl Analysis {
    /// Prepare a reference for analysis.
    ///
    /// The reference is camera corrected if needed, exposure normalized, dust
    /// filtered when its pixel size is known, has extra reflection removed
    /// when a calibration is supplied, and is divided by the theoretical
    /// reflectance unless results are kept in relative units.
    pub fn new(
        settings: AnalysisSettings,
        mut reference: SpectralCube,
        extra_reflectance: Option<&ExtraReflectanceCube>,
        lookup: &dyn ReflectanceLookup,
    ) -> Result<Self> {
        settings.validate()?;
        let mut init_warnings = Vec::new();

        if !reference.status().camera_corrected {
            let correction = settings.camera_correction.as_ref().ok_or_else(|| {
                AnalysisError::configuration(format!(
                    "reference '{}' is not camera corrected and no camera correction was configured",
                    reference.metadata().id_tag
                ))
            })?;
            pipeline::correct_camera_effects(&mut reference, correction)?;
        }
        pipeline::normalize_by_exposure(&mut reference)?;
        if !pipeline::filter_dust(&mut reference, DUST_FILTER_SIGMA_UM) {
            log::info!(
                "Reference '{}' has no pixel size, skipping dust filter",
                reference.metadata().id_tag
            );
        }

        let theory_r = match settings.reference_material {
            Some(material) => lookup.reflectance(
                material,
                Material::Glass,
                reference.index(),
                settings.numerical_aperture,
            )?,
            None => {
                if extra_reflectance.is_some() {
                    return Err(AnalysisError::configuration(
                        "extra reflectance correction requires a reference material",
                    ));
                }
                init_warnings.push(AnalysisWarning::ignored_reference_material());
                vec![1.0; reference.index().len()]
            }
        };

        let extra_reflection = match extra_reflectance {
            None => {
                if let Some(id) = &settings.extra_reflectance_id {
                    return Err(AnalysisError::configuration(format!(
                        "settings name extra reflectance '{}' but none was supplied",
                        id
                    )));
                }
                init_warnings.push(AnalysisWarning::ignored_extra_reflection());
                None
            }
            Some(calibration) => {
                if let Some(id) = &settings.extra_reflectance_id {
                    if *id != calibration.metadata().id_tag {
                        return Err(AnalysisError::configuration(format!(
                            "settings name extra reflectance '{}' but '{}' was supplied",
                            id,
                            calibration.metadata().id_tag
                        )));
                    }
                }
                let calibration_na = calibration.metadata().numerical_aperture;
                if calibration_na != settings.numerical_aperture {
                    init_warnings.push(AnalysisWarning::numerical_aperture_mismatch(
                        calibration_na,
                        settings.numerical_aperture,
                    ));
                }
                let extra = ExtraReflectionCube::create(
                    calibration,
                    &theory_r,
                    reference.data(),
                    reference.index(),
                )?;
                pipeline::subtract_extra_reflection(
                    &mut reference,
                    extra.data(),
                    extra.wavelengths(),
                )?;
                Some(extra)
            }
        };

        if !settings.uses_relative_units() {
            pipeline::divide_by_spectrum(reference.data_mut(), &theory_r)?;
        }

        for warning in &init_warnings {
            log::warn!("{}", warning);
        }
        let id_tag = reference.metadata().id_tag.clone();
        let (data, index, _) = reference.into_parts();
        log::info!(
            "Prepared reference '{}' with shape {:?}",
            id_tag,
            data.dim()
        );

        Ok(Self {
            settings,
            reference: SharedCube::new(SharedBuffer::new(data), index, id_tag),
            extra_reflection,
            init_warnings,
        })
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// The prepared, read-only reference.
    pub fn reference(&self) -> &SharedCube {
        &self.reference
    }

    /// Extra reflection in reference units, if a calibration was supplied.
    pub fn extra_reflection(&self) -> Option<&ExtraReflectionCube> {
        self.extra_reflection.as_ref()
    }

    /// Warnings raised while preparing the reference.
    pub fn init_warnings(&self) -> &[AnalysisWarning] {
        &self.init_warnings
    }

    /// Analyze one cube.
    ///
    /// Either the complete results are returned or the first error; no
    /// partial record is produced. The returned warnings include those raised
    /// while preparing the reference.
    pub fn run(&self, cube: SpectralCube) -> Result<(AnalysisResults, Vec<AnalysisWarning>)> {
        let id_tag = cube.metadata().id_tag.clone();
        let start = Instant::now();
        let mut stage = PipelineStage::Created;
        log::debug!("Analysis of '{}': {}", id_tag, stage);

        match self.run_stages(cube, &mut stage) {
            Ok(output) => {
                log::debug!(
                    "Analysis of '{}': {} in {:.1} ms",
                    id_tag,
                    PipelineStage::Packaged,
                    start.elapsed().as_secs_f64() * 1000.0
                );
                Ok(output)
            }
            Err(e) => {
                log::debug!(
                    "Analysis of '{}': {} while {}: {}",
                    id_tag,
                    PipelineStage::Failed,
                    stage,
                    e
                );
                Err(e)
            }
        }
    }

    fn run_stages(
        &self,
        mut cube: SpectralCube,
        stage: &mut PipelineStage,
    ) -> Result<(AnalysisResults, Vec<AnalysisWarning>)> {
        let settings = &self.settings;
        let id_tag = cube.metadata().id_tag.clone();
        let mut warnings = self.init_warnings.clone();

        advance(stage, PipelineStage::Normalizing, &id_tag);
        let extra = self
            .extra_reflection
            .as_ref()
            .map(|e| (e.data(), e.wavelengths()));
        pipeline::normalize(
            &mut cube,
            &self.reference,
            extra,
            settings.camera_correction.as_ref(),
        )?;

        advance(stage, PipelineStage::Filtering, &id_tag);
        let wavelengths = cube.index().to_vec();
        pipeline::filter_spectra(
            cube.data_mut(),
            &wavelengths,
            settings.filter_order,
            settings.filter_cutoff,
        )?;

        advance(stage, PipelineStage::RangeSelecting, &id_tag);
        let cube =
            pipeline::select_range(&cube, settings.wavelength_start, settings.wavelength_stop)?;
        let mean_reflectance = cube.spectral_mean();

        advance(stage, PipelineStage::DomainConverting, &id_tag);
        let mut cube = pipeline::to_wavenumber(&cube)?;

        advance(stage, PipelineStage::Detrending, &id_tag);
        let fitted = pipeline::detrend(&mut cube, settings.polynomial_order)?;

        advance(stage, PipelineStage::ComputingStatistics, &id_tag);
        let rms = pipeline::rms(cube.data());
        let mut fields = ComputedFields {
            mean_reflectance: Some(mean_reflectance),
            ..Default::default()
        };
        if !settings.skip_advanced {
            fields.polynomial_rms = Some(pipeline::rms(fitted.view()));
            let acf = pipeline::autocorrelation(
                cube.data(),
                cube.index(),
                settings.auto_corr_stop_index,
                settings.auto_corr_min_sub,
            )?;
            let ld = pipeline::ld(rms.view(), acf.slope.view())?;
            if let Some(opd) = &settings.opd {
                fields.opd = Some(pipeline::opd(
                    cube.data(),
                    cube.index(),
                    opd.hann_window,
                    opd.index_stop,
                )?);
            }
            fields.autocorrelation_slope = Some(acf.slope);
            fields.r_squared = Some(acf.r_squared);
            fields.ld = Some(ld);
        }
        fields.rms = Some(rms);
        for (name, map) in [
            ("meanReflectance", &fields.mean_reflectance),
            ("rms", &fields.rms),
            ("polynomialRms", &fields.polynomial_rms),
            ("autoCorrelationSlope", &fields.autocorrelation_slope),
            ("rSquared", &fields.r_squared),
            ("ld", &fields.ld),
        ] {
            if let Some(warning) = map.as_ref().and_then(|map| degeneracy_warning(name, map)) {
                log::warn!("'{}': {}", id_tag, warning);
                warnings.push(warning);
            }
        }

        let (data, wavenumbers, metadata) = cube.into_parts();
        fields.reflectance = Some(ReflectanceCube { data, wavenumbers });
        let provenance = Provenance {
            im_cube_id_tag: metadata.id_tag,
            reference_id_tag: self.reference.id_tag().to_string(),
            extra_reflection_tag: self
                .extra_reflection
                .as_ref()
                .map(|e| e.id_tag().to_string()),
        };

        let results = AnalysisResults::create(settings.clone(), fields, provenance)?;
        *stage = PipelineStage::Packaged;
        Ok((results, warnings))
    }
}

fn advance(stage: &mut PipelineStage, next: PipelineStage, id_tag: &str) {
    *stage = next;
    log::debug!("Analysis of '{}': {}", id_tag, next);
}

fn degeneracy_warning(field: &'static str, map: &Array2<f32>) -> Option<AnalysisWarning> {
    let pixels = map.iter().filter(|v| !v.is_finite()).count();
    (pixels > 0).then(|| AnalysisWarning::numeric_degeneracy(field, pixels, map.len()))
}
