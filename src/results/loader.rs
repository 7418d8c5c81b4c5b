//! Lazy, field-by-field reading of analysis results.
//!
//! [`LazyResults`] keeps one slot per field. A slot starts `NotLoaded` and
//! becomes `Loaded` the first time the field is requested; later requests are
//! served from the slot without touching storage. Storage is abstracted by
//! [`ResultsBackend`], implemented for results files ([`ArchiveBackend`]) and
//! for results already in memory ([`MemoryBackend`]).

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, Array3};
use ndarray_npy::ReadNpyExt;
use zip::ZipArchive;
use zip::result::ZipError;

use super::archive::{
    self, EXTRA_REFLECTION_ENTRY, FORMAT_VERSION, IM_CUBE_ID_ENTRY, OPD_ENTRY, OPD_INDEX_ENTRY,
    REFERENCE_ID_ENTRY, REFLECTANCE_ENTRY, SETTINGS_ENTRY, TIME_ENTRY, VERSION_ENTRY,
    WAVENUMBERS_ENTRY,
};
use super::record::{AnalysisResults, ComputedFields, Provenance, ReflectanceCube};
use crate::analysis::AnalysisSettings;
use crate::constants::DEFAULT_OPD_INDEX_STOP;
use crate::error::{AnalysisError, Result};
use crate::pipeline::{self, OpdSpectra};

/// Every field a results record can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultField {
    Time,
    Settings,
    ImCubeIdTag,
    ReferenceIdTag,
    ExtraReflectionTag,
    Reflectance,
    MeanReflectance,
    Rms,
    PolynomialRms,
    AutoCorrelationSlope,
    RSquared,
    Ld,
    Opd,
}

const FIELD_COUNT: usize = 13;

impl ResultField {
    /// Stored name of the field.
    pub fn name(self) -> &'static str {
        match self {
            ResultField::Time => "time",
            ResultField::Settings => "settings",
            ResultField::ImCubeIdTag => "imCubeIdTag",
            ResultField::ReferenceIdTag => "referenceIdTag",
            ResultField::ExtraReflectionTag => "extraReflectionTag",
            ResultField::Reflectance => "reflectance",
            ResultField::MeanReflectance => "meanReflectance",
            ResultField::Rms => "rms",
            ResultField::PolynomialRms => "polynomialRms",
            ResultField::AutoCorrelationSlope => "autoCorrelationSlope",
            ResultField::RSquared => "rSquared",
            ResultField::Ld => "ld",
            ResultField::Opd => "opd",
        }
    }

    pub fn all() -> [ResultField; FIELD_COUNT] {
        [
            ResultField::Time,
            ResultField::Settings,
            ResultField::ImCubeIdTag,
            ResultField::ReferenceIdTag,
            ResultField::ExtraReflectionTag,
            ResultField::Reflectance,
            ResultField::MeanReflectance,
            ResultField::Rms,
            ResultField::PolynomialRms,
            ResultField::AutoCorrelationSlope,
            ResultField::RSquared,
            ResultField::Ld,
            ResultField::Opd,
        ]
    }

    /// Whether every valid record holds this field.
    pub fn is_required(self) -> bool {
        matches!(
            self,
            ResultField::Time
                | ResultField::Settings
                | ResultField::ImCubeIdTag
                | ResultField::ReferenceIdTag
                | ResultField::Reflectance
                | ResultField::MeanReflectance
                | ResultField::Rms
        )
    }

    fn position(self) -> usize {
        self as usize
    }

    /// Archive entry whose presence marks the field as stored.
    fn entry(self) -> String {
        match self {
            ResultField::Time => TIME_ENTRY.to_string(),
            ResultField::Settings => SETTINGS_ENTRY.to_string(),
            ResultField::ImCubeIdTag => IM_CUBE_ID_ENTRY.to_string(),
            ResultField::ReferenceIdTag => REFERENCE_ID_ENTRY.to_string(),
            ResultField::ExtraReflectionTag => EXTRA_REFLECTION_ENTRY.to_string(),
            ResultField::Reflectance => REFLECTANCE_ENTRY.to_string(),
            ResultField::Opd => OPD_ENTRY.to_string(),
            map => archive::map_entry(map.name()),
        }
    }
}

/// A decoded field value.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Text(String),
    Settings(AnalysisSettings),
    Map(Array2<f32>),
    Reflectance(ReflectanceCube),
    Opd(OpdSpectra),
}

impl FieldValue {
    fn kind(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Settings(_) => "settings",
            FieldValue::Map(_) => "2D map",
            FieldValue::Reflectance(_) => "reflectance cube",
            FieldValue::Opd(_) => "OPD cube",
        }
    }
}

/// Storage capable of answering field requests.
pub trait ResultsBackend {
    /// Whether the field is stored.
    fn has_field(&self, field: ResultField) -> bool;

    /// Read and decode a stored field.
    ///
    /// Absent fields give [`AnalysisError::MissingField`]; fields that exist
    /// but cannot be decoded give [`AnalysisError::CorruptField`].
    fn read_field(&mut self, field: ResultField) -> Result<FieldValue>;
}

/// Results file opened for reading.
///
/// Holds the file handle until dropped.
pub struct ArchiveBackend {
    path: PathBuf,
    archive: ZipArchive<File>,
    version: String,
}

impl std::fmt::Debug for ArchiveBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveBackend")
            .field("path", &self.path)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl ArchiveBackend {
    /// Open a results file and check that its major version is readable.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let archive = ZipArchive::new(file)?;
        let mut backend = Self {
            path,
            archive,
            version: String::new(),
        };

        let version = backend
            .entry_text(VERSION_ENTRY, "version")?
            .trim()
            .to_string();
        if major(&version) != major(FORMAT_VERSION) {
            return Err(AnalysisError::VersionMismatch {
                expected: FORMAT_VERSION.to_string(),
                found: version,
            });
        }
        backend.version = version;
        log::info!(
            "Opened results {:?} (version {})",
            backend.path,
            backend.version
        );
        Ok(backend)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Format version stored in the file.
    pub fn version(&self) -> &str {
        &self.version
    }

    fn entry_bytes(&mut self, entry: &str, field: &str) -> Result<Vec<u8>> {
        let mut file = match self.archive.by_name(entry) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Err(AnalysisError::missing_field(field)),
            Err(e) => return Err(e.into()),
        };
        let mut bytes = Vec::with_capacity(capacity_hint(file.size()));
        file.read_to_end(&mut bytes)
            .map_err(|e| AnalysisError::corrupt_field(field, e.to_string()))?;
        Ok(bytes)
    }

    fn entry_text(&mut self, entry: &str, field: &str) -> Result<String> {
        let bytes = self.entry_bytes(entry, field)?;
        String::from_utf8(bytes).map_err(|e| AnalysisError::corrupt_field(field, e.to_string()))
    }

    fn entry_array<A: ReadNpyExt>(&mut self, entry: &str, field: &str) -> Result<A> {
        let bytes = self.entry_bytes(entry, field)?;
        A::read_npy(bytes.as_slice()).map_err(|e| AnalysisError::corrupt_field(field, e.to_string()))
    }
}

/// Upper bound on the buffer reserved from an entry's declared size.
const MAX_ENTRY_PREALLOCATION: u64 = 64 * 1024 * 1024;

fn capacity_hint(declared: u64) -> usize {
    usize::try_from(declared.min(MAX_ENTRY_PREALLOCATION)).unwrap_or(0)
}

fn major(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

impl ResultsBackend for ArchiveBackend {
    fn has_field(&self, field: ResultField) -> bool {
        let entry = field.entry();
        self.archive.file_names().any(|name| name == entry)
    }

    fn read_field(&mut self, field: ResultField) -> Result<FieldValue> {
        let name = field.name();
        let entry = field.entry();
        let value = match field {
            ResultField::Time
            | ResultField::ImCubeIdTag
            | ResultField::ReferenceIdTag
            | ResultField::ExtraReflectionTag => FieldValue::Text(self.entry_text(&entry, name)?),
            ResultField::Settings => {
                let json = self.entry_text(&entry, name)?;
                let settings = AnalysisSettings::from_json(&json)
                    .map_err(|e| AnalysisError::corrupt_field(name, e.to_string()))?;
                FieldValue::Settings(settings)
            }
            ResultField::Reflectance => {
                let data: Array3<f32> = self.entry_array(&entry, name)?;
                let wavenumbers: Array1<f64> = self.entry_array(WAVENUMBERS_ENTRY, name)?;
                FieldValue::Reflectance(ReflectanceCube {
                    data,
                    wavenumbers: wavenumbers.to_vec(),
                })
            }
            ResultField::Opd => {
                let data: Array3<f32> = self.entry_array(&entry, name)?;
                let index: Array1<f64> = self.entry_array(OPD_INDEX_ENTRY, name)?;
                FieldValue::Opd(OpdSpectra {
                    data,
                    index: index.to_vec(),
                })
            }
            ResultField::MeanReflectance
            | ResultField::Rms
            | ResultField::PolynomialRms
            | ResultField::AutoCorrelationSlope
            | ResultField::RSquared
            | ResultField::Ld => FieldValue::Map(self.entry_array(&entry, name)?),
        };
        log::debug!("Read '{}' from {:?}", name, self.path);
        Ok(value)
    }
}

/// Results held in memory, served through the same lazy interface.
///
/// Each field is handed over to the reader once; [`LazyResults`] keeps it
/// from then on.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    fields: HashMap<ResultField, FieldValue>,
}

impl MemoryBackend {
    pub fn new(fields: HashMap<ResultField, FieldValue>) -> Self {
        Self { fields }
    }

    /// Split a results record into its fields, omitting the ones not computed.
    pub fn from_results(results: AnalysisResults) -> Self {
        let mut fields = HashMap::new();
        fields.insert(ResultField::Time, FieldValue::Text(results.time().to_string()));
        fields.insert(
            ResultField::Settings,
            FieldValue::Settings(results.settings().clone()),
        );
        let provenance = results.provenance();
        fields.insert(
            ResultField::ImCubeIdTag,
            FieldValue::Text(provenance.im_cube_id_tag.clone()),
        );
        fields.insert(
            ResultField::ReferenceIdTag,
            FieldValue::Text(provenance.reference_id_tag.clone()),
        );
        if let Some(tag) = &provenance.extra_reflection_tag {
            fields.insert(ResultField::ExtraReflectionTag, FieldValue::Text(tag.clone()));
        }
        fields.insert(
            ResultField::Reflectance,
            FieldValue::Reflectance(results.reflectance().clone()),
        );
        fields.insert(
            ResultField::MeanReflectance,
            FieldValue::Map(results.mean_reflectance().clone()),
        );
        fields.insert(ResultField::Rms, FieldValue::Map(results.rms().clone()));
        let optional_maps = [
            (ResultField::PolynomialRms, results.polynomial_rms()),
            (ResultField::AutoCorrelationSlope, results.autocorrelation_slope()),
            (ResultField::RSquared, results.r_squared()),
            (ResultField::Ld, results.ld()),
        ];
        for (field, map) in optional_maps {
            if let Some(map) = map {
                fields.insert(field, FieldValue::Map(map.clone()));
            }
        }
        if let Some(opd) = results.opd() {
            fields.insert(ResultField::Opd, FieldValue::Opd(opd.clone()));
        }
        Self { fields }
    }
}

impl ResultsBackend for MemoryBackend {
    fn has_field(&self, field: ResultField) -> bool {
        self.fields.contains_key(&field)
    }

    fn read_field(&mut self, field: ResultField) -> Result<FieldValue> {
        self.fields
            .remove(&field)
            .ok_or_else(|| AnalysisError::missing_field(field.name()))
    }
}

#[derive(Debug)]
enum LoadState {
    NotLoaded,
    Loaded(FieldValue),
}

/// Lazily loaded results.
///
/// Field accessors take `&mut self` because the first access fills the
/// field's slot. Absent optional fields give [`AnalysisError::MissingField`];
/// an absent required field means a damaged file and gives
/// [`AnalysisError::CorruptField`]. Dropping the loader, or calling
/// [`LazyResults::close`], releases the backend (and its file handle);
/// fields loaded before closing stay available.
#[derive(Debug)]
pub struct LazyResults<B: ResultsBackend> {
    backend: Option<B>,
    slots: [LoadState; FIELD_COUNT],
    derived_opd: Option<OpdSpectra>,
}

impl LazyResults<ArchiveBackend> {
    /// Open a results file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(ArchiveBackend::open(path)?))
    }

    /// Open the results of analysis `name` saved next to an acquisition.
    pub fn open_named(acquisition_dir: &Path, name: &str) -> Result<Self> {
        Self::open(archive::results_path(acquisition_dir, name))
    }
}

impl LazyResults<MemoryBackend> {
    pub fn from_results(results: AnalysisResults) -> Self {
        Self::new(MemoryBackend::from_results(results))
    }
}

impl<B: ResultsBackend> LazyResults<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Some(backend),
            slots: std::array::from_fn(|_| LoadState::NotLoaded),
            derived_opd: None,
        }
    }

    /// Whether the field has been read and cached.
    pub fn is_loaded(&self, field: ResultField) -> bool {
        matches!(self.slots[field.position()], LoadState::Loaded(_))
    }

    /// Whether the field is available, either cached or in storage.
    pub fn has_field(&self, field: ResultField) -> bool {
        self.is_loaded(field)
            || self
                .backend
                .as_ref()
                .is_some_and(|backend| backend.has_field(field))
    }

    /// Fetch a field, reading it from the backend on first access.
    pub fn get(&mut self, field: ResultField) -> Result<&FieldValue> {
        let slot = field.position();
        if matches!(self.slots[slot], LoadState::NotLoaded) {
            let backend = self.backend.as_mut().ok_or_else(|| {
                AnalysisError::configuration(format!(
                    "cannot read '{}': results have been closed",
                    field.name()
                ))
            })?;
            if !backend.has_field(field) {
                if field.is_required() {
                    return Err(required_absent(field));
                }
                return Err(AnalysisError::missing_field(field.name()));
            }
            let value = backend.read_field(field)?;
            self.slots[slot] = LoadState::Loaded(value);
        } else {
            log::trace!("Field '{}' served from cache", field.name());
        }
        match &self.slots[slot] {
            LoadState::Loaded(value) => Ok(value),
            LoadState::NotLoaded => Err(AnalysisError::missing_field(field.name())),
        }
    }

    fn text(&mut self, field: ResultField) -> Result<&str> {
        match self.get(field)? {
            FieldValue::Text(text) => Ok(text),
            other => Err(unexpected(field, other)),
        }
    }

    fn map(&mut self, field: ResultField) -> Result<&Array2<f32>> {
        match self.get(field)? {
            FieldValue::Map(map) => Ok(map),
            other => Err(unexpected(field, other)),
        }
    }

    pub fn time(&mut self) -> Result<&str> {
        self.text(ResultField::Time)
    }

    pub fn settings(&mut self) -> Result<&AnalysisSettings> {
        match self.get(ResultField::Settings)? {
            FieldValue::Settings(settings) => Ok(settings),
            other => Err(unexpected(ResultField::Settings, other)),
        }
    }

    pub fn im_cube_id_tag(&mut self) -> Result<&str> {
        self.text(ResultField::ImCubeIdTag)
    }

    pub fn reference_id_tag(&mut self) -> Result<&str> {
        self.text(ResultField::ReferenceIdTag)
    }

    /// Tag of the extra reflection calibration, `None` if none was used.
    pub fn extra_reflection_tag(&mut self) -> Result<Option<&str>> {
        if !self.has_field(ResultField::ExtraReflectionTag) {
            return Ok(None);
        }
        self.text(ResultField::ExtraReflectionTag).map(Some)
    }

    pub fn reflectance(&mut self) -> Result<&ReflectanceCube> {
        match self.get(ResultField::Reflectance)? {
            FieldValue::Reflectance(reflectance) => Ok(reflectance),
            other => Err(unexpected(ResultField::Reflectance, other)),
        }
    }

    pub fn mean_reflectance(&mut self) -> Result<&Array2<f32>> {
        self.map(ResultField::MeanReflectance)
    }

    pub fn rms(&mut self) -> Result<&Array2<f32>> {
        self.map(ResultField::Rms)
    }

    pub fn polynomial_rms(&mut self) -> Result<&Array2<f32>> {
        self.map(ResultField::PolynomialRms)
    }

    pub fn autocorrelation_slope(&mut self) -> Result<&Array2<f32>> {
        self.map(ResultField::AutoCorrelationSlope)
    }

    pub fn r_squared(&mut self) -> Result<&Array2<f32>> {
        self.map(ResultField::RSquared)
    }

    pub fn ld(&mut self) -> Result<&Array2<f32>> {
        self.map(ResultField::Ld)
    }

    /// OPD spectra.
    ///
    /// When the record holds no OPD it is derived from the stored reflectance
    /// without a window, keeping the first 100 bins. The derived spectra are
    /// cached apart from the stored fields, so [`LazyResults::has_field`] and
    /// [`LazyResults::into_results`] still report only what storage holds.
    pub fn opd(&mut self) -> Result<&OpdSpectra> {
        let field = ResultField::Opd;
        if self.has_field(field) {
            return match self.get(field)? {
                FieldValue::Opd(opd) => Ok(opd),
                other => Err(unexpected(field, other)),
            };
        }
        if self.derived_opd.is_none() {
            log::debug!("No stored OPD, deriving it from reflectance");
            self.derived_opd = Some(self.compute_opd(false, DEFAULT_OPD_INDEX_STOP)?);
        }
        self.derived_opd
            .as_ref()
            .ok_or_else(|| AnalysisError::missing_field(field.name()))
    }

    /// Derive OPD spectra from the stored reflectance. Nothing is cached.
    pub fn compute_opd(&mut self, hann_window: bool, index_stop: usize) -> Result<OpdSpectra> {
        let reflectance = self.reflectance()?;
        pipeline::opd(
            reflectance.data.view(),
            &reflectance.wavenumbers,
            hann_window,
            index_stop,
        )
    }

    /// Read every stored field in one pass.
    ///
    /// Required fields must be present; a missing or undecodable field is
    /// reported as an error, which makes this a whole-file integrity check.
    pub fn load_all(&mut self) -> Result<()> {
        for field in ResultField::all() {
            if field.is_required() || self.has_field(field) {
                self.get(field)?;
            }
        }
        Ok(())
    }

    /// Load everything and assemble an [`AnalysisResults`], checking shapes.
    pub fn into_results(mut self) -> Result<AnalysisResults> {
        self.load_all()?;
        let mut take = |field: ResultField| {
            match std::mem::replace(&mut self.slots[field.position()], LoadState::NotLoaded) {
                LoadState::Loaded(value) => Some(value),
                LoadState::NotLoaded => None,
            }
        };

        let time = match take(ResultField::Time) {
            Some(FieldValue::Text(time)) => time,
            _ => return Err(required_absent(ResultField::Time)),
        };
        let settings = match take(ResultField::Settings) {
            Some(FieldValue::Settings(settings)) => settings,
            _ => return Err(required_absent(ResultField::Settings)),
        };
        let mut text = |field| match take(field) {
            Some(FieldValue::Text(text)) => Some(text),
            _ => None,
        };
        let provenance = Provenance {
            im_cube_id_tag: text(ResultField::ImCubeIdTag)
                .ok_or_else(|| required_absent(ResultField::ImCubeIdTag))?,
            reference_id_tag: text(ResultField::ReferenceIdTag)
                .ok_or_else(|| required_absent(ResultField::ReferenceIdTag))?,
            extra_reflection_tag: text(ResultField::ExtraReflectionTag),
        };

        let reflectance = match take(ResultField::Reflectance) {
            Some(FieldValue::Reflectance(reflectance)) => Some(reflectance),
            _ => None,
        };
        let opd = match take(ResultField::Opd) {
            Some(FieldValue::Opd(opd)) => Some(opd),
            _ => None,
        };
        let mut map = |field| match take(field) {
            Some(FieldValue::Map(map)) => Some(map),
            _ => None,
        };
        let fields = ComputedFields {
            reflectance,
            mean_reflectance: map(ResultField::MeanReflectance),
            rms: map(ResultField::Rms),
            polynomial_rms: map(ResultField::PolynomialRms),
            autocorrelation_slope: map(ResultField::AutoCorrelationSlope),
            r_squared: map(ResultField::RSquared),
            ld: map(ResultField::Ld),
            opd,
        };
        AnalysisResults::from_parts(time, settings, fields, provenance)
    }

    /// Release the backend. Loaded fields remain available.
    pub fn close(&mut self) {
        if self.backend.take().is_some() {
            log::debug!("Closed results backend");
        }
    }

    /// Whether the backend is still open.
    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }
}

fn required_absent(field: ResultField) -> AnalysisError {
    AnalysisError::corrupt_field(field.name(), "required field absent")
}

fn unexpected(field: ResultField, value: &FieldValue) -> AnalysisError {
    AnalysisError::corrupt_field(field.name(), format!("stored as {}", value.kind()))
}
