//! Analysis results: the in-memory record, its on-disk archive and a lazy reader.

pub mod archive;
pub mod loader;
pub mod record;

pub use archive::{
    FORMAT_VERSION, file_name_to_name, list_analyses, name_to_file_name, results_path,
    save_results, write_results,
};
pub use loader::{
    ArchiveBackend, FieldValue, LazyResults, MemoryBackend, ResultField, ResultsBackend,
};
pub use record::{AnalysisResults, ComputedFields, Provenance, ReflectanceCube};
