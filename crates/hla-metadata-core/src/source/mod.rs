//! Nomenclature source repository: loads the raw per-version records.

pub mod filesystem;
pub mod memory;
pub mod parser;
pub mod records;

pub use filesystem::FileSystemSource;
pub use memory::InMemorySource;
pub use records::Dataset;

use crate::errors::HlaResult;

/// Supplies the complete record set for a nomenclature version.
///
/// Records keep their raw locus spelling; filtering to matching loci is the
/// caller's job. A version whose records are missing or malformed must fail
/// with `DataUnavailable` instead of returning partial data.
pub trait NomenclatureSource: Send + Sync {
    fn get_dataset(&self, version: &str) -> HlaResult<Dataset>;

    fn available_versions(&self) -> HlaResult<Vec<String>> {
        Ok(Vec::new())
    }
}
