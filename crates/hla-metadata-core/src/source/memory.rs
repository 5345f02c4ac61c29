//! In-memory nomenclature source serving prebuilt datasets.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::errors::{HlaError, HlaResult};
use crate::source::records::Dataset;
use crate::source::NomenclatureSource;

#[derive(Debug, Default)]
pub struct InMemorySource {
    datasets: RwLock<HashMap<String, Dataset>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dataset under its own version, replacing any previous one.
    pub fn insert(&self, dataset: Dataset) {
        let dataset = dataset.with_computed_checksum();
        self.datasets.write().insert(dataset.version.clone(), dataset);
    }

    pub fn with_dataset(self, dataset: Dataset) -> Self {
        self.insert(dataset);
        self
    }
}

impl NomenclatureSource for InMemorySource {
    fn get_dataset(&self, version: &str) -> HlaResult<Dataset> {
        self.datasets
            .read()
            .get(version)
            .cloned()
            .ok_or_else(|| HlaError::data_unavailable(version, "version not registered"))
    }

    fn available_versions(&self) -> HlaResult<Vec<String>> {
        let mut versions: Vec<String> = self.datasets.read().keys().cloned().collect();
        versions.sort();
        Ok(versions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_source_round_trip() {
        let source = InMemorySource::new().with_dataset(Dataset::new("3330"));
        let dataset = source.get_dataset("3330").unwrap();
        assert_eq!(dataset.version, "3330");
        assert!(!dataset.checksum.is_empty());
        assert_eq!(source.available_versions().unwrap(), vec!["3330"]);
    }

    #[test]
    fn test_unknown_version_is_data_unavailable() {
        let source = InMemorySource::new();
        assert!(matches!(
            source.get_dataset("9999"),
            Err(HlaError::DataUnavailable { .. })
        ));
    }
}
