//! Allele rename histories and the current-version allele table they are
//! resolved against.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::models::{Locus, PerLocus, TypingMethod};
use crate::source::records::{
    AlleleHistoryRecord, Dataset, HlaNomRecord, TypingLocusRecord, VersionedAlleleName,
};

/// One rename lineage for a single allele identity at a matching locus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlleleNameHistory {
    pub locus: Locus,
    pub hla_id: String,
    /// Newest first.
    pub versioned_names: Vec<VersionedAlleleName>,
    /// Every name the identity has carried, in first-seen order.
    pub distinct_names: Vec<String>,
    pub most_recent_name: String,
    /// Explicit name in the current version, when the identity has one.
    pub current_name: Option<String>,
}

impl AlleleNameHistory {
    /// Build from a source record; non-matching and serology loci yield `None`.
    pub fn from_record(record: &AlleleHistoryRecord) -> Option<Self> {
        let (locus, method) = record.matching_locus()?;
        if method != TypingMethod::Molecular {
            return None;
        }
        let most_recent_name = record.versioned_names.first()?.name.clone();
        let mut history = Self {
            locus,
            hla_id: record.hla_id.clone(),
            versioned_names: Vec::new(),
            distinct_names: Vec::new(),
            most_recent_name,
            current_name: record.current_name.clone().filter(|n| !n.is_empty()),
        };
        for versioned in &record.versioned_names {
            history.push_versioned_name(versioned.clone());
        }
        Some(history)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.distinct_names.iter().any(|n| n == name)
    }

    /// Append a versioned name, keeping `distinct_names` in step.
    pub fn push_versioned_name(&mut self, versioned: VersionedAlleleName) {
        if !self.contains(&versioned.name) {
            self.distinct_names.push(versioned.name.clone());
        }
        self.versioned_names.push(versioned);
    }
}

/// Histories at matching loci for a dataset.
pub fn histories_for_dataset(dataset: &Dataset) -> Vec<AlleleNameHistory> {
    let histories: Vec<AlleleNameHistory> = dataset
        .allele_histories
        .iter()
        .filter_map(AlleleNameHistory::from_record)
        .collect();
    debug!(
        "Version {}: {} of {} rename histories are at matching loci",
        dataset.version,
        histories.len(),
        dataset.allele_histories.len()
    );
    histories
}

// ---------------------------------------------------------------------------
// Current allele table
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentAllele {
    pub name: String,
    pub is_deleted: bool,
    pub identical_to: Option<String>,
}

/// The version's allele records, keyed by matching locus and name.
#[derive(Clone, Debug, Default)]
pub struct CurrentAlleleTable {
    alleles: PerLocus<HashMap<String, CurrentAllele>>,
}

impl CurrentAlleleTable {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a HlaNomRecord>) -> Self {
        let mut table = Self::default();
        for record in records {
            let Some((locus, TypingMethod::Molecular)) = record.matching_locus() else {
                continue;
            };
            table.alleles[locus].insert(
                record.name.clone(),
                CurrentAllele {
                    name: record.name.clone(),
                    is_deleted: record.is_deleted,
                    identical_to: record.identical_hla.clone(),
                },
            );
        }
        table
    }

    pub fn get(&self, locus: Locus, name: &str) -> Option<&CurrentAllele> {
        self.alleles[locus].get(name)
    }

    pub fn contains(&self, locus: Locus, name: &str) -> bool {
        self.alleles[locus].contains_key(name)
    }

    pub fn alleles(&self, locus: Locus) -> impl Iterator<Item = &CurrentAllele> {
        self.alleles[locus].values()
    }

    pub fn len(&self) -> usize {
        self.alleles.fold(0, |acc, _, alleles| acc + alleles.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Follow `identical_to` references from `name` until a record with no
    /// further reference is reached. The end of the chain must be a live
    /// (non-deleted) allele; missing records and cycles resolve to `None`.
    pub fn resolve_identical(&self, locus: Locus, name: &str) -> Option<String> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut current = name;
        loop {
            if !visited.insert(current) {
                return None;
            }
            let allele = self.get(locus, current)?;
            match &allele.identical_to {
                Some(next) => current = next.as_str(),
                None if allele.is_deleted => return None,
                None => return Some(allele.name.clone()),
            }
        }
    }
}
