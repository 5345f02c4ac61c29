//! Allele name resolution: rename-history consolidation, canonical names,
//! reserved names and truncated lookup variants.

pub mod consolidator;
pub mod history;
pub mod names;

pub use consolidator::{consolidate_histories, ConsolidatedHistories, ResolvedHistory};
pub use history::{AlleleNameHistory, CurrentAlleleTable};
pub use names::AlleleNameLookup;

use crate::source::records::Dataset;

/// Everything the resolver derives from one dataset.
#[derive(Clone, Debug)]
pub struct AlleleNameResolution {
    pub table: CurrentAlleleTable,
    pub histories: ConsolidatedHistories,
    pub lookup: AlleleNameLookup,
}

pub fn resolve_allele_names(dataset: &Dataset) -> AlleleNameResolution {
    let table = CurrentAlleleTable::from_records(&dataset.alleles);
    let histories = consolidate_histories(history::histories_for_dataset(dataset), &table);
    let lookup = AlleleNameLookup::build(&histories, &table);
    AlleleNameResolution {
        table,
        histories,
        lookup,
    }
}
