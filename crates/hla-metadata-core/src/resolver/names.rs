//! Allele name lookup: any historical, current, reserved or truncated name
//! mapped to the canonical current names it stands for.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::models::{Locus, PerLocus};
use crate::resolver::consolidator::ConsolidatedHistories;
use crate::resolver::history::CurrentAlleleTable;
use crate::typing::splitter;

/// Canonical current names per (locus, lookup name).
#[derive(Clone, Debug, Default)]
pub struct AlleleNameLookup {
    names: PerLocus<HashMap<String, BTreeSet<String>>>,
    reserved: PerLocus<BTreeSet<String>>,
}

/// Field-truncated forms of `name` used to look up lower-resolution typings:
/// the first field, the first two fields with and without the expression
/// suffix, and for longer names the first three fields and the name minus its
/// last field. Single-field names produce none.
///
/// A bare first field classifies as a serology, so `HlaMetadataIndex` lookups
/// never ask for the first-field variant; it is there for direct callers of
/// [`AlleleNameLookup::current_names`].
pub fn name_variants(name: &str) -> Vec<String> {
    let fields = splitter::number_of_fields(name);
    if fields < 2 {
        return Vec::new();
    }
    let mut variants = vec![
        splitter::first_field(name).to_string(),
        splitter::first_two_fields_with_expression_suffix_as_string(name),
        splitter::first_two_fields_as_string_with_suffix_removed(name),
    ];
    if fields > 3 {
        variants.push(splitter::first_three_fields_as_string(name));
    }
    if fields > 2 {
        variants.push(splitter::remove_last_field(name));
    }
    let mut seen = HashSet::new();
    variants.retain(|v| !v.is_empty() && v != name && seen.insert(v.clone()));
    variants
}

impl AlleleNameLookup {
    pub fn build(consolidated: &ConsolidatedHistories, table: &CurrentAlleleTable) -> Self {
        let mut lookup = Self::default();

        // Names that are real allele names somewhere; truncations never shadow them.
        let mut known: PerLocus<HashSet<String>> = PerLocus::default();
        for history in consolidated.all_histories() {
            known[history.locus].extend(history.distinct_names.iter().cloned());
        }
        for locus in Locus::ALL {
            known[locus].extend(table.alleles(locus).map(|a| a.name.clone()));
        }

        for resolved in &consolidated.resolved {
            let locus = resolved.history.locus;
            for name in &resolved.history.distinct_names {
                lookup.add(locus, name, &resolved.current_name);
            }
            lookup.add(locus, &resolved.current_name, &resolved.current_name);
        }

        for locus in Locus::ALL {
            for allele in table.alleles(locus) {
                if !allele.is_deleted {
                    lookup.add(locus, &allele.name, &allele.name);
                }
            }
        }

        // Deleted records that no history knows about.
        let mut in_history: PerLocus<HashSet<&str>> = PerLocus::default();
        for history in consolidated.all_histories() {
            in_history[history.locus].extend(history.distinct_names.iter().map(String::as_str));
        }
        for locus in Locus::ALL {
            for allele in table.alleles(locus) {
                if !allele.is_deleted || in_history[locus].contains(allele.name.as_str()) {
                    continue;
                }
                match &allele.identical_to {
                    Some(_) => {
                        if let Some(current) = table.resolve_identical(locus, &allele.name) {
                            lookup.add(locus, &allele.name, &current);
                        }
                    }
                    None => {
                        lookup.add(locus, &allele.name, &allele.name);
                        lookup.reserved[locus].insert(allele.name.clone());
                    }
                }
            }
        }

        let mut variants: PerLocus<HashMap<String, BTreeSet<String>>> = PerLocus::default();
        for locus in Locus::ALL {
            for (name, currents) in &lookup.names[locus] {
                if lookup.reserved[locus].contains(name) {
                    continue;
                }
                for variant in name_variants(name) {
                    if known[locus].contains(&variant) {
                        continue;
                    }
                    variants[locus]
                        .entry(variant)
                        .or_default()
                        .extend(currents.iter().cloned());
                }
            }
        }
        for (locus, by_variant) in variants.iter() {
            for (variant, currents) in by_variant {
                lookup.names[locus]
                    .entry(variant.clone())
                    .or_default()
                    .extend(currents.iter().cloned());
            }
        }

        debug!(
            "Allele name lookup built: {} names, {} reserved",
            lookup.len(),
            lookup.reserved.fold(0, |acc, _, r| acc + r.len())
        );
        lookup
    }

    fn add(&mut self, locus: Locus, name: &str, current: &str) {
        if name.is_empty() || current.is_empty() {
            return;
        }
        self.names[locus]
            .entry(name.to_string())
            .or_default()
            .insert(current.to_string());
    }

    pub fn current_names(&self, locus: Locus, name: &str) -> Option<&BTreeSet<String>> {
        self.names[locus].get(name)
    }

    pub fn is_reserved(&self, locus: Locus, name: &str) -> bool {
        self.reserved[locus].contains(name)
    }

    pub fn names(&self, locus: Locus) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.names[locus].iter()
    }

    pub fn len(&self) -> usize {
        self.names.fold(0, |acc, _, names| acc + names.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
