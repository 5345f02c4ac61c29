//! The read-only HLA metadata index for one nomenclature version.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::DictionaryConfig;
use crate::errors::{HlaError, HlaResult};
use crate::matching::{
    build_matching_entries, canonical_typings, serology_assignments, GroupKind, GroupMemberships,
    SerologyRelations,
};
use crate::models::{
    AlleleStatus, Dpb1TceGroupAssignment, HlaTyping, HlaTypingCategory, Locus,
    MatchingDictionaryEntry, PerLocus, TypingMethod,
};
use crate::resolver::{resolve_allele_names, AlleleNameLookup};
use crate::source::records::{Dataset, TypingLocusRecord};
use crate::typing::{classify, normalize_typing, split_allele_string, splitter};

/// Summary of one index build.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub version: String,
    pub checksum: String,
    pub allele_entries: usize,
    pub serology_entries: usize,
    pub lookup_names: usize,
    /// `LOCUS:HLA_ID` of every rename history left unresolved.
    pub unresolved_histories: Vec<String>,
    pub discarded_histories: usize,
    pub confidential_excluded: usize,
    pub skipped_records: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug)]
pub struct HlaMetadataIndex {
    version: String,
    checksum: String,
    allele_entries: PerLocus<HashMap<String, MatchingDictionaryEntry>>,
    serology_entries: PerLocus<HashMap<String, MatchingDictionaryEntry>>,
    names: AlleleNameLookup,
    groups: GroupMemberships,
    xx_codes: PerLocus<HashMap<String, BTreeSet<String>>>,
    serology_alleles: PerLocus<HashMap<String, BTreeSet<String>>>,
    nmdp_codes: HashMap<String, Vec<String>>,
    statuses: PerLocus<HashMap<String, AlleleStatus>>,
    confidential: PerLocus<HashSet<String>>,
    dpb1_tce: HashMap<String, Dpb1TceGroupAssignment>,
    report: BuildReport,
}

fn skipped<R: TypingLocusRecord>(records: &[R]) -> usize {
    records
        .iter()
        .filter(|record| record.matching_locus().is_none())
        .count()
}

/// Records at loci outside the matching set (DRB3*, DP, ...).
fn count_skipped_records(dataset: &Dataset) -> usize {
    skipped(&dataset.alleles)
        + skipped(&dataset.serologies)
        + skipped(&dataset.g_groups)
        + skipped(&dataset.p_groups)
        + skipped(&dataset.rel_dna_ser)
        + skipped(&dataset.rel_ser_ser)
        + skipped(&dataset.allele_histories)
        + skipped(&dataset.confidential_alleles)
        + skipped(&dataset.allele_statuses)
}

impl HlaMetadataIndex {
    /// Build the index for `dataset`. A dataset without a single allele at a
    /// matching locus fails with `BuildFailed`.
    pub fn build(dataset: &Dataset, config: &DictionaryConfig) -> HlaResult<Self> {
        let started = Instant::now();
        let version = dataset.version.clone();
        info!("Building HLA metadata index for version {}", version);

        let skipped_records = count_skipped_records(dataset);
        if skipped_records > 0 {
            warn!(
                "Version {}: skipped {} records at non-matching loci",
                version, skipped_records
            );
        }

        let resolution = resolve_allele_names(dataset);
        let groups = GroupMemberships::from_dataset(dataset);
        let relations = SerologyRelations::from_dataset(dataset);
        let assignments = serology_assignments(dataset);

        let mut confidential: PerLocus<HashSet<String>> = PerLocus::default();
        for record in &dataset.confidential_alleles {
            if let Some((locus, TypingMethod::Molecular)) = record.matching_locus() {
                confidential[locus].insert(record.name.clone());
            }
        }

        let mut typings = canonical_typings(dataset, &resolution, &relations);
        let mut confidential_excluded = 0;
        if !config.include_confidential {
            typings.retain(|typing| match typing {
                HlaTyping::Allele(allele) if confidential[allele.locus].contains(&allele.name) => {
                    confidential_excluded += 1;
                    false
                }
                _ => true,
            });
        }
        if !typings
            .iter()
            .any(|typing| typing.method() == TypingMethod::Molecular)
        {
            return Err(HlaError::BuildFailed {
                version,
                reason: "no alleles at matching loci".to_string(),
            });
        }

        let entries = build_matching_entries(
            &typings,
            &groups,
            &assignments,
            &relations,
            config.build_workers,
        );

        let mut allele_entries: PerLocus<HashMap<String, MatchingDictionaryEntry>> =
            PerLocus::default();
        let mut serology_entries: PerLocus<HashMap<String, MatchingDictionaryEntry>> =
            PerLocus::default();
        let mut xx_codes: PerLocus<HashMap<String, BTreeSet<String>>> = PerLocus::default();
        let mut serology_alleles: PerLocus<HashMap<String, BTreeSet<String>>> = PerLocus::default();

        for entry in entries {
            let locus = entry.locus;
            let name = entry.lookup_name.clone();
            match entry.typing_method {
                TypingMethod::Molecular => {
                    xx_codes[locus]
                        .entry(splitter::first_field(&name).to_string())
                        .or_default()
                        .insert(name.clone());
                    for serology in entry.serology_names() {
                        serology_alleles[locus]
                            .entry(serology.to_string())
                            .or_default()
                            .insert(name.clone());
                    }
                    allele_entries[locus].insert(name, entry);
                }
                TypingMethod::Serology => {
                    serology_entries[locus].insert(name, entry);
                }
            }
        }

        let nmdp_codes: HashMap<String, Vec<String>> = dataset
            .nmdp_codes
            .iter()
            .map(|record| (record.code.clone(), record.subtypes.clone()))
            .collect();

        let mut statuses: PerLocus<HashMap<String, AlleleStatus>> = PerLocus::default();
        for record in &dataset.allele_statuses {
            if let Some((locus, TypingMethod::Molecular)) = record.matching_locus() {
                statuses[locus].insert(record.name.clone(), record.status);
            }
        }

        let dpb1_tce: HashMap<String, Dpb1TceGroupAssignment> = dataset
            .dpb1_tce_groups
            .iter()
            .map(|assignment| (assignment.allele.clone(), assignment.clone()))
            .collect();

        let report = BuildReport {
            version: version.clone(),
            checksum: dataset.checksum.clone(),
            allele_entries: allele_entries.fold(0, |acc, _, e| acc + e.len()),
            serology_entries: serology_entries.fold(0, |acc, _, e| acc + e.len()),
            lookup_names: resolution.lookup.len(),
            unresolved_histories: resolution
                .histories
                .unresolved
                .iter()
                .map(|history| format!("{}:{}", history.locus, history.hla_id))
                .collect(),
            discarded_histories: resolution.histories.discarded.len(),
            confidential_excluded,
            skipped_records,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            "Built HLA metadata index for version {}: {} allele entries, {} serology entries, {} unresolved histories in {}ms",
            report.version,
            report.allele_entries,
            report.serology_entries,
            report.unresolved_histories.len(),
            report.elapsed_ms
        );

        Ok(Self {
            version,
            checksum: dataset.checksum.clone(),
            allele_entries,
            serology_entries,
            names: resolution.lookup,
            groups,
            xx_codes,
            serology_alleles,
            nmdp_codes,
            statuses,
            confidential,
            dpb1_tce,
            report,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    /// Every precomputed entry at `locus`, alleles first.
    pub fn entries(&self, locus: Locus) -> impl Iterator<Item = &MatchingDictionaryEntry> {
        self.allele_entries[locus]
            .values()
            .chain(self.serology_entries[locus].values())
    }

    pub fn entry_count(&self) -> usize {
        self.report.allele_entries + self.report.serology_entries
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Matching info for any classifiable typing. Ambiguous typings merge the
    /// entries of the alleles they stand for; the result keeps the requested
    /// name. A typing unknown to this version yields `Ok(None)`.
    pub fn lookup(
        &self,
        locus: Locus,
        raw_typing: &str,
    ) -> HlaResult<Option<MatchingDictionaryEntry>> {
        let category = classify(raw_typing)?;
        let name = normalize_typing(raw_typing);
        match category {
            HlaTypingCategory::Serology => Ok(self.serology_entries[locus].get(name).cloned()),
            HlaTypingCategory::New => Ok(None),
            _ => {
                let alleles = self.canonical_alleles(locus, category, raw_typing)?;
                let entries: Vec<&MatchingDictionaryEntry> = alleles
                    .iter()
                    .filter_map(|allele| self.allele_entries[locus].get(allele))
                    .collect();
                Ok(match entries.as_slice() {
                    [] => None,
                    [single] => {
                        let mut entry = (*single).clone();
                        entry.lookup_name = name.to_string();
                        Some(entry)
                    }
                    _ => Some(MatchingDictionaryEntry::merged(
                        locus,
                        name,
                        TypingMethod::Molecular,
                        entries.iter().copied(),
                    )),
                })
            }
        }
    }

    /// Allele names a typing stands for. Allele strings and NMDP codes give
    /// their constituent names as written; every other category gives
    /// canonical alleles of this version, sorted.
    pub fn expand_ambiguous_typing(&self, locus: Locus, raw_typing: &str) -> HlaResult<Vec<String>> {
        let category = classify(raw_typing)?;
        let name = normalize_typing(raw_typing);
        let names = match category {
            HlaTypingCategory::AlleleStringOfNames | HlaTypingCategory::AlleleStringOfSubtypes => {
                split_allele_string(raw_typing)?
            }
            HlaTypingCategory::NmdpCode => self.nmdp_subtypes(name)?,
            HlaTypingCategory::Allele => self.current_names(locus, name).into_iter().collect(),
            HlaTypingCategory::XxCode => self.xx_codes[locus]
                .get(splitter::first_field(name))
                .map(|alleles| alleles.iter().cloned().collect())
                .unwrap_or_default(),
            HlaTypingCategory::GGroup => self.group_members(GroupKind::G, locus, name),
            HlaTypingCategory::PGroup => self.group_members(GroupKind::P, locus, name),
            HlaTypingCategory::SmallGGroup => self.group_members(GroupKind::SmallG, locus, name),
            HlaTypingCategory::Serology => self.serology_alleles[locus]
                .get(name)
                .map(|alleles| alleles.iter().cloned().collect())
                .unwrap_or_default(),
            HlaTypingCategory::New => Vec::new(),
        };
        Ok(names)
    }

    fn nmdp_subtypes(&self, name: &str) -> HlaResult<Vec<String>> {
        let first_field = splitter::first_field(name);
        let code = splitter::second_field(name);
        let subtypes = self
            .nmdp_codes
            .get(code)
            .ok_or_else(|| HlaError::UnknownNmdpCode {
                code: code.to_string(),
            })?;
        Ok(subtypes
            .iter()
            .map(|subtype| {
                if subtype.contains(splitter::FIELD_DELIMITER) {
                    subtype.clone()
                } else {
                    format!("{first_field}:{subtype}")
                }
            })
            .collect())
    }

    fn group_members(&self, kind: GroupKind, locus: Locus, group: &str) -> Vec<String> {
        self.groups
            .table(kind)
            .members(locus, group)
            .map(|members| {
                members
                    .iter()
                    .filter(|allele| self.allele_entries[locus].contains_key(*allele))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Canonical names an allele name resolves to, limited to alleles with
    /// an entry in this index.
    fn current_names(&self, locus: Locus, name: &str) -> BTreeSet<String> {
        self.names
            .current_names(locus, name)
            .map(|names| {
                names
                    .iter()
                    .filter(|current| self.allele_entries[locus].contains_key(*current))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn canonical_alleles(
        &self,
        locus: Locus,
        category: HlaTypingCategory,
        raw_typing: &str,
    ) -> HlaResult<BTreeSet<String>> {
        let expanded = self.expand_ambiguous_typing(locus, raw_typing)?;
        match category {
            HlaTypingCategory::AlleleStringOfNames
            | HlaTypingCategory::AlleleStringOfSubtypes
            | HlaTypingCategory::NmdpCode => Ok(expanded
                .iter()
                .flat_map(|constituent| self.current_names(locus, constituent))
                .collect()),
            _ => Ok(expanded.into_iter().collect()),
        }
    }

    // -----------------------------------------------------------------------
    // Group conversion
    // -----------------------------------------------------------------------

    fn convert_to_groups(
        &self,
        kind: GroupKind,
        locus: Locus,
        raw_typing: &str,
    ) -> HlaResult<BTreeSet<String>> {
        let category = classify(raw_typing)?;
        let table = self.groups.table(kind);
        Ok(self
            .canonical_alleles(locus, category, raw_typing)?
            .iter()
            .filter_map(|allele| table.group_of(locus, allele))
            .map(str::to_string)
            .collect())
    }

    fn single_group(groups: BTreeSet<String>) -> Option<String> {
        if groups.len() == 1 {
            groups.into_iter().next()
        } else {
            None
        }
    }

    pub fn convert_to_p_groups(&self, locus: Locus, raw_typing: &str) -> HlaResult<BTreeSet<String>> {
        self.convert_to_groups(GroupKind::P, locus, raw_typing)
    }

    pub fn convert_to_g_groups(&self, locus: Locus, raw_typing: &str) -> HlaResult<BTreeSet<String>> {
        self.convert_to_groups(GroupKind::G, locus, raw_typing)
    }

    /// The P group of a typing, when all its alleles share exactly one.
    pub fn convert_to_p_group(&self, locus: Locus, raw_typing: &str) -> HlaResult<Option<String>> {
        Ok(Self::single_group(self.convert_to_p_groups(locus, raw_typing)?))
    }

    pub fn convert_to_g_group(&self, locus: Locus, raw_typing: &str) -> HlaResult<Option<String>> {
        Ok(Self::single_group(self.convert_to_g_groups(locus, raw_typing)?))
    }

    pub fn convert_to_small_g_group(
        &self,
        locus: Locus,
        raw_typing: &str,
    ) -> HlaResult<Option<String>> {
        Ok(Self::single_group(self.convert_to_groups(
            GroupKind::SmallG,
            locus,
            raw_typing,
        )?))
    }

    // -----------------------------------------------------------------------
    // Allele metadata
    // -----------------------------------------------------------------------

    /// Sequence status of a named allele. Known alleles without a status
    /// record are full cDNA; unknown names yield `None`.
    pub fn allele_status(&self, locus: Locus, name: &str) -> Option<AlleleStatus> {
        let name = normalize_typing(name);
        if let Some(status) = self.statuses[locus].get(name) {
            return Some(*status);
        }
        self.names
            .current_names(locus, name)
            .filter(|currents| currents.contains(name))
            .map(|_| AlleleStatus::default())
    }

    pub fn is_confidential(&self, locus: Locus, name: &str) -> bool {
        self.confidential[locus].contains(normalize_typing(name))
    }

    /// TCE group assignment of a DPB1 allele, with or without its `DPB1*` prefix.
    pub fn dpb1_tce_group(&self, allele: &str) -> Option<&Dpb1TceGroupAssignment> {
        let allele = allele.trim();
        let allele = allele.strip_prefix("DPB1*").unwrap_or(allele);
        self.dpb1_tce.get(normalize_typing(allele))
    }
}
