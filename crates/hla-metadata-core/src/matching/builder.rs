//! Matching-info construction: one `MatchingDictionaryEntry` per canonical
//! allele and serology in a version.
//!
//! Building is pure given the dataset, the resolved allele names and the
//! group tables; no I/O happens here.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rayon::prelude::*;

use crate::matching::groups::GroupMemberships;
use crate::models::{
    AlleleTyping, HlaTyping, Locus, MatchingDictionaryEntry, MatchingSerology, PerLocus,
    SerologyAssignment, SerologySubtype, SerologyTyping, TypingMethod,
};
use crate::resolver::AlleleNameResolution;
use crate::source::records::{Dataset, TypingLocusRecord};

// ---------------------------------------------------------------------------
// Serology relationships
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SerologyRelation {
    pub splits: Vec<String>,
    pub associated: Vec<String>,
}

/// Serology-to-serology relations at one version, in both directions.
#[derive(Clone, Debug, Default)]
pub struct SerologyRelations {
    children: PerLocus<HashMap<String, SerologyRelation>>,
    broad_of_split: PerLocus<HashMap<String, String>>,
    parent_of_associated: PerLocus<HashMap<String, String>>,
}

impl SerologyRelations {
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let mut relations = Self::default();
        for record in &dataset.rel_ser_ser {
            let Some((locus, TypingMethod::Serology)) = record.matching_locus() else {
                continue;
            };
            for split in &record.splits {
                relations.broad_of_split[locus].insert(split.clone(), record.serology.clone());
            }
            for associated in &record.associated {
                relations.parent_of_associated[locus]
                    .insert(associated.clone(), record.serology.clone());
            }
            let relation = relations.children[locus]
                .entry(record.serology.clone())
                .or_default();
            relation.splits.extend(record.splits.iter().cloned());
            relation.associated.extend(record.associated.iter().cloned());
        }
        relations
    }

    pub fn subtype(&self, locus: Locus, serology: &str) -> SerologySubtype {
        if self.children[locus]
            .get(serology)
            .is_some_and(|r| !r.splits.is_empty())
        {
            SerologySubtype::Broad
        } else if self.broad_of_split[locus].contains_key(serology) {
            SerologySubtype::Split
        } else if self.parent_of_associated[locus].contains_key(serology) {
            SerologySubtype::Associated
        } else {
            SerologySubtype::NotSplit
        }
    }

    /// Itself and its splits as direct matches, its associated serologies
    /// and its own broad or parent as indirect ones. One level only.
    pub fn matching_serologies(&self, locus: Locus, serology: &str) -> Vec<MatchingSerology> {
        let mut matches: Vec<MatchingSerology> = Vec::new();
        let mut push = |name: &str, is_direct_mapping: bool| {
            if !matches.iter().any(|m| m.name == name) {
                matches.push(MatchingSerology {
                    name: name.to_string(),
                    is_direct_mapping,
                    tier: None,
                });
            }
        };
        push(serology, true);
        if let Some(relation) = self.children[locus].get(serology) {
            for split in &relation.splits {
                push(split, true);
            }
            for associated in &relation.associated {
                push(associated, false);
            }
        }
        if let Some(broad) = self.broad_of_split[locus].get(serology) {
            push(broad, false);
        }
        if let Some(parent) = self.parent_of_associated[locus].get(serology) {
            push(parent, false);
        }
        matches
    }

    /// Every serology the relations mention.
    fn names(&self) -> impl Iterator<Item = (Locus, &String)> {
        self.children.iter().flat_map(|(locus, children)| {
            children.iter().flat_map(move |(broad, relation)| {
                std::iter::once(broad)
                    .chain(relation.splits.iter())
                    .chain(relation.associated.iter())
                    .map(move |name| (locus, name))
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Entry construction
// ---------------------------------------------------------------------------

/// Allele-to-serology assignments keyed by (locus, allele name).
pub type SerologyAssignments = PerLocus<HashMap<String, Vec<SerologyAssignment>>>;

pub fn serology_assignments(dataset: &Dataset) -> SerologyAssignments {
    let mut assignments: SerologyAssignments = PerLocus::default();
    for record in &dataset.rel_dna_ser {
        let Some((locus, TypingMethod::Molecular)) = record.matching_locus() else {
            continue;
        };
        assignments[locus]
            .entry(record.allele.clone())
            .or_default()
            .extend(record.assignments.iter().cloned());
    }
    assignments
}

pub fn build_serology_entry(
    relations: &SerologyRelations,
    locus: Locus,
    serology: &str,
) -> MatchingDictionaryEntry {
    let mut entry = MatchingDictionaryEntry::new(locus, serology, TypingMethod::Serology);
    entry.matching_serologies = relations.matching_serologies(locus, serology);
    entry
}

/// Group membership plus assigned serologies. A serology assigned at more
/// than one tier keeps its strongest tier.
pub fn build_allele_entry(
    groups: &GroupMemberships,
    assignments: &SerologyAssignments,
    locus: Locus,
    allele: &str,
) -> MatchingDictionaryEntry {
    let mut entry = MatchingDictionaryEntry::new(locus, allele, TypingMethod::Molecular);
    entry
        .matching_p_groups
        .extend(groups.p_groups.group_of(locus, allele).map(str::to_string));
    entry
        .matching_g_groups
        .extend(groups.g_groups.group_of(locus, allele).map(str::to_string));

    if let Some(assigned) = assignments[locus].get(allele) {
        let mut strongest: BTreeMap<&str, &SerologyAssignment> = BTreeMap::new();
        for assignment in assigned {
            strongest
                .entry(assignment.serology.as_str())
                .and_modify(|existing| {
                    if assignment.tier < existing.tier {
                        *existing = assignment;
                    }
                })
                .or_insert(assignment);
        }
        let mut serologies: Vec<&SerologyAssignment> = strongest.into_values().collect();
        serologies.sort_by(|a, b| a.tier.cmp(&b.tier).then_with(|| a.serology.cmp(&b.serology)));
        entry.matching_serologies = serologies
            .into_iter()
            .map(|assignment| MatchingSerology {
                name: assignment.serology.clone(),
                is_direct_mapping: assignment.tier.is_direct(),
                tier: Some(assignment.tier),
            })
            .collect();
    }
    entry
}

/// Canonical typings of a version: live and reserved alleles plus every
/// serology named in the nomenclature or its relationships.
pub fn canonical_typings(
    dataset: &Dataset,
    resolution: &AlleleNameResolution,
    relations: &SerologyRelations,
) -> Vec<HlaTyping> {
    let mut typings = Vec::new();
    for locus in Locus::ALL {
        let mut alleles: Vec<_> = resolution
            .table
            .alleles(locus)
            .filter(|a| !a.is_deleted || resolution.lookup.is_reserved(locus, &a.name))
            .collect();
        alleles.sort_by(|a, b| a.name.cmp(&b.name));
        for allele in alleles {
            let mut typing = AlleleTyping::new(locus, &allele.name);
            typing.is_deleted = allele.is_deleted;
            typing.identical_to = allele.identical_to.clone();
            typings.push(HlaTyping::Allele(typing));
        }
    }

    let mut serologies: BTreeSet<(Locus, String)> = BTreeSet::new();
    for record in &dataset.serologies {
        if let Some((locus, TypingMethod::Serology)) = record.matching_locus() {
            if !record.is_deleted {
                serologies.insert((locus, record.name.clone()));
            }
        }
    }
    for (locus, name) in relations.names() {
        serologies.insert((locus, name.clone()));
    }
    for (locus, name) in serologies {
        typings.push(HlaTyping::Serology(SerologyTyping {
            subtype: relations.subtype(locus, &name),
            locus,
            name,
        }));
    }
    typings
}

/// Build one entry per typing on a rayon pool of `workers` threads, falling
/// back to sequential work if the pool cannot be created.
pub fn build_matching_entries(
    typings: &[HlaTyping],
    groups: &GroupMemberships,
    assignments: &SerologyAssignments,
    relations: &SerologyRelations,
    workers: usize,
) -> Vec<MatchingDictionaryEntry> {
    let build = |typing: &HlaTyping| match typing {
        HlaTyping::Allele(allele) => {
            build_allele_entry(groups, assignments, allele.locus, &allele.name)
        }
        HlaTyping::Serology(serology) => {
            build_serology_entry(relations, serology.locus, &serology.name)
        }
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build();

    match pool {
        Ok(pool) => pool.install(|| typings.par_iter().map(build).collect()),
        Err(_) => typings.iter().map(build).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssignmentTier;
    use crate::source::records::{GroupRecord, HlaNomRecord, RelDnaSerRecord, RelSerSerRecord};

    fn relations() -> SerologyRelations {
        let mut dataset = Dataset::new("3330");
        dataset.rel_ser_ser = vec![RelSerSerRecord {
            typing_locus: "B".to_string(),
            serology: "21".to_string(),
            splits: vec!["49".to_string(), "50".to_string()],
            associated: vec!["4005".to_string()],
        }];
        SerologyRelations::from_dataset(&dataset)
    }

    #[test]
    fn test_broad_serology_matches_splits_and_associated() {
        let matches = relations().matching_serologies(Locus::B, "21");
        let summary: Vec<(&str, bool)> = matches
            .iter()
            .map(|m| (m.name.as_str(), m.is_direct_mapping))
            .collect();
        assert_eq!(
            summary,
            vec![("21", true), ("49", true), ("50", true), ("4005", false)]
        );
    }

    #[test]
    fn test_split_matches_its_broad_indirectly() {
        let rel = relations();
        let matches = rel.matching_serologies(Locus::B, "49");
        assert_eq!(matches.len(), 2);
        assert!(matches[0].is_direct_mapping);
        assert_eq!(matches[1].name, "21");
        assert!(!matches[1].is_direct_mapping);
        assert_eq!(rel.matching_serologies(Locus::A, "49").len(), 1);
    }

    #[test]
    fn test_serology_subtypes() {
        let rel = relations();
        assert_eq!(rel.subtype(Locus::B, "21"), SerologySubtype::Broad);
        assert_eq!(rel.subtype(Locus::B, "50"), SerologySubtype::Split);
        assert_eq!(rel.subtype(Locus::B, "4005"), SerologySubtype::Associated);
        assert_eq!(rel.subtype(Locus::B, "7"), SerologySubtype::NotSplit);
    }

    #[test]
    fn test_serology_entry_has_no_groups() {
        let entry = build_serology_entry(&relations(), Locus::B, "21");
        assert_eq!(entry.typing_method, TypingMethod::Serology);
        assert!(entry.matching_p_groups.is_empty());
        assert!(entry.matching_g_groups.is_empty());
    }

    #[test]
    fn test_allele_entry_groups_and_tiers() {
        let mut dataset = Dataset::new("3330");
        dataset.g_groups = vec![GroupRecord {
            typing_locus: "B*".to_string(),
            name: "15:01:01G".to_string(),
            alleles: vec!["15:01:01:01".to_string()],
        }];
        dataset.rel_dna_ser = vec![RelDnaSerRecord {
            typing_locus: "B*".to_string(),
            allele: "15:01:01:01".to_string(),
            assignments: vec![
                SerologyAssignment {
                    serology: "75".to_string(),
                    tier: AssignmentTier::Expert,
                },
                SerologyAssignment {
                    serology: "62".to_string(),
                    tier: AssignmentTier::Possible,
                },
                SerologyAssignment {
                    serology: "62".to_string(),
                    tier: AssignmentTier::Assumed,
                },
            ],
        }];
        let groups = GroupMemberships::from_dataset(&dataset);
        let assignments = serology_assignments(&dataset);
        let entry = build_allele_entry(&groups, &assignments, Locus::B, "15:01:01:01");

        assert!(entry.matching_p_groups.is_empty());
        assert!(entry.matching_g_groups.contains("15:01:01G"));
        assert_eq!(entry.matching_serologies.len(), 2);
        assert_eq!(entry.matching_serologies[0].name, "62");
        assert_eq!(entry.matching_serologies[0].tier, Some(AssignmentTier::Assumed));
        assert!(entry.matching_serologies[0].is_direct_mapping);
        assert!(!entry.matching_serology("75").unwrap().is_direct_mapping);
    }

    #[test]
    fn test_build_matching_entries_covers_every_typing() {
        let mut dataset = Dataset::new("3330");
        dataset.alleles = vec![
            HlaNomRecord {
                typing_locus: "A*".to_string(),
                name: "01:01:01:01".to_string(),
                is_deleted: false,
                identical_hla: None,
            },
            HlaNomRecord {
                typing_locus: "A*".to_string(),
                name: "01:01:01:05".to_string(),
                is_deleted: true,
                identical_hla: Some("01:01:01:01".to_string()),
            },
        ];
        dataset.serologies = vec![HlaNomRecord {
            typing_locus: "A".to_string(),
            name: "1".to_string(),
            is_deleted: false,
            identical_hla: None,
        }];
        let resolution = crate::resolver::resolve_allele_names(&dataset);
        let rel = SerologyRelations::from_dataset(&dataset);
        let typings = canonical_typings(&dataset, &resolution, &rel);
        assert_eq!(typings.len(), 2);

        let entries = build_matching_entries(
            &typings,
            &GroupMemberships::from_dataset(&dataset),
            &serology_assignments(&dataset),
            &rel,
            2,
        );
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].lookup_name, "01:01:01:01");
        assert_eq!(entries[1].typing_method, TypingMethod::Serology);
    }
}
