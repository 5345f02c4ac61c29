//! Consolidation of rename histories into one canonical name per identity.
//!
//! Histories that share an allele name are grouped (transitively). Within a
//! group exactly one history is retained: one that resolves to a canonical
//! name, preferring an explicit current name, then the lowest HLA id. Names
//! from unresolvable members of the group are merged into the winner; other
//! resolvable members are discarded. A group with no resolvable member is
//! reported as unresolved and contributes no lookups.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use crate::errors::HlaError;
use crate::models::Locus;
use crate::resolver::history::{AlleleNameHistory, CurrentAlleleTable};

/// A retained history and the canonical name it resolves to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedHistory {
    pub history: AlleleNameHistory,
    pub current_name: String,
}

#[derive(Clone, Debug, Default)]
pub struct ConsolidatedHistories {
    pub resolved: Vec<ResolvedHistory>,
    pub unresolved: Vec<AlleleNameHistory>,
    /// Resolvable histories dropped because another history won their group.
    pub discarded: Vec<AlleleNameHistory>,
}

impl ConsolidatedHistories {
    pub fn unresolved_errors(&self) -> Vec<HlaError> {
        self.unresolved
            .iter()
            .map(|history| HlaError::AmbiguousHistoryUnresolved {
                locus: history.locus.to_string(),
                hla_id: history.hla_id.clone(),
            })
            .collect()
    }

    /// Every history seen during consolidation, retained or not.
    pub fn all_histories(&self) -> impl Iterator<Item = &AlleleNameHistory> {
        self.resolved
            .iter()
            .map(|r| &r.history)
            .chain(self.unresolved.iter())
            .chain(self.discarded.iter())
    }
}

/// The canonical name of a history: its explicit current name if set,
/// otherwise the end of the `identical_to` chain starting at its most
/// recent name.
pub fn canonical_name(history: &AlleleNameHistory, table: &CurrentAlleleTable) -> Option<String> {
    if let Some(current) = history.current_name.as_ref().filter(|n| !n.is_empty()) {
        return Some(current.clone());
    }
    table.resolve_identical(history.locus, &history.most_recent_name)
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, mut node: usize) -> usize {
        while self.parent[node] != node {
            self.parent[node] = self.parent[self.parent[node]];
            node = self.parent[node];
        }
        node
    }

    fn union(&mut self, a: usize, b: usize) {
        let (root_a, root_b) = (self.find(a), self.find(b));
        if root_a != root_b {
            let (low, high) = if root_a < root_b { (root_a, root_b) } else { (root_b, root_a) };
            self.parent[high] = low;
        }
    }
}

pub fn consolidate_histories(
    histories: Vec<AlleleNameHistory>,
    table: &CurrentAlleleTable,
) -> ConsolidatedHistories {
    let canonical: Vec<Option<String>> = histories
        .iter()
        .map(|history| canonical_name(history, table))
        .collect();

    let mut groups = DisjointSet::new(histories.len());
    {
        let mut first_owner: HashMap<(Locus, &str), usize> = HashMap::new();
        for (index, history) in histories.iter().enumerate() {
            for name in &history.distinct_names {
                match first_owner.get(&(history.locus, name.as_str())) {
                    Some(&owner) => groups.union(owner, index),
                    None => {
                        first_owner.insert((history.locus, name.as_str()), index);
                    }
                }
            }
        }
    }

    let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for index in 0..histories.len() {
        let root = groups.find(index);
        components.entry(root).or_default().push(index);
    }

    let mut slots: Vec<Option<AlleleNameHistory>> = histories.into_iter().map(Some).collect();
    let mut consolidated = ConsolidatedHistories::default();

    for members in components.values() {
        let winner = members
            .iter()
            .copied()
            .filter(|&i| canonical[i].is_some())
            .min_by(|&a, &b| {
                let explicit = |i: usize| slots[i].as_ref().is_some_and(|h| h.current_name.is_some());
                explicit(b)
                    .cmp(&explicit(a))
                    .then_with(|| hla_id_of(&slots, a).cmp(hla_id_of(&slots, b)))
            });

        let Some(winner) = winner else {
            for &i in members {
                if let Some(history) = slots[i].take() {
                    warn!(
                        "{}",
                        HlaError::AmbiguousHistoryUnresolved {
                            locus: history.locus.to_string(),
                            hla_id: history.hla_id.clone(),
                        }
                    );
                    consolidated.unresolved.push(history);
                }
            }
            continue;
        };

        let Some(mut retained) = slots[winner].take() else {
            continue;
        };
        for &i in members.iter().filter(|&&i| i != winner) {
            let Some(loser) = slots[i].take() else {
                continue;
            };
            if canonical[i].is_some() {
                warn!(
                    "Discarding rename history {} at locus {}: shares a name with {}",
                    loser.hla_id, loser.locus, retained.hla_id
                );
                consolidated.discarded.push(loser);
            } else {
                for versioned in loser.versioned_names {
                    if !retained.contains(&versioned.name) {
                        retained.push_versioned_name(versioned);
                    }
                }
            }
        }
        let current_name = canonical[winner].clone().unwrap_or_default();
        consolidated.resolved.push(ResolvedHistory {
            history: retained,
            current_name,
        });
    }

    consolidated
}

fn hla_id_of(slots: &[Option<AlleleNameHistory>], index: usize) -> &str {
    slots[index].as_ref().map(|h| h.hla_id.as_str()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::records::{HlaNomRecord, VersionedAlleleName};

    fn history(locus: Locus, id: &str, names: &[&str], current: Option<&str>) -> AlleleNameHistory {
        let versioned_names: Vec<VersionedAlleleName> = names
            .iter()
            .enumerate()
            .map(|(i, name)| VersionedAlleleName {
                version: format!("{}", 3330 - i * 10),
                name: name.to_string(),
            })
            .collect();
        let mut distinct_names: Vec<String> = Vec::new();
        for n in names {
            if !distinct_names.iter().any(|d| d.as_str() == *n) {
                distinct_names.push(n.to_string());
            }
        }
        AlleleNameHistory {
            locus,
            hla_id: id.to_string(),
            most_recent_name: names[0].to_string(),
            versioned_names,
            distinct_names,
            current_name: current.map(str::to_string),
        }
    }

    fn table(rows: &[(&str, &str, bool, Option<&str>)]) -> CurrentAlleleTable {
        let records: Vec<HlaNomRecord> = rows
            .iter()
            .map(|(locus, name, deleted, identical)| HlaNomRecord {
                typing_locus: locus.to_string(),
                name: name.to_string(),
                is_deleted: *deleted,
                identical_hla: identical.map(str::to_string),
            })
            .collect();
        CurrentAlleleTable::from_records(&records)
    }

    #[test]
    fn test_canonical_name_prefers_explicit_current() {
        let t = table(&[("A*", "01:01", false, None)]);
        let h = history(Locus::A, "HLA1", &["01:01:01"], Some("01:01:01"));
        assert_eq!(canonical_name(&h, &t).as_deref(), Some("01:01:01"));
    }

    #[test]
    fn test_canonical_name_follows_identical_reference() {
        let t = table(&[
            ("DRB1*", "08:01:01", false, None),
            ("DRB1*", "08:01:03", true, Some("08:01:01")),
        ]);
        let h = history(Locus::Drb1, "HLA00666", &["08:01:03"], None);
        assert_eq!(canonical_name(&h, &t).as_deref(), Some("08:01:01"));
    }

    #[test]
    fn test_unshared_histories_are_kept_or_reported() {
        let t = table(&[("A*", "01:01", false, None)]);
        let consolidated = consolidate_histories(
            vec![
                history(Locus::A, "HLA1", &["01:01"], None),
                history(Locus::A, "HLA2", &["01:99"], None),
            ],
            &t,
        );
        assert_eq!(consolidated.resolved.len(), 1);
        assert_eq!(consolidated.resolved[0].current_name, "01:01");
        assert_eq!(consolidated.unresolved.len(), 1);
        assert_eq!(consolidated.unresolved_errors().len(), 1);
    }

    #[test]
    fn test_shared_name_keeps_resolvable_history_and_merges_the_rest() {
        let t = table(&[("A*", "02:01:01", false, None)]);
        let consolidated = consolidate_histories(
            vec![
                history(Locus::A, "HLA9", &["02:01:99", "0201"], None),
                history(Locus::A, "HLA5", &["02:01:01", "0201"], Some("02:01:01")),
            ],
            &t,
        );
        assert_eq!(consolidated.resolved.len(), 1);
        let retained = &consolidated.resolved[0];
        assert_eq!(retained.history.hla_id, "HLA5");
        assert!(retained.history.contains("02:01:99"));
        assert!(consolidated.unresolved.is_empty());
    }

    #[test]
    fn test_no_name_in_two_retained_histories() {
        let t = table(&[
            ("B*", "07:02", false, None),
            ("B*", "07:03", false, None),
        ]);
        let consolidated = consolidate_histories(
            vec![
                history(Locus::B, "HLA2", &["07:03", "0702"], Some("07:03")),
                history(Locus::B, "HLA1", &["07:02", "0702"], Some("07:02")),
                history(Locus::B, "HLA3", &["07:02", "07:02:01"], None),
            ],
            &t,
        );
        let mut seen = std::collections::HashSet::new();
        for resolved in &consolidated.resolved {
            for name in &resolved.history.distinct_names {
                assert!(seen.insert(name.clone()), "{name} retained twice");
            }
        }
        assert_eq!(consolidated.resolved.len(), 1);
        assert_eq!(consolidated.resolved[0].history.hla_id, "HLA1");
        assert_eq!(consolidated.discarded.len(), 2);
    }

    #[test]
    fn test_shared_names_are_scoped_per_locus() {
        let t = table(&[("A*", "01:01", false, None), ("B*", "01:01", false, None)]);
        let consolidated = consolidate_histories(
            vec![
                history(Locus::A, "HLA1", &["01:01"], None),
                history(Locus::B, "HLA2", &["01:01"], None),
            ],
            &t,
        );
        assert_eq!(consolidated.resolved.len(), 2);
    }

    #[test]
    fn test_group_without_resolvable_history_is_unresolved() {
        let t = table(&[]);
        let consolidated = consolidate_histories(
            vec![
                history(Locus::C, "HLA1", &["01:01"], None),
                history(Locus::C, "HLA2", &["01:01", "01:02"], None),
            ],
            &t,
        );
        assert!(consolidated.resolved.is_empty());
        assert_eq!(consolidated.unresolved.len(), 2);
        assert_eq!(consolidated.all_histories().count(), 2);
    }
}
