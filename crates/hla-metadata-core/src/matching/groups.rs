//! G-group, P-group and small g group membership for one version.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::warn;

use crate::models::{Locus, PerLocus, TypingMethod};
use crate::source::records::{Dataset, GroupRecord, TypingLocusRecord};
use crate::typing::splitter;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupKind {
    G,
    P,
    SmallG,
}

/// Allele-to-group and group-to-allele tables for a single group kind.
#[derive(Clone, Debug, Default)]
pub struct GroupTable {
    group_of: PerLocus<HashMap<String, String>>,
    members: PerLocus<BTreeMap<String, BTreeSet<String>>>,
}

impl GroupTable {
    fn from_records<'a>(records: impl IntoIterator<Item = &'a GroupRecord>, label: &str) -> Self {
        let mut table = Self::default();
        for record in records {
            let Some((locus, TypingMethod::Molecular)) = record.matching_locus() else {
                continue;
            };
            if record.name.is_empty() {
                continue;
            }
            for allele in &record.alleles {
                table.assign(locus, allele, &record.name, label);
            }
        }
        table
    }

    /// An allele belongs to at most one group; a second assignment is ignored.
    fn assign(&mut self, locus: Locus, allele: &str, group: &str, label: &str) {
        if let Some(existing) = self.group_of[locus].get(allele) {
            if existing != group {
                warn!(
                    "Allele {}*{} listed in {} groups {} and {}; keeping {}",
                    locus, allele, label, existing, group, existing
                );
            }
            return;
        }
        self.group_of[locus].insert(allele.to_string(), group.to_string());
        self.members[locus]
            .entry(group.to_string())
            .or_default()
            .insert(allele.to_string());
    }

    pub fn group_of(&self, locus: Locus, allele: &str) -> Option<&str> {
        self.group_of[locus].get(allele).map(String::as_str)
    }

    pub fn members(&self, locus: Locus, group: &str) -> Option<&BTreeSet<String>> {
        self.members[locus].get(group)
    }

    pub fn group_count(&self) -> usize {
        self.members.fold(0, |acc, _, groups| acc + groups.len())
    }
}

#[derive(Clone, Debug, Default)]
pub struct GroupMemberships {
    pub g_groups: GroupTable,
    pub p_groups: GroupTable,
    pub small_g_groups: GroupTable,
}

/// Small g group name for a P group: `01:01P` becomes `01:01g`.
pub fn small_g_name(p_group: &str) -> String {
    format!("{}g", p_group.strip_suffix('P').unwrap_or(p_group))
}

impl GroupMemberships {
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let g_groups = GroupTable::from_records(&dataset.g_groups, "G");
        let p_groups = GroupTable::from_records(&dataset.p_groups, "P");
        let small_g_groups = derive_small_g_groups(&g_groups, &p_groups);
        Self {
            g_groups,
            p_groups,
            small_g_groups,
        }
    }

    pub fn table(&self, kind: GroupKind) -> &GroupTable {
        match kind {
            GroupKind::G => &self.g_groups,
            GroupKind::P => &self.p_groups,
            GroupKind::SmallG => &self.small_g_groups,
        }
    }
}

/// Every P group yields a small g group with the same members. Null alleles
/// join the small g group of their G group when the G group's expressing
/// alleles all sit in a single P group.
fn derive_small_g_groups(g_groups: &GroupTable, p_groups: &GroupTable) -> GroupTable {
    let mut small_g = GroupTable::default();
    for (locus, groups) in p_groups.members.iter() {
        for (p_group, members) in groups {
            let name = small_g_name(p_group);
            for allele in members {
                small_g.assign(locus, allele, &name, "small g");
            }
        }
    }
    for (locus, groups) in g_groups.members.iter() {
        for members in groups.values() {
            let expressing_p_groups: BTreeSet<&str> = members
                .iter()
                .filter_map(|allele| p_groups.group_of(locus, allele))
                .collect();
            if expressing_p_groups.len() != 1 {
                continue;
            }
            let Some(p_group) = expressing_p_groups.first().copied() else {
                continue;
            };
            let name = small_g_name(p_group);
            for allele in members {
                if splitter::expression_suffix(allele) == Some('N')
                    && p_groups.group_of(locus, allele).is_none()
                {
                    small_g.assign(locus, allele, &name, "small g");
                }
            }
        }
    }
    small_g
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(locus: &str, name: &str, alleles: &[&str]) -> GroupRecord {
        GroupRecord {
            typing_locus: locus.to_string(),
            name: name.to_string(),
            alleles: alleles.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn dataset() -> Dataset {
        let mut dataset = Dataset::new("3330");
        dataset.g_groups = vec![
            group("A*", "01:01:01G", &["01:01:01:01", "01:01:01:02N", "01:01:38L"]),
            group("A*", "", &["01:02"]),
            group("DRB3*", "01:01:02G", &["01:01:02:01"]),
        ];
        dataset.p_groups = vec![group("A*", "01:01P", &["01:01:01:01", "01:01:38L"])];
        dataset
    }

    #[test]
    fn test_group_membership_lookup() {
        let groups = GroupMemberships::from_dataset(&dataset());
        assert_eq!(groups.g_groups.group_of(Locus::A, "01:01:01:02N"), Some("01:01:01G"));
        assert_eq!(groups.g_groups.group_of(Locus::A, "01:02"), None);
        assert_eq!(groups.p_groups.group_of(Locus::A, "01:01:01:02N"), None);
        assert_eq!(groups.g_groups.members(Locus::A, "01:01:01G").unwrap().len(), 3);
        assert_eq!(groups.g_groups.group_count(), 1);
    }

    #[test]
    fn test_small_g_groups_absorb_null_alleles() {
        let groups = GroupMemberships::from_dataset(&dataset());
        let small_g = groups.table(GroupKind::SmallG);
        assert_eq!(small_g.group_of(Locus::A, "01:01:01:02N"), Some("01:01g"));
        assert_eq!(small_g.members(Locus::A, "01:01g").unwrap().len(), 3);
    }

    #[test]
    fn test_duplicate_assignment_keeps_first_group() {
        let mut dataset = Dataset::new("3330");
        dataset.p_groups = vec![
            group("B*", "07:02P", &["07:02:01"]),
            group("B*", "07:03P", &["07:02:01"]),
        ];
        let groups = GroupMemberships::from_dataset(&dataset);
        assert_eq!(groups.p_groups.group_of(Locus::B, "07:02:01"), Some("07:02P"));
        assert!(groups.p_groups.members(Locus::B, "07:03P").is_none());
    }

    #[test]
    fn test_small_g_name() {
        assert_eq!(small_g_name("01:01P"), "01:01g");
    }
}
