//! Shared typed models used across the source, resolver, matching and
//! dictionary layers.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::HlaError;

// ---------------------------------------------------------------------------
// Locus
// ---------------------------------------------------------------------------

/// A matching locus. Every source spelling (`A*`, `Cw`, `DR`, ...) maps onto
/// exactly one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Locus {
    A,
    B,
    C,
    Dpb1,
    Dqb1,
    Drb1,
}

impl Locus {
    pub const ALL: [Locus; 6] = [
        Locus::A,
        Locus::B,
        Locus::C,
        Locus::Dpb1,
        Locus::Dqb1,
        Locus::Drb1,
    ];

    pub fn index(self) -> usize {
        match self {
            Locus::A => 0,
            Locus::B => 1,
            Locus::C => 2,
            Locus::Dpb1 => 3,
            Locus::Dqb1 => 4,
            Locus::Drb1 => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Locus::A => "A",
            Locus::B => "B",
            Locus::C => "C",
            Locus::Dpb1 => "DPB1",
            Locus::Dqb1 => "DQB1",
            Locus::Drb1 => "DRB1",
        }
    }

    /// Molecular spelling as used in nomenclature files, e.g. `DRB1*`.
    pub fn molecular_name(self) -> String {
        format!("{}*", self.as_str())
    }

    /// Map a raw source locus string onto a matching locus and the typing
    /// method its spelling implies. Loci that are not matching loci (e.g.
    /// `DRB3*`) yield `None`.
    pub fn from_typing_locus(raw: &str) -> Option<(Locus, TypingMethod)> {
        let trimmed = raw.trim();
        if let Some(molecular) = trimmed.strip_suffix('*') {
            let locus = match molecular.to_ascii_uppercase().as_str() {
                "A" => Locus::A,
                "B" => Locus::B,
                "C" => Locus::C,
                "DPB1" => Locus::Dpb1,
                "DQB1" => Locus::Dqb1,
                "DRB1" => Locus::Drb1,
                _ => return None,
            };
            return Some((locus, TypingMethod::Molecular));
        }
        let locus = match trimmed.to_ascii_uppercase().as_str() {
            "A" => Locus::A,
            "B" => Locus::B,
            "C" | "CW" => Locus::C,
            "DQ" => Locus::Dqb1,
            "DR" => Locus::Drb1,
            _ => return None,
        };
        Some((locus, TypingMethod::Serology))
    }
}

impl fmt::Display for Locus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Locus {
    type Err = HlaError;

    /// Accepts any molecular or serology spelling: `A`, `A*`, `DRB1*`, `DR`, `Cw`, `DPB1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let unknown = || HlaError::UnknownLocus {
            locus: s.to_string(),
        };
        if trimmed.ends_with('*') {
            return Locus::from_typing_locus(trimmed)
                .map(|(locus, _)| locus)
                .ok_or_else(unknown);
        }
        match trimmed.to_ascii_uppercase().as_str() {
            "DPB1" => Ok(Locus::Dpb1),
            "DQB1" => Ok(Locus::Dqb1),
            "DRB1" => Ok(Locus::Drb1),
            _ => Locus::from_typing_locus(trimmed)
                .map(|(locus, _)| locus)
                .ok_or_else(unknown),
        }
    }
}

/// A fixed-size container holding one value per matching locus.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PerLocus<T> {
    values: [T; 6],
}

impl<T> PerLocus<T> {
    pub fn from_fn(mut f: impl FnMut(Locus) -> T) -> Self {
        Self {
            values: Locus::ALL.map(&mut f),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Locus, &T)> {
        Locus::ALL.into_iter().zip(self.values.iter())
    }

    pub fn map<U>(self, mut f: impl FnMut(Locus, T) -> U) -> PerLocus<U> {
        let mut loci = Locus::ALL.into_iter();
        PerLocus {
            values: self.values.map(|value| {
                let locus = loci.next().unwrap_or(Locus::A);
                f(locus, value)
            }),
        }
    }

    pub fn fold<A>(&self, init: A, mut f: impl FnMut(A, Locus, &T) -> A) -> A {
        self.iter().fold(init, |acc, (locus, value)| f(acc, locus, value))
    }
}

impl<T> Index<Locus> for PerLocus<T> {
    type Output = T;

    fn index(&self, locus: Locus) -> &T {
        &self.values[locus.index()]
    }
}

impl<T> IndexMut<Locus> for PerLocus<T> {
    fn index_mut(&mut self, locus: Locus) -> &mut T {
        &mut self.values[locus.index()]
    }
}

// ---------------------------------------------------------------------------
// Typings
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TypingMethod {
    Molecular,
    Serology,
}

/// Classification result for a raw typing string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HlaTypingCategory {
    Allele,
    XxCode,
    NmdpCode,
    GGroup,
    PGroup,
    SmallGGroup,
    Serology,
    AlleleStringOfNames,
    AlleleStringOfSubtypes,
    New,
}

impl HlaTypingCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            HlaTypingCategory::Allele => "Allele",
            HlaTypingCategory::XxCode => "XxCode",
            HlaTypingCategory::NmdpCode => "NmdpCode",
            HlaTypingCategory::GGroup => "GGroup",
            HlaTypingCategory::PGroup => "PGroup",
            HlaTypingCategory::SmallGGroup => "SmallGGroup",
            HlaTypingCategory::Serology => "Serology",
            HlaTypingCategory::AlleleStringOfNames => "AlleleStringOfNames",
            HlaTypingCategory::AlleleStringOfSubtypes => "AlleleStringOfSubtypes",
            HlaTypingCategory::New => "NEW",
        }
    }
}

impl fmt::Display for HlaTypingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SerologySubtype {
    Broad,
    Split,
    Associated,
    NotSplit,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlleleTyping {
    pub locus: Locus,
    pub name: String,
    pub field_count: usize,
    pub expression_suffix: Option<char>,
    pub is_deleted: bool,
    pub identical_to: Option<String>,
}

impl AlleleTyping {
    pub fn new(locus: Locus, name: &str) -> Self {
        let name = name.trim_start_matches('*');
        Self {
            locus,
            name: name.to_string(),
            field_count: crate::typing::splitter::number_of_fields(name),
            expression_suffix: crate::typing::splitter::expression_suffix(name),
            is_deleted: false,
            identical_to: None,
        }
    }

    pub fn is_null_expresser(&self) -> bool {
        self.expression_suffix == Some('N')
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerologyTyping {
    pub locus: Locus,
    pub name: String,
    pub subtype: SerologySubtype,
}

/// A parsed typing: either a molecular allele or a serology.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HlaTyping {
    Allele(AlleleTyping),
    Serology(SerologyTyping),
}

impl HlaTyping {
    pub fn locus(&self) -> Locus {
        match self {
            HlaTyping::Allele(a) => a.locus,
            HlaTyping::Serology(s) => s.locus,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            HlaTyping::Allele(a) => &a.name,
            HlaTyping::Serology(s) => &s.name,
        }
    }

    pub fn method(&self) -> TypingMethod {
        match self {
            HlaTyping::Allele(_) => TypingMethod::Molecular,
            HlaTyping::Serology(_) => TypingMethod::Serology,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-allele facts
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceCompleteness {
    #[default]
    Full,
    Partial,
    Unknown,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DnaCategory {
    #[default]
    CDna,
    GDna,
    Unknown,
}

/// Sequence status of an allele. Alleles without a status record are
/// treated as full cDNA.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlleleStatus {
    pub completeness: SequenceCompleteness,
    pub dna_category: DnaCategory,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dpb1TceGroupAssignment {
    pub allele: String,
    pub v1_group: Option<String>,
    pub v2_group: Option<String>,
}

/// Confidence of an allele-to-serology assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssignmentTier {
    Unambiguous,
    Assumed,
    Possible,
    Expert,
}

impl AssignmentTier {
    /// Only unambiguous and assumed assignments count as direct mappings.
    pub fn is_direct(self) -> bool {
        matches!(self, AssignmentTier::Unambiguous | AssignmentTier::Assumed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SerologyAssignment {
    pub serology: String,
    pub tier: AssignmentTier,
}

// ---------------------------------------------------------------------------
// Index rows
// ---------------------------------------------------------------------------

/// A serology matched by a typing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingSerology {
    pub name: String,
    pub is_direct_mapping: bool,
    /// Assignment tier when the match came from the allele-to-serology table.
    pub tier: Option<AssignmentTier>,
}

/// One precomputed row of a versioned index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingDictionaryEntry {
    pub locus: Locus,
    pub lookup_name: String,
    pub typing_method: TypingMethod,
    pub matching_p_groups: BTreeSet<String>,
    pub matching_g_groups: BTreeSet<String>,
    pub matching_serologies: Vec<MatchingSerology>,
}

impl MatchingDictionaryEntry {
    pub fn new(locus: Locus, lookup_name: &str, typing_method: TypingMethod) -> Self {
        Self {
            locus,
            lookup_name: lookup_name.to_string(),
            typing_method,
            matching_p_groups: BTreeSet::new(),
            matching_g_groups: BTreeSet::new(),
            matching_serologies: Vec::new(),
        }
    }

    pub fn serology_names(&self) -> impl Iterator<Item = &str> {
        self.matching_serologies.iter().map(|s| s.name.as_str())
    }

    pub fn matching_serology(&self, name: &str) -> Option<&MatchingSerology> {
        self.matching_serologies.iter().find(|s| s.name == name)
    }

    /// Merge several entries into one under a new lookup name. A serology
    /// matched by more than one entry keeps its strongest mapping.
    pub fn merged<'a>(
        locus: Locus,
        lookup_name: &str,
        typing_method: TypingMethod,
        entries: impl IntoIterator<Item = &'a MatchingDictionaryEntry>,
    ) -> Self {
        let mut merged = Self::new(locus, lookup_name, typing_method);
        let mut serologies: BTreeMap<String, MatchingSerology> = BTreeMap::new();
        for entry in entries {
            merged
                .matching_p_groups
                .extend(entry.matching_p_groups.iter().cloned());
            merged
                .matching_g_groups
                .extend(entry.matching_g_groups.iter().cloned());
            for serology in &entry.matching_serologies {
                serologies
                    .entry(serology.name.clone())
                    .and_modify(|existing| {
                        if serology.is_direct_mapping && !existing.is_direct_mapping {
                            *existing = serology.clone();
                        }
                    })
                    .or_insert_with(|| serology.clone());
            }
        }
        merged.matching_serologies = serologies.into_values().collect();
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locus_from_typing_locus_spellings() {
        assert_eq!(
            Locus::from_typing_locus("DRB1*"),
            Some((Locus::Drb1, TypingMethod::Molecular))
        );
        assert_eq!(
            Locus::from_typing_locus("Cw"),
            Some((Locus::C, TypingMethod::Serology))
        );
        assert_eq!(
            Locus::from_typing_locus("DQ"),
            Some((Locus::Dqb1, TypingMethod::Serology))
        );
        assert_eq!(Locus::from_typing_locus("DRB3*"), None);
        assert_eq!(Locus::from_typing_locus("DP"), None);
    }

    #[test]
    fn test_locus_from_str() {
        assert_eq!("DRB1*".parse::<Locus>().unwrap(), Locus::Drb1);
        assert_eq!("dpb1".parse::<Locus>().unwrap(), Locus::Dpb1);
        assert_eq!("Cw".parse::<Locus>().unwrap(), Locus::C);
        assert!("Q".parse::<Locus>().is_err());
    }

    #[test]
    fn test_per_locus_indexing_and_map() {
        let mut counts = PerLocus::from_fn(|_| 0usize);
        counts[Locus::Drb1] += 3;
        counts[Locus::A] += 1;
        let total = counts.fold(0, |acc, _, n| acc + n);
        assert_eq!(total, 4);
        let labels = counts.map(|locus, n| format!("{locus}:{n}"));
        assert_eq!(labels[Locus::Drb1], "DRB1:3");
        assert_eq!(labels[Locus::B], "B:0");
    }

    #[test]
    fn test_allele_typing_parses_suffix_and_fields() {
        let typing = AlleleTyping::new(Locus::A, "*01:01:01:02N");
        assert_eq!(typing.name, "01:01:01:02N");
        assert_eq!(typing.field_count, 4);
        assert_eq!(typing.expression_suffix, Some('N'));
        assert!(typing.is_null_expresser());
    }

    #[test]
    fn test_merged_entry_prefers_direct_serology() {
        let mut first = MatchingDictionaryEntry::new(Locus::B, "a", TypingMethod::Molecular);
        first.matching_p_groups.insert("15:01P".into());
        first.matching_serologies.push(MatchingSerology {
            name: "62".into(),
            is_direct_mapping: false,
            tier: Some(AssignmentTier::Possible),
        });
        let mut second = MatchingDictionaryEntry::new(Locus::B, "b", TypingMethod::Molecular);
        second.matching_p_groups.insert("15:02P".into());
        second.matching_serologies.push(MatchingSerology {
            name: "62".into(),
            is_direct_mapping: true,
            tier: Some(AssignmentTier::Unambiguous),
        });

        let merged =
            MatchingDictionaryEntry::merged(Locus::B, "15:XX", TypingMethod::Molecular, [&first, &second]);
        assert_eq!(merged.lookup_name, "15:XX");
        assert_eq!(merged.matching_p_groups.len(), 2);
        assert_eq!(merged.matching_serologies.len(), 1);
        assert!(merged.matching_serologies[0].is_direct_mapping);
    }
}
