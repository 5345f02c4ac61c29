//! Typed nomenclature source records and the per-version dataset.
//!
//! Records keep the locus string exactly as the source spelled it
//! (`A*`, `Cw`, `DR`); mapping onto a matching locus is left to consumers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::{
    AlleleStatus, Dpb1TceGroupAssignment, Locus, SerologyAssignment, TypingMethod,
};

/// Records that carry a raw source locus.
pub trait TypingLocusRecord {
    fn typing_locus(&self) -> &str;

    fn matching_locus(&self) -> Option<(Locus, TypingMethod)> {
        Locus::from_typing_locus(self.typing_locus())
    }
}

macro_rules! impl_typing_locus {
    ($($record:ty),+ $(,)?) => {
        $(
            impl TypingLocusRecord for $record {
                fn typing_locus(&self) -> &str {
                    &self.typing_locus
                }
            }
        )+
    };
}

/// Allele or serology base record from `hla_nom.txt`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HlaNomRecord {
    pub typing_locus: String,
    pub name: String,
    pub is_deleted: bool,
    pub identical_hla: Option<String>,
}

/// G-group or P-group membership row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub typing_locus: String,
    /// Empty when the listed alleles are not grouped.
    pub name: String,
    pub alleles: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelDnaSerRecord {
    pub typing_locus: String,
    pub allele: String,
    pub assignments: Vec<SerologyAssignment>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelSerSerRecord {
    pub typing_locus: String,
    pub serology: String,
    pub splits: Vec<String>,
    pub associated: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedAlleleName {
    pub version: String,
    pub name: String,
}

/// One rename lineage from `Allelelist_history.txt`, newest name first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlleleHistoryRecord {
    pub typing_locus: String,
    pub hla_id: String,
    pub versioned_names: Vec<VersionedAlleleName>,
    pub current_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidentialAlleleRecord {
    pub typing_locus: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlleleStatusRecord {
    pub typing_locus: String,
    pub name: String,
    pub status: AlleleStatus,
}

/// NMDP ambiguity code and the subtypes it stands for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NmdpCodeRecord {
    pub code: String,
    pub subtypes: Vec<String>,
}

impl_typing_locus!(
    HlaNomRecord,
    GroupRecord,
    RelDnaSerRecord,
    RelSerSerRecord,
    AlleleHistoryRecord,
    ConfidentialAlleleRecord,
    AlleleStatusRecord,
);

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// Every source record for one nomenclature version.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub version: String,
    /// SHA-256 over the source content; equal checksums mean equal data.
    pub checksum: String,
    pub alleles: Vec<HlaNomRecord>,
    pub serologies: Vec<HlaNomRecord>,
    pub g_groups: Vec<GroupRecord>,
    pub p_groups: Vec<GroupRecord>,
    pub rel_dna_ser: Vec<RelDnaSerRecord>,
    pub rel_ser_ser: Vec<RelSerSerRecord>,
    pub allele_histories: Vec<AlleleHistoryRecord>,
    pub confidential_alleles: Vec<ConfidentialAlleleRecord>,
    pub allele_statuses: Vec<AlleleStatusRecord>,
    pub dpb1_tce_groups: Vec<Dpb1TceGroupAssignment>,
    pub nmdp_codes: Vec<NmdpCodeRecord>,
}

impl Dataset {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            ..Default::default()
        }
    }

    /// Checksum of the record content, independent of the version label.
    pub fn content_checksum(&self) -> String {
        let unversioned = Dataset {
            version: String::new(),
            checksum: String::new(),
            ..self.clone()
        };
        let mut hasher = Sha256::new();
        match serde_json::to_vec(&unversioned) {
            Ok(bytes) => hasher.update(&bytes),
            Err(_) => hasher.update(format!("{unversioned:?}").as_bytes()),
        }
        format!("{:x}", hasher.finalize())
    }

    /// Fill in `checksum` from the record content when the source did not
    /// provide one.
    pub fn with_computed_checksum(mut self) -> Self {
        if self.checksum.is_empty() {
            self.checksum = self.content_checksum();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serology(locus: &str, name: &str) -> HlaNomRecord {
        HlaNomRecord {
            typing_locus: locus.to_string(),
            name: name.to_string(),
            is_deleted: false,
            identical_hla: None,
        }
    }

    #[test]
    fn test_matching_locus_from_record() {
        let record = serology("Cw", "1");
        assert_eq!(record.matching_locus(), Some((Locus::C, TypingMethod::Serology)));
    }

    #[test]
    fn test_content_checksum_ignores_version_label() {
        let mut first = Dataset::new("3320");
        first.serologies.push(serology("A", "1"));
        let mut second = Dataset::new("3330");
        second.serologies.push(serology("A", "1"));
        assert_eq!(first.content_checksum(), second.content_checksum());

        second.serologies.push(serology("A", "2"));
        assert_ne!(first.content_checksum(), second.content_checksum());
    }

    #[test]
    fn test_with_computed_checksum_keeps_existing() {
        let mut dataset = Dataset::new("3330");
        dataset.checksum = "abc".to_string();
        assert_eq!(dataset.with_computed_checksum().checksum, "abc");
        assert_eq!(Dataset::new("1").with_computed_checksum().checksum.len(), 64);
    }
}
