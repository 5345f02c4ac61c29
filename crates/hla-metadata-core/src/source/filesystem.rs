//! Flat-file nomenclature source: one directory per version under a data root.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

use crate::errors::{HlaError, HlaResult};
use crate::source::parser;
use crate::source::records::Dataset;
use crate::source::NomenclatureSource;

pub const HLA_NOM_FILE: &str = "hla_nom.txt";
pub const G_GROUP_FILE: &str = "hla_nom_g.txt";
pub const P_GROUP_FILE: &str = "hla_nom_p.txt";
pub const REL_DNA_SER_FILE: &str = "rel_dna_ser.txt";
pub const REL_SER_SER_FILE: &str = "rel_ser_ser.txt";
pub const ALLELE_HISTORY_FILE: &str = "Allelelist_history.txt";
pub const CONFIDENTIAL_FILE: &str = "confidential_alleles.txt";
pub const ALLELE_STATUS_FILE: &str = "Allele_status.txt";
pub const DPB1_TCE_FILE: &str = "dpb1_tce_groups.txt";
pub const NMDP_CODES_FILE: &str = "nmdp_codes.txt";

/// Reads `<root>/<version>/*.txt`.
#[derive(Clone, Debug)]
pub struct FileSystemSource {
    root: PathBuf,
}

/// Accumulates file contents into the dataset checksum in read order.
struct VersionDir<'a> {
    dir: PathBuf,
    version: &'a str,
    hasher: Sha256,
}

impl<'a> VersionDir<'a> {
    fn read_required(&mut self, file: &str) -> HlaResult<String> {
        self.read_optional(file)?.ok_or_else(|| {
            HlaError::data_unavailable(self.version, format!("missing required file {file}"))
        })
    }

    fn read_optional(&mut self, file: &str) -> HlaResult<Option<String>> {
        let path = self.dir.join(file);
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| {
            HlaError::data_unavailable(self.version, format!("cannot read {}: {e}", path.display()))
        })?;
        self.hasher.update(file.as_bytes());
        self.hasher.update(content.as_bytes());
        Ok(Some(content))
    }

    fn checksum(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

impl FileSystemSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn load(&self, version: &str) -> HlaResult<Dataset> {
        if version.is_empty() || version.contains(['/', '\\']) || version == ".." {
            return Err(HlaError::data_unavailable(version, "invalid version name"));
        }
        let dir = self.root.join(version);
        if !dir.is_dir() {
            return Err(HlaError::data_unavailable(
                version,
                format!("no source directory at {}", dir.display()),
            ));
        }
        let mut files = VersionDir {
            dir,
            version,
            hasher: Sha256::new(),
        };

        let mut dataset = Dataset::new(version);

        let hla_nom = files.read_required(HLA_NOM_FILE)?;
        let (alleles, serologies) = parser::parse_hla_nom(&hla_nom, version, HLA_NOM_FILE)?;
        dataset.alleles = alleles;
        dataset.serologies = serologies;

        let g_groups = files.read_required(G_GROUP_FILE)?;
        dataset.g_groups = parser::parse_groups(&g_groups, version, G_GROUP_FILE)?;

        let p_groups = files.read_required(P_GROUP_FILE)?;
        dataset.p_groups = parser::parse_groups(&p_groups, version, P_GROUP_FILE)?;

        let rel_dna_ser = files.read_required(REL_DNA_SER_FILE)?;
        dataset.rel_dna_ser = parser::parse_rel_dna_ser(&rel_dna_ser, version, REL_DNA_SER_FILE)?;

        let rel_ser_ser = files.read_required(REL_SER_SER_FILE)?;
        dataset.rel_ser_ser = parser::parse_rel_ser_ser(&rel_ser_ser, version, REL_SER_SER_FILE)?;

        let history = files.read_required(ALLELE_HISTORY_FILE)?;
        dataset.allele_histories =
            parser::parse_allele_history(&history, version, ALLELE_HISTORY_FILE)?;

        if let Some(content) = files.read_optional(CONFIDENTIAL_FILE)? {
            dataset.confidential_alleles =
                parser::parse_confidential_alleles(&content, version, CONFIDENTIAL_FILE)?;
        }
        if let Some(content) = files.read_optional(ALLELE_STATUS_FILE)? {
            dataset.allele_statuses =
                parser::parse_allele_status(&content, version, ALLELE_STATUS_FILE)?;
        }
        if let Some(content) = files.read_optional(DPB1_TCE_FILE)? {
            dataset.dpb1_tce_groups =
                parser::parse_dpb1_tce_groups(&content, version, DPB1_TCE_FILE)?;
        }
        if let Some(content) = files.read_optional(NMDP_CODES_FILE)? {
            dataset.nmdp_codes = parser::parse_nmdp_codes(&content, version, NMDP_CODES_FILE)?;
        }

        dataset.checksum = files.checksum();
        debug!(
            "Loaded nomenclature version {}: {} alleles, {} serologies, {} histories",
            version,
            dataset.alleles.len(),
            dataset.serologies.len(),
            dataset.allele_histories.len()
        );
        Ok(dataset)
    }
}

impl NomenclatureSource for FileSystemSource {
    fn get_dataset(&self, version: &str) -> HlaResult<Dataset> {
        self.load(version)
    }

    /// Version directories under the root that contain an `hla_nom.txt`.
    fn available_versions(&self) -> HlaResult<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut versions: Vec<String> = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_dir() && entry.path().join(HLA_NOM_FILE).is_file())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        versions.sort();
        Ok(versions)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const HLA_NOM: &str = "\
# file: hla_nom.txt
A*;01:01:01:01;19890101;;;
A*;01:01:01:02N;19890101;;;
A*;01:02;19890101;;;
DRB1*;08:01:01;19890101;;;
DRB1*;08:01:03;19950101;20000101;08:01:01;Identical to DRB1*08:01:01
B*;15:01:01:01;19890101;;;
A;1;;;;
B;21;;;;
B;49;;;;
B;50;;;;
B;4005;;;;
B;62;;;;
DR;8;;;;
";

    pub(crate) const G_GROUPS: &str = "\
A*;01:01:01:01/01:01:01:02N;01:01:01G
A*;01:02;
DRB1*;08:01:01;08:01:01G
B*;15:01:01:01;15:01:01G
";

    pub(crate) const P_GROUPS: &str = "\
A*;01:01:01:01;01:01P
DRB1*;08:01:01;08:01P
B*;15:01:01:01;15:01P
";

    pub(crate) const REL_DNA_SER: &str = "\
A*;01:01:01:01;1;;;
A*;01:01:01:02N;0;;;
DRB1*;08:01:01;8;;;
B*;15:01:01:01;62;;;
";

    pub(crate) const REL_SER_SER: &str = "\
B;21;49/50;4005
";

    pub(crate) const HISTORY: &str = "\
HLA_ID,3330,3320
HLA00001,A*01:01:01:01,A*01:01:01:01
HLA00002,A*01:01:01:02N,A*01:01:01:02N
HLA00003,A*01:02,A*01:02
HLA00665,DRB1*08:01:01,DRB1*08:01:01
HLA00666,NA,DRB1*08:01:03
HLA00162,B*15:01:01:01,B*15:01:01:01
";

    pub(crate) fn write_version(root: &Path, version: &str) {
        let dir = root.join(version);
        std::fs::create_dir_all(&dir).unwrap();
        for (file, content) in [
            (HLA_NOM_FILE, HLA_NOM),
            (G_GROUP_FILE, G_GROUPS),
            (P_GROUP_FILE, P_GROUPS),
            (REL_DNA_SER_FILE, REL_DNA_SER),
            (REL_SER_SER_FILE, REL_SER_SER),
            (ALLELE_HISTORY_FILE, HISTORY),
        ] {
            std::fs::write(dir.join(file), content).unwrap();
        }
    }

    #[test]
    fn test_load_version_directory() {
        let tmp = tempfile::tempdir().unwrap();
        write_version(tmp.path(), "3330");
        let source = FileSystemSource::new(tmp.path());
        let dataset = source.get_dataset("3330").unwrap();
        assert_eq!(dataset.version, "3330");
        assert_eq!(dataset.alleles.len(), 6);
        assert_eq!(dataset.serologies.len(), 7);
        assert_eq!(dataset.allele_histories.len(), 6);
        assert!(dataset.confidential_alleles.is_empty());
        assert_eq!(dataset.checksum.len(), 64);
    }

    #[test]
    fn test_missing_version_is_data_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let source = FileSystemSource::new(tmp.path());
        let err = source.get_dataset("3330").unwrap_err();
        assert!(matches!(err, HlaError::DataUnavailable { .. }));
        assert!(source.get_dataset("../3330").is_err());
    }

    #[test]
    fn test_missing_required_file_is_data_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        write_version(tmp.path(), "3330");
        std::fs::remove_file(tmp.path().join("3330").join(REL_SER_SER_FILE)).unwrap();
        let err = FileSystemSource::new(tmp.path()).get_dataset("3330").unwrap_err();
        assert!(err.to_string().contains(REL_SER_SER_FILE));
    }

    #[test]
    fn test_malformed_file_fails_whole_version() {
        let tmp = tempfile::tempdir().unwrap();
        write_version(tmp.path(), "3330");
        std::fs::write(tmp.path().join("3330").join(P_GROUP_FILE), "A*\n").unwrap();
        let err = FileSystemSource::new(tmp.path()).get_dataset("3330").unwrap_err();
        assert!(matches!(err, HlaError::DataUnavailable { .. }));
    }

    #[test]
    fn test_optional_files_are_loaded() {
        let tmp = tempfile::tempdir().unwrap();
        write_version(tmp.path(), "3330");
        let dir = tmp.path().join("3330");
        std::fs::write(dir.join(CONFIDENTIAL_FILE), "A*;01:02\n").unwrap();
        std::fs::write(dir.join(NMDP_CODES_FILE), "*\tAB\t01/02\n").unwrap();
        let dataset = FileSystemSource::new(tmp.path()).get_dataset("3330").unwrap();
        assert_eq!(dataset.confidential_alleles.len(), 1);
        assert_eq!(dataset.nmdp_codes.len(), 1);
    }

    #[test]
    fn test_identical_files_share_checksum() {
        let tmp = tempfile::tempdir().unwrap();
        write_version(tmp.path(), "3320");
        write_version(tmp.path(), "3330");
        let source = FileSystemSource::new(tmp.path());
        let older = source.get_dataset("3320").unwrap();
        let newer = source.get_dataset("3330").unwrap();
        assert_eq!(older.checksum, newer.checksum);
    }

    #[test]
    fn test_available_versions() {
        let tmp = tempfile::tempdir().unwrap();
        write_version(tmp.path(), "3330");
        write_version(tmp.path(), "3310");
        std::fs::create_dir_all(tmp.path().join("scratch")).unwrap();
        let versions = FileSystemSource::new(tmp.path()).available_versions().unwrap();
        assert_eq!(versions, vec!["3310", "3330"]);
    }
}
