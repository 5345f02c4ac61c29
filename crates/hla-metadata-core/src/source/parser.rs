//! Parsers for the flat nomenclature files.
//!
//! Every parser rejects a malformed line with `DataUnavailable` rather than
//! skipping it, so a version is never built from partial data.

use serde::Deserialize;

use crate::errors::{HlaError, HlaResult};
use crate::models::{
    AlleleStatus, AssignmentTier, DnaCategory, Dpb1TceGroupAssignment, SequenceCompleteness,
    SerologyAssignment,
};
use crate::source::records::{
    AlleleHistoryRecord, AlleleStatusRecord, ConfidentialAlleleRecord, GroupRecord, HlaNomRecord,
    NmdpCodeRecord, RelDnaSerRecord, RelSerSerRecord, VersionedAlleleName,
};

/// Serology placeholders in `rel_dna_ser.txt` that carry no assignment.
const SEROLOGY_PLACEHOLDERS: &[&str] = &["0", "?"];

const HISTORY_ID_HEADER: &str = "HLA_ID";
const MISSING_NAME: &str = "NA";

fn data_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim_end_matches('\r')))
        .filter(|(_, line)| {
            let stripped = line.trim();
            !stripped.is_empty() && !stripped.starts_with('#')
        })
}

fn malformed(version: &str, file: &str, line_number: usize, line: &str) -> HlaError {
    HlaError::data_unavailable(
        version,
        format!("{file}:{line_number}: malformed record {line:?}"),
    )
}

fn split_list(field: &str) -> Vec<String> {
    field
        .split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn optional(field: Option<&str>) -> Option<String> {
    field
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Comma-separated files with a header row. Quoting follows RFC 4180 and
/// `#` lines are comments.
fn csv_reader(content: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes())
}

fn csv_error(version: &str, file: &str, err: csv::Error) -> HlaError {
    match err.position() {
        Some(position) => HlaError::data_unavailable(
            version,
            format!("{file}:{}: malformed record: {err}", position.line()),
        ),
        None => HlaError::data_unavailable(version, format!("{file}: {err}")),
    }
}

fn malformed_record(version: &str, file: &str, record: &csv::StringRecord) -> HlaError {
    let line_number = record.position().map_or(1, |position| position.line() as usize);
    let line = record.iter().collect::<Vec<_>>().join(",");
    malformed(version, file, line_number, &line)
}

#[derive(Debug, Deserialize)]
struct AlleleStatusRow {
    #[serde(rename = "Locus")]
    locus: String,
    #[serde(rename = "Allele")]
    allele: String,
    #[serde(rename = "Completeness")]
    completeness: String,
    #[serde(rename = "DnaCategory")]
    dna_category: String,
}

/// Split a locus-qualified allele (`A*01:01`) into (`A*`, `01:01`).
fn split_qualified_allele(raw: &str) -> Option<(String, String)> {
    let pos = raw.find('*')?;
    let (locus, name) = raw.split_at(pos + 1);
    if locus.len() < 2 || name.is_empty() {
        return None;
    }
    Some((locus.to_string(), name.to_string()))
}

// ---------------------------------------------------------------------------
// Required files
// ---------------------------------------------------------------------------

/// Parse `hla_nom.txt` into (alleles, serologies), split by whether the
/// locus spelling is molecular (`A*`) or serological (`A`).
pub fn parse_hla_nom(
    content: &str,
    version: &str,
    file: &str,
) -> HlaResult<(Vec<HlaNomRecord>, Vec<HlaNomRecord>)> {
    let mut alleles = Vec::new();
    let mut serologies = Vec::new();
    for (line_number, line) in data_lines(content) {
        let fields: Vec<&str> = line.split(';').collect();
        if fields.len() < 4 || fields[0].trim().is_empty() || fields[1].trim().is_empty() {
            return Err(malformed(version, file, line_number, line));
        }
        let typing_locus = fields[0].trim().to_string();
        let record = HlaNomRecord {
            name: fields[1].trim().to_string(),
            is_deleted: !fields[3].trim().is_empty(),
            identical_hla: optional(fields.get(4).copied()),
            typing_locus,
        };
        if record.typing_locus.ends_with('*') {
            alleles.push(record);
        } else {
            serologies.push(record);
        }
    }
    Ok((alleles, serologies))
}

/// Parse `hla_nom_g.txt` or `hla_nom_p.txt`.
pub fn parse_groups(content: &str, version: &str, file: &str) -> HlaResult<Vec<GroupRecord>> {
    data_lines(content)
        .map(|(line_number, line)| {
            let fields: Vec<&str> = line.split(';').collect();
            if fields.len() < 2 || fields[0].trim().is_empty() {
                return Err(malformed(version, file, line_number, line));
            }
            let alleles = split_list(fields[1]);
            if alleles.is_empty() {
                return Err(malformed(version, file, line_number, line));
            }
            Ok(GroupRecord {
                typing_locus: fields[0].trim().to_string(),
                name: fields.get(2).map(|s| s.trim().to_string()).unwrap_or_default(),
                alleles,
            })
        })
        .collect()
}

/// Parse `rel_dna_ser.txt`: `Locus;Allele;Unambiguous;Possible;Assumed;Expert`.
pub fn parse_rel_dna_ser(
    content: &str,
    version: &str,
    file: &str,
) -> HlaResult<Vec<RelDnaSerRecord>> {
    const TIER_COLUMNS: [(usize, AssignmentTier); 4] = [
        (2, AssignmentTier::Unambiguous),
        (3, AssignmentTier::Possible),
        (4, AssignmentTier::Assumed),
        (5, AssignmentTier::Expert),
    ];
    data_lines(content)
        .map(|(line_number, line)| {
            let fields: Vec<&str> = line.split(';').collect();
            if fields.len() < 3 || fields[0].trim().is_empty() || fields[1].trim().is_empty() {
                return Err(malformed(version, file, line_number, line));
            }
            let assignments = TIER_COLUMNS
                .iter()
                .filter_map(|(column, tier)| fields.get(*column).map(|f| (f, *tier)))
                .flat_map(|(field, tier)| {
                    split_list(field)
                        .into_iter()
                        .filter(|s| !SEROLOGY_PLACEHOLDERS.contains(&s.as_str()))
                        .map(move |serology| SerologyAssignment { serology, tier })
                })
                .collect();
            Ok(RelDnaSerRecord {
                typing_locus: fields[0].trim().to_string(),
                allele: fields[1].trim().to_string(),
                assignments,
            })
        })
        .collect()
}

/// Parse `rel_ser_ser.txt`: `Locus;Serology;Splits;Associated`.
pub fn parse_rel_ser_ser(
    content: &str,
    version: &str,
    file: &str,
) -> HlaResult<Vec<RelSerSerRecord>> {
    data_lines(content)
        .map(|(line_number, line)| {
            let fields: Vec<&str> = line.split(';').collect();
            if fields.len() < 2 || fields[0].trim().is_empty() || fields[1].trim().is_empty() {
                return Err(malformed(version, file, line_number, line));
            }
            Ok(RelSerSerRecord {
                typing_locus: fields[0].trim().to_string(),
                serology: fields[1].trim().to_string(),
                splits: fields.get(2).map(|f| split_list(f)).unwrap_or_default(),
                associated: fields.get(3).map(|f| split_list(f)).unwrap_or_default(),
            })
        })
        .collect()
}

/// Parse `Allelelist_history.txt`.
///
/// The header names one nomenclature version per column, newest first. The
/// explicit current name of a history is its cell in the column matching
/// `version`. Every row must be as wide as the header.
pub fn parse_allele_history(
    content: &str,
    version: &str,
    file: &str,
) -> HlaResult<Vec<AlleleHistoryRecord>> {
    let mut reader = csv_reader(content);
    let columns = reader
        .headers()
        .map_err(|err| csv_error(version, file, err))?
        .clone();
    if columns.get(0) != Some(HISTORY_ID_HEADER) || columns.len() < 2 {
        return Err(malformed_record(version, file, &columns));
    }
    let versions: Vec<&str> = columns.iter().skip(1).collect();
    let current_column = versions.iter().position(|v| *v == version);

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result.map_err(|err| csv_error(version, file, err))?;
        let hla_id = row.get(0).unwrap_or_default();
        if hla_id.is_empty() {
            return Err(malformed_record(version, file, &row));
        }
        let mut typing_locus: Option<String> = None;
        let mut versioned_names = Vec::new();
        let mut current_name = None;
        for (column, cell) in row.iter().skip(1).enumerate() {
            if cell.is_empty() || cell == MISSING_NAME {
                continue;
            }
            let (locus, name) = split_qualified_allele(cell)
                .ok_or_else(|| malformed_record(version, file, &row))?;
            match &typing_locus {
                Some(existing) if *existing != locus => {
                    return Err(malformed_record(version, file, &row));
                }
                Some(_) => {}
                None => typing_locus = Some(locus),
            }
            if Some(column) == current_column {
                current_name = Some(name.clone());
            }
            versioned_names.push(VersionedAlleleName {
                version: versions[column].to_string(),
                name,
            });
        }
        let Some(typing_locus) = typing_locus else {
            continue;
        };
        records.push(AlleleHistoryRecord {
            typing_locus,
            hla_id: hla_id.to_string(),
            versioned_names,
            current_name,
        });
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Optional files
// ---------------------------------------------------------------------------

/// Parse `confidential_alleles.txt`: `Locus;Name`.
pub fn parse_confidential_alleles(
    content: &str,
    version: &str,
    file: &str,
) -> HlaResult<Vec<ConfidentialAlleleRecord>> {
    data_lines(content)
        .map(|(line_number, line)| {
            let fields: Vec<&str> = line.split(';').map(str::trim).collect();
            match fields.as_slice() {
                [locus, name, ..] if !locus.is_empty() && !name.is_empty() => {
                    Ok(ConfidentialAlleleRecord {
                        typing_locus: locus.to_string(),
                        name: name.to_string(),
                    })
                }
                _ => Err(malformed(version, file, line_number, line)),
            }
        })
        .collect()
}

/// Parse `Allele_status.txt`: CSV with a header row,
/// `Locus,Allele,Completeness,DnaCategory`. Status values are matched
/// case-insensitively; anything outside the known vocabulary is malformed.
pub fn parse_allele_status(
    content: &str,
    version: &str,
    file: &str,
) -> HlaResult<Vec<AlleleStatusRecord>> {
    let mut reader = csv_reader(content);
    let headers = reader
        .headers()
        .map_err(|err| csv_error(version, file, err))?
        .clone();
    let mut records = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|err| csv_error(version, file, err))?;
        let row: AlleleStatusRow = record
            .deserialize(Some(&headers))
            .map_err(|err| csv_error(version, file, err))?;
        if row.locus.is_empty() || row.allele.is_empty() {
            return Err(malformed_record(version, file, &record));
        }
        let (Some(completeness), Some(dna_category)) = (
            parse_completeness(&row.completeness),
            parse_dna_category(&row.dna_category),
        ) else {
            return Err(malformed_record(version, file, &record));
        };
        records.push(AlleleStatusRecord {
            typing_locus: row.locus,
            name: row.allele,
            status: AlleleStatus {
                completeness,
                dna_category,
            },
        });
    }
    Ok(records)
}

fn parse_completeness(raw: &str) -> Option<SequenceCompleteness> {
    match raw.to_ascii_lowercase().as_str() {
        "full" => Some(SequenceCompleteness::Full),
        "partial" => Some(SequenceCompleteness::Partial),
        "unknown" => Some(SequenceCompleteness::Unknown),
        _ => None,
    }
}

fn parse_dna_category(raw: &str) -> Option<DnaCategory> {
    match raw.to_ascii_lowercase().as_str() {
        "cdna" => Some(DnaCategory::CDna),
        "gdna" => Some(DnaCategory::GDna),
        "unknown" => Some(DnaCategory::Unknown),
        _ => None,
    }
}

/// Parse `dpb1_tce_groups.txt`: `DPB1*01:01:01:01;V1Group;V2Group`.
pub fn parse_dpb1_tce_groups(
    content: &str,
    version: &str,
    file: &str,
) -> HlaResult<Vec<Dpb1TceGroupAssignment>> {
    data_lines(content)
        .map(|(line_number, line)| {
            let fields: Vec<&str> = line.split(';').collect();
            let (_, allele) = fields
                .first()
                .and_then(|f| split_qualified_allele(f.trim()))
                .ok_or_else(|| malformed(version, file, line_number, line))?;
            Ok(Dpb1TceGroupAssignment {
                allele,
                v1_group: optional(fields.get(1).copied()),
                v2_group: optional(fields.get(2).copied()),
            })
        })
        .collect()
}

/// Parse an NMDP `alpha.v3` code list: `[flag]\tCODE\tSUBTYPES`.
pub fn parse_nmdp_codes(
    content: &str,
    version: &str,
    file: &str,
) -> HlaResult<Vec<NmdpCodeRecord>> {
    data_lines(content)
        .filter(|(_, line)| line.contains('\t'))
        .map(|(line_number, line)| {
            let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
            let (code, subtypes) = match fields.as_slice() {
                [_, code, subtypes] | [code, subtypes] => (*code, *subtypes),
                _ => return Err(malformed(version, file, line_number, line)),
            };
            let subtypes = split_list(subtypes);
            if code.is_empty() || subtypes.is_empty() {
                return Err(malformed(version, file, line_number, line));
            }
            Ok(NmdpCodeRecord {
                code: code.to_string(),
                subtypes,
            })
        })
        .collect()
}
