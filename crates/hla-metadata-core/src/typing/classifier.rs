//! Typing classification.
//!
//! Several categories are syntactic subsets of one another (an XX code is
//! also a well-formed NMDP code, an allele string of names contains
//! alleles), so the grammar is checked in a fixed priority order and the
//! first match wins.

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{HlaError, HlaResult};
use crate::models::HlaTypingCategory;
use crate::typing::splitter;

// ---------------------------------------------------------------------------
// Compiled regex patterns (LazyLock for one-time init)
// ---------------------------------------------------------------------------

static ALLELE_STRING_OF_NAMES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\*?\d{2,4}(?::\d{2,4}){1,3}[NLSCAQ]?(?:/\*?\d{2,4}(?::\d{2,4}){1,3}[NLSCAQ]?)+$",
    )
    .unwrap()
});

static ALLELE_STRING_OF_SUBTYPES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\*?\d{2,4}:\d{2,4}[NLSCAQ]?(?:/\d{2,4}[NLSCAQ]?)+$").unwrap()
});

static XX_CODE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\*?\d{2,4}:XX$").unwrap());

// Checked after XX_CODE_RE, so a bare `XX` never lands here.
static NMDP_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*?\d{2,4}:[A-Z]{2,}$").unwrap());

static G_GROUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*?\d{2,4}(?::\d{2,4}){1,3}G$").unwrap());

static P_GROUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*?\d{2,4}(?::\d{2,4}){1,3}P$").unwrap());

static SMALL_G_GROUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*?\d{2,4}(?::\d{2,4}){1,3}g$").unwrap());

static SEROLOGY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{1,4}$").unwrap());

static ALLELE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*?\d{2,4}(?::\d{2,4}){1,3}[NLSCAQ]?$").unwrap());

static NEW_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z]+$").unwrap());

/// Grammar rules in priority order.
static GRAMMAR: LazyLock<[(&'static Regex, HlaTypingCategory); 10]> = LazyLock::new(|| {
    [
        (&*ALLELE_STRING_OF_NAMES_RE, HlaTypingCategory::AlleleStringOfNames),
        (&*ALLELE_STRING_OF_SUBTYPES_RE, HlaTypingCategory::AlleleStringOfSubtypes),
        (&*XX_CODE_RE, HlaTypingCategory::XxCode),
        (&*NMDP_CODE_RE, HlaTypingCategory::NmdpCode),
        (&*G_GROUP_RE, HlaTypingCategory::GGroup),
        (&*P_GROUP_RE, HlaTypingCategory::PGroup),
        (&*SMALL_G_GROUP_RE, HlaTypingCategory::SmallGGroup),
        (&*SEROLOGY_RE, HlaTypingCategory::Serology),
        (&*ALLELE_RE, HlaTypingCategory::Allele),
        (&*NEW_RE, HlaTypingCategory::New),
    ]
});

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Locus-free field shape: alphanumeric fields separated by `:` or `/`, with
/// an optional leading `*`, and no empty field anywhere.
fn has_field_shape(typing: &str) -> bool {
    let body = typing.strip_prefix('*').unwrap_or(typing);
    if body.is_empty() {
        return false;
    }
    body.split('/').all(|element| {
        let element = element.strip_prefix('*').unwrap_or(element);
        !element.is_empty()
            && element
                .split(':')
                .all(|field| !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric()))
    })
}

/// Classify a raw typing string. Every input either yields exactly one
/// category or fails with [`HlaError::InvalidHlaFormat`].
pub fn classify(raw_typing: &str) -> HlaResult<HlaTypingCategory> {
    let typing = raw_typing.trim();
    if !has_field_shape(typing) {
        return Err(HlaError::invalid_format(raw_typing));
    }
    GRAMMAR
        .iter()
        .find(|(pattern, _)| pattern.is_match(typing))
        .map(|(_, category)| *category)
        .ok_or_else(|| HlaError::invalid_format(raw_typing))
}

/// Trim whitespace and the locus-style `*` prefix.
pub fn normalize_typing(raw_typing: &str) -> &str {
    let typing = raw_typing.trim();
    typing.strip_prefix('*').unwrap_or(typing)
}

/// Split an allele string into its constituent allele names.
///
/// For an allele string of subtypes every later element inherits the first
/// field of the first element, never its expression suffix:
/// `*99:99N/100` gives `99:99N` and `99:100`.
pub fn split_allele_string(raw_typing: &str) -> HlaResult<Vec<String>> {
    let category = classify(raw_typing)?;
    let typing = normalize_typing(raw_typing);
    let mut elements = typing.split('/').map(|e| e.trim_start_matches('*'));
    match category {
        HlaTypingCategory::AlleleStringOfNames => Ok(elements.map(str::to_string).collect()),
        HlaTypingCategory::AlleleStringOfSubtypes => {
            let first = elements
                .next()
                .ok_or_else(|| HlaError::invalid_format(raw_typing))?;
            let first_field = splitter::first_field(first);
            let mut names = vec![first.to_string()];
            names.extend(elements.map(|subtype| format!("{first_field}:{subtype}")));
            Ok(names)
        }
        _ => Err(HlaError::invalid_format(raw_typing)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(typing: &str) -> HlaTypingCategory {
        classify(typing).unwrap()
    }

    #[test]
    fn test_classify_literal_cases() {
        assert_eq!(category("01:XX"), HlaTypingCategory::XxCode);
        assert_eq!(category("01:ABCDE"), HlaTypingCategory::NmdpCode);
        assert_eq!(category("01:01:01G"), HlaTypingCategory::GGroup);
        assert_eq!(category("01:01P"), HlaTypingCategory::PGroup);
        assert_eq!(category("01:01g"), HlaTypingCategory::SmallGGroup);
        assert_eq!(category("7"), HlaTypingCategory::Serology);
        assert_eq!(category("*01:01:01:01"), HlaTypingCategory::Allele);
        assert_eq!(category("*01:01/01:02"), HlaTypingCategory::AlleleStringOfNames);
        assert_eq!(category("*01:01/02"), HlaTypingCategory::AlleleStringOfSubtypes);
        assert_eq!(category("NEW"), HlaTypingCategory::New);
    }

    #[test]
    fn test_classify_rejects_malformed() {
        for typing in ["", ":", "01:01:01:01:01", "01::01", "01:01/", "/01:01", "*", "01:01:", "01-01", "Z7"] {
            let result = classify(typing);
            assert!(
                matches!(result, Err(HlaError::InvalidHlaFormat { .. })),
                "classify({typing:?}) should fail, got {result:?}"
            );
        }
    }

    #[test]
    fn test_classify_allele_strings() {
        assert_eq!(category("01:01/01:02"), HlaTypingCategory::AlleleStringOfNames);
        assert_eq!(category("*01:01/*01:02"), HlaTypingCategory::AlleleStringOfNames);
        assert_eq!(
            category("90:91/92L/93/94N/95"),
            HlaTypingCategory::AlleleStringOfSubtypes
        );
        assert_eq!(category("*99:99N/100"), HlaTypingCategory::AlleleStringOfSubtypes);
        assert!(classify("01:01/02/03:01").is_err());
    }

    #[test]
    fn test_classify_codes_are_case_sensitive() {
        assert_eq!(category("01:XXNMDP"), HlaTypingCategory::NmdpCode);
        assert!(classify("01:xx").is_err());
        assert!(classify("01:A").is_err());
    }

    #[test]
    fn test_classify_alleles_with_suffix() {
        assert_eq!(category("01:01:01:02N"), HlaTypingCategory::Allele);
        assert_eq!(category("24:02:01:02L"), HlaTypingCategory::Allele);
        assert_eq!(category("01:01"), HlaTypingCategory::Allele);
        assert_eq!(category("4005"), HlaTypingCategory::Serology);
    }

    #[test]
    fn test_split_allele_string_of_subtypes() {
        assert_eq!(split_allele_string("*01:01/02").unwrap(), vec!["01:01", "01:02"]);
        assert_eq!(split_allele_string("*99:99N/100").unwrap(), vec!["99:99N", "99:100"]);
        assert_eq!(
            split_allele_string("90:91/92L/93/94N/95").unwrap(),
            vec!["90:91", "90:92L", "90:93", "90:94N", "90:95"]
        );
    }

    #[test]
    fn test_split_allele_string_of_names() {
        assert_eq!(
            split_allele_string("*01:01/*01:02:01").unwrap(),
            vec!["01:01", "01:02:01"]
        );
        assert!(split_allele_string("01:01").is_err());
    }
}
