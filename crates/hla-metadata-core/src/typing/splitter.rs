//! Field-level string helpers for colon-delimited typings.
//!
//! Every function here is total over its input but only meaningful for
//! strings already classified as an allele or allele string of subtypes.
//! Callers must classify first.

pub const FIELD_DELIMITER: char = ':';

/// Single-letter expression suffixes recognised on the final field.
pub const EXPRESSION_SUFFIXES: &[char] = &['N', 'L', 'S', 'C', 'A', 'Q'];

pub fn split_to_fields(name: &str) -> Vec<&str> {
    name.split(FIELD_DELIMITER).collect()
}

pub fn number_of_fields(name: &str) -> usize {
    name.split(FIELD_DELIMITER).count()
}

pub fn first_field(name: &str) -> &str {
    name.split(FIELD_DELIMITER).next().unwrap_or_default()
}

/// The second field as written, including any expression suffix. Empty for
/// single-field input.
pub fn second_field(name: &str) -> &str {
    name.split(FIELD_DELIMITER).nth(1).unwrap_or_default()
}

pub fn second_field_with_suffix_removed(name: &str) -> &str {
    strip_expression_suffix(second_field(name))
}

pub fn remove_last_field(name: &str) -> String {
    match name.rfind(FIELD_DELIMITER) {
        Some(pos) => name[..pos].to_string(),
        None => name.to_string(),
    }
}

/// The expression suffix carried by the final field, if any.
///
/// A suffix is a trailing letter from [`EXPRESSION_SUFFIXES`] immediately
/// preceded by a digit, so `01:01N` has one and `01:XX` does not.
pub fn expression_suffix(name: &str) -> Option<char> {
    let mut chars = name.chars().rev();
    let last = chars.next()?;
    let previous = chars.next()?;
    if EXPRESSION_SUFFIXES.contains(&last) && previous.is_ascii_digit() {
        Some(last)
    } else {
        None
    }
}

pub fn strip_expression_suffix(name: &str) -> &str {
    match expression_suffix(name) {
        Some(suffix) => &name[..name.len() - suffix.len_utf8()],
        None => name,
    }
}

// ---------------------------------------------------------------------------
// Truncation
// ---------------------------------------------------------------------------

pub fn first_two_fields(name: &str) -> Vec<&str> {
    name.split(FIELD_DELIMITER).take(2).collect()
}

/// First two fields joined. A suffix on the second field survives; a suffix
/// on any later field is dropped.
pub fn first_two_fields_as_string(name: &str) -> String {
    first_two_fields(name).join(":")
}

/// First two fields followed by whichever expression suffix the full name
/// carries.
pub fn first_two_fields_with_expression_suffix_as_string(name: &str) -> String {
    let truncated = first_two_fields_as_string_with_suffix_removed(name);
    match expression_suffix(name) {
        Some(suffix) => format!("{truncated}{suffix}"),
        None => truncated,
    }
}

pub fn first_two_fields_as_string_with_suffix_removed(name: &str) -> String {
    let fields = first_two_fields(name);
    match fields.as_slice() {
        [first, second] => format!("{first}:{}", strip_expression_suffix(second)),
        [first] => strip_expression_suffix(first).to_string(),
        _ => String::new(),
    }
}

pub fn first_three_fields(name: &str) -> Vec<&str> {
    name.split(FIELD_DELIMITER).take(3).collect()
}

pub fn first_three_fields_as_string(name: &str) -> String {
    first_three_fields(name).join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_of_fields() {
        assert_eq!(number_of_fields("01"), 1);
        assert_eq!(number_of_fields("01:01"), 2);
        assert_eq!(number_of_fields("01:01:01:01"), 4);
    }

    #[test]
    fn test_first_and_second_field() {
        assert_eq!(first_field("Field1:Field2:Field3"), "Field1");
        assert_eq!(second_field("Field1:Field2N:Field3"), "Field2N");
        assert_eq!(second_field("Field1"), "");
        assert_eq!(second_field_with_suffix_removed("01:02N"), "02");
    }

    #[test]
    fn test_remove_last_field() {
        assert_eq!(remove_last_field("Field:Field:Field"), "Field:Field");
        assert_eq!(remove_last_field("Field"), "Field");
    }

    #[test]
    fn test_remove_last_field_repeatedly_yields_first_field() {
        let name = "01:02:03:04N";
        let mut current = name.to_string();
        for _ in 0..number_of_fields(name) - 1 {
            current = remove_last_field(&current);
        }
        assert_eq!(current, first_field(name));
    }

    #[test]
    fn test_first_two_fields_as_string_drops_later_suffix() {
        assert_eq!(first_two_fields_as_string("Field1:Field2:Field3N"), "Field1:Field2");
        assert_eq!(first_two_fields_as_string("01:01N"), "01:01N");
    }

    #[test]
    fn test_first_two_fields_with_expression_suffix() {
        assert_eq!(
            first_two_fields_with_expression_suffix_as_string("Field1:Field2:Field3:Field4N"),
            "Field1:Field2N"
        );
        assert_eq!(first_two_fields_with_expression_suffix_as_string("01:01N"), "01:01N");
        assert_eq!(first_two_fields_with_expression_suffix_as_string("01:01:01"), "01:01");
    }

    #[test]
    fn test_first_two_fields_with_suffix_removed() {
        assert_eq!(first_two_fields_as_string_with_suffix_removed("01:01N"), "01:01");
        assert_eq!(first_two_fields_as_string_with_suffix_removed("01:01:01:02L"), "01:01");
    }

    #[test]
    fn test_first_three_fields_is_idempotent() {
        let name = "01:01:01:02N";
        let once = first_three_fields_as_string(name);
        assert_eq!(once, "01:01:01");
        assert_eq!(first_three_fields_as_string(&once), once);
        assert_eq!(first_three_fields(name), vec!["01", "01", "01"]);
    }

    #[test]
    fn test_expression_suffix_detection() {
        assert_eq!(expression_suffix("01:01:01:02N"), Some('N'));
        assert_eq!(expression_suffix("01:01"), None);
        assert_eq!(expression_suffix("01:XX"), None);
        assert_eq!(expression_suffix("N"), None);
        assert_eq!(strip_expression_suffix("24:02:01:02L"), "24:02:01:02");
    }
}
