//! Error types for the HLA metadata dictionary.

/// Top-level error enum for the HLA metadata dictionary.
///
/// A well-formed typing that has no entry in a given nomenclature version is
/// not an error: lookups return `None` and expansions return an empty list.
#[derive(Debug, thiserror::Error)]
pub enum HlaError {
    #[error("Invalid HLA format: {typing:?}")]
    InvalidHlaFormat { typing: String },

    #[error("Nomenclature data unavailable for version {version}: {reason}")]
    DataUnavailable { version: String, reason: String },

    #[error("Allele rename history {hla_id} at locus {locus} has no resolvable current name")]
    AmbiguousHistoryUnresolved { locus: String, hla_id: String },

    #[error("Index build failed for version {version}: {reason}")]
    BuildFailed { version: String, reason: String },

    #[error("Unknown locus: {locus:?}")]
    UnknownLocus { locus: String },

    #[error("Unknown NMDP code: {code:?}")]
    UnknownNmdpCode { code: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HlaError {
    pub fn invalid_format(typing: &str) -> Self {
        HlaError::InvalidHlaFormat {
            typing: typing.to_string(),
        }
    }

    pub fn data_unavailable(version: &str, reason: impl Into<String>) -> Self {
        HlaError::DataUnavailable {
            version: version.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(feature = "python")]
impl From<HlaError> for pyo3::PyErr {
    fn from(err: HlaError) -> pyo3::PyErr {
        use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
        match &err {
            HlaError::InvalidHlaFormat { .. }
            | HlaError::UnknownLocus { .. }
            | HlaError::UnknownNmdpCode { .. } => PyValueError::new_err(err.to_string()),
            HlaError::DataUnavailable { .. }
            | HlaError::AmbiguousHistoryUnresolved { .. }
            | HlaError::BuildFailed { .. } => PyRuntimeError::new_err(err.to_string()),
            HlaError::Io(_) => PyIOError::new_err(err.to_string()),
            HlaError::Json(_) => PyValueError::new_err(err.to_string()),
        }
    }
}

pub type HlaResult<T> = Result<T, HlaError>;
