//! HLA nomenclature metadata dictionary.
//!
//! Classifies raw HLA typing strings, resolves allele names across
//! nomenclature versions and serves per-version matching information
//! (P groups, G groups and serologies) from lazily built, cached indexes.
//! With the `python` feature the crate also compiles as the
//! `hla_metadata_core` Python extension module.

pub mod config;
pub mod dictionary;
pub mod errors;
pub mod matching;
pub mod models;
pub mod resolver;
pub mod source;
pub mod typing;

#[cfg(feature = "python")]
mod python;

pub use config::DictionaryConfig;
pub use dictionary::{BuildReport, BuildState, HlaMetadataIndex, MetadataDictionary};
pub use errors::{HlaError, HlaResult};
pub use models::{HlaTypingCategory, Locus, MatchingDictionaryEntry};
pub use typing::classify;
