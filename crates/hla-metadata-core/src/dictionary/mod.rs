//! Metadata dictionary façade: versioned indexes behind a single-flight cache.

pub mod cache;
pub mod index;

pub use cache::{BuildState, MetadataDictionary};
pub use index::{BuildReport, HlaMetadataIndex};
