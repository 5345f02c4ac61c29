//! Typing grammar: classification of raw typing strings and field-level
//! string helpers.

pub mod classifier;
pub mod splitter;

pub use classifier::{classify, normalize_typing, split_allele_string};
