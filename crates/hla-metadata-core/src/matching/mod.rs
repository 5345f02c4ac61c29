//! Matching information: group membership and the per-typing entries of a
//! versioned index.

pub mod builder;
pub mod groups;

pub use builder::{
    build_allele_entry, build_matching_entries, build_serology_entry, canonical_typings,
    serology_assignments, SerologyRelations,
};
pub use groups::{GroupKind, GroupMemberships, GroupTable};
