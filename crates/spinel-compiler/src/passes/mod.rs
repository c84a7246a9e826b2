//! Optimization passes over the Spinel IR.

mod canonicalize_all_gather;

pub use canonicalize_all_gather::CanonicalizeAllGatherForCse;
