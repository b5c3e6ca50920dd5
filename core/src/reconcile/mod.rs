//! Directory reconciliation: exact and fuzzy matching of two listings.

mod engine;
pub mod hash;
pub mod similarity;

pub use engine::{
    compare_directories, reconcile, BackendHasher, ComparisonReport, ContentHasher, EntryType,
    MatchKind, MatchRecord, Side, SimilarityThreshold, SizeDescriptor, SIZE_SIMILARITY_FLOOR,
};
pub use similarity::{name_similarity, size_similarity};
