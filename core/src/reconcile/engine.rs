use std::fmt;

use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use super::hash::{md5_hex, DEFAULT_CHUNK_SIZE};
use super::similarity::{name_similarity, size_similarity};
use crate::errors::{CoreError, FileError};
use crate::storage::{DirectoryEntry, StorageBackend};

/// Files must be at least this close in size to count as similar.
pub const SIZE_SIMILARITY_FLOOR: f64 = 0.9;

/// A name-similarity cutoff in `(0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityThreshold(f64);

impl SimilarityThreshold {
    pub fn new(value: f64) -> Result<Self, CoreError> {
        if value.is_finite() && value > 0.0 && value <= 1.0 {
            Ok(Self(value))
        } else {
            Err(CoreError::InvalidInput(format!(
                "similarity threshold must be in (0, 1], got {value}"
            )))
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Default for SimilarityThreshold {
    fn default() -> Self {
        Self(0.8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    Similar,
}

/// Size column of a match: `-` for directories, one size for exact file
/// matches, both sizes for similar ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeDescriptor {
    NotApplicable,
    Same(u64),
    Pair(u64, u64),
}

impl fmt::Display for SizeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotApplicable => f.write_str("-"),
            Self::Same(size) => write!(f, "{size}"),
            Self::Pair(a, b) => write!(f, "{a} / {b}"),
        }
    }
}

impl Serialize for SizeDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One pairing produced by reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    /// The shared name, or `"a ≈ b"` for similar matches.
    pub name: String,
    pub entry_type: EntryType,
    pub match_kind: MatchKind,
    pub path_a: String,
    pub path_b: String,
    pub size: SizeDescriptor,
    pub modified_a: String,
    pub modified_b: String,
    pub similarity: f64,
}

/// Which listing an entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

/// Hashes file contents on request during reconciliation.
pub trait ContentHasher {
    fn hash(&self, side: Side, entry: &DirectoryEntry) -> Result<String, FileError>;
}

/// [`ContentHasher`] that streams MD5 through each side's backend.
pub struct BackendHasher<'a> {
    a: &'a dyn StorageBackend,
    b: &'a dyn StorageBackend,
    chunk_size: usize,
}

impl<'a> BackendHasher<'a> {
    pub fn new(a: &'a dyn StorageBackend, b: &'a dyn StorageBackend) -> Self {
        Self {
            a,
            b,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl ContentHasher for BackendHasher<'_> {
    fn hash(&self, side: Side, entry: &DirectoryEntry) -> Result<String, FileError> {
        let backend = match side {
            Side::A => self.a,
            Side::B => self.b,
        };
        md5_hex(backend, &entry.path, self.chunk_size)
    }
}

fn entry_type(entry: &DirectoryEntry) -> EntryType {
    if entry.is_directory {
        EntryType::Directory
    } else {
        EntryType::File
    }
}

fn same_content(hasher: &dyn ContentHasher, a: &DirectoryEntry, b: &DirectoryEntry) -> bool {
    if a.size != b.size {
        return false;
    }
    let hashes = hasher
        .hash(Side::A, a)
        .and_then(|ha| hasher.hash(Side::B, b).map(|hb| (ha, hb)));
    match hashes {
        Ok((ha, hb)) => ha == hb,
        Err(e) => {
            warn!("Could not hash {} / {}: {}", a.path, b.path, e);
            false
        }
    }
}

/// Classify every pair of `a × b` as exact, similar, or unrelated.
///
/// Exact records come first, then similar ones, each in pair order. An
/// entry may appear in more than one record.
pub fn reconcile(
    a: &[DirectoryEntry],
    b: &[DirectoryEntry],
    threshold: SimilarityThreshold,
    hasher: &dyn ContentHasher,
) -> Vec<MatchRecord> {
    let mut exact = Vec::new();
    let mut similar = Vec::new();

    for ea in a {
        for eb in b {
            if ea.is_directory != eb.is_directory {
                continue;
            }

            if ea.name == eb.name {
                if ea.is_directory {
                    exact.push(MatchRecord {
                        name: ea.name.clone(),
                        entry_type: EntryType::Directory,
                        match_kind: MatchKind::Exact,
                        path_a: ea.path.clone(),
                        path_b: eb.path.clone(),
                        size: SizeDescriptor::NotApplicable,
                        modified_a: ea.modified.clone(),
                        modified_b: eb.modified.clone(),
                        similarity: 1.0,
                    });
                } else if same_content(hasher, ea, eb) {
                    exact.push(MatchRecord {
                        name: ea.name.clone(),
                        entry_type: EntryType::File,
                        match_kind: MatchKind::Exact,
                        path_a: ea.path.clone(),
                        path_b: eb.path.clone(),
                        size: SizeDescriptor::Same(ea.size),
                        modified_a: ea.modified.clone(),
                        modified_b: eb.modified.clone(),
                        similarity: 1.0,
                    });
                }
                continue;
            }

            let score = name_similarity(&ea.name, &eb.name);
            if score < threshold.value() {
                continue;
            }
            if !ea.is_directory && size_similarity(ea.size, eb.size) < SIZE_SIMILARITY_FLOOR {
                continue;
            }

            debug!("Similar: {} ~ {} ({:.3})", ea.name, eb.name, score);
            similar.push(MatchRecord {
                name: format!("{} ≈ {}", ea.name, eb.name),
                entry_type: entry_type(ea),
                match_kind: MatchKind::Similar,
                path_a: ea.path.clone(),
                path_b: eb.path.clone(),
                size: if ea.is_directory {
                    SizeDescriptor::NotApplicable
                } else {
                    SizeDescriptor::Pair(ea.size, eb.size)
                },
                modified_a: ea.modified.clone(),
                modified_b: eb.modified.clone(),
                similarity: score,
            });
        }
    }

    exact.extend(similar);
    exact
}

/// Result of [`compare_directories`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonReport {
    pub matches: Vec<MatchRecord>,
    pub exact_count: usize,
    pub similar_count: usize,
    pub message: String,
}

fn list_or_empty(backend: &dyn StorageBackend, path: &str) -> Vec<DirectoryEntry> {
    match backend.list_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(
                "Listing {} ({}) failed, comparing as empty: {}",
                path,
                backend.mode().as_str(),
                e
            );
            Vec::new()
        }
    }
}

/// Compare two directories, each through its own backend.
///
/// The threshold is validated before any I/O. Both backends must be ready;
/// a listing that fails afterwards is treated as empty.
pub fn compare_directories(
    backend_a: &dyn StorageBackend,
    path_a: &str,
    backend_b: &dyn StorageBackend,
    path_b: &str,
    threshold: f64,
    chunk_size: usize,
) -> Result<ComparisonReport, CoreError> {
    let threshold = SimilarityThreshold::new(threshold)?;

    backend_a.ensure_ready()?;
    backend_b.ensure_ready()?;

    info!(
        "Comparing {} ({}) with {} ({}) at threshold {}",
        path_a,
        backend_a.mode().as_str(),
        path_b,
        backend_b.mode().as_str(),
        threshold.value()
    );

    let listing_a = list_or_empty(backend_a, path_a);
    let listing_b = list_or_empty(backend_b, path_b);

    let hasher = BackendHasher::new(backend_a, backend_b).with_chunk_size(chunk_size);
    let matches = reconcile(&listing_a, &listing_b, threshold, &hasher);

    let exact_count = matches
        .iter()
        .filter(|m| m.match_kind == MatchKind::Exact)
        .count();
    let similar_count = matches.len() - exact_count;

    Ok(ComparisonReport {
        message: format!("Found {exact_count} exact and {similar_count} similar matches"),
        matches,
        exact_count,
        similar_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct TableHasher(HashMap<String, Result<String, ()>>);

    impl TableHasher {
        fn new(pairs: &[(&str, &str)]) -> Self {
            Self(
                pairs
                    .iter()
                    .map(|(p, h)| (p.to_string(), Ok(h.to_string())))
                    .collect(),
            )
        }

        fn failing(mut self, path: &str) -> Self {
            self.0.insert(path.to_string(), Err(()));
            self
        }
    }

    impl ContentHasher for TableHasher {
        fn hash(&self, _side: Side, entry: &DirectoryEntry) -> Result<String, FileError> {
            match self.0.get(&entry.path) {
                Some(Ok(h)) => Ok(h.clone()),
                Some(Err(())) => Err(FileError::PermissionDenied(entry.path.clone())),
                None => Err(FileError::NotFound(entry.path.clone())),
            }
        }
    }

    fn file(dir: &str, name: &str, size: u64) -> DirectoryEntry {
        DirectoryEntry {
            path: format!("{dir}/{name}"),
            name: name.to_string(),
            size,
            is_directory: false,
            modified: "2024-05-01T10:00:00Z".into(),
            permissions: None,
        }
    }

    fn dir(parent: &str, name: &str) -> DirectoryEntry {
        DirectoryEntry {
            is_directory: true,
            size: 0,
            ..file(parent, name, 0)
        }
    }

    fn t(v: f64) -> SimilarityThreshold {
        SimilarityThreshold::new(v).unwrap()
    }

    #[test]
    fn threshold_bounds() {
        assert!(SimilarityThreshold::new(1.0).is_ok());
        assert!(SimilarityThreshold::new(0.01).is_ok());
        assert!(matches!(
            SimilarityThreshold::new(0.0),
            Err(CoreError::InvalidInput(_))
        ));
        assert!(SimilarityThreshold::new(1.5).is_err());
        assert!(SimilarityThreshold::new(f64::NAN).is_err());
        assert_eq!(SimilarityThreshold::default().value(), 0.8);
    }

    #[test]
    fn identical_files_match_exactly() {
        let a = vec![file("/a", "photo.jpg", 1000)];
        let b = vec![file("/b", "photo.jpg", 1000)];
        let hasher = TableHasher::new(&[("/a/photo.jpg", "h1"), ("/b/photo.jpg", "h1")]);

        let matches = reconcile(&a, &b, t(0.8), &hasher);
        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!(m.match_kind, MatchKind::Exact);
        assert_eq!(m.entry_type, EntryType::File);
        assert_eq!(m.size.to_string(), "1000");
        assert_eq!(m.similarity, 1.0);
    }

    #[test]
    fn same_name_different_size_is_not_matched() {
        let a = vec![file("/a", "photo.jpg", 1000)];
        let b = vec![file("/b", "photo.jpg", 999)];
        let hasher = TableHasher::new(&[("/a/photo.jpg", "h1"), ("/b/photo.jpg", "h1")]);
        assert!(reconcile(&a, &b, t(0.8), &hasher).is_empty());
    }

    #[test]
    fn same_name_different_hash_has_no_fuzzy_fallback() {
        let a = vec![file("/a", "notes.txt", 10)];
        let b = vec![file("/b", "notes.txt", 10)];
        let hasher = TableHasher::new(&[("/a/notes.txt", "x"), ("/b/notes.txt", "y")]);
        assert!(reconcile(&a, &b, t(0.1), &hasher).is_empty());
    }

    #[test]
    fn failed_hash_drops_the_pair() {
        let a = vec![file("/a", "locked.bin", 10)];
        let b = vec![file("/b", "locked.bin", 10)];
        let hasher = TableHasher::new(&[("/b/locked.bin", "x")]).failing("/a/locked.bin");
        assert!(reconcile(&a, &b, t(0.8), &hasher).is_empty());
    }

    #[test]
    fn directories_match_without_hashing() {
        let a = vec![dir("/a", "src")];
        let b = vec![dir("/b", "src")];
        // An empty table would fail any hash request.
        let matches = reconcile(&a, &b, t(0.8), &TableHasher::new(&[]));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].entry_type, EntryType::Directory);
        assert_eq!(matches[0].size.to_string(), "-");
    }

    #[test]
    fn same_name_different_type_never_matches() {
        let a = vec![dir("/a", "build")];
        let b = vec![file("/b", "build", 0)];
        assert!(reconcile(&a, &b, t(0.1), &TableHasher::new(&[])).is_empty());
    }

    #[test]
    fn numbered_series_respects_penalty() {
        let a = vec![file("/a", "report_v1.txt", 500)];
        let b = vec![file("/b", "report_v2.txt", 520)];
        let hasher = TableHasher::new(&[]);

        assert!(reconcile(&a, &b, t(0.8), &hasher).is_empty());

        let matches = reconcile(&a, &b, t(0.7), &hasher);
        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!(m.match_kind, MatchKind::Similar);
        assert_eq!(m.name, "report_v1.txt ≈ report_v2.txt");
        assert_eq!(m.size.to_string(), "500 / 520");
        assert!((m.similarity - 16.0 / 18.0 * 0.8).abs() < 1e-9);
    }

    #[test]
    fn threshold_is_inclusive() {
        let a = vec![dir("/a", "abcd")];
        let b = vec![dir("/b", "bcde")];
        // ratio("abcd", "bcde") is exactly 0.75
        let matches = reconcile(&a, &b, t(0.75), &TableHasher::new(&[]));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].size, SizeDescriptor::NotApplicable);
    }

    #[test]
    fn similar_files_need_close_sizes() {
        let a = vec![file("/a", "holiday.jpg", 1000)];
        let b = vec![file("/b", "holiday.png", 500)];
        assert!(reconcile(&a, &b, t(0.8), &TableHasher::new(&[])).is_empty());
    }

    #[test]
    fn exact_records_precede_similar_ones() {
        let a = vec![file("/a", "alpha.txt", 100), file("/a", "data.csv", 10)];
        let b = vec![file("/b", "alpha.md", 100), file("/b", "data.csv", 10)];
        let hasher = TableHasher::new(&[("/a/data.csv", "d"), ("/b/data.csv", "d")]);

        let matches = reconcile(&a, &b, t(0.9), &hasher);
        let kinds: Vec<_> = matches.iter().map(|m| m.match_kind).collect();
        assert_eq!(kinds, [MatchKind::Exact, MatchKind::Similar]);
        assert_eq!(matches[1].name, "alpha.txt ≈ alpha.md");
    }

    #[test]
    fn one_entry_may_match_several_partners() {
        let a = vec![dir("/a", "photos")];
        let b = vec![dir("/b", "Photos"), dir("/b", "photos_")];
        let matches = reconcile(&a, &b, t(0.8), &TableHasher::new(&[]));
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|m| m.path_a == "/a/photos"));
    }

    #[test]
    fn swapping_sides_keeps_exact_matches() {
        let a = vec![file("/a", "x.bin", 3), dir("/a", "lib"), file("/a", "only_a", 1)];
        let b = vec![dir("/b", "lib"), file("/b", "x.bin", 3)];
        let hasher = TableHasher::new(&[("/a/x.bin", "h"), ("/b/x.bin", "h")]);

        let key = |ms: Vec<MatchRecord>| {
            let mut v: Vec<_> = ms
                .into_iter()
                .filter(|m| m.match_kind == MatchKind::Exact)
                .map(|m| (m.name, m.entry_type == EntryType::Directory))
                .collect();
            v.sort();
            v
        };
        assert_eq!(
            key(reconcile(&a, &b, t(0.8), &hasher)),
            key(reconcile(&b, &a, t(0.8), &hasher))
        );
    }

    #[test]
    fn match_record_serializes_size_as_string() {
        let a = vec![file("/a", "report_v1.txt", 500)];
        let b = vec![file("/b", "report_v2.txt", 520)];
        let matches = reconcile(&a, &b, t(0.7), &TableHasher::new(&[]));
        let json = serde_json::to_value(&matches[0]).unwrap();
        assert_eq!(json["size"], "500 / 520");
        assert_eq!(json["matchKind"], "similar");
        assert_eq!(json["entryType"], "file");
    }
}
