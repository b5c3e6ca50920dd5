//! End-to-end directory comparison on the local filesystem.

mod common;

use common::{build_tree, slash};
use dirbridge_core::errors::{CoreError, ErrorKind};
use dirbridge_core::reconcile::{compare_directories, EntryType, MatchKind};
use dirbridge_core::storage::LocalBackend;
use tempfile::TempDir;

const CHUNK: usize = 4096;

fn compare(a: &TempDir, b: &TempDir, threshold: f64) -> dirbridge_core::reconcile::ComparisonReport {
    let backend = LocalBackend::new();
    compare_directories(
        &backend,
        &slash(a.path()),
        &backend,
        &slash(b.path()),
        threshold,
        CHUNK,
    )
    .expect("comparison should succeed")
}

#[test]
fn identical_photo_is_an_exact_match() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    let photo = vec![0xABu8; 1000];
    build_tree(a.path(), &[("photo.jpg", &photo)], &[]);
    build_tree(b.path(), &[("photo.jpg", &photo)], &[]);

    let report = compare(&a, &b, 0.8);
    assert_eq!(report.exact_count, 1);
    assert_eq!(report.similar_count, 0);
    let m = &report.matches[0];
    assert_eq!(m.name, "photo.jpg");
    assert_eq!(m.size.to_string(), "1000");
    assert!(!m.modified_a.is_empty());
}

#[test]
fn one_byte_difference_in_size_means_no_match() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    build_tree(a.path(), &[("photo.jpg", &[1u8; 1000])], &[]);
    build_tree(b.path(), &[("photo.jpg", &[1u8; 999])], &[]);

    let report = compare(&a, &b, 0.8);
    assert!(report.matches.is_empty());
}

#[test]
fn same_size_different_content_is_not_exact() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    build_tree(a.path(), &[("data.bin", &[1u8; 5000])], &[]);
    build_tree(b.path(), &[("data.bin", &[2u8; 5000])], &[]);

    let report = compare(&a, &b, 0.5);
    assert!(report.matches.is_empty());
}

#[test]
fn versioned_reports_depend_on_threshold() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    build_tree(a.path(), &[("report_v1.txt", &[b'a'; 500])], &[]);
    build_tree(b.path(), &[("report_v2.txt", &[b'b'; 520])], &[]);

    assert!(compare(&a, &b, 0.8).matches.is_empty());

    let report = compare(&a, &b, 0.7);
    assert_eq!(report.similar_count, 1);
    let m = &report.matches[0];
    assert_eq!(m.match_kind, MatchKind::Similar);
    assert_eq!(m.name, "report_v1.txt ≈ report_v2.txt");
    assert_eq!(m.size.to_string(), "500 / 520");
}

#[test]
fn directories_are_matched_by_name_and_type() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    build_tree(a.path(), &[("music", b"not a dir")], &["photos", "docs"]);
    build_tree(b.path(), &[], &["photos", "music"]);

    let report = compare(&a, &b, 0.95);
    assert_eq!(report.exact_count, 1);
    assert_eq!(report.matches[0].name, "photos");
    assert_eq!(report.matches[0].entry_type, EntryType::Directory);
    assert_eq!(report.matches[0].size.to_string(), "-");
}

#[test]
fn unreadable_side_compares_as_empty() {
    let a = TempDir::new().unwrap();
    build_tree(a.path(), &[("x.txt", b"x")], &[]);

    let backend = LocalBackend::new();
    let report = compare_directories(
        &backend,
        &slash(a.path()),
        &backend,
        "/definitely/not/here",
        0.8,
        CHUNK,
    )
    .unwrap();
    assert!(report.matches.is_empty());
    assert_eq!(report.message, "Found 0 exact and 0 similar matches");
}

#[test]
fn out_of_range_threshold_is_invalid_input() {
    let backend = LocalBackend::new();
    for bad in [0.0, -0.5, 1.01] {
        let err = compare_directories(&backend, "/", &backend, "/", bad, CHUNK).unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}

#[test]
fn swapping_sides_preserves_exact_matches() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    build_tree(
        a.path(),
        &[("same.txt", b"same"), ("only_a.txt", b"a")],
        &["shared"],
    );
    build_tree(b.path(), &[("same.txt", b"same")], &["shared", "only_b"]);

    let exact = |report: dirbridge_core::reconcile::ComparisonReport| {
        let mut v: Vec<(String, EntryType)> = report
            .matches
            .into_iter()
            .filter(|m| m.match_kind == MatchKind::Exact)
            .map(|m| (m.name, m.entry_type))
            .collect();
        v.sort_by(|x, y| x.0.cmp(&y.0));
        v
    };
    assert_eq!(exact(compare(&a, &b, 0.8)), exact(compare(&b, &a, 0.8)));
}
