//! Name and size similarity scores used for fuzzy matching.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::storage::utils::split_extension;

/// Penalty applied when two names carry different numbers.
pub const NUMBER_MISMATCH_PENALTY: f64 = 0.8;

fn digit_runs_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("static regex is valid"))
}

/// Ratcliff/Obershelp similarity: `2 * M / (|a| + |b|)` where `M` is the
/// number of characters in the recursively found longest common blocks.
///
/// Two empty strings are identical (1.0).
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matched = SequenceMatcher::new(&a, &b).matched_chars();
    2.0 * matched as f64 / total as f64
}

struct SequenceMatcher<'a> {
    a: &'a [char],
    b: &'a [char],
    b2j: HashMap<char, Vec<usize>>,
}

impl<'a> SequenceMatcher<'a> {
    fn new(a: &'a [char], b: &'a [char]) -> Self {
        let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, c) in b.iter().enumerate() {
            b2j.entry(*c).or_default().push(j);
        }
        Self { a, b, b2j }
    }

    /// Longest block `a[i..i+k] == b[j..j+k]` inside the given window.
    /// Ties resolve to the earliest `i`, then the earliest `j`.
    fn longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> (usize, usize, usize) {
        let (mut best_i, mut best_j, mut best_k) = (alo, blo, 0);
        let mut j2len: HashMap<usize, usize> = HashMap::new();

        for i in alo..ahi {
            let mut next: HashMap<usize, usize> = HashMap::new();
            if let Some(positions) = self.b2j.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j
                        .checked_sub(1)
                        .and_then(|prev| j2len.get(&prev))
                        .copied()
                        .unwrap_or(0)
                        + 1;
                    next.insert(j, k);
                    if k > best_k {
                        best_i = i + 1 - k;
                        best_j = j + 1 - k;
                        best_k = k;
                    }
                }
            }
            j2len = next;
        }
        (best_i, best_j, best_k)
    }

    fn matched_chars(&self) -> usize {
        let mut total = 0;
        let mut queue = vec![(0, self.a.len(), 0, self.b.len())];
        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let (i, j, k) = self.longest_match(alo, ahi, blo, bhi);
            if k == 0 {
                continue;
            }
            total += k;
            if alo < i && blo < j {
                queue.push((alo, i, blo, j));
            }
            if i + k < ahi && j + k < bhi {
                queue.push((i + k, ahi, j + k, bhi));
            }
        }
        total
    }
}

/// Similarity of two file names, ignoring extensions and case.
///
/// Names whose digit runs differ (`v1` vs `v2`) are pushed apart by
/// [`NUMBER_MISMATCH_PENALTY`], so numbered series do not collapse into
/// one another.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let stem_a = split_extension(a).0.to_lowercase();
    let stem_b = split_extension(b).0.to_lowercase();

    let mut score = sequence_ratio(&stem_a, &stem_b);

    let runs_a: Vec<&str> = digit_runs_re().find_iter(&stem_a).map(|m| m.as_str()).collect();
    let runs_b: Vec<&str> = digit_runs_re().find_iter(&stem_b).map(|m| m.as_str()).collect();
    if !runs_a.is_empty() && !runs_b.is_empty() && runs_a != runs_b {
        score *= NUMBER_MISMATCH_PENALTY;
    }
    score
}

/// `min / max` of two sizes; two empty files are identical, an empty file
/// is unrelated to a non-empty one.
pub fn size_similarity(a: u64, b: u64) -> f64 {
    match (a, b) {
        (0, 0) => 1.0,
        (0, _) | (_, 0) => 0.0,
        _ => a.min(b) as f64 / a.max(b) as f64,
    }
}
