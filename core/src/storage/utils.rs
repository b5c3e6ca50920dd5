//! Path and timestamp helpers shared by both storage providers.

use chrono::DateTime;

/// Format seconds since the Unix epoch as an ISO 8601 UTC timestamp.
///
/// Returns an empty string for values chrono cannot represent.
pub fn chrono_from_epoch(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_default()
}

/// Convert native separators to the canonical forward-slash form.
pub fn normalize_path_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Join a directory and a child name with exactly one `/` between them.
pub fn join_path(dir: &str, name: &str) -> String {
    let dir = normalize_path_separators(dir);
    if dir.is_empty() {
        return name.to_string();
    }
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Last path component, ignoring trailing separators.
pub fn base_name(path: &str) -> String {
    let normalized = normalize_path_separators(path);
    let trimmed = normalized.trim_end_matches('/');
    trimmed
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(trimmed)
        .to_string()
}

/// Split a file name into stem and extension (extension includes the dot).
///
/// A leading dot does not start an extension, so `.bashrc` has none.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if name[..idx].chars().any(|c| c != '.') => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}

/// Every proper ancestor of `path` from the top down, then `path` itself.
///
/// `"/a/b/c"` yields `["/a", "/a/b", "/a/b/c"]`; relative paths keep their
/// leading component.
pub fn ancestors_top_down(path: &str) -> Vec<String> {
    let normalized = normalize_path_separators(path);
    let absolute = normalized.starts_with('/');
    let mut current = String::new();
    let mut result = Vec::new();
    for part in normalized.split('/').filter(|p| !p.is_empty()) {
        if !current.is_empty() || absolute {
            current.push('/');
        }
        current.push_str(part);
        result.push(current.clone());
    }
    result
}

/// Format a Unix mode into `rwxrwxrwx`.
pub fn format_permissions(mode: u32) -> String {
    let flags = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ];
    flags
        .iter()
        .map(|&(bit, c)| if mode & bit != 0 { c } else { '-' })
        .collect()
}
