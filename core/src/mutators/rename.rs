//! Rule-driven batch renaming of a directory's entries.

use std::sync::OnceLock;

use chrono::{DateTime, Local};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::errors::CoreError;
use crate::report::{BatchReport, OperationResult};
use crate::storage::utils::{join_path, split_extension};
use crate::storage::{DirectoryEntry, StorageBackend};

pub const DEFAULT_DATE_FORMAT: &str = "%Y%m%d_";

fn numeric_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+[\s._-]*").expect("static regex is valid"))
}

fn special_chars_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s.-]").expect("static regex is valid"))
}

fn backref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\\(\d+)").expect("static regex is valid"))
}

/// Raw rename parameters as they arrive from a caller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RenameRequest {
    pub rule: String,
    pub pattern: Option<String>,
    pub replacement: Option<String>,
    pub text: Option<String>,
    pub format: Option<String>,
}

impl RenameRequest {
    pub fn new(rule: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            ..Default::default()
        }
    }
}

/// A validated rename rule.
#[derive(Debug, Clone)]
pub enum RenameRule {
    StripNumericPrefix,
    AddSequencePrefix,
    AddSequenceSuffix,
    AddPrefix(String),
    AddSuffix(String),
    StripSpecialChars,
    Lowercase,
    Uppercase,
    TitleCase,
    SpaceToUnderscore,
    UnderscoreToSpace,
    Regex { pattern: Regex, replacement: String },
    DateStamp { format: String },
    /// Unrecognized identifier; leaves every name unchanged.
    Unknown(String),
}

fn required_text(request: &RenameRequest) -> Result<String, CoreError> {
    match request.text.as_deref() {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(CoreError::InvalidInput(format!(
            "rule '{}' requires a non-empty text",
            request.rule
        ))),
    }
}

/// Accept `\1`-style group references alongside the native `${1}` form.
fn normalize_replacement(replacement: &str) -> String {
    backref_re().replace_all(replacement, "$${${1}}").into_owned()
}

fn validate_date_format(format: &str) -> Result<(), CoreError> {
    use chrono::format::{Item, StrftimeItems};
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(CoreError::InvalidInput(format!(
            "invalid date format '{format}'"
        )));
    }
    Ok(())
}

impl RenameRule {
    /// Validate a request. Bad regexes and missing arguments are rejected
    /// here, before anything touches storage.
    pub fn parse(request: &RenameRequest) -> Result<Self, CoreError> {
        let rule = match request.rule.as_str() {
            "strip_numeric_prefix" | "remove_number_prefix" => Self::StripNumericPrefix,
            "add_sequence_prefix" | "add_sequence" => Self::AddSequencePrefix,
            "add_sequence_suffix" => Self::AddSequenceSuffix,
            "add_prefix" => Self::AddPrefix(required_text(request)?),
            "add_suffix" => Self::AddSuffix(required_text(request)?),
            "strip_special_chars" | "remove_special_chars" => Self::StripSpecialChars,
            "lowercase" | "to_lowercase" => Self::Lowercase,
            "uppercase" | "to_uppercase" => Self::Uppercase,
            "title_case" => Self::TitleCase,
            "space_to_underscore" => Self::SpaceToUnderscore,
            "underscore_to_space" => Self::UnderscoreToSpace,
            "regex" => {
                let pattern = request
                    .pattern
                    .as_deref()
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| {
                        CoreError::InvalidInput("regex rule requires a pattern".to_string())
                    })?;
                let pattern = Regex::new(pattern).map_err(|e| {
                    CoreError::InvalidInput(format!("invalid regex '{pattern}': {e}"))
                })?;
                let replacement =
                    normalize_replacement(request.replacement.as_deref().unwrap_or(""));
                Self::Regex {
                    pattern,
                    replacement,
                }
            }
            "date_stamp" => {
                let format = request
                    .format
                    .clone()
                    .filter(|f| !f.is_empty())
                    .unwrap_or_else(|| DEFAULT_DATE_FORMAT.to_string());
                validate_date_format(&format)?;
                Self::DateStamp { format }
            }
            other => {
                warn!("Unknown rename rule '{}', names will be left unchanged", other);
                Self::Unknown(other.to_string())
            }
        };
        Ok(rule)
    }

    /// The new name for `entry`, which is `index`-th (1-based) in listing order.
    pub fn apply(&self, entry: &DirectoryEntry, index: usize) -> String {
        let name = entry.name.as_str();
        let (stem, ext) = split_extension(name);
        match self {
            Self::StripNumericPrefix => numeric_prefix_re().replace(name, "").into_owned(),
            Self::AddSequencePrefix => format!("{index:03}_{stem}{ext}"),
            Self::AddSequenceSuffix => format!("{stem}_{index:03}{ext}"),
            Self::AddPrefix(text) => format!("{text}{name}"),
            Self::AddSuffix(text) => format!("{stem}{text}{ext}"),
            Self::StripSpecialChars => special_chars_re().replace_all(name, "").into_owned(),
            Self::Lowercase => name.to_lowercase(),
            Self::Uppercase => name.to_uppercase(),
            Self::TitleCase => format!("{}{ext}", title_case(stem)),
            Self::SpaceToUnderscore => name.replace(' ', "_"),
            Self::UnderscoreToSpace => name.replace('_', " "),
            Self::Regex {
                pattern,
                replacement,
            } => pattern.replace_all(name, replacement.as_str()).into_owned(),
            Self::DateStamp { format } => {
                let stamp = modified_date(entry)
                    .unwrap_or_else(Local::now)
                    .format(format)
                    .to_string();
                if name.starts_with(&stamp) {
                    name.to_string()
                } else {
                    format!("{stamp}{name}")
                }
            }
            Self::Unknown(_) => name.to_string(),
        }
    }
}

fn modified_date(entry: &DirectoryEntry) -> Option<DateTime<Local>> {
    DateTime::parse_from_rfc3339(&entry.modified)
        .ok()
        .map(|dt| dt.with_timezone(&Local))
}

/// Uppercase the first letter of every word, lowercase the rest.
fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_word = false;
    for c in input.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

fn check_new_name(new_name: &str) -> Result<(), String> {
    if new_name.is_empty() {
        return Err("rename would produce an empty name".to_string());
    }
    if new_name == "." || new_name == ".." || new_name.contains('/') {
        return Err(format!("'{new_name}' is not a valid name"));
    }
    Ok(())
}

fn rename_one(
    backend: &dyn StorageBackend,
    dir: &str,
    entry: &DirectoryEntry,
    new_name: String,
) -> OperationResult {
    if let Err(message) = check_new_name(&new_name) {
        return OperationResult::failed(&entry.name, message);
    }

    let new_path = join_path(dir, &new_name);
    // A case-only change is the same entry on case-insensitive filesystems.
    let case_only = new_name.to_lowercase() == entry.name.to_lowercase();
    if !case_only && backend.exists(&new_path) {
        return OperationResult::failed(&entry.name, format!("{new_name} already exists"))
            .with_detail(new_name);
    }

    match backend.rename(&entry.path, &new_path) {
        Ok(()) => {
            debug!("Renamed {} -> {}", entry.name, new_name);
            OperationResult::ok(&entry.name, "renamed").with_detail(new_name)
        }
        Err(e) => {
            warn!("Rename of {} failed: {}", entry.path, e);
            OperationResult::failed(&entry.name, e.to_string()).with_detail(new_name)
        }
    }
}

/// Apply one rename rule to every entry of `dir`.
///
/// Sequence numbers follow listing order (by name, directories included),
/// starting at 1. Per-item failures are itemized; the call itself only fails
/// when the rule is invalid or the directory cannot be listed.
pub fn batch_rename(
    backend: &dyn StorageBackend,
    dir: &str,
    request: &RenameRequest,
) -> Result<BatchReport, CoreError> {
    let rule = RenameRule::parse(request)?;
    backend.ensure_ready()?;
    let entries = backend.list_dir(dir)?;

    info!(
        "Batch rename in {} ({}) with rule {}: {} entries",
        dir,
        backend.mode().as_str(),
        request.rule,
        entries.len()
    );

    let results = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let new_name = rule.apply(entry, i + 1);
            if new_name == entry.name {
                OperationResult::ok(&entry.name, "no rename needed")
            } else {
                rename_one(backend, dir, entry, new_name)
            }
        })
        .collect();

    Ok(BatchReport::from_results("Rename", results))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> DirectoryEntry {
        DirectoryEntry {
            path: format!("/d/{name}"),
            name: name.to_string(),
            size: 1,
            is_directory: false,
            modified: "2023-11-14T22:13:20Z".into(),
            permissions: None,
        }
    }

    fn rule(id: &str) -> RenameRule {
        RenameRule::parse(&RenameRequest::new(id)).unwrap()
    }

    fn apply(id: &str, name: &str) -> String {
        rule(id).apply(&entry(name), 1)
    }

    #[test]
    fn strip_numeric_prefix() {
        assert_eq!(apply("strip_numeric_prefix", "0012 - report.txt"), "report.txt");
        assert_eq!(apply("strip_numeric_prefix", "01.intro.mp4"), "intro.mp4");
        assert_eq!(apply("strip_numeric_prefix", "report.txt"), "report.txt");
        assert_eq!(apply("remove_number_prefix", "3_x"), "x");
    }

    #[test]
    fn sequence_numbers_are_zero_padded() {
        let r = rule("add_sequence_prefix");
        assert_eq!(r.apply(&entry("song.mp3"), 7), "007_song.mp3");
        let r = rule("add_sequence_suffix");
        assert_eq!(r.apply(&entry("song.mp3"), 12), "song_012.mp3");
        assert_eq!(r.apply(&entry("README"), 1), "README_001");
    }

    #[test]
    fn prefix_and_suffix_need_text() {
        assert!(matches!(
            RenameRule::parse(&RenameRequest::new("add_prefix")),
            Err(CoreError::InvalidInput(_))
        ));
        let request = RenameRequest {
            text: Some("_final".into()),
            ..RenameRequest::new("add_suffix")
        };
        let r = RenameRule::parse(&request).unwrap();
        assert_eq!(r.apply(&entry("draft.docx"), 1), "draft_final.docx");

        let request = RenameRequest {
            text: Some("old-".into()),
            ..RenameRequest::new("add_prefix")
        };
        let r = RenameRule::parse(&request).unwrap();
        assert_eq!(r.apply(&entry("draft.docx"), 1), "old-draft.docx");
    }

    #[test]
    fn character_rules() {
        assert_eq!(apply("strip_special_chars", "a(b)#c!.txt"), "abc.txt");
        assert_eq!(apply("lowercase", "MiXeD.TXT"), "mixed.txt");
        assert_eq!(apply("uppercase", "MiXeD.txt"), "MIXED.TXT");
        assert_eq!(apply("title_case", "the quick_fox.txt"), "The Quick_Fox.txt");
        assert_eq!(apply("space_to_underscore", "a b c.txt"), "a_b_c.txt");
        assert_eq!(apply("underscore_to_space", "a_b_c.txt"), "a b c.txt");
    }

    #[test]
    fn regex_rule_supports_both_backreference_styles() {
        let request = RenameRequest {
            pattern: Some(r"IMG_(\d+)".into()),
            replacement: Some(r"photo-\1".into()),
            ..RenameRequest::new("regex")
        };
        let r = RenameRule::parse(&request).unwrap();
        assert_eq!(r.apply(&entry("IMG_0042.jpg"), 1), "photo-0042.jpg");

        let request = RenameRequest {
            pattern: Some(r"(\w+)\.jpeg$".into()),
            replacement: Some("${1}.jpg".into()),
            ..RenameRequest::new("regex")
        };
        let r = RenameRule::parse(&request).unwrap();
        assert_eq!(r.apply(&entry("cat.jpeg"), 1), "cat.jpg");
    }

    #[test]
    fn regex_rule_rejects_missing_or_invalid_pattern() {
        assert!(matches!(
            RenameRule::parse(&RenameRequest::new("regex")),
            Err(CoreError::InvalidInput(_))
        ));
        let request = RenameRequest {
            pattern: Some("(unclosed".into()),
            ..RenameRequest::new("regex")
        };
        assert!(matches!(
            RenameRule::parse(&request),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn date_stamp_uses_modified_date() {
        let r = rule("date_stamp");
        let renamed = r.apply(&entry("scan.pdf"), 1);
        assert!(renamed.ends_with("_scan.pdf"));
        // 2023-11-14T22:13:20Z is the 14th or 15th depending on the local zone.
        assert!(renamed.starts_with("2023111"));

        // Already stamped names are left alone.
        assert_eq!(r.apply(&entry(&renamed), 1), renamed);
    }

    #[test]
    fn date_stamp_rejects_bad_format() {
        let request = RenameRequest {
            format: Some("%Q%".into()),
            ..RenameRequest::new("date_stamp")
        };
        assert!(matches!(
            RenameRule::parse(&request),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn unknown_rule_is_a_no_op() {
        let r = rule("reverse_letters");
        assert!(matches!(r, RenameRule::Unknown(_)));
        assert_eq!(r.apply(&entry("keep.me"), 1), "keep.me");
    }

    #[test]
    fn invalid_new_names_are_caught() {
        assert!(check_new_name("").is_err());
        assert!(check_new_name("..").is_err());
        assert!(check_new_name("a/b").is_err());
        assert!(check_new_name("fine.txt").is_ok());
    }
}
