//! Placeholder and home-directory expansion for user-supplied settings.

use std::sync::OnceLock;

use regex::Regex;

fn env_placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{env:([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex is valid")
    })
}

/// Replace every `${env:NAME}` with the value of `NAME`, or an empty string
/// when the variable is unset.
pub fn expand_env_placeholders(input: &str) -> String {
    env_placeholder()
        .replace_all(input, |caps: &regex::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

/// Expand a leading `~` to the current user's home directory.
pub fn expand_tilde(input: &str) -> String {
    shellexpand::tilde(input).into_owned()
}
