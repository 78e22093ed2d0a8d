// src/heuristics.rs

//! Guess a library's version and archive type from its download URL.
//!
//! Declarations in the short form (a bare URL string) carry no explicit
//! version or archive type. This module fills both in by pattern-matching
//! the URL; absence of a match is not an error, it just yields the
//! defaults.

use crate::manifest::ArchiveType;
use regex::Regex;
use std::sync::OnceLock;

/// Default version when none can be derived; stable so diffing works.
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Version token followed by a recognized archive extension, allowing a
/// trailing query string, fragment or path suffix.
fn version_and_type_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(v?[\d.]{2,}).+(zip|rar|tgz|tar(?:\.(?:gz|bz2))?)([?#/].*)?$")
            .expect("version/type pattern is valid")
    })
}

/// Archive extension alone, for URLs carrying no version token.
fn type_only_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\.(zip|rar|tgz|tar(?:\.(?:gz|bz2))?)([?#/].*)?$")
            .expect("type pattern is valid")
    })
}

/// Guess `(version, archive_type)` from a URL.
///
/// Pure and infallible: URLs that match nothing yield
/// (`DEFAULT_VERSION`, zip).
pub fn guess_from_url(url: &str) -> (String, ArchiveType) {
    if let Some(caps) = version_and_type_re().captures(url) {
        let version = caps[1].to_string();
        let archive_type = normalize_extension(&caps[2]);
        return (version, archive_type);
    }

    if let Some(caps) = type_only_re().captures(url) {
        return (DEFAULT_VERSION.to_string(), normalize_extension(&caps[1]));
    }

    (DEFAULT_VERSION.to_string(), ArchiveType::Zip)
}

/// Map a matched extension to an archive type: `tar.gz`/`tar.bz2` collapse
/// to `tar`, `tgz` is normalized to `tar`.
fn normalize_extension(extension: &str) -> ArchiveType {
    let base = extension.split('.').next().unwrap_or(extension);
    match base {
        "tgz" => ArchiveType::Tar,
        other => ArchiveType::from_name(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_version_and_type() {
        let (version, archive_type) = guess_from_url("https://example.com/lib-v2.3.zip");
        assert_eq!(version, "v2.3");
        assert_eq!(archive_type, ArchiveType::Zip);
    }

    #[test]
    fn test_guess_bare_version() {
        let (version, archive_type) = guess_from_url("https://example.com/widget/1.2.3.tar.gz");
        assert_eq!(version, "1.2.3");
        assert_eq!(archive_type, ArchiveType::Tar);
    }

    #[test]
    fn test_guess_tgz_normalizes_to_tar() {
        let (version, archive_type) = guess_from_url("https://example.com/lib.tgz");
        assert_eq!(version, DEFAULT_VERSION);
        assert_eq!(archive_type, ArchiveType::Tar);
    }

    #[test]
    fn test_guess_no_match_yields_defaults() {
        let (version, archive_type) = guess_from_url("https://example.com/no-version-here");
        assert_eq!(version, "1.0.0");
        assert_eq!(archive_type, ArchiveType::Zip);
    }

    #[test]
    fn test_guess_allows_trailing_query() {
        let (version, archive_type) =
            guess_from_url("https://example.com/lib-3.1.4.zip?token=abc#frag");
        assert_eq!(version, "3.1.4");
        assert_eq!(archive_type, ArchiveType::Zip);
    }

    #[test]
    fn test_guess_rar() {
        let (version, archive_type) = guess_from_url("https://example.com/pack-9.0.rar");
        assert_eq!(version, "9.0");
        assert_eq!(archive_type, ArchiveType::Rar);
    }
}
