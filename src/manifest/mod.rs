// src/manifest/mod.rs

//! Manifest data model and multi-source merge.
//!
//! A manifest maps library names to resolved definitions. Several sources
//! contribute raw declarations (the project file first, then any included
//! source files); the merge folds them into one manifest with a strict
//! first-writer-wins policy so the primary project always acts as the
//! source of truth for a library's version.

pub mod diff;
pub mod store;

use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::heuristics;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Schema version of the persisted state document. A stored document with
/// any other value is discarded wholesale, forcing a full reinstall.
pub const SCHEMA_VERSION: &str = "1.1";

/// Archive format of a library's distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveType {
    Zip,
    Rar,
    Tar,
    /// Any other type string; preserved verbatim for the downloader
    Other(String),
}

impl ArchiveType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "zip" => ArchiveType::Zip,
            "rar" => ArchiveType::Rar,
            "tar" => ArchiveType::Tar,
            other => ArchiveType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ArchiveType::Zip => "zip",
            ArchiveType::Rar => "rar",
            ArchiveType::Tar => "tar",
            ArchiveType::Other(name) => name,
        }
    }
}

impl fmt::Display for ArchiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ArchiveType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ArchiveType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(ArchiveType::from_name(&name))
    }
}

/// One resolved library entry. The library name is the manifest map key and
/// is not repeated here. Field names follow the persisted document format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryDefinition {
    pub version: String,
    pub url: String,
    #[serde(rename = "type")]
    pub archive_type: ArchiveType,
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rename: BTreeMap<String, String>,
    #[serde(
        rename = "shasum",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub checksum: Option<String>,
    #[serde(rename = "package")]
    pub source_package: String,
}

/// The schema-versioned record of all libraries considered installed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "schema-version")]
    pub schema_version: String,
    #[serde(default)]
    pub installed: BTreeMap<String, LibraryDefinition>,
}

impl Manifest {
    /// An empty manifest at the current schema version.
    pub fn empty() -> Self {
        Manifest {
            schema_version: SCHEMA_VERSION.to_string(),
            installed: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.installed.is_empty()
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Manifest::empty()
    }
}

/// A raw library entry as authored by a contributing source: either a bare
/// URL string, or a structured object with explicit overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SourceDeclaration {
    Url(String),
    Detailed {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        version: Option<String>,
        #[serde(rename = "type", default)]
        archive_type: Option<ArchiveType>,
        #[serde(default)]
        ignore: Vec<String>,
        #[serde(default)]
        rename: BTreeMap<String, String>,
        #[serde(default)]
        shasum: Option<String>,
    },
}

impl SourceDeclaration {
    /// Resolve a raw declaration into a full definition. Heuristic version
    /// and archive type are derived from the URL and overridden by any
    /// explicit fields. A structured declaration without a URL is a
    /// configuration error.
    pub fn resolve(&self, library: &str, source_package: &str) -> Result<LibraryDefinition> {
        match self {
            SourceDeclaration::Url(url) => {
                let (version, archive_type) = heuristics::guess_from_url(url);
                Ok(LibraryDefinition {
                    version,
                    url: url.clone(),
                    archive_type,
                    ignore: Vec::new(),
                    rename: BTreeMap::new(),
                    checksum: None,
                    source_package: source_package.to_string(),
                })
            }
            SourceDeclaration::Detailed {
                url,
                version,
                archive_type,
                ignore,
                rename,
                shasum,
            } => {
                let url = match url.as_deref() {
                    Some(url) if !url.is_empty() => url.to_string(),
                    _ => {
                        return Err(Error::InvalidDeclaration {
                            library: library.to_string(),
                            package: source_package.to_string(),
                        });
                    }
                };
                let (guessed_version, guessed_type) = heuristics::guess_from_url(&url);
                Ok(LibraryDefinition {
                    version: version.clone().unwrap_or(guessed_version),
                    archive_type: archive_type.clone().unwrap_or(guessed_type),
                    url,
                    ignore: ignore.clone(),
                    rename: rename.clone(),
                    checksum: shasum.clone(),
                    source_package: source_package.to_string(),
                })
            }
        }
    }
}

/// Fold one source's declarations into the merged manifest map.
///
/// Declarations for names already present are skipped with a warning
/// naming both contributors and both URLs; the first declaration always
/// wins. An invalid declaration aborts the merge.
pub fn merge_source(
    processed: &mut BTreeMap<String, LibraryDefinition>,
    source_package: &str,
    declarations: &BTreeMap<String, SourceDeclaration>,
    diagnostics: &mut Diagnostics,
) -> Result<()> {
    for (library, declaration) in declarations {
        let definition = declaration.resolve(library, source_package)?;

        if let Some(existing) = processed.get(library) {
            diagnostics.warn(format!(
                "Library {library} [{existing_url}] already declared by {existing_package}, \
                 ({library} [{new_url}] from {source_package} also attempts to declare one). Skipping...",
                existing_url = existing.url,
                existing_package = existing.source_package,
                new_url = definition.url,
            ));
        } else {
            processed.insert(library.clone(), definition);
        }
    }
    Ok(())
}
