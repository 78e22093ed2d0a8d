// src/manifest/store.rs

//! Persistence for the installed-libraries state document.
//!
//! The document is read once at the start of a reconciliation pass and
//! fully replaced at the end. Writes go through a temp file in the target
//! directory followed by a rename, so the document is never left
//! partially written.

use crate::error::Result;
use crate::manifest::{Manifest, SCHEMA_VERSION};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Load the persisted manifest.
///
/// An absent file yields an empty manifest. A stored document whose
/// `schema-version` differs from [`SCHEMA_VERSION`] is discarded entirely,
/// which forces every merged library back through the install path.
pub fn load(path: &Path) -> Result<Manifest> {
    if !path.exists() {
        debug!("No state file at {}, starting empty", path.display());
        return Ok(Manifest::empty());
    }

    let raw = fs::read_to_string(path)?;
    let document: serde_json::Value = serde_json::from_str(&raw)?;

    match document.get("schema-version").and_then(|v| v.as_str()) {
        Some(version) if version == SCHEMA_VERSION => {
            let manifest: Manifest = serde_json::from_value(document)?;
            debug!(
                "Loaded {} installed libraries from {}",
                manifest.installed.len(),
                path.display()
            );
            Ok(manifest)
        }
        stored => {
            warn!(
                "State file {} has schema version {:?}, expected {}; discarding installed state",
                path.display(),
                stored,
                SCHEMA_VERSION
            );
            Ok(Manifest::empty())
        }
    }
}

/// Atomically replace the persisted manifest with `manifest`.
pub fn save(path: &Path, manifest: &Manifest) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    let content = serde_json::to_string_pretty(manifest)?;
    tmp.write_all(content.as_bytes())?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    debug!(
        "Wrote {} installed libraries to {}",
        manifest.installed.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ArchiveType, LibraryDefinition};
    use std::collections::BTreeMap;

    fn sample_manifest() -> Manifest {
        let mut manifest = Manifest::empty();
        manifest.installed.insert(
            "chosen".to_string(),
            LibraryDefinition {
                version: "v1.9.0".to_string(),
                url: "https://example.com/chosen-v1.9.0.zip".to_string(),
                archive_type: ArchiveType::Zip,
                ignore: Vec::new(),
                rename: BTreeMap::new(),
                checksum: None,
                source_package: "acme/site".to_string(),
            },
        );
        manifest
    }

    #[test]
    fn test_load_absent_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = load(&dir.path().join("missing.json")).unwrap();
        assert!(manifest.is_empty());
        assert_eq!(manifest.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/.installed-libraries.json");

        let manifest = sample_manifest();
        save(&path, &manifest).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded, manifest);
    }

    #[test]
    fn test_schema_mismatch_discards_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(
            &path,
            r#"{"schema-version": "0.9", "installed": {"lib": {"version": "1", "url": "u", "type": "zip", "package": "p"}}}"#,
        )
        .unwrap();

        let loaded = load(&path).unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_missing_schema_version_discards_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"installed": {}}"#).unwrap();

        let loaded = load(&path).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_save_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        save(&path, &sample_manifest()).unwrap();
        save(&path, &Manifest::empty()).unwrap();

        let loaded = load(&path).unwrap();
        assert!(loaded.is_empty());
    }
}
