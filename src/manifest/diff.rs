// src/manifest/diff.rs

//! Compute the delta between the freshly merged manifest and the
//! previously persisted one.

use crate::manifest::{LibraryDefinition, Manifest};
use std::collections::BTreeMap;
use tracing::debug;

/// The work one reconciliation pass has to perform. Computed fresh on
/// every run, never cached.
#[derive(Debug, Default)]
pub struct Delta {
    /// Libraries that are new, changed, or missing on disk
    pub to_install: Vec<(String, LibraryDefinition)>,
    /// Libraries present in the prior manifest but no longer declared
    pub to_remove: Vec<(String, LibraryDefinition)>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.to_install.is_empty() && self.to_remove.is_empty()
    }
}

/// Classify every merged library against the prior manifest.
///
/// A library is scheduled for install when it was not in the prior
/// manifest, when its resolved definition differs from the stored one in
/// any field, or when `exists_on_disk` reports its install path missing.
/// The removal set is the plain key difference prior − merged.
pub fn diff<F>(
    merged: &BTreeMap<String, LibraryDefinition>,
    prior: &Manifest,
    exists_on_disk: F,
) -> Delta
where
    F: Fn(&str, &LibraryDefinition) -> bool,
{
    let mut delta = Delta::default();

    for (name, stored) in &prior.installed {
        if !merged.contains_key(name) {
            delta.to_remove.push((name.clone(), stored.clone()));
        }
    }

    for (name, definition) in merged {
        let install = match prior.installed.get(name) {
            None => true,
            Some(stored) => stored != definition || !exists_on_disk(name, definition),
        };
        if install {
            delta.to_install.push((name.clone(), definition.clone()));
        } else {
            debug!("Library {} is up to date", name);
        }
    }

    delta
}
