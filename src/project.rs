// src/project.rs

//! Project configuration: where library declarations come from and where
//! their assets land on disk.
//!
//! The primary source is `libshelf.json` in the project directory. It may
//! include further source files contributed by other packages; the
//! primary is always processed first so it wins every name conflict, and
//! included sources follow in their listed order.

use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::install::InstallPaths;
use crate::manifest::{self, LibraryDefinition, SourceDeclaration};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// File name of the primary project configuration.
pub const PROJECT_FILE: &str = "libshelf.json";

/// File name of the persisted state document, kept inside the install
/// directory so it travels with the assets it describes.
pub const STATE_FILE: &str = ".installed-libraries.json";

fn default_install_dir() -> String {
    "libraries".to_string()
}

#[derive(Debug, Deserialize)]
struct ProjectFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "install-dir", default = "default_install_dir")]
    install_dir: String,
    #[serde(default)]
    libraries: BTreeMap<String, SourceDeclaration>,
    #[serde(default)]
    include: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct IncludedFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    libraries: BTreeMap<String, SourceDeclaration>,
}

/// One package contributing library declarations.
#[derive(Debug)]
pub struct ContributingSource {
    pub package: String,
    pub declarations: BTreeMap<String, SourceDeclaration>,
    pub primary: bool,
}

/// A loaded project: contributing sources plus path policy.
#[derive(Debug)]
pub struct Project {
    install_dir: PathBuf,
    sources: Vec<ContributingSource>,
}

impl Project {
    /// Look for `libshelf.json` in `dir`. Returns `None` when the project
    /// file is absent — reconciliation then has nothing to do.
    pub fn discover(dir: &Path) -> Result<Option<Project>> {
        let path = dir.join(PROJECT_FILE);
        if !path.exists() {
            debug!("No {} in {}", PROJECT_FILE, dir.display());
            return Ok(None);
        }
        Project::load(&path).map(Some)
    }

    /// Load a project file and every included source file.
    pub fn load(path: &Path) -> Result<Project> {
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let raw = fs::read_to_string(path)
            .map_err(|e| Error::Project(format!("Cannot read {}: {}", path.display(), e)))?;
        let file: ProjectFile = serde_json::from_str(&raw)
            .map_err(|e| Error::Project(format!("Cannot parse {}: {}", path.display(), e)))?;

        let primary_package = file.name.unwrap_or_else(|| "root".to_string());
        validate_library_names(&file.libraries, &primary_package)?;

        let mut sources = vec![ContributingSource {
            package: primary_package,
            declarations: file.libraries,
            primary: true,
        }];

        for include in &file.include {
            let include_path = root.join(include);
            let raw = fs::read_to_string(&include_path).map_err(|e| {
                Error::Project(format!("Cannot read include {}: {}", include_path.display(), e))
            })?;
            let included: IncludedFile = serde_json::from_str(&raw).map_err(|e| {
                Error::Project(format!("Cannot parse include {}: {}", include_path.display(), e))
            })?;
            let package = included.name.unwrap_or_else(|| {
                include_path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| include.clone())
            });
            validate_library_names(&included.libraries, &package)?;
            sources.push(ContributingSource {
                package,
                declarations: included.libraries,
                primary: false,
            });
        }

        Ok(Project {
            install_dir: root.join(&file.install_dir),
            sources,
        })
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Location of the persisted state document.
    pub fn state_file(&self) -> PathBuf {
        self.install_dir.join(STATE_FILE)
    }

    pub fn sources(&self) -> &[ContributingSource] {
        &self.sources
    }

    /// Fold every contributing source into one merged manifest mapping,
    /// primary first, includes in listed order.
    pub fn merge_sources(
        &self,
        diagnostics: &mut Diagnostics,
    ) -> Result<BTreeMap<String, LibraryDefinition>> {
        let mut processed = BTreeMap::new();
        for source in &self.sources {
            debug!(
                "Processing {} library declarations from {}",
                source.declarations.len(),
                source.package
            );
            manifest::merge_source(
                &mut processed,
                &source.package,
                &source.declarations,
                diagnostics,
            )?;
        }
        Ok(processed)
    }

    /// Does the library's assigned install path exist on disk?
    pub fn exists_on_disk(&self, library: &str, definition: &LibraryDefinition) -> bool {
        self.resolve(library, definition).exists()
    }
}

impl InstallPaths for Project {
    /// `install_dir/<name>`; a name containing `/` nests under the
    /// install dir, giving vendor-namespaced libraries their own subtree.
    fn resolve(&self, library: &str, _definition: &LibraryDefinition) -> PathBuf {
        let mut path = self.install_dir.clone();
        for part in library.split('/') {
            path.push(part);
        }
        path
    }
}

/// Library names become path segments under the install dir, so reject
/// anything that could step outside it.
fn validate_library_names(
    declarations: &BTreeMap<String, SourceDeclaration>,
    package: &str,
) -> Result<()> {
    for name in declarations.keys() {
        let invalid = name.is_empty()
            || Path::new(name)
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if invalid {
            return Err(Error::Project(format!(
                "Library name '{}' declared by '{}' is not a valid install path",
                name, package
            )));
        }
    }
    Ok(())
}
