// src/install/postprocess.rs

//! Post-install transformation of a library's directory tree.
//!
//! Two phases, always in this order: delete everything matching the
//! library's ignore patterns, then apply the rename map. Both phases
//! match and resolve paths relative to the library root; renames that
//! would escape the root are rejected. All anomalies here are
//! diagnostics, never fatal — only real I/O failures abort.

use crate::diagnostics::Diagnostics;
use crate::error::Result;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Apply ignore deletion and renames beneath `install_path`.
pub fn process(
    install_path: &Path,
    library: &str,
    ignore: &[String],
    rename: &BTreeMap<String, String>,
    diagnostics: &mut Diagnostics,
) -> Result<()> {
    if ignore.is_empty() && rename.is_empty() {
        return Ok(());
    }

    debug!("Processing {} files in {}", library, install_path.display());

    if !ignore.is_empty() {
        apply_ignore_patterns(install_path, library, ignore, diagnostics)?;
    }
    if !rename.is_empty() {
        apply_renames(install_path, library, rename, diagnostics);
    }
    Ok(())
}

/// Delete every file and directory matching one of the glob patterns.
///
/// The walk includes hidden entries and version-control directories and
/// skips unreadable subtrees without failing. Patterns match against
/// forward-slash relative paths, so results are identical across host
/// path-separator conventions.
fn apply_ignore_patterns(
    install_path: &Path,
    library: &str,
    patterns: &[String],
    diagnostics: &mut Diagnostics,
) -> Result<()> {
    let compiled: Vec<(String, Regex)> = patterns
        .iter()
        .map(|p| (p.clone(), glob_to_regex(p)))
        .collect();
    let mut match_counts = vec![0usize; compiled.len()];

    let mut matched: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(install_path)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!("Skipping unreadable entry under {}: {}", install_path.display(), err);
                None
            }
        })
    {
        let Ok(relative) = entry.path().strip_prefix(install_path) else {
            continue;
        };
        let relative = forward_slashes(relative);
        // Every pattern is credited with its matches; the deletion list
        // records the path once.
        let mut claimed = false;
        for (index, (_, regex)) in compiled.iter().enumerate() {
            if regex.is_match(&relative) {
                match_counts[index] += 1;
                if !claimed {
                    matched.push(entry.path().to_path_buf());
                    claimed = true;
                }
            }
        }
    }

    for (count, (pattern, _)) in match_counts.iter().zip(&compiled) {
        if *count == 0 {
            diagnostics.warn(format!(
                "Ignore pattern '{pattern}' for {library} matched nothing"
            ));
        }
    }

    for path in matched {
        // A matched directory removes its subtree; children that matched
        // separately are already gone by the time we reach them.
        match fs::symlink_metadata(&path) {
            Ok(metadata) => {
                diagnostics.debug(format!("Removing {}", path.display()));
                if metadata.is_dir() {
                    fs::remove_dir_all(&path)?;
                } else {
                    fs::remove_file(&path)?;
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
    }

    Ok(())
}

/// Apply each rename pair, confining both endpoints to the library root.
fn apply_renames(
    install_path: &Path,
    library: &str,
    rename: &BTreeMap<String, String>,
    diagnostics: &mut Diagnostics,
) {
    let Ok(root) = install_path.canonicalize() else {
        diagnostics.warn(format!(
            "Could not resolve the install path for {library}; skipping renames"
        ));
        return;
    };

    for (source_rel, dest_rel) in rename {
        let Some(source_clean) = confine_relative(source_rel) else {
            diagnostics.warn(format!(
                "Could not rename {source_rel} as it is outside the library directory"
            ));
            continue;
        };
        let Some(dest_clean) = confine_relative(dest_rel) else {
            diagnostics.warn(format!(
                "Could not rename to {dest_rel} as it is outside the library directory"
            ));
            continue;
        };

        let source = root.join(&source_clean);
        let dest = root.join(&dest_clean);

        if !source.exists() {
            diagnostics.warn(format!(
                "Could not rename {} as it does not exist",
                source.display()
            ));
            continue;
        }
        // Canonical prefix check catches symlinked sources pointing out of
        // the root, which the lexical check above cannot see.
        match source.canonicalize() {
            Ok(canonical) if canonical.starts_with(&root) => {}
            _ => {
                diagnostics.warn(format!(
                    "Could not rename {} as it is outside the library directory",
                    source.display()
                ));
                continue;
            }
        }
        // The destination does not exist yet, so canonicalize its nearest
        // existing ancestor instead; a symlinked intermediate directory
        // would otherwise route the rename out of the root.
        if !resolves_under(&dest, &root) {
            diagnostics.warn(format!(
                "Could not rename to {} as it is outside the library directory",
                dest.display()
            ));
            continue;
        }
        if dest.exists() {
            diagnostics.warn(format!(
                "Could not rename {} as the destination {} already exists",
                source.display(),
                dest.display()
            ));
            continue;
        }

        diagnostics.debug(format!(
            "Renaming {} to {}",
            source.display(),
            dest.display()
        ));
        if let Err(err) = fs::rename(&source, &dest) {
            diagnostics.warn(format!(
                "Could not rename {} to {}: {}",
                source.display(),
                dest.display(),
                err
            ));
        }
    }
}

/// Walk up from `path` to its nearest existing ancestor and check that it
/// canonicalizes to somewhere under `root`.
fn resolves_under(path: &Path, root: &Path) -> bool {
    let mut ancestor = path.parent();
    while let Some(dir) = ancestor {
        match dir.canonicalize() {
            Ok(canonical) => return canonical.starts_with(root),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                ancestor = dir.parent();
            }
            Err(_) => return false,
        }
    }
    false
}

/// Lexically resolve a relative path, rejecting anything that escapes the
/// root (absolute paths, or `..` components that pop past the top).
fn confine_relative(relative: &str) -> Option<PathBuf> {
    let path = Path::new(relative);
    let mut resolved = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if resolved.as_os_str().is_empty() {
        None
    } else {
        Some(resolved)
    }
}

/// Relative path with forward slashes regardless of the host separator.
fn forward_slashes(path: &Path) -> String {
    let mut out = String::new();
    for component in path.components() {
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(&component.as_os_str().to_string_lossy());
    }
    out
}

/// Translate one glob pattern into an anchored regex.
///
/// `*` and `?` do not cross path separators, `**` does; character classes
/// pass through, everything else is matched literally.
fn glob_to_regex(pattern: &str) -> Regex {
    let mut expression = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    expression.push_str(".*");
                } else {
                    expression.push_str("[^/]*");
                }
            }
            '?' => expression.push_str("[^/]"),
            '[' => {
                expression.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    expression.push('^');
                }
                for inner in chars.by_ref() {
                    if inner == '\\' {
                        expression.push_str("\\\\");
                    } else {
                        expression.push(inner);
                    }
                    if inner == ']' {
                        break;
                    }
                }
            }
            other => expression.push_str(&regex::escape(&other.to_string())),
        }
    }
    expression.push('$');

    // The translation only emits valid syntax; an unterminated character
    // class falls back to matching the pattern literally.
    Regex::new(&expression)
        .unwrap_or_else(|_| Regex::new(&format!("^{}$", regex::escape(pattern))).expect("escaped pattern is valid"))
}
