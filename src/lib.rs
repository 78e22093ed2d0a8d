// src/lib.rs

//! Libshelf
//!
//! Declarative library asset installer: multiple sources declare
//! downloadable libraries, and one reconciliation pass makes the on-disk
//! assets converge to match.
//!
//! # Architecture
//!
//! - Manifest-first: sources are merged into one target manifest with a
//!   strict first-writer-wins conflict policy
//! - Stateful diffing: a schema-versioned state document makes repeat
//!   runs skip anything already installed and unchanged
//! - Removals before installs, concurrent fetches awaited collectively
//! - Per-library post-processing: ignore-glob deletion and path-confined
//!   renames

pub mod diagnostics;
mod error;
pub mod heuristics;
pub mod install;
pub mod manifest;
pub mod project;

pub use error::{Error, Result};
