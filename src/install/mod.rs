// src/install/mod.rs

//! Install/remove lifecycle orchestration.
//!
//! The orchestrator drives a computed [`Delta`] to completion: stale
//! libraries are removed first, then every new or changed library is
//! fetched and post-processed. Fetches may complete synchronously or on a
//! worker; both are expressed through [`FetchHandle`], and all pending
//! handles are awaited before the pass is declared done.

pub mod http;
pub mod postprocess;

use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::manifest::diff::Delta;
use crate::manifest::LibraryDefinition;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tracing::{debug, info, warn};

/// Report progress to the operator once more than this many fetches are
/// in flight at the same time.
const PROGRESS_THRESHOLD: usize = 1;

/// Completion of a single fetch: either already finished, or pending on a
/// worker whose result arrives over a channel. A synchronous collaborator
/// simply returns `Ready`, collapsing both historical code paths into one
/// type.
pub enum FetchHandle {
    Ready(Result<()>),
    Pending(mpsc::Receiver<Result<()>>),
}

/// Downloads one library's asset into its install path.
pub trait Downloader {
    /// Start fetching `definition` into `install_path`.
    fn fetch(
        &self,
        library: &str,
        definition: &LibraryDefinition,
        install_path: &Path,
    ) -> FetchHandle;

    /// Best-effort cleanup after a failed fetch of `library`.
    fn abort(&self, library: &str, definition: &LibraryDefinition, install_path: &Path);
}

/// Deletes a previously installed asset.
pub trait Remover {
    fn remove(
        &self,
        library: &str,
        definition: &LibraryDefinition,
        install_path: &Path,
    ) -> Result<()>;
}

/// The host's installation-path policy.
pub trait InstallPaths {
    fn resolve(&self, library: &str, definition: &LibraryDefinition) -> PathBuf;
}

/// Remover that deletes the install directory from disk.
pub struct DiskRemover;

impl Remover for DiskRemover {
    fn remove(
        &self,
        library: &str,
        _definition: &LibraryDefinition,
        install_path: &Path,
    ) -> Result<()> {
        if install_path.exists() {
            debug!("Deleting {} at {}", library, install_path.display());
            std::fs::remove_dir_all(install_path)?;
        }
        Ok(())
    }
}

/// Drive the delta to completion.
///
/// Removals run first and are best-effort: a removed library may resolve
/// to the same on-disk path as one about to be installed, and removing
/// afterwards would delete the fresh copy.
///
/// Installs post-process synchronous completions inline; pending handles
/// are collected and each library is post-processed once its own fetch
/// resolves. A failed fetch triggers the downloader's abort hook for that
/// library and the first failure is propagated after every sibling has
/// settled.
pub fn reconcile(
    delta: &Delta,
    paths: &dyn InstallPaths,
    downloader: &dyn Downloader,
    remover: &dyn Remover,
    diagnostics: &mut Diagnostics,
) -> Result<()> {
    for (library, definition) in &delta.to_remove {
        let install_path = paths.resolve(library, definition);
        info!("Removing library {} from {}", library, install_path.display());
        if let Err(err) = remover.remove(library, definition, &install_path) {
            diagnostics.warn(format!("Failed to remove library {library}: {err}"));
        }
    }

    let mut pending = Vec::new();
    let mut first_error: Option<Error> = None;

    for (library, definition) in &delta.to_install {
        let install_path = paths.resolve(library, definition);
        info!(
            "Installing library {} ({}) into {}",
            library,
            definition.version,
            install_path.display()
        );

        match downloader.fetch(library, definition, &install_path) {
            FetchHandle::Ready(Ok(())) => {
                if let Err(err) = postprocess::process(
                    &install_path,
                    library,
                    &definition.ignore,
                    &definition.rename,
                    diagnostics,
                ) {
                    first_error = Some(Error::PostProcess {
                        library: library.clone(),
                        reason: err.to_string(),
                    });
                    break;
                }
            }
            FetchHandle::Ready(Err(err)) => {
                downloader.abort(library, definition, &install_path);
                first_error = Some(Error::Fetch {
                    library: library.clone(),
                    reason: err.to_string(),
                });
                break;
            }
            FetchHandle::Pending(receiver) => {
                pending.push((library, definition, install_path, receiver));
            }
        }
    }

    if pending.len() > PROGRESS_THRESHOLD {
        info!("Waiting on {} concurrent downloads...", pending.len());
    }

    let total = pending.len();
    for (completed, (library, definition, install_path, receiver)) in
        pending.into_iter().enumerate()
    {
        // Fetch results are awaited collectively; a failure records the
        // error and keeps draining so siblings settle on their own terms.
        let outcome = receiver
            .recv()
            .unwrap_or_else(|_| Err(Error::Download("download worker disappeared".to_string())));

        match outcome {
            Ok(()) => {
                if total > PROGRESS_THRESHOLD {
                    info!("Downloaded {} ({}/{})", library, completed + 1, total);
                }
                if let Err(err) = postprocess::process(
                    &install_path,
                    library,
                    &definition.ignore,
                    &definition.rename,
                    diagnostics,
                ) {
                    if first_error.is_none() {
                        first_error = Some(Error::PostProcess {
                            library: library.clone(),
                            reason: err.to_string(),
                        });
                    }
                }
            }
            Err(err) => {
                warn!("Download of {} failed: {}", library, err);
                downloader.abort(library, definition, &install_path);
                if first_error.is_none() {
                    first_error = Some(Error::Fetch {
                        library: library.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ArchiveType;
    use std::collections::BTreeMap;
    use std::fs;
    use std::sync::Mutex;

    fn definition(url: &str) -> LibraryDefinition {
        LibraryDefinition {
            version: "1.0.0".to_string(),
            url: url.to_string(),
            archive_type: ArchiveType::Zip,
            ignore: Vec::new(),
            rename: BTreeMap::new(),
            checksum: None,
            source_package: "acme/site".to_string(),
        }
    }

    struct FixedPaths {
        root: PathBuf,
    }

    impl InstallPaths for FixedPaths {
        fn resolve(&self, library: &str, _definition: &LibraryDefinition) -> PathBuf {
            self.root.join(library)
        }
    }

    /// Downloader that writes a marker file, recording call order. Set
    /// `fail` to make a named library's fetch fail. `pending` switches
    /// between the synchronous and worker completion models.
    struct StubDownloader {
        log: Mutex<Vec<String>>,
        fail: Option<String>,
        pending: bool,
    }

    impl StubDownloader {
        fn new(pending: bool) -> Self {
            StubDownloader {
                log: Mutex::new(Vec::new()),
                fail: None,
                pending,
            }
        }
    }

    impl Downloader for StubDownloader {
        fn fetch(
            &self,
            library: &str,
            _definition: &LibraryDefinition,
            install_path: &Path,
        ) -> FetchHandle {
            self.log.lock().unwrap().push(format!("fetch {library}"));
            let fail = self.fail.as_deref() == Some(library);
            let install_path = install_path.to_path_buf();
            let library = library.to_string();

            let work = move || -> Result<()> {
                if fail {
                    return Err(Error::Download(format!("refusing to fetch {library}")));
                }
                fs::create_dir_all(&install_path)?;
                fs::write(install_path.join("asset.js"), b"asset")?;
                Ok(())
            };

            if self.pending {
                let (sender, receiver) = mpsc::channel();
                std::thread::spawn(move || {
                    let _ = sender.send(work());
                });
                FetchHandle::Pending(receiver)
            } else {
                FetchHandle::Ready(work())
            }
        }

        fn abort(&self, library: &str, _definition: &LibraryDefinition, _install_path: &Path) {
            self.log.lock().unwrap().push(format!("abort {library}"));
        }
    }

    struct LoggingRemover<'a> {
        log: &'a Mutex<Vec<String>>,
        fail: bool,
    }

    impl Remover for LoggingRemover<'_> {
        fn remove(
            &self,
            library: &str,
            _definition: &LibraryDefinition,
            install_path: &Path,
        ) -> Result<()> {
            self.log.lock().unwrap().push(format!("remove {library}"));
            if self.fail {
                return Err(Error::Download("disk on fire".to_string()));
            }
            if install_path.exists() {
                fs::remove_dir_all(install_path)?;
            }
            Ok(())
        }
    }

    fn delta(install: &[&str], remove: &[&str]) -> Delta {
        Delta {
            to_install: install
                .iter()
                .map(|n| (n.to_string(), definition("u")))
                .collect(),
            to_remove: remove
                .iter()
                .map(|n| (n.to_string(), definition("u")))
                .collect(),
        }
    }

    #[test]
    fn test_sync_install_writes_assets() {
        let dir = tempfile::tempdir().unwrap();
        let paths = FixedPaths {
            root: dir.path().to_path_buf(),
        };
        let downloader = StubDownloader::new(false);
        let mut diagnostics = Diagnostics::new();

        reconcile(
            &delta(&["a", "b"], &[]),
            &paths,
            &downloader,
            &LoggingRemover {
                log: &downloader.log,
                fail: false,
            },
            &mut diagnostics,
        )
        .unwrap();

        assert!(dir.path().join("a/asset.js").exists());
        assert!(dir.path().join("b/asset.js").exists());
    }

    #[test]
    fn test_pending_installs_complete_together() {
        let dir = tempfile::tempdir().unwrap();
        let paths = FixedPaths {
            root: dir.path().to_path_buf(),
        };
        let downloader = StubDownloader::new(true);
        let mut diagnostics = Diagnostics::new();

        reconcile(
            &delta(&["a", "b", "c"], &[]),
            &paths,
            &downloader,
            &LoggingRemover {
                log: &downloader.log,
                fail: false,
            },
            &mut diagnostics,
        )
        .unwrap();

        for library in ["a", "b", "c"] {
            assert!(dir.path().join(library).join("asset.js").exists());
        }
    }

    #[test]
    fn test_removals_run_before_installs() {
        let dir = tempfile::tempdir().unwrap();
        let paths = FixedPaths {
            root: dir.path().to_path_buf(),
        };
        let downloader = StubDownloader::new(false);
        let mut diagnostics = Diagnostics::new();

        reconcile(
            &delta(&["fresh"], &["stale"]),
            &paths,
            &downloader,
            &LoggingRemover {
                log: &downloader.log,
                fail: false,
            },
            &mut diagnostics,
        )
        .unwrap();

        let log = downloader.log.lock().unwrap();
        assert_eq!(*log, vec!["remove stale".to_string(), "fetch fresh".to_string()]);
    }

    #[test]
    fn test_remove_failure_does_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        let paths = FixedPaths {
            root: dir.path().to_path_buf(),
        };
        let downloader = StubDownloader::new(false);
        let mut diagnostics = Diagnostics::new();

        let result = reconcile(
            &delta(&["a"], &["gone"]),
            &paths,
            &downloader,
            &LoggingRemover {
                log: &downloader.log,
                fail: true,
            },
            &mut diagnostics,
        );

        assert!(result.is_ok());
        assert_eq!(diagnostics.warning_count(), 1);
        assert!(dir.path().join("a/asset.js").exists());
    }

    #[test]
    fn test_pending_failure_aborts_only_failed_library() {
        let dir = tempfile::tempdir().unwrap();
        let paths = FixedPaths {
            root: dir.path().to_path_buf(),
        };
        let mut downloader = StubDownloader::new(true);
        downloader.fail = Some("b".to_string());
        let mut diagnostics = Diagnostics::new();

        let result = reconcile(
            &delta(&["a", "b", "c"], &[]),
            &paths,
            &downloader,
            &LoggingRemover {
                log: &downloader.log,
                fail: false,
            },
            &mut diagnostics,
        );

        let err = result.unwrap_err();
        assert!(matches!(err, Error::Fetch { ref library, .. } if library == "b"));

        // Siblings ran to completion despite the failure.
        assert!(dir.path().join("a/asset.js").exists());
        assert!(dir.path().join("c/asset.js").exists());

        let log = downloader.log.lock().unwrap();
        assert!(log.contains(&"abort b".to_string()));
        assert!(!log.contains(&"abort a".to_string()));
        assert!(!log.contains(&"abort c".to_string()));
    }

    #[test]
    fn test_sync_fetch_failure_invokes_abort() {
        let dir = tempfile::tempdir().unwrap();
        let paths = FixedPaths {
            root: dir.path().to_path_buf(),
        };
        let mut downloader = StubDownloader::new(false);
        downloader.fail = Some("a".to_string());
        let mut diagnostics = Diagnostics::new();

        let result = reconcile(
            &delta(&["a"], &[]),
            &paths,
            &downloader,
            &LoggingRemover {
                log: &downloader.log,
                fail: false,
            },
            &mut diagnostics,
        );

        assert!(result.is_err());
        let log = downloader.log.lock().unwrap();
        assert!(log.contains(&"abort a".to_string()));
    }

    #[test]
    fn test_post_processing_runs_after_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let paths = FixedPaths {
            root: dir.path().to_path_buf(),
        };
        let downloader = StubDownloader::new(true);
        let mut diagnostics = Diagnostics::new();

        let mut delta = delta(&["a"], &[]);
        delta.to_install[0].1.ignore = vec!["asset.js".to_string()];

        reconcile(
            &delta,
            &paths,
            &downloader,
            &LoggingRemover {
                log: &downloader.log,
                fail: false,
            },
            &mut diagnostics,
        )
        .unwrap();

        // The downloaded asset matched the ignore pattern and was removed
        // once the fetch resolved.
        assert!(dir.path().join("a").exists());
        assert!(!dir.path().join("a/asset.js").exists());
    }

    #[test]
    fn test_empty_delta_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let paths = FixedPaths {
            root: dir.path().to_path_buf(),
        };
        let downloader = StubDownloader::new(false);
        let mut diagnostics = Diagnostics::new();

        reconcile(
            &Delta::default(),
            &paths,
            &downloader,
            &LoggingRemover {
                log: &downloader.log,
                fail: false,
            },
            &mut diagnostics,
        )
        .unwrap();

        assert!(downloader.log.lock().unwrap().is_empty());
        assert!(diagnostics.is_empty());
    }
}
