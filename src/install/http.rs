// src/install/http.rs

//! Bundled downloader: HTTP fetch with retry, checksum verification and
//! archive extraction.
//!
//! Each fetch runs on its own worker thread and reports back through a
//! [`FetchHandle::Pending`] channel, so several libraries download
//! concurrently while the orchestrator awaits them collectively.

use crate::error::{Error, Result};
use crate::install::{Downloader, FetchHandle};
use crate::manifest::{ArchiveType, LibraryDefinition};
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for failed downloads
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// HTTP downloader with retry support.
pub struct HttpDownloader {
    client: Arc<reqwest::blocking::Client>,
    max_retries: u32,
}

impl HttpDownloader {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Download(format!("Failed to create HTTP client: {}", e)))?;

        Ok(HttpDownloader {
            client: Arc::new(client),
            max_retries: MAX_RETRIES,
        })
    }

    /// Fetch the archive body with bounded retries.
    fn fetch_bytes(client: &reqwest::blocking::Client, url: &str, max_retries: u32) -> Result<Vec<u8>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = client
                .get(url)
                .send()
                .and_then(|response| response.error_for_status())
                .and_then(|response| response.bytes());
            match outcome {
                Ok(bytes) => return Ok(bytes.to_vec()),
                Err(e) => {
                    if attempt >= max_retries {
                        return Err(Error::Download(format!(
                            "Failed to download {} after {} attempts: {}",
                            url, attempt, e
                        )));
                    }
                    warn!("Download attempt {} for {} failed: {}, retrying...", attempt, url, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

impl Downloader for HttpDownloader {
    fn fetch(
        &self,
        library: &str,
        definition: &LibraryDefinition,
        install_path: &Path,
    ) -> FetchHandle {
        let client = Arc::clone(&self.client);
        let max_retries = self.max_retries;
        let library = library.to_string();
        let definition = definition.clone();
        let install_path = install_path.to_path_buf();

        let (sender, receiver) = mpsc::channel();
        std::thread::spawn(move || {
            let result = download_and_unpack(&client, &library, &definition, &install_path, max_retries);
            // The orchestrator may already be gone if a sibling aborted
            // the run; dropping the result is fine then.
            let _ = sender.send(result);
        });
        FetchHandle::Pending(receiver)
    }

    fn abort(&self, library: &str, _definition: &LibraryDefinition, install_path: &Path) {
        if install_path.exists() {
            debug!(
                "Cleaning up partial install of {} at {}",
                library,
                install_path.display()
            );
            if let Err(err) = fs::remove_dir_all(install_path) {
                warn!(
                    "Failed to clean up {} after aborted fetch: {}",
                    install_path.display(),
                    err
                );
            }
        }
    }
}

fn download_and_unpack(
    client: &reqwest::blocking::Client,
    library: &str,
    definition: &LibraryDefinition,
    install_path: &Path,
    max_retries: u32,
) -> Result<()> {
    info!("Downloading {} from {}", library, definition.url);
    let bytes = HttpDownloader::fetch_bytes(client, &definition.url, max_retries)?;

    if let Some(checksum) = &definition.checksum {
        verify_checksum(&bytes, checksum, &definition.url)?;
    }

    // Replace any stale copy wholesale; partial trees from a previous
    // aborted run must not leak into the fresh install.
    if install_path.exists() {
        fs::remove_dir_all(install_path)?;
    }
    fs::create_dir_all(install_path)?;

    unpack_archive(&bytes, &definition.archive_type, library, install_path)
}

/// Dispatch extraction on the declared archive type. `rar` and unknown
/// types have no extractor here and fail the fetch.
fn unpack_archive(
    bytes: &[u8],
    archive_type: &ArchiveType,
    library: &str,
    install_path: &Path,
) -> Result<()> {
    match archive_type {
        ArchiveType::Zip => unpack_zip(bytes, install_path),
        ArchiveType::Tar => unpack_tar(bytes, install_path),
        other => Err(Error::Download(format!(
            "Unsupported archive type '{}' for {}",
            other, library
        ))),
    }
}

/// Verify the declared checksum when it looks like a SHA-256 digest.
///
/// Anything else is opaque to this downloader and passed over with a
/// debug note; interpreting it is not this tool's job.
fn verify_checksum(bytes: &[u8], expected: &str, url: &str) -> Result<()> {
    if expected.len() != 64 || !expected.chars().all(|c| c.is_ascii_hexdigit()) {
        debug!("Checksum for {} is not a SHA-256 digest, skipping verification", url);
        return Ok(());
    }

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let actual = format!("{:x}", hasher.finalize());

    if !actual.eq_ignore_ascii_case(expected) {
        return Err(Error::Download(format!(
            "SHA-256 mismatch for {}: expected {}, got {}",
            url, expected, actual
        )));
    }
    Ok(())
}

/// Check if bytes start with the gzip magic number (0x1f 0x8b).
fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

fn unpack_zip(bytes: &[u8], install_path: &Path) -> Result<()> {
    let reader = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(reader)
        .map_err(|e| Error::Download(format!("Failed to read zip archive: {}", e)))?;
    archive
        .extract(install_path)
        .map_err(|e| Error::Download(format!("Failed to extract zip archive: {}", e)))?;
    Ok(())
}

/// Unpack a tar archive, transparently handling gzip compression.
fn unpack_tar(bytes: &[u8], install_path: &Path) -> Result<()> {
    if is_gzip(bytes) {
        unpack_tar_entries(tar::Archive::new(GzDecoder::new(bytes)), install_path)
    } else {
        unpack_tar_entries(tar::Archive::new(bytes), install_path)
    }
}

fn unpack_tar_entries<R: std::io::Read>(
    mut archive: tar::Archive<R>,
    install_path: &Path,
) -> Result<()> {
    // Do not preserve permissions or extended attributes from the archive
    archive.set_preserve_permissions(false);
    #[cfg(any(unix, target_os = "redox"))]
    archive.set_unpack_xattrs(false);
    archive
        .unpack(install_path)
        .map_err(|e| Error::Download(format!("Failed to extract tar archive: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_verify_checksum_accepts_match() {
        // SHA-256 of "asset"
        let digest = {
            let mut hasher = Sha256::new();
            hasher.update(b"asset");
            format!("{:x}", hasher.finalize())
        };
        assert!(verify_checksum(b"asset", &digest, "u").is_ok());
    }

    #[test]
    fn test_verify_checksum_rejects_mismatch() {
        let wrong = "0".repeat(64);
        assert!(verify_checksum(b"asset", &wrong, "u").is_err());
    }

    #[test]
    fn test_non_sha256_checksum_is_passed_over() {
        // SHA-1-sized value: opaque, not verified.
        let sha1_like = "a".repeat(40);
        assert!(verify_checksum(b"asset", &sha1_like, "u").is_ok());
    }

    #[test]
    fn test_unpack_plain_tar() {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(5);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "dist/lib.js", &b"hello"[..])
            .unwrap();
        let bytes = builder.into_inner().unwrap();

        let dir = tempfile::tempdir().unwrap();
        unpack_tar(&bytes, dir.path()).unwrap();
        assert_eq!(fs::read(dir.path().join("dist/lib.js")).unwrap(), b"hello");
    }

    #[test]
    fn test_unpack_tar_gz() {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(2);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "a.js", &b"ok"[..]).unwrap();
        let tar_bytes = builder.into_inner().unwrap();

        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        let gz_bytes = encoder.finish().unwrap();
        assert!(is_gzip(&gz_bytes));

        let dir = tempfile::tempdir().unwrap();
        unpack_tar(&gz_bytes, dir.path()).unwrap();
        assert_eq!(fs::read(dir.path().join("a.js")).unwrap(), b"ok");
    }

    #[test]
    fn test_unpack_zip() {
        let mut buffer = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            writer
                .start_file("inner/file.js", zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(b"zipped").unwrap();
            writer.finish().unwrap();
        }
        let bytes = buffer.into_inner();

        let dir = tempfile::tempdir().unwrap();
        unpack_zip(&bytes, dir.path()).unwrap();
        assert_eq!(
            fs::read(dir.path().join("inner/file.js")).unwrap(),
            b"zipped"
        );
    }

    #[test]
    fn test_rar_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let err = unpack_archive(b"Rar!", &ArchiveType::Rar, "x", dir.path()).unwrap_err();
        assert!(err.to_string().contains("rar"));

        let err =
            unpack_archive(b"7z", &ArchiveType::Other("7z".to_string()), "x", dir.path())
                .unwrap_err();
        assert!(err.to_string().contains("7z"));
    }
}
