//! Idempotent retrieval of image-builder archives

use std::io::{Read, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::{Error, Result};

/// Download chunk size; small enough to bound peak memory for multi-hundred
/// megabyte archives
const CHUNK_SIZE: usize = 1024;

/// Ensure the image-builder archive is present at `archive_path`.
///
/// If the file already exists the call returns immediately without any
/// network I/O or integrity check: presence alone gates retrieval. Otherwise
/// the archive is fetched from
/// `<base_url>releases/<version>/targets/<target>/<sub_target>/<archive_file>`
/// and streamed to disk in fixed-size chunks, flushing after each one. The
/// download goes to a temporary file in the destination directory and is
/// renamed into place, so a failed fetch leaves no partial archive behind.
pub fn ensure_archive(
    archive_path: &Path,
    base_url: &str,
    version: &str,
    target: &str,
    sub_target: &str,
    archive_file: &str,
) -> Result<()> {
    if archive_path.exists() {
        debug!("archive already present: {}", archive_path.display());
        return Ok(());
    }

    let url = format!(
        "{}releases/{version}/targets/{target}/{sub_target}/{archive_file}",
        normalize_base_url(base_url)
    );
    info!("retrieving {}", url);

    let mut response =
        reqwest::blocking::get(&url).map_err(|e| Error::ArchiveRetrieval {
            url: url.clone(),
            message: e.to_string(),
        })?;

    if !response.status().is_success() {
        return Err(Error::ArchiveRetrieval {
            url,
            message: format!("HTTP {}", response.status()),
        });
    }

    let parent = archive_path.parent().ok_or_else(|| Error::ArchiveRetrieval {
        url: url.clone(),
        message: format!("no parent directory for {}", archive_path.display()),
    })?;

    let mut file = NamedTempFile::new_in(parent)?;
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = response.read(&mut buf).map_err(|e| Error::ArchiveRetrieval {
            url: url.clone(),
            message: e.to_string(),
        })?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])?;
        file.flush()?;
    }

    file.persist(archive_path)
        .map_err(|e| Error::ArchiveRetrieval {
            url,
            message: e.to_string(),
        })?;

    info!("archive written to {}", archive_path.display());

    Ok(())
}

/// Base URLs are joined with a path template, so a trailing slash is required
pub(crate) fn normalize_base_url(base_url: &str) -> String {
    if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{base_url}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://downloads.openwrt.org"),
            "https://downloads.openwrt.org/"
        );
        assert_eq!(
            normalize_base_url("https://downloads.openwrt.org/"),
            "https://downloads.openwrt.org/"
        );
    }

    #[test]
    fn test_ensure_archive_downloads_once() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock(
                "GET",
                "/releases/23.05.0/targets/x86/64/openwrt-imagebuilder.tar.xz",
            )
            .with_status(200)
            .with_body("archive-bytes")
            .expect(1)
            .create();

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("openwrt-imagebuilder.tar.xz");

        ensure_archive(
            &dest,
            &server.url(),
            "23.05.0",
            "x86",
            "64",
            "openwrt-imagebuilder.tar.xz",
        )
        .unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), "archive-bytes");

        // Second call is a no-op regardless of remote availability
        ensure_archive(
            &dest,
            &server.url(),
            "23.05.0",
            "x86",
            "64",
            "openwrt-imagebuilder.tar.xz",
        )
        .unwrap();

        mock.assert();
    }

    #[test]
    fn test_ensure_archive_skips_network_when_present() {
        // No mock server at all: a present file must short-circuit before
        // any transport is attempted.
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("archive.tar.xz");
        fs::write(&dest, "already here").unwrap();

        ensure_archive(
            &dest,
            "http://127.0.0.1:1/unreachable",
            "23.05.0",
            "x86",
            "64",
            "archive.tar.xz",
        )
        .unwrap();
        assert_eq!(fs::read_to_string(&dest).unwrap(), "already here");
    }

    #[test]
    fn test_ensure_archive_error_status() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/releases/23.05.0/targets/x86/64/archive.tar.xz")
            .with_status(404)
            .create();

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("archive.tar.xz");

        let err = ensure_archive(&dest, &server.url(), "23.05.0", "x86", "64", "archive.tar.xz")
            .unwrap_err();
        assert!(matches!(err, Error::ArchiveRetrieval { .. }));
        // Nothing was left behind at the destination
        assert!(!dest.exists());
    }
}
