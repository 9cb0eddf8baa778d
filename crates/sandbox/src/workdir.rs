// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Working-directory materialization: a package blob is either a gzipped
//! tar archive or a single raw executable, distinguished by sniffing the
//! gzip magic number (`0x1f 0x8b`) rather than trusting a flag, since
//! `Properties::compressed` only describes the KV transport encoding,
//! not the payload shape.

use joshua_core::EnsembleId;
use std::io;
use std::path::{Path, PathBuf};

/// The name every materialized package is run as, whether it came from
/// an archive or was written directly.
pub const ENTRYPOINT_NAME: &str = "joshua_test";

fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// A materialized, ready-to-execute working directory for one run.
pub struct WorkDir {
    pub path: PathBuf,
    pub entrypoint: PathBuf,
}

/// Extract (or write) `package` under `root/<id>/`, returning the
/// resulting [`WorkDir`]. Blocking archive work runs on a blocking-pool
/// thread so it doesn't stall the agent's async executor.
pub async fn materialize(root: &Path, id: &EnsembleId, package: Vec<u8>) -> io::Result<WorkDir> {
    let dir = root.join(id.to_string());
    tokio::fs::create_dir_all(&dir).await?;

    let entrypoint = dir.join(ENTRYPOINT_NAME);
    let dir_for_blocking = dir.clone();
    let entrypoint_for_blocking = entrypoint.clone();
    tokio::task::spawn_blocking(move || extract_or_write(&dir_for_blocking, &entrypoint_for_blocking, &package))
        .await
        .map_err(|e| io::Error::other(format!("materialize task panicked: {e}")))??;

    Ok(WorkDir {
        path: dir,
        entrypoint,
    })
}

fn extract_or_write(dir: &Path, entrypoint: &Path, package: &[u8]) -> io::Result<()> {
    if is_gzip(package) {
        let decoder = flate2::read::GzDecoder::new(package);
        let mut archive = tar::Archive::new(decoder);
        archive.unpack(dir)?;
        if !entrypoint.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("package archive has no {ENTRYPOINT_NAME:?} entry"),
            ));
        }
    } else {
        std::fs::write(entrypoint, package)?;
    }
    make_executable(entrypoint)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    std::fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Dispose of a completed run's working directory. Failed runs are kept
/// (renamed with a `.failed` suffix so a retried id's fresh directory
/// doesn't collide) when `keep_failed` is set; otherwise the directory is always removed.
pub async fn cleanup(workdir: WorkDir, keep_failed: bool, failed: bool) -> io::Result<()> {
    if failed && keep_failed {
        let kept = workdir.path.with_extension("failed");
        tokio::fs::rename(&workdir.path, &kept).await?;
        tracing::info!(path = %kept.display(), "kept failed run's working directory");
        Ok(())
    } else {
        tokio::fs::remove_dir_all(&workdir.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn tar_gz_with_entrypoint(script: &[u8]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(script.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, ENTRYPOINT_NAME, script).unwrap();
        let tar_bytes = builder.into_inner().unwrap();

        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn raw_package_is_written_and_made_executable() {
        let tmp = tempfile::tempdir().unwrap();
        let id = EnsembleId::from_bytes([1; 10]);
        let workdir = materialize(tmp.path(), &id, b"#!/bin/sh\nexit 0\n".to_vec())
            .await
            .unwrap();
        assert!(workdir.entrypoint.exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&workdir.entrypoint).unwrap().permissions().mode();
            assert_ne!(mode & 0o111, 0);
        }
    }

    #[tokio::test]
    async fn gzip_package_is_extracted() {
        let tmp = tempfile::tempdir().unwrap();
        let id = EnsembleId::from_bytes([2; 10]);
        let archive = tar_gz_with_entrypoint(b"#!/bin/sh\nexit 0\n");
        let workdir = materialize(tmp.path(), &id, archive).await.unwrap();
        assert!(workdir.entrypoint.exists());
    }

    #[tokio::test]
    async fn cleanup_removes_by_default() {
        let tmp = tempfile::tempdir().unwrap();
        let id = EnsembleId::from_bytes([3; 10]);
        let workdir = materialize(tmp.path(), &id, b"x".to_vec()).await.unwrap();
        let path = workdir.path.clone();
        cleanup(workdir, false, true).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn cleanup_keeps_failed_run_when_requested() {
        let tmp = tempfile::tempdir().unwrap();
        let id = EnsembleId::from_bytes([4; 10]);
        let workdir = materialize(tmp.path(), &id, b"x".to_vec()).await.unwrap();
        let path = workdir.path.clone();
        cleanup(workdir, true, true).await.unwrap();
        assert!(!path.exists());
        assert!(path.with_extension("failed").exists());
    }
}
