//! Artifact publishing
//!
//! After a successful build, every artifact in the package directory matching
//! a configured suffix is detach-signed and hard-linked, together with its
//! signature, into the destination repository directory.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::PublishError;
use crate::infra::proc::run_cmd;

/// Sign and publish the build's artifacts, returning how many were linked.
pub fn sign_and_copy(
    build_dir: &Path,
    destdir: &Path,
    suffixes: &[String],
) -> Result<usize, PublishError> {
    let entries = std::fs::read_dir(build_dir).map_err(|e| PublishError::IoError {
        path: build_dir.to_path_buf(),
        error: e.to_string(),
    })?;

    let mut artifacts: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .map(|name| {
                    let name = name.to_string_lossy();
                    suffixes.iter().any(|suffix| name.ends_with(suffix))
                })
                .unwrap_or(false)
        })
        .collect();
    artifacts.sort();

    let mut published = 0;
    for artifact in &artifacts {
        let signature = sign(artifact)?;
        link_into(artifact, destdir)?;
        link_into(&signature, destdir)?;
        published += 1;
    }

    if published > 0 {
        info!("published {published} artifacts to {}", destdir.display());
    }
    Ok(published)
}

/// Detach-sign one artifact, returning the signature path.
fn sign(artifact: &Path) -> Result<PathBuf, PublishError> {
    let path = artifact.display().to_string();
    run_cmd(&["gpg", "--batch", "--yes", "--detach-sign", "--", &path], None).map_err(|e| {
        PublishError::SignError {
            path: artifact.to_path_buf(),
            error: e.to_string(),
        }
    })?;

    let mut signature = artifact.as_os_str().to_owned();
    signature.push(".sig");
    Ok(PathBuf::from(signature))
}

/// Hard-link a file into the destination, ignoring an existing link.
fn link_into(path: &Path, destdir: &Path) -> Result<(), PublishError> {
    let Some(name) = path.file_name() else {
        return Ok(());
    };
    let dest = destdir.join(name);

    match std::fs::hard_link(path, &dest) {
        Ok(()) => {
            debug!("linked {}", dest.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(PublishError::LinkError {
            path: path.to_path_buf(),
            dest,
            error: e.to_string(),
        }),
    }
}
