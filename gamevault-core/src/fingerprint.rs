//! Content fingerprints.
//!
//! A fingerprint is the lowercase hex SHA-256 of a file's bytes. Files are read
//! in fixed-size chunks so memory stays flat regardless of file size.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{CatalogError, Result};

/// Read size used when streaming file contents into the digest.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Length of a hex-encoded fingerprint.
pub const DIGEST_HEX_LEN: usize = 64;

/// Hash a file on the current thread.
pub fn hash_file_blocking(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|err| CatalogError::io(path, err))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => hasher.update(&buffer[..read]),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(CatalogError::io(path, err)),
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hash a file on the blocking pool so the async scheduler is never stalled by disk reads.
pub async fn hash_file(path: impl Into<PathBuf>) -> Result<String> {
    let path = path.into();
    tokio::task::spawn_blocking(move || hash_file_blocking(&path))
        .await
        .map_err(|err| CatalogError::Internal(format!("hash task failed: {err}")))?
}
