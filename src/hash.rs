//! SHA-256 content fingerprints for duplicate detection
//!
//! Files are streamed through the hasher in fixed 64 KiB blocks so memory use
//! stays flat no matter how large the photo is. The digest depends on the
//! bytes only, never on the path or filesystem metadata.

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::trace;

/// Block size used when streaming a file through the hasher (64 KiB)
pub const BLOCK_SIZE: usize = 64 * 1024;

/// SHA-256 digest of a file's full byte stream
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint an in-memory buffer
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..12])
    }
}

/// Compute the content fingerprint of a file
pub fn fingerprint(path: &Path) -> Result<Fingerprint> {
    let file = File::open(path).map_err(|e| Error::HashComputation {
        path: path.to_path_buf(),
        message: format!("Failed to open file: {}", e),
    })?;
    let digest = fingerprint_reader(file).map_err(|e| Error::HashComputation {
        path: path.to_path_buf(),
        message: format!("Failed to read file: {}", e),
    })?;

    trace!(?path, %digest, "Computed file fingerprint");
    Ok(digest)
}

/// Stream any reader through SHA-256 in `BLOCK_SIZE` chunks
pub fn fingerprint_reader<R: Read>(mut reader: R) -> std::io::Result<Fingerprint> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BLOCK_SIZE];
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..n]);
    }
    Ok(Fingerprint(hasher.finalize().into()))
}
