//! Hash manifests
//!
//! A manifest lists one `<hex sha256> <file name>` pair per line. Blank
//! lines are skipped; anything else malformed rejects the whole manifest.

use std::collections::HashMap;

use crate::error::{DaemonError, Result};

/// SHA-256 digest length in bytes
pub const HASH_LEN: usize = 32;

/// Expected hashes keyed by file name
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    hashes: HashMap<String, [u8; HASH_LEN]>,
}

impl Manifest {
    /// Merge the entries of another manifest file into this one
    pub fn extend_from(&mut self, text: &str) -> Result<()> {
        for (idx, line) in text.lines().enumerate() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.is_empty() {
                continue;
            }

            let line_no = idx + 1;
            let [hash, name] = parts.as_slice() else {
                return Err(DaemonError::Manifest {
                    line: line_no,
                    reason: format!("expected 2 fields, got {}", parts.len()),
                });
            };

            let bytes = hex::decode(hash).map_err(|e| DaemonError::Manifest {
                line: line_no,
                reason: format!("hex decode error: {}", e),
            })?;
            let digest: [u8; HASH_LEN] =
                bytes.as_slice().try_into().map_err(|_| DaemonError::Manifest {
                    line: line_no,
                    reason: format!(
                        "invalid hash length, wanted {} bytes, got {}",
                        HASH_LEN,
                        bytes.len()
                    ),
                })?;

            self.hashes.insert(name.to_string(), digest);
        }
        Ok(())
    }

    /// Expected hash for a file
    pub fn get(&self, name: &str) -> Option<&[u8; HASH_LEN]> {
        self.hashes.get(name)
    }

    /// Check `data` against the manifest entry for `name`
    pub fn verify(&self, name: &str, digest: &[u8]) -> Result<()> {
        let expected = self
            .get(name)
            .ok_or_else(|| DaemonError::MissingHash(name.to_string()))?;
        if expected.as_slice() != digest {
            tracing::warn!(
                "File hash mismatch for {}: expected {}, got {}",
                name,
                hex::encode(expected),
                hex::encode(digest)
            );
            return Err(DaemonError::HashMismatch {
                file: name.to_string(),
            });
        }
        Ok(())
    }
}
