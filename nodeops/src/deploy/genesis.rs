//! Genesis file fingerprints

use std::fmt;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::errors::OpsError;

/// SHA-256 of a genesis file. Two nodes agree on genesis only if their
/// fingerprints are byte-identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenesisFingerprint([u8; 32]);

impl GenesisFingerprint {
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Parse a 64-character hex digest
    pub fn from_hex(value: &str) -> Result<Self, OpsError> {
        let bytes = hex::decode(value.trim())
            .map_err(|e| OpsError::MalformedResponse(format!("invalid sha256 digest {:?}: {}", value, e)))?;
        let digest: [u8; 32] = bytes.try_into().map_err(|_| {
            OpsError::MalformedResponse(format!("sha256 digest {:?} is not 32 bytes", value))
        })?;
        Ok(Self(digest))
    }

    /// Fingerprint of a local file
    pub async fn read_file(path: &Path) -> Result<Self, OpsError> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            OpsError::ConfigMissing(format!("genesis file {}: {}", path.display(), e))
        })?;
        Ok(Self::of_bytes(&data))
    }

    /// Parse the first field of `sha256sum <file>` output
    pub fn parse_sha256sum_output(output: &str) -> Result<Self, OpsError> {
        let digest = output.split_whitespace().next().ok_or_else(|| {
            OpsError::MalformedResponse("empty sha256sum output".to_string())
        })?;
        Self::from_hex(digest)
    }
}

impl fmt::Display for GenesisFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
