//! Row content hashing
//!
//! A row hash identifies the *content* of a row: bookkeeping columns are left
//! out so a row hashes the same before and after its timestamps move. The
//! digest is deterministic, and the same cells always give the same hex
//! string.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

/// Joins cells before hashing so `["Ann", "30"]` and `["Ann3", "0"]` differ
pub const CELL_SEPARATOR: &str = "\u{1f}";

/// Columns never fed to the hash
pub const HASH_EXCLUDED_FIELDS: [&str; 5] = ["id", "hash", "created_at", "updated_at", "deleted_at"];

/// Field name without its table prefix (`users.name` -> `name`)
pub fn unqualified(field: &str) -> &str {
    field.rsplit('.').next().unwrap_or(field)
}

/// Supported digest algorithms
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

/// Byte digest collaborator
pub trait RowDigest: Send + Sync {
    fn digest(&self, bytes: &[u8]) -> Vec<u8>;
}

/// SHA-2 family digest
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha2Digest {
    algorithm: HashAlgorithm,
}

impl Sha2Digest {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }
}

impl RowDigest for Sha2Digest {
    fn digest(&self, bytes: &[u8]) -> Vec<u8> {
        match self.algorithm {
            HashAlgorithm::Sha256 => Sha256::digest(bytes).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(bytes).to_vec(),
        }
    }
}

/// Computes the content hash of a row
#[derive(Clone)]
pub struct RowHasher {
    digest: Arc<dyn RowDigest>,
}

impl RowHasher {
    pub fn new(digest: Arc<dyn RowDigest>) -> Self {
        Self { digest }
    }

    pub fn with_algorithm(algorithm: HashAlgorithm) -> Self {
        Self::new(Arc::new(Sha2Digest::new(algorithm)))
    }

    /// Lowercase hex digest of the stored text of every cell whose field is
    /// not a bookkeeping column, joined with [`CELL_SEPARATOR`].
    pub fn hash(&self, fields: &[String], cells: &[String]) -> String {
        let content = fields
            .iter()
            .zip(cells)
            .filter(|(field, _)| !HASH_EXCLUDED_FIELDS.contains(&unqualified(field)))
            .map(|(_, cell)| cell.as_str())
            .collect::<Vec<_>>()
            .join(CELL_SEPARATOR);
        to_hex(&self.digest.digest(content.as_bytes()))
    }
}

impl Default for RowHasher {
    fn default() -> Self {
        Self::with_algorithm(HashAlgorithm::default())
    }
}

impl std::fmt::Debug for RowHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowHasher").finish_non_exhaustive()
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
