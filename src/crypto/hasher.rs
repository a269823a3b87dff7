use sha2::{Digest, Sha256};

use crate::id::Id;

/// Hashes the given data.
///
/// # Arguments
///
/// * `data` - The data to hash.
///
/// # Returns
///
/// The `Id` of the hash.
#[must_use]
pub(crate) fn hash(data: &[u8]) -> Id {
    Id::new(Sha256::digest(data).into())
}
