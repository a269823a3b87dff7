pub(crate) mod tree;

use serde_derive::{Deserialize, Serialize};

/// All [`BlobType`]s which are supported by the repository
pub const ALL_BLOB_TYPES: [BlobType; 2] = [BlobType::Tree, BlobType::Data];

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// The type a `blob` can have
pub enum BlobType {
    #[serde(rename = "tree")]
    /// This is a tree blob: a serialized directory listing
    Tree,
    #[serde(rename = "data")]
    /// This is a data blob: a chunk of file content
    Data,
}
