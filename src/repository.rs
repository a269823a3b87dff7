//! The repository contract consumed by the archiver.

pub(crate) mod in_memory;

use bytes::Bytes;

use crate::{
    blob::{tree::Tree, BlobType},
    id::Id,
    repofile::{configfile::ConfigFile, snapshotfile::SnapshotFile},
    CairnResult,
};

/// The archiver's view of a repository.
///
/// Everything below this trait - pack assembly, index layout, encryption,
/// backend I/O - is opaque to the archiver. Implementations may buffer
/// writes internally; [`Repository::flush`] forces buffered blobs to durable
/// storage and [`Repository::save_index`] persists the index over them.
pub trait Repository {
    /// Returns the repository configuration, including the chunker
    /// polynomial.
    fn config(&self) -> &ConfigFile;

    /// Stores a blob and returns its content id.
    ///
    /// If `id` is given it must be the hash of `data`; otherwise the
    /// repository computes it. Storing an already-present id is a no-op.
    fn save_blob(&self, tpe: BlobType, data: Bytes, id: Option<Id>) -> CairnResult<Id>;

    /// Loads and deserializes a tree.
    ///
    /// # Errors
    ///
    /// * If the tree is not present or cannot be deserialized.
    fn load_tree(&self, id: &Id) -> CairnResult<Tree>;

    /// Serializes and stores a tree, returning its id.
    ///
    /// The tree is brought into canonical name order before hashing, so two
    /// equivalent trees get the same id regardless of insertion order.
    fn save_tree(&self, tree: &Tree) -> CairnResult<Id> {
        let mut tree = tree.clone();
        tree.sort();
        let (chunk, id) = tree.serialize()?;
        self.save_blob(BlobType::Tree, chunk.into(), Some(id))
    }

    /// Forces buffered blobs to durable storage.
    fn flush(&self) -> CairnResult<()>;

    /// Persists the index over the stored blobs.
    fn save_index(&self) -> CairnResult<()>;

    /// Stores a snapshot record as a standalone unpacked object and returns
    /// its id, which is the snapshot id.
    fn save_snapshot(&self, snap: &SnapshotFile) -> CairnResult<Id>;

    /// Loads a snapshot record.
    ///
    /// # Errors
    ///
    /// * If the snapshot is not present or cannot be deserialized.
    fn load_snapshot(&self, id: &Id) -> CairnResult<SnapshotFile>;
}
