//! In-memory repository to be used for testing

use std::collections::BTreeMap;
use std::sync::RwLock;

use bytes::Bytes;

use crate::{
    blob::{tree::Tree, BlobType},
    chunker::random_poly,
    crypto::hasher::hash,
    error::{RepositoryErrorKind, TreeErrorKind},
    id::Id,
    repofile::{configfile::ConfigFile, snapshotfile::SnapshotFile},
    repository::Repository,
    CairnResult,
};

/// Statistics about the writes an [`InMemoryRepository`] has seen.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteStats {
    /// Number of data blobs newly stored (idempotent re-saves not counted)
    pub data_blobs_written: u64,
    /// Number of tree blobs newly stored (idempotent re-saves not counted)
    pub tree_blobs_written: u64,
    /// Number of flushes
    pub flushes: u64,
    /// Number of index writes
    pub index_writes: u64,
}

#[derive(Debug, Default)]
struct Store {
    /// Blobs which have been saved but not yet flushed
    pending: BTreeMap<(BlobType, Id), Bytes>,
    /// Blobs which have been flushed to "durable" storage
    committed: BTreeMap<(BlobType, Id), Bytes>,
    /// Snapshot records, saved standalone and unpacked
    snapshots: BTreeMap<Id, Bytes>,
    stats: WriteStats,
}

impl Store {
    fn get(&self, tpe: BlobType, id: &Id) -> Option<&Bytes> {
        self.pending
            .get(&(tpe, *id))
            .or_else(|| self.committed.get(&(tpe, *id)))
    }
}

/// In-memory repository to be used for testing
///
/// This repository is non-persistent and all data will be lost after the
/// program ends. It stores blobs unpacked and unencrypted.
///
/// Do not use this repository in production.
#[derive(Debug)]
pub struct InMemoryRepository {
    config: ConfigFile,
    store: RwLock<Store>,
}

impl InMemoryRepository {
    /// Create a new (empty) `InMemoryRepository` with a random chunker
    /// polynomial.
    ///
    /// # Errors
    ///
    /// * If no suitable chunker polynomial could be found.
    pub fn new() -> CairnResult<Self> {
        let poly = random_poly()?;
        Ok(Self::with_config(ConfigFile::new(1, Id::random(), poly)))
    }

    /// Create a new (empty) `InMemoryRepository` using the given config.
    #[must_use]
    pub fn with_config(config: ConfigFile) -> Self {
        Self {
            config,
            store: RwLock::new(Store::default()),
        }
    }

    /// Returns whether the repository holds a blob of the given type and id,
    /// flushed or not.
    #[must_use]
    pub fn has_blob(&self, tpe: BlobType, id: &Id) -> bool {
        self.store.read().unwrap().get(tpe, id).is_some()
    }

    /// Returns the contents of a blob, flushed or not.
    #[must_use]
    pub fn blob(&self, tpe: BlobType, id: &Id) -> Option<Bytes> {
        self.store.read().unwrap().get(tpe, id).cloned()
    }

    /// Returns the ids of all stored snapshot records.
    #[must_use]
    pub fn snapshot_ids(&self) -> Vec<Id> {
        self.store.read().unwrap().snapshots.keys().copied().collect()
    }

    /// Returns the write statistics collected so far.
    #[must_use]
    pub fn stats(&self) -> WriteStats {
        self.store.read().unwrap().stats
    }
}

impl Repository for InMemoryRepository {
    fn config(&self) -> &ConfigFile {
        &self.config
    }

    fn save_blob(&self, tpe: BlobType, data: Bytes, id: Option<Id>) -> CairnResult<Id> {
        let id = id.unwrap_or_else(|| hash(&data));
        let mut store = self.store.write().unwrap();

        // storing an already-present id is a no-op
        if store.get(tpe, &id).is_none() {
            _ = store.pending.insert((tpe, id), data);
            match tpe {
                BlobType::Data => store.stats.data_blobs_written += 1,
                BlobType::Tree => store.stats.tree_blobs_written += 1,
            }
        }
        Ok(id)
    }

    fn load_tree(&self, id: &Id) -> CairnResult<Tree> {
        let store = self.store.read().unwrap();
        let data = store
            .get(BlobType::Tree, id)
            .ok_or(RepositoryErrorKind::BlobNotFound(*id))?;

        Ok(serde_json::from_slice(data).map_err(TreeErrorKind::DeserializingTreeFailed)?)
    }

    fn flush(&self) -> CairnResult<()> {
        let mut store = self.store.write().unwrap();
        let pending = std::mem::take(&mut store.pending);
        store.committed.extend(pending);
        store.stats.flushes += 1;
        Ok(())
    }

    fn save_index(&self) -> CairnResult<()> {
        self.store.write().unwrap().stats.index_writes += 1;
        Ok(())
    }

    fn save_snapshot(&self, snap: &SnapshotFile) -> CairnResult<Id> {
        let data =
            serde_json::to_vec(snap).map_err(RepositoryErrorKind::SerializingSnapshotFailed)?;
        let id = hash(&data);
        _ = self
            .store
            .write()
            .unwrap()
            .snapshots
            .insert(id, data.into());
        Ok(id)
    }

    fn load_snapshot(&self, id: &Id) -> CairnResult<SnapshotFile> {
        let store = self.store.read().unwrap();
        let data = store
            .snapshots
            .get(id)
            .ok_or(RepositoryErrorKind::SnapshotNotFound(*id))?;

        let mut snap: SnapshotFile = serde_json::from_slice(data)
            .map_err(RepositoryErrorKind::DeserializingSnapshotFailed)?;
        snap.id = *id;
        Ok(snap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_blob_is_idempotent() {
        let repo = InMemoryRepository::new().unwrap();
        let data = Bytes::from_static(b"some data");

        let id1 = repo.save_blob(BlobType::Data, data.clone(), None).unwrap();
        let id2 = repo.save_blob(BlobType::Data, data, None).unwrap();

        assert_eq!(id1, id2);
        assert_eq!(repo.stats().data_blobs_written, 1);
    }

    #[test]
    fn test_save_and_load_tree_roundtrip() {
        let repo = InMemoryRepository::new().unwrap();
        let tree = Tree::new();

        let id = repo.save_tree(&tree).unwrap();
        let loaded = repo.load_tree(&id).unwrap();

        assert!(loaded.nodes.is_empty());
    }

    #[test]
    fn test_load_missing_tree_fails() {
        let repo = InMemoryRepository::new().unwrap();
        assert!(repo.load_tree(&Id::random()).is_err());
    }

    #[test]
    fn test_save_tree_is_order_independent() {
        use std::ffi::OsString;

        use crate::backend::node::{Metadata, Node, NodeType};

        let node = |name: &str| {
            Node::new_node(&OsString::from(name), NodeType::File, Metadata::default())
        };

        let mut t1 = Tree::new();
        t1.add(node("a"));
        t1.add(node("b"));

        let mut t2 = Tree::new();
        t2.add(node("b"));
        t2.add(node("a"));

        let repo = InMemoryRepository::new().unwrap();
        assert_eq!(repo.save_tree(&t1).unwrap(), repo.save_tree(&t2).unwrap());
    }
}
