use std::ffi::OsStr;

use serde::{Deserialize, Deserializer};
use serde_derive::Serialize;

use crate::{
    backend::node::{node_name_order, Node},
    crypto::hasher::hash,
    error::TreeErrorKind,
    id::Id,
    CairnResult,
};

#[derive(Default, Serialize, Deserialize, Clone, Debug)]
/// A [`Tree`] is a list of [`Node`]s
pub struct Tree {
    #[serde(deserialize_with = "deserialize_null_default")]
    /// The nodes contained in the tree.
    ///
    /// This is sorted by `Node.name()`, i.e. by the node name as `OsString`
    pub nodes: Vec<Node>,
}

/// Deserializes `Option<T>` as `T::default()` if the value is `null`
pub(crate) fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    T: Default + Deserialize<'de>,
    D: Deserializer<'de>,
{
    let opt = Option::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

impl Tree {
    /// Creates a new `Tree` with no nodes.
    #[must_use]
    pub(crate) const fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Adds a node to the tree.
    ///
    /// # Arguments
    ///
    /// * `node` - The node to add.
    pub(crate) fn add(&mut self, node: Node) {
        self.nodes.push(node);
    }

    /// Looks up a node by its (unescaped) name.
    ///
    /// # Arguments
    ///
    /// * `name` - The name to look for.
    ///
    /// # Returns
    ///
    /// The node with the given name, or `None` if there is no such node.
    #[must_use]
    pub fn find(&self, name: &OsStr) -> Option<&Node> {
        self.nodes.iter().find(|node| node.name().as_os_str() == name)
    }

    /// Sorts the nodes into the canonical name order.
    ///
    /// Serialization relies on this order so that two equivalent trees
    /// hash to the same [`Id`] regardless of insertion order.
    pub(crate) fn sort(&mut self) {
        self.nodes.sort_unstable_by(node_name_order);
    }

    /// Serializes the tree in JSON format like restic does.
    ///
    /// # Returns
    ///
    /// A tuple of the serialized tree as `Vec<u8>` and the tree's ID, i.e. the hash of the serialized tree.
    ///
    /// # Errors
    ///
    /// * If the tree could not be serialized. This should never happen.
    pub(crate) fn serialize(&self) -> CairnResult<(Vec<u8>, Id)> {
        let mut chunk = serde_json::to_vec(&self).map_err(TreeErrorKind::SerializingTreeFailed)?;
        // # COMPATIBILITY
        //
        // We add a newline to be compatible with `restic` here
        chunk.push(b'\n');

        let id = hash(&chunk);

        Ok((chunk, id))
    }
}
