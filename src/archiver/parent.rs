//! The reuse oracle: deciding whether nodes from the parent snapshot are
//! still a faithful representation of the current filesystem entries.

use log::warn;

use crate::{backend::node::Node, blob::tree::Tree, repository::Repository};

/// The result of a lookup in the parent tree.
///
/// # Type Parameters
///
/// * `T` - The type of the matched parent.
#[derive(Clone, Copy, Debug)]
pub(crate) enum ParentResult<T> {
    /// A prior node was found and matches the current entry.
    Matched(T),
    /// No prior node exists for the current entry.
    NotFound,
    /// A prior node exists but does not match the current entry.
    NotMatched,
}

/// Checks whether the prior node is still a faithful representation of the
/// current file.
///
/// A file counts as changed if there is no prior node, the prior node is no
/// regular file, or modification time, size or inode number disagree. The
/// inode check guards against edits which preserve size and mtime but
/// replace the file (rename-over); a prior inode of 0 matches anything, as
/// older snapshots may not have recorded inodes.
pub(crate) fn check_file<'a>(p_node: Option<&'a Node>, node: &Node) -> ParentResult<&'a Node> {
    let Some(p_node) = p_node else {
        return ParentResult::NotFound;
    };

    if p_node.is_file()
        && p_node.meta.mtime == node.meta.mtime
        && p_node.meta.size == node.meta.size
        && (p_node.meta.inode == 0 || p_node.meta.inode == node.meta.inode)
    {
        ParentResult::Matched(p_node)
    } else {
        ParentResult::NotMatched
    }
}

/// Loads the subtree of a prior directory node from the repository.
///
/// Any failure here - a prior node which is no directory, a missing subtree
/// id, a load error - degrades to `None`: the affected subdirectory is then
/// fully re-archived instead of aborting the snapshot. Parent data is an
/// optimization, never load-bearing.
pub(crate) fn load_subtree(repo: &impl Repository, p_node: Option<&Node>) -> Option<Tree> {
    let p_node = p_node?;

    let id = p_node.subtree.or_else(|| {
        if p_node.is_dir() {
            warn!("ignoring parent node {}: has no subtree!", p_node.name);
        }
        None
    })?;

    match repo.load_tree(&id) {
        Ok(tree) => Some(tree),
        Err(err) => {
            warn!("ignoring error when loading parent tree {id}: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use chrono::Local;

    use crate::backend::node::{Metadata, NodeType};

    use super::*;

    fn file_node(size: u64, inode: u64) -> Node {
        let meta = Metadata {
            mtime: Some(Local::now()),
            size,
            inode,
            ..Metadata::default()
        };
        Node::new_node(&OsString::from("f"), NodeType::File, meta)
    }

    #[test]
    fn test_missing_prior_node_is_not_found() {
        let node = file_node(1, 2);
        assert!(matches!(check_file(None, &node), ParentResult::NotFound));
    }

    #[test]
    fn test_identical_node_matches() {
        let node = file_node(1, 2);
        let prior = node.clone();
        assert!(matches!(
            check_file(Some(&prior), &node),
            ParentResult::Matched(_)
        ));
    }

    #[test]
    fn test_size_mismatch_is_not_matched() {
        let node = file_node(1, 2);
        let mut prior = node.clone();
        prior.meta.size = 42;
        assert!(matches!(
            check_file(Some(&prior), &node),
            ParentResult::NotMatched
        ));
    }

    #[test]
    fn test_inode_mismatch_is_not_matched() {
        let node = file_node(1, 2);
        let mut prior = node.clone();
        prior.meta.inode = 42;
        assert!(matches!(
            check_file(Some(&prior), &node),
            ParentResult::NotMatched
        ));
    }

    #[test]
    fn test_zero_prior_inode_matches_anything() {
        let node = file_node(1, 2);
        let mut prior = node.clone();
        prior.meta.inode = 0;
        assert!(matches!(
            check_file(Some(&prior), &node),
            ParentResult::Matched(_)
        ));
    }

    #[test]
    fn test_prior_dir_is_not_matched() {
        let node = file_node(1, 2);
        let mut prior = node.clone();
        prior.node_type = NodeType::Dir;
        assert!(matches!(
            check_file(Some(&prior), &node),
            ParentResult::NotMatched
        ));
    }

    #[test]
    fn test_mtime_mismatch_is_not_matched() {
        let node = file_node(1, 2);
        let mut prior = node.clone();
        prior.meta.mtime = None;
        assert!(matches!(
            check_file(Some(&prior), &node),
            ParentResult::NotMatched
        ));
    }
}
