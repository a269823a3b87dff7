//! Reporting hooks for snapshot runs.

use std::path::Path;

use crate::backend::node::Node;

/// What happened to an entry during a snapshot run, compared to the parent
/// snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// The entry was not present in the parent snapshot.
    New,
    /// The entry was present in the parent snapshot but has changed.
    Changed,
    /// The entry was reused unmodified from the parent snapshot.
    Unchanged,
}

/// A `Report` receives completion events while a snapshot run progresses.
///
/// `file` is called once per regular file after its node has been produced;
/// `dir` is called once per directory after its subtree has been saved.
/// Implementations should be fast; they run inline with the traversal.
pub trait Report {
    /// Called when a regular file has been archived or reused.
    fn file(&self, _path: &Path, _node: &Node, _action: Action) {}

    /// Called when a directory has been fully archived.
    fn dir(&self, _path: &Path, _node: &Node) {}
}

/// A [`Report`] that does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoReport;

impl Report for NoReport {}
