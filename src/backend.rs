pub(crate) mod local;
pub(crate) mod node;

use std::{ffi::OsString, io::Read, path::Path};

use crate::{backend::node::Node, CairnResult};

/// The filesystem contract consumed by the archiver.
///
/// All operations treat symlinks as the entries to be archived: nothing here
/// ever follows a symlink.
pub trait BackupSource {
    /// The type of an open file handle.
    type Reader: Read;

    /// Stats the given path without following symlinks and builds a [`Node`]
    /// from the result.
    ///
    /// The node name is the path's file name; callers which place the node
    /// at a different logical position overwrite it.
    fn node_from_path(&self, path: &Path) -> CairnResult<Node>;

    /// Opens the given file read-only, with symlink-following disabled.
    ///
    /// The returned [`Node`] is built by statting the open handle, so it
    /// describes exactly the entry that was opened, even if the path has
    /// been replaced concurrently.
    fn open_file(&self, path: &Path) -> CairnResult<(Self::Reader, Node)>;

    /// Enumerates the entry names of the given directory in one read pass
    /// and closes it again. The names are returned sorted.
    fn read_dir_names(&self, path: &Path) -> CairnResult<Vec<OsString>>;
}
