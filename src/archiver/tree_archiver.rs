use std::path::Path;

use log::{debug, trace};

use crate::{
    archiver::{
        file_archiver::FileArchiver,
        parent::{self, ParentResult},
        tree::{absolute, ArchiveTree},
    },
    backend::{
        node::{Node, NodeType},
        BackupSource,
    },
    blob::{tree::Tree, BlobType},
    cancel::CancelToken,
    error::ArchiverErrorKind,
    id::Id,
    progress::{Action, Report},
    repofile::snapshotfile::SnapshotSummary,
    repository::Repository,
    CairnResult,
};

/// The selection predicate: given the absolute path and the node of an
/// entry, decides whether it is archived.
pub type SelectFn<'a> = dyn Fn(&Path, &Node) -> bool + 'a;

/// The `TreeArchiver` drives the traversal of one snapshot run: it walks
/// directories and the virtual archive tree, consults the parent snapshot
/// for reuse and produces the trees making up the snapshot.
pub(crate) struct TreeArchiver<'a, R, S> {
    repo: &'a R,
    src: &'a S,
    file_archiver: FileArchiver<'a, R, S>,
    select: &'a SelectFn<'a>,
    report: &'a dyn Report,
    summary: SnapshotSummary,
}

impl<'a, R: Repository, S: BackupSource> TreeArchiver<'a, R, S> {
    /// Creates a new `TreeArchiver`.
    ///
    /// # Errors
    ///
    /// * If the repository's chunker polynomial cannot be parsed.
    pub(crate) fn new(
        repo: &'a R,
        src: &'a S,
        select: &'a SelectFn<'a>,
        report: &'a dyn Report,
    ) -> CairnResult<Self> {
        Ok(Self {
            repo,
            src,
            file_archiver: FileArchiver::new(repo, src)?,
            select,
            report,
            summary: SnapshotSummary::default(),
        })
    }

    /// Archives the virtual archive tree rooted at `atree`.
    ///
    /// Leaf children are archived from their filesystem path and inserted
    /// under their logical name; interior children recurse and produce a
    /// directory node whose metadata is taken from the child's
    /// `file_info_path`.
    pub(crate) fn save_archive_tree(
        &mut self,
        cancel: &CancelToken,
        prefix: &Path,
        atree: &ArchiveTree,
        previous: Option<&Tree>,
    ) -> CairnResult<Tree> {
        let mut tree = Tree::new();

        let ArchiveTree::Dir { children, .. } = atree else {
            // from_targets always produces a dir at the root
            return Ok(tree);
        };

        for (name, child) in children {
            let p_node = previous.and_then(|tree| tree.find(name));

            match child {
                ArchiveTree::Leaf(path) => {
                    trace!(
                        "archiving {} as {}",
                        path.display(),
                        prefix.join(name).display()
                    );
                    if let Some(mut node) = self.save(cancel, prefix, path, p_node)? {
                        node.set_name(name);
                        tree.add(node);
                    }
                }
                ArchiveTree::Dir { file_info_path, .. } => {
                    let logical = prefix.join(name);
                    let p_tree = parent::load_subtree(self.repo, p_node);
                    let mut subtree =
                        self.save_archive_tree(cancel, &logical, child, p_tree.as_ref())?;

                    cancel.check()?;
                    let id = self.save_tree_blob(&mut subtree)?;

                    if file_info_path.as_os_str().is_empty() {
                        return Err(ArchiverErrorKind::MissingFileInfoPath(logical).into());
                    }
                    let mut node = self.src.node_from_path(file_info_path)?;
                    node.set_name(name);
                    node.subtree = Some(id);

                    self.report.dir(&logical, &node);
                    tree.add(node);
                }
            }
        }

        Ok(tree)
    }

    /// Unified entry for one filesystem target.
    ///
    /// Stats the target without following symlinks, applies the selection
    /// predicate (rejected entries yield `None`) and dispatches on the entry
    /// kind.
    pub(crate) fn save(
        &mut self,
        cancel: &CancelToken,
        prefix: &Path,
        target: &Path,
        previous: Option<&Node>,
    ) -> CairnResult<Option<Node>> {
        let node = self.src.node_from_path(target)?;

        if !(self.select)(&absolute(target)?, &node) {
            debug!("excluded: {}", target.display());
            return Ok(None);
        }

        let node = match node.node_type {
            NodeType::File => self.save_file(cancel, prefix, target, node, previous)?,
            NodeType::Dir => self.save_dir_node(cancel, prefix, target, node, previous)?,
            // other kinds carry all their data in the node itself
            _ => node,
        };

        Ok(Some(node))
    }

    /// Walks one on-disk directory and produces its tree.
    ///
    /// Entries rejected by the selection predicate are skipped; unchanged
    /// files are reused from `previous`.
    fn save_dir(
        &mut self,
        cancel: &CancelToken,
        prefix: &Path,
        dir: &Path,
        previous: Option<&Tree>,
    ) -> CairnResult<Tree> {
        cancel.check()?;
        let names = self.src.read_dir_names(dir)?;

        let mut tree = Tree::new();
        for name in names {
            let path = dir.join(&name);
            let node = self.src.node_from_path(&path)?;

            if !(self.select)(&absolute(&path)?, &node) {
                debug!("excluded: {}", path.display());
                continue;
            }

            let p_node = previous.and_then(|tree| tree.find(&name));

            let node = match node.node_type {
                NodeType::File => self.save_file(cancel, prefix, &path, node, p_node)?,
                NodeType::Dir => self.save_dir_node(cancel, prefix, &path, node, p_node)?,
                _ => node,
            };
            tree.add(node);
        }

        Ok(tree)
    }

    /// Recursively archives one subdirectory and returns its directory node
    /// with `subtree` set.
    fn save_dir_node(
        &mut self,
        cancel: &CancelToken,
        prefix: &Path,
        path: &Path,
        mut node: Node,
        p_node: Option<&Node>,
    ) -> CairnResult<Node> {
        let logical = prefix.join(node.name());
        trace!("entering {}", logical.display());

        let p_tree = parent::load_subtree(self.repo, p_node);
        let mut tree = self.save_dir(cancel, &logical, path, p_tree.as_ref())?;

        cancel.check()?;
        let id = self.save_tree_blob(&mut tree)?;
        node.subtree = Some(id);

        trace!("finishing {}", logical.display());
        self.report.dir(&logical, &node);
        Ok(node)
    }

    /// Archives one regular file, reusing the prior node when the reuse
    /// oracle reports it unchanged.
    fn save_file(
        &mut self,
        cancel: &CancelToken,
        prefix: &Path,
        path: &Path,
        node: Node,
        p_node: Option<&Node>,
    ) -> CairnResult<Node> {
        let filename = prefix.join(node.name());

        let (node, action) = match parent::check_file(p_node, &node) {
            ParentResult::Matched(p_node) => {
                debug!("unchanged file: {}", filename.display());
                self.summary.files_unmodified += 1;
                (p_node.clone(), Action::Unchanged)
            }
            ParentResult::NotMatched => {
                debug!("changed   file: {}", filename.display());
                self.summary.files_changed += 1;
                let node = self.file_archiver.save_file(cancel, path)?;
                self.count_file_data(&node);
                (node, Action::Changed)
            }
            ParentResult::NotFound => {
                debug!("new       file: {}", filename.display());
                self.summary.files_new += 1;
                let node = self.file_archiver.save_file(cancel, path)?;
                self.count_file_data(&node);
                (node, Action::New)
            }
        };

        self.summary.total_files_processed += 1;
        self.summary.total_bytes_processed += node.meta.size;
        self.report.file(&filename, &node, action);
        Ok(node)
    }

    fn count_file_data(&mut self, node: &Node) {
        self.summary.data_blobs += node.content.as_ref().map_or(0, Vec::len) as u64;
        self.summary.data_added_files += node.meta.size;
    }

    /// Serializes a tree and submits it as a tree blob.
    ///
    /// The tree is brought into canonical name order first, so tree ids are
    /// stable regardless of enumeration order.
    fn save_tree_blob(&mut self, tree: &mut Tree) -> CairnResult<Id> {
        tree.sort();
        let (chunk, id) = tree.serialize()?;

        self.summary.total_dirs_processed += 1;
        self.summary.total_dirsize_processed += chunk.len() as u64;
        self.summary.tree_blobs += 1;

        _ = self.repo.save_blob(BlobType::Tree, chunk.into(), Some(id))?;
        Ok(id)
    }

    /// Saves the root tree and hands back the run's summary.
    pub(crate) fn finalize(
        mut self,
        cancel: &CancelToken,
        tree: &mut Tree,
    ) -> CairnResult<(Id, SnapshotSummary)> {
        cancel.check()?;
        let id = self.save_tree_blob(tree)?;
        Ok((id, self.summary))
    }
}
