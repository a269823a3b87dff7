pub(crate) mod file_archiver;
pub(crate) mod parent;
pub(crate) mod tree;
pub(crate) mod tree_archiver;

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::{
    archiver::{
        tree::ArchiveTree,
        tree_archiver::{SelectFn, TreeArchiver},
    },
    backend::{node::Node, BackupSource},
    blob::tree::Tree,
    cancel::CancelToken,
    id::Id,
    progress::{NoReport, Report},
    repofile::snapshotfile::{PathList, SnapshotFile, SnapshotOptions},
    repository::Repository,
    CairnResult,
};

/// The `Archiver` is responsible for turning a set of filesystem targets
/// into a content-addressed, deduplicated snapshot.
///
/// It will walk the targets, chunk file contents, write the resulting blobs
/// and trees to the repository and finally persist a snapshot record. Given
/// a parent snapshot, unchanged entries are reused without re-reading their
/// bytes.
///
/// # Type Parameters
///
/// * `R` - The repository to write to.
/// * `S` - The filesystem to read from.
#[allow(missing_debug_implementations)]
pub struct Archiver<'a, R, S> {
    /// The repository to write to.
    repo: &'a R,

    /// The filesystem to read from.
    src: &'a S,

    /// The selection predicate; entries whose absolute path it rejects are
    /// not archived.
    select: Box<SelectFn<'a>>,

    /// Receives per-file and per-directory completion events.
    report: Box<dyn Report + 'a>,
}

impl<'a, R: Repository, S: BackupSource> Archiver<'a, R, S> {
    /// Creates a new `Archiver` which archives everything and reports
    /// nothing.
    ///
    /// Repository and filesystem are always configured here by construction;
    /// the remaining run-start validation (parsing the repository's chunker
    /// polynomial) happens when a snapshot run begins.
    pub fn new(repo: &'a R, src: &'a S) -> Self {
        Self {
            repo,
            src,
            select: Box::new(|_, _| true),
            report: Box::new(NoReport),
        }
    }

    /// Sets the selection predicate.
    ///
    /// The predicate receives the cleaned absolute path and the node of
    /// every entry encountered; entries it rejects are skipped (for
    /// directories: including their whole subtree).
    #[must_use]
    pub fn with_select(mut self, select: impl Fn(&Path, &Node) -> bool + 'a) -> Self {
        self.select = Box::new(select);
        self
    }

    /// Sets the report receiving completion events.
    #[must_use]
    pub fn with_report(mut self, report: impl Report + 'a) -> Self {
        self.report = Box::new(report);
        self
    }

    /// Runs one snapshot.
    ///
    /// The targets are cleaned, bare-relative targets are resolved into
    /// their children, and the resulting virtual archive tree is archived
    /// recursively. Afterwards the repository is flushed, its index saved,
    /// and the snapshot record persisted; its id is the snapshot id.
    ///
    /// If the run fails or is canceled, no snapshot record is persisted.
    /// Blobs already written are retained but unreferenced.
    ///
    /// # Arguments
    ///
    /// * `cancel` - Cancellation token, observed at every suspension point.
    /// * `source` - The target paths to archive.
    /// * `opts` - Options describing the snapshot to create.
    ///
    /// # Errors
    ///
    /// * If a target cannot be read or an I/O or repository operation fails.
    /// * [`ArchiverErrorKind::Canceled`] - If the run was canceled.
    ///
    /// [`ArchiverErrorKind::Canceled`]: crate::error::ArchiverErrorKind::Canceled
    pub fn snapshot(
        &self,
        cancel: &CancelToken,
        source: &PathList,
        opts: &SnapshotOptions,
    ) -> CairnResult<SnapshotFile> {
        let mut snap = SnapshotFile::from_options(opts)?;

        // clean each target path; the cleaned targets are what the snapshot records
        let targets: Vec<PathBuf> = source
            .paths()
            .iter()
            .map(|path| tree::clean_path(path))
            .collect();
        snap.paths.set_paths(&targets)?;

        // collapse targets lying under another target into their outermost
        // path, then resolve bare-relative targets into their children and
        // build the logical layout
        let targets = PathList::from(targets).merge().paths();
        let targets = tree::resolve_targets(self.src, targets)?;
        let atree = ArchiveTree::from_targets(&targets);

        let parent_tree = snap.parent.and_then(|id| self.load_parent_tree(&id));

        let mut archiver = TreeArchiver::new(
            self.repo,
            self.src,
            self.select.as_ref(),
            self.report.as_ref(),
        )?;
        let mut tree =
            archiver.save_archive_tree(cancel, Path::new("/"), &atree, parent_tree.as_ref())?;
        let (id, mut summary) = archiver.finalize(cancel, &mut tree)?;
        snap.tree = id;

        cancel.check()?;
        self.repo.flush()?;
        cancel.check()?;
        self.repo.save_index()?;

        summary.finalize(snap.time);
        snap.summary = Some(summary);

        cancel.check()?;
        let id = self.repo.save_snapshot(&snap)?;
        snap.id = id;

        info!("snapshot {id} successfully saved.");
        Ok(snap)
    }

    /// Loads the root tree of the parent snapshot.
    ///
    /// A missing or unreadable parent is never fatal: the run then proceeds
    /// as a full archive.
    fn load_parent_tree(&self, id: &Id) -> Option<Tree> {
        if id.is_null() {
            return None;
        }

        let snap = match self.repo.load_snapshot(id) {
            Ok(snap) => snap,
            Err(err) => {
                warn!("ignoring error loading parent snapshot {id}: {err}");
                return None;
            }
        };

        if snap.tree.is_null() {
            warn!("ignoring parent snapshot {id}: it has no tree");
            return None;
        }

        match self.repo.load_tree(&snap.tree) {
            Ok(tree) => Some(tree),
            Err(err) => {
                warn!("ignoring error loading parent tree {}: {err}", snap.tree);
                None
            }
        }
    }
}
