use std::path::Path;

use crate::{
    backend::{node::Node, BackupSource},
    blob::BlobType,
    cancel::CancelToken,
    chunker::Chunker,
    crypto::hasher::hash,
    error::ArchiverErrorKind,
    repository::Repository,
    CairnResult,
};

/// The `FileArchiver` is responsible for archiving regular files.
/// It will read the file, chunk it, and write the chunks to the repository.
pub(crate) struct FileArchiver<'a, R, S> {
    repo: &'a R,
    src: &'a S,
    chunker: Chunker,
}

impl<'a, R: Repository, S: BackupSource> FileArchiver<'a, R, S> {
    /// Creates a new `FileArchiver`.
    ///
    /// # Errors
    ///
    /// * If the repository's chunker polynomial cannot be parsed.
    pub(crate) fn new(repo: &'a R, src: &'a S) -> CairnResult<Self> {
        let poly = repo.config().poly()?;

        Ok(Self {
            repo,
            src,
            chunker: Chunker::new(poly),
        })
    }

    /// Archives one regular file.
    ///
    /// The file is opened without following symlinks, chunked, and each
    /// chunk is stored as a data blob. The returned node carries the blob
    /// ids in `content`, in stream order.
    ///
    /// The open handle is owned by the chunk iterator and released on every
    /// exit path, including errors and cancellation.
    ///
    /// # Errors
    ///
    /// * [`ArchiverErrorKind::NotARegularFile`] - If the opened entry turns out not to be a regular file.
    /// * [`ArchiverErrorKind::Canceled`] - If the run was canceled.
    ///
    /// [`ArchiverErrorKind::NotARegularFile`]: crate::error::ArchiverErrorKind::NotARegularFile
    /// [`ArchiverErrorKind::Canceled`]: crate::error::ArchiverErrorKind::Canceled
    pub(crate) fn save_file(&self, cancel: &CancelToken, path: &Path) -> CairnResult<Node> {
        let (reader, mut node) = self.src.open_file(path)?;

        if !node.is_file() {
            return Err(ArchiverErrorKind::NotARegularFile(path.to_path_buf()).into());
        }

        let size_hint = usize::try_from(node.meta.size).unwrap_or(usize::MAX);

        let mut content = Vec::new();
        for chunk in self.chunker.chunk(reader, size_hint) {
            cancel.check()?;
            let chunk = chunk.map_err(ArchiverErrorKind::ReadingFileFailed)?;

            let id = hash(&chunk);
            _ = self
                .repo
                .save_blob(BlobType::Data, chunk.into(), Some(id))?;
            cancel.check()?;

            content.push(id);
        }

        node.content = Some(content);
        Ok(node)
    }
}
