//! Cooperative cancellation for snapshot runs.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::{error::ArchiverErrorKind, CairnResult};

/// A `CancelToken` is threaded through every I/O-bearing archiver operation.
///
/// The token is observed at defined suspension points: around each chunk
/// retrieval and blob save, at entry to each directory enumeration and before
/// each repository call. Once canceled, the running snapshot fails with
/// [`ArchiverErrorKind::Canceled`] and no snapshot record is persisted.
///
/// Cloning is cheap; all clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    canceled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a new, not yet canceled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. This is safe to call from another thread,
    /// e.g. from a signal handler.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Fails with [`ArchiverErrorKind::Canceled`] if cancellation has been
    /// requested.
    pub(crate) fn check(&self) -> CairnResult<()> {
        if self.is_canceled() {
            Err(ArchiverErrorKind::Canceled.into())
        } else {
            Ok(())
        }
    }
}
