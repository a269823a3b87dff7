//! Error types and Result module.

use std::{error::Error, ffi::OsString, num::ParseIntError, path::PathBuf};

use displaydoc::Display;
use thiserror::Error;

use crate::id::Id;

/// Result type that is being returned from methods that can fail and thus have [`CairnError`]s.
pub type CairnResult<T> = Result<T, CairnError>;

// [`CairnError`] is public, but opaque and easy to keep compatible.
#[derive(Error, Debug)]
#[error(transparent)]
/// Errors that can result from cairn.
pub struct CairnError(#[from] CairnErrorKind);

// Accessors for anything we do want to expose publicly.
impl CairnError {
    /// Expose the inner error kind.
    ///
    /// This is useful for matching on the error kind.
    pub fn into_inner(self) -> CairnErrorKind {
        self.0
    }

    /// Checks if the error is a cancellation.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(
            self.0,
            CairnErrorKind::Archiver(ArchiverErrorKind::Canceled)
        )
    }
}

/// [`CairnErrorKind`] describes the errors that can happen while executing a snapshot run.
///
/// This is a non-exhaustive enum, so additional variants may be added in future. It is
/// recommended to match against the wildcard `_` instead of listing all possible variants,
/// to avoid problems when new variants are added.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CairnErrorKind {
    /// [`PolynomialErrorKind`] describes the errors that can happen while dealing with Polynomials
    #[error(transparent)]
    Polynomial(#[from] PolynomialErrorKind),

    /// [`IdErrorKind`] describes the errors that can be returned by processing IDs
    #[error(transparent)]
    Id(#[from] IdErrorKind),

    /// [`NodeErrorKind`] describes the errors that can be returned by working with a node
    #[error(transparent)]
    Node(#[from] NodeErrorKind),

    /// [`TreeErrorKind`] describes the errors that can come up dealing with Trees
    #[error(transparent)]
    Tree(#[from] TreeErrorKind),

    /// [`ConfigFileErrorKind`] describes the errors that can be returned for `ConfigFile`s
    #[error(transparent)]
    ConfigFile(#[from] ConfigFileErrorKind),

    /// [`SnapshotFileErrorKind`] describes the errors that can be returned for `SnapshotFile`s
    #[error(transparent)]
    SnapshotFile(#[from] SnapshotFileErrorKind),

    /// [`ArchiverErrorKind`] describes the errors that can be returned from the archiver
    #[error(transparent)]
    Archiver(#[from] ArchiverErrorKind),

    /// [`LocalSourceErrorKind`] describes the errors that can be returned by reading the local filesystem
    #[error(transparent)]
    LocalSource(#[from] LocalSourceErrorKind),

    /// [`RepositoryErrorKind`] describes the errors that can be returned by the repository
    #[error(transparent)]
    Repository(#[from] RepositoryErrorKind),

    /// [`std::io::Error`]
    #[error(transparent)]
    StdIo(#[from] std::io::Error),
}

/// [`PolynomialErrorKind`] describes the errors that can happen while dealing with Polynomials
#[derive(Error, Debug, Display)]
#[non_exhaustive]
pub enum PolynomialErrorKind {
    /// no suitable polynomial found
    NoSuitablePolynomialFound,
}

/// [`IdErrorKind`] describes the errors that can be returned by processing IDs
#[derive(Error, Debug, Display)]
#[non_exhaustive]
pub enum IdErrorKind {
    /// Hex decoding error: `{0:?}`
    HexError(hex::FromHexError),
    /// Failed to parse Id from String `{0}`
    ParsingIdFromStringFailed(String),
}

/// [`NodeErrorKind`] describes the errors that can be returned by working with a node
#[derive(Error, Debug, Display)]
#[non_exhaustive]
pub enum NodeErrorKind {
    /// Unexpected EOF in escape sequence
    UnexpectedEOF,
    /// Invalid unicode codepoint in escape sequence
    InvalidUnicode,
    /// Unrecognized escape sequence
    UnrecognizedEscape,
    /// Parsing hex failed: `{0:?}`
    FromParseIntError(#[from] ParseIntError),
}

/// [`TreeErrorKind`] describes the errors that can come up dealing with Trees
#[derive(Error, Debug, Display)]
#[non_exhaustive]
pub enum TreeErrorKind {
    /// serializing the tree failed: `{0:?}`
    SerializingTreeFailed(serde_json::Error),
    /// deserializing the tree failed: `{0:?}`
    DeserializingTreeFailed(serde_json::Error),
}

/// [`ConfigFileErrorKind`] describes the errors that can be returned for `ConfigFile`s
#[derive(Error, Debug, Display)]
#[non_exhaustive]
pub enum ConfigFileErrorKind {
    /// parsing Polynomial failed: `{0:?}`
    ParsingFailedForPolynomial(#[from] ParseIntError),
}

/// [`SnapshotFileErrorKind`] describes the errors that can be returned for `SnapshotFile`s
#[derive(Error, Debug, Display)]
#[non_exhaustive]
pub enum SnapshotFileErrorKind {
    /// non-unicode hostname `{0:?}`
    NonUnicodeHostname(OsString),
    /// non-unicode path `{0:?}`
    NonUnicodePath(PathBuf),
    /// removing dots from path failed: `{0:?}`
    RemovingDotsFromPathFailed(std::io::Error),
    /// canonicalizing path failed: `{0:?}`
    CanonicalizingPathFailed(std::io::Error),
}

/// [`ArchiverErrorKind`] describes the errors that can be returned from the archiver
#[derive(Error, Debug, Display)]
#[non_exhaustive]
pub enum ArchiverErrorKind {
    /// the snapshot run was canceled
    Canceled,
    /// reading file content failed: `{0:?}`
    ReadingFileFailed(std::io::Error),
    /// entry is no regular file: `{0:?}`
    NotARegularFile(PathBuf),
    /// archive tree node `{0:?}` has no file info path
    MissingFileInfoPath(PathBuf),
    /// current working directory could not be determined: `{0:?}`
    GettingCurrentDirectoryFailed(std::io::Error),
}

/// [`LocalSourceErrorKind`] describes the errors that can be returned by reading the local filesystem
#[derive(Error, Debug, Display)]
#[non_exhaustive]
pub enum LocalSourceErrorKind {
    /// opening file failed: `{0:?}`
    OpeningFileFailed(std::io::Error),
    /// statting file or directory failed: `{0:?}`
    StattingFileFailed(std::io::Error),
    /// reading directory failed: `{0:?}`
    ReadingDirectoryFailed(std::io::Error),
    /// reading symlink target failed: `{0:?}`
    ReadingLinkTargetFailed(std::io::Error),
    /// conversion failed: `{0:?}`
    FromTryFromIntError(#[from] std::num::TryFromIntError),
}

/// [`RepositoryErrorKind`] describes the errors that can be returned by the repository
#[derive(Error, Debug, Display)]
#[non_exhaustive]
pub enum RepositoryErrorKind {
    /// blob `{0}` not found in repository
    BlobNotFound(Id),
    /// snapshot `{0}` not found in repository
    SnapshotNotFound(Id),
    /// serializing snapshot failed: `{0:?}`
    SerializingSnapshotFailed(serde_json::Error),
    /// deserializing snapshot failed: `{0:?}`
    DeserializingSnapshotFailed(serde_json::Error),
}

trait CairnErrorMarker: Error {}

impl CairnErrorMarker for PolynomialErrorKind {}
impl CairnErrorMarker for IdErrorKind {}
impl CairnErrorMarker for NodeErrorKind {}
impl CairnErrorMarker for TreeErrorKind {}
impl CairnErrorMarker for ConfigFileErrorKind {}
impl CairnErrorMarker for SnapshotFileErrorKind {}
impl CairnErrorMarker for ArchiverErrorKind {}
impl CairnErrorMarker for LocalSourceErrorKind {}
impl CairnErrorMarker for RepositoryErrorKind {}
impl CairnErrorMarker for std::io::Error {}

impl<E> From<E> for CairnError
where
    E: CairnErrorMarker,
    CairnErrorKind: From<E>,
{
    fn from(value: E) -> Self {
        Self(CairnErrorKind::from(value))
    }
}
