/*!
A library for incremental, deduplicated snapshots of filesystem trees.

# Overview

The main type of this crate is the [`Archiver`]: given a [`Repository`] to
write to and a [`BackupSource`] to read from, it turns a list of target
paths into a content-addressed snapshot. File bodies are cut into
content-defined chunks so that unchanged and shifted regions deduplicate
across files and snapshot versions; given a parent snapshot, entries whose
metadata is unchanged are reused without re-reading their bytes.

The repository side - pack assembly, index layout, encryption, backend I/O -
is behind the [`Repository`] trait and out of scope of this crate; the
bundled [`InMemoryRepository`] implements it for tests and experiments.

# Example - snapshot a directory into an in-memory repository

```rust
use cairn_core::{
    Archiver, CancelToken, InMemoryRepository, LocalSource, PathList, SnapshotOptions,
};

let repo = InMemoryRepository::new().unwrap();
let src = LocalSource::default();

let dir = tempfile::tempdir().unwrap();
std::fs::write(dir.path().join("hello.txt"), b"hello world\n").unwrap();

let archiver = Archiver::new(&repo, &src);
let snap = archiver
    .snapshot(
        &CancelToken::new(),
        &PathList::from(dir.path()),
        &SnapshotOptions::default(),
    )
    .unwrap();

assert!(!snap.id.is_null());
assert_eq!(snap.summary.unwrap().files_new, 1);
```
*/

#![forbid(unsafe_code)]
#![warn(
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications,
    bad_style,
    dead_code,
    missing_copy_implementations,
    missing_debug_implementations,
    non_shorthand_field_patterns,
    overflowing_literals,
    path_statements,
    trivial_numeric_casts,
    unused_results,
    unused_extern_crates,
    unused_import_braces,
    unconditional_recursion,
    unused,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true,
    clippy::cast_lossless,
    clippy::default_trait_access,
    clippy::doc_markdown,
    clippy::manual_string_new,
    clippy::match_same_arms,
    clippy::semicolon_if_nothing_returned,
    clippy::trivially_copy_pass_by_ref
)]
#![allow(clippy::module_name_repetitions, clippy::redundant_pub_crate)]

pub(crate) mod archiver;
pub(crate) mod backend;
pub(crate) mod blob;
pub(crate) mod cancel;
pub(crate) mod chunker;
pub(crate) mod crypto;
pub(crate) mod error;
pub(crate) mod id;
pub(crate) mod progress;
pub(crate) mod repofile;
pub(crate) mod repository;

// cairn_core Public API
pub use crate::{
    archiver::Archiver,
    backend::{
        local::{LocalSource, LocalSourceOptions},
        node::{Metadata, Node, NodeType},
        BackupSource,
    },
    blob::{tree::Tree, BlobType, ALL_BLOB_TYPES},
    cancel::CancelToken,
    chunker::random_poly,
    error::{CairnError, CairnErrorKind, CairnResult},
    id::{HexId, Id},
    progress::{Action, NoReport, Report},
    repofile::{
        configfile::ConfigFile,
        snapshotfile::{PathList, SnapshotFile, SnapshotOptions, SnapshotSummary, StringList},
    },
    repository::{
        in_memory::{InMemoryRepository, WriteStats},
        Repository,
    },
};
