use std::{
    fmt::{self, Display},
    path::{Path, PathBuf},
    str::FromStr,
};

use chrono::{DateTime, Local};
use derive_setters::Setters;
use dunce::canonicalize;
use gethostname::gethostname;
use log::warn;
use path_dedot::ParseDot;
use serde_derive::{Deserialize, Serialize};

use crate::{error::SnapshotFileErrorKind, id::Id, CairnResult};

/// Options for creating a new [`SnapshotFile`] structure for a new snapshot.
///
/// # Note
///
/// The preferred way is to use [`SnapshotFile::from_options`] to create a
/// `SnapshotFile` for a new snapshot run.
#[derive(Deserialize, Serialize, Clone, Default, Debug, Setters)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
#[setters(into, strip_option)]
pub struct SnapshotOptions {
    /// Tags to add to the snapshot (can be specified multiple times)
    #[setters(skip)]
    pub tags: Vec<StringList>,

    /// Set the host name manually
    pub host: Option<String>,

    /// Set the snapshot time manually
    pub time: Option<DateTime<Local>>,

    /// Snapshot to use as parent
    pub parent: Option<Id>,

    /// Exclude patterns which were in effect for this snapshot.
    ///
    /// These are recorded in the snapshot; evaluating them is up to the
    /// selection predicate handed to the archiver.
    pub excludes: Vec<String>,
}

impl SnapshotOptions {
    /// Add tags to this [`SnapshotOptions`]
    ///
    /// # Arguments
    ///
    /// * `tag` - The tag to add
    pub fn add_tags(mut self, tag: &str) -> CairnResult<Self> {
        self.tags.push(StringList::from_str(tag)?);
        Ok(self)
    }

    /// Create a new [`SnapshotFile`] using this `SnapshotOption`s
    ///
    /// # Errors
    ///
    /// * If the hostname is not valid unicode
    pub fn to_snapshot(&self) -> CairnResult<SnapshotFile> {
        SnapshotFile::from_options(self)
    }
}

/// Summary information about a snapshot run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SnapshotSummary {
    /// New files compared to the last (i.e. parent) snapshot
    pub files_new: u64,

    /// Changed files compared to the last (i.e. parent) snapshot
    pub files_changed: u64,

    /// Unchanged files compared to the last (i.e. parent) snapshot
    pub files_unmodified: u64,

    /// Total processed files
    pub total_files_processed: u64,

    /// Total size of all processed files
    pub total_bytes_processed: u64,

    /// Total processed directories
    pub total_dirs_processed: u64,

    /// Total size of all processed dirs
    pub total_dirsize_processed: u64,

    /// Total number of data blobs submitted by this snapshot
    pub data_blobs: u64,

    /// Total number of tree blobs submitted by this snapshot
    pub tree_blobs: u64,

    /// Total bytes submitted as new/changed file content by this snapshot
    pub data_added_files: u64,

    /// Start time of the snapshot run.
    ///
    /// # Note
    ///
    /// This may differ from the snapshot `time`.
    pub backup_start: DateTime<Local>,

    /// The time that the snapshot run has been finished.
    pub backup_end: DateTime<Local>,

    /// Total duration of the snapshot run in seconds, i.e. the time between
    /// `backup_start` and `backup_end`
    pub backup_duration: f64,

    /// Total duration between the snapshot `time` and `backup_end`
    pub total_duration: f64,
}

impl Default for SnapshotSummary {
    fn default() -> Self {
        Self {
            files_new: Default::default(),
            files_changed: Default::default(),
            files_unmodified: Default::default(),
            total_files_processed: Default::default(),
            total_bytes_processed: Default::default(),
            total_dirs_processed: Default::default(),
            total_dirsize_processed: Default::default(),
            data_blobs: Default::default(),
            tree_blobs: Default::default(),
            data_added_files: Default::default(),
            backup_start: Local::now(),
            backup_end: Local::now(),
            backup_duration: Default::default(),
            total_duration: Default::default(),
        }
    }
}

impl SnapshotSummary {
    /// Fill in the end time and the durations.
    ///
    /// # Arguments
    ///
    /// * `snap_time` - The time of the snapshot
    pub(crate) fn finalize(&mut self, snap_time: DateTime<Local>) {
        let end_time = Local::now();
        self.backup_duration = (end_time - self.backup_start).num_milliseconds() as f64 / 1000.0;
        self.total_duration = (end_time - snap_time).num_milliseconds() as f64 / 1000.0;
        self.backup_end = end_time;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// A [`SnapshotFile`] is the repository representation of the snapshot
/// metadata saved in a repository.
///
/// It is usually saved in the repository under `snapshot/<ID>`
pub struct SnapshotFile {
    /// Timestamp of this snapshot
    pub time: DateTime<Local>,

    /// The Id of the parent snapshot that this snapshot has been based on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Id>,

    /// The tree blob id where the contents of this snapshot are stored
    pub tree: Id,

    /// The list of target paths contained in this snapshot
    pub paths: StringList,

    /// The hostname of the device on which the snapshot has been created
    #[serde(default)]
    pub hostname: String,

    /// The username that started the snapshot run
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,

    /// The uid of the username that started the snapshot run
    #[serde(default)]
    pub uid: u32,

    /// The gid of the username that started the snapshot run
    #[serde(default)]
    pub gid: u32,

    /// A list of tags for this snapshot
    #[serde(default, skip_serializing_if = "StringList::is_empty")]
    pub tags: StringList,

    /// Exclude patterns which were in effect for this snapshot
    #[serde(default, skip_serializing_if = "StringList::is_empty")]
    pub excludes: StringList,

    /// Summary information about the snapshot run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<SnapshotSummary>,

    /// The snapshot Id (not stored within the JSON)
    #[serde(default, skip_serializing_if = "Id::is_null")]
    pub id: Id,
}

impl Default for SnapshotFile {
    fn default() -> Self {
        Self {
            time: Local::now(),
            parent: Option::default(),
            tree: Id::default(),
            paths: StringList::default(),
            hostname: String::default(),
            username: String::default(),
            uid: Default::default(),
            gid: Default::default(),
            tags: StringList::default(),
            excludes: StringList::default(),
            summary: Option::default(),
            id: Id::default(),
        }
    }
}

impl SnapshotFile {
    /// Create a [`SnapshotFile`] from [`SnapshotOptions`].
    ///
    /// # Arguments
    ///
    /// * `opts` - The [`SnapshotOptions`] to use
    ///
    /// # Errors
    ///
    /// * [`SnapshotFileErrorKind::NonUnicodeHostname`] - If the hostname is not valid unicode
    ///
    /// [`SnapshotFileErrorKind::NonUnicodeHostname`]: crate::error::SnapshotFileErrorKind::NonUnicodeHostname
    pub fn from_options(opts: &SnapshotOptions) -> CairnResult<Self> {
        let hostname = match &opts.host {
            Some(host) => host.clone(),
            None => {
                let hostname = gethostname();
                hostname
                    .to_str()
                    .ok_or_else(|| SnapshotFileErrorKind::NonUnicodeHostname(hostname.clone()))?
                    .to_string()
            }
        };

        let time = opts.time.unwrap_or_else(Local::now);

        let (username, uid, gid) = user_info();

        let mut snap = Self {
            time,
            parent: opts.parent,
            hostname,
            username,
            uid,
            gid,
            excludes: StringList(opts.excludes.clone()),
            ..Self::default()
        };
        _ = snap.set_tags(opts.tags.clone());

        Ok(snap)
    }

    /// Add tag lists to this snapshot's tags.
    ///
    /// # Returns
    ///
    /// Whether the tags changed.
    pub fn set_tags(&mut self, tag_lists: Vec<StringList>) -> bool {
        let old_tags = std::mem::take(&mut self.tags);
        self.add_tags(tag_lists);
        old_tags != self.tags
    }

    /// Add tag lists to this snapshot's tags.
    pub fn add_tags(&mut self, tag_lists: Vec<StringList>) {
        for tag_list in tag_lists {
            self.tags.add_all(tag_list);
        }
        self.tags.sort();
    }
}

#[cfg(not(windows))]
fn user_info() -> (String, u32, u32) {
    let uid = nix::unistd::getuid();
    let gid = nix::unistd::getgid();
    let username = match nix::unistd::User::from_uid(uid) {
        Ok(Some(user)) => user.name,
        Ok(None) => String::new(),
        Err(err) => {
            warn!("error getting user from uid {uid}: {err}");
            String::new()
        }
    };
    (username, uid.as_raw(), gid.as_raw())
}

#[cfg(windows)]
fn user_info() -> (String, u32, u32) {
    (
        std::env::var("USERNAME").unwrap_or_default(),
        u32::default(),
        u32::default(),
    )
}

/// A list of strings, used for tags, paths and exclude patterns.
#[derive(Serialize, Deserialize, Default, Debug, PartialEq, Eq, Clone)]
pub struct StringList(pub(crate) Vec<String>);

impl FromStr for StringList {
    type Err = crate::CairnError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.split(',').map(ToString::to_string).collect()))
    }
}

impl Display for StringList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}

impl StringList {
    /// Returns whether a [`StringList`] contains a given String.
    #[must_use]
    pub fn contains(&self, s: &str) -> bool {
        self.0.iter().any(|m| m == s)
    }

    /// Returns whether a [`StringList`] is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Add all Strings from another [`StringList`].
    pub(crate) fn add_all(&mut self, sl: Self) {
        for s in sl.0 {
            if !self.contains(&s) {
                self.0.push(s);
            }
        }
    }

    /// Set the paths of the [`StringList`].
    ///
    /// # Errors
    ///
    /// * [`SnapshotFileErrorKind::NonUnicodePath`] - If a path is not valid unicode
    ///
    /// [`SnapshotFileErrorKind::NonUnicodePath`]: crate::error::SnapshotFileErrorKind::NonUnicodePath
    pub(crate) fn set_paths(&mut self, paths: &[PathBuf]) -> CairnResult<()> {
        self.0 = paths
            .iter()
            .map(|p| {
                Ok(p.to_str()
                    .ok_or_else(|| SnapshotFileErrorKind::NonUnicodePath(p.clone()))?
                    .to_string())
            })
            .collect::<CairnResult<Vec<_>>>()?;
        Ok(())
    }

    /// Sort the Strings in the [`StringList`].
    pub(crate) fn sort(&mut self) {
        self.0.sort_unstable();
    }

    /// Returns an iterator over the Strings in the [`StringList`].
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }
}

/// A list of target paths for a snapshot run.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct PathList(Vec<PathBuf>);

impl Display for PathList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some((first, rest)) = self.0.split_first() else {
            return Ok(());
        };
        write!(f, "{first:?}")?;
        for p in rest {
            write!(f, ",{p:?}")?;
        }
        Ok(())
    }
}

impl PathList {
    /// Create a `PathList` from `String`s.
    pub fn from_strings<I>(source: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Self(
            source
                .into_iter()
                .map(|source| PathBuf::from(source.as_ref()))
                .collect(),
        )
    }

    /// Number of paths in the `PathList`.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the `PathList` is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Clone the paths within this `PathList`.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.0.clone()
    }

    /// Sanitize paths: remove dots from the paths and canonicalize if needed.
    ///
    /// # Errors
    ///
    /// * [`SnapshotFileErrorKind::RemovingDotsFromPathFailed`] - If removing dots from a path failed
    /// * [`SnapshotFileErrorKind::CanonicalizingPathFailed`] - If canonicalizing a path failed
    ///
    /// [`SnapshotFileErrorKind::RemovingDotsFromPathFailed`]: crate::error::SnapshotFileErrorKind::RemovingDotsFromPathFailed
    /// [`SnapshotFileErrorKind::CanonicalizingPathFailed`]: crate::error::SnapshotFileErrorKind::CanonicalizingPathFailed
    pub fn sanitize(mut self) -> CairnResult<Self> {
        for path in &mut self.0 {
            *path = path
                .parse_dot()
                .map_err(SnapshotFileErrorKind::RemovingDotsFromPathFailed)?
                .to_path_buf();
        }
        if self.0.iter().any(|p| p.is_absolute()) {
            for path in &mut self.0 {
                *path =
                    canonicalize(&path).map_err(SnapshotFileErrorKind::CanonicalizingPathFailed)?;
            }
        }
        Ok(self)
    }

    /// Sort paths and filter out subpaths of already existing paths.
    #[must_use]
    pub fn merge(mut self) -> Self {
        // sort paths
        self.0.sort_unstable();

        let mut root_path: Option<PathBuf> = None;

        // filter out subpaths
        self.0.retain(|path| match &root_path {
            Some(root_path) if path.starts_with(root_path) => false,
            _ => {
                root_path = Some(path.clone());
                true
            }
        });

        self
    }
}

impl From<&Path> for PathList {
    fn from(path: &Path) -> Self {
        Self(vec![path.to_path_buf()])
    }
}

impl From<Vec<PathBuf>> for PathList {
    fn from(paths: Vec<PathBuf>) -> Self {
        Self(paths)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(vec!["a/b", "a/b/c", "a"], vec!["a"])]
    #[case(vec!["b", "a"], vec!["a", "b"])]
    #[case(vec!["a/b", "a/c"], vec!["a/b", "a/c"])]
    fn test_pathlist_merge_passes(#[case] input: Vec<&str>, #[case] expected: Vec<&str>) {
        let merged = PathList::from_strings(input).merge();
        assert_eq!(merged, PathList::from_strings(expected));
    }

    #[test]
    fn test_pathlist_sanitize_removes_dots() {
        let list = PathList::from_strings(["a/./b/../c"]).sanitize().unwrap();
        assert_eq!(list.paths(), vec![PathBuf::from("a/c")]);
    }

    #[test]
    fn test_stringlist_tags_passes() {
        let mut snap = SnapshotFile::default();
        _ = snap.set_tags(vec!["b,a".parse().unwrap(), "a,c".parse().unwrap()]);
        assert_eq!(snap.tags.to_string(), "a,b,c");
    }
}
