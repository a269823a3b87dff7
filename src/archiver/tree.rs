//! The virtual archive tree: the ephemeral logical layout of one snapshot
//! run, assembled from the user-supplied target paths.

use std::{
    collections::BTreeMap,
    ffi::OsString,
    path::{Component, Path, PathBuf},
};

use crate::{backend::BackupSource, error::ArchiverErrorKind, CairnResult};

/// A node in the logical tree built at snapshot time.
///
/// A leaf carries a filesystem path to archive; an interior node carries its
/// children and a `file_info_path`: the on-disk directory whose attributes
/// supply the directory metadata for that logical level. The two forms are
/// mutually exclusive by construction.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ArchiveTree {
    /// A filesystem path to be archived at this logical position.
    Leaf(PathBuf),
    /// An interior node of the logical layout.
    Dir {
        /// The children of this node, by logical name.
        children: BTreeMap<OsString, ArchiveTree>,
        /// The on-disk path supplying this level's directory metadata.
        /// Empty only for the root, which never becomes a node itself.
        file_info_path: PathBuf,
    },
}

impl ArchiveTree {
    fn empty_dir(file_info_path: PathBuf) -> Self {
        Self::Dir {
            children: BTreeMap::new(),
            file_info_path,
        }
    }

    /// Composes the given targets into one logical tree.
    ///
    /// Each target contributes exactly one leaf at the logical position
    /// mirroring its path structure; overlapping targets merge into a shared
    /// interior spine. A target lying under an already-inserted target is
    /// skipped, it is covered by the existing leaf.
    pub(crate) fn from_targets(targets: &[PathBuf]) -> Self {
        let mut root = Self::empty_dir(PathBuf::new());
        for target in targets {
            root.insert(target);
        }
        root
    }

    fn insert(&mut self, target: &Path) {
        let comps = path_components(target);
        if comps.is_empty() {
            // bare-relative targets have been resolved away before
            return;
        }

        // the on-disk prefix for interior levels starts with everything
        // before the first normal component (a root dir or leading `..`s)
        let mut fi_path = PathBuf::new();
        for comp in target.components() {
            match comp {
                Component::Normal(_) => break,
                comp => fi_path.push(comp.as_os_str()),
            }
        }

        self.insert_at(0, &comps, &mut fi_path, target);
    }

    fn insert_at(&mut self, idx: usize, comps: &[OsString], fi_path: &mut PathBuf, target: &Path) {
        let comp = &comps[idx];
        fi_path.push(comp);

        let children = match self {
            Self::Dir { children, .. } => children,
            // an ancestor of this target is already a leaf
            _ => return,
        };

        if idx == comps.len() - 1 {
            _ = children
                .entry(comp.clone())
                .or_insert_with(|| Self::Leaf(target.to_path_buf()));
        } else {
            children
                .entry(comp.clone())
                .or_insert_with(|| Self::empty_dir(fi_path.clone()))
                .insert_at(idx + 1, comps, fi_path, target);
        }
    }
}

/// The sequence of non-empty, non-`.` components of a path.
///
/// A target with zero components (`.`, `..`, `../..`, `/`) is bare-relative
/// and must be resolved into its children before tree construction.
pub(crate) fn path_components(path: &Path) -> Vec<OsString> {
    path.components()
        .filter_map(|comp| match comp {
            Component::Normal(name) => Some(name.to_os_string()),
            _ => None,
        })
        .collect()
}

/// Cleans a path lexically: collapses `.`, `..` and duplicate separators.
///
/// This mirrors Go's `filepath.Clean`: purely lexical, no filesystem access
/// and no working-directory involvement, so `.` stays `.` instead of turning
/// into an absolute path.
pub(crate) fn clean_path(path: &Path) -> PathBuf {
    let rooted = path.has_root();
    let mut out = PathBuf::new();
    let mut n_normal = 0_usize;

    for comp in path.components() {
        match comp {
            Component::Prefix(_) | Component::RootDir => out.push(comp.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if n_normal > 0 {
                    _ = out.pop();
                    n_normal -= 1;
                } else if !rooted {
                    out.push("..");
                }
                // `..` at the root stays at the root
            }
            Component::Normal(name) => {
                out.push(name);
                n_normal += 1;
            }
        }
    }

    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}

/// Replaces each bare-relative target with the list of its direct children.
///
/// A snapshot of `.` must contain the working directory's children at the
/// top level, not a single entry named `.`.
///
/// # Errors
///
/// * If the children of a bare-relative target cannot be enumerated.
pub(crate) fn resolve_targets<S: BackupSource>(
    src: &S,
    targets: Vec<PathBuf>,
) -> CairnResult<Vec<PathBuf>> {
    let mut resolved = Vec::new();

    for target in targets {
        if path_components(&target).is_empty() {
            for name in src.read_dir_names(&target)? {
                resolved.push(target.join(name));
            }
        } else {
            resolved.push(target);
        }
    }

    Ok(resolved)
}

/// Turns a path into a cleaned absolute path, for the selection predicate.
pub(crate) fn absolute(path: &Path) -> CairnResult<PathBuf> {
    if path.is_absolute() {
        Ok(clean_path(path))
    } else {
        let cwd = std::env::current_dir()
            .map_err(ArchiverErrorKind::GettingCurrentDirectoryFailed)?;
        Ok(clean_path(&cwd.join(path)))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("a/b/c", "a/b/c")]
    #[case("a//b", "a/b")]
    #[case("a/./b", "a/b")]
    #[case("a/b/..", "a")]
    #[case("a/../../b", "../b")]
    #[case(".", ".")]
    #[case("./", ".")]
    #[case("..", "..")]
    #[case("../..", "../..")]
    #[case("/", "/")]
    #[case("/..", "/")]
    #[case("/a/../b", "/b")]
    fn test_clean_path_cases(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(clean_path(Path::new(input)), PathBuf::from(expected));
    }

    #[rstest]
    #[case(".", 0)]
    #[case("..", 0)]
    #[case("../..", 0)]
    #[case("/", 0)]
    #[case("a", 1)]
    #[case("../a", 1)]
    #[case("/a/b", 2)]
    fn test_path_components_counts(#[case] input: &str, #[case] expected: usize) {
        assert_eq!(path_components(Path::new(input)).len(), expected);
    }

    #[test]
    fn test_overlapping_targets_share_a_spine() {
        let targets = [PathBuf::from("a/b"), PathBuf::from("a/c")];
        let tree = ArchiveTree::from_targets(&targets);

        let ArchiveTree::Dir { children, .. } = &tree else {
            panic!("root should be a dir");
        };
        assert_eq!(children.len(), 1);

        let ArchiveTree::Dir {
            children: a_children,
            file_info_path,
        } = &children[&OsString::from("a")]
        else {
            panic!("`a` should be an interior node");
        };
        assert_eq!(file_info_path, &PathBuf::from("a"));
        assert_eq!(a_children.len(), 2);
        assert_eq!(
            a_children[&OsString::from("b")],
            ArchiveTree::Leaf(PathBuf::from("a/b"))
        );
        assert_eq!(
            a_children[&OsString::from("c")],
            ArchiveTree::Leaf(PathBuf::from("a/c"))
        );
    }

    #[test]
    fn test_absolute_target_keeps_root_in_file_info_path() {
        let targets = [PathBuf::from("/data/work")];
        let tree = ArchiveTree::from_targets(&targets);

        let ArchiveTree::Dir { children, .. } = &tree else {
            panic!("root should be a dir");
        };
        let ArchiveTree::Dir { file_info_path, .. } = &children[&OsString::from("data")] else {
            panic!("`data` should be an interior node");
        };
        assert_eq!(file_info_path, &PathBuf::from("/data"));
    }

    #[test]
    fn test_target_under_existing_leaf_is_skipped() {
        let targets = [PathBuf::from("a"), PathBuf::from("a/b")];
        let tree = ArchiveTree::from_targets(&targets);

        let ArchiveTree::Dir { children, .. } = &tree else {
            panic!("root should be a dir");
        };
        assert_eq!(children[&OsString::from("a")], ArchiveTree::Leaf("a".into()));
    }
}
