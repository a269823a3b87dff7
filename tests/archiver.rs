//! End-to-end snapshot scenarios against an in-memory repository.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
    thread::sleep,
    time::Duration,
};

use pretty_assertions::assert_eq;

use cairn_core::{
    Archiver, BlobType, CancelToken, ConfigFile, Id, InMemoryRepository, LocalSource, Node,
    PathList, Repository, SnapshotFile, SnapshotOptions, Tree,
};

/// Tests changing the current working directory take this lock.
static CWD_LOCK: Mutex<()> = Mutex::new(());

const TEST_POLY: u64 = 0x3DA3358B4DC173;

fn test_repo() -> InMemoryRepository {
    InMemoryRepository::with_config(ConfigFile::new(1, Id::random(), TEST_POLY))
}

fn archive(
    repo: &InMemoryRepository,
    targets: &PathList,
    opts: &SnapshotOptions,
) -> SnapshotFile {
    let src = LocalSource::default();
    let result = Archiver::new(repo, &src)
        .snapshot(&CancelToken::new(), targets, opts)
        .unwrap();
    result
}

fn root_tree(repo: &InMemoryRepository, snap: &SnapshotFile) -> Tree {
    repo.load_tree(&snap.tree).unwrap()
}

/// Concatenates the data blobs referenced by a file node.
fn reassemble(repo: &InMemoryRepository, node: &Node) -> Vec<u8> {
    let mut content = Vec::new();
    for id in node.content.as_ref().unwrap() {
        content.extend_from_slice(&repo.blob(BlobType::Data, id).unwrap());
    }
    content
}

#[test]
fn single_file_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("hello.txt"), b"hello world\n").unwrap();

    let repo = test_repo();
    let snap = archive(
        &repo,
        &PathList::from(dir.path()),
        &SnapshotOptions::default(),
    );

    assert!(!snap.id.is_null());
    assert!(!snap.tree.is_null());
    assert_eq!(repo.snapshot_ids(), vec![snap.id]);

    // walk down the spine made from the target path to the archived dir
    let tree = walk_to_dir_tree(&repo, &snap, dir.path());

    let node = tree.find("hello.txt".as_ref()).unwrap();
    assert!(node.is_file());
    assert_eq!(node.meta.size, 12);
    assert!(!node.content.as_ref().unwrap().is_empty());
    assert_eq!(reassemble(&repo, node), b"hello world\n");

    let summary = snap.summary.unwrap();
    assert_eq!(summary.files_new, 1);
    assert_eq!(summary.files_unmodified, 0);
    assert_eq!(summary.total_files_processed, 1);
}

/// Follows the logical spine for an absolute target directory and returns
/// the tree of the target directory itself.
fn walk_to_dir_tree(repo: &InMemoryRepository, snap: &SnapshotFile, target: &Path) -> Tree {
    let mut tree = root_tree(repo, snap);
    for comp in target
        .components()
        .filter(|c| matches!(c, std::path::Component::Normal(_)))
    {
        let node = tree
            .find(comp.as_os_str())
            .unwrap_or_else(|| panic!("missing spine node {comp:?}"));
        assert!(node.is_dir());
        tree = repo.load_tree(&node.subtree.unwrap()).unwrap();
    }
    tree
}

#[test]
fn second_snapshot_reuses_everything() {
    let _guard = CWD_LOCK.lock().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let d = dir.path().join("d");
    fs::create_dir(&d).unwrap();
    fs::write(d.join("hello.txt"), b"hello world\n").unwrap();

    let old_cwd = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    let repo = test_repo();
    let targets = PathList::from_strings(["d"]);

    let first = archive(&repo, &targets, &SnapshotOptions::default());
    let stats_after_first = repo.stats();

    let second = archive(
        &repo,
        &targets,
        &SnapshotOptions::default().parent(first.id),
    );

    std::env::set_current_dir(old_cwd).unwrap();

    // identical logical content: identical root tree
    assert_eq!(second.tree, first.tree);
    assert_eq!(second.parent, Some(first.id));

    // no new data blobs between the flush points of both runs
    assert_eq!(
        repo.stats().data_blobs_written,
        stats_after_first.data_blobs_written
    );

    let summary = second.summary.unwrap();
    assert_eq!(summary.files_unmodified, 1);
    assert_eq!(summary.files_new, 0);
    assert_eq!(summary.files_changed, 0);
}

#[test]
fn identical_files_deduplicate() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path().join("d");
    fs::create_dir(&d).unwrap();
    fs::write(d.join("a"), vec![0u8; 1024]).unwrap();
    fs::write(d.join("b"), vec![0u8; 1024]).unwrap();

    let repo = test_repo();
    let snap = archive(&repo, &PathList::from(&*d), &SnapshotOptions::default());

    let tree = walk_to_dir_tree(&repo, &snap, &d);
    let a = tree.find("a".as_ref()).unwrap();
    let b = tree.find("b".as_ref()).unwrap();

    assert_eq!(a.content, b.content);
    assert_eq!(repo.stats().data_blobs_written, 1);
}

#[test]
fn modified_file_keeps_sibling_node() {
    let dir = tempfile::tempdir().unwrap();
    let d = dir.path().join("d");
    fs::create_dir(&d).unwrap();
    fs::write(d.join("a"), vec![0u8; 1024]).unwrap();
    fs::write(d.join("b"), vec![0u8; 1024]).unwrap();

    let repo = test_repo();
    let targets = PathList::from(&*d);
    let first = archive(&repo, &targets, &SnapshotOptions::default());
    let first_tree = walk_to_dir_tree(&repo, &first, &d);

    // let the mtime move on, then append one byte to `a`
    sleep(Duration::from_millis(20));
    let mut content = vec![0u8; 1024];
    content.push(1);
    fs::write(d.join("a"), content).unwrap();

    let second = archive(&repo, &targets, &SnapshotOptions::default().parent(first.id));
    let second_tree = walk_to_dir_tree(&repo, &second, &d);

    // `b` is reused bit-identically, `a` has changed
    assert_eq!(
        second_tree.find("b".as_ref()).unwrap(),
        first_tree.find("b".as_ref()).unwrap()
    );
    assert_ne!(
        second_tree.find("a".as_ref()).unwrap().content,
        first_tree.find("a".as_ref()).unwrap().content
    );
    assert_eq!(
        reassemble(&repo, second_tree.find("a".as_ref()).unwrap()).len(),
        1025
    );

    let summary = second.summary.unwrap();
    assert_eq!(summary.files_changed, 1);
    assert_eq!(summary.files_unmodified, 1);
}

#[test]
fn bare_relative_target_expands_to_children() {
    let _guard = CWD_LOCK.lock().unwrap();

    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("x"), b"x content").unwrap();
    fs::write(dir.path().join("y"), b"y content").unwrap();

    let old_cwd = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    let repo = test_repo();
    let snap = archive(
        &repo,
        &PathList::from_strings(["."]),
        &SnapshotOptions::default(),
    );

    std::env::set_current_dir(old_cwd).unwrap();

    let tree = root_tree(&repo, &snap);
    assert!(tree.find(".".as_ref()).is_none());
    assert_eq!(
        tree.nodes.iter().map(Node::name).collect::<Vec<_>>(),
        vec!["x", "y"]
    );
}

#[test]
fn overlapping_targets_merge_into_one_spine() {
    let _guard = CWD_LOCK.lock().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let d = dir.path().join("d");
    fs::create_dir(&d).unwrap();
    fs::write(d.join("x"), b"x").unwrap();
    fs::write(d.join("y"), b"y").unwrap();

    let old_cwd = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    let repo = test_repo();
    let snap = archive(
        &repo,
        &PathList::from_strings(["d/x", "d/y"]),
        &SnapshotOptions::default(),
    );

    std::env::set_current_dir(old_cwd).unwrap();

    let tree = root_tree(&repo, &snap);
    assert_eq!(tree.nodes.len(), 1);

    let d_node = tree.find("d".as_ref()).unwrap();
    assert!(d_node.is_dir());

    let d_tree = repo.load_tree(&d_node.subtree.unwrap()).unwrap();
    assert_eq!(
        d_tree.nodes.iter().map(Node::name).collect::<Vec<_>>(),
        vec!["x", "y"]
    );
}

#[test]
fn ancestor_listed_after_its_subpath_is_archived_fully() {
    let _guard = CWD_LOCK.lock().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let d = dir.path().join("d");
    fs::create_dir(&d).unwrap();
    fs::write(d.join("b"), b"b").unwrap();
    fs::write(d.join("c"), b"c").unwrap();

    let old_cwd = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    // the subpath comes first; the ancestor must still win and be walked
    // completely
    let repo = test_repo();
    let snap = archive(
        &repo,
        &PathList::from_strings(["d/b", "d"]),
        &SnapshotOptions::default(),
    );

    std::env::set_current_dir(old_cwd).unwrap();

    let tree = root_tree(&repo, &snap);
    assert_eq!(tree.nodes.len(), 1);

    let d_node = tree.find("d".as_ref()).unwrap();
    assert!(d_node.is_dir());

    let d_tree = repo.load_tree(&d_node.subtree.unwrap()).unwrap();
    assert_eq!(
        d_tree.nodes.iter().map(Node::name).collect::<Vec<_>>(),
        vec!["b", "c"]
    );
}

#[test]
fn cancellation_leaves_no_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("hello.txt"), b"hello world\n").unwrap();

    let repo = test_repo();
    let src = LocalSource::default();

    let cancel = CancelToken::new();
    cancel.cancel();

    let result = Archiver::new(&repo, &src).snapshot(
        &cancel,
        &PathList::from(dir.path()),
        &SnapshotOptions::default(),
    );

    assert!(result.unwrap_err().is_canceled());
    assert!(repo.snapshot_ids().is_empty());
}

#[test]
fn cancellation_mid_run_leaves_no_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a"), b"a content").unwrap();
    fs::write(dir.path().join("b"), b"b content").unwrap();

    let repo = test_repo();
    let src = LocalSource::default();

    // cancel as soon as the traversal reaches the first entry
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let result = Archiver::new(&repo, &src)
        .with_select(move |_, _| {
            trigger.cancel();
            true
        })
        .snapshot(
            &cancel,
            &PathList::from(dir.path()),
            &SnapshotOptions::default(),
        );

    assert!(result.unwrap_err().is_canceled());
    assert!(repo.snapshot_ids().is_empty());
}

#[test]
fn rejected_entries_do_not_appear() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("keep.txt"), b"keep").unwrap();
    fs::write(dir.path().join("drop.skip"), b"drop").unwrap();
    let sub = dir.path().join("skipped-dir");
    fs::create_dir(&sub).unwrap();
    fs::write(sub.join("inner"), b"inner").unwrap();

    let repo = test_repo();
    let src = LocalSource::default();
    let snap = Archiver::new(&repo, &src)
        .with_select(|path: &Path, _node: &Node| {
            path.extension().map_or(true, |ext| ext != "skip")
                && path.file_name().map_or(true, |name| name != "skipped-dir")
        })
        .snapshot(
            &CancelToken::new(),
            &PathList::from(dir.path()),
            &SnapshotOptions::default(),
        )
        .unwrap();

    let tree = walk_to_dir_tree(&repo, &snap, dir.path());
    assert!(tree.find("keep.txt".as_ref()).is_some());
    assert!(tree.find("drop.skip".as_ref()).is_none());
    assert!(tree.find("skipped-dir".as_ref()).is_none());
}

#[test]
fn snapshots_are_deterministic() {
    let _guard = CWD_LOCK.lock().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let d = dir.path().join("d");
    fs::create_dir(&d).unwrap();
    fs::write(d.join("a"), b"content a").unwrap();
    let sub = d.join("sub");
    fs::create_dir(&sub).unwrap();
    fs::write(sub.join("b"), b"content b").unwrap();

    let old_cwd = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    let targets = PathList::from_strings(["d"]);

    let repo1 = test_repo();
    let snap1 = archive(&repo1, &targets, &SnapshotOptions::default());

    let repo2 = test_repo();
    let snap2 = archive(&repo2, &targets, &SnapshotOptions::default());

    std::env::set_current_dir(old_cwd).unwrap();

    assert_eq!(snap1.tree, snap2.tree);
}

#[test]
fn missing_parent_is_not_fatal() {
    let _guard = CWD_LOCK.lock().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let d = dir.path().join("d");
    fs::create_dir(&d).unwrap();
    fs::write(d.join("a"), b"content").unwrap();

    let old_cwd = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();

    let targets = PathList::from_strings(["d"]);

    let repo = test_repo();
    let without_parent = archive(&repo, &targets, &SnapshotOptions::default());

    // a parent id pointing to nothing loadable
    let with_bogus_parent = archive(
        &repo,
        &targets,
        &SnapshotOptions::default().parent(Id::random()),
    );

    std::env::set_current_dir(old_cwd).unwrap();

    assert_eq!(with_bogus_parent.tree, without_parent.tree);
}

#[cfg(not(windows))]
#[test]
fn symlinks_are_archived_not_followed() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("target"), b"pointee").unwrap();
    std::os::unix::fs::symlink("target", dir.path().join("link")).unwrap();

    let repo = test_repo();
    let snap = archive(
        &repo,
        &PathList::from(dir.path()),
        &SnapshotOptions::default(),
    );

    let tree = walk_to_dir_tree(&repo, &snap, dir.path());
    let link = tree.find("link".as_ref()).unwrap();

    assert!(link.is_symlink());
    assert_eq!(link.node_type.to_link(), PathBuf::from("target"));
    assert!(link.content.is_none());
}

#[test]
fn snapshot_records_options() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a"), b"x").unwrap();

    let repo = test_repo();
    let opts = SnapshotOptions::default()
        .host("testhost")
        .excludes(vec!["*.tmp".to_string()])
        .add_tags("blue,nightly")
        .unwrap();
    let snap = archive(&repo, &PathList::from(dir.path()), &opts);

    assert_eq!(snap.hostname, "testhost");
    assert_eq!(snap.tags.to_string(), "blue,nightly");
    assert!(snap.excludes.contains("*.tmp"));
    assert_eq!(snap.paths.iter().count(), 1);

    // the record round-trips through the repository
    let loaded = repo.load_snapshot(&snap.id).unwrap();
    assert_eq!(loaded.hostname, snap.hostname);
    assert_eq!(loaded.tree, snap.tree);
    assert_eq!(loaded.id, snap.id);
}
