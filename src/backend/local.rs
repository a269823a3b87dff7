#[cfg(not(windows))]
use std::os::unix::fs::{FileTypeExt, MetadataExt, OpenOptionsExt};

use std::{
    ffi::OsString,
    fs::{read_link, File, Metadata as FsMetadata, OpenOptions},
    path::Path,
};

#[cfg(not(windows))]
use cached::proc_macro::cached;
#[cfg(not(windows))]
use chrono::TimeZone;
use chrono::{DateTime, Local, Utc};
use derive_setters::Setters;
use log::warn;
#[cfg(not(windows))]
use nix::unistd::{Gid, Group, Uid, User};
use serde_derive::{Deserialize, Serialize};

use crate::{
    backend::{
        node::{Metadata, Node, NodeType},
        BackupSource,
    },
    error::LocalSourceErrorKind,
    CairnResult,
};

/// [`LocalSourceOptions`] describes how entries read from the local
/// filesystem will be saved in the repository.
#[derive(Serialize, Deserialize, Default, Clone, Copy, Debug, Setters)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
#[setters(into)]
pub struct LocalSourceOptions {
    /// Save access time for files and directories
    pub with_atime: bool,

    /// Don't save device ID for files and directories
    pub ignore_devid: bool,
}

/// A [`LocalSource`] reads the entries to be archived from local paths.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalSource {
    opts: LocalSourceOptions,
}

impl LocalSource {
    /// Create a local source from [`LocalSourceOptions`].
    #[must_use]
    pub fn new(opts: LocalSourceOptions) -> Self {
        Self { opts }
    }

    /// Turn file metadata into a [`Node`], resolving symlink targets via
    /// `path`.
    fn map_meta(&self, path: &Path, m: &FsMetadata) -> CairnResult<Node> {
        let name = path.file_name().unwrap_or(path.as_os_str());
        let meta = self.map_metadata(m)?;

        let node = if m.is_dir() {
            Node::new_node(name, NodeType::Dir, meta)
        } else if m.is_symlink() {
            let target =
                read_link(path).map_err(LocalSourceErrorKind::ReadingLinkTargetFailed)?;
            let node_type = NodeType::from_link(&target);
            Node::new_node(name, node_type, meta)
        } else if let Some(node_type) = map_special(m) {
            Node::new_node(name, node_type, meta)
        } else {
            Node::new_node(name, NodeType::File, meta)
        };

        Ok(node)
    }

    #[cfg(not(windows))]
    fn map_metadata(&self, m: &FsMetadata) -> CairnResult<Metadata> {
        let uid = m.uid();
        let gid = m.gid();
        let user = get_user_by_uid(uid);
        let group = get_group_by_gid(gid);

        let mtime = m
            .modified()
            .ok()
            .map(|t| DateTime::<Utc>::from(t).with_timezone(&Local));
        let atime = if self.opts.with_atime {
            m.accessed()
                .ok()
                .map(|t| DateTime::<Utc>::from(t).with_timezone(&Local))
        } else {
            mtime
        };
        let ctime = Utc
            .timestamp_opt(
                m.ctime(),
                m.ctime_nsec()
                    .try_into()
                    .map_err(LocalSourceErrorKind::FromTryFromIntError)?,
            )
            .single()
            .map(|dt| dt.with_timezone(&Local));

        let size = if m.is_dir() { 0 } else { m.len() };
        let inode = m.ino();
        let device_id = if self.opts.ignore_devid { 0 } else { m.dev() };
        let links = if m.is_dir() { 0 } else { m.nlink() };

        Ok(Metadata {
            mode: Some(m.mode()),
            mtime,
            atime,
            ctime,
            uid: Some(uid),
            gid: Some(gid),
            user,
            group,
            inode,
            device_id,
            size,
            links,
        })
    }

    #[cfg(windows)]
    fn map_metadata(&self, m: &FsMetadata) -> CairnResult<Metadata> {
        let mtime = m
            .modified()
            .ok()
            .map(|t| DateTime::<Utc>::from(t).with_timezone(&Local));
        let atime = if self.opts.with_atime {
            m.accessed()
                .ok()
                .map(|t| DateTime::<Utc>::from(t).with_timezone(&Local))
        } else {
            mtime
        };
        let ctime = m
            .created()
            .ok()
            .map(|t| DateTime::<Utc>::from(t).with_timezone(&Local));

        Ok(Metadata {
            mode: None,
            mtime,
            atime,
            ctime,
            uid: None,
            gid: None,
            user: None,
            group: None,
            inode: 0,
            device_id: 0,
            size: if m.is_dir() { 0 } else { m.len() },
            links: 0,
        })
    }
}

impl BackupSource for LocalSource {
    type Reader = File;

    fn node_from_path(&self, path: &Path) -> CairnResult<Node> {
        let m = path
            .symlink_metadata()
            .map_err(LocalSourceErrorKind::StattingFileFailed)?;
        self.map_meta(path, &m)
    }

    fn open_file(&self, path: &Path) -> CairnResult<(Self::Reader, Node)> {
        let mut options = OpenOptions::new();
        _ = options.read(true);
        #[cfg(not(windows))]
        {
            _ = options.custom_flags(nix::libc::O_NOFOLLOW);
        }

        let file = options
            .open(path)
            .map_err(LocalSourceErrorKind::OpeningFileFailed)?;
        let m = file
            .metadata()
            .map_err(LocalSourceErrorKind::StattingFileFailed)?;
        let node = self.map_meta(path, &m)?;
        Ok((file, node))
    }

    fn read_dir_names(&self, path: &Path) -> CairnResult<Vec<OsString>> {
        let dir = path
            .read_dir()
            .map_err(LocalSourceErrorKind::ReadingDirectoryFailed)?;

        let mut names = dir
            .map(|entry| {
                entry
                    .map(|entry| entry.file_name())
                    .map_err(LocalSourceErrorKind::ReadingDirectoryFailed)
            })
            .collect::<Result<Vec<_>, _>>()?;

        names.sort_unstable();
        Ok(names)
    }
}

#[cfg(not(windows))]
fn map_special(m: &FsMetadata) -> Option<NodeType> {
    let ft = m.file_type();
    if ft.is_block_device() {
        Some(NodeType::Dev { device: m.rdev() })
    } else if ft.is_char_device() {
        Some(NodeType::Chardev { device: m.rdev() })
    } else if ft.is_fifo() {
        Some(NodeType::Fifo)
    } else if ft.is_socket() {
        Some(NodeType::Socket)
    } else {
        None
    }
}

#[cfg(windows)]
fn map_special(_m: &FsMetadata) -> Option<NodeType> {
    None
}

/// Get the user name for the given uid.
#[cfg(not(windows))]
#[cached]
fn get_user_by_uid(uid: u32) -> Option<String> {
    match User::from_uid(Uid::from_raw(uid)) {
        Ok(Some(user)) => Some(user.name),
        Ok(None) => None,
        Err(err) => {
            warn!("error getting user from uid {uid}: {err}");
            None
        }
    }
}

/// Get the group name for the given gid.
#[cfg(not(windows))]
#[cached]
fn get_group_by_gid(gid: u32) -> Option<String> {
    match Group::from_gid(Gid::from_raw(gid)) {
        Ok(Some(group)) => Some(group.name),
        Ok(None) => None,
        Err(err) => {
            warn!("error getting group from gid {gid}: {err}");
            None
        }
    }
}
