// Copyright 2026 The gitfs Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A mutable, filesystem-shaped view over a git index file.
//!
//! [`IndexFs`] nodes are cheap, cloneable handles into one shared index: the
//! staging area lives entirely in the index file and in per-path working
//! files on disk, not in the [`IndexFs`] value itself. Do not run two
//! separate [`IndexFs`] trees (or process-external tools) against the same
//! index file concurrently; nothing here arbitrates that.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use itertools::Itertools;
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use crate::engine::{Engine, IndexUpdate, ListedEntry, PLACEHOLDER_NAME};
use crate::error::{GitFsError, GitFsResult};
use crate::object_id::BlobId;
use crate::repo_path::RepoPathBuf;
use crate::tree_entry::{Mode, NodeStat};

/// How a [`WorkingFile`] was opened, controlling whether its content is
/// promoted back into git object storage on last close.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum OpenMode {
    Read,
    /// Truncates existing content.
    Write,
    /// Starts positioned at the end of existing content.
    Append,
}

impl OpenMode {
    fn is_writable(self) -> bool {
        !matches!(self, Self::Read)
    }
}

/// Options controlling [`IndexFs::mkdir`].
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default)]
pub struct MkdirOptions {
    /// Do not fail if the directory already exists.
    pub may_exist: bool,
    /// Create missing intermediate directories instead of requiring the
    /// parent to already exist.
    pub create_parents: bool,
}

struct OpenFileState {
    users: usize,
    writable: bool,
}

struct Shared {
    engine: Arc<dyn Engine + Send + Sync>,
    index_path: PathBuf,
    open_files: Mutex<HashMap<RepoPathBuf, OpenFileState>>,
}

/// A node at some path inside an index-backed staging filesystem.
#[derive(Clone)]
pub struct IndexFs {
    shared: Arc<Shared>,
    path: RepoPathBuf,
}

impl IndexFs {
    /// Opens the root of the index at `index_path`, reading and writing
    /// objects through `engine`. The index file must already exist (see
    /// [`Engine::read_tree`], or a freshly initialized empty index).
    pub fn new(engine: Arc<dyn Engine + Send + Sync>, index_path: impl Into<PathBuf>) -> Self {
        Self {
            shared: Arc::new(Shared {
                engine,
                index_path: index_path.into(),
                open_files: Mutex::new(HashMap::new()),
            }),
            path: RepoPathBuf::root(),
        }
    }

    pub fn path(&self) -> &RepoPathBuf {
        &self.path
    }

    pub fn index_path(&self) -> &Path {
        &self.shared.index_path
    }

    /// Final path segment, or the empty string at the root.
    pub fn name(&self) -> &str {
        self.path.split_last().map_or("", |(_, last)| last)
    }

    fn same_index(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn with_path(&self, path: RepoPathBuf) -> Self {
        Self {
            shared: self.shared.clone(),
            path,
        }
    }

    pub fn join_relpath(&self, relpath: &str) -> GitFsResult<Self> {
        Ok(self.with_path(self.path.join_relpath(relpath)?))
    }

    pub fn child(&self, segment: &str) -> GitFsResult<Self> {
        Ok(self.with_path(self.path.child(segment)?))
    }

    pub fn parent(&self) -> Self {
        match self.path.split_last() {
            Some((parent, _)) => self.with_path(parent),
            None => self.clone(),
        }
    }

    fn listing(&self, children: bool) -> GitFsResult<Vec<ListedEntry>> {
        let path_arg = if self.path.is_root() {
            None
        } else {
            Some(&self.path)
        };
        self.shared
            .engine
            .ls_files(&self.shared.index_path, path_arg, children)
    }

    /// The entry staged at this exact path, distinguishing it from entries
    /// merely prefixed by this path (which mean this path is a directory).
    fn exact_entry(&self) -> GitFsResult<Option<ListedEntry>> {
        Ok(self
            .listing(false)?
            .into_iter()
            .find(|e| e.path == self.path))
    }

    /// The raw blob id staged at this exact path.
    ///
    /// Returns [`GitFsError::NotFound`] if nothing is staged here.
    pub fn git_get_sha1(&self) -> GitFsResult<BlobId> {
        let entry = self.exact_entry()?.ok_or_else(|| GitFsError::NotFound {
            path: self.path.clone(),
        })?;
        entry.object.as_blob_id().cloned().ok_or_else(|| GitFsError::NotFound {
            path: self.path.clone(),
        })
    }

    /// Stages `object` directly at several paths in one `update-index`
    /// call. All paths must belong to this same index.
    pub fn git_mass_set_sha1(&self, edits: &[(&Self, BlobId)]) -> GitFsResult<()> {
        let mut updates = Vec::with_capacity(edits.len());
        for (node, object) in edits {
            if !self.same_index(node) {
                return Err(GitFsError::CrossDeviceRename {
                    from: node.path.clone(),
                });
            }
            updates.push(IndexUpdate {
                path: node.path.clone(),
                entry: Some((Mode::Normal, object.clone())),
            });
        }
        self.shared.engine.update_index(&self.shared.index_path, &updates)
    }

    /// Stages `object` directly at this path, replacing whatever was there.
    /// The object must already exist in the repository; this does not
    /// verify that.
    pub fn git_set_sha1(&self, object: BlobId) -> GitFsResult<()> {
        self.git_mass_set_sha1(&[(self, object)])
    }

    fn path_sha_hex(&self) -> String {
        let mut hasher = Sha1::new();
        hasher.update(self.path.as_str().as_bytes());
        hex::encode(hasher.finalize())
    }

    fn work_file_path(&self) -> PathBuf {
        let mut name = self.shared.index_path.as_os_str().to_owned();
        name.push(".");
        name.push(self.path_sha_hex());
        name.push(".work");
        PathBuf::from(name)
    }

    fn tmp_file_path(&self) -> PathBuf {
        let mut name = self.shared.index_path.as_os_str().to_owned();
        name.push(".");
        name.push(self.path_sha_hex());
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Opens this path's content as a working file. Every open for the same
    /// path in this tree materializes the same on-disk working file the
    /// first time it's needed, so concurrent handles within one process see
    /// each other's writes once flushed.
    pub fn open(&self, mode: OpenMode) -> GitFsResult<WorkingFile> {
        let work_path = self.work_file_path();
        {
            let mut open_files = self.shared.open_files.lock().unwrap();
            if !open_files.contains_key(&self.path) {
                let content = match self.git_get_sha1() {
                    Ok(blob_id) => self.shared.engine.cat_blob(&blob_id)?,
                    Err(GitFsError::NotFound { .. }) => Vec::new(),
                    Err(other) => return Err(other),
                };
                let tmp_path = self.tmp_file_path();
                write_file(&tmp_path, &content)?;
                fs::rename(&tmp_path, &work_path).map_err(|e| GitFsError::io(&work_path, e))?;
                open_files.insert(
                    self.path.clone(),
                    OpenFileState {
                        users: 0,
                        writable: false,
                    },
                );
            }
            let state = open_files.get_mut(&self.path).expect("just inserted");
            state.users += 1;
            if mode.is_writable() {
                state.writable = true;
            }
        }

        let mut options = OpenOptions::new();
        match mode {
            OpenMode::Read => {
                options.read(true);
            }
            OpenMode::Write => {
                options.read(true).write(true).truncate(true);
            }
            OpenMode::Append => {
                options.read(true).write(true).append(true);
            }
        }
        let file = match options.open(&work_path) {
            Ok(f) => f,
            Err(e) => {
                let mut open_files = self.shared.open_files.lock().unwrap();
                if let Some(state) = open_files.get_mut(&self.path) {
                    state.users -= 1;
                }
                return Err(GitFsError::io(&work_path, e));
            }
        };

        Ok(WorkingFile {
            file: Some(file),
            path: self.path.clone(),
            mode,
            shared: self.shared.clone(),
            work_path,
            closed: false,
        })
    }

    /// Lists the entries directly inside this directory, collapsing
    /// multi-segment children down to their first path segment. Returns
    /// [`GitFsError::NotFound`] if this path has no staged descendants and
    /// is not the root.
    pub fn list(&self) -> GitFsResult<Vec<Self>> {
        let entries = self.listing(true)?;
        if entries.is_empty() && !self.path.is_root() {
            return Err(GitFsError::NotFound {
                path: self.path.clone(),
            });
        }
        let prefix = if self.path.is_root() {
            String::new()
        } else {
            format!("{}/", self.path.as_str())
        };
        entries
            .iter()
            .map(|entry| {
                let full = entry.path.as_str();
                let relative = full.strip_prefix(&prefix).unwrap_or(full);
                relative.split('/').next().unwrap_or(relative).to_string()
            })
            .filter(|head| head != PLACEHOLDER_NAME)
            // Listings come back lexicographically ordered, so repeated
            // first segments (from multi-segment descendants under the
            // same immediate child) are always adjacent here.
            .dedup()
            .map(|head| self.child(&head))
            .collect()
    }

    /// Creates this path as an empty directory by staging a placeholder
    /// blob underneath it, since git trees cannot represent an empty
    /// directory on their own.
    pub fn mkdir(&self, options: MkdirOptions) -> GitFsResult<()> {
        if !options.may_exist && self.exists()? {
            return Err(GitFsError::AlreadyExists {
                path: self.path.clone(),
            });
        }
        if !options.create_parents {
            let parent = self.parent();
            if parent.path != self.path && !parent.exists()? {
                return Err(GitFsError::NotFound {
                    path: parent.path.clone(),
                });
            }
        }
        let empty_blob = self.shared.engine.write_blob(b"")?;
        let placeholder = self.path.placeholder_child();
        self.shared.engine.update_index(
            &self.shared.index_path,
            &[IndexUpdate {
                path: placeholder,
                entry: Some((Mode::Normal, empty_blob)),
            }],
        )
    }

    /// Unstages this exact path.
    pub fn remove(&self) -> GitFsResult<()> {
        self.shared.engine.update_index(
            &self.shared.index_path,
            &[IndexUpdate {
                path: self.path.clone(),
                entry: None,
            }],
        )
    }

    pub fn unlink(&self) -> GitFsResult<()> {
        self.remove()
    }

    /// Removes the placeholder that represents this directory's emptiness.
    /// Does not recurse; callers are expected to only call this once a
    /// directory's other children have already been removed.
    pub fn rmdir(&self) -> GitFsResult<()> {
        self.child(PLACEHOLDER_NAME)?.remove()
    }

    pub fn isdir(&self) -> GitFsResult<bool> {
        if self.path.is_root() {
            return Ok(true);
        }
        Ok(!self.listing(true)?.is_empty())
    }

    pub fn isfile(&self) -> GitFsResult<bool> {
        if self.path.is_root() {
            return Ok(false);
        }
        match self.listing(false)?.into_iter().next() {
            Some(entry) if entry.path == self.path => {
                Ok(matches!(entry.mode, Mode::Normal | Mode::Executable))
            }
            _ => Ok(false),
        }
    }

    pub fn islink(&self) -> GitFsResult<bool> {
        if self.path.is_root() {
            return Ok(false);
        }
        match self.listing(false)?.into_iter().next() {
            Some(entry) if entry.path == self.path => Ok(entry.mode == Mode::Symlink),
            _ => Ok(false),
        }
    }

    pub fn exists(&self) -> GitFsResult<bool> {
        if self.path.is_root() {
            return Ok(true);
        }
        Ok(!self.listing(false)?.is_empty())
    }

    pub fn stat(&self) -> GitFsResult<NodeStat> {
        if self.path.is_root() {
            return Ok(NodeStat::Directory);
        }
        match self.listing(false)?.into_iter().next() {
            Some(entry) if entry.path == self.path => {
                let blob_id = entry.object.as_blob_id().cloned().ok_or_else(|| {
                    GitFsError::NotFound {
                        path: self.path.clone(),
                    }
                })?;
                let size = self.shared.engine.blob_size(&blob_id)?;
                Ok(NodeStat::File {
                    mode: entry.mode,
                    size,
                })
            }
            Some(_) => Ok(NodeStat::Directory),
            None => Err(GitFsError::NotFound {
                path: self.path.clone(),
            }),
        }
    }

    /// Renames this node (and, if it's a directory, every staged
    /// descendant) to `new_path`, which must belong to the same index.
    pub fn rename(&mut self, new_path: &Self) -> GitFsResult<()> {
        if !self.same_index(new_path) {
            return Err(GitFsError::CrossDeviceRename {
                from: self.path.clone(),
            });
        }

        let entries = self.listing(false)?;
        let mut updates = Vec::new();

        if let Some(exact) = entries.iter().find(|e| e.path == self.path) {
            let blob_id = exact.object.as_blob_id().cloned().ok_or_else(|| GitFsError::NotFound {
                path: self.path.clone(),
            })?;
            updates.push(IndexUpdate {
                path: self.path.clone(),
                entry: None,
            });
            updates.push(IndexUpdate {
                path: new_path.path.clone(),
                entry: Some((exact.mode, blob_id)),
            });
        } else {
            let prefix = format!("{}/", self.path.as_str());
            for entry in &entries {
                let rel = entry
                    .path
                    .as_str()
                    .strip_prefix(&prefix)
                    .unwrap_or(entry.path.as_str());
                let old_path = entry.path.clone();
                let new_child_path = new_path.path.join_relpath(rel)?;
                let blob_id = entry.object.as_blob_id().cloned().ok_or_else(|| GitFsError::NotFound {
                    path: old_path.clone(),
                })?;
                updates.push(IndexUpdate {
                    path: old_path,
                    entry: None,
                });
                updates.push(IndexUpdate {
                    path: new_child_path,
                    entry: Some((entry.mode, blob_id)),
                });
            }
        }

        self.shared.engine.update_index(&self.shared.index_path, &updates)?;
        self.path = new_path.path.clone();
        Ok(())
    }

    /// Byte size of the blob staged at this exact path.
    pub fn size(&self) -> GitFsResult<u64> {
        let blob_id = self.git_get_sha1()?;
        self.shared.engine.blob_size(&blob_id)
    }
}

fn write_file(path: &Path, content: &[u8]) -> GitFsResult<()> {
    let mut f = File::create(path).map_err(|e| GitFsError::io(path, e))?;
    f.write_all(content).map_err(|e| GitFsError::io(path, e))?;
    Ok(())
}

/// A handle onto one path's staged content, backed by a deterministically
/// named working file on disk.
///
/// Content written here is not visible to git object storage until the last
/// writable handle for this path closes; see the module documentation.
pub struct WorkingFile {
    file: Option<File>,
    path: RepoPathBuf,
    mode: OpenMode,
    shared: Arc<Shared>,
    work_path: PathBuf,
    closed: bool,
}

impl WorkingFile {
    /// Explicitly closes this handle, propagating any error from promoting
    /// its content into git object storage. Dropping the handle without
    /// calling this performs the same work but discards the error (logged
    /// at `warn` level).
    pub fn close(mut self) -> GitFsResult<()> {
        self.close_impl()
    }

    fn close_impl(&mut self) -> GitFsResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(file) = self.file.as_mut() {
            if self.mode.is_writable() {
                file.flush().map_err(|e| GitFsError::io(&self.work_path, e))?;
            }
        }
        self.file = None;

        let mut open_files = self.shared.open_files.lock().unwrap();
        let is_last = {
            let state = open_files
                .get_mut(&self.path)
                .expect("open file state must exist while handles are outstanding");
            state.users -= 1;
            state.writable && state.users == 0
        };
        if is_last {
            open_files.remove(&self.path);
            drop(open_files);

            let content = fs::read(&self.work_path).map_err(|e| GitFsError::io(&self.work_path, e))?;
            fs::remove_file(&self.work_path).map_err(|e| GitFsError::io(&self.work_path, e))?;
            let blob_id = self.shared.engine.write_blob(&content)?;
            let node = IndexFs {
                shared: self.shared.clone(),
                path: self.path.clone(),
            };
            node.git_set_sha1(blob_id)?;
            debug!(path = %self.path, "promoted working file to git object storage");
        }
        Ok(())
    }
}

impl Read for WorkingFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.as_mut().expect("not yet closed").read(buf)
    }
}

impl Write for WorkingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.as_mut().expect("not yet closed").write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.as_mut().expect("not yet closed").flush()
    }
}

impl Seek for WorkingFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.as_mut().expect("not yet closed").seek(pos)
    }
}

impl Drop for WorkingFile {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(error) = self.close_impl() {
                warn!(path = %self.path, %error, "failed to promote working file on drop");
            }
        }
    }
}
