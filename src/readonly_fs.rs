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

//! A read-only, filesystem-shaped view over a single git commit snapshot.

use std::io::Read;
use std::sync::Arc;

use itertools::Itertools;

use crate::engine::{Engine, ListedEntry, PLACEHOLDER_NAME};
use crate::error::{GitFsError, GitFsResult};
use crate::object_id::{ObjectId, EMPTY_TREE_SHA1_HEX};
use crate::repo_path::RepoPathBuf;
use crate::tree_entry::{Mode, NodeStat};

struct Shared {
    engine: Arc<dyn Engine + Send + Sync>,
    /// The commit-ish (or the canonical empty tree, for an unborn branch)
    /// this view is pinned to. Resolved once, when the view was opened, so
    /// mutations elsewhere in the repository never become visible through
    /// an already-open view. `ls-tree` accepts a commit-ish directly, so
    /// there is no need to separately peel this down to a tree id.
    snapshot: String,
}

/// A node at some path inside a read-only snapshot of a repository at one
/// fixed commit (or the empty tree, for an unborn branch).
#[derive(Clone)]
pub struct ReadOnlyFs {
    shared: Arc<Shared>,
    path: RepoPathBuf,
}

impl ReadOnlyFs {
    /// Takes a snapshot of `rev` (falling back to the canonical empty tree
    /// if it does not currently exist) and returns a read-only view rooted
    /// at it.
    pub fn open(engine: Arc<dyn Engine + Send + Sync>, rev: &str) -> GitFsResult<Self> {
        let snapshot = match engine.rev_parse(rev)? {
            Some(commit) => commit.hex(),
            None => EMPTY_TREE_SHA1_HEX.to_string(),
        };
        Ok(Self {
            shared: Arc::new(Shared { engine, snapshot }),
            path: RepoPathBuf::root(),
        })
    }

    pub fn path(&self) -> &RepoPathBuf {
        &self.path
    }

    pub fn name(&self) -> &str {
        self.path.split_last().map_or("", |(_, last)| last)
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
        self.shared.engine.ls_tree(&self.shared.snapshot, path_arg, children)
    }

    /// Reads the full content of this path. Returns
    /// [`GitFsError::NotFound`] if nothing exists here, or a read from a
    /// directory is attempted.
    pub fn open(&self) -> GitFsResult<ReadOnlyFile> {
        let entry = self
            .listing(false)?
            .into_iter()
            .find(|e| e.path == self.path)
            .ok_or_else(|| GitFsError::NotFound {
                path: self.path.clone(),
            })?;
        let blob_id = entry.object.as_blob_id().cloned().ok_or_else(|| GitFsError::NotFound {
            path: self.path.clone(),
        })?;
        let content = self.shared.engine.cat_blob(&blob_id)?;
        Ok(ReadOnlyFile {
            content,
            position: 0,
        })
    }

    /// Lists the entries directly inside this directory, collapsing
    /// multi-segment children down to their first path segment.
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
            .dedup()
            .map(|head| self.child(&head))
            .collect()
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

    /// Size of this path's content. The root's size is defined to be zero
    /// rather than reproducing the upstream implementation's undefined
    /// behavior for that case (see DESIGN.md).
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

    /// Byte size of this path's content. Zero for the root, matching
    /// [`ReadOnlyFs::stat`].
    pub fn size(&self) -> GitFsResult<u64> {
        if self.path.is_root() {
            return Ok(0);
        }
        self.stat().map(|s| s.size())
    }

    fn mutation_error(&self) -> GitFsError {
        GitFsError::ReadOnlyFilesystem {
            path: self.path.clone(),
        }
    }

    pub fn mkdir(&self) -> GitFsResult<()> {
        Err(self.mutation_error())
    }

    pub fn remove(&self) -> GitFsResult<()> {
        Err(self.mutation_error())
    }

    pub fn unlink(&self) -> GitFsResult<()> {
        Err(self.mutation_error())
    }

    pub fn rmdir(&self) -> GitFsResult<()> {
        Err(self.mutation_error())
    }

    pub fn rename(&self, _new_path: &Self) -> GitFsResult<()> {
        Err(self.mutation_error())
    }
}

/// An immutable, fully materialized view of one blob's content.
pub struct ReadOnlyFile {
    content: Vec<u8>,
    position: usize,
}

impl Read for ReadOnlyFile {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = &self.content[self.position..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CommitIdentity, IndexUpdate};
    use crate::object_id::{BlobId, CommitId, ObjectId, TreeId};
    use crate::tree_entry::ObjectKind;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;

    /// An in-memory fake [`Engine`] sufficient to exercise [`ReadOnlyFs`]
    /// without spawning a real `git` process.
    #[derive(Default)]
    struct FakeEngine {
        commits: Mutex<HashMap<String, TreeId>>,
        trees: Mutex<HashMap<String, Vec<ListedEntry>>>,
        blobs: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl Engine for FakeEngine {
        fn rev_parse(&self, rev: &str) -> GitFsResult<Option<CommitId>> {
            if self.commits.lock().unwrap().contains_key(rev) {
                Ok(Some(CommitId::from_hex(rev).unwrap()))
            } else {
                Ok(None)
            }
        }

        fn resolve_tree(&self, commit: &CommitId) -> GitFsResult<TreeId> {
            self.commits
                .lock()
                .unwrap()
                .get(&commit.hex())
                .cloned()
                .ok_or_else(|| GitFsError::NotFound {
                    path: RepoPathBuf::root(),
                })
        }

        fn read_tree(&self, _tree: &TreeId, _index_path: &Path) -> GitFsResult<()> {
            unimplemented!("not exercised by ReadOnlyFs tests")
        }

        fn ls_tree(
            &self,
            treeish: &str,
            path: Option<&RepoPathBuf>,
            children: bool,
        ) -> GitFsResult<Vec<ListedEntry>> {
            let entries = self.trees.lock().unwrap().get(treeish).cloned().unwrap_or_default();
            Ok(entries
                .into_iter()
                .filter(|e| match path {
                    None => true,
                    Some(p) if p.is_root() => true,
                    Some(p) if children => {
                        e.path.as_str().starts_with(&format!("{}/", p.as_str()))
                    }
                    Some(p) => {
                        e.path == *p || e.path.as_str().starts_with(&format!("{}/", p.as_str()))
                    }
                })
                .collect())
        }

        fn ls_files(
            &self,
            _index_path: &Path,
            _path: Option<&RepoPathBuf>,
            _children: bool,
        ) -> GitFsResult<Vec<ListedEntry>> {
            unimplemented!("not exercised by ReadOnlyFs tests")
        }

        fn cat_blob(&self, id: &BlobId) -> GitFsResult<Vec<u8>> {
            Ok(self.blobs.lock().unwrap().get(&id.hex()).cloned().unwrap_or_default())
        }

        fn blob_size(&self, id: &BlobId) -> GitFsResult<u64> {
            Ok(self.cat_blob(id)?.len() as u64)
        }

        fn write_blob(&self, content: &[u8]) -> GitFsResult<BlobId> {
            let hex = format!("{:040x}", content.len());
            self.blobs.lock().unwrap().insert(hex.clone(), content.to_vec());
            BlobId::from_hex(&hex).map_err(|_| unreachable!())
        }

        fn update_index(&self, _index_path: &Path, _updates: &[IndexUpdate]) -> GitFsResult<()> {
            unimplemented!("not exercised by ReadOnlyFs tests")
        }

        fn write_tree(&self, _index_path: &Path) -> GitFsResult<TreeId> {
            unimplemented!("not exercised by ReadOnlyFs tests")
        }

        fn commit_tree(
            &self,
            _tree: &TreeId,
            _parents: &[CommitId],
            _identity: &CommitIdentity,
        ) -> GitFsResult<CommitId> {
            unimplemented!("not exercised by ReadOnlyFs tests")
        }

        fn update_ref_cas(&self, _reference: &str, _new: &CommitId, _expected: &CommitId) -> GitFsResult<()> {
            unimplemented!("not exercised by ReadOnlyFs tests")
        }
    }

    fn blob_hex_for(len: usize) -> String {
        format!("{len:040x}")
    }

    #[test]
    fn unborn_branch_resolves_to_empty_tree_and_has_no_children() {
        let engine = Arc::new(FakeEngine::default());
        let fs = ReadOnlyFs::open(engine, "refs/heads/master").unwrap();
        assert_eq!(fs.shared.snapshot, EMPTY_TREE_SHA1_HEX);
        assert!(fs.isdir().unwrap());
        assert!(fs.exists().unwrap());
    }

    #[test]
    fn scoped_view_is_immune_to_later_writes() {
        let engine = Arc::new(FakeEngine::default());
        let content = b"THUD".to_vec();
        let blob_hex = blob_hex_for(content.len());
        engine.blobs.lock().unwrap().insert(blob_hex.clone(), content);
        let commit_hex = "1111111111111111111111111111111111111111";
        let tree_id = TreeId::from_hex(commit_hex).unwrap();
        engine.commits.lock().unwrap().insert(commit_hex.to_string(), tree_id);
        engine.trees.lock().unwrap().insert(
            commit_hex.to_string(),
            vec![ListedEntry {
                path: RepoPathBuf::root().join_relpath("bar").unwrap(),
                object: ObjectKind::Blob(BlobId::from_hex(&blob_hex).unwrap()),
                mode: Mode::Normal,
            }],
        );

        let snapshot = ReadOnlyFs::open(engine.clone(), commit_hex).unwrap();
        // Mutate the "repository" after the snapshot was taken.
        engine.trees.lock().unwrap().get_mut(commit_hex).unwrap().clear();

        let bar = snapshot.child("bar").unwrap();
        assert!(bar.exists().unwrap());
        assert_eq!(bar.size().unwrap(), 4);
    }

    #[test]
    fn write_operations_are_rejected() {
        let engine = Arc::new(FakeEngine::default());
        let fs = ReadOnlyFs::open(engine, "refs/heads/master").unwrap();
        let err = fs.mkdir().unwrap_err();
        assert!(matches!(err, GitFsError::ReadOnlyFilesystem { .. }));
        let err = fs.remove().unwrap_err();
        assert!(matches!(err, GitFsError::ReadOnlyFilesystem { .. }));
    }

    #[test]
    fn root_size_is_zero() {
        let engine = Arc::new(FakeEngine::default());
        let fs = ReadOnlyFs::open(engine, "refs/heads/master").unwrap();
        assert_eq!(fs.size().unwrap(), 0);
    }
}
