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

//! The adapter seam between the transactional core and the underlying git
//! object/ref store.
//!
//! Every mutation this crate makes is expressed as a call on [`Engine`]. The
//! production implementation ([`crate::git_process::GitProcessEngine`])
//! shells out to the real `git` binary, one child process per call, exactly
//! as each method's doc comment describes. Tests exercise the same trait
//! against an in-memory fake so path-validation, elision, and
//! directory-collapsing logic is covered without spawning a git process.

use crate::error::GitFsResult;
use crate::object_id::{BlobId, CommitId, TreeId};
use crate::repo_path::RepoPathBuf;
use crate::tree_entry::{Mode, ObjectKind};

/// Name of the empty blob committed alongside an otherwise-empty directory,
/// since git trees only record blobs and subtrees, never empty directories
/// on their own.
pub const PLACEHOLDER_NAME: &str = ".gitfs-placeholder";

/// The name newly initialized bare repositories give their first branch.
pub const DEFAULT_INITIAL_BRANCH: &str = "refs/heads/master";

/// The ref [`crate::repository::Repository::transaction`] and
/// [`crate::repository::Repository::readonly`] target when the caller does
/// not name one explicitly: the symbolic current branch.
pub const HEAD_REF: &str = "HEAD";

/// One entry returned by a tree or index listing, carrying its full path
/// (not just the final segment) so callers can tell an exact match apart
/// from a same-prefix descendant.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ListedEntry {
    pub path: RepoPathBuf,
    pub object: ObjectKind,
    pub mode: Mode,
}

/// One file to stage in a single `update-index --index-info` call, as used
/// by [`Engine::update_index`].
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct IndexUpdate {
    pub path: RepoPathBuf,
    /// `None` deletes the path (mode `0`, null object id).
    pub entry: Option<(Mode, BlobId)>,
}

/// Everything a commit needs beyond its tree and parents.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CommitIdentity {
    pub author_name: String,
    pub author_email: String,
    pub committer_name: String,
    pub committer_email: String,
    pub message: String,
}

/// The operations a bare git object/ref store must support for this crate's
/// transactional core to run against it.
pub trait Engine {
    /// Resolves `rev` to a commit id, or `Ok(None)` if it does not currently
    /// exist (an unborn branch). Equivalent to `git rev-parse --default
    /// <rev>` returning empty output.
    fn rev_parse(&self, rev: &str) -> GitFsResult<Option<CommitId>>;

    /// Resolves a commit to the id of the tree it points at. Equivalent to
    /// `git rev-parse <commit>^{tree}`.
    fn resolve_tree(&self, commit: &CommitId) -> GitFsResult<TreeId>;

    /// Populates an index file at `index_path` with the full contents of
    /// `tree`. Equivalent to `GIT_INDEX_FILE=<index_path> git read-tree
    /// <tree>`.
    fn read_tree(&self, tree: &TreeId, index_path: &std::path::Path) -> GitFsResult<()>;

    /// Lists entries within `treeish` (a commit or tree) matching `path`.
    ///
    /// When `children` is `true`, `path` is matched as a directory (a
    /// trailing `/` is implied), returning only its direct descendants. When
    /// `false`, `path` is matched bare: this returns the entry at `path`
    /// itself if it names a blob, or every descendant if it names a
    /// directory. `path == None` lists/matches the root.
    fn ls_tree(
        &self,
        treeish: &str,
        path: Option<&RepoPathBuf>,
        children: bool,
    ) -> GitFsResult<Vec<ListedEntry>>;

    /// Same matching rules as [`Engine::ls_tree`], against the index file at
    /// `index_path` instead of a commit or tree.
    fn ls_files(
        &self,
        index_path: &std::path::Path,
        path: Option<&RepoPathBuf>,
        children: bool,
    ) -> GitFsResult<Vec<ListedEntry>>;

    /// Reads the full content of a blob. Equivalent to `git cat-file blob
    /// <id>`.
    fn cat_blob(&self, id: &BlobId) -> GitFsResult<Vec<u8>>;

    /// Reads a blob's size without materializing its content. Equivalent to
    /// `git cat-file -s <id>`.
    fn blob_size(&self, id: &BlobId) -> GitFsResult<u64>;

    /// Hashes and writes `content` as a new blob, returning its id.
    /// Equivalent to `git hash-object -w --stdin`.
    fn write_blob(&self, content: &[u8]) -> GitFsResult<BlobId>;

    /// Applies a batch of stage/unstage operations to the index file at
    /// `index_path`. Equivalent to `GIT_INDEX_FILE=<index_path> git
    /// update-index -z --index-info` fed one line per update.
    fn update_index(&self, index_path: &std::path::Path, updates: &[IndexUpdate]) -> GitFsResult<()>;

    /// Writes the index at `index_path` out as a tree object, returning its
    /// id. Equivalent to `GIT_INDEX_FILE=<index_path> git write-tree`.
    fn write_tree(&self, index_path: &std::path::Path) -> GitFsResult<TreeId>;

    /// Creates a commit object with the given tree and parents, returning
    /// its id. Equivalent to `git commit-tree <tree> [-p <parent>]...` with
    /// the message piped on stdin.
    fn commit_tree(
        &self,
        tree: &TreeId,
        parents: &[CommitId],
        identity: &CommitIdentity,
    ) -> GitFsResult<CommitId>;

    /// Compare-and-swap update of `reference` to `new`, only if it currently
    /// holds `expected`. Returns [`crate::error::GitFsError::RaceLost`] if
    /// the ref's current value does not match `expected`. Equivalent to `git
    /// update-ref <reference> <new> <expected>`.
    fn update_ref_cas(
        &self,
        reference: &str,
        new: &CommitId,
        expected: &CommitId,
    ) -> GitFsResult<()>;
}
