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

//! Crate-wide error taxonomy.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::repo_path::RepoPathBuf;

/// Error raised while invoking the external `git` engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("could not spawn git process, looked for it in the OS path")]
    SpawnInPath(#[source] io::Error),
    #[error("could not spawn git process at {path}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to wait for git process")]
    Wait(#[source] io::Error),
    #[error("failed to write to git process stdin")]
    WriteStdin(#[source] io::Error),
    #[error("failed to read git process stdout")]
    ReadStdout(#[source] io::Error),
    #[error("git {command} failed with status {status}: {stderr}")]
    NonZeroExit {
        command: &'static str,
        status: i32,
        stderr: String,
    },
    #[error("git {command} produced malformed output: {detail}")]
    MalformedOutput {
        command: &'static str,
        detail: String,
    },
    #[error("git update-ref rejected the compare-and-swap for {reference}")]
    RefUpdateRejected { reference: String },
}

/// The crate-wide error surface, matching the taxonomy in the design
/// document: every operation raises exactly one of these kinds.
#[derive(Debug, Error)]
pub enum GitFsError {
    /// A path segment contained `/`, was exactly `..`, or an input path was
    /// absolute where a relative path was required.
    #[error("insecure path: {detail}")]
    InsecurePath { detail: String },

    /// Lookup on an absent path, or iteration of a non-root path that does
    /// not exist.
    #[error("not found: {path}")]
    NotFound { path: RepoPathBuf },

    /// `mkdir` without `may_exist` on a path that already exists.
    #[error("already exists: {path}")]
    AlreadyExists { path: RepoPathBuf },

    /// `rename` across two nodes that do not share a repository/index.
    #[error("cannot rename {from} to a path from a different repository or index")]
    CrossDeviceRename { from: RepoPathBuf },

    /// A mutating operation was attempted on a [`crate::readonly_fs::ReadOnlyFs`].
    #[error("filesystem is read-only, cannot perform this operation on {path}")]
    ReadOnlyFilesystem { path: RepoPathBuf },

    /// The commit compare-and-swap was rejected; the ref did not advance.
    #[error("lost the race to advance {reference}: retry the transaction")]
    RaceLost { reference: String },

    /// The external engine failed in a way that is fatal for this
    /// transaction.
    #[error("git engine error")]
    Engine(#[from] EngineError),

    /// Local filesystem I/O (working file materialization) failed.
    #[error("I/O error accessing {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type GitFsResult<T> = Result<T, GitFsError>;

impl GitFsError {
    pub(crate) fn insecure_path(detail: impl Into<String>) -> Self {
        Self::InsecurePath {
            detail: detail.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` if this is the recoverable race-lost condition that a
    /// caller may retry the whole transaction for.
    pub fn is_race_lost(&self) -> bool {
        matches!(self, Self::RaceLost { .. })
    }
}
