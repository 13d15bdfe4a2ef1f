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

//! The top-level factory: owns a repository path and hands out scoped
//! transactions and read-only snapshots against it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::engine::{CommitIdentity, Engine, HEAD_REF};
use crate::error::GitFsResult;
use crate::git_process::GitProcessEngine;
use crate::index_fs::IndexFs;
use crate::readonly_fs::ReadOnlyFs;
use crate::transaction::{default_identity, CommitOutcome, Transaction};

/// A handle on one bare git repository. Immutable; owns nothing but the
/// path and the engine used to talk to it. Cheap to clone and share across
/// threads — transactions and snapshots it hands out are the stateful
/// objects, not this handle itself.
#[derive(Clone)]
pub struct Repository {
    engine: Arc<dyn Engine + Send + Sync>,
    repo_dir: PathBuf,
}

impl Repository {
    /// Opens an existing bare repository at `repo_dir`. Does not verify the
    /// path exists or is actually a git directory; the first operation
    /// against it will surface that as an [`crate::error::EngineError`].
    pub fn open(repo_dir: impl Into<PathBuf>) -> Self {
        let repo_dir = repo_dir.into();
        let engine = GitProcessEngine::new(&repo_dir);
        Self::with_engine(Arc::new(engine), repo_dir)
    }

    /// Opens a repository against a caller-supplied [`Engine`], primarily
    /// for testing the transactional core against an in-memory fake.
    pub fn with_engine(engine: Arc<dyn Engine + Send + Sync>, repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            repo_dir: repo_dir.into(),
        }
    }

    /// Initializes a new bare repository at `repo_dir` and returns a handle
    /// to it. Outside the transactional core proper (§1 Out of scope), kept
    /// here as a thin convenience since every test and caller needs it.
    pub fn init_bare(repo_dir: impl Into<PathBuf>) -> GitFsResult<Self> {
        let repo_dir = repo_dir.into();
        let engine = GitProcessEngine::init_bare(&repo_dir)?;
        Ok(Self::with_engine(Arc::new(engine), repo_dir))
    }

    pub fn path(&self) -> &Path {
        &self.repo_dir
    }

    /// Begins a transaction against `reference` (default: [`HEAD_REF`])
    /// with the default commit identity. Call [`Transaction::enter`] to get
    /// the staging filesystem, then [`Transaction::commit`] when done.
    pub fn transaction(&self, reference: Option<&str>) -> Transaction {
        self.transaction_with_identity(reference, default_identity())
    }

    /// Same as [`Repository::transaction`] but with a caller-supplied
    /// commit identity and message, for callers that want their own
    /// authorship recorded instead of the tool's.
    pub fn transaction_with_identity(&self, reference: Option<&str>, identity: CommitIdentity) -> Transaction {
        Transaction::new(
            self.engine.clone(),
            self.repo_dir.clone(),
            reference.unwrap_or(HEAD_REF).to_string(),
            identity,
        )
    }

    /// Runs `body` against a fresh transaction's staging filesystem and
    /// commits on success. If `body` returns an error, the transaction is
    /// dropped without committing (the temporary index is still cleaned
    /// up) and the error is propagated. This is the common-case wrapper
    /// around the scoped enter/commit lifecycle in [`crate::transaction`].
    pub fn with_transaction<F>(&self, reference: Option<&str>, body: F) -> GitFsResult<CommitOutcome>
    where
        F: FnOnce(&IndexFs) -> GitFsResult<()>,
    {
        let mut txn = self.transaction(reference);
        let fs = txn.enter()?;
        body(&fs)?;
        txn.commit()
    }

    /// Opens a read-only snapshot at `revision` (default: [`HEAD_REF`]).
    /// The snapshot is immutable for its whole lifetime even if other
    /// writers advance the ref afterward.
    pub fn readonly(&self, revision: Option<&str>) -> GitFsResult<ReadOnlyFs> {
        ReadOnlyFs::open(self.engine.clone(), revision.unwrap_or(HEAD_REF))
    }
}

/// Repeatedly runs `body` as a transaction, retrying the whole body on
/// [`crate::error::GitFsError::RaceLost`] up to `max_attempts` times.
///
/// §5 states the core itself does not prescribe a retry policy; this is one
/// reasonable default for callers who want bounded retry without writing
/// their own loop. Not part of the transactional core's contract.
pub fn retry<F>(repo: &Repository, reference: Option<&str>, max_attempts: u32, mut body: F) -> GitFsResult<CommitOutcome>
where
    F: FnMut(&IndexFs) -> GitFsResult<()>,
{
    assert!(max_attempts > 0, "max_attempts must be positive");
    let mut last_error = None;
    for attempt in 1..=max_attempts {
        match repo.with_transaction(reference, &mut body) {
            Ok(outcome) => return Ok(outcome),
            Err(error) if error.is_race_lost() => {
                warn!(attempt, max_attempts, "lost the race to commit, retrying");
                last_error = Some(error);
            }
            Err(error) => return Err(error),
        }
    }
    debug!(max_attempts, "retry attempts exhausted");
    Err(last_error.expect("loop runs at least once"))
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository").field("repo_dir", &self.repo_dir).finish()
    }
}
