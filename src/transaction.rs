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

//! The transaction lifecycle: snapshot a ref, stage operations against an
//! in-memory/on-disk index, then either elide, commit, or abort.
//!
//! ```text
//!   INIT --enter--> SNAPSHOTTED --[body errors]--> ABORTED (terminal)
//!                               --[body ok]-----> SYNTHESIZING
//!   SYNTHESIZING --[elision predicate true]----> ELIDED (terminal, success)
//!                --[commit synthesized]--------> ADVANCING
//!   ADVANCING    --[ref CAS ok]-----------------> COMMITTED (terminal, success)
//!                --[ref CAS rejected]-----------> RACE_LOST (terminal, error)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::engine::{CommitIdentity, Engine};
use crate::error::{EngineError, GitFsError, GitFsResult};
use crate::index_fs::IndexFs;
use crate::object_id::{CommitId, ObjectId, TreeId};
use crate::temporary_index_fs::TemporaryIndexFs;

/// The fixed identity and message this crate commits under when the caller
/// supplies none of its own: a tool identity, not an attempt to infer a
/// human author.
pub fn default_identity() -> CommitIdentity {
    CommitIdentity {
        author_name: "pygitfs".to_string(),
        author_email: "pygitfs@invalid".to_string(),
        committer_name: "pygitfs".to_string(),
        committer_email: "pygitfs@invalid".to_string(),
        message: "pygitfs".to_string(),
    }
}

/// What a transaction's commit step actually did.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum CommitOutcome {
    /// A new commit was created and the ref advanced to it.
    Committed(CommitId),
    /// The produced tree was indistinguishable from the parent commit (or
    /// both were the empty root). No commit object was created and the ref
    /// was left untouched.
    Elided,
}

impl CommitOutcome {
    pub fn is_elided(&self) -> bool {
        matches!(self, Self::Elided)
    }

    pub fn commit_id(&self) -> Option<&CommitId> {
        match self {
            Self::Committed(id) => Some(id),
            Self::Elided => None,
        }
    }
}

/// A scoped, single-use transaction against one ref of one repository.
///
/// Obtain one from [`crate::repository::Repository::transaction`]. Call
/// [`Transaction::enter`] to get the staging filesystem, perform operations
/// on it, then call [`Transaction::commit`]. If the caller's own logic
/// fails before `commit` runs, simply propagate the error and drop the
/// transaction: the temporary index is still cleaned up, no commit is
/// created, and the ref is untouched. [`crate::repository::Repository::with_transaction`]
/// wraps this pattern around a closure for the common case.
pub struct Transaction {
    engine: Arc<dyn Engine + Send + Sync>,
    repo_dir: PathBuf,
    reference: String,
    identity: CommitIdentity,
    parent_commit_id: Option<CommitId>,
    temp_index: Option<TemporaryIndexFs>,
}

impl Transaction {
    pub(crate) fn new(
        engine: Arc<dyn Engine + Send + Sync>,
        repo_dir: PathBuf,
        reference: impl Into<String>,
        identity: CommitIdentity,
    ) -> Self {
        Self {
            engine,
            repo_dir,
            reference: reference.into(),
            identity,
            parent_commit_id: None,
            temp_index: None,
        }
    }

    /// Resolves the target ref, materializes its tree (if any) into a fresh
    /// staging index, and returns the root of a mutable filesystem over it.
    #[instrument(skip(self), fields(reference = %self.reference))]
    pub fn enter(&mut self) -> GitFsResult<IndexFs> {
        let parent = self.engine.rev_parse(&self.reference)?;
        let seed_tree: Option<TreeId> = match &parent {
            Some(commit) => Some(self.engine.resolve_tree(commit)?),
            None => None,
        };
        let (temp_index, index_fs) =
            TemporaryIndexFs::create(self.engine.clone(), &self.repo_dir, seed_tree.as_ref())?;
        self.parent_commit_id = parent;
        self.temp_index = Some(temp_index);
        debug!(parent = ?self.parent_commit_id, "transaction snapshotted");
        Ok(index_fs)
    }

    /// Closes the staging index, applies the commit-elision predicate, and
    /// — unless elided — synthesizes a commit and advances the ref with a
    /// compare-and-swap against the parent this transaction was opened
    /// against. Returns [`crate::error::GitFsError::RaceLost`] if another
    /// writer advanced the ref first.
    #[instrument(skip(self), fields(reference = %self.reference))]
    pub fn commit(mut self) -> GitFsResult<CommitOutcome> {
        let temp_index = self.temp_index.take().expect("enter() must run before commit()");
        let produced_tree = temp_index.close()?;

        let parents: Vec<CommitId> = self.parent_commit_id.iter().cloned().collect();
        if should_elide(&self.engine, &produced_tree, &parents)? {
            debug!(tree = %produced_tree, "commit elided: tree unchanged from parent");
            return Ok(CommitOutcome::Elided);
        }

        let commit_id = self
            .engine
            .commit_tree(&produced_tree, &parents, &self.identity)?;

        let expected = self.parent_commit_id.clone().unwrap_or_else(CommitId::null);
        match self.engine.update_ref_cas(&self.reference, &commit_id, &expected) {
            Ok(()) => {}
            // Any rejection of the CAS at commit time is interpreted as a
            // lost race, per §4.E step 5: the engine cannot reliably tell a
            // genuine race apart from some other precondition failure (see
            // DESIGN.md), so this is the one place that approximation is
            // made, rather than letting the adapter's own error kind leak
            // out as the crate's public error surface.
            Err(GitFsError::Engine(EngineError::RefUpdateRejected { reference })) => {
                return Err(GitFsError::RaceLost { reference });
            }
            Err(other) => return Err(other),
        }
        info!(reference = %self.reference, commit = %commit_id, "transaction committed");
        Ok(CommitOutcome::Committed(commit_id))
    }
}

/// Applies the commit-elision predicate from DESIGN.md: a transaction whose
/// produced tree would be indistinguishable from what the ref already
/// points at (or, for an unborn branch, the canonical empty tree) creates
/// no commit and advances nothing.
fn should_elide(
    engine: &(dyn Engine + Send + Sync),
    tree: &TreeId,
    parents: &[CommitId],
) -> GitFsResult<bool> {
    match parents {
        [] => Ok(tree.hex() == TreeId::empty_tree().hex()),
        [single] => {
            let parent_tree = engine.resolve_tree(single)?;
            Ok(parent_tree.hex() == tree.hex())
        }
        _ => Ok(false),
    }
}
