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

//! A throwaway index file scoped to one transaction: seeded from a tree on
//! entry, written back out as a tree on successful exit, and always deleted.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::engine::Engine;
use crate::error::{GitFsError, GitFsResult};
use crate::index_fs::IndexFs;
use crate::object_id::TreeId;

/// Directory under the repository holding transient per-transaction index
/// files, mirroring the auxiliary-directory layout in DESIGN.md.
pub const AUX_DIR_NAME: &str = "pygitfs";

static INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Scoped owner of one transient index file.
///
/// [`TemporaryIndexFs::create`] seeds the index (or leaves it empty for an
/// unborn branch) and hands back an [`IndexFs`] rooted at it. The caller
/// must eventually call [`TemporaryIndexFs::close`] on the success path;
/// dropping it without closing (the error path) still unlinks the index
/// file but produces no tree.
pub struct TemporaryIndexFs {
    engine: Arc<dyn Engine + Send + Sync>,
    index_path: PathBuf,
    unlinked: bool,
}

impl TemporaryIndexFs {
    /// Chooses a unique index file path under `repo_dir`'s auxiliary
    /// directory, optionally materializes `seed_tree` into it, and returns
    /// the scope handle alongside an [`IndexFs`] rooted at the new index.
    pub fn create(
        engine: Arc<dyn Engine + Send + Sync>,
        repo_dir: &Path,
        seed_tree: Option<&TreeId>,
    ) -> GitFsResult<(Self, IndexFs)> {
        let aux_dir = repo_dir.join(AUX_DIR_NAME);
        std::fs::create_dir_all(&aux_dir).map_err(|e| GitFsError::io(&aux_dir, e))?;
        let counter = INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let index_path = aux_dir.join(format!("index.{}.{}", std::process::id(), counter));
        if let Some(tree) = seed_tree {
            engine.read_tree(tree, &index_path)?;
        }
        debug!(index_path = %index_path.display(), seeded = seed_tree.is_some(), "opened temporary index");
        let index_fs = IndexFs::new(engine.clone(), &index_path);
        Ok((
            Self {
                engine,
                index_path,
                unlinked: false,
            },
            index_fs,
        ))
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Writes the index out as a tree object and unlinks the index file.
    /// Consumes `self`; call this only on the transaction's success path.
    pub fn close(mut self) -> GitFsResult<TreeId> {
        let tree = self.engine.write_tree(&self.index_path);
        self.unlink();
        tree
    }

    fn unlink(&mut self) {
        if self.unlinked {
            return;
        }
        self.unlinked = true;
        match std::fs::remove_file(&self.index_path) {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => {
                warn!(index_path = %self.index_path.display(), %error, "failed to remove temporary index file");
            }
        }
    }
}

impl Drop for TemporaryIndexFs {
    fn drop(&mut self) {
        // Reached only on the error path (`close` consumes `self` on
        // success): no tree is produced, but the index file must still go.
        self.unlink();
    }
}
