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

//! A filesystem-shaped, transactional view over a bare git repository.
//!
//! [`Repository`] is the entry point: it hands out [`Transaction`]s for
//! atomically batching reads, writes, renames, and deletes into a new
//! commit that advances a named ref, and [`ReadOnlyFs`] snapshots for
//! reading a committed tree by name.
//!
//! ```no_run
//! use gitfs::Repository;
//!
//! # fn main() -> gitfs::error::GitFsResult<()> {
//! let repo = Repository::init_bare("/tmp/example.git")?;
//! repo.with_transaction(None, |fs| {
//!     fs.child("bar")?.open(gitfs::index_fs::OpenMode::Write)?.close()?;
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! The transactional core — staging, elision, and the compare-and-swap ref
//! advance — is the point of this crate; bare-repository initialization,
//! ref enumeration, and commit-graph traversal are out of scope (see
//! `SPEC_FULL.md`) and only a thin [`Repository::init_bare`] convenience is
//! carried for tests and callers that need somewhere to start.

pub mod engine;
pub mod error;
pub mod git_process;
pub mod index_fs;
pub mod object_id;
pub mod readonly_fs;
pub mod repo_path;
pub mod repository;
pub mod temporary_index_fs;
pub mod transaction;
pub mod tree_entry;

pub use engine::Engine;
pub use error::{GitFsError, GitFsResult};
pub use index_fs::IndexFs;
pub use readonly_fs::ReadOnlyFs;
pub use repository::{retry, Repository};
pub use transaction::{CommitOutcome, Transaction};
