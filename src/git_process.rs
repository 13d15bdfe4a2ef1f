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

//! Subprocess-backed [`Engine`] implementation: the only piece of this
//! crate that talks to an actual `git` binary.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use bstr::ByteSlice;
use tracing::{debug, trace};

use crate::engine::{CommitIdentity, Engine, IndexUpdate, ListedEntry};
use crate::error::{EngineError, GitFsError, GitFsResult};
use crate::object_id::{BlobId, CommitId, ObjectId, TreeId};
use crate::repo_path::RepoPathBuf;
use crate::tree_entry::{Mode, ObjectKind};

/// Spawns and talks to the real `git` binary against a single bare
/// repository.
///
/// Mirrors the external engine's `--git-dir`, `LC_ALL=C`, piped-stdio
/// invocation pattern used for every subprocess call in this crate: one
/// child process per logical operation, environment scoped to that one
/// call.
#[derive(Clone, Debug)]
pub struct GitProcessEngine {
    git_dir: PathBuf,
    git_executable_path: PathBuf,
}

impl GitProcessEngine {
    pub fn new(git_dir: impl Into<PathBuf>) -> Self {
        Self {
            git_dir: git_dir.into(),
            git_executable_path: PathBuf::from("git"),
        }
    }

    pub fn with_git_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.git_executable_path = path.into();
        self
    }

    /// Initializes a new bare repository at `git_dir`, with its initial
    /// branch forced to [`crate::engine::DEFAULT_INITIAL_BRANCH`] regardless
    /// of the caller's `init.defaultBranch` configuration. Equivalent to
    /// `git --bare --git-dir=<git_dir> init --quiet --initial-branch=master`.
    pub fn init_bare(git_dir: impl Into<PathBuf>) -> GitFsResult<Self> {
        let git_dir = git_dir.into();
        let engine = Self::new(&git_dir);
        let initial_branch = crate::engine::DEFAULT_INITIAL_BRANCH
            .trim_start_matches("refs/heads/");
        let mut cmd = Command::new(&engine.git_executable_path);
        cmd.arg("--bare")
            .arg(format!("--git-dir={}", git_dir.display()))
            .arg("init")
            .arg("--quiet")
            .arg(format!("--initial-branch={initial_branch}"))
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        debug!(cmd = ?cmd, "spawning git init");
        let child = engine.spawn(cmd)?;
        engine.wait_success(child, "init", &[])?;
        Ok(engine)
    }

    fn create_command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.git_executable_path);
        cmd.arg(format!("--git-dir={}", self.git_dir.display()));
        cmd.args(args);
        cmd.env("LC_ALL", "C");
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }

    fn spawn(&self, mut cmd: Command) -> GitFsResult<Child> {
        cmd.spawn().map_err(|error| {
            if self.git_executable_path.is_absolute() {
                GitFsError::Engine(EngineError::Spawn {
                    path: self.git_executable_path.clone(),
                    source: error,
                })
            } else {
                GitFsError::Engine(EngineError::SpawnInPath(error))
            }
        })
    }

    /// Runs `cmd`, writing `stdin` if given, and returns captured stdout.
    /// `command` names the subcommand for error messages.
    fn run(
        &self,
        mut cmd: Command,
        command: &'static str,
        stdin: Option<&[u8]>,
    ) -> GitFsResult<Vec<u8>> {
        if stdin.is_some() {
            cmd.stdin(Stdio::piped());
        }
        debug!(cmd = ?cmd, command, "spawning git subprocess");
        let mut child = self.spawn(cmd)?;
        if let Some(bytes) = stdin {
            let mut pipe = child.stdin.take().expect("stdin was piped");
            pipe.write_all(bytes)
                .map_err(|e| GitFsError::Engine(EngineError::WriteStdin(e)))?;
        }
        let mut stdout = Vec::new();
        if let Some(mut pipe) = child.stdout.take() {
            pipe.read_to_end(&mut stdout)
                .map_err(|e| GitFsError::Engine(EngineError::ReadStdout(e)))?;
        }
        self.wait_success(child, command, &stdout)?;
        Ok(stdout)
    }

    fn wait_success(&self, mut child: Child, command: &'static str, _stdout: &[u8]) -> GitFsResult<()> {
        let mut stderr = Vec::new();
        if let Some(mut pipe) = child.stderr.take() {
            let _ = pipe.read_to_end(&mut stderr);
        }
        let status = child
            .wait()
            .map_err(|e| GitFsError::Engine(EngineError::Wait(e)))?;
        if !status.success() {
            return Err(GitFsError::Engine(EngineError::NonZeroExit {
                command,
                status: status.code().unwrap_or(-1),
                stderr: stderr.to_str_lossy().into_owned(),
            }));
        }
        Ok(())
    }

    fn create_command_with_index(&self, args: &[&str], index_path: &Path) -> Command {
        let mut cmd = self.create_command(args);
        cmd.env("GIT_INDEX_FILE", index_path);
        cmd
    }

    fn parse_listing(command: &'static str, out: &[u8], is_ls_tree: bool) -> GitFsResult<Vec<ListedEntry>> {
        if !out.is_empty() && !out.ends_with(b"\0") {
            return Err(GitFsError::Engine(EngineError::MalformedOutput {
                command,
                detail: "output did not end in NUL".to_string(),
            }));
        }
        let mut entries = Vec::new();
        for record in out.split(|&b| b == 0) {
            if record.is_empty() {
                continue;
            }
            let record = record.to_str_lossy();
            let (meta, filename) = record.split_once('\t').ok_or_else(|| {
                GitFsError::Engine(EngineError::MalformedOutput {
                    command,
                    detail: format!("entry missing tab separator: {record:?}"),
                })
            })?;
            let mut fields = meta.splitn(3, ' ');
            let mode_str = fields.next().unwrap_or_default();
            let mode = Mode::from_octal_str(mode_str).ok_or_else(|| {
                GitFsError::Engine(EngineError::MalformedOutput {
                    command,
                    detail: format!("unrecognized mode {mode_str:?}"),
                })
            })?;
            let object = if is_ls_tree {
                let type_str = fields.next().unwrap_or_default();
                let hex = fields.next().unwrap_or_default();
                match type_str {
                    "blob" => ObjectKind::Blob(BlobId::from_hex(hex).map_err(|_| {
                        GitFsError::Engine(EngineError::MalformedOutput {
                            command,
                            detail: format!("bad object id {hex:?}"),
                        })
                    })?),
                    "tree" => ObjectKind::Tree(TreeId::from_hex(hex).map_err(|_| {
                        GitFsError::Engine(EngineError::MalformedOutput {
                            command,
                            detail: format!("bad object id {hex:?}"),
                        })
                    })?),
                    other => {
                        return Err(GitFsError::Engine(EngineError::MalformedOutput {
                            command,
                            detail: format!("unsupported object type {other:?}"),
                        }));
                    }
                }
            } else {
                let hex = fields.next().unwrap_or_default();
                let stage = fields.next().unwrap_or_default();
                if stage != "0" {
                    return Err(GitFsError::Engine(EngineError::MalformedOutput {
                        command,
                        detail: "unprepared to handle merge conflict stages".to_string(),
                    }));
                }
                if mode.is_tree() {
                    ObjectKind::Tree(TreeId::from_hex(hex).map_err(|_| {
                        GitFsError::Engine(EngineError::MalformedOutput {
                            command,
                            detail: format!("bad object id {hex:?}"),
                        })
                    })?)
                } else {
                    ObjectKind::Blob(BlobId::from_hex(hex).map_err(|_| {
                        GitFsError::Engine(EngineError::MalformedOutput {
                            command,
                            detail: format!("bad object id {hex:?}"),
                        })
                    })?)
                }
            };
            let entry_path = RepoPathBuf::root().join_relpath(filename).map_err(|_| {
                GitFsError::Engine(EngineError::MalformedOutput {
                    command,
                    detail: format!("unparseable path {filename:?}"),
                })
            })?;
            entries.push(ListedEntry {
                path: entry_path,
                object,
                mode,
            });
        }
        Ok(entries)
    }
}

/// Builds the pathspec argument for a listing command. A trailing `/` is
/// appended only for `children == true`, which forces directory semantics
/// in git's own pathspec matching (never matches the path itself as a
/// blob); bare paths (`children == false`) let git match the path either as
/// a literal blob or, if it names a directory, as a prefix over every
/// descendant.
fn listing_path_arg(path: Option<&RepoPathBuf>, children: bool) -> String {
    match path {
        None => String::new(),
        Some(p) if p.is_root() => String::new(),
        Some(p) if children => format!("{}/", p.as_str()),
        Some(p) => p.as_str().to_string(),
    }
}

impl Engine for GitProcessEngine {
    fn rev_parse(&self, rev: &str) -> GitFsResult<Option<CommitId>> {
        let cmd = self.create_command(&["rev-parse", "--default", rev]);
        let out = self.run(cmd, "rev-parse", None)?;
        let text = out.to_str_lossy();
        let trimmed = text.trim_end_matches('\n');
        if trimmed.is_empty() {
            return Ok(None);
        }
        Ok(Some(CommitId::from_hex(trimmed).map_err(|_| {
            GitFsError::Engine(EngineError::MalformedOutput {
                command: "rev-parse",
                detail: format!("not a valid object id: {trimmed:?}"),
            })
        })?))
    }

    fn resolve_tree(&self, commit: &CommitId) -> GitFsResult<TreeId> {
        let rev = format!("{}^{{tree}}", commit.hex());
        let cmd = self.create_command(&["rev-parse", "--verify", &rev]);
        let out = self.run(cmd, "rev-parse", None)?;
        let text = out.to_str_lossy();
        let trimmed = text.trim_end_matches('\n');
        TreeId::from_hex(trimmed).map_err(|_| {
            GitFsError::Engine(EngineError::MalformedOutput {
                command: "rev-parse",
                detail: format!("not a valid object id: {trimmed:?}"),
            })
        })
    }

    fn read_tree(&self, tree: &TreeId, index_path: &Path) -> GitFsResult<()> {
        let hex = tree.hex();
        let cmd = self.create_command_with_index(&["read-tree", &hex], index_path);
        self.run(cmd, "read-tree", None)?;
        Ok(())
    }

    fn ls_tree(
        &self,
        treeish: &str,
        path: Option<&RepoPathBuf>,
        children: bool,
    ) -> GitFsResult<Vec<ListedEntry>> {
        let path_arg = listing_path_arg(path, children);
        let cmd = self.create_command(&["ls-tree", "-z", "--full-name", treeish, "--", &path_arg]);
        let out = self.run(cmd, "ls-tree", None)?;
        Self::parse_listing("ls-tree", &out, true)
    }

    fn ls_files(
        &self,
        index_path: &Path,
        path: Option<&RepoPathBuf>,
        children: bool,
    ) -> GitFsResult<Vec<ListedEntry>> {
        let path_arg = listing_path_arg(path, children);
        let cmd = self.create_command_with_index(
            &["ls-files", "--stage", "--full-name", "-z", "--", &path_arg],
            index_path,
        );
        let out = self.run(cmd, "ls-files", None)?;
        Self::parse_listing("ls-files", &out, false)
    }

    fn cat_blob(&self, id: &BlobId) -> GitFsResult<Vec<u8>> {
        let hex = id.hex();
        let cmd = self.create_command(&["cat-file", "blob", &hex]);
        self.run(cmd, "cat-file", None)
    }

    fn blob_size(&self, id: &BlobId) -> GitFsResult<u64> {
        let hex = id.hex();
        let cmd = self.create_command(&["cat-file", "-s", &hex]);
        let out = self.run(cmd, "cat-file", None)?;
        let text = out.to_str_lossy();
        let trimmed = text.trim_end_matches('\n');
        trimmed.parse::<u64>().map_err(|_| {
            GitFsError::Engine(EngineError::MalformedOutput {
                command: "cat-file",
                detail: format!("not a size: {trimmed:?}"),
            })
        })
    }

    fn write_blob(&self, content: &[u8]) -> GitFsResult<BlobId> {
        let cmd = self.create_command(&["hash-object", "-w", "--stdin"]);
        let out = self.run(cmd, "hash-object", Some(content))?;
        let text = out.to_str_lossy();
        let trimmed = text.trim_end_matches('\n');
        if trimmed.is_empty() {
            return Err(GitFsError::Engine(EngineError::MalformedOutput {
                command: "hash-object",
                detail: "no hash returned".to_string(),
            }));
        }
        BlobId::from_hex(trimmed).map_err(|_| {
            GitFsError::Engine(EngineError::MalformedOutput {
                command: "hash-object",
                detail: format!("not a valid object id: {trimmed:?}"),
            })
        })
    }

    fn update_index(&self, index_path: &Path, updates: &[IndexUpdate]) -> GitFsResult<()> {
        let mut stdin = Vec::new();
        for update in updates {
            match &update.entry {
                Some((mode, blob)) => {
                    stdin.extend_from_slice(
                        format!("{} blob {} 0\t{}\0", mode, blob.hex(), update.path.as_str())
                            .as_bytes(),
                    );
                }
                None => {
                    stdin.extend_from_slice(
                        format!(
                            "0 blob {} 0\t{}\0",
                            crate::object_id::NULL_SHA1_HEX,
                            update.path.as_str()
                        )
                        .as_bytes(),
                    );
                }
            }
        }
        let cmd =
            self.create_command_with_index(&["update-index", "-z", "--index-info"], index_path);
        self.run(cmd, "update-index", Some(&stdin))?;
        Ok(())
    }

    fn write_tree(&self, index_path: &Path) -> GitFsResult<TreeId> {
        let cmd = self.create_command_with_index(&["write-tree"], index_path);
        let out = self.run(cmd, "write-tree", None)?;
        let text = out.to_str_lossy();
        let trimmed = text.trim_end_matches('\n');
        if trimmed.is_empty() {
            return Err(GitFsError::Engine(EngineError::MalformedOutput {
                command: "write-tree",
                detail: "no hash returned".to_string(),
            }));
        }
        TreeId::from_hex(trimmed).map_err(|_| {
            GitFsError::Engine(EngineError::MalformedOutput {
                command: "write-tree",
                detail: format!("not a valid object id: {trimmed:?}"),
            })
        })
    }

    fn commit_tree(
        &self,
        tree: &TreeId,
        parents: &[CommitId],
        identity: &CommitIdentity,
    ) -> GitFsResult<CommitId> {
        let tree_hex = tree.hex();
        let mut args: Vec<String> = vec!["commit-tree".to_string(), tree_hex];
        for parent in parents {
            args.push("-p".to_string());
            args.push(parent.hex());
        }
        let args_ref: Vec<&str> = args.iter().map(String::as_str).collect();
        let mut cmd = self.create_command(&args_ref);
        cmd.env("GIT_AUTHOR_NAME", &identity.author_name);
        cmd.env("GIT_AUTHOR_EMAIL", &identity.author_email);
        cmd.env("GIT_COMMITTER_NAME", &identity.committer_name);
        cmd.env("GIT_COMMITTER_EMAIL", &identity.committer_email);
        trace!(?parents, "committing tree");
        let out = self.run(cmd, "commit-tree", Some(identity.message.as_bytes()))?;
        let text = out.to_str_lossy();
        let trimmed = text.trim_end_matches('\n');
        if trimmed.is_empty() {
            return Err(GitFsError::Engine(EngineError::MalformedOutput {
                command: "commit-tree",
                detail: "no hash returned".to_string(),
            }));
        }
        CommitId::from_hex(trimmed).map_err(|_| {
            GitFsError::Engine(EngineError::MalformedOutput {
                command: "commit-tree",
                detail: format!("not a valid object id: {trimmed:?}"),
            })
        })
    }

    fn update_ref_cas(&self, reference: &str, new: &CommitId, expected: &CommitId) -> GitFsResult<()> {
        let new_hex = new.hex();
        let expected_hex = expected.hex();
        let cmd = self.create_command(&["update-ref", reference, &new_hex, &expected_hex]);
        debug!(reference, new = %new_hex, expected = %expected_hex, "updating ref with CAS");
        match self.run(cmd, "update-ref", None) {
            Ok(_) => Ok(()),
            // `update-ref`'s own compare-and-swap rejected the write because
            // `reference` no longer holds `expected`: this is the adapter's
            // cas-rejected case (§4.A), not a bare subprocess failure. The
            // transactional core is the layer that decides what a rejected
            // CAS means (race-lost), so surface it as its own engine error
            // kind rather than presenting it as `GitFsError::RaceLost`
            // ourselves.
            Err(GitFsError::Engine(EngineError::NonZeroExit { .. })) => {
                Err(GitFsError::Engine(EngineError::RefUpdateRejected {
                    reference: reference.to_string(),
                }))
            }
            Err(other) => Err(other),
        }
    }
}
