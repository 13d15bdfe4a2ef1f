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

//! The small set of git object kinds and file modes this crate deals with.

use std::fmt;

use crate::object_id::{BlobId, ObjectId, TreeId};

/// A git tree entry's file mode, restricted to the subset this crate
/// supports (see the non-goals on file-mode fidelity).
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Mode {
    /// `100644`, a regular file.
    Normal,
    /// `100755`, a regular file with the executable bit set.
    Executable,
    /// `120000`, a symbolic link whose blob content is the link target.
    Symlink,
    /// `40000`, a subtree.
    Tree,
}

impl Mode {
    pub fn as_octal_str(self) -> &'static str {
        match self {
            Self::Normal => "100644",
            Self::Executable => "100755",
            Self::Symlink => "120000",
            Self::Tree => "40000",
        }
    }

    pub fn from_octal_str(s: &str) -> Option<Self> {
        match s {
            "100644" => Some(Self::Normal),
            "100755" => Some(Self::Executable),
            "120000" => Some(Self::Symlink),
            "40000" | "040000" => Some(Self::Tree),
            _ => None,
        }
    }

    pub fn is_tree(self) -> bool {
        matches!(self, Self::Tree)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_octal_str())
    }
}

/// A listing entry returned by `ls-tree`/`ls-files`: an object id tagged
/// with its kind, since the two listing commands hand back a bare hex
/// string plus a type string rather than a typed id.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum ObjectKind {
    Blob(BlobId),
    Tree(TreeId),
}

impl ObjectKind {
    pub fn hex(&self) -> String {
        match self {
            Self::Blob(id) => id.hex(),
            Self::Tree(id) => id.hex(),
        }
    }

    pub fn as_blob_id(&self) -> Option<&BlobId> {
        match self {
            Self::Blob(id) => Some(id),
            Self::Tree(_) => None,
        }
    }

    pub fn as_tree_id(&self) -> Option<&TreeId> {
        match self {
            Self::Tree(id) => Some(id),
            Self::Blob(_) => None,
        }
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, Self::Tree(_))
    }
}

/// The result of a `stat`-style query: either a directory (which has no
/// mode or size of its own in this model) or a file/symlink with a concrete
/// mode and byte size.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum NodeStat {
    Directory,
    File { mode: Mode, size: u64 },
}

impl NodeStat {
    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Directory)
    }

    pub fn size(&self) -> u64 {
        match self {
            Self::Directory => 0,
            Self::File { size, .. } => *size,
        }
    }
}
