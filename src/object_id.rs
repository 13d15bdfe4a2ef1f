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

//! Typed, hex-encoded object identifiers.
//!
//! Git identifies every object — commit, tree, or blob — with the same
//! 20-byte SHA-1 shape. Distinct newtypes exist here for each kind so the
//! type system catches cross-kind mixups (passing a blob id where a tree id
//! is expected) at compile time instead of at a `git cat-file` failure.

use std::fmt;

/// Shared behavior of the per-kind object id newtypes.
pub trait ObjectId {
    /// The git object type this id refers to: `"commit"`, `"tree"`, or
    /// `"blob"`.
    fn object_type() -> &'static str;

    fn as_bytes(&self) -> &[u8];

    fn hex(&self) -> String {
        hex::encode(self.as_bytes())
    }
}

/// The id git prints for an empty SHA-1: all forty `0` characters. Passed as
/// the `oldvalue` to `update-ref` to assert that a ref is currently unset.
pub const NULL_SHA1_HEX: &str = "0000000000000000000000000000000000000000";

/// SHA-1 of the canonical empty tree, hard-coded the same way in every git
/// implementation since trees can't be computed without a repository to hash
/// against.
pub const EMPTY_TREE_SHA1_HEX: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

macro_rules! id_type {
    ($name:ident, $object_type:literal) => {
        #[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $name(Vec<u8>);

        impl $name {
            pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
                Self(bytes.into())
            }

            pub fn from_hex(hex_str: &str) -> Result<Self, hex::FromHexError> {
                Ok(Self(hex::decode(hex_str)?))
            }
        }

        impl ObjectId for $name {
            fn object_type() -> &'static str {
                $object_type
            }

            fn as_bytes(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(&self.hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.hex())
            }
        }
    };
}

id_type!(CommitId, "commit");
id_type!(TreeId, "tree");
id_type!(BlobId, "blob");

impl TreeId {
    /// The canonical empty tree, used as the base when a branch has no
    /// commits yet.
    pub fn empty_tree() -> Self {
        Self::from_hex(EMPTY_TREE_SHA1_HEX).expect("well-known hex constant is valid")
    }
}

impl CommitId {
    /// All-zero id, used as the "must currently be unset" precondition for
    /// the very first `update-ref` compare-and-swap on a branch.
    pub fn null() -> Self {
        Self::from_hex(NULL_SHA1_HEX).expect("well-known hex constant is valid")
    }

    pub fn is_null(&self) -> bool {
        self.as_bytes().iter().all(|&b| b == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_hex() {
        let id = TreeId::from_hex(EMPTY_TREE_SHA1_HEX).unwrap();
        assert_eq!(id.hex(), EMPTY_TREE_SHA1_HEX);
    }

    #[test]
    fn null_commit_id_is_null() {
        assert!(CommitId::null().is_null());
        let real = CommitId::from_hex("1111111111111111111111111111111111111111").unwrap();
        assert!(!real.is_null());
    }

    #[test]
    fn object_type_is_per_kind() {
        assert_eq!(CommitId::object_type(), "commit");
        assert_eq!(TreeId::object_type(), "tree");
        assert_eq!(BlobId::object_type(), "blob");
    }

    #[test]
    fn debug_includes_type_name() {
        let id = BlobId::from_hex("19102815663d23f8b75a47e7a01965dcdc96468c").unwrap();
        assert_eq!(
            format!("{id:?}"),
            "BlobId(19102815663d23f8b75a47e7a01965dcdc96468c)"
        );
    }
}
