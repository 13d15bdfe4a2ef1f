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

//! A validated, slash-separated path relative to a repository or index root.
//!
//! Every path that crosses the public API is represented as a
//! [`RepoPathBuf`]. Construction is the only place insecurity is checked:
//! once a value exists, every consumer can trust it is a clean, relative,
//! `..`-free path.

use std::fmt;

use crate::error::GitFsError;

/// An owned, validated repository-relative path.
///
/// The empty string denotes the repository root. Non-empty values are
/// `/`-joined segments with no leading or trailing slash, no empty segment,
/// and no segment equal to `.` or `..`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct RepoPathBuf(String);

impl RepoPathBuf {
    /// The repository root, the empty path.
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits off the final segment, returning `(parent, last_segment)`.
    /// Returns `None` for the root, which has no parent.
    pub fn split_last(&self) -> Option<(Self, &str)> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(idx) => Some((Self(self.0[..idx].to_string()), &self.0[idx + 1..])),
            None => Some((Self::root(), &self.0[..])),
        }
    }

    /// Builds the child path `self/segment`, validating `segment` in
    /// isolation: it must be non-empty, must not contain `/`, and must not
    /// be `.` or `..`.
    pub fn child(&self, segment: &str) -> Result<Self, GitFsError> {
        validate_segment(segment)?;
        Ok(self.join_validated(segment))
    }

    /// Joins a `/`-separated relative path onto `self`, validating every
    /// segment. Rejects absolute paths (leading `/`).
    pub fn join_relpath(&self, relpath: &str) -> Result<Self, GitFsError> {
        if relpath.starts_with('/') {
            return Err(GitFsError::insecure_path(format!(
                "path must be relative, got {relpath:?}"
            )));
        }
        let mut cur = self.clone();
        for segment in relpath.split('/') {
            if segment.is_empty() {
                continue;
            }
            cur = cur.child(segment)?;
        }
        Ok(cur)
    }

    /// Path of the directory-emptiness placeholder blob that would live
    /// directly inside this node, e.g. `dir/.gitfs-placeholder`.
    pub fn placeholder_child(&self) -> Self {
        self.join_validated(crate::engine::PLACEHOLDER_NAME)
    }

    fn join_validated(&self, segment: &str) -> Self {
        if self.is_root() {
            Self(segment.to_string())
        } else {
            Self(format!("{}/{}", self.0, segment))
        }
    }
}

fn validate_segment(segment: &str) -> Result<(), GitFsError> {
    if segment.is_empty() {
        return Err(GitFsError::insecure_path("path segment must not be empty"));
    }
    if segment.contains('/') {
        return Err(GitFsError::insecure_path(format!(
            "path segment {segment:?} must not contain '/'"
        )));
    }
    if segment == ".." {
        return Err(GitFsError::insecure_path("path segment must not be '..'"));
    }
    Ok(())
}

impl fmt::Display for RepoPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "<root>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl fmt::Debug for RepoPathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepoPathBuf({:?})", self.0)
    }
}

impl TryFrom<&str> for RepoPathBuf {
    type Error = GitFsError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        RepoPathBuf::root().join_relpath(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_join_builds_clean_path() {
        let p = RepoPathBuf::root().join_relpath("a/b/c").unwrap();
        assert_eq!(p.as_str(), "a/b/c");
    }

    #[test]
    fn rejects_leading_slash() {
        let err = RepoPathBuf::root().join_relpath("/a").unwrap_err();
        assert!(matches!(err, GitFsError::InsecurePath { .. }));
    }

    #[test]
    fn rejects_dotdot_segment() {
        let err = RepoPathBuf::root().join_relpath("a/../b").unwrap_err();
        assert!(matches!(err, GitFsError::InsecurePath { .. }));
    }

    #[test]
    fn child_rejects_embedded_slash() {
        let root = RepoPathBuf::root();
        let err = root.child("a/b").unwrap_err();
        assert!(matches!(err, GitFsError::InsecurePath { .. }));
    }

    #[test]
    fn split_last_returns_parent_and_segment() {
        let p = RepoPathBuf::root().join_relpath("a/b/c").unwrap();
        let (parent, last) = p.split_last().unwrap();
        assert_eq!(parent.as_str(), "a/b");
        assert_eq!(last, "c");
    }

    #[test]
    fn split_last_of_top_level_is_root() {
        let p = RepoPathBuf::root().join_relpath("a").unwrap();
        let (parent, last) = p.split_last().unwrap();
        assert!(parent.is_root());
        assert_eq!(last, "a");
    }

    #[test]
    fn root_has_no_split_last() {
        assert!(RepoPathBuf::root().split_last().is_none());
    }
}
