//! End-to-end scenarios driving a real `git` subprocess through
//! [`gitfs::Repository`], covering the literal scenarios and invariants
//! named in `SPEC_FULL.md` §8.

use std::io::{Read, Write};
use std::path::Path;
use std::process::Command;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use gitfs::index_fs::{MkdirOptions, OpenMode};
use gitfs::{retry, CommitOutcome, GitFsError, IndexFs, Repository};

fn init_repo() -> (TempDir, Repository) {
    let dir = TempDir::new().expect("tempdir");
    let repo_path = dir.path().join("repo.git");
    let repo = Repository::init_bare(&repo_path).expect("init bare repo");
    (dir, repo)
}

/// Shells out directly to `git`, independent of the crate under test, so
/// assertions about ref state don't depend on the very code being tested.
fn git_rev_parse(repo_path: &Path, rev: &str) -> Option<String> {
    let output = Command::new("git")
        .arg(format!("--git-dir={}", repo_path.display()))
        .args(["rev-parse", "--default", rev])
        .env("LC_ALL", "C")
        .output()
        .expect("spawn git rev-parse");
    assert!(output.status.success(), "git rev-parse failed: {output:?}");
    let text = String::from_utf8_lossy(&output.stdout);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn write_whole(fs: &IndexFs, relpath: &str, content: &[u8]) {
    let mut file = fs.join_relpath(relpath).unwrap().open(OpenMode::Write).unwrap();
    file.write_all(content).unwrap();
    file.close().unwrap();
}

fn append_line(fs: &IndexFs, relpath: &str, line: &str) {
    let mut file = fs.join_relpath(relpath).unwrap().open(OpenMode::Append).unwrap();
    file.write_all(line.as_bytes()).unwrap();
    file.close().unwrap();
}

fn read_whole(fs: &gitfs::ReadOnlyFs, relpath: &str) -> String {
    let mut content = String::new();
    fs.join_relpath(relpath)
        .unwrap()
        .open()
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    content
}

// S1: entering and exiting a transaction with no writes must not create an
// initial commit (commit-elision predicate, empty-root case).
#[test]
fn s1_empty_tree_transaction_is_elided() {
    let (_dir, repo) = init_repo();

    let outcome = repo.with_transaction(None, |_fs| Ok(())).unwrap();
    assert_eq!(outcome, CommitOutcome::Elided);
    assert_eq!(git_rev_parse(repo.path(), "HEAD"), None);
}

// S2: the first write creates an initial commit whose tree lists exactly
// the written path with the written content.
#[test]
fn s2_first_write_creates_initial_commit() {
    let (_dir, repo) = init_repo();

    let outcome = repo
        .with_transaction(None, |fs| {
            write_whole(fs, "bar", b"THUD");
            Ok(())
        })
        .unwrap();
    assert_matches!(outcome, CommitOutcome::Committed(_));
    assert!(git_rev_parse(repo.path(), "HEAD").is_some());

    let snapshot = repo.readonly(None).unwrap();
    let entries = snapshot.list().unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["bar"]);
    assert_eq!(read_whole(&snapshot, "bar"), "THUD");
}

// S3: two independently committed "racer" transactions land on the ref
// while an outer transaction's stale snapshot is still open; the outer
// transaction must lose the CAS race twice and only succeed on its third
// attempt, by which point its own edit is applied on top of both racers'.
#[test]
fn s3_concurrent_write_race_eventually_wins() {
    let (_dir, repo) = init_repo();
    repo.with_transaction(None, |fs| {
        write_whole(fs, "bar", b"orig\n");
        Ok(())
    })
    .unwrap();

    let mut committed = false;
    for attempt in 1..=3u32 {
        let mut txn = repo.transaction(None);
        let fs = txn.enter().unwrap();

        if attempt < 3 {
            // Simulate another writer landing a full, independent
            // transaction while this one is still open.
            repo.with_transaction(None, |racer_fs| {
                append_line(racer_fs, "bar", &format!("racer {attempt}\n"));
                Ok(())
            })
            .unwrap();
        }

        append_line(&fs, "bar", &format!("loser {attempt}\n"));
        match txn.commit() {
            Ok(CommitOutcome::Committed(_)) => {
                assert_eq!(attempt, 3, "expected the race to resolve on the third attempt");
                committed = true;
                break;
            }
            Ok(CommitOutcome::Elided) => panic!("a genuine content change must never elide"),
            Err(error) => {
                assert!(error.is_race_lost(), "unexpected error: {error}");
                assert!(attempt < 3, "should not lose the race on the final attempt");
            }
        }
    }
    assert!(committed, "outer transaction never won the race");

    let snapshot = repo.readonly(None).unwrap();
    assert_eq!(read_whole(&snapshot, "bar"), "orig\nracer 1\nracer 2\nloser 3\n");
}

// S4: an empty directory is represented by a hidden placeholder blob that
// must never surface in a directory listing.
#[test]
fn s4_mkdir_placeholder_is_hidden_from_listing() {
    let (_dir, repo) = init_repo();
    repo.with_transaction(None, |fs| {
        fs.child("dir").unwrap().mkdir(MkdirOptions::default()).unwrap();
        Ok(())
    })
    .unwrap();

    let snapshot = repo.readonly(None).unwrap();
    let names: Vec<&str> = snapshot.list().unwrap().iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["dir"]);
    assert!(snapshot.child("dir").unwrap().isdir().unwrap());
}

// S5: renaming a directory moves every descendant entry, preserving blob
// identity, and leaves nothing behind at the old prefix.
#[test]
fn s5_rename_subtree_moves_every_descendant() {
    let (_dir, repo) = init_repo();
    let mut txn = repo.transaction(None);
    let fs = txn.enter().unwrap();

    write_whole(&fs, "a/x", b"x-content");
    write_whole(&fs, "a/y/z", b"z-content");

    let x_id_before = fs.join_relpath("a/x").unwrap().git_get_sha1().unwrap();
    let z_id_before = fs.join_relpath("a/y/z").unwrap().git_get_sha1().unwrap();

    let mut a = fs.child("a").unwrap();
    let b = fs.child("b").unwrap();
    a.rename(&b).unwrap();

    assert!(!fs.child("a").unwrap().exists().unwrap());
    assert_eq!(fs.join_relpath("b/x").unwrap().git_get_sha1().unwrap(), x_id_before);
    assert_eq!(fs.join_relpath("b/y/z").unwrap().git_get_sha1().unwrap(), z_id_before);

    txn.commit().unwrap();

    let snapshot = repo.readonly(None).unwrap();
    assert!(!snapshot.child("a").unwrap().exists().unwrap());
    assert_eq!(read_whole(&snapshot, "b/x"), "x-content");
    assert_eq!(read_whole(&snapshot, "b/y/z"), "z-content");
}

// S6: a read-only snapshot rejects every mutating operation with the
// canonical read-only-filesystem error.
#[test]
fn s6_readonly_rejects_writes() {
    let (_dir, repo) = init_repo();
    repo.with_transaction(None, |fs| {
        write_whole(fs, "bar", b"THUD");
        Ok(())
    })
    .unwrap();

    let snapshot = repo.readonly(None).unwrap();
    let err = snapshot.child("newdir").unwrap().mkdir().unwrap_err();
    assert_matches!(err, GitFsError::ReadOnlyFilesystem { .. });
    let err = snapshot.child("bar").unwrap().remove().unwrap_err();
    assert_matches!(err, GitFsError::ReadOnlyFilesystem { .. });
}

// P1: a write followed by a close, followed by a read, observes the
// written bytes within the same transaction, before any commit.
#[test]
fn p1_read_after_write_in_same_transaction() {
    let (_dir, repo) = init_repo();
    let mut txn = repo.transaction(None);
    let fs = txn.enter().unwrap();

    write_whole(&fs, "bar", b"hello world");

    let mut content = Vec::new();
    fs.child("bar")
        .unwrap()
        .open(OpenMode::Read)
        .unwrap()
        .read_to_end(&mut content)
        .unwrap();
    assert_eq!(content, b"hello world");

    txn.commit().unwrap();
}

// P9: the size reported for a freshly written blob matches its length.
#[test]
fn p9_size_matches_written_length() {
    let (_dir, repo) = init_repo();
    let mut txn = repo.transaction(None);
    let fs = txn.enter().unwrap();

    write_whole(&fs, "bar", b"0123456789");
    assert_eq!(fs.child("bar").unwrap().size().unwrap(), 10);

    txn.commit().unwrap();
}

// P6: path construction rejects embedded slashes and a bare `..` segment.
#[test]
fn p6_child_rejects_insecure_segments() {
    let (_dir, repo) = init_repo();
    let mut txn = repo.transaction(None);
    let fs = txn.enter().unwrap();

    assert_matches!(fs.child("a/b").unwrap_err(), GitFsError::InsecurePath { .. });
    assert_matches!(fs.child("..").unwrap_err(), GitFsError::InsecurePath { .. });

    txn.commit().unwrap();
}

// P2/P3: a transaction whose tree comes out identical to its single
// parent must elide, even after real writes that cancel out.
#[test]
fn p3_noop_edit_on_existing_history_is_elided() {
    let (_dir, repo) = init_repo();
    repo.with_transaction(None, |fs| {
        write_whole(fs, "bar", b"same content");
        Ok(())
    })
    .unwrap();
    let head_before = git_rev_parse(repo.path(), "HEAD");

    let outcome = repo
        .with_transaction(None, |fs| {
            // Write back the exact same bytes: the produced tree will be
            // byte-for-byte identical to the parent's.
            write_whole(fs, "bar", b"same content");
            Ok(())
        })
        .unwrap();

    assert_eq!(outcome, CommitOutcome::Elided);
    assert_eq!(git_rev_parse(repo.path(), "HEAD"), head_before);
}

// A failing transaction body must not create a commit, must not advance
// the ref, and must not leak its temporary index file.
#[test]
fn aborted_transaction_leaves_no_trace() {
    let (_dir, repo) = init_repo();
    let result = repo.with_transaction(None, |fs| {
        write_whole(fs, "bar", b"should not survive");
        fs.child("a/b")?; // insecure path: aborts the transaction
        Ok(())
    });
    assert!(result.is_err());
    assert_eq!(git_rev_parse(repo.path(), "HEAD"), None);

    let aux_dir = repo.path().join("pygitfs");
    if aux_dir.exists() {
        let remaining: Vec<_> = std::fs::read_dir(&aux_dir).unwrap().collect();
        assert!(remaining.is_empty(), "temporary index files were not cleaned up: {remaining:?}");
    }
}

// P8: a read-only snapshot keeps observing the content it was opened
// against even after later transactions advance the same ref.
#[test]
fn p8_readonly_snapshot_is_immune_to_later_commits() {
    let (_dir, repo) = init_repo();
    repo.with_transaction(None, |fs| {
        write_whole(fs, "bar", b"v1");
        Ok(())
    })
    .unwrap();

    let snapshot = repo.readonly(None).unwrap();
    assert_eq!(read_whole(&snapshot, "bar"), "v1");

    repo.with_transaction(None, |fs| {
        write_whole(fs, "bar", b"v2");
        Ok(())
    })
    .unwrap();

    // HEAD has moved on, but the already-open snapshot was pinned to the
    // commit it resolved at `open` time.
    assert_eq!(read_whole(&snapshot, "bar"), "v1");

    let fresh = repo.readonly(None).unwrap();
    assert_eq!(read_whole(&fresh, "bar"), "v2");
}

// P11: the bounded `retry` wrapper must give up after exactly its
// configured attempt count and surface the last race-lost error, not loop
// forever, when every attempt keeps losing the compare-and-swap.
#[test]
fn p11_retry_gives_up_after_max_attempts_on_persistent_race() {
    let (_dir, repo) = init_repo();
    repo.with_transaction(None, |fs| {
        write_whole(fs, "bar", b"orig\n");
        Ok(())
    })
    .unwrap();

    let mut attempts = 0u32;
    let result = retry(&repo, None, 3, |fs| {
        attempts += 1;
        // Land a full, independent transaction on the same ref before this
        // attempt's own commit runs, so every single attempt loses the
        // race against its own stale snapshot.
        repo.with_transaction(None, |racer_fs| {
            append_line(racer_fs, "bar", &format!("racer {attempts}\n"));
            Ok(())
        })
        .unwrap();
        append_line(fs, "bar", &format!("loser {attempts}\n"));
        Ok(())
    });

    assert_eq!(attempts, 3, "retry must stop at exactly max_attempts");
    let error = result.unwrap_err();
    assert!(error.is_race_lost(), "expected race-lost, got {error}");
}
