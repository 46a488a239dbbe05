//! Two-replica reconciliation.
//!
//! Replicas are ordinary store roots; this module never assumes they live on
//! the same filesystem as each other or as the backup/scratch locations it is
//! given.

use std::fs;
use std::path::{Path, PathBuf};

use snafu::ResultExt;

use crate::error::{AppendSnafu, BackupSnafu, InstallSnafu, ReconcileError};
use crate::localtime::TimeSource;
use crate::paths::{index_path, log_path};
use crate::query::backlog;
use crate::record::Record;
use crate::writer::append;

/// Which replica(s) should receive the merged result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeTarget {
    A,
    B,
    Both,
}

impl MergeTarget {
    fn includes_a(self) -> bool {
        matches!(self, MergeTarget::A | MergeTarget::Both)
    }

    fn includes_b(self) -> bool {
        matches!(self, MergeTarget::B | MergeTarget::Both)
    }
}

/// Identity key: `(time, kind, sender_name, text)`. Using the byte form of
/// `kind` (rather than [`crate::record::MessageKind`] itself) keeps the
/// tuple's `Ord` a plain lexicographic comparison, which drives the
/// deterministic tie-break below.
type IdentityKey = (u32, u8, String, String);

fn identity_key(record: &Record) -> IdentityKey {
    (
        record.time,
        record.kind.to_byte(),
        record.sender_name.clone(),
        record.text.clone(),
    )
}

/// Copies a conversation's log and index files (whichever exist) from
/// `src_root` into `backup_root/<replica_tag>/<account>/<key>[.idx]`.
/// Missing files are silently skipped.
fn backup_replica(
    backup_root: &Path,
    replica_tag: &str,
    src_root: &Path,
    account: &str,
    key: &str,
) -> Result<(), ReconcileError> {
    let dest_dir = backup_root.join(replica_tag).join(account);
    let src_log = log_path(src_root, account, key);
    let src_idx = index_path(src_root, account, key);

    if !src_log.exists() && !src_idx.exists() {
        return Ok(());
    }
    fs::create_dir_all(&dest_dir).context(BackupSnafu {
        path: dest_dir.clone(),
    })?;
    if src_log.exists() {
        let dest = dest_dir.join(key);
        fs::copy(&src_log, &dest).context(BackupSnafu { path: dest })?;
    }
    if src_idx.exists() {
        let dest = dest_dir.join(format!("{key}.idx"));
        fs::copy(&src_idx, &dest).context(BackupSnafu { path: dest })?;
    }
    Ok(())
}

/// Removes a conversation's log and index files from `root`, if present.
fn clear_pair(root: &Path, account: &str, key: &str) {
    let _ = fs::remove_file(log_path(root, account, key));
    let _ = fs::remove_file(index_path(root, account, key));
}

fn copy_if_exists(src: &Path, dest: &Path) -> Result<(), ReconcileError> {
    if !src.exists() {
        return Ok(());
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).context(InstallSnafu {
            path: dest.to_path_buf(),
        })?;
    }
    fs::copy(src, dest).context(InstallSnafu {
        path: dest.to_path_buf(),
    })?;
    Ok(())
}

/// Merges `account`'s `key` conversation between replica roots `replica_a`
/// and `replica_b`, writing the result into whichever of them `target`
/// selects. `backup_root` and `scratch_root` are caller-owned scratch
/// directories; `backup_tag` is typically a `YYYYMMDD_HHMMSS` timestamp
/// formatted by the caller (kept out of this module so it stays pure and
/// deterministic for tests).
#[allow(clippy::too_many_arguments)]
pub fn merge(
    replica_a: &Path,
    replica_b: &Path,
    backup_root: &Path,
    backup_tag: &str,
    scratch_root: &Path,
    account: &str,
    key: &str,
    display_name: &str,
    target: MergeTarget,
    time_source: &dyn TimeSource,
) -> Result<(), ReconcileError> {
    let backup_dir = backup_root.join(backup_tag);
    if target.includes_a() {
        backup_replica(&backup_dir, "a", replica_a, account, key)?;
    }
    if target.includes_b() {
        backup_replica(&backup_dir, "b", replica_b, account, key)?;
    }

    let records_a = backlog(replica_a, account, key);
    let records_b = backlog(replica_b, account, key);

    let mut by_key_a = std::collections::HashMap::new();
    for record in records_a {
        by_key_a.insert(identity_key(&record), record);
    }
    let mut by_key_b = std::collections::HashMap::new();
    for record in records_b {
        by_key_b.insert(identity_key(&record), record);
    }

    let mut keys: Vec<IdentityKey> = by_key_a
        .keys()
        .chain(by_key_b.keys())
        .cloned()
        .collect::<std::collections::HashSet<_>>()
        .into_iter()
        .collect();
    keys.sort();

    clear_pair(scratch_root, account, key);
    let mut scratch_index = None;
    for k in &keys {
        let record = by_key_a
            .get(k)
            .or_else(|| by_key_b.get(k))
            .expect("key came from one of the two maps")
            .clone();
        append(
            scratch_root,
            account,
            key,
            display_name,
            std::slice::from_ref(&record),
            &mut scratch_index,
            time_source,
        )
        .context(AppendSnafu)?;
    }

    let scratch_log = log_path(scratch_root, account, key);
    let scratch_idx = index_path(scratch_root, account, key);

    if target.includes_a() {
        copy_if_exists(&scratch_log, &log_path(replica_a, account, key))?;
        copy_if_exists(&scratch_idx, &index_path(replica_a, account, key))?;
    }
    if target.includes_b() {
        copy_if_exists(&scratch_log, &log_path(replica_b, account, key))?;
        copy_if_exists(&scratch_idx, &index_path(replica_b, account, key))?;
    }

    Ok(())
}

/// Convenience for callers that only need a scratch directory path under a
/// shared temp root, under a `temp/merge` subdirectory.
pub fn default_scratch_root(root: &Path) -> PathBuf {
    root.join("temp").join("merge")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localtime::FixedOffset;
    use crate::record::MessageKind;
    use tempfile::tempdir;

    fn msg(time: u32, text: &str) -> Record {
        Record {
            time,
            kind: MessageKind::Message,
            sender_name: "alice".to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn s5_union_deduplicates_identical_records() {
        let root_a = tempdir().unwrap();
        let root_b = tempdir().unwrap();
        let backups = tempdir().unwrap();
        let scratch = tempdir().unwrap();

        let mut idx_a = None;
        append(
            root_a.path(),
            "alice",
            "pub-general",
            "Public General",
            &[msg(1, "r1"), msg(2, "r2")],
            &mut idx_a,
            &FixedOffset(0),
        )
        .unwrap();
        let mut idx_b = None;
        append(
            root_b.path(),
            "alice",
            "pub-general",
            "Public General",
            &[msg(2, "r2"), msg(3, "r3")],
            &mut idx_b,
            &FixedOffset(0),
        )
        .unwrap();

        merge(
            root_a.path(),
            root_b.path(),
            backups.path(),
            "20260101_000000",
            scratch.path(),
            "alice",
            "pub-general",
            "Public General",
            MergeTarget::Both,
            &FixedOffset(0),
        )
        .unwrap();

        let merged_a = backlog(root_a.path(), "alice", "pub-general");
        let merged_b = backlog(root_b.path(), "alice", "pub-general");
        assert_eq!(merged_a, merged_b);

        let oldest_first: Vec<Record> = merged_a.into_iter().rev().collect();
        assert_eq!(oldest_first, vec![msg(1, "r1"), msg(2, "r2"), msg(3, "r3")]);
    }

    #[test]
    fn merge_is_commutative_in_replica_order() {
        let root_a = tempdir().unwrap();
        let root_b = tempdir().unwrap();
        let backups = tempdir().unwrap();
        let scratch1 = tempdir().unwrap();
        let scratch2 = tempdir().unwrap();
        let dest1 = tempdir().unwrap();
        let dest2 = tempdir().unwrap();

        let mut idx_a = None;
        append(
            root_a.path(),
            "alice",
            "k",
            "K",
            &[msg(5, "x"), msg(1, "y")],
            &mut idx_a,
            &FixedOffset(0),
        )
        .unwrap();
        let mut idx_b = None;
        append(
            root_b.path(),
            "alice",
            "k",
            "K",
            &[msg(3, "z")],
            &mut idx_b,
            &FixedOffset(0),
        )
        .unwrap();

        merge(
            root_a.path(),
            root_b.path(),
            backups.path(),
            "t1",
            scratch1.path(),
            "alice",
            "k",
            "K",
            MergeTarget::A,
            &FixedOffset(0),
        )
        .unwrap();
        copy_if_exists(&log_path(root_a.path(), "alice", "k"), &log_path(dest1.path(), "alice", "k")).unwrap();

        // Re-seed fresh replicas and merge B-then-A to check order independence.
        let root_a2 = tempdir().unwrap();
        let root_b2 = tempdir().unwrap();
        let mut idx_a2 = None;
        append(
            root_a2.path(),
            "alice",
            "k",
            "K",
            &[msg(5, "x"), msg(1, "y")],
            &mut idx_a2,
            &FixedOffset(0),
        )
        .unwrap();
        let mut idx_b2 = None;
        append(
            root_b2.path(),
            "alice",
            "k",
            "K",
            &[msg(3, "z")],
            &mut idx_b2,
            &FixedOffset(0),
        )
        .unwrap();
        merge(
            root_b2.path(),
            root_a2.path(),
            backups.path(),
            "t2",
            scratch2.path(),
            "alice",
            "k",
            "K",
            MergeTarget::A,
            &FixedOffset(0),
        )
        .unwrap();
        copy_if_exists(&log_path(root_b2.path(), "alice", "k"), &log_path(dest2.path(), "alice", "k")).unwrap();

        let bytes1 = fs::read(log_path(dest1.path(), "alice", "k")).unwrap();
        let bytes2 = fs::read(log_path(dest2.path(), "alice", "k")).unwrap();
        assert_eq!(bytes1, bytes2);
    }

    #[test]
    fn backup_is_best_effort_when_files_are_missing() {
        let root_a = tempdir().unwrap();
        let root_b = tempdir().unwrap();
        let backups = tempdir().unwrap();
        // No conversation exists on either side yet; backup must not error.
        backup_replica(&backups.path().join("t"), "a", root_a.path(), "alice", "k").unwrap();
        backup_replica(&backups.path().join("t"), "b", root_b.path(), "alice", "k").unwrap();
    }
}
