//! `chatlog-store`: a local, append-only binary datastore for chronological
//! chat messages, keyed by account and conversation.
//!
//! The crate is organized leaf-first, mirroring the on-disk format it
//! implements: [`record`] is the wire codec, [`index`] and [`paths`] describe
//! how a conversation's files relate to each other, [`writer`] and
//! [`scanner`]/[`query`] are the write and read paths built on top of those,
//! and [`repair`]/[`reconcile`] are the two maintenance procedures a deployed
//! store needs. [`Store`] ties all of it into one handle.

#![warn(clippy::all)]

#[macro_use]
extern crate tracing;

pub mod error;
pub mod index;
pub mod localtime;
pub mod paths;
pub mod query;
pub mod reconcile;
pub mod record;
pub mod repair;
pub mod scanner;
pub mod writer;

use std::path::{Path, PathBuf};

use chrono::Local;

pub use error::StoreError;
pub use localtime::{FixedOffset, SystemLocalTime, TimeSource};
pub use reconcile::MergeTarget;
pub use record::{MessageKind, Record};
pub use repair::RepairReport;

use index::AccountIndexCache;
use paths::account_logs_dir;

/// A handle onto a store root, bundling the account/index cache and the
/// [`TimeSource`] used to bucket records into local-calendar days.
///
/// Cheap to construct; the expensive state it owns (the loaded index for
/// whichever account was last touched) is lazily populated and invalidated
/// the way §4.C describes.
pub struct Store {
    root: PathBuf,
    index_cache: AccountIndexCache,
    time_source: Box<dyn TimeSource>,
}

impl Store {
    /// Opens a store rooted at `root`. The root need not exist yet; it is
    /// created on first append.
    pub fn open(root: impl Into<PathBuf>) -> Store {
        Store::with_time_source(root, Box::new(SystemLocalTime))
    }

    /// As [`open`](Self::open), with an injectable [`TimeSource`] — tests use
    /// this to pin a fixed UTC offset for byte-exact determinism (§8
    /// property 2).
    pub fn with_time_source(root: impl Into<PathBuf>, time_source: Box<dyn TimeSource>) -> Store {
        Store {
            root: root.into(),
            index_cache: AccountIndexCache::new(),
            time_source,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lists the known accounts (subdirectories of the store root).
    pub fn accounts(&self) -> std::io::Result<Vec<String>> {
        paths::accounts(&self.root)
    }

    /// Lists `account`'s conversations as `(key, display_name)` pairs.
    pub fn conversations(&self, account: &str) -> std::io::Result<Vec<(String, String)>> {
        let keys = paths::conversation_keys(&self.root, account)?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let idx_path = paths::index_path(&self.root, account, &key);
            let display_name = index::IndexItem::load(&idx_path)
                .map(|item| item.display_name)
                .unwrap_or_else(|_| key.clone());
            out.push((key, display_name));
        }
        Ok(out)
    }

    /// Appends one or more records to `account`'s `key` conversation (§4.D).
    #[instrument(skip(self, records), fields(account, key))]
    pub fn append(
        &mut self,
        account: &str,
        key: &str,
        display_name: &str,
        records: &[Record],
    ) -> Result<(), error::AppendError> {
        let logs_dir = account_logs_dir(&self.root, account);
        let map = self
            .index_cache
            .get(account, &logs_dir)
            .map_err(|source| error::AppendError::Io {
                source,
                path: logs_dir.clone(),
            })?;
        let mut item = map.remove(key);
        let result = writer::append(
            &self.root,
            account,
            key,
            display_name,
            records,
            &mut item,
            self.time_source.as_ref(),
        );
        if let Some(item) = item {
            map.insert(key.to_string(), item);
        }
        result
    }

    /// Full backlog, newest-first.
    pub fn backlog(&self, account: &str, key: &str) -> Vec<Record> {
        query::backlog(&self.root, account, key)
    }

    /// The newest `count` records, newest-first.
    pub fn backlog_count(&self, account: &str, key: &str, count: usize) -> Vec<Record> {
        query::backlog_count(&self.root, account, key, count)
    }

    /// Every record whose local day equals `date`'s, newest-first.
    pub fn backlog_on_date(
        &self,
        account: &str,
        key: &str,
        date: chrono::NaiveDate,
    ) -> Vec<Record> {
        let day = localtime::day_number_from_date(date);
        query::backlog_on_date(&self.root, account, key, day, self.time_source.as_ref())
    }

    /// The distinct local calendar dates present in the log, newest-first.
    pub fn distinct_dates(&self, account: &str, key: &str) -> Vec<chrono::NaiveDate> {
        query::distinct_dates(&self.root, account, key, self.time_source.as_ref())
            .into_iter()
            .map(localtime::date_from_day_number)
            .collect()
    }

    /// Total number of records in a conversation's log.
    pub fn record_count(&self, account: &str, key: &str) -> usize {
        query::record_count(&self.root, account, key)
    }

    /// Deletes a conversation's log and index files. No-op if they don't
    /// exist.
    pub fn clear(&mut self, account: &str, key: &str) {
        let _ = std::fs::remove_file(paths::log_path(&self.root, account, key));
        let _ = std::fs::remove_file(paths::index_path(&self.root, account, key));
        self.index_cache.invalidate();
    }

    /// Rebuilds `account`'s indices from its logs and truncates any torn
    /// tails (§4.G). Invalidates the index cache, since repair rewrites files
    /// out from underneath it.
    pub fn repair_account(&mut self, account: &str) -> Result<RepairReport, error::RepairError> {
        let report = repair::repair_account(&self.root, account, self.time_source.as_ref())?;
        self.index_cache.invalidate();
        Ok(report)
    }

    /// Repairs every account in the store.
    pub fn repair_all(&mut self) -> Result<Vec<(String, RepairReport)>, error::RepairError> {
        let reports = repair::repair_all(&self.root, self.time_source.as_ref())?;
        self.index_cache.invalidate();
        Ok(reports)
    }

    /// Merges `account`'s `key` conversation between this store and
    /// `other_root`, per §4.H. Backups land under `backup_root/<timestamp>`;
    /// the timestamp is formatted as `YYYYMMDD_HHMMSS` from the current wall
    /// clock at the moment of the call, matching §6's backup layout.
    pub fn merge(
        &mut self,
        other_root: &Path,
        backup_root: &Path,
        account: &str,
        key: &str,
        display_name: &str,
        target: MergeTarget,
    ) -> Result<(), error::ReconcileError> {
        let backup_tag = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let scratch_root = reconcile::default_scratch_root(backup_root);
        reconcile::merge(
            &self.root,
            other_root,
            backup_root,
            &backup_tag,
            &scratch_root,
            account,
            key,
            display_name,
            target,
            self.time_source.as_ref(),
        )?;
        self.index_cache.invalidate();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MessageKind;
    use pretty_assertions::assert_eq;
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
    fn append_and_backlog_round_trip() {
        let dir = tempdir().unwrap();
        let mut store = Store::with_time_source(dir.path(), Box::new(FixedOffset(0)));
        let records = vec![msg(1, "a"), msg(2, "b")];
        store
            .append("alice", "pub-general", "Public General", &records)
            .unwrap();

        let got = store.backlog("alice", "pub-general");
        assert_eq!(got, vec![msg(2, "b"), msg(1, "a")]);
        assert_eq!(store.record_count("alice", "pub-general"), 2);
    }

    #[test]
    fn conversations_lists_keys_with_display_names() {
        let dir = tempdir().unwrap();
        let mut store = Store::with_time_source(dir.path(), Box::new(FixedOffset(0)));
        store
            .append("alice", "pub-general", "Public General", &[msg(1, "hi")])
            .unwrap();

        let convos = store.conversations("alice").unwrap();
        assert_eq!(
            convos,
            vec![("pub-general".to_string(), "Public General".to_string())]
        );
    }

    #[test]
    fn clear_removes_both_files() {
        let dir = tempdir().unwrap();
        let mut store = Store::with_time_source(dir.path(), Box::new(FixedOffset(0)));
        store
            .append("alice", "pub-general", "Public General", &[msg(1, "hi")])
            .unwrap();
        store.clear("alice", "pub-general");

        assert!(store.backlog("alice", "pub-general").is_empty());
        assert!(!paths::log_path(dir.path(), "alice", "pub-general").exists());
        assert!(!paths::index_path(dir.path(), "alice", "pub-general").exists());
    }

    #[test]
    fn switching_accounts_invalidates_the_index_cache() {
        let dir = tempdir().unwrap();
        let mut store = Store::with_time_source(dir.path(), Box::new(FixedOffset(0)));
        store
            .append("alice", "k", "K", &[msg(1, "a")])
            .unwrap();
        store.append("bob", "k", "K", &[msg(2, "b")]).unwrap();
        // A second append to alice's conversation must reload her index
        // rather than reuse bob's cached map; this only works if the append
        // above for bob correctly switched the cache.
        store.append("alice", "k", "K", &[msg(3, "c")]).unwrap();

        let alice_backlog = store.backlog("alice", "k");
        assert_eq!(alice_backlog, vec![msg(3, "c"), msg(1, "a")]);
    }
}
