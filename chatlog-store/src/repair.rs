//! Index reconstruction and torn-tail truncation.
//!
//! Supplemented from `original_source/fchat_logs.py::fix_logs`: that
//! prototype does a cheap orphan-cleanup pass over every file in a
//! conversation directory before the expensive walk-and-rebuild of the
//! remaining pairs. That two-pass shape is preserved here.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use snafu::ResultExt;

use crate::error::{ListingSnafu, RepairError};
use crate::localtime::{local_day, TimeSource};
use crate::paths::account_logs_dir;
use crate::record::Record;

/// Outcome of repairing a single account, for operators / the CLI to report.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RepairReport {
    pub orphan_indices_deleted: Vec<String>,
    pub orphan_logs_deleted: Vec<String>,
    pub logs_truncated: Vec<String>,
    pub indices_rebuilt: Vec<String>,
}

/// Repairs every conversation under `account`.
pub fn repair_account(
    root: &Path,
    account: &str,
    time_source: &dyn TimeSource,
) -> Result<RepairReport, RepairError> {
    let dir = account_logs_dir(root, account);
    let mut report = RepairReport::default();

    if !dir.exists() {
        return Ok(report);
    }

    let mut log_keys = Vec::new();
    let mut idx_keys = Vec::new();
    for entry in fs::read_dir(&dir).context(ListingSnafu { path: dir.clone() })? {
        let entry = entry.context(ListingSnafu { path: dir.clone() })?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        match name.strip_suffix(".idx") {
            Some(key) => idx_keys.push(key.to_string()),
            None => log_keys.push(name),
        }
    }

    // Pass 1: delete orphans.
    for key in &idx_keys {
        if !log_keys.contains(key) {
            let path = dir.join(format!("{key}.idx"));
            if fs::remove_file(&path).is_ok() {
                tracing::warn!(file = %path.display(), "deleted index with no matching log");
                report.orphan_indices_deleted.push(key.clone());
            }
        }
    }
    for key in &log_keys {
        if !idx_keys.contains(key) {
            let path = dir.join(key);
            if fs::remove_file(&path).is_ok() {
                tracing::warn!(file = %path.display(), "deleted log with no matching index");
                report.orphan_logs_deleted.push(key.clone());
            }
        }
    }

    // Pass 2: rebuild the index of every remaining pair from the log.
    for key in &log_keys {
        if !idx_keys.contains(key) {
            continue;
        }
        let log_path = dir.join(key);
        let idx_path = dir.join(format!("{key}.idx"));
        match repair_pair(&log_path, &idx_path, time_source) {
            Ok(outcome) => {
                if outcome.truncated {
                    report.logs_truncated.push(key.clone());
                }
                report.indices_rebuilt.push(key.clone());
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to repair conversation, leaving untouched");
            }
        }
    }

    tracing::info!(
        account,
        orphan_indices = report.orphan_indices_deleted.len(),
        orphan_logs = report.orphan_logs_deleted.len(),
        rebuilt = report.indices_rebuilt.len(),
        "repair pass complete"
    );

    Ok(report)
}

/// Repairs every account under `root`.
pub fn repair_all(
    root: &Path,
    time_source: &dyn TimeSource,
) -> Result<Vec<(String, RepairReport)>, RepairError> {
    let accounts =
        crate::paths::accounts(root).context(ListingSnafu { path: root.to_path_buf() })?;
    let mut out = Vec::new();
    for account in accounts {
        let report = repair_account(root, &account, time_source)?;
        out.push((account, report));
    }
    Ok(out)
}

struct PairOutcome {
    truncated: bool,
}

/// Rebuilds one conversation's index from its log, truncating a torn tail if
/// one is found.
fn repair_pair(
    log_path: &Path,
    idx_path: &Path,
    time_source: &dyn TimeSource,
) -> std::io::Result<PairOutcome> {
    let header = read_index_header(idx_path)?;

    // Truncate the index to just its header; entries are rebuilt below.
    {
        let f = OpenOptions::new().write(true).open(idx_path)?;
        f.set_len(header.len() as u64)?;
    }

    let mut log_bytes = Vec::new();
    File::open(log_path)?.read_to_end(&mut log_bytes)?;

    let mut idx_file = OpenOptions::new().append(true).open(idx_path)?;
    let mut pos: usize = 0;
    let mut last_day: Option<u16> = None;
    let mut truncated = false;

    loop {
        if pos >= log_bytes.len() {
            break;
        }
        match Record::decode_forward(&log_bytes, pos) {
            Ok((record, consumed)) => {
                let day = local_day(time_source, record.time);
                if last_day.map(|d| day > d).unwrap_or(true) {
                    let mut entry = [0u8; 7];
                    entry[0..2].copy_from_slice(&day.to_le_bytes());
                    let offset_bytes = (pos as u64).to_le_bytes();
                    entry[2..7].copy_from_slice(&offset_bytes[0..5]);
                    idx_file.write_all(&entry)?;
                    last_day = Some(day);
                }
                pos += consumed;
            }
            Err(_) => {
                drop(idx_file);
                let f = OpenOptions::new().write(true).open(log_path)?;
                f.set_len(pos as u64)?;
                truncated = true;
                break;
            }
        }
    }

    Ok(PairOutcome { truncated })
}

/// Reads just the `(name_len, name)` header bytes of an index file, tolerating
/// a file that is empty or too short to hold a well-formed header.
fn read_index_header(idx_path: &Path) -> std::io::Result<Vec<u8>> {
    let mut content = Vec::new();
    File::open(idx_path)?.read_to_end(&mut content)?;
    if content.is_empty() {
        return Ok(Vec::new());
    }
    let name_len = content[0] as usize;
    let header_len = (1 + name_len).min(content.len());
    Ok(content[..header_len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localtime::FixedOffset;
    use crate::record::MessageKind;
    use crate::writer::append;
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
    fn s4_truncated_tail_is_repaired() {
        let dir = tempdir().unwrap();
        let mut index = None;
        append(
            dir.path(),
            "alice",
            "pub-general",
            "Public General",
            &[msg(0, "one"), msg(1, "two")],
            &mut index,
            &FixedOffset(0),
        )
        .unwrap();

        let log_path = crate::paths::log_path(dir.path(), "alice", "pub-general");
        let good_len = fs::metadata(&log_path).unwrap().len();
        // Tear the last record's tail (simulated crash mid-write).
        let f = OpenOptions::new().write(true).open(&log_path).unwrap();
        f.set_len(good_len - 3).unwrap();

        assert!(crate::query::backlog(dir.path(), "alice", "pub-general").is_empty());

        let report = repair_account(dir.path(), "alice", &FixedOffset(0)).unwrap();
        assert!(report.logs_truncated.contains(&"pub-general".to_string()));

        let backlog = crate::query::backlog(dir.path(), "alice", "pub-general");
        assert_eq!(backlog, vec![msg(0, "one")]);
    }

    #[test]
    fn orphan_index_is_deleted() {
        let dir = tempdir().unwrap();
        let logs_dir = account_logs_dir(dir.path(), "alice");
        fs::create_dir_all(&logs_dir).unwrap();
        fs::write(logs_dir.join("ghost.idx"), [0u8]).unwrap();

        let report = repair_account(dir.path(), "alice", &FixedOffset(0)).unwrap();
        assert_eq!(report.orphan_indices_deleted, vec!["ghost".to_string()]);
        assert!(!logs_dir.join("ghost.idx").exists());
    }

    #[test]
    fn orphan_log_is_deleted() {
        let dir = tempdir().unwrap();
        let logs_dir = account_logs_dir(dir.path(), "alice");
        fs::create_dir_all(&logs_dir).unwrap();
        fs::write(logs_dir.join("ghost"), [0u8]).unwrap();

        let report = repair_account(dir.path(), "alice", &FixedOffset(0)).unwrap();
        assert_eq!(report.orphan_logs_deleted, vec!["ghost".to_string()]);
        assert!(!logs_dir.join("ghost").exists());
    }

    #[test]
    fn repair_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut index = None;
        append(
            dir.path(),
            "alice",
            "pub-general",
            "Public General",
            &[msg(0, "one"), msg(86_400, "two")],
            &mut index,
            &FixedOffset(0),
        )
        .unwrap();

        repair_account(dir.path(), "alice", &FixedOffset(0)).unwrap();
        let idx_path = crate::paths::index_path(dir.path(), "alice", "pub-general");
        let after_first: Vec<u8> = {
            let mut buf = Vec::new();
            File::open(&idx_path).unwrap().read_to_end(&mut buf).unwrap();
            buf
        };

        repair_account(dir.path(), "alice", &FixedOffset(0)).unwrap();
        let after_second: Vec<u8> = {
            let mut buf = Vec::new();
            File::open(&idx_path).unwrap().read_to_end(&mut buf).unwrap();
            buf
        };

        assert_eq!(after_first, after_second);
    }
}
