//! Read-side facades built on top of [`crate::scanner::ReverseScanner`]
//! (§4.F).
//!
//! Every facade here is tolerant by construction: a missing log, a torn tail,
//! or a framing error all just mean "fewer records than expected", never a
//! propagated error (§7 "reads are tolerant").

use std::path::Path;

use crate::localtime::{local_day, TimeSource};
use crate::paths::log_path;
use crate::record::Record;
use crate::scanner::ReverseScanner;

fn scanner_for(root: &Path, account: &str, key: &str) -> Option<ReverseScanner> {
    ReverseScanner::open(&log_path(root, account, key))
}

/// Full backlog, newest-first.
pub fn backlog(root: &Path, account: &str, key: &str) -> Vec<Record> {
    match scanner_for(root, account, key) {
        Some(scanner) => scanner.collect(),
        None => Vec::new(),
    }
}

/// The newest `count` records, newest-first (S6: the scan stops as soon as
/// `count` records have been yielded, so it never reads more of the log than
/// it has to).
pub fn backlog_count(root: &Path, account: &str, key: &str, count: usize) -> Vec<Record> {
    match scanner_for(root, account, key) {
        Some(scanner) => scanner.take(count).collect(),
        None => Vec::new(),
    }
}

/// Every record whose local day equals `date`'s, newest-first (§4.F
/// `backlog(date=D)`).
///
/// Exploits log order: once a record strictly older than `date` is seen, no
/// older record can still match (the log is append-only and days advance
/// monotonically), so the scan stops there rather than reading the whole log.
pub fn backlog_on_date(
    root: &Path,
    account: &str,
    key: &str,
    date: u16,
    time_source: &dyn TimeSource,
) -> Vec<Record> {
    let Some(scanner) = scanner_for(root, account, key) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for record in scanner {
        let day = local_day(time_source, record.time);
        if day > date {
            continue;
        }
        if day < date {
            break;
        }
        out.push(record);
    }
    out
}

/// The distinct local dates present in the log, newest-first (§4.F
/// `distinct_dates`).
pub fn distinct_dates(
    root: &Path,
    account: &str,
    key: &str,
    time_source: &dyn TimeSource,
) -> Vec<u16> {
    let Some(scanner) = scanner_for(root, account, key) else {
        return Vec::new();
    };
    let mut out: Vec<u16> = Vec::new();
    for record in scanner {
        let day = local_day(time_source, record.time);
        if out.last() != Some(&day) {
            out.push(day);
        }
    }
    out
}

/// Total number of records in the log.
pub fn record_count(root: &Path, account: &str, key: &str) -> usize {
    match scanner_for(root, account, key) {
        Some(scanner) => scanner.count(),
        None => 0,
    }
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
    fn backlog_returns_reverse_of_append_order() {
        let dir = tempdir().unwrap();
        let mut index = None;
        let records = vec![msg(1, "one"), msg(2, "two"), msg(3, "three")];
        append(
            dir.path(),
            "alice",
            "pub-general",
            "Public General",
            &records,
            &mut index,
            &FixedOffset(0),
        )
        .unwrap();

        let got = backlog(dir.path(), "alice", "pub-general");
        let expected: Vec<Record> = records.into_iter().rev().collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn missing_conversation_is_empty_not_an_error() {
        let dir = tempdir().unwrap();
        assert!(backlog(dir.path(), "alice", "nope").is_empty());
        assert_eq!(record_count(dir.path(), "alice", "nope"), 0);
    }

    #[test]
    fn backlog_count_stops_at_n() {
        let dir = tempdir().unwrap();
        let mut index = None;
        let records = vec![msg(1, "one"), msg(2, "two"), msg(3, "three")];
        append(
            dir.path(),
            "alice",
            "pub-general",
            "Public General",
            &records,
            &mut index,
            &FixedOffset(0),
        )
        .unwrap();

        let got = backlog_count(dir.path(), "alice", "pub-general", 1);
        assert_eq!(got, vec![msg(3, "three")]);
    }

    #[test]
    fn date_filter_matches_only_that_day() {
        let dir = tempdir().unwrap();
        let mut index = None;
        let day0 = 0u32;
        let day1 = 86_400u32;
        let records = vec![
            msg(day0, "day0-a"),
            msg(day0 + 10, "day0-b"),
            msg(day1, "day1-a"),
        ];
        append(
            dir.path(),
            "alice",
            "pub-general",
            "Public General",
            &records,
            &mut index,
            &FixedOffset(0),
        )
        .unwrap();

        let got = backlog_on_date(dir.path(), "alice", "pub-general", 0, &FixedOffset(0));
        assert_eq!(got, vec![msg(day0 + 10, "day0-b"), msg(day0, "day0-a")]);
    }

    #[test]
    fn distinct_dates_is_deduplicated_and_newest_first() {
        let dir = tempdir().unwrap();
        let mut index = None;
        let records = vec![
            msg(0, "d0-a"),
            msg(10, "d0-b"),
            msg(86_400, "d1-a"),
            msg(2 * 86_400, "d2-a"),
        ];
        append(
            dir.path(),
            "alice",
            "pub-general",
            "Public General",
            &records,
            &mut index,
            &FixedOffset(0),
        )
        .unwrap();

        let got = distinct_dates(dir.path(), "alice", "pub-general", &FixedOffset(0));
        assert_eq!(got, vec![2, 1, 0]);
    }

    #[test]
    fn record_count_matches_number_appended() {
        let dir = tempdir().unwrap();
        let mut index = None;
        let records = vec![msg(1, "a"), msg(2, "b"), msg(3, "c")];
        append(
            dir.path(),
            "alice",
            "pub-general",
            "Public General",
            &records,
            &mut index,
            &FixedOffset(0),
        )
        .unwrap();
        assert_eq!(record_count(dir.path(), "alice", "pub-general"), 3);
    }
}
