//! Serializes records and maintains the day index as they're appended
//! (§4.D).

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use snafu::ResultExt;
use tracing::instrument;

use crate::error::{AppendError, EncodeSnafu};
use crate::index::IndexItem;
use crate::localtime::{local_day, TimeSource};
use crate::paths::{ensure_account_logs_dir, index_path, log_path};
use crate::record::Record;

/// 2^40 - 1, the largest offset a 5-byte little-endian index entry can hold
/// (§6).
pub const MAX_LOG_OFFSET: u64 = (1u64 << 40) - 1;

/// Appends one or more records to `account`'s `key` conversation, creating
/// the log/index pair on first use.
///
/// `index` is the in-memory index for this conversation; the caller is
/// responsible for loading it first (see [`crate::index::AccountIndexCache`])
/// and for persisting any mutation this function makes to it.
#[instrument(skip(time_source, records, index), fields(account, key))]
pub fn append(
    root: &Path,
    account: &str,
    key: &str,
    display_name: &str,
    records: &[Record],
    index: &mut Option<IndexItem>,
    time_source: &dyn TimeSource,
) -> Result<(), AppendError> {
    ensure_account_logs_dir(root, account).map_err(|source| AppendError::Io {
        source,
        path: root.join(account),
    })?;

    let log_file_path = log_path(root, account, key);
    let index_file_path = index_path(root, account, key);

    let mut log_size = fs::metadata(&log_file_path).map(|m| m.len()).unwrap_or(0);

    for record in records {
        if log_size > MAX_LOG_OFFSET {
            return Err(AppendError::Overflow {
                path: log_file_path,
            });
        }

        let encoded = record.encode().context(EncodeSnafu)?;
        let day = local_day(time_source, record.time);

        let index_buf = match index {
            Some(item) => item.record_append(day, log_size, false),
            None => {
                let mut item = IndexItem::new(display_name.to_string());
                let buf = item.record_append(day, log_size, true);
                *index = Some(item);
                buf
            }
        };

        if let Some(buf) = index_buf {
            let mut f = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&index_file_path)
                .map_err(|source| AppendError::Io {
                    source,
                    path: index_file_path.clone(),
                })?;
            f.write_all(&buf).map_err(|source| AppendError::Io {
                source,
                path: index_file_path.clone(),
            })?;
        }

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file_path)
            .map_err(|source| AppendError::Io {
                source,
                path: log_file_path.clone(),
            })?;
        f.write_all(&encoded).map_err(|source| AppendError::Io {
            source,
            path: log_file_path.clone(),
        })?;

        log_size += encoded.len() as u64;
    }

    Ok(())
}
