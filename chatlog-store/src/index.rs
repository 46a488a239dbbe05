//! In-memory day→offset index and its on-disk representation.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::path::Path;

const ENTRY_LEN: usize = 7; // day(2) + offset(5)

/// A conversation's index, loaded from or about to be written to its `.idx`
/// file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexItem {
    /// The conversation's display name, stored once in the header.
    pub display_name: String,
    /// Offsets in insertion order, i.e. the order in which new days were
    /// first observed.
    pub offsets: Vec<u64>,
    /// `day_number -> position in offsets`.
    pub day_to_offset_index: HashMap<u16, usize>,
}

impl IndexItem {
    pub(crate) fn new(display_name: String) -> Self {
        IndexItem {
            display_name,
            offsets: Vec::new(),
            day_to_offset_index: HashMap::new(),
        }
    }

    /// Serializes the header (`name_len` + `name`) for a brand-new index file.
    fn encode_header(&self) -> Vec<u8> {
        let name_bytes = self.display_name.as_bytes();
        let mut buf = Vec::with_capacity(1 + name_bytes.len());
        buf.push(name_bytes.len() as u8);
        buf.extend_from_slice(name_bytes);
        buf
    }

    fn encode_entry(day: u16, offset: u64) -> [u8; ENTRY_LEN] {
        let mut buf = [0u8; ENTRY_LEN];
        buf[0..2].copy_from_slice(&day.to_le_bytes());
        let offset_bytes = offset.to_le_bytes(); // little-endian u64, take low 5 bytes
        buf[2..7].copy_from_slice(&offset_bytes[0..5]);
        buf
    }

    /// Reads an entire `.idx` file into memory.
    pub fn load(path: &Path) -> io::Result<IndexItem> {
        let mut content = Vec::new();
        fs::File::open(path)?.read_to_end(&mut content)?;
        Self::parse(&content)
    }

    fn parse(content: &[u8]) -> io::Result<IndexItem> {
        if content.is_empty() {
            return Ok(IndexItem::new(String::new()));
        }
        let name_len = content[0] as usize;
        let name_end = 1 + name_len;
        let display_name = std::str::from_utf8(&content[1..name_end])
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
            .to_string();

        let mut item = IndexItem::new(display_name);
        let mut pos = name_end;
        while pos + ENTRY_LEN <= content.len() {
            let day = u16::from_le_bytes(content[pos..pos + 2].try_into().unwrap());
            let mut offset_bytes = [0u8; 8];
            offset_bytes[0..5].copy_from_slice(&content[pos + 2..pos + 7]);
            let offset = u64::from_le_bytes(offset_bytes);

            // Last-wins on a duplicate day: this engine never produces
            // duplicates itself, but tolerates them if present.
            item.day_to_offset_index.insert(day, item.offsets.len());
            item.offsets.push(offset);
            pos += ENTRY_LEN;
        }
        Ok(item)
    }

    /// Computes the bytes to append to the index file for a new record
    /// landing on local day `day` at pre-append log size `log_size`, and
    /// mutates `self` to reflect the update.
    ///
    /// Returns `None` when `day` already has an entry — no index write is
    /// needed for a message that isn't the first of its day.
    pub fn record_append(&mut self, day: u16, log_size: u64, is_new: bool) -> Option<Vec<u8>> {
        if self.day_to_offset_index.contains_key(&day) {
            return None;
        }
        self.day_to_offset_index.insert(day, self.offsets.len());
        self.offsets.push(log_size);

        let entry = Self::encode_entry(day, log_size);
        if is_new {
            let mut buf = self.encode_header();
            buf.extend_from_slice(&entry);
            Some(buf)
        } else {
            Some(entry.to_vec())
        }
    }

    /// Offset of the first record observed for `day`, if the index has one.
    pub fn offset_for_day(&self, day: u16) -> Option<u64> {
        self.day_to_offset_index
            .get(&day)
            .map(|&pos| self.offsets[pos])
    }
}

/// Caches the index map for whichever account was most recently loaded,
/// only ever keeping the "currently loaded account" resident: switching
/// accounts invalidates the cache wholesale rather than merging.
#[derive(Debug, Default)]
pub struct AccountIndexCache {
    loaded_account: Option<String>,
    items: HashMap<String, IndexItem>,
}

impl AccountIndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index map for `account`, loading it from `logs_dir` if
    /// the cache is currently holding a different account (or nothing).
    pub fn get(&mut self, account: &str, logs_dir: &Path) -> io::Result<&mut HashMap<String, IndexItem>> {
        if self.loaded_account.as_deref() != Some(account) {
            self.loaded_account = Some(account.to_string());
            self.items = load_account_indices(logs_dir)?;
        }
        Ok(&mut self.items)
    }

    /// Forgets the cached account entirely, forcing the next [`get`] to
    /// reload from disk. Used after repair/reconciliation rewrite files out
    /// from underneath the cache.
    ///
    /// [`get`]: AccountIndexCache::get
    pub fn invalidate(&mut self) {
        self.loaded_account = None;
        self.items.clear();
    }
}

fn load_account_indices(logs_dir: &Path) -> io::Result<HashMap<String, IndexItem>> {
    let mut out = HashMap::new();
    if !logs_dir.exists() {
        return Ok(out);
    }
    for entry in fs::read_dir(logs_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(n) => n,
            None => continue,
        };
        let Some(key) = name.strip_suffix(".idx") else {
            continue;
        };
        match IndexItem::load(&entry.path()) {
            Ok(item) => {
                out.insert(key.to_string(), item);
            }
            Err(e) => {
                tracing::warn!(file = %entry.path().display(), error = %e, "failed to load index, skipping");
            }
        }
    }
    Ok(out)
}
