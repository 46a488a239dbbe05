//! Tail-to-head log traversal in fixed-size windows (§4.E).
//!
//! A window-buffer-driven handler and a pull iterator are isomorphic here, so
//! this is exposed as a plain [`Iterator`]: callers stop early simply by
//! stopping iteration (`take`, `find`, a `for` loop with `break`), which is
//! what every facade in [`crate::query`] does.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::record::{self, Record};

/// Size of each window read from the tail of the log, per §4.E.
pub const CHUNK_SIZE: usize = 65_536;

/// Scans a log file newest-first, in `CHUNK_SIZE` windows.
///
/// Any I/O or framing error encountered mid-scan (§4.E "Error recovery")
/// silently ends iteration rather than propagating: callers see whatever
/// records were already yielded and must treat a short or empty result as
/// "unavailable", not as proof the log is empty.
pub struct ReverseScanner {
    file: File,
    /// File offset below which nothing has been read yet.
    pos: u64,
    window: Vec<u8>,
    /// Bytes `[0, cursor)` of `window` are unconsumed.
    cursor: usize,
    chunk_size: usize,
    done: bool,
}

impl ReverseScanner {
    /// Opens `path` for reverse scanning. Returns `None` if the file does not
    /// exist, matching step 1 of §4.E ("no result").
    pub fn open(path: &Path) -> Option<ReverseScanner> {
        Self::open_with_chunk_size(path, CHUNK_SIZE)
    }

    /// As [`open`](Self::open), with an overridable chunk size (used by tests
    /// to exercise boundary-straddling records without a 64 KiB log).
    pub fn open_with_chunk_size(path: &Path, chunk_size: usize) -> Option<ReverseScanner> {
        let file = File::open(path).ok()?;
        let pos = file.metadata().ok()?.len();
        Some(ReverseScanner {
            file,
            pos,
            window: Vec::new(),
            cursor: 0,
            chunk_size,
            done: false,
        })
    }

    /// Reads the next window into `self.window`, stepping `pos` back by
    /// `min(chunk_size, pos)` bytes (§4.E step 2a).
    fn fill_window(&mut self) -> std::io::Result<()> {
        let read_size = self.chunk_size.min(self.pos as usize);
        self.pos -= read_size as u64;
        let mut buf = vec![0u8; read_size];
        self.file.seek(SeekFrom::Start(self.pos))?;
        self.file.read_exact(&mut buf)?;
        self.window = buf;
        self.cursor = read_size;
        Ok(())
    }

    /// Reads a record whose encoded length exceeds the window's current
    /// contents directly from the file, bypassing the fixed-size window, and
    /// repositions the scanner so the next window starts immediately before
    /// it.
    fn read_oversized_record(&mut self, total_len: usize) -> Option<Record> {
        let boundary_abs = self.pos + self.cursor as u64;
        let total_len = total_len as u64;
        if total_len > boundary_abs {
            self.done = true;
            return None;
        }
        let start_abs = boundary_abs - total_len;
        let mut buf = vec![0u8; total_len as usize];
        if self.file.seek(SeekFrom::Start(start_abs)).is_err() || self.file.read_exact(&mut buf).is_err() {
            self.done = true;
            return None;
        }
        match Record::decode_forward(&buf, 0) {
            Ok((decoded, consumed)) if consumed as u64 == total_len => {
                self.pos = start_abs;
                self.window = Vec::new();
                self.cursor = 0;
                Some(decoded)
            }
            _ => {
                self.done = true;
                None
            }
        }
    }
}

impl Iterator for ReverseScanner {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        if self.done {
            return None;
        }
        loop {
            while self.cursor >= 2 {
                let Some(total_len) = record::read_marker(&self.window, self.cursor) else {
                    self.done = true;
                    return None;
                };
                if total_len > self.cursor {
                    if self.cursor == self.window.len() {
                        // Nothing was consumed from this window: the record
                        // is larger than a whole chunk, so re-reading the
                        // same-size window at the same position would spin
                        // forever. Read exactly this record's bytes instead.
                        return self.read_oversized_record(total_len);
                    }
                    // Record straddles the window boundary; re-read it next window.
                    break;
                }
                let start = self.cursor - total_len;
                match Record::decode_forward(&self.window, start) {
                    Ok((decoded, consumed)) if consumed == total_len => {
                        self.cursor = start;
                        return Some(decoded);
                    }
                    _ => {
                        self.done = true;
                        return None;
                    }
                }
            }

            // Push the unconsumed prefix back so the next window re-reads it
            // alongside older data (§4.E step 2d).
            self.pos += self.cursor as u64;
            if self.pos == 0 {
                self.done = true;
                return None;
            }
            if self.fill_window().is_err() {
                self.done = true;
                return None;
            }
        }
    }
}
