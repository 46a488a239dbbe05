use std::io;
use std::path::PathBuf;

use snafu::Snafu;

/// Error that occurred while encoding or decoding a single record.
///
/// Readers generally do not propagate this directly — a framing error during
/// a scan is treated as "unknown/unavailable" by the caller (see
/// [`crate::scanner`]) — but the codec itself has to be able to report it
/// precisely so that callers who *do* want to know (repair, integrity tests)
/// can.
#[derive(Debug, Snafu, PartialEq, Eq, Clone, Copy)]
pub enum CodecError {
    /// The buffer ended before a complete record could be parsed out of it.
    #[snafu(display("buffer too short to contain a record: need {need} bytes, have {have}"))]
    Truncated { need: usize, have: usize },

    /// The trailing size marker did not agree with the number of bytes consumed.
    #[snafu(display(
        "framing marker mismatch: marker says {marker} bytes, parsed {parsed} bytes"
    ))]
    MarkerMismatch { marker: usize, parsed: usize },

    /// `sender_name` exceeded 255 bytes once encoded as UTF-8.
    #[snafu(display("sender name is {len} bytes, exceeds the 255 byte limit"))]
    NameTooLong { len: usize },

    /// `text` exceeded 65,535 bytes once encoded as UTF-8.
    #[snafu(display("message text is {len} bytes, exceeds the 65535 byte limit"))]
    TextTooLong { len: usize },

    /// A field that should have been valid UTF-8 was not.
    #[snafu(display("record field is not valid UTF-8"))]
    InvalidUtf8,
}

/// Error that occurred while appending one or more records to a conversation.
#[derive(Debug, Snafu)]
pub enum AppendError {
    #[snafu(display("failed to encode record: {source}"))]
    Encode { source: CodecError },

    #[snafu(display("I/O error writing to {}: {source}", path.display()))]
    Io { source: io::Error, path: PathBuf },

    /// The pre-append log size was already at or beyond the 40-bit offset
    /// ceiling; the record was rejected before either file was touched.
    #[snafu(display(
        "conversation log at {} has reached the 2^40 byte offset limit",
        path.display()
    ))]
    Overflow { path: PathBuf },
}

/// Error that occurred while reconciling two replicas of a conversation.
#[derive(Debug, Snafu)]
pub enum ReconcileError {
    #[snafu(display("failed to back up {} before merge: {source}", path.display()))]
    Backup { source: io::Error, path: PathBuf },

    #[snafu(display("failed to read replica backlog: {source}"))]
    Read { source: AppendError },

    #[snafu(display("failed to write merged record: {source}"))]
    Append { source: AppendError },

    #[snafu(display("failed to install merged store into {}: {source}", path.display()))]
    Install { source: io::Error, path: PathBuf },
}

/// Error surfaced by the repair procedure.
///
/// Repair is tolerant by design (it exists to clean up after exactly the
/// kinds of corruption that would otherwise produce these errors), so most of
/// its internal failures are logged and handled rather than returned. This
/// type only captures failures that make repair itself impossible to run,
/// e.g. the directory can't be listed at all.
#[derive(Debug, Snafu)]
pub enum RepairError {
    #[snafu(display("could not list conversations under {}: {source}", path.display()))]
    Listing { source: io::Error, path: PathBuf },
}

/// Top-level error returned by [`crate::Store`]'s facade methods.
///
/// Per-component errors (`AppendError`, `RepairError`, `ReconcileError`) are
/// precise enough to be used directly by code that only touches one
/// component; `StoreError` exists for callers — chiefly the CLI — that want
/// one error type to bubble up with `?` regardless of which operation failed.
#[derive(Debug, Snafu)]
pub enum StoreError {
    #[snafu(display("{source}"), context(false))]
    Append { source: AppendError },

    #[snafu(display("{source}"), context(false))]
    Repair { source: RepairError },

    #[snafu(display("{source}"), context(false))]
    Reconcile { source: ReconcileError },
}
