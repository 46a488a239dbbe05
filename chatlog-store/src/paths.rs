//! Maps accounts and conversation keys onto files under the store root (§4.B).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Directory holding every account's logs, rooted at `root`.
pub fn account_logs_dir(root: &Path, account: &str) -> PathBuf {
    root.join(account).join("logs")
}

/// Ensures `root/account/logs` exists and returns it.
pub fn ensure_account_logs_dir(root: &Path, account: &str) -> io::Result<PathBuf> {
    let dir = account_logs_dir(root, account);
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Path to a conversation's log file.
pub fn log_path(root: &Path, account: &str, key: &str) -> PathBuf {
    account_logs_dir(root, account).join(key)
}

/// Path to a conversation's index file.
pub fn index_path(root: &Path, account: &str, key: &str) -> PathBuf {
    account_logs_dir(root, account).join(format!("{key}.idx"))
}

/// Lists the subdirectories of `root`, i.e. the known accounts.
pub fn accounts(root: &Path) -> io::Result<Vec<String>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                out.push(name.to_string());
            }
        }
    }
    out.sort();
    Ok(out)
}

/// Lists the conversation keys under `root/account/logs`, i.e. every
/// non-`.idx` filename.
pub fn conversation_keys(root: &Path, account: &str) -> io::Result<Vec<String>> {
    let dir = account_logs_dir(root, account);
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(n) => n,
            None => continue,
        };
        if !name.ends_with(".idx") {
            out.push(name.to_string());
        }
    }
    out.sort();
    Ok(out)
}
