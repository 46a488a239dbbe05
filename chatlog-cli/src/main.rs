//! Inspection and maintenance CLI over [`chatlog_store::Store`].
//!
//! Consolidates what the original prototype left as three separate ad hoc
//! entry points (`fchat_logs.py`'s inspector, `test_db_integrity.py`, and
//! `data_merge.py`) into one `clap`-derived binary.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

use chatlog_store::{MergeTarget, Store};

#[derive(Debug, Parser)]
#[command(name = "chatlog-cli", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the accounts known to a store.
    Accounts { root: PathBuf },

    /// List an account's conversations as `key\tdisplay name`.
    Conversations { root: PathBuf, account: String },

    /// Print a conversation's backlog, newest-first.
    Backlog {
        root: PathBuf,
        account: String,
        key: String,
        /// Only print the newest N records.
        #[arg(long)]
        count: Option<usize>,
        /// Only print records from this calendar date (YYYY-MM-DD).
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Print the distinct calendar dates present in a conversation's log.
    Dates { root: PathBuf, account: String, key: String },

    /// Rebuild indices and truncate torn tails for a store (or one account).
    Repair { root: PathBuf, account: Option<String> },

    /// Reconcile a conversation between two replica store roots.
    Merge {
        account: String,
        key: String,
        display_name: String,
        replica_a: PathBuf,
        replica_b: PathBuf,
        target: MergeTargetArg,
        /// Where to write pre-merge backups. Defaults to `<replica-a>/backups`.
        #[arg(long)]
        backup_root: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MergeTargetArg {
    A,
    B,
    Both,
}

impl From<MergeTargetArg> for MergeTarget {
    fn from(value: MergeTargetArg) -> Self {
        match value {
            MergeTargetArg::A => MergeTarget::A,
            MergeTargetArg::B => MergeTarget::B,
            MergeTargetArg::Both => MergeTarget::Both,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<(), String> {
    match command {
        Command::Accounts { root } => {
            let store = Store::open(root);
            for account in store.accounts().map_err(|e| e.to_string())? {
                println!("{account}");
            }
            Ok(())
        }
        Command::Conversations { root, account } => {
            let store = Store::open(root);
            for (key, display_name) in store.conversations(&account).map_err(|e| e.to_string())? {
                println!("{key}\t{display_name}");
            }
            Ok(())
        }
        Command::Backlog {
            root,
            account,
            key,
            count,
            date,
        } => {
            let store = Store::open(root);
            let records = match (count, date) {
                (Some(n), _) => store.backlog_count(&account, &key, n),
                (None, Some(d)) => store.backlog_on_date(&account, &key, d),
                (None, None) => store.backlog(&account, &key),
            };
            for record in records {
                println!(
                    "{}\t{:?}\t{}\t{}",
                    record.time, record.kind, record.sender_name, record.text
                );
            }
            Ok(())
        }
        Command::Dates { root, account, key } => {
            let store = Store::open(root);
            for date in store.distinct_dates(&account, &key) {
                println!("{date}");
            }
            Ok(())
        }
        Command::Repair { root, account } => {
            let mut store = Store::open(root);
            match account {
                Some(account) => {
                    let report = store.repair_account(&account).map_err(|e| e.to_string())?;
                    print_repair_report(&account, &report);
                }
                None => {
                    let reports = store.repair_all().map_err(|e| e.to_string())?;
                    for (account, report) in reports {
                        print_repair_report(&account, &report);
                    }
                }
            }
            Ok(())
        }
        Command::Merge {
            replica_a,
            replica_b,
            account,
            key,
            display_name,
            target,
            backup_root,
        } => {
            let backup_root = backup_root.unwrap_or_else(|| replica_a.join("backups"));
            let mut store = Store::open(&replica_a);
            store
                .merge(
                    &replica_b,
                    &backup_root,
                    &account,
                    &key,
                    &display_name,
                    target.into(),
                )
                .map_err(|e| e.to_string())?;
            println!("merged {account}/{key}");
            Ok(())
        }
    }
}

fn print_repair_report(account: &str, report: &chatlog_store::RepairReport) {
    for key in &report.orphan_indices_deleted {
        println!("{account}\t{key}\tdeleted orphan index");
    }
    for key in &report.orphan_logs_deleted {
        println!("{account}\t{key}\tdeleted orphan log");
    }
    for key in &report.logs_truncated {
        println!("{account}\t{key}\ttruncated torn tail");
    }
    for key in &report.indices_rebuilt {
        if !report.logs_truncated.contains(key) {
            println!("{account}\t{key}\trebuilt index");
        }
    }
}

