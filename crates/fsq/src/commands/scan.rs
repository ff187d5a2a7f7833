//! Scan command implementation
//!
//! Runs `PROG ARGS... ITEM-ARGS...` once per claimed item, with the item's
//! payload on stdin and its metadata in `FSQ_ITEM_*` variables. The exit
//! status decides the item's fate:
//!
//! - the success code marks it done
//! - the fail-tmp code retries it (until its budget runs out)
//! - anything else fails it permanently
//!
//! A worker killed by a signal fails its item permanently and stops the scan.

use anyhow::Result;
use clap::Args;
use fsq_core::{
    Completion, ConfigOverrides, FsqError, HostSelection, ScanOptions, WorkItem, done, scan,
};
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus, Stdio};
use tracing::{debug, warn};

use super::error::CommandError;
use super::{GlobalArgs, lock_override};

/// Run a program once for each item in a queue
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Scan even if the queue is down
    #[arg(short, long)]
    ignore_down: bool,

    /// Lock items while they are processed
    #[arg(short, long, conflicts_with = "no_lock")]
    lock: bool,

    /// Do not lock items
    #[arg(short = 'L', long)]
    no_lock: bool,

    /// Fail items permanently once older than SECONDS
    #[arg(short, long, value_name = "SECONDS")]
    ttl: Option<u64>,

    /// Fail items permanently after this many tries
    #[arg(short, long)]
    max_tries: Option<u32>,

    /// Do not export FSQ_ITEM_* variables to the worker
    #[arg(short = 'E', long)]
    no_env: bool,

    /// Do not connect the item payload to the worker's stdin
    #[arg(short, long)]
    no_open: bool,

    /// Worker exit code meaning success
    #[arg(short = 'S', long, allow_negative_numbers = true)]
    success_code: Option<i32>,

    /// Worker exit code meaning "retry later"
    #[arg(short = 'T', long, allow_negative_numbers = true)]
    fail_tmp_code: Option<i32>,

    /// Worker exit code meaning permanent failure
    #[arg(short = 'F', long, allow_negative_numbers = true)]
    fail_perm_code: Option<i32>,

    /// Scan this host sub-queue of QUEUE (repeatable)
    #[arg(long = "host", value_name = "HOST")]
    hosts: Vec<String>,

    /// Scan every host sub-queue of QUEUE
    #[arg(short, long, conflicts_with = "hosts")]
    all_hosts: bool,

    /// Queue to scan
    queue: String,

    /// Worker program, looked up on PATH
    prog: String,

    /// Leading worker arguments; item arguments follow them
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl ScanArgs {
    fn selection(&self) -> HostSelection {
        if self.all_hosts {
            HostSelection::All
        } else if self.hosts.is_empty() {
            HostSelection::Queue
        } else {
            HostSelection::Only(self.hosts.clone())
        }
    }
}

/// Execute the scan command
pub fn execute(args: ScanArgs, global: &GlobalArgs) -> Result<()> {
    let config = global.resolve(ConfigOverrides {
        lock: lock_override(args.lock, args.no_lock),
        ttl: args.ttl,
        max_tries: args.max_tries,
        success_code: args.success_code,
        fail_tmp_code: args.fail_tmp_code,
        fail_perm_code: args.fail_perm_code,
        ..Default::default()
    })?;
    let options = ScanOptions {
        ignore_down: args.ignore_down,
        hosts: args.selection(),
        ..ScanOptions::from_config(&config)
    };

    for next in scan(&config, &args.queue, &options)? {
        let mut item = match next {
            Ok(item) => item,
            Err(e @ FsqError::Down { .. }) => return Err(e.into()),
            Err(e) => {
                warn!("{e}");
                continue;
            }
        };

        debug!("working on {} ...", item.id());
        let status = run_worker(&args, &mut item)?;
        complete(item, status)?;
    }
    Ok(())
}

/// Spawn the worker for one item and wait for it
fn run_worker(args: &ScanArgs, item: &mut WorkItem) -> Result<ExitStatus> {
    let mut command = Command::new(&args.prog);
    command.args(&args.args).args(item.arguments());

    if !args.no_env {
        let meta = item.meta();
        command
            .env("FSQ_ITEM_ID", item.id())
            .env("FSQ_ITEM_PID", meta.pid.to_string())
            .env("FSQ_ITEM_ENTROPY", meta.entropy.to_string())
            .env("FSQ_ITEM_HOSTNAME", &meta.hostname)
            .env("FSQ_ITEM_HOST", item.host().unwrap_or_default())
            .env("FSQ_ITEM_TRIES", meta.tries.to_string())
            .env("FSQ_ITEM_ENQUEUED_AT", &meta.enqueued_raw);
    }

    if args.no_open {
        command.stdin(Stdio::null());
    } else {
        command.stdin(Stdio::from(item.payload().try_clone()?));
    }

    let status = command.status().map_err(|source| CommandError::Spawn {
        prog: args.prog.clone(),
        source,
    })?;
    Ok(status)
}

/// Feed a worker's exit status into the item's completion
fn complete(item: WorkItem, status: ExitStatus) -> Result<()> {
    let id = item.id().to_string();

    let Some(code) = status.code() else {
        let signal = status.signal().unwrap_or_default();
        done::fail_perm(item)?;
        return Err(CommandError::Signaled { id, signal }.into());
    };

    match done::done(item, code) {
        Ok(Completion::Done(_)) => debug!("{id}: succeeded"),
        Ok(Completion::Retried(_)) => warn!("{id}: failed temporarily"),
        Ok(Completion::Failed(_)) => warn!("{id}: failed permanently"),
        // could not place the item anywhere; stop before making it worse
        Err(e @ (FsqError::Enqueue { .. } | FsqError::EnqueueMaxTries { .. })) => {
            return Err(e.into());
        }
        Err(e) => warn!("{id}: {e}"),
    }
    Ok(())
}
