//! Host distribution: fan every item of a queue out to its host sub-queues

use anyhow::Result;
use clap::Args;
use fsq_core::{ConfigOverrides, FsqError, ItemWriter, ScanOptions, control, hosts, scan};
use tracing::{debug, warn};

use super::{GlobalArgs, lock_override};

/// Copy every item of a queue into its host sub-queues
///
/// An item that cannot be copied to every host is retried later, and
/// fails for good once its tries or TTL run out.
#[derive(Args, Debug)]
pub struct HostDistArgs {
    /// Hard-link payloads instead of copying them
    #[arg(short = 'I', long)]
    link: bool,

    /// Pull the host distribution trigger afterwards
    #[arg(short = 'g', long)]
    trigger: bool,

    /// Distribute even if the queue is down
    #[arg(short, long)]
    ignore_down: bool,

    /// Lock items while they are distributed
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

    /// Queue to distribute from
    queue: String,

    /// Destination hosts; every installed host when omitted
    hosts: Vec<String>,
}

/// Execute the host-dist command
pub fn execute(args: HostDistArgs, global: &GlobalArgs) -> Result<()> {
    let config = global.resolve(ConfigOverrides {
        lock: lock_override(args.lock, args.no_lock),
        ttl: args.ttl,
        max_tries: args.max_tries,
        ..Default::default()
    })?;
    let writer = ItemWriter::new(&config)?;
    let options = ScanOptions {
        ignore_down: args.ignore_down,
        ..ScanOptions::from_config(&config)
    };

    for next in scan(&config, &args.queue, &options)? {
        let item = match next {
            Ok(item) => item,
            Err(e @ FsqError::Down { .. }) => return Err(e.into()),
            Err(e) => {
                warn!("{e}");
                continue;
            }
        };
        let id = item.id().to_string();
        match hosts::reenqueue(&config, &writer, item, &args.hosts, args.link) {
            Ok(placed) => {
                for (host, new_id) in placed {
                    debug!("{id} -> {}@{host} as {new_id}", args.queue);
                }
            }
            // no such host; every other item would fail the same way
            Err(e @ FsqError::Hosts { .. }) => return Err(e.into()),
            // already sent back through fail_tmp
            Err(e) => warn!("{id}: {e}"),
        }
    }

    if args.trigger {
        control::host_trigger_pull(&config, &args.queue, true)?;
    }
    Ok(())
}
