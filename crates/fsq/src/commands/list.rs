//! Listing commands: list, queues, hosts

use anyhow::Result;
use clap::Args;
use fsq_core::hosts::{self as listing, ItemListing};
use fsq_core::{ConfigOverrides, QueueRef};
use serde::Serialize;

use super::GlobalArgs;

/// List the items waiting in a queue
#[derive(Args, Debug)]
pub struct ListArgs {
    /// List this host sub-queue of QUEUE
    #[arg(long)]
    host: Option<String>,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    queue: String,
}

#[derive(Args, Debug)]
pub struct HostsArgs {
    queue: String,
}

/// One row of `fsq list --json`
#[derive(Debug, Serialize)]
struct ListedItem {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    enqueued_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entropy: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tries: Option<u32>,
    arguments: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<ItemListing> for ListedItem {
    fn from(listing: ItemListing) -> Self {
        match listing.meta {
            Ok(meta) => Self {
                id: listing.id,
                enqueued_at: Some(meta.enqueued_at.to_string()),
                entropy: Some(meta.entropy),
                pid: Some(meta.pid),
                hostname: Some(meta.hostname),
                tries: Some(meta.tries),
                arguments: meta.arguments,
                error: None,
            },
            Err(e) => Self {
                id: listing.id,
                enqueued_at: None,
                entropy: None,
                pid: None,
                hostname: None,
                tries: None,
                arguments: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }
}

pub fn list(args: ListArgs, global: &GlobalArgs) -> Result<()> {
    let config = global.resolve(ConfigOverrides::default())?;
    let queue = QueueRef::with_host(args.queue.as_str(), args.host.clone());
    let items: Vec<ListedItem> = listing::list_items(&config, &queue)?
        .into_iter()
        .map(ListedItem::from)
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    for item in items {
        match (&item.error, &item.enqueued_at) {
            (Some(error), _) => println!("{}  (malformed: {error})", item.id),
            (None, Some(enqueued_at)) => println!(
                "{}  enqueued={enqueued_at} tries={} args=[{}]",
                item.id,
                item.tries.unwrap_or_default(),
                item.arguments.join(" ")
            ),
            (None, None) => println!("{}", item.id),
        }
    }
    Ok(())
}

pub fn queues(global: &GlobalArgs) -> Result<()> {
    let config = global.resolve(ConfigOverrides::default())?;
    for queue in listing::queues(&config)? {
        println!("{queue}");
    }
    Ok(())
}

pub fn hosts(args: HostsArgs, global: &GlobalArgs) -> Result<()> {
    let config = global.resolve(ConfigOverrides::default())?;
    for host in listing::hosts(&config, &args.queue)? {
        println!("{host}");
    }
    Ok(())
}
