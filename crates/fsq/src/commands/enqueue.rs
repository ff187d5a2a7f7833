//! Enqueue command implementation

use anyhow::{Context, Result};
use clap::Args;
use fsq_core::{ConfigOverrides, EnqueueOptions, ItemWriter, Owner, QueueRef, control};
use std::fs::File;
use std::path::PathBuf;

use super::GlobalArgs;
use crate::util::settings::parse_mode;

/// Enqueue an item read from stdin or a file
#[derive(Args, Debug)]
pub struct EnqueueArgs {
    /// Read the payload from FILE instead of stdin
    #[arg(short, long, value_name = "FILE", conflicts_with = "empty")]
    file: Option<PathBuf>,

    /// Enqueue an empty payload
    #[arg(short, long)]
    empty: bool,

    /// Pull the queue's trigger afterwards
    #[arg(short, long)]
    trigger: bool,

    /// Owner of the item file (name or uid)
    #[arg(short, long)]
    user: Option<String>,

    /// Group of the item file (name or gid)
    #[arg(short, long)]
    group: Option<String>,

    /// Mode of the item file, in octal
    #[arg(short, long, value_parser = parse_mode)]
    mode: Option<u32>,

    /// Enqueue into this host sub-queue of QUEUE
    #[arg(long)]
    host: Option<String>,

    /// Target queue
    queue: String,

    /// Arguments recorded in the item identifier
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

/// Execute the enqueue command; prints the new item id
pub fn execute(args: EnqueueArgs, global: &GlobalArgs) -> Result<()> {
    let config = global.resolve(ConfigOverrides::default())?;
    let mut writer = ItemWriter::new(&config)?;
    let queue = QueueRef::with_host(args.queue.as_str(), args.host.clone());

    let mut options = EnqueueOptions {
        mode: args.mode,
        ..Default::default()
    };
    if args.user.is_some() || args.group.is_some() {
        options.owner = Some(Owner::resolve(args.user.as_deref(), args.group.as_deref())?);
    }

    let id = if args.empty {
        writer.enqueue_with(&queue, std::io::empty(), &args.args, &options)?
    } else if let Some(path) = &args.file {
        let payload =
            File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
        writer.enqueue_with(&queue, payload, &args.args, &options)?
    } else {
        writer.enqueue_with(&queue, std::io::stdin().lock(), &args.args, &options)?
    };

    if args.trigger {
        control::trigger_pull(&config, &queue, true)?;
    }

    println!("{id}");
    Ok(())
}
