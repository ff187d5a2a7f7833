//! Queue control commands: down, up, trigger, untrigger, pull

use anyhow::Result;
use clap::Args;
use fsq_core::{ConfigOverrides, QueueRef, control};

use super::GlobalArgs;

/// A queue, or one of its host sub-queues
#[derive(Args, Debug)]
pub struct QueueArgs {
    /// Host sub-queue of QUEUE to act on
    #[arg(long)]
    host: Option<String>,

    queue: String,
}

impl QueueArgs {
    fn queue_ref(&self) -> QueueRef {
        QueueRef::with_host(self.queue.as_str(), self.host.clone())
    }
}

#[derive(Args, Debug)]
pub struct TriggerArgs {
    #[command(flatten)]
    target: QueueArgs,

    /// Act on the trigger that wakes host distributors of QUEUE
    #[arg(long, conflicts_with = "host")]
    distributor: bool,
}

#[derive(Args, Debug)]
pub struct PullArgs {
    #[command(flatten)]
    trigger: TriggerArgs,

    /// Succeed even when nobody is listening
    #[arg(short, long)]
    ignore_listener: bool,
}

pub fn down(args: QueueArgs, global: &GlobalArgs) -> Result<()> {
    let config = global.resolve(ConfigOverrides::default())?;
    control::down(&config, &args.queue_ref())?;
    Ok(())
}

pub fn up(args: QueueArgs, global: &GlobalArgs) -> Result<()> {
    let config = global.resolve(ConfigOverrides::default())?;
    control::up(&config, &args.queue_ref())?;
    Ok(())
}

pub fn trigger(args: TriggerArgs, global: &GlobalArgs) -> Result<()> {
    let config = global.resolve(ConfigOverrides::default())?;
    if args.distributor {
        control::host_trigger(&config, &args.target.queue)?;
    } else {
        control::trigger(&config, &args.target.queue_ref())?;
    }
    Ok(())
}

pub fn untrigger(args: TriggerArgs, global: &GlobalArgs) -> Result<()> {
    let config = global.resolve(ConfigOverrides::default())?;
    if args.distributor {
        control::host_untrigger(&config, &args.target.queue)?;
    } else {
        control::untrigger(&config, &args.target.queue_ref())?;
    }
    Ok(())
}

pub fn pull(args: PullArgs, global: &GlobalArgs) -> Result<()> {
    let config = global.resolve(ConfigOverrides::default())?;
    let target = &args.trigger.target;
    if args.trigger.distributor {
        control::host_trigger_pull(&config, &target.queue, args.ignore_listener)?;
    } else {
        control::trigger_pull(&config, &target.queue_ref(), args.ignore_listener)?;
    }
    Ok(())
}
