//! Install and uninstall commands

use anyhow::{Context, Result};
use clap::Args;
use fsq_core::ConfigOverrides;
use fsq_core::InstallOptions;
use fsq_core::install as installer;
use tracing::debug;

use super::GlobalArgs;

/// Install queues (or host sub-queues)
#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Install already down
    #[arg(short, long)]
    down: bool,

    /// Install with a trigger FIFO
    #[arg(short, long)]
    trigger: bool,

    /// Install this host sub-queue of each QUEUE instead of QUEUE itself
    #[arg(long = "host", value_name = "HOST")]
    hosts: Vec<String>,

    /// Queues to install
    #[arg(required = true)]
    queues: Vec<String>,
}

/// Remove queues (or host sub-queues)
#[derive(Args, Debug)]
pub struct UninstallArgs {
    /// Remove this host sub-queue of each QUEUE instead of QUEUE itself
    #[arg(long = "host", value_name = "HOST")]
    hosts: Vec<String>,

    /// Queues to remove
    #[arg(required = true)]
    queues: Vec<String>,
}

pub fn install(args: InstallArgs, global: &GlobalArgs) -> Result<()> {
    let config = global.resolve(ConfigOverrides::default())?;
    let options = InstallOptions {
        down: args.down,
        trigger: args.trigger,
    };

    for queue in &args.queues {
        if args.hosts.is_empty() {
            let path = installer::install(&config, queue, options)
                .with_context(|| format!("installing {queue}"))?;
            debug!("installed {queue} at {}", path.display());
            continue;
        }
        for host in &args.hosts {
            installer::install_host(&config, queue, host, options)
                .with_context(|| format!("installing {queue}@{host}"))?;
        }
    }
    Ok(())
}

pub fn uninstall(args: UninstallArgs, global: &GlobalArgs) -> Result<()> {
    let config = global.resolve(ConfigOverrides::default())?;

    for queue in &args.queues {
        if args.hosts.is_empty() {
            installer::uninstall(&config, queue).with_context(|| format!("uninstalling {queue}"))?;
            continue;
        }
        for host in &args.hosts {
            installer::uninstall_host(&config, queue, host)
                .with_context(|| format!("uninstalling {queue}@{host}"))?;
        }
    }
    Ok(())
}
