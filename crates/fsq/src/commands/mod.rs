//! CLI command dispatch and execution

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use fsq_core::config::{Config, ConfigOverrides, ExitCodes, resolve_config};
use std::path::PathBuf;

use crate::util::settings::get_home_dir;

mod control;
pub mod error;
mod enqueue;
mod host_dist;
mod install;
mod list;
mod scan;

/// fsq - broker-less work queues on the filesystem
#[derive(Parser, Debug)]
#[command(
    name = "fsq",
    version,
    about = "Broker-less work queues on the filesystem",
    long_about = "Install queues, enqueue items and run programs over queued items, using only POSIX filesystem primitives for coordination"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Flags accepted by every subcommand
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Queue root directory (overrides FSQ_ROOT)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Configuration file (overrides FSQ_CONFIG)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    /// Resolve the configuration, layering `overrides` on top of the global flags
    pub fn resolve(&self, overrides: ConfigOverrides) -> Result<Config> {
        let home_dir = get_home_dir()?;
        let overrides = ConfigOverrides {
            root: self.root.clone(),
            config_path: self.config.clone(),
            ..overrides
        };
        Ok(resolve_config(&overrides, &home_dir)?)
    }

    /// Exit codes to report failures with; defaults if configuration is unusable
    pub fn exit_codes(&self) -> ExitCodes {
        self.resolve(ConfigOverrides::default())
            .map(|config| config.codes)
            .unwrap_or_default()
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install queues (or host sub-queues)
    Install(install::InstallArgs),

    /// Remove queues (or host sub-queues) and everything in them
    Uninstall(install::UninstallArgs),

    /// Enqueue an item read from stdin or a file
    Enqueue(enqueue::EnqueueArgs),

    /// Run a program once for each item in a queue
    Scan(scan::ScanArgs),

    /// Stop consumers from taking items from a queue
    Down(control::QueueArgs),

    /// Let consumers take items from a queue again
    Up(control::QueueArgs),

    /// Install a trigger FIFO
    Trigger(control::TriggerArgs),

    /// Remove a trigger FIFO
    Untrigger(control::TriggerArgs),

    /// Wake whoever is listening on a trigger
    Pull(control::PullArgs),

    /// List the items waiting in a queue
    List(list::ListArgs),

    /// List installed queues
    Queues,

    /// List the host sub-queues of a queue
    Hosts(list::HostsArgs),

    /// Copy every item of a queue into its host sub-queues
    HostDist(host_dist::HostDistArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        let global = &self.global;
        match self.command {
            Commands::Install(args) => install::install(args, global),
            Commands::Uninstall(args) => install::uninstall(args, global),
            Commands::Enqueue(args) => enqueue::execute(args, global),
            Commands::Scan(args) => scan::execute(args, global),
            Commands::Down(args) => control::down(args, global),
            Commands::Up(args) => control::up(args, global),
            Commands::Trigger(args) => control::trigger(args, global),
            Commands::Untrigger(args) => control::untrigger(args, global),
            Commands::Pull(args) => control::pull(args, global),
            Commands::List(args) => list::list(args, global),
            Commands::Queues => list::queues(global),
            Commands::Hosts(args) => list::hosts(args, global),
            Commands::HostDist(args) => host_dist::execute(args, global),
        }
    }
}

/// `Some(true)` for `--lock`, `Some(false)` for `--no-lock`, else `None`
fn lock_override(lock: bool, no_lock: bool) -> Option<bool> {
    match (lock, no_lock) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}
