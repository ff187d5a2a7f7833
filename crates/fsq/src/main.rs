//! fsq - broker-less work queues on the filesystem
//!
//! A thin CLI over `fsq_core`: install queues, enqueue items, and scan
//! queues by running a program once per item.

use clap::Parser;
use fsq_core::config::ExitCodes;

mod commands;
mod util;

use commands::Cli;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            std::process::exit(ExitCodes::default().fail_perm);
        }
        Err(e) => e.exit(),
    };

    if cli.global.verbose {
        fsq_core::logging::init_with_level(tracing::Level::DEBUG);
    } else {
        fsq_core::logging::init();
    }

    let global = cli.global.clone();
    if let Err(e) = cli.execute() {
        eprintln!("Error: {e:#}");
        std::process::exit(commands::error::exit_code(&e, global.exit_codes()));
    }
}
