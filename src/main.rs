use anyhow::{Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod categories;
mod cli;
mod config;
mod credential;
mod failure;
mod history;
mod operator;
mod orchestrator;
mod profile;
mod resolver;
mod retry;
mod site;
mod status;
#[cfg(test)]
mod test_support;
mod transport;
mod workflow;
mod worklist;

use cli::{Command, RootArgs};

fn main() -> Result<()> {
    let args = RootArgs::parse();
    let verbose = matches!(&args.command, Command::Run(run) if run.verbose);
    init_tracing(verbose);

    match args.command {
        Command::Init(args) => workflow::run_init(args),
        Command::Run(args) => {
            let stop = Arc::new(AtomicBool::new(false));
            install_interrupt_handler(Arc::clone(&stop))?;
            workflow::run_enrich(args, stop)
        }
        Command::Status(args) => workflow::run_status(args),
    }
}

/// Logs go to stderr; `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// First Ctrl-C stops after the current row; a second one exits at once.
fn install_interrupt_handler(stop: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        if stop.swap(true, Ordering::SeqCst) {
            std::process::exit(0);
        }
        eprintln!("\nstopping after the current row (Ctrl-C again to quit now)");
    })
    .context("install Ctrl-C handler")
}
