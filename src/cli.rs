//! CLI argument parsing.
//!
//! Flags override config values; anything still missing for `run` is asked
//! for interactively when stdin is a terminal.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "lead-enrich",
    version,
    about = "Enrich a worklist of lawyers with public profile data",
    after_help = "Commands:\n  init --workbook <file>     Write a config and an empty workbook\n  run --workbook <file>      Enrich rows until stopped (Ctrl-C)\n  status --workbook <file>   Summarize worklist progress\n\nExamples:\n  lead-enrich init --workbook leads.json\n  lead-enrich run --workbook leads.json --interval 10\n  lead-enrich run --workbook leads.json --once\n  lead-enrich status --workbook leads.json --json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Init(InitArgs),
    Run(RunArgs),
    Status(StatusArgs),
}

/// Init command inputs.
#[derive(Parser, Debug)]
#[command(about = "Write a default config and create the workbook sheets")]
pub struct InitArgs {
    /// Workbook file to create (JSON)
    #[arg(long, value_name = "FILE")]
    pub workbook: PathBuf,

    /// Worklist sheet name
    #[arg(long, value_name = "NAME")]
    pub sheet: Option<String>,

    /// Config file to write (defaults to the per-user config location)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

/// Run command inputs.
#[derive(Parser, Debug)]
#[command(about = "Enrich worklist rows until interrupted")]
pub struct RunArgs {
    /// Workbook file holding the worklist and completed sheets
    #[arg(long, value_name = "FILE")]
    pub workbook: Option<PathBuf>,

    /// Worklist sheet name
    #[arg(long, value_name = "NAME")]
    pub sheet: Option<String>,

    /// Seconds to wait between scans
    #[arg(long, value_name = "SECS")]
    pub interval: Option<f64>,

    /// Config file (defaults to the per-user config when present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// File holding the session cookie value
    #[arg(long, value_name = "FILE")]
    pub credential: Option<PathBuf>,

    /// Append per-row outcomes to this JSONL file
    #[arg(long, value_name = "FILE")]
    pub history: Option<PathBuf>,

    /// Run a single scan and exit
    #[arg(long)]
    pub once: bool,

    /// Log at debug level
    #[arg(long)]
    pub verbose: bool,
}

/// Status command inputs.
#[derive(Parser, Debug)]
#[command(about = "Summarize worklist enrichment progress")]
pub struct StatusArgs {
    /// Workbook file holding the worklist and completed sheets
    #[arg(long, value_name = "FILE")]
    pub workbook: Option<PathBuf>,

    /// Worklist sheet name
    #[arg(long, value_name = "NAME")]
    pub sheet: Option<String>,

    /// Config file (defaults to the per-user config when present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}
