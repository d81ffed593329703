//! Command implementations behind the CLI.
//!
//! Each `run_*` function resolves config (file, then flags, then prompts),
//! wires concrete collaborators, and reports to stdout. Logging goes to
//! stderr through `tracing`.
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::{InitArgs, RunArgs, StatusArgs};
use crate::config::{
    default_config, load_or_default, user_config_path, validate_config, validate_interval,
    write_config, EnrichConfig,
};
use crate::credential::CredentialStore;
use crate::history::RunHistory;
use crate::operator::TerminalOperator;
use crate::orchestrator::{Orchestrator, Pipeline, RunSettings};
use crate::retry::{RetryController, ThreadSleeper};
use crate::site::ProfileUrls;
use crate::status::{build_status, print_status};
use crate::transport::UreqClient;
use crate::worklist::{required_header, JsonWorkbook, WorklistStore};

/// Grid size requested for freshly created sheets.
const NEW_SHEET_ROWS: usize = 1000;
const NEW_SHEET_COLS: usize = 26;

/// Write a default config and create the workbook with both sheets.
pub fn run_init(args: InitArgs) -> Result<()> {
    let config_path = match args.config {
        Some(path) => path,
        None => user_config_path()
            .ok_or_else(|| anyhow!("no per-user config directory; pass --config"))?,
    };

    let mut config = default_config();
    if let Some(sheet) = args.sheet {
        config.worklist_sheet = sheet;
    }
    validate_config(&config)?;

    let (mut workbook, created) =
        JsonWorkbook::create(&args.workbook).context("create workbook")?;
    for sheet in [&config.worklist_sheet, &config.completed_sheet] {
        ensure_sheet_with_header(&mut workbook, sheet)?;
    }
    let workbook_path = fs::canonicalize(&args.workbook)
        .with_context(|| format!("resolve {}", args.workbook.display()))?;
    println!(
        "workbook: {} ({})",
        workbook_path.display(),
        if created { "created" } else { "existing" }
    );

    if config_path.is_file() && !args.force {
        println!(
            "config: {} (exists; use --force to overwrite)",
            config_path.display()
        );
        return Ok(());
    }
    config.workbook = Some(workbook_path);
    write_config(&config_path, &config)?;
    println!("config: {}", config_path.display());
    let credential_path = config_path
        .parent()
        .map(|dir| dir.join(&config.credential_path))
        .unwrap_or_else(|| config.credential_path.clone());
    println!(
        "next: put the session cookie value in {} and run `lead-enrich run`",
        credential_path.display()
    );
    Ok(())
}

fn ensure_sheet_with_header(workbook: &mut JsonWorkbook, sheet: &str) -> Result<()> {
    workbook
        .ensure_sheet(sheet, NEW_SHEET_ROWS, NEW_SHEET_COLS)
        .with_context(|| format!("create sheet {sheet:?}"))?;
    let rows = workbook
        .read_all(sheet)
        .with_context(|| format!("read sheet {sheet:?}"))?;
    if rows.is_empty() {
        workbook
            .append_row(sheet, &required_header())
            .with_context(|| format!("write header of {sheet:?}"))?;
    }
    Ok(())
}

/// Enrich rows until interrupted (or once with `--once`).
pub fn run_enrich(args: RunArgs, stop: Arc<AtomicBool>) -> Result<()> {
    let (mut config, config_path) = load_or_default(args.config.as_deref())?;
    let interactive = io::stdin().is_terminal();
    let mut operator = TerminalOperator::new(io::stdin().lock(), io::stdout());

    apply_run_flags(&mut config, &args)?;
    if config.workbook.is_none() {
        if !interactive {
            return Err(anyhow!("--workbook is required"));
        }
        let answer = operator
            .ask_required("Workbook file: ", "A workbook file is required: ")
            .ok_or_else(|| anyhow!("no workbook given"))?;
        config.workbook = Some(PathBuf::from(answer));
    }
    if interactive && config_path.is_none() {
        if args.sheet.is_none() {
            config.worklist_sheet = operator.ask_with_default(
                &format!("Worklist sheet [{}]: ", config.worklist_sheet),
                &config.worklist_sheet,
            );
        }
        if args.interval.is_none() {
            config.poll_interval_secs = operator.ask_interval(
                &format!("Poll interval in seconds [{}]: ", config.poll_interval_secs),
                config.poll_interval_secs,
            );
        }
    }
    validate_config(&config)?;

    let workbook_path = config
        .workbook
        .clone()
        .ok_or_else(|| anyhow!("--workbook is required"))?;
    if !workbook_path.is_file() {
        return Err(anyhow!(
            "workbook {} not found; create it with `lead-enrich init`",
            workbook_path.display()
        ));
    }

    let credentials = CredentialStore::new(config.credential_path.clone());
    credentials
        .load()
        .with_context(|| format!("load session credential {}", credentials.path().display()))?;

    let client = UreqClient::new(Duration::from_secs(config.site.request_timeout_secs));
    let pipeline = Pipeline::new(&client, config.site.clone(), &credentials)?;
    let mut store = JsonWorkbook::open(&workbook_path);
    let sleeper = ThreadSleeper;
    let retry = RetryController::new(config.retry.clone(), &sleeper, &mut operator);
    let settings = RunSettings::from_config(&config, args.once);
    let mut orchestrator = Orchestrator::new(settings, &mut store, pipeline, retry, &sleeper)
        .with_stop_flag(stop);
    if let Some(path) = config.history_path.clone() {
        orchestrator = orchestrator.with_history(RunHistory::new(path));
    }

    info!(
        workbook = %workbook_path.display(),
        sheet = %config.worklist_sheet,
        interval_secs = config.poll_interval_secs,
        once = args.once,
        "enrichment started"
    );
    let summary = orchestrator.run()?;
    info!(
        profiles = orchestrator.processed().len(),
        "enrichment finished"
    );
    let totals = &summary.totals;
    println!(
        "scans: {} (aborted {}), migrated: {}, enriched: {}, not found: {}, unreadable: {}",
        summary.scans,
        summary.aborted_scans,
        totals.migrated,
        totals.enriched,
        totals.not_found,
        totals.unreadable
    );
    if args.once && summary.aborted_scans > 0 {
        return Err(anyhow!("the scan was aborted by a worklist store failure"));
    }
    Ok(())
}

fn apply_run_flags(config: &mut EnrichConfig, args: &RunArgs) -> Result<()> {
    if let Some(workbook) = &args.workbook {
        config.workbook = Some(workbook.clone());
    }
    if let Some(sheet) = &args.sheet {
        config.worklist_sheet = sheet.clone();
    }
    if let Some(interval) = args.interval {
        validate_interval(interval)?;
        config.poll_interval_secs = interval;
    }
    if let Some(credential) = &args.credential {
        config.credential_path = credential.clone();
    }
    if let Some(history) = &args.history {
        config.history_path = Some(history.clone());
    }
    Ok(())
}

/// Summarize worklist progress without changing anything.
pub fn run_status(args: StatusArgs) -> Result<()> {
    let (mut config, config_path) = load_or_default(args.config.as_deref())?;
    if let Some(sheet) = args.sheet {
        config.worklist_sheet = sheet;
    }
    let workbook_path = args
        .workbook
        .or_else(|| config.workbook.clone())
        .ok_or_else(|| anyhow!("--workbook is required"))?;
    if config_path.is_none() {
        warn!("no config file found, using defaults");
    }
    let store = JsonWorkbook::open(&workbook_path);
    let urls = ProfileUrls::new(&config.site)?;
    let report = build_status(
        &store,
        &config.worklist_sheet,
        &config.completed_sheet,
        &urls,
    )
    .with_context(|| format!("inspect {}", display(&workbook_path)))?;
    if args.json {
        let text = serde_json::to_string_pretty(&report).context("serialize status report")?;
        println!("{text}");
    } else {
        println!("workbook: {}", display(&workbook_path));
        print_status(&report);
    }
    Ok(())
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args() -> RunArgs {
        RunArgs {
            workbook: None,
            sheet: None,
            interval: None,
            config: None,
            credential: None,
            history: None,
            once: false,
            verbose: false,
        }
    }

    #[test]
    fn run_flags_override_config_values() {
        let mut config = default_config();
        let args = RunArgs {
            workbook: Some(PathBuf::from("book.json")),
            sheet: Some("Leads".to_string()),
            interval: Some(9.0),
            credential: Some(PathBuf::from("/secrets/session.txt")),
            history: Some(PathBuf::from("h.jsonl")),
            ..run_args()
        };
        apply_run_flags(&mut config, &args).expect("apply");
        assert_eq!(config.workbook, Some(PathBuf::from("book.json")));
        assert_eq!(config.worklist_sheet, "Leads");
        assert_eq!(config.poll_interval_secs, 9.0);
        assert_eq!(config.credential_path, PathBuf::from("/secrets/session.txt"));
        assert_eq!(config.history_path, Some(PathBuf::from("h.jsonl")));
    }

    #[test]
    fn absent_flags_keep_config_values() {
        let mut config = default_config();
        apply_run_flags(&mut config, &run_args()).expect("apply");
        assert_eq!(config, default_config());
    }

    #[test]
    fn non_positive_interval_flag_is_rejected() {
        let mut config = default_config();
        let args = RunArgs {
            interval: Some(0.0),
            ..run_args()
        };
        assert!(apply_run_flags(&mut config, &args).is_err());
    }

    #[test]
    fn init_creates_both_sheets_with_headers() {
        let dir = tempfile::tempdir().expect("temp dir");
        let workbook = dir.path().join("book.json");
        let config_path = dir.path().join("conf").join("config.json");
        run_init(InitArgs {
            workbook: workbook.clone(),
            sheet: Some("Leads".to_string()),
            config: Some(config_path.clone()),
            force: false,
        })
        .expect("init");

        let book = JsonWorkbook::open(&workbook);
        assert_eq!(book.read_all("Leads").expect("leads"), vec![required_header()]);
        assert_eq!(
            book.read_all("Completed").expect("completed"),
            vec![required_header()]
        );
        let config = crate::config::load_config(&config_path).expect("config");
        assert_eq!(config.worklist_sheet, "Leads");
        assert_eq!(
            config.workbook,
            Some(fs::canonicalize(&workbook).expect("canonical"))
        );
    }

    #[test]
    fn init_keeps_existing_rows_and_config() {
        let dir = tempfile::tempdir().expect("temp dir");
        let workbook = dir.path().join("book.json");
        let config_path = dir.path().join("config.json");
        let init = |sheet: &str| InitArgs {
            workbook: workbook.clone(),
            sheet: Some(sheet.to_string()),
            config: Some(config_path.clone()),
            force: false,
        };
        run_init(init("Leads")).expect("first init");
        let mut book = JsonWorkbook::open(&workbook);
        book.append_row("Leads", &["Jean".to_string()]).expect("append");

        run_init(init("Other")).expect("second init");
        assert_eq!(book.read_all("Leads").expect("leads").len(), 2);
        let config = crate::config::load_config(&config_path).expect("config");
        assert_eq!(config.worklist_sheet, "Leads");
    }
}
