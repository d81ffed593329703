//! The enrichment loop.
//!
//! `IDLE -> SCANNING -> (PROCESSING_ROW)* -> WAITING -> SCANNING ...`
//!
//! Each scan re-reads the worklist, resolves the header once, and walks the
//! rows newest to oldest so deleting a migrated row never shifts a row that
//! is still to be visited. A row is re-read before its results are written
//! and before it is migrated; if it no longer holds the same person it is
//! left alone. Every remote and store call goes through the retry
//! controller. Row-level failures write sentinels and move on; store
//! failures abort the scan until the next poll; an unrecovered session ends
//! the run.
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::EnrichConfig;
use crate::credential::CredentialStore;
use crate::failure::{FailureKind, FetchError};
use crate::history::{now_epoch_ms, HistoryEntry, RowOutcome, RunHistory};
use crate::profile::ProfileExtractor;
use crate::resolver::Resolver;
use crate::retry::{RetryController, RetryError, Sleeper};
use crate::site::{ProfileUrls, SiteConfig};
use crate::transport::HttpClient;
use crate::worklist::{
    already_migrated, snapshot_row, ColumnMap, Enrichment, Record, StoreError, WorklistStore,
    NOT_FOUND,
};

/// Grid size requested when the completed sheet has to be created.
const COMPLETED_SHEET_ROWS: usize = 1000;
const COMPLETED_SHEET_MIN_COLS: usize = 26;

#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub worklist_sheet: String,
    pub completed_sheet: String,
    pub poll_interval: Duration,
    pub politeness_delay: Duration,
    /// Stop after a single scan.
    pub once: bool,
}

impl RunSettings {
    pub fn from_config(config: &EnrichConfig, once: bool) -> Self {
        Self {
            worklist_sheet: config.worklist_sheet.clone(),
            completed_sheet: config.completed_sheet.clone(),
            poll_interval: Duration::from_secs_f64(config.poll_interval_secs),
            politeness_delay: Duration::from_millis(config.politeness_delay_ms),
            once,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Scanning,
    ProcessingRow(usize),
    Waiting,
    Stopped,
}

/// Per-scan counters.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub rows: usize,
    /// Rows without a full name and city.
    pub skipped: usize,
    /// Rows already enriched earlier in this run.
    pub already_processed: usize,
    /// Rows edited externally while being enriched; left for the next scan.
    pub changed: usize,
    /// Enriched but not complete, so left in the worklist.
    pub enriched: usize,
    pub migrated: usize,
    pub not_found: usize,
    pub unreadable: usize,
}

impl ScanStats {
    fn absorb(&mut self, other: &ScanStats) {
        self.rows += other.rows;
        self.skipped += other.skipped;
        self.already_processed += other.already_processed;
        self.changed += other.changed;
        self.enriched += other.enriched;
        self.migrated += other.migrated;
        self.not_found += other.not_found;
        self.unreadable += other.unreadable;
    }

    fn count(&mut self, disposition: RowDisposition) {
        match disposition {
            RowDisposition::Skipped => self.skipped += 1,
            RowDisposition::AlreadyProcessed => self.already_processed += 1,
            RowDisposition::Changed => self.changed += 1,
            RowDisposition::Done(RowOutcome::Enriched) => self.enriched += 1,
            RowDisposition::Done(RowOutcome::Migrated) => self.migrated += 1,
            RowDisposition::Done(RowOutcome::NotFound) => self.not_found += 1,
            RowDisposition::Done(RowOutcome::Unreadable) => self.unreadable += 1,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub scans: usize,
    /// Scans cut short by a store failure.
    pub aborted_scans: usize,
    pub totals: ScanStats,
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("worklist store: {0}")]
    Store(RetryError<StoreError>),
    #[error("stopping: {0}")]
    Fatal(RetryError<FetchError>),
}

impl RunError {
    /// Errors that a later scan cannot fix.
    pub fn is_fatal(&self) -> bool {
        match self {
            RunError::Fatal(_) => true,
            RunError::Store(err) => matches!(
                err.last(),
                StoreError::MissingColumns(_) | StoreError::SheetNotFound(_)
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowDisposition {
    Skipped,
    AlreadyProcessed,
    Changed,
    Done(RowOutcome),
}

/// The remote side of one enrichment: credential, search, and profile.
pub struct Pipeline<'a> {
    pub credentials: &'a CredentialStore,
    pub resolver: Resolver<'a>,
    pub extractor: ProfileExtractor<'a>,
    pub urls: ProfileUrls,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        client: &'a dyn HttpClient,
        site: SiteConfig,
        credentials: &'a CredentialStore,
    ) -> Result<Self> {
        let urls = ProfileUrls::new(&site)?;
        Ok(Self {
            credentials,
            resolver: Resolver::new(client, site.clone(), urls.clone()),
            extractor: ProfileExtractor::new(client, site, urls.clone()),
            urls,
        })
    }
}

pub struct Orchestrator<'a> {
    settings: RunSettings,
    store: &'a mut dyn WorklistStore,
    pipeline: Pipeline<'a>,
    retry: RetryController<'a>,
    sleeper: &'a dyn Sleeper,
    history: Option<RunHistory>,
    stop: Arc<AtomicBool>,
    processed: HashSet<String>,
    state: State,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        settings: RunSettings,
        store: &'a mut dyn WorklistStore,
        pipeline: Pipeline<'a>,
        retry: RetryController<'a>,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            settings,
            store,
            pipeline,
            retry,
            sleeper,
            history: None,
            stop: Arc::new(AtomicBool::new(false)),
            processed: HashSet::new(),
            state: State::Idle,
        }
    }

    pub fn with_history(mut self, history: RunHistory) -> Self {
        self.history = Some(history);
        self
    }

    /// Share a stop flag with a signal handler.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> State {
        self.state
    }

    /// Canonical URLs enriched so far in this run.
    pub fn processed(&self) -> &HashSet<String> {
        &self.processed
    }

    fn enter(&mut self, state: State) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "state");
        }
        self.state = state;
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Scan until stopped (or once with `--once`).
    pub fn run(&mut self) -> Result<RunSummary, RunError> {
        let mut summary = RunSummary::default();
        while !self.stop_requested() {
            self.enter(State::Scanning);
            match self.scan() {
                Ok(stats) => {
                    info!(
                        rows = stats.rows,
                        migrated = stats.migrated,
                        enriched = stats.enriched,
                        not_found = stats.not_found,
                        unreadable = stats.unreadable,
                        "scan finished"
                    );
                    summary.scans += 1;
                    summary.totals.absorb(&stats);
                }
                Err(err) if !err.is_fatal() => {
                    summary.scans += 1;
                    summary.aborted_scans += 1;
                    warn!(
                        kind = %run_error_kind(&err),
                        "scan aborted, retrying after the poll interval: {err}"
                    );
                }
                Err(err) => {
                    error!("{err}");
                    self.enter(State::Stopped);
                    return Err(err);
                }
            }
            if self.settings.once || self.stop_requested() {
                break;
            }
            self.enter(State::Waiting);
            debug!(
                secs = self.settings.poll_interval.as_secs_f64(),
                "waiting before next scan"
            );
            self.sleeper.sleep(self.settings.poll_interval);
        }
        self.enter(State::Stopped);
        Ok(summary)
    }

    /// One pass over the worklist.
    pub fn scan(&mut self) -> Result<ScanStats, RunError> {
        let sheet = self.settings.worklist_sheet.clone();
        let rows = self.read_sheet(&sheet)?;
        let header = rows.first().cloned().unwrap_or_default();
        let columns = ColumnMap::resolve(&header)
            .map_err(|err| RunError::Store(RetryError::Definitive(err)))?;
        info!(sheet = %sheet, rows = rows.len().saturating_sub(1), "scan started");
        let mut stats = ScanStats::default();
        for idx in (1..rows.len()).rev() {
            if self.stop_requested() {
                info!("stop requested, ending scan early");
                break;
            }
            self.enter(State::ProcessingRow(idx));
            stats.rows += 1;
            let disposition = self.process_row(idx, &rows[idx], &columns)?;
            stats.count(disposition);
        }
        Ok(stats)
    }

    fn process_row(
        &mut self,
        idx: usize,
        cells: &[String],
        columns: &ColumnMap,
    ) -> Result<RowDisposition, RunError> {
        let record = Record::from_row(idx, cells, columns);
        if !record.has_identity() {
            debug!(row = idx, "missing name or city, skipped");
            return Ok(RowDisposition::Skipped);
        }
        if self.pipeline.urls.is_profile_url(&record.profile_url)
            && self.processed.contains(&record.profile_url)
        {
            return Ok(RowDisposition::AlreadyProcessed);
        }

        self.sleeper.sleep(self.settings.politeness_delay);
        let name = record.display_name();
        let (enrichment, mut outcome, failure) = match self.enrich(&record) {
            Ok(enrichment) => (enrichment, RowOutcome::Enriched, None),
            Err(err) if err.is_fatal() => {
                error!(row = idx, name = %name, kind = %err.kind(), "session not recovered");
                return Err(RunError::Fatal(err));
            }
            Err(err) => {
                let kind = err.kind();
                warn!(row = idx, name = %name, kind = %kind, "enrichment failed: {err}");
                if kind == FailureKind::NotFound {
                    (Enrichment::not_found(), RowOutcome::NotFound, Some(kind))
                } else {
                    (Enrichment::unreadable(), RowOutcome::Unreadable, Some(kind))
                }
            }
        };

        if !self.row_unchanged(&record, columns)? {
            warn!(row = idx, name = %name, "row changed externally, result dropped");
            return Ok(RowDisposition::Changed);
        }
        self.write_enrichment(idx, &enrichment, columns)?;
        if outcome == RowOutcome::Enriched {
            self.processed.insert(enrichment.profile_url.clone());
            info!(row = idx, name = %name, url = %enrichment.profile_url, "row enriched");
            if self.migrate_if_complete(&record, columns)? {
                outcome = RowOutcome::Migrated;
            }
        }
        self.record_history(&record, outcome, failure, &enrichment.profile_url);
        Ok(RowDisposition::Done(outcome))
    }

    fn enrich(&mut self, record: &Record) -> Result<Enrichment, RetryError<FetchError>> {
        let pipeline = &self.pipeline;
        let retry = &mut self.retry;
        let name = record.display_name();

        let candidate = retry.execute(&format!("resolve {name}"), || -> Result<_, FetchError> {
            let credential = pipeline.credentials.load()?;
            pipeline
                .resolver
                .resolve(&record.first_name, &record.last_name, &record.city, &credential)
        })?;
        let extraction = pipeline
            .extractor
            .extract(&candidate.record_id, pipeline.credentials, retry)?;

        let date = extraction
            .date
            .or(candidate.aux_date)
            .unwrap_or_else(|| NOT_FOUND.to_string());
        Ok(Enrichment::new(
            extraction.categories,
            date,
            extraction.profile_url,
        ))
    }

    fn read_sheet(&mut self, sheet: &str) -> Result<Vec<Vec<String>>, RunError> {
        let store = &*self.store;
        self.retry
            .execute(&format!("read {sheet}"), || store.read_all(sheet))
            .map_err(RunError::Store)
    }

    /// Re-read the worklist and check the row still holds the same person.
    fn row_unchanged(&mut self, record: &Record, columns: &ColumnMap) -> Result<bool, RunError> {
        let sheet = self.settings.worklist_sheet.clone();
        let rows = self.read_sheet(&sheet)?;
        Ok(rows
            .get(record.row)
            .map(|cells| Record::from_row(record.row, cells, columns))
            .is_some_and(|current| current.same_identity(record)))
    }

    fn write_enrichment(
        &mut self,
        row: usize,
        enrichment: &Enrichment,
        columns: &ColumnMap,
    ) -> Result<(), RunError> {
        let updates = enrichment.cell_updates(row, columns);
        let sheet = self.settings.worklist_sheet.as_str();
        let store = &mut *self.store;
        self.retry
            .execute(&format!("write row {row}"), || {
                store.write_cells(sheet, &updates)
            })
            .map_err(RunError::Store)
    }

    /// Re-read the row and move it to the completed sheet if it is now
    /// complete and still belongs to the same person.
    fn migrate_if_complete(&mut self, record: &Record, columns: &ColumnMap) -> Result<bool, RunError> {
        let worklist = self.settings.worklist_sheet.clone();
        let completed_sheet = self.settings.completed_sheet.clone();
        let rows = self.read_sheet(&worklist)?;
        let Some(cells) = rows.get(record.row) else {
            warn!(row = record.row, "row vanished before migration");
            return Ok(false);
        };
        let current = Record::from_row(record.row, cells, columns);
        if !current.same_identity(record) {
            warn!(
                row = record.row,
                name = %record.display_name(),
                "row changed externally, not migrating"
            );
            return Ok(false);
        }
        if !current.is_complete(&self.pipeline.urls) {
            debug!(row = record.row, "row incomplete, left in worklist");
            return Ok(false);
        }

        let header = rows.first().cloned().unwrap_or_default();
        let completed = self.prepare_completed_sheet(&completed_sheet, &header)?;
        if already_migrated(&completed, &current) {
            info!(
                row = record.row,
                url = %current.profile_url,
                "already in completed sheet, removing leftover row"
            );
        } else {
            let snapshot = snapshot_row(cells, columns.width);
            let store = &mut *self.store;
            self.retry
                .execute("append completed row", || {
                    store.append_row(&completed_sheet, &snapshot)
                })
                .map_err(RunError::Store)?;
        }
        let store = &mut *self.store;
        let row = record.row;
        self.retry
            .execute(&format!("delete row {row}"), || store.delete_row(&worklist, row))
            .map_err(RunError::Store)?;
        info!(row, name = %record.display_name(), "row migrated");
        Ok(true)
    }

    /// Create the completed sheet on demand and give it the worklist header.
    fn prepare_completed_sheet(
        &mut self,
        sheet: &str,
        header: &[String],
    ) -> Result<Vec<Vec<String>>, RunError> {
        let cols = header.len().max(COMPLETED_SHEET_MIN_COLS);
        let store = &mut *self.store;
        let created = self
            .retry
            .execute(&format!("ensure {sheet}"), || {
                store.ensure_sheet(sheet, COMPLETED_SHEET_ROWS, cols)
            })
            .map_err(RunError::Store)?;
        if created {
            info!(sheet, "created completed sheet");
        }
        let completed = self.read_sheet(sheet)?;
        if !completed.is_empty() {
            return Ok(completed);
        }
        let store = &mut *self.store;
        self.retry
            .execute(&format!("write {sheet} header"), || {
                store.append_row(sheet, header)
            })
            .map_err(RunError::Store)?;
        Ok(vec![header.to_vec()])
    }

    fn record_history(
        &self,
        record: &Record,
        outcome: RowOutcome,
        failure: Option<FailureKind>,
        profile_url: &str,
    ) {
        let Some(history) = &self.history else {
            return;
        };
        let mut entry = HistoryEntry {
            ts_epoch_ms: now_epoch_ms().unwrap_or_default(),
            sheet: self.settings.worklist_sheet.clone(),
            row: record.row,
            name: record.display_name(),
            city: record.city.clone(),
            outcome,
            failure: None,
            profile_url: self
                .pipeline
                .urls
                .is_profile_url(profile_url)
                .then(|| profile_url.to_string()),
        };
        if let Some(kind) = failure {
            entry = entry.failure_kind(kind);
        }
        if let Err(err) = history.append(&entry) {
            warn!(path = %history.path().display(), "history append failed: {err:#}");
        }
    }
}

fn run_error_kind(err: &RunError) -> FailureKind {
    match err {
        RunError::Store(err) => err.kind(),
        RunError::Fatal(err) => err.kind(),
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
