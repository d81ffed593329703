//! Test doubles shared by unit tests.
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use crate::failure::TransportError;
use crate::operator::Operator;
use crate::retry::Sleeper;
use crate::transport::{HttpClient, HttpRequest, HttpResponse};
use crate::worklist::{CellUpdate, StoreError, WorklistStore};

/// Records requested pauses instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    pub slept: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn calls(&self) -> Vec<Duration> {
        self.slept.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.borrow_mut().push(duration);
    }
}

/// Answers confirmations from a script; answers "no" once it runs dry.
#[derive(Default)]
pub struct ScriptedOperator {
    answers: VecDeque<bool>,
    pub questions: Vec<String>,
}

impl ScriptedOperator {
    pub fn answering(answers: &[bool]) -> Self {
        Self {
            answers: answers.iter().copied().collect(),
            questions: Vec::new(),
        }
    }
}

impl Operator for ScriptedOperator {
    fn confirm(&mut self, question: &str) -> bool {
        self.questions.push(question.to_string());
        self.answers.pop_front().unwrap_or(false)
    }
}

/// Scripted reply; `Err` becomes a connection failure.
pub type Reply = Result<HttpResponse, String>;

/// Serves canned responses by URL prefix. Each route replays its queue in
/// order and then keeps repeating its last reply.
#[derive(Default)]
pub struct FakeHttp {
    routes: RefCell<Vec<(String, VecDeque<Reply>)>>,
    pub requests: RefCell<Vec<HttpRequest>>,
}

impl FakeHttp {
    pub fn route(self, prefix: &str, replies: Vec<Reply>) -> Self {
        self.routes
            .borrow_mut()
            .push((prefix.to_string(), replies.into_iter().collect()));
        self
    }

    pub fn requests_to(&self, prefix: &str) -> Vec<HttpRequest> {
        self.requests
            .borrow()
            .iter()
            .filter(|request| request.url.starts_with(prefix))
            .cloned()
            .collect()
    }
}

impl HttpClient for FakeHttp {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.borrow_mut().push(request.clone());
        let mut routes = self.routes.borrow_mut();
        let Some((_, replies)) = routes
            .iter_mut()
            .find(|(prefix, _)| request.url.starts_with(prefix.as_str()))
        else {
            return Ok(HttpResponse::status(404, ""));
        };
        let reply = if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        };
        match reply {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(TransportError::Connect(message)),
            None => Ok(HttpResponse::status(404, "")),
        }
    }
}

/// In-memory workbook with failure injection.
#[derive(Default)]
pub struct MemoryWorkbook {
    pub sheets: BTreeMap<String, Vec<Vec<String>>>,
    /// Upcoming `read_all` calls that fail as unavailable.
    pub unavailable_reads: Cell<u32>,
    /// Upcoming `write_cells` calls that fail as quota exceeded.
    pub rate_limited_writes: u32,
    /// Upcoming `delete_row` calls that fail as unavailable.
    pub failing_deletes: u32,
    pub ops: RefCell<Vec<String>>,
}

impl MemoryWorkbook {
    pub fn with_sheet(mut self, name: &str, rows: &[&[&str]]) -> Self {
        self.sheets.insert(
            name.to_string(),
            rows.iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        );
        self
    }

    pub fn rows(&self, sheet: &str) -> Vec<Vec<String>> {
        self.sheets.get(sheet).cloned().unwrap_or_default()
    }

    fn sheet_mut(&mut self, sheet: &str) -> Result<&mut Vec<Vec<String>>, StoreError> {
        self.sheets
            .get_mut(sheet)
            .ok_or_else(|| StoreError::SheetNotFound(sheet.to_string()))
    }
}

impl WorklistStore for MemoryWorkbook {
    fn read_all(&self, sheet: &str) -> Result<Vec<Vec<String>>, StoreError> {
        self.ops.borrow_mut().push(format!("read {sheet}"));
        if self.unavailable_reads.get() > 0 {
            self.unavailable_reads.set(self.unavailable_reads.get() - 1);
            return Err(StoreError::Unavailable("injected".to_string()));
        }
        self.sheets
            .get(sheet)
            .cloned()
            .ok_or_else(|| StoreError::SheetNotFound(sheet.to_string()))
    }

    fn write_cells(&mut self, sheet: &str, cells: &[CellUpdate]) -> Result<(), StoreError> {
        self.ops.borrow_mut().push(format!("write {sheet}"));
        if self.rate_limited_writes > 0 {
            self.rate_limited_writes -= 1;
            return Err(StoreError::RateLimited("injected".to_string()));
        }
        let rows = self.sheet_mut(sheet)?;
        for update in cells {
            let Some(row) = rows.get_mut(update.row) else {
                return Err(StoreError::RowOutOfRange {
                    sheet: sheet.to_string(),
                    row: update.row,
                });
            };
            if row.len() <= update.col {
                row.resize(update.col + 1, String::new());
            }
            row[update.col] = update.value.clone();
        }
        Ok(())
    }

    fn append_row(&mut self, sheet: &str, values: &[String]) -> Result<(), StoreError> {
        self.ops.borrow_mut().push(format!("append {sheet}"));
        self.sheet_mut(sheet)?.push(values.to_vec());
        Ok(())
    }

    fn delete_row(&mut self, sheet: &str, row: usize) -> Result<(), StoreError> {
        self.ops.borrow_mut().push(format!("delete {sheet} {row}"));
        if self.failing_deletes > 0 {
            self.failing_deletes -= 1;
            return Err(StoreError::Unavailable("injected".to_string()));
        }
        let rows = self.sheet_mut(sheet)?;
        if row >= rows.len() {
            return Err(StoreError::RowOutOfRange {
                sheet: sheet.to_string(),
                row,
            });
        }
        rows.remove(row);
        Ok(())
    }

    fn ensure_sheet(&mut self, sheet: &str, _rows: usize, _cols: usize) -> Result<bool, StoreError> {
        if self.sheets.contains_key(sheet) {
            return Ok(false);
        }
        self.ops.borrow_mut().push(format!("create {sheet}"));
        self.sheets.insert(sheet.to_string(), Vec::new());
        Ok(true)
    }
}
