//! Category breakdown reduction.
//!
//! The decisions endpoint returns `domains[].sub[]` entries of
//! `{categoryName, count}`; the worklist keeps the five largest.
use serde::Deserialize;

/// Number of category slots written to every row.
pub const CATEGORY_SLOTS: usize = 5;
/// Placeholder for an empty category slot.
pub const EMPTY_CATEGORY: &str = "None";

#[derive(Debug, Default, Deserialize)]
pub struct DecisionsPayload {
    #[serde(default)]
    pub domains: Vec<Domain>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Domain {
    #[serde(default)]
    pub sub: Vec<SubCategory>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubCategory {
    #[serde(rename = "categoryName", default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCount {
    pub name: String,
    pub count: u64,
}

/// Category name -> count, in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryBreakdown {
    entries: Vec<CategoryCount>,
}

impl CategoryBreakdown {
    /// Flatten every domain's sub-categories, merging repeated names.
    pub fn from_payload(payload: &DecisionsPayload) -> Self {
        let mut breakdown = Self::default();
        for sub in payload.domains.iter().flat_map(|domain| domain.sub.iter()) {
            let Some(name) = sub.category_name.as_deref().map(str::trim) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            breakdown.add(name, sub.count);
        }
        breakdown
    }

    pub fn add(&mut self, name: &str, count: u64) {
        match self.entries.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => entry.count = entry.count.saturating_add(count),
            None => self.entries.push(CategoryCount {
                name: name.to_string(),
                count,
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of the `n` largest categories, descending by count. Ties keep
    /// source order.
    pub fn top(&self, n: usize) -> Vec<String> {
        let mut ranked: Vec<&CategoryCount> = self.entries.iter().collect();
        // sort_by is stable
        ranked.sort_by(|a, b| b.count.cmp(&a.count));
        ranked
            .into_iter()
            .take(n)
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Top five names padded with `None` to exactly five slots.
    pub fn slots(&self) -> Vec<String> {
        pad_slots(self.top(CATEGORY_SLOTS))
    }
}

/// Pad (or truncate) to exactly [`CATEGORY_SLOTS`] entries.
pub fn pad_slots(mut names: Vec<String>) -> Vec<String> {
    names.truncate(CATEGORY_SLOTS);
    while names.len() < CATEGORY_SLOTS {
        names.push(EMPTY_CATEGORY.to_string());
    }
    names
}

/// Five `None` slots.
pub fn empty_slots() -> Vec<String> {
    pad_slots(Vec::new())
}
