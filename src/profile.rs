//! Profile page extraction.
//!
//! A profile page embeds its data as JSON in `<script id="__NEXT_DATA__">`.
//! The blob carries a per-page `readKey` that unlocks the decisions endpoint
//! and a free-text summary that usually states the oath date.
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

use crate::categories::{CategoryBreakdown, DecisionsPayload};
use crate::credential::{Credential, CredentialStore};
use crate::failure::FetchError;
use crate::retry::{RetryController, RetryError};
use crate::site::{prepare_request, ProfileUrls, SiteConfig};
use crate::transport::{classify_response, HttpClient, HttpRequest};

const HTML_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// Data read from a profile page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub record_id: String,
    pub profile_url: String,
    pub read_key: String,
    pub summary: String,
    /// Oath date found in the summary, if any.
    pub date: Option<String>,
}

/// Everything read from the profile site for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Exactly five slots, padded with `None`.
    pub categories: Vec<String>,
    /// Oath date from the profile summary, if it states one.
    pub date: Option<String>,
    pub profile_url: String,
}

pub struct ProfileExtractor<'a> {
    client: &'a dyn HttpClient,
    site: SiteConfig,
    urls: ProfileUrls,
}

impl<'a> ProfileExtractor<'a> {
    pub fn new(client: &'a dyn HttpClient, site: SiteConfig, urls: ProfileUrls) -> Self {
        Self { client, site, urls }
    }

    /// Fetch the profile page and read its embedded data.
    pub fn fetch_profile(&self, record_id: &str, credential: &Credential) -> Result<Profile, FetchError> {
        let url = self.urls.canonical(record_id);
        let request = HttpRequest::get(url.as_str())
            .header("Accept", HTML_ACCEPT)
            .header("Referer", &format!("https://{}", self.urls.host()));
        let request = prepare_request(&self.site, &self.urls, request, credential);
        let response = self.client.get(&request)?;
        if let Some(err) = classify_response(&url, &response) {
            return Err(err);
        }
        let profile = parse_profile(record_id, &url, &response.body)?;
        debug!(record_id, has_date = profile.date.is_some(), "profile parsed");
        Ok(profile)
    }

    /// Fetch the decisions breakdown unlocked by `read_key`. A missing
    /// breakdown resource reads as an empty breakdown.
    pub fn fetch_categories(
        &self,
        record_id: &str,
        read_key: &str,
        credential: &Credential,
    ) -> Result<CategoryBreakdown, FetchError> {
        let url = self.site.decisions_url_template.replace("{id}", record_id);
        let request = HttpRequest::get(url.as_str())
            .query("read_key", read_key)
            .header("Accept", "application/json")
            .header("Referer", &self.urls.canonical(record_id));
        let request = prepare_request(&self.site, &self.urls, request, credential);
        let response = self.client.get(&request)?;
        if response.status == 404 {
            debug!(record_id, "no decisions resource");
            return Ok(CategoryBreakdown::default());
        }
        if let Some(err) = classify_response(&url, &response) {
            return Err(err);
        }
        let payload: DecisionsPayload = serde_json::from_str(&response.body).map_err(|err| {
            FetchError::StructuralMismatch(format!("decisions payload for {record_id}: {err}"))
        })?;
        Ok(CategoryBreakdown::from_payload(&payload))
    }

    /// Profile then categories, each step retried on its own so a throttled
    /// breakdown never refetches the page. The credential is re-read before
    /// every attempt.
    pub fn extract(
        &self,
        record_id: &str,
        credentials: &CredentialStore,
        retry: &mut RetryController<'_>,
    ) -> Result<Extraction, RetryError<FetchError>> {
        let profile = retry.execute(
            &format!("fetch profile {record_id}"),
            || -> Result<_, FetchError> {
                let credential = credentials.load()?;
                self.fetch_profile(record_id, &credential)
            },
        )?;
        let breakdown = retry.execute(
            &format!("fetch categories {record_id}"),
            || -> Result<_, FetchError> {
                let credential = credentials.load()?;
                self.fetch_categories(record_id, &profile.read_key, &credential)
            },
        )?;
        if breakdown.is_empty() {
            debug!(record_id, "no categorized decisions");
        }
        Ok(Extraction {
            categories: breakdown.slots(),
            date: profile.date,
            profile_url: profile.profile_url,
        })
    }
}

/// Parse the `__NEXT_DATA__` blob of a profile page.
pub fn parse_profile(record_id: &str, profile_url: &str, html: &str) -> Result<Profile, FetchError> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("script#__NEXT_DATA__").expect("selector for embedded data");
    let script = document.select(&selector).next().ok_or_else(|| {
        FetchError::StructuralMismatch(format!("{profile_url} has no embedded data block"))
    })?;
    let json: String = script.text().collect();
    let data: Value = serde_json::from_str(&json).map_err(|err| {
        FetchError::StructuralMismatch(format!("embedded data of {profile_url}: {err}"))
    })?;
    let page_props = data.pointer("/props/pageProps").ok_or_else(|| {
        FetchError::StructuralMismatch(format!("{profile_url} data has no pageProps"))
    })?;
    let read_key = page_props
        .get("readKey")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or(FetchError::AuthTokenMissing)?;
    let summary = match page_props.pointer("/lawyerInfos/summary") {
        Some(Value::String(summary)) => summary.clone(),
        Some(Value::Null) => String::new(),
        _ => {
            return Err(FetchError::StructuralMismatch(format!(
                "{profile_url} data has no lawyerInfos.summary"
            )))
        }
    };
    Ok(Profile {
        record_id: record_id.to_string(),
        profile_url: profile_url.to_string(),
        read_key: read_key.to_string(),
        date: extract_oath_date(&summary),
        summary,
    })
}

const DATE_PATTERN: &str = r"\d{1,2}(?:er)?\s+(?:janvier|f[ée]vrier|mars|avril|mai|juin|juillet|ao[ûu]t|septembre|octobre|novembre|d[ée]cembre)\s+\d{4}";

/// Find a French `<day> <month> <year>` date, preferring the one stated as
/// the oath date.
pub fn extract_oath_date(text: &str) -> Option<String> {
    let oath = Regex::new(&format!(r"(?i)prêté\s+serment\s+le\s+({DATE_PATTERN})"))
        .expect("regex for oath date");
    if let Some(caps) = oath.captures(text) {
        return caps.get(1).map(|m| normalize_spaces(m.as_str()));
    }
    let any = Regex::new(&format!("(?i){DATE_PATTERN}")).expect("regex for dates");
    any.find(text).map(|m| normalize_spaces(m.as_str()))
}

fn normalize_spaces(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
#[path = "profile_tests.rs"]
mod tests;
