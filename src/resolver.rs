//! Person -> profile identifier resolution through a search engine.
//!
//! One query per person, first profile hit wins. Homonyms in the same city
//! are not disambiguated.
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::credential::Credential;
use crate::failure::FetchError;
use crate::profile::extract_oath_date;
use crate::site::{prepare_request, ProfileUrls, SiteConfig};
use crate::transport::{classify_response, HttpClient, HttpRequest};

/// First search hit for a person.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub record_id: String,
    pub profile_url: String,
    /// Oath date quoted in the result snippet, when present.
    pub aux_date: Option<String>,
}

pub struct Resolver<'a> {
    client: &'a dyn HttpClient,
    site: SiteConfig,
    urls: ProfileUrls,
}

impl<'a> Resolver<'a> {
    pub fn new(client: &'a dyn HttpClient, site: SiteConfig, urls: ProfileUrls) -> Self {
        Self { client, site, urls }
    }

    pub fn query_for(&self, first_name: &str, last_name: &str, city: &str) -> String {
        [first_name, last_name, city, self.site.search_qualifier.as_str()]
            .iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn resolve(
        &self,
        first_name: &str,
        last_name: &str,
        city: &str,
        credential: &Credential,
    ) -> Result<Candidate, FetchError> {
        let query = self.query_for(first_name, last_name, city);
        let request = HttpRequest::get(self.site.search_url.as_str()).query("q", &query);
        let request = prepare_request(&self.site, &self.urls, request, credential);
        let response = self.client.get(&request)?;
        if let Some(err) = classify_response(&self.site.search_url, &response) {
            return Err(err);
        }
        let candidate = first_candidate(&self.urls, &response.body)
            .ok_or_else(|| FetchError::NotFound(format!("no profile link for {query:?}")))?;
        debug!(
            record_id = %candidate.record_id,
            aux_date = candidate.aux_date.as_deref().unwrap_or("-"),
            "search hit"
        );
        Ok(candidate)
    }
}

/// First link in a result page that points at a profile.
pub fn first_candidate(urls: &ProfileUrls, html: &str) -> Option<Candidate> {
    let document = Html::parse_document(html);
    let anchors = Selector::parse("a[href]").expect("selector for links");
    document.select(&anchors).find_map(|anchor| {
        let href = anchor.value().attr("href")?;
        let record_id = urls.record_id_in(href)?;
        Some(Candidate {
            profile_url: urls.canonical(&record_id),
            aux_date: snippet_date(anchor),
            record_id,
        })
    })
}

/// Oath date mentioned in the result entry that holds `anchor`.
fn snippet_date(anchor: ElementRef<'_>) -> Option<String> {
    let entry = anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|element| element.value().name() == "li")?;
    let text = entry.text().collect::<Vec<_>>().join(" ");
    if !text.to_lowercase().contains("serment") {
        return None;
    }
    extract_oath_date(&text)
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
