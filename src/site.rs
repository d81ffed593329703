//! Target-site endpoints and the canonical profile URL pattern.
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::credential::Credential;
use crate::transport::HttpRequest;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36";

/// Endpoints and session details for the profile site.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Search engine results page queried with `q=<first> <last> <city> <qualifier>`.
    pub search_url: String,
    /// Extra search term that narrows results to the profile site.
    pub search_qualifier: String,
    /// Profile pages live at `<profile_base_url><RECORD_ID>`.
    pub profile_base_url: String,
    /// Category breakdown endpoint; `{id}` is replaced by the record id.
    pub decisions_url_template: String,
    /// Cookie name carrying the session credential.
    pub session_cookie: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            search_url: "https://www.bing.com/search".to_string(),
            search_qualifier: "doctrine.fr".to_string(),
            profile_base_url: "https://www.doctrine.fr/p/avocat/".to_string(),
            decisions_url_template: "https://www.doctrine.fr/api/v2/lawyers/{id}/decisions"
                .to_string(),
            session_cookie: "session".to_string(),
            user_agent: BROWSER_USER_AGENT.to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Compiled view of the profile URL layout.
#[derive(Debug, Clone)]
pub struct ProfileUrls {
    base: String,
    host: String,
    pattern: Regex,
    embedded: Regex,
}

impl ProfileUrls {
    pub fn new(site: &SiteConfig) -> Result<Self> {
        let base = site.profile_base_url.trim();
        if !base.starts_with("https://") && !base.starts_with("http://") {
            return Err(anyhow!(
                "profile_base_url must be an http(s) URL (got {base:?})"
            ));
        }
        let base = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{base}/")
        };
        let host = host_of(&base)
            .ok_or_else(|| anyhow!("profile_base_url has no host (got {base:?})"))?
            .to_string();
        let escaped = regex::escape(&base);
        let pattern = Regex::new(&format!(r"^{escaped}([A-Z0-9]+)/?$"))
            .context("compile profile URL pattern")?;
        // Search engines sometimes drop the scheme or add query strings.
        let path = regex::escape(base.split_once("://").map_or(base.as_str(), |(_, rest)| rest));
        let embedded = Regex::new(&format!(r"{path}([A-Z0-9]+)"))
            .context("compile embedded profile pattern")?;
        Ok(Self {
            base,
            host,
            pattern,
            embedded,
        })
    }

    /// Build the canonical profile URL for a record id.
    pub fn canonical(&self, record_id: &str) -> String {
        format!("{}{}", self.base, record_id)
    }

    /// True when `url` is exactly a canonical profile URL.
    pub fn is_profile_url(&self, url: &str) -> bool {
        self.pattern.is_match(url.trim())
    }

    /// Extract the record id from any link that points at a profile page.
    pub fn record_id_in(&self, link: &str) -> Option<String> {
        self.embedded
            .captures(link)
            .and_then(|caps| caps.get(1))
            .map(|id| id.as_str().to_string())
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

/// Return the host component of an absolute http(s) URL.
pub fn host_of(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?;
    let host = host.split(':').next()?;
    (!host.is_empty()).then_some(host)
}

/// Attach browser headers, plus the session cookie when the request targets
/// the profile site.
pub fn prepare_request(
    site: &SiteConfig,
    urls: &ProfileUrls,
    mut request: HttpRequest,
    credential: &Credential,
) -> HttpRequest {
    request = request.header("User-Agent", &site.user_agent);
    if host_of(&request.url) == Some(urls.host()) {
        request = request.header(
            "Cookie",
            &format!("{}={}", site.session_cookie, credential.token()),
        );
    }
    request
}
