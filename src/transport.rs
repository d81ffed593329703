//! Blocking HTTP transport and status classification.
use std::time::Duration;

use crate::failure::{FetchError, TransportError};

/// Marker strings that identify an anti-automation interstitial.
const CHALLENGE_MARKERS: &[&str] = &["captcha", "cf-challenge", "challenge-platform"];
const QUOTA_MARKER: &str = "quota exceeded";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    pub retry_after: Option<Duration>,
}

#[cfg(test)]
impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
        }
    }
}

/// Anything that can perform a GET and hand back status + body.
///
/// Non-2xx statuses are returned as responses, not errors; only
/// connection-level problems are `Err`.
pub trait HttpClient {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

pub struct UreqClient {
    agent: ureq::Agent,
}

impl UreqClient {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl HttpClient for UreqClient {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.agent.get(request.url.as_str());
        for (name, value) in &request.query {
            builder = builder.query(name.as_str(), value.as_str());
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let mut response = builder.call().map_err(map_ureq_error)?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(map_ureq_error)?;
        Ok(HttpResponse {
            status,
            body,
            retry_after,
        })
    }
}

fn map_ureq_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Timeout(_) => TransportError::Timeout(err.to_string()),
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
            TransportError::Connect(err.to_string())
        }
        ureq::Error::Io(_) => TransportError::Io(err.to_string()),
        other => TransportError::Other(other.to_string()),
    }
}

/// Parse a `Retry-After` value given in seconds.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Turn a non-success response into the failure it represents.
///
/// 2xx returns `None`. 404/410 is definitive, 401/403 and challenge pages
/// need the operator, 429 or a quota body backs off, 5xx is transient.
pub fn classify_response(url: &str, response: &HttpResponse) -> Option<FetchError> {
    let status = response.status;
    if (200..300).contains(&status) {
        return None;
    }
    let url = url.to_string();
    let body = response.body.to_ascii_lowercase();
    let looks_like_challenge = CHALLENGE_MARKERS.iter().any(|marker| body.contains(marker));
    Some(match status {
        404 | 410 => FetchError::NotFound(format!("{url} returned {status}")),
        401 | 403 => FetchError::Challenge { url, status },
        429 if looks_like_challenge => FetchError::Challenge { url, status },
        429 => FetchError::RateLimited {
            url,
            status,
            retry_after: response.retry_after,
        },
        _ if body.contains(QUOTA_MARKER) => FetchError::RateLimited {
            url,
            status,
            retry_after: response.retry_after,
        },
        500..=599 => FetchError::ServerError { url, status },
        _ => FetchError::UnexpectedStatus { url, status },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::{Classify, FailureKind};

    fn kind(status: u16, body: &str) -> Option<FailureKind> {
        classify_response("https://site.test/x", &HttpResponse::status(status, body))
            .map(|err| err.failure_kind())
    }

    #[test]
    fn success_statuses_are_not_failures() {
        assert_eq!(kind(200, ""), None);
        assert_eq!(kind(204, ""), None);
    }

    #[test]
    fn statuses_map_onto_the_taxonomy() {
        assert_eq!(kind(404, ""), Some(FailureKind::NotFound));
        assert_eq!(kind(403, ""), Some(FailureKind::Challenge));
        assert_eq!(kind(401, ""), Some(FailureKind::Challenge));
        assert_eq!(kind(429, "slow down"), Some(FailureKind::RateLimited));
        assert_eq!(kind(503, ""), Some(FailureKind::Transient));
        assert_eq!(kind(418, ""), Some(FailureKind::Unclassified));
    }

    #[test]
    fn challenge_page_behind_429_needs_the_operator() {
        assert_eq!(
            kind(429, "<div id=\"captcha-box\">"),
            Some(FailureKind::Challenge)
        );
    }

    #[test]
    fn quota_body_is_rate_limiting_regardless_of_status() {
        assert_eq!(
            kind(400, "Quota exceeded for quota metric"),
            Some(FailureKind::RateLimited)
        );
    }

    #[test]
    fn retry_after_is_carried_into_the_error() {
        let mut response = HttpResponse::status(429, "");
        response.retry_after = parse_retry_after("12");
        let err = classify_response("https://site.test", &response).expect("failure");
        assert_eq!(err.retry_after(), Some(Duration::from_secs(12)));
        assert_eq!(parse_retry_after("soon"), None);
    }
}
