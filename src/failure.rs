//! Failure taxonomy shared by every remote-call wrapper.
//!
//! Each component returns its own typed error; the retry controller only ever
//! looks at the [`FailureKind`] reported through [`Classify`], never at
//! message text.
use crate::credential::CredentialError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// How a failed call should be treated by the retry controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Definitive: the searched record does not exist.
    NotFound,
    /// Network-level failure; retried after a fixed delay.
    Transient,
    /// Quota or 429; retried with exponential backoff.
    RateLimited,
    /// Anti-automation challenge or expired session; needs the operator.
    Challenge,
    /// The remote markup no longer matches what we parse.
    StructuralMismatch,
    /// The worklist backend cannot be reached.
    StoreUnavailable,
    /// Anything else; propagated without retry.
    Unclassified,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NotFound => "not_found",
            FailureKind::Transient => "transient",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Challenge => "challenge",
            FailureKind::StructuralMismatch => "structural_mismatch",
            FailureKind::StoreUnavailable => "store_unavailable",
            FailureKind::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a component error onto the retry taxonomy.
pub trait Classify {
    fn failure_kind(&self) -> FailureKind;

    /// Server-provided minimum wait, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Low-level transport failures reported by an [`crate::transport::HttpClient`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("i/o error: {0}")]
    Io(String),
    #[error("request failed: {0}")]
    Other(String),
}

impl Classify for TransportError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            TransportError::Connect(_) | TransportError::Timeout(_) | TransportError::Io(_) => {
                FailureKind::Transient
            }
            TransportError::Other(_) => FailureKind::Unclassified,
        }
    }
}

/// Failures from the Resolver and Profile Extractor.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no match: {0}")]
    NotFound(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("server error {status} from {url}")]
    ServerError { url: String, status: u16 },
    #[error("rate limited by {url} (status {status})")]
    RateLimited {
        url: String,
        status: u16,
        retry_after: Option<Duration>,
    },
    #[error("challenge or expired session at {url} (status {status})")]
    Challenge { url: String, status: u16 },
    #[error("session credential unavailable: {0}")]
    Credential(#[from] CredentialError),
    #[error("profile data carries no read key; the session has likely expired")]
    AuthTokenMissing,
    #[error("page structure changed: {0}")]
    StructuralMismatch(String),
    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },
}

impl Classify for FetchError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            FetchError::NotFound(_) => FailureKind::NotFound,
            FetchError::Transport(err) => err.failure_kind(),
            FetchError::ServerError { .. } => FailureKind::Transient,
            FetchError::RateLimited { .. } => FailureKind::RateLimited,
            FetchError::Challenge { .. } | FetchError::Credential(_) | FetchError::AuthTokenMissing => {
                FailureKind::Challenge
            }
            FetchError::StructuralMismatch(_) => FailureKind::StructuralMismatch,
            FetchError::UnexpectedStatus { .. } => FailureKind::Unclassified,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
