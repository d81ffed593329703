//! Classification-driven retry around remote calls.
//!
//! Every attempt's failure is classified through [`Classify`]:
//!
//! - **Transient**: fixed long delay, capped attempts. The network is the
//!   likely problem, so growing the delay buys nothing.
//! - **RateLimited**: `min(cap, base * 2^n + jitter)` with jitter drawn
//!   uniformly from `[0, jitter_max]`, capped attempts. Exhaustion only fails
//!   the current item.
//! - **Challenge**: the operator is asked to refresh the session credential;
//!   each confirmation buys one more attempt. Running out of confirmations,
//!   or a "no" answer, is fatal for the whole run.
//! - Everything else is returned to the caller untouched.
use std::error::Error;
use std::fmt;
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::failure::{Classify, FailureKind};
use crate::operator::Operator;

/// Retry limits and delays, loaded from the `retry` section of the config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total attempts (first try included) for transient network failures.
    pub transient_max_attempts: u32,
    pub transient_delay_secs: u64,
    /// Total attempts (first try included) for rate-limit responses.
    pub rate_limit_max_attempts: u32,
    pub rate_limit_base_ms: u64,
    pub rate_limit_cap_ms: u64,
    pub rate_limit_jitter_ms: u64,
    /// Operator confirmations allowed before a challenge becomes fatal.
    pub challenge_max_confirmations: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            transient_max_attempts: 3,
            transient_delay_secs: 60,
            rate_limit_max_attempts: 5,
            rate_limit_base_ms: 2_000,
            rate_limit_cap_ms: 300_000,
            rate_limit_jitter_ms: 1_000,
            challenge_max_confirmations: 3,
        }
    }
}

impl RetryPolicy {
    pub fn transient_delay(&self) -> Duration {
        Duration::from_secs(self.transient_delay_secs)
    }

    pub fn rate_limit_cap(&self) -> Duration {
        Duration::from_millis(self.rate_limit_cap_ms)
    }

    /// Backoff before rate-limit retry `attempt` (0-based), before jitter.
    pub fn rate_limit_floor(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.rate_limit_base_ms.saturating_mul(factor))
    }
}

/// Blocking pause. Swapped out in tests.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Why [`RetryController::execute`] gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Failure kinds that are never retried.
    Definitive(E),
    /// A retryable kind ran out of attempts; only this item is affected.
    Exhausted {
        kind: FailureKind,
        attempts: u32,
        last: E,
    },
    /// The session could not be recovered; the run must stop.
    Fatal { confirmations: u32, last: E },
}

impl<E: Classify> RetryError<E> {
    /// Kind of the last underlying failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            RetryError::Definitive(err) => err.failure_kind(),
            RetryError::Exhausted { kind, .. } => *kind,
            RetryError::Fatal { .. } => FailureKind::Challenge,
        }
    }
}

impl<E> RetryError<E> {
    pub fn last(&self) -> &E {
        match self {
            RetryError::Definitive(err) => err,
            RetryError::Exhausted { last, .. } | RetryError::Fatal { last, .. } => last,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, RetryError::Fatal { .. })
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Definitive(err) => write!(f, "{err}"),
            RetryError::Exhausted {
                kind,
                attempts,
                last,
            } => write!(f, "gave up after {attempts} {kind} attempts: {last}"),
            RetryError::Fatal {
                confirmations,
                last,
            } => write!(
                f,
                "session not recovered after {confirmations} operator confirmation(s): {last}"
            ),
        }
    }
}

impl<E: Error + 'static> Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.last())
    }
}

pub struct RetryController<'a> {
    policy: RetryPolicy,
    sleeper: &'a dyn Sleeper,
    operator: &'a mut dyn Operator,
    rng: StdRng,
}

impl<'a> RetryController<'a> {
    pub fn new(policy: RetryPolicy, sleeper: &'a dyn Sleeper, operator: &'a mut dyn Operator) -> Self {
        Self {
            policy,
            sleeper,
            operator,
            rng: StdRng::from_entropy(),
        }
    }

    /// Use a fixed jitter seed.
    #[cfg(test)]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    #[cfg(test)]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Delay before rate-limit retry `attempt` (0-based).
    pub fn backoff_delay(&mut self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let jitter_ms = if self.policy.rate_limit_jitter_ms == 0 {
            0
        } else {
            self.rng.gen_range(0..=self.policy.rate_limit_jitter_ms)
        };
        let cap = self.policy.rate_limit_cap();
        let delay = self
            .policy
            .rate_limit_floor(attempt)
            .saturating_add(Duration::from_millis(jitter_ms))
            .min(cap);
        match retry_after {
            Some(server_hint) => delay.max(server_hint.min(cap)),
            None => delay,
        }
    }

    /// Run `op` until it succeeds or its failure is not worth retrying.
    pub fn execute<T, E, F>(&mut self, label: &str, mut op: F) -> Result<T, RetryError<E>>
    where
        E: Classify + fmt::Display,
        F: FnMut() -> Result<T, E>,
    {
        let mut transient_attempts = 0u32;
        let mut rate_limited_attempts = 0u32;
        let mut confirmations = 0u32;
        loop {
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            match err.failure_kind() {
                FailureKind::Transient => {
                    transient_attempts += 1;
                    if transient_attempts >= self.policy.transient_max_attempts {
                        return Err(RetryError::Exhausted {
                            kind: FailureKind::Transient,
                            attempts: transient_attempts,
                            last: err,
                        });
                    }
                    let delay = self.policy.transient_delay();
                    warn!(
                        op = label,
                        attempt = transient_attempts,
                        delay_secs = delay.as_secs_f64(),
                        "network failure, retrying: {err}"
                    );
                    self.sleeper.sleep(delay);
                }
                FailureKind::RateLimited => {
                    let attempt = rate_limited_attempts;
                    rate_limited_attempts += 1;
                    if rate_limited_attempts >= self.policy.rate_limit_max_attempts {
                        return Err(RetryError::Exhausted {
                            kind: FailureKind::RateLimited,
                            attempts: rate_limited_attempts,
                            last: err,
                        });
                    }
                    let delay = self.backoff_delay(attempt, err.retry_after());
                    warn!(
                        op = label,
                        attempt = rate_limited_attempts,
                        delay_secs = delay.as_secs_f64(),
                        "rate limited, backing off: {err}"
                    );
                    self.sleeper.sleep(delay);
                }
                FailureKind::Challenge => {
                    if confirmations >= self.policy.challenge_max_confirmations {
                        return Err(RetryError::Fatal {
                            confirmations,
                            last: err,
                        });
                    }
                    warn!(op = label, "challenge or expired session: {err}");
                    let question = format!(
                        "{label}: the session looks expired or challenged ({err}). \
                         Refresh the credential file, then resume?"
                    );
                    if !self.operator.confirm(&question) {
                        return Err(RetryError::Fatal {
                            confirmations,
                            last: err,
                        });
                    }
                    confirmations += 1;
                    info!(op = label, confirmations, "operator confirmed, retrying");
                }
                FailureKind::NotFound
                | FailureKind::StructuralMismatch
                | FailureKind::StoreUnavailable
                | FailureKind::Unclassified => return Err(RetryError::Definitive(err)),
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
