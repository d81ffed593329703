use super::*;
use crate::test_support::{RecordingSleeper, ScriptedOperator};
use std::cell::Cell;

#[derive(Debug)]
struct Failure {
    kind: FailureKind,
    retry_after: Option<Duration>,
}

impl Failure {
    fn of(kind: FailureKind) -> Self {
        Self {
            kind,
            retry_after: None,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure", self.kind)
    }
}

impl Classify for Failure {
    fn failure_kind(&self) -> FailureKind {
        self.kind
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }
}

/// Fail with `kind` for the first `failures` calls, then succeed.
fn flaky(kind: FailureKind, failures: u32) -> (Cell<u32>, impl Fn(&Cell<u32>) -> Result<u32, Failure>) {
    (Cell::new(0), move |calls: &Cell<u32>| {
        calls.set(calls.get() + 1);
        if calls.get() <= failures {
            Err(Failure::of(kind))
        } else {
            Ok(calls.get())
        }
    })
}

#[test]
fn backoff_stays_within_floor_and_jitter_and_grows() {
    let sleeper = RecordingSleeper::default();
    let mut operator = ScriptedOperator::default();
    let policy = RetryPolicy::default();
    let mut controller = RetryController::new(policy.clone(), &sleeper, &mut operator).with_seed(7);
    let mut previous_floor = Duration::ZERO;
    for attempt in 0..6 {
        let floor = policy.rate_limit_floor(attempt);
        let delay = controller.backoff_delay(attempt, None);
        let ceiling = (floor + Duration::from_millis(policy.rate_limit_jitter_ms))
            .min(policy.rate_limit_cap());
        assert!(delay >= floor.min(policy.rate_limit_cap()), "attempt {attempt}: {delay:?}");
        assert!(delay <= ceiling, "attempt {attempt}: {delay:?}");
        assert!(floor > previous_floor);
        previous_floor = floor;
    }
}

#[test]
fn backoff_never_exceeds_the_cap() {
    let sleeper = RecordingSleeper::default();
    let mut operator = ScriptedOperator::default();
    let mut controller =
        RetryController::new(RetryPolicy::default(), &sleeper, &mut operator).with_seed(1);
    let cap = controller.policy().rate_limit_cap();
    assert_eq!(controller.backoff_delay(40, None), cap);
    assert_eq!(controller.backoff_delay(200, None), cap);
    assert_eq!(
        controller.backoff_delay(0, Some(Duration::from_secs(3600))),
        cap
    );
}

#[test]
fn retry_after_raises_the_delay() {
    let sleeper = RecordingSleeper::default();
    let mut operator = ScriptedOperator::default();
    let policy = RetryPolicy {
        rate_limit_jitter_ms: 0,
        ..RetryPolicy::default()
    };
    let mut controller = RetryController::new(policy, &sleeper, &mut operator);
    assert_eq!(
        controller.backoff_delay(0, Some(Duration::from_secs(30))),
        Duration::from_secs(30)
    );
    assert_eq!(
        controller.backoff_delay(0, Some(Duration::from_millis(10))),
        Duration::from_millis(2_000)
    );
}

#[test]
fn transient_failures_use_the_fixed_delay_then_succeed() {
    let sleeper = RecordingSleeper::default();
    let mut operator = ScriptedOperator::default();
    let mut controller = RetryController::new(RetryPolicy::default(), &sleeper, &mut operator);
    let (calls, op) = flaky(FailureKind::Transient, 2);
    let value = controller
        .execute("fetch", || op(&calls))
        .expect("third attempt succeeds");
    assert_eq!(value, 3);
    assert_eq!(
        sleeper.calls(),
        vec![Duration::from_secs(60), Duration::from_secs(60)]
    );
}

#[test]
fn transient_failures_are_bounded() {
    let sleeper = RecordingSleeper::default();
    let mut operator = ScriptedOperator::default();
    let mut controller = RetryController::new(RetryPolicy::default(), &sleeper, &mut operator);
    let (calls, op) = flaky(FailureKind::Transient, u32::MAX);
    let err = controller
        .execute("fetch", || op(&calls))
        .expect_err("never succeeds");
    assert!(matches!(
        err,
        RetryError::Exhausted {
            kind: FailureKind::Transient,
            attempts: 3,
            ..
        }
    ));
    assert!(!err.is_fatal());
    assert_eq!(calls.get(), 3);
    assert_eq!(sleeper.calls().len(), 2);
}

#[test]
fn rate_limit_exhaustion_only_fails_the_item() {
    let sleeper = RecordingSleeper::default();
    let mut operator = ScriptedOperator::default();
    let policy = RetryPolicy {
        rate_limit_jitter_ms: 0,
        ..RetryPolicy::default()
    };
    let mut controller = RetryController::new(policy, &sleeper, &mut operator);
    let (calls, op) = flaky(FailureKind::RateLimited, u32::MAX);
    let err = controller
        .execute("fetch", || op(&calls))
        .expect_err("never succeeds");
    assert_eq!(err.kind(), FailureKind::RateLimited);
    assert!(!err.is_fatal());
    assert_eq!(calls.get(), 5);
    assert_eq!(
        sleeper.calls(),
        vec![
            Duration::from_millis(2_000),
            Duration::from_millis(4_000),
            Duration::from_millis(8_000),
            Duration::from_millis(16_000),
        ]
    );
    assert!(operator.questions.is_empty());
}

#[test]
fn rate_limit_honors_server_retry_after() {
    let sleeper = RecordingSleeper::default();
    let mut operator = ScriptedOperator::default();
    let policy = RetryPolicy {
        rate_limit_jitter_ms: 0,
        ..RetryPolicy::default()
    };
    let mut controller = RetryController::new(policy, &sleeper, &mut operator);
    let calls = Cell::new(0);
    let result = controller.execute("fetch", || {
        calls.set(calls.get() + 1);
        if calls.get() == 1 {
            Err(Failure {
                kind: FailureKind::RateLimited,
                retry_after: Some(Duration::from_secs(45)),
            })
        } else {
            Ok(())
        }
    });
    assert!(result.is_ok());
    assert_eq!(sleeper.calls(), vec![Duration::from_secs(45)]);
}

#[test]
fn challenge_waits_for_the_operator_then_resumes() {
    let sleeper = RecordingSleeper::default();
    let mut operator = ScriptedOperator::answering(&[true]);
    let (calls, op) = flaky(FailureKind::Challenge, 1);
    let value = {
        let mut controller =
            RetryController::new(RetryPolicy::default(), &sleeper, &mut operator);
        controller
            .execute("resolve Jean Dupont", || op(&calls))
            .expect("resumes after confirmation")
    };
    assert_eq!(value, 2);
    assert_eq!(operator.questions.len(), 1);
    assert!(operator.questions[0].starts_with("resolve Jean Dupont"));
    assert!(sleeper.calls().is_empty());
}

#[test]
fn declining_the_challenge_is_fatal() {
    let sleeper = RecordingSleeper::default();
    let mut operator = ScriptedOperator::answering(&[false]);
    let mut controller = RetryController::new(RetryPolicy::default(), &sleeper, &mut operator);
    let (calls, op) = flaky(FailureKind::Challenge, u32::MAX);
    let err = controller
        .execute("fetch", || op(&calls))
        .expect_err("operator declined");
    assert!(err.is_fatal());
    assert_eq!(err.kind(), FailureKind::Challenge);
    assert_eq!(calls.get(), 1);
}

#[test]
fn challenge_confirmations_are_bounded() {
    let sleeper = RecordingSleeper::default();
    let mut operator = ScriptedOperator::answering(&[true; 10]);
    let (calls, op) = flaky(FailureKind::Challenge, u32::MAX);
    let err = {
        let mut controller =
            RetryController::new(RetryPolicy::default(), &sleeper, &mut operator);
        controller
            .execute("fetch", || op(&calls))
            .expect_err("session never recovers")
    };
    assert!(matches!(err, RetryError::Fatal { confirmations: 3, .. }));
    assert_eq!(operator.questions.len(), 3);
    assert_eq!(calls.get(), 4);
}

#[test]
fn definitive_failures_are_returned_without_retry() {
    for kind in [
        FailureKind::NotFound,
        FailureKind::StructuralMismatch,
        FailureKind::StoreUnavailable,
        FailureKind::Unclassified,
    ] {
        let sleeper = RecordingSleeper::default();
        let mut operator = ScriptedOperator::answering(&[true]);
        let (calls, op) = flaky(kind, u32::MAX);
        let err = {
            let mut controller =
                RetryController::new(RetryPolicy::default(), &sleeper, &mut operator);
            controller
                .execute("fetch", || op(&calls))
                .expect_err("definitive")
        };
        assert!(matches!(err, RetryError::Definitive(_)), "{kind}");
        assert_eq!(err.kind(), kind);
        assert_eq!(calls.get(), 1, "{kind}");
        assert!(sleeper.calls().is_empty(), "{kind}");
        assert!(operator.questions.is_empty(), "{kind}");
    }
}

#[test]
fn exhausted_errors_describe_the_last_failure() {
    let sleeper = RecordingSleeper::default();
    let mut operator = ScriptedOperator::default();
    let policy = RetryPolicy {
        transient_max_attempts: 1,
        ..RetryPolicy::default()
    };
    let mut controller = RetryController::new(policy, &sleeper, &mut operator);
    let (calls, op) = flaky(FailureKind::Transient, u32::MAX);
    let err = controller
        .execute("fetch", || op(&calls))
        .expect_err("single attempt");
    assert_eq!(
        err.to_string(),
        "gave up after 1 transient attempts: transient failure"
    );
    assert_eq!(err.last().kind, FailureKind::Transient);
}
