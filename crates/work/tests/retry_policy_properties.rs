//! Property-based tests for retry backoff and outcome classification.
//!
//! Properties verified:
//! - backoff never exceeds the configured maximum
//! - backoff never shrinks from one attempt to the next
//! - attempts are allowed strictly below the bound
//! - 401/403/404/409/422 are always terminal, transport failures never are

use std::time::Duration;

use domop_work::{CallError, CallOutcome, RetryPolicy};
use proptest::prelude::*;

fn policy() -> impl Strategy<Value = RetryPolicy> {
    (1u32..10, 0u64..1_000, 0u64..60_000, any::<bool>()).prop_map(
        |(max_attempts, initial, max, retry_on_timeout)| RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(initial.min(max)),
            max_delay: Duration::from_millis(max),
            retry_on_timeout,
        },
    )
}

proptest! {
    #[test]
    fn prop_delay_is_bounded(policy in policy(), attempt in 0u32..64) {
        prop_assert!(policy.delay_for(attempt) <= policy.max_delay);
    }

    #[test]
    fn prop_delay_is_monotonic(policy in policy(), attempt in 1u32..63) {
        prop_assert!(policy.delay_for(attempt) <= policy.delay_for(attempt + 1));
    }

    #[test]
    fn prop_attempt_bound(policy in policy(), attempt in 0u32..20) {
        prop_assert_eq!(policy.allows_another(attempt), attempt < policy.max_attempts);
    }

    #[test]
    fn prop_client_errors_are_terminal(
        policy in policy(),
        status in prop::sample::select(vec![400u16, 401, 403, 404, 409, 422]),
    ) {
        let outcome = CallOutcome::<()>::classify(Err(CallError::status(status, "no")), &policy);

        let is_terminal = matches!(
            outcome,
            CallOutcome::FailureTerminal { status: Some(s), .. } if s == status
        );
        prop_assert!(is_terminal);
    }

    #[test]
    fn prop_transport_errors_are_retryable(policy in policy()) {
        let outcome = CallOutcome::<()>::classify(Err(CallError::transport("reset")), &policy);

        prop_assert!(matches!(outcome, CallOutcome::FailureRetryable(_)));
    }
}
