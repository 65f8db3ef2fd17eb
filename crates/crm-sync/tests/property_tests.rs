//! Property tests for the optimistic contract
//!
//! For any entity, change set and failure kind, the collection ends up in
//! exactly the state the failure class dictates.

use crm_sync::{ApiError, ApiErrorKind, EntityId, ErrorClass, Severity};
use crm_test_utils::{card, changes, CardStatus, Harness};
use proptest::prelude::*;
use serde_json::json;

fn status() -> impl Strategy<Value = CardStatus> {
    prop_oneof![
        Just(CardStatus::Todo),
        Just(CardStatus::Doing),
        Just(CardStatus::Done)
    ]
}

fn failure() -> impl Strategy<Value = Option<ApiErrorKind>> {
    prop_oneof![
        Just(None),
        Just(Some(ApiErrorKind::Authentication)),
        Just(Some(ApiErrorKind::Network)),
        Just(Some(ApiErrorKind::Validation)),
        Just(Some(ApiErrorKind::NotFound)),
        Just(Some(ApiErrorKind::Server)),
        Just(Some(ApiErrorKind::Other)),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

proptest! {
    #[test]
    fn prop_outcome_matches_failure_class(
        from in status(),
        to in status(),
        points in 0u32..1000,
        new_points in 0u32..1000,
        kind in failure(),
    ) {
        prop_assume!(from != to || points != new_points);

        let original = card("P1", from, points);
        let h = Harness::new(vec![original.clone(), card("P2", CardStatus::Todo, 1)]);
        if let Some(kind) = kind {
            h.api.fail_next(ApiError::new(kind, "injected"));
        }
        let id = EntityId::from("P1");
        let request = changes([
            ("status", serde_json::to_value(to).unwrap()),
            ("points", json!(new_points)),
        ]);

        let pending = h.mutator.begin(&id, request).unwrap().unwrap();
        let applied = h.local("P1").unwrap();
        prop_assert_eq!(applied.status, to);
        prop_assert_eq!(applied.points, new_points);

        let result = runtime().block_on(h.mutator.settle(pending));
        let after = h.local("P1").unwrap();

        match kind.map(ApiErrorKind::class) {
            None => {
                prop_assert!(result.is_ok());
                prop_assert_eq!(&after, &applied);
                prop_assert_eq!(h.sink.shown().len(), 0);
            }
            Some(ErrorClass::Recoverable) => {
                prop_assert!(result.unwrap_err().is_retryable());
                prop_assert_eq!(&after, &original);
                prop_assert_eq!(h.sink.count(Severity::Error), 1);
            }
            Some(ErrorClass::Terminal) => {
                prop_assert!(result.unwrap_err().is_terminal());
                prop_assert_eq!(&after, &applied);
                prop_assert_eq!(h.sink.count(Severity::Error), 1);
                prop_assert!(h.mutator.is_halted());
            }
        }

        // Untouched neighbours stay untouched
        prop_assert_eq!(h.local("P2").unwrap(), card("P2", CardStatus::Todo, 1));
        prop_assert_eq!(h.api.calls().update, 1);
    }

    #[test]
    fn prop_unknown_id_never_calls_remote(id in "[a-z]{1,8}") {
        let h = Harness::new(vec![card("P1", CardStatus::Todo, 0)]);
        let result = runtime().block_on(
            h.mutator.apply_mutation(&EntityId::new(id), changes([("points", json!(1))]))
        );
        prop_assert!(result.is_ok());
        prop_assert_eq!(h.api.calls().total(), 0);
        prop_assert!(h.sink.shown().is_empty());
        prop_assert!(h.surface.patches().is_empty());
    }
}
