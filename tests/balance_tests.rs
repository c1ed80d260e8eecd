//! Balance snapshot recording tests against a real database

mod common;

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use rust_decimal::Decimal;
    use serde_json::json;

    use super::common::*;
    use salary_advance_server::balance::BalanceOutcome;
    use salary_advance_server::error::LendingError;
    use salary_advance_server::provider::{CallbackEnvelope, ResultPayload};

    const SAMPLE_BALANCE: &str = "Working Account|KES|0.00|1234.50|0.00&Utility Account|KES|0.00|200.00|0.00";

    fn balance_result(conversation_id: &str, balance: Option<&str>) -> ResultPayload {
        let parameters = match balance {
            Some(value) => json!({
                "ResultParameter": [
                    { "Key": "AccountBalance", "Value": value },
                    { "Key": "BOCompletedTime", "Value": 20240101120000u64 }
                ]
            }),
            None => json!({
                "ResultParameter": { "Key": "BOCompletedTime", "Value": 20240101120000u64 }
            }),
        };

        serde_json::from_value::<CallbackEnvelope<ResultPayload>>(json!({
            "Result": {
                "ResultType": 0,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "OriginatorConversationID": "16917-22577599-3",
                "ConversationID": conversation_id,
                "TransactionID": "LGR0000000",
                "ResultParameters": parameters
            }
        }))
        .unwrap()
        .into_inner()
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_snapshot_recorded_once_per_conversation() {
        let pool = setup_test_db().await;
        let provider = FakeProvider::new();
        let services = services(&pool, provider.clone());
        let fixture = seed(&pool, 1, Decimal::new(50_000, 0)).await;

        let inquiry = services
            .balances
            .request_snapshot(fixture.tenant_id)
            .await
            .unwrap();
        assert_eq!(provider.balance_calls.load(Ordering::SeqCst), 1);

        let payload = balance_result(&inquiry.conversation_id, Some(SAMPLE_BALANCE));

        let recorded = match services.balances.record_snapshot(&payload).await.unwrap() {
            BalanceOutcome::Recorded(snapshot) => snapshot,
            other => panic!("expected a new snapshot, got {:?}", other),
        };
        assert_eq!(recorded.tenant_id, fixture.tenant_id);
        assert_eq!(recorded.working_account_balance, Decimal::new(123_450, 2));
        assert_eq!(recorded.utility_account_balance, Decimal::new(20_000, 2));

        match services.balances.record_snapshot(&payload).await.unwrap() {
            BalanceOutcome::Duplicate(existing) => assert_eq!(existing.id, recorded.id),
            other => panic!("expected duplicate, got {:?}", other),
        }

        let latest = services
            .balances
            .latest_snapshot(fixture.tenant_id)
            .await
            .unwrap()
            .expect("snapshot stored");
        assert_eq!(latest.id, recorded.id);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_missing_balance_key_stores_nothing() {
        let pool = setup_test_db().await;
        let services = services(&pool, FakeProvider::new());
        let fixture = seed(&pool, 1, Decimal::new(50_000, 0)).await;

        let inquiry = services
            .balances
            .request_snapshot(fixture.tenant_id)
            .await
            .unwrap();

        let result = services
            .balances
            .record_snapshot(&balance_result(&inquiry.conversation_id, None))
            .await;
        assert!(matches!(result, Err(LendingError::MalformedBalancePayload(_))));

        let latest = services
            .balances
            .latest_snapshot(fixture.tenant_id)
            .await
            .unwrap();
        assert!(latest.is_none());
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_unparseable_amount_stores_nothing() {
        let pool = setup_test_db().await;
        let services = services(&pool, FakeProvider::new());
        let fixture = seed(&pool, 1, Decimal::new(50_000, 0)).await;

        let inquiry = services
            .balances
            .request_snapshot(fixture.tenant_id)
            .await
            .unwrap();

        let result = services
            .balances
            .record_snapshot(&balance_result(
                &inquiry.conversation_id,
                Some("Working Account|KES|0.00|abc|0.00&Utility Account|KES|0.00|200.00|0.00"),
            ))
            .await;
        assert!(matches!(result, Err(LendingError::MalformedBalancePayload(_))));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_unknown_inquiry_is_unmatched() {
        let pool = setup_test_db().await;
        let services = services(&pool, FakeProvider::new());

        let outcome = services
            .balances
            .record_snapshot(&balance_result("AG_unknown_conversation", Some(SAMPLE_BALANCE)))
            .await
            .unwrap();
        assert!(matches!(outcome, BalanceOutcome::Unmatched));
    }
}
