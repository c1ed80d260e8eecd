//! Disbursement and callback reconciliation tests against a real database

mod common;

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;
    use uuid::Uuid;

    use super::common::*;
    use salary_advance_server::disbursement::{PayoutStatus, ReconcileOutcome};
    use salary_advance_server::error::LendingError;
    use salary_advance_server::loan::{CreateLoanRequest, Loan, LoanStatus};
    use salary_advance_server::provider::{
        CallbackEnvelope, ResultPayload, TimeoutPayload, TransportError,
    };

    fn success_result(originator_id: &str) -> ResultPayload {
        serde_json::from_value::<CallbackEnvelope<ResultPayload>>(json!({
            "Result": {
                "ResultType": 0,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "OriginatorConversationID": originator_id,
                "ConversationID": format!("AG_{}", Uuid::new_v4().simple()),
                "TransactionID": "NLJ41HAY6Q",
                "ResultParameters": {
                    "ResultParameter": [
                        { "Key": "TransactionAmount", "Value": 10000 },
                        { "Key": "TransactionReceipt", "Value": "NLJ41HAY6Q" }
                    ]
                }
            }
        }))
        .unwrap()
        .into_inner()
    }

    fn failed_result(originator_id: &str) -> ResultPayload {
        failed_result_for(originator_id, &format!("AG_{}", Uuid::new_v4().simple()))
    }

    fn failed_result_for(originator_id: &str, conversation_id: &str) -> ResultPayload {
        serde_json::from_value::<CallbackEnvelope<ResultPayload>>(json!({
            "ResultType": 0,
            "ResultCode": "2001",
            "ResultDesc": "The initiator information is invalid.",
            "OriginatorConversationID": originator_id,
            "ConversationID": conversation_id,
            "TransactionID": ""
        }))
        .unwrap()
        .into_inner()
    }

    fn timeout(originator_id: &str) -> TimeoutPayload {
        TimeoutPayload {
            originator_conversation_id: originator_id.to_string(),
            conversation_id: None,
        }
    }

    /// Request and fully approve a loan; returns the loan and its originator id
    async fn approved_loan(
        services: &Services,
        fixture: &Fixture,
    ) -> (Loan, String) {
        let loan = services
            .loans
            .request_loan(
                &fixture.borrower(),
                CreateLoanRequest {
                    amount: Decimal::new(10_000, 0),
                    duration_months: 1,
                },
            )
            .await
            .unwrap();
        let outcome = services
            .loans
            .approve(&fixture.approver(), loan.id)
            .await
            .unwrap();
        assert!(outcome.handed_off);

        let loan = outcome.loan;
        let originator = loan
            .originator_conversation_id
            .clone()
            .expect("hand-off assigns an originator id");
        (loan, originator)
    }

    async fn reload(services: &Services, fixture: &Fixture, loan_id: Uuid) -> Loan {
        services
            .loans
            .get_loan(&fixture.operator(), loan_id)
            .await
            .unwrap()
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_result_is_idempotent() {
        let pool = setup_test_db().await;
        let services = services(&pool, FakeProvider::new());
        let fixture = seed(&pool, 1, Decimal::new(50_000, 0)).await;
        let (loan, originator) = approved_loan(&services, &fixture).await;

        let payload = success_result(&originator);
        let first = services.reconciler.on_result(&payload).await.unwrap();
        assert!(matches!(
            first,
            ReconcileOutcome::Applied { status: PayoutStatus::Success, .. }
        ));

        let disbursed = reload(&services, &fixture, loan.id).await;
        assert_eq!(disbursed.status, LoanStatus::Disbursed);
        assert_eq!(disbursed.provider_transaction_id.as_deref(), Some("NLJ41HAY6Q"));
        let disbursed_at = disbursed.disbursed_at.expect("disbursed_at is set");

        let second = services.reconciler.on_result(&payload).await.unwrap();
        assert!(matches!(
            second,
            ReconcileOutcome::AlreadyResolved { status: PayoutStatus::Success, .. }
        ));

        let again = reload(&services, &fixture, loan.id).await;
        assert_eq!(again.status, LoanStatus::Disbursed);
        assert_eq!(again.disbursed_at, Some(disbursed_at));

        let audit = services
            .loans
            .audit_trail(&fixture.operator(), loan.id)
            .await
            .unwrap();
        let successes = audit
            .iter()
            .filter(|entry| entry.action == "payout_succeeded")
            .count();
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_timeout_then_result_settles_disbursed() {
        let pool = setup_test_db().await;
        let services = services(&pool, FakeProvider::new());
        let fixture = seed(&pool, 1, Decimal::new(50_000, 0)).await;
        let (loan, originator) = approved_loan(&services, &fixture).await;

        let timed_out = services
            .reconciler
            .on_timeout(&timeout(&originator))
            .await
            .unwrap();
        assert!(matches!(
            timed_out,
            ReconcileOutcome::Applied { status: PayoutStatus::Timeout, .. }
        ));

        let pending = reload(&services, &fixture, loan.id).await;
        assert_eq!(pending.status, LoanStatus::DisbursementPending);
        assert_eq!(pending.provider_status.as_deref(), Some("UNCONFIRMED"));

        let unconfirmed = services
            .disbursements
            .list_unconfirmed(&fixture.operator(), 20, 0)
            .await
            .unwrap();
        assert!(unconfirmed.iter().any(|p| p.loan_id == loan.id));

        services
            .reconciler
            .on_result(&success_result(&originator))
            .await
            .unwrap();

        let settled = reload(&services, &fixture, loan.id).await;
        assert_eq!(settled.status, LoanStatus::Disbursed);
        assert!(settled.disbursed_at.is_some());
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_result_then_timeout_stays_disbursed() {
        let pool = setup_test_db().await;
        let services = services(&pool, FakeProvider::new());
        let fixture = seed(&pool, 1, Decimal::new(50_000, 0)).await;
        let (loan, originator) = approved_loan(&services, &fixture).await;

        services
            .reconciler
            .on_result(&success_result(&originator))
            .await
            .unwrap();

        let late_timeout = services
            .reconciler
            .on_timeout(&timeout(&originator))
            .await
            .unwrap();
        assert!(matches!(
            late_timeout,
            ReconcileOutcome::AlreadyResolved { status: PayoutStatus::Success, .. }
        ));

        let settled = reload(&services, &fixture, loan.id).await;
        assert_eq!(settled.status, LoanStatus::Disbursed);
        assert_ne!(settled.provider_status.as_deref(), Some("UNCONFIRMED"));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_failed_result_allows_retry() {
        let pool = setup_test_db().await;
        let provider = FakeProvider::new();
        let services = services(&pool, provider.clone());
        let fixture = seed(&pool, 1, Decimal::new(50_000, 0)).await;
        let (loan, originator) = approved_loan(&services, &fixture).await;

        services
            .reconciler
            .on_result(&failed_result(&originator))
            .await
            .unwrap();

        let failed = reload(&services, &fixture, loan.id).await;
        assert_eq!(failed.status, LoanStatus::DisbursementFailed);
        assert!(failed.disbursed_at.is_none());

        services
            .disbursements
            .disburse(&fixture.operator(), loan.id)
            .await
            .unwrap();

        assert_eq!(provider.b2c_count(), 2);
        assert_eq!(provider.last_originator_id().as_deref(), Some(originator.as_str()));

        let retried = reload(&services, &fixture, loan.id).await;
        assert_eq!(retried.status, LoanStatus::DisbursementPending);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_redelivered_callbacks_do_not_settle_retry() {
        let pool = setup_test_db().await;
        let services = services(&pool, FakeProvider::new());
        let fixture = seed(&pool, 1, Decimal::new(50_000, 0)).await;
        let (loan, originator) = approved_loan(&services, &fixture).await;

        let first_attempt = services
            .disbursements
            .list_for_loan(&fixture.operator(), loan.id)
            .await
            .unwrap()
            .remove(0);
        let first_conversation = first_attempt
            .conversation_id
            .clone()
            .expect("accepted payout stores its conversation id");

        let failure = failed_result_for(&originator, &first_conversation);
        services.reconciler.on_result(&failure).await.unwrap();

        let retry = services
            .disbursements
            .disburse(&fixture.operator(), loan.id)
            .await
            .unwrap();
        assert_ne!(retry.provider_conversation_id, first_conversation);

        // The provider delivers at least once; attempt one reports again
        let redelivered = services.reconciler.on_result(&failure).await.unwrap();
        assert_eq!(
            redelivered,
            ReconcileOutcome::AlreadyResolved {
                payout_id: first_attempt.id,
                status: PayoutStatus::Failed,
            }
        );

        let late_timeout = services
            .reconciler
            .on_timeout(&TimeoutPayload {
                originator_conversation_id: originator.clone(),
                conversation_id: Some(first_conversation.clone()),
            })
            .await
            .unwrap();
        assert_eq!(
            late_timeout,
            ReconcileOutcome::AlreadyResolved {
                payout_id: first_attempt.id,
                status: PayoutStatus::Failed,
            }
        );

        let payouts = services
            .disbursements
            .list_for_loan(&fixture.operator(), loan.id)
            .await
            .unwrap();
        assert_eq!(payouts[0].id, retry.payout_id);
        assert_eq!(payouts[0].status, PayoutStatus::Pending);

        let in_flight = reload(&services, &fixture, loan.id).await;
        assert_eq!(in_flight.status, LoanStatus::DisbursementPending);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_transport_failure_reverts_to_approved() {
        let pool = setup_test_db().await;
        let provider = FakeProvider::new();
        let services = services(&pool, provider.clone());
        let fixture = seed(&pool, 1, Decimal::new(50_000, 0)).await;

        provider.push_reply(B2cReply::Fail(TransportError::Timeout));

        let loan = services
            .loans
            .request_loan(
                &fixture.borrower(),
                CreateLoanRequest {
                    amount: Decimal::new(10_000, 0),
                    duration_months: 2,
                },
            )
            .await
            .unwrap();
        let outcome = services
            .loans
            .approve(&fixture.approver(), loan.id)
            .await
            .unwrap();

        assert!(outcome.handed_off);
        assert!(outcome.disbursement.is_none());
        assert!(outcome.disbursement_error.is_some());
        assert_eq!(outcome.loan.status, LoanStatus::Approved);
        assert_eq!(count_pending_payouts(&pool, loan.id).await, 0);

        let retry = services
            .disbursements
            .disburse(&fixture.operator(), loan.id)
            .await
            .unwrap();

        let payouts = services
            .disbursements
            .list_for_loan(&fixture.operator(), loan.id)
            .await
            .unwrap();
        assert_eq!(payouts.len(), 2);
        assert_eq!(payouts[0].id, retry.payout_id);
        assert_eq!(payouts[0].status, PayoutStatus::Pending);
        assert_eq!(payouts[1].status, PayoutStatus::Failed);
        assert_eq!(
            payouts[0].originator_conversation_id,
            payouts[1].originator_conversation_id
        );
        assert_eq!(count_pending_payouts(&pool, loan.id).await, 1);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_non_zero_acknowledgement_is_a_failure() {
        let pool = setup_test_db().await;
        let provider = FakeProvider::new();
        let services = services(&pool, provider.clone());
        let fixture = seed(&pool, 1, Decimal::new(50_000, 0)).await;

        provider.push_reply(B2cReply::Reject("500.002.1001"));

        let loan = services
            .loans
            .request_loan(
                &fixture.borrower(),
                CreateLoanRequest {
                    amount: Decimal::new(3_000, 0),
                    duration_months: 1,
                },
            )
            .await
            .unwrap();
        let outcome = services
            .loans
            .approve(&fixture.approver(), loan.id)
            .await
            .unwrap();
        assert_eq!(outcome.loan.status, LoanStatus::Approved);

        provider.push_reply(B2cReply::Reject("500.002.1001"));
        let retry = services
            .disbursements
            .disburse(&fixture.operator(), loan.id)
            .await;
        assert!(matches!(
            retry,
            Err(LendingError::Transport(TransportError::Rejected { .. }))
        ));
        assert_eq!(count_pending_payouts(&pool, loan.id).await, 0);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_disburse_refused_while_in_flight() {
        let pool = setup_test_db().await;
        let services = services(&pool, FakeProvider::new());
        let fixture = seed(&pool, 1, Decimal::new(50_000, 0)).await;
        let (loan, _) = approved_loan(&services, &fixture).await;

        let second = services
            .disbursements
            .disburse(&fixture.operator(), loan.id)
            .await;
        assert!(matches!(second, Err(LendingError::InvalidTransition(_))));
        assert_eq!(count_pending_payouts(&pool, loan.id).await, 1);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_unknown_correlation_id_is_acknowledged() {
        let pool = setup_test_db().await;
        let services = services(&pool, FakeProvider::new());

        let unknown = Uuid::new_v4().to_string();
        let result = services
            .reconciler
            .on_result(&success_result(&unknown))
            .await
            .unwrap();
        assert_eq!(result, ReconcileOutcome::Unmatched);

        let timed_out = services
            .reconciler
            .on_timeout(&timeout(&unknown))
            .await
            .unwrap();
        assert_eq!(timed_out, ReconcileOutcome::Unmatched);
    }
}
