//! Balance ledger - inquiry, parsing, and snapshot persistence

use std::sync::Arc;

use sqlx::PgPool;
use uuid::Uuid;

use super::model::{AccountBalanceSnapshot, BalanceInquiry, BalanceOutcome};
use super::parser::balances_from_result;
use crate::config::ProviderConfig;
use crate::error::LendingError;
use crate::provider::{BalanceInquiryRequest, ProviderTransport, ResultPayload, TimeoutPayload};

/// Records snapshots of provider-held funds for reconciliation
pub struct BalanceService {
    db_pool: PgPool,
    transport: Arc<dyn ProviderTransport>,
    provider: ProviderConfig,
}

impl BalanceService {
    pub fn new(
        db_pool: PgPool,
        transport: Arc<dyn ProviderTransport>,
        provider: ProviderConfig,
    ) -> Self {
        Self {
            db_pool,
            transport,
            provider,
        }
    }

    /// Ask the provider for the current balance; the figures arrive on the result callback
    pub async fn request_snapshot(&self, tenant_id: Uuid) -> Result<BalanceInquiry, LendingError> {
        let request = BalanceInquiryRequest {
            short_code: self.provider.short_code.clone(),
            initiator_name: self.provider.initiator_name.clone(),
            security_credential: self.provider.security_credential.clone(),
            result_callback_url: self.provider.balance_result_url(),
            timeout_callback_url: self.provider.balance_timeout_url(),
            remarks: "Balance reconciliation".to_string(),
        };

        let ack = self.transport.initiate_balance_inquiry(&request).await?;

        let inquiry = sqlx::query_as::<_, BalanceInquiry>(
            r#"
            INSERT INTO balance_inquiries (id, tenant_id, conversation_id, originator_conversation_id, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(&ack.conversation_id)
        .bind(&ack.originator_conversation_id)
        .fetch_one(&self.db_pool)
        .await?;

        tracing::info!(
            tenant_id = %tenant_id,
            conversation_id = %inquiry.conversation_id,
            "Balance inquiry submitted"
        );

        Ok(inquiry)
    }

    /// Parse a balance result and persist it as an immutable snapshot.
    ///
    /// A malformed payload is returned as `MalformedBalancePayload` and nothing
    /// is stored.
    pub async fn record_snapshot(
        &self,
        payload: &ResultPayload,
    ) -> Result<BalanceOutcome, LendingError> {
        let Some(inquiry) = self
            .find_inquiry(
                payload.conversation_id.as_deref(),
                &payload.originator_conversation_id,
            )
            .await?
        else {
            tracing::warn!(
                originator_conversation_id = %payload.originator_conversation_id,
                conversation_id = ?payload.conversation_id,
                "Balance result does not match any inquiry"
            );
            return Ok(BalanceOutcome::Unmatched);
        };

        if !payload.is_success() {
            tracing::warn!(
                tenant_id = %inquiry.tenant_id,
                result_code = %payload.result_code,
                result_desc = %payload.result_desc,
                "Balance inquiry failed at provider"
            );
            return Ok(BalanceOutcome::ProviderFailed {
                result_code: payload.result_code.clone(),
                result_desc: payload.result_desc.clone(),
            });
        }

        let balances = balances_from_result(payload).map_err(|e| {
            tracing::error!(
                tenant_id = %inquiry.tenant_id,
                conversation_id = %inquiry.conversation_id,
                error = %e,
                "Malformed balance payload"
            );
            LendingError::MalformedBalancePayload(e)
        })?;

        let inserted = sqlx::query_as::<_, AccountBalanceSnapshot>(
            r#"
            INSERT INTO account_balance_snapshots (
                id, tenant_id, result_type, result_code, result_desc,
                originator_conversation_id, conversation_id, provider_transaction_id,
                working_account_balance, utility_account_balance, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
            ON CONFLICT (tenant_id, conversation_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(inquiry.tenant_id)
        .bind(payload.result_type)
        .bind(&payload.result_code)
        .bind(&payload.result_desc)
        .bind(&payload.originator_conversation_id)
        .bind(&inquiry.conversation_id)
        .bind(&payload.transaction_id)
        .bind(balances.working_account_balance)
        .bind(balances.utility_account_balance)
        .fetch_optional(&self.db_pool)
        .await?;

        if let Some(snapshot) = inserted {
            tracing::info!(
                tenant_id = %snapshot.tenant_id,
                working = %snapshot.working_account_balance,
                utility = %snapshot.utility_account_balance,
                "Account balance snapshot recorded"
            );
            return Ok(BalanceOutcome::Recorded(snapshot));
        }

        let existing = sqlx::query_as::<_, AccountBalanceSnapshot>(
            "SELECT * FROM account_balance_snapshots WHERE tenant_id = $1 AND conversation_id = $2",
        )
        .bind(inquiry.tenant_id)
        .bind(&inquiry.conversation_id)
        .fetch_one(&self.db_pool)
        .await?;

        tracing::debug!(
            conversation_id = %existing.conversation_id,
            "Duplicate balance result ignored"
        );
        Ok(BalanceOutcome::Duplicate(existing))
    }

    /// The provider gave up on an inquiry; nothing to persist
    pub async fn on_timeout(&self, payload: &TimeoutPayload) -> Result<(), LendingError> {
        let inquiry = self
            .find_inquiry(
                payload.conversation_id.as_deref(),
                &payload.originator_conversation_id,
            )
            .await?;

        tracing::warn!(
            tenant_id = ?inquiry.map(|i| i.tenant_id),
            originator_conversation_id = %payload.originator_conversation_id,
            "Balance inquiry timed out at provider"
        );
        Ok(())
    }

    pub async fn latest_snapshot(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<AccountBalanceSnapshot>, LendingError> {
        let snapshot = sqlx::query_as::<_, AccountBalanceSnapshot>(
            r#"
            SELECT * FROM account_balance_snapshots
            WHERE tenant_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(snapshot)
    }

    /// Tenants with at least one organization, for scheduled polling
    pub async fn active_tenants(&self) -> Result<Vec<Uuid>, LendingError> {
        let tenants = sqlx::query_as::<_, (Uuid,)>(
            "SELECT DISTINCT tenant_id FROM organizations ORDER BY tenant_id",
        )
        .fetch_all(&self.db_pool)
        .await?;

        Ok(tenants.into_iter().map(|(id,)| id).collect())
    }

    async fn find_inquiry(
        &self,
        conversation_id: Option<&str>,
        originator_conversation_id: &str,
    ) -> Result<Option<BalanceInquiry>, sqlx::Error> {
        sqlx::query_as::<_, BalanceInquiry>(
            r#"
            SELECT * FROM balance_inquiries
            WHERE conversation_id = $1 OR originator_conversation_id = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(conversation_id)
        .bind(originator_conversation_id)
        .fetch_optional(&self.db_pool)
        .await
    }
}
