//! Shared fixtures for database-backed tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use salary_advance_server::auth::{Identity, Role};
use salary_advance_server::balance::BalanceService;
use salary_advance_server::config::ProviderConfig;
use salary_advance_server::db;
use salary_advance_server::disbursement::{CallbackReconciler, DisbursementService};
use salary_advance_server::loan::LoanService;
use salary_advance_server::provider::{
    B2cAcknowledgement, B2cRequest, BalanceInquiryAcknowledgement, BalanceInquiryRequest,
    ProviderTransport, TransportError,
};

/// Helper to create a migrated test database pool
pub async fn setup_test_db() -> PgPool {
    let database_url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgresql://localhost/salary_advance_test".to_string());

    let pool = db::pool_options(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    db::run_migrations(&pool).await.expect("Failed to migrate test database");
    pool
}

pub fn provider_config() -> ProviderConfig {
    ProviderConfig {
        base_url: "http://provider.invalid".to_string(),
        consumer_key: "key".to_string(),
        consumer_secret: "secret".to_string(),
        short_code: "600000".to_string(),
        initiator_name: "testapi".to_string(),
        security_credential: "credential".to_string(),
        callback_base_url: "http://localhost:3001".to_string(),
        request_timeout: Duration::from_secs(5),
    }
}

/// What the fake provider should answer to the next B2C request
pub enum B2cReply {
    Accept,
    Reject(&'static str),
    Fail(TransportError),
}

/// In-process provider that records calls and answers from a script
#[derive(Default)]
pub struct FakeProvider {
    pub b2c_requests: Mutex<Vec<B2cRequest>>,
    pub balance_calls: AtomicUsize,
    script: Mutex<VecDeque<B2cReply>>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_reply(&self, reply: B2cReply) {
        self.script.lock().unwrap().push_back(reply);
    }

    pub fn b2c_count(&self) -> usize {
        self.b2c_requests.lock().unwrap().len()
    }

    pub fn last_originator_id(&self) -> Option<String> {
        self.b2c_requests
            .lock()
            .unwrap()
            .last()
            .map(|r| r.originator_conversation_id.clone())
    }
}

#[async_trait]
impl ProviderTransport for FakeProvider {
    async fn initiate_b2c(
        &self,
        request: &B2cRequest,
    ) -> Result<B2cAcknowledgement, TransportError> {
        self.b2c_requests.lock().unwrap().push(request.clone());
        let reply = self.script.lock().unwrap().pop_front().unwrap_or(B2cReply::Accept);

        match reply {
            B2cReply::Accept => Ok(B2cAcknowledgement {
                http_status: 200,
                conversation_id: format!("AG_{}", Uuid::new_v4().simple()),
                originator_conversation_id: request.originator_conversation_id.clone(),
                response_code: "0".to_string(),
                response_description: "Accept the service request successfully.".to_string(),
            }),
            B2cReply::Reject(code) => Ok(B2cAcknowledgement {
                http_status: 200,
                conversation_id: String::new(),
                originator_conversation_id: request.originator_conversation_id.clone(),
                response_code: code.to_string(),
                response_description: "Rejected".to_string(),
            }),
            B2cReply::Fail(err) => Err(err),
        }
    }

    async fn initiate_balance_inquiry(
        &self,
        _request: &BalanceInquiryRequest,
    ) -> Result<BalanceInquiryAcknowledgement, TransportError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        Ok(BalanceInquiryAcknowledgement {
            http_status: 200,
            conversation_id: format!("AG_{}", Uuid::new_v4().simple()),
            originator_conversation_id: Some(Uuid::new_v4().to_string()),
        })
    }
}

/// One tenant with one organization and one borrower
pub struct Fixture {
    pub tenant_id: Uuid,
    pub organization_id: Uuid,
    pub borrower_id: Uuid,
}

impl Fixture {
    pub fn borrower(&self) -> Identity {
        Identity {
            user_id: self.borrower_id,
            tenant_id: self.tenant_id,
            organization_id: Some(self.organization_id),
            role: Role::Employee,
        }
    }

    pub fn approver(&self) -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            tenant_id: self.tenant_id,
            organization_id: Some(self.organization_id),
            role: Role::Manager,
        }
    }

    pub fn operator(&self) -> Identity {
        Identity {
            user_id: Uuid::new_v4(),
            tenant_id: self.tenant_id,
            organization_id: None,
            role: Role::Admin,
        }
    }
}

/// Seed an organization needing `approval_steps` approvals and a borrower earning `salary`
pub async fn seed(pool: &PgPool, approval_steps: i32, salary: Decimal) -> Fixture {
    let tenant_id = Uuid::new_v4();
    let organization_id = Uuid::new_v4();
    let borrower_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO organizations (id, tenant_id, name, approval_steps, loan_limit_multiplier, interest_rate)
        VALUES ($1, $2, 'Acme Ltd', $3, 0.5, 5)
        "#,
    )
    .bind(organization_id)
    .bind(tenant_id)
    .bind(approval_steps)
    .execute(pool)
    .await
    .expect("Failed to seed organization");

    sqlx::query(
        r#"
        INSERT INTO employees (id, tenant_id, organization_id, user_id, phone_number, gross_salary)
        VALUES ($1, $2, $3, $4, '254708374149', $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(organization_id)
    .bind(borrower_id)
    .bind(salary)
    .execute(pool)
    .await
    .expect("Failed to seed employee");

    Fixture {
        tenant_id,
        organization_id,
        borrower_id,
    }
}

pub struct Services {
    pub loans: Arc<LoanService>,
    pub disbursements: Arc<DisbursementService>,
    pub reconciler: CallbackReconciler,
    pub balances: BalanceService,
}

pub fn services(pool: &PgPool, provider: Arc<FakeProvider>) -> Services {
    let transport: Arc<dyn ProviderTransport> = provider;
    let disbursements = Arc::new(DisbursementService::new(
        pool.clone(),
        transport.clone(),
        provider_config(),
    ));
    Services {
        loans: Arc::new(LoanService::new(pool.clone(), disbursements.clone())),
        disbursements,
        reconciler: CallbackReconciler::new(pool.clone()),
        balances: BalanceService::new(pool.clone(), transport, provider_config()),
    }
}

pub async fn count_pending_payouts(pool: &PgPool, loan_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM loan_payouts WHERE loan_id = $1 AND status = 'pending'")
        .bind(loan_id)
        .fetch_one(pool)
        .await
        .expect("Failed to count payouts")
}
