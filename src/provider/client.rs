//! Provider transport
//!
//! [`ProviderTransport`] is the seam the disbursement and balance services
//! call through. [`HttpProviderClient`] is the production implementation.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::RwLock;

use super::model::*;
use crate::config::ProviderConfig;

/// Outbound provider call failures, all treated as a synchronous failure of
/// the attempt. After `Timeout` or `Decode` the provider may still have
/// accepted the request; the attempt is released either way.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("provider rejected the request ({code}): {description}")]
    Rejected { code: String, description: String },

    #[error("unreadable provider response: {0}")]
    Decode(String),

    #[error("could not obtain access token: {0}")]
    Auth(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_decode() {
            TransportError::Decode(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

/// Black-box contract of the payment provider
#[async_trait]
pub trait ProviderTransport: Send + Sync {
    async fn initiate_b2c(&self, request: &B2cRequest)
        -> Result<B2cAcknowledgement, TransportError>;

    async fn initiate_balance_inquiry(
        &self,
        request: &BalanceInquiryRequest,
    ) -> Result<BalanceInquiryAcknowledgement, TransportError>;
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Refresh this long before the provider-declared expiry
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// reqwest-backed transport with OAuth client-credentials auth
pub struct HttpProviderClient {
    http: reqwest::Client,
    config: ProviderConfig,
    token: RwLock<Option<CachedToken>>,
}

impl HttpProviderClient {
    pub fn new(config: ProviderConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            http,
            config,
            token: RwLock::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, TransportError> {
        if let Some(token) = self.token.read().await.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.value.clone());
            }
        }

        let mut slot = self.token.write().await;
        // Another task may have refreshed while we waited for the lock
        if let Some(token) = slot.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.value.clone());
            }
        }

        let url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.config.base_url
        );
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Auth(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let body: AccessTokenBody = response
            .json()
            .await
            .map_err(|e| TransportError::Auth(e.to_string()))?;
        let ttl = body.expires_in.parse::<i64>().unwrap_or(3599);

        let token = CachedToken {
            value: body.access_token,
            expires_at: Utc::now() + Duration::seconds((ttl - TOKEN_EXPIRY_MARGIN_SECS).max(0)),
        };
        tracing::debug!(expires_at = %token.expires_at, "Refreshed provider access token");

        let value = token.value.clone();
        *slot = Some(token);
        Ok(value)
    }

    async fn post<B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(u16, AcknowledgementBody), TransportError> {
        let token = self.access_token().await?;
        let url = format!("{}{}", self.config.base_url, path);

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let ack: AcknowledgementBody = response.json().await?;
        Ok((status.as_u16(), ack))
    }
}

#[async_trait]
impl ProviderTransport for HttpProviderClient {
    async fn initiate_b2c(
        &self,
        request: &B2cRequest,
    ) -> Result<B2cAcknowledgement, TransportError> {
        let body = B2cBody {
            originator_conversation_id: &request.originator_conversation_id,
            initiator_name: &request.initiator_name,
            security_credential: &request.security_credential,
            command_id: "BusinessPayment",
            amount: whole_units(request.amount),
            party_a: &request.short_code,
            party_b: &request.payee_msisdn,
            remarks: &request.remarks,
            queue_timeout_url: &request.timeout_callback_url,
            result_url: &request.result_callback_url,
            occasion: "",
        };

        let (http_status, ack) = self.post("/mpesa/b2c/v3/paymentrequest", &body).await?;

        tracing::info!(
            originator_conversation_id = %request.originator_conversation_id,
            conversation_id = %ack.conversation_id,
            response_code = %ack.response_code,
            "B2C request acknowledged"
        );

        Ok(B2cAcknowledgement {
            http_status,
            conversation_id: ack.conversation_id,
            originator_conversation_id: ack
                .originator_conversation_id
                .unwrap_or_else(|| request.originator_conversation_id.clone()),
            response_code: ack.response_code,
            response_description: ack.response_description,
        })
    }

    async fn initiate_balance_inquiry(
        &self,
        request: &BalanceInquiryRequest,
    ) -> Result<BalanceInquiryAcknowledgement, TransportError> {
        let body = BalanceBody {
            initiator: &request.initiator_name,
            security_credential: &request.security_credential,
            command_id: "AccountBalance",
            party_a: &request.short_code,
            identifier_type: "4",
            remarks: &request.remarks,
            queue_timeout_url: &request.timeout_callback_url,
            result_url: &request.result_callback_url,
        };

        let (http_status, ack) = self.post("/mpesa/accountbalance/v1/query", &body).await?;

        if ack.response_code != "0" {
            return Err(TransportError::Rejected {
                code: ack.response_code,
                description: ack.response_description,
            });
        }

        Ok(BalanceInquiryAcknowledgement {
            http_status,
            conversation_id: ack.conversation_id,
            originator_conversation_id: ack.originator_conversation_id,
        })
    }
}

/// The provider only pays whole currency units
fn whole_units(amount: Decimal) -> String {
    amount.trunc().normalize().to_string()
}
