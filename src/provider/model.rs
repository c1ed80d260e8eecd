//! Wire types for the mobile-money provider API
//!
//! Outbound request/acknowledgement shapes used by [`super::ProviderTransport`]
//! and the inbound result/timeout callback bodies.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// Outbound requests
// ============================================================================

/// Business-to-customer payment request
#[derive(Debug, Clone, PartialEq)]
pub struct B2cRequest {
    /// Idempotency token; the provider dedupes on it
    pub originator_conversation_id: String,
    pub amount: Decimal,
    pub payee_msisdn: String,
    pub short_code: String,
    pub initiator_name: String,
    pub security_credential: String,
    pub result_callback_url: String,
    pub timeout_callback_url: String,
    pub remarks: String,
}

/// Synchronous acknowledgement of an accepted B2C request
#[derive(Debug, Clone, PartialEq)]
pub struct B2cAcknowledgement {
    pub http_status: u16,
    pub conversation_id: String,
    pub originator_conversation_id: String,
    pub response_code: String,
    pub response_description: String,
}

impl B2cAcknowledgement {
    pub fn is_accepted(&self) -> bool {
        self.response_code == "0"
    }
}

/// Account balance inquiry request
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceInquiryRequest {
    pub short_code: String,
    pub initiator_name: String,
    pub security_credential: String,
    pub result_callback_url: String,
    pub timeout_callback_url: String,
    pub remarks: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BalanceInquiryAcknowledgement {
    pub http_status: u16,
    pub conversation_id: String,
    pub originator_conversation_id: Option<String>,
}

/// JSON body of `POST /mpesa/b2c/v3/paymentrequest`
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct B2cBody<'a> {
    #[serde(rename = "OriginatorConversationID")]
    pub originator_conversation_id: &'a str,
    pub initiator_name: &'a str,
    pub security_credential: &'a str,
    #[serde(rename = "CommandID")]
    pub command_id: &'static str,
    pub amount: String,
    pub party_a: &'a str,
    pub party_b: &'a str,
    pub remarks: &'a str,
    #[serde(rename = "QueueTimeOutURL")]
    pub queue_timeout_url: &'a str,
    #[serde(rename = "ResultURL")]
    pub result_url: &'a str,
    pub occasion: &'a str,
}

/// JSON body of `POST /mpesa/accountbalance/v1/query`
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct BalanceBody<'a> {
    pub initiator: &'a str,
    pub security_credential: &'a str,
    #[serde(rename = "CommandID")]
    pub command_id: &'static str,
    pub party_a: &'a str,
    pub identifier_type: &'static str,
    pub remarks: &'a str,
    #[serde(rename = "QueueTimeOutURL")]
    pub queue_timeout_url: &'a str,
    #[serde(rename = "ResultURL")]
    pub result_url: &'a str,
}

/// Synchronous acknowledgement body shared by B2C and balance requests
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct AcknowledgementBody {
    #[serde(rename = "ConversationID")]
    pub conversation_id: String,
    #[serde(rename = "OriginatorConversationID", default)]
    pub originator_conversation_id: Option<String>,
    #[serde(deserialize_with = "code_from_number_or_string")]
    pub response_code: String,
    #[serde(default)]
    pub response_description: String,
}

/// OAuth token response; `expires_in` arrives as a string
#[derive(Debug, Deserialize)]
pub(crate) struct AccessTokenBody {
    pub access_token: String,
    #[serde(deserialize_with = "code_from_number_or_string")]
    pub expires_in: String,
}

// ============================================================================
// Inbound callbacks
// ============================================================================

/// Result callback body
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ResultPayload {
    #[serde(default)]
    pub result_type: i32,
    #[serde(deserialize_with = "code_from_number_or_string")]
    pub result_code: String,
    #[serde(default)]
    pub result_desc: String,
    #[serde(rename = "OriginatorConversationID")]
    pub originator_conversation_id: String,
    #[serde(rename = "ConversationID", default)]
    pub conversation_id: Option<String>,
    #[serde(rename = "TransactionID", default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub result_parameters: Option<ResultParameters>,
}

impl ResultPayload {
    pub fn is_success(&self) -> bool {
        self.result_code == "0"
    }

    /// Look up a result parameter value by key
    pub fn parameter(&self, key: &str) -> Option<&serde_json::Value> {
        self.result_parameters
            .as_ref()?
            .result_parameter
            .iter()
            .find(|p| p.key == key)
            .and_then(|p| p.value.as_ref())
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ResultParameters {
    /// The provider sends a bare object when there is a single parameter
    #[serde(deserialize_with = "one_or_many")]
    pub result_parameter: Vec<ResultParameter>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ResultParameter {
    pub key: String,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

/// Timeout callback body
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TimeoutPayload {
    #[serde(rename = "OriginatorConversationID")]
    pub originator_conversation_id: String,
    #[serde(rename = "ConversationID", default)]
    pub conversation_id: Option<String>,
}

/// Callback bodies arrive either flat or wrapped in `{"Result": {...}}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CallbackEnvelope<T> {
    Wrapped {
        #[serde(rename = "Result")]
        result: T,
    },
    Flat(T),
}

impl<T> CallbackEnvelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            CallbackEnvelope::Wrapped { result } => result,
            CallbackEnvelope::Flat(inner) => inner,
        }
    }
}

/// Acknowledgement the provider expects from our webhook endpoints
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallbackAck {
    pub result_code: i32,
    pub result_desc: &'static str,
}

impl CallbackAck {
    pub fn accepted() -> Self {
        Self {
            result_code: 0,
            result_desc: "Accepted",
        }
    }
}

fn code_from_number_or_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        Number(i64),
        Text(String),
    }

    Ok(match Code::deserialize(deserializer)? {
        Code::Number(n) => n.to_string(),
        Code::Text(s) => s.trim().to_string(),
    })
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<ResultParameter>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<ResultParameter>),
        One(ResultParameter),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(items) => items,
        OneOrMany::One(item) => vec![item],
    })
}
