//! Payment provider integration
//!
//! Contains the wire model and the transport used for B2C payouts and
//! account balance inquiries.

mod client;
mod model;

pub use client::{HttpProviderClient, ProviderTransport, TransportError};
pub use model::{
    B2cAcknowledgement, B2cRequest, BalanceInquiryAcknowledgement, BalanceInquiryRequest,
    CallbackAck, CallbackEnvelope, ResultParameter, ResultParameters, ResultPayload,
    TimeoutPayload,
};
