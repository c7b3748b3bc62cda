// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Payment gateway seam.
//!
//! Handlers and the background poller talk to the gateway only through
//! [`PaymentGateway`], which keeps the Paystack client swappable in tests.

pub mod paystack;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::{PaymentStatus, SettlementStatus};

pub use paystack::PaystackClient;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment gateway is not configured")]
    NotConfigured,

    #[error("payment gateway request failed: {0}")]
    Request(String),

    /// The gateway answered with an error status or `status: false`.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("payment gateway response was invalid: {0}")]
    InvalidResponse(String),
}

/// Hosted payment page members pay a bill through.
#[derive(Debug, Clone)]
pub struct PaymentPageRequest {
    pub name: String,
    pub amount: u64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentPage {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub amount: u64,
    pub currency: String,
}

/// Result of verifying a charge by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedTransaction {
    pub reference: String,
    pub status: PaymentStatus,
    /// Raw gateway status string, kept for logs.
    pub gateway_status: String,
    pub amount: u64,
    pub currency: String,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct TransferRecipientRequest {
    pub name: String,
    pub account_number: String,
    pub bank_code: String,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub amount: u64,
    pub currency: String,
    pub recipient_code: String,
    pub reason: String,
    pub reference: String,
}

/// Transfer state as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub reference: String,
    pub transfer_code: Option<String>,
    pub status: SettlementStatus,
    pub gateway_status: String,
    pub failure_reason: Option<String>,
}

/// One page of the gateway's bank directory, passed through as-is.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct BankPage {
    #[schema(value_type = Vec<Object>)]
    pub data: serde_json::Value,
    #[schema(value_type = Object)]
    pub meta: serde_json::Value,
}

/// Webhook notification after signature verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// A charge completed.
    ChargeSuccess { reference: String },
    /// A transfer changed state.
    TransferUpdate(Transfer),
    /// Any event this service does not act on.
    Ignored { event: String },
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Whether credentials are present.
    fn is_configured(&self) -> bool;

    async fn create_payment_page(
        &self,
        request: &PaymentPageRequest,
    ) -> Result<PaymentPage, GatewayError>;

    async fn verify_transaction(&self, reference: &str)
        -> Result<VerifiedTransaction, GatewayError>;

    /// Returns the recipient code.
    async fn create_transfer_recipient(
        &self,
        request: &TransferRecipientRequest,
    ) -> Result<String, GatewayError>;

    async fn initiate_transfer(&self, request: &TransferRequest) -> Result<Transfer, GatewayError>;

    async fn fetch_transfer(&self, reference: &str) -> Result<Transfer, GatewayError>;

    async fn list_banks(&self, cursor: Option<&str>) -> Result<BankPage, GatewayError>;

    /// Check a webhook signature over the raw request body.
    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool;

    /// Decode a verified webhook body.
    fn parse_webhook(&self, body: &[u8]) -> Result<GatewayEvent, GatewayError>;
}
