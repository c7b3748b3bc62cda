// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Paystack REST integration: payment pages, charge verification, transfers
//! and the bank directory.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response};
use serde_json::{json, Value};
use sha2::Sha512;
use tracing::{debug, warn};
use url::Url;

use super::{
    BankPage, GatewayError, GatewayEvent, PaymentGateway, PaymentPage, PaymentPageRequest,
    Transfer, TransferRecipientRequest, TransferRequest, VerifiedTransaction,
};
use crate::config::{env_optional, env_or_default, PAYSTACK_BASE_URL_ENV, PAYSTACK_SECRET_KEY_ENV};
use crate::storage::{PaymentStatus, SettlementStatus};

const DEFAULT_BASE_URL: &str = "https://api.paystack.co";
const BANK_COUNTRY: &str = "nigeria";
const BANKS_PER_PAGE: &str = "20";

type HmacSha512 = Hmac<Sha512>;

#[derive(Debug, Clone)]
pub struct PaystackClient {
    base_url: String,
    secret_key: Option<String>,
    http: Client,
}

impl PaystackClient {
    /// Build from `PAYSTACK_SECRET_KEY` and `PAYSTACK_BASE_URL`.
    ///
    /// A missing secret key yields an unconfigured client whose calls fail
    /// with [`GatewayError::NotConfigured`].
    pub fn from_env() -> Result<Self, GatewayError> {
        Self::new(
            &env_or_default(PAYSTACK_BASE_URL_ENV, DEFAULT_BASE_URL),
            env_optional(PAYSTACK_SECRET_KEY_ENV),
        )
    }

    /// Client without credentials; every gateway call fails with
    /// [`GatewayError::NotConfigured`].
    pub fn unconfigured() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            secret_key: None,
            http: Client::new(),
        }
    }

    pub fn new(base_url: &str, secret_key: Option<String>) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| GatewayError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key,
            http,
        })
    }

    fn secret(&self) -> Result<&str, GatewayError> {
        self.secret_key.as_deref().ok_or(GatewayError::NotConfigured)
    }

    async fn get_json(&self, path: &str) -> Result<Value, GatewayError> {
        self.send(Method::GET, &format!("{}{path}", self.base_url), None)
            .await
    }

    async fn post_json(&self, path: &str, payload: &Value) -> Result<Value, GatewayError> {
        self.send(Method::POST, &format!("{}{path}", self.base_url), Some(payload))
            .await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        payload: Option<&Value>,
    ) -> Result<Value, GatewayError> {
        let secret = self.secret()?;
        let mut request = self
            .http
            .request(method.clone(), url)
            .bearer_auth(secret)
            .header("Content-Type", "application/json");
        if let Some(payload) = payload {
            request = request.json(payload);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Request(format!("{method} {url} failed: {e}")))?;

        parse_envelope(response).await
    }
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    fn is_configured(&self) -> bool {
        self.secret_key.is_some()
    }

    async fn create_payment_page(
        &self,
        request: &PaymentPageRequest,
    ) -> Result<PaymentPage, GatewayError> {
        let payload = json!({
            "name": request.name,
            "amount": request.amount,
            "description": request.description,
        });
        let data = self.post_json("/page", &payload).await?;
        page_from_data(&data)
    }

    async fn verify_transaction(
        &self,
        reference: &str,
    ) -> Result<VerifiedTransaction, GatewayError> {
        let data = self
            .get_json(&format!("/transaction/verify/{}", encode_segment(reference)))
            .await?;
        debug!(reference = %reference, status = ?data.get("status"), "Paystack verify response");
        transaction_from_data(&data)
    }

    async fn create_transfer_recipient(
        &self,
        request: &TransferRecipientRequest,
    ) -> Result<String, GatewayError> {
        let payload = json!({
            "type": "nuban",
            "name": request.name,
            "account_number": request.account_number,
            "bank_code": request.bank_code,
            "currency": request.currency,
        });
        let data = self.post_json("/transferrecipient", &payload).await?;
        required_str(&data, "recipient_code").map(str::to_string)
    }

    async fn initiate_transfer(&self, request: &TransferRequest) -> Result<Transfer, GatewayError> {
        let payload = json!({
            "source": "balance",
            "amount": request.amount,
            "currency": request.currency,
            "recipient": request.recipient_code,
            "reason": request.reason,
            "reference": request.reference,
        });
        let data = self.post_json("/transfer", &payload).await?;
        transfer_from_data(&data, &request.reference)
    }

    async fn fetch_transfer(&self, reference: &str) -> Result<Transfer, GatewayError> {
        let data = self
            .get_json(&format!("/transfer/verify/{}", encode_segment(reference)))
            .await?;
        transfer_from_data(&data, reference)
    }

    async fn list_banks(&self, cursor: Option<&str>) -> Result<BankPage, GatewayError> {
        let mut params = vec![
            ("country", BANK_COUNTRY),
            ("use_cursor", "true"),
            ("perPage", BANKS_PER_PAGE),
        ];
        if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
            params.push(("next", cursor));
        }
        let url = Url::parse_with_params(&format!("{}/bank", self.base_url), &params)
            .map_err(|e| GatewayError::Request(format!("invalid bank list URL: {e}")))?;

        let secret = self.secret()?;
        let response = self
            .http
            .get(url)
            .bearer_auth(secret)
            .send()
            .await
            .map_err(|e| GatewayError::Request(format!("GET /bank failed: {e}")))?;

        let body = read_body(response).await?;
        Ok(BankPage {
            data: body.get("data").cloned().unwrap_or_else(|| json!([])),
            meta: body.get("meta").cloned().unwrap_or_else(|| json!({})),
        })
    }

    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        match self.secret_key.as_deref() {
            Some(secret) => verify_signature(secret, body, signature),
            None => false,
        }
    }

    fn parse_webhook(&self, body: &[u8]) -> Result<GatewayEvent, GatewayError> {
        parse_webhook_event(body)
    }
}

/// Read a Paystack envelope and return its `data` member.
async fn parse_envelope(response: Response) -> Result<Value, GatewayError> {
    let body = read_body(response).await?;
    body.get("data")
        .cloned()
        .ok_or_else(|| GatewayError::InvalidResponse("missing data in response".to_string()))
}

/// Read a Paystack body, turning error statuses and `status: false` into
/// [`GatewayError::Rejected`] carrying the gateway's message.
async fn read_body(response: Response) -> Result<Value, GatewayError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| GatewayError::Request(format!("failed to read response body: {e}")))?;
    let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

    let accepted = body.get("status").and_then(Value::as_bool).unwrap_or(false);
    if !status.is_success() || !accepted {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("gateway returned {status}"));
        warn!(status = %status, message = %message, "Paystack rejected request");
        return Err(GatewayError::Rejected {
            status: status.as_u16(),
            message,
        });
    }

    Ok(body)
}

fn page_from_data(data: &Value) -> Result<PaymentPage, GatewayError> {
    Ok(PaymentPage {
        name: required_str(data, "name")?.to_string(),
        slug: required_str(data, "slug")?.to_string(),
        description: data
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
        amount: required_u64(data, "amount")?,
        currency: required_str(data, "currency")?.to_string(),
    })
}

fn transaction_from_data(data: &Value) -> Result<VerifiedTransaction, GatewayError> {
    let gateway_status = required_str(data, "status")?;
    Ok(VerifiedTransaction {
        reference: required_str(data, "reference")?.to_string(),
        status: map_charge_status(gateway_status),
        gateway_status: gateway_status.to_string(),
        amount: required_u64(data, "amount")?,
        currency: required_str(data, "currency")?.to_string(),
        paid_at: data
            .get("paid_at")
            .or_else(|| data.get("paidAt"))
            .and_then(Value::as_str)
            .and_then(parse_timestamp),
    })
}

fn transfer_from_data(data: &Value, fallback_reference: &str) -> Result<Transfer, GatewayError> {
    let gateway_status = required_str(data, "status")?;
    Ok(Transfer {
        reference: data
            .get("reference")
            .and_then(Value::as_str)
            .unwrap_or(fallback_reference)
            .to_string(),
        transfer_code: data
            .get("transfer_code")
            .and_then(Value::as_str)
            .map(str::to_string),
        status: map_transfer_status(gateway_status),
        gateway_status: gateway_status.to_string(),
        failure_reason: data
            .get("failures")
            .or_else(|| data.get("reason_for_failure"))
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Map a Paystack charge status onto a payment status.
pub fn map_charge_status(raw_status: &str) -> PaymentStatus {
    match raw_status.trim().to_ascii_lowercase().as_str() {
        "success" => PaymentStatus::Successful,
        "failed" | "abandoned" | "reversed" => PaymentStatus::Failed,
        _ => PaymentStatus::Pending,
    }
}

/// Map a Paystack transfer status onto a settlement status.
pub fn map_transfer_status(raw_status: &str) -> SettlementStatus {
    match raw_status.trim().to_ascii_lowercase().as_str() {
        "success" => SettlementStatus::Successful,
        "failed" | "reversed" | "rejected" | "abandoned" | "blocked" => SettlementStatus::Failed,
        _ => SettlementStatus::Pending,
    }
}

/// Constant-time check of an `x-paystack-signature` header (hex HMAC-SHA512).
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha512::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Hex HMAC-SHA512 of a body, as Paystack signs webhooks.
pub fn sign_body(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Decode a webhook body into the events this service acts on.
pub fn parse_webhook_event(body: &[u8]) -> Result<GatewayEvent, GatewayError> {
    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| GatewayError::InvalidResponse(format!("invalid webhook JSON: {e}")))?;
    let event = required_str(&payload, "event")?;
    let data = payload
        .get("data")
        .ok_or_else(|| GatewayError::InvalidResponse("missing webhook data".to_string()))?;

    match event {
        "charge.success" => Ok(GatewayEvent::ChargeSuccess {
            reference: required_str(data, "reference")?.to_string(),
        }),
        "transfer.success" | "transfer.failed" | "transfer.reversed" => {
            let reference = required_str(data, "reference")?;
            let mut transfer = transfer_from_data(data, reference)?;
            // The event name is authoritative over the embedded status.
            let event_status = event.trim_start_matches("transfer.");
            transfer.status = map_transfer_status(event_status);
            transfer.gateway_status = event_status.to_string();
            Ok(GatewayEvent::TransferUpdate(transfer))
        }
        other => Ok(GatewayEvent::Ignored {
            event: other.to_string(),
        }),
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn required_str<'a>(value: &'a Value, field: &str) -> Result<&'a str, GatewayError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| GatewayError::InvalidResponse(format!("missing {field} in response")))
}

fn required_u64(value: &Value, field: &str) -> Result<u64, GatewayError> {
    value
        .get(field)
        .and_then(Value::as_u64)
        .ok_or_else(|| GatewayError::InvalidResponse(format!("missing {field} in response")))
}

fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}
