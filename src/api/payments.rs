// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Payment reconciliation and settlement endpoints.
//!
//! ## Flows
//!
//! - **Verify**: a member pays on the gateway's hosted page, then submits
//!   the transaction reference. The server verifies it with the gateway,
//!   records the payment once per reference, and credits successful
//!   amounts to the member and the bill.
//! - **Settle**: the owner of a fully paid bill transfers the collected
//!   total to a bank account through the gateway.
//! - **Webhook / poller**: late gateway outcomes (pending charges that
//!   succeed, transfers that fail or get reversed) are applied through
//!   [`reconcile_payment`] and [`apply_transfer_update`].
//!
//! Every read-modify-write of a bill and its members happens under the
//! bill's lock from [`crate::storage::BillLocks`].

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    api::{
        bills::{load_bill, BILL_NOT_FOUND},
        canonical_id,
    },
    audit_log,
    auth::{Auth, CurrentUser},
    error::ApiError,
    ledger,
    models::{
        BanksQuery, PaymentVerification, SettleBillRequest, SettlementResponse,
        VerifyPaymentRequest, WebhookAck,
    },
    providers::{
        BankPage, GatewayError, GatewayEvent, PaymentGateway, Transfer, TransferRecipientRequest,
        TransferRequest,
    },
    state::AppState,
    storage::{
        mask_account_number, AuditEvent, AuditEventType, BillRepository, BillStatus, FileStorage,
        MemberRepository, OwnershipEnforcer, PaymentRepository, PaymentStatus,
        SettlementRepository, SettlementStatus, StorageError, StorageResult, StoredBill,
        StoredMember, StoredPayment, StoredSettlement,
    },
};

/// Header carrying the HMAC-SHA512 of the webhook body.
pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-paystack-signature";

const TRANSFER_REASON: &str = "Bill payment";
const ACCOUNT_NUMBER_LEN: usize = 10;

/// Verify a gateway transaction and credit it to the caller's share.
#[utoipa::path(
    patch,
    path = "/v1/payments/verify/{bill_id}",
    tag = "Payments",
    security(("bearer_auth" = [])),
    params(("bill_id" = String, Path, description = "Bill ID")),
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Payment recorded", body = PaymentVerification),
        (status = 400, description = "Share already paid, bill not open or currency mismatch"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller is not a member of the bill"),
        (status = 404, description = "Bill not found"),
        (status = 409, description = "Reference already used for another payment"),
        (status = 502, description = "Payment gateway unavailable")
    )
)]
pub async fn verify_payment(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(bill_id): Path<String>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<PaymentVerification>, ApiError> {
    let reference = request.reference.trim();
    if reference.is_empty() {
        return Err(ApiError::bad_request("Payment reference is required"));
    }

    let bill_id = canonical_id(&bill_id, BILL_NOT_FOUND)?;
    let _guard = state.bill_locks.lock(&bill_id).await;
    let storage = state.storage();
    let mut bill = load_bill(storage, &bill_id)?;

    let mut member = MemberRepository::new(storage)
        .get(&bill.id, &user.id)
        .map_err(|e| match e {
            StorageError::NotFound(_) => ApiError::forbidden("You are not part of this bill"),
            other => other.into(),
        })?;

    let payments = PaymentRepository::new(storage);
    if payments.exists(reference) {
        let payment = payments.get_by_reference(reference)?;
        if payment.bill_id != bill.id || payment.bill_member_id != member.id {
            return Err(ApiError::conflict(
                "This payment reference has already been used",
            ));
        }
        debug!(reference = %reference, "Payment reference already recorded");
        if payment.status == PaymentStatus::Successful {
            repair_credited_totals(storage, &mut bill, &mut member)?;
        }
        return Ok(Json(PaymentVerification {
            payment,
            member,
            bill,
        }));
    }

    if ledger::member_is_settled(&member) {
        return Err(ApiError::bad_request(
            "You have already sorted your part of the bill",
        ));
    }
    if bill.status != BillStatus::Open {
        return Err(ApiError::bad_request("Bill is not open"));
    }

    let transaction = state.gateway.verify_transaction(reference).await?;
    if !transaction.currency.eq_ignore_ascii_case(&bill.currency) {
        return Err(ApiError::bad_request(format!(
            "Payment currency {} does not match bill currency {}",
            transaction.currency, bill.currency
        )));
    }

    let now = Utc::now();
    let mut payment = StoredPayment {
        id: uuid::Uuid::new_v4().to_string(),
        bill_id: bill.id.clone(),
        bill_member_id: member.id.clone(),
        user_id: user.id.clone(),
        amount: transaction.amount,
        currency: bill.currency.clone(),
        status: transaction.status,
        reference: reference.to_string(),
        paid_at: transaction.paid_at,
        created_at: now,
        updated_at: now,
    };
    match payment.status {
        PaymentStatus::Successful => {
            credit_payment(storage, &mut bill, &mut member, &mut payment, |p| {
                payments.create(p)
            })?;
        }
        PaymentStatus::Failed => {
            payments.create(&payment)?;
            audit_log!(
                storage,
                AuditEvent::new(AuditEventType::PaymentFailed)
                    .with_user(user.id.as_str())
                    .with_resource("payment", payment.reference.as_str())
                    .failed(transaction.gateway_status.as_str())
            );
        }
        PaymentStatus::Pending => payments.create(&payment)?,
    }

    info!(
        bill_id = %bill.id,
        reference = %payment.reference,
        status = ?payment.status,
        amount = payment.amount,
        "Payment verified"
    );

    Ok(Json(PaymentVerification {
        payment,
        member,
        bill,
    }))
}

/// Transfer the collected total of a fully paid bill to a bank account.
#[utoipa::path(
    patch,
    path = "/v1/payments/settle/{bill_id}",
    tag = "Payments",
    security(("bearer_auth" = [])),
    params(("bill_id" = String, Path, description = "Bill ID")),
    request_body = SettleBillRequest,
    responses(
        (status = 200, description = "Transfer accepted, bill settled", body = SettlementResponse),
        (status = 400, description = "Invalid recipient, bill not fully paid or transfer rejected"),
        (status = 401, description = "Not the creator of this bill"),
        (status = 404, description = "Bill not found"),
        (status = 409, description = "Bill already settled"),
        (status = 502, description = "Payment gateway unavailable")
    )
)]
pub async fn settle_bill(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(bill_id): Path<String>,
    Json(request): Json<SettleBillRequest>,
) -> Result<Json<SettlementResponse>, ApiError> {
    let recipient_name = request.recipient_name.trim().to_string();
    let account_number = request.recipient_account_number.trim().to_string();
    let bank_code = request.recipient_bank_code.trim().to_string();

    if recipient_name.is_empty() {
        return Err(ApiError::bad_request("Recipient name is required"));
    }
    if account_number.len() != ACCOUNT_NUMBER_LEN
        || !account_number.chars().all(|c| c.is_ascii_digit())
    {
        return Err(ApiError::bad_request(
            "Recipient account number must be 10 digits",
        ));
    }
    if bank_code.is_empty() {
        return Err(ApiError::bad_request("Recipient bank code is required"));
    }

    let bill_id = canonical_id(&bill_id, BILL_NOT_FOUND)?;
    let _guard = state.bill_locks.lock(&bill_id).await;
    let storage = state.storage();
    let bills = BillRepository::new(storage);
    let mut bill = load_bill(storage, &bill_id)?;

    if !bill.is_owned_by(&user) {
        return Err(ApiError::unauthorized(
            "Unauthorized. You are not the creator of this bill",
        ));
    }

    if ledger::prepare_settlement(&mut bill)? {
        bills.update(&mut bill)?;
        audit_log!(
            storage,
            AuditEventType::BillClosed,
            user.id.as_str(),
            "bill",
            bill.id.as_str()
        );
    }

    let settlements = SettlementRepository::new(storage);
    let attempt = settlements.list_by_bill(&bill.id)?.len() + 1;
    let now = Utc::now();
    let mut settlement = StoredSettlement {
        id: uuid::Uuid::new_v4().to_string(),
        bill_id: bill.id.clone(),
        amount: bill.total_amount,
        currency: bill.currency.clone(),
        recipient_name: recipient_name.clone(),
        account_number_masked: mask_account_number(&account_number),
        bank_code: bank_code.clone(),
        recipient_code: None,
        transfer_code: None,
        reference: format!("bill-settle-{}-{attempt}", bill.id),
        status: SettlementStatus::Pending,
        failure_reason: None,
        created_at: now,
        updated_at: now,
    };

    let recipient = TransferRecipientRequest {
        name: recipient_name,
        account_number,
        bank_code,
        currency: bill.currency.clone(),
    };

    match request_transfer(state.gateway.as_ref(), &recipient, &settlement).await {
        Ok((recipient_code, transfer)) => {
            settlement.recipient_code = Some(recipient_code);
            settlement.transfer_code = transfer.transfer_code;
            settlement.status = transfer.status;
            settlement.failure_reason = transfer.failure_reason;
        }
        Err(e) => {
            settlement.status = SettlementStatus::Failed;
            settlement.failure_reason = Some(e.to_string());
            settlements.create(&settlement)?;
            record_settlement_failure(storage, &settlement, Some(user.id.as_str()));
            return Err(e.into());
        }
    }

    settlements.create(&settlement)?;

    if settlement.status == SettlementStatus::Failed {
        let reason = settlement
            .failure_reason
            .clone()
            .unwrap_or_else(|| "Transfer failed".to_string());
        record_settlement_failure(storage, &settlement, Some(user.id.as_str()));
        return Err(ApiError::bad_gateway(reason));
    }

    ledger::transition(&mut bill, BillStatus::Settled)?;
    bills.update(&mut bill)?;

    audit_log!(
        storage,
        AuditEvent::new(AuditEventType::BillSettled)
            .with_user(user.id.as_str())
            .with_resource("bill", bill.id.as_str())
            .with_details(serde_json::json!({
                "settlement_id": settlement.id,
                "reference": settlement.reference,
                "amount": settlement.amount,
            }))
    );
    info!(
        bill_id = %bill.id,
        reference = %settlement.reference,
        status = ?settlement.status,
        "Bill settled"
    );

    Ok(Json(SettlementResponse { bill, settlement }))
}

/// List banks that can receive settlements.
#[utoipa::path(
    get,
    path = "/v1/payments/banks",
    tag = "Payments",
    security(("bearer_auth" = [])),
    params(BanksQuery),
    responses(
        (status = 200, description = "One page of the bank directory", body = BankPage),
        (status = 401, description = "Unauthorized"),
        (status = 502, description = "Payment gateway unavailable")
    )
)]
pub async fn list_banks(
    Auth(_user): Auth,
    State(state): State<AppState>,
    Query(query): Query<BanksQuery>,
) -> Result<Json<BankPage>, ApiError> {
    let cursor = query.cursor.as_deref().filter(|c| !c.is_empty());

    if let Some(page) = state.bank_cache.get(cursor) {
        return Ok(Json(page));
    }

    let page = state.gateway.list_banks(cursor).await?;
    state.bank_cache.put(cursor, page.clone());
    Ok(Json(page))
}

/// Receive gateway event notifications.
///
/// Unauthenticated; the body must carry a valid `x-paystack-signature`.
#[utoipa::path(
    post,
    path = "/v1/payments/webhook",
    tag = "Payments",
    request_body(content = Object, description = "Gateway event payload"),
    responses(
        (status = 200, description = "Event processed or ignored", body = WebhookAck),
        (status = 400, description = "Malformed event"),
        (status = 401, description = "Invalid signature")
    )
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let verified = signature.is_some_and(|sig| state.gateway.verify_webhook_signature(&body, sig));
    if !verified {
        warn!("Rejected webhook with missing or invalid signature");
        audit_log!(
            state.storage(),
            AuditEvent::new(AuditEventType::WebhookRejected).failed("invalid signature")
        );
        return Err(ApiError::unauthorized("Invalid webhook signature"));
    }

    let event = state
        .gateway
        .parse_webhook(&body)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    match event {
        GatewayEvent::ChargeSuccess { reference } => {
            match reconcile_payment(&state, &reference).await {
                Ok(payment) => {
                    debug!(reference = %reference, status = ?payment.status, "Webhook reconciled payment");
                }
                Err(e) if e.status == StatusCode::NOT_FOUND => {
                    debug!(reference = %reference, "Webhook for unrecorded payment ignored");
                }
                Err(e) => return Err(e),
            }
        }
        GatewayEvent::TransferUpdate(transfer) => {
            if apply_transfer_update(&state, &transfer).await?.is_none() {
                debug!(reference = %transfer.reference, "Webhook for unknown transfer ignored");
            }
        }
        GatewayEvent::Ignored { event } => {
            debug!(event = %event, "Webhook event ignored");
        }
    }

    Ok(Json(WebhookAck { received: true }))
}

// =============================================================================
// Reconciliation shared with the webhook and the poller
// =============================================================================

/// Re-verify a recorded payment and apply a final gateway outcome.
///
/// Returns the payment as stored afterwards. Already-final payments are
/// returned unchanged.
pub async fn reconcile_payment(state: &AppState, reference: &str) -> Result<StoredPayment, ApiError> {
    let storage = state.storage();
    let payments = PaymentRepository::new(storage);
    let bill_id = payments.get_by_reference(reference)?.bill_id;

    let _guard = state.bill_locks.lock(&bill_id).await;
    let mut payment = payments.get_by_reference(reference)?;
    if payment.status == PaymentStatus::Successful {
        let mut bill = load_bill(storage, &payment.bill_id)?;
        let mut member = MemberRepository::new(storage).get(&payment.bill_id, &payment.user_id)?;
        repair_credited_totals(storage, &mut bill, &mut member)?;
        return Ok(payment);
    }
    if payment.status.is_final() {
        return Ok(payment);
    }

    let transaction = state.gateway.verify_transaction(reference).await?;
    match transaction.status {
        PaymentStatus::Pending => return Ok(payment),
        PaymentStatus::Successful if transaction.currency.eq_ignore_ascii_case(&payment.currency) => {
            let mut bill = load_bill(storage, &payment.bill_id)?;
            let mut member = MemberRepository::new(storage).get(&payment.bill_id, &payment.user_id)?;

            payment.status = PaymentStatus::Successful;
            payment.amount = transaction.amount;
            payment.paid_at = transaction.paid_at;
            credit_payment(storage, &mut bill, &mut member, &mut payment, |p| {
                payments.update(p)
            })?;
        }
        _ => {
            payment.status = PaymentStatus::Failed;
            payments.update(&mut payment)?;
            audit_log!(
                storage,
                AuditEvent::new(AuditEventType::PaymentFailed)
                    .with_user(payment.user_id.as_str())
                    .with_resource("payment", payment.reference.as_str())
                    .failed(transaction.gateway_status.as_str())
            );
        }
    }

    info!(
        bill_id = %payment.bill_id,
        reference = %payment.reference,
        status = ?payment.status,
        "Payment reconciled"
    );
    Ok(payment)
}

/// Fetch a pending settlement's transfer from the gateway and apply it.
pub async fn refresh_settlement(
    state: &AppState,
    settlement: &StoredSettlement,
) -> Result<Option<StoredSettlement>, ApiError> {
    let transfer = state.gateway.fetch_transfer(&settlement.reference).await?;
    apply_transfer_update(state, &transfer).await
}

/// Apply a transfer state reported by the gateway.
///
/// A failed or reversed transfer returns a settled bill to CLOSED so the
/// owner can retry. Returns `None` when no settlement has the reference.
pub async fn apply_transfer_update(
    state: &AppState,
    transfer: &Transfer,
) -> Result<Option<StoredSettlement>, ApiError> {
    let storage = state.storage();
    let settlements = SettlementRepository::new(storage);
    let bill_id = match settlements.get_by_reference(&transfer.reference) {
        Ok(settlement) => settlement.bill_id,
        Err(StorageError::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let _guard = state.bill_locks.lock(&bill_id).await;
    let mut settlement = settlements.get_by_reference(&transfer.reference)?;

    match (settlement.status, transfer.status) {
        (SettlementStatus::Pending, SettlementStatus::Successful) => {
            settlement.status = SettlementStatus::Successful;
            if transfer.transfer_code.is_some() {
                settlement.transfer_code = transfer.transfer_code.clone();
            }
            settlements.update(&mut settlement)?;
            info!(bill_id = %settlement.bill_id, reference = %settlement.reference, "Settlement completed");
        }
        (SettlementStatus::Pending | SettlementStatus::Successful, SettlementStatus::Failed) => {
            settlement.status = SettlementStatus::Failed;
            settlement.failure_reason = transfer
                .failure_reason
                .clone()
                .or_else(|| Some(transfer.gateway_status.clone()));
            settlements.update(&mut settlement)?;
            record_settlement_failure(storage, &settlement, None);
            revert_settled_bill(storage, &settlement)?;
        }
        _ => {}
    }

    Ok(Some(settlement))
}

/// Credit a successful payment, then persist it with the member and bill.
///
/// The ledger runs before anything is written, so a rejected credit leaves
/// no SUCCESSFUL payment behind. `record` writes the payment first; if a
/// later write fails, [`repair_credited_totals`] restores the member and
/// bill from the payment records on the next replay or webhook.
fn credit_payment(
    storage: &FileStorage,
    bill: &mut StoredBill,
    member: &mut StoredMember,
    payment: &mut StoredPayment,
    record: impl FnOnce(&mut StoredPayment) -> StorageResult<()>,
) -> Result<(), ApiError> {
    let mut credited_bill = bill.clone();
    let mut credited_member = member.clone();
    let closed =
        ledger::apply_successful_payment(&mut credited_bill, &mut credited_member, payment.amount)?;

    record(payment)?;
    MemberRepository::new(storage).update(&credited_member)?;
    BillRepository::new(storage).update(&mut credited_bill)?;
    *bill = credited_bill;
    *member = credited_member;

    audit_log!(
        storage,
        AuditEvent::new(AuditEventType::PaymentVerified)
            .with_user(payment.user_id.as_str())
            .with_resource("payment", payment.reference.as_str())
            .with_details(serde_json::json!({
                "bill_id": bill.id,
                "amount": payment.amount,
            }))
    );

    if closed {
        audit_log!(
            storage,
            AuditEvent::new(AuditEventType::BillClosed).with_resource("bill", bill.id.as_str())
        );
        info!(bill_id = %bill.id, current_amount = bill.current_amount, "Bill fully paid and closed");
    }
    Ok(())
}

/// Bring a member and bill back in line with the bill's SUCCESSFUL payments.
fn repair_credited_totals(
    storage: &FileStorage,
    bill: &mut StoredBill,
    member: &mut StoredMember,
) -> Result<(), ApiError> {
    let payments = PaymentRepository::new(storage).list_by_bill(&bill.id)?;
    let mut repaired_bill = bill.clone();
    let mut repaired_member = member.clone();
    if !ledger::reconcile_totals(&mut repaired_bill, &mut repaired_member, &payments)? {
        return Ok(());
    }

    MemberRepository::new(storage).update(&repaired_member)?;
    BillRepository::new(storage).update(&mut repaired_bill)?;
    warn!(
        bill_id = %repaired_bill.id,
        member_id = %repaired_member.id,
        current_amount = repaired_bill.current_amount,
        paid_amount = repaired_member.paid_amount,
        "Bill totals repaired from payment records"
    );
    *bill = repaired_bill;
    *member = repaired_member;
    Ok(())
}

async fn request_transfer(
    gateway: &dyn PaymentGateway,
    recipient: &TransferRecipientRequest,
    settlement: &StoredSettlement,
) -> Result<(String, Transfer), GatewayError> {
    let recipient_code = gateway.create_transfer_recipient(recipient).await?;
    let transfer = gateway
        .initiate_transfer(&TransferRequest {
            amount: settlement.amount,
            currency: settlement.currency.clone(),
            recipient_code: recipient_code.clone(),
            reason: TRANSFER_REASON.to_string(),
            reference: settlement.reference.clone(),
        })
        .await?;
    Ok((recipient_code, transfer))
}

fn record_settlement_failure(storage: &FileStorage, settlement: &StoredSettlement, user_id: Option<&str>) {
    let reason = settlement.failure_reason.as_deref().unwrap_or("transfer failed");
    warn!(
        bill_id = %settlement.bill_id,
        reference = %settlement.reference,
        reason = %reason,
        "Settlement failed"
    );

    let mut event = AuditEvent::new(AuditEventType::SettlementFailed)
        .with_resource("settlement", settlement.id.as_str())
        .with_details(serde_json::json!({ "bill_id": settlement.bill_id }))
        .failed(reason);
    if let Some(user_id) = user_id {
        event = event.with_user(user_id);
    }
    audit_log!(storage, event);
}

fn revert_settled_bill(storage: &FileStorage, settlement: &StoredSettlement) -> Result<(), ApiError> {
    let bills = BillRepository::new(storage);
    let mut bill = bills.get(&settlement.bill_id)?;
    if bill.status != BillStatus::Settled {
        return Ok(());
    }

    ledger::transition(&mut bill, BillStatus::Closed)?;
    bills.update(&mut bill)?;

    audit_log!(
        storage,
        AuditEvent::new(AuditEventType::SettlementReverted)
            .with_resource("bill", bill.id.as_str())
            .with_details(serde_json::json!({ "settlement_id": settlement.id }))
    );
    warn!(bill_id = %bill.id, "Settlement reverted, bill returned to CLOSED");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{member, seed_bill, seed_user, TestContext, WEBHOOK_SECRET};
    use crate::providers::paystack::sign_body;
    use crate::storage::{MemberRole, StoredUser};
    use std::time::Duration;

    fn verify_request(reference: &str) -> Json<VerifyPaymentRequest> {
        Json(VerifyPaymentRequest {
            reference: reference.to_string(),
        })
    }

    fn settle_request() -> Json<SettleBillRequest> {
        Json(SettleBillRequest {
            recipient_name: "Ada Obi".to_string(),
            recipient_account_number: "0123456789".to_string(),
            recipient_bank_code: "058".to_string(),
        })
    }

    fn signed_headers(body: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            WEBHOOK_SIGNATURE_HEADER,
            sign_body(WEBHOOK_SECRET, body).unwrap().parse().unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn successful_payment_credits_member_and_closes_bill() {
        let ctx = TestContext::new();
        let owner = seed_user(&ctx.state, "owner");
        let ada = seed_user(&ctx.state, "ada");
        let bill = seed_bill(&ctx.state, &owner, 5_000, BillStatus::Open);
        MemberRepository::new(ctx.state.storage())
            .create(&member(&bill, &ada, MemberRole::Member, 5_000, 0))
            .unwrap();
        ctx.gateway
            .set_transaction("ref-1", PaymentStatus::Successful, 5_000, "NGN");

        let Json(result) = verify_payment(
            CurrentUser(ada.clone()),
            State(ctx.state.clone()),
            Path(bill.id.clone()),
            verify_request("ref-1"),
        )
        .await
        .unwrap();

        assert_eq!(result.payment.status, PaymentStatus::Successful);
        assert_eq!(result.member.paid_amount, 5_000);
        assert_eq!(result.bill.current_amount, 5_000);
        assert_eq!(result.bill.status, BillStatus::Closed);

        let stored = BillRepository::new(ctx.state.storage()).get(&bill.id).unwrap();
        assert_eq!(stored.status, BillStatus::Closed);
    }

    #[tokio::test]
    async fn replaying_a_reference_does_not_double_credit() {
        let ctx = TestContext::new();
        let owner = seed_user(&ctx.state, "owner");
        let ada = seed_user(&ctx.state, "ada");
        let bill = seed_bill(&ctx.state, &owner, 10_000, BillStatus::Open);
        MemberRepository::new(ctx.state.storage())
            .create(&member(&bill, &ada, MemberRole::Member, 6_000, 0))
            .unwrap();
        ctx.gateway
            .set_transaction("ref-1", PaymentStatus::Successful, 3_000, "NGN");

        for _ in 0..2 {
            verify_payment(
                CurrentUser(ada.clone()),
                State(ctx.state.clone()),
                Path(bill.id.clone()),
                verify_request("ref-1"),
            )
            .await
            .unwrap();
        }

        let stored = BillRepository::new(ctx.state.storage()).get(&bill.id).unwrap();
        assert_eq!(stored.current_amount, 3_000);
        let stored_member = MemberRepository::new(ctx.state.storage())
            .get(&bill.id, &ada.id)
            .unwrap();
        assert_eq!(stored_member.paid_amount, 3_000);
        assert_eq!(ctx.gateway.verify_calls(), 1);
    }

    #[tokio::test]
    async fn reference_of_another_member_conflicts() {
        let ctx = TestContext::new();
        let owner = seed_user(&ctx.state, "owner");
        let ada = seed_user(&ctx.state, "ada");
        let bola = seed_user(&ctx.state, "bola");
        let bill = seed_bill(&ctx.state, &owner, 10_000, BillStatus::Open);
        let members = MemberRepository::new(ctx.state.storage());
        members
            .create(&member(&bill, &ada, MemberRole::Member, 5_000, 0))
            .unwrap();
        members
            .create(&member(&bill, &bola, MemberRole::Member, 5_000, 0))
            .unwrap();
        ctx.gateway
            .set_transaction("ref-1", PaymentStatus::Successful, 1_000, "NGN");

        verify_payment(
            CurrentUser(ada),
            State(ctx.state.clone()),
            Path(bill.id.clone()),
            verify_request("ref-1"),
        )
        .await
        .unwrap();

        let err = verify_payment(
            CurrentUser(bola),
            State(ctx.state.clone()),
            Path(bill.id.clone()),
            verify_request("ref-1"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn non_member_and_settled_member_are_rejected() {
        let ctx = TestContext::new();
        let owner = seed_user(&ctx.state, "owner");
        let ada = seed_user(&ctx.state, "ada");
        let stranger = seed_user(&ctx.state, "stranger");
        let bill = seed_bill(&ctx.state, &owner, 10_000, BillStatus::Open);
        MemberRepository::new(ctx.state.storage())
            .create(&member(&bill, &ada, MemberRole::Member, 2_000, 2_000))
            .unwrap();

        let err = verify_payment(
            CurrentUser(stranger),
            State(ctx.state.clone()),
            Path(bill.id.clone()),
            verify_request("ref-x"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(err.message, "You are not part of this bill");

        let err = verify_payment(
            CurrentUser(ada),
            State(ctx.state.clone()),
            Path(bill.id.clone()),
            verify_request("ref-y"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "You have already sorted your part of the bill");
    }

    #[tokio::test]
    async fn failed_and_pending_payments_are_recorded_without_credit() {
        let ctx = TestContext::new();
        let owner = seed_user(&ctx.state, "owner");
        let ada = seed_user(&ctx.state, "ada");
        let bill = seed_bill(&ctx.state, &owner, 10_000, BillStatus::Open);
        MemberRepository::new(ctx.state.storage())
            .create(&member(&bill, &ada, MemberRole::Member, 5_000, 0))
            .unwrap();
        ctx.gateway
            .set_transaction("ref-failed", PaymentStatus::Failed, 5_000, "NGN");
        ctx.gateway
            .set_transaction("ref-pending", PaymentStatus::Pending, 5_000, "NGN");

        for reference in ["ref-failed", "ref-pending"] {
            let Json(result) = verify_payment(
                CurrentUser(ada.clone()),
                State(ctx.state.clone()),
                Path(bill.id.clone()),
                verify_request(reference),
            )
            .await
            .unwrap();
            assert_eq!(result.bill.current_amount, 0);
            assert_eq!(result.member.paid_amount, 0);
        }

        let recorded = PaymentRepository::new(ctx.state.storage())
            .list_by_bill(&bill.id)
            .unwrap();
        assert_eq!(recorded.len(), 2);
    }

    #[tokio::test]
    async fn currency_mismatch_is_rejected() {
        let ctx = TestContext::new();
        let owner = seed_user(&ctx.state, "owner");
        let ada = seed_user(&ctx.state, "ada");
        let bill = seed_bill(&ctx.state, &owner, 10_000, BillStatus::Open);
        MemberRepository::new(ctx.state.storage())
            .create(&member(&bill, &ada, MemberRole::Member, 5_000, 0))
            .unwrap();
        ctx.gateway
            .set_transaction("ref-usd", PaymentStatus::Successful, 5_000, "USD");

        let err = verify_payment(
            CurrentUser(ada),
            State(ctx.state.clone()),
            Path(bill.id.clone()),
            verify_request("ref-usd"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(!PaymentRepository::new(ctx.state.storage()).exists("ref-usd"));
    }

    #[tokio::test]
    async fn settle_transfers_total_and_marks_bill_settled() {
        let ctx = TestContext::new();
        let owner = seed_user(&ctx.state, "owner");
        let mut bill = seed_bill(&ctx.state, &owner, 8_000, BillStatus::Open);
        bill.current_amount = 8_000;
        BillRepository::new(ctx.state.storage()).update(&mut bill).unwrap();

        let Json(result) = settle_bill(
            CurrentUser(owner),
            State(ctx.state.clone()),
            Path(bill.id.clone()),
            settle_request(),
        )
        .await
        .unwrap();

        assert_eq!(result.bill.status, BillStatus::Settled);
        assert_eq!(result.settlement.amount, 8_000);
        assert_eq!(result.settlement.status, SettlementStatus::Pending);
        assert_eq!(result.settlement.account_number_masked, "******6789");
        assert_eq!(result.settlement.reference, format!("bill-settle-{}-1", bill.id));
        assert_eq!(result.settlement.recipient_code.as_deref(), Some("RCP_test"));

        let transfers = ctx.gateway.transfers();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].amount, 8_000);
        assert_eq!(transfers[0].reason, "Bill payment");
    }

    #[tokio::test]
    async fn settle_checks_owner_payment_and_status() {
        let ctx = TestContext::new();
        let owner = seed_user(&ctx.state, "owner");
        let other = seed_user(&ctx.state, "other");
        let unpaid = seed_bill(&ctx.state, &owner, 8_000, BillStatus::Open);

        let err = settle_bill(
            CurrentUser(other),
            State(ctx.state.clone()),
            Path(unpaid.id.clone()),
            settle_request(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.message, "Unauthorized. You are not the creator of this bill");

        let err = settle_bill(
            CurrentUser(owner.clone()),
            State(ctx.state.clone()),
            Path(unpaid.id.clone()),
            settle_request(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "The bill is not fully paid yet");

        let mut settled = seed_bill(&ctx.state, &owner, 8_000, BillStatus::Settled);
        settled.current_amount = 8_000;
        BillRepository::new(ctx.state.storage()).update(&mut settled).unwrap();
        let err = settle_bill(
            CurrentUser(owner),
            State(ctx.state.clone()),
            Path(settled.id.clone()),
            settle_request(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn settle_rejects_malformed_account_number() {
        let ctx = TestContext::new();
        let owner = seed_user(&ctx.state, "owner");
        let bill = seed_bill(&ctx.state, &owner, 8_000, BillStatus::Closed);

        let err = settle_bill(
            CurrentUser(owner),
            State(ctx.state.clone()),
            Path(bill.id),
            Json(SettleBillRequest {
                recipient_name: "Ada".to_string(),
                recipient_account_number: "12345".to_string(),
                recipient_bank_code: "058".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn gateway_failure_keeps_bill_closed_and_records_attempt() {
        let ctx = TestContext::new();
        ctx.gateway.reject_transfers("Insufficient balance");
        let owner = seed_user(&ctx.state, "owner");
        let mut bill = seed_bill(&ctx.state, &owner, 8_000, BillStatus::Closed);
        bill.current_amount = 8_000;
        BillRepository::new(ctx.state.storage()).update(&mut bill).unwrap();

        let err = settle_bill(
            CurrentUser(owner),
            State(ctx.state.clone()),
            Path(bill.id.clone()),
            settle_request(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Insufficient balance");

        let stored = BillRepository::new(ctx.state.storage()).get(&bill.id).unwrap();
        assert_eq!(stored.status, BillStatus::Closed);
        let attempts = SettlementRepository::new(ctx.state.storage())
            .list_by_bill(&bill.id)
            .unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status, SettlementStatus::Failed);
    }

    #[tokio::test]
    async fn transfer_reported_failed_returns_bad_gateway() {
        let ctx = TestContext::new();
        ctx.gateway.fail_transfers("Could not resolve account");
        let owner = seed_user(&ctx.state, "owner");
        let mut bill = seed_bill(&ctx.state, &owner, 8_000, BillStatus::Closed);
        bill.current_amount = 8_000;
        BillRepository::new(ctx.state.storage()).update(&mut bill).unwrap();

        let err = settle_bill(
            CurrentUser(owner),
            State(ctx.state.clone()),
            Path(bill.id.clone()),
            settle_request(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.message, "Could not resolve account");
        assert_eq!(ctx.gateway.transfers().len(), 1);

        let stored = BillRepository::new(ctx.state.storage()).get(&bill.id).unwrap();
        assert_eq!(stored.status, BillStatus::Closed);
        let attempts = SettlementRepository::new(ctx.state.storage())
            .list_by_bill(&bill.id)
            .unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status, SettlementStatus::Failed);
        assert_eq!(
            attempts[0].failure_reason.as_deref(),
            Some("Could not resolve account")
        );
    }

    #[tokio::test]
    async fn rejected_credit_records_no_successful_payment() {
        let ctx = TestContext::new();
        let owner = seed_user(&ctx.state, "owner");
        let ada = seed_user(&ctx.state, "ada");
        let mut bill = seed_bill(&ctx.state, &owner, u64::MAX, BillStatus::Open);
        bill.current_amount = u64::MAX - 10;
        BillRepository::new(ctx.state.storage()).update(&mut bill).unwrap();
        MemberRepository::new(ctx.state.storage())
            .create(&member(&bill, &ada, MemberRole::Member, 1_000, 0))
            .unwrap();
        ctx.gateway
            .set_transaction("ref-big", PaymentStatus::Successful, 1_000, "NGN");

        let err = verify_payment(
            CurrentUser(ada.clone()),
            State(ctx.state.clone()),
            Path(bill.id.clone()),
            verify_request("ref-big"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);

        assert!(!PaymentRepository::new(ctx.state.storage()).exists("ref-big"));
        let stored_member = MemberRepository::new(ctx.state.storage())
            .get(&bill.id, &ada.id)
            .unwrap();
        assert_eq!(stored_member.paid_amount, 0);
        let stored = BillRepository::new(ctx.state.storage()).get(&bill.id).unwrap();
        assert_eq!(stored.current_amount, u64::MAX - 10);
    }

    #[tokio::test]
    async fn replay_repairs_totals_of_an_interrupted_credit() {
        let ctx = TestContext::new();
        let owner = seed_user(&ctx.state, "owner");
        let ada = seed_user(&ctx.state, "ada");
        let bill = seed_bill(&ctx.state, &owner, 5_000, BillStatus::Open);
        let ada_member = member(&bill, &ada, MemberRole::Member, 5_000, 0);
        MemberRepository::new(ctx.state.storage())
            .create(&ada_member)
            .unwrap();

        // Payment written as SUCCESSFUL, member and bill never updated.
        let now = Utc::now();
        PaymentRepository::new(ctx.state.storage())
            .create(&StoredPayment {
                id: uuid::Uuid::new_v4().to_string(),
                bill_id: bill.id.clone(),
                bill_member_id: ada_member.id.clone(),
                user_id: ada.id.clone(),
                amount: 5_000,
                currency: "NGN".to_string(),
                status: PaymentStatus::Successful,
                reference: "ref-cut".to_string(),
                paid_at: Some(now),
                created_at: now,
                updated_at: now,
            })
            .unwrap();

        let Json(result) = verify_payment(
            CurrentUser(ada.clone()),
            State(ctx.state.clone()),
            Path(bill.id.clone()),
            verify_request("ref-cut"),
        )
        .await
        .unwrap();
        assert_eq!(ctx.gateway.verify_calls(), 0);
        assert_eq!(result.member.paid_amount, 5_000);
        assert_eq!(result.bill.current_amount, 5_000);
        assert_eq!(result.bill.status, BillStatus::Closed);

        let stored = BillRepository::new(ctx.state.storage()).get(&bill.id).unwrap();
        assert_eq!(stored.current_amount, 5_000);
        assert_eq!(stored.status, BillStatus::Closed);
        let stored_member = MemberRepository::new(ctx.state.storage())
            .get(&bill.id, &ada.id)
            .unwrap();
        assert_eq!(stored_member.paid_amount, 5_000);

        // A webhook for the same reference finds nothing left to repair.
        let payment = reconcile_payment(&ctx.state, "ref-cut").await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Successful);
        let stored = BillRepository::new(ctx.state.storage()).get(&bill.id).unwrap();
        assert_eq!(stored.current_amount, 5_000);
    }

    /// Bill of 10_000 with two members and two successful references.
    fn two_payer_bill(ctx: &TestContext) -> (StoredBill, StoredUser, StoredUser) {
        let owner = seed_user(&ctx.state, "owner");
        let ada = seed_user(&ctx.state, "ada");
        let bola = seed_user(&ctx.state, "bola");
        let bill = seed_bill(&ctx.state, &owner, 10_000, BillStatus::Open);
        let members = MemberRepository::new(ctx.state.storage());
        members
            .create(&member(&bill, &ada, MemberRole::Member, 5_000, 0))
            .unwrap();
        members
            .create(&member(&bill, &bola, MemberRole::Member, 5_000, 0))
            .unwrap();
        ctx.gateway
            .set_transaction("ref-ada", PaymentStatus::Successful, 3_000, "NGN");
        ctx.gateway
            .set_transaction("ref-bola", PaymentStatus::Successful, 4_000, "NGN");
        ctx.gateway.delay_verification(Duration::from_millis(50));
        (bill, ada, bola)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_verifications_on_one_bill_keep_every_credit() {
        let ctx = TestContext::new();
        let (bill, ada, bola) = two_payer_bill(&ctx);

        let (first, second) = tokio::join!(
            verify_payment(
                CurrentUser(ada),
                State(ctx.state.clone()),
                Path(bill.id.clone()),
                verify_request("ref-ada"),
            ),
            verify_payment(
                CurrentUser(bola),
                State(ctx.state.clone()),
                Path(bill.id.clone()),
                verify_request("ref-bola"),
            ),
        );
        first.unwrap();
        second.unwrap();

        let stored = BillRepository::new(ctx.state.storage()).get(&bill.id).unwrap();
        assert_eq!(stored.current_amount, 7_000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn aliased_bill_ids_share_one_lock() {
        let ctx = TestContext::new();
        let (bill, ada, bola) = two_payer_bill(&ctx);
        let simple = uuid::Uuid::parse_str(&bill.id).unwrap().simple().to_string();

        let (first, second) = tokio::join!(
            verify_payment(
                CurrentUser(ada),
                State(ctx.state.clone()),
                Path(bill.id.to_uppercase()),
                verify_request("ref-ada"),
            ),
            verify_payment(
                CurrentUser(bola),
                State(ctx.state.clone()),
                Path(simple),
                verify_request("ref-bola"),
            ),
        );
        first.unwrap();
        second.unwrap();

        let stored = BillRepository::new(ctx.state.storage()).get(&bill.id).unwrap();
        assert_eq!(stored.current_amount, 7_000);
    }

    #[tokio::test]
    async fn path_like_bill_ids_never_reach_storage() {
        let ctx = TestContext::new();
        let (bill, ada, _bola) = two_payer_bill(&ctx);

        let _held = ctx.state.bill_locks.lock(&bill.id).await;
        for alias in [format!("./{}", bill.id), format!("../bills/{}", bill.id)] {
            let err = tokio::time::timeout(
                Duration::from_millis(500),
                verify_payment(
                    CurrentUser(ada.clone()),
                    State(ctx.state.clone()),
                    Path(alias),
                    verify_request("ref-ada"),
                ),
            )
            .await
            .expect("rejected before taking any lock")
            .unwrap_err();
            assert_eq!(err.status, StatusCode::NOT_FOUND);
        }

        // The canonical form still waits for the held lock.
        let blocked = tokio::time::timeout(
            Duration::from_millis(100),
            verify_payment(
                CurrentUser(ada),
                State(ctx.state.clone()),
                Path(bill.id.to_uppercase()),
                verify_request("ref-ada"),
            ),
        )
        .await;
        assert!(blocked.is_err());

        let stored = BillRepository::new(ctx.state.storage()).get(&bill.id).unwrap();
        assert_eq!(stored.current_amount, 0);
        assert_eq!(ctx.gateway.verify_calls(), 0);
    }

    #[tokio::test]
    async fn banks_are_served_from_cache() {
        let ctx = TestContext::new();
        let owner = seed_user(&ctx.state, "owner");
        let auth = crate::auth::AuthenticatedUser {
            subject: owner.google_subject.clone(),
            email: owner.email.clone(),
            email_verified: true,
            name: owner.name.clone(),
            picture: None,
            issuer: String::new(),
            expires_at: 0,
        };

        for _ in 0..2 {
            let Json(page) = list_banks(
                Auth(auth.clone()),
                State(ctx.state.clone()),
                Query(BanksQuery::default()),
            )
            .await
            .unwrap();
            assert_eq!(page.data[0]["code"], "058");
        }
        assert_eq!(ctx.gateway.bank_calls(), 1);
    }

    #[tokio::test]
    async fn webhook_requires_valid_signature() {
        let ctx = TestContext::new();
        let body = Bytes::from_static(br#"{"event":"charge.success","data":{"reference":"r"}}"#);

        let mut headers = HeaderMap::new();
        headers.insert(WEBHOOK_SIGNATURE_HEADER, "deadbeef".parse().unwrap());
        let err = payment_webhook(State(ctx.state.clone()), headers, body.clone())
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);

        let err = payment_webhook(State(ctx.state.clone()), HeaderMap::new(), body)
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn charge_success_webhook_credits_pending_payment() {
        let ctx = TestContext::new();
        let owner = seed_user(&ctx.state, "owner");
        let ada = seed_user(&ctx.state, "ada");
        let bill = seed_bill(&ctx.state, &owner, 10_000, BillStatus::Open);
        MemberRepository::new(ctx.state.storage())
            .create(&member(&bill, &ada, MemberRole::Member, 4_000, 0))
            .unwrap();
        ctx.gateway
            .set_transaction("ref-late", PaymentStatus::Pending, 4_000, "NGN");
        verify_payment(
            CurrentUser(ada.clone()),
            State(ctx.state.clone()),
            Path(bill.id.clone()),
            verify_request("ref-late"),
        )
        .await
        .unwrap();

        ctx.gateway
            .set_transaction("ref-late", PaymentStatus::Successful, 4_000, "NGN");
        let body = Bytes::from_static(
            br#"{"event":"charge.success","data":{"reference":"ref-late","status":"success"}}"#,
        );
        let Json(ack) = payment_webhook(State(ctx.state.clone()), signed_headers(&body), body)
            .await
            .unwrap();
        assert!(ack.received);

        let payment = PaymentRepository::new(ctx.state.storage())
            .get_by_reference("ref-late")
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Successful);
        let stored = BillRepository::new(ctx.state.storage()).get(&bill.id).unwrap();
        assert_eq!(stored.current_amount, 4_000);
    }

    #[tokio::test]
    async fn reversed_transfer_returns_bill_to_closed() {
        let ctx = TestContext::new();
        let owner = seed_user(&ctx.state, "owner");
        let mut bill = seed_bill(&ctx.state, &owner, 8_000, BillStatus::Closed);
        bill.current_amount = 8_000;
        BillRepository::new(ctx.state.storage()).update(&mut bill).unwrap();

        let Json(result) = settle_bill(
            CurrentUser(owner),
            State(ctx.state.clone()),
            Path(bill.id.clone()),
            settle_request(),
        )
        .await
        .unwrap();
        assert_eq!(result.bill.status, BillStatus::Settled);

        let body = format!(
            r#"{{"event":"transfer.reversed","data":{{"reference":"{}","status":"reversed","transfer_code":"TRF_1"}}}}"#,
            result.settlement.reference
        );
        let body = Bytes::from(body);
        payment_webhook(State(ctx.state.clone()), signed_headers(&body), body)
            .await
            .unwrap();

        let stored = BillRepository::new(ctx.state.storage()).get(&bill.id).unwrap();
        assert_eq!(stored.status, BillStatus::Closed);
        let settlement = SettlementRepository::new(ctx.state.storage())
            .get_by_reference(&result.settlement.reference)
            .unwrap();
        assert_eq!(settlement.status, SettlementStatus::Failed);
    }

    #[tokio::test]
    async fn unknown_webhook_events_are_acknowledged() {
        let ctx = TestContext::new();
        let body = Bytes::from_static(br#"{"event":"subscription.create","data":{}}"#);

        let Json(ack) = payment_webhook(State(ctx.state.clone()), signed_headers(&body), body)
            .await
            .unwrap();
        assert!(ack.received);
    }
}
