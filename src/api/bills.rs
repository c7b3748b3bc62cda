// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bill API endpoints.
//!
//! A bill is backed by a gateway payment page that members pay through.
//! Only the owner may close a bill or see its invitations; members and
//! invitees may read it.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use tracing::info;

use crate::{
    api::canonical_id,
    audit_log,
    auth::CurrentUser,
    error::ApiError,
    ledger,
    models::{
        BillDetail, BillSummary, CreateBillRequest, InvitationView, MemberView, StatusQuery,
        UserSummary,
    },
    providers::PaymentPageRequest,
    state::AppState,
    storage::{
        AuditEventType, BillRepository, BillStatus, FileStorage, InvitationRepository,
        InvitationStatus, MemberRepository, OwnershipEnforcer, PaymentRepository,
        SettlementRepository, StoredBill, StoredPayment, StoredUser, UserRepository,
    },
};

/// Create a bill and its gateway payment page.
#[utoipa::path(
    post,
    path = "/v1/bills",
    tag = "Bills",
    security(("bearer_auth" = [])),
    request_body = CreateBillRequest,
    responses(
        (status = 201, description = "Bill created", body = StoredBill),
        (status = 400, description = "Invalid request or rejected by the gateway"),
        (status = 401, description = "Unauthorized"),
        (status = 502, description = "Payment gateway unavailable")
    )
)]
pub async fn create_bill(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(request): Json<CreateBillRequest>,
) -> Result<(StatusCode, Json<StoredBill>), ApiError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Bill name is required"));
    }
    if request.amount == 0 {
        return Err(ApiError::bad_request("Bill amount must be greater than zero"));
    }

    let page = state
        .gateway
        .create_payment_page(&PaymentPageRequest {
            name: name.to_string(),
            amount: request.amount,
            description: request
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
        })
        .await?;

    let now = Utc::now();
    let bill = StoredBill {
        id: uuid::Uuid::new_v4().to_string(),
        title: page.name,
        slug: page.slug,
        description: page.description,
        total_amount: page.amount,
        current_amount: 0,
        currency: page.currency,
        status: BillStatus::Open,
        owner_id: user.id.clone(),
        created_at: now,
        updated_at: now,
    };

    let storage = state.storage();
    BillRepository::new(storage).create(&bill)?;

    audit_log!(
        storage,
        AuditEventType::BillCreated,
        user.id.as_str(),
        "bill",
        bill.id.as_str()
    );
    info!(bill_id = %bill.id, owner_id = %user.id, total_amount = bill.total_amount, "Bill created");

    Ok((StatusCode::CREATED, Json(bill)))
}

/// Get a bill with its members, invitations, payments and settlement.
#[utoipa::path(
    get,
    path = "/v1/bills/{bill_id}",
    tag = "Bills",
    security(("bearer_auth" = [])),
    params(("bill_id" = String, Path, description = "Bill ID")),
    responses(
        (status = 200, description = "Bill detail", body = BillDetail),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not the owner, a member or an invitee"),
        (status = 404, description = "Bill not found")
    )
)]
pub async fn get_bill(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(bill_id): Path<String>,
) -> Result<Json<BillDetail>, ApiError> {
    let bill_id = canonical_id(&bill_id, BILL_NOT_FOUND)?;
    let storage = state.storage();
    let bill = load_bill(storage, &bill_id)?;

    if !can_view_bill(storage, &bill, &user)? {
        return Err(ApiError::forbidden("You do not have access to this bill"));
    }

    Ok(Json(bill_detail(storage, bill)?))
}

/// Close a fully paid bill.
#[utoipa::path(
    patch,
    path = "/v1/bills/{bill_id}/close",
    tag = "Bills",
    security(("bearer_auth" = [])),
    params(("bill_id" = String, Path, description = "Bill ID")),
    responses(
        (status = 200, description = "Bill closed", body = StoredBill),
        (status = 400, description = "Bill is not open or not fully paid"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not the bill owner"),
        (status = 404, description = "Bill not found")
    )
)]
pub async fn close_bill(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(bill_id): Path<String>,
) -> Result<Json<StoredBill>, ApiError> {
    let bill_id = canonical_id(&bill_id, BILL_NOT_FOUND)?;
    let _guard = state.bill_locks.lock(&bill_id).await;
    let storage = state.storage();
    let mut bill = load_bill(storage, &bill_id)?;

    if !bill.is_owned_by(&user) {
        return Err(ApiError::forbidden("Only the bill owner can close this bill"));
    }

    ledger::close(&mut bill)?;
    BillRepository::new(storage).update(&mut bill)?;

    audit_log!(
        storage,
        AuditEventType::BillClosed,
        user.id.as_str(),
        "bill",
        bill.id.as_str()
    );

    Ok(Json(bill))
}

/// List the invitations sent for a bill.
#[utoipa::path(
    get,
    path = "/v1/bills/{bill_id}/invitations",
    tag = "Bills",
    security(("bearer_auth" = [])),
    params(("bill_id" = String, Path, description = "Bill ID"), StatusQuery),
    responses(
        (status = 200, description = "Invitations for the bill", body = Vec<InvitationView>),
        (status = 400, description = "Unknown status filter"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not the bill owner"),
        (status = 404, description = "Bill not found")
    )
)]
pub async fn list_bill_invitations(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(bill_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Vec<InvitationView>>, ApiError> {
    let bill_id = canonical_id(&bill_id, BILL_NOT_FOUND)?;
    let storage = state.storage();
    let bill = load_bill(storage, &bill_id)?;

    if !bill.is_owned_by(&user) {
        return Err(ApiError::forbidden(
            "Only the bill owner can view its invitations",
        ));
    }

    let status = parse_invitation_status(query.status.as_deref())?;
    let users = UserRepository::new(storage);
    let invitations = InvitationRepository::new(storage)
        .list_by_bill(&bill.id, status)?
        .into_iter()
        .map(|invitation| InvitationView {
            user: users
                .get_by_email(&invitation.email)
                .ok()
                .map(|u| UserSummary::from(&u)),
            invitation,
        })
        .collect();

    Ok(Json(invitations))
}

// =============================================================================
// Shared helpers
// =============================================================================

pub(crate) const BILL_NOT_FOUND: &str = "Bill not found";

pub(crate) fn load_bill(storage: &FileStorage, bill_id: &str) -> Result<StoredBill, ApiError> {
    BillRepository::new(storage)
        .get(bill_id)
        .map_err(|e| match e {
            crate::storage::StorageError::NotFound(_) => ApiError::not_found(BILL_NOT_FOUND),
            other => other.into(),
        })
}

pub(crate) fn parse_invitation_status(
    raw: Option<&str>,
) -> Result<Option<InvitationStatus>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(value) => InvitationStatus::parse(value)
            .map(Some)
            .ok_or_else(|| ApiError::bad_request(format!("Invalid invitation status: {value}"))),
    }
}

/// Owner, members and invitees may read a bill.
fn can_view_bill(storage: &FileStorage, bill: &StoredBill, user: &StoredUser) -> Result<bool, ApiError> {
    if bill.is_owned_by(user) || MemberRepository::new(storage).exists(&bill.id, &user.id) {
        return Ok(true);
    }
    Ok(InvitationRepository::new(storage)
        .find(&bill.id, &user.email)?
        .is_some())
}

fn user_summary(users: &UserRepository<'_>, user_id: &str) -> Option<UserSummary> {
    users.get(user_id).ok().map(|u| UserSummary::from(&u))
}

/// Members of a bill with profiles, given the bill's payments.
fn member_views(storage: &FileStorage, bill_id: &str, payments: &[StoredPayment]) -> Result<Vec<MemberView>, ApiError> {
    let users = UserRepository::new(storage);
    let members = MemberRepository::new(storage).list_by_bill(bill_id)?;

    Ok(members
        .into_iter()
        .map(|member| MemberView {
            user: user_summary(&users, &member.user_id),
            payments: payments
                .iter()
                .filter(|p| p.bill_member_id == member.id)
                .cloned()
                .collect(),
            member,
        })
        .collect())
}

/// Bill with owner and members split by payment state.
pub(crate) fn bill_summary(storage: &FileStorage, bill: StoredBill) -> Result<BillSummary, ApiError> {
    let payments = PaymentRepository::new(storage).list_by_bill(&bill.id)?;
    let members = member_views(storage, &bill.id, &payments)?;
    let (paid_members, unpaid_members) = ledger::split_members(members.iter().cloned());

    Ok(BillSummary {
        owner: user_summary(&UserRepository::new(storage), &bill.owner_id),
        members,
        paid_members,
        unpaid_members,
        bill,
    })
}

fn bill_detail(storage: &FileStorage, bill: StoredBill) -> Result<BillDetail, ApiError> {
    let payments = PaymentRepository::new(storage).list_by_bill(&bill.id)?;
    let members = member_views(storage, &bill.id, &payments)?;
    let (paid_members, unpaid_members) = ledger::split_members(members.iter().cloned());

    Ok(BillDetail {
        owner: user_summary(&UserRepository::new(storage), &bill.owner_id),
        invitations: InvitationRepository::new(storage).list_by_bill(&bill.id, None)?,
        settlement: SettlementRepository::new(storage).latest_for_bill(&bill.id)?,
        unassigned_amount: ledger::unassigned_amount(&bill, &members),
        members,
        payments,
        paid_members,
        unpaid_members,
        bill,
    })
}
