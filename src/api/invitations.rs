// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Invitation API endpoints.
//!
//! The owner offers a share of an open bill to a registered user by email.
//! Accepting creates the membership; the assignable balance is checked both
//! when inviting and when accepting, since other invitations may have been
//! accepted in between.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use tracing::info;

use crate::{
    api::{
        bills::{load_bill, parse_invitation_status, BILL_NOT_FOUND},
        canonical_id,
    },
    audit_log,
    auth::CurrentUser,
    error::ApiError,
    ledger,
    models::{AcceptInvitationResponse, CreateInvitationRequest, ReceivedInvitation, StatusQuery},
    state::AppState,
    storage::{
        normalize_email, AuditEvent, AuditEventType, BillRepository, BillStatus, FileStorage,
        InvitationRepository, InvitationStatus, MemberRepository, MemberRole, OwnershipEnforcer,
        StorageError, StoredInvitation, StoredMember, StoredUser, UserRepository,
    },
};

/// Invite a registered user to a bill with an assigned share.
#[utoipa::path(
    post,
    path = "/v1/invitations",
    tag = "Invitations",
    security(("bearer_auth" = [])),
    request_body = CreateInvitationRequest,
    responses(
        (status = 201, description = "Invitation sent", body = StoredInvitation),
        (status = 400, description = "Bill is not open or amount not assignable"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not the bill owner"),
        (status = 404, description = "Bill or invited user not found"),
        (status = 409, description = "Already a member or already invited")
    )
)]
pub async fn create_invitation(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(request): Json<CreateInvitationRequest>,
) -> Result<(StatusCode, Json<StoredInvitation>), ApiError> {
    let email = normalize_email(&request.email);
    if !email.contains('@') {
        return Err(ApiError::bad_request("A valid email address is required"));
    }

    let bill_id = canonical_id(&request.bill_id, BILL_NOT_FOUND)?;
    let _guard = state.bill_locks.lock(&bill_id).await;
    let storage = state.storage();
    let bill = load_bill(storage, &bill_id)?;

    if !bill.is_owned_by(&user) {
        return Err(ApiError::forbidden("Only the bill owner can invite members"));
    }
    if bill.status != BillStatus::Open {
        return Err(ApiError::bad_request("Bill is not open"));
    }

    let invitee = UserRepository::new(storage)
        .get_by_email(&email)
        .map_err(|e| match e {
            StorageError::NotFound(_) => ApiError::not_found("User being invited does not exist"),
            other => other.into(),
        })?;

    let members = MemberRepository::new(storage);
    if members.exists(&bill.id, &invitee.id) {
        return Err(ApiError::conflict("User is already a member of this bill"));
    }

    let invitations = InvitationRepository::new(storage);
    if invitations.find(&bill.id, &email)?.is_some() {
        return Err(ApiError::conflict("User already invited to this bill"));
    }

    ledger::check_assignable(&bill, &members.list_by_bill(&bill.id)?, request.assigned_amount)?;

    let invitation = StoredInvitation::new_pending(&bill.id, &email, request.assigned_amount);
    invitations.create(&invitation)?;

    audit_log!(
        storage,
        AuditEvent::new(AuditEventType::InvitationSent)
            .with_user(user.id.as_str())
            .with_resource("invitation", invitation.id.as_str())
            .with_details(serde_json::json!({
                "bill_id": bill.id,
                "assigned_amount": invitation.assigned_amount,
            }))
    );
    info!(
        bill_id = %bill.id,
        invitation_id = %invitation.id,
        assigned_amount = invitation.assigned_amount,
        "Invitation sent"
    );

    Ok((StatusCode::CREATED, Json(invitation)))
}

/// List invitations addressed to the caller.
#[utoipa::path(
    get,
    path = "/v1/invitations",
    tag = "Invitations",
    security(("bearer_auth" = [])),
    params(StatusQuery),
    responses(
        (status = 200, description = "Invitations with their bills", body = Vec<ReceivedInvitation>),
        (status = 400, description = "Unknown status filter"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_my_invitations(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Vec<ReceivedInvitation>>, ApiError> {
    let status = parse_invitation_status(query.status.as_deref())?;
    let storage = state.storage();
    let bills = BillRepository::new(storage);

    let invitations = InvitationRepository::new(storage)
        .list_by_email(&user.email, status)?
        .into_iter()
        .filter_map(|invitation| {
            let bill = bills.get(&invitation.bill_id).ok()?;
            Some(ReceivedInvitation { invitation, bill })
        })
        .collect();

    Ok(Json(invitations))
}

/// Accept an invitation and join the bill.
#[utoipa::path(
    post,
    path = "/v1/invitations/{invitation_id}/accept",
    tag = "Invitations",
    security(("bearer_auth" = [])),
    params(("invitation_id" = String, Path, description = "Invitation ID")),
    responses(
        (status = 200, description = "Invitation accepted", body = AcceptInvitationResponse),
        (status = 400, description = "Bill is not open or amount no longer assignable"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Invitation is addressed to someone else"),
        (status = 404, description = "Invalid or already accepted invitation"),
        (status = 409, description = "Already a member")
    )
)]
pub async fn accept_invitation(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(invitation_id): Path<String>,
) -> Result<Json<AcceptInvitationResponse>, ApiError> {
    const NOT_PENDING: &str = "Invalid or already accepted invitation";

    let invitation_id = canonical_id(&invitation_id, NOT_PENDING)?;
    let storage = state.storage();
    let bill_id = load_invitation_for(storage, &invitation_id, &user, NOT_PENDING)?.bill_id;

    let _guard = state.bill_locks.lock(&bill_id).await;
    let mut invitation = load_invitation_for(storage, &invitation_id, &user, NOT_PENDING)?;
    if invitation.status != InvitationStatus::Pending {
        return Err(ApiError::not_found(NOT_PENDING));
    }

    let bill = load_bill(storage, &invitation.bill_id)?;
    if bill.status != BillStatus::Open {
        return Err(ApiError::bad_request("Bill is not open"));
    }

    let members = MemberRepository::new(storage);
    if members.exists(&bill.id, &user.id) {
        return Err(ApiError::conflict("You are already a member of this bill"));
    }
    ledger::check_assignable(&bill, &members.list_by_bill(&bill.id)?, invitation.assigned_amount)?;

    let role = if bill.is_owned_by(&user) {
        MemberRole::Owner
    } else {
        MemberRole::Member
    };
    let member = StoredMember {
        id: uuid::Uuid::new_v4().to_string(),
        bill_id: bill.id.clone(),
        user_id: user.id.clone(),
        role,
        assigned_amount: invitation.assigned_amount,
        paid_amount: 0,
        joined_at: Utc::now(),
    };
    members.create(&member)?;

    invitation.status = InvitationStatus::Accepted;
    InvitationRepository::new(storage).update(&mut invitation)?;

    audit_log!(
        storage,
        AuditEventType::InvitationAccepted,
        user.id.as_str(),
        "invitation",
        invitation.id.as_str()
    );
    info!(bill_id = %bill.id, member_id = %member.id, "Invitation accepted");

    Ok(Json(AcceptInvitationResponse { invitation, member }))
}

/// Decline an invitation.
#[utoipa::path(
    post,
    path = "/v1/invitations/{invitation_id}/reject",
    tag = "Invitations",
    security(("bearer_auth" = [])),
    params(("invitation_id" = String, Path, description = "Invitation ID")),
    responses(
        (status = 200, description = "Invitation rejected", body = StoredInvitation),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Invitation is addressed to someone else"),
        (status = 404, description = "Invalid or already answered invitation")
    )
)]
pub async fn reject_invitation(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(invitation_id): Path<String>,
) -> Result<Json<StoredInvitation>, ApiError> {
    const NOT_PENDING: &str = "Invalid or already answered invitation";

    let invitation_id = canonical_id(&invitation_id, NOT_PENDING)?;
    let storage = state.storage();
    let bill_id = load_invitation_for(storage, &invitation_id, &user, NOT_PENDING)?.bill_id;

    let _guard = state.bill_locks.lock(&bill_id).await;
    let mut invitation = load_invitation_for(storage, &invitation_id, &user, NOT_PENDING)?;
    if invitation.status != InvitationStatus::Pending {
        return Err(ApiError::not_found(NOT_PENDING));
    }

    invitation.status = InvitationStatus::Rejected;
    InvitationRepository::new(storage).update(&mut invitation)?;

    audit_log!(
        storage,
        AuditEventType::InvitationRejected,
        user.id.as_str(),
        "invitation",
        invitation.id.as_str()
    );

    Ok(Json(invitation))
}

/// Load an invitation the caller is the addressee of.
fn load_invitation_for(
    storage: &FileStorage,
    invitation_id: &str,
    user: &StoredUser,
    missing: &str,
) -> Result<StoredInvitation, ApiError> {
    let invitation = InvitationRepository::new(storage)
        .get(invitation_id)
        .map_err(|e| match e {
            StorageError::NotFound(_) => ApiError::not_found(missing),
            other => other.into(),
        })?;

    if invitation.email != user.email {
        return Err(ApiError::forbidden("This invitation is not addressed to you"));
    }
    Ok(invitation)
}
