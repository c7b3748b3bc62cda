// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User profile and dashboard endpoints.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    Json,
};

use crate::{
    api::bills::bill_summary,
    auth::CurrentUser,
    error::ApiError,
    ledger::UserOverview,
    models::{BillSummary, MyBillsQuery},
    state::AppState,
    storage::{
        BillRepository, BillStatus, FileStorage, MemberRepository, PaymentRepository, StoredBill,
        StoredUser,
    },
};

/// Get the current user's profile.
///
/// The profile is created from the ID token on the first authenticated
/// request.
#[utoipa::path(
    get,
    path = "/v1/users/me",
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current user", body = StoredUser),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<StoredUser> {
    Json(user)
}

/// Bills the caller owns or belongs to, most recently updated first.
#[utoipa::path(
    get,
    path = "/v1/users/me/bills",
    tag = "Users",
    security(("bearer_auth" = [])),
    params(MyBillsQuery),
    responses(
        (status = 200, description = "Bills with members", body = Vec<BillSummary>),
        (status = 400, description = "Unknown status filter"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_my_bills(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<MyBillsQuery>,
) -> Result<Json<Vec<BillSummary>>, ApiError> {
    let status = match query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => None,
        Some(raw) => Some(
            BillStatus::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("Invalid bill status: {raw}")))?,
        ),
    };

    let storage = state.storage();
    let mut bills = bills_for_user(storage, &user)?;
    if let Some(status) = status {
        bills.retain(|bill| bill.status == status);
    }
    if let Some(limit) = query.limit {
        bills.truncate(limit);
    }

    let summaries = bills
        .into_iter()
        .map(|bill| bill_summary(storage, bill))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(summaries))
}

/// Open bills the caller owns or belongs to.
#[utoipa::path(
    get,
    path = "/v1/users/me/bills/active",
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Open bills with members", body = Vec<BillSummary>),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn list_active_bills(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<BillSummary>>, ApiError> {
    let storage = state.storage();
    let summaries = bills_for_user(storage, &user)?
        .into_iter()
        .filter(|bill| bill.status == BillStatus::Open)
        .map(|bill| bill_summary(storage, bill))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(summaries))
}

/// Totals paid and owed across the caller's memberships.
#[utoipa::path(
    get,
    path = "/v1/users/me/overview",
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Payment overview", body = UserOverview),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn get_overview(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<UserOverview>, ApiError> {
    let storage = state.storage();
    let memberships = MemberRepository::new(storage).list_by_user(&user.id)?;
    let payments = PaymentRepository::new(storage).list_by_user(&user.id)?;
    Ok(Json(UserOverview::compute(&memberships, &payments)))
}

/// Owned and joined bills, deduplicated, newest update first.
fn bills_for_user(storage: &FileStorage, user: &StoredUser) -> Result<Vec<StoredBill>, ApiError> {
    let repo = BillRepository::new(storage);
    let mut by_id: HashMap<String, StoredBill> = repo
        .list_by_owner(&user.id)?
        .into_iter()
        .map(|bill| (bill.id.clone(), bill))
        .collect();

    for membership in MemberRepository::new(storage).list_by_user(&user.id)? {
        if by_id.contains_key(&membership.bill_id) {
            continue;
        }
        match repo.get(&membership.bill_id) {
            Ok(bill) => {
                by_id.insert(bill.id.clone(), bill);
            }
            Err(e) => {
                tracing::warn!(bill_id = %membership.bill_id, error = %e, "membership without bill");
            }
        }
    }

    let mut bills: Vec<StoredBill> = by_id.into_values().collect();
    bills.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    Ok(bills)
}
