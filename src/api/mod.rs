// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, patch, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    error::{ApiError, ErrorBody},
    ledger::UserOverview,
    models::{
        AcceptInvitationResponse, BillDetail, BillSummary, CreateBillRequest,
        CreateInvitationRequest, InvitationView, MemberView, PaymentVerification,
        ReceivedInvitation, SettleBillRequest, SettlementResponse, UserSummary,
        VerifyPaymentRequest, WebhookAck,
    },
    providers::BankPage,
    state::AppState,
    storage::{
        BillStatus, InvitationStatus, MemberRole, PaymentStatus, SettlementStatus, StoredBill,
        StoredInvitation, StoredMember, StoredPayment, StoredSettlement, StoredUser,
    },
};

pub mod bills;
pub mod health;
pub mod invitations;
pub mod payments;
pub mod users;

#[cfg(test)]
pub(crate) mod test_support;

/// Canonical hyphenated form of a record ID taken from a request.
///
/// IDs are lock keys and file names, so they must be resolved before either
/// is touched. Anything that is not a UUID is reported as `missing`.
pub(crate) fn canonical_id(raw: &str, missing: &str) -> Result<String, ApiError> {
    uuid::Uuid::parse_str(raw.trim())
        .map(|id| id.hyphenated().to_string())
        .map_err(|_| ApiError::not_found(missing))
}

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        // Users
        .route("/users/me", get(users::get_me))
        .route("/users/me/bills", get(users::list_my_bills))
        .route("/users/me/bills/active", get(users::list_active_bills))
        .route("/users/me/overview", get(users::get_overview))
        // Bills
        .route("/bills", post(bills::create_bill))
        .route("/bills/{bill_id}", get(bills::get_bill))
        .route("/bills/{bill_id}/close", patch(bills::close_bill))
        .route(
            "/bills/{bill_id}/invitations",
            get(bills::list_bill_invitations),
        )
        // Invitations
        .route(
            "/invitations",
            get(invitations::list_my_invitations).post(invitations::create_invitation),
        )
        .route(
            "/invitations/{invitation_id}/accept",
            post(invitations::accept_invitation),
        )
        .route(
            "/invitations/{invitation_id}/reject",
            post(invitations::reject_invitation),
        )
        // Payments
        .route("/payments/verify/{bill_id}", patch(payments::verify_payment))
        .route("/payments/settle/{bill_id}", patch(payments::settle_bill))
        .route("/payments/banks", get(payments::list_banks))
        .route("/payments/webhook", post(payments::payment_webhook));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors_layer(&crate::config::cors_allowed_origins()))
}

/// Permissive CORS unless explicit SPA origins are configured.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Google-issued OpenID Connect ID token"))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        users::get_me,
        users::list_my_bills,
        users::list_active_bills,
        users::get_overview,
        bills::create_bill,
        bills::get_bill,
        bills::close_bill,
        bills::list_bill_invitations,
        invitations::create_invitation,
        invitations::list_my_invitations,
        invitations::accept_invitation,
        invitations::reject_invitation,
        payments::verify_payment,
        payments::settle_bill,
        payments::list_banks,
        payments::payment_webhook
    ),
    components(
        schemas(
            ErrorBody,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            StoredUser,
            StoredBill,
            StoredMember,
            StoredInvitation,
            StoredPayment,
            StoredSettlement,
            BillStatus,
            MemberRole,
            InvitationStatus,
            PaymentStatus,
            SettlementStatus,
            UserSummary,
            MemberView,
            InvitationView,
            ReceivedInvitation,
            BillSummary,
            BillDetail,
            UserOverview,
            BankPage,
            CreateBillRequest,
            CreateInvitationRequest,
            AcceptInvitationResponse,
            VerifyPaymentRequest,
            PaymentVerification,
            SettleBillRequest,
            SettlementResponse,
            WebhookAck
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Users", description = "Profile and dashboards"),
        (name = "Bills", description = "Shared bills"),
        (name = "Invitations", description = "Membership offers"),
        (name = "Payments", description = "Payment reconciliation and settlement")
    )
)]
struct ApiDoc;
