// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated callers.
//!
//! ```rust,ignore
//! async fn my_handler(CurrentUser(user): CurrentUser) -> impl IntoResponse {
//!     // user is the StoredUser for the bearer token's Google account
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, decode_header, errors::ErrorKind, Validation};
use tracing::debug;

use super::{claims::GoogleClaims, AuthError, AuthenticatedUser, JwksManager};
use crate::state::{AppState, AuthConfig};
use crate::storage::{StoredUser, UserRepository};

/// Clock skew tolerance (60 seconds).
const CLOCK_SKEW_LEEWAY: u64 = 60;

/// Extractor for a verified Google identity.
///
/// ## Authentication Modes
///
/// - **Production mode** (JWKS configured): signature, expiry, issuer and
///   audience are verified against Google's keys
/// - **Development mode** (no JWKS): structure and expiry only
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>().cloned() {
            return Ok(Auth(user));
        }

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::InvalidAuthHeader)?;

        let user = verify_jwt(token, &state.auth_config).await?;
        parts.extensions.insert(user.clone());

        Ok(Auth(user))
    }
}

/// Extractor yielding the caller's stored user record.
///
/// Creates the record on the first authenticated request and refreshes the
/// profile when the token's name or picture changed.
pub struct CurrentUser(pub StoredUser);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<StoredUser>().cloned() {
            return Ok(CurrentUser(user));
        }

        let Auth(identity) = Auth::from_request_parts(parts, state).await?;
        let user = UserRepository::new(state.storage())
            .upsert(&identity.identity())
            .map_err(|e| AuthError::InternalError(format!("failed to load user: {e}")))?;
        parts.extensions.insert(user.clone());

        Ok(CurrentUser(user))
    }
}

/// Verify an ID token in the configured mode.
async fn verify_jwt(token: &str, auth_config: &AuthConfig) -> Result<AuthenticatedUser, AuthError> {
    let claims = match auth_config.jwks {
        Some(ref jwks) => verify_jwt_production(token, jwks, auth_config).await?,
        None => verify_jwt_development(token)?,
    };
    AuthenticatedUser::from_claims(claims)
}

/// Production verification against the JWKS.
async fn verify_jwt_production(
    token: &str,
    jwks: &JwksManager,
    auth_config: &AuthConfig,
) -> Result<GoogleClaims, AuthError> {
    let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;

    // Google always names the signing key.
    let kid = header.kid.as_deref().ok_or(AuthError::MalformedToken)?;
    let (decoding_key, algorithm) = jwks.get_decoding_key(kid).await?;

    let mut validation = Validation::new(algorithm);
    validation.leeway = CLOCK_SKEW_LEEWAY;

    if !auth_config.issuers.is_empty() {
        validation.set_issuer(&auth_config.issuers);
    }

    match auth_config.audience {
        Some(ref audience) => validation.set_audience(&[audience]),
        None => validation.validate_aud = false,
    }

    let token_data = decode::<GoogleClaims>(token, &decoding_key, &validation).map_err(|e| {
        debug!(error = %e, "ID token rejected");
        match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
            ErrorKind::InvalidAudience => AuthError::InvalidAudience,
            ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
            _ => AuthError::MalformedToken,
        }
    })?;

    Ok(token_data.claims)
}

/// Development verification (no signature check).
///
/// WARNING: This should only be used in development environments.
fn verify_jwt_development(token: &str) -> Result<GoogleClaims, AuthError> {
    let token_data = jsonwebtoken::dangerous::insecure_decode::<GoogleClaims>(token)
        .map_err(|_| AuthError::MalformedToken)?;

    let claims = token_data.claims;
    let now = chrono::Utc::now().timestamp();

    if claims.exp > 0 && claims.exp < now - CLOCK_SKEW_LEEWAY as i64 {
        return Err(AuthError::TokenExpired);
    }

    Ok(claims)
}
