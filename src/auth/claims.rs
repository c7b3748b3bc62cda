// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Google ID token claims and the authenticated identity.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::AuthError;
use crate::storage::UserIdentity;

/// Claims read from a Google-issued OpenID Connect ID token.
///
/// See: https://developers.google.com/identity/openid-connect/openid-connect#an-id-tokens-payload
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleClaims {
    /// Stable Google account identifier
    pub sub: String,

    /// Expiration timestamp
    #[serde(default)]
    pub exp: i64,

    /// Issuer (`accounts.google.com` or `https://accounts.google.com`)
    #[serde(default)]
    pub iss: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub email_verified: Option<bool>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub picture: Option<String>,
}

/// Identity extracted from a verified ID token.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Google subject (`sub` claim)
    pub subject: String,

    /// Email address (lower-cased)
    pub email: String,

    pub email_verified: bool,

    /// Display name, falling back to the email's local part
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,

    /// Original issuer (used for validation, not serialized)
    #[serde(skip)]
    pub issuer: String,

    /// Token expiration (Unix timestamp, not serialized)
    #[serde(skip)]
    pub expires_at: i64,
}

impl AuthenticatedUser {
    /// Build from claims. Tokens without an email are rejected since users
    /// are invited by email.
    pub fn from_claims(claims: GoogleClaims) -> Result<Self, AuthError> {
        let email = claims
            .email
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
            .ok_or(AuthError::MissingEmail)?;

        let name = claims
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

        Ok(Self {
            subject: claims.sub,
            email,
            email_verified: claims.email_verified.unwrap_or(false),
            name,
            picture: claims.picture,
            issuer: claims.iss,
            expires_at: claims.exp,
        })
    }

    /// Profile fields used to create or refresh the stored user.
    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            subject: self.subject.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            picture: self.picture.clone(),
        }
    }
}
