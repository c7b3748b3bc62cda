// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer tokens are Google-issued OpenID Connect ID tokens.
//!
//! ## Auth Flow
//!
//! 1. The SPA completes Google sign-in and holds an ID token
//! 2. The SPA sends `Authorization: Bearer <ID token>`
//! 3. The server:
//!    - Fetches Google's JWKS via HTTPS (cached)
//!    - Verifies signature, expiry, issuer and audience (`GOOGLE_CLIENT_ID`)
//!    - Extracts `sub`, `email`, `name`, `picture`
//!    - Creates or refreshes the stored user
//!
//! Clock skew tolerance is 60 seconds. Every `/v1` endpoint requires
//! authentication except the gateway webhook, which is signature-checked.

pub mod claims;
pub mod error;
pub mod extractor;
pub mod jwks;

pub use claims::AuthenticatedUser;
pub use error::AuthError;
pub use extractor::{Auth, CurrentUser};
pub use jwks::{JwksManager, GOOGLE_JWKS_URL};
