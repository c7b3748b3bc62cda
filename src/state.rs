// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;
use std::time::Duration;

use crate::auth::{JwksManager, GOOGLE_JWKS_URL};
use crate::config::{env_optional, GOOGLE_CLIENT_ID_ENV, GOOGLE_JWKS_URL_ENV};
use crate::providers::{PaymentGateway, PaystackClient};
use crate::storage::{BankCache, BillLocks, FileStorage};

/// Issuers Google puts in the `iss` claim of ID tokens.
pub const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Bank directory pages kept in memory.
const BANK_CACHE_CAPACITY: usize = 32;

/// How long a bank directory page stays fresh.
const BANK_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Authentication configuration.
///
/// Without a JWKS manager the service runs in development mode and only
/// checks token structure and expiry.
#[derive(Clone, Default)]
pub struct AuthConfig {
    pub jwks: Option<JwksManager>,
    /// Accepted `iss` values; empty disables the issuer check.
    pub issuers: Vec<String>,
    /// Expected `aud` (the Google OAuth client ID).
    pub audience: Option<String>,
}

impl AuthConfig {
    /// Production configuration against Google's signing keys.
    pub fn google(jwks_url: impl Into<String>, client_id: Option<String>) -> Self {
        Self {
            jwks: Some(JwksManager::new(jwks_url)),
            issuers: GOOGLE_ISSUERS.iter().map(|s| s.to_string()).collect(),
            audience: client_id,
        }
    }

    /// Read `GOOGLE_JWKS_URL` / `GOOGLE_CLIENT_ID`.
    ///
    /// Setting only the client ID selects Google's default certs URL.
    pub fn from_env() -> Self {
        let client_id = env_optional(GOOGLE_CLIENT_ID_ENV);
        let jwks_url = env_optional(GOOGLE_JWKS_URL_ENV)
            .or_else(|| client_id.as_ref().map(|_| GOOGLE_JWKS_URL.to_string()));

        match jwks_url {
            Some(url) => Self::google(url, client_id),
            None => Self::default(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.jwks.is_some()
    }
}

#[derive(Clone)]
pub struct AppState {
    storage: Arc<FileStorage>,
    pub auth_config: AuthConfig,
    pub gateway: Arc<dyn PaymentGateway>,
    pub bill_locks: Arc<BillLocks>,
    pub bank_cache: Arc<BankCache>,
}

impl AppState {
    /// State in development auth mode with an unconfigured gateway.
    pub fn new(storage: FileStorage) -> Self {
        Self {
            storage: Arc::new(storage),
            auth_config: AuthConfig::default(),
            gateway: Arc::new(PaystackClient::unconfigured()),
            bill_locks: Arc::new(BillLocks::new()),
            bank_cache: Arc::new(BankCache::new(BANK_CACHE_CAPACITY, BANK_CACHE_TTL)),
        }
    }

    pub fn with_auth_config(mut self, auth_config: AuthConfig) -> Self {
        self.auth_config = auth_config;
        self
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }
}
