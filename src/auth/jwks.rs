// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Google signing key cache.
//!
//! Google publishes its ID token signing keys at [`GOOGLE_JWKS_URL`] and
//! rotates them every few days. A new key is published before tokens are
//! signed with it, and the response's `Cache-Control: max-age` says how long
//! the current set may be reused.
//!
//! - The set is cached for the advertised `max-age`, clamped to
//!   [`MIN_CACHE_TTL`]..=[`MAX_CACHE_TTL`]; without the header
//!   [`DEFAULT_CACHE_TTL`] applies.
//! - A token whose `kid` is not in the cached set triggers one early refetch,
//!   at most once per [`KID_MISS_REFETCH_INTERVAL`], so forged `kid`s cannot
//!   drive a fetch per request.
//! - A failed fetch is an error. Expired sets are never served.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey};
use reqwest::header::{HeaderMap, CACHE_CONTROL};
use tokio::sync::RwLock;
use tracing::debug;

use super::error::AuthError;

/// Google's OpenID Connect signing keys.
pub const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// Used when the response carries no usable `max-age`.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
pub const MIN_CACHE_TTL: Duration = Duration::from_secs(60);
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const KID_MISS_REFETCH_INTERVAL: Duration = Duration::from_secs(60);

struct CacheEntry {
    jwks: JwkSet,
    fetched_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < self.ttl
    }
}

/// Cached Google key set shared by all requests.
#[derive(Clone)]
pub struct JwksManager {
    jwks_url: String,
    /// Overrides the advertised `max-age` when set.
    ttl_override: Option<Duration>,
    cache: Arc<RwLock<Option<CacheEntry>>>,
    client: reqwest::Client,
}

impl JwksManager {
    pub fn new(jwks_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            jwks_url: jwks_url.into(),
            ttl_override: None,
            cache: Arc::new(RwLock::new(None)),
            client,
        }
    }

    /// Ignore `Cache-Control` and cache for a fixed duration.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_override = Some(ttl);
        self
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Decoding key for the token's `kid`.
    ///
    /// Google ID tokens always name their key, so callers reject tokens
    /// without a `kid` before getting here.
    pub async fn get_decoding_key(&self, kid: &str) -> Result<(DecodingKey, Algorithm), AuthError> {
        let mut jwks = self.current().await?;

        if find_key(&jwks, kid).is_none() && self.may_refetch_for_unknown_kid().await {
            debug!(kid = %kid, "Unknown signing key, refetching Google certs");
            self.refresh().await?;
            jwks = self.current().await?;
        }

        let jwk = find_key(&jwks, kid).ok_or(AuthError::NoMatchingKey)?;
        jwk_to_decoding_key(jwk)
    }

    /// Fetch the key set now, regardless of cache state.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        let (jwks, max_age) = self.fetch_jwks().await?;
        let ttl = self.ttl_override.unwrap_or_else(|| cache_ttl(max_age));
        *self.cache.write().await = Some(CacheEntry {
            jwks,
            fetched_at: Instant::now(),
            ttl,
        });
        Ok(())
    }

    /// Whether a fresh key set is cached.
    pub async fn is_cached(&self) -> bool {
        self.cache
            .read()
            .await
            .as_ref()
            .is_some_and(CacheEntry::is_fresh)
    }

    async fn current(&self) -> Result<JwkSet, AuthError> {
        if let Some(entry) = self.cache.read().await.as_ref().filter(|e| e.is_fresh()) {
            return Ok(entry.jwks.clone());
        }
        self.refresh().await?;
        self.cache
            .read()
            .await
            .as_ref()
            .map(|entry| entry.jwks.clone())
            .ok_or_else(|| AuthError::JwksFetchError("key set missing after refresh".to_string()))
    }

    async fn may_refetch_for_unknown_kid(&self) -> bool {
        self.cache
            .read()
            .await
            .as_ref()
            .is_none_or(|entry| entry.fetched_at.elapsed() >= KID_MISS_REFETCH_INTERVAL)
    }

    async fn fetch_jwks(&self) -> Result<(JwkSet, Option<Duration>), AuthError> {
        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::JwksFetchError(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        let max_age = max_age(response.headers());
        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?;

        Ok((jwks, max_age))
    }
}

fn find_key<'a>(jwks: &'a JwkSet, kid: &str) -> Option<&'a Jwk> {
    jwks.keys
        .iter()
        .find(|k| k.common.key_id.as_deref() == Some(kid))
}

/// `max-age` directive of a `Cache-Control` header.
fn max_age(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get_all(CACHE_CONTROL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|directive| {
            let (name, seconds) = directive.trim().split_once('=')?;
            if !name.trim().eq_ignore_ascii_case("max-age") {
                return None;
            }
            seconds.trim().parse::<u64>().ok().map(Duration::from_secs)
        })
}

fn cache_ttl(max_age: Option<Duration>) -> Duration {
    max_age
        .map(|age| age.clamp(MIN_CACHE_TTL, MAX_CACHE_TTL))
        .unwrap_or(DEFAULT_CACHE_TTL)
}

fn jwk_to_decoding_key(jwk: &Jwk) -> Result<(DecodingKey, Algorithm), AuthError> {
    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => {
            let key = DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
                .map_err(|e| AuthError::InternalError(format!("Failed to create RSA key: {e}")))?;

            let alg = match jwk.common.key_algorithm {
                Some(KeyAlgorithm::RS384) => Algorithm::RS384,
                Some(KeyAlgorithm::RS512) => Algorithm::RS512,
                _ => Algorithm::RS256,
            };

            Ok((key, alg))
        }
        _ => Err(AuthError::InternalError(
            "Google signing keys are RSA".to_string(),
        )),
    }
}
