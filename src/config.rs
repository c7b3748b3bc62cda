// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration Constants
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for JSON record storage | `./data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `GOOGLE_CLIENT_ID` | OAuth client ID, expected ID token audience | Required for production |
//! | `GOOGLE_JWKS_URL` | Google signing keys endpoint | Google certs URL when `GOOGLE_CLIENT_ID` is set |
//! | `PAYSTACK_SECRET_KEY` | Paystack secret key (API auth and webhook HMAC) | Required for payments |
//! | `PAYSTACK_BASE_URL` | Paystack API base URL | `https://api.paystack.co` |
//! | `PAYMENT_POLL_INTERVAL_SECS` | Seconds between pending payment sweeps | `60` |
//! | `CORS_ALLOWED_ORIGINS` | Comma-separated SPA origins | permissive |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;

use crate::storage::paths::DATA_ROOT;

/// Environment variable name for the data directory path.
///
/// All users, bills, members, invitations, payments, settlements and audit
/// logs are stored below it.
///
/// # Default
/// `./data`
pub const DATA_DIR_ENV: &str = "DATA_DIR";

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;

/// Google OAuth client ID. When set, ID tokens must carry it as `aud`.
pub const GOOGLE_CLIENT_ID_ENV: &str = "GOOGLE_CLIENT_ID";

/// Override for Google's JWKS endpoint.
pub const GOOGLE_JWKS_URL_ENV: &str = "GOOGLE_JWKS_URL";

/// Paystack secret key. Without it the gateway is unconfigured and payment
/// endpoints answer 503.
pub const PAYSTACK_SECRET_KEY_ENV: &str = "PAYSTACK_SECRET_KEY";

pub const PAYSTACK_BASE_URL_ENV: &str = "PAYSTACK_BASE_URL";

/// Seconds between sweeps of pending payments and settlements.
pub const PAYMENT_POLL_INTERVAL_ENV: &str = "PAYMENT_POLL_INTERVAL_SECS";

const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Comma-separated list of allowed CORS origins. Unset means permissive.
pub const CORS_ALLOWED_ORIGINS_ENV: &str = "CORS_ALLOWED_ORIGINS";

/// `json` for structured logs, anything else for human-readable output.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Read a variable, treating blank values as unset.
pub fn env_optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn env_or_default(name: &str, default: &str) -> String {
    env_optional(name).unwrap_or_else(|| default.to_string())
}

pub fn data_dir() -> String {
    env_or_default(DATA_DIR_ENV, DATA_ROOT)
}

/// Bind address from `HOST` and `PORT`. An unparsable port falls back to
/// the default.
pub fn bind_address() -> Result<SocketAddr, AddrParseError> {
    let host = env_or_default(HOST_ENV, DEFAULT_HOST);
    let port = env_optional(PORT_ENV)
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    format!("{host}:{port}").parse()
}

pub fn payment_poll_interval() -> Duration {
    let secs = env_optional(PAYMENT_POLL_INTERVAL_ENV)
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
    Duration::from_secs(secs)
}

pub fn cors_allowed_origins() -> Vec<String> {
    parse_origins(env_optional(CORS_ALLOWED_ORIGINS_ENV).as_deref().unwrap_or_default())
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|origin| origin.trim().trim_end_matches('/').to_string())
        .filter(|origin| !origin.is_empty())
        .collect()
}

pub fn log_format_is_json() -> bool {
    env_optional(LOG_FORMAT_ENV).is_some_and(|v| v.eq_ignore_ascii_case("json"))
}
