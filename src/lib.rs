// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational Split - shared bill server
//!
//! Users sign in with Google, open a bill backed by a gateway payment page,
//! invite others with an assigned share, and pay into it. Once the bill is
//! fully paid the owner settles the collected amount to a bank account.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Google ID token verification and the current-user extractor
//! - `ledger` - Bill state machine and amount bookkeeping
//! - `payment_poller` - Background reconciliation of pending gateway records
//! - `providers` - Payment gateway abstraction and the Paystack client
//! - `storage` - JSON file storage, repositories and audit log

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod payment_poller;
pub mod providers;
pub mod state;
pub mod storage;
