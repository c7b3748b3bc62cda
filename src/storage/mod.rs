// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent storage as one JSON file per record under `DATA_DIR`.
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/
//!   users/{user_id}.json
//!   bills/{bill_id}.json
//!   members/{bill_id}/{user_id}.json
//!   invitations/{invitation_id}.json
//!   payments/{hex(reference)}.json
//!   settlements/{settlement_id}.json
//!   audit/{date}/events.jsonl   # Daily audit logs
//! ```
//!
//! Files are written atomically (temp file + rename). Multi-record updates
//! of a bill are serialized by [`BillLocks`]; there is no cross-process
//! locking.

pub mod audit;
pub mod bank_cache;
pub mod file_store;
pub mod locks;
pub mod ownership;
pub mod paths;
pub mod repository;

pub use audit::{AuditEvent, AuditEventType, AuditRepository};
pub use bank_cache::BankCache;
pub use file_store::{FileStorage, StorageError, StorageResult};
pub use locks::BillLocks;
pub use ownership::{OwnedResource, OwnershipEnforcer};
pub use paths::StoragePaths;
pub use repository::{
    mask_account_number, normalize_email, BillRepository, BillStatus, InvitationRepository,
    InvitationStatus, MemberRepository, MemberRole, PaymentRepository, PaymentStatus,
    SettlementRepository, SettlementStatus, StoredBill, StoredInvitation, StoredMember,
    StoredPayment, StoredSettlement, StoredUser, UserIdentity, UserRepository,
};
